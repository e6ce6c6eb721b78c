//! One poll cycle: claim, spend, upgrade, schedule, then decide how long
//! to sleep.
//!
//! Steps run in a fixed order with a short randomized pause between them.
//! A step whose request fails is logged and skipped; only the user-data
//! reads that seed the rewards step and the sleep plan can fail the cycle.

use crate::api::GameApi;
use crate::api::classify::DomainCondition;
use crate::api::types::{GachaStrategy, Meta, Player, ResourceKind};
use crate::config::AccountSettings;
use crate::error::RequestError;
use crate::pacing::{Sleeper, jitter_whole};
use crate::planner::{
    Assignment, ChallengeScheduler, Commitments, SleepPlan, UpgradePlanner, plan_sleep,
};

/// Gacha bought per bulk purchase.
const BULK_PACK: u32 = 10;

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Everything a cycle needs, borrowed from the agent.
pub struct CycleContext<'a> {
    pub api: &'a dyn GameApi,
    pub settings: &'a AccountSettings,
    pub sleeper: &'a dyn Sleeper,
    pub action_delay: (u64, u64),
    pub idle_sleep: (u64, u64),
}

/// State carried from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct CycleMemory {
    redeem_pending: bool,
}

impl CycleMemory {
    pub fn new(settings: &AccountSettings) -> Self {
        Self {
            redeem_pending: settings.redeem_code.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sleep: SleepPlan,
    pub assignments: Vec<Assignment>,
    pub upgrades: u32,
    pub promoted: u32,
}

pub async fn run_cycle(
    ctx: &CycleContext<'_>,
    memory: &mut CycleMemory,
) -> Result<CycleReport, RequestError> {
    let mut commitments = Commitments::default();

    if memory.redeem_pending {
        memory.redeem_pending = false;
        if let Some(code) = ctx.settings.redeem_code.as_deref() {
            redeem(ctx.api, code).await;
            pace(ctx).await;
        }
    }

    let player = ctx.api.user_data().await?.player;
    claim_rewards(ctx.api, &player.meta).await;
    pace(ctx).await;

    claim_shop(ctx.api).await;
    pace(ctx).await;

    if ctx.settings.process_missions {
        process_missions(ctx.api).await;
        pace(ctx).await;
    }

    if let Some(player) = snapshot(ctx.api, "currency").await {
        spend_currency(ctx.api, ctx.settings, &player).await;
        pace(ctx).await;
    }

    if ctx.settings.buy_gacha_packs
        && let Some(player) = snapshot(ctx.api, "gacha packs").await
    {
        buy_gacha_packs(ctx.api, ctx.settings.gems_safe_balance, &player).await;
        pace(ctx).await;
    }

    let (upgrades, promoted) = run_upgrades(ctx, &commitments).await;
    pace(ctx).await;

    let assignments = match snapshot(ctx.api, "scheduling").await {
        Some(player) => {
            let start = ctx
                .settings
                .constellation_start_index
                .or(player.meta.constellations_last_index)
                .unwrap_or(0);
            let scheduler = ChallengeScheduler::new(ctx.api, ctx.settings);
            match scheduler
                .run(&player.units, start, &mut commitments, now_ms())
                .await
            {
                Ok(assignments) => assignments,
                Err(err) => {
                    log_step_error("scheduling", &err);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    let player = ctx.api.user_data().await?.player;
    let sleep = plan_sleep(
        &mut rand::thread_rng(),
        now_ms(),
        &player.meta,
        &player.units,
        ctx.idle_sleep,
    );

    Ok(CycleReport {
        sleep,
        assignments,
        upgrades,
        promoted,
    })
}

async fn pace(ctx: &CycleContext<'_>) {
    ctx.sleeper.sleep(jitter_whole(ctx.action_delay)).await;
}

fn log_step_error(step: &'static str, err: &RequestError) {
    if err.is_silent() {
        tracing::debug!(step, error = %err, "Step skipped");
    } else {
        tracing::warn!(step, error = %err, "Step failed");
    }
}

async fn snapshot(api: &dyn GameApi, step: &'static str) -> Option<Player> {
    match api.user_data().await {
        Ok(data) => Some(data.player),
        Err(err) => {
            log_step_error(step, &err);
            None
        }
    }
}

async fn redeem(api: &dyn GameApi, code: &str) {
    match api.redeem_code(code).await {
        Ok(()) => tracing::info!("Redeemed code"),
        Err(err) if err.condition() == Some(DomainCondition::RedeemLimitReached) => {
            tracing::info!("Code already redeemed");
        }
        Err(err) => log_step_error("redeem", &err),
    }
}

async fn claim_rewards(api: &dyn GameApi, meta: &Meta) {
    let now = now_ms();

    if meta.is_next_daily_reward_available {
        match api.claim_daily_rewards().await {
            Ok(()) => tracing::info!("Claimed daily reward"),
            Err(err) => log_step_error("daily reward", &err),
        }
    }

    match api.referrals_info().await {
        Ok(info) if info.claim_available => match api.claim_referral_rewards().await {
            Ok(()) => tracing::info!("Claimed referral rewards"),
            Err(err) => log_step_error("referral rewards", &err),
        },
        Ok(_) => {}
        Err(err) => log_step_error("referrals", &err),
    }

    if meta.next_challenge_claim_date > 0 && meta.next_challenge_claim_date <= now {
        match api.claim_challenge_rewards().await {
            Ok(()) => tracing::info!("Claimed challenge rewards"),
            Err(err) => log_step_error("challenge rewards", &err),
        }
    }
}

async fn claim_shop(api: &dyn GameApi) {
    let shop = match api.shop().await {
        Ok(shop) => shop,
        Err(err) => return log_step_error("shop", &err),
    };
    let now = now_ms();
    for slot in shop.shop.iter().filter(|s| s.is_free_and_due(now)) {
        match api.buy_shop_slot(&slot.slot_type).await {
            Ok(()) => tracing::info!(slot = %slot.slot_type, "Claimed free shop slot"),
            Err(err) => log_step_error("shop", &err),
        }
    }
}

async fn process_missions(api: &dyn GameApi) {
    let missions = match api.missions().await {
        Ok(list) => list.missions,
        Err(err) => return log_step_error("missions", &err),
    };
    for mission in missions.iter().filter(|m| m.needs_report()) {
        let key = &mission.mission_key;
        if let Err(err) = api.report_mission_event(key).await {
            log_step_error("missions", &err);
            continue;
        }
        match api.claim_mission(key).await {
            Ok(()) => tracing::info!(mission = %key, "Claimed mission"),
            Err(err) => log_step_error("missions", &err),
        }
    }
}

async fn spend_currency(api: &dyn GameApi, settings: &AccountSettings, player: &Player) {
    if player.meta.free_gacha_next_claim <= now_ms() {
        match api.spend_gacha(1, GachaStrategy::Free).await {
            Ok(result) => tracing::info!(rewards = result.rewards.len(), "Claimed free gacha"),
            Err(err) => log_step_error("free gacha", &err),
        }
    }

    if !settings.spend_gachas {
        return;
    }
    let owned = player.resources.amount(ResourceKind::Gacha);
    for _ in 0..owned {
        if let Err(err) = api.spend_gacha(1, GachaStrategy::Gacha).await {
            log_step_error("gacha", &err);
            break;
        }
    }
    if owned > 0 {
        tracing::info!(spent = owned, "Spent owned gacha");
    }
}

/// Number of bulk and single purchases that keep gems at or above the floor.
fn gem_purchases(gems: u64, safe_balance: u64, cost: u64) -> (u64, u64) {
    if cost == 0 {
        return (0, 0);
    }
    let affordable = gems.saturating_sub(safe_balance) / cost;
    let bulk_cost = cost * BULK_PACK as u64;
    let bulk = gems.saturating_sub(safe_balance) / bulk_cost;
    (bulk, affordable - bulk * BULK_PACK as u64)
}

async fn buy_gacha_packs(api: &dyn GameApi, safe_balance: u64, player: &Player) {
    let gems = player.resources.amount(ResourceKind::Gem);
    let (bulk, singles) = gem_purchases(gems, safe_balance, player.costs.gacha_gem_cost);
    if bulk == 0 && singles == 0 {
        tracing::debug!(gems, safe_balance, "No gems to spare");
        return;
    }

    let purchases = std::iter::repeat_n(BULK_PACK, bulk as usize)
        .chain(std::iter::repeat_n(1, singles as usize));
    let mut bought = 0;
    for amount in purchases {
        if let Err(err) = api.spend_gacha(amount, GachaStrategy::Gem).await {
            log_step_error("gacha packs", &err);
            break;
        }
        bought += amount;
    }
    tracing::info!(bought, "Bought gacha with gems");
}

async fn run_upgrades(ctx: &CycleContext<'_>, commitments: &Commitments) -> (u32, u32) {
    let Some(player) = snapshot(ctx.api, "upgrades").await else {
        return (0, 0);
    };
    let planner = UpgradePlanner::new(ctx.api);

    let mut upgrades = 0;
    for tier in &ctx.settings.tiers {
        let outcome = planner
            .upgrade_tier(tier, &player.units, commitments, now_ms())
            .await;
        tracing::debug!(tier = %tier.name, ?outcome, "Upgrade pass finished");
        upgrades += outcome.upgrades();
    }

    if !ctx.settings.upgrade_cards {
        return (upgrades, 0);
    }
    let Some(player) = snapshot(ctx.api, "card promotion").await else {
        return (upgrades, 0);
    };
    let elite: Vec<&str> = ctx
        .settings
        .tiers
        .iter()
        .map(|t| t.unit_type.as_str())
        .collect();
    let promoted = planner
        .promote_with_cards(&player.units, &player.resources, &elite, now_ms())
        .await;
    (upgrades, promoted)
}
