//! Spending resources on units.
//!
//! An elite tier's unit is upgraded repeatedly within a per-cycle budget,
//! re-reading balances before every attempt. Running out of resources is
//! the normal way the loop ends.

use crate::api::GameApi;
use crate::api::types::{ResourceKind, ResourceLedger, Unit};
use crate::config::TierConfig;
use crate::planner::Commitments;

/// The next upgrade a unit can afford.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStep {
    /// Spend cards for one more star.
    Promote,
    /// Spend gold and green stones for one more level.
    LevelUp,
}

impl UpgradeStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Promote => "promote",
            Self::LevelUp => "level up",
        }
    }
}

/// Promotion is preferred when cards are available; otherwise a level up
/// when both level costs are covered. `None` means waiting for resources.
pub fn next_step(unit: &Unit, ledger: &ResourceLedger) -> Option<UpgradeStep> {
    if unit.cost_star > 0 && ledger.cards(&unit.unit_type) >= unit.cost_star {
        return Some(UpgradeStep::Promote);
    }
    let has_level_cost = unit.cost_level_gold > 0 || unit.cost_level_green > 0;
    if has_level_cost
        && ledger.amount(ResourceKind::Gold) >= unit.cost_level_gold
        && ledger.amount(ResourceKind::GreenStones) >= unit.cost_level_green
    {
        return Some(UpgradeStep::LevelUp);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotOwned,
    AtCeiling,
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BudgetExhausted,
    WaitingForResources,
    ReachedCeiling,
    RequestFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Skipped(SkipReason),
    Stopped { upgrades: u32, reason: StopReason },
}

impl UpgradeOutcome {
    pub fn upgrades(&self) -> u32 {
        match self {
            Self::Skipped(_) => 0,
            Self::Stopped { upgrades, .. } => *upgrades,
        }
    }
}

pub struct UpgradePlanner<'a> {
    api: &'a dyn GameApi,
}

impl<'a> UpgradePlanner<'a> {
    pub fn new(api: &'a dyn GameApi) -> Self {
        Self { api }
    }

    /// Upgrade one tier's unit as far as the budget and balances allow.
    pub async fn upgrade_tier(
        &self,
        tier: &TierConfig,
        units: &[Unit],
        commitments: &Commitments,
        now_ms: i64,
    ) -> UpgradeOutcome {
        let Some(unit) = units.iter().find(|u| u.unit_type == tier.unit_type) else {
            return UpgradeOutcome::Skipped(SkipReason::NotOwned);
        };
        if unit.level >= tier.level_ceiling {
            tracing::debug!(tier = %tier.name, level = unit.level, "Unit at level ceiling");
            return UpgradeOutcome::Skipped(SkipReason::AtCeiling);
        }
        if !unit.is_available(now_ms) || commitments.is_unit_committed(&unit.unit_type) {
            tracing::debug!(tier = %tier.name, "Unit committed, not upgrading");
            return UpgradeOutcome::Skipped(SkipReason::Committed);
        }

        let mut upgrades = 0;
        while upgrades < tier.upgrade_budget {
            let player = match self.api.user_data().await {
                Ok(data) => data.player,
                Err(err) => {
                    tracing::debug!(tier = %tier.name, error = %err, "No snapshot for upgrade");
                    return stopped(upgrades, StopReason::RequestFailed);
                }
            };
            let Some(unit) = player.unit(&tier.unit_type) else {
                return stopped(upgrades, StopReason::RequestFailed);
            };
            if unit.level >= tier.level_ceiling {
                return stopped(upgrades, StopReason::ReachedCeiling);
            }
            let Some(step) = next_step(unit, &player.resources) else {
                tracing::info!(
                    tier = %tier.name,
                    level = unit.level,
                    stars = unit.stars,
                    "Waiting for resources to upgrade"
                );
                return stopped(upgrades, StopReason::WaitingForResources);
            };

            let result = match step {
                UpgradeStep::Promote => self.api.star_up(&unit.unit_type).await,
                UpgradeStep::LevelUp => self.api.level_up(&unit.unit_type).await,
            };
            match result {
                Ok(()) => {
                    upgrades += 1;
                    tracing::info!(tier = %tier.name, step = step.as_str(), "Upgraded elite unit");
                }
                Err(err) => {
                    if err.is_silent() {
                        tracing::debug!(tier = %tier.name, error = %err, "Upgrade not applied");
                    } else {
                        tracing::warn!(tier = %tier.name, error = %err, "Upgrade failed");
                    }
                    return stopped(upgrades, StopReason::RequestFailed);
                }
            }
        }

        stopped(upgrades, StopReason::BudgetExhausted)
    }

    /// Promote every non-elite unit whose cards cover its next star.
    pub async fn promote_with_cards(
        &self,
        units: &[Unit],
        ledger: &ResourceLedger,
        elite: &[&str],
        now_ms: i64,
    ) -> u32 {
        let mut promoted = 0;
        for unit in units {
            if elite.contains(&unit.unit_type.as_str()) || !unit.is_available(now_ms) {
                continue;
            }
            if next_step(unit, ledger) != Some(UpgradeStep::Promote) {
                continue;
            }
            match self.api.star_up(&unit.unit_type).await {
                Ok(()) => {
                    promoted += 1;
                    tracing::info!(unit = %unit.unit_type, stars = unit.stars + 1, "Promoted unit");
                }
                Err(err) if err.is_silent() => {
                    tracing::debug!(unit = %unit.unit_type, error = %err, "Promotion skipped");
                }
                Err(err) => {
                    tracing::warn!(unit = %unit.unit_type, error = %err, "Promotion failed");
                }
            }
        }
        promoted
    }
}

fn stopped(upgrades: u32, reason: StopReason) -> UpgradeOutcome {
    UpgradeOutcome::Stopped { upgrades, reason }
}
