//! In-memory game service for planner and cycle tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::GameApi;
use crate::api::classify::{DomainCondition, ErrorKind};
use crate::api::types::{
    Challenge, Constellation, ConstellationPage, GachaResult, GachaStrategy, MissionList,
    ReferralInfo, ResourceKind, Shop, Slot, SlotAssignment, Unit, UserData,
};
use crate::error::{RequestError, UnavailableCause};

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub user: UserData,
    pub constellations: Vec<Constellation>,
    pub shop: Shop,
    pub missions: MissionList,
    pub referral_claimable: bool,
    pub failing_challenges: HashSet<String>,
    pub refuse_upgrades: bool,
    pub user_data_down: bool,
    pub calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeGameApi {
    state: Mutex<FakeState>,
}

impl FakeGameApi {
    pub fn new(user: UserData) -> Self {
        Self {
            state: Mutex::new(FakeState {
                user,
                ..Default::default()
            }),
        }
    }

    pub fn with_constellations(self, constellations: Vec<Constellation>) -> Self {
        self.with_state(|s| s.constellations = constellations);
        self
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.with_state(|s| s.calls.push(call));
    }
}

fn rejected(endpoint: &'static str) -> RequestError {
    RequestError::Rejected {
        endpoint,
        status: 400,
        kind: ErrorKind::BadRequest,
        name: "BadRequest".to_string(),
        message: "refused".to_string(),
    }
}

#[async_trait]
impl GameApi for FakeGameApi {
    async fn user_data(&self) -> Result<UserData, RequestError> {
        self.record("getUserData".to_string());
        self.with_state(|s| {
            if s.user_data_down {
                return Err(RequestError::Unavailable {
                    endpoint: "getUserData",
                    cause: UnavailableCause::RetriesExhausted,
                });
            }
            Ok(s.user.clone())
        })
    }

    async fn claim_daily_rewards(&self) -> Result<(), RequestError> {
        self.record("claimDailyRewards".to_string());
        Ok(())
    }

    async fn referrals_info(&self) -> Result<ReferralInfo, RequestError> {
        self.record("getReferralsInfo".to_string());
        Ok(ReferralInfo {
            claim_available: self.with_state(|s| s.referral_claimable),
        })
    }

    async fn claim_referral_rewards(&self) -> Result<(), RequestError> {
        self.record("claimReferralRewards".to_string());
        Ok(())
    }

    async fn claim_challenge_rewards(&self) -> Result<(), RequestError> {
        self.record("claimChallengesRewards".to_string());
        Ok(())
    }

    async fn shop(&self) -> Result<Shop, RequestError> {
        self.record("getShop".to_string());
        Ok(self.with_state(|s| s.shop.clone()))
    }

    async fn buy_shop_slot(&self, slot_type: &str) -> Result<(), RequestError> {
        self.record(format!("buyShop:{slot_type}"));
        Ok(())
    }

    async fn spend_gacha(
        &self,
        amount: u32,
        strategy: GachaStrategy,
    ) -> Result<GachaResult, RequestError> {
        self.record(format!("spendGacha:{amount}:{strategy:?}"));
        self.with_state(|s| {
            let resources = &mut s.user.player.resources;
            match strategy {
                GachaStrategy::Free => {}
                GachaStrategy::Gacha => {
                    let left = resources.amount(ResourceKind::Gacha);
                    if left < amount as u64 {
                        return Err(RequestError::NotApplicable {
                            endpoint: "spendGacha",
                            condition: DomainCondition::NoResources,
                        });
                    }
                    *resources = resources
                        .clone()
                        .with_amount(ResourceKind::Gacha, left - amount as u64);
                }
                GachaStrategy::Gem => {
                    let cost = s.user.player.costs.gacha_gem_cost * amount as u64;
                    let gems = resources.amount(ResourceKind::Gem);
                    if gems < cost {
                        return Err(rejected("spendGacha"));
                    }
                    *resources = resources.clone().with_amount(ResourceKind::Gem, gems - cost);
                }
            }
            Ok(GachaResult::default())
        })
    }

    async fn constellations(
        &self,
        start_index: u32,
        amount: u32,
    ) -> Result<ConstellationPage, RequestError> {
        self.record(format!("getConstellations:{start_index}"));
        let page = self.with_state(|s| {
            s.constellations
                .iter()
                .skip(start_index as usize)
                .take(amount as usize)
                .cloned()
                .collect()
        });
        Ok(ConstellationPage {
            constellations: page,
        })
    }

    async fn send_to_challenge(
        &self,
        challenge_type: &str,
        assignments: &[SlotAssignment],
    ) -> Result<(), RequestError> {
        let units: Vec<String> = assignments
            .iter()
            .map(|a| format!("{}@{}", a.hero_type, a.slot_id))
            .collect();
        self.record(format!("sendToChallenge:{challenge_type}:{}", units.join(",")));
        if self.with_state(|s| s.failing_challenges.contains(challenge_type)) {
            return Err(rejected("sendToChallenge"));
        }
        Ok(())
    }

    async fn level_up(&self, unit_type: &str) -> Result<(), RequestError> {
        self.record(format!("levelUpHero:{unit_type}"));
        self.with_state(|s| {
            if s.refuse_upgrades {
                return Err(RequestError::NotApplicable {
                    endpoint: "levelUpHero",
                    condition: DomainCondition::NoResources,
                });
            }
            let player = &mut s.user.player;
            let Some(unit) = player.units.iter_mut().find(|u| u.unit_type == unit_type) else {
                return Err(rejected("levelUpHero"));
            };
            let gold = player.resources.amount(ResourceKind::Gold);
            let green = player.resources.amount(ResourceKind::GreenStones);
            player.resources = player
                .resources
                .clone()
                .with_amount(ResourceKind::Gold, gold.saturating_sub(unit.cost_level_gold))
                .with_amount(
                    ResourceKind::GreenStones,
                    green.saturating_sub(unit.cost_level_green),
                );
            unit.level += 1;
            Ok(())
        })
    }

    async fn star_up(&self, unit_type: &str) -> Result<(), RequestError> {
        self.record(format!("starUpHero:{unit_type}"));
        self.with_state(|s| {
            if s.refuse_upgrades {
                return Err(RequestError::NotApplicable {
                    endpoint: "starUpHero",
                    condition: DomainCondition::UnitBusy,
                });
            }
            let player = &mut s.user.player;
            let Some(unit) = player.units.iter_mut().find(|u| u.unit_type == unit_type) else {
                return Err(rejected("starUpHero"));
            };
            let cards = player.resources.cards(unit_type);
            player.resources = player
                .resources
                .clone()
                .with_cards(unit_type, cards.saturating_sub(unit.cost_star));
            unit.stars += 1;
            Ok(())
        })
    }

    async fn missions(&self) -> Result<MissionList, RequestError> {
        self.record("getMissions".to_string());
        Ok(self.with_state(|s| s.missions.clone()))
    }

    async fn report_mission_event(&self, mission_key: &str) -> Result<(), RequestError> {
        self.record(format!("reportMissionEvent:{mission_key}"));
        Ok(())
    }

    async fn claim_mission(&self, mission_key: &str) -> Result<(), RequestError> {
        self.record(format!("claimMission:{mission_key}"));
        Ok(())
    }

    async fn redeem_code(&self, code: &str) -> Result<(), RequestError> {
        self.record(format!("useRedeemCode:{code}"));
        Ok(())
    }
}

// ==================== Fixtures ====================

pub(crate) fn unit(unit_type: &str, class: &str, level: u32, stars: u32) -> Unit {
    Unit {
        unit_type: unit_type.to_string(),
        class: class.to_string(),
        level,
        stars,
        power: 1000,
        ..Default::default()
    }
}

pub(crate) fn open_slot(class: Option<&str>) -> Slot {
    Slot {
        hero_class: class.map(str::to_string),
        ..Default::default()
    }
}

pub(crate) fn challenge(
    challenge_type: &str,
    reward: ResourceKind,
    received: u64,
    value: u64,
    slots: Vec<Slot>,
) -> Challenge {
    Challenge {
        name: challenge_type.to_string(),
        challenge_type: challenge_type.to_string(),
        resource_type: reward,
        received,
        value,
        ordered_slots: slots,
        ..Default::default()
    }
}

pub(crate) fn constellation(index: u32, challenges: Vec<Challenge>) -> Constellation {
    Constellation {
        name: format!("constellation-{index}"),
        index: Some(index),
        challenges,
    }
}
