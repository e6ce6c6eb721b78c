//! Elite unit assignment to challenge slots.
//!
//! Each cycle the scheduler walks the elite tiers in configured order and
//! places each tier's unit into the first eligible challenge, ranked by
//! constellation, reward priority, then completion. It is first-fit greedy
//! and never revisits an earlier tier's choice.

use crate::api::GameApi;
use crate::api::types::{Challenge, SlotAssignment, Unit};
use crate::config::{AccountSettings, FarmToggles, TierConfig};
use crate::error::RequestError;
use crate::planner::Commitments;

/// Constellations fetched per request.
pub const PAGE_SIZE: u32 = 10;
/// Hard stop for pagination in case the service never returns an empty page.
pub const MAX_PAGES: u32 = 50;

/// A challenge tagged with its constellation's position.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChallenge {
    pub constellation_index: u32,
    pub challenge: Challenge,
}

/// A unit placed this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub tier: String,
    pub unit_type: String,
    pub challenge_type: String,
    pub slot_id: usize,
}

/// Page through constellations starting at `start_index` until an empty page.
///
/// A failure after the first page keeps what was fetched so far.
pub async fn fetch_challenges(
    api: &dyn GameApi,
    start_index: u32,
) -> Result<Vec<IndexedChallenge>, RequestError> {
    let mut challenges = Vec::new();
    let mut offset = start_index;

    for _ in 0..MAX_PAGES {
        let page = match api.constellations(offset, PAGE_SIZE).await {
            Ok(page) => page,
            Err(err) if challenges.is_empty() => return Err(err),
            Err(err) => {
                tracing::debug!(offset, error = %err, "Stopping constellation scan early");
                break;
            }
        };
        if page.constellations.is_empty() {
            break;
        }

        let count = page.constellations.len() as u32;
        for (position, constellation) in page.constellations.into_iter().enumerate() {
            let index = constellation.index.unwrap_or(offset + position as u32);
            challenges.extend(constellation.challenges.into_iter().map(|challenge| {
                IndexedChallenge {
                    constellation_index: index,
                    challenge,
                }
            }));
        }
        offset += count;
    }

    Ok(challenges)
}

/// Farmable, unfinished challenges in the order a tier should try them.
pub fn rank_candidates<'a>(
    tier: &TierConfig,
    farm: &FarmToggles,
    challenges: &'a [IndexedChallenge],
) -> Vec<&'a IndexedChallenge> {
    let mut candidates: Vec<&IndexedChallenge> = challenges
        .iter()
        .filter(|c| farm.enabled(c.challenge.resource_type))
        .filter(|c| c.challenge.received < c.challenge.value)
        .collect();

    // Stable sort, so equal keys keep the service's order.
    candidates.sort_by(|a, b| {
        a.constellation_index
            .cmp(&b.constellation_index)
            .then_with(|| {
                tier.priorities
                    .rank(a.challenge.resource_type)
                    .cmp(&tier.priorities.rank(b.challenge.resource_type))
            })
            .then_with(|| a.challenge.completion().total_cmp(&b.challenge.completion()))
    });
    candidates
}

/// Challenges the unit may join, with the slot it would take, in try order.
pub fn eligible_slots<'a>(
    unit: &Unit,
    ranked: &[&'a IndexedChallenge],
    commitments: &Commitments,
    now_ms: i64,
) -> Vec<(&'a Challenge, usize)> {
    ranked
        .iter()
        .copied()
        .map(|c| &c.challenge)
        .filter(|c| !c.is_complete() && !commitments.is_challenge_taken(&c.challenge_type))
        .filter(|c| c.has_open_slot(now_ms) && c.admits(unit))
        .filter_map(|c| c.open_slot_for(unit, now_ms).map(|slot| (c, slot)))
        .collect()
}

/// Sends elite units to challenges.
pub struct ChallengeScheduler<'a> {
    api: &'a dyn GameApi,
    settings: &'a AccountSettings,
}

impl<'a> ChallengeScheduler<'a> {
    pub fn new(api: &'a dyn GameApi, settings: &'a AccountSettings) -> Self {
        Self { api, settings }
    }

    /// One scheduling pass over every tier.
    pub async fn run(
        &self,
        units: &[Unit],
        start_index: u32,
        commitments: &mut Commitments,
        now_ms: i64,
    ) -> Result<Vec<Assignment>, RequestError> {
        let challenges = fetch_challenges(self.api, start_index).await?;
        tracing::debug!(challenges = challenges.len(), "Fetched challenge snapshot");

        let mut assignments = Vec::new();
        for tier in &self.settings.tiers {
            if let Some(assignment) = self
                .assign_tier(tier, units, &challenges, commitments, now_ms)
                .await
            {
                assignments.push(assignment);
            }
        }
        Ok(assignments)
    }

    async fn assign_tier(
        &self,
        tier: &TierConfig,
        units: &[Unit],
        challenges: &[IndexedChallenge],
        commitments: &mut Commitments,
        now_ms: i64,
    ) -> Option<Assignment> {
        let Some(unit) = units.iter().find(|u| u.unit_type == tier.unit_type) else {
            tracing::debug!(tier = %tier.name, "Elite unit not owned");
            return None;
        };
        if !unit.is_available(now_ms) || commitments.is_unit_committed(&unit.unit_type) {
            tracing::debug!(tier = %tier.name, unlock_at = unit.unlock_at, "Elite unit busy");
            return None;
        }

        let ranked = rank_candidates(tier, self.settings.farm_for(tier), challenges);
        for (challenge, slot_id) in eligible_slots(unit, &ranked, commitments, now_ms) {
            let heroes = [SlotAssignment {
                slot_id,
                hero_type: unit.unit_type.clone(),
            }];
            match self
                .api
                .send_to_challenge(&challenge.challenge_type, &heroes)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        tier = %tier.name,
                        challenge = %challenge.challenge_type,
                        reward = %challenge.resource_type,
                        slot = slot_id,
                        "Sent unit to challenge"
                    );
                    commitments.commit(&unit.unit_type, &challenge.challenge_type);
                    return Some(Assignment {
                        tier: tier.name.clone(),
                        unit_type: unit.unit_type.clone(),
                        challenge_type: challenge.challenge_type.clone(),
                        slot_id,
                    });
                }
                Err(err) if err.is_silent() => {
                    tracing::debug!(challenge = %challenge.challenge_type, error = %err, "Challenge skipped");
                }
                Err(err) => {
                    tracing::warn!(challenge = %challenge.challenge_type, error = %err, "Challenge assignment failed");
                }
            }
        }

        tracing::debug!(tier = %tier.name, "No eligible challenge");
        None
    }
}
