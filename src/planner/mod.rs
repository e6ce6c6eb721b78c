//! Decision making for one poll cycle.
//!
//! The planners read fresh snapshots through [`GameApi`](crate::api::GameApi)
//! and decide what to send; none of them keep state across cycles apart
//! from the [`Commitments`] the agent clears at the start of each cycle.

pub mod scheduler;
pub mod sleep;
pub mod upgrade;

use std::collections::HashSet;

pub use scheduler::{Assignment, ChallengeScheduler};
pub use sleep::{SleepPlan, WakeReason, plan_sleep};
pub use upgrade::{UpgradeOutcome, UpgradePlanner};

/// Units and challenges already spoken for during the current cycle.
#[derive(Debug, Clone, Default)]
pub struct Commitments {
    units: HashSet<String>,
    challenges: HashSet<String>,
}

impl Commitments {
    pub fn clear(&mut self) {
        self.units.clear();
        self.challenges.clear();
    }

    pub fn commit(&mut self, unit_type: &str, challenge_type: &str) {
        self.units.insert(unit_type.to_string());
        self.challenges.insert(challenge_type.to_string());
    }

    pub fn is_unit_committed(&self, unit_type: &str) -> bool {
        self.units.contains(unit_type)
    }

    pub fn is_challenge_taken(&self, challenge_type: &str) -> bool {
        self.challenges.contains(challenge_type)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.challenges.is_empty()
    }
}
