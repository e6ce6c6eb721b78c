//! Game service access.
//!
//! - [`executor`]: retrying transport with failure classification
//! - [`classify`]: the closed error taxonomy
//! - [`types`]: typed response records
//! - [`client`]: endpoint wrappers implementing [`GameApi`]

pub mod classify;
pub mod client;
pub mod executor;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;

pub use client::GameClient;
pub use executor::{Endpoint, ExecutorConfig, RequestExecutor};
pub use types::{
    Challenge, Constellation, ConstellationPage, GachaResult, GachaStrategy, MissionList, Player,
    ReferralInfo, ResourceKind, ResourceLedger, Shop, Slot, SlotAssignment, Unit, UserData,
};

use crate::error::RequestError;

/// Gameplay operations used by the poll cycle and the planners.
///
/// Every call is one remote request; nothing is cached.
#[async_trait]
pub trait GameApi: Send + Sync {
    async fn user_data(&self) -> Result<UserData, RequestError>;

    async fn claim_daily_rewards(&self) -> Result<(), RequestError>;

    async fn referrals_info(&self) -> Result<ReferralInfo, RequestError>;

    async fn claim_referral_rewards(&self) -> Result<(), RequestError>;

    async fn claim_challenge_rewards(&self) -> Result<(), RequestError>;

    async fn shop(&self) -> Result<Shop, RequestError>;

    async fn buy_shop_slot(&self, slot_type: &str) -> Result<(), RequestError>;

    async fn spend_gacha(
        &self,
        amount: u32,
        strategy: GachaStrategy,
    ) -> Result<GachaResult, RequestError>;

    async fn constellations(
        &self,
        start_index: u32,
        amount: u32,
    ) -> Result<ConstellationPage, RequestError>;

    async fn send_to_challenge(
        &self,
        challenge_type: &str,
        assignments: &[SlotAssignment],
    ) -> Result<(), RequestError>;

    async fn level_up(&self, unit_type: &str) -> Result<(), RequestError>;

    async fn star_up(&self, unit_type: &str) -> Result<(), RequestError>;

    async fn missions(&self) -> Result<MissionList, RequestError>;

    async fn report_mission_event(&self, mission_key: &str) -> Result<(), RequestError>;

    async fn claim_mission(&self, mission_key: &str) -> Result<(), RequestError>;

    async fn redeem_code(&self, code: &str) -> Result<(), RequestError>;
}
