//! Endpoint wrappers over the request executor.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::IgnoredAny;
use serde_json::json;

use crate::api::GameApi;
use crate::api::executor::{Endpoint, RequestExecutor};
use crate::api::types::{
    ConstellationPage, GachaResult, GachaStrategy, MissionList, ReferralInfo, Shop,
    SlotAssignment, UserData,
};
use crate::auth::{LoginPayload, TokenPair};
use crate::error::{AuthError, RequestError};

const REFERRALS_PAGE_SIZE: u32 = 20;

/// Authenticated client for one account.
pub struct GameClient {
    executor: RequestExecutor,
    tokens: Option<TokenPair>,
}

impl GameClient {
    pub fn new(executor: RequestExecutor) -> Self {
        Self {
            executor,
            tokens: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.executor.proxy()
    }

    /// Move to another egress point, keeping the session.
    pub fn set_proxy(&mut self, proxy: Option<String>) -> Result<(), RequestError> {
        self.executor.set_proxy(proxy)
    }

    fn install(&mut self, tokens: TokenPair) {
        let access = SecretString::from(tokens.access.expose_secret().to_string());
        self.executor.set_access_token(Some(access));
        self.tokens = Some(tokens);
    }

    /// Exchange a login payload for a fresh token pair.
    pub async fn login(&mut self, payload: &LoginPayload) -> Result<(), AuthError> {
        let query: Vec<(&str, &str)> = payload
            .pairs()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let tokens: TokenPair = self
            .executor
            .execute(Endpoint::Login, Some(&query), None)
            .await?;
        self.install(tokens);
        Ok(())
    }

    /// Trade the refresh token for a new pair.
    pub async fn refresh(&mut self) -> Result<(), AuthError> {
        let body = match self.tokens {
            Some(ref tokens) => json!({ "refreshToken": tokens.refresh.expose_secret() }),
            None => return Err(AuthError::NoSession),
        };
        let tokens: TokenPair = self
            .executor
            .execute(Endpoint::RefreshToken, None, Some(&body))
            .await?;
        self.install(tokens);
        Ok(())
    }

    async fn call(
        &self,
        endpoint: Endpoint,
        body: Option<serde_json::Value>,
    ) -> Result<(), RequestError> {
        self.executor
            .execute::<IgnoredAny>(endpoint, None, body.as_ref())
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl GameApi for GameClient {
    async fn user_data(&self) -> Result<UserData, RequestError> {
        self.executor.execute(Endpoint::UserData, None, None).await
    }

    async fn claim_daily_rewards(&self) -> Result<(), RequestError> {
        self.call(Endpoint::ClaimDailyRewards, None).await
    }

    async fn referrals_info(&self) -> Result<ReferralInfo, RequestError> {
        let body = json!({ "page": 1, "rowsPerPage": REFERRALS_PAGE_SIZE });
        self.executor
            .execute(Endpoint::ReferralsInfo, None, Some(&body))
            .await
    }

    async fn claim_referral_rewards(&self) -> Result<(), RequestError> {
        self.call(Endpoint::ClaimReferralRewards, None).await
    }

    async fn claim_challenge_rewards(&self) -> Result<(), RequestError> {
        self.call(Endpoint::ClaimChallengeRewards, None).await
    }

    async fn shop(&self) -> Result<Shop, RequestError> {
        self.executor.execute(Endpoint::Shop, None, None).await
    }

    async fn buy_shop_slot(&self, slot_type: &str) -> Result<(), RequestError> {
        self.call(Endpoint::BuyShop, Some(json!({ "slotType": slot_type })))
            .await
    }

    async fn spend_gacha(
        &self,
        amount: u32,
        strategy: GachaStrategy,
    ) -> Result<GachaResult, RequestError> {
        let body = json!({ "amount": amount, "strategy": strategy });
        self.executor
            .execute(Endpoint::SpendGacha, None, Some(&body))
            .await
    }

    async fn constellations(
        &self,
        start_index: u32,
        amount: u32,
    ) -> Result<ConstellationPage, RequestError> {
        let body = json!({ "startIndex": start_index, "amount": amount });
        self.executor
            .execute(Endpoint::Constellations, None, Some(&body))
            .await
    }

    async fn send_to_challenge(
        &self,
        challenge_type: &str,
        assignments: &[SlotAssignment],
    ) -> Result<(), RequestError> {
        let body = json!({ "challengeType": challenge_type, "heroes": assignments });
        self.call(Endpoint::SendToChallenge, Some(body)).await
    }

    async fn level_up(&self, unit_type: &str) -> Result<(), RequestError> {
        self.call(Endpoint::LevelUpHero, Some(json!({ "heroType": unit_type })))
            .await
    }

    async fn star_up(&self, unit_type: &str) -> Result<(), RequestError> {
        self.call(Endpoint::StarUpHero, Some(json!({ "heroType": unit_type })))
            .await
    }

    async fn missions(&self) -> Result<MissionList, RequestError> {
        self.executor.execute(Endpoint::Missions, None, None).await
    }

    async fn report_mission_event(&self, mission_key: &str) -> Result<(), RequestError> {
        self.call(
            Endpoint::ReportMissionEvent,
            Some(json!({ "missionKey": mission_key })),
        )
        .await
    }

    async fn claim_mission(&self, mission_key: &str) -> Result<(), RequestError> {
        self.call(Endpoint::ClaimMission, Some(json!({ "missionKey": mission_key })))
            .await
    }

    async fn redeem_code(&self, code: &str) -> Result<(), RequestError> {
        self.call(Endpoint::RedeemCode, Some(json!({ "code": code })))
            .await
    }
}
