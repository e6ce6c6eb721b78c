//! Retrying request executor for the game service.
//!
//! One call goes through [`RequestExecutor::execute`], which attaches the
//! standard headers and bearer token, classifies any failure with
//! [`classify`], and either retries, gives up quietly, or fails loudly.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::api::classify::{Disposition, ErrorKind, classify};
use crate::error::{RequestError, UnavailableCause};
use crate::pacing::{MAINTENANCE_PAUSE_SECS, RETRY_JITTER_SECS, Sleeper, jitter};

pub const DEFAULT_API_BASE: &str = "https://telegram-api.sleepagotchi.com/v1/tg";
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const WEBAPP_ORIGIN: &str = "https://tgcf.sleepagotchi.com";
const WEBAPP_REFERER: &str = "https://tgcf.sleepagotchi.com/";

/// Remote operations the agent knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    RefreshToken,
    UserData,
    ClaimDailyRewards,
    ReferralsInfo,
    ClaimReferralRewards,
    ClaimChallengeRewards,
    Shop,
    BuyShop,
    SpendGacha,
    Constellations,
    SendToChallenge,
    LevelUpHero,
    StarUpHero,
    Missions,
    ReportMissionEvent,
    ClaimMission,
    RedeemCode,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::RefreshToken => "refreshToken",
            Self::UserData => "getUserData",
            Self::ClaimDailyRewards => "claimDailyRewards",
            Self::ReferralsInfo => "getReferralsInfo",
            Self::ClaimReferralRewards => "claimReferralRewards",
            Self::ClaimChallengeRewards => "claimChallengesRewards",
            Self::Shop => "getShop",
            Self::BuyShop => "buyShop",
            Self::SpendGacha => "spendGacha",
            Self::Constellations => "getConstellations",
            Self::SendToChallenge => "sendToChallenge",
            Self::LevelUpHero => "levelUpHero",
            Self::StarUpHero => "starUpHero",
            Self::Missions => "getMissions",
            Self::ReportMissionEvent => "reportMissionEvent",
            Self::ClaimMission => "claimMission",
            Self::RedeemCode => "useRedeemCode",
        }
    }

    pub fn method(&self) -> reqwest::Method {
        match self {
            Self::UserData
            | Self::ClaimDailyRewards
            | Self::ClaimReferralRewards
            | Self::ClaimChallengeRewards
            | Self::Shop
            | Self::Missions => reqwest::Method::GET,
            _ => reqwest::Method::POST,
        }
    }

    /// Login and refresh carry their own credentials, never the bearer token.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Login | Self::RefreshToken)
    }
}

/// Connection settings for an executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub user_agent: String,
    pub retries: u32,
    pub timeout: Duration,
    pub proxy: Option<String>,
}

impl ExecutorConfig {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: user_agent.into(),
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            proxy: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

fn standard_headers(user_agent: &str) -> Result<HeaderMap, RequestError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ORIGIN, HeaderValue::from_static(WEBAPP_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static(WEBAPP_REFERER));
    let agent = HeaderValue::from_str(user_agent)
        .map_err(|e| RequestError::Transport(format!("invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, agent);
    Ok(headers)
}

/// Build the HTTP client for one account, optionally behind a proxy.
pub fn build_http_client(
    user_agent: &str,
    timeout: Duration,
    proxy: Option<&str>,
) -> Result<reqwest::Client, RequestError> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(standard_headers(user_agent)?);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| RequestError::Transport(format!("invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| RequestError::Transport(e.to_string()))
}

/// Executes remote calls with retry, backoff and failure classification.
pub struct RequestExecutor {
    config: ExecutorConfig,
    http: reqwest::Client,
    access_token: Option<SecretString>,
    sleeper: Arc<dyn Sleeper>,
}

impl RequestExecutor {
    pub fn new(config: ExecutorConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self, RequestError> {
        let http = build_http_client(&config.user_agent, config.timeout, config.proxy.as_deref())?;
        Ok(Self {
            config,
            http,
            access_token: None,
            sleeper,
        })
    }

    /// Retry budget, never below one attempt.
    pub fn retries(&self) -> u32 {
        self.config.retries.max(1)
    }

    pub fn proxy(&self) -> Option<&str> {
        self.config.proxy.as_deref()
    }

    /// Swap the transport for a new egress point. The access token survives.
    pub fn set_proxy(&mut self, proxy: Option<String>) -> Result<(), RequestError> {
        self.http = build_http_client(&self.config.user_agent, self.config.timeout, proxy.as_deref())?;
        self.config.proxy = proxy;
        Ok(())
    }

    pub fn set_access_token(&mut self, token: Option<SecretString>) {
        self.access_token = token;
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    async fn send_once(
        &self,
        endpoint: Endpoint,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, String), reqwest::Error> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.path()
        );
        let mut request = self.http.request(endpoint.method(), &url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if !endpoint.is_auth()
            && let Some(ref token) = self.access_token
        {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Execute one call and decode its answer.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        query: Option<&[(&str, &str)]>,
        body: Option<&serde_json::Value>,
    ) -> Result<T, RequestError> {
        let name = endpoint.path();
        let retries = self.retries();

        for attempt in 1..=retries {
            match self.send_once(endpoint, query, body).await {
                Ok((200, text)) => return decode(name, &text),
                Ok((status, text)) => {
                    let (kind, error) = classify(status, &text);
                    match kind.disposition() {
                        Disposition::Silent(condition) => {
                            tracing::debug!(
                                endpoint = name,
                                status,
                                message = %error.message,
                                "Action not applicable right now"
                            );
                            return Err(RequestError::NotApplicable {
                                endpoint: name,
                                condition,
                            });
                        }
                        Disposition::Pause => {
                            let pause = jitter(MAINTENANCE_PAUSE_SECS);
                            tracing::warn!(
                                endpoint = name,
                                status,
                                pause_secs = pause.as_secs(),
                                "Service is in maintenance mode, pausing"
                            );
                            self.sleeper.sleep(pause).await;
                            return Err(RequestError::Unavailable {
                                endpoint: name,
                                cause: UnavailableCause::Maintenance,
                            });
                        }
                        Disposition::Fail => {
                            tracing::error!(
                                endpoint = name,
                                status,
                                attempt = %format!("{attempt}/{retries}"),
                                error_name = %error.name,
                                message = %error.message,
                                "Request rejected"
                            );
                            return Err(RequestError::Rejected {
                                endpoint: name,
                                status,
                                kind,
                                name: error.name,
                                message: error.message,
                            });
                        }
                        Disposition::Retry => {
                            tracing::warn!(
                                endpoint = name,
                                status,
                                kind = ?kind,
                                attempt = %format!("{attempt}/{retries}"),
                                "Transient failure"
                            );
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = name,
                        kind = ?ErrorKind::Network,
                        attempt = %format!("{attempt}/{retries}"),
                        timeout = err.is_timeout(),
                        error = %err,
                        "Request did not complete"
                    );
                }
            }

            if attempt < retries {
                self.sleeper.sleep(jitter(RETRY_JITTER_SECS)).await;
            }
        }

        tracing::warn!(endpoint = name, retries, "Giving up after exhausting retries");
        Err(RequestError::Unavailable {
            endpoint: name,
            cause: UnavailableCause::RetriesExhausted,
        })
    }
}

fn decode<T: DeserializeOwned>(endpoint: &'static str, text: &str) -> Result<T, RequestError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| {
        tracing::error!(endpoint, error = %e, "Failed to decode response");
        RequestError::Decode {
            endpoint,
            reason: e.to_string(),
        }
    })
}
