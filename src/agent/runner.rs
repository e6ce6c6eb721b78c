//! Drives one account through its lifecycle until it fails or is cancelled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::cycle::{CycleContext, CycleMemory, run_cycle};
use crate::agent::state::{AgentEvent, AgentState, PROXY_WAIT, failure_backoff, transition};
use crate::api::{ExecutorConfig, GameClient, RequestExecutor};
use crate::auth::{LoginPayload, WebViewSource};
use crate::config::{AccountSettings, Settings};
use crate::egress::{EgressProbe, ProxyPool};
use crate::error::{AgentError, AuthError};
use crate::pacing::{Sleeper, jitter_whole};
use crate::store::AccountStore;

/// Collaborators shared by every agent in the process.
#[derive(Clone)]
pub struct AgentDeps {
    pub settings: Arc<Settings>,
    pub store: Arc<AccountStore>,
    pub webview: Arc<dyn WebViewSource>,
    pub egress: Arc<dyn EgressProbe>,
    pub proxies: Arc<ProxyPool>,
    pub sleeper: Arc<dyn Sleeper>,
}

/// Run the agent for `account` until a fatal error (`Err`) or until
/// `cancel` fires (`Ok`).
pub async fn run_agent(
    account: String,
    deps: AgentDeps,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let span = tracing::info_span!("agent", account = %account);
    Agent::new(account, deps).run(cancel).instrument(span).await
}

struct Agent {
    account: String,
    deps: AgentDeps,
    settings: AccountSettings,
    client: Option<GameClient>,
    payload: Option<LoginPayload>,
    memory: CycleMemory,
    /// The token pair was issued moments ago, so the next refresh is skipped.
    fresh_session: bool,
    failure: Option<AgentError>,
}

impl Agent {
    fn new(account: String, deps: AgentDeps) -> Self {
        Self {
            account,
            deps,
            settings: AccountSettings::default(),
            client: None,
            payload: None,
            memory: CycleMemory::default(),
            fresh_session: false,
            failure: None,
        }
    }

    async fn run(mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        let mut state = AgentState::Init;
        loop {
            if let AgentState::Failed(reason) = &state {
                tracing::error!(reason = %reason, "Agent stopped");
                return Err(self.failure.take().unwrap_or_else(|| AgentError::Fatal {
                    account: self.account.clone(),
                    reason: reason.clone(),
                }));
            }

            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(state = state.name(), "Agent cancelled");
                    return Ok(());
                }
                event = self.step(&state) => event,
            };

            let next = transition(&state, &event).map_err(|e| AgentError::Fatal {
                account: self.account.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!(from = state.name(), to = next.name(), "State changed");
            state = next;
        }
    }

    async fn step(&mut self, state: &AgentState) -> AgentEvent {
        match state {
            AgentState::Init => match self.init().await {
                Ok(()) => AgentEvent::ConfigValidated,
                Err(err) => {
                    let reason = err.to_string();
                    self.failure = Some(err);
                    AgentEvent::ConfigRejected { reason }
                }
            },
            AgentState::Authenticating => self.login_once().await,
            AgentState::Running => self.run_once().await,
            AgentState::AwaitingProxy { .. } => {
                tracing::warn!(wait_secs = PROXY_WAIT.as_secs(), "No usable proxy, waiting");
                self.deps.sleeper.sleep(PROXY_WAIT).await;
                AgentEvent::ProxyWaitElapsed
            }
            AgentState::Sleeping(duration) => {
                self.deps.sleeper.sleep(*duration).await;
                AgentEvent::SleepElapsed
            }
            AgentState::Failed(reason) => AgentEvent::Fatal {
                reason: reason.clone(),
            },
        }
    }

    fn auth_failed(&mut self, err: AgentError) -> AgentEvent {
        let reason = err.to_string();
        self.failure = Some(err);
        AgentEvent::AuthFailed { reason }
    }

    // ==================== Init ====================

    async fn init(&mut self) -> Result<(), AgentError> {
        let record = self
            .deps
            .store
            .get(&self.account)
            .await?
            .ok_or_else(|| AgentError::IncompleteConfig {
                account: self.account.clone(),
                reason: "no record in account store".to_string(),
            })?;
        if let Some(field) = record.missing_field() {
            return Err(AgentError::IncompleteConfig {
                account: self.account.clone(),
                reason: format!("missing '{field}'"),
            });
        }
        let settings = AccountSettings::load(&self.deps.settings.sessions_dir, &self.account)?;

        let process = &self.deps.settings;
        let proxy = if process.use_proxy {
            record.proxy.clone()
        } else {
            None
        };
        let config = ExecutorConfig::new(
            process.api_base_url.clone(),
            record.user_agent.clone().unwrap_or_default(),
        )
        .with_retries(process.request_retries)
        .with_timeout(process.request_timeout())
        .with_proxy(proxy);
        let executor = RequestExecutor::new(config, Arc::clone(&self.deps.sleeper))?;

        self.client = Some(GameClient::new(executor));
        self.memory = CycleMemory::new(&settings);
        self.settings = settings;

        let delay = jitter_whole((1, process.session_start_delay_secs));
        tracing::info!(delay_secs = delay.as_secs(), "Account ready, starting after delay");
        self.deps.sleeper.sleep(delay).await;
        Ok(())
    }

    // ==================== Auth ====================

    async fn login_once(&mut self) -> AgentEvent {
        match self.ensure_egress().await {
            Ok(true) => {}
            Ok(false) => return AgentEvent::EgressUnavailable,
            Err(err) => {
                tracing::warn!(error = %err, "Egress check failed before login");
                return AgentEvent::EgressUnavailable;
            }
        }
        match self.authenticate().await {
            Ok(()) => AgentEvent::Authenticated,
            Err(err) => self.auth_failed(err),
        }
    }

    async fn authenticate(&mut self) -> Result<(), AgentError> {
        let url = self.deps.webview.webview_url(&self.account).await?;
        let payload = LoginPayload::from_webview_url(&url)?;
        let client = self.client.as_mut().ok_or(AuthError::NoSession)?;
        client.login(&payload).await?;

        self.payload = Some(payload);
        self.fresh_session = true;
        tracing::info!("Logged in");
        Ok(())
    }

    async fn refresh_session(&mut self) -> Result<(), AgentError> {
        if self.fresh_session {
            self.fresh_session = false;
            return Ok(());
        }
        let (Some(client), Some(payload)) = (self.client.as_mut(), self.payload.as_ref()) else {
            return Err(AuthError::NoSession.into());
        };
        match client.refresh().await {
            Ok(()) => {
                tracing::debug!("Session refreshed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Refresh failed, logging in again");
                client.login(payload).await?;
                tracing::info!("Logged in again");
                Ok(())
            }
        }
    }

    // ==================== Running ====================

    async fn run_once(&mut self) -> AgentEvent {
        match self.ensure_egress().await {
            Ok(true) => {}
            Ok(false) => return AgentEvent::EgressUnavailable,
            Err(err) => {
                let backoff = failure_backoff();
                tracing::warn!(error = %err, backoff_secs = backoff.as_secs(), "Egress check failed");
                return AgentEvent::CycleFailed { backoff };
            }
        }
        if let Err(err) = self.refresh_session().await {
            return self.auth_failed(err);
        }

        let Some(client) = self.client.as_ref() else {
            return self.auth_failed(AuthError::NoSession.into());
        };
        let ctx = CycleContext {
            api: client,
            settings: &self.settings,
            sleeper: self.deps.sleeper.as_ref(),
            action_delay: self.deps.settings.action_delay_secs(),
            idle_sleep: self.deps.settings.idle_sleep_secs(),
        };
        match run_cycle(&ctx, &mut self.memory).await {
            Ok(report) => {
                tracing::info!(
                    sleep_secs = report.sleep.duration.as_secs(),
                    wake = ?report.sleep.reason,
                    assignments = report.assignments.len(),
                    upgrades = report.upgrades,
                    promoted = report.promoted,
                    "Cycle finished"
                );
                AgentEvent::CycleCompleted {
                    sleep: report.sleep.duration,
                }
            }
            Err(err) => {
                let backoff = failure_backoff();
                tracing::warn!(error = %err, backoff_secs = backoff.as_secs(), "Cycle failed");
                AgentEvent::CycleFailed { backoff }
            }
        }
    }

    /// Make sure traffic leaves through a working proxy, switching to a
    /// spare one when needed. `Ok(false)` means none is usable right now.
    async fn ensure_egress(&mut self) -> Result<bool, AgentError> {
        let process = Arc::clone(&self.deps.settings);
        if !process.use_proxy {
            return Ok(true);
        }
        let Some(client) = self.client.as_mut() else {
            return Err(AuthError::NoSession.into());
        };

        let current = client.proxy().map(str::to_string);
        if let Some(proxy) = current.as_deref()
            && self.deps.egress.is_reachable(proxy).await
        {
            return Ok(true);
        }
        if process.disable_proxy_replace {
            tracing::warn!(has_proxy = current.is_some(), "Egress unavailable, proxy replacement disabled");
            return Ok(false);
        }
        tracing::warn!(has_proxy = current.is_some(), "Egress unavailable, looking for a spare proxy");

        let accounts = self.deps.store.load().await?;
        let candidates =
            self.deps
                .proxies
                .candidates(&accounts, current.as_deref(), process.sessions_per_proxy);
        for candidate in candidates {
            if !self.deps.egress.is_reachable(&candidate).await {
                continue;
            }
            if let Err(err) = client.set_proxy(Some(candidate.clone())) {
                tracing::warn!(error = %err, "Spare proxy rejected");
                continue;
            }
            let stored = candidate.clone();
            self.deps
                .store
                .update(&self.account, move |record| record.proxy = Some(stored))
                .await?;
            tracing::info!("Switched to a spare proxy");
            return Ok(true);
        }
        Ok(false)
    }
}
