//! Agent lifecycle as a pure transition function.
//!
//! The runner performs the side effects of each state and reports what
//! happened as an [`AgentEvent`]; [`transition`] decides where to go next.

use std::time::Duration;

use crate::pacing::{CYCLE_FAILURE_BACKOFF_SECS, jitter};

/// Fixed wait before retrying egress after no proxy could be found.
pub const PROXY_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentState {
    Init,
    Authenticating,
    Running,
    /// Waiting for a usable proxy. `authenticated` says whether a login has
    /// already gone through, which decides where the wait resumes.
    AwaitingProxy { authenticated: bool },
    Sleeping(Duration),
    Failed(String),
}

impl AgentState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticating => "authenticating",
            Self::Running => "running",
            Self::AwaitingProxy { .. } => "awaiting_proxy",
            Self::Sleeping(_) => "sleeping",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    ConfigValidated,
    ConfigRejected { reason: String },
    Authenticated,
    AuthFailed { reason: String },
    EgressUnavailable,
    CycleCompleted { sleep: Duration },
    CycleFailed { backoff: Duration },
    ProxyWaitElapsed,
    SleepElapsed,
    /// Unrecoverable error outside the normal flow.
    Fatal { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from} on {event}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: String,
}

pub fn transition(current: &AgentState, event: &AgentEvent) -> Result<AgentState, TransitionError> {
    match (current, event) {
        (AgentState::Init, AgentEvent::ConfigValidated) => Ok(AgentState::Authenticating),
        (AgentState::Init, AgentEvent::ConfigRejected { reason }) => {
            Ok(AgentState::Failed(reason.clone()))
        }
        (AgentState::Authenticating, AgentEvent::Authenticated) => Ok(AgentState::Running),
        // No login leaves the host without a working proxy.
        (AgentState::Authenticating, AgentEvent::EgressUnavailable) => {
            Ok(AgentState::AwaitingProxy {
                authenticated: false,
            })
        }
        // Re-authentication happens while running, so a failure there is fatal too.
        (AgentState::Authenticating | AgentState::Running, AgentEvent::AuthFailed { reason }) => {
            Ok(AgentState::Failed(reason.clone()))
        }
        (AgentState::Running, AgentEvent::EgressUnavailable) => Ok(AgentState::AwaitingProxy {
            authenticated: true,
        }),
        (AgentState::Running, AgentEvent::CycleCompleted { sleep }) => {
            Ok(AgentState::Sleeping(*sleep))
        }
        (AgentState::Running, AgentEvent::CycleFailed { backoff }) => {
            Ok(AgentState::Sleeping(*backoff))
        }
        (AgentState::AwaitingProxy { authenticated }, AgentEvent::ProxyWaitElapsed) => {
            if *authenticated {
                Ok(AgentState::Running)
            } else {
                Ok(AgentState::Authenticating)
            }
        }
        (AgentState::Sleeping(_), AgentEvent::SleepElapsed) => Ok(AgentState::Running),
        (state, AgentEvent::Fatal { reason }) if !state.is_terminal() => {
            Ok(AgentState::Failed(reason.clone()))
        }
        _ => Err(TransitionError {
            from: current.name(),
            event: format!("{event:?}"),
        }),
    }
}

/// Randomized sleep after a cycle failed for an unclassified reason.
pub fn failure_backoff() -> Duration {
    jitter(CYCLE_FAILURE_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = transition(&AgentState::Init, &AgentEvent::ConfigValidated).unwrap();
        assert_eq!(state, AgentState::Authenticating);
        let state = transition(&state, &AgentEvent::Authenticated).unwrap();
        assert_eq!(state, AgentState::Running);

        let sleep = Duration::from_secs(900);
        let state = transition(&state, &AgentEvent::CycleCompleted { sleep }).unwrap();
        assert_eq!(state, AgentState::Sleeping(sleep));
        let state = transition(&state, &AgentEvent::SleepElapsed).unwrap();
        assert_eq!(state, AgentState::Running);
    }

    #[test]
    fn test_proxy_detour() {
        let state = transition(&AgentState::Running, &AgentEvent::EgressUnavailable).unwrap();
        assert_eq!(state, AgentState::AwaitingProxy { authenticated: true });
        let state = transition(&state, &AgentEvent::ProxyWaitElapsed).unwrap();
        assert_eq!(state, AgentState::Running);
    }

    #[test]
    fn test_proxy_wait_before_login_returns_to_auth() {
        let state =
            transition(&AgentState::Authenticating, &AgentEvent::EgressUnavailable).unwrap();
        assert_eq!(state, AgentState::AwaitingProxy { authenticated: false });
        let state = transition(&state, &AgentEvent::ProxyWaitElapsed).unwrap();
        assert_eq!(state, AgentState::Authenticating);
    }

    #[test]
    fn test_cycle_failure_keeps_running() {
        let backoff = failure_backoff();
        assert!(backoff >= Duration::from_secs(60) && backoff < Duration::from_secs(120));
        let state = transition(&AgentState::Running, &AgentEvent::CycleFailed { backoff }).unwrap();
        assert_eq!(state, AgentState::Sleeping(backoff));
    }

    #[test]
    fn test_failures_are_terminal() {
        let rejected = AgentEvent::ConfigRejected {
            reason: "missing user_agent".to_string(),
        };
        let state = transition(&AgentState::Init, &rejected).unwrap();
        assert_eq!(state, AgentState::Failed("missing user_agent".to_string()));
        assert!(state.is_terminal());
        assert!(transition(&state, &AgentEvent::SleepElapsed).is_err());

        let auth = AgentEvent::AuthFailed {
            reason: "expired".to_string(),
        };
        assert!(transition(&AgentState::Authenticating, &auth).unwrap().is_terminal());
        assert!(transition(&AgentState::Running, &auth).unwrap().is_terminal());
    }

    #[test]
    fn test_fatal_from_any_live_state() {
        let fatal = AgentEvent::Fatal {
            reason: "store corrupt".to_string(),
        };
        for state in [
            AgentState::Init,
            AgentState::Authenticating,
            AgentState::Running,
            AgentState::AwaitingProxy { authenticated: true },
            AgentState::Sleeping(Duration::from_secs(1)),
        ] {
            assert!(transition(&state, &fatal).unwrap().is_terminal());
        }
        let failed = AgentState::Failed("earlier".to_string());
        assert!(transition(&failed, &fatal).is_err());
    }

    #[test]
    fn test_invalid_pairs() {
        let err = transition(&AgentState::Init, &AgentEvent::SleepElapsed).unwrap_err();
        assert_eq!(err.from, "init");
        assert!(transition(&AgentState::Sleeping(Duration::ZERO), &AgentEvent::Authenticated).is_err());
        let waiting = AgentState::AwaitingProxy { authenticated: false };
        assert!(transition(&waiting, &AgentEvent::CycleFailed { backoff: Duration::ZERO }).is_err());
        assert!(transition(&waiting, &AgentEvent::Authenticated).is_err());
    }
}
