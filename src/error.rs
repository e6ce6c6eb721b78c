//! Error types for the agent crate.
//!
//! Each concern gets its own enum; the binary folds them into
//! `anyhow::Error` at the edge.

use std::path::PathBuf;

use crate::api::classify::{DomainCondition, ErrorKind};

/// Errors while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid range for {name}: min {min} is greater than max {max}")]
    InvertedRange { name: &'static str, min: u64, max: u64 },

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Errors from the shared account store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Account store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Account store {path} is not valid JSON: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Account store task failed: {0}")]
    Task(String),
}

/// Why a request did not produce a usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableCause {
    /// Transient failures used up the retry budget.
    RetriesExhausted,
    /// The service announced maintenance mode.
    Maintenance,
}

impl std::fmt::Display for UnavailableCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "retries exhausted"),
            Self::Maintenance => write!(f, "maintenance mode"),
        }
    }
}

/// Outcome of a failed remote call.
///
/// `NotApplicable` and `Unavailable` are the silent failures: callers skip
/// the action without raising. `Rejected` is a hard failure that has
/// already been logged at error level by the executor.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("{endpoint}: not applicable ({condition})")]
    NotApplicable {
        endpoint: &'static str,
        condition: DomainCondition,
    },

    #[error("{endpoint}: unavailable ({cause})")]
    Unavailable {
        endpoint: &'static str,
        cause: UnavailableCause,
    },

    #[error("{endpoint}: rejected with HTTP {status} {name}: {message}")]
    Rejected {
        endpoint: &'static str,
        status: u16,
        kind: ErrorKind,
        name: String,
        message: String,
    },

    #[error("{endpoint}: failed to decode response: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Transport(String),
}

impl RequestError {
    /// True for failures that should be skipped without any noise.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::NotApplicable { .. } | Self::Unavailable { .. })
    }

    /// The domain condition, if the service refused for a gameplay reason.
    pub fn condition(&self) -> Option<DomainCondition> {
        match self {
            Self::NotApplicable { condition, .. } => Some(*condition),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                kind: ErrorKind::Unauthorized,
                ..
            }
        )
    }
}

/// Errors during authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Web view unavailable: {0}")]
    WebView(String),

    #[error("Web view URL carries no login payload")]
    MissingPayload,

    #[error("No session to refresh")]
    NoSession,

    #[error("Login payload is not valid UTF-8 after decoding")]
    InvalidEncoding,

    #[error("Token exchange failed: {0}")]
    Exchange(#[from] RequestError),
}

/// Errors that end or interrupt an agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Account '{account}' is misconfigured: {reason}")]
    IncompleteConfig { account: String, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Agent '{account}' stopped: {reason}")]
    Fatal { account: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_variants() {
        let silent = RequestError::NotApplicable {
            endpoint: "levelUpHero",
            condition: DomainCondition::NoResources,
        };
        assert!(silent.is_silent());
        assert_eq!(silent.condition(), Some(DomainCondition::NoResources));

        let unavailable = RequestError::Unavailable {
            endpoint: "getUserData",
            cause: UnavailableCause::RetriesExhausted,
        };
        assert!(unavailable.is_silent());
        assert_eq!(unavailable.condition(), None);
    }

    #[test]
    fn test_rejected_is_loud() {
        let err = RequestError::Rejected {
            endpoint: "getUserData",
            status: 401,
            kind: ErrorKind::Unauthorized,
            name: "Unauthorized".to_string(),
            message: "token expired".to_string(),
        };
        assert!(!err.is_silent());
        assert!(err.is_unauthorized());
        assert_eq!(
            err.to_string(),
            "getUserData: rejected with HTTP 401 Unauthorized: token expired"
        );
    }
}
