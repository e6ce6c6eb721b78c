//! Classification of non-success responses from the game service.
//!
//! Every failed attempt is reduced to a closed [`ErrorKind`] here, so the
//! executor and its callers branch on an enum instead of matching strings.

use serde::Deserialize;

/// Gameplay reasons the service gives for refusing an action.
///
/// These are expected during normal play and are never worth more than a
/// debug line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainCondition {
    UpgradeUnavailable,
    NoResources,
    MaxLevel,
    UnitBusy,
    ChallengeInProgress,
    RedeemLimitReached,
}

/// Message markers and the condition they map to. Both spellings of the
/// "unavailable" marker are seen in the wild.
const DOMAIN_MARKERS: [(&str, DomainCondition); 8] = [
    ("error_level_up_unavalable", DomainCondition::UpgradeUnavailable),
    ("error_level_up_unavailable", DomainCondition::UpgradeUnavailable),
    ("error_level_up_no_resources", DomainCondition::NoResources),
    ("error_star_up_no_resources", DomainCondition::NoResources),
    ("error_level_up_max_level", DomainCondition::MaxLevel),
    ("error_star_up_card_on_challenge", DomainCondition::UnitBusy),
    ("error_challenge_in_progress", DomainCondition::ChallengeInProgress),
    ("error_redeem_limit_reached", DomainCondition::RedeemLimitReached),
];

impl DomainCondition {
    /// Find a domain marker inside an error message.
    pub fn from_message(message: &str) -> Option<Self> {
        DOMAIN_MARKERS
            .iter()
            .find(|(marker, _)| message.contains(marker))
            .map(|(_, condition)| *condition)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpgradeUnavailable => "upgrade unavailable",
            Self::NoResources => "no resources",
            Self::MaxLevel => "max level",
            Self::UnitBusy => "unit busy",
            Self::ChallengeInProgress => "challenge in progress",
            Self::RedeemLimitReached => "redeem limit reached",
        }
    }
}

impl std::fmt::Display for DomainCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An HTML page from the edge proxy instead of an API answer.
    EdgeBlock,
    DomainSilent(DomainCondition),
    Maintenance,
    RateLimited,
    LockContention,
    Unauthorized,
    Forbidden,
    BadRequest,
    ServerError,
    /// Timeout or connection failure before any status was received.
    Network,
    Unexpected,
}

/// What the executor does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again after a short jitter if attempts remain.
    Retry,
    /// Give up quietly, the action does not apply right now.
    Silent(DomainCondition),
    /// Pause for a long while and give up quietly.
    Pause,
    /// Give up loudly.
    Fail,
}

impl ErrorKind {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::EdgeBlock | Self::RateLimited | Self::LockContention | Self::Network => {
                Disposition::Retry
            }
            Self::DomainSilent(condition) => Disposition::Silent(*condition),
            Self::Maintenance => Disposition::Pause,
            Self::Unauthorized
            | Self::Forbidden
            | Self::BadRequest
            | Self::ServerError
            | Self::Unexpected => Disposition::Fail,
        }
    }
}

/// Error payload the service returns alongside non-200 statuses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    #[serde(default = "default_error_name")]
    pub name: String,
    #[serde(default = "default_error_message")]
    pub message: String,
}

fn default_error_name() -> String {
    "Unknown".to_string()
}

fn default_error_message() -> String {
    "No message".to_string()
}

impl Default for ErrorBody {
    fn default() -> Self {
        Self {
            name: default_error_name(),
            message: default_error_message(),
        }
    }
}

impl ErrorBody {
    /// Decode an error body, falling back to defaults on anything unparseable.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

/// True if the body is an HTML page rather than a JSON answer.
pub fn is_edge_block(body: &str) -> bool {
    let head = body.trim_start();
    let prefix = head.get(..9).unwrap_or(head).to_ascii_lowercase();
    prefix.starts_with("<html") || prefix.starts_with("<!doctype")
}

/// Classify a non-200 response.
pub fn classify(status: u16, body: &str) -> (ErrorKind, ErrorBody) {
    if is_edge_block(body) {
        return (ErrorKind::EdgeBlock, ErrorBody::default());
    }

    let error = ErrorBody::parse(body);
    if let Some(condition) = DomainCondition::from_message(&error.message) {
        return (ErrorKind::DomainSilent(condition), error);
    }

    let message = error.message.to_lowercase();
    let kind = match status {
        418 if message.contains("maintenance mode") => ErrorKind::Maintenance,
        429 => ErrorKind::RateLimited,
        500 if message.contains("failed to acquire lock") => ErrorKind::LockContention,
        400 => ErrorKind::BadRequest,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unexpected,
    };
    (kind, error)
}
