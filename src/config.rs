//! Configuration.
//!
//! Process-wide [`Settings`] come from CLI flags with environment fallbacks
//! (a `.env` file is loaded first). Each account may override its gameplay
//! knobs with `<sessions_dir>/<account>.toml`; the result is frozen into an
//! [`AccountSettings`] when the agent starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::api::executor::{DEFAULT_API_BASE, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::api::types::ResourceKind;
use crate::error::ConfigError;

const DEFAULT_SLEEP_MIN_SECS: u64 = 600;
const DEFAULT_SLEEP_MAX_SECS: u64 = 3600;
const DEFAULT_ACTION_DELAY_MIN_SECS: u64 = 2;
const DEFAULT_ACTION_DELAY_MAX_SECS: u64 = 5;
const DEFAULT_SESSION_START_DELAY_SECS: u64 = 360;
const DEFAULT_SESSIONS_PER_PROXY: usize = 1;
const DEFAULT_GEMS_SAFE_BALANCE: u64 = 100_000;

// ==================== Process settings ====================

/// Settings shared by every agent in the process.
#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// Base URL of the game API
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE)]
    pub api_base_url: String,

    /// Attempts per request before giving up
    #[arg(long, env = "REQUEST_RETRIES", default_value_t = DEFAULT_RETRIES)]
    pub request_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Lower bound of the idle sleep between cycles, in seconds
    #[arg(long, env = "SLEEP_MIN", default_value_t = DEFAULT_SLEEP_MIN_SECS)]
    pub sleep_min_secs: u64,

    /// Upper bound of the idle sleep between cycles, in seconds
    #[arg(long, env = "SLEEP_MAX", default_value_t = DEFAULT_SLEEP_MAX_SECS)]
    pub sleep_max_secs: u64,

    /// Lower bound of the pause between actions, in seconds
    #[arg(long, env = "ACTION_DELAY_MIN", default_value_t = DEFAULT_ACTION_DELAY_MIN_SECS)]
    pub action_delay_min_secs: u64,

    /// Upper bound of the pause between actions, in seconds
    #[arg(long, env = "ACTION_DELAY_MAX", default_value_t = DEFAULT_ACTION_DELAY_MAX_SECS)]
    pub action_delay_max_secs: u64,

    /// Agents start after a random delay up to this many seconds
    #[arg(long, env = "SESSION_START_DELAY", default_value_t = DEFAULT_SESSION_START_DELAY_SECS)]
    pub session_start_delay_secs: u64,

    /// Require a working proxy for every account
    #[arg(long, env = "USE_PROXY", default_value_t = true, action = clap::ArgAction::Set)]
    pub use_proxy: bool,

    /// Keep the stored proxy and wait when it stops working instead of
    /// moving the account to a spare one
    #[arg(long, env = "DISABLE_PROXY_REPLACE", default_value_t = false, action = clap::ArgAction::Set)]
    pub disable_proxy_replace: bool,

    /// How many accounts may share one proxy
    #[arg(long, env = "SESSIONS_PER_PROXY", default_value_t = DEFAULT_SESSIONS_PER_PROXY)]
    pub sessions_per_proxy: usize,

    /// Shared account store
    #[arg(long, env = "ACCOUNTS_CONFIG", default_value = "accounts_config.json")]
    pub accounts_config: PathBuf,

    /// Directory with web-view handoff files and per-account overrides
    #[arg(long, env = "SESSIONS_DIR", default_value = "sessions")]
    pub sessions_dir: PathBuf,

    /// Proxy pool, one URL per line
    #[arg(long, env = "PROXIES_PATH", default_value = "proxies.txt")]
    pub proxies_path: PathBuf,

    /// Accounts that are never started
    #[arg(long, env = "BLACKLISTED_SESSIONS", value_delimiter = ',')]
    pub blacklisted_sessions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            request_retries: DEFAULT_RETRIES,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            sleep_min_secs: DEFAULT_SLEEP_MIN_SECS,
            sleep_max_secs: DEFAULT_SLEEP_MAX_SECS,
            action_delay_min_secs: DEFAULT_ACTION_DELAY_MIN_SECS,
            action_delay_max_secs: DEFAULT_ACTION_DELAY_MAX_SECS,
            session_start_delay_secs: DEFAULT_SESSION_START_DELAY_SECS,
            use_proxy: true,
            disable_proxy_replace: false,
            sessions_per_proxy: DEFAULT_SESSIONS_PER_PROXY,
            accounts_config: PathBuf::from("accounts_config.json"),
            sessions_dir: PathBuf::from("sessions"),
            proxies_path: PathBuf::from("proxies.txt"),
            blacklisted_sessions: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_retries == 0 {
            return Err(ConfigError::Invalid {
                name: "REQUEST_RETRIES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sessions_per_proxy == 0 {
            return Err(ConfigError::Invalid {
                name: "SESSIONS_PER_PROXY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        check_range("SLEEP", self.sleep_min_secs, self.sleep_max_secs)?;
        check_range(
            "ACTION_DELAY",
            self.action_delay_min_secs,
            self.action_delay_max_secs,
        )?;
        Ok(())
    }

    pub fn idle_sleep_secs(&self) -> (u64, u64) {
        (self.sleep_min_secs, self.sleep_max_secs)
    }

    pub fn action_delay_secs(&self) -> (u64, u64) {
        (self.action_delay_min_secs, self.action_delay_max_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_blacklisted(&self, account: &str) -> bool {
        self.blacklisted_sessions.iter().any(|b| b.trim() == account)
    }
}

fn check_range(name: &'static str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedRange { name, min, max });
    }
    Ok(())
}

// ==================== Per-account settings ====================

/// Rank of each farmable resource for one elite tier; 1 is most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityTable {
    pub green_stones: u32,
    pub purple_stones: u32,
    pub gold: u32,
    pub gacha: u32,
    pub points: u32,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            green_stones: 1,
            purple_stones: 2,
            gold: 3,
            gacha: 4,
            points: 5,
        }
    }
}

impl PriorityTable {
    /// Rank for a resource kind. Kinds without a rank sort last.
    pub fn rank(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::GreenStones => self.green_stones,
            ResourceKind::PurpleStones => self.purple_stones,
            ResourceKind::Gold => self.gold,
            ResourceKind::Gacha => self.gacha,
            ResourceKind::Points => self.points,
            _ => u32::MAX,
        }
    }

    fn ranks(&self) -> [(&'static str, u32); 5] {
        [
            ("green_stones", self.green_stones),
            ("purple_stones", self.purple_stones),
            ("gold", self.gold),
            ("gacha", self.gacha),
            ("points", self.points),
        ]
    }
}

/// Ranks given in an override file. Unset keys keep the tier's built-in rank.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct PriorityOverride {
    green_stones: Option<u32>,
    purple_stones: Option<u32>,
    gold: Option<u32>,
    gacha: Option<u32>,
    points: Option<u32>,
}

impl PriorityOverride {
    fn apply(self, base: PriorityTable) -> PriorityTable {
        PriorityTable {
            green_stones: self.green_stones.unwrap_or(base.green_stones),
            purple_stones: self.purple_stones.unwrap_or(base.purple_stones),
            gold: self.gold.unwrap_or(base.gold),
            gacha: self.gacha.unwrap_or(base.gacha),
            points: self.points.unwrap_or(base.points),
        }
    }
}

/// Which challenge rewards are worth farming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FarmToggles {
    pub green_stones: bool,
    pub purple_stones: bool,
    pub gold: bool,
    pub gacha: bool,
    pub points: bool,
}

impl Default for FarmToggles {
    fn default() -> Self {
        Self {
            green_stones: true,
            purple_stones: true,
            gold: true,
            gacha: true,
            points: true,
        }
    }
}

impl FarmToggles {
    pub fn enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::GreenStones => self.green_stones,
            ResourceKind::PurpleStones => self.purple_stones,
            ResourceKind::Gold => self.gold,
            ResourceKind::Gacha => self.gacha,
            ResourceKind::Points => self.points,
            _ => false,
        }
    }
}

/// One elite tier: the designated unit and how it is upgraded and farmed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTier")]
pub struct TierConfig {
    pub name: String,
    pub unit_type: String,
    /// Upgrades stop once the unit reaches this level.
    pub level_ceiling: u32,
    /// Upgrade attempts per cycle.
    pub upgrade_budget: u32,
    pub priorities: PriorityTable,
    /// Replaces the account-wide farm toggles for this tier.
    pub farm: Option<FarmToggles>,
}

#[derive(Deserialize)]
struct RawTier {
    name: String,
    unit_type: String,
    level_ceiling: u32,
    upgrade_budget: u32,
    #[serde(default)]
    priorities: PriorityOverride,
    #[serde(default)]
    farm: Option<FarmToggles>,
}

impl From<RawTier> for TierConfig {
    fn from(raw: RawTier) -> Self {
        let base = TierConfig::builtin(&raw.unit_type, &raw.name)
            .map(|tier| tier.priorities)
            .unwrap_or_default();
        Self {
            priorities: raw.priorities.apply(base),
            name: raw.name,
            unit_type: raw.unit_type,
            level_ceiling: raw.level_ceiling,
            upgrade_budget: raw.upgrade_budget,
            farm: raw.farm,
        }
    }
}

impl TierConfig {
    /// Built-in tier matching a unit type, or failing that a tier name.
    fn builtin(unit_type: &str, name: &str) -> Option<Self> {
        let tiers = [Self::bonk(), Self::dragon()];
        let by_unit = tiers.iter().find(|tier| tier.unit_type == unit_type);
        by_unit
            .or_else(|| tiers.iter().find(|tier| tier.name == name))
            .cloned()
    }

    pub fn bonk() -> Self {
        Self {
            name: "bonk".to_string(),
            unit_type: "bonk".to_string(),
            level_ceiling: 50,
            upgrade_budget: 5,
            priorities: PriorityTable {
                green_stones: 3,
                purple_stones: 4,
                gold: 1,
                gacha: 2,
                points: 5,
            },
            farm: None,
        }
    }

    pub fn dragon() -> Self {
        Self {
            name: "dragon".to_string(),
            unit_type: "dragonEpic".to_string(),
            level_ceiling: 40,
            upgrade_budget: 3,
            priorities: PriorityTable {
                green_stones: 2,
                purple_stones: 1,
                gold: 3,
                gacha: 4,
                points: 5,
            },
            farm: None,
        }
    }
}

/// Gameplay knobs for one account. Immutable once the agent starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub buy_gacha_packs: bool,
    pub spend_gachas: bool,
    /// Gems below this balance are never spent.
    pub gems_safe_balance: u64,
    pub process_missions: bool,
    /// Promote any unit whose cards cover its next star.
    pub upgrade_cards: bool,
    pub redeem_code: Option<String>,
    /// First constellation page to scan; the service's hint is used when unset.
    pub constellation_start_index: Option<u32>,
    pub farm: FarmToggles,
    /// Elite tiers in scheduling order.
    pub tiers: Vec<TierConfig>,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            buy_gacha_packs: false,
            spend_gachas: false,
            gems_safe_balance: DEFAULT_GEMS_SAFE_BALANCE,
            process_missions: false,
            upgrade_cards: true,
            redeem_code: None,
            constellation_start_index: None,
            farm: FarmToggles::default(),
            tiers: vec![TierConfig::bonk(), TierConfig::dragon()],
        }
    }
}

impl AccountSettings {
    /// Load `<dir>/<account>.toml`, or defaults when there is no override.
    pub fn load(dir: &Path, account: &str) -> Result<Self, ConfigError> {
        let path = dir.join(format!("{account}.toml"));
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse { path, reason },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for tier in &self.tiers {
            if tier.unit_type.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name: format!("tiers.{}.unit_type", tier.name),
                    reason: "must not be empty".to_string(),
                });
            }
            for (kind, rank) in tier.priorities.ranks() {
                if rank == 0 {
                    return Err(ConfigError::Invalid {
                        name: format!("tiers.{}.priorities.{kind}", tier.name),
                        reason: "ranks start at 1".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Farm toggles in effect for a tier.
    pub fn farm_for<'a>(&'a self, tier: &'a TierConfig) -> &'a FarmToggles {
        tier.farm.as_ref().unwrap_or(&self.farm)
    }
}
