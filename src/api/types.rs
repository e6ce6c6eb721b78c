//! Typed records for the game service's responses and request bodies.
//!
//! Responses are decoded once at the executor boundary. Missing fields take
//! defaults and timestamps are accepted as numbers or numeric strings, so a
//! partially filled answer still decodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Class that can fill any slot regardless of its requirement.
pub const UNIVERSAL_CLASS: &str = "universal";

/// Occupancy marker the service uses for a free slot.
const EMPTY_SLOT: &str = "empty";

// ==================== Lenient scalars ====================

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Millisecond epoch timestamp; absent or unparseable means 0.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .map(|n| n as i64)
        .unwrap_or(0))
}

/// Non-negative amount; negatives clamp to 0.
fn lenient_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .map(|n| n.max(0.0) as u64)
        .unwrap_or(0))
}

fn occupant<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty() && v != EMPTY_SLOT))
}

// ==================== Resources ====================

/// Kinds of resources the ledger tracks and challenges reward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Gold,
    Gem,
    Stars,
    GreenStones,
    PurpleStones,
    Gacha,
    Points,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Gem => "gem",
            Self::Stars => "stars",
            Self::GreenStones => "greenStones",
            Self::PurpleStones => "purpleStones",
            Self::Gacha => "gacha",
            Self::Points => "points",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAmount {
    #[serde(deserialize_with = "lenient_amount")]
    amount: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCard {
    hero_type: String,
    #[serde(deserialize_with = "lenient_amount")]
    amount: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawResources {
    gold: RawAmount,
    gem: RawAmount,
    stars: RawAmount,
    green_stones: RawAmount,
    purple_stones: RawAmount,
    gacha: RawAmount,
    points: RawAmount,
    hero_card: Vec<RawCard>,
}

/// Snapshot of an account's balances.
///
/// Replaced wholesale on every fetch; never mutated by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawResources")]
pub struct ResourceLedger {
    amounts: BTreeMap<ResourceKind, u64>,
    cards: BTreeMap<String, u64>,
}

impl From<RawResources> for ResourceLedger {
    fn from(raw: RawResources) -> Self {
        let amounts = [
            (ResourceKind::Gold, raw.gold.amount),
            (ResourceKind::Gem, raw.gem.amount),
            (ResourceKind::Stars, raw.stars.amount),
            (ResourceKind::GreenStones, raw.green_stones.amount),
            (ResourceKind::PurpleStones, raw.purple_stones.amount),
            (ResourceKind::Gacha, raw.gacha.amount),
            (ResourceKind::Points, raw.points.amount),
        ]
        .into_iter()
        .collect();

        let mut cards = BTreeMap::new();
        for card in raw.hero_card {
            *cards.entry(card.hero_type).or_insert(0) += card.amount;
        }

        Self { amounts, cards }
    }
}

impl ResourceLedger {
    pub fn amount(&self, kind: ResourceKind) -> u64 {
        self.amounts.get(&kind).copied().unwrap_or(0)
    }

    /// Cards held for a unit type.
    pub fn cards(&self, unit_type: &str) -> u64 {
        self.cards.get(unit_type).copied().unwrap_or(0)
    }

    pub fn with_amount(mut self, kind: ResourceKind, amount: u64) -> Self {
        self.amounts.insert(kind, amount);
        self
    }

    pub fn with_cards(mut self, unit_type: impl Into<String>, amount: u64) -> Self {
        self.cards.insert(unit_type.into(), amount);
        self
    }
}

// ==================== Units ====================

/// Rarity tier derived from a unit type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rarity {
    Rare,
    Epic,
    Legendary,
    Special,
}

impl Rarity {
    pub fn from_unit_type(unit_type: &str) -> Self {
        if unit_type == "bonk" {
            return Self::Special;
        }
        if unit_type.contains("Element") {
            return match unit_type.chars().last() {
                Some('3') => Self::Legendary,
                Some('2') => Self::Epic,
                _ => Self::Rare,
            };
        }
        if unit_type.ends_with("Legendary") {
            Self::Legendary
        } else if unit_type.ends_with("Epic") {
            Self::Epic
        } else {
            Self::Rare
        }
    }
}

/// An owned unit (the service calls them heroes).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Unit {
    #[serde(rename = "heroType")]
    pub unit_type: String,
    pub name: String,
    pub class: String,
    pub level: u32,
    pub stars: u32,
    #[serde(deserialize_with = "lenient_amount")]
    pub power: u64,
    /// Busy until this millisecond timestamp; 0 or past means available.
    #[serde(deserialize_with = "lenient_timestamp")]
    pub unlock_at: i64,
    #[serde(deserialize_with = "lenient_amount")]
    pub cost_level_gold: u64,
    #[serde(deserialize_with = "lenient_amount")]
    pub cost_level_green: u64,
    /// Cards needed for the next promotion.
    #[serde(deserialize_with = "lenient_amount")]
    pub cost_star: u64,
}

impl Unit {
    pub fn rarity(&self) -> Rarity {
        Rarity::from_unit_type(&self.unit_type)
    }

    pub fn is_available(&self, now_ms: i64) -> bool {
        self.unlock_at <= now_ms
    }

    /// Whether the unit may fill a slot with the given class requirement.
    pub fn fits_class(&self, required: Option<&str>) -> bool {
        match required {
            None => true,
            Some(required) => self.class == UNIVERSAL_CLASS || self.class == required,
        }
    }
}

// ==================== Player ====================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    pub is_next_daily_reward_available: bool,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub next_daily_reward_at: i64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub next_challenge_claim_date: i64,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub free_gacha_next_claim: i64,
    pub constellations_last_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Costs {
    #[serde(deserialize_with = "lenient_amount")]
    pub gacha_gem_cost: u64,
}

impl Default for Costs {
    fn default() -> Self {
        Self { gacha_gem_cost: 500 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Player {
    pub meta: Meta,
    pub resources: ResourceLedger,
    #[serde(rename = "heroes")]
    pub units: Vec<Unit>,
    pub costs: Costs,
}

impl Player {
    pub fn unit(&self, unit_type: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.unit_type == unit_type)
    }
}

/// Answer of `getUserData`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub player: Player,
}

// ==================== Constellations ====================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slot {
    /// Required class, `None` when any unit may fill it.
    pub hero_class: Option<String>,
    pub unlocked: bool,
    #[serde(deserialize_with = "occupant")]
    pub occupied_by: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub unlock_at: i64,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            hero_class: None,
            unlocked: true,
            occupied_by: None,
            unlock_at: 0,
        }
    }
}

impl Slot {
    pub fn is_open(&self, now_ms: i64) -> bool {
        self.unlocked && self.occupied_by.is_none() && self.unlock_at <= now_ms
    }

    pub fn required_class(&self) -> Option<&str> {
        self.hero_class.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Challenge {
    pub name: String,
    pub challenge_type: String,
    pub resource_type: ResourceKind,
    #[serde(deserialize_with = "lenient_amount")]
    pub value: u64,
    #[serde(deserialize_with = "lenient_amount")]
    pub received: u64,
    pub min_level: u32,
    pub min_stars: u32,
    #[serde(deserialize_with = "lenient_amount")]
    pub power: u64,
    pub hero_skill: Option<String>,
    #[serde(deserialize_with = "lenient_amount")]
    pub time: u64,
    pub ordered_slots: Vec<Slot>,
}

impl Default for Challenge {
    fn default() -> Self {
        Self {
            name: String::new(),
            challenge_type: String::new(),
            resource_type: ResourceKind::Unknown,
            value: 0,
            received: 0,
            min_level: 1,
            min_stars: 1,
            power: 0,
            hero_skill: None,
            time: 0,
            ordered_slots: Vec::new(),
        }
    }
}

impl Challenge {
    pub fn is_complete(&self) -> bool {
        self.received >= self.value
    }

    /// Share of the reward already collected, in `[0, 1]`.
    pub fn completion(&self) -> f64 {
        if self.value == 0 {
            return 1.0;
        }
        (self.received as f64 / self.value as f64).min(1.0)
    }

    pub fn has_open_slot(&self, now_ms: i64) -> bool {
        self.ordered_slots.iter().any(|s| s.is_open(now_ms))
    }

    /// First open slot the unit can fill, by position.
    pub fn open_slot_for(&self, unit: &Unit, now_ms: i64) -> Option<usize> {
        self.ordered_slots
            .iter()
            .position(|s| s.is_open(now_ms) && unit.fits_class(s.required_class()))
    }

    pub fn admits(&self, unit: &Unit) -> bool {
        unit.level >= self.min_level && unit.stars >= self.min_stars && unit.power >= self.power
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Constellation {
    pub name: String,
    pub index: Option<u32>,
    pub challenges: Vec<Challenge>,
}

/// One page of `getConstellations`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConstellationPage {
    pub constellations: Vec<Constellation>,
}

/// Unit placed into a challenge slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    pub slot_id: usize,
    pub hero_type: String,
}

// ==================== Rewards, shop, missions ====================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReferralInfo {
    /// The service spells this field `claimAvailible`.
    #[serde(rename = "claimAvailible", alias = "claimAvailable")]
    pub claim_available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShopSlot {
    pub slot_type: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub next_claim_at: i64,
}

impl ShopSlot {
    pub fn is_free_and_due(&self, now_ms: i64) -> bool {
        self.slot_type == "free" && self.next_claim_at <= now_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Shop {
    pub shop: Vec<ShopSlot>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mission {
    pub mission_key: String,
    pub claimed: bool,
    #[serde(deserialize_with = "lenient_amount")]
    pub progress: u64,
    #[serde(deserialize_with = "lenient_amount")]
    pub condition: u64,
}

impl Default for Mission {
    fn default() -> Self {
        Self {
            mission_key: String::new(),
            claimed: false,
            progress: 0,
            condition: 1,
        }
    }
}

impl Mission {
    pub fn needs_report(&self) -> bool {
        !self.claimed && self.progress < self.condition
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MissionList {
    pub missions: Vec<Mission>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GachaReward {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Answer of `spendGacha`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GachaResult {
    pub rewards: Vec<GachaReward>,
}

/// Where the gacha spent by `spendGacha` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GachaStrategy {
    Free,
    Gacha,
    Gem,
}
