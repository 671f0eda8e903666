// 🐾 Creature Entity - Stable identity + field groups
//
// Identity: national dex number (never changes, 1..=N, contiguous)
// Values:   six field groups + per-game appearances, merged independently
//
// "Unknown" is an explicit variant, never a sentinel number: a real zero
// stat must not be mistaken for missing data by precedence logic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// DEX NUMBER (identity)
// ============================================================================

/// National index number. Serialized as a zero-padded 4-digit string ("0001").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DexNumber(u16);

impl DexNumber {
    /// Create a dex number; zero is not a valid id.
    pub fn new(n: u16) -> Option<Self> {
        if n == 0 {
            None
        } else {
            Some(DexNumber(n))
        }
    }

    /// Parse the loose forms adapters produce: "#0001", "0001", "1", "1.0"
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().trim_start_matches('#').trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        digits.parse::<u16>().ok().and_then(DexNumber::new)
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Zero-padded key used by the persisted store
    pub fn padded(self) -> String {
        format!("{:04}", self.0)
    }
}

impl fmt::Display for DexNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl Serialize for DexNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.padded())
    }
}

impl<'de> Deserialize<'de> for DexNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        let parsed = match Repr::deserialize(deserializer)? {
            Repr::Text(text) => DexNumber::parse(&text),
            Repr::Number(n) => u16::try_from(n).ok().and_then(DexNumber::new),
        };

        parsed.ok_or_else(|| serde::de::Error::custom("invalid dex number"))
    }
}

// ============================================================================
// KNOWN<T> (tagged optional for numerics)
// ============================================================================

/// A value that is either known or explicitly unknown.
///
/// Persisted as the plain value or `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "Option<T>",
    into = "Option<T>",
    bound(serialize = "T: Serialize + Clone", deserialize = "T: Deserialize<'de>")
)]
pub enum Known<T> {
    Unknown,
    Value(T),
}

impl<T> Default for Known<T> {
    fn default() -> Self {
        Known::Unknown
    }
}

impl<T> From<Option<T>> for Known<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Known::Value(v),
            None => Known::Unknown,
        }
    }
}

impl<T> From<Known<T>> for Option<T> {
    fn from(value: Known<T>) -> Self {
        match value {
            Known::Value(v) => Some(v),
            Known::Unknown => None,
        }
    }
}

impl<T> Known<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Known::Value(_))
    }

    pub fn is_unknown(&self) -> bool {
        !self.is_known()
    }

    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Known::Value(v) => Some(v),
            Known::Unknown => None,
        }
    }
}

impl<T: Clone> Known<T> {
    /// Keep self when known, otherwise take the fallback
    pub fn or_from(self, fallback: &Known<T>) -> Known<T> {
        match self {
            Known::Value(_) => self,
            Known::Unknown => fallback.clone(),
        }
    }
}

impl<T: Copy> Known<T> {
    pub fn get(&self) -> Option<T> {
        match self {
            Known::Value(v) => Some(*v),
            Known::Unknown => None,
        }
    }
}

// ============================================================================
// FIELD GROUPS
// ============================================================================

/// The atomic unit of merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Identity,
    Stats,
    Physical,
    Breeding,
    Mechanics,
    Evolution,
    Appearances,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 7] = [
        FieldGroup::Identity,
        FieldGroup::Stats,
        FieldGroup::Physical,
        FieldGroup::Breeding,
        FieldGroup::Mechanics,
        FieldGroup::Evolution,
        FieldGroup::Appearances,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FieldGroup::Identity => "identity",
            FieldGroup::Stats => "stats",
            FieldGroup::Physical => "physical",
            FieldGroup::Breeding => "breeding",
            FieldGroup::Mechanics => "mechanics",
            FieldGroup::Evolution => "evolution",
            FieldGroup::Appearances => "appearances",
        }
    }

    /// Structural groups cannot be resolved by keeping one scalar value;
    /// equal-rank disagreement on them aborts the run.
    pub fn is_structural(&self) -> bool {
        matches!(self, FieldGroup::Evolution)
    }
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behaviour shared by every mergeable field group.
pub trait GroupValue: Clone + PartialEq + Serialize {
    /// True when the group carries no usable data at all
    fn is_empty(&self) -> bool;

    /// Fill the unknown parts of `self` from `fallback` (never regress to emptiness)
    fn backfill(self, fallback: &Self) -> Self;
}

fn backfill_text(value: Option<String>, fallback: &Option<String>) -> Option<String> {
    value.or_else(|| fallback.clone())
}

fn backfill_list(value: Vec<String>, fallback: &[String]) -> Vec<String> {
    if value.is_empty() {
        fallback.to_vec()
    } else {
        value
    }
}

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,

    #[serde(default)]
    pub types: Vec<String>,

    #[serde(default)]
    pub abilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_ability: Option<String>,
}

impl Identity {
    /// Every ability name this creature references
    pub fn all_abilities(&self) -> impl Iterator<Item = &String> {
        self.abilities.iter().chain(self.hidden_ability.iter())
    }
}

impl GroupValue for Identity {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.form.is_none()
            && self.types.is_empty()
            && self.abilities.is_empty()
            && self.hidden_ability.is_none()
    }

    fn backfill(self, fallback: &Self) -> Self {
        Identity {
            name: backfill_text(self.name, &fallback.name),
            form: backfill_text(self.form, &fallback.form),
            types: backfill_list(self.types, &fallback.types),
            abilities: backfill_list(self.abilities, &fallback.abilities),
            hidden_ability: backfill_text(self.hidden_ability, &fallback.hidden_ability),
        }
    }
}

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Hp,
    Attack,
    Defense,
    SpAttack,
    SpDefense,
    Speed,
}

impl StatKind {
    pub const ALL: [StatKind; 6] = [
        StatKind::Hp,
        StatKind::Attack,
        StatKind::Defense,
        StatKind::SpAttack,
        StatKind::SpDefense,
        StatKind::Speed,
    ];

    /// Recognise the labels both sources use ("Sp. Atk", "Special Attack", "HP")
    pub fn from_label(label: &str) -> Option<StatKind> {
        let folded: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match folded.as_str() {
            "hp" => Some(StatKind::Hp),
            "attack" | "atk" => Some(StatKind::Attack),
            "defense" | "def" => Some(StatKind::Defense),
            "spatk" | "spattack" | "specialattack" => Some(StatKind::SpAttack),
            "spdef" | "spdefense" | "specialdefense" => Some(StatKind::SpDefense),
            "speed" | "spe" | "spd" => Some(StatKind::Speed),
            _ => None,
        }
    }
}

/// Fixed-size base stat vector with a derived total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    #[serde(default)]
    pub hp: Known<u16>,
    #[serde(default)]
    pub attack: Known<u16>,
    #[serde(default)]
    pub defense: Known<u16>,
    #[serde(default)]
    pub sp_attack: Known<u16>,
    #[serde(default)]
    pub sp_defense: Known<u16>,
    #[serde(default)]
    pub speed: Known<u16>,
    #[serde(default)]
    pub total: Known<u16>,
}

impl BaseStats {
    pub fn get(&self, stat: StatKind) -> Known<u16> {
        match stat {
            StatKind::Hp => self.hp,
            StatKind::Attack => self.attack,
            StatKind::Defense => self.defense,
            StatKind::SpAttack => self.sp_attack,
            StatKind::SpDefense => self.sp_defense,
            StatKind::Speed => self.speed,
        }
    }

    pub fn set(&mut self, stat: StatKind, value: Known<u16>) {
        match stat {
            StatKind::Hp => self.hp = value,
            StatKind::Attack => self.attack = value,
            StatKind::Defense => self.defense = value,
            StatKind::SpAttack => self.sp_attack = value,
            StatKind::SpDefense => self.sp_defense = value,
            StatKind::Speed => self.speed = value,
        }
    }

    /// Sum of the six stats, `None` while any of them is unknown
    pub fn computed_total(&self) -> Option<u16> {
        StatKind::ALL
            .iter()
            .map(|s| self.get(*s).get())
            .sum::<Option<u16>>()
    }

    /// Replace `total` with the computed sum when all six stats are known
    pub fn with_derived_total(mut self) -> Self {
        if let Some(total) = self.computed_total() {
            self.total = Known::Value(total);
        }
        self
    }
}

impl GroupValue for BaseStats {
    fn is_empty(&self) -> bool {
        StatKind::ALL.iter().all(|s| self.get(*s).is_unknown()) && self.total.is_unknown()
    }

    fn backfill(self, fallback: &Self) -> Self {
        let mut merged = self;
        for stat in StatKind::ALL {
            merged.set(stat, self.get(stat).or_from(&fallback.get(stat)));
        }
        merged.total = self.total.or_from(&fallback.total);
        merged.with_derived_total()
    }
}

// ----------------------------------------------------------------------------
// Physical
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(rename = "m")]
    Meter,
    #[serde(rename = "kg")]
    Kilogram,
}

/// A value + unit pair, always stored in metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub value: f64,
    pub unit: Unit,
}

impl Measure {
    pub fn meters(value: f64) -> Self {
        Measure {
            value,
            unit: Unit::Meter,
        }
    }

    pub fn kilograms(value: f64) -> Self {
        Measure {
            value,
            unit: Unit::Kilogram,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Physical {
    pub species: Option<String>,
    pub height: Option<Measure>,
    pub weight: Option<Measure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
}

impl GroupValue for Physical {
    fn is_empty(&self) -> bool {
        self.species.is_none()
            && self.height.is_none()
            && self.weight.is_none()
            && self.color.is_none()
            && self.shape.is_none()
    }

    fn backfill(self, fallback: &Self) -> Self {
        Physical {
            species: backfill_text(self.species, &fallback.species),
            height: self.height.or(fallback.height),
            weight: self.weight.or(fallback.weight),
            color: backfill_text(self.color, &fallback.color),
            shape: backfill_text(self.shape, &fallback.shape),
        }
    }
}

// ----------------------------------------------------------------------------
// Breeding
// ----------------------------------------------------------------------------

/// Male/female split summing to 100, or the "none" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenderRatio {
    Ratio { male: f64, female: f64 },
    Genderless,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breeding {
    #[serde(default)]
    pub egg_groups: Vec<String>,
    pub gender_ratio: Option<GenderRatio>,
    #[serde(default)]
    pub egg_cycles: Known<u16>,
    #[serde(default)]
    pub base_friendship: Known<u16>,
}

impl GroupValue for Breeding {
    fn is_empty(&self) -> bool {
        self.egg_groups.is_empty()
            && self.gender_ratio.is_none()
            && self.egg_cycles.is_unknown()
            && self.base_friendship.is_unknown()
    }

    fn backfill(self, fallback: &Self) -> Self {
        Breeding {
            egg_groups: backfill_list(self.egg_groups, &fallback.egg_groups),
            gender_ratio: self.gender_ratio.or(fallback.gender_ratio),
            egg_cycles: self.egg_cycles.or_from(&fallback.egg_cycles),
            base_friendship: self.base_friendship.or_from(&fallback.base_friendship),
        }
    }
}

// ----------------------------------------------------------------------------
// Mechanics
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvPoint {
    pub stat: StatKind,
    pub points: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mechanics {
    #[serde(default)]
    pub catch_rate: Known<u16>,
    #[serde(default)]
    pub base_experience: Known<u16>,
    pub growth_rate: Option<String>,
    #[serde(default)]
    pub ev_yield: Vec<EvPoint>,
}

impl GroupValue for Mechanics {
    fn is_empty(&self) -> bool {
        self.catch_rate.is_unknown()
            && self.base_experience.is_unknown()
            && self.growth_rate.is_none()
            && self.ev_yield.is_empty()
    }

    fn backfill(self, fallback: &Self) -> Self {
        Mechanics {
            catch_rate: self.catch_rate.or_from(&fallback.catch_rate),
            base_experience: self.base_experience.or_from(&fallback.base_experience),
            growth_rate: backfill_text(self.growth_rate, &fallback.growth_rate),
            ev_yield: if self.ev_yield.is_empty() {
                fallback.ev_yield.clone()
            } else {
                self.ev_yield
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Evolution
// ----------------------------------------------------------------------------

/// One edge of an evolution chain with the condition that triggers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionEdge {
    pub from: DexNumber,
    pub to: DexNumber,
    pub trigger: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evolution {
    #[serde(default)]
    pub chain: Vec<EvolutionEdge>,
}

impl GroupValue for Evolution {
    fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    // A chain is taken whole; partial chains are not spliced together.
    fn backfill(self, fallback: &Self) -> Self {
        if self.chain.is_empty() {
            fallback.clone()
        } else {
            self
        }
    }
}

// ----------------------------------------------------------------------------
// Appearances
// ----------------------------------------------------------------------------

/// Per-game record for one creature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    #[serde(default)]
    pub regional_index: Known<u32>,
    pub available: Option<bool>,
    pub location: Option<String>,
    pub flavor_text: Option<String>,
}

impl Appearance {
    pub fn is_empty(&self) -> bool {
        self.regional_index.is_unknown()
            && self.available.is_none()
            && self.location.is_none()
            && self.flavor_text.is_none()
    }
}

// ============================================================================
// CREATURE RECORD
// ============================================================================

/// Canonical merged data for one creature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureRecord {
    pub id: DexNumber,

    #[serde(default)]
    pub identity: Identity,

    #[serde(default)]
    pub stats: BaseStats,

    #[serde(default)]
    pub physical: Physical,

    #[serde(default)]
    pub breeding: Breeding,

    #[serde(default)]
    pub mechanics: Mechanics,

    #[serde(default)]
    pub evolution: Evolution,

    #[serde(default)]
    pub appearances: BTreeMap<String, Appearance>,
}

impl CreatureRecord {
    /// An empty record that only carries its identity
    pub fn new(id: DexNumber) -> Self {
        CreatureRecord {
            id,
            identity: Identity::default(),
            stats: BaseStats::default(),
            physical: Physical::default(),
            breeding: Breeding::default(),
            mechanics: Mechanics::default(),
            evolution: Evolution::default(),
            appearances: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    /// Whether a field group carries any data on this record
    pub fn has_group(&self, group: FieldGroup) -> bool {
        match group {
            FieldGroup::Identity => !self.identity.is_empty(),
            FieldGroup::Stats => !self.stats.is_empty(),
            FieldGroup::Physical => !self.physical.is_empty(),
            FieldGroup::Breeding => !self.breeding.is_empty(),
            FieldGroup::Mechanics => !self.mechanics.is_empty(),
            FieldGroup::Evolution => !self.evolution.is_empty(),
            FieldGroup::Appearances => !self.appearances.is_empty(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dex_number_parse_loose_forms() {
        assert_eq!(DexNumber::parse("#0001").map(|d| d.get()), Some(1));
        assert_eq!(DexNumber::parse("0025").map(|d| d.get()), Some(25));
        assert_eq!(DexNumber::parse(" 150 ").map(|d| d.get()), Some(150));
        assert_eq!(DexNumber::parse("151.0").map(|d| d.get()), Some(151));
        assert!(DexNumber::parse("0").is_none());
        assert!(DexNumber::parse("bulbasaur").is_none());
        assert!(DexNumber::parse("").is_none());
    }

    #[test]
    fn test_dex_number_serializes_padded() {
        let id = DexNumber::new(7).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0007\"");
        let back: DexNumber = serde_json::from_str("\"0007\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_known_serializes_as_null() {
        let stats = BaseStats {
            hp: Known::Value(0),
            ..BaseStats::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["hp"], serde_json::json!(0));
        assert_eq!(json["attack"], serde_json::Value::Null);

        let back: BaseStats = serde_json::from_value(json).unwrap();
        assert_eq!(back.hp, Known::Value(0));
        assert!(back.attack.is_unknown());
    }

    #[test]
    fn test_zero_stat_is_not_empty() {
        let stats = BaseStats {
            speed: Known::Value(0),
            ..BaseStats::default()
        };
        assert!(!stats.is_empty());
        assert!(BaseStats::default().is_empty());
    }

    #[test]
    fn test_stats_backfill_keeps_known_and_derives_total() {
        let incoming = BaseStats {
            hp: Known::Value(45),
            attack: Known::Value(49),
            defense: Known::Value(49),
            sp_attack: Known::Value(65),
            sp_defense: Known::Value(65),
            ..BaseStats::default()
        };
        let existing = BaseStats {
            hp: Known::Value(40),
            speed: Known::Value(45),
            ..BaseStats::default()
        };

        let merged = incoming.backfill(&existing);

        assert_eq!(merged.hp, Known::Value(45));
        assert_eq!(merged.speed, Known::Value(45));
        assert_eq!(merged.total, Known::Value(318));
    }

    #[test]
    fn test_stat_kind_labels() {
        assert_eq!(StatKind::from_label("Sp. Atk"), Some(StatKind::SpAttack));
        assert_eq!(StatKind::from_label("Special Defense"), Some(StatKind::SpDefense));
        assert_eq!(StatKind::from_label("HP"), Some(StatKind::Hp));
        assert_eq!(StatKind::from_label("Luck"), None);
    }

    #[test]
    fn test_evolution_backfill_takes_whole_chain() {
        let existing = Evolution {
            chain: vec![EvolutionEdge {
                from: DexNumber::new(1).unwrap(),
                to: DexNumber::new(2).unwrap(),
                trigger: "Level 16".to_string(),
            }],
        };
        assert_eq!(Evolution::default().backfill(&existing), existing);
    }

    #[test]
    fn test_record_has_group() {
        let mut record = CreatureRecord::new(DexNumber::new(1).unwrap());
        assert!(!record.has_group(FieldGroup::Appearances));
        record
            .appearances
            .insert("Red".to_string(), Appearance::default());
        assert!(record.has_group(FieldGroup::Appearances));
    }
}
