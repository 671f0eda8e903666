// 🏛️ Semantic Layer - Attribute Registry
// One definition per canonical field, with the names each source uses for it
//
// The registry is data, not code: adding a new spreadsheet column alias or a
// new nested web path is a one-line registration, and the Normalizer never
// branches on source identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::entities::{FieldGroup, StatKind};
use crate::parser::SourceKind;

// ============================================================================
// ATTRIBUTE TARGETS
// ============================================================================

/// Where a raw value lands in the canonical record (and how it is coerced).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeTarget {
    Id,
    Name,
    Form,
    Types,
    Abilities,
    HiddenAbility,
    Stat(StatKind),
    StatTotal,
    Species,
    Height,
    Weight,
    Color,
    Shape,
    EggGroups,
    GenderRatio,
    EggCycles,
    BaseFriendship,
    CatchRate,
    BaseExperience,
    GrowthRate,
    EvYield,
    EvolutionChain,
    Appearances,
    FlavorTexts,
}

impl AttributeTarget {
    /// Field group this attribute belongs to (`None` for the id)
    pub fn group(&self) -> Option<FieldGroup> {
        use AttributeTarget::*;
        match self {
            Id => None,
            Name | Form | Types | Abilities | HiddenAbility => Some(FieldGroup::Identity),
            Stat(_) | StatTotal => Some(FieldGroup::Stats),
            Species | Height | Weight | Color | Shape => Some(FieldGroup::Physical),
            EggGroups | GenderRatio | EggCycles | BaseFriendship => Some(FieldGroup::Breeding),
            CatchRate | BaseExperience | GrowthRate | EvYield => Some(FieldGroup::Mechanics),
            EvolutionChain => Some(FieldGroup::Evolution),
            Appearances | FlavorTexts => Some(FieldGroup::Appearances),
        }
    }

    /// Multi-column attributes collect every alias ("Type 1", "Type 2");
    /// scalar attributes take the first alias present.
    pub fn collects(&self) -> bool {
        matches!(
            self,
            AttributeTarget::Types | AttributeTarget::Abilities | AttributeTarget::EggGroups
        )
    }
}

// ============================================================================
// ATTRIBUTE DEFINITION
// ============================================================================

/// AttributeDefinition - one canonical field and its per-source spellings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Canonical path (e.g., "stats.sp_attack")
    pub id: String,

    pub target: AttributeTarget,

    /// What does this attribute mean?
    pub description: String,

    /// Nested paths in web records, dot separated ("base_stats.hp")
    pub web_keys: Vec<String>,

    /// Column headers in the spreadsheet export ("Sp. Atk")
    pub sheet_keys: Vec<String>,

    /// Optional: Example raw values
    pub examples: Vec<String>,
}

impl AttributeDefinition {
    /// Create a new attribute definition
    pub fn new(id: impl Into<String>, target: AttributeTarget) -> Self {
        AttributeDefinition {
            id: id.into(),
            target,
            description: String::new(),
            web_keys: Vec::new(),
            sheet_keys: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add a web path
    pub fn web(mut self, path: impl Into<String>) -> Self {
        self.web_keys.push(path.into());
        self
    }

    /// Builder: add a spreadsheet column
    pub fn sheet(mut self, column: impl Into<String>) -> Self {
        self.sheet_keys.push(column.into());
        self
    }

    /// Builder: add example
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn keys_for(&self, source: SourceKind) -> &[String] {
        match source {
            SourceKind::Web => &self.web_keys,
            SourceKind::Spreadsheet => &self.sheet_keys,
        }
    }
}

/// Fold a key for comparison: lowercase ASCII alphanumerics only.
/// "Sp. Atk" → "spatk", "gender_ratio" → "genderratio"
pub fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

// ============================================================================
// ATTRIBUTE REGISTRY
// ============================================================================

/// AttributeRegistry - Catalog of every canonical creature field
pub struct AttributeRegistry {
    attributes: Vec<AttributeDefinition>,

    /// Folded spreadsheet column → attribute index
    sheet_index: HashMap<String, usize>,
}

impl AttributeRegistry {
    /// Create a new registry with all creature attributes
    pub fn new() -> Self {
        let mut registry = AttributeRegistry {
            attributes: Vec::new(),
            sheet_index: HashMap::new(),
        };

        registry.register_core_attributes();
        registry
    }

    fn register_core_attributes(&mut self) {
        use AttributeTarget as T;

        // ====================================================================
        // IDENTITY
        // ====================================================================

        self.register(
            AttributeDefinition::new("id", T::Id)
                .with_description("National index number, the stable creature id")
                .web("number")
                .web("pokedex_number")
                .web("id")
                .sheet("National Dex #")
                .sheet("National Dex Number")
                .with_example("#0001")
                .with_example("1"),
        );

        self.register(
            AttributeDefinition::new("identity.name", T::Name)
                .web("name")
                .sheet("Name")
                .with_example("Bulbasaur"),
        );

        self.register(AttributeDefinition::new("identity.form", T::Form).web("form").sheet("Form"));

        self.register(
            AttributeDefinition::new("identity.types", T::Types)
                .with_description("Elemental types in slot order")
                .web("types")
                .sheet("Type 1")
                .sheet("Type 2")
                .with_example("Grass, Poison"),
        );

        self.register(
            AttributeDefinition::new("identity.abilities", T::Abilities)
                .web("abilities")
                .web("abilities.regular")
                .sheet("Ability 1")
                .sheet("Ability 2"),
        );

        self.register(
            AttributeDefinition::new("identity.hidden_ability", T::HiddenAbility)
                .web("hidden_ability")
                .web("abilities.hidden")
                .sheet("Hidden Ability"),
        );

        // ====================================================================
        // STATS
        // ====================================================================

        let stat_columns: [(StatKind, &str, &[&str]); 6] = [
            (StatKind::Hp, "hp", &["HP"]),
            (StatKind::Attack, "attack", &["Attack", "Atk"]),
            (StatKind::Defense, "defense", &["Defense", "Def"]),
            (StatKind::SpAttack, "sp_attack", &["Sp. Atk", "Sp. Attack"]),
            (StatKind::SpDefense, "sp_defense", &["Sp. Def", "Sp. Defense"]),
            (StatKind::Speed, "speed", &["Speed"]),
        ];

        for (stat, key, columns) in stat_columns {
            let mut def = AttributeDefinition::new(format!("stats.{}", key), T::Stat(stat))
                .web(format!("base_stats.{}", key));
            for column in columns {
                def = def.sheet(*column);
            }
            self.register(def);
        }

        self.register(
            AttributeDefinition::new("stats.total", T::StatTotal)
                .with_description("Reported base stat total, checked against the sum")
                .web("base_stats.total")
                .sheet("BST")
                .sheet("Total"),
        );

        // ====================================================================
        // PHYSICAL
        // ====================================================================

        self.register(
            AttributeDefinition::new("physical.species", T::Species)
                .web("physical_info.species")
                .web("species")
                .sheet("Species")
                .with_example("Seed Pokémon"),
        );

        self.register(
            AttributeDefinition::new("physical.height", T::Height)
                .with_description("Height, stored in metres")
                .web("physical_info.height")
                .web("physical_info.height_metric")
                .web("physical_info.height_meters")
                .web("height")
                .sheet("Height")
                .with_example("0.7 m (2′04″)")
                .with_example("2'04\"0.7m"),
        );

        self.register(
            AttributeDefinition::new("physical.weight", T::Weight)
                .with_description("Weight, stored in kilograms")
                .web("physical_info.weight")
                .web("physical_info.weight_metric")
                .web("physical_info.weight_kilograms")
                .web("weight")
                .sheet("Weight")
                .with_example("6.9 kg (15.2 lbs)"),
        );

        self.register(
            AttributeDefinition::new("physical.color", T::Color)
                .web("physical_info.color")
                .sheet("Color"),
        );

        self.register(
            AttributeDefinition::new("physical.shape", T::Shape)
                .web("physical_info.shape")
                .sheet("Shape"),
        );

        // ====================================================================
        // BREEDING
        // ====================================================================

        self.register(
            AttributeDefinition::new("breeding.egg_groups", T::EggGroups)
                .web("breeding_info.egg_groups")
                .web("egg_groups")
                .sheet("Egg Group 1")
                .sheet("Egg Group 2")
                .sheet("Egg Groups"),
        );

        self.register(
            AttributeDefinition::new("breeding.gender_ratio", T::GenderRatio)
                .with_description("Male/female percentage split, or genderless")
                .web("breeding_info.gender_ratio")
                .web("gender_ratio")
                .sheet("Gender Ratio")
                .with_example("87.5% male, 12.5% female")
                .with_example("Genderless"),
        );

        self.register(
            AttributeDefinition::new("breeding.egg_cycles", T::EggCycles)
                .web("breeding_info.egg_cycles")
                .web("egg_cycles")
                .sheet("Egg Cycles"),
        );

        self.register(
            AttributeDefinition::new("breeding.base_friendship", T::BaseFriendship)
                .web("breeding_info.base_friendship")
                .web("base_friendship")
                .web("base_happiness")
                .sheet("Base Friendship"),
        );

        // ====================================================================
        // MECHANICS
        // ====================================================================

        self.register(
            AttributeDefinition::new("mechanics.catch_rate", T::CatchRate)
                .web("catch_rate")
                .web("game_mechanics.catch_rate")
                .sheet("Catch Rate")
                .with_example("45 (5.9%)"),
        );

        self.register(
            AttributeDefinition::new("mechanics.base_experience", T::BaseExperience)
                .web("base_exp")
                .web("game_mechanics.base_exp")
                .web("base_experience")
                .sheet("Base EXP"),
        );

        self.register(
            AttributeDefinition::new("mechanics.growth_rate", T::GrowthRate)
                .web("growth_rate")
                .web("breeding_info.growth_rate")
                .sheet("Growth Rate")
                .with_example("Medium Slow"),
        );

        self.register(
            AttributeDefinition::new("mechanics.ev_yield", T::EvYield)
                .web("ev_yield")
                .web("game_mechanics.ev_yield")
                .sheet("EV Yield")
                .with_example("1 Sp. Atk"),
        );

        // ====================================================================
        // EVOLUTION + APPEARANCES (web only; the sheet has per-game columns)
        // ====================================================================

        self.register(
            AttributeDefinition::new("evolution.chain", T::EvolutionChain)
                .web("evolution_chain")
                .web("evolution_info.chain"),
        );

        self.register(
            AttributeDefinition::new("appearances", T::Appearances)
                .web("game_appearances")
                .web("appearances"),
        );

        self.register(
            AttributeDefinition::new("appearances.flavor_text", T::FlavorTexts)
                .with_description("Dex entry text keyed by game")
                .web("dex_entries"),
        );
    }

    /// Register a new attribute
    pub fn register(&mut self, attr: AttributeDefinition) {
        let idx = self.attributes.len();
        for column in &attr.sheet_keys {
            self.sheet_index.insert(fold_key(column), idx);
        }
        self.attributes.push(attr);
    }

    /// Get attribute by canonical id
    pub fn get(&self, id: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Whether a spreadsheet column maps to a registered attribute
    pub fn is_sheet_column(&self, column: &str) -> bool {
        self.sheet_index.contains_key(&fold_key(column))
    }

    /// Find every raw value for an attribute in a record, in alias order
    pub fn lookup<'a>(
        &self,
        attr: &AttributeDefinition,
        source: SourceKind,
        fields: &'a Map<String, Value>,
    ) -> Vec<&'a Value> {
        let mut found = Vec::new();

        for key in attr.keys_for(source) {
            let value = match source {
                SourceKind::Web => resolve_path(fields, key),
                SourceKind::Spreadsheet => resolve_flat(fields, key),
            };

            if let Some(value) = value.filter(|v| !v.is_null()) {
                found.push(value);
                if !attr.target.collects() {
                    break;
                }
            }
        }

        found
    }

    pub fn list_all(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    pub fn count(&self) -> usize {
        self.attributes.len()
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_key<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = fields.get(key) {
        return Some(v);
    }
    let folded = fold_key(key);
    fields
        .iter()
        .find(|(k, _)| fold_key(k) == folded)
        .map(|(_, v)| v)
}

/// Walk a dot separated path through nested objects
fn resolve_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = find_key(fields, segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => find_key(map, segment)?,
            _ => return None,
        };
    }

    Some(current)
}

fn resolve_flat<'a>(fields: &'a Map<String, Value>, column: &str) -> Option<&'a Value> {
    find_key(fields, column)
}

// ============================================================================
// TESTS
// ============================================================================
