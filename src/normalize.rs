// 🧹 Normalizer - Raw source records → canonical creature records
// Every value coercion lives here; adapters hand over strings and nesting.
//
//   RawRecord (web | spreadsheet)
//        │  AttributeRegistry: which key feeds which canonical field
//        ▼
//   coercion (units, ratios, counts, names)
//        ▼
//   NormalizedRecord { record, issues }
//
// Strict mode aborts on the first bad field. Lenient mode leaves the field
// unknown and reports it, so the prior canonical value survives the merge.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::attributes::{fold_key, AttributeDefinition, AttributeRegistry, AttributeTarget};
use crate::entities::{
    CreatureRecord, DexNumber, EvPoint, EvolutionEdge, GenderRatio, Known, Measure, StatKind,
};
use crate::error::ValidationError;
use crate::parser::{RawRecord, SourceKind};
use crate::store::Store;

/// Highest value a single base stat can take
pub const MAX_STAT: u32 = 255;

const RATIO_TOLERANCE: f64 = 0.01;
const POUNDS_TO_KG: f64 = 0.453_592_37;
const INCH_TO_M: f64 = 0.0254;

// ============================================================================
// NAME CATALOG
// ============================================================================

/// Canonical game and ability names, looked up by folded spelling.
///
/// "pokemon red", "Pokémon Red" and "RED" all resolve to the stored "Red".
/// Names the catalog does not know pass through cleaned but unchanged, and
/// the reconciler's integrity check reports them.
#[derive(Debug, Clone, Default)]
pub struct NameCatalog {
    games: HashMap<String, String>,
    abilities: HashMap<String, String>,
}

impl NameCatalog {
    pub fn new<'a>(
        games: impl IntoIterator<Item = &'a str>,
        abilities: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        NameCatalog {
            games: games
                .into_iter()
                .map(|g| (game_key(g), g.to_string()))
                .collect(),
            abilities: abilities
                .into_iter()
                .map(|a| (fold_key(a), a.to_string()))
                .collect(),
        }
    }

    pub fn from_store(store: &Store) -> Self {
        NameCatalog::new(
            store.games.keys().map(String::as_str),
            store.abilities.keys().map(String::as_str),
        )
    }

    pub fn knows_game(&self, raw: &str) -> bool {
        self.games.contains_key(&game_key(raw))
    }

    pub fn game_name(&self, raw: &str) -> String {
        self.games
            .get(&game_key(raw))
            .cloned()
            .unwrap_or_else(|| clean_text(raw))
    }

    pub fn ability_name(&self, raw: &str) -> String {
        self.abilities
            .get(&fold_key(raw))
            .cloned()
            .unwrap_or_else(|| clean_text(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty() && self.abilities.is_empty()
    }
}

/// Game names are often prefixed with the franchise name in one source only
fn game_key(raw: &str) -> String {
    let folded = fold_key(raw);
    for prefix in ["pokemon", "pokémon"] {
        if let Some(rest) = folded.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    folded
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// Output of normalization: a canonical record plus the fields that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: SourceKind,
    pub origin: String,
    pub record: CreatureRecord,

    /// Fields left unknown in lenient mode (always empty in strict mode)
    #[serde(default)]
    pub issues: Vec<ValidationError>,
}

impl NormalizedRecord {
    pub fn id(&self) -> DexNumber {
        self.record.id
    }
}

/// Result of normalizing a whole adapter output
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,

    /// Records that could not be normalized at all (origin, reason)
    pub rejected: Vec<(String, ValidationError)>,
}

impl NormalizedBatch {
    pub fn issue_count(&self) -> usize {
        self.records.iter().map(|r| r.issues.len()).sum()
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct Normalizer {
    registry: AttributeRegistry,
    catalog: NameCatalog,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer::with_catalog(NameCatalog::default())
    }

    pub fn with_catalog(catalog: NameCatalog) -> Self {
        Normalizer {
            registry: AttributeRegistry::new(),
            catalog,
        }
    }

    pub fn catalog(&self) -> &NameCatalog {
        &self.catalog
    }

    /// Normalize one record, failing on the first field that cannot be coerced
    pub fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord, ValidationError> {
        let mut normalized = self.run(raw)?;
        if !normalized.issues.is_empty() {
            return Err(normalized.issues.remove(0));
        }
        Ok(normalized)
    }

    /// Normalize one record, leaving failing fields unknown and reporting them.
    ///
    /// A missing or invalid id still fails: without identity there is no
    /// record to attach anything to.
    pub fn normalize_lenient(&self, raw: &RawRecord) -> Result<NormalizedRecord, ValidationError> {
        self.run(raw)
    }

    /// Lenient normalization of a whole source; later duplicates of an id are rejected
    pub fn normalize_batch(&self, raws: &[RawRecord]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen = BTreeSet::new();

        for raw in raws {
            match self.normalize_lenient(raw) {
                Ok(normalized) => {
                    if !seen.insert(normalized.id()) {
                        warn!(origin = %raw.origin, id = %normalized.id(), "duplicate record for id");
                        batch.rejected.push((
                            raw.origin.clone(),
                            ValidationError::new(
                                "id",
                                normalized.id().padded(),
                                format!("duplicate record in {} source", raw.source),
                            ),
                        ));
                        continue;
                    }
                    for issue in &normalized.issues {
                        debug!(origin = %raw.origin, %issue, "field left unknown");
                    }
                    batch.records.push(normalized);
                }
                Err(err) => {
                    warn!(origin = %raw.origin, %err, "record rejected");
                    batch.rejected.push((raw.origin.clone(), err));
                }
            }
        }

        batch
    }

    fn run(&self, raw: &RawRecord) -> Result<NormalizedRecord, ValidationError> {
        let id = self.resolve_id(raw)?;
        let mut record = CreatureRecord::new(id);
        let mut issues = Vec::new();

        for attr in self.registry.list_all() {
            if attr.target == AttributeTarget::Id {
                continue;
            }
            let values = self.registry.lookup(attr, raw.source, &raw.fields);
            if values.is_empty() {
                continue;
            }
            self.apply(attr, &values, &mut record, &mut issues);
        }

        if raw.source == SourceKind::Spreadsheet {
            self.sheet_appearances(&raw.fields, &mut record, &mut issues);
        }

        check_total(&mut record, &mut issues);

        Ok(NormalizedRecord {
            source: raw.source,
            origin: raw.origin.clone(),
            record,
            issues,
        })
    }

    fn resolve_id(&self, raw: &RawRecord) -> Result<DexNumber, ValidationError> {
        let attr = self
            .registry
            .get("id")
            .ok_or_else(|| ValidationError::new("id", "", "id attribute is not registered"))?;

        let value = self
            .registry
            .lookup(attr, raw.source, &raw.fields)
            .into_iter()
            .next()
            .ok_or_else(|| ValidationError::new("id", "", "missing national dex number"))?;

        value_to_dex(value).ok_or_else(|| {
            ValidationError::new("id", raw_text(value), "not a valid national dex number")
        })
    }

    fn apply(
        &self,
        attr: &AttributeDefinition,
        values: &[&Value],
        record: &mut CreatureRecord,
        issues: &mut Vec<ValidationError>,
    ) {
        use AttributeTarget as T;

        let first = values[0];

        let result: Result<(), String> = match attr.target {
            T::Id => Ok(()),
            T::Name => optional_text(first).map(|v| record.identity.name = v),
            T::Form => optional_text(first).map(|v| record.identity.form = v),
            T::Types => {
                record.identity.types = dedupe(collect_list(values).iter().map(|t| title_case(t)));
                Ok(())
            }
            T::Abilities => {
                record.identity.abilities = dedupe(
                    collect_list(values)
                        .iter()
                        .map(|a| self.catalog.ability_name(a)),
                );
                Ok(())
            }
            T::HiddenAbility => optional_text(first)
                .map(|v| record.identity.hidden_ability = v.map(|a| self.catalog.ability_name(&a))),
            T::Stat(stat) => bounded_count(first, MAX_STAT).map(|v| record.stats.set(stat, v)),
            T::StatTotal => {
                bounded_count(first, MAX_STAT * 6).map(|v| record.stats.total = v)
            }
            T::Species => optional_text(first).map(|v| record.physical.species = v),
            T::Height => measure_text(first)
                .and_then(|t| parse_height(&t))
                .map(|v| record.physical.height = v),
            T::Weight => measure_text(first)
                .and_then(|t| parse_weight(&t))
                .map(|v| record.physical.weight = v),
            T::Color => optional_text(first).map(|v| record.physical.color = v),
            T::Shape => optional_text(first).map(|v| record.physical.shape = v),
            T::EggGroups => {
                record.breeding.egg_groups = dedupe(collect_list(values).iter().map(|g| clean_text(g)));
                Ok(())
            }
            T::GenderRatio => scalar_text(first)
                .ok_or_else(|| "expected text".to_string())
                .and_then(|t| parse_gender_ratio(&t))
                .map(|v| record.breeding.gender_ratio = v),
            T::EggCycles => bounded_count(first, u16::MAX as u32).map(|v| record.breeding.egg_cycles = v),
            T::BaseFriendship => {
                bounded_count(first, MAX_STAT).map(|v| record.breeding.base_friendship = v)
            }
            T::CatchRate => bounded_count(first, MAX_STAT).map(|v| record.mechanics.catch_rate = v),
            T::BaseExperience => {
                bounded_count(first, u16::MAX as u32).map(|v| record.mechanics.base_experience = v)
            }
            T::GrowthRate => optional_text(first).map(|v| record.mechanics.growth_rate = v),
            T::EvYield => ev_yield_value(first).map(|v| record.mechanics.ev_yield = v),
            T::EvolutionChain => parse_evolution(first).map(|v| record.evolution.chain = v),
            T::Appearances => {
                self.web_appearances(first, record, issues);
                Ok(())
            }
            T::FlavorTexts => {
                self.web_flavor_texts(first, record, issues);
                Ok(())
            }
        };

        if let Err(reason) = result {
            issues.push(ValidationError::new(&attr.id, raw_text(first), reason));
        }
    }

    // ------------------------------------------------------------------------
    // Appearances
    // ------------------------------------------------------------------------

    fn web_appearances(
        &self,
        value: &Value,
        record: &mut CreatureRecord,
        issues: &mut Vec<ValidationError>,
    ) {
        let games = match value {
            Value::Object(games) => games,
            other => {
                issues.push(ValidationError::new(
                    "appearances",
                    raw_text(other),
                    "expected an object keyed by game",
                ));
                return;
            }
        };

        for (raw_game, entry) in games {
            let game = self.catalog.game_name(raw_game);
            let field = format!("appearances.{}", game);
            let appearance = record.appearances.entry(game).or_default();

            match entry {
                Value::Object(details) => {
                    if let Some(index) = first_key(details, &["regional_index", "dex_number", "number"]) {
                        match bounded_count(index, u32::MAX) {
                            Ok(v) => appearance.regional_index = v,
                            Err(reason) => issues.push(ValidationError::new(
                                format!("{}.regional_index", field),
                                raw_text(index),
                                reason,
                            )),
                        }
                    }
                    if let Some(available) = first_key(details, &["available"]) {
                        appearance.available = scalar_text(available).and_then(|t| parse_availability(&t));
                    }
                    if let Some(location) = first_key(details, &["location", "locations"]) {
                        appearance.location = joined_text(location);
                    }
                    if let Some(text) = first_key(details, &["flavor_text", "dex_text", "entry"]) {
                        appearance.flavor_text = joined_text(text);
                    }
                }
                Value::Bool(available) => appearance.available = Some(*available),
                Value::Null => {}
                other => issues.push(ValidationError::new(
                    field,
                    raw_text(other),
                    "expected an object of appearance details",
                )),
            }

            if appearance.regional_index.is_known() && appearance.available.is_none() {
                appearance.available = Some(true);
            }
        }

    }

    fn web_flavor_texts(
        &self,
        value: &Value,
        record: &mut CreatureRecord,
        issues: &mut Vec<ValidationError>,
    ) {
        let entries = match value {
            Value::Object(entries) => entries,
            other => {
                issues.push(ValidationError::new(
                    "appearances.flavor_text",
                    raw_text(other),
                    "expected an object keyed by game",
                ));
                return;
            }
        };

        for (raw_game, text) in entries {
            if let Some(text) = joined_text(text) {
                let game = self.catalog.game_name(raw_game);
                record.appearances.entry(game).or_default().flavor_text = Some(text);
            }
        }
    }

    /// Per-game columns: "<Game> Location", "<Game> Dex Text", "<Game> Dex #"
    /// and a bare "<Game>" column when the catalog knows the game.
    fn sheet_appearances(
        &self,
        fields: &Map<String, Value>,
        record: &mut CreatureRecord,
        issues: &mut Vec<ValidationError>,
    ) {
        for (column, value) in fields {
            if column == "ref_id" || self.registry.is_sheet_column(column) {
                continue;
            }

            let (raw_game, kind) = match split_game_column(column) {
                Some(split) => split,
                None if self.catalog.knows_game(column) => (column.as_str(), GameColumn::Bare),
                None => continue,
            };

            let text = match scalar_text(value) {
                Some(text) if !is_placeholder(&text) => text,
                _ => continue,
            };

            let game = self.catalog.game_name(raw_game);
            let appearance = record.appearances.entry(game).or_default();

            match kind {
                GameColumn::Location => appearance.location = Some(clean_text(&text)),
                GameColumn::FlavorText => appearance.flavor_text = Some(clean_text(&text)),
                GameColumn::Index => match parse_count(&text) {
                    Ok(index) => appearance.regional_index = index,
                    Err(reason) => issues.push(ValidationError::new(column.clone(), text, reason)),
                },
                GameColumn::Bare => {
                    if let Some(available) = parse_availability(&text) {
                        appearance.available = Some(available);
                    } else {
                        match parse_count(&text) {
                            Ok(index) => appearance.regional_index = index,
                            Err(reason) => {
                                issues.push(ValidationError::new(column.clone(), text, reason))
                            }
                        }
                    }
                }
            }

            if appearance.regional_index.is_known() && appearance.available.is_none() {
                appearance.available = Some(true);
            }
        }

    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameColumn {
    Location,
    FlavorText,
    Index,
    Bare,
}

fn split_game_column(column: &str) -> Option<(&str, GameColumn)> {
    const SUFFIXES: [(&str, GameColumn); 6] = [
        (" location", GameColumn::Location),
        (" locations", GameColumn::Location),
        (" dex text", GameColumn::FlavorText),
        (" dex entry", GameColumn::FlavorText),
        (" dex #", GameColumn::Index),
        (" dex number", GameColumn::Index),
    ];

    for (suffix, kind) in SUFFIXES {
        if column.len() <= suffix.len() {
            continue;
        }
        let split = column.len() - suffix.len();
        if column.is_char_boundary(split) && column[split..].eq_ignore_ascii_case(suffix) {
            return Some((column[..split].trim(), kind));
        }
    }
    None
}

/// Report a supplied total that disagrees with the stat sum, then derive it
fn check_total(record: &mut CreatureRecord, issues: &mut Vec<ValidationError>) {
    if let (Some(sum), Some(reported)) = (record.stats.computed_total(), record.stats.total.get()) {
        if sum != reported {
            issues.push(ValidationError::new(
                "stats.total",
                reported.to_string(),
                format!("does not match the stat sum {}", sum),
            ));
        }
    }
    record.stats = record.stats.with_derived_total();
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // Patterns are literals; a failure here is a programming error.
    cell.get_or_init(|| Regex::new(pattern).expect("literal pattern compiles"))
}

/// Collapse internal whitespace and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Values both sources use for "no data"
pub fn is_placeholder(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "" | "-" | "—" | "–" | "?" | "n/a" | "na" | "nan" | "null" | "none" | "unknown"
    )
}

fn title_case(text: &str) -> String {
    clean_text(text)
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn dedupe(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items.filter(|i| !i.is_empty() && seen.insert(i.clone())).collect()
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn optional_text(value: &Value) -> Result<Option<String>, String> {
    match scalar_text(value) {
        Some(text) if is_placeholder(&text) => Ok(None),
        Some(text) => Ok(Some(clean_text(&text))),
        None => Err("expected text".to_string()),
    }
}

/// Text, or a list of text joined by spaces (multi-line dex entries)
fn joined_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(scalar_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => scalar_text(other)?,
    };
    if is_placeholder(&text) {
        None
    } else {
        Some(clean_text(&text))
    }
}

fn measure_text(value: &Value) -> Result<String, String> {
    scalar_text(value).ok_or_else(|| "expected a number or text".to_string())
}

fn first_key<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| map.get(*k)).find(|v| !v.is_null())
}

fn value_to_dex(value: &Value) -> Option<DexNumber> {
    match value {
        Value::String(s) => DexNumber::parse(s),
        Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                u16::try_from(i).ok().and_then(DexNumber::new)
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= u16::MAX as f64)
                    .and_then(|f| DexNumber::new(f as u16))
            }
        }
        _ => None,
    }
}

/// Split list text on commas, slashes and semicolons
pub fn split_list(text: &str) -> Vec<String> {
    text.split([',', '/', ';'])
        .map(clean_text)
        .filter(|item| !is_placeholder(item))
        .collect()
}

fn collect_list(values: &[&Value]) -> Vec<String> {
    let mut items = Vec::new();
    for value in values {
        match value {
            Value::Array(list) => items.extend(
                list.iter()
                    .filter_map(scalar_text)
                    .filter(|t| !is_placeholder(t))
                    .map(|t| clean_text(&t)),
            ),
            Value::String(text) => items.extend(split_list(text)),
            // Nested ability objects are read through their own paths
            _ => {}
        }
    }
    items
}

fn parse_availability(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "✓" | "✔" | "available" => Some(true),
        "no" | "n" | "false" | "✗" | "✘" | "x" | "unavailable" => Some(false),
        _ => None,
    }
}

// ============================================================================
// COERCIONS
// ============================================================================

/// Leading integer of a text value: "45 (5.9%)" → 45, "5,120" → 5120
pub fn parse_count(text: &str) -> Result<Known<u32>, String> {
    if is_placeholder(text) {
        return Ok(Known::Unknown);
    }

    static COUNT: OnceLock<Regex> = OnceLock::new();
    let token = text.split_whitespace().next().unwrap_or("").replace(',', "");

    let caps = compiled(&COUNT, r"^#?(\d+)(?:\.(\d+))?")
        .captures(&token)
        .ok_or_else(|| "not a number".to_string())?;

    if let Some(fraction) = caps.get(2) {
        if fraction.as_str().chars().any(|c| c != '0') {
            return Err("not a whole number".to_string());
        }
    }

    caps[1]
        .parse::<u32>()
        .map(Known::Value)
        .map_err(|_| "number out of range".to_string())
}

fn bounded_count<T: TryFrom<u32>>(value: &Value, max: u32) -> Result<Known<T>, String> {
    let text = scalar_text(value).ok_or_else(|| "expected a number".to_string())?;
    match parse_count(&text)? {
        Known::Unknown => Ok(Known::Unknown),
        Known::Value(n) if n > max => Err(format!("{} exceeds the maximum of {}", n, max)),
        Known::Value(n) => T::try_from(n)
            .map(Known::Value)
            .map_err(|_| "number out of range".to_string()),
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn positive(value: f64) -> Result<f64, String> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err("must be a positive measurement".to_string())
    }
}

/// Height in metres from "0.7 m (2′04″)", "2'04\"0.7m", "0.7m", "0.7" or "2'04\""
pub fn parse_height(text: &str) -> Result<Option<Measure>, String> {
    if is_placeholder(text) {
        return Ok(None);
    }
    if let Ok(value) = text.trim().parse::<f64>() {
        return positive(value).map(|v| Some(Measure::meters(v)));
    }

    static METRIC: OnceLock<Regex> = OnceLock::new();
    static IMPERIAL: OnceLock<Regex> = OnceLock::new();

    if let Some(caps) = compiled(&METRIC, r"(\d+(?:\.\d+)?)\s*m(?:[^a-zA-Z]|$)").captures(text) {
        let value: f64 = caps[1].parse().map_err(|_| "invalid metre value".to_string())?;
        return positive(value).map(|v| Some(Measure::meters(v)));
    }

    if let Some(caps) = compiled(&IMPERIAL, r"(\d+)\s*['′’]\s*(\d+(?:\.\d+)?)?").captures(text) {
        let feet: f64 = caps[1].parse().map_err(|_| "invalid feet value".to_string())?;
        let inches: f64 = match caps.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| "invalid inch value".to_string())?,
            None => 0.0,
        };
        let meters = round_tenth((feet * 12.0 + inches) * INCH_TO_M);
        return positive(meters).map(|v| Some(Measure::meters(v)));
    }

    Err("unrecognized height".to_string())
}

/// Weight in kilograms from "6.9 kg (15.2 lbs)", "15.2 lbs", "6.9kg" or "6.9"
pub fn parse_weight(text: &str) -> Result<Option<Measure>, String> {
    if is_placeholder(text) {
        return Ok(None);
    }
    if let Ok(value) = text.trim().parse::<f64>() {
        return positive(value).map(|v| Some(Measure::kilograms(v)));
    }

    static KILOGRAMS: OnceLock<Regex> = OnceLock::new();
    static POUNDS: OnceLock<Regex> = OnceLock::new();

    if let Some(caps) = compiled(&KILOGRAMS, r"(?i)(\d+(?:\.\d+)?)\s*kg").captures(text) {
        let value: f64 = caps[1].parse().map_err(|_| "invalid kilogram value".to_string())?;
        return positive(value).map(|v| Some(Measure::kilograms(v)));
    }

    if let Some(caps) = compiled(&POUNDS, r"(?i)(\d+(?:\.\d+)?)\s*lbs?").captures(text) {
        let pounds: f64 = caps[1].parse().map_err(|_| "invalid pound value".to_string())?;
        return positive(round_tenth(pounds * POUNDS_TO_KG)).map(|v| Some(Measure::kilograms(v)));
    }

    Err("unrecognized weight".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sex {
    Male,
    Female,
}

fn sex_label(label: &str) -> Sex {
    match label.to_lowercase().as_str() {
        "female" | "♀" | "f" => Sex::Female,
        _ => Sex::Male,
    }
}

/// Gender ratio from the forms both sources produce.
///
/// "87.5%, 12.5%" and "87.5% male, 12.5% female" give a ratio (male first
/// unless labelled otherwise); "Genderless", including the letter-split
/// spreadsheet form "G,e,n,d,e,r,l,e,s,s", gives the genderless sentinel.
pub fn parse_gender_ratio(text: &str) -> Result<Option<GenderRatio>, String> {
    if is_placeholder(text) {
        return Ok(None);
    }

    let letters: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect::<String>()
        .to_lowercase();

    if letters.chars().all(char::is_alphabetic) {
        return match letters.as_str() {
            "genderless" | "nogender" => Ok(Some(GenderRatio::Genderless)),
            "male" | "maleonly" | "allmale" => Ok(Some(GenderRatio::Ratio { male: 100.0, female: 0.0 })),
            "female" | "femaleonly" | "allfemale" => {
                Ok(Some(GenderRatio::Ratio { male: 0.0, female: 100.0 }))
            }
            _ => Err("unrecognized gender ratio".to_string()),
        };
    }

    static PERCENT: OnceLock<Regex> = OnceLock::new();
    let pattern = compiled(
        &PERCENT,
        r"(?i)(female|male|♀|♂)?\s*:?\s*(\d+(?:\.\d+)?)\s*%\s*(female|male|♀|♂)?",
    );

    let mut parts = Vec::new();
    for caps in pattern.captures_iter(text) {
        let label = caps.get(1).or_else(|| caps.get(3)).map(|m| sex_label(m.as_str()));
        let value: f64 = caps[2].parse().map_err(|_| "invalid percentage".to_string())?;
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("percentage {} is outside 0..=100", value));
        }
        parts.push((label, value));
    }

    let (male, female) = match parts.as_slice() {
        [] => return Err("no percentages found".to_string()),
        [(Some(Sex::Female), f)] => (100.0 - f, *f),
        [(_, m)] => (*m, 100.0 - m),
        [(a, x), (b, y)] => match (a, b) {
            (Some(Sex::Female), Some(Sex::Female)) | (Some(Sex::Male), Some(Sex::Male)) => {
                return Err("both percentages carry the same label".to_string())
            }
            (Some(Sex::Female), _) | (_, Some(Sex::Male)) => (*y, *x),
            _ => (*x, *y),
        },
        _ => return Err("more than two percentages".to_string()),
    };

    let sum = male + female;
    if (sum - 100.0).abs() > RATIO_TOLERANCE {
        return Err(format!("ratio sums to {}", sum));
    }

    Ok(Some(GenderRatio::Ratio { male, female }))
}

/// EV yield from "2 Attack, 1 Speed", "Sp. Atk 1" or "1 HP / 1 Def"
pub fn parse_ev_yield(text: &str) -> Result<Vec<EvPoint>, String> {
    if is_placeholder(text) {
        return Ok(Vec::new());
    }

    static LEADING: OnceLock<Regex> = OnceLock::new();
    static TRAILING: OnceLock<Regex> = OnceLock::new();

    let mut points = Vec::new();
    for part in text.split([',', '/', ';']).map(str::trim).filter(|p| !p.is_empty()) {
        let (amount, label) = if let Some(caps) = compiled(&LEADING, r"^(\d+)\s*(.+)$").captures(part) {
            (caps[1].to_string(), caps[2].to_string())
        } else if let Some(caps) = compiled(&TRAILING, r"^(.+?)\s*:?\s*(\d+)$").captures(part) {
            (caps[2].to_string(), caps[1].to_string())
        } else {
            return Err(format!("cannot read EV entry '{}'", part));
        };

        let stat = StatKind::from_label(&label).ok_or_else(|| format!("unknown stat '{}'", label.trim()))?;
        points.push(ev_point(stat, &amount)?);
    }

    Ok(points)
}

fn ev_point(stat: StatKind, amount: &str) -> Result<EvPoint, String> {
    let points: u8 = amount
        .trim()
        .parse()
        .map_err(|_| format!("invalid EV amount '{}'", amount))?;
    if points > 3 {
        return Err(format!("EV amount {} exceeds 3", points));
    }
    Ok(EvPoint { stat, points })
}

fn ev_yield_value(value: &Value) -> Result<Vec<EvPoint>, String> {
    match value {
        Value::String(text) => parse_ev_yield(text),
        Value::Array(items) => {
            let mut points = Vec::new();
            for item in items {
                let text = scalar_text(item).ok_or_else(|| "expected EV text entries".to_string())?;
                points.extend(parse_ev_yield(&text)?);
            }
            Ok(points)
        }
        Value::Object(map) => map
            .iter()
            .filter_map(|(label, amount)| scalar_text(amount).map(|a| (label, a)))
            .filter(|(_, amount)| amount != "0")
            .map(|(label, amount)| {
                let stat = StatKind::from_label(label).ok_or_else(|| format!("unknown stat '{}'", label))?;
                ev_point(stat, &amount)
            })
            .collect(),
        _ => Err("expected EV yield text".to_string()),
    }
}

/// Evolution edges from a list of `{from, to, trigger}` objects
pub fn parse_evolution(value: &Value) -> Result<Vec<EvolutionEdge>, String> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Err("expected a list of evolution edges".to_string()),
    };

    items
        .iter()
        .map(|item| {
            let edge = item
                .as_object()
                .ok_or_else(|| "evolution edge must be an object".to_string())?;

            let from = edge
                .get("from")
                .and_then(value_to_dex)
                .ok_or_else(|| "evolution edge has no valid 'from' id".to_string())?;
            let to = edge
                .get("to")
                .and_then(value_to_dex)
                .ok_or_else(|| "evolution edge has no valid 'to' id".to_string())?;
            let trigger = first_key(edge, &["trigger", "condition", "method"])
                .and_then(joined_text)
                .unwrap_or_default();

            Ok(EvolutionEdge { from, to, trigger })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(source: SourceKind, value: Value) -> RawRecord {
        RawRecord::from_json(source, value).unwrap()
    }

    fn ratio(male: f64, female: f64) -> Option<GenderRatio> {
        Some(GenderRatio::Ratio { male, female })
    }

    #[test]
    fn test_gender_ratio_forms() {
        assert_eq!(parse_gender_ratio("87.5%, 12.5%").unwrap(), ratio(87.5, 12.5));
        assert_eq!(
            parse_gender_ratio("87.5% male, 12.5% female").unwrap(),
            ratio(87.5, 12.5)
        );
        assert_eq!(
            parse_gender_ratio("Female: 75%, Male: 25%").unwrap(),
            ratio(25.0, 75.0)
        );
        assert_eq!(parse_gender_ratio("12.5% female").unwrap(), ratio(87.5, 12.5));
        assert_eq!(
            parse_gender_ratio("Genderless").unwrap(),
            Some(GenderRatio::Genderless)
        );
        assert_eq!(
            parse_gender_ratio("G,e,n,d,e,r,l,e,s,s").unwrap(),
            Some(GenderRatio::Genderless)
        );
        assert_eq!(parse_gender_ratio("—").unwrap(), None);
    }

    #[test]
    fn test_gender_ratio_must_sum_to_100() {
        let err = parse_gender_ratio("60%, 60%").unwrap_err();
        assert!(err.contains("sums to 120"));
        assert!(parse_gender_ratio("50% male, 50% male").is_err());
        assert!(parse_gender_ratio("mostly male").is_err());
    }

    #[test]
    fn test_height_forms() {
        let h = |t: &str| parse_height(t).unwrap().map(|m| m.value);
        assert_eq!(h("0.7 m (2′04″)"), Some(0.7));
        assert_eq!(h("2'04\"0.7m"), Some(0.7));
        assert_eq!(h("0.7m"), Some(0.7));
        assert_eq!(h("0.7"), Some(0.7));
        assert_eq!(h("2'04\""), Some(0.7));
        assert_eq!(h("N/A"), None);
        assert!(parse_height("tall").is_err());
        assert!(parse_height("0").is_err());
    }

    #[test]
    fn test_weight_forms() {
        let w = |t: &str| parse_weight(t).unwrap().map(|m| m.value);
        assert_eq!(w("6.9 kg (15.2 lbs)"), Some(6.9));
        assert_eq!(w("15.2lbs6.9kg"), Some(6.9));
        assert_eq!(w("15.2 lbs"), Some(6.9));
        assert_eq!(w("6.9"), Some(6.9));
    }

    #[test]
    fn test_count_parsing() {
        assert_eq!(parse_count("45 (5.9%)").unwrap(), Known::Value(45));
        assert_eq!(parse_count("5,120").unwrap(), Known::Value(5120));
        assert_eq!(parse_count("64.0").unwrap(), Known::Value(64));
        assert_eq!(parse_count("0").unwrap(), Known::Value(0));
        assert_eq!(parse_count("—").unwrap(), Known::Unknown);
        assert!(parse_count("12.5").is_err());
        assert!(parse_count("lots").is_err());
    }

    #[test]
    fn test_ev_yield_forms() {
        let points = parse_ev_yield("2 Attack, 1 Speed").unwrap();
        assert_eq!(
            points,
            vec![
                EvPoint { stat: StatKind::Attack, points: 2 },
                EvPoint { stat: StatKind::Speed, points: 1 },
            ]
        );
        assert_eq!(
            parse_ev_yield("Sp. Atk 1").unwrap(),
            vec![EvPoint { stat: StatKind::SpAttack, points: 1 }]
        );
        assert!(parse_ev_yield("1 Luck").is_err());
    }

    #[test]
    fn test_normalize_web_record() {
        let record = raw(
            SourceKind::Web,
            json!({
                "number": "#0001",
                "name": "Bulbasaur",
                "types": ["grass", "POISON"],
                "base_stats": {"hp": 45, "attack": 49, "defense": 49,
                               "sp_attack": 65, "sp_defense": 65, "speed": 45},
                "physical_info": {"height": "0.7 m (2′04″)", "weight": "6.9 kg (15.2 lbs)"},
                "breeding_info": {"gender_ratio": "87.5%, 12.5%", "egg_groups": "Monster / Grass"},
                "catch_rate": "45 (5.9%)",
                "evolution_chain": [{"from": 1, "to": 2, "trigger": "Level 16"}]
            }),
        );

        let normalized = Normalizer::new().normalize(&record).unwrap();
        let r = &normalized.record;

        assert_eq!(r.id.padded(), "0001");
        assert_eq!(r.identity.types, vec!["Grass", "Poison"]);
        assert_eq!(r.stats.total, Known::Value(318));
        assert_eq!(r.physical.height, Some(Measure::meters(0.7)));
        assert_eq!(r.breeding.gender_ratio, ratio(87.5, 12.5));
        assert_eq!(r.breeding.egg_groups, vec!["Monster", "Grass"]);
        assert_eq!(r.mechanics.catch_rate, Known::Value(45));
        assert_eq!(r.evolution.chain[0].trigger, "Level 16");
        assert!(normalized.issues.is_empty());
    }

    #[test]
    fn test_gender_ratio_flat_key() {
        let record = raw(SourceKind::Web, json!({"number": 1, "gender_ratio": "87.5%, 12.5%"}));
        let normalized = Normalizer::new().normalize(&record).unwrap();
        assert_eq!(normalized.record.breeding.gender_ratio, ratio(87.5, 12.5));

        let record = raw(SourceKind::Spreadsheet, json!({"National Dex #": "1", "Gender Ratio": "Genderless"}));
        let normalized = Normalizer::new().normalize(&record).unwrap();
        assert_eq!(normalized.record.breeding.gender_ratio, Some(GenderRatio::Genderless));
    }

    #[test]
    fn test_strict_fails_and_lenient_reports() {
        let record = raw(
            SourceKind::Spreadsheet,
            json!({"National Dex #": "25", "Name": "Pikachu", "HP": "300", "Speed": "90"}),
        );
        let normalizer = Normalizer::new();

        let err = normalizer.normalize(&record).unwrap_err();
        assert_eq!(err.field, "stats.hp");

        let lenient = normalizer.normalize_lenient(&record).unwrap();
        assert!(lenient.record.stats.hp.is_unknown());
        assert_eq!(lenient.record.stats.speed, Known::Value(90));
        assert_eq!(lenient.issues.len(), 1);
        assert_eq!(lenient.issues[0].raw_value, "300");
    }

    #[test]
    fn test_missing_id_fails_in_both_modes() {
        let record = raw(SourceKind::Web, json!({"name": "Missingno"}));
        let normalizer = Normalizer::new();

        assert_eq!(normalizer.normalize(&record).unwrap_err().field, "id");
        assert_eq!(normalizer.normalize_lenient(&record).unwrap_err().field, "id");

        let record = raw(SourceKind::Web, json!({"number": "#0000"}));
        assert!(normalizer.normalize_lenient(&record).is_err());
    }

    #[test]
    fn test_total_mismatch_is_reported_and_derived() {
        let record = raw(
            SourceKind::Spreadsheet,
            json!({"National Dex #": "1", "HP": "45", "Attack": "49", "Defense": "49",
                   "Sp. Atk": "65", "Sp. Def": "65", "Speed": "45", "BST": "320"}),
        );

        let lenient = Normalizer::new().normalize_lenient(&record).unwrap();
        assert_eq!(lenient.issues[0].field, "stats.total");
        assert_eq!(lenient.record.stats.total, Known::Value(318));
    }

    #[test]
    fn test_sheet_game_columns_resolve_through_catalog() {
        let catalog = NameCatalog::new(["Red", "Blue", "Scarlet"], ["Overgrow", "Chlorophyll"]);
        let record = raw(
            SourceKind::Spreadsheet,
            json!({
                "National Dex #": "1",
                "Ability 1": "overgrow",
                "Hidden Ability": "CHLOROPHYLL",
                "Red Location": "Pallet Town",
                "Red Dex #": "153",
                "Blue Dex Text": "A strange seed was planted on its back at birth.",
                "Scarlet": "No",
                "Unrelated": "ignored"
            }),
        );

        let normalized = Normalizer::with_catalog(catalog).normalize(&record).unwrap();
        let r = &normalized.record;

        assert_eq!(r.identity.abilities, vec!["Overgrow"]);
        assert_eq!(r.identity.hidden_ability.as_deref(), Some("Chlorophyll"));
        assert_eq!(r.appearances["Red"].location.as_deref(), Some("Pallet Town"));
        assert_eq!(r.appearances["Red"].regional_index, Known::Value(153));
        assert_eq!(r.appearances["Red"].available, Some(true));
        assert!(r.appearances["Blue"].flavor_text.is_some());
        assert_eq!(r.appearances["Scarlet"].available, Some(false));
        assert_eq!(r.appearances.len(), 3);
    }

    #[test]
    fn test_web_appearances_and_flavor_texts() {
        let catalog = NameCatalog::new(["Red", "Yellow"], []);
        let record = raw(
            SourceKind::Web,
            json!({
                "number": "0025",
                "game_appearances": {"Pokémon Yellow": {"dex_number": "25", "location": "Viridian Forest"}},
                "dex_entries": {"red": ["When several of these", "gather..."]}
            }),
        );

        let normalized = Normalizer::with_catalog(catalog).normalize(&record).unwrap();
        let apps = &normalized.record.appearances;

        assert_eq!(apps["Yellow"].regional_index, Known::Value(25));
        assert_eq!(apps["Yellow"].available, Some(true));
        assert_eq!(
            apps["Red"].flavor_text.as_deref(),
            Some("When several of these gather...")
        );
    }

    #[test]
    fn test_web_bare_game_keys_are_kept() {
        let catalog = NameCatalog::new(["Red", "Blue"], []);
        let record = raw(
            SourceKind::Web,
            json!({"number": 1, "game_appearances": {"Red": {}, "pokemon blue": null}}),
        );

        let normalized = Normalizer::with_catalog(catalog).normalize(&record).unwrap();
        let apps = &normalized.record.appearances;

        assert_eq!(apps.len(), 2);
        assert!(apps["Red"].is_empty());
        assert!(apps["Blue"].is_empty());
    }

    #[test]
    fn test_batch_rejects_duplicates_and_bad_ids() {
        let raws = vec![
            raw(SourceKind::Web, json!({"number": 1, "name": "Bulbasaur"})),
            raw(SourceKind::Web, json!({"number": "0001", "name": "Bulbasaur again"})),
            raw(SourceKind::Web, json!({"name": "no id"})),
        ];

        let batch = Normalizer::new().normalize_batch(&raws);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected.len(), 2);
        println!("✅ batch kept {} record(s)", batch.records.len());
    }
}
