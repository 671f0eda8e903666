// 🏗️ Source Adapters
// Polymorphic readers for the two creature sources + the reference files
//
// Adapters do NOT interpret values. They only turn a file into raw
// key → value records tagged with their source; the Normalizer owns every
// coercion. Web records stay nested, spreadsheet records are flat rows.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::entities::{AbilityRecord, GameRecord, GameRelease};

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceKind - Which source a raw record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Web,
    Spreadsheet,
}

impl SourceKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Web => "Web",
            SourceKind::Spreadsheet => "Spreadsheet",
        }
    }

    /// Short code used in config files and the audit log
    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Spreadsheet => "spreadsheet",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// RawRecord - Output of an adapter, before normalization
///
/// `fields` is any mapping of string keys to scalars, strings or nested
/// mappings. No schema is enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,

    /// Provenance: file name + position ("pokemon_data.json#3", "master.csv:42")
    pub origin: String,

    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(source: SourceKind, origin: impl Into<String>, fields: Map<String, Value>) -> Self {
        RawRecord {
            source,
            origin: origin.into(),
            fields,
        }
    }

    /// Build a record from a `serde_json::json!` object (test and tooling helper)
    pub fn from_json(source: SourceKind, value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(RawRecord::new(source, "inline", fields)),
            other => Err(anyhow!("raw record must be an object, got {}", other)),
        }
    }
}

// ============================================================================
// ADAPTER TRAIT
// ============================================================================

/// SourceAdapter - Core trait every creature source implements
pub trait SourceAdapter {
    /// Read a file and return raw per-creature records
    fn read(&self, file_path: &Path) -> Result<Vec<RawRecord>>;

    /// Which source this adapter produces
    fn source_kind(&self) -> SourceKind;

    /// Adapter version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

fn file_label(file_path: &Path) -> String {
    file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// WEB ADAPTER (scraper JSON dump)
// ============================================================================

/// Reads the JSON array a web scraper writes: one nested object per creature.
pub struct WebAdapter;

impl WebAdapter {
    pub fn parse_str(&self, text: &str, label: &str) -> Result<Vec<RawRecord>> {
        let value: Value = serde_json::from_str(text).context("Web dump is not valid JSON")?;

        let items = match value {
            Value::Array(items) => items,
            _ => return Err(anyhow!("Web dump must be a JSON array of objects")),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(fields) => Ok(RawRecord::new(
                    SourceKind::Web,
                    format!("{}#{}", label, idx),
                    fields,
                )),
                _ => Err(anyhow!("{}#{}: entry is not an object", label, idx)),
            })
            .collect()
    }
}

impl SourceAdapter for WebAdapter {
    fn read(&self, file_path: &Path) -> Result<Vec<RawRecord>> {
        let text = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read web dump {:?}", file_path))?;
        self.parse_str(&text, &file_label(file_path))
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Web
    }
}

// ============================================================================
// SPREADSHEET ADAPTER (CSV export of the master sheet)
// ============================================================================

/// Reads a CSV export of the master spreadsheet.
///
/// The sheet carries banner rows above the real header; `header_row` is the
/// zero-based row index of the header. Rows with a `ref_id` that does not end
/// in `-00` are alternate forms and are skipped.
pub struct SpreadsheetAdapter {
    pub header_row: usize,
}

impl SpreadsheetAdapter {
    pub fn new(header_row: usize) -> Self {
        SpreadsheetAdapter { header_row }
    }

    pub fn parse_reader<R: std::io::Read>(&self, reader: R, label: &str) -> Result<Vec<RawRecord>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = rdr.records().enumerate().skip(self.header_row);

        let headers: Vec<String> = match rows.next() {
            Some((_, row)) => row
                .context("Failed to read spreadsheet header row")?
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
            None => return Err(anyhow!("{}: no header row at index {}", label, self.header_row)),
        };

        let mut records = Vec::new();

        for (idx, row) in rows {
            let row = row.with_context(|| format!("{}: failed to read row {}", label, idx + 1))?;

            let mut fields = Map::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                let cell = cell.trim();
                if header.is_empty() || cell.is_empty() {
                    continue;
                }
                fields.insert(header.clone(), Value::String(cell.to_string()));
            }

            if fields.is_empty() || !is_base_form(&fields) {
                continue;
            }

            records.push(RawRecord::new(
                SourceKind::Spreadsheet,
                format!("{}:{}", label, idx + 1),
                fields,
            ));
        }

        Ok(records)
    }
}

/// Base forms carry no ref_id or one ending in "-00"
fn is_base_form(fields: &Map<String, Value>) -> bool {
    match fields.get("ref_id").and_then(Value::as_str) {
        Some(ref_id) => ref_id.ends_with("-00"),
        None => true,
    }
}

impl Default for SpreadsheetAdapter {
    fn default() -> Self {
        // The master sheet has one title row above its header
        SpreadsheetAdapter::new(1)
    }
}

impl SourceAdapter for SpreadsheetAdapter {
    fn read(&self, file_path: &Path) -> Result<Vec<RawRecord>> {
        let file = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open spreadsheet export {:?}", file_path))?;
        self.parse_reader(file, &file_label(file_path))
    }

    fn source_kind(&self) -> SourceKind {
        SourceKind::Spreadsheet
    }
}

// ============================================================================
// REFERENCE FILES
// ============================================================================

/// Read the game list (releases grouped by generation) into game records
pub fn read_games(file_path: &Path) -> Result<Vec<GameRecord>> {
    let text = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read games file {:?}", file_path))?;
    let releases: Vec<GameRelease> =
        serde_json::from_str(&text).context("Failed to deserialize game releases")?;

    Ok(releases
        .into_iter()
        .flat_map(GameRelease::into_records)
        .collect())
}

/// Shape of one entry in the ability scraper's output
#[derive(Debug, Deserialize)]
struct RawAbility {
    name: String,
    #[serde(default)]
    game_text: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    in_depth_effect: Option<String>,
    #[serde(default)]
    effect: Option<String>,
}

impl From<RawAbility> for AbilityRecord {
    fn from(raw: RawAbility) -> Self {
        let mut record = AbilityRecord::new(raw.name.trim());
        record.description = raw.game_text.or(raw.description).unwrap_or_default();
        record.effect = raw.in_depth_effect.or(raw.effect).unwrap_or_default();
        record
    }
}

/// Read the ability list into ability records (holders are derived later)
pub fn read_abilities(file_path: &Path) -> Result<Vec<AbilityRecord>> {
    let text = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read abilities file {:?}", file_path))?;
    let raw: Vec<RawAbility> =
        serde_json::from_str(&text).context("Failed to deserialize abilities")?;

    Ok(raw
        .into_iter()
        .filter(|a| !a.name.trim().is_empty())
        .map(AbilityRecord::from)
        .collect())
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the source kind from the file extension
///
/// `.json` → Web dump, `.csv` → Spreadsheet export
pub fn detect_source(file_path: &Path) -> Result<SourceKind> {
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "json" => Ok(SourceKind::Web),
        "csv" => Ok(SourceKind::Spreadsheet),
        _ => Err(anyhow!("Cannot detect source kind for {:?}", file_path)),
    }
}

/// Get the adapter for a source kind
pub fn get_adapter(source: SourceKind, header_row: usize) -> Box<dyn SourceAdapter> {
    match source {
        SourceKind::Web => Box::new(WebAdapter),
        SourceKind::Spreadsheet => Box::new(SpreadsheetAdapter::new(header_row)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
