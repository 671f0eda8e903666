// 🚨 Error Taxonomy
// Field-level problems degrade gracefully, structural problems stop the run.
//
//   ValidationError    → one field failed normalization (recoverable)
//   ReconcileError     → referential integrity / structural conflict (aborts)
//   CorruptStoreError  → on-disk store failed shape validation (surfaced)
//   StoreError         → backup or write failure (aborts before replace)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::entities::DexNumber;

// ============================================================================
// VALIDATION ERROR (field level)
// ============================================================================

/// A single raw value that could not be coerced into its canonical form.
///
/// The caller decides whether to skip the field (keeping the prior canonical
/// value) or to abort the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{field}: cannot normalize {raw_value:?} ({reason})")]
pub struct ValidationError {
    /// Canonical field path, e.g. `breeding.gender_ratio`
    pub field: String,

    /// The raw value as it arrived from the adapter
    pub raw_value: String,

    /// Why it was rejected
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        raw_value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ValidationError {
            field: field.into(),
            raw_value: raw_value.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// RECONCILE ERROR (run level)
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    /// An appearance key names a game missing from the game reference set.
    #[error("creature {id}: appearance references unknown game '{game}'")]
    UnknownGame { id: DexNumber, game: String },

    /// An ability name is missing from the ability reference set.
    #[error("creature {id}: references unknown ability '{ability}'")]
    UnknownAbility { id: DexNumber, ability: String },

    /// Equally ranked sources disagree on a structural field group.
    #[error("creature {id}: equally ranked sources disagree on '{group}'")]
    StructuralConflict { id: DexNumber, group: String },

    /// The precedence policy cannot be applied.
    #[error("invalid precedence policy: {0}")]
    InvalidPolicy(String),
}

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CorruptStoreError {
    #[error("store is not valid JSON for the expected shape: {0}")]
    Malformed(String),

    #[error("unsupported store format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("creature id '{0}' is not a zero-padded 4-digit number")]
    MalformedId(String),

    #[error("creature id {id} is outside 1..={max}")]
    IdOutOfRange { id: u32, max: u16 },

    #[error("duplicate creature id {0}")]
    DuplicateId(DexNumber),

    #[error("duplicate game record '{0}'")]
    DuplicateGame(String),

    #[error("duplicate ability record '{0}'")]
    DuplicateAbility(String),

    #[error("checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch { recorded: String, computed: String },
}

/// Failures of the Store Manager. The live store is never partially written.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no store exists at {0}")]
    Missing(PathBuf),

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Corrupt(#[from] CorruptStoreError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
