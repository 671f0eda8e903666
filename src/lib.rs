// Pokedex Reconciliation - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod attributes;     // Semantic Layer - canonical attributes and source aliases
pub mod audit;          // Audit Log - runs and events in SQLite
pub mod config;         // TOML configuration
pub mod data_quality;   // Store-wide quality checks
pub mod entities;       // Creature, game and ability models
pub mod error;          // Error taxonomy
pub mod normalize;      // Raw → canonical records
pub mod parser;         // Source adapters
pub mod precedence;     // Field group → ranked sources
pub mod query;          // Read-only lookups
pub mod reconciliation; // Merge engine
pub mod store;          // Persisted store, backups, atomic writes

// Re-export commonly used types
pub use attributes::{AttributeDefinition, AttributeRegistry, AttributeTarget};
pub use audit::{get_events_for_creature, insert_event, list_runs, record_run, Event, RunRecord};
pub use config::AppConfig;
pub use data_quality::{
    BatchSummary, CreatureQuality, DataQualityEngine, QualityIssue, QualityReport, Severity,
    ValidationResult as QualityValidationResult,
};
pub use entities::{
    AbilityRecord, Appearance, CreatureRecord, DexNumber, FieldGroup, GameRecord, GenderRatio,
    Known,
};
pub use error::{CorruptStoreError, ReconcileError, StoreError, ValidationError};
pub use normalize::{NameCatalog, NormalizedBatch, NormalizedRecord, Normalizer};
pub use parser::{
    detect_source, get_adapter, read_abilities, read_games, RawRecord, SourceAdapter, SourceKind,
    SpreadsheetAdapter, WebAdapter,
};
pub use precedence::PrecedencePolicy;
pub use query::Query;
pub use reconciliation::{merge_appearances, reconcile, Conflict, MergeReport, Reconciler};
pub use store::{BackupHandle, Store, StoreManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
