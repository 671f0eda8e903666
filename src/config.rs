// ⚙️ Configuration - TOML file with defaults for every key
//
//   store_path = "data/pokedex.json"
//   audit_db = "data/audit.db"
//   national_dex_size = 1025
//
//   [spreadsheet]
//   header_row = 1
//
//   [precedence.stats]
//   spreadsheet = 2
//   web = 1

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::precedence::PrecedencePolicy;
use crate::store::{StoreManager, DEFAULT_NATIONAL_DEX_SIZE};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "POKEDEX_RECON_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "pokedex-recon.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetConfig {
    /// Zero-based index of the header row in the CSV export
    pub header_row: usize,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        SpreadsheetConfig { header_row: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_path: PathBuf,

    /// Defaults to `backups/` next to the store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    pub audit_db: PathBuf,

    pub national_dex_size: u16,

    pub spreadsheet: SpreadsheetConfig,

    pub precedence: PrecedencePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            store_path: PathBuf::from("data/pokedex.json"),
            backup_dir: None,
            audit_db: PathBuf::from("data/audit.db"),
            national_dex_size: DEFAULT_NATIONAL_DEX_SIZE,
            spreadsheet: SpreadsheetConfig::default(),
            precedence: PrecedencePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load from `$POKEDEX_RECON_CONFIG`, else `./pokedex-recon.toml`, else defaults
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if path.exists() {
            AppConfig::from_file(&path)
        } else {
            if std::env::var_os(CONFIG_ENV).is_some() {
                return Err(anyhow!("config file {:?} named by {} does not exist", path, CONFIG_ENV));
            }
            Ok(AppConfig::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        AppConfig::from_toml(&text).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Parse TOML; precedence groups left out take their default ranks
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(text).context("Failed to parse TOML config")?;
        config.precedence = config.precedence.with_defaults();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.national_dex_size == 0 {
            return Err(anyhow!("national_dex_size must be at least 1"));
        }
        self.precedence.validate()?;
        Ok(())
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .store_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .join("backups"),
        }
    }

    pub fn store_manager(&self) -> StoreManager {
        StoreManager::new(&self.store_path, self.backup_dir(), self.national_dex_size)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::FieldGroup;
    use crate::parser::SourceKind;

    #[test]
    fn test_empty_toml_is_default() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.backup_dir(), PathBuf::from("data/backups"));
    }

    #[test]
    fn test_partial_precedence_keeps_other_defaults() {
        let text = r#"
            store_path = "/tmp/dex/store.json"
            national_dex_size = 151

            [spreadsheet]
            header_row = 0

            [precedence.appearances]
            spreadsheet = 5
        "#;

        let config = AppConfig::from_toml(text).unwrap();

        assert_eq!(config.national_dex_size, 151);
        assert_eq!(config.spreadsheet.header_row, 0);
        assert_eq!(
            config.precedence.rank(FieldGroup::Appearances, SourceKind::Spreadsheet),
            Some(5)
        );
        // A group table replaces the default table for that group
        assert_eq!(config.precedence.rank(FieldGroup::Appearances, SourceKind::Web), None);
        assert_eq!(config.precedence.rank(FieldGroup::Stats, SourceKind::Spreadsheet), Some(2));
        assert_eq!(config.backup_dir(), PathBuf::from("/tmp/dex/backups"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(AppConfig::from_toml("national_dex_size = 0").is_err());
        assert!(AppConfig::from_toml("[precedence.stats]\nweb = \"high\"").is_err());
        assert!(AppConfig::from_toml("[precedence.luck]\nweb = 1").is_err());
    }
}
