// 💾 Store Manager - Canonical JSON store with snapshot-before-write
//
// The store is one JSON document:
//   { format_version, checksum, creatures: [...], games: [...], abilities: [...] }
//
// Save order is fixed: write temp file → copy live store to backups/ → rename
// temp over live. Any failure before the rename leaves the live store as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::entities::{AbilityRecord, CreatureRecord, DexNumber, GameRecord};
use crate::error::{CorruptStoreError, StoreError};

pub const FORMAT_VERSION: u32 = 1;

/// Size of the national index the ids must fall within
pub const DEFAULT_NATIONAL_DEX_SIZE: u16 = 1025;

// ============================================================================
// STORE (in memory)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    pub creatures: BTreeMap<DexNumber, CreatureRecord>,
    pub games: BTreeMap<String, GameRecord>,
    pub abilities: BTreeMap<String, AbilityRecord>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn get(&self, id: DexNumber) -> Option<&CreatureRecord> {
        self.creatures.get(&id)
    }

    pub fn len(&self) -> usize {
        self.creatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatures.is_empty()
    }

    /// SHA-256 over the three collections in canonical (sorted) order
    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_vec(&(
            self.creatures.values().collect::<Vec<_>>(),
            self.games.values().collect::<Vec<_>>(),
            self.abilities.values().collect::<Vec<_>>(),
        ))?;

        let mut hasher = Sha256::new();
        hasher.update(&payload);
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn to_document(&self) -> Result<StoreDocument, serde_json::Error> {
        Ok(StoreDocument {
            format_version: FORMAT_VERSION,
            checksum: Some(self.checksum()?),
            creatures: self.creatures.values().cloned().collect(),
            games: self.games.values().cloned().collect(),
            abilities: self.abilities.values().cloned().collect(),
        })
    }
}

/// On-disk shape
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    format_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,

    #[serde(default)]
    creatures: Vec<CreatureRecord>,

    #[serde(default)]
    games: Vec<GameRecord>,

    #[serde(default)]
    abilities: Vec<AbilityRecord>,
}

/// Serialize a store to the persisted JSON text
pub fn to_json(store: &Store) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(&store.to_document()?)?)
}

fn is_padded_id(text: &str) -> bool {
    text.len() == 4 && text.chars().all(|c| c.is_ascii_digit())
}

/// Parse and validate persisted store text
pub fn parse_store(text: &str, national_dex_size: u16) -> Result<Store, CorruptStoreError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CorruptStoreError::Malformed(e.to_string()))?;

    // Ids are checked on the raw JSON: the typed decoder accepts loose forms
    if let Some(creatures) = value.get("creatures").and_then(Value::as_array) {
        for creature in creatures {
            match creature.get("id") {
                Some(Value::String(id)) if is_padded_id(id) => {
                    let n: u32 = id
                        .parse()
                        .map_err(|_| CorruptStoreError::MalformedId(id.clone()))?;
                    if n == 0 || n > national_dex_size as u32 {
                        return Err(CorruptStoreError::IdOutOfRange {
                            id: n,
                            max: national_dex_size,
                        });
                    }
                }
                Some(Value::String(id)) => return Err(CorruptStoreError::MalformedId(id.clone())),
                Some(other) => return Err(CorruptStoreError::MalformedId(other.to_string())),
                None => return Err(CorruptStoreError::MalformedId("<missing>".to_string())),
            }
        }
    }

    let doc: StoreDocument =
        serde_json::from_value(value).map_err(|e| CorruptStoreError::Malformed(e.to_string()))?;

    if doc.format_version != FORMAT_VERSION {
        return Err(CorruptStoreError::UnsupportedVersion {
            found: doc.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let mut store = Store::new();

    for creature in doc.creatures {
        let id = creature.id;
        if store.creatures.insert(id, creature).is_some() {
            return Err(CorruptStoreError::DuplicateId(id));
        }
    }
    for game in doc.games {
        let name = game.name.clone();
        if store.games.insert(name.clone(), game).is_some() {
            return Err(CorruptStoreError::DuplicateGame(name));
        }
    }
    for ability in doc.abilities {
        let name = ability.name.clone();
        if store.abilities.insert(name.clone(), ability).is_some() {
            return Err(CorruptStoreError::DuplicateAbility(name));
        }
    }

    if let Some(recorded) = doc.checksum {
        let computed = store
            .checksum()
            .map_err(|e| CorruptStoreError::Malformed(e.to_string()))?;
        if recorded != computed {
            return Err(CorruptStoreError::ChecksumMismatch { recorded, computed });
        }
    }

    Ok(store)
}

// ============================================================================
// STORE MANAGER (on disk)
// ============================================================================

/// A timestamped copy of the live store taken before a replace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,

    /// SHA-256 of the copied bytes
    pub checksum: String,
}

pub struct StoreManager {
    path: PathBuf,
    backup_dir: PathBuf,
    national_dex_size: u16,
}

impl StoreManager {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, national_dex_size: u16) -> Self {
        StoreManager {
            path: path.into(),
            backup_dir: backup_dir.into(),
            national_dex_size,
        }
    }

    /// Store at `path` with backups in a sibling `backups/` directory
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_dir = store_dir(&path).join("backups");
        StoreManager::new(path, backup_dir, DEFAULT_NATIONAL_DEX_SIZE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Load and validate the live store; a missing file is an empty store
    pub fn load(&self) -> Result<Store, StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no store yet, starting empty");
            return Ok(Store::new());
        }

        let text = fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let store = parse_store(&text, self.national_dex_size)?;

        debug!(
            creatures = store.creatures.len(),
            games = store.games.len(),
            abilities = store.abilities.len(),
            "store loaded"
        );
        Ok(store)
    }

    /// Persist a store. Returns the backup taken, or `None` on the first save
    /// (there is no live store to copy yet).
    pub fn save(&self, store: &Store) -> Result<Option<BackupHandle>, StoreError> {
        let dir = store_dir(&self.path);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let document = store.to_document()?;

        // (a) temp file next to the live store, so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, &document)?;
        tmp.write_all(b"\n")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;

        // (b) snapshot the live store
        let backup = if self.path.exists() {
            Some(self.backup()?)
        } else {
            None
        };

        // (c) atomic replace
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            creatures = store.creatures.len(),
            backup = ?backup.as_ref().map(|b| b.path.display().to_string()),
            "store saved"
        );
        Ok(backup)
    }

    /// Copy the live store into the backup directory
    pub fn backup(&self) -> Result<BackupHandle, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::Missing(self.path.clone()));
        }

        fs::create_dir_all(&self.backup_dir).map_err(|e| StoreError::io(&self.backup_dir, e))?;

        let taken_at = Utc::now();
        let short_id: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let name = format!(
            "{}-{}-{}.json",
            self.stem(),
            taken_at.format("%Y%m%dT%H%M%S%.3fZ"),
            short_id
        );
        let dest = self.backup_dir.join(name);

        let bytes = fs::read(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        fs::write(&dest, &bytes).map_err(|e| StoreError::io(&dest, e))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);

        debug!(backup = %dest.display(), "backup written");
        Ok(BackupHandle {
            path: dest,
            taken_at,
            checksum: format!("{:x}", hasher.finalize()),
        })
    }

    /// Every backup of this store, oldest first (never pruned)
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}-", self.stem());
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.backup_dir)
            .map_err(|e| StoreError::io(&self.backup_dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();

        backups.sort();
        Ok(backups)
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store")
            .to_string()
    }
}

fn store_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Known;

    fn sample_store() -> Store {
        let mut store = Store::new();
        let mut bulbasaur = CreatureRecord::new(DexNumber::new(1).unwrap());
        bulbasaur.identity.name = Some("Bulbasaur".to_string());
        bulbasaur.stats.hp = Known::Value(45);
        store.creatures.insert(bulbasaur.id, bulbasaur);
        store
    }

    #[test]
    fn test_load_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::open(dir.path().join("pokedex.json"));

        let store = manager.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::open(dir.path().join("pokedex.json"));
        let store = sample_store();

        let backup = manager.save(&store).unwrap();
        assert!(backup.is_none(), "first save has nothing to back up");

        let loaded = manager.load().unwrap();
        assert_eq!(loaded, store);

        let text = fs::read_to_string(manager.path()).unwrap();
        assert!(text.contains("\"id\": \"0001\""));
    }

    #[test]
    fn test_backup_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::open(dir.path().join("pokedex.json"));

        let first = sample_store();
        manager.save(&first).unwrap();
        let before = fs::read(manager.path()).unwrap();

        let mut second = first.clone();
        second
            .creatures
            .get_mut(&DexNumber::new(1).unwrap())
            .unwrap()
            .stats
            .attack = Known::Value(49);

        let backup = manager.save(&second).unwrap().unwrap();

        // The backup holds the previous live bytes, the live store the new ones
        assert_eq!(fs::read(&backup.path).unwrap(), before);
        assert_eq!(manager.load().unwrap(), second);
        assert_eq!(manager.list_backups().unwrap(), vec![backup.path.clone()]);
        println!("✅ backup at {}", backup.path.display());
    }

    #[test]
    fn test_backup_requires_live_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StoreManager::open(dir.path().join("pokedex.json"));

        assert!(matches!(manager.backup(), Err(StoreError::Missing(_))));
        assert!(manager.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_failed_save_leaves_live_store() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("pokedex.json");
        let manager = StoreManager::open(&live);
        manager.save(&sample_store()).unwrap();
        let before = fs::read(&live).unwrap();

        // A file where the backup directory should be makes step (b) fail
        let blocked = StoreManager::new(&live, dir.path().join("blocker"), DEFAULT_NATIONAL_DEX_SIZE);
        fs::write(dir.path().join("blocker"), b"not a directory").unwrap();

        let mut changed = sample_store();
        changed.creatures.clear();
        assert!(blocked.save(&changed).is_err());

        assert_eq!(fs::read(&live).unwrap(), before);
    }

    #[test]
    fn test_load_rejects_malformed_ids() {
        let text = r#"{"format_version": 1, "creatures": [{"id": "1"}]}"#;
        assert_eq!(
            parse_store(text, 1025).unwrap_err(),
            CorruptStoreError::MalformedId("1".to_string())
        );

        let text = r#"{"format_version": 1, "creatures": [{"id": "1026"}]}"#;
        assert!(matches!(
            parse_store(text, 1025).unwrap_err(),
            CorruptStoreError::IdOutOfRange { id: 1026, .. }
        ));
    }

    #[test]
    fn test_load_rejects_duplicates_and_bad_checksum() {
        let text = r#"{"format_version": 1, "creatures": [{"id": "0001"}, {"id": "0001"}]}"#;
        assert!(matches!(
            parse_store(text, 1025).unwrap_err(),
            CorruptStoreError::DuplicateId(_)
        ));

        let mut doc: Value = serde_json::from_str(&to_json(&sample_store()).unwrap()).unwrap();
        doc["creatures"][0]["stats"]["hp"] = serde_json::json!(99);
        assert!(matches!(
            parse_store(&doc.to_string(), 1025).unwrap_err(),
            CorruptStoreError::ChecksumMismatch { .. }
        ));

        let text = r#"{"format_version": 2}"#;
        assert!(matches!(
            parse_store(text, 1025).unwrap_err(),
            CorruptStoreError::UnsupportedVersion { found: 2, .. }
        ));
    }
}
