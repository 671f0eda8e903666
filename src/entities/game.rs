// 🎮 Game Entity - reference set for appearance keys
//
// Every key of a creature's `appearances` map must name a GameRecord.
// Games are grouped by release ("Red"/"Blue" share a generation, region
// and platform), which is how the reference file lists them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Canonical display name, also the record id (e.g. "Let's Go Pikachu")
    pub name: String,

    pub generation: u8,

    pub region: String,

    /// Every game released together with this one, itself included
    #[serde(default)]
    pub release_group: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// One entry of the reference file: a release that ships several games.
#[derive(Debug, Clone, Deserialize)]
pub struct GameRelease {
    pub generation: u8,
    pub region: String,
    pub games: Vec<String>,
    #[serde(default, alias = "year")]
    pub release_year: Option<u16>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl GameRelease {
    /// Expand a release into one record per game
    pub fn into_records(self) -> Vec<GameRecord> {
        let group: BTreeSet<String> = self.games.iter().map(|g| g.trim().to_string()).collect();

        group
            .iter()
            .map(|name| GameRecord {
                name: name.clone(),
                generation: self.generation,
                region: self.region.trim().to_string(),
                release_group: group.clone(),
                release_year: self.release_year,
                platform: self.platform.clone(),
            })
            .collect()
    }
}

/// Merge newly read game records into an existing set, keyed by name.
///
/// A record read later replaces the stored one; games are never removed.
pub fn upsert_games(existing: &mut BTreeMap<String, GameRecord>, incoming: Vec<GameRecord>) -> usize {
    let mut changed = 0;
    for game in incoming {
        if existing.get(&game.name) != Some(&game) {
            existing.insert(game.name.clone(), game);
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kanto_release() -> GameRelease {
        GameRelease {
            generation: 1,
            region: "Kanto".to_string(),
            games: vec!["Red".to_string(), "Blue".to_string(), "Yellow ".to_string()],
            release_year: Some(1996),
            platform: Some("Game Boy".to_string()),
        }
    }

    #[test]
    fn test_release_expands_to_one_record_per_game() {
        let records = kanto_release().into_records();

        assert_eq!(records.len(), 3);
        let yellow = records.iter().find(|g| g.name == "Yellow").unwrap();
        assert_eq!(yellow.generation, 1);
        assert!(yellow.release_group.contains("Red"));
        assert!(yellow.release_group.contains("Yellow"));
    }

    #[test]
    fn test_upsert_counts_only_changes() {
        let mut set = BTreeMap::new();
        assert_eq!(upsert_games(&mut set, kanto_release().into_records()), 3);
        assert_eq!(upsert_games(&mut set, kanto_release().into_records()), 0);

        let mut remake = kanto_release();
        remake.platform = Some("Game Boy Color".to_string());
        assert_eq!(upsert_games(&mut set, remake.into_records()), 3);
        assert_eq!(set.len(), 3);
    }
}
