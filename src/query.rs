// 🔎 Query Surface - Read-only lookups over a loaded store

use crate::entities::{AbilityRecord, CreatureRecord, DexNumber, GameRecord};
use crate::store::Store;

pub struct Query<'a> {
    store: &'a Store,
}

impl<'a> Query<'a> {
    pub fn new(store: &'a Store) -> Self {
        Query { store }
    }

    pub fn by_id(&self, id: DexNumber) -> Option<&'a CreatureRecord> {
        self.store.creatures.get(&id)
    }

    /// Case-insensitive exact match on the creature name
    pub fn by_name(&self, name: &str) -> Option<&'a CreatureRecord> {
        let wanted = name.trim().to_lowercase();
        self.store
            .creatures
            .values()
            .find(|c| c.name().map(|n| n.to_lowercase() == wanted).unwrap_or(false))
    }

    /// Resolve "25", "#0025" or "Pikachu"
    pub fn lookup(&self, key: &str) -> Option<&'a CreatureRecord> {
        match DexNumber::parse(key) {
            Some(id) => self.by_id(id),
            None => self.by_name(key),
        }
    }

    /// Creatures matching a predicate, in id order
    pub fn filter<P>(&self, predicate: P) -> Vec<&'a CreatureRecord>
    where
        P: Fn(&CreatureRecord) -> bool,
    {
        self.store.creatures.values().filter(|c| predicate(c)).collect()
    }

    pub fn with_type(&self, type_name: &str) -> Vec<&'a CreatureRecord> {
        self.filter(|c| c.identity.types.iter().any(|t| t.eq_ignore_ascii_case(type_name)))
    }

    /// Creatures that appear in a game and are not marked unavailable
    pub fn available_in(&self, game: &str) -> Vec<&'a CreatureRecord> {
        self.filter(|c| {
            c.appearances
                .get(game)
                .map(|a| a.available != Some(false))
                .unwrap_or(false)
        })
    }

    pub fn games(&self) -> Vec<&'a GameRecord> {
        self.store.games.values().collect()
    }

    pub fn abilities_with_holders(&self) -> Vec<(&'a AbilityRecord, Vec<&'a CreatureRecord>)> {
        self.store
            .abilities
            .values()
            .map(|ability| {
                let holders = ability
                    .holders
                    .iter()
                    .filter_map(|id| self.store.creatures.get(id))
                    .collect();
                (ability, holders)
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Appearance, Known};

    fn store() -> Store {
        let mut store = Store::new();

        let mut pikachu = CreatureRecord::new(DexNumber::new(25).unwrap());
        pikachu.identity.name = Some("Pikachu".to_string());
        pikachu.identity.types = vec!["Electric".to_string()];
        pikachu.appearances.insert(
            "Yellow".to_string(),
            Appearance {
                regional_index: Known::Value(25),
                available: Some(true),
                ..Appearance::default()
            },
        );
        pikachu.appearances.insert(
            "Red".to_string(),
            Appearance {
                available: Some(false),
                ..Appearance::default()
            },
        );
        store.creatures.insert(pikachu.id, pikachu);

        let mut bulbasaur = CreatureRecord::new(DexNumber::new(1).unwrap());
        bulbasaur.identity.name = Some("Bulbasaur".to_string());
        bulbasaur.identity.types = vec!["Grass".to_string(), "Poison".to_string()];
        store.creatures.insert(bulbasaur.id, bulbasaur);

        let mut overgrow = crate::entities::AbilityRecord::new("Overgrow");
        overgrow.holders.insert(DexNumber::new(1).unwrap());
        store.abilities.insert("Overgrow".to_string(), overgrow);

        store
    }

    #[test]
    fn test_lookups() {
        let store = store();
        let query = Query::new(&store);

        assert_eq!(query.by_name("PIKACHU").unwrap().id.get(), 25);
        assert!(query.by_name("Pika").is_none());
        assert_eq!(query.lookup("#0001").unwrap().name(), Some("Bulbasaur"));
        assert_eq!(query.lookup("bulbasaur").unwrap().id.get(), 1);
    }

    #[test]
    fn test_filters() {
        let store = store();
        let query = Query::new(&store);

        assert_eq!(query.with_type("poison").len(), 1);
        assert_eq!(query.available_in("Yellow").len(), 1);
        assert!(query.available_in("Red").is_empty());
        assert_eq!(query.filter(|c| c.identity.types.len() == 2).len(), 1);
    }

    #[test]
    fn test_abilities_with_holders() {
        let store = store();
        let query = Query::new(&store);

        let abilities = query.abilities_with_holders();
        assert_eq!(abilities.len(), 1);
        assert_eq!(abilities[0].1[0].name(), Some("Bulbasaur"));
    }
}
