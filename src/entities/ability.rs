// ✨ Ability Entity - reference set for identity.abilities

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::creature::{CreatureRecord, DexNumber};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRecord {
    /// Canonical display name, also the record id (e.g. "Swift Swim")
    pub name: String,

    /// Short in-game text
    #[serde(default)]
    pub description: String,

    /// Longer mechanical explanation
    #[serde(default)]
    pub effect: String,

    /// Creatures that can have this ability
    #[serde(default)]
    pub holders: BTreeSet<DexNumber>,
}

impl AbilityRecord {
    pub fn new(name: impl Into<String>) -> Self {
        AbilityRecord {
            name: name.into(),
            description: String::new(),
            effect: String::new(),
            holders: BTreeSet::new(),
        }
    }
}

/// Merge newly read ability text into the set. Holders are kept, text is
/// replaced only when the incoming text is non-empty.
pub fn upsert_abilities(
    existing: &mut BTreeMap<String, AbilityRecord>,
    incoming: Vec<AbilityRecord>,
) -> usize {
    let mut changed = 0;
    for ability in incoming {
        let name = ability.name.trim().to_string();
        let entry = existing
            .entry(name.clone())
            .or_insert_with(|| AbilityRecord::new(name));
        let before = entry.clone();

        if !ability.description.trim().is_empty() {
            entry.description = ability.description.trim().to_string();
        }
        if !ability.effect.trim().is_empty() {
            entry.effect = ability.effect.trim().to_string();
        }
        entry.holders.extend(ability.holders);

        if *entry != before {
            changed += 1;
        }
    }
    changed
}

/// Rebuild every ability's holders from the creatures that reference it.
/// Unknown ability names are ignored here; integrity checks report them.
pub fn refresh_holders<'a>(
    abilities: &mut BTreeMap<String, AbilityRecord>,
    creatures: impl IntoIterator<Item = &'a CreatureRecord>,
) {
    for ability in abilities.values_mut() {
        ability.holders.clear();
    }
    for creature in creatures {
        for name in creature.identity.all_abilities() {
            if let Some(ability) = abilities.get_mut(name) {
                ability.holders.insert(creature.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_keeps_existing_text_when_incoming_blank() {
        let mut set = BTreeMap::new();
        let mut overgrow = AbilityRecord::new("Overgrow");
        overgrow.description = "Powers up Grass-type moves in a pinch.".to_string();
        upsert_abilities(&mut set, vec![overgrow]);

        let changed = upsert_abilities(&mut set, vec![AbilityRecord::new("Overgrow")]);

        assert_eq!(changed, 0);
        assert_eq!(
            set["Overgrow"].description,
            "Powers up Grass-type moves in a pinch."
        );
    }

    #[test]
    fn test_refresh_holders_from_creatures() {
        let mut set = BTreeMap::new();
        upsert_abilities(
            &mut set,
            vec![AbilityRecord::new("Overgrow"), AbilityRecord::new("Chlorophyll")],
        );

        let mut bulbasaur = CreatureRecord::new(DexNumber::new(1).unwrap());
        bulbasaur.identity.abilities = vec!["Overgrow".to_string()];
        bulbasaur.identity.hidden_ability = Some("Chlorophyll".to_string());

        refresh_holders(&mut set, [&bulbasaur]);

        assert!(set["Overgrow"].holders.contains(&bulbasaur.id));
        assert!(set["Chlorophyll"].holders.contains(&bulbasaur.id));
    }

    #[test]
    fn test_refresh_holders_drops_former_holders() {
        let mut set = BTreeMap::new();
        upsert_abilities(
            &mut set,
            vec![AbilityRecord::new("Blaze"), AbilityRecord::new("Overgrow")],
        );

        let mut creature = CreatureRecord::new(DexNumber::new(1).unwrap());
        creature.identity.abilities = vec!["Blaze".to_string()];
        refresh_holders(&mut set, [&creature]);
        assert!(set["Blaze"].holders.contains(&creature.id));

        creature.identity.abilities = vec!["Overgrow".to_string()];
        refresh_holders(&mut set, [&creature]);

        assert!(set["Blaze"].holders.is_empty());
        assert!(set["Overgrow"].holders.contains(&creature.id));
    }
}
