// ⚖️ Reconciliation Engine - Merge both sources into one record per creature
//
// Precedence is decided per field group, never per record:
//
//   for each id in existing ∪ incoming:
//     identity / stats / physical / breeding / mechanics / evolution
//         → highest rank with a non-empty value wins, unknowns backfilled
//     appearances
//         → per game key, per field, lowest rank applied first
//
// Equal ranks that disagree keep the existing value and record a conflict,
// except for the evolution chain, where the run aborts. Referential
// integrity (games, abilities) is checked before anything is merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::entities::{refresh_holders, Appearance, CreatureRecord, DexNumber, FieldGroup, GroupValue, Known};
use crate::error::{ReconcileError, ValidationError};
use crate::normalize::NormalizedRecord;
use crate::parser::SourceKind;
use crate::precedence::PrecedencePolicy;
use crate::store::Store;

// ============================================================================
// MERGE REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The existing canonical value was kept
    KeptExisting,

    /// There was no existing value, so the field stays unknown
    LeftUnknown,
}

/// Equally ranked sources disagreed on a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: DexNumber,

    /// Field group name, or `appearances.<game>.<field>`
    pub field: String,

    pub existing_value: Value,

    /// Each disagreeing source's value, keyed by source code
    pub incoming_value: Value,

    pub resolution: Resolution,
}

/// A field a lenient normalization left unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub id: DexNumber,
    pub source: SourceKind,
    pub origin: String,
    pub error: ValidationError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub run_id: String,
    pub reconciled_at: DateTime<Utc>,
    pub updated_ids: Vec<DexNumber>,
    pub added_ids: Vec<DexNumber>,
    pub conflicts: Vec<Conflict>,
    pub field_issues: Vec<FieldIssue>,
}

impl MergeReport {
    fn new() -> Self {
        MergeReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            reconciled_at: Utc::now(),
            updated_ids: Vec::new(),
            added_ids: Vec::new(),
            conflicts: Vec::new(),
            field_issues: Vec::new(),
        }
    }

    /// Nothing added, updated or disputed (field issues are informational)
    pub fn is_empty(&self) -> bool {
        self.updated_ids.is_empty() && self.added_ids.is_empty() && self.conflicts.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} added, {} updated, {} conflict(s), {} field issue(s)",
            self.added_ids.len(),
            self.updated_ids.len(),
            self.conflicts.len(),
            self.field_issues.len()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    policy: PrecedencePolicy,
}

impl Reconciler {
    pub fn new(policy: PrecedencePolicy) -> Result<Self, ReconcileError> {
        policy.validate()?;
        Ok(Reconciler { policy })
    }

    pub fn policy(&self) -> &PrecedencePolicy {
        &self.policy
    }

    /// Merge incoming records into a copy of `existing`. The input store is
    /// never mutated; on error nothing is returned.
    pub fn reconcile(
        &self,
        existing: &Store,
        incoming: &[NormalizedRecord],
    ) -> Result<(Store, MergeReport), ReconcileError> {
        check_integrity(existing, incoming)?;

        let mut report = MergeReport::new();
        let mut merged = existing.clone();

        let mut by_id: BTreeMap<DexNumber, Vec<&NormalizedRecord>> = BTreeMap::new();
        for record in incoming {
            by_id.entry(record.id()).or_default().push(record);

            for issue in &record.issues {
                warn!(id = %record.id(), source = %record.source, %issue, "field left unknown");
                report.field_issues.push(FieldIssue {
                    id: record.id(),
                    source: record.source,
                    origin: record.origin.clone(),
                    error: issue.clone(),
                });
            }
        }

        for (id, records) in by_id {
            let base = existing.creatures.get(&id);
            let record = self.merge_record(id, base, &records, &mut report.conflicts)?;

            match base {
                None => {
                    debug!(%id, "added");
                    report.added_ids.push(id);
                }
                Some(previous) if *previous != record => {
                    debug!(%id, "updated");
                    report.updated_ids.push(id);
                }
                Some(_) => {}
            }

            merged.creatures.insert(id, record);
        }

        // Holders follow the creatures; an empty run leaves the store as loaded
        if !incoming.is_empty() {
            refresh_holders(&mut merged.abilities, merged.creatures.values());
        }

        info!(run_id = %report.run_id, "{}", report.summary());
        Ok((merged, report))
    }

    fn merge_record(
        &self,
        id: DexNumber,
        base: Option<&CreatureRecord>,
        records: &[&NormalizedRecord],
        conflicts: &mut Vec<Conflict>,
    ) -> Result<CreatureRecord, ReconcileError> {
        let base = base.cloned().unwrap_or_else(|| CreatureRecord::new(id));

        Ok(CreatureRecord {
            id,
            identity: self.merge_group(id, FieldGroup::Identity, &base.identity, records, |r| &r.identity, conflicts)?,
            stats: self.merge_group(id, FieldGroup::Stats, &base.stats, records, |r| &r.stats, conflicts)?,
            physical: self.merge_group(id, FieldGroup::Physical, &base.physical, records, |r| &r.physical, conflicts)?,
            breeding: self.merge_group(id, FieldGroup::Breeding, &base.breeding, records, |r| &r.breeding, conflicts)?,
            mechanics: self.merge_group(id, FieldGroup::Mechanics, &base.mechanics, records, |r| &r.mechanics, conflicts)?,
            evolution: self.merge_group(id, FieldGroup::Evolution, &base.evolution, records, |r| &r.evolution, conflicts)?,
            appearances: self.merge_appearance_tiers(id, &base.appearances, records, conflicts),
        })
    }

    /// Highest rank with a non-empty value wins; the winner's unknowns are
    /// filled from the existing value.
    fn merge_group<T, F>(
        &self,
        id: DexNumber,
        group: FieldGroup,
        existing: &T,
        records: &[&NormalizedRecord],
        pick: F,
        conflicts: &mut Vec<Conflict>,
    ) -> Result<T, ReconcileError>
    where
        T: GroupValue,
        F: Fn(&CreatureRecord) -> &T,
    {
        for (_, sources) in self.policy.tiers(group) {
            let candidates: Vec<(SourceKind, &T)> = records
                .iter()
                .filter(|r| sources.contains(&r.source))
                .map(|r| (r.source, pick(&r.record)))
                .filter(|(_, value)| !value.is_empty())
                .collect();

            let Some(((_, first), rest)) = candidates.split_first() else {
                continue;
            };

            // Tied sources agree when neither contradicts a known part of the other
            let mut combined = (*first).clone();
            let mut disagree = false;
            for (_, value) in rest {
                let left = combined.clone().backfill(value);
                let right = (*value).clone().backfill(&combined);
                if left != right {
                    disagree = true;
                    break;
                }
                combined = left;
            }

            if !disagree {
                return Ok(combined.backfill(existing));
            }

            if group.is_structural() {
                return Err(ReconcileError::StructuralConflict {
                    id,
                    group: group.name().to_string(),
                });
            }

            let incoming_value: Map<String, Value> = candidates
                .iter()
                .map(|(source, value)| (source.code().to_string(), to_json(*value)))
                .collect();

            let resolution = if existing.is_empty() {
                Resolution::LeftUnknown
            } else {
                Resolution::KeptExisting
            };

            warn!(%id, %group, ?resolution, "equally ranked sources disagree");
            conflicts.push(Conflict {
                id,
                field: group.name().to_string(),
                existing_value: to_json(existing),
                incoming_value: Value::Object(incoming_value),
                resolution,
            });
            return Ok(existing.clone());
        }

        // No source defines the group
        Ok(existing.clone())
    }

    /// Apply appearance tiers lowest rank first so higher ranks overwrite.
    fn merge_appearance_tiers(
        &self,
        id: DexNumber,
        existing: &BTreeMap<String, Appearance>,
        records: &[&NormalizedRecord],
        conflicts: &mut Vec<Conflict>,
    ) -> BTreeMap<String, Appearance> {
        let mut merged = existing.clone();

        for (_, sources) in self.policy.tiers(FieldGroup::Appearances).into_iter().rev() {
            // (game, field) → values per source in this tier
            let mut offered: BTreeMap<(String, &'static str), Vec<(SourceKind, Value)>> = BTreeMap::new();
            let mut tier: BTreeMap<String, Appearance> = BTreeMap::new();

            for record in records.iter().filter(|r| sources.contains(&r.source)) {
                for (game, appearance) in &record.record.appearances {
                    // A bare key still records the appearance
                    tier.entry(game.clone()).or_default();
                    for (field, value) in appearance_fields(appearance) {
                        offered
                            .entry((game.clone(), field))
                            .or_default()
                            .push((record.source, value));
                    }
                }
            }

            for ((game, field), values) in offered {
                let first = &values[0].1;
                if values.iter().all(|(_, v)| v == first) {
                    set_appearance_field(tier.entry(game).or_default(), field, first);
                    continue;
                }

                let existing_value = merged
                    .get(&game)
                    .and_then(|a| appearance_fields(a).into_iter().find(|(f, _)| *f == field))
                    .map(|(_, v)| v);

                let resolution = if existing_value.is_some() {
                    Resolution::KeptExisting
                } else {
                    Resolution::LeftUnknown
                };

                let path = format!("appearances.{}.{}", game, field);
                warn!(%id, field = %path, ?resolution, "equally ranked sources disagree");
                conflicts.push(Conflict {
                    id,
                    field: path,
                    existing_value: existing_value.unwrap_or(Value::Null),
                    incoming_value: Value::Object(
                        values
                            .into_iter()
                            .map(|(source, v)| (source.code().to_string(), v))
                            .collect(),
                    ),
                    resolution,
                });
            }

            merged = merge_appearances(&merged, &tier);
        }

        merged
    }
}

/// Reconcile with a policy in one call
pub fn reconcile(
    existing: &Store,
    incoming: &[NormalizedRecord],
    policy: &PrecedencePolicy,
) -> Result<(Store, MergeReport), ReconcileError> {
    Reconciler::new(policy.clone())?.reconcile(existing, incoming)
}

/// Every game and ability an incoming record names must already be known
fn check_integrity(existing: &Store, incoming: &[NormalizedRecord]) -> Result<(), ReconcileError> {
    for normalized in incoming {
        let record = &normalized.record;

        if let Some(game) = record
            .appearances
            .keys()
            .find(|game| !existing.games.contains_key(*game))
        {
            return Err(ReconcileError::UnknownGame {
                id: record.id,
                game: game.clone(),
            });
        }

        if let Some(ability) = record
            .identity
            .all_abilities()
            .find(|ability| !existing.abilities.contains_key(*ability))
        {
            return Err(ReconcileError::UnknownAbility {
                id: record.id,
                ability: ability.clone(),
            });
        }
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// APPEARANCES (pure)
// ============================================================================

/// Merge per game key: new keys are added even without details, existing
/// keys are overwritten field by field, and only where the incoming field
/// is non-empty.
pub fn merge_appearances(
    existing: &BTreeMap<String, Appearance>,
    incoming: &BTreeMap<String, Appearance>,
) -> BTreeMap<String, Appearance> {
    let mut merged = existing.clone();

    for (game, update) in incoming {
        if update.is_empty() {
            merged.entry(game.clone()).or_default();
            continue;
        }
        let target = merged.entry(game.clone()).or_default();

        if update.regional_index.is_known() {
            target.regional_index = update.regional_index;
        }
        if update.available.is_some() {
            target.available = update.available;
        }
        if update.location.is_some() {
            target.location = update.location.clone();
        }
        if update.flavor_text.is_some() {
            target.flavor_text = update.flavor_text.clone();
        }
    }

    merged
}

/// Non-empty fields of an appearance as comparable JSON values
fn appearance_fields(appearance: &Appearance) -> Vec<(&'static str, Value)> {
    let mut fields = Vec::new();
    if let Some(index) = appearance.regional_index.get() {
        fields.push(("regional_index", json!(index)));
    }
    if let Some(available) = appearance.available {
        fields.push(("available", json!(available)));
    }
    if let Some(location) = &appearance.location {
        fields.push(("location", json!(location)));
    }
    if let Some(text) = &appearance.flavor_text {
        fields.push(("flavor_text", json!(text)));
    }
    fields
}

fn set_appearance_field(appearance: &mut Appearance, field: &str, value: &Value) {
    match field {
        "regional_index" => {
            if let Some(index) = value.as_u64().and_then(|i| u32::try_from(i).ok()) {
                appearance.regional_index = Known::Value(index);
            }
        }
        "available" => appearance.available = value.as_bool(),
        "location" => appearance.location = value.as_str().map(str::to_string),
        "flavor_text" => appearance.flavor_text = value.as_str().map(str::to_string),
        _ => {}
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AbilityRecord, EvolutionEdge, GameRecord, Known};
    use std::collections::BTreeSet;

    fn dex(n: u16) -> DexNumber {
        DexNumber::new(n).unwrap()
    }

    fn game(name: &str) -> GameRecord {
        GameRecord {
            name: name.to_string(),
            generation: 1,
            region: "Kanto".to_string(),
            release_group: BTreeSet::new(),
            release_year: Some(1996),
            platform: None,
        }
    }

    fn reference_store() -> Store {
        let mut store = Store::new();
        for name in ["Red", "Blue"] {
            store.games.insert(name.to_string(), game(name));
        }
        store
            .abilities
            .insert("Overgrow".to_string(), AbilityRecord::new("Overgrow"));
        store
    }

    fn incoming(source: SourceKind, record: CreatureRecord) -> NormalizedRecord {
        NormalizedRecord {
            source,
            origin: "test".to_string(),
            record,
            issues: Vec::new(),
        }
    }

    fn red_appearance() -> Appearance {
        Appearance {
            regional_index: Known::Value(1),
            available: Some(true),
            location: Some("Pallet Town".to_string()),
            flavor_text: None,
        }
    }

    /// Existing 0001 with hp=45 and no appearances
    fn scenario_store() -> Store {
        let mut store = reference_store();
        let mut bulbasaur = CreatureRecord::new(dex(1));
        bulbasaur.identity.name = Some("Bulbasaur".to_string());
        bulbasaur.stats.hp = Known::Value(45);
        store.creatures.insert(bulbasaur.id, bulbasaur);
        store
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(PrecedencePolicy::default()).unwrap()
    }

    #[test]
    fn test_idempotence_with_no_incoming() {
        let store = scenario_store();
        let (merged, report) = reconciler().reconcile(&store, &[]).unwrap();

        assert_eq!(merged, store);
        assert!(report.is_empty());
    }

    #[test]
    fn test_reconciling_twice_is_stable() {
        let store = scenario_store();
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.stats.attack = Known::Value(49);
        let batch = vec![incoming(SourceKind::Spreadsheet, sheet)];

        let (once, first) = reconciler().reconcile(&store, &batch).unwrap();
        let (twice, second) = reconciler().reconcile(&once, &batch).unwrap();

        assert_eq!(first.updated_ids, vec![dex(1)]);
        assert_eq!(once, twice);
        assert!(second.is_empty());
    }

    #[test]
    fn test_scenario_0001() {
        let store = scenario_store();

        let mut web = CreatureRecord::new(dex(1));
        web.appearances.insert("Red".to_string(), red_appearance());

        let mut sheet = CreatureRecord::new(dex(1));
        sheet.stats.hp = Known::Value(45);
        sheet.stats.attack = Known::Value(49);

        let batch = vec![
            incoming(SourceKind::Web, web),
            incoming(SourceKind::Spreadsheet, sheet),
        ];

        let (merged, report) = reconciler().reconcile(&store, &batch).unwrap();
        let record = merged.get(dex(1)).unwrap();

        assert_eq!(record.stats.hp, Known::Value(45));
        assert_eq!(record.stats.attack, Known::Value(49));
        assert_eq!(record.appearances["Red"], red_appearance());
        assert_eq!(record.identity.name.as_deref(), Some("Bulbasaur"));
        assert!(report.conflicts.is_empty());
        assert_eq!(report.updated_ids, vec![dex(1)]);

        // Input store untouched
        assert!(store.get(dex(1)).unwrap().appearances.is_empty());
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_priority_correctness() {
        let store = reference_store();

        let mut web = CreatureRecord::new(dex(4));
        web.stats.hp = Known::Value(40);
        let mut sheet = CreatureRecord::new(dex(4));
        sheet.stats.hp = Known::Value(39);

        let batch = vec![
            incoming(SourceKind::Web, web),
            incoming(SourceKind::Spreadsheet, sheet),
        ];

        let (merged, report) = reconciler().reconcile(&store, &batch).unwrap();

        assert_eq!(merged.get(dex(4)).unwrap().stats.hp, Known::Value(39));
        assert_eq!(report.added_ids, vec![dex(4)]);
    }

    #[test]
    fn test_monotonicity_empty_group_keeps_existing() {
        let mut store = scenario_store();
        store
            .creatures
            .get_mut(&dex(1))
            .unwrap()
            .breeding
            .egg_groups = vec!["Monster".to_string()];

        let sheet = CreatureRecord::new(dex(1));
        let (merged, _) = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Spreadsheet, sheet)])
            .unwrap();

        assert_eq!(
            merged.get(dex(1)).unwrap().breeding,
            store.get(dex(1)).unwrap().breeding
        );
    }

    #[test]
    fn test_unknown_game_aborts() {
        let store = scenario_store();
        let mut web = CreatureRecord::new(dex(1));
        web.appearances.insert("Pokemon Gray".to_string(), red_appearance());

        let err = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Web, web)])
            .unwrap_err();

        assert!(matches!(err, ReconcileError::UnknownGame { .. }));
    }

    #[test]
    fn test_unknown_ability_aborts() {
        let store = scenario_store();
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.identity.hidden_ability = Some("Chlorophyll".to_string());

        let err = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Spreadsheet, sheet)])
            .unwrap_err();

        assert_eq!(
            err,
            ReconcileError::UnknownAbility {
                id: dex(1),
                ability: "Chlorophyll".to_string()
            }
        );
    }

    #[test]
    fn test_equal_rank_disagreement_keeps_existing() {
        let store = scenario_store();
        let policy = PrecedencePolicy::default()
            .with_rank(FieldGroup::Stats, SourceKind::Web, 2)
            .with_rank(FieldGroup::Stats, SourceKind::Spreadsheet, 2);

        let mut web = CreatureRecord::new(dex(1));
        web.stats.hp = Known::Value(50);
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.stats.hp = Known::Value(55);

        let (merged, report) = reconcile(
            &store,
            &[incoming(SourceKind::Web, web), incoming(SourceKind::Spreadsheet, sheet)],
            &policy,
        )
        .unwrap();

        assert_eq!(merged.get(dex(1)).unwrap().stats.hp, Known::Value(45));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].field, "stats");
        assert_eq!(report.conflicts[0].resolution, Resolution::KeptExisting);
        assert_eq!(report.conflicts[0].incoming_value["web"]["hp"], json!(50));
    }

    #[test]
    fn test_equal_rank_compatible_values_combine() {
        let store = reference_store();
        let policy = PrecedencePolicy::default()
            .with_rank(FieldGroup::Stats, SourceKind::Web, 2)
            .with_rank(FieldGroup::Stats, SourceKind::Spreadsheet, 2);

        let mut web = CreatureRecord::new(dex(7));
        web.stats.hp = Known::Value(44);
        let mut sheet = CreatureRecord::new(dex(7));
        sheet.stats.hp = Known::Value(44);
        sheet.stats.attack = Known::Value(48);

        let (merged, report) = reconcile(
            &store,
            &[incoming(SourceKind::Web, web), incoming(SourceKind::Spreadsheet, sheet)],
            &policy,
        )
        .unwrap();

        assert!(report.conflicts.is_empty());
        assert_eq!(merged.get(dex(7)).unwrap().stats.attack, Known::Value(48));
    }

    #[test]
    fn test_equal_rank_evolution_disagreement_aborts() {
        let store = reference_store();
        let policy = PrecedencePolicy::default()
            .with_rank(FieldGroup::Evolution, SourceKind::Spreadsheet, 2);

        let edge = |trigger: &str| EvolutionEdge {
            from: dex(1),
            to: dex(2),
            trigger: trigger.to_string(),
        };
        let mut web = CreatureRecord::new(dex(1));
        web.evolution.chain = vec![edge("Level 16")];
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.evolution.chain = vec![edge("Level 18")];

        let err = reconcile(
            &store,
            &[incoming(SourceKind::Web, web), incoming(SourceKind::Spreadsheet, sheet)],
            &policy,
        )
        .unwrap_err();

        assert!(matches!(err, ReconcileError::StructuralConflict { .. }));
    }

    #[test]
    fn test_appearance_tie_records_field_conflict() {
        let store = reference_store();
        let policy = PrecedencePolicy::default()
            .with_rank(FieldGroup::Appearances, SourceKind::Spreadsheet, 2);

        let mut web = CreatureRecord::new(dex(1));
        web.appearances.insert("Red".to_string(), red_appearance());
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.appearances.insert(
            "Red".to_string(),
            Appearance {
                location: Some("Route 1".to_string()),
                ..red_appearance()
            },
        );

        let (merged, report) = reconcile(
            &store,
            &[incoming(SourceKind::Web, web), incoming(SourceKind::Spreadsheet, sheet)],
            &policy,
        )
        .unwrap();

        let red = &merged.get(dex(1)).unwrap().appearances["Red"];
        assert_eq!(red.regional_index, Known::Value(1));
        assert_eq!(red.location, None);
        assert_eq!(report.conflicts[0].field, "appearances.Red.location");
        assert_eq!(report.conflicts[0].resolution, Resolution::LeftUnknown);
    }

    #[test]
    fn test_holders_refreshed() {
        let store = reference_store();
        let mut sheet = CreatureRecord::new(dex(1));
        sheet.identity.abilities = vec!["Overgrow".to_string()];

        let (merged, _) = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Spreadsheet, sheet)])
            .unwrap();

        assert!(merged.abilities["Overgrow"].holders.contains(&dex(1)));
    }

    #[test]
    fn test_holders_follow_corrected_abilities() {
        let mut store = reference_store();
        store.abilities.insert("Blaze".to_string(), AbilityRecord::new("Blaze"));

        let mut first = CreatureRecord::new(dex(1));
        first.identity.abilities = vec!["Blaze".to_string()];
        let (store, _) = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Spreadsheet, first)])
            .unwrap();
        assert!(store.abilities["Blaze"].holders.contains(&dex(1)));

        let mut corrected = CreatureRecord::new(dex(1));
        corrected.identity.abilities = vec!["Overgrow".to_string()];
        let (merged, report) = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Spreadsheet, corrected)])
            .unwrap();

        assert_eq!(merged.creatures[&dex(1)].identity.abilities, vec!["Overgrow"]);
        assert!(merged.abilities["Blaze"].holders.is_empty());
        assert!(merged.abilities["Overgrow"].holders.contains(&dex(1)));
        assert_eq!(report.updated_ids, vec![dex(1)]);
    }

    #[test]
    fn test_idempotence_with_out_of_date_holders() {
        let mut store = reference_store();
        let mut bulbasaur = CreatureRecord::new(dex(1));
        bulbasaur.identity.abilities = vec!["Overgrow".to_string()];
        store.creatures.insert(bulbasaur.id, bulbasaur);
        assert!(store.abilities["Overgrow"].holders.is_empty());

        let (merged, report) = reconciler().reconcile(&store, &[]).unwrap();

        assert_eq!(merged, store);
        assert!(report.is_empty());
    }

    #[test]
    fn test_field_issues_ride_on_report() {
        let store = reference_store();
        let mut record = incoming(SourceKind::Web, CreatureRecord::new(dex(1)));
        record
            .issues
            .push(ValidationError::new("stats.hp", "300", "300 exceeds the maximum of 255"));

        let (_, report) = reconciler().reconcile(&store, &[record]).unwrap();

        assert_eq!(report.field_issues.len(), 1);
        assert_eq!(report.field_issues[0].error.field, "stats.hp");
    }

    // ------------------------------------------------------------------------
    // merge_appearances
    // ------------------------------------------------------------------------

    #[test]
    fn test_merge_appearances_adds_new_keys() {
        let existing = BTreeMap::from([("Red".to_string(), red_appearance())]);
        let incoming = BTreeMap::from([("Blue".to_string(), red_appearance())]);

        let merged = merge_appearances(&existing, &incoming);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["Red"], red_appearance());
    }

    #[test]
    fn test_merge_appearances_overwrites_only_non_empty_fields() {
        let existing = BTreeMap::from([("Red".to_string(), red_appearance())]);
        let incoming = BTreeMap::from([(
            "Red".to_string(),
            Appearance {
                flavor_text: Some("A strange seed was planted on its back.".to_string()),
                location: Some("Route 2".to_string()),
                ..Appearance::default()
            },
        )]);

        let merged = merge_appearances(&existing, &incoming);
        let red = &merged["Red"];

        assert_eq!(red.regional_index, Known::Value(1));
        assert_eq!(red.available, Some(true));
        assert_eq!(red.location.as_deref(), Some("Route 2"));
        assert!(red.flavor_text.is_some());
    }

    #[test]
    fn test_merge_appearances_adds_bare_new_key() {
        let existing = BTreeMap::from([("Red".to_string(), red_appearance())]);
        let incoming = BTreeMap::from([
            ("Blue".to_string(), Appearance::default()),
            ("Red".to_string(), Appearance::default()),
        ]);

        let merged = merge_appearances(&existing, &incoming);

        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["Blue", "Red"]);
        assert_eq!(merged["Blue"], Appearance::default());
        assert_eq!(merged["Red"], red_appearance());
        assert_eq!(merge_appearances(&BTreeMap::new(), &incoming).len(), 2);
    }

    #[test]
    fn test_bare_appearance_key_reaches_store() {
        let store = reference_store();
        let mut web = CreatureRecord::new(dex(1));
        web.appearances.insert("Red".to_string(), Appearance::default());

        let (merged, report) = reconciler()
            .reconcile(&store, &[incoming(SourceKind::Web, web)])
            .unwrap();

        assert!(merged.creatures[&dex(1)].appearances.contains_key("Red"));
        assert_eq!(report.added_ids, vec![dex(1)]);
    }

    #[test]
    fn test_merge_appearances_empty_incoming_is_identity() {
        let existing = BTreeMap::from([("Red".to_string(), red_appearance())]);
        let incoming = BTreeMap::from([("Red".to_string(), Appearance::default())]);

        assert_eq!(merge_appearances(&existing, &incoming), existing);
        assert_eq!(merge_appearances(&existing, &BTreeMap::new()), existing);
    }
}
