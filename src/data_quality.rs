// ✅ Data Quality Engine - Store-wide integrity and completeness checks
//
// Runs over a loaded store (never over incoming data): every creature gets a
// scored report, and the batch summary carries per-group completion rates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{CreatureRecord, FieldGroup, GenderRatio};
use crate::store::Store;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Record breaks a store invariant
    Warning,  // Record is incomplete
    Info,     // Record is valid but could be richer
}

// ============================================================================
// PER-CREATURE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureQuality {
    pub creature_id: String,
    pub name: Option<String>,
    pub overall_quality: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
}

impl CreatureQuality {
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {:.1}% quality, {} issue(s) ({} critical)",
            self.creature_id,
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.overall_quality * 100.0,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn is_high_quality(&self) -> bool {
        self.overall_quality >= 0.8 && !self.has_critical_issues()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

// ============================================================================
// STORE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_creatures: usize,
    pub high_quality_count: usize,
    pub critical_issues_count: usize,
    pub average_quality: f64,

    /// Ids below the highest stored id that have no record
    pub missing_ids: usize,

    /// Share of creatures with data in each field group (0.0 - 1.0)
    pub group_completion: BTreeMap<FieldGroup, f64>,

    pub type_counts: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} creatures: {:.1}% quality | {} high quality, {} critical, {} missing ids",
            self.total_creatures,
            self.average_quality * 100.0,
            self.high_quality_count,
            self.critical_issues_count,
            self.missing_ids
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub creatures: Vec<CreatureQuality>,
    pub summary: BatchSummary,
}

impl QualityReport {
    pub fn has_critical_issues(&self) -> bool {
        self.summary.critical_issues_count > 0
    }

    /// Reports with at least one issue, worst severity first
    pub fn flagged(&self) -> Vec<&CreatureQuality> {
        let mut flagged: Vec<&CreatureQuality> =
            self.creatures.iter().filter(|c| !c.issues.is_empty()).collect();
        flagged.sort_by_key(|c| c.issues.iter().map(|i| i.severity).min());
        flagged
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Types per creature allowed by the games
    max_types: usize,
}

impl DataQualityEngine {
    pub fn new() -> Self {
        DataQualityEngine { max_types: 2 }
    }

    /// Validate every creature in the store and summarize
    pub fn check_store(&self, store: &Store) -> QualityReport {
        let creatures: Vec<CreatureQuality> = store
            .creatures
            .values()
            .map(|c| self.validate(c, store))
            .collect();

        let summary = self.batch_summary(store, &creatures);
        QualityReport { creatures, summary }
    }

    /// Validate one creature against the store's reference sets
    pub fn validate(&self, creature: &CreatureRecord, store: &Store) -> CreatureQuality {
        let validations = vec![
            self.validate_name(creature),
            self.validate_types(creature),
            self.validate_stats(creature),
            self.validate_total(creature),
            self.validate_gender_ratio(creature),
            self.validate_games(creature, store),
            self.validate_abilities(creature, store),
            self.validate_evolution(creature, store),
            self.validate_appearances(creature),
            self.validate_physical(creature),
        ];

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                severity: v.severity,
                field: v.field.clone(),
                issue: v.message.clone(),
            })
            .collect();

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;

        CreatureQuality {
            creature_id: creature.id.padded(),
            name: creature.identity.name.clone(),
            overall_quality: passed_count as f64 / validations.len() as f64,
            validations,
            issues,
            passed_count,
            failed_count,
        }
    }

    fn batch_summary(&self, store: &Store, reports: &[CreatureQuality]) -> BatchSummary {
        let total = reports.len();

        let average_quality = if total == 0 {
            0.0
        } else {
            reports.iter().map(|r| r.overall_quality).sum::<f64>() / total as f64
        };

        let highest = store.creatures.keys().next_back().map(|id| id.get() as usize).unwrap_or(0);

        let group_completion = FieldGroup::ALL
            .iter()
            .map(|group| {
                let filled = store.creatures.values().filter(|c| c.has_group(*group)).count();
                let rate = if total == 0 { 0.0 } else { filled as f64 / total as f64 };
                (*group, rate)
            })
            .collect();

        let mut type_counts = BTreeMap::new();
        for creature in store.creatures.values() {
            for t in &creature.identity.types {
                *type_counts.entry(t.clone()).or_insert(0) += 1;
            }
        }

        BatchSummary {
            total_creatures: total,
            high_quality_count: reports.iter().filter(|r| r.is_high_quality()).count(),
            critical_issues_count: reports.iter().filter(|r| r.has_critical_issues()).count(),
            average_quality,
            missing_ids: highest.saturating_sub(total),
            group_completion,
            type_counts,
        }
    }

    // ========================================================================
    // VALIDATION RULES
    // ========================================================================

    fn validate_name(&self, creature: &CreatureRecord) -> ValidationResult {
        match creature.name() {
            Some(name) if !name.trim().is_empty() => {
                ValidationResult::pass("name_present", "identity.name", &format!("Name present: {}", name))
            }
            _ => ValidationResult::fail("name_missing", "identity.name", "Name is missing", Severity::Critical),
        }
    }

    fn validate_types(&self, creature: &CreatureRecord) -> ValidationResult {
        let count = creature.identity.types.len();
        if count == 0 {
            return ValidationResult::fail("types_missing", "identity.types", "No types", Severity::Warning);
        }
        if count > self.max_types {
            return ValidationResult::fail(
                "types_too_many",
                "identity.types",
                &format!("{} types (at most {})", count, self.max_types),
                Severity::Critical,
            );
        }
        ValidationResult::pass("types_valid", "identity.types", "Types present")
    }

    fn validate_stats(&self, creature: &CreatureRecord) -> ValidationResult {
        if creature.stats.computed_total().is_some() {
            ValidationResult::pass("stats_complete", "stats", "All six base stats known")
        } else {
            ValidationResult::fail("stats_incomplete", "stats", "Some base stats are unknown", Severity::Warning)
        }
    }

    fn validate_total(&self, creature: &CreatureRecord) -> ValidationResult {
        match (creature.stats.computed_total(), creature.stats.total.get()) {
            (Some(sum), Some(total)) if sum != total => ValidationResult::fail(
                "stats_total_mismatch",
                "stats.total",
                &format!("Total {} does not match stat sum {}", total, sum),
                Severity::Critical,
            ),
            _ => ValidationResult::pass("stats_total_consistent", "stats.total", "Total consistent"),
        }
    }

    fn validate_gender_ratio(&self, creature: &CreatureRecord) -> ValidationResult {
        match creature.breeding.gender_ratio {
            Some(GenderRatio::Ratio { male, female }) if ((male + female) - 100.0).abs() > 0.01 => {
                ValidationResult::fail(
                    "gender_ratio_sum",
                    "breeding.gender_ratio",
                    &format!("Ratio sums to {}", male + female),
                    Severity::Critical,
                )
            }
            _ => ValidationResult::pass("gender_ratio_valid", "breeding.gender_ratio", "Ratio valid"),
        }
    }

    fn validate_games(&self, creature: &CreatureRecord, store: &Store) -> ValidationResult {
        let unknown: Vec<&str> = creature
            .appearances
            .keys()
            .filter(|g| !store.games.contains_key(*g))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            ValidationResult::pass("games_known", "appearances", "All games known")
        } else {
            ValidationResult::fail(
                "games_unknown",
                "appearances",
                &format!("Unknown games: {}", unknown.join(", ")),
                Severity::Critical,
            )
        }
    }

    fn validate_abilities(&self, creature: &CreatureRecord, store: &Store) -> ValidationResult {
        let unknown: Vec<&str> = creature
            .identity
            .all_abilities()
            .filter(|a| !store.abilities.contains_key(*a))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            ValidationResult::pass("abilities_known", "identity.abilities", "All abilities known")
        } else {
            ValidationResult::fail(
                "abilities_unknown",
                "identity.abilities",
                &format!("Unknown abilities: {}", unknown.join(", ")),
                Severity::Critical,
            )
        }
    }

    fn validate_evolution(&self, creature: &CreatureRecord, store: &Store) -> ValidationResult {
        let dangling: Vec<String> = creature
            .evolution
            .chain
            .iter()
            .flat_map(|edge| [edge.from, edge.to])
            .filter(|id| !store.creatures.contains_key(id))
            .map(|id| id.padded())
            .collect();

        if dangling.is_empty() {
            ValidationResult::pass("evolution_linked", "evolution", "Evolution chain linked")
        } else {
            ValidationResult::fail(
                "evolution_dangling",
                "evolution",
                &format!("Evolution references missing ids: {}", dangling.join(", ")),
                Severity::Warning,
            )
        }
    }

    fn validate_appearances(&self, creature: &CreatureRecord) -> ValidationResult {
        if creature.appearances.is_empty() {
            ValidationResult::fail("appearances_missing", "appearances", "No game appearances", Severity::Info)
        } else {
            ValidationResult::pass(
                "appearances_present",
                "appearances",
                &format!("{} game appearance(s)", creature.appearances.len()),
            )
        }
    }

    fn validate_physical(&self, creature: &CreatureRecord) -> ValidationResult {
        if creature.physical.height.is_some() && creature.physical.weight.is_some() {
            ValidationResult::pass("physical_present", "physical", "Height and weight present")
        } else {
            ValidationResult::fail(
                "physical_missing",
                "physical",
                "Height or weight unknown",
                Severity::Warning,
            )
        }
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
