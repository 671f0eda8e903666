// 🥇 Precedence Policy - Which source wins each field group
//
// Rank tables, not code: higher rank wins, equal ranks tie, and a source
// missing from a group's table is not eligible for that group.
//
//   [precedence.stats]        [precedence.appearances]
//   spreadsheet = 2           web = 2
//   web = 1                   spreadsheet = 1

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::FieldGroup;
use crate::error::ReconcileError;
use crate::parser::SourceKind;

pub type RankTable = BTreeMap<SourceKind, u8>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrecedencePolicy {
    groups: BTreeMap<FieldGroup, RankTable>,
}

impl PrecedencePolicy {
    /// A policy with no ranked sources (fill it with `with_rank`)
    pub fn empty() -> Self {
        PrecedencePolicy {
            groups: BTreeMap::new(),
        }
    }

    /// Builder: rank a source for a group
    pub fn with_rank(mut self, group: FieldGroup, source: SourceKind, rank: u8) -> Self {
        self.groups.entry(group).or_default().insert(source, rank);
        self
    }

    pub fn rank(&self, group: FieldGroup, source: SourceKind) -> Option<u8> {
        self.groups.get(&group).and_then(|t| t.get(&source)).copied()
    }

    /// Sources grouped by rank, highest rank first
    pub fn tiers(&self, group: FieldGroup) -> Vec<(u8, Vec<SourceKind>)> {
        let mut tiers: BTreeMap<u8, Vec<SourceKind>> = BTreeMap::new();
        if let Some(table) = self.groups.get(&group) {
            for (source, rank) in table {
                tiers.entry(*rank).or_default().push(*source);
            }
        }
        tiers.into_iter().rev().collect()
    }

    /// Every group needs at least one ranked source
    pub fn validate(&self) -> Result<(), ReconcileError> {
        for group in FieldGroup::ALL {
            let ranked = self.groups.get(&group).map(|t| t.len()).unwrap_or(0);
            if ranked == 0 {
                return Err(ReconcileError::InvalidPolicy(format!(
                    "field group '{}' has no ranked sources",
                    group
                )));
            }
        }
        Ok(())
    }

    /// Fill groups the caller left out from the default policy
    pub fn with_defaults(mut self) -> Self {
        for (group, table) in PrecedencePolicy::default().groups {
            self.groups.entry(group).or_insert(table);
        }
        self
    }
}

impl Default for PrecedencePolicy {
    /// Curated spreadsheet data outranks the web for facts; the web source
    /// tracks per-game appearances and evolution lines more completely.
    fn default() -> Self {
        let mut policy = PrecedencePolicy::empty();
        for group in FieldGroup::ALL {
            let (web, sheet) = match group {
                FieldGroup::Appearances | FieldGroup::Evolution => (2, 1),
                _ => (1, 2),
            };
            policy = policy
                .with_rank(group, SourceKind::Web, web)
                .with_rank(group, SourceKind::Spreadsheet, sheet);
        }
        policy
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_ranks() {
        let policy = PrecedencePolicy::default();

        assert_eq!(policy.rank(FieldGroup::Stats, SourceKind::Spreadsheet), Some(2));
        assert_eq!(policy.rank(FieldGroup::Stats, SourceKind::Web), Some(1));
        assert_eq!(policy.rank(FieldGroup::Appearances, SourceKind::Web), Some(2));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_tiers_group_equal_ranks() {
        let policy = PrecedencePolicy::default()
            .with_rank(FieldGroup::Physical, SourceKind::Web, 2)
            .with_rank(FieldGroup::Physical, SourceKind::Spreadsheet, 2);

        let tiers = policy.tiers(FieldGroup::Physical);
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].1.len(), 2);

        let tiers = policy.tiers(FieldGroup::Stats);
        assert_eq!(tiers[0], (2, vec![SourceKind::Spreadsheet]));
    }

    #[test]
    fn test_missing_group_is_invalid() {
        let policy = PrecedencePolicy::empty().with_rank(FieldGroup::Stats, SourceKind::Web, 1);
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("identity"));

        assert!(policy.with_defaults().validate().is_ok());
    }

    #[test]
    fn test_policy_from_toml() {
        let text = r#"
            [stats]
            web = 3
            spreadsheet = 1
        "#;

        let policy: PrecedencePolicy = toml::from_str(text).unwrap();
        let policy = policy.with_defaults();

        assert_eq!(policy.rank(FieldGroup::Stats, SourceKind::Web), Some(3));
        assert_eq!(policy.rank(FieldGroup::Identity, SourceKind::Spreadsheet), Some(2));
    }
}
