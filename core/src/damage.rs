//! Damage kinds and per-mob damage relationships.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum DamageType {
    Slash,
    Pierce,
    Blunt,
    Fire,
    Frost,
    Lightning,
    Poison,
    Holy,
    Shadow,
    Arcane,
}

impl DamageType {
    pub const ALL: [DamageType; 10] = [
        DamageType::Slash,
        DamageType::Pierce,
        DamageType::Blunt,
        DamageType::Fire,
        DamageType::Frost,
        DamageType::Lightning,
        DamageType::Poison,
        DamageType::Holy,
        DamageType::Shadow,
        DamageType::Arcane,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DamageType::Slash => "slash",
            DamageType::Pierce => "pierce",
            DamageType::Blunt => "blunt",
            DamageType::Fire => "fire",
            DamageType::Frost => "frost",
            DamageType::Lightning => "lightning",
            DamageType::Poison => "poison",
            DamageType::Holy => "holy",
            DamageType::Shadow => "shadow",
            DamageType::Arcane => "arcane",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a mob reacts to one damage type. Absence of an entry means normal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum DamageRelation {
    Immune,
    Resist,
    Vulnerable,
}

impl DamageRelation {
    /// Multiplier applied to incoming damage of the related type.
    pub fn multiplier(self) -> f64 {
        match self {
            DamageRelation::Immune => 0.0,
            DamageRelation::Resist => 0.5,
            DamageRelation::Vulnerable => 2.0,
        }
    }

    /// Merge priority: IMMUNE beats RESIST beats VULNERABLE.
    fn rank(self) -> u8 {
        match self {
            DamageRelation::Immune => 2,
            DamageRelation::Resist => 1,
            DamageRelation::Vulnerable => 0,
        }
    }
}

/// A mob-level relationship table, merged from race and job archetypes.
pub type RelationTable = BTreeMap<DamageType, DamageRelation>;

/// Merge race and job relationship tables.
///
/// Higher-priority relations win; on equal priority the race entry wins.
pub fn merge_relations(race: &RelationTable, job: &RelationTable) -> RelationTable {
    let mut merged = race.clone();
    for (kind, job_rel) in job {
        match merged.get(kind) {
            Some(race_rel) if race_rel.rank() >= job_rel.rank() => {}
            _ => {
                merged.insert(*kind, *job_rel);
            }
        }
    }
    merged
}

/// Multiplier for `kind` under `table`, `1.0` when unrelated.
pub fn relation_multiplier(table: &RelationTable, kind: DamageType) -> f64 {
    table.get(&kind).map_or(1.0, |rel| rel.multiplier())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_multipliers_match_published_ratios() {
        assert_eq!(DamageRelation::Immune.multiplier(), 0.0);
        assert_eq!(DamageRelation::Resist.multiplier(), 0.5);
        assert_eq!(DamageRelation::Vulnerable.multiplier(), 2.0);
    }

    #[test]
    fn merge_prefers_higher_priority() {
        let mut race = RelationTable::new();
        race.insert(DamageType::Fire, DamageRelation::Vulnerable);
        let mut job = RelationTable::new();
        job.insert(DamageType::Fire, DamageRelation::Immune);

        let merged = merge_relations(&race, &job);
        assert_eq!(merged[&DamageType::Fire], DamageRelation::Immune);
    }

    #[test]
    fn merge_resolves_equal_priority_to_race() {
        let mut race = RelationTable::new();
        race.insert(DamageType::Frost, DamageRelation::Resist);
        let mut job = RelationTable::new();
        job.insert(DamageType::Frost, DamageRelation::Resist);

        let merged = merge_relations(&race, &job);
        assert_eq!(merged[&DamageType::Frost], DamageRelation::Resist);
    }

    #[test]
    fn merge_keeps_disjoint_entries() {
        let mut race = RelationTable::new();
        race.insert(DamageType::Poison, DamageRelation::Immune);
        let mut job = RelationTable::new();
        job.insert(DamageType::Holy, DamageRelation::Vulnerable);

        let merged = merge_relations(&race, &job);
        assert_eq!(merged.len(), 2);
        assert_eq!(relation_multiplier(&merged, DamageType::Poison), 0.0);
        assert_eq!(relation_multiplier(&merged, DamageType::Holy), 2.0);
        assert_eq!(relation_multiplier(&merged, DamageType::Slash), 1.0);
    }
}
