//! Race and job archetypes.
//!
//! Archetypes are frozen content records: starting attributes, per-level
//! growth, resource caps, ability grants, passive effect ids, a growth
//! modifier curve, and optional damage relationships. A mob references one
//! race and one job by id and derives everything else.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeSet;
use crate::damage::RelationTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ArchetypeKind {
    Race,
    Job,
}

/// An ability granted by an archetype, with the proficiency it starts at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct AbilityGrant {
    pub ability_id: String,
    pub starting_proficiency: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Archetype {
    pub id: String,
    pub name: String,
    pub kind: ArchetypeKind,
    pub starting_attributes: AttributeSet,
    pub growth_per_level: AttributeSet,
    pub base_health: f64,
    pub base_mana: f64,
    pub base_exhaustion: f64,
    pub health_per_level: f64,
    pub mana_per_level: f64,
    pub abilities: Vec<AbilityGrant>,
    pub passive_effects: Vec<String>,
    /// Growth multiplier per level bracket; index `level - 1`, clamped to the
    /// last entry. Empty means flat 1.0 growth.
    pub growth_curve: Vec<f64>,
    pub damage_relations: RelationTable,
}

impl Archetype {
    pub fn growth_modifier(&self, level: u32) -> f64 {
        if self.growth_curve.is_empty() {
            return 1.0;
        }
        let idx = (level.saturating_sub(1) as usize).min(self.growth_curve.len() - 1);
        self.growth_curve[idx]
    }

    /// Primary attributes contributed by this archetype at `level`.
    pub fn attributes_at_level(&self, level: u32) -> AttributeSet {
        let levels = f64::from(level.saturating_sub(1));
        self.starting_attributes
            .add(&self.growth_per_level.scale(levels * self.growth_modifier(level)))
    }

    pub fn health_at_level(&self, level: u32) -> f64 {
        self.base_health + self.health_per_level * f64::from(level.saturating_sub(1))
    }

    pub fn mana_at_level(&self, level: u32) -> f64 {
        self.base_mana + self.mana_per_level * f64::from(level.saturating_sub(1))
    }
}
