//! Primary attributes, derived secondary attributes, and resource math.
//!
//! Secondary attributes are never stored on a mob; they are recomputed from
//! primaries, equipment, and passive effects whenever asked for. The weights
//! here are the single source of truth for that derivation.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{HEALTH_PER_VITALITY, MANA_PER_WISDOM};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum Attribute {
    Strength,
    Agility,
    Intellect,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Strength, Attribute::Agility, Attribute::Intellect];

    pub fn label(self) -> &'static str {
        match self {
            Attribute::Strength => "strength",
            Attribute::Agility => "agility",
            Attribute::Intellect => "intellect",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum SecondaryAttribute {
    AttackPower,
    Vitality,
    Defense,
    CritRate,
    Avoidance,
    Accuracy,
    Endurance,
    SpellPower,
    Wisdom,
    Resilience,
}

impl SecondaryAttribute {
    pub const ALL: [SecondaryAttribute; 10] = [
        SecondaryAttribute::AttackPower,
        SecondaryAttribute::Vitality,
        SecondaryAttribute::Defense,
        SecondaryAttribute::CritRate,
        SecondaryAttribute::Avoidance,
        SecondaryAttribute::Accuracy,
        SecondaryAttribute::Endurance,
        SecondaryAttribute::SpellPower,
        SecondaryAttribute::Wisdom,
        SecondaryAttribute::Resilience,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SecondaryAttribute::AttackPower => "attack power",
            SecondaryAttribute::Vitality => "vitality",
            SecondaryAttribute::Defense => "defense",
            SecondaryAttribute::CritRate => "crit rate",
            SecondaryAttribute::Avoidance => "avoidance",
            SecondaryAttribute::Accuracy => "accuracy",
            SecondaryAttribute::Endurance => "endurance",
            SecondaryAttribute::SpellPower => "spell power",
            SecondaryAttribute::Wisdom => "wisdom",
            SecondaryAttribute::Resilience => "resilience",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum Resource {
    Health,
    Mana,
    Exhaustion,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Health, Resource::Mana, Resource::Exhaustion];

    pub fn label(self) -> &'static str {
        match self {
            Resource::Health => "health",
            Resource::Mana => "mana",
            Resource::Exhaustion => "exhaustion",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A full set of primary attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct AttributeSet {
    pub strength: f64,
    pub agility: f64,
    pub intellect: f64,
}

impl AttributeSet {
    pub fn new(strength: f64, agility: f64, intellect: f64) -> Self {
        Self { strength, agility, intellect }
    }

    pub fn get(&self, attr: Attribute) -> f64 {
        match attr {
            Attribute::Strength => self.strength,
            Attribute::Agility => self.agility,
            Attribute::Intellect => self.intellect,
        }
    }

    pub fn get_mut(&mut self, attr: Attribute) -> &mut f64 {
        match attr {
            Attribute::Strength => &mut self.strength,
            Attribute::Agility => &mut self.agility,
            Attribute::Intellect => &mut self.intellect,
        }
    }

    pub fn add(&self, other: &AttributeSet) -> AttributeSet {
        AttributeSet {
            strength: self.strength + other.strength,
            agility: self.agility + other.agility,
            intellect: self.intellect + other.intellect,
        }
    }

    pub fn scale(&self, factor: f64) -> AttributeSet {
        AttributeSet {
            strength: self.strength * factor,
            agility: self.agility * factor,
            intellect: self.intellect * factor,
        }
    }

    pub fn apply_bonuses(&self, bonuses: &BTreeMap<Attribute, f64>) -> AttributeSet {
        let mut out = *self;
        for (attr, bonus) in bonuses {
            *out.get_mut(*attr) += bonus;
        }
        out
    }
}

/// A full set of secondary attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct SecondarySet {
    pub attack_power: f64,
    pub vitality: f64,
    pub defense: f64,
    pub crit_rate: f64,
    pub avoidance: f64,
    pub accuracy: f64,
    pub endurance: f64,
    pub spell_power: f64,
    pub wisdom: f64,
    pub resilience: f64,
}

impl SecondarySet {
    pub fn get(&self, attr: SecondaryAttribute) -> f64 {
        match attr {
            SecondaryAttribute::AttackPower => self.attack_power,
            SecondaryAttribute::Vitality => self.vitality,
            SecondaryAttribute::Defense => self.defense,
            SecondaryAttribute::CritRate => self.crit_rate,
            SecondaryAttribute::Avoidance => self.avoidance,
            SecondaryAttribute::Accuracy => self.accuracy,
            SecondaryAttribute::Endurance => self.endurance,
            SecondaryAttribute::SpellPower => self.spell_power,
            SecondaryAttribute::Wisdom => self.wisdom,
            SecondaryAttribute::Resilience => self.resilience,
        }
    }

    pub fn get_mut(&mut self, attr: SecondaryAttribute) -> &mut f64 {
        match attr {
            SecondaryAttribute::AttackPower => &mut self.attack_power,
            SecondaryAttribute::Vitality => &mut self.vitality,
            SecondaryAttribute::Defense => &mut self.defense,
            SecondaryAttribute::CritRate => &mut self.crit_rate,
            SecondaryAttribute::Avoidance => &mut self.avoidance,
            SecondaryAttribute::Accuracy => &mut self.accuracy,
            SecondaryAttribute::Endurance => &mut self.endurance,
            SecondaryAttribute::SpellPower => &mut self.spell_power,
            SecondaryAttribute::Wisdom => &mut self.wisdom,
            SecondaryAttribute::Resilience => &mut self.resilience,
        }
    }

    pub fn apply_bonuses(&mut self, bonuses: &BTreeMap<SecondaryAttribute, f64>) {
        for (attr, bonus) in bonuses {
            *self.get_mut(*attr) += bonus;
        }
    }
}

/// Derivation weight of one primary attribute onto one secondary attribute.
fn weight(primary: Attribute, secondary: SecondaryAttribute) -> f64 {
    use Attribute::*;
    use SecondaryAttribute::*;
    match (primary, secondary) {
        (Strength, AttackPower) | (Strength, Vitality) | (Strength, Defense) => 0.5,
        (Agility, CritRate) | (Agility, Avoidance) | (Agility, Accuracy) => 0.2,
        (Agility, Endurance) => 1.0,
        (Intellect, SpellPower) | (Intellect, Wisdom) | (Intellect, Resilience) => 0.5,
        _ => 0.0,
    }
}

/// Derive secondaries from a base set and a primary set:
/// `secondary = base + sum(weight * primary)`.
pub fn derive_secondary(base: &SecondarySet, primary: &AttributeSet) -> SecondarySet {
    let mut out = *base;
    for sec in SecondaryAttribute::ALL {
        let mut v = out.get(sec);
        for pri in Attribute::ALL {
            v += weight(pri, sec) * primary.get(pri);
        }
        *out.get_mut(sec) = v;
    }
    out
}

/// Max-health contribution of derived vitality.
pub fn health_from_vitality(vitality: f64) -> f64 {
    vitality * HEALTH_PER_VITALITY
}

/// Max-mana contribution of derived wisdom.
pub fn mana_from_wisdom(wisdom: f64) -> f64 {
    wisdom * MANA_PER_WISDOM
}

/// Round half-even to two decimal places.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let floor = scaled.floor();
    let frac = scaled - floor;
    let rounded = if (frac - 0.5).abs() < 1e-9 {
        // Ties go to the even neighbour.
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / 100.0
}

/// Display form of a stat: round half-even to two decimals, then floor.
pub fn display_stat(value: f64) -> i64 {
    round2(value).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_weights_match_published_table() {
        let primary = AttributeSet::new(10.0, 10.0, 10.0);
        let derived = derive_secondary(&SecondarySet::default(), &primary);

        assert_eq!(derived.attack_power, 5.0);
        assert_eq!(derived.vitality, 5.0);
        assert_eq!(derived.defense, 5.0);
        assert_eq!(derived.crit_rate, 2.0);
        assert_eq!(derived.avoidance, 2.0);
        assert_eq!(derived.accuracy, 2.0);
        assert_eq!(derived.endurance, 10.0);
        assert_eq!(derived.spell_power, 5.0);
        assert_eq!(derived.wisdom, 5.0);
        assert_eq!(derived.resilience, 5.0);
    }

    #[test]
    fn secondary_derivation_adds_to_base() {
        let base = SecondarySet { accuracy: 3.0, ..SecondarySet::default() };
        let primary = AttributeSet::new(0.0, 5.0, 0.0);
        let derived = derive_secondary(&base, &primary);
        assert_eq!(derived.accuracy, 4.0);
    }

    #[test]
    fn derivation_is_linear_in_primaries() {
        let base = SecondarySet::default();
        for (s, a, i) in [(1.0, 2.0, 3.0), (7.5, 0.0, 12.25), (100.0, 55.0, 31.0)] {
            let primary = AttributeSet::new(s, a, i);
            let derived = derive_secondary(&base, &primary);
            assert!((derived.attack_power - s * 0.5).abs() < 1e-9);
            assert!((derived.endurance - a).abs() < 1e-9);
            assert!((derived.crit_rate - a * 0.2).abs() < 1e-9);
            assert!((derived.spell_power - i * 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn resource_contributions_use_published_constants() {
        assert_eq!(health_from_vitality(7.0), 14.0);
        assert_eq!(mana_from_wisdom(4.5), 9.0);
    }

    #[test]
    fn round2_is_half_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.135), 0.14);
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(2.675), 2.68);
    }

    #[test]
    fn display_stat_floors_after_rounding() {
        assert_eq!(display_stat(9.994), 9);
        assert_eq!(display_stat(10.0), 10);
        assert_eq!(display_stat(9.999), 10);
    }
}
