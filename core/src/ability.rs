//! Ability definitions and the proficiency curve.
//!
//! A mob's learned ability carries a use counter; the curve maps use counts
//! onto the four proficiency tiers. The thresholds are part of the content
//! record so different abilities can ramp at different speeds.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::damage::DamageType;
use crate::effect::EffectOverrides;

/// Use-count thresholds for reaching 25/50/75/100% proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ProficiencyCurve {
    pub thresholds: [u32; 4],
}

impl ProficiencyCurve {
    pub const TIERS: [u8; 4] = [25, 50, 75, 100];

    pub fn new(thresholds: [u32; 4]) -> Self {
        ProficiencyCurve { thresholds }
    }

    /// Proficiency percent for a given use count. Below the first threshold
    /// the ability is known but unpracticed (0%).
    pub fn proficiency_for_uses(&self, uses: u32) -> u8 {
        let mut best = 0;
        for (threshold, tier) in self.thresholds.iter().zip(Self::TIERS) {
            if uses >= *threshold {
                best = tier;
            }
        }
        best
    }
}

impl Default for ProficiencyCurve {
    fn default() -> Self {
        ProficiencyCurve { thresholds: [5, 25, 75, 200] }
    }
}

/// Resource spend required to use an ability.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct AbilityCost {
    pub mana: f64,
    pub exhaustion: f64,
}

/// What an ability does when its command fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum AbilityAction {
    /// A weapon strike at `multiplier` times normal damage.
    MeleeStrike { multiplier: f64 },
    /// A spell-power hit of the given damage type.
    MagicHit { multiplier: f64, damage_type: DamageType },
    /// Apply an effect template to the target (or self when untargeted).
    ApplyEffect { effect_id: String, overrides: EffectOverrides },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Ability {
    pub id: String,
    pub name: String,
    pub description: String,
    pub curve: ProficiencyCurve,
    /// Command pattern registered for this ability, e.g.
    /// `"'colour spray'~ <target:mob?>"`.
    pub pattern: String,
    pub cost: AbilityCost,
    pub cooldown_ms: Option<u64>,
    pub action: AbilityAction,
    /// Whether using it on a peaceful target starts combat.
    pub offensive: bool,
}

impl Ability {
    /// Damage/cost scaling for the current proficiency: 0% practice still
    /// works at half strength, 100% at full.
    pub fn proficiency_scale(proficiency: u8) -> f64 {
        0.5 + f64::from(proficiency.min(100)) / 200.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_maps_uses_to_tiers() {
        let curve = ProficiencyCurve::new([5, 25, 75, 200]);
        assert_eq!(curve.proficiency_for_uses(0), 0);
        assert_eq!(curve.proficiency_for_uses(4), 0);
        assert_eq!(curve.proficiency_for_uses(5), 25);
        assert_eq!(curve.proficiency_for_uses(24), 25);
        assert_eq!(curve.proficiency_for_uses(25), 50);
        assert_eq!(curve.proficiency_for_uses(75), 75);
        assert_eq!(curve.proficiency_for_uses(199), 75);
        assert_eq!(curve.proficiency_for_uses(200), 100);
        assert_eq!(curve.proficiency_for_uses(100_000), 100);
    }

    #[test]
    fn proficiency_scale_ramps_from_half_to_full() {
        assert_eq!(Ability::proficiency_scale(0), 0.5);
        assert_eq!(Ability::proficiency_scale(50), 0.75);
        assert_eq!(Ability::proficiency_scale(100), 1.0);
        // Corrupt values clamp rather than overscale.
        assert_eq!(Ability::proficiency_scale(250), 1.0);
    }
}
