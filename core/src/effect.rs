//! Effect templates.
//!
//! Templates are immutable content records registered at load; live instances
//! on mobs reference them by id. Durations here are in seconds; the world
//! converts to absolute millisecond deadlines when an instance is created.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::attributes::{Attribute, Resource, SecondaryAttribute};
use crate::damage::DamageType;

/// The act templates an effect may fire at its lifecycle points.
/// Placeholders: `{User}`/`{user}` is the affected mob, `{Target}`/`{target}`
/// the caster, `{damage}`/`{heal}` the tick amount.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct ActTemplates {
    pub user: Option<String>,
    pub target: Option<String>,
    pub room: Option<String>,
}

impl ActTemplates {
    pub fn room_only(room: impl Into<String>) -> Self {
        ActTemplates { user: None, target: None, room: Some(room.into()) }
    }

    pub fn user_and_room(user: impl Into<String>, room: impl Into<String>) -> Self {
        ActTemplates { user: Some(user.into()), target: None, room: Some(room.into()) }
    }
}

/// Stat and multiplier contributions of a passive effect while it is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct PassiveModifiers {
    pub attributes: BTreeMap<Attribute, f64>,
    pub secondary: BTreeMap<SecondaryAttribute, f64>,
    pub resource_max: BTreeMap<Resource, f64>,
    pub damage_dealt_multiplier: f64,
    pub damage_taken_multiplier: f64,
    pub healing_received_multiplier: f64,
}

impl Default for PassiveModifiers {
    fn default() -> Self {
        PassiveModifiers {
            attributes: BTreeMap::new(),
            secondary: BTreeMap::new(),
            resource_max: BTreeMap::new(),
            damage_dealt_multiplier: 1.0,
            damage_taken_multiplier: 1.0,
            healing_received_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum EffectKind {
    /// Contributes modifiers while active; no tick schedule.
    Passive { modifiers: PassiveModifiers },
    DamageOverTime {
        damage: f64,
        interval_secs: f64,
        ticks: u32,
        damage_type: Option<DamageType>,
        /// Offensive DoTs pull the caster into combat against peaceful
        /// targets (same room, caster alive).
        offensive: bool,
    },
    HealOverTime {
        heal: f64,
        interval_secs: f64,
        ticks: u32,
    },
    Shield {
        absorption: f64,
        /// When set, only these damage types are absorbed.
        damage_filter: Option<Vec<DamageType>>,
        /// Hard cap on absorption per incoming hit.
        max_per_hit: Option<f64>,
        /// Fraction of each incoming hit the shield consumes to absorb.
        absorption_rate: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EffectTemplate {
    pub id: String,
    pub name: String,
    pub kind: EffectKind,
    /// `None` means the effect never expires on its own (typical for racial
    /// passives). DoT/HoT effects ignore this; their lifetime is
    /// `interval * ticks`.
    pub duration_secs: Option<f64>,
    pub stackable: bool,
    pub on_apply: Option<ActTemplates>,
    pub on_expire: Option<ActTemplates>,
    pub on_tick: Option<ActTemplates>,
}

impl EffectTemplate {
    pub fn is_passive(&self) -> bool {
        matches!(self.kind, EffectKind::Passive { .. })
    }

    pub fn is_offensive(&self) -> bool {
        matches!(self.kind, EffectKind::DamageOverTime { offensive: true, .. })
    }

    /// Tick schedule `(interval_secs, ticks)` for DoT/HoT kinds.
    pub fn tick_schedule(&self) -> Option<(f64, u32)> {
        match self.kind {
            EffectKind::DamageOverTime { interval_secs, ticks, .. }
            | EffectKind::HealOverTime { interval_secs, ticks, .. } => {
                Some((interval_secs, ticks))
            }
            _ => None,
        }
    }

    /// Per-tick base amount (damage or heal) before overrides.
    pub fn base_tick_amount(&self) -> Option<f64> {
        match self.kind {
            EffectKind::DamageOverTime { damage, .. } => Some(damage),
            EffectKind::HealOverTime { heal, .. } => Some(heal),
            _ => None,
        }
    }
}

/// Scalar overrides merged onto a template when an instance is created.
/// Durations are seconds, converted to absolute deadlines at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct EffectOverrides {
    pub damage: Option<f64>,
    pub heal: Option<f64>,
    pub duration_secs: Option<f64>,
    pub interval_secs: Option<f64>,
    pub ticks: Option<u32>,
    pub absorption: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poison() -> EffectTemplate {
        EffectTemplate {
            id: "poison".into(),
            name: "Poison".into(),
            kind: EffectKind::DamageOverTime {
                damage: 5.0,
                interval_secs: 1.0,
                ticks: 3,
                damage_type: Some(DamageType::Poison),
                offensive: true,
            },
            duration_secs: None,
            stackable: false,
            on_apply: None,
            on_expire: None,
            on_tick: Some(ActTemplates::user_and_room(
                "The poison burns you for {damage}.",
                "{User} shudders from the poison.",
            )),
        }
    }

    #[test]
    fn dot_exposes_schedule_and_amount() {
        let template = poison();
        assert_eq!(template.tick_schedule(), Some((1.0, 3)));
        assert_eq!(template.base_tick_amount(), Some(5.0));
        assert!(template.is_offensive());
        assert!(!template.is_passive());
    }

    #[test]
    fn passive_has_no_schedule() {
        let template = EffectTemplate {
            id: "stoneskin".into(),
            name: "Stoneskin".into(),
            kind: EffectKind::Passive { modifiers: PassiveModifiers::default() },
            duration_secs: None,
            stackable: false,
            on_apply: None,
            on_expire: None,
            on_tick: None,
        };
        assert!(template.is_passive());
        assert_eq!(template.tick_schedule(), None);
        assert_eq!(template.base_tick_amount(), None);
    }
}
