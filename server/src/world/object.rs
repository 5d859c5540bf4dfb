//! Game objects: the one entity type in the arena.
//!
//! Rooms, items and mobs share identity, naming and containment; the typed
//! payload hangs off [`ObjectKind`]. Items reuse the persisted
//! [`ItemData`] record verbatim so snapshots never diverge from the live
//! form.

use std::collections::{BTreeMap, BTreeSet};

use dusk_core::direction::Direction;
use dusk_core::records::{AbilityProgress, BehaviorFlags, EquipSlot, ItemData};

use super::{CharacterId, Coordinate, DungeonId, LinkId, ObjectId};

/// Room payload.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub dungeon: DungeonId,
    pub coord: Coordinate,
    pub links: Vec<LinkId>,
    /// Exit policy: directions this room refuses even when the grid or a
    /// tunnel would allow them.
    pub blocked_exits: BTreeSet<Direction>,
}

impl RoomState {
    pub fn new(dungeon: DungeonId, coord: Coordinate) -> Self {
        RoomState { dungeon, coord, links: Vec::new(), blocked_exits: BTreeSet::new() }
    }
}

/// One live effect on a mob. Deadlines are world-clock milliseconds;
/// `expires_at_ms == None` means the effect never expires on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInstance {
    pub id: u64,
    pub template_id: String,
    /// Weak caster reference; survives caster death as a stale oid that no
    /// longer resolves.
    pub caster: Option<ObjectId>,
    pub applied_at_ms: u64,
    pub expires_at_ms: Option<u64>,
    pub ticks_remaining: u32,
    pub next_tick_at_ms: Option<u64>,
    pub tick_amount: Option<f64>,
    pub remaining_absorption: Option<f64>,
}

/// Mob payload.
#[derive(Debug, Clone, Default)]
pub struct MobState {
    pub race_id: String,
    pub job_id: String,
    pub level: u32,
    pub experience: u64,
    pub health: f64,
    pub mana: f64,
    pub exhaustion: f64,
    /// Slot -> equipped item. Equipped items also remain in `contents`.
    pub equipped: BTreeMap<EquipSlot, ObjectId>,
    pub abilities: BTreeMap<String, AbilityProgress>,
    pub effects: Vec<EffectInstance>,
    pub character: Option<CharacterId>,
    pub combat_target: Option<ObjectId>,
    pub behavior: BehaviorFlags,
}

impl MobState {
    pub fn knows_ability(&self, ability_id: &str) -> bool {
        self.abilities.contains_key(ability_id)
    }

    pub fn proficiency(&self, ability_id: &str) -> u8 {
        self.abilities.get(ability_id).map_or(0, |p| p.proficiency)
    }

    pub fn effect_instance(&self, effect_id: u64) -> Option<&EffectInstance> {
        self.effects.iter().find(|e| e.id == effect_id)
    }

    pub fn effect_instance_mut(&mut self, effect_id: u64) -> Option<&mut EffectInstance> {
        self.effects.iter_mut().find(|e| e.id == effect_id)
    }

    pub fn has_effect_template(&self, template_id: &str) -> bool {
        self.effects.iter().any(|e| e.template_id == template_id)
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Room(RoomState),
    Item(ItemData),
    Mob(MobState),
}

#[derive(Debug, Clone)]
pub struct GameObject {
    pub oid: ObjectId,
    /// Name-matching keywords, lowercase.
    pub keywords: Vec<String>,
    pub display_name: String,
    pub description: Option<String>,
    /// Line shown when the object sits in a room ("A rusty sword lies here.").
    pub room_description: Option<String>,
    pub location: Option<ObjectId>,
    pub contents: Vec<ObjectId>,
    pub kind: ObjectKind,
}

impl GameObject {
    pub fn room(oid: ObjectId, display_name: String, state: RoomState) -> Self {
        GameObject {
            oid,
            keywords: Vec::new(),
            display_name,
            description: None,
            room_description: None,
            location: None,
            contents: Vec::new(),
            kind: ObjectKind::Room(state),
        }
    }

    pub fn item(oid: ObjectId, keywords: Vec<String>, display_name: String, data: ItemData) -> Self {
        GameObject {
            oid,
            keywords,
            display_name,
            description: None,
            room_description: None,
            location: None,
            contents: Vec::new(),
            kind: ObjectKind::Item(data),
        }
    }

    pub fn new_mob(oid: ObjectId, keywords: Vec<String>, display_name: String, state: MobState) -> Self {
        GameObject {
            oid,
            keywords,
            display_name,
            description: None,
            room_description: None,
            location: None,
            contents: Vec::new(),
            kind: ObjectKind::Mob(state),
        }
    }

    pub fn is_room(&self) -> bool {
        matches!(self.kind, ObjectKind::Room(_))
    }

    pub fn is_item(&self) -> bool {
        matches!(self.kind, ObjectKind::Item(_))
    }

    pub fn is_mob(&self) -> bool {
        matches!(self.kind, ObjectKind::Mob(_))
    }

    pub fn room_state(&self) -> Option<&RoomState> {
        match &self.kind {
            ObjectKind::Room(state) => Some(state),
            _ => None,
        }
    }

    pub fn room_state_mut(&mut self) -> Option<&mut RoomState> {
        match &mut self.kind {
            ObjectKind::Room(state) => Some(state),
            _ => None,
        }
    }

    pub fn item_data(&self) -> Option<&ItemData> {
        match &self.kind {
            ObjectKind::Item(data) => Some(data),
            _ => None,
        }
    }

    pub fn item_data_mut(&mut self) -> Option<&mut ItemData> {
        match &mut self.kind {
            ObjectKind::Item(data) => Some(data),
            _ => None,
        }
    }

    pub fn mob(&self) -> Option<&MobState> {
        match &self.kind {
            ObjectKind::Mob(state) => Some(state),
            _ => None,
        }
    }

    pub fn mob_mut(&mut self) -> Option<&mut MobState> {
        match &mut self.kind {
            ObjectKind::Mob(state) => Some(state),
            _ => None,
        }
    }

    /// True when every fragment token prefix-matches at least one keyword,
    /// case-insensitively.
    pub fn matches_fragment(&self, fragment: &[String]) -> bool {
        if fragment.is_empty() {
            return false;
        }
        fragment.iter().all(|token| {
            let token = token.to_lowercase();
            self.keywords.iter().any(|kw| kw.starts_with(&token))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sword() -> GameObject {
        GameObject::item(
            ObjectId(1),
            vec!["rusty".into(), "sword".into()],
            "a rusty sword".into(),
            ItemData::default(),
        )
    }

    #[test]
    fn fragment_matching_is_prefix_per_token() {
        let obj = sword();
        assert!(obj.matches_fragment(&["sword".into()]));
        assert!(obj.matches_fragment(&["sw".into()]));
        assert!(obj.matches_fragment(&["rus".into(), "sw".into()]));
        assert!(obj.matches_fragment(&["SWORD".into()]));
        assert!(!obj.matches_fragment(&["axe".into()]));
        assert!(!obj.matches_fragment(&["rusty".into(), "axe".into()]));
        assert!(!obj.matches_fragment(&[]));
    }

    #[test]
    fn kind_accessors_discriminate() {
        let obj = sword();
        assert!(obj.is_item());
        assert!(!obj.is_mob());
        assert!(obj.item_data().is_some());
        assert!(obj.mob().is_none());
        assert!(obj.room_state().is_none());
    }

    #[test]
    fn mob_ability_lookup() {
        let mut state = MobState::default();
        state
            .abilities
            .insert("bash".into(), AbilityProgress { uses: 30, proficiency: 50 });
        assert!(state.knows_ability("bash"));
        assert!(!state.knows_ability("fireball"));
        assert_eq!(state.proficiency("bash"), 50);
        assert_eq!(state.proficiency("fireball"), 0);
    }
}
