//! Conversion between the live world and detached records.
//!
//! Snapshots are the persisted shape: recursive object trees with equipped
//! sets split out of plain contents. Restoring keeps the recorded oid when
//! it is still free so that snapshot -> restore -> snapshot is structurally
//! the identity.

use dusk_core::error::EngineError;
use dusk_core::records::{
    BehaviorFlags, CharacterRecord, EffectSnapshot, MobSnapshot, ObjectSnapshot, SnapshotBody,
    CHARACTER_RECORD_VERSION,
};

use crate::character::Character;
use crate::world::object::{EffectInstance, GameObject, MobState, ObjectKind};
use crate::world::{CharacterId, ObjectId, TimerKind, World};

impl World {
    /// Detach an object (and its subtree) into a snapshot. Rooms are not
    /// snapshotted; dungeon persistence is a loader concern.
    pub fn snapshot_object(&self, oid: ObjectId) -> Option<ObjectSnapshot> {
        let obj = self.object(oid)?;
        let body = match &obj.kind {
            ObjectKind::Room(_) => return None,
            ObjectKind::Item(data) => SnapshotBody::Item(data.clone()),
            ObjectKind::Mob(state) => SnapshotBody::Mob(self.snapshot_mob(state)),
        };

        let equipped: Vec<ObjectId> = match &obj.kind {
            ObjectKind::Mob(state) => state.equipped.values().copied().collect(),
            _ => Vec::new(),
        };
        let contents = obj
            .contents
            .iter()
            .filter(|child| !equipped.contains(child))
            .filter_map(|child| self.snapshot_object(*child))
            .collect();

        Some(ObjectSnapshot {
            oid: oid.0,
            keywords: obj.keywords.clone(),
            display_name: obj.display_name.clone(),
            description: obj.description.clone(),
            room_description: obj.room_description.clone(),
            contents,
            body,
        })
    }

    fn snapshot_mob(&self, state: &MobState) -> MobSnapshot {
        let equipped = state
            .equipped
            .iter()
            .filter_map(|(slot, item)| Some((*slot, self.snapshot_object(*item)?)))
            .collect();
        let effects = state
            .effects
            .iter()
            .map(|instance| EffectSnapshot {
                template_id: instance.template_id.clone(),
                caster_oid: instance.caster.map(|c| c.0),
                applied_at_ms: instance.applied_at_ms,
                expires_at_ms: instance.expires_at_ms,
                ticks_remaining: instance.ticks_remaining,
                next_tick_at_ms: instance.next_tick_at_ms,
                tick_amount: instance.tick_amount,
                remaining_absorption: instance.remaining_absorption,
            })
            .collect();
        MobSnapshot {
            race_id: state.race_id.clone(),
            job_id: state.job_id.clone(),
            level: state.level,
            experience: state.experience,
            health: state.health,
            mana: state.mana,
            exhaustion: state.exhaustion,
            equipped,
            abilities: state.abilities.clone(),
            effects,
            behavior: state.behavior.bits(),
        }
    }

    /// Rebuild an object tree from a snapshot. The recorded oid is kept when
    /// free; otherwise a fresh one is allocated.
    pub fn restore_object(&mut self, snapshot: &ObjectSnapshot) -> Result<ObjectId, EngineError> {
        let wanted = ObjectId(snapshot.oid);
        let oid = if self.object(wanted).is_none() { wanted } else { self.allocate_oid() };

        let kind = match &snapshot.body {
            SnapshotBody::Item(data) => ObjectKind::Item(data.clone()),
            SnapshotBody::Mob(mob) => ObjectKind::Mob(MobState {
                race_id: mob.race_id.clone(),
                job_id: mob.job_id.clone(),
                level: mob.level,
                experience: mob.experience,
                health: mob.health,
                mana: mob.mana,
                exhaustion: mob.exhaustion,
                abilities: mob.abilities.clone(),
                behavior: BehaviorFlags::from_bits_truncate(mob.behavior),
                ..MobState::default()
            }),
        };
        self.insert_object(GameObject {
            oid,
            keywords: snapshot.keywords.clone(),
            display_name: snapshot.display_name.clone(),
            description: snapshot.description.clone(),
            room_description: snapshot.room_description.clone(),
            location: None,
            contents: Vec::new(),
            kind,
        });

        for child in &snapshot.contents {
            let child_oid = self.restore_object(child)?;
            self.add_to(child_oid, oid)?;
        }

        if let SnapshotBody::Mob(mob) = &snapshot.body {
            for item_snapshot in mob.equipped.values() {
                let item = self.restore_object(item_snapshot)?;
                self.add_to(item, oid)?;
                self.equip(oid, item)?;
            }
            // Equip recomputes and clamps; put the recorded vitals back.
            if let Some(state) = self.object_mut(oid).and_then(|o| o.mob_mut()) {
                state.health = mob.health;
                state.mana = mob.mana;
                state.exhaustion = mob.exhaustion;
            }

            for effect in &mob.effects {
                let effect_id = self.allocate_effect_id();
                let instance = EffectInstance {
                    id: effect_id,
                    template_id: effect.template_id.clone(),
                    caster: effect.caster_oid.map(ObjectId),
                    applied_at_ms: effect.applied_at_ms,
                    expires_at_ms: effect.expires_at_ms,
                    ticks_remaining: effect.ticks_remaining,
                    next_tick_at_ms: effect.next_tick_at_ms,
                    tick_amount: effect.tick_amount,
                    remaining_absorption: effect.remaining_absorption,
                };
                if let Some(state) = self.object_mut(oid).and_then(|o| o.mob_mut()) {
                    state.effects.push(instance);
                }
                if let Some(deadline) = effect.next_tick_at_ms {
                    self.schedule_timer(deadline, oid, effect_id, TimerKind::EffectTick);
                }
                if let Some(deadline) = effect.expires_at_ms {
                    self.schedule_timer(deadline, oid, effect_id, TimerKind::EffectExpire);
                }
            }

            if BehaviorFlags::from_bits_truncate(mob.behavior).contains(BehaviorFlags::WANDER) {
                self.wanderers.insert(oid);
            }
            self.recompute_vitals(oid);
        }
        Ok(oid)
    }

    /// Full account record for one character.
    pub fn snapshot_character(&self, id: CharacterId) -> Option<CharacterRecord> {
        let character = self.character(id)?;
        let mob = self.snapshot_object(character.mob)?;
        let saved_room = self.room_of(character.mob).and_then(|room| self.room_ref_of(room));
        Some(CharacterRecord {
            version: CHARACTER_RECORD_VERSION,
            credentials: character.credentials.clone(),
            settings: character.settings.clone(),
            stats: character.stats,
            blocked: character.blocked.clone(),
            mob,
            saved_room,
        })
    }

    /// Rebuild an account from its record. The mob lands in its saved room
    /// when that still resolves; otherwise it waits detached for login to
    /// place it.
    pub fn restore_character(&mut self, record: CharacterRecord) -> Result<CharacterId, EngineError> {
        if record.version != CHARACTER_RECORD_VERSION {
            return Err(EngineError::Internal(format!(
                "character record version {} needs migration before restore",
                record.version
            )));
        }
        let mob = self.restore_object(&record.mob)?;
        let id = self.allocate_character_id();
        let mut character = Character::new(id, record.credentials, mob);
        character.settings = record.settings;
        character.stats = record.stats;
        character.blocked = record.blocked;
        character.last_room_ref = record.saved_room.clone();
        self.register_character(character);
        if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
            state.character = Some(id);
        }

        if let Some(room) = record.saved_room.as_deref().and_then(|r| self.resolve_room_ref(r)) {
            self.add_to(mob, room)?;
        }
        Ok(id)
    }
}
