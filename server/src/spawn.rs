//! Template instantiation and resets.
//!
//! A reset is a declarative spawn rule bound to a room reference: keep at
//! least `min_count` instances of a template alive there, drifting up to
//! `max_count` over time. Sub-resets dress freshly spawned mobs with
//! equipment and inventory; this is also how shopkeepers restock.

use std::collections::BTreeSet;

use rand::Rng;

use dusk_core::error::EngineError;
use dusk_core::records::BehaviorFlags;

use crate::world::dungeon::TemplateBody;
use crate::world::object::GameObject;
use crate::world::{ObjectId, World};

#[derive(Debug, Clone)]
pub struct Reset {
    pub template_id: String,
    pub room_ref: String,
    pub min_count: u32,
    pub max_count: u32,
    /// Template refs equipped onto each spawned mob.
    pub equipped: Vec<String>,
    /// Template refs placed into each spawned mob's inventory.
    pub inventory: Vec<String>,
    /// Live instances this reset currently accounts for.
    pub spawned: BTreeSet<ObjectId>,
}

impl Reset {
    pub fn new(template_id: &str, room_ref: &str, min_count: u32, max_count: u32) -> Self {
        Reset {
            template_id: template_id.to_string(),
            room_ref: room_ref.to_string(),
            min_count,
            max_count: max_count.max(min_count),
            equipped: Vec::new(),
            inventory: Vec::new(),
            spawned: BTreeSet::new(),
        }
    }

    pub fn with_equipped(mut self, template_ref: &str) -> Self {
        self.equipped.push(template_ref.to_string());
        self
    }

    pub fn with_inventory(mut self, template_ref: &str) -> Self {
        self.inventory.push(template_ref.to_string());
        self
    }
}

impl World {
    /// Stamp a fresh object out of a template. Mobs come out at full vitals
    /// with their archetype package granted; WANDER-flagged mobs join the
    /// wander set.
    pub fn create_from_template(&mut self, reference: &str) -> Result<ObjectId, EngineError> {
        let template = self
            .find_template(reference)
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("unknown template {:?}", reference)))?;

        let oid = match &template.body {
            TemplateBody::Item(data) => {
                let oid = self.allocate_oid();
                let mut object = GameObject::item(
                    oid,
                    template.keywords.clone(),
                    template.display_name.clone(),
                    data.clone(),
                );
                object.description = template.description.clone();
                object.room_description = template.room_description.clone();
                self.insert_object(object)
            }
            TemplateBody::Mob(mob) => {
                let oid = self.spawn_mob(
                    template.keywords.clone(),
                    &template.display_name,
                    &mob.race_id,
                    &mob.job_id,
                    mob.level,
                )?;
                if let Some(obj) = self.object_mut(oid) {
                    obj.description = template.description.clone();
                    obj.room_description = template.room_description.clone();
                    if let Some(state) = obj.mob_mut() {
                        state.behavior = mob.behavior;
                    }
                }
                if mob.behavior.contains(BehaviorFlags::WANDER) {
                    self.wanderers.insert(oid);
                }
                oid
            }
        };
        Ok(oid)
    }
}

/// One reset sweep: prune dead instances, then top every rule up to its
/// minimum, with an occasional drift towards the maximum.
pub fn run_resets(world: &mut World) {
    for index in 0..world.resets.len() {
        // Prune stale oids first so counts are honest.
        let live: BTreeSet<ObjectId> = world.resets[index]
            .spawned
            .iter()
            .copied()
            .filter(|oid| world.object(*oid).is_some())
            .collect();
        world.resets[index].spawned = live;

        let (template_id, room_ref, min_count, max_count, count) = {
            let reset = &world.resets[index];
            (
                reset.template_id.clone(),
                reset.room_ref.clone(),
                reset.min_count,
                reset.max_count,
                reset.spawned.len() as u32,
            )
        };

        let Some(room) = world.resolve_room_ref(&room_ref) else {
            log::warn!("reset {:?} targets unresolvable room {:?}", template_id, room_ref);
            continue;
        };

        let mut target = min_count;
        if count >= min_count && count < max_count && world.rng.gen_ratio(1, 8) {
            target = count + 1;
        }

        let mut spawned_now = count;
        while spawned_now < target {
            match spawn_for_reset(world, index, room) {
                Ok(oid) => {
                    world.resets[index].spawned.insert(oid);
                    spawned_now += 1;
                }
                Err(err) => {
                    log::error!("reset {:?} failed to spawn: {}", template_id, err);
                    break;
                }
            }
        }
    }
}

fn spawn_for_reset(world: &mut World, index: usize, room: ObjectId) -> Result<ObjectId, EngineError> {
    let (template_id, equipped, inventory) = {
        let reset = &world.resets[index];
        (reset.template_id.clone(), reset.equipped.clone(), reset.inventory.clone())
    };

    let oid = world.create_from_template(&template_id)?;
    world.add_to(oid, room)?;

    // Dress the spawn. Failures here degrade the spawn, not the sweep.
    for item_ref in &inventory {
        match world.create_from_template(item_ref) {
            Ok(item) => world.add_to(item, oid)?,
            Err(err) => log::warn!("reset inventory {:?}: {}", item_ref, err),
        }
    }
    for item_ref in &equipped {
        match world.create_from_template(item_ref) {
            Ok(item) => {
                world.add_to(item, oid)?;
                if let Err(err) = world.equip(oid, item) {
                    log::warn!("reset equip {:?}: {}", item_ref, err);
                }
            }
            Err(err) => log::warn!("reset equipment {:?}: {}", item_ref, err),
        }
    }
    Ok(oid)
}
