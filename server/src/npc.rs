//! NPC behavior pulses. Only wandering for now; anything smarter belongs in
//! per-behavior modules layered on the same registry.

use rand::Rng;

use dusk_core::effect::ActTemplates;

use crate::act::{act, ActContext, ActOptions};
use crate::world::{ObjectId, World};

/// One wander pulse: each WANDER-flagged mob has a one-in-three chance to
/// drift through a random usable exit. Fighters and the dead stay put.
pub fn wander_pulse(world: &mut World) {
    let wanderers: Vec<ObjectId> = world.wanderers.iter().copied().collect();
    for mob in wanderers {
        if !world.mob_alive(mob) {
            world.wanderers.remove(&mob);
            continue;
        }
        let fighting = world
            .object(mob)
            .and_then(|o| o.mob())
            .map_or(false, |m| m.combat_target.is_some());
        if fighting {
            continue;
        }
        if !world.rng.gen_ratio(1, 3) {
            continue;
        }
        let Some(room) = world.room_of(mob) else {
            continue;
        };
        let exits = world.exits_of(room);
        if exits.is_empty() {
            continue;
        }
        let pick = world.rng.gen_range(0..exits.len());
        let (direction, dest) = exits[pick];

        act(
            world,
            &ActTemplates::room_only(format!("{{User}} wanders off {}.", direction.label())),
            &ActContext { user: mob, target: None, room },
            &ActOptions::default(),
            &[],
        );
        if world.add_to(mob, dest).is_err() {
            continue;
        }
        act(
            world,
            &ActTemplates::room_only(format!(
                "{{User}} wanders in from the {}.",
                direction.reverse().label()
            )),
            &ActContext { user: mob, target: None, room: dest },
            &ActOptions::default(),
            &[],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::content;

    #[test]
    fn wanderers_eventually_move_but_never_while_fighting() {
        let mut world = World::with_seed(ServerConfig::default(), 13);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        content::register_dungeons(&mut world).unwrap();

        let rat = world.create_from_template("@duskhaven:grave-rat").unwrap();
        let start = world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
        world.add_to(rat, start).unwrap();

        // Enough pulses that a one-in-three chance is morally certain.
        let mut moved = false;
        for _ in 0..64 {
            wander_pulse(&mut world);
            if world.room_of(rat) != Some(start) {
                moved = true;
                break;
            }
        }
        assert!(moved, "a wanderer with open exits should move within 64 pulses");

        // Pin it into combat; it must stay put now.
        let foe = world
            .spawn_mob(vec!["foe".into()], "Foe", "human", "warrior", 1)
            .unwrap();
        let here = world.room_of(rat).unwrap();
        world.add_to(foe, here).unwrap();
        crate::combat::initiate_combat(&mut world, rat, foe).unwrap();
        for _ in 0..32 {
            wander_pulse(&mut world);
            assert_eq!(world.room_of(rat), Some(here));
        }
    }

    #[test]
    fn dead_wanderers_fall_out_of_the_set() {
        let mut world = World::with_seed(ServerConfig::default(), 14);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        content::register_dungeons(&mut world).unwrap();

        let rat = world.create_from_template("@duskhaven:grave-rat").unwrap();
        let start = world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
        world.add_to(rat, start).unwrap();

        world.object_mut(rat).unwrap().mob_mut().unwrap().health = 0.0;
        wander_pulse(&mut world);
        assert!(!world.wanderers.contains(&rat));
    }
}
