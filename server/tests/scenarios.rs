//! End-to-end scenarios driven through the public engine surface: the
//! command registry, the combat and effect engines, and the message layer.

use dusk_core::effect::EffectOverrides;
use dusk_core::message::MessageGroup;

use dusk_server::character::OutboundLine;
use dusk_server::command::CommandRegistry;
use dusk_server::config::ServerConfig;
use dusk_server::content;
use dusk_server::world::dungeon::Dungeon;
use dusk_server::world::{Coordinate, ObjectId, World};

struct Fixture {
    world: World,
    registry: CommandRegistry,
}

fn fixture() -> Fixture {
    let (world, registry) = content::build_world(ServerConfig::default()).unwrap();
    Fixture { world, registry }
}

fn outbound(world: &mut World, mob: ObjectId) -> Vec<OutboundLine> {
    let id = world
        .object(mob)
        .and_then(|o| o.mob())
        .and_then(|m| m.character)
        .expect("player mob");
    world
        .character_mut(id)
        .unwrap()
        .session
        .as_mut()
        .unwrap()
        .take_outbound()
}

fn texts(world: &mut World, mob: ObjectId) -> Vec<String> {
    outbound(world, mob).into_iter().map(|l| l.text).collect()
}

/// S1: two linked rooms; `look east` renders the neighbour, `north` fails.
#[test]
fn s1_look_east_and_blocked_north() {
    let mut fx = fixture();
    let did = fx
        .world
        .add_dungeon(Dungeon::create_empty(10, 10, 1, Some("tower".into())))
        .unwrap();
    let a = fx.world.create_room(did, Coordinate::new(0, 0, 0), "The Gatehouse").unwrap();
    let b = fx
        .world
        .create_room(did, Coordinate::new(1, 0, 0), "The Eastern Watchtower")
        .unwrap();
    fx.world
        .create_tunnel(a, dusk_core::direction::Direction::East, b, false)
        .unwrap();

    let m = content::spawn_player_mob(&mut fx.world, "Mira", false);
    fx.world.add_to(m, a).unwrap();
    let n = fx
        .world
        .spawn_mob(vec!["norn".into()], "Norn", "human", "warrior", 1)
        .unwrap();
    fx.world.add_to(n, b).unwrap();

    fx.registry.dispatch(&mut fx.world, m, "look east");
    let lines = texts(&mut fx.world, m);
    assert!(lines[0].contains("You look east"), "got {:?}", lines);
    assert!(
        lines.iter().any(|l| l.contains("The Eastern Watchtower")),
        "adjacent room renders: {:?}",
        lines
    );
    assert!(
        lines.iter().any(|l| l.contains("Norn")),
        "its occupants show: {:?}",
        lines
    );

    fx.registry.dispatch(&mut fx.world, m, "north");
    let lines = texts(&mut fx.world, m);
    assert_eq!(lines, vec!["You cannot go that way."]);
}

/// S2: combat initiation queues both; a dead target prunes the attacker.
#[test]
fn s2_combat_queue_and_pruning() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let a = fx
        .world
        .spawn_mob(vec!["aria".into()], "Aria", "human", "warrior", 2)
        .unwrap();
    let b = fx
        .world
        .spawn_mob(vec!["brom".into()], "Brom", "human", "warrior", 2)
        .unwrap();
    fx.world.add_to(a, room).unwrap();
    fx.world.add_to(b, room).unwrap();

    dusk_server::combat::initiate_combat(&mut fx.world, a, b).unwrap();

    let target_of = |world: &World, mob: ObjectId| {
        world.object(mob).and_then(|o| o.mob()).and_then(|m| m.combat_target)
    };
    assert!(fx.world.combat.contains(a));
    assert!(fx.world.combat.contains(b));
    assert_eq!(target_of(&fx.world, b), Some(a));

    fx.world.object_mut(b).unwrap().mob_mut().unwrap().health = 0.0;
    dusk_server::combat::process_combat_round(&mut fx.world);

    assert!(!fx.world.combat.contains(a));
    assert_eq!(target_of(&fx.world, a), None);
}

/// S3: a 3-tick poison deals exactly 15 to an unmitigated target, expires,
/// and the room hears three combat-group act messages.
#[test]
fn s3_poison_ticks_and_room_messages() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let m = fx
        .world
        .spawn_mob(vec!["subject".into()], "the subject", "construct", "dummy", 1)
        .unwrap();
    fx.world.add_to(m, room).unwrap();
    assert_eq!(fx.world.max_health(m), 100.0);

    let witness = content::spawn_player_mob(&mut fx.world, "Watts", false);
    fx.world.add_to(witness, room).unwrap();

    dusk_server::effect::add_effect(&mut fx.world, m, "poison", None, EffectOverrides::default())
        .unwrap();
    texts(&mut fx.world, witness); // discard the apply message

    fx.world.advance_clock_to(3500);
    dusk_server::effect::run_due_timers(&mut fx.world);

    let state = fx.world.object(m).unwrap().mob().unwrap();
    assert_eq!(state.health, 85.0);
    assert!(state.effects.is_empty(), "the poison is gone");

    let combat_lines: Vec<OutboundLine> = outbound(&mut fx.world, witness)
        .into_iter()
        .filter(|l| l.group == MessageGroup::Combat)
        .collect();
    assert_eq!(combat_lines.len(), 3, "one room message per tick: {:?}", combat_lines);
}

/// S4: busy mode forwards only CHANNELS; `busy read` replays exactly it.
#[test]
fn s4_busy_mode_forwards_channels_only() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let player = content::spawn_player_mob(&mut fx.world, "Quill", false);
    fx.world.add_to(player, room).unwrap();

    fx.registry.dispatch(&mut fx.world, player, "busy on");
    fx.registry.dispatch(&mut fx.world, player, "busy forward channels");
    texts(&mut fx.world, player);

    dusk_server::act::send_to_mob(&mut fx.world, player, "done.", MessageGroup::CommandResponse);
    dusk_server::act::send_to_mob(&mut fx.world, player, "someone waves.", MessageGroup::Action);
    dusk_server::act::send_to_mob(&mut fx.world, player, "psst!", MessageGroup::Channels);

    let immediate = texts(&mut fx.world, player);
    assert_eq!(immediate, vec!["done.", "someone waves."]);

    fx.registry.dispatch(&mut fx.world, player, "busy read");
    let replay: Vec<OutboundLine> = outbound(&mut fx.world, player);
    let channel_lines: Vec<&OutboundLine> =
        replay.iter().filter(|l| l.group == MessageGroup::Channels).collect();
    assert_eq!(channel_lines.len(), 1);
    assert_eq!(channel_lines[0].text, "psst!");
}

/// S5: putting an equipped item into a container is refused and changes
/// nothing.
#[test]
fn s5_put_refuses_equipped_items() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let player = content::spawn_player_mob(&mut fx.world, "Edda", false);
    fx.world.add_to(player, room).unwrap();

    let sword = fx.world.create_from_template("@duskhaven:iron-sword").unwrap();
    fx.world.add_to(sword, player).unwrap();
    fx.world.equip(player, sword).unwrap();

    let bag = fx.world.create_from_template("@duskhaven:satchel").unwrap();
    fx.world.add_to(bag, room).unwrap();

    fx.registry.dispatch(&mut fx.world, player, "put sword in satchel");
    let lines = texts(&mut fx.world, player);
    assert!(
        lines.iter().any(|l| l.contains("while it's equipped")),
        "refusal message: {:?}",
        lines
    );
    assert!(fx.world.is_equipped(player, sword), "the sword stays equipped");
    assert!(fx.world.contents_of(bag).is_empty(), "the bag stays empty");
    assert_eq!(fx.world.object(sword).unwrap().location, Some(player));
}

/// S6: a duplicate dungeon id is rejected; the first stays registered.
#[test]
fn s6_duplicate_dungeon_registration_fails() {
    let mut fx = fixture();
    let first = fx
        .world
        .add_dungeon(Dungeon::create_empty(4, 4, 1, Some("mirror".into())))
        .unwrap();
    let err = fx
        .world
        .add_dungeon(Dungeon::create_empty(9, 9, 1, Some("mirror".into())))
        .unwrap_err();
    assert_eq!(
        err,
        dusk_core::error::EngineError::DuplicateDungeonId("mirror".into())
    );
    assert_eq!(fx.world.dungeon_by_name("mirror"), Some(first));
    assert_eq!(fx.world.dungeon(first).unwrap().width, 4);
}

/// Containment integrity after a workout of add/remove/equip/unequip/get/
/// drop/put/destroy: every object is either locationless or appears exactly
/// once in its parent's contents, and no location chain loops.
#[test]
fn containment_integrity_survives_a_workout() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let player = content::spawn_player_mob(&mut fx.world, "Pack", false);
    fx.world.add_to(player, room).unwrap();

    let sword = fx.world.create_from_template("@duskhaven:iron-sword").unwrap();
    let vest = fx.world.create_from_template("@duskhaven:leather-vest").unwrap();
    let bag = fx.world.create_from_template("@duskhaven:satchel").unwrap();
    let bread = fx.world.create_from_template("@duskhaven:bread").unwrap();
    for item in [sword, vest, bag, bread] {
        fx.world.add_to(item, room).unwrap();
    }

    for command in [
        "get sword",
        "get vest",
        "get bread",
        "wear sword",
        "wear vest",
        "get satchel",
        "put bread in satchel",
        "drop satchel",
        "remove sword",
        "drop sword",
        "get sword",
        "get bread from satchel",
        "put bread in satchel",
    ] {
        fx.registry.dispatch(&mut fx.world, player, command);
    }
    fx.world.destroy_object(bread, true);
    fx.world.destroy_object(bag, false);

    let all: Vec<ObjectId> = fx.world.object_ids().collect();
    for oid in all {
        let obj = fx.world.object(oid).unwrap();
        if let Some(parent) = obj.location {
            let count = fx
                .world
                .object(parent)
                .map(|p| p.contents.iter().filter(|c| **c == oid).count())
                .unwrap_or(0);
            assert_eq!(count, 1, "{} must appear exactly once in its parent", oid);
        }
        // Walk the chain; it must terminate without revisiting.
        let mut seen = std::collections::BTreeSet::new();
        let mut cursor = obj.location;
        while let Some(parent) = cursor {
            assert!(seen.insert(parent), "cycle through {}", parent);
            cursor = fx.world.object(parent).and_then(|o| o.location);
        }
        // Everything in contents points back.
        for child in &obj.contents {
            assert_eq!(
                fx.world.object(*child).and_then(|c| c.location),
                Some(oid),
                "child location must match its container"
            );
        }
    }
}

/// The `effects` and `score` commands render without panicking and show
/// live data.
#[test]
fn score_and_effects_render() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let player = content::spawn_player_mob(&mut fx.world, "Vane", false);
    fx.world.add_to(player, room).unwrap();

    dusk_server::effect::add_effect(
        &mut fx.world,
        player,
        "poison",
        None,
        EffectOverrides::default(),
    )
    .unwrap();
    texts(&mut fx.world, player);

    fx.registry.dispatch(&mut fx.world, player, "score");
    let lines = texts(&mut fx.world, player);
    assert!(lines.iter().any(|l| l.contains("Vane")));
    assert!(lines.iter().any(|l| l.contains("Health")));

    fx.registry.dispatch(&mut fx.world, player, "effects");
    let lines = texts(&mut fx.world, player);
    assert!(lines.iter().any(|l| l.contains("Poison")), "got {:?}", lines);
}

/// Admin exec is an enumerated surface and is closed to mortals.
#[test]
fn exec_is_admin_gated_and_enumerated() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let mortal = content::spawn_player_mob(&mut fx.world, "Mort", false);
    let admin = content::spawn_player_mob(&mut fx.world, "Keeper", true);
    fx.world.add_to(mortal, room).unwrap();
    fx.world.add_to(admin, room).unwrap();

    fx.registry.dispatch(&mut fx.world, mortal, "exec spawn grave-rat");
    let lines = texts(&mut fx.world, mortal);
    assert_eq!(lines, vec!["You may not do that."]);

    fx.registry.dispatch(&mut fx.world, admin, "exec spawn grave-rat");
    let lines = texts(&mut fx.world, admin);
    assert!(lines.iter().any(|l| l.contains("Spawned")), "got {:?}", lines);

    fx.registry.dispatch(&mut fx.world, admin, "exec shutdown please");
    let lines = texts(&mut fx.world, admin);
    assert!(
        lines.iter().any(|l| l.contains("operations:")),
        "unknown ops list the surface: {:?}",
        lines
    );
}

/// Kill starts a fight; rounds eventually finish a construct off, and the
/// killer earns experience.
#[test]
fn kill_command_runs_a_fight_to_the_end() {
    let mut fx = fixture();
    let room = fx.world.resolve_room_ref("@duskhaven{0,0,0}").unwrap();
    let player = content::spawn_player_mob(&mut fx.world, "Grim", false);
    fx.world.add_to(player, room).unwrap();
    let dummy = fx.world.create_from_template("@duskhaven:training-dummy").unwrap();
    fx.world.add_to(dummy, room).unwrap();

    let xp_before = fx.world.object(player).unwrap().mob().unwrap().experience;

    fx.registry.dispatch(&mut fx.world, player, "kill dummy");
    assert!(fx.world.combat.contains(player));

    for _ in 0..200 {
        if fx.world.object(dummy).is_none() {
            break;
        }
        dusk_server::combat::process_combat_round(&mut fx.world);
    }

    assert!(fx.world.object(dummy).is_none(), "the dummy is eventually destroyed");
    let state = fx.world.object(player).unwrap().mob().unwrap();
    assert!(
        state.experience > xp_before || state.level > 1,
        "the killer was rewarded"
    );
    assert!(!fx.world.combat.contains(player), "combat ends with the fight");
}
