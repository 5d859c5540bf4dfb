//! Built-in content and the registry-builder phase.
//!
//! Subsystems register in a fixed order: damage types are a static enum and
//! need no pass; then archetypes, abilities, effect templates, commands,
//! and finally dungeons with their templates and resets. Loaders that read
//! content from disk would feed these same registries.

use std::collections::BTreeMap;

use dusk_core::ability::{Ability, AbilityAction, AbilityCost, ProficiencyCurve};
use dusk_core::archetype::{AbilityGrant, Archetype, ArchetypeKind};
use dusk_core::attributes::{AttributeSet, Resource};
use dusk_core::damage::{DamageRelation, DamageType, RelationTable};
use dusk_core::effect::{ActTemplates, EffectKind, EffectOverrides, EffectTemplate, PassiveModifiers};
use dusk_core::error::EngineError;
use dusk_core::records::{
    BehaviorFlags, Credentials, EquipKind, EquipmentData, EquipSlot, HitType, ItemData,
};

use crate::character::{Character, Session};
use crate::command::CommandRegistry;
use crate::config::ServerConfig;
use crate::spawn::Reset;
use crate::world::dungeon::{Dungeon, MobTemplate, ObjectTemplate, TemplateBody};
use crate::world::{Coordinate, ObjectId, World};

/// Build a fully-registered world plus its command registry.
pub fn build_world(config: ServerConfig) -> Result<(World, CommandRegistry), EngineError> {
    let mut world = World::new(config);
    register_archetypes(&mut world);
    register_abilities(&mut world);
    register_effect_templates(&mut world);
    let registry = register_commands(&mut world)?;
    register_dungeons(&mut world)?;
    register_resets(&mut world);
    Ok((world, registry))
}

pub fn register_commands(world: &mut World) -> Result<CommandRegistry, EngineError> {
    let mut registry = CommandRegistry::new();
    crate::command::standard::register(&mut registry)?;
    crate::command::social::register(&mut registry)?;
    crate::command::ability::register(&mut registry, world)?;
    crate::command::admin::register(&mut registry)?;
    world.command_labels = registry.all_labels();
    Ok(registry)
}

pub fn register_archetypes(world: &mut World) {
    let mut vermin_relations = RelationTable::new();
    vermin_relations.insert(DamageType::Poison, DamageRelation::Resist);

    let archetypes = [
        Archetype {
            id: "human".into(),
            name: "Human".into(),
            kind: ArchetypeKind::Race,
            starting_attributes: AttributeSet::new(8.0, 8.0, 8.0),
            growth_per_level: AttributeSet::new(1.0, 1.0, 1.0),
            base_health: 30.0,
            base_mana: 10.0,
            base_exhaustion: 80.0,
            health_per_level: 5.0,
            mana_per_level: 2.0,
            abilities: vec![],
            passive_effects: vec![],
            growth_curve: vec![],
            damage_relations: RelationTable::new(),
        },
        Archetype {
            id: "vermin".into(),
            name: "Vermin".into(),
            kind: ArchetypeKind::Race,
            starting_attributes: AttributeSet::new(4.0, 10.0, 1.0),
            growth_per_level: AttributeSet::new(0.5, 1.0, 0.0),
            base_health: 15.0,
            base_mana: 0.0,
            base_exhaustion: 60.0,
            health_per_level: 3.0,
            mana_per_level: 0.0,
            abilities: vec![],
            passive_effects: vec!["thick-hide".into()],
            growth_curve: vec![],
            damage_relations: vermin_relations,
        },
        // An inert practice target: zero attributes, a fat health pool.
        Archetype {
            id: "construct".into(),
            name: "Construct".into(),
            kind: ArchetypeKind::Race,
            starting_attributes: AttributeSet::default(),
            growth_per_level: AttributeSet::default(),
            base_health: 100.0,
            base_mana: 0.0,
            base_exhaustion: 100.0,
            health_per_level: 0.0,
            mana_per_level: 0.0,
            abilities: vec![],
            passive_effects: vec![],
            growth_curve: vec![],
            damage_relations: RelationTable::new(),
        },
        Archetype {
            id: "warrior".into(),
            name: "Warrior".into(),
            kind: ArchetypeKind::Job,
            starting_attributes: AttributeSet::new(10.0, 6.0, 2.0),
            growth_per_level: AttributeSet::new(1.5, 1.0, 0.5),
            base_health: 20.0,
            base_mana: 5.0,
            base_exhaustion: 40.0,
            health_per_level: 6.0,
            mana_per_level: 1.0,
            abilities: vec![AbilityGrant { ability_id: "bash".into(), starting_proficiency: 0 }],
            passive_effects: vec![],
            growth_curve: vec![1.0, 1.0, 1.0, 1.1, 1.1, 1.2],
            damage_relations: RelationTable::new(),
        },
        Archetype {
            id: "mage".into(),
            name: "Mage".into(),
            kind: ArchetypeKind::Job,
            starting_attributes: AttributeSet::new(2.0, 4.0, 12.0),
            growth_per_level: AttributeSet::new(0.5, 0.5, 2.0),
            base_health: 10.0,
            base_mana: 30.0,
            base_exhaustion: 30.0,
            health_per_level: 3.0,
            mana_per_level: 6.0,
            abilities: vec![
                AbilityGrant { ability_id: "firebolt".into(), starting_proficiency: 0 },
                AbilityGrant { ability_id: "mend".into(), starting_proficiency: 0 },
                AbilityGrant { ability_id: "colour-spray".into(), starting_proficiency: 0 },
            ],
            passive_effects: vec![],
            growth_curve: vec![],
            damage_relations: RelationTable::new(),
        },
        Archetype {
            id: "dummy".into(),
            name: "Dummy".into(),
            kind: ArchetypeKind::Job,
            starting_attributes: AttributeSet::default(),
            growth_per_level: AttributeSet::default(),
            base_health: 0.0,
            base_mana: 0.0,
            base_exhaustion: 0.0,
            health_per_level: 0.0,
            mana_per_level: 0.0,
            abilities: vec![],
            passive_effects: vec![],
            growth_curve: vec![],
            damage_relations: RelationTable::new(),
        },
    ];
    for archetype in archetypes {
        world.archetypes.insert(archetype.id.clone(), archetype);
    }
}

pub fn register_abilities(world: &mut World) {
    let abilities = [
        Ability {
            id: "bash".into(),
            name: "Bash".into(),
            description: "A heavy weapon blow that trades stamina for hurt.".into(),
            curve: ProficiencyCurve::new([5, 25, 75, 200]),
            pattern: "bash~ <target:mob?>".into(),
            cost: AbilityCost { mana: 0.0, exhaustion: 10.0 },
            cooldown_ms: Some(4000),
            action: AbilityAction::MeleeStrike { multiplier: 1.5 },
            offensive: true,
        },
        Ability {
            id: "firebolt".into(),
            name: "Firebolt".into(),
            description: "A dart of flame.".into(),
            curve: ProficiencyCurve::new([5, 20, 60, 150]),
            pattern: "firebolt~ <target:mob?>".into(),
            cost: AbilityCost { mana: 8.0, exhaustion: 0.0 },
            cooldown_ms: Some(2500),
            action: AbilityAction::MagicHit { multiplier: 1.6, damage_type: DamageType::Fire },
            offensive: true,
        },
        Ability {
            id: "colour-spray".into(),
            name: "Colour Spray".into(),
            description: "A fan of prismatic light.".into(),
            curve: ProficiencyCurve::new([8, 30, 90, 220]),
            pattern: "'colour spray'~ <target:mob?>".into(),
            cost: AbilityCost { mana: 10.0, exhaustion: 0.0 },
            cooldown_ms: Some(3000),
            action: AbilityAction::MagicHit { multiplier: 1.3, damage_type: DamageType::Arcane },
            offensive: true,
        },
        Ability {
            id: "mend".into(),
            name: "Mend".into(),
            description: "Knit wounds closed over a few breaths.".into(),
            curve: ProficiencyCurve::new([5, 20, 60, 150]),
            pattern: "mend~ <target:mob?>".into(),
            cost: AbilityCost { mana: 6.0, exhaustion: 0.0 },
            cooldown_ms: Some(5000),
            action: AbilityAction::ApplyEffect {
                effect_id: "mending".into(),
                overrides: EffectOverrides::default(),
            },
            offensive: false,
        },
    ];
    for ability in abilities {
        world.abilities.insert(ability.id.clone(), ability);
    }
}

pub fn register_effect_templates(world: &mut World) {
    let templates = [
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
            on_apply: Some(ActTemplates::user_and_room(
                "{gVenom seeps into your veins.{d",
                "{User} turns a sickly shade of green.",
            )),
            on_expire: Some(ActTemplates {
                user: Some("The poison runs its course.".into()),
                target: None,
                room: None,
            }),
            on_tick: Some(ActTemplates::user_and_room(
                "{gThe poison burns you for {damage}.{d",
                "{User} shudders as the poison works.",
            )),
        },
        EffectTemplate {
            id: "mending".into(),
            name: "Mending".into(),
            kind: EffectKind::HealOverTime { heal: 2.0, interval_secs: 1.0, ticks: 10 },
            duration_secs: None,
            stackable: false,
            on_apply: Some(ActTemplates {
                user: Some("{cA warm glow settles over you.{d".into()),
                target: None,
                room: Some("A warm glow settles over {user}.".into()),
            }),
            on_expire: None,
            on_tick: Some(ActTemplates {
                user: Some("Your wounds knit for {heal}.".into()),
                target: None,
                room: None,
            }),
        },
        EffectTemplate {
            id: "bulwark".into(),
            name: "Bulwark".into(),
            kind: EffectKind::Passive {
                modifiers: PassiveModifiers {
                    resource_max: BTreeMap::from([(Resource::Health, 20.0)]),
                    ..PassiveModifiers::default()
                },
            },
            duration_secs: None,
            stackable: false,
            on_apply: None,
            on_expire: None,
            on_tick: None,
        },
        EffectTemplate {
            id: "thick-hide".into(),
            name: "Thick Hide".into(),
            kind: EffectKind::Passive {
                modifiers: PassiveModifiers {
                    damage_taken_multiplier: 0.9,
                    ..PassiveModifiers::default()
                },
            },
            duration_secs: None,
            stackable: false,
            on_apply: None,
            on_expire: None,
            on_tick: None,
        },
        EffectTemplate {
            id: "ward".into(),
            name: "Ward".into(),
            kind: EffectKind::Shield {
                absorption: 6.0,
                damage_filter: None,
                max_per_hit: None,
                absorption_rate: 1.0,
            },
            duration_secs: None,
            stackable: false,
            on_apply: Some(ActTemplates {
                user: Some("{bA shimmering ward surrounds you.{d".into()),
                target: None,
                room: Some("A shimmering ward surrounds {user}.".into()),
            }),
            on_expire: Some(ActTemplates {
                user: Some("{bYour ward flickers out.{d".into()),
                target: None,
                room: None,
            }),
            on_tick: None,
        },
    ];
    for template in templates {
        world.effect_templates.insert(template.id.clone(), template);
    }
}

/// The starter dungeon: a 5x5x2 keep with a graveyard entrance, a few
/// templates, and the resets that keep it populated.
pub fn register_dungeons(world: &mut World) -> Result<(), EngineError> {
    let did = world.add_dungeon(Dungeon::create_empty(5, 5, 2, Some("duskhaven".into())))?;

    let rooms = [
        (0, 0, 0, "The Graveyard of Dusk", "Leaning stones and cold lamplight. New arrivals wake here."),
        (1, 0, 0, "Lych Gate", "A rusted gate between the graves and the keep's outer yard."),
        (2, 0, 0, "Outer Yard", "Mud, straw, and the smell of old rain."),
        (0, 1, 0, "Potter's Row", "Shuttered stalls slump against the graveyard wall."),
        (1, 1, 0, "The Cellar Stairs", "Broken steps spiral down into the keep's cellars."),
        (2, 1, 0, "Guard Post", "A brazier gutters beside a scarred oak table."),
        (2, 2, 0, "Provisioner's Nook", "Sacks and crates, mostly empty, none honestly come by."),
        (1, 2, 0, "Collapsed Hall", "The roof came down a generation ago; nobody cleared it."),
        (0, 2, 0, "Well Court", "A dry well ringed by flagstones heaved up by roots."),
        (1, 1, 1, "The Watch Loft", "A drafty loft over the stairs, floorboards soft with rot."),
    ];
    for (x, y, z, name, description) in rooms {
        let room = world.create_room(did, Coordinate::new(x, y, z), name)?;
        if let Some(obj) = world.object_mut(room) {
            obj.description = Some(description.to_string());
        }
    }

    // The loft hangs over the stairs; only a tunnel reaches it.
    let stairs = world.resolve_room_ref("@duskhaven{1,1,0}").ok_or_else(|| {
        EngineError::Internal("stairs room missing after creation".into())
    })?;
    let loft = world.resolve_room_ref("@duskhaven{1,1,1}").ok_or_else(|| {
        EngineError::Internal("loft room missing after creation".into())
    })?;
    world.create_tunnel(stairs, dusk_core::direction::Direction::Up, loft, false)?;

    let dungeon = world.dungeon_mut(did).ok_or_else(|| {
        EngineError::Internal("dungeon vanished during registration".into())
    })?;

    dungeon.register_template(
        "iron-sword",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["iron".into(), "sword".into()],
            display_name: "an iron sword".into(),
            description: Some("Plain, heavy, and honest about its purpose.".into()),
            room_description: Some("An iron sword lies forgotten here.".into()),
            body: TemplateBody::Item(ItemData {
                value: 20,
                weight: Some(6),
                container: false,
                currency: false,
                equipment: Some(EquipmentData::bare(
                    EquipSlot::MainHand,
                    EquipKind::Weapon {
                        attack_power: 3.0,
                        hit_type: HitType {
                            verb: "slash".into(),
                            verb_third: "slashes".into(),
                            damage_type: DamageType::Slash,
                        },
                    },
                )),
            }),
        },
    );
    dungeon.register_template(
        "leather-vest",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["leather".into(), "vest".into()],
            display_name: "a leather vest".into(),
            description: None,
            room_description: None,
            body: TemplateBody::Item(ItemData {
                value: 12,
                weight: Some(4),
                container: false,
                currency: false,
                equipment: Some(EquipmentData::bare(
                    EquipSlot::Chest,
                    EquipKind::Armor { defense: 2.0 },
                )),
            }),
        },
    );
    dungeon.register_template(
        "bread",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["loaf".into(), "bread".into()],
            display_name: "a loaf of black bread".into(),
            description: None,
            room_description: Some("Someone dropped a loaf of black bread.".into()),
            body: TemplateBody::Item(ItemData {
                value: 1,
                weight: Some(1),
                container: false,
                currency: false,
                equipment: None,
            }),
        },
    );
    dungeon.register_template(
        "satchel",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["worn".into(), "satchel".into()],
            display_name: "a worn satchel".into(),
            description: Some("Its strap has been mended many times.".into()),
            room_description: Some("A worn satchel sits here.".into()),
            body: TemplateBody::Item(ItemData {
                value: 5,
                weight: Some(2),
                container: true,
                currency: false,
                equipment: None,
            }),
        },
    );
    dungeon.register_template(
        "gold-coins",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["gold".into(), "coins".into()],
            display_name: "a scatter of gold coins".into(),
            description: None,
            room_description: Some("A few gold coins glint in the dirt.".into()),
            body: TemplateBody::Item(ItemData {
                value: 10,
                weight: None,
                container: false,
                currency: true,
                equipment: None,
            }),
        },
    );
    dungeon.register_template(
        "grave-rat",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["grave".into(), "rat".into()],
            display_name: "a grave rat".into(),
            description: Some("Sleek, fat, and entirely unafraid of you.".into()),
            room_description: Some("A grave rat noses between the stones.".into()),
            body: TemplateBody::Mob(MobTemplate {
                race_id: "vermin".into(),
                job_id: "warrior".into(),
                level: 1,
                behavior: BehaviorFlags::WANDER,
            }),
        },
    );
    dungeon.register_template(
        "warden",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["keep".into(), "warden".into()],
            display_name: "the keep warden".into(),
            description: Some("Grey at the temples, and not inclined to repeat herself.".into()),
            room_description: Some("The keep warden stands watch here.".into()),
            body: TemplateBody::Mob(MobTemplate {
                race_id: "human".into(),
                job_id: "warrior".into(),
                level: 3,
                behavior: BehaviorFlags::empty(),
            }),
        },
    );
    dungeon.register_template(
        "training-dummy",
        ObjectTemplate {
            id: String::new(),
            keywords: vec!["training".into(), "dummy".into()],
            display_name: "a training dummy".into(),
            description: Some("Straw, sacking, and a century of resentment.".into()),
            room_description: Some("A training dummy slumps on its post.".into()),
            body: TemplateBody::Mob(MobTemplate {
                race_id: "construct".into(),
                job_id: "dummy".into(),
                level: 1,
                behavior: BehaviorFlags::PEACEFUL,
            }),
        },
    );
    Ok(())
}

pub fn register_resets(world: &mut World) {
    world.resets.push(Reset::new("@duskhaven:grave-rat", "@duskhaven{1,1,0}", 2, 3));
    world.resets.push(
        Reset::new("@duskhaven:warden", "@duskhaven{2,1,0}", 1, 1)
            .with_equipped("@duskhaven:iron-sword")
            .with_inventory("@duskhaven:bread"),
    );
    world.resets.push(Reset::new("@duskhaven:training-dummy", "@duskhaven{2,0,0}", 1, 1));
    world.resets.push(Reset::new("@duskhaven:satchel", "@duskhaven{0,1,0}", 1, 1));
}

/// Create a fresh player-controlled mob with an attached character and live
/// session. Used by the login path for brand-new accounts and by tests.
pub fn spawn_player_mob(world: &mut World, name: &str, admin: bool) -> ObjectId {
    let mob = world
        .spawn_mob(vec![name.to_lowercase()], name, "human", "warrior", 1)
        .expect("built-in archetypes are registered");
    let id = world.allocate_character_id();
    let mut credentials = Credentials::new(name, "password", 0);
    credentials.is_admin = admin;
    let mut character = Character::new(id, credentials, mob);
    character.session = Some(Session::new(id.0, world.clock_ms));
    world.register_character(character);
    world.active_characters.insert(id);
    if let Some(state) = world.object_mut(mob).and_then(|o| o.mob_mut()) {
        state.character = Some(id);
    }
    mob
}
