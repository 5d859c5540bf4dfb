//! The standard command set: perception, movement, item handling, the
//! character sheet, busy mode and the block list.

use dusk_core::attributes::display_stat;
use dusk_core::direction::Direction;
use dusk_core::effect::ActTemplates;
use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;

use crate::act::{act, send_to_mob, ActContext, ActOptions};
use crate::command::pattern::ArgMap;
use crate::command::{CommandContext, CommandDef, CommandRegistry};
use crate::world::{CharacterId, ObjectId, World};

pub fn register(registry: &mut CommandRegistry) -> Result<(), EngineError> {
    registry.register(CommandDef::new(
        "look",
        "look~ <target:object@all?> <dir:direction?>",
        cmd_look,
    ))?;

    for dir in Direction::ALL {
        registry.register(
            CommandDef::new(dir.label(), &format!("{}~", dir.label()), cmd_move)
                .alias(dir.short()),
        )?;
    }

    registry.register(CommandDef::new("inventory", "inventory~", cmd_inventory).alias("i"))?;
    registry.register(
        CommandDef::new("equipment", "equipment", cmd_equipment).alias("gear").alias("eq"),
    )?;
    registry.register(CommandDef::new(
        "get-from",
        "get~ <item:word> from~ <container:object@all>",
        cmd_get_from,
    ))?;
    registry.register(CommandDef::new("get", "get~ <item:item@room>", cmd_get).alias("take"))?;
    registry.register(CommandDef::new("drop", "drop~ <item:item@inventory>", cmd_drop))?;
    registry.register(CommandDef::new(
        "put",
        "put~ <item:item@inventory> in~ <container:object@all>",
        cmd_put,
    ))?;
    registry.register(CommandDef::new("wear", "wear~ <item:item@inventory>", cmd_wear).alias("wield"))?;
    registry.register(CommandDef::new("remove", "remove~ <item:item@inventory>", cmd_remove))?;
    registry.register(CommandDef::new("score", "score~", cmd_score).alias("info").alias("me"))?;
    registry.register(CommandDef::new("effects", "effects~", cmd_effects))?;
    registry.register(CommandDef::new("commands", "commands", cmd_commands))?;
    registry.register(CommandDef::new("who", "who", cmd_who))?;
    registry.register(CommandDef::new("quit", "quit", cmd_quit))?;
    registry.register(CommandDef::new("busy", "busy~ <action:word?> <arg:word?>", cmd_busy))?;
    registry.register(CommandDef::new("block", "block <who:word?>", cmd_block))?;
    Ok(())
}

fn character_id_of(world: &World, mob: ObjectId) -> Option<CharacterId> {
    world.object(mob).and_then(|o| o.mob()).and_then(|m| m.character)
}

fn respond(world: &mut World, mob: ObjectId, text: &str) {
    send_to_mob(world, mob, text, MessageGroup::CommandResponse);
}

/// Render a room the way `look` and movement show it.
pub fn render_room(world: &World, viewer: ObjectId, room: ObjectId) -> Vec<String> {
    let Some(room_obj) = world.object(room) else {
        return vec!["You see nothing at all.".into()];
    };
    let verbose = world
        .object(viewer)
        .and_then(|o| o.mob())
        .and_then(|m| m.character)
        .and_then(|id| world.character(id))
        .map_or(true, |c| c.settings.verbose);

    let mut lines = Vec::new();
    lines.push(format!("{{c{}{{d", room_obj.display_name));
    if verbose {
        if let Some(desc) = &room_obj.description {
            lines.push(desc.clone());
        }
    }

    let exits = world.exits_of(room);
    if exits.is_empty() {
        lines.push("[ Exits: none ]".into());
    } else {
        let shorts: Vec<&str> = exits.iter().map(|(d, _)| d.short()).collect();
        lines.push(format!("[ Exits: {} ]", shorts.join(" ")));
    }

    for oid in world.contents_of(room) {
        if oid == viewer {
            continue;
        }
        let Some(obj) = world.object(oid) else {
            continue;
        };
        if let Some(line) = &obj.room_description {
            lines.push(line.clone());
        } else if obj.is_mob() {
            lines.push(format!("{} is standing here.", crate::helpers::capitalize_first(&obj.display_name)));
        } else {
            lines.push(format!("{} lies here.", crate::helpers::capitalize_first(&obj.display_name)));
        }
    }
    lines
}

fn send_lines(world: &mut World, mob: ObjectId, lines: Vec<String>) {
    for line in lines {
        respond(world, mob, &line);
    }
}

fn cmd_look(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    if let Some(dir) = args.direction("dir") {
        respond(world, ctx.actor, &format!("You look {}...", dir.label()));
        match world.step_target(ctx.room, dir) {
            Some(next) => {
                let lines = render_room(world, ctx.actor, next);
                send_lines(world, ctx.actor, lines);
            }
            None => respond(world, ctx.actor, "You see nothing that way."),
        }
        return Ok(());
    }

    if let Some(target) = args.object("target") {
        let (name, description, is_container, is_mob) = {
            let obj = world.expect_object(target)?;
            (
                obj.display_name.clone(),
                obj.description.clone(),
                obj.item_data().map_or(false, |d| d.container),
                obj.is_mob(),
            )
        };
        match description {
            Some(text) => respond(world, ctx.actor, &text),
            None => respond(
                world,
                ctx.actor,
                &format!("You see nothing special about {}.", name),
            ),
        }
        if is_container {
            let contents = world.contents_of(target);
            if contents.is_empty() {
                respond(world, ctx.actor, "It is empty.");
            } else {
                respond(world, ctx.actor, "It contains:");
                for oid in contents {
                    let line = format!("  {}", world.display_name(oid));
                    respond(world, ctx.actor, &line);
                }
            }
        }
        if is_mob {
            let (health, max) = (
                world.object(target).and_then(|o| o.mob()).map_or(0.0, |m| m.health),
                world.max_health(target),
            );
            let ratio = if max > 0.0 { health / max } else { 0.0 };
            let condition = match ratio {
                r if r >= 1.0 => "in perfect health",
                r if r >= 0.75 => "lightly scratched",
                r if r >= 0.5 => "wounded",
                r if r >= 0.25 => "badly hurt",
                r if r > 0.0 => "near death",
                _ => "dead",
            };
            respond(world, ctx.actor, &format!("{} looks {}.", crate::helpers::capitalize_first(&name), condition));
        }
        return Ok(());
    }

    let lines = render_room(world, ctx.actor, ctx.room);
    send_lines(world, ctx.actor, lines);
    Ok(())
}

fn cmd_move(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let dir = Direction::parse(&ctx.command_id)
        .ok_or_else(|| EngineError::Internal(format!("move command {:?}", ctx.command_id)))?;

    let Some(dest) = world.step_target(ctx.room, dir) else {
        respond(world, ctx.actor, "You cannot go that way.");
        return Ok(());
    };

    act(
        world,
        &ActTemplates::room_only(format!("{{User}} leaves {}.", dir.label())),
        &ActContext { user: ctx.actor, target: None, room: ctx.room },
        &ActOptions::default(),
        &[],
    );

    world.add_to(ctx.actor, dest)?;

    act(
        world,
        &ActTemplates::room_only(format!("{{User}} arrives from the {}.", dir.reverse().label())),
        &ActContext { user: ctx.actor, target: None, room: dest },
        &ActOptions::default(),
        &[],
    );

    let lines = render_room(world, ctx.actor, dest);
    send_lines(world, ctx.actor, lines);
    Ok(())
}

fn cmd_inventory(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let contents = world.contents_of(ctx.actor);
    if contents.is_empty() {
        respond(world, ctx.actor, "You are carrying nothing.");
        return Ok(());
    }
    respond(world, ctx.actor, "You are carrying:");
    for oid in contents {
        let marker = if world.is_equipped(ctx.actor, oid) { " (equipped)" } else { "" };
        let line = format!("  {}{}", world.display_name(oid), marker);
        respond(world, ctx.actor, &line);
    }
    Ok(())
}

fn cmd_equipment(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    respond(world, ctx.actor, "You are using:");
    for slot in dusk_core::records::EquipSlot::ALL {
        let line = match world.equipped_item(ctx.actor, slot) {
            Some(item) => format!("  {:<10} {}", slot.label(), world.display_name(item)),
            None => format!("  {:<10} <nothing>", slot.label()),
        };
        respond(world, ctx.actor, &line);
    }
    Ok(())
}

fn cmd_get(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let item = args.object("item").ok_or(EngineError::ScopeMiss)?;
    world.add_to(item, ctx.actor)?;
    act(
        world,
        &ActTemplates {
            user: Some("You pick up {target}.".into()),
            target: None,
            room: Some("{User} picks up {target}.".into()),
        },
        &ActContext { user: ctx.actor, target: Some(item), room: ctx.room },
        &ActOptions::default(),
        &[],
    );
    Ok(())
}

fn cmd_get_from(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let container = args.object("container").ok_or(EngineError::ScopeMiss)?;
    let word = args.word("item").ok_or_else(|| EngineError::Parse("Get what?".into()))?;

    let container_is_container =
        world.expect_object(container)?.item_data().map_or(false, |d| d.container);
    if !container_is_container {
        let name = world.display_name(container);
        respond(world, ctx.actor, &format!("{} is not a container.", crate::helpers::capitalize_first(&name)));
        return Ok(());
    }

    let fragment = vec![word.to_string()];
    let found = world
        .contents_of(container)
        .into_iter()
        .find(|oid| world.object(*oid).map_or(false, |o| o.matches_fragment(&fragment)));
    let Some(item) = found else {
        return Err(EngineError::ScopeMiss);
    };

    world.add_to(item, ctx.actor)?;
    let container_name = world.display_name(container);
    act(
        world,
        &ActTemplates {
            user: Some(format!("You get {{target}} from {}.", container_name)),
            target: None,
            room: Some(format!("{{User}} gets {{target}} from {}.", container_name)),
        },
        &ActContext { user: ctx.actor, target: Some(item), room: ctx.room },
        &ActOptions::default(),
        &[],
    );
    Ok(())
}

fn cmd_drop(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let item = args.object("item").ok_or(EngineError::ScopeMiss)?;
    if world.is_equipped(ctx.actor, item) {
        let name = world.display_name(item);
        respond(
            world,
            ctx.actor,
            &format!("You cannot drop {} while it's equipped.", name),
        );
        return Ok(());
    }
    world.add_to(item, ctx.room)?;
    act(
        world,
        &ActTemplates {
            user: Some("You drop {target}.".into()),
            target: None,
            room: Some("{User} drops {target}.".into()),
        },
        &ActContext { user: ctx.actor, target: Some(item), room: ctx.room },
        &ActOptions::default(),
        &[],
    );
    Ok(())
}

fn cmd_put(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let item = args.object("item").ok_or(EngineError::ScopeMiss)?;
    let container = args.object("container").ok_or(EngineError::ScopeMiss)?;

    if world.is_equipped(ctx.actor, item) {
        let name = world.display_name(item);
        respond(
            world,
            ctx.actor,
            &format!("You cannot put {} anywhere while it's equipped.", name),
        );
        return Ok(());
    }

    let container_ok = world.expect_object(container)?.item_data().map_or(false, |d| d.container);
    if !container_ok {
        let name = world.display_name(container);
        respond(world, ctx.actor, &format!("{} is not a container.", crate::helpers::capitalize_first(&name)));
        return Ok(());
    }

    world.add_to(item, container)?;
    let container_name = world.display_name(container);
    act(
        world,
        &ActTemplates {
            user: Some(format!("You put {{target}} in {}.", container_name)),
            target: None,
            room: Some(format!("{{User}} puts {{target}} in {}.", container_name)),
        },
        &ActContext { user: ctx.actor, target: Some(item), room: ctx.room },
        &ActOptions::default(),
        &[],
    );
    Ok(())
}

fn cmd_wear(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let item = args.object("item").ok_or(EngineError::ScopeMiss)?;
    let wearable = {
        let data = world.expect_object(item)?.item_data();
        data.map_or(false, |d| d.equipment.is_some() && !d.currency)
    };
    if !wearable {
        respond(world, ctx.actor, "You cannot wear that.");
        return Ok(());
    }
    world.equip(ctx.actor, item)?;
    act(
        world,
        &ActTemplates {
            user: Some("You start using {target}.".into()),
            target: None,
            room: Some("{User} starts using {target}.".into()),
        },
        &ActContext { user: ctx.actor, target: Some(item), room: ctx.room },
        &ActOptions::default(),
        &[],
    );
    Ok(())
}

fn cmd_remove(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let item = args.object("item").ok_or(EngineError::ScopeMiss)?;
    if !world.is_equipped(ctx.actor, item) {
        respond(world, ctx.actor, "You are not using that.");
        return Ok(());
    }
    let slot = world
        .expect_object(item)?
        .item_data()
        .and_then(|d| d.equipment.as_ref())
        .map(|e| e.slot)
        .ok_or_else(|| EngineError::Internal("equipped non-equipment".into()))?;
    world.unequip(ctx.actor, slot);
    let name = world.display_name(item);
    respond(world, ctx.actor, &format!("You stop using {}.", name));
    Ok(())
}

fn cmd_score(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let (name, level, race_id, job_id, health, mana, exhaustion, experience) = {
        let obj = world.expect_object(ctx.actor)?;
        let mob = obj.mob().ok_or(EngineError::MissingObject)?;
        (
            obj.display_name.clone(),
            mob.level,
            mob.race_id.clone(),
            mob.job_id.clone(),
            mob.health,
            mob.mana,
            mob.exhaustion,
            mob.experience,
        )
    };
    let race = world.archetypes.get(&race_id).map_or(race_id.clone(), |a| a.name.clone());
    let job = world.archetypes.get(&job_id).map_or(job_id.clone(), |a| a.name.clone());
    let primary = world.primary_attributes(ctx.actor);
    let secondary = world.secondary_attributes(ctx.actor);
    let needed = dusk_core::constants::experience_for_level(level);

    let mut lines = vec![
        format!("{{cYou are {}, level {} {} {}.{{d", name, level, race, job),
        format!(
            "Health {}/{}  Mana {}/{}  Exhaustion {}/{}",
            display_stat(health),
            display_stat(world.max_health(ctx.actor)),
            display_stat(mana),
            display_stat(world.max_mana(ctx.actor)),
            display_stat(exhaustion),
            display_stat(world.max_exhaustion(ctx.actor)),
        ),
        format!("Experience: {} / {} to next level", experience, needed),
        format!(
            "Str {}  Agi {}  Int {}",
            display_stat(primary.strength),
            display_stat(primary.agility),
            display_stat(primary.intellect),
        ),
        format!(
            "Attack {}  Spell {}  Defense {}  Accuracy {}  Avoidance {}  Crit {}",
            display_stat(secondary.attack_power),
            display_stat(secondary.spell_power),
            display_stat(secondary.defense),
            display_stat(secondary.accuracy),
            display_stat(secondary.avoidance),
            display_stat(secondary.crit_rate),
        ),
    ];
    if let Some(id) = character_id_of(world, ctx.actor) {
        if let Some(character) = world.character(id) {
            lines.push(format!(
                "Playtime {}  Kills {}  Deaths {}",
                crate::helpers::format_duration_ms(character.stats.playtime_secs * 1000),
                character.stats.kills,
                character.stats.deaths,
            ));
        }
    }
    send_lines(world, ctx.actor, lines);
    Ok(())
}

fn cmd_effects(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let lines = crate::effect::effect_lines(world, ctx.actor);
    if lines.is_empty() {
        respond(world, ctx.actor, "You are not affected by anything.");
    } else {
        respond(world, ctx.actor, "You are affected by:");
        for line in lines {
            let line = format!("  {}", line);
            respond(world, ctx.actor, &line);
        }
    }
    Ok(())
}

fn cmd_commands(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let labels = world.command_labels.clone();
    respond(world, ctx.actor, "Available commands:");
    for chunk in labels.chunks(6) {
        let line = format!("  {}", chunk.join("  "));
        respond(world, ctx.actor, &line);
    }
    Ok(())
}

fn cmd_who(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let mut lines = vec!["Adventurers of Duskhaven:".to_string()];
    let active: Vec<CharacterId> = world.active_characters.iter().copied().collect();
    for id in active {
        if let Some(character) = world.character(id) {
            let level = world
                .object(character.mob)
                .and_then(|o| o.mob())
                .map_or(0, |m| m.level);
            lines.push(format!("  [{:>3}] {}", level, character.username()));
        }
    }
    if lines.len() == 1 {
        lines.push("  Nobody at all.".into());
    }
    send_lines(world, ctx.actor, lines);
    Ok(())
}

fn cmd_quit(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    let Some(id) = character_id_of(world, ctx.actor) else {
        return Err(EngineError::Internal("quit without character".into()));
    };
    respond(world, ctx.actor, "Farewell. The dusk keeps your place.");
    world.pending_quits.push(id);
    Ok(())
}

fn cmd_busy(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let Some(id) = character_id_of(world, ctx.actor) else {
        return Err(EngineError::Internal("busy without character".into()));
    };
    let action = args.word("action").map(str::to_string);
    let arg = args.word("arg").map(str::to_string);

    let reply = {
        let character = world
            .character_mut(id)
            .ok_or_else(|| EngineError::Internal("stale character id".into()))?;
        match (action.as_deref(), arg.as_deref()) {
            (None, _) => {
                character.settings.busy = !character.settings.busy;
                if character.settings.busy {
                    "Busy mode on. Forwarded messages will be held for you.".to_string()
                } else {
                    "Busy mode off.".to_string()
                }
            }
            (Some("on"), _) => {
                character.settings.busy = true;
                "Busy mode on.".to_string()
            }
            (Some("off"), _) => {
                character.settings.busy = false;
                "Busy mode off.".to_string()
            }
            (Some("read"), _) => {
                character.read_queued_messages();
                return Ok(());
            }
            (Some("combat"), mode) => {
                character.settings.combat_busy = match mode {
                    Some("on") => true,
                    Some("off") => false,
                    _ => !character.settings.combat_busy,
                };
                if character.settings.combat_busy {
                    "Combat busy mode on.".to_string()
                } else {
                    "Combat busy mode off.".to_string()
                }
            }
            (Some("forward"), Some(group_word)) => {
                match dusk_core::message::MessageGroup::parse(group_word) {
                    Some(group) if !group.always_immediate() => {
                        character.settings.busy_forwarded.insert(group);
                        format!("Messages in the {} group will be held while busy.", group)
                    }
                    Some(_) => "That group always delivers immediately.".to_string(),
                    None => format!("No such message group: {}.", group_word),
                }
            }
            (Some("ignore"), Some(group_word)) => {
                match dusk_core::message::MessageGroup::parse(group_word) {
                    Some(group) => {
                        character.settings.busy_forwarded.remove(&group);
                        format!("Messages in the {} group deliver normally again.", group)
                    }
                    None => format!("No such message group: {}.", group_word),
                }
            }
            (Some("status"), _) => {
                let forwarded: Vec<String> = character
                    .settings
                    .busy_forwarded
                    .iter()
                    .map(|g| g.to_string())
                    .collect();
                format!(
                    "Busy: {}. Combat busy: {}. Held: {}. Forwarded groups: {}.",
                    if character.settings.busy { "on" } else { "off" },
                    if character.settings.combat_busy { "on" } else { "off" },
                    character.session.as_ref().map_or(0, |s| s.queued_len()),
                    if forwarded.is_empty() { "none".to_string() } else { forwarded.join(", ") },
                )
            }
            (Some(other), _) => format!(
                "Busy actions: on, off, read, combat, forward <group>, ignore <group>, status. Not {:?}.",
                other
            ),
        }
    };
    respond(world, ctx.actor, &reply);
    Ok(())
}

fn cmd_block(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let Some(id) = character_id_of(world, ctx.actor) else {
        return Err(EngineError::Internal("block without character".into()));
    };
    let who = args.word("who").map(str::to_string);

    match who {
        None => {
            let blocked: Vec<String> = world
                .character(id)
                .map(|c| c.blocked.iter().cloned().collect())
                .unwrap_or_default();
            if blocked.is_empty() {
                respond(world, ctx.actor, "You are blocking nobody.");
            } else {
                let line = format!("You are blocking: {}.", blocked.join(", "));
                respond(world, ctx.actor, &line);
            }
        }
        Some(name) => {
            let own = world.character(id).map_or(false, |c| {
                c.username().eq_ignore_ascii_case(&name)
            });
            if own {
                respond(world, ctx.actor, "Blocking yourself would be a quiet life indeed.");
                return Ok(());
            }
            if world.character_by_name(&name).is_none() {
                respond(world, ctx.actor, &format!("No adventurer named {:?} exists.", name));
                return Ok(());
            }
            let now_blocked = world
                .character_mut(id)
                .map(|c| c.toggle_block(&name))
                .unwrap_or(false);
            let reply = if now_blocked {
                format!("You now block {}.", name)
            } else {
                format!("You no longer block {}.", name)
            };
            respond(world, ctx.actor, &reply);
        }
    }
    Ok(())
}
