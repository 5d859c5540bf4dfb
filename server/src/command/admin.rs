//! Admin commands.
//!
//! `exec` is a small enumerated RPC surface, not a scripting runtime:
//! spawn-at-room, set-attribute, dump-room, dump-mob. `copyover` only flags
//! restart intent; the orchestrator owns the actual handover.

use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;

use crate::act::send_to_mob;
use crate::command::pattern::ArgMap;
use crate::command::scope::{resolve_fragment, Scope};
use crate::command::{CommandContext, CommandDef, CommandPriority, CommandRegistry};
use crate::world::{ObjectId, World};

pub fn register(registry: &mut CommandRegistry) -> Result<(), EngineError> {
    registry.register(
        CommandDef::new("exec", "exec <code:text>", cmd_exec)
            .admin_only()
            .priority(CommandPriority::High),
    )?;
    registry.register(CommandDef::new("copyover", "copyover", cmd_copyover).admin_only())?;
    Ok(())
}

fn respond(world: &mut World, mob: ObjectId, text: &str) {
    send_to_mob(world, mob, text, MessageGroup::CommandResponse);
}

/// The enumerated operations `exec` understands.
enum AdminOp {
    Spawn { template: String, room_ref: Option<String> },
    Set { mob_name: String, field: String, value: f64 },
    DumpRoom { room_ref: Option<String> },
    DumpMob { mob_name: String },
}

fn parse_op(code: &str) -> Result<AdminOp, String> {
    let words: Vec<&str> = code.split_whitespace().collect();
    match words.as_slice() {
        ["spawn", template] => {
            Ok(AdminOp::Spawn { template: template.to_string(), room_ref: None })
        }
        ["spawn", template, room_ref] => Ok(AdminOp::Spawn {
            template: template.to_string(),
            room_ref: Some(room_ref.to_string()),
        }),
        ["set", mob, field, value] => match value.parse::<f64>() {
            Ok(value) => Ok(AdminOp::Set {
                mob_name: mob.to_string(),
                field: field.to_string(),
                value,
            }),
            Err(_) => Err(format!("not a number: {:?}", value)),
        },
        ["dump", "room"] => Ok(AdminOp::DumpRoom { room_ref: None }),
        ["dump", "room", room_ref] => {
            Ok(AdminOp::DumpRoom { room_ref: Some(room_ref.to_string()) })
        }
        ["dump", "mob", mob] => Ok(AdminOp::DumpMob { mob_name: mob.to_string() }),
        _ => Err("operations: spawn <template> [room-ref], set <mob> <field> <value>, \
                  dump room [room-ref], dump mob <name>"
            .to_string()),
    }
}

fn cmd_exec(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let code = args
        .text("code")
        .ok_or_else(|| EngineError::Parse("Exec what?".into()))?
        .to_string();

    let op = match parse_op(&code) {
        Ok(op) => op,
        Err(reason) => {
            respond(world, ctx.actor, &reason);
            return Ok(());
        }
    };

    match op {
        AdminOp::Spawn { template, room_ref } => {
            let room = match &room_ref {
                Some(reference) => world.resolve_room_ref(reference).ok_or_else(|| {
                    EngineError::Parse(format!("No room at {:?}.", reference))
                })?,
                None => ctx.room,
            };
            let spawned = world.create_from_template(&template)?;
            world.add_to(spawned, room)?;
            let line =
                format!("Spawned {} ({}) into the room.", world.display_name(spawned), spawned);
            log::info!("admin {} spawned {:?} as {}", ctx.actor, template, spawned);
            respond(world, ctx.actor, &line);
        }
        AdminOp::Set { mob_name, field, value } => {
            let fragment = vec![mob_name.clone()];
            let target = resolve_fragment(
                world,
                ctx.actor,
                &fragment,
                crate::command::pattern::ArgType::Mob,
                Some(Scope::Room),
            )
            .ok_or(EngineError::ScopeMiss)?;

            {
                let state = world
                    .object_mut(target)
                    .and_then(|o| o.mob_mut())
                    .ok_or(EngineError::MissingObject)?;
                match field.as_str() {
                    "health" => state.health = value,
                    "mana" => state.mana = value,
                    "exhaustion" => state.exhaustion = value,
                    "level" => state.level = value.max(1.0) as u32,
                    "experience" => state.experience = value.max(0.0) as u64,
                    _ => {
                        respond(
                            world,
                            ctx.actor,
                            "Settable fields: health, mana, exhaustion, level, experience.",
                        );
                        return Ok(());
                    }
                }
            }
            world.recompute_vitals(target);
            log::info!("admin {} set {} {} = {}", ctx.actor, target, field, value);
            let line = format!("Set {} of {} to {}.", field, world.display_name(target), value);
            respond(world, ctx.actor, &line);
        }
        AdminOp::DumpRoom { room_ref } => {
            let room = match &room_ref {
                Some(reference) => world.resolve_room_ref(reference).ok_or_else(|| {
                    EngineError::Parse(format!("No room at {:?}.", reference))
                })?,
                None => ctx.room,
            };
            let header = format!(
                "{} {} [{}]",
                room,
                world.display_name(room),
                world.room_ref_of(room).unwrap_or_else(|| "unregistered".into()),
            );
            respond(world, ctx.actor, &header);
            for oid in world.contents_of(room) {
                let kind = world.object(oid).map_or("?", |o| {
                    if o.is_mob() {
                        "mob"
                    } else if o.is_item() {
                        "item"
                    } else {
                        "room"
                    }
                });
                let line = format!("  {} {} ({})", oid, world.display_name(oid), kind);
                respond(world, ctx.actor, &line);
            }
        }
        AdminOp::DumpMob { mob_name } => {
            let fragment = vec![mob_name];
            let target = resolve_fragment(
                world,
                ctx.actor,
                &fragment,
                crate::command::pattern::ArgType::Mob,
                Some(Scope::Room),
            )
            .ok_or(EngineError::ScopeMiss)?;
            let lines = {
                let obj = world.expect_object(target)?;
                let state = obj.mob().ok_or(EngineError::MissingObject)?;
                vec![
                    format!("{} {}", target, obj.display_name),
                    format!(
                        "  race {:?} job {:?} level {} xp {}",
                        state.race_id, state.job_id, state.level, state.experience
                    ),
                    format!(
                        "  health {:.1} mana {:.1} exhaustion {:.1}",
                        state.health, state.mana, state.exhaustion
                    ),
                    format!("  effects {} target {:?}", state.effects.len(), state.combat_target),
                ]
            };
            for line in lines {
                respond(world, ctx.actor, &line);
            }
        }
    }
    Ok(())
}

fn cmd_copyover(world: &mut World, ctx: &CommandContext, _args: &ArgMap) -> Result<(), EngineError> {
    world.copyover_requested = true;
    log::warn!("copyover requested by {}", ctx.actor);

    let everyone: Vec<ObjectId> = world
        .active_characters
        .iter()
        .filter_map(|id| world.character(*id).map(|c| c.mob))
        .collect();
    for mob in everyone {
        send_to_mob(
            world,
            mob,
            "{ySystem: the world shimmers; hold still while it is rebuilt.{d",
            MessageGroup::System,
        );
    }
    respond(world, ctx.actor, "Copyover flagged; the orchestrator takes it from here.");
    Ok(())
}
