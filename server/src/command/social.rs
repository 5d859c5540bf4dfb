//! Communication commands: say, gossip, tell.
//!
//! Block lists are honored here, at the point of fanout; busy-mode queueing
//! and channel muting are the receiving character's own policy and live in
//! [`crate::character`].

use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;

use crate::act::send_to_mob;
use crate::command::pattern::ArgMap;
use crate::command::{CommandContext, CommandDef, CommandRegistry};
use crate::world::{CharacterId, ObjectId, World};

pub fn register(registry: &mut CommandRegistry) -> Result<(), EngineError> {
    registry.register(CommandDef::new("say", "say~ <message:text>", cmd_say).alias("'"))?;
    registry.register(CommandDef::new("gossip", "gossip~ <message:text>", cmd_gossip))?;
    registry.register(CommandDef::new("tell", "tell <who:word> <message:text>", cmd_tell))?;
    Ok(())
}

fn speaker_name(world: &World, mob: ObjectId) -> String {
    world.display_name(mob)
}

fn speaker_username(world: &World, mob: ObjectId) -> Option<String> {
    world
        .object(mob)
        .and_then(|o| o.mob())
        .and_then(|m| m.character)
        .and_then(|id| world.character(id))
        .map(|c| c.username().to_string())
}

fn has_blocked_speaker(world: &World, listener: CharacterId, speaker: &Option<String>) -> bool {
    match (world.character(listener), speaker) {
        (Some(character), Some(name)) => character.has_blocked(name),
        _ => false,
    }
}

fn cmd_say(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let message = args
        .text("message")
        .ok_or_else(|| EngineError::Parse("Say what?".into()))?
        .to_string();
    let name = speaker_name(world, ctx.actor);
    let username = speaker_username(world, ctx.actor);

    send_to_mob(
        world,
        ctx.actor,
        &format!("You say, '{}'", message),
        MessageGroup::Channels,
    );

    for observer in world.contents_of(ctx.room) {
        if observer == ctx.actor {
            continue;
        }
        let Some(listener) = world.object(observer).and_then(|o| o.mob()).and_then(|m| m.character)
        else {
            continue;
        };
        if has_blocked_speaker(world, listener, &username) {
            continue;
        }
        send_to_mob(
            world,
            observer,
            &format!("{} says, '{}'", name, message),
            MessageGroup::Channels,
        );
    }
    Ok(())
}

fn cmd_gossip(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let message = args
        .text("message")
        .ok_or_else(|| EngineError::Parse("Gossip what?".into()))?
        .to_string();
    let Some(username) = speaker_username(world, ctx.actor) else {
        return Err(EngineError::PermissionDenied);
    };

    send_to_mob(
        world,
        ctx.actor,
        &format!("{{mYou gossip, '{}'{{d", message),
        MessageGroup::Channels,
    );

    let listeners: Vec<CharacterId> = world.active_characters.iter().copied().collect();
    for listener in listeners {
        let Some(character) = world.character(listener) else {
            continue;
        };
        if character.username().eq_ignore_ascii_case(&username) {
            continue;
        }
        if character.has_blocked(&username) {
            continue;
        }
        let mob = character.mob;
        send_to_mob(
            world,
            mob,
            &format!("{{m{} gossips, '{}'{{d", username, message),
            MessageGroup::Channels,
        );
    }
    Ok(())
}

fn cmd_tell(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let who = args
        .word("who")
        .ok_or_else(|| EngineError::Parse("Tell whom?".into()))?
        .to_string();
    let message = args
        .text("message")
        .ok_or_else(|| EngineError::Parse("Tell them what?".into()))?
        .to_string();
    let Some(sender_name) = speaker_username(world, ctx.actor) else {
        return Err(EngineError::PermissionDenied);
    };

    let Some(target_id) = world.character_by_name(&who) else {
        send_to_mob(
            world,
            ctx.actor,
            &format!("No adventurer named {:?} is known.", who),
            MessageGroup::CommandResponse,
        );
        return Ok(());
    };
    let (online, target_mob, target_username) = {
        let target = world
            .character(target_id)
            .ok_or_else(|| EngineError::Internal("stale character id".into()))?;
        (target.session.is_some(), target.mob, target.username().to_string())
    };
    if !online {
        send_to_mob(
            world,
            ctx.actor,
            &format!("{} is not here right now.", target_username),
            MessageGroup::CommandResponse,
        );
        return Ok(());
    }
    if world
        .character(target_id)
        .map_or(false, |c| c.has_blocked(&sender_name))
    {
        // The sender learns nothing beyond a soft refusal.
        send_to_mob(
            world,
            ctx.actor,
            &format!("{} is not receiving tells.", target_username),
            MessageGroup::CommandResponse,
        );
        return Ok(());
    }

    send_to_mob(
        world,
        ctx.actor,
        &format!("{{cYou tell {}, '{}'{{d", target_username, message),
        MessageGroup::Channels,
    );
    send_to_mob(
        world,
        target_mob,
        &format!("{{c{} tells you, '{}'{{d", sender_name, message),
        MessageGroup::Channels,
    );
    Ok(())
}
