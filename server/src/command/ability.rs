//! Combat initiation and ability-backed commands.
//!
//! Every registered [`Ability`] becomes a command gated on knowing the
//! ability; mobs that have not learned it cannot even see the command.
//! Ability damage and costs scale with proficiency, and each use advances
//! the use counter along the ability's curve.

use dusk_core::ability::{Ability, AbilityAction};
use dusk_core::attributes::Resource;
use dusk_core::effect::ActTemplates;
use dusk_core::error::EngineError;

use crate::act::{act, ActContext, ActOptions};
use crate::combat::{initiate_combat, one_hit, one_magic_hit};
use crate::command::pattern::ArgMap;
use crate::command::{CommandContext, CommandDef, CommandRegistry};
use crate::world::{ObjectId, World};

pub fn register(registry: &mut CommandRegistry, world: &World) -> Result<(), EngineError> {
    registry.register(CommandDef::new("kill", "kill~ <target:mob>", cmd_kill).alias("attack"))?;

    // Abilities register in sorted id order so declaration order is stable
    // across runs.
    for (id, ability) in &world.abilities {
        let mut def = CommandDef::new(id, &ability.pattern, cmd_use_ability).ability(id);
        if let Some(ms) = ability.cooldown_ms {
            def = def.cooldown_ms(ms);
        }
        registry.register(def)?;
    }
    Ok(())
}

fn cmd_kill(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let target = args.object("target").ok_or(EngineError::ScopeMiss)?;
    if target == ctx.actor {
        return Err(EngineError::Parse("Suicide is a longer road than that.".into()));
    }
    initiate_combat(world, ctx.actor, target)?;
    act(
        world,
        &ActTemplates {
            user: Some("You attack {target}!".into()),
            target: Some("{User} attacks you!".into()),
            room: Some("{User} attacks {target}!".into()),
        },
        &ActContext { user: ctx.actor, target: Some(target), room: ctx.room },
        &ActOptions::group(dusk_core::message::MessageGroup::Combat),
        &[],
    );
    one_hit(world, ctx.actor, target, 1.0, None);
    Ok(())
}

fn resolve_target(
    world: &World,
    ctx: &CommandContext,
    args: &ArgMap,
    ability: &Ability,
) -> Result<ObjectId, EngineError> {
    if let Some(target) = args.object("target") {
        return Ok(target);
    }
    let combat_target = world
        .object(ctx.actor)
        .and_then(|o| o.mob())
        .and_then(|m| m.combat_target);
    match combat_target {
        Some(target) => Ok(target),
        None if ability.offensive => Err(EngineError::NotInCombat),
        // Untargeted and peaceful: the actor targets themself.
        None => Ok(ctx.actor),
    }
}

fn cmd_use_ability(world: &mut World, ctx: &CommandContext, args: &ArgMap) -> Result<(), EngineError> {
    let ability_id = ctx
        .ability
        .clone()
        .ok_or_else(|| EngineError::Internal("ability command without ability".into()))?;
    let ability = world
        .abilities
        .get(&ability_id)
        .cloned()
        .ok_or_else(|| EngineError::Internal(format!("unknown ability {:?}", ability_id)))?;

    let target = resolve_target(world, ctx, args, &ability)?;
    if ability.offensive && !world.mob_alive(target) {
        return Err(EngineError::TargetDead);
    }

    let proficiency = world
        .object(ctx.actor)
        .and_then(|o| o.mob())
        .map_or(0, |m| m.proficiency(&ability_id));
    let scale = Ability::proficiency_scale(proficiency);

    // Costs are checked before anything fires; a failed cast spends nothing.
    if ability.cost.mana > 0.0 {
        world.spend_resource(ctx.actor, Resource::Mana, ability.cost.mana)?;
    }
    if ability.cost.exhaustion > 0.0 {
        world.spend_resource(ctx.actor, Resource::Exhaustion, ability.cost.exhaustion)?;
    }

    if ability.offensive && target != ctx.actor {
        let already_fighting = world
            .object(ctx.actor)
            .and_then(|o| o.mob())
            .map_or(false, |m| m.combat_target.is_some());
        if !already_fighting {
            initiate_combat(world, ctx.actor, target)?;
        }
    }

    match &ability.action {
        AbilityAction::MeleeStrike { multiplier } => {
            one_hit(world, ctx.actor, target, multiplier * scale, None);
        }
        AbilityAction::MagicHit { multiplier, damage_type } => {
            one_magic_hit(world, ctx.actor, target, multiplier * scale, *damage_type);
        }
        AbilityAction::ApplyEffect { effect_id, overrides } => {
            crate::effect::add_effect(world, target, effect_id, Some(ctx.actor), *overrides)?;
        }
    }

    world.advance_ability(ctx.actor, &ability_id);
    Ok(())
}
