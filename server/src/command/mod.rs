//! The command registry and dispatcher.
//!
//! Commands are registered once, at build time, in a fixed order; the
//! registration sequence number is the declaration-order tie-break for
//! candidates of equal priority and specificity. Dispatch collects every
//! command answering to the first input token, ranks them, and runs the
//! first whose pattern parses cleanly.

pub mod ability;
pub mod admin;
pub mod pattern;
pub mod scope;
pub mod social;
pub mod standard;

use std::time::Instant;

use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;

use crate::act::send_to_mob;
use crate::world::{ObjectId, World};
use pattern::{ArgMap, ParseOutcome, Pattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CommandPriority {
    Low,
    Normal,
    High,
}

/// Cooldown policy for one command.
#[derive(Clone, Copy)]
pub enum Cooldown {
    None,
    Static(u64),
    /// Computed per (world, mob) at dispatch time.
    Dynamic(fn(&World, ObjectId) -> u64),
}

impl Cooldown {
    fn duration_ms(&self, world: &World, mob: ObjectId) -> u64 {
        match self {
            Cooldown::None => 0,
            Cooldown::Static(ms) => *ms,
            Cooldown::Dynamic(f) => f(world, mob),
        }
    }
}

/// The execution context handed to every handler. The world clock and room
/// are captured at dispatch time.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub actor: ObjectId,
    pub room: ObjectId,
    pub now_ms: u64,
    pub command_id: String,
    /// Set for ability-backed commands.
    pub ability: Option<String>,
}

pub type Handler = fn(&mut World, &CommandContext, &ArgMap) -> Result<(), EngineError>;

pub struct CommandSpec {
    pub id: String,
    pub pattern: Pattern,
    pub aliases: Vec<String>,
    pub priority: CommandPriority,
    pub cooldown: Cooldown,
    /// Mobs that do not know this ability see the command as nonexistent.
    pub ability: Option<String>,
    pub admin_only: bool,
    pub handler: Handler,
    seq: usize,
}

/// Builder-style spec under construction.
pub struct CommandDef {
    id: String,
    pattern: String,
    aliases: Vec<String>,
    priority: CommandPriority,
    cooldown: Cooldown,
    ability: Option<String>,
    admin_only: bool,
    handler: Handler,
}

impl CommandDef {
    pub fn new(id: &str, pattern: &str, handler: Handler) -> Self {
        CommandDef {
            id: id.to_string(),
            pattern: pattern.to_string(),
            aliases: Vec::new(),
            priority: CommandPriority::Normal,
            cooldown: Cooldown::None,
            ability: None,
            admin_only: false,
            handler,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_lowercase());
        self
    }

    pub fn priority(mut self, priority: CommandPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown = Cooldown::Static(ms);
        self
    }

    pub fn dynamic_cooldown(mut self, f: fn(&World, ObjectId) -> u64) -> Self {
        self.cooldown = Cooldown::Dynamic(f);
        self
    }

    pub fn ability(mut self, ability_id: &str) -> Self {
        self.ability = Some(ability_id.to_string());
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry::default()
    }

    /// Compile and register a command. Declaration order is preserved.
    pub fn register(&mut self, def: CommandDef) -> Result<(), EngineError> {
        let pattern = Pattern::compile(&def.pattern)
            .map_err(|e| EngineError::Internal(format!("bad pattern for {:?}: {}", def.id, e)))?;
        if pattern.first_literal().is_none() {
            return Err(EngineError::Internal(format!(
                "command {:?} must start with a literal",
                def.id
            )));
        }
        let seq = self.commands.len();
        self.commands.push(CommandSpec {
            id: def.id,
            pattern,
            aliases: def.aliases,
            priority: def.priority,
            cooldown: def.cooldown,
            ability: def.ability,
            admin_only: def.admin_only,
            handler: def.handler,
            seq,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command labels visible to a given mob (ability-gated ones only when
    /// known), sorted.
    pub fn labels_for(&self, world: &World, mob: ObjectId) -> Vec<String> {
        let knows = |ability: &Option<String>| match ability {
            Some(id) => world
                .object(mob)
                .and_then(|o| o.mob())
                .map_or(false, |m| m.knows_ability(id)),
            None => true,
        };
        let mut labels: Vec<String> = self
            .commands
            .iter()
            .filter(|c| knows(&c.ability))
            .map(|c| c.id.clone())
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// All registered labels, for publication into the world.
    pub fn all_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.commands.iter().map(|c| c.id.clone()).collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// Dispatch one input line for `actor`. All responses go through the
    /// message layer; the return value reports only whether a handler ran.
    pub fn dispatch(&self, world: &mut World, actor: ObjectId, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        let first = line.split_whitespace().next().unwrap_or("").to_lowercase();

        let knows_ability = |world: &World, ability: &Option<String>| match ability {
            Some(id) => world
                .object(actor)
                .and_then(|o| o.mob())
                .map_or(false, |m| m.knows_ability(id)),
            None => true,
        };

        // Candidates: first-literal (or alias) answers to the typed token.
        let mut candidates: Vec<&CommandSpec> = self
            .commands
            .iter()
            .filter(|c| c.pattern.answers_to(&first, &c.aliases))
            .filter(|c| knows_ability(world, &c.ability))
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.pattern.specificity().cmp(&a.pattern.specificity()))
                .then(a.seq.cmp(&b.seq))
        });

        if candidates.is_empty() {
            send_to_mob(world, actor, "Huh?", MessageGroup::CommandResponse);
            return false;
        }

        let mut first_failure: Option<String> = None;
        for spec in &candidates {
            let alias_used = spec.aliases.contains(&first);
            match spec.pattern.parse(world, actor, line, alias_used) {
                ParseOutcome::Matched(args) => {
                    self.execute(world, actor, spec, args);
                    return true;
                }
                ParseOutcome::ScopeMiss => {
                    send_to_mob(
                        world,
                        actor,
                        &EngineError::ScopeMiss.player_message(),
                        MessageGroup::CommandResponse,
                    );
                    return false;
                }
                ParseOutcome::Failed(reason) => {
                    if first_failure.is_none() {
                        first_failure = Some(reason);
                    }
                }
            }
        }

        // Nothing parsed; report the best-ranked candidate's failure.
        let reason = first_failure.unwrap_or_else(|| "Huh?".to_string());
        send_to_mob(world, actor, &reason, MessageGroup::CommandResponse);
        false
    }

    fn execute(&self, world: &mut World, actor: ObjectId, spec: &CommandSpec, args: ArgMap) {
        if spec.admin_only && !is_admin(world, actor) {
            send_to_mob(
                world,
                actor,
                &EngineError::PermissionDenied.player_message(),
                MessageGroup::CommandResponse,
            );
            return;
        }

        let cooldown_ms = spec.cooldown.duration_ms(world, actor);
        if cooldown_ms > 0 {
            let remaining = world.cooldown_remaining(actor, &spec.id, cooldown_ms);
            if remaining > 0 {
                send_to_mob(
                    world,
                    actor,
                    &format!(
                        "You cannot use '{}' again for another {}.",
                        spec.id,
                        crate::helpers::format_duration_ms(remaining.max(1000))
                    ),
                    MessageGroup::CommandResponse,
                );
                return;
            }
        }

        let Some(room) = world.room_of(actor) else {
            send_to_mob(
                world,
                actor,
                &EngineError::NotInRoom.player_message(),
                MessageGroup::CommandResponse,
            );
            return;
        };

        let ctx = CommandContext {
            actor,
            room,
            now_ms: world.clock_ms,
            command_id: spec.id.clone(),
            ability: spec.ability.clone(),
        };

        world.note_command_executed(actor, &spec.id);

        let started = Instant::now();
        let result = (spec.handler)(world, &ctx, &args);
        let elapsed = started.elapsed().as_millis() as u64;
        if elapsed > world.config.command_budget_ms {
            log::warn!(
                "command {:?} for {} blew its budget: {}ms",
                spec.id,
                actor,
                elapsed
            );
            send_to_mob(
                world,
                actor,
                &EngineError::Internal("budget".into()).player_message(),
                MessageGroup::CommandResponse,
            );
            return;
        }

        if let Err(err) = result {
            if err.is_internal() {
                log::error!("command {:?} for {} failed internally: {}", spec.id, actor, err);
            }
            send_to_mob(world, actor, &err.player_message(), MessageGroup::CommandResponse);
        }
    }
}

fn is_admin(world: &World, actor: ObjectId) -> bool {
    world
        .object(actor)
        .and_then(|o| o.mob())
        .and_then(|m| m.character)
        .and_then(|id| world.character(id))
        .map_or(false, |c| c.credentials.is_admin)
}
