//! The effect engine.
//!
//! Instances move `Pending -> Active -> Expired`; their tick and expiration
//! deadlines live in the world's timer heap as `(deadline, kind, seq)`
//! entries. Cancellation is a membership check: a popped entry whose mob,
//! instance, or recorded deadline no longer matches is silently skipped, so
//! refreshes and removals never have to hunt down stale timers.

use dusk_core::attributes::display_stat;
use dusk_core::damage::DamageType;
use dusk_core::effect::{ActTemplates, EffectKind, EffectOverrides, EffectTemplate};
use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;

use crate::act::{act, ActContext, ActOptions};
use crate::combat::process_effect_damage;
use crate::world::object::EffectInstance;
use crate::world::{ObjectId, TimerEntry, TimerKind, World};

fn secs_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round().max(0.0) as u64
}

/// The merged scalar parameters of one application.
struct Applied {
    tick_amount: Option<f64>,
    interval_ms: Option<u64>,
    ticks: u32,
    expires_at_ms: Option<u64>,
    remaining_absorption: Option<f64>,
}

fn merge(template: &EffectTemplate, overrides: &EffectOverrides, now_ms: u64) -> Applied {
    match &template.kind {
        EffectKind::DamageOverTime { damage, interval_secs, ticks, .. } => {
            let interval = overrides.interval_secs.unwrap_or(*interval_secs);
            let ticks = overrides.ticks.unwrap_or(*ticks);
            let interval_ms = secs_to_ms(interval);
            Applied {
                tick_amount: Some(overrides.damage.unwrap_or(*damage)),
                interval_ms: Some(interval_ms),
                ticks,
                expires_at_ms: Some(now_ms + interval_ms * u64::from(ticks)),
                remaining_absorption: None,
            }
        }
        EffectKind::HealOverTime { heal, interval_secs, ticks } => {
            let interval = overrides.interval_secs.unwrap_or(*interval_secs);
            let ticks = overrides.ticks.unwrap_or(*ticks);
            let interval_ms = secs_to_ms(interval);
            Applied {
                tick_amount: Some(overrides.heal.unwrap_or(*heal)),
                interval_ms: Some(interval_ms),
                ticks,
                expires_at_ms: Some(now_ms + interval_ms * u64::from(ticks)),
                remaining_absorption: None,
            }
        }
        EffectKind::Shield { absorption, .. } => Applied {
            tick_amount: None,
            interval_ms: None,
            ticks: 0,
            expires_at_ms: overrides
                .duration_secs
                .or(template.duration_secs)
                .map(|d| now_ms + secs_to_ms(d)),
            remaining_absorption: Some(overrides.absorption.unwrap_or(*absorption)),
        },
        EffectKind::Passive { .. } => Applied {
            tick_amount: None,
            interval_ms: None,
            ticks: 0,
            expires_at_ms: overrides
                .duration_secs
                .or(template.duration_secs)
                .map(|d| now_ms + secs_to_ms(d)),
            remaining_absorption: None,
        },
    }
}

/// Apply an effect template to a mob.
///
/// Non-stackable templates refresh the existing instance's duration and
/// ticks instead of adding a second one. Returns the instance id.
pub fn add_effect(
    world: &mut World,
    mob: ObjectId,
    template_id: &str,
    caster: Option<ObjectId>,
    overrides: EffectOverrides,
) -> Result<u64, EngineError> {
    let template = world
        .effect_templates
        .get(template_id)
        .cloned()
        .ok_or_else(|| EngineError::Internal(format!("unknown effect template {:?}", template_id)))?;
    world.expect_object(mob)?;

    let now = world.clock_ms;
    let applied = merge(&template, &overrides, now);
    let next_tick = applied.interval_ms.map(|i| now + i);

    let existing = if template.stackable {
        None
    } else {
        world
            .object(mob)
            .and_then(|o| o.mob())
            .and_then(|m| m.effects.iter().find(|e| e.template_id == template.id))
            .map(|e| e.id)
    };

    let effect_id = match existing {
        Some(effect_id) => {
            // Refresh in place; stale timers fall to the deadline check.
            if let Some(instance) = world
                .object_mut(mob)
                .and_then(|o| o.mob_mut())
                .and_then(|m| m.effect_instance_mut(effect_id))
            {
                instance.caster = caster;
                instance.expires_at_ms = applied.expires_at_ms;
                instance.ticks_remaining = applied.ticks;
                instance.next_tick_at_ms = next_tick;
                instance.tick_amount = applied.tick_amount;
                if applied.remaining_absorption.is_some() {
                    instance.remaining_absorption = applied.remaining_absorption;
                }
            }
            effect_id
        }
        None => {
            let effect_id = world.allocate_effect_id();
            let instance = EffectInstance {
                id: effect_id,
                template_id: template.id.clone(),
                caster,
                applied_at_ms: now,
                expires_at_ms: applied.expires_at_ms,
                ticks_remaining: applied.ticks,
                next_tick_at_ms: next_tick,
                tick_amount: applied.tick_amount,
                remaining_absorption: applied.remaining_absorption,
            };
            if let Some(state) = world.object_mut(mob).and_then(|o| o.mob_mut()) {
                state.effects.push(instance);
            }
            effect_id
        }
    };

    if let Some(deadline) = next_tick {
        world.schedule_timer(deadline, mob, effect_id, TimerKind::EffectTick);
    }
    if let Some(deadline) = applied.expires_at_ms {
        world.schedule_timer(deadline, mob, effect_id, TimerKind::EffectExpire);
    }

    if let Some(templates) = &template.on_apply {
        fire_act(world, mob, caster, templates, MessageGroup::Action, &[]);
    }
    if template.is_passive() {
        world.recompute_vitals(mob);
    }
    Ok(effect_id)
}

/// Remove one instance. Fires the template's `on_expire` act and recomputes
/// vitals for passives.
pub fn remove_effect(world: &mut World, mob: ObjectId, effect_id: u64) {
    let Some((template_id, caster)) = world
        .object_mut(mob)
        .and_then(|o| o.mob_mut())
        .and_then(|state| {
            let idx = state.effects.iter().position(|e| e.id == effect_id)?;
            let removed = state.effects.remove(idx);
            Some((removed.template_id, removed.caster))
        })
    else {
        return;
    };

    let Some(template) = world.effect_templates.get(&template_id).cloned() else {
        return;
    };
    if let Some(templates) = &template.on_expire {
        fire_act(world, mob, caster, templates, MessageGroup::Action, &[]);
    }
    if template.is_passive() {
        world.recompute_vitals(mob);
    }
}

/// Drain and run every due timer on the world clock. Handlers may schedule
/// follow-ups; anything already due fires in the same pass.
pub fn run_due_timers(world: &mut World) {
    let now = world.clock_ms;
    while let Some(entry) = world.pop_due_timer(now) {
        match entry.kind {
            TimerKind::EffectTick => handle_tick(world, &entry),
            TimerKind::EffectExpire => handle_expire(world, &entry),
        }
    }
}

fn instance_snapshot(world: &World, mob: ObjectId, effect_id: u64) -> Option<EffectInstance> {
    world
        .object(mob)
        .and_then(|o| o.mob())
        .and_then(|m| m.effect_instance(effect_id))
        .cloned()
}

fn handle_tick(world: &mut World, entry: &TimerEntry) {
    let Some(instance) = instance_snapshot(world, entry.mob, entry.effect_id) else {
        return;
    };
    // A refreshed or removed effect leaves stale heap entries behind.
    if instance.next_tick_at_ms != Some(entry.deadline_ms) {
        return;
    }
    let Some(template) = world.effect_templates.get(&instance.template_id).cloned() else {
        return;
    };
    let amount = instance.tick_amount.or_else(|| template.base_tick_amount()).unwrap_or(0.0);

    match &template.kind {
        EffectKind::DamageOverTime { damage_type, offensive, .. } => {
            if let Some(templates) = &template.on_tick {
                let shown = display_stat(amount).max(0).to_string();
                fire_act(
                    world,
                    entry.mob,
                    instance.caster,
                    templates,
                    MessageGroup::Combat,
                    &[("damage", shown)],
                );
            }
            process_effect_damage(
                world,
                entry.mob,
                amount,
                *damage_type,
                instance.caster,
                *offensive,
            );
        }
        EffectKind::HealOverTime { .. } => {
            if let Some(templates) = &template.on_tick {
                let shown = display_stat(amount).max(0).to_string();
                fire_act(
                    world,
                    entry.mob,
                    instance.caster,
                    templates,
                    MessageGroup::Action,
                    &[("heal", shown)],
                );
            }
            apply_heal(world, entry.mob, amount);
        }
        _ => return,
    }

    // The mob may have died (and an NPC been destroyed) during the tick.
    let mut exhausted = false;
    let mut next_deadline = None;
    if let Some(live) = world
        .object_mut(entry.mob)
        .and_then(|o| o.mob_mut())
        .and_then(|m| m.effect_instance_mut(entry.effect_id))
    {
        live.ticks_remaining = live.ticks_remaining.saturating_sub(1);
        if live.ticks_remaining == 0 {
            exhausted = true;
        } else if let Some(expires) = live.expires_at_ms {
            // The remaining span divides evenly over the remaining ticks, so
            // the instance's own schedule stays authoritative even under
            // interval overrides.
            let step = expires.saturating_sub(entry.deadline_ms)
                / u64::from(live.ticks_remaining);
            let next = entry.deadline_ms + step.max(1);
            live.next_tick_at_ms = Some(next);
            next_deadline = Some(next);
        }
    } else {
        return;
    }

    if exhausted {
        remove_effect(world, entry.mob, entry.effect_id);
    } else if let Some(deadline) = next_deadline {
        world.schedule_timer(deadline, entry.mob, entry.effect_id, TimerKind::EffectTick);
    }
}

fn handle_expire(world: &mut World, entry: &TimerEntry) {
    let Some(instance) = instance_snapshot(world, entry.mob, entry.effect_id) else {
        return;
    };
    if instance.expires_at_ms != Some(entry.deadline_ms) {
        return;
    }
    remove_effect(world, entry.mob, entry.effect_id);
}

/// Heal through the passive `healing_received_multiplier` chain, clamped to
/// max health. Returns the health actually restored.
pub fn apply_heal(world: &mut World, mob: ObjectId, amount: f64) -> f64 {
    if amount <= 0.0 || !world.mob_alive(mob) {
        return 0.0;
    }
    let healed = amount * world.passive_modifiers(mob).healing_received_multiplier;
    let max = world.max_health(mob);
    let Some(state) = world.object_mut(mob).and_then(|o| o.mob_mut()) else {
        return 0.0;
    };
    let before = state.health;
    state.health = (state.health + healed).min(max);
    state.health - before
}

/// Run incoming damage through the mob's shields in application order.
/// Each shield absorbs `min(remaining, incoming * rate, per-hit cap)`;
/// a drained shield expires on the spot. Returns the total absorbed.
pub fn absorb_with_shields(
    world: &mut World,
    victim: ObjectId,
    damage: f64,
    damage_type: Option<DamageType>,
) -> f64 {
    // Gather shield parameters first; mutation follows.
    let shields: Vec<(u64, f64, f64, Option<f64>)> = {
        let Some(state) = world.object(victim).and_then(|o| o.mob()) else {
            return 0.0;
        };
        state
            .effects
            .iter()
            .filter_map(|instance| {
                let template = world.effect_templates.get(&instance.template_id)?;
                let EffectKind::Shield { damage_filter, max_per_hit, absorption_rate, .. } =
                    &template.kind
                else {
                    return None;
                };
                if let (Some(filter), Some(kind)) = (damage_filter, damage_type) {
                    if !filter.contains(&kind) {
                        return None;
                    }
                }
                let remaining = instance.remaining_absorption?;
                if remaining <= 0.0 {
                    return None;
                }
                Some((instance.id, remaining, *absorption_rate, *max_per_hit))
            })
            .collect()
    };

    let mut left = damage;
    let mut total = 0.0;
    let mut drained = Vec::new();
    for (effect_id, remaining, rate, cap) in shields {
        if left <= 0.0 {
            break;
        }
        let mut take = (left * rate).min(remaining);
        if let Some(cap) = cap {
            take = take.min(cap);
        }
        if take <= 0.0 {
            continue;
        }
        left -= take;
        total += take;
        let now_remaining = remaining - take;
        if let Some(instance) = world
            .object_mut(victim)
            .and_then(|o| o.mob_mut())
            .and_then(|m| m.effect_instance_mut(effect_id))
        {
            instance.remaining_absorption = Some(now_remaining);
        }
        if now_remaining <= 0.0 {
            drained.push(effect_id);
        }
    }
    for effect_id in drained {
        remove_effect(world, victim, effect_id);
    }
    total
}

fn fire_act(
    world: &mut World,
    mob: ObjectId,
    caster: Option<ObjectId>,
    templates: &ActTemplates,
    group: MessageGroup,
    vars: &[(&str, String)],
) {
    let Some(room) = world.room_of(mob) else {
        return;
    };
    let ctx = ActContext { user: mob, target: caster.filter(|c| world.object(*c).is_some()), room };
    act(world, templates, &ctx, &ActOptions::group(group), vars);
}

/// Lines for the `effects` command: name and remaining time per instance.
pub fn effect_lines(world: &World, mob: ObjectId) -> Vec<String> {
    let Some(state) = world.object(mob).and_then(|o| o.mob()) else {
        return Vec::new();
    };
    state
        .effects
        .iter()
        .map(|instance| {
            let name = world
                .effect_templates
                .get(&instance.template_id)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| instance.template_id.clone());
            match instance.expires_at_ms {
                Some(expires) => {
                    let remaining = expires.saturating_sub(world.clock_ms);
                    format!("{:<20} {}", name, crate::helpers::format_duration_ms(remaining))
                }
                None => format!("{:<20} permanent", name),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::content;
    use crate::world::dungeon::Dungeon;
    use crate::world::Coordinate;
    use dusk_core::effect::PassiveModifiers;

    fn fixture() -> (World, ObjectId, ObjectId) {
        let mut world = World::with_seed(ServerConfig::default(), 11);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        let did = world
            .add_dungeon(Dungeon::create_empty(2, 2, 1, Some("lab".into())))
            .unwrap();
        let room = world.create_room(did, Coordinate::new(0, 0, 0), "Lab").unwrap();
        // The construct/dummy pairing has zero derived stats, so effect
        // amounts land unmitigated and the arithmetic below stays exact.
        let subject = world
            .spawn_mob(vec!["subject".into()], "Subject", "construct", "dummy", 1)
            .unwrap();
        let caster = world
            .spawn_mob(vec!["caster".into()], "Caster", "human", "mage", 1)
            .unwrap();
        world.add_to(subject, room).unwrap();
        world.add_to(caster, room).unwrap();
        (world, subject, caster)
    }

    fn effect_count(world: &World, mob: ObjectId, template: &str) -> usize {
        world
            .object(mob)
            .unwrap()
            .mob()
            .unwrap()
            .effects
            .iter()
            .filter(|e| e.template_id == template)
            .count()
    }

    fn health_of(world: &World, mob: ObjectId) -> f64 {
        world.object(mob).unwrap().mob().unwrap().health
    }

    #[test]
    fn dot_fires_exactly_n_ticks_then_disappears() {
        let (mut world, subject, caster) = fixture();
        let start = health_of(&world, subject);

        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();
        assert_eq!(effect_count(&world, subject, "poison"), 1);

        world.advance_clock_to(3500);
        run_due_timers(&mut world);

        // Three ticks of 5, no mitigation on the fixture's bare warrior.
        assert_eq!(health_of(&world, subject), start - 15.0);
        assert_eq!(effect_count(&world, subject, "poison"), 0);
        assert_eq!(world.pop_due_timer(10_000), None);
    }

    #[test]
    fn dot_ticks_spread_over_time() {
        let (mut world, subject, caster) = fixture();
        let start = health_of(&world, subject);
        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();

        world.advance_clock_to(1000);
        run_due_timers(&mut world);
        assert_eq!(health_of(&world, subject), start - 5.0);

        world.advance_clock_to(2999);
        run_due_timers(&mut world);
        assert_eq!(health_of(&world, subject), start - 10.0);

        world.advance_clock_to(3000);
        run_due_timers(&mut world);
        assert_eq!(health_of(&world, subject), start - 15.0);
        assert_eq!(effect_count(&world, subject, "poison"), 0);
    }

    #[test]
    fn non_stackable_reapply_refreshes_instead_of_stacking() {
        let (mut world, subject, caster) = fixture();
        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();
        world.advance_clock_to(1000);
        run_due_timers(&mut world);

        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();
        assert_eq!(effect_count(&world, subject, "poison"), 1);

        let instance = world.object(subject).unwrap().mob().unwrap().effects[0].clone();
        assert_eq!(instance.ticks_remaining, 3);
        assert_eq!(instance.expires_at_ms, Some(4000));
        assert_eq!(instance.next_tick_at_ms, Some(2000));

        // Run the refreshed schedule to its end: three more full ticks.
        let start = health_of(&world, subject);
        world.advance_clock_to(10_000);
        run_due_timers(&mut world);
        assert_eq!(health_of(&world, subject), start - 15.0);
        assert_eq!(effect_count(&world, subject, "poison"), 0);
    }

    #[test]
    fn stackable_templates_accumulate_instances() {
        let (mut world, subject, caster) = fixture();
        let mut template = world.effect_templates["poison"].clone();
        template.id = "virulent-poison".into();
        template.stackable = true;
        world.effect_templates.insert(template.id.clone(), template);

        add_effect(&mut world, subject, "virulent-poison", Some(caster), Default::default())
            .unwrap();
        add_effect(&mut world, subject, "virulent-poison", Some(caster), Default::default())
            .unwrap();
        assert_eq!(effect_count(&world, subject, "virulent-poison"), 2);
    }

    #[test]
    fn overrides_replace_scalar_fields() {
        let (mut world, subject, caster) = fixture();
        let start = health_of(&world, subject);
        let overrides = EffectOverrides {
            damage: Some(2.0),
            ticks: Some(5),
            ..EffectOverrides::default()
        };
        add_effect(&mut world, subject, "poison", Some(caster), overrides).unwrap();

        world.advance_clock_to(6000);
        run_due_timers(&mut world);
        assert_eq!(health_of(&world, subject), start - 10.0);
    }

    #[test]
    fn hot_heals_up_to_max() {
        let (mut world, subject, caster) = fixture();
        let max = world.max_health(subject);
        world.object_mut(subject).unwrap().mob_mut().unwrap().health = max - 4.0;

        add_effect(&mut world, subject, "mending", Some(caster), EffectOverrides::default())
            .unwrap();
        world.advance_clock_to(20_000);
        run_due_timers(&mut world);

        assert_eq!(health_of(&world, subject), max);
    }

    #[test]
    fn passive_changes_maxima_and_clamps_on_removal() {
        let (mut world, subject, _caster) = fixture();
        let base_max = world.max_health(subject);

        let id = add_effect(&mut world, subject, "bulwark", None, EffectOverrides::default())
            .unwrap();
        let boosted = world.max_health(subject);
        assert!(boosted > base_max);

        // Heal to the boosted maximum, then drop the passive: health clamps.
        world.object_mut(subject).unwrap().mob_mut().unwrap().health = boosted;
        remove_effect(&mut world, subject, id);
        assert_eq!(world.max_health(subject), base_max);
        assert_eq!(health_of(&world, subject), base_max);
    }

    #[test]
    fn shield_absorbs_in_order_and_expires_when_drained() {
        let (mut world, subject, caster) = fixture();
        let start = health_of(&world, subject);

        // Full-rate shield with 6 points of absorption.
        let shield_id =
            add_effect(&mut world, subject, "ward", Some(caster), EffectOverrides::default())
                .unwrap();
        let _ = shield_id;

        let absorbed = absorb_with_shields(&mut world, subject, 4.0, None);
        assert_eq!(absorbed, 4.0);
        assert_eq!(effect_count(&world, subject, "ward"), 1);

        let absorbed = absorb_with_shields(&mut world, subject, 4.0, None);
        assert_eq!(absorbed, 2.0);
        assert_eq!(effect_count(&world, subject, "ward"), 0, "drained shield expires");
        assert_eq!(health_of(&world, subject), start, "shields never touch health directly");
    }

    #[test]
    fn shield_respects_rate_and_damage_filter() {
        let (mut world, subject, _caster) = fixture();
        let mut template = world.effect_templates["ward"].clone();
        template.id = "fire-ward".into();
        if let EffectKind::Shield { damage_filter, absorption_rate, .. } = &mut template.kind {
            *damage_filter = Some(vec![DamageType::Fire]);
            *absorption_rate = 0.5;
        }
        world.effect_templates.insert(template.id.clone(), template);
        add_effect(&mut world, subject, "fire-ward", None, EffectOverrides::default()).unwrap();

        // Frost passes the filter untouched.
        assert_eq!(absorb_with_shields(&mut world, subject, 10.0, Some(DamageType::Frost)), 0.0);
        // Fire is absorbed at half rate.
        assert_eq!(absorb_with_shields(&mut world, subject, 10.0, Some(DamageType::Fire)), 5.0);
    }

    #[test]
    fn healing_received_multiplier_chains() {
        let (mut world, subject, _caster) = fixture();
        let mut template = world.effect_templates["bulwark"].clone();
        template.id = "blessing".into();
        if let EffectKind::Passive { modifiers } = &mut template.kind {
            *modifiers = PassiveModifiers {
                healing_received_multiplier: 2.0,
                ..PassiveModifiers::default()
            };
        }
        world.effect_templates.insert(template.id.clone(), template);
        add_effect(&mut world, subject, "blessing", None, EffectOverrides::default()).unwrap();

        world.object_mut(subject).unwrap().mob_mut().unwrap().health = 10.0;
        let healed = apply_heal(&mut world, subject, 3.0);
        assert_eq!(healed, 6.0);
    }

    #[test]
    fn caster_death_turns_effect_casterless() {
        let (mut world, subject, caster) = fixture();
        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();
        world.destroy_object(caster, true);

        world.advance_clock_to(3500);
        run_due_timers(&mut world);

        // Damage still lands; no combat re-entry without a live caster.
        let state = world.object(subject).unwrap().mob().unwrap();
        assert_eq!(state.combat_target, None);
        assert!(!world.combat.contains(subject));
    }

    #[test]
    fn effect_lines_show_remaining_time() {
        let (mut world, subject, caster) = fixture();
        add_effect(&mut world, subject, "poison", Some(caster), EffectOverrides::default())
            .unwrap();
        add_effect(&mut world, subject, "bulwark", None, EffectOverrides::default()).unwrap();

        let lines = effect_lines(&world, subject);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.contains("Poison") && l.contains("3s")));
        assert!(lines.iter().any(|l| l.contains("permanent")));
    }
}
