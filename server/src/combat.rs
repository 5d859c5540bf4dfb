//! The combat engine: queue, rounds, hit resolution, damage application and
//! death.
//!
//! Rounds walk the process-wide combat queue in insertion order. Each
//! attacker's mutations and act calls complete before the next attacker is
//! touched, so observers always see whole turns.

use rand::Rng;

use dusk_core::attributes::display_stat;
use dusk_core::constants::{
    ARMOR_PIVOT, ARMOR_REDUCTION_CAP, BASE_HIT_CHANCE, CRIT_DAMAGE_MULTIPLIER,
    HIT_CHANCE_PER_POINT, MAX_HIT_CHANCE, MIN_HIT_CHANCE,
};
use dusk_core::damage::{relation_multiplier, DamageType};
use dusk_core::effect::ActTemplates;
use dusk_core::error::EngineError;
use dusk_core::message::MessageGroup;
use dusk_core::records::HitType;

use crate::act::{act, send_to_mob, ActContext, ActOptions};
use crate::world::{ObjectId, World};

/// Put `attacker` on the offensive. The defender retaliates only if it was
/// peaceful; an existing fight is never retargeted.
pub fn initiate_combat(
    world: &mut World,
    attacker: ObjectId,
    defender: ObjectId,
) -> Result<(), EngineError> {
    if !world.mob_alive(defender) {
        return Err(EngineError::TargetDead);
    }
    world.expect_object(attacker)?;

    if let Some(mob) = world.object_mut(attacker).and_then(|o| o.mob_mut()) {
        mob.combat_target = Some(defender);
    }
    world.combat.enqueue(attacker);

    let defender_peaceful = world
        .object(defender)
        .and_then(|o| o.mob())
        .map_or(false, |m| m.combat_target.is_none());
    if defender_peaceful {
        if let Some(mob) = world.object_mut(defender).and_then(|o| o.mob_mut()) {
            mob.combat_target = Some(attacker);
        }
        world.combat.enqueue(defender);
    }
    Ok(())
}

/// Run one combat round over a snapshot of the queue. Mobs enqueued during
/// the round wait for the next one.
pub fn process_combat_round(world: &mut World) {
    for attacker in world.combat.snapshot() {
        let target = world.object(attacker).and_then(|o| o.mob()).and_then(|m| m.combat_target);

        let fight_over = !world.mob_alive(attacker)
            || target.map_or(true, |t| {
                !world.mob_alive(t) || world.room_of(t) != world.room_of(attacker)
            });

        if fight_over {
            world.combat.remove(attacker);
            if let Some(mob) = world.object_mut(attacker).and_then(|o| o.mob_mut()) {
                mob.combat_target = None;
            }
            continue;
        }

        let target = target.expect("checked above");
        one_hit(world, attacker, target, 1.0, None);
    }
}

/// Compute the chance for `attacker` to land a hit on `defender`.
fn hit_chance(accuracy: f64, avoidance: f64) -> f64 {
    (BASE_HIT_CHANCE + (accuracy - avoidance) * HIT_CHANCE_PER_POINT)
        .clamp(MIN_HIT_CHANCE, MAX_HIT_CHANCE)
}

/// Armor mitigation with a diminishing-returns floor: reduction approaches
/// but never exceeds [`ARMOR_REDUCTION_CAP`].
fn mitigate(defense: f64, damage: f64) -> f64 {
    if damage <= 0.0 || defense <= 0.0 {
        return damage.max(0.0);
    }
    let reduction = (defense / (defense + ARMOR_PIVOT)).min(ARMOR_REDUCTION_CAP);
    damage * (1.0 - reduction)
}

/// The outcome of pushing damage at a mob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageOutcome {
    pub dealt: f64,
    pub absorbed: f64,
    pub died: bool,
    pub immune: bool,
}

/// Apply post-roll damage: relationship multiplier, armor mitigation,
/// passive taken-multiplier, the minimum-1 rule, then shields, then health.
/// Does not announce and does not handle death; callers order their own
/// messages first.
pub fn apply_damage(
    world: &mut World,
    victim: ObjectId,
    amount: f64,
    damage_type: Option<DamageType>,
    mitigated: bool,
) -> DamageOutcome {
    let mut outcome = DamageOutcome { dealt: 0.0, absorbed: 0.0, died: false, immune: false };
    if amount < 0.0 || !world.mob_alive(victim) {
        return outcome;
    }

    let mut damage = amount;
    if let Some(kind) = damage_type {
        let table = world.relation_table(victim);
        let mult = relation_multiplier(&table, kind);
        if mult == 0.0 {
            outcome.immune = true;
            return outcome;
        }
        damage *= mult;
    }

    if mitigated {
        let defense = world.secondary_attributes(victim).defense;
        damage = mitigate(defense, damage);
    }

    damage *= world.passive_modifiers(victim).damage_taken_multiplier;

    // A connecting hit always costs at least one point unless immune.
    damage = damage.max(1.0);

    outcome.absorbed = crate::effect::absorb_with_shields(world, victim, damage, damage_type);
    damage -= outcome.absorbed;
    if damage <= 0.0 {
        return outcome;
    }

    if let Some(mob) = world.object_mut(victim).and_then(|o| o.mob_mut()) {
        mob.health -= damage;
        if mob.health <= 0.0 {
            mob.health = 0.0;
            outcome.died = true;
        }
    }
    outcome.dealt = damage;
    outcome
}

/// One physical attack: accuracy vs avoidance, crit roll, weapon damage,
/// then [`apply_damage`]. Announces the swing and any death.
pub fn one_hit(
    world: &mut World,
    attacker: ObjectId,
    defender: ObjectId,
    multiplier: f64,
    forced_hit_type: Option<HitType>,
) {
    if !world.mob_alive(attacker) || !world.mob_alive(defender) {
        return;
    }
    let Some(room) = world.room_of(attacker) else {
        return;
    };

    let attack = world.secondary_attributes(attacker);
    let defense = world.secondary_attributes(defender);
    let hit_type = forced_hit_type
        .or_else(|| world.main_hand_weapon(attacker).map(|(_, _, ht)| ht))
        .unwrap_or_else(HitType::unarmed);

    let ctx = ActContext { user: attacker, target: Some(defender), room };

    let chance = hit_chance(attack.accuracy, defense.avoidance);
    if world.rng.gen::<f64>() >= chance {
        let templates = ActTemplates {
            user: Some(format!("You try to {} {{target}}, but miss.", hit_type.verb)),
            target: Some(format!("{{User}} tries to {} you, but misses.", hit_type.verb)),
            room: Some(format!("{{User}} tries to {} {{target}}, but misses.", hit_type.verb)),
        };
        act(world, &templates, &ctx, &ActOptions::group(MessageGroup::Combat), &[]);
        return;
    }

    let crit_chance = (attack.crit_rate / 100.0).clamp(0.0, 0.95);
    let crit = world.rng.gen::<f64>() < crit_chance;

    // Attack power already includes the wielded weapon's contribution.
    let mut base = attack.attack_power * multiplier;
    base *= world.passive_modifiers(attacker).damage_dealt_multiplier;
    if crit {
        base *= CRIT_DAMAGE_MULTIPLIER;
    }

    let outcome = apply_damage(world, defender, base, Some(hit_type.damage_type), true);
    announce_hit(world, &ctx, &hit_type, crit, &outcome);

    if outcome.died {
        handle_death(world, defender, Some(attacker));
    }
}

/// One magical attack: spell power instead of attack power, no weapon bonus.
pub fn one_magic_hit(
    world: &mut World,
    attacker: ObjectId,
    defender: ObjectId,
    multiplier: f64,
    damage_type: DamageType,
) {
    if !world.mob_alive(attacker) || !world.mob_alive(defender) {
        return;
    }
    let Some(room) = world.room_of(attacker) else {
        return;
    };

    let attack = world.secondary_attributes(attacker);
    let defense = world.secondary_attributes(defender);
    let hit_type = HitType {
        verb: "blast".into(),
        verb_third: "blasts".into(),
        damage_type,
    };
    let ctx = ActContext { user: attacker, target: Some(defender), room };

    let chance = hit_chance(attack.accuracy, defense.avoidance);
    if world.rng.gen::<f64>() >= chance {
        let templates = ActTemplates {
            user: Some("Your spell fizzles past {target}.".into()),
            target: Some("{User}'s spell fizzles past you.".into()),
            room: Some("{User}'s spell fizzles past {target}.".into()),
        };
        act(world, &templates, &ctx, &ActOptions::group(MessageGroup::Combat), &[]);
        return;
    }

    let crit_chance = (attack.crit_rate / 100.0).clamp(0.0, 0.95);
    let crit = world.rng.gen::<f64>() < crit_chance;

    let mut base = attack.spell_power * multiplier;
    base *= world.passive_modifiers(attacker).damage_dealt_multiplier;
    if crit {
        base *= CRIT_DAMAGE_MULTIPLIER;
    }

    let outcome = apply_damage(world, defender, base, Some(damage_type), true);
    announce_hit(world, &ctx, &hit_type, crit, &outcome);

    if outcome.died {
        handle_death(world, defender, Some(attacker));
    }
}

fn announce_hit(
    world: &mut World,
    ctx: &ActContext,
    hit_type: &HitType,
    crit: bool,
    outcome: &DamageOutcome,
) {
    let opts = ActOptions::group(MessageGroup::Combat);
    if outcome.immune {
        let templates = ActTemplates {
            user: Some(format!("You {} {{target}}, to no effect at all.", hit_type.verb)),
            target: Some(format!("{{User}} {} you, to no effect at all.", hit_type.verb_third)),
            room: Some(format!("{{User}} {} {{target}}, to no effect.", hit_type.verb_third)),
        };
        act(world, &templates, ctx, &opts, &[]);
        return;
    }

    let tag = if crit { " {r(critical){d" } else { "" };
    let shown = display_stat(outcome.dealt + outcome.absorbed).max(0);
    let templates = ActTemplates {
        user: Some(format!("You {} {{target}} for {{damage}}.{}", hit_type.verb, tag)),
        target: Some(format!("{{User}} {} you for {{damage}}.{}", hit_type.verb_third, tag)),
        room: Some(format!("{{User}} {} {{target}}.", hit_type.verb_third)),
    };
    act(world, &templates, ctx, &opts, &[("damage", shown.to_string())]);
}

/// Damage arriving from an effect tick: no hit or crit roll, relationships
/// and mitigation still apply. An offensive effect on a peaceful target
/// drags the caster into the fight when both share a room and the caster is
/// alive.
pub fn process_effect_damage(
    world: &mut World,
    victim: ObjectId,
    amount: f64,
    damage_type: Option<DamageType>,
    caster: Option<ObjectId>,
    offensive: bool,
) -> DamageOutcome {
    let outcome = apply_damage(world, victim, amount, damage_type, true);

    if offensive && !outcome.died {
        let peaceful = world
            .object(victim)
            .and_then(|o| o.mob())
            .map_or(false, |m| m.combat_target.is_none());
        if peaceful {
            if let Some(caster) = caster {
                let same_room = world.room_of(victim).is_some()
                    && world.room_of(victim) == world.room_of(caster);
                if same_room && world.mob_alive(caster) {
                    let _ = initiate_combat(world, victim, caster);
                }
            }
        }
    }

    if outcome.died {
        handle_death(world, victim, caster);
    }
    outcome
}

/// Death: zero the vitals, leave the queue, announce, then either respawn
/// (players) or destroy (NPCs). Reset-driven drops come back at respawn
/// time, not here.
pub fn handle_death(world: &mut World, victim: ObjectId, killer: Option<ObjectId>) {
    let Some(state) = world.object(victim).and_then(|o| o.mob()) else {
        return;
    };
    let character_id = state.character;

    if let Some(mob) = world.object_mut(victim).and_then(|o| o.mob_mut()) {
        mob.health = 0.0;
        mob.combat_target = None;
    }
    world.combat.remove(victim);

    if let Some(room) = world.room_of(victim) {
        let templates = ActTemplates {
            user: Some("{rYou are DEAD.{d".into()),
            target: None,
            room: Some("{r{User} is DEAD.{d".into()),
        };
        let ctx = ActContext { user: victim, target: None, room };
        act(world, &templates, &ctx, &ActOptions::group(MessageGroup::Combat), &[]);
    }

    if let Some(killer) = killer {
        reward_killer(world, killer, victim);
    }

    match character_id {
        Some(character_id) => {
            if let Some(character) = world.character_mut(character_id) {
                character.stats.deaths += 1;
            }
            respawn_player(world, victim);
        }
        None => {
            moblog!(victim, "npc died, destroying");
            world.destroy_object(victim, true);
        }
    }
}

fn reward_killer(world: &mut World, killer: ObjectId, victim: ObjectId) {
    if killer == victim || !world.mob_alive(killer) {
        return;
    }
    let experience = world.kill_experience(killer, victim);
    let victim_name = world.display_name(victim);
    send_to_mob(
        world,
        killer,
        &format!("You gain {} experience for {}.", experience, victim_name),
        MessageGroup::Info,
    );
    let gained = world.award_experience(killer, experience);
    if gained > 0 {
        let level = world.object(killer).and_then(|o| o.mob()).map_or(0, |m| m.level);
        send_to_mob(
            world,
            killer,
            &format!("{{gYou have reached level {}!{{d", level),
            MessageGroup::Info,
        );
    }
    if let Some(character_id) = world.object(killer).and_then(|o| o.mob()).and_then(|m| m.character)
    {
        if let Some(character) = world.character_mut(character_id) {
            character.stats.kills += 1;
        }
    }
}

fn respawn_player(world: &mut World, victim: ObjectId) {
    let graveyard = world
        .resolve_room_ref(&world.config.graveyard_room.clone())
        .or_else(|| world.resolve_room_ref(&world.config.start_room.clone()));
    let Some(graveyard) = graveyard else {
        log::error!("no graveyard room resolves; {} stays dead in place", victim);
        return;
    };

    if let Err(err) = world.add_to(victim, graveyard) {
        log::error!("failed to move {} to graveyard: {}", victim, err);
        return;
    }

    let half_health = world.max_health(victim) / 2.0;
    if let Some(mob) = world.object_mut(victim).and_then(|o| o.mob_mut()) {
        mob.health = half_health.max(1.0);
    }
    send_to_mob(
        world,
        victim,
        "You awaken on the cold stones of the graveyard.",
        MessageGroup::Info,
    );
}
