//! Mob math and mutation: derived attributes, resource clamps, equipment,
//! ability learning and experience.
//!
//! Secondary attributes are recomputed from scratch on every query: race and
//! job at the current level, equipment bonus maps, passive effects, then the
//! raw attack power / defense of worn weapons and armor exactly once.

use std::collections::BTreeMap;

use dusk_core::attributes::{
    derive_secondary, health_from_vitality, mana_from_wisdom, AttributeSet, Resource, SecondarySet,
};
use dusk_core::constants::{experience_for_level, MAX_LEVEL};
use dusk_core::damage::{merge_relations, RelationTable};
use dusk_core::effect::{EffectKind, PassiveModifiers};
use dusk_core::error::EngineError;
use dusk_core::records::{AbilityProgress, EquipKind, EquipSlot, HitType};

use super::object::{GameObject, MobState};
use super::{ObjectId, World};

impl World {
    /// Create a mob from its archetypes: attributes at level, full vitals,
    /// granted abilities, racial/job passives applied.
    pub fn spawn_mob(
        &mut self,
        keywords: Vec<String>,
        display_name: &str,
        race_id: &str,
        job_id: &str,
        level: u32,
    ) -> Result<ObjectId, EngineError> {
        if !self.archetypes.contains_key(race_id) {
            return Err(EngineError::Internal(format!("unknown race {:?}", race_id)));
        }
        if !self.archetypes.contains_key(job_id) {
            return Err(EngineError::Internal(format!("unknown job {:?}", job_id)));
        }

        let oid = self.allocate_oid();
        let state = MobState {
            race_id: race_id.to_string(),
            job_id: job_id.to_string(),
            level: level.clamp(1, MAX_LEVEL),
            ..MobState::default()
        };
        self.insert_object(GameObject::new_mob(oid, keywords, display_name.to_string(), state));

        self.grant_archetype_package(oid);

        let (health, mana, exhaustion) =
            (self.max_health(oid), self.max_mana(oid), self.max_exhaustion(oid));
        if let Some(mob) = self.object_mut(oid).and_then(|o| o.mob_mut()) {
            mob.health = health;
            mob.mana = mana;
            mob.exhaustion = exhaustion;
        }
        Ok(oid)
    }

    /// Grant the abilities and passive effects both archetypes confer.
    pub fn grant_archetype_package(&mut self, mob: ObjectId) {
        let Some((race_id, job_id)) = self
            .object(mob)
            .and_then(|o| o.mob())
            .map(|m| (m.race_id.clone(), m.job_id.clone()))
        else {
            return;
        };

        let mut grants = Vec::new();
        let mut passives = Vec::new();
        for id in [&race_id, &job_id] {
            if let Some(arch) = self.archetypes.get(id) {
                grants.extend(arch.abilities.iter().cloned());
                passives.extend(arch.passive_effects.iter().cloned());
            }
        }

        if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
            for grant in grants {
                state.abilities.entry(grant.ability_id).or_insert(AbilityProgress {
                    uses: 0,
                    proficiency: grant.starting_proficiency,
                });
            }
        }
        for template_id in passives {
            if let Err(err) = crate::effect::add_effect(self, mob, &template_id, None, Default::default())
            {
                log::warn!("archetype passive {:?} failed on {}: {}", template_id, mob, err);
            }
        }
    }

    pub fn mob_alive(&self, mob: ObjectId) -> bool {
        self.object(mob)
            .and_then(|o| o.mob())
            .map_or(false, |m| m.health > 0.0)
    }

    /// Merged modifiers of every active passive effect on the mob.
    pub fn passive_modifiers(&self, mob: ObjectId) -> PassiveModifiers {
        let mut merged = PassiveModifiers::default();
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return merged;
        };
        for instance in &state.effects {
            let Some(template) = self.effect_templates.get(&instance.template_id) else {
                continue;
            };
            if let EffectKind::Passive { modifiers } = &template.kind {
                for (attr, v) in &modifiers.attributes {
                    *merged.attributes.entry(*attr).or_insert(0.0) += v;
                }
                for (attr, v) in &modifiers.secondary {
                    *merged.secondary.entry(*attr).or_insert(0.0) += v;
                }
                for (res, v) in &modifiers.resource_max {
                    *merged.resource_max.entry(*res).or_insert(0.0) += v;
                }
                merged.damage_dealt_multiplier *= modifiers.damage_dealt_multiplier;
                merged.damage_taken_multiplier *= modifiers.damage_taken_multiplier;
                merged.healing_received_multiplier *= modifiers.healing_received_multiplier;
            }
        }
        merged
    }

    /// Primary attributes: race + job at level, equipment bonuses, passives.
    pub fn primary_attributes(&self, mob: ObjectId) -> AttributeSet {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return AttributeSet::default();
        };

        let mut primary = AttributeSet::default();
        for id in [&state.race_id, &state.job_id] {
            if let Some(arch) = self.archetypes.get(id) {
                primary = primary.add(&arch.attributes_at_level(state.level));
            }
        }

        for item in state.equipped.values() {
            if let Some(equip) = self.equipment_data_of(*item) {
                primary = primary.apply_bonuses(&equip.attribute_bonus);
            }
        }

        primary.apply_bonuses(&self.passive_modifiers(mob).attributes)
    }

    /// Secondary attributes: `base + sum(weight * primary)`, where base is
    /// equipment and passive secondary bonuses, plus the raw attack power of
    /// worn weapons and defense of worn armor (counted here and nowhere
    /// else).
    pub fn secondary_attributes(&self, mob: ObjectId) -> SecondarySet {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return SecondarySet::default();
        };

        let mut base = SecondarySet::default();
        for item in state.equipped.values() {
            if let Some(equip) = self.equipment_data_of(*item) {
                base.apply_bonuses(&equip.secondary_bonus);
            }
        }
        base.apply_bonuses(&self.passive_modifiers(mob).secondary);

        let mut derived = derive_secondary(&base, &self.primary_attributes(mob));

        for item in state.equipped.values() {
            match self.equipment_data_of(*item).map(|e| e.kind.clone()) {
                Some(EquipKind::Weapon { attack_power, .. }) => derived.attack_power += attack_power,
                Some(EquipKind::Armor { defense }) => derived.defense += defense,
                _ => {}
            }
        }
        derived
    }

    fn resource_bonus(&self, mob: ObjectId, resource: Resource) -> f64 {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return 0.0;
        };
        let mut bonus = 0.0;
        for item in state.equipped.values() {
            if let Some(equip) = self.equipment_data_of(*item) {
                bonus += equip.resource_bonus.get(&resource).copied().unwrap_or(0.0);
            }
        }
        bonus + self
            .passive_modifiers(mob)
            .resource_max
            .get(&resource)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn max_health(&self, mob: ObjectId) -> f64 {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return 0.0;
        };
        let mut max = 0.0;
        for id in [&state.race_id, &state.job_id] {
            if let Some(arch) = self.archetypes.get(id) {
                max += arch.health_at_level(state.level);
            }
        }
        max += self.resource_bonus(mob, Resource::Health);
        max + health_from_vitality(self.secondary_attributes(mob).vitality)
    }

    pub fn max_mana(&self, mob: ObjectId) -> f64 {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return 0.0;
        };
        let mut max = 0.0;
        for id in [&state.race_id, &state.job_id] {
            if let Some(arch) = self.archetypes.get(id) {
                max += arch.mana_at_level(state.level);
            }
        }
        max += self.resource_bonus(mob, Resource::Mana);
        max + mana_from_wisdom(self.secondary_attributes(mob).wisdom)
    }

    pub fn max_exhaustion(&self, mob: ObjectId) -> f64 {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return 0.0;
        };
        let mut max = 0.0;
        for id in [&state.race_id, &state.job_id] {
            if let Some(arch) = self.archetypes.get(id) {
                max += arch.base_exhaustion;
            }
        }
        max + self.resource_bonus(mob, Resource::Exhaustion)
    }

    /// Clamp stored resources to `[0, max]` after anything that can move the
    /// maxima (effect set changes, equipment changes, level ups).
    pub fn recompute_vitals(&mut self, mob: ObjectId) {
        let max_health = self.max_health(mob);
        let max_mana = self.max_mana(mob);
        let max_exhaustion = self.max_exhaustion(mob);
        if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
            state.health = state.health.clamp(0.0, max_health);
            state.mana = state.mana.clamp(0.0, max_mana);
            state.exhaustion = state.exhaustion.clamp(0.0, max_exhaustion);
        }
    }

    /// The merged damage relationship table: race priority on ties.
    pub fn relation_table(&self, mob: ObjectId) -> RelationTable {
        let Some(state) = self.object(mob).and_then(|o| o.mob()) else {
            return RelationTable::new();
        };
        let race = self
            .archetypes
            .get(&state.race_id)
            .map(|a| a.damage_relations.clone())
            .unwrap_or_default();
        let job = self
            .archetypes
            .get(&state.job_id)
            .map(|a| a.damage_relations.clone())
            .unwrap_or_default();
        merge_relations(&race, &job)
    }

    // ------------------------------------------------------------------
    // Equipment
    // ------------------------------------------------------------------

    fn equipment_data_of(&self, item: ObjectId) -> Option<&dusk_core::records::EquipmentData> {
        self.object(item)?.item_data()?.equipment.as_ref()
    }

    pub fn equipped_item(&self, mob: ObjectId, slot: EquipSlot) -> Option<ObjectId> {
        self.object(mob)?.mob()?.equipped.get(&slot).copied()
    }

    pub fn is_equipped(&self, mob: ObjectId, item: ObjectId) -> bool {
        self.object(mob)
            .and_then(|o| o.mob())
            .map_or(false, |m| m.equipped.values().any(|i| *i == item))
    }

    /// Equip an item the mob is carrying. The item stays in `contents`;
    /// the slot map marks it worn.
    pub fn equip(&mut self, mob: ObjectId, item: ObjectId) -> Result<EquipSlot, EngineError> {
        if self.object(item).ok_or(EngineError::MissingObject)?.location != Some(mob) {
            return Err(EngineError::Internal(format!("{} does not carry {}", mob, item)));
        }
        let slot = self
            .equipment_data_of(item)
            .map(|e| e.slot)
            .ok_or_else(|| EngineError::Internal(format!("{} is not equipment", item)))?;
        if self.is_equipped(mob, item) {
            return Err(EngineError::AlreadyEquipped);
        }
        if self.equipped_item(mob, slot).is_some() {
            return Err(EngineError::SlotOccupied(slot));
        }

        if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
            state.equipped.insert(slot, item);
        }
        self.recompute_vitals(mob);
        Ok(slot)
    }

    /// Free a slot; the item returns to plain inventory.
    pub fn unequip(&mut self, mob: ObjectId, slot: EquipSlot) -> Option<ObjectId> {
        let item = self
            .object_mut(mob)
            .and_then(|o| o.mob_mut())
            .and_then(|m| m.equipped.remove(&slot));
        if item.is_some() {
            self.recompute_vitals(mob);
        }
        item
    }

    /// Main-hand weapon payload, if one is wielded.
    pub fn main_hand_weapon(&self, mob: ObjectId) -> Option<(ObjectId, f64, HitType)> {
        let item = self.equipped_item(mob, EquipSlot::MainHand)?;
        match &self.equipment_data_of(item)?.kind {
            EquipKind::Weapon { attack_power, hit_type } => {
                Some((item, *attack_power, hit_type.clone()))
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Abilities and experience
    // ------------------------------------------------------------------

    pub fn learn_ability(&mut self, mob: ObjectId, ability_id: &str, starting_proficiency: u8) {
        if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
            state.abilities.entry(ability_id.to_string()).or_insert(AbilityProgress {
                uses: 0,
                proficiency: starting_proficiency,
            });
        }
    }

    /// Count one use and advance proficiency along the ability's curve.
    pub fn advance_ability(&mut self, mob: ObjectId, ability_id: &str) {
        let Some(curve) = self.abilities.get(ability_id).map(|a| a.curve) else {
            return;
        };
        if let Some(progress) = self
            .object_mut(mob)
            .and_then(|o| o.mob_mut())
            .and_then(|m| m.abilities.get_mut(ability_id))
        {
            progress.uses = progress.uses.saturating_add(1);
            let earned = curve.proficiency_for_uses(progress.uses);
            if earned > progress.proficiency {
                progress.proficiency = earned;
            }
        }
    }

    /// Add experience; returns the number of levels gained.
    pub fn award_experience(&mut self, mob: ObjectId, amount: u64) -> u32 {
        match self.object_mut(mob).and_then(|o| o.mob_mut()) {
            Some(state) => state.experience = state.experience.saturating_add(amount),
            None => return 0,
        }

        let mut gained = 0;
        loop {
            let (level, experience) = match self.object(mob).and_then(|o| o.mob()) {
                Some(m) => (m.level, m.experience),
                None => return gained,
            };
            if level >= MAX_LEVEL {
                break;
            }
            let needed = experience_for_level(level);
            if experience < needed {
                break;
            }
            if let Some(m) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
                m.experience -= needed;
                m.level += 1;
            }
            gained += 1;
        }

        if gained > 0 {
            // New maxima; top vitals up to them.
            let (health, mana) = (self.max_health(mob), self.max_mana(mob));
            if let Some(m) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
                m.health = health;
                m.mana = mana;
            }
            moblog!(mob, "reached level {}", self.object(mob).and_then(|o| o.mob()).map(|m| m.level).unwrap_or(0));
        }
        gained
    }

    /// Experience a kill of `victim` is worth to `killer`, scaled by level
    /// difference.
    pub fn kill_experience(&self, killer: ObjectId, victim: ObjectId) -> u64 {
        let killer_level = self
            .object(killer)
            .and_then(|o| o.mob())
            .map_or(1, |m| m.level);
        let victim_level = self
            .object(victim)
            .and_then(|o| o.mob())
            .map_or(1, |m| m.level);
        let base = 100 * u64::from(victim_level);
        let diff = i64::from(victim_level) - i64::from(killer_level);
        let scaled = base as i64 + diff * 25;
        scaled.max(1) as u64
    }

    /// Natural recovery, run once per combat-round cadence. Endurance feeds
    /// health regeneration (out of combat only), wisdom feeds mana.
    pub fn regenerate_all(&mut self) {
        let mobs: Vec<ObjectId> = self
            .object_ids()
            .filter(|oid| self.mob_alive(*oid))
            .collect();
        for mob in mobs {
            let secondary = self.secondary_attributes(mob);
            let in_combat = self
                .object(mob)
                .and_then(|o| o.mob())
                .map_or(false, |m| m.combat_target.is_some());
            let max_health = self.max_health(mob);
            let max_mana = self.max_mana(mob);
            let max_exhaustion = self.max_exhaustion(mob);
            if let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) {
                if !in_combat {
                    state.health =
                        (state.health + 1.0 + secondary.endurance * 0.05).min(max_health);
                }
                state.mana = (state.mana + 1.0 + secondary.wisdom * 0.1).min(max_mana);
                state.exhaustion = (state.exhaustion + 5.0).min(max_exhaustion);
            }
        }
    }

    pub fn spend_resource(
        &mut self,
        mob: ObjectId,
        resource: Resource,
        amount: f64,
    ) -> Result<(), EngineError> {
        let Some(state) = self.object_mut(mob).and_then(|o| o.mob_mut()) else {
            return Err(EngineError::MissingObject);
        };
        let pool = match resource {
            Resource::Health => &mut state.health,
            Resource::Mana => &mut state.mana,
            Resource::Exhaustion => &mut state.exhaustion,
        };
        if *pool < amount {
            return Err(EngineError::InsufficientResource(resource));
        }
        *pool -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::content;
    use dusk_core::records::{EquipmentData, ItemData};

    fn fixture() -> (World, ObjectId) {
        let mut world = World::with_seed(ServerConfig::default(), 3);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        let mob = world
            .spawn_mob(vec!["tester".into()], "Tester", "human", "warrior", 1)
            .unwrap();
        (world, mob)
    }

    fn weapon(world: &mut World, attack_power: f64) -> ObjectId {
        let oid = world.allocate_oid();
        world.insert_object(GameObject::item(
            oid,
            vec!["sword".into()],
            "a sword".into(),
            ItemData {
                equipment: Some(EquipmentData::bare(
                    EquipSlot::MainHand,
                    EquipKind::Weapon { attack_power, hit_type: HitType::unarmed() },
                )),
                ..ItemData::default()
            },
        ))
    }

    #[test]
    fn spawn_starts_at_full_vitals() {
        let (world, mob) = fixture();
        let state = world.object(mob).unwrap().mob().unwrap();
        assert!(state.health > 0.0);
        assert_eq!(state.health, world.max_health(mob));
        assert_eq!(state.mana, world.max_mana(mob));
    }

    #[test]
    fn max_health_includes_vitality_contribution() {
        let (world, mob) = fixture();
        let vitality = world.secondary_attributes(mob).vitality;
        let without_vitality = world.max_health(mob) - health_from_vitality(vitality);
        assert!(vitality > 0.0);
        assert!(without_vitality > 0.0);
    }

    #[test]
    fn equip_contributes_weapon_power_exactly_once() {
        let (mut world, mob) = fixture();
        let sword = weapon(&mut world, 7.0);
        world.add_to(sword, mob).unwrap();

        let before = world.secondary_attributes(mob).attack_power;
        world.equip(mob, sword).unwrap();
        let after = world.secondary_attributes(mob).attack_power;

        assert_eq!(after, before + 7.0);
        let (item, power, _) = world.main_hand_weapon(mob).unwrap();
        assert_eq!(item, sword);
        assert_eq!(power, 7.0);
    }

    #[test]
    fn equip_requires_possession_and_free_slot() {
        let (mut world, mob) = fixture();
        let first = weapon(&mut world, 1.0);
        let second = weapon(&mut world, 2.0);
        // Not carried yet.
        assert!(world.equip(mob, first).is_err());

        world.add_to(first, mob).unwrap();
        world.add_to(second, mob).unwrap();
        world.equip(mob, first).unwrap();
        assert_eq!(world.equip(mob, first), Err(EngineError::AlreadyEquipped));
        assert_eq!(
            world.equip(mob, second),
            Err(EngineError::SlotOccupied(EquipSlot::MainHand))
        );

        assert_eq!(world.unequip(mob, EquipSlot::MainHand), Some(first));
        assert_eq!(world.unequip(mob, EquipSlot::MainHand), None);
        world.equip(mob, second).unwrap();
    }

    #[test]
    fn ability_advancement_follows_curve() {
        let (mut world, mob) = fixture();
        world.learn_ability(mob, "bash", 0);
        let threshold = world.abilities["bash"].curve.thresholds[0];
        for _ in 0..threshold {
            world.advance_ability(mob, "bash");
        }
        let state = world.object(mob).unwrap().mob().unwrap();
        assert_eq!(state.proficiency("bash"), 25);
        assert_eq!(state.abilities["bash"].uses, threshold);
    }

    #[test]
    fn experience_award_levels_up_and_refills() {
        let (mut world, mob) = fixture();
        world.object_mut(mob).unwrap().mob_mut().unwrap().health = 1.0;
        let gained = world.award_experience(mob, experience_for_level(1));
        assert_eq!(gained, 1);
        let state = world.object(mob).unwrap().mob().unwrap();
        assert_eq!(state.level, 2);
        assert_eq!(state.health, world.max_health(mob));
    }

    #[test]
    fn spend_resource_rejects_overdraw() {
        let (mut world, mob) = fixture();
        let mana = world.object(mob).unwrap().mob().unwrap().mana;
        assert!(world.spend_resource(mob, Resource::Mana, mana + 1.0).is_err());
        world.spend_resource(mob, Resource::Mana, mana).unwrap();
        assert_eq!(world.object(mob).unwrap().mob().unwrap().mana, 0.0);
    }

    #[test]
    fn regeneration_recovers_but_never_overfills() {
        let (mut world, mob) = fixture();
        {
            let state = world.object_mut(mob).unwrap().mob_mut().unwrap();
            state.health = 10.0;
            state.mana = 0.0;
            state.exhaustion = 0.0;
        }
        world.regenerate_all();
        let state = world.object(mob).unwrap().mob().unwrap();
        assert!(state.health > 10.0);
        assert!(state.mana > 0.0);
        assert_eq!(state.exhaustion, 5.0);

        // Health holds still while fighting.
        let health_before = state.health;
        world.object_mut(mob).unwrap().mob_mut().unwrap().combat_target = Some(ObjectId(999));
        world.regenerate_all();
        assert_eq!(world.object(mob).unwrap().mob().unwrap().health, health_before);

        // Nothing regenerates past its maximum.
        for _ in 0..10_000 {
            world.regenerate_all();
        }
        let state = world.object(mob).unwrap().mob().unwrap();
        assert!(state.mana <= world.max_mana(mob));
        assert!(state.exhaustion <= world.max_exhaustion(mob));
    }

    #[test]
    fn recompute_vitals_clamps_to_new_maxima() {
        let (mut world, mob) = fixture();
        let max = world.max_health(mob);
        world.object_mut(mob).unwrap().mob_mut().unwrap().health = max + 500.0;
        world.recompute_vitals(mob);
        assert_eq!(world.object(mob).unwrap().mob().unwrap().health, max);
    }
}
