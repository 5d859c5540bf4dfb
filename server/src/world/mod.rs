//! The live world: one arena of game objects plus every process-wide
//! registry (dungeons, links, templates, characters, combat queue, effect
//! timers). Only the executor thread ever holds it,
//! and handlers receive `&mut World` for the duration of one mutation.

pub mod dungeon;
pub mod mob;
pub mod object;
pub mod snapshot;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use dusk_core::ability::Ability;
use dusk_core::archetype::Archetype;
use dusk_core::effect::EffectTemplate;
use dusk_core::error::EngineError;

use crate::character::Character;
use crate::config::ServerConfig;
use crate::spawn::Reset;
use dungeon::{Dungeon, RoomLink};
use object::GameObject;

/// Unique 64-bit object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharacterId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DungeonId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub u64);

/// Integer position inside a dungeon grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Coordinate { x, y, z }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{},{}}}", self.x, self.y, self.z)
    }
}

/// What a scheduled effect timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    EffectTick,
    EffectExpire,
}

impl TimerKind {
    /// A tick that lands exactly on an expiration deadline runs first.
    fn rank(self) -> u8 {
        match self {
            TimerKind::EffectTick => 0,
            TimerKind::EffectExpire => 1,
        }
    }
}

/// One entry in the effect timer heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEntry {
    pub deadline_ms: u64,
    pub mob: ObjectId,
    pub effect_id: u64,
    pub kind: TimerKind,
    seq: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline_ms, self.kind.rank(), self.seq).cmp(&(
            other.deadline_ms,
            other.kind.rank(),
            other.seq,
        ))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// FIFO of mobs with a combat turn pending. A mob enqueued mid-round is not
/// processed until the next round.
#[derive(Debug, Default)]
pub struct CombatQueue {
    order: VecDeque<ObjectId>,
    members: BTreeSet<ObjectId>,
}

impl CombatQueue {
    pub fn enqueue(&mut self, mob: ObjectId) {
        if self.members.insert(mob) {
            self.order.push_back(mob);
        }
    }

    pub fn remove(&mut self, mob: ObjectId) {
        if self.members.remove(&mob) {
            self.order.retain(|m| *m != mob);
        }
    }

    pub fn contains(&self, mob: ObjectId) -> bool {
        self.members.contains(&mob)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insertion-order snapshot of the current round's participants.
    pub fn snapshot(&self) -> Vec<ObjectId> {
        self.order.iter().copied().collect()
    }
}

pub struct World {
    /// Monotonic simulation clock, milliseconds.
    pub clock_ms: u64,
    pub config: ServerConfig,
    pub rng: StdRng,

    next_oid: u64,
    next_character: u64,
    next_link: u64,
    next_effect: u64,
    timer_seq: u64,

    objects: BTreeMap<ObjectId, GameObject>,
    pub dungeons: Vec<Dungeon>,
    dungeon_registry: BTreeMap<String, DungeonId>,
    pub links: BTreeMap<LinkId, RoomLink>,

    pub effect_templates: BTreeMap<String, EffectTemplate>,
    pub abilities: BTreeMap<String, Ability>,
    pub archetypes: BTreeMap<String, Archetype>,

    pub characters: BTreeMap<CharacterId, Character>,
    character_names: BTreeMap<String, CharacterId>,
    pub active_characters: BTreeSet<CharacterId>,

    pub combat: CombatQueue,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    pub resets: Vec<Reset>,
    pub wanderers: BTreeSet<ObjectId>,
    cooldowns: HashMap<(ObjectId, String), u64>,

    /// Set by the copyover command; the orchestrator polls it.
    pub copyover_requested: bool,
    /// Labels published by the command registry for the `commands` command.
    pub command_labels: Vec<String>,
    /// Characters who asked to quit; the connection layer drains this.
    pub pending_quits: Vec<CharacterId>,
}

impl World {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_seed(config, rand::random())
    }

    /// Deterministic constructor for tests.
    pub fn with_seed(config: ServerConfig, seed: u64) -> Self {
        World {
            clock_ms: 0,
            config,
            rng: StdRng::seed_from_u64(seed),
            next_oid: 1,
            next_character: 1,
            next_link: 1,
            next_effect: 1,
            timer_seq: 0,
            objects: BTreeMap::new(),
            dungeons: Vec::new(),
            dungeon_registry: BTreeMap::new(),
            links: BTreeMap::new(),
            effect_templates: BTreeMap::new(),
            abilities: BTreeMap::new(),
            archetypes: BTreeMap::new(),
            characters: BTreeMap::new(),
            character_names: BTreeMap::new(),
            active_characters: BTreeSet::new(),
            combat: CombatQueue::default(),
            timers: BinaryHeap::new(),
            resets: Vec::new(),
            wanderers: BTreeSet::new(),
            cooldowns: HashMap::new(),
            copyover_requested: false,
            command_labels: Vec::new(),
            pending_quits: Vec::new(),
        }
    }

    /// Advance the simulation clock. Time never moves backwards.
    pub fn advance_clock_to(&mut self, now_ms: u64) {
        if now_ms > self.clock_ms {
            self.clock_ms = now_ms;
        }
    }

    // ------------------------------------------------------------------
    // Object arena
    // ------------------------------------------------------------------

    pub fn allocate_oid(&mut self) -> ObjectId {
        let oid = ObjectId(self.next_oid);
        self.next_oid += 1;
        oid
    }

    /// Insert a detached object into the arena. The object must carry an oid
    /// from [`World::allocate_oid`] (or a deserialized one not yet present).
    pub fn insert_object(&mut self, object: GameObject) -> ObjectId {
        let oid = object.oid;
        debug_assert!(!self.objects.contains_key(&oid), "oid reused: {}", oid);
        if oid.0 >= self.next_oid {
            self.next_oid = oid.0 + 1;
        }
        self.objects.insert(oid, object);
        oid
    }

    pub fn object(&self, oid: ObjectId) -> Option<&GameObject> {
        self.objects.get(&oid)
    }

    pub fn object_mut(&mut self, oid: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&oid)
    }

    pub fn expect_object(&self, oid: ObjectId) -> Result<&GameObject, EngineError> {
        self.objects.get(&oid).ok_or(EngineError::MissingObject)
    }

    pub fn expect_object_mut(&mut self, oid: ObjectId) -> Result<&mut GameObject, EngineError> {
        self.objects.get_mut(&oid).ok_or(EngineError::MissingObject)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    /// Display name, or a placeholder for stale handles.
    pub fn display_name(&self, oid: ObjectId) -> String {
        self.object(oid)
            .map(|o| o.display_name.clone())
            .unwrap_or_else(|| "something".to_string())
    }

    // ------------------------------------------------------------------
    // Containment
    // ------------------------------------------------------------------

    /// True when `candidate` is `oid` itself or a transitive container of it.
    pub fn is_ancestor_or_self(&self, candidate: ObjectId, oid: ObjectId) -> bool {
        if candidate == oid {
            return true;
        }
        let mut cursor = self.object(oid).and_then(|o| o.location);
        // Hop cap guards against a corrupted location chain looping forever.
        let mut hops = 0;
        while let Some(parent) = cursor {
            if parent == candidate {
                return true;
            }
            hops += 1;
            if hops > 64 {
                log::error!("location chain from {} exceeds 64 hops", oid);
                return true;
            }
            cursor = self.object(parent).and_then(|o| o.location);
        }
        false
    }

    /// Move `child` into `container`'s contents (at the tail). Detaches from
    /// the previous container first. Emits no messages.
    pub fn add_to(&mut self, child: ObjectId, container: ObjectId) -> Result<(), EngineError> {
        if self.is_ancestor_or_self(child, container) {
            return Err(EngineError::ContainmentCycle);
        }
        self.expect_object(child)?;
        self.expect_object(container)?;

        self.detach(child)?;

        let dest = self.expect_object_mut(container)?;
        dest.contents.push(child);
        self.expect_object_mut(child)?.location = Some(container);
        Ok(())
    }

    /// Remove `child` from its container, leaving it locationless.
    pub fn detach(&mut self, child: ObjectId) -> Result<(), EngineError> {
        let parent = self.expect_object(child)?.location;
        if let Some(parent) = parent {
            if let Some(container) = self.object_mut(parent) {
                container.contents.retain(|c| *c != child);
            }
            self.expect_object_mut(child)?.location = None;
        }
        Ok(())
    }

    /// Snapshot of a container's contents in order.
    pub fn contents_of(&self, oid: ObjectId) -> Vec<ObjectId> {
        self.object(oid).map(|o| o.contents.clone()).unwrap_or_default()
    }

    /// The room an object is (transitively) in.
    pub fn room_of(&self, oid: ObjectId) -> Option<ObjectId> {
        let mut cursor = Some(oid);
        let mut hops = 0;
        while let Some(current) = cursor {
            let obj = self.object(current)?;
            if obj.is_room() {
                return Some(current);
            }
            hops += 1;
            if hops > 64 {
                return None;
            }
            cursor = obj.location;
        }
        None
    }

    /// Destroy an object: detach it, unequip it from any wearer, drop it
    /// from the combat queue, wander set and reset spawned-sets, clear its
    /// effects (cancelling their timers by membership), and optionally
    /// recurse into its contents.
    pub fn destroy_object(&mut self, oid: ObjectId, recurse: bool) {
        let Some(obj) = self.object(oid) else {
            return;
        };

        if let Some(wearer) = obj.location {
            if let Some(wearer_obj) = self.object_mut(wearer) {
                if let Some(mob) = wearer_obj.mob_mut() {
                    mob.equipped.retain(|_, item| *item != oid);
                }
            }
        }

        if let Some(mob) = self.object(oid).and_then(|o| o.mob()) {
            if let Some(character) = mob.character {
                log::warn!("destroying mob {} still bound to character {:?}", oid, character);
            }
        }

        let _ = self.detach(oid);
        self.combat.remove(oid);
        self.wanderers.remove(&oid);
        for reset in &mut self.resets {
            reset.spawned.remove(&oid);
        }
        self.cooldowns.retain(|(mob, _), _| *mob != oid);

        let contents = self.contents_of(oid);
        if recurse {
            for child in contents {
                self.destroy_object(child, true);
            }
        } else {
            for child in contents {
                let _ = self.detach(child);
            }
        }

        // Effect timers die with the instance list: the lazy membership
        // check in the effect engine skips entries whose mob is gone.
        self.objects.remove(&oid);
    }

    // ------------------------------------------------------------------
    // Dungeons and links
    // ------------------------------------------------------------------

    pub fn add_dungeon(&mut self, dungeon: Dungeon) -> Result<DungeonId, EngineError> {
        if let Some(id) = &dungeon.id {
            if self.dungeon_registry.contains_key(id) {
                return Err(EngineError::DuplicateDungeonId(id.clone()));
            }
        }
        let did = DungeonId(self.dungeons.len());
        if let Some(id) = &dungeon.id {
            self.dungeon_registry.insert(id.clone(), did);
        }
        self.dungeons.push(dungeon);
        Ok(did)
    }

    pub fn dungeon(&self, id: DungeonId) -> Option<&Dungeon> {
        self.dungeons.get(id.0)
    }

    pub fn dungeon_mut(&mut self, id: DungeonId) -> Option<&mut Dungeon> {
        self.dungeons.get_mut(id.0)
    }

    pub fn dungeon_by_name(&self, name: &str) -> Option<DungeonId> {
        self.dungeon_registry.get(name).copied()
    }

    pub fn allocate_link_id(&mut self) -> LinkId {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        id
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    pub fn allocate_character_id(&mut self) -> CharacterId {
        let id = CharacterId(self.next_character);
        self.next_character += 1;
        id
    }

    pub fn register_character(&mut self, character: Character) -> CharacterId {
        let id = character.id;
        self.character_names
            .insert(character.credentials.username.to_lowercase(), id);
        self.characters.insert(id, character);
        id
    }

    pub fn character_by_name(&self, username: &str) -> Option<CharacterId> {
        self.character_names.get(&username.to_lowercase()).copied()
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(&id)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(&id)
    }

    // ------------------------------------------------------------------
    // Effect timers
    // ------------------------------------------------------------------

    pub fn allocate_effect_id(&mut self) -> u64 {
        let id = self.next_effect;
        self.next_effect += 1;
        id
    }

    pub fn schedule_timer(
        &mut self,
        deadline_ms: u64,
        mob: ObjectId,
        effect_id: u64,
        kind: TimerKind,
    ) {
        let seq = self.timer_seq;
        self.timer_seq += 1;
        self.timers.push(Reverse(TimerEntry { deadline_ms, mob, effect_id, kind, seq }));
    }

    /// Pop every timer due at or before `now_ms`, in deadline order with
    /// ties broken tick-before-expire, then by insertion.
    pub fn due_timers(&mut self, now_ms: u64) -> Vec<TimerEntry> {
        let mut due = Vec::new();
        while let Some(entry) = self.pop_due_timer(now_ms) {
            due.push(entry);
        }
        due
    }

    /// Pop the single earliest timer due at or before `now_ms`. Handlers that
    /// schedule follow-up timers inside the same drain loop will see them
    /// fire in this pass when they are already due.
    pub fn pop_due_timer(&mut self, now_ms: u64) -> Option<TimerEntry> {
        let due = self
            .timers
            .peek()
            .map_or(false, |Reverse(entry)| entry.deadline_ms <= now_ms);
        if due {
            self.timers.pop().map(|Reverse(entry)| entry)
        } else {
            None
        }
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.len()
    }

    // ------------------------------------------------------------------
    // Cooldowns
    // ------------------------------------------------------------------

    pub fn cooldown_remaining(&self, mob: ObjectId, command_id: &str, cooldown_ms: u64) -> u64 {
        match self.cooldowns.get(&(mob, command_id.to_string())) {
            Some(last) => {
                let ready_at = last + cooldown_ms;
                ready_at.saturating_sub(self.clock_ms)
            }
            None => 0,
        }
    }

    pub fn note_command_executed(&mut self, mob: ObjectId, command_id: &str) {
        self.cooldowns.insert((mob, command_id.to_string()), self.clock_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::object::GameObject;
    use dusk_core::records::ItemData;

    fn test_world() -> World {
        World::with_seed(ServerConfig::default(), 7)
    }

    fn bare_item(world: &mut World, name: &str) -> ObjectId {
        let oid = world.allocate_oid();
        world.insert_object(GameObject::item(
            oid,
            vec![name.to_string()],
            name.to_string(),
            ItemData { container: true, ..ItemData::default() },
        ))
    }

    #[test]
    fn add_to_detaches_from_previous_container() {
        let mut world = test_world();
        let bag = bare_item(&mut world, "bag");
        let chest = bare_item(&mut world, "chest");
        let coin = bare_item(&mut world, "coin");

        world.add_to(coin, bag).unwrap();
        world.add_to(coin, chest).unwrap();

        assert_eq!(world.contents_of(bag), vec![]);
        assert_eq!(world.contents_of(chest), vec![coin]);
        assert_eq!(world.object(coin).unwrap().location, Some(chest));
    }

    #[test]
    fn containment_appears_exactly_once() {
        let mut world = test_world();
        let bag = bare_item(&mut world, "bag");
        let coin = bare_item(&mut world, "coin");

        world.add_to(coin, bag).unwrap();
        world.add_to(coin, bag).unwrap();

        assert_eq!(world.contents_of(bag), vec![coin]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut world = test_world();
        let outer = bare_item(&mut world, "outer");
        let middle = bare_item(&mut world, "middle");
        let inner = bare_item(&mut world, "inner");

        world.add_to(middle, outer).unwrap();
        world.add_to(inner, middle).unwrap();

        assert_eq!(world.add_to(outer, inner), Err(EngineError::ContainmentCycle));
        assert_eq!(world.add_to(outer, outer), Err(EngineError::ContainmentCycle));
        // The failed adds changed nothing.
        assert_eq!(world.contents_of(outer), vec![middle]);
        assert_eq!(world.object(outer).unwrap().location, None);
    }

    #[test]
    fn destroy_without_recursion_spills_contents() {
        let mut world = test_world();
        let bag = bare_item(&mut world, "bag");
        let coin = bare_item(&mut world, "coin");
        world.add_to(coin, bag).unwrap();

        world.destroy_object(bag, false);

        assert!(world.object(bag).is_none());
        let coin_obj = world.object(coin).unwrap();
        assert_eq!(coin_obj.location, None);
    }

    #[test]
    fn destroy_with_recursion_takes_contents_along() {
        let mut world = test_world();
        let bag = bare_item(&mut world, "bag");
        let coin = bare_item(&mut world, "coin");
        world.add_to(coin, bag).unwrap();

        world.destroy_object(bag, true);

        assert!(world.object(bag).is_none());
        assert!(world.object(coin).is_none());
    }

    #[test]
    fn combat_queue_is_fifo_and_dedups() {
        let mut queue = CombatQueue::default();
        let a = ObjectId(1);
        let b = ObjectId(2);
        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(a);
        assert_eq!(queue.snapshot(), vec![a, b]);
        queue.remove(a);
        assert_eq!(queue.snapshot(), vec![b]);
        assert!(!queue.contains(a));
    }

    #[test]
    fn timer_heap_orders_by_deadline_then_kind_then_insertion() {
        let mut world = test_world();
        let mob = ObjectId(9);
        world.schedule_timer(2000, mob, 1, TimerKind::EffectExpire);
        world.schedule_timer(2000, mob, 1, TimerKind::EffectTick);
        world.schedule_timer(1000, mob, 2, TimerKind::EffectTick);

        let due = world.due_timers(2000);
        assert_eq!(due.len(), 3);
        assert_eq!(due[0].deadline_ms, 1000);
        assert_eq!(due[1].kind, TimerKind::EffectTick);
        assert_eq!(due[2].kind, TimerKind::EffectExpire);
        assert_eq!(world.pending_timer_count(), 0);
    }

    #[test]
    fn duplicate_dungeon_ids_are_rejected() {
        let mut world = test_world();
        let first = Dungeon::create_empty(3, 3, 1, Some("tower".into()));
        let second = Dungeon::create_empty(5, 5, 1, Some("tower".into()));

        let did = world.add_dungeon(first).unwrap();
        let err = world.add_dungeon(second).unwrap_err();
        assert_eq!(err, EngineError::DuplicateDungeonId("tower".into()));
        assert_eq!(world.dungeon_by_name("tower"), Some(did));
        assert_eq!(world.dungeon(did).unwrap().width, 3);
    }

    #[test]
    fn cooldowns_measure_from_last_execution() {
        let mut world = test_world();
        let mob = ObjectId(4);
        assert_eq!(world.cooldown_remaining(mob, "bash", 5000), 0);
        world.advance_clock_to(1000);
        world.note_command_executed(mob, "bash");
        world.advance_clock_to(3000);
        assert_eq!(world.cooldown_remaining(mob, "bash", 5000), 3000);
        world.advance_clock_to(6000);
        assert_eq!(world.cooldown_remaining(mob, "bash", 5000), 0);
    }
}
