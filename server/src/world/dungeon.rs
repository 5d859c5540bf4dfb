//! The dungeon graph: 3D room grids, tunnels, room references and object
//! templates.
//!
//! Grids are flattened z-major vectors of optional room oids. Tunnels are
//! registry-owned [`RoomLink`]s shared by their two endpoint rooms; grid
//! adjacency allows movement on its own, but a tunnel in a direction always
//! overrides it.

use std::collections::BTreeMap;

use dusk_core::direction::Direction;
use dusk_core::error::EngineError;
use dusk_core::records::{BehaviorFlags, ItemData};

use super::object::{GameObject, RoomState};
use super::{Coordinate, DungeonId, LinkId, ObjectId, World};

/// One endpoint of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEnd {
    pub room: ObjectId,
    pub direction: Direction,
}

/// A directed tunnel between two rooms. For two-way links both rooms hold
/// the same link id; for one-way links only the `from` room does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomLink {
    pub id: LinkId,
    pub from: LinkEnd,
    pub to: LinkEnd,
    pub one_way: bool,
}

/// A recipe for stamping out items or mobs.
#[derive(Debug, Clone)]
pub struct ObjectTemplate {
    /// Globalized id, `@dungeon:local`.
    pub id: String,
    pub keywords: Vec<String>,
    pub display_name: String,
    pub description: Option<String>,
    pub room_description: Option<String>,
    pub body: TemplateBody,
}

#[derive(Debug, Clone)]
pub enum TemplateBody {
    Item(ItemData),
    Mob(MobTemplate),
}

#[derive(Debug, Clone)]
pub struct MobTemplate {
    pub race_id: String,
    pub job_id: String,
    pub level: u32,
    pub behavior: BehaviorFlags,
}

/// Globalize a local template id within a dungeon.
pub fn globalize_template_id(dungeon_id: &str, local_id: &str) -> String {
    format!("@{}:{}", dungeon_id, local_id)
}

pub struct Dungeon {
    /// Registered id; `None` for anonymous scratch dungeons.
    pub id: Option<String>,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    rooms: Vec<Option<ObjectId>>,
    /// Globalized template id -> template.
    pub templates: BTreeMap<String, ObjectTemplate>,
}

impl Dungeon {
    pub fn create_empty(width: usize, height: usize, depth: usize, id: Option<String>) -> Self {
        Dungeon {
            id,
            width,
            height,
            depth,
            rooms: vec![None; width * height * depth],
            templates: BTreeMap::new(),
        }
    }

    pub fn in_bounds(&self, coord: Coordinate) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && (coord.x as usize) < self.width
            && (coord.y as usize) < self.height
            && (coord.z as usize) < self.depth
    }

    fn index(&self, coord: Coordinate) -> Option<usize> {
        if !self.in_bounds(coord) {
            return None;
        }
        let (x, y, z) = (coord.x as usize, coord.y as usize, coord.z as usize);
        Some((z * self.height + y) * self.width + x)
    }

    pub fn room_at(&self, coord: Coordinate) -> Option<ObjectId> {
        self.rooms.get(self.index(coord)?).copied().flatten()
    }

    pub fn set_room(&mut self, coord: Coordinate, room: Option<ObjectId>) -> Result<(), EngineError> {
        let idx = self
            .index(coord)
            .ok_or_else(|| EngineError::Internal(format!("coordinate {} out of bounds", coord)))?;
        self.rooms[idx] = room;
        Ok(())
    }

    /// Register a template under its globalized id.
    pub fn register_template(&mut self, local_id: &str, mut template: ObjectTemplate) {
        let key = match &self.id {
            Some(id) => globalize_template_id(id, local_id),
            None => local_id.to_string(),
        };
        template.id = key.clone();
        self.templates.insert(key, template);
    }

    pub fn room_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.rooms.iter().copied().flatten()
    }
}

impl World {
    /// Create a room at `coord` and place it on the grid.
    pub fn create_room(
        &mut self,
        dungeon_id: DungeonId,
        coord: Coordinate,
        display_name: &str,
    ) -> Result<ObjectId, EngineError> {
        {
            let dungeon = self
                .dungeon(dungeon_id)
                .ok_or_else(|| EngineError::Internal(format!("no dungeon {:?}", dungeon_id)))?;
            if !dungeon.in_bounds(coord) {
                return Err(EngineError::Internal(format!(
                    "coordinate {} out of bounds",
                    coord
                )));
            }
            if dungeon.room_at(coord).is_some() {
                return Err(EngineError::Internal(format!("room already at {}", coord)));
            }
        }

        let oid = self.allocate_oid();
        let room = GameObject::room(oid, display_name.to_string(), RoomState::new(dungeon_id, coord));
        self.insert_object(room);
        self.dungeon_mut(dungeon_id)
            .expect("dungeon checked above")
            .set_room(coord, Some(oid))?;
        Ok(oid)
    }

    /// Destroy a room: remove every incident link, then the room itself.
    /// Contents are destroyed when `clear_contents` is set, spilled into the
    /// void otherwise. Idempotent; never leaves dangling links.
    pub fn destroy_room(&mut self, room: ObjectId, clear_contents: bool) {
        let Some(state) = self.object(room).and_then(|o| o.room_state()).cloned() else {
            return;
        };

        let incident: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.from.room == room || l.to.room == room)
            .map(|l| l.id)
            .collect();
        for link in incident {
            self.remove_link(link);
        }

        if let Some(dungeon) = self.dungeon_mut(state.dungeon) {
            let _ = dungeon.set_room(state.coord, None);
        }

        self.destroy_object(room, clear_contents);
    }

    /// Dig a tunnel from `from_room` towards `direction`, landing in
    /// `to_room`. The reverse direction is inferred; two-way tunnels are
    /// traversable from both ends.
    pub fn create_tunnel(
        &mut self,
        from_room: ObjectId,
        direction: Direction,
        to_room: ObjectId,
        one_way: bool,
    ) -> Result<LinkId, EngineError> {
        if self.object(from_room).and_then(|o| o.room_state()).is_none()
            || self.object(to_room).and_then(|o| o.room_state()).is_none()
        {
            return Err(EngineError::Internal("tunnel endpoints must be rooms".into()));
        }

        let id = self.allocate_link_id();
        let link = RoomLink {
            id,
            from: LinkEnd { room: from_room, direction },
            to: LinkEnd { room: to_room, direction: direction.reverse() },
            one_way,
        };
        self.links.insert(id, link);

        if let Some(state) = self.object_mut(from_room).and_then(|o| o.room_state_mut()) {
            state.links.push(id);
        }
        if !one_way {
            if let Some(state) = self.object_mut(to_room).and_then(|o| o.room_state_mut()) {
                state.links.push(id);
            }
        }
        Ok(id)
    }

    /// Remove a tunnel from the registry and both endpoint rooms. Idempotent.
    pub fn remove_link(&mut self, link: LinkId) {
        let Some(removed) = self.links.remove(&link) else {
            return;
        };
        for room in [removed.from.room, removed.to.room] {
            if let Some(state) = self.object_mut(room).and_then(|o| o.room_state_mut()) {
                state.links.retain(|l| *l != link);
            }
        }
    }

    /// The room stepping `direction` out of `room` leads to, if any.
    /// Tunnels override grid adjacency; the room's exit policy is applied
    /// last.
    pub fn step_target(&self, room: ObjectId, direction: Direction) -> Option<ObjectId> {
        let state = self.object(room)?.room_state()?;
        if state.blocked_exits.contains(&direction) {
            return None;
        }

        for link_id in &state.links {
            let Some(link) = self.links.get(link_id) else {
                continue;
            };
            if link.from.room == room && link.from.direction == direction {
                return Some(link.to.room);
            }
            if !link.one_way && link.to.room == room && link.to.direction == direction {
                return Some(link.from.room);
            }
        }

        let (dx, dy, dz) = direction.offset();
        let coord = Coordinate::new(state.coord.x + dx, state.coord.y + dy, state.coord.z + dz);
        self.dungeon(state.dungeon)?.room_at(coord)
    }

    /// Whether `mob` can step `direction` from where it stands.
    pub fn can_step(&self, mob: ObjectId, direction: Direction) -> bool {
        self.room_of(mob)
            .and_then(|room| self.step_target(room, direction))
            .is_some()
    }

    /// All usable exits of a room, in direction order.
    pub fn exits_of(&self, room: ObjectId) -> Vec<(Direction, ObjectId)> {
        Direction::ALL
            .into_iter()
            .filter_map(|dir| self.step_target(room, dir).map(|target| (dir, target)))
            .collect()
    }

    /// Resolve a room reference of the form `@dungeon{x,y,z}`.
    pub fn resolve_room_ref(&self, reference: &str) -> Option<ObjectId> {
        let (dungeon_name, coord) = parse_room_ref(reference)?;
        let did = self.dungeon_by_name(&dungeon_name)?;
        self.dungeon(did)?.room_at(coord)
    }

    /// Format the canonical reference of a room, if its dungeon is
    /// registered.
    pub fn room_ref_of(&self, room: ObjectId) -> Option<String> {
        let state = self.object(room)?.room_state()?;
        let dungeon = self.dungeon(state.dungeon)?;
        let id = dungeon.id.as_ref()?;
        Some(format!("@{}{}", id, state.coord))
    }

    /// Look up a template: the explicit `@dungeon:local` form first, then a
    /// scan of registered dungeons for the bare local id.
    pub fn find_template(&self, reference: &str) -> Option<&ObjectTemplate> {
        if reference.starts_with('@') {
            let dungeon_name = reference.strip_prefix('@')?.split(':').next()?;
            let did = self.dungeon_by_name(dungeon_name)?;
            return self.dungeon(did)?.templates.get(reference);
        }
        for dungeon in &self.dungeons {
            if let Some(id) = &dungeon.id {
                let key = globalize_template_id(id, reference);
                if let Some(template) = dungeon.templates.get(&key) {
                    return Some(template);
                }
            }
        }
        None
    }
}

/// Parse `@dungeon{x,y,z}` into its parts.
pub fn parse_room_ref(reference: &str) -> Option<(String, Coordinate)> {
    let rest = reference.strip_prefix('@')?;
    let open = rest.find('{')?;
    let close = rest.rfind('}')?;
    if close <= open {
        return None;
    }
    let name = &rest[..open];
    let coords: Vec<&str> = rest[open + 1..close].split(',').collect();
    if name.is_empty() || coords.len() != 3 {
        return None;
    }
    let x = coords[0].trim().parse().ok()?;
    let y = coords[1].trim().parse().ok()?;
    let z = coords[2].trim().parse().ok()?;
    Some((name.to_string(), Coordinate::new(x, y, z)))
}
