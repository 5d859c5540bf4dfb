//! Argument scopes and name resolution.
//!
//! A scope is the candidate set an object-naming fragment searches:
//! the actor's inventory, the actor's room, or both with the room preferred
//! on ties. Candidates are walked in container order, so ties fall to
//! room-order first and (because the arena hands out oids in order) to the
//! lower oid among otherwise indistinguishable objects.

use crate::command::pattern::ArgType;
use crate::world::{ObjectId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Inventory,
    Room,
    All,
}

impl Scope {
    pub fn parse(word: &str) -> Option<Scope> {
        match word {
            "inventory" => Some(Scope::Inventory),
            "room" => Some(Scope::Room),
            "all" => Some(Scope::All),
            _ => None,
        }
    }

    /// Default scope per argument type: mobs are found in the room, items in
    /// the inventory, generic objects anywhere.
    pub fn default_for(ty: ArgType) -> Scope {
        match ty {
            ArgType::Mob => Scope::Room,
            ArgType::Item => Scope::Inventory,
            _ => Scope::All,
        }
    }
}

fn type_matches(world: &World, oid: ObjectId, ty: ArgType) -> bool {
    let Some(obj) = world.object(oid) else {
        return false;
    };
    match ty {
        ArgType::Item => obj.is_item(),
        ArgType::Mob => obj.is_mob(),
        ArgType::Object => !obj.is_room(),
        _ => false,
    }
}

/// Candidate oids for a scope, in tie-break order.
fn candidates(world: &World, actor: ObjectId, scope: Scope) -> Vec<ObjectId> {
    let room_contents = || -> Vec<ObjectId> {
        world
            .room_of(actor)
            .map(|room| world.contents_of(room))
            .unwrap_or_default()
            .into_iter()
            .filter(|oid| *oid != actor)
            .collect()
    };
    match scope {
        Scope::Inventory => world.contents_of(actor),
        Scope::Room => room_contents(),
        Scope::All => {
            let mut out = room_contents();
            out.extend(world.contents_of(actor));
            out
        }
    }
}

/// Resolve a name fragment against a scope. The first candidate, in scope
/// order, whose keywords prefix-match every fragment token wins.
pub fn resolve_fragment(
    world: &World,
    actor: ObjectId,
    fragment: &[String],
    ty: ArgType,
    scope: Option<Scope>,
) -> Option<ObjectId> {
    let scope = scope.unwrap_or_else(|| Scope::default_for(ty));
    candidates(world, actor, scope).into_iter().find(|oid| {
        type_matches(world, *oid, ty)
            && world.object(*oid).map_or(false, |o| o.matches_fragment(fragment))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::content;
    use crate::world::dungeon::Dungeon;
    use crate::world::object::GameObject;
    use crate::world::Coordinate;
    use dusk_core::records::ItemData;

    struct Fixture {
        world: World,
        actor: ObjectId,
        room_sword: ObjectId,
        pocket_sword: ObjectId,
        guard: ObjectId,
    }

    fn fixture() -> Fixture {
        let mut world = World::with_seed(ServerConfig::default(), 4);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        let did = world
            .add_dungeon(Dungeon::create_empty(2, 2, 1, Some("scope".into())))
            .unwrap();
        let room = world.create_room(did, Coordinate::new(0, 0, 0), "Court").unwrap();
        let actor = world
            .spawn_mob(vec!["actor".into()], "Actor", "human", "warrior", 1)
            .unwrap();
        world.add_to(actor, room).unwrap();

        let mut sword = |world: &mut World| {
            let oid = world.allocate_oid();
            world.insert_object(GameObject::item(
                oid,
                vec!["iron".into(), "sword".into()],
                "an iron sword".into(),
                ItemData::default(),
            ))
        };
        let room_sword = sword(&mut world);
        world.add_to(room_sword, room).unwrap();
        let pocket_sword = sword(&mut world);
        world.add_to(pocket_sword, actor).unwrap();

        let guard = world
            .spawn_mob(vec!["city".into(), "guard".into()], "a city guard", "human", "warrior", 2)
            .unwrap();
        world.add_to(guard, room).unwrap();

        Fixture { world, actor, room_sword, pocket_sword, guard }
    }

    fn frag(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn all_scope_prefers_the_room_copy() {
        let fx = fixture();
        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["sword"]),
            ArgType::Object,
            Some(Scope::All),
        );
        assert_eq!(found, Some(fx.room_sword));
    }

    #[test]
    fn inventory_scope_ignores_the_room() {
        let fx = fixture();
        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["sword"]),
            ArgType::Item,
            Some(Scope::Inventory),
        );
        assert_eq!(found, Some(fx.pocket_sword));
    }

    #[test]
    fn room_scope_excludes_the_actor_and_matches_mobs() {
        let fx = fixture();
        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["actor"]),
            ArgType::Mob,
            Some(Scope::Room),
        );
        assert_eq!(found, None, "the actor never matches itself in @room");

        let found =
            resolve_fragment(&fx.world, fx.actor, &frag(&["guard"]), ArgType::Mob, None);
        assert_eq!(found, Some(fx.guard));
    }

    #[test]
    fn default_scopes_follow_the_type() {
        assert_eq!(Scope::default_for(ArgType::Mob), Scope::Room);
        assert_eq!(Scope::default_for(ArgType::Item), Scope::Inventory);
        assert_eq!(Scope::default_for(ArgType::Object), Scope::All);
    }

    #[test]
    fn type_filter_rejects_wrong_kinds() {
        let fx = fixture();
        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["guard"]),
            ArgType::Item,
            Some(Scope::Room),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn multi_token_fragments_require_all_tokens() {
        let fx = fixture();
        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["city", "gu"]),
            ArgType::Mob,
            None,
        );
        assert_eq!(found, Some(fx.guard));

        let found = resolve_fragment(
            &fx.world,
            fx.actor,
            &frag(&["city", "sword"]),
            ArgType::Mob,
            None,
        );
        assert_eq!(found, None);
    }
}
