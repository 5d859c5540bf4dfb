//! The `act` message-fanout primitive.
//!
//! One call renders up to three audiences: the acting user, the target, and
//! every other observer in the room. Room contents are snapshotted at call
//! entry, so objects arriving mid-fanout never see the message.

use dusk_core::effect::ActTemplates;
use dusk_core::message::MessageGroup;

use crate::helpers::capitalize_first;
use crate::world::{ObjectId, World};

#[derive(Debug, Clone, Copy)]
pub struct ActContext {
    pub user: ObjectId,
    pub target: Option<ObjectId>,
    pub room: ObjectId,
}

#[derive(Debug, Clone, Copy)]
pub struct ActOptions {
    pub group: MessageGroup,
    /// Observers who cannot see the user get `Someone` instead of a name.
    pub can_see_user: bool,
    pub can_see_target: bool,
    pub exclude_user: bool,
    pub exclude_target: bool,
}

impl Default for ActOptions {
    fn default() -> Self {
        ActOptions {
            group: MessageGroup::Action,
            can_see_user: true,
            can_see_target: true,
            exclude_user: true,
            exclude_target: true,
        }
    }
}

impl ActOptions {
    pub fn group(group: MessageGroup) -> Self {
        ActOptions { group, ..ActOptions::default() }
    }
}

/// Substitute `{User}`/`{user}`/`{Target}`/`{target}` plus any extra
/// variables into a template.
fn render(
    template: &str,
    user_name: &str,
    target_name: Option<&str>,
    vars: &[(&str, String)],
) -> String {
    let mut out = template
        .replace("{User}", &capitalize_first(user_name))
        .replace("{user}", user_name);
    if let Some(target) = target_name {
        out = out.replace("{Target}", &capitalize_first(target)).replace("{target}", target);
    }
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

fn send_rendered(world: &mut World, recipient: ObjectId, text: &str, group: MessageGroup) {
    let Some(character_id) = world.object(recipient).and_then(|o| o.mob()).and_then(|m| m.character)
    else {
        return;
    };
    let in_combat = world
        .object(recipient)
        .and_then(|o| o.mob())
        .map_or(false, |m| m.combat_target.is_some());
    if let Some(character) = world.character_mut(character_id) {
        character.send_message(text, group, in_combat);
    }
}

/// Deliver a plain line to a mob's character, if it has one.
pub fn send_to_mob(world: &mut World, mob: ObjectId, text: &str, group: MessageGroup) {
    send_rendered(world, mob, text, group);
}

/// Fan a templated message out to user, target, and room observers.
pub fn act(
    world: &mut World,
    templates: &ActTemplates,
    ctx: &ActContext,
    opts: &ActOptions,
    vars: &[(&str, String)],
) {
    let user_name = world.display_name(ctx.user);
    let target_name = ctx.target.map(|t| world.display_name(t));

    // User audience: sees the target by name only when visible to them.
    if let Some(template) = &templates.user {
        let shown_target = match (&target_name, opts.can_see_target) {
            (Some(name), true) => Some(name.clone()),
            (Some(_), false) => Some("someone".to_string()),
            (None, _) => None,
        };
        let text = render(template, &user_name, shown_target.as_deref(), vars);
        send_rendered(world, ctx.user, &text, opts.group);
    }

    // Target audience, when distinct from the user.
    if let (Some(target), Some(template)) = (ctx.target, &templates.target) {
        if target != ctx.user {
            let shown_user =
                if opts.can_see_user { user_name.clone() } else { "someone".to_string() };
            let text = render(template, &shown_user, Some(&world.display_name(target)), vars);
            send_rendered(world, target, &text, opts.group);
        }
    }

    // Room audience: snapshot at entry.
    if let Some(template) = &templates.room {
        let shown_user = if opts.can_see_user { user_name } else { "someone".to_string() };
        let shown_target = match (target_name, opts.can_see_target) {
            (Some(name), true) => Some(name),
            (Some(_), false) => Some("someone".to_string()),
            (None, _) => None,
        };
        let text = render(template, &shown_user, shown_target.as_deref(), vars);

        for observer in world.contents_of(ctx.room) {
            if opts.exclude_user && observer == ctx.user {
                continue;
            }
            if opts.exclude_target && Some(observer) == ctx.target {
                continue;
            }
            send_rendered(world, observer, &text, opts.group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{Character, Session};
    use crate::config::ServerConfig;
    use crate::content;
    use crate::world::CharacterId;
    use dusk_core::records::Credentials;

    struct Fixture {
        world: World,
        room: ObjectId,
        user: ObjectId,
        target: ObjectId,
        witness: ObjectId,
    }

    fn online(world: &mut World, name: &str) -> ObjectId {
        let mob = world
            .spawn_mob(vec![name.to_lowercase()], name, "human", "warrior", 1)
            .unwrap();
        let id = world.allocate_character_id();
        let mut character = Character::new(id, Credentials::new(name, "pw", 0), mob);
        character.session = Some(Session::new(id.0, 0));
        world.register_character(character);
        world.object_mut(mob).unwrap().mob_mut().unwrap().character = Some(id);
        mob
    }

    fn texts_for(world: &mut World, mob: ObjectId) -> Vec<String> {
        let id = world.object(mob).unwrap().mob().unwrap().character.unwrap();
        world
            .character_mut(id)
            .unwrap()
            .session
            .as_mut()
            .unwrap()
            .take_outbound()
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    fn fixture() -> Fixture {
        let mut world = World::with_seed(ServerConfig::default(), 5);
        content::register_archetypes(&mut world);
        content::register_effect_templates(&mut world);
        content::register_abilities(&mut world);
        let did = world
            .add_dungeon(crate::world::dungeon::Dungeon::create_empty(
                3,
                3,
                1,
                Some("actland".into()),
            ))
            .unwrap();
        let room = world
            .create_room(did, crate::world::Coordinate::new(0, 0, 0), "Stage")
            .unwrap();
        let user = online(&mut world, "Alice");
        let target = online(&mut world, "Bob");
        let witness = online(&mut world, "Carol");
        for mob in [user, target, witness] {
            world.add_to(mob, room).unwrap();
        }
        Fixture { world, room, user, target, witness }
    }

    fn wave_templates() -> ActTemplates {
        ActTemplates {
            user: Some("You wave at {target}.".into()),
            target: Some("{User} waves at you.".into()),
            room: Some("{User} waves at {target}.".into()),
        }
    }

    #[test]
    fn three_audiences_get_their_own_renderings() {
        let mut fx = fixture();
        let ctx = ActContext { user: fx.user, target: Some(fx.target), room: fx.room };
        act(&mut fx.world, &wave_templates(), &ctx, &ActOptions::default(), &[]);

        assert_eq!(texts_for(&mut fx.world, fx.user), vec!["You wave at Bob."]);
        assert_eq!(texts_for(&mut fx.world, fx.target), vec!["Alice waves at you."]);
        assert_eq!(texts_for(&mut fx.world, fx.witness), vec!["Alice waves at Bob."]);
    }

    #[test]
    fn hidden_user_becomes_someone_for_observers() {
        let mut fx = fixture();
        let ctx = ActContext { user: fx.user, target: Some(fx.target), room: fx.room };
        let opts = ActOptions { can_see_user: false, ..ActOptions::default() };
        act(&mut fx.world, &wave_templates(), &ctx, &opts, &[]);

        assert_eq!(texts_for(&mut fx.world, fx.target), vec!["Someone waves at you."]);
        assert_eq!(texts_for(&mut fx.world, fx.witness), vec!["Someone waves at Bob."]);
        // The user still sees their own line.
        assert_eq!(texts_for(&mut fx.world, fx.user), vec!["You wave at Bob."]);
    }

    #[test]
    fn exclusion_flags_control_room_broadcast() {
        let mut fx = fixture();
        let templates = ActTemplates::room_only("{User} stretches.");
        let ctx = ActContext { user: fx.user, target: None, room: fx.room };

        let opts = ActOptions { exclude_user: false, ..ActOptions::default() };
        act(&mut fx.world, &templates, &ctx, &opts, &[]);
        assert_eq!(texts_for(&mut fx.world, fx.user), vec!["Alice stretches."]);
        assert_eq!(texts_for(&mut fx.world, fx.witness), vec!["Alice stretches."]);

        act(&mut fx.world, &templates, &ctx, &ActOptions::default(), &[]);
        assert!(texts_for(&mut fx.world, fx.user).is_empty());
    }

    #[test]
    fn extra_variables_substitute() {
        let mut fx = fixture();
        let templates = ActTemplates {
            user: Some("The poison burns you for {damage}.".into()),
            target: None,
            room: None,
        };
        let ctx = ActContext { user: fx.user, target: None, room: fx.room };
        act(
            &mut fx.world,
            &templates,
            &ctx,
            &ActOptions::group(MessageGroup::Combat),
            &[("damage", "5".to_string())],
        );
        assert_eq!(texts_for(&mut fx.world, fx.user), vec!["The poison burns you for 5."]);
    }

    #[test]
    fn characterless_mobs_receive_nothing() {
        let mut fx = fixture();
        let npc = fx
            .world
            .spawn_mob(vec!["rat".into()], "a rat", "human", "warrior", 1)
            .unwrap();
        fx.world.add_to(npc, fx.room).unwrap();
        let ctx = ActContext { user: npc, target: None, room: fx.room };
        // No session anywhere on the npc; this must simply not panic.
        act(
            &mut fx.world,
            &ActTemplates::room_only("{User} squeaks."),
            &ctx,
            &ActOptions::default(),
            &[],
        );
        assert_eq!(texts_for(&mut fx.world, fx.witness), vec!["A rat squeaks."]);
    }
}
