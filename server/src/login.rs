//! The login state machine.
//!
//! `AwaitingUsername -> AwaitingPassword -> Playing -> Closed`, with a
//! minimal creation branch for names nobody owns yet. All world mutation
//! happens in one synchronous step once credentials check out; the reads
//! before that never suspend mid-transaction.

use chrono::Utc;

use dusk_core::effect::ActTemplates;
use dusk_core::message::MessageGroup;

use crate::act::{act, send_to_mob, ActContext, ActOptions};
use crate::character::{Character, Session};
use crate::command::standard::render_room;
use crate::world::{CharacterId, World};
use dusk_core::records::Credentials;

/// Connection-side login state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    AwaitingUsername,
    AwaitingPassword { username: String, attempts: u32 },
    /// Creation branch: the name is unclaimed and wants a password.
    AwaitingNewPassword { username: String },
    Playing { character: CharacterId },
    Closed,
}

/// What the connection layer should do after feeding a line in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStep {
    /// Send this text and keep reading.
    Reply(String),
    /// The character entered the world; switch to command dispatch.
    Entered(CharacterId),
    /// Send the text, then drop the connection.
    Close(String),
}

pub fn greeting() -> String {
    "{cDuskhaven{d\nBy what name are you known?".to_string()
}

fn valid_username(name: &str) -> bool {
    (2..=16).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Advance the machine by one inbound line.
pub fn advance(
    world: &mut World,
    state: &mut LoginState,
    connection_id: u64,
    line: &str,
) -> LoginStep {
    match state.clone() {
        LoginState::AwaitingUsername => {
            let name = line.trim();
            if !valid_username(name) {
                return LoginStep::Reply(
                    "Names are two to sixteen letters or digits. Try again.".into(),
                );
            }
            match world.character_by_name(name) {
                Some(id) => {
                    let Some(character) = world.character(id) else {
                        return LoginStep::Reply("Something is wrong with that name.".into());
                    };
                    if character.credentials.is_banned {
                        log::warn!("banned account {:?} attempted login", name);
                        return LoginStep::Close("You are not welcome here.".into());
                    }
                    if character.session.is_some() {
                        return LoginStep::Reply(
                            "That soul already walks the world. Choose another name.".into(),
                        );
                    }
                    *state = LoginState::AwaitingPassword {
                        username: character.username().to_string(),
                        attempts: 0,
                    };
                    LoginStep::Reply("Password:".into())
                }
                None => {
                    *state = LoginState::AwaitingNewPassword { username: name.to_string() };
                    LoginStep::Reply(format!(
                        "{} is a name unknown here. Choose a password to claim it:",
                        name
                    ))
                }
            }
        }
        LoginState::AwaitingPassword { username, attempts } => {
            let id = match world.character_by_name(&username) {
                Some(id) => id,
                None => {
                    *state = LoginState::Closed;
                    return LoginStep::Close("That name has vanished.".into());
                }
            };
            let ok = world
                .character(id)
                .map_or(false, |c| c.credentials.verify_password(line.trim()));
            if !ok {
                let attempts = attempts + 1;
                if attempts >= world.config.max_login_attempts {
                    log::warn!("{:?} exhausted password attempts", username);
                    *state = LoginState::Closed;
                    return LoginStep::Close("Too many wrong passwords.".into());
                }
                *state = LoginState::AwaitingPassword { username, attempts };
                return LoginStep::Reply("Wrong password. Try again:".into());
            }
            *state = LoginState::Playing { character: id };
            complete_login(world, id, connection_id);
            LoginStep::Entered(id)
        }
        LoginState::AwaitingNewPassword { username } => {
            let password = line.trim();
            if password.len() < 4 {
                return LoginStep::Reply("Passwords need at least four characters. Choose one:".into());
            }
            let id = create_account(world, &username, password);
            *state = LoginState::Playing { character: id };
            complete_login(world, id, connection_id);
            LoginStep::Entered(id)
        }
        LoginState::Playing { .. } | LoginState::Closed => {
            LoginStep::Reply(String::new())
        }
    }
}

/// Create a brand-new account and its mob. The first account ever created
/// on a world gets the admin flag.
pub fn create_account(world: &mut World, username: &str, password: &str) -> CharacterId {
    let first_account = world.characters.is_empty();
    let mob = world
        .spawn_mob(vec![username.to_lowercase()], username, "human", "warrior", 1)
        .expect("built-in archetypes are registered");

    let id = world.allocate_character_id();
    let mut credentials = Credentials::new(username, password, Utc::now().timestamp().max(0) as u64);
    credentials.is_admin = first_account;
    let character = Character::new(id, credentials, mob);
    world.register_character(character);
    if let Some(state) = world.object_mut(mob).and_then(|o| o.mob_mut()) {
        state.character = Some(id);
    }
    log::info!("created account {:?} (admin: {})", username, first_account);
    id
}

/// Bind a session, register the character active, and place the mob in its
/// room. One synchronous mutation; the caller has already finished all I/O.
pub fn complete_login(world: &mut World, id: CharacterId, connection_id: u64) {
    let now = world.clock_ms;
    let Some(character) = world.character_mut(id) else {
        return;
    };
    character.session = Some(Session::new(connection_id, now));
    character.credentials.last_login = Utc::now().timestamp().max(0) as u64;
    character.credentials.is_active = true;
    let mob = character.mob;
    let last_room = character.last_room_ref.clone();
    world.active_characters.insert(id);

    // Saved room first, then the configured start room.
    let room = last_room
        .as_deref()
        .and_then(|r| world.resolve_room_ref(r))
        .or_else(|| world.resolve_room_ref(&world.config.start_room.clone()));
    let placed = world.room_of(mob).is_some();
    if !placed {
        if let Some(room) = room {
            if let Err(err) = world.add_to(mob, room) {
                log::error!("failed to place {} at login: {}", mob, err);
            }
        } else {
            log::error!("no start room resolves; {} enters the void", mob);
        }
    }

    moblog!(mob, "logged in as character {:?}", id);
    send_to_mob(
        world,
        mob,
        "{cThe dusk parts, and the world takes you back.{d",
        MessageGroup::System,
    );
    if let Some(room) = world.room_of(mob) {
        act(
            world,
            &ActTemplates::room_only("{User} steps out of the dusk."),
            &ActContext { user: mob, target: None, room },
            &ActOptions::group(MessageGroup::Info),
            &[],
        );
        let lines = render_room(world, mob, room);
        for line in lines {
            send_to_mob(world, mob, &line, MessageGroup::CommandResponse);
        }
    }
}

/// Tear a session down: accumulate playtime, announce, unregister, and park
/// the mob in the holding void unless linkdead mode keeps bodies in-world.
pub fn handle_disconnect(world: &mut World, id: CharacterId) {
    let linkdead = world.config.linkdead;
    let Some(character) = world.character(id) else {
        return;
    };
    let mob = character.mob;
    let Some(session) = character.session.as_ref() else {
        return;
    };
    let playtime_ms = world.clock_ms.saturating_sub(session.started_at_ms);

    if let Some(room) = world.room_of(mob) {
        act(
            world,
            &ActTemplates::room_only("{User} fades into the dusk."),
            &ActContext { user: mob, target: None, room },
            &ActOptions::group(MessageGroup::Info),
            &[],
        );
    }

    let room_ref = world.room_of(mob).and_then(|room| world.room_ref_of(room));
    if let Some(character) = world.character_mut(id) {
        character.stats.playtime_secs += playtime_ms / 1000;
        character.session = None;
        character.last_room_ref = room_ref;
    }
    world.active_characters.remove(&id);
    world.combat.remove(mob);
    if let Some(state) = world.object_mut(mob).and_then(|o| o.mob_mut()) {
        state.combat_target = None;
    }

    if !linkdead {
        let _ = world.detach(mob);
    }
    moblog!(mob, "character {:?} disconnected (linkdead: {})", id, linkdead);
}
