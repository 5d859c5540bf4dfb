//! Player accounts, sessions, and message delivery.
//!
//! The character owns routing policy: which groups deliver immediately,
//! which are queued by busy mode, which are muted. Everything below the
//! session's outbound buffer (ANSI rendering, sockets, prompts) belongs to
//! the I/O layer.

use std::collections::{BTreeSet, VecDeque};

use dusk_core::constants::BUSY_QUEUE_CAP;
use dusk_core::message::MessageGroup;
use dusk_core::records::{Credentials, PlayStats, Settings};

use crate::world::{CharacterId, ObjectId};

/// A line waiting to leave the process, already routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLine {
    pub text: String,
    pub group: MessageGroup,
}

/// Transient per-login state. Dropped on disconnect.
#[derive(Debug)]
pub struct Session {
    pub connection_id: u64,
    pub started_at_ms: u64,
    /// Busy-mode FIFO, bounded at [`BUSY_QUEUE_CAP`].
    queue: VecDeque<OutboundLine>,
    /// Lines ready for the I/O layer to render and write.
    pub outbound: VecDeque<OutboundLine>,
    /// How many queued lines were dropped past the cap since the last read.
    pub dropped: u64,
}

impl Session {
    pub fn new(connection_id: u64, started_at_ms: u64) -> Self {
        Session {
            connection_id,
            started_at_ms,
            queue: VecDeque::new(),
            outbound: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    fn push_queued(&mut self, line: OutboundLine) {
        if self.queue.len() >= BUSY_QUEUE_CAP {
            self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(line);
    }

    /// Drain queued lines for a test or diagnostic caller.
    pub fn take_outbound(&mut self) -> Vec<OutboundLine> {
        self.outbound.drain(..).collect()
    }
}

/// A player account bound to one mob.
#[derive(Debug)]
pub struct Character {
    pub id: CharacterId,
    pub credentials: Credentials,
    pub settings: Settings,
    pub stats: PlayStats,
    /// Usernames this character refuses tells and channels from.
    pub blocked: BTreeSet<String>,
    pub mob: ObjectId,
    pub session: Option<Session>,
    /// Where the mob stood when the session ended; login returns there.
    pub last_room_ref: Option<String>,
}

impl Character {
    pub fn new(id: CharacterId, credentials: Credentials, mob: ObjectId) -> Self {
        Character {
            id,
            credentials,
            settings: Settings::default(),
            stats: PlayStats::default(),
            blocked: BTreeSet::new(),
            mob,
            session: None,
            last_room_ref: None,
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub fn has_blocked(&self, username: &str) -> bool {
        self.blocked.contains(&username.to_lowercase())
    }

    pub fn toggle_block(&mut self, username: &str) -> bool {
        let key = username.to_lowercase();
        if self.blocked.remove(&key) {
            false
        } else {
            self.blocked.insert(key);
            true
        }
    }

    /// Route one message. `in_combat` feeds the combat-busy variant.
    ///
    /// - no session: dropped
    /// - `COMMAND_RESPONSE` / `SYSTEM` / `PROMPT`: immediate
    /// - muted group: dropped
    /// - busy (or combat-busy while fighting) and the group is forwarded:
    ///   queued FIFO, oldest dropped past the cap
    /// - otherwise: immediate
    pub fn send_message(&mut self, text: &str, group: MessageGroup, in_combat: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let line = OutboundLine { text: text.to_string(), group };

        if group.always_immediate() {
            session.outbound.push_back(line);
            return;
        }
        if self.settings.muted_groups.contains(&group) {
            return;
        }

        let busy_active = self.settings.busy || (self.settings.combat_busy && in_combat);
        if busy_active && self.settings.busy_forwarded.contains(&group) {
            session.push_queued(line);
            return;
        }

        session.outbound.push_back(line);
    }

    /// Deliver every queued message in FIFO order, bracketed by separator
    /// frames. Returns how many were delivered.
    pub fn read_queued_messages(&mut self) -> usize {
        let Some(session) = self.session.as_mut() else {
            return 0;
        };
        let count = session.queue.len();
        if count == 0 {
            session.outbound.push_back(OutboundLine {
                text: "You have no held messages.".into(),
                group: MessageGroup::CommandResponse,
            });
            return 0;
        }

        let dropped = session.dropped;
        session.dropped = 0;
        session.outbound.push_back(OutboundLine {
            text: format!("{{c--- {} held message(s) ---{{d", count),
            group: MessageGroup::CommandResponse,
        });
        while let Some(line) = session.queue.pop_front() {
            session.outbound.push_back(line);
        }
        if dropped > 0 {
            session.outbound.push_back(OutboundLine {
                text: format!("{{c--- {} older message(s) were dropped ---{{d", dropped),
                group: MessageGroup::CommandResponse,
            });
        }
        session.outbound.push_back(OutboundLine {
            text: "{c--- end of held messages ---{d".into(),
            group: MessageGroup::CommandResponse,
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn online_character() -> Character {
        let mut ch = Character::new(
            CharacterId(1),
            Credentials::new("tester", "pw", 0),
            ObjectId(1),
        );
        ch.session = Some(Session::new(1, 0));
        ch
    }

    fn outbound_texts(ch: &mut Character) -> Vec<String> {
        ch.session
            .as_mut()
            .unwrap()
            .take_outbound()
            .into_iter()
            .map(|l| l.text)
            .collect()
    }

    #[test]
    fn messages_without_session_are_dropped() {
        let mut ch = online_character();
        ch.session = None;
        ch.send_message("hello", MessageGroup::Action, false);
        // No panic, nothing stored.
        assert!(ch.session.is_none());
    }

    #[test]
    fn command_responses_bypass_busy_mode() {
        let mut ch = online_character();
        ch.settings.busy = true;
        ch.settings.busy_forwarded.insert(MessageGroup::CommandResponse);
        ch.send_message("done", MessageGroup::CommandResponse, false);
        assert_eq!(outbound_texts(&mut ch), vec!["done"]);
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 0);
    }

    #[test]
    fn busy_mode_queues_only_forwarded_groups() {
        let mut ch = online_character();
        ch.settings.busy = true;
        ch.settings.busy_forwarded.insert(MessageGroup::Channels);

        ch.send_message("gossip line", MessageGroup::Channels, false);
        ch.send_message("someone waves", MessageGroup::Action, false);

        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 1);
        assert_eq!(outbound_texts(&mut ch), vec!["someone waves"]);
    }

    #[test]
    fn combat_busy_only_queues_while_fighting() {
        let mut ch = online_character();
        ch.settings.combat_busy = true;
        ch.settings.busy_forwarded.insert(MessageGroup::Channels);

        ch.send_message("peace", MessageGroup::Channels, false);
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 0);

        ch.send_message("war", MessageGroup::Channels, true);
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 1);
    }

    #[test]
    fn read_queued_delivers_fifo_with_separators() {
        let mut ch = online_character();
        ch.settings.busy = true;
        ch.settings.busy_forwarded.insert(MessageGroup::Channels);
        ch.send_message("first", MessageGroup::Channels, false);
        ch.send_message("second", MessageGroup::Channels, false);
        outbound_texts(&mut ch); // clear

        let delivered = ch.read_queued_messages();
        assert_eq!(delivered, 2);
        let texts = outbound_texts(&mut ch);
        assert_eq!(texts.len(), 4);
        assert!(texts[0].contains("2 held"));
        assert_eq!(texts[1], "first");
        assert_eq!(texts[2], "second");
        assert!(texts[3].contains("end of held"));
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 0);
    }

    #[test]
    fn queue_is_bounded_and_drops_oldest() {
        let mut ch = online_character();
        ch.settings.busy = true;
        ch.settings.busy_forwarded.insert(MessageGroup::Channels);
        for i in 0..(BUSY_QUEUE_CAP + 5) {
            ch.send_message(&format!("msg {}", i), MessageGroup::Channels, false);
        }
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), BUSY_QUEUE_CAP);
        outbound_texts(&mut ch);
        ch.read_queued_messages();
        let texts = outbound_texts(&mut ch);
        // Oldest five were dropped, so delivery starts at msg 5.
        assert_eq!(texts[1], "msg 5");
        assert!(texts.iter().any(|t| t.contains("5 older")));
    }

    #[test]
    fn muted_groups_are_dropped_entirely() {
        let mut ch = online_character();
        ch.settings.muted_groups.insert(MessageGroup::Channels);
        ch.send_message("noise", MessageGroup::Channels, false);
        assert!(outbound_texts(&mut ch).is_empty());
        assert_eq!(ch.session.as_ref().unwrap().queued_len(), 0);
    }

    #[test]
    fn block_list_toggles_case_insensitively() {
        let mut ch = online_character();
        assert!(ch.toggle_block("Miscreant"));
        assert!(ch.has_blocked("miscreant"));
        assert!(ch.has_blocked("MISCREANT"));
        assert!(!ch.toggle_block("miscreant"));
        assert!(!ch.has_blocked("miscreant"));
    }
}
