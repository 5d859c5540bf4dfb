//! Message groups.
//!
//! Every line sent to a character is tagged with a group; busy mode and
//! channel filtering key off the group, never the text.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum MessageGroup {
    Prompt,
    System,
    CommandResponse,
    Info,
    Combat,
    Channels,
    Action,
}

impl MessageGroup {
    pub const ALL: [MessageGroup; 7] = [
        MessageGroup::Prompt,
        MessageGroup::System,
        MessageGroup::CommandResponse,
        MessageGroup::Info,
        MessageGroup::Combat,
        MessageGroup::Channels,
        MessageGroup::Action,
    ];

    /// Groups that bypass busy-mode queueing unconditionally.
    pub fn always_immediate(self) -> bool {
        matches!(
            self,
            MessageGroup::CommandResponse | MessageGroup::System | MessageGroup::Prompt
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            MessageGroup::Prompt => "prompt",
            MessageGroup::System => "system",
            MessageGroup::CommandResponse => "response",
            MessageGroup::Info => "info",
            MessageGroup::Combat => "combat",
            MessageGroup::Channels => "channels",
            MessageGroup::Action => "action",
        }
    }

    /// Parse a group name as typed by a player (for `busy` configuration).
    pub fn parse(word: &str) -> Option<MessageGroup> {
        let lower = word.to_lowercase();
        MessageGroup::ALL.into_iter().find(|g| g.label() == lower)
    }
}

impl fmt::Display for MessageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_groups_are_exactly_the_contract_set() {
        let immediate: Vec<_> = MessageGroup::ALL
            .into_iter()
            .filter(|g| g.always_immediate())
            .collect();
        assert_eq!(
            immediate,
            vec![
                MessageGroup::Prompt,
                MessageGroup::System,
                MessageGroup::CommandResponse
            ]
        );
    }

    #[test]
    fn parse_round_trips_labels() {
        for group in MessageGroup::ALL {
            assert_eq!(MessageGroup::parse(group.label()), Some(group));
        }
        assert_eq!(MessageGroup::parse("COMBAT"), Some(MessageGroup::Combat));
        assert_eq!(MessageGroup::parse("nope"), None);
    }
}
