//! Engine error taxonomy.
//!
//! Handlers return these instead of panicking; the dispatcher turns each kind
//! into the appropriate player-facing message. `Internal` is the only kind
//! that is logged with full context and hidden behind a generic response.

use thiserror::Error;

use crate::attributes::Resource;
use crate::records::EquipSlot;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A command pattern did not match the input line.
    #[error("{0}")]
    Parse(String),

    /// An argument named something that resolved to nothing in scope.
    #[error("you don't see that here")]
    ScopeMiss,

    /// Admin-only command, or the target has the actor blocked.
    #[error("you may not do that")]
    PermissionDenied,

    #[error("not in a room")]
    NotInRoom,

    #[error("not fighting anyone")]
    NotInCombat,

    #[error("that is already equipped")]
    AlreadyEquipped,

    #[error("the {0:?} slot is occupied")]
    SlotOccupied(EquipSlot),

    /// Adding the object would make a container contain itself.
    #[error("a container cannot end up inside itself")]
    ContainmentCycle,

    #[error("not ready yet ({remaining_ms} ms)")]
    OnCooldown { remaining_ms: u64 },

    #[error("not enough {0}")]
    InsufficientResource(Resource),

    #[error("the target is already dead")]
    TargetDead,

    /// A dungeon id was registered twice.
    #[error("dungeon id {0:?} is already registered")]
    DuplicateDungeonId(String),

    /// An object handle no longer resolves. Usually a stale oid.
    #[error("no such object")]
    MissingObject,

    /// Unexpected invariant violation. Logged in full, reported generically.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The line shown to the acting player for this error.
    pub fn player_message(&self) -> String {
        match self {
            EngineError::Parse(reason) => reason.clone(),
            EngineError::ScopeMiss => "You don't see that here.".into(),
            EngineError::PermissionDenied => "You may not do that.".into(),
            EngineError::NotInRoom => "You are nowhere.".into(),
            EngineError::NotInCombat => "You are not fighting anyone.".into(),
            EngineError::AlreadyEquipped => "You are already using that.".into(),
            EngineError::SlotOccupied(slot) => {
                format!("You are already wearing something on your {}.", slot.label())
            }
            EngineError::ContainmentCycle => {
                "You cannot put a container inside itself.".into()
            }
            EngineError::OnCooldown { .. } => "You are not ready to do that again.".into(),
            EngineError::InsufficientResource(res) => {
                format!("You do not have enough {}.", res.label())
            }
            EngineError::TargetDead => "They are already dead.".into(),
            EngineError::DuplicateDungeonId(id) => {
                format!("A dungeon named {:?} already exists.", id)
            }
            EngineError::MissingObject => "That is no longer there.".into(),
            EngineError::Internal(_) => "Something went wrong.".into(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, EngineError::Internal(_) | EngineError::MissingObject)
    }
}
