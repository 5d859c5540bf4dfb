//! Runtime configuration.
//!
//! External config-file loading is an orchestrator concern; `main` builds one
//! of these and hands it to the server. Defaults come from the shared
//! constants so tests and the binary agree.

use dusk_core::constants;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address for the line protocol.
    pub bind_addr: String,
    /// Room reference new and roomless characters start in.
    pub start_room: String,
    /// Room reference players respawn in after death.
    pub graveyard_room: String,
    /// Milliseconds of silence before a connection is dropped.
    pub inactivity_timeout_ms: u64,
    /// Milliseconds between autosaves of active characters.
    pub autosave_ms: u64,
    /// Milliseconds between combat rounds.
    pub combat_round_ms: u64,
    /// Milliseconds between wander pulses.
    pub wander_pulse_ms: u64,
    /// Milliseconds between reset sweeps.
    pub reset_pulse_ms: u64,
    /// Failed passwords allowed before the connection closes.
    pub max_login_attempts: u32,
    /// Keep link-dead mobs in the world instead of parking them.
    pub linkdead: bool,
    /// Wall-clock budget for one command handler.
    pub command_budget_ms: u64,
    /// Directory character snapshots are written to.
    pub save_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:5555".into(),
            start_room: "@duskhaven{0,0,0}".into(),
            graveyard_room: "@duskhaven{0,0,0}".into(),
            inactivity_timeout_ms: constants::INACTIVITY_TIMEOUT_MS,
            autosave_ms: constants::AUTOSAVE_MS,
            combat_round_ms: constants::COMBAT_ROUND_MS,
            wander_pulse_ms: constants::WANDER_PULSE_MS,
            reset_pulse_ms: constants::RESET_PULSE_MS,
            max_login_attempts: constants::MAX_LOGIN_ATTEMPTS,
            linkdead: false,
            command_budget_ms: constants::COMMAND_BUDGET_MS,
            save_dir: ".save".into(),
        }
    }
}
