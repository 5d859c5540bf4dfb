//! Server library crate: the world simulation engine.
//!
//! The binary in `main.rs` wires a [`server::Server`] to a TCP listener; the
//! modules here are the engine proper and are exercised directly by the test
//! suite without any sockets.

#[macro_use]
pub mod helpers;

pub mod act;
pub mod character;
pub mod combat;
pub mod command;
pub mod config;
pub mod content;
pub mod effect;
pub mod login;
pub mod npc;
pub mod persist;
pub mod server;
pub mod spawn;
pub mod world;
