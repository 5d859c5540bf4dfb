//! The game server: socket plumbing and the single-threaded tick loop.
//!
//! Everything that mutates the world runs here, on one thread, in a fixed
//! per-tick order: network input, login machines, queued command lines,
//! effect timers, combat rounds, wander and reset pulses, autosave, then
//! outbound flush. The network layer is non-blocking and never suspends a
//! world mutation halfway.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dusk_core::attributes::display_stat;
use dusk_core::constants::{MAX_LINE_BYTES, TICK_MS};
use dusk_core::message::MessageGroup;
use dusk_core::style::StyledString;

use crate::character::OutboundLine;
use crate::command::CommandRegistry;
use crate::config::ServerConfig;
use crate::content;
use crate::login::{self, LoginState, LoginStep};
use crate::persist;
use crate::world::{CharacterId, World};

struct Connection {
    id: u64,
    stream: TcpStream,
    state: LoginState,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>,
    last_activity_ms: u64,
    /// Flush what remains, then drop the connection.
    closing: bool,
}

impl Connection {
    fn character(&self) -> Option<CharacterId> {
        match self.state {
            LoginState::Playing { character } => Some(character),
            _ => None,
        }
    }
}

pub struct Server {
    listener: Option<TcpListener>,
    connections: Vec<Connection>,
    next_connection_id: u64,
    pub world: World,
    pub registry: CommandRegistry,
    epoch: Instant,
    next_combat_ms: u64,
    next_wander_ms: u64,
    next_reset_ms: u64,
    next_autosave_ms: u64,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self, dusk_core::error::EngineError> {
        let (world, registry) = content::build_world(config)?;
        Ok(Server {
            listener: None,
            connections: Vec::new(),
            next_connection_id: 1,
            world,
            registry,
            epoch: Instant::now(),
            next_combat_ms: 0,
            next_wander_ms: 0,
            next_reset_ms: 0,
            next_autosave_ms: 0,
        })
    }

    /// Bind the listener. Separated from `new` so tests can run a server
    /// with no socket at all.
    pub fn bind(&mut self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.world.config.bind_addr)?;
        listener.set_nonblocking(true)?;
        log::info!("listening on {}", self.world.config.bind_addr);
        self.listener = Some(listener);
        Ok(())
    }

    /// The bound address, for tests that connect to an ephemeral port.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Run until the quit flag trips, then save and close everything down.
    pub fn run(&mut self, quit: Arc<AtomicBool>) {
        log::info!("entering main loop");
        while !quit.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick();
            if self.world.copyover_requested {
                log::warn!("copyover requested; leaving the loop for the orchestrator");
                break;
            }
            let elapsed = started.elapsed();
            let budget = Duration::from_millis(TICK_MS);
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            } else {
                log::warn!("tick overran: {:?}", elapsed);
            }
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        log::info!("shutting down; saving {} character(s)", self.world.characters.len());
        let failures = persist::save_all(&self.world);
        if failures > 0 {
            log::error!("{} character save(s) failed; shutdown is best-effort", failures);
        }
        let ids: Vec<CharacterId> = self.connections.iter().filter_map(|c| c.character()).collect();
        for id in ids {
            login::handle_disconnect(&mut self.world, id);
        }
        self.connections.clear();
        log::info!("shutdown complete");
    }

    /// One pass of the engine. Public so tests can drive time by hand.
    pub fn tick(&mut self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.world.advance_clock_to(now);

        self.accept_new();
        self.pump_input();

        crate::effect::run_due_timers(&mut self.world);

        if now >= self.next_combat_ms {
            crate::combat::process_combat_round(&mut self.world);
            self.world.regenerate_all();
            self.next_combat_ms = now + self.world.config.combat_round_ms;
        }
        if now >= self.next_wander_ms {
            crate::npc::wander_pulse(&mut self.world);
            self.next_wander_ms = now + self.world.config.wander_pulse_ms;
        }
        if now >= self.next_reset_ms {
            crate::spawn::run_resets(&mut self.world);
            self.next_reset_ms = now + self.world.config.reset_pulse_ms;
        }
        if now >= self.next_autosave_ms {
            persist::autosave(&self.world);
            self.next_autosave_ms = now + self.world.config.autosave_ms;
        }

        self.drain_quits();
        self.enforce_timeouts(now);
        self.flush_output();
        self.sweep_closed();
    }

    fn accept_new(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let id = self.next_connection_id;
                    self.next_connection_id += 1;
                    log::info!("connection {} from {}", id, addr);
                    let mut connection = Connection {
                        id,
                        stream,
                        state: LoginState::AwaitingUsername,
                        inbuf: Vec::new(),
                        outbuf: Vec::new(),
                        last_activity_ms: self.world.clock_ms,
                        closing: false,
                    };
                    queue_raw(&mut connection, &login::greeting(), true);
                    self.connections.push(connection);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn pump_input(&mut self) {
        let mut buffer = [0u8; 1024];
        for index in 0..self.connections.len() {
            if self.connections[index].closing {
                continue;
            }
            loop {
                match self.connections[index].stream.read(&mut buffer) {
                    Ok(0) => {
                        log::info!("connection {} closed by peer", self.connections[index].id);
                        self.connections[index].closing = true;
                        break;
                    }
                    Ok(n) => {
                        self.connections[index].inbuf.extend_from_slice(&buffer[..n]);
                        if self.connections[index].inbuf.len() > MAX_LINE_BYTES * 4 {
                            // A peer streaming garbage without newlines.
                            log::warn!(
                                "connection {} flooded the line buffer",
                                self.connections[index].id
                            );
                            self.connections[index].closing = true;
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        log::info!(
                            "connection {} read error: {}",
                            self.connections[index].id,
                            e
                        );
                        self.connections[index].closing = true;
                        break;
                    }
                }
            }

            while let Some(line) = take_line(&mut self.connections[index].inbuf) {
                self.connections[index].last_activity_ms = self.world.clock_ms;
                self.handle_line(index, &line);
            }
        }
    }

    fn handle_line(&mut self, index: usize, line: &str) {
        if line.len() > MAX_LINE_BYTES {
            queue_raw(&mut self.connections[index], "Line too long.", true);
            return;
        }

        match self.connections[index].state.clone() {
            LoginState::Playing { character } => {
                let Some(actor) =
                    self.world.character(character).map(|c| c.mob)
                else {
                    self.connections[index].closing = true;
                    return;
                };
                if !line.trim().is_empty() {
                    self.registry.dispatch(&mut self.world, actor, line);
                }
                self.send_prompt(character);
            }
            _ => {
                let connection_id = self.connections[index].id;
                let mut state = self.connections[index].state.clone();
                let step = login::advance(&mut self.world, &mut state, connection_id, line);
                self.connections[index].state = state;
                match step {
                    LoginStep::Reply(text) => {
                        if !text.is_empty() {
                            queue_raw(&mut self.connections[index], &text, true);
                        }
                    }
                    LoginStep::Entered(character) => {
                        self.send_prompt(character);
                    }
                    LoginStep::Close(text) => {
                        queue_raw(&mut self.connections[index], &text, true);
                        self.connections[index].closing = true;
                    }
                }
            }
        }
    }

    /// Per-line prompt, suppressed in brief mode.
    fn send_prompt(&mut self, character: CharacterId) {
        let Some(ch) = self.world.character(character) else {
            return;
        };
        if ch.settings.brief {
            return;
        }
        let mob = ch.mob;
        let (health, mana) = self
            .world
            .object(mob)
            .and_then(|o| o.mob())
            .map(|m| (m.health, m.mana))
            .unwrap_or((0.0, 0.0));
        let prompt = format!("{{w<{}h {}m>{{d ", display_stat(health), display_stat(mana));
        crate::act::send_to_mob(&mut self.world, mob, &prompt, MessageGroup::Prompt);
    }

    fn drain_quits(&mut self) {
        let quits: Vec<CharacterId> = self.world.pending_quits.drain(..).collect();
        for id in quits {
            if let Err(err) = persist::save_character(&self.world, id) {
                log::error!("save on quit for {:?} failed: {}", id, err);
            }
            if let Some(index) = self.connections.iter().position(|c| c.character() == Some(id)) {
                self.connections[index].closing = true;
            }
            login::handle_disconnect(&mut self.world, id);
        }
    }

    fn enforce_timeouts(&mut self, now: u64) {
        let timeout = self.world.config.inactivity_timeout_ms;
        let mut timed_out = Vec::new();
        for connection in &mut self.connections {
            if connection.closing {
                continue;
            }
            if now.saturating_sub(connection.last_activity_ms) > timeout {
                log::info!("connection {} idled out", connection.id);
                queue_raw(connection, "The dusk closes over your idle form.", true);
                connection.closing = true;
                if let Some(id) = connection.character() {
                    timed_out.push(id);
                }
            }
        }
        for id in timed_out {
            if let Err(err) = persist::save_character(&self.world, id) {
                log::error!("save on idle-timeout for {:?} failed: {}", id, err);
            }
            login::handle_disconnect(&mut self.world, id);
        }
    }

    /// Move session outbound lines into per-connection byte buffers, then
    /// push bytes at the sockets.
    fn flush_output(&mut self) {
        for index in 0..self.connections.len() {
            if let Some(character) = self.connections[index].character() {
                let (lines, color) = match self.world.character_mut(character) {
                    Some(ch) => {
                        let color = ch.settings.color;
                        let lines: Vec<OutboundLine> = match ch.session.as_mut() {
                            Some(session) => session.outbound.drain(..).collect(),
                            None => Vec::new(),
                        };
                        (lines, color)
                    }
                    None => (Vec::new(), true),
                };
                for line in lines {
                    let styled = StyledString::new(line.text);
                    let rendered =
                        if color { styled.render_ansi() } else { styled.strip() };
                    // Prompts sit on their own partial line.
                    let newline = line.group != MessageGroup::Prompt;
                    queue_raw(&mut self.connections[index], &rendered, newline);
                }
            }

            let connection = &mut self.connections[index];
            if connection.outbuf.is_empty() {
                continue;
            }
            match connection.stream.write(&connection.outbuf) {
                Ok(0) => {
                    connection.closing = true;
                    connection.outbuf.clear();
                }
                Ok(written) => {
                    connection.outbuf.drain(..written);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::info!("connection {} write error: {}", connection.id, e);
                    connection.closing = true;
                    connection.outbuf.clear();
                }
            }
        }
    }

    fn sweep_closed(&mut self) {
        let mut index = 0;
        while index < self.connections.len() {
            let done = self.connections[index].closing && self.connections[index].outbuf.is_empty();
            let dead = self.connections[index].closing;
            if done || (dead && self.connections[index].outbuf.len() > 64 * 1024) {
                let connection = self.connections.swap_remove(index);
                // A player connection dropping without `quit` still saves.
                if let Some(id) = connection.character() {
                    if self.world.character(id).map_or(false, |c| c.session.is_some()) {
                        if let Err(err) = persist::save_character(&self.world, id) {
                            log::error!("save on disconnect for {:?} failed: {}", id, err);
                        }
                        login::handle_disconnect(&mut self.world, id);
                    }
                }
                let _ = connection.stream.shutdown(std::net::Shutdown::Both);
            } else {
                index += 1;
            }
        }
    }
}

/// Append a rendered line (or partial line) to a connection's byte buffer.
fn queue_raw(connection: &mut Connection, text: &str, newline: bool) {
    connection.outbuf.extend_from_slice(text.as_bytes());
    if newline {
        connection.outbuf.extend_from_slice(b"\r\n");
    }
}

/// Extract one newline-terminated line from the buffer, trimmed of carriage
/// returns and decoded lossily.
fn take_line(inbuf: &mut Vec<u8>) -> Option<String> {
    let pos = inbuf.iter().position(|b| *b == b'\n')?;
    let mut raw: Vec<u8> = inbuf.drain(..=pos).collect();
    raw.pop(); // the newline
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    Some(String::from_utf8_lossy(&raw).trim().to_string())
}

/// Install the quit flag flipped by Ctrl-C.
pub fn install_quit_flag() -> Arc<AtomicBool> {
    let quit = Arc::new(AtomicBool::new(false));
    let handler_flag = quit.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            log::info!("still shutting down, hold on");
        } else {
            log::info!("shutdown signal received");
        }
    }) {
        log::error!("failed to install signal handler: {}", err);
    }
    quit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_splits_and_trims() {
        let mut buf = b"look east\r\nnorth\nleft".to_vec();
        assert_eq!(take_line(&mut buf), Some("look east".to_string()));
        assert_eq!(take_line(&mut buf), Some("north".to_string()));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(buf, b"left".to_vec());
    }

    #[test]
    fn take_line_handles_bare_newlines_and_junk_bytes() {
        let mut buf = b"\n\xff\xfe\n".to_vec();
        assert_eq!(take_line(&mut buf), Some(String::new()));
        let junk = take_line(&mut buf).unwrap();
        assert!(!junk.is_empty(), "lossy decode keeps replacement chars");
        assert_eq!(take_line(&mut buf), None);
    }

    #[test]
    fn loopback_login_and_look() {
        let mut config = ServerConfig::default();
        config.bind_addr = "127.0.0.1:0".into();
        let dir = tempfile::tempdir().unwrap();
        config.save_dir = dir.path().to_string_lossy().to_string();

        let mut server = Server::new(config).unwrap();
        server.bind().unwrap();
        let addr = server.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        let mut received = String::new();
        let mut pump = |server: &mut Server, client: &mut TcpStream, received: &mut String| {
            for _ in 0..20 {
                server.tick();
                let mut buf = [0u8; 4096];
                match client.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => received.push_str(&String::from_utf8_lossy(&buf[..n])),
                    Err(_) => {}
                }
            }
        };

        pump(&mut server, &mut client, &mut received);
        assert!(received.contains("name"), "greeting arrives: {:?}", received);

        client.write_all(b"Resa\r\n").unwrap();
        pump(&mut server, &mut client, &mut received);
        assert!(received.contains("password"), "creation branch: {:?}", received);

        client.write_all(b"opensesame\r\n").unwrap();
        pump(&mut server, &mut client, &mut received);
        assert!(
            received.contains("Graveyard of Dusk"),
            "login lands in the start room: {:?}",
            received
        );

        received.clear();
        client.write_all(b"look\r\n").unwrap();
        pump(&mut server, &mut client, &mut received);
        assert!(received.contains("Graveyard of Dusk"));
        assert!(received.contains("Exits"), "room render includes exits: {:?}", received);

        // Quit saves the character and closes the socket.
        client.write_all(b"quit\r\n").unwrap();
        pump(&mut server, &mut client, &mut received);
        assert!(persist::load_record(dir.path(), "resa").is_some());
    }
}
