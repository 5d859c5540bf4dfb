use std::process;

use dusk_server::config::ServerConfig;
use dusk_server::server::{install_quit_flag, Server};

fn main() -> Result<(), String> {
    dusk_core::initialize_logger(log::LevelFilter::Info, Some("dusk-server.log")).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {}. Exiting.", e);
            process::exit(1);
        },
    );

    log::info!("Starting Duskhaven server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Process PID: {}", process::id());

    let quit = install_quit_flag();

    let config = ServerConfig::default();
    let mut server = Server::new(config).map_err(|e| e.to_string())?;
    server
        .bind()
        .map_err(|e| format!("failed to bind listener: {}", e))?;

    server.run(quit);

    if server.world.copyover_requested {
        log::info!("exiting for copyover; the instance manager restarts us");
    }
    log::info!("Server exited cleanly.");
    Ok(())
}
