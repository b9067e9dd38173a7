//! # Hearth
//!
//! Command line entry point. Loads the TOML configuration, wires the
//! headless collaborators into the protocol server and runs it until
//! SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use hearth::config::HearthConfig;
use hearth::logging;
use hearth::server::{Collaborators, CompositorServer};
use log::{error, info};
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "A client-facing Wayland protocol server")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/hearth/hearth.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Socket name under $XDG_RUNTIME_DIR (overrides the config)
    #[arg(long)]
    socket: Option<String>,

    /// Run without the evdev gamepad poller
    #[arg(long)]
    no_gamepad: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut HearthConfig) {
        if let Some(socket) = &self.socket {
            config.server.socket_name = socket.clone();
            info!("🔌 Socket name overridden via CLI: {}", socket);
        }
        if self.no_gamepad {
            config.gamepad.enabled = false;
            info!("🚫 Gamepad support disabled via CLI flag");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    info!("🚀 Starting Hearth - Wayland protocol server");
    info!(
        "📄 Version: {} ({}, built {})",
        hearth::VERSION,
        env!("HEARTH_GIT_COMMIT"),
        env!("HEARTH_BUILD_DATE")
    );

    let mut config = match HearthConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            HearthConfig::default()
        }
    };
    cli.apply_overrides(&mut config);

    let collaborators = Collaborators::headless(&config);

    info!("🏗️  Initializing Hearth server...");
    let mut server = CompositorServer::new(config, collaborators)?;
    info!("✨ Listening on {}", server.socket_path().display());

    let running = server.running_flag();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
        .context("Failed to install signal handler")?;

    server.run()?;

    info!("👋 Hearth shutting down");
    Ok(())
}
