//! # Hearth
//!
//! A client-facing Wayland protocol server. Clients connect over a Unix
//! socket and speak the core protocol plus the stable and remote shells;
//! the server keeps every piece of protocol state in a transport-agnostic
//! scene core and hands committed content to a pluggable renderer.
//!
//! ## Architecture
//!
//! - `registry`: object identity, ownership and destruction
//! - `compositor`: the scene core context every request operates on
//! - `surface`: pending/committed surface state, sub-surfaces, extensions
//! - `buffer`: shared-memory and dma-buf pixel buffers
//! - `shell`: window state machine shared by all shell protocols
//! - `seat`: pointer, keyboard, touch and gamepad routing
//! - `output`: display metrics published to clients
//! - `vsync`: vsync timebase and interval feedback
//! - `poller`: background gamepad polling thread
//! - `server`: the Wayland socket frontend built on `wayland-server`
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hearth::config::HearthConfig;
//! use hearth::server::{Collaborators, CompositorServer};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = HearthConfig::default();
//!     let collaborators = Collaborators::headless(&config);
//!     let mut server = CompositorServer::new(config, collaborators)?;
//!     server.run()
//! }
//! ```

pub mod buffer;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod host;
pub mod logging;
pub mod output;
pub mod poller;
pub mod properties;
pub mod protocol;
pub mod region;
pub mod registry;
pub mod seat;
pub mod server;
pub mod shell;
pub mod surface;
pub mod vsync;

pub use compositor::Compositor;
pub use config::HearthConfig;
pub use server::CompositorServer;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Hearth
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[cfg(test)]
pub(crate) mod test_support;
