//! Configuration management for Hearth
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines settings for the listening socket, the
//! seat, the keyboard layout, statically described displays, gamepad
//! polling and the remote shell.

use crate::shell::LayoutMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration struct containing all Hearth settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HearthConfig {
    /// Listening socket and event loop
    #[serde(default)]
    pub server: ServerConfig,

    /// Seat name and keyboard repeat
    #[serde(default)]
    pub seat: SeatConfig,

    /// XKB layout names
    #[serde(default)]
    pub keymap: KeymapConfig,

    /// Displays announced to clients
    #[serde(default = "HearthConfig::default_outputs")]
    pub outputs: Vec<OutputConfig>,

    /// Background gamepad polling
    #[serde(default)]
    pub gamepad: GamepadConfig,

    /// Remote shell settings
    #[serde(default)]
    pub remote_shell: RemoteShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket file name inside `$XDG_RUNTIME_DIR`
    pub socket_name: String,

    /// Group the socket is handed to (empty = leave as is)
    pub socket_group: String,

    /// Permission bits applied to the socket
    pub socket_mode: u32,

    /// Event loop tick (milliseconds)
    pub dispatch_interval_ms: u64,

    /// Export WAYLAND_DISPLAY for child processes
    pub set_wayland_display: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeatConfig {
    /// Name announced through wl_seat.name
    pub name: String,

    /// Key repeats per second (0 disables repeat)
    pub repeat_rate: i32,

    /// Delay before repeat starts (milliseconds)
    pub repeat_delay: i32,
}

/// RMLVO names handed to xkbcommon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeymapConfig {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: String,
}

/// One statically described display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub dpi: f64,
    pub scale: f64,

    /// Clockwise rotation in degrees (0, 90, 180 or 270)
    pub rotation: u32,

    /// Refresh rate in millihertz
    pub refresh_mhz: i32,

    /// Reserved areas subtracted from the work area
    pub inset_left: i32,
    pub inset_top: i32,
    pub inset_right: i32,
    pub inset_bottom: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GamepadConfig {
    /// Enable the polling thread
    pub enabled: bool,

    /// Sampling interval while a gamepad client has focus (milliseconds)
    pub poll_interval_ms: u64,

    /// Snapshots buffered between the poller and the event loop
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RemoteShellConfig {
    /// Layout mode announced on bind ("windowed" or "tablet")
    pub layout_mode: LayoutMode,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            seat: SeatConfig::default(),
            keymap: KeymapConfig::default(),
            outputs: Self::default_outputs(),
            gamepad: GamepadConfig::default(),
            remote_shell: RemoteShellConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_name: "wayland-0".to_string(),
            socket_group: "wayland".to_string(),
            socket_mode: 0o660,
            dispatch_interval_ms: 4,
            set_wayland_display: true,
        }
    }
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            repeat_rate: 40,
            repeat_delay: 500,
        }
    }
}

impl Default for KeymapConfig {
    fn default() -> Self {
        Self {
            rules: String::new(),
            model: String::new(),
            layout: "us".to_string(),
            variant: String::new(),
            options: String::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: "HEADLESS-1".to_string(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            dpi: 96.0,
            scale: 1.0,
            rotation: 0,
            refresh_mhz: 60_000,
            inset_left: 0,
            inset_top: 0,
            inset_right: 0,
            inset_bottom: 0,
        }
    }
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 16,
            channel_capacity: 4,
        }
    }
}

impl HearthConfig {
    fn default_outputs() -> Vec<OutputConfig> {
        vec![OutputConfig::default()]
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: HearthConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.socket_name.is_empty() || self.server.socket_name.contains('/') {
            anyhow::bail!("Invalid socket_name: {:?}", self.server.socket_name);
        }
        if self.server.socket_mode > 0o777 {
            anyhow::bail!("Invalid socket_mode: {:o}", self.server.socket_mode);
        }
        if self.server.dispatch_interval_ms == 0 {
            anyhow::bail!("Invalid dispatch_interval_ms: must be positive");
        }

        if self.seat.name.is_empty() {
            anyhow::bail!("Invalid seat name: must not be empty");
        }
        if self.seat.repeat_rate < 0 || self.seat.repeat_delay < 0 {
            anyhow::bail!(
                "Invalid key repeat: rate {} delay {}",
                self.seat.repeat_rate,
                self.seat.repeat_delay
            );
        }

        for output in &self.outputs {
            if output.width <= 0 || output.height <= 0 {
                anyhow::bail!(
                    "Invalid size for output {}: {}x{}",
                    output.name,
                    output.width,
                    output.height
                );
            }
            if output.scale <= 0.0 || output.dpi <= 0.0 {
                anyhow::bail!("Invalid scale or dpi for output {}", output.name);
            }
            if ![0, 90, 180, 270].contains(&output.rotation) {
                anyhow::bail!(
                    "Invalid rotation for output {}: {}",
                    output.name,
                    output.rotation
                );
            }
            let insets = [
                output.inset_left,
                output.inset_top,
                output.inset_right,
                output.inset_bottom,
            ];
            if insets.iter().any(|i| *i < 0)
                || output.inset_left + output.inset_right >= output.width
                || output.inset_top + output.inset_bottom >= output.height
            {
                anyhow::bail!("Invalid work area insets for output {}", output.name);
            }
        }

        if self.gamepad.poll_interval_ms == 0 {
            anyhow::bail!("Invalid gamepad poll_interval_ms: must be positive");
        }
        if self.gamepad.channel_capacity == 0 {
            anyhow::bail!("Invalid gamepad channel_capacity: must be positive");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}

/// Expand ~ to home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}
