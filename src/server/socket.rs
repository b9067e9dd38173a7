//! Listening socket setup
//!
//! The socket lives at `$XDG_RUNTIME_DIR/<socket_name>` and is handed to the
//! configured group with the configured permission bits, so that clients in
//! that group can connect.

use crate::config::ServerConfig;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use wayland_server::ListeningSocket;

/// `$XDG_RUNTIME_DIR`, which must be set
pub fn runtime_dir() -> Result<PathBuf> {
    std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("XDG_RUNTIME_DIR is not set"))
}

pub(crate) fn bind(config: &ServerConfig) -> Result<(ListeningSocket, PathBuf)> {
    let path = runtime_dir()?.join(&config.socket_name);
    let listener = ListeningSocket::bind_absolute(path.clone())
        .with_context(|| format!("Failed to bind {}", path.display()))?;

    if !config.socket_group.is_empty() {
        if let Err(e) = set_group(&path, &config.socket_group) {
            warn!("⚠️ Socket stays with the current group: {e:#}");
        }
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(config.socket_mode))
        .with_context(|| format!("Failed to chmod {}", path.display()))?;

    if config.set_wayland_display {
        std::env::set_var("WAYLAND_DISPLAY", &config.socket_name);
        info!("WAYLAND_DISPLAY={}", config.socket_name);
    }
    info!("🔌 Listening on {} (mode {:o})", path.display(), config.socket_mode);
    Ok((listener, path))
}

fn set_group(path: &Path, group: &str) -> Result<()> {
    let name = CString::new(group).context("Group name contains a NUL byte")?;
    let entry = unsafe { libc::getgrnam(name.as_ptr()) };
    if entry.is_null() {
        return Err(anyhow!("group {group:?} does not exist"));
    }
    let gid = unsafe { (*entry).gr_gid };
    let c_path = CString::new(path.as_os_str().as_bytes()).context("Socket path contains a NUL byte")?;
    // uid -1 keeps the owner
    let ret = unsafe { libc::chown(c_path.as_ptr(), libc::uid_t::MAX, gid) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to chown {} to group {group}", path.display()));
    }
    Ok(())
}
