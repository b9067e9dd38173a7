//! Wire encodings of the shell state machine
//!
//! Each shell protocol serializes a [`Configure`] differently. These helpers
//! are pure so that all three frontends stay observably equivalent.

use super::{Configure, WindowState};

/// xdg_toplevel state values
pub const XDG_STATE_MAXIMIZED: u32 = 1;
pub const XDG_STATE_FULLSCREEN: u32 = 2;
pub const XDG_STATE_RESIZING: u32 = 3;
pub const XDG_STATE_ACTIVATED: u32 = 4;

/// zwp_remote_shell_v1 state_type values
pub const REMOTE_STATE_NORMAL: u32 = 1;
pub const REMOTE_STATE_MINIMIZED: u32 = 2;
pub const REMOTE_STATE_MAXIMIZED: u32 = 3;
pub const REMOTE_STATE_FULLSCREEN: u32 = 4;
pub const REMOTE_STATE_PINNED: u32 = 5;

/// wl_shell_surface.configure arguments: edges, width, height
pub fn legacy_configure(configure: &Configure) -> (u32, i32, i32) {
    (0, configure.size.width, configure.size.height)
}

/// xdg_toplevel.configure state array, native-endian u32 values
pub fn xdg_states(configure: &Configure) -> Vec<u8> {
    let mut states = Vec::new();
    match configure.state {
        WindowState::Maximized => states.push(XDG_STATE_MAXIMIZED),
        WindowState::Fullscreen => states.push(XDG_STATE_FULLSCREEN),
        _ => {}
    }
    if configure.resizing {
        states.push(XDG_STATE_RESIZING);
    }
    if configure.activated {
        states.push(XDG_STATE_ACTIVATED);
    }
    states.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

pub fn remote_state_type(state: WindowState) -> u32 {
    match state {
        WindowState::Disabled | WindowState::Normal => REMOTE_STATE_NORMAL,
        WindowState::Minimized => REMOTE_STATE_MINIMIZED,
        WindowState::Maximized => REMOTE_STATE_MAXIMIZED,
        WindowState::Fullscreen => REMOTE_STATE_FULLSCREEN,
        WindowState::Pinned => REMOTE_STATE_PINNED,
    }
}

/// zwp_remote_surface_v1.configure arguments: width, height, state type,
/// activated, serial
pub fn remote_configure(configure: &Configure) -> (i32, i32, u32, u32, u32) {
    (
        configure.size.width,
        configure.size.height,
        remote_state_type(configure.state),
        configure.activated as u32,
        configure.serial,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteTransition {
    SetFullscreen,
    UnsetFullscreen,
    SetMaximized,
    UnsetMaximized,
}

/// Discrete events a remote client receives when the applied state moves
/// from `old` to `new`. Unsets come first.
pub fn remote_transitions(old: WindowState, new: WindowState) -> Vec<RemoteTransition> {
    let mut events = Vec::new();
    if old == new {
        return events;
    }
    if old == WindowState::Fullscreen {
        events.push(RemoteTransition::UnsetFullscreen);
    }
    if old == WindowState::Maximized {
        events.push(RemoteTransition::UnsetMaximized);
    }
    if new == WindowState::Fullscreen {
        events.push(RemoteTransition::SetFullscreen);
    }
    if new == WindowState::Maximized {
        events.push(RemoteTransition::SetMaximized);
    }
    events
}
