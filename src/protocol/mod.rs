//! Server-side bindings for the non-upstream protocol extensions
//!
//! The core Wayland interfaces come from `wayland-server` and the upstream
//! extensions (xdg-shell, linux-dmabuf, viewporter) from `wayland-protocols`.
//! The extensions below are generated at compile time from the XML files in
//! `protocols/` with `wayland-scanner`.
//!
//! - [`remote_shell`]: window management owned by an embedding host
//! - [`gaming_input`]: gamepad state for the focused client
//! - [`secure_output`]: hide a surface from insecure outputs
//! - [`alpha_compositing`]: per-surface blending equation and alpha
//! - [`vsync_feedback`]: vsync timebase and refresh interval
//! - [`stylus`]: tool type, force and tilt for a wl_pointer

#![allow(missing_docs, clippy::all)]

pub mod remote_shell {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/remote-shell-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/remote-shell-unstable-v1.xml");
}

pub mod gaming_input {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/gaming-input-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/gaming-input-unstable-v1.xml");
}

pub mod secure_output {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/secure-output-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/secure-output-unstable-v1.xml");
}

pub mod alpha_compositing {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/alpha-compositing-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/alpha-compositing-unstable-v1.xml");
}

pub mod vsync_feedback {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/vsync-feedback-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/vsync-feedback-unstable-v1.xml");
}

pub mod stylus {
    use wayland_server;
    use wayland_server::protocol::*;

    pub mod __interfaces {
        use wayland_server::backend as wayland_backend;
        use wayland_server::protocol::__interfaces::*;
        wayland_scanner::generate_interfaces!("protocols/stylus-unstable-v1.xml");
    }
    use self::__interfaces::*;

    wayland_scanner::generate_server_code!("protocols/stylus-unstable-v1.xml");
}
