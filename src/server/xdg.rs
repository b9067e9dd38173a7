//! xdg_wm_base, xdg_positioner, xdg_surface, xdg_toplevel and xdg_popup
//!
//! xdg_surface and xdg_positioner have no counterpart in the core. The
//! xdg_surface remembers its wl_surface and, once constructed, the shell
//! surface of its role; the positioner accumulates placement rules until a
//! popup consumes them.

use super::{object_of, report, report_with, ServerState};
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::{Point, Rect, Size};
use crate::registry::{ClientId, ObjectId};
use crate::shell::flavor::xdg_states;
use crate::shell::{Configure, Interaction, ResizeEdge, ShellFlavor, ShellSurfaceDelegate, WindowState};
use crate::surface::Role;
use log::trace;
use parking_lot::Mutex;
use wayland_protocols::xdg::shell::server::{xdg_popup, xdg_positioner, xdg_surface, xdg_toplevel, xdg_wm_base};
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

/// Popup placement rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Positioner {
    size: Size,
    anchor_rect: Option<Rect>,
    anchor: u32,
    gravity: u32,
    offset: Point,
}

// Shared value layout of xdg_positioner.anchor and xdg_positioner.gravity
const TOP: u32 = 1;
const BOTTOM: u32 = 2;
const LEFT: u32 = 3;
const RIGHT: u32 = 4;
const TOP_LEFT: u32 = 5;
const BOTTOM_LEFT: u32 = 6;
const TOP_RIGHT: u32 = 7;
const BOTTOM_RIGHT: u32 = 8;

impl Positioner {
    fn is_complete(&self) -> bool {
        !self.size.is_empty() && self.anchor_rect.is_some()
    }

    /// Popup bounds relative to the parent's window geometry
    pub(crate) fn placement(&self) -> Rect {
        let rect = self.anchor_rect.unwrap_or_default();
        let anchor_x = match self.anchor {
            LEFT | TOP_LEFT | BOTTOM_LEFT => rect.x,
            RIGHT | TOP_RIGHT | BOTTOM_RIGHT => rect.right(),
            _ => rect.x + rect.width / 2,
        };
        let anchor_y = match self.anchor {
            TOP | TOP_LEFT | TOP_RIGHT => rect.y,
            BOTTOM | BOTTOM_LEFT | BOTTOM_RIGHT => rect.bottom(),
            _ => rect.y + rect.height / 2,
        };
        let Size { width, height } = self.size;
        let x = match self.gravity {
            LEFT | TOP_LEFT | BOTTOM_LEFT => anchor_x - width,
            RIGHT | TOP_RIGHT | BOTTOM_RIGHT => anchor_x,
            _ => anchor_x - width / 2,
        };
        let y = match self.gravity {
            TOP | TOP_LEFT | TOP_RIGHT => anchor_y - height,
            BOTTOM | BOTTOM_LEFT | BOTTOM_RIGHT => anchor_y,
            _ => anchor_y - height / 2,
        };
        Rect::new(x + self.offset.x, y + self.offset.y, width, height)
    }
}

pub(crate) struct XdgSurfaceData {
    wm_base: ObjectId,
    surface: ObjectId,
    /// The toplevel or popup shell surface, once constructed
    role: Mutex<Option<ObjectId>>,
}

struct StableToplevel {
    toplevel: xdg_toplevel::XdgToplevel,
    surface: xdg_surface::XdgSurface,
}

impl ShellSurfaceDelegate for StableToplevel {
    fn configure(&mut self, configure: &Configure) {
        self.toplevel
            .configure(configure.size.width, configure.size.height, xdg_states(configure));
        self.surface.configure(configure.serial);
    }

    fn close(&mut self) {
        self.toplevel.close();
    }
}

struct StablePopup {
    popup: xdg_popup::XdgPopup,
    surface: xdg_surface::XdgSurface,
}

impl ShellSurfaceDelegate for StablePopup {
    fn configure(&mut self, configure: &Configure) {
        self.popup.configure(
            configure.origin.x,
            configure.origin.y,
            configure.size.width,
            configure.size.height,
        );
        self.surface.configure(configure.serial);
    }

    fn popup_done(&mut self) {
        self.popup.popup_done();
    }
}

impl GlobalDispatch<xdg_wm_base::XdgWmBase, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<xdg_wm_base::XdgWmBase>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let wm_base = state.bind_global(client, resource, data_init);
        state.pings.wm_bases.push(wm_base);
    }
}

impl Dispatch<xdg_wm_base::XdgWmBase, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &xdg_wm_base::XdgWmBase,
        request: xdg_wm_base::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_wm_base::Request::CreatePositioner { id } => {
                data_init.init(id, Mutex::new(Positioner::default()));
            }
            xdg_wm_base::Request::GetXdgSurface { id, surface } => {
                let known = object_of(&surface);
                data_init.init(
                    id,
                    XdgSurfaceData {
                        wm_base: *data,
                        surface: known.unwrap_or_else(|| state.compositor.allocate_id()),
                        role: Mutex::new(None),
                    },
                );
                if known.is_none() {
                    resource.post_error(xdg_wm_base::Error::InvalidSurfaceState, "unknown surface");
                }
            }
            xdg_wm_base::Request::Pong { serial } => trace!("{} answered ping {serial}", resource.id()),
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &xdg_wm_base::XdgWmBase, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

fn enum_value<E: Into<u32>>(value: WEnum<E>) -> u32 {
    match value {
        WEnum::Value(value) => value.into(),
        WEnum::Unknown(raw) => raw,
    }
}

impl Dispatch<xdg_positioner::XdgPositioner, Mutex<Positioner>> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &xdg_positioner::XdgPositioner,
        request: xdg_positioner::Request,
        data: &Mutex<Positioner>,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let mut positioner = data.lock();
        match request {
            xdg_positioner::Request::SetSize { width, height } => {
                if width <= 0 || height <= 0 {
                    resource.post_error(
                        xdg_positioner::Error::InvalidInput,
                        format!("invalid size {width}x{height}"),
                    );
                    return;
                }
                positioner.size = Size::new(width, height);
            }
            xdg_positioner::Request::SetAnchorRect { x, y, width, height } => {
                if width <= 0 || height <= 0 {
                    resource.post_error(
                        xdg_positioner::Error::InvalidInput,
                        format!("invalid anchor rectangle {width}x{height}"),
                    );
                    return;
                }
                positioner.anchor_rect = Some(Rect::new(x, y, width, height));
            }
            xdg_positioner::Request::SetAnchor { anchor } => positioner.anchor = enum_value(anchor),
            xdg_positioner::Request::SetGravity { gravity } => positioner.gravity = enum_value(gravity),
            xdg_positioner::Request::SetOffset { x, y } => positioner.offset = Point::new(x, y),
            _ => {}
        }
    }
}

impl XdgSurfaceData {
    /// Posts `already_constructed` when the role slot is taken
    fn unconstructed(&self, resource: &xdg_surface::XdgSurface) -> bool {
        if self.role.lock().is_some() {
            resource.post_error(
                xdg_surface::Error::AlreadyConstructed,
                "xdg_surface already has a role object",
            );
            return false;
        }
        true
    }

    /// Fills the role slot once the core accepted the role object
    fn constructed_with<T>(&self, role: ObjectId, result: &ProtocolResult<T>) {
        if result.is_ok() {
            *self.role.lock() = Some(role);
        }
    }

    fn role(&self) -> Option<ObjectId> {
        *self.role.lock()
    }
}

impl Dispatch<xdg_surface::XdgSurface, XdgSurfaceData> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &xdg_surface::XdgSurface,
        request: xdg_surface::Request,
        data: &XdgSurfaceData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            xdg_surface::Request::GetToplevel { id } => {
                let shell_id = state.compositor.allocate_id();
                let toplevel = data_init.init(id, shell_id);
                if !data.unconstructed(resource) {
                    return;
                }
                let Some(owner) = state.caller(client, data.surface) else {
                    return;
                };
                let delegate = StableToplevel {
                    toplevel: toplevel.clone(),
                    surface: resource.clone(),
                };
                let result = state.compositor.create_shell_surface(
                    owner,
                    data.wm_base,
                    shell_id,
                    toplevel.id().protocol_id(),
                    data.surface,
                    Role::Toplevel,
                    ShellFlavor::Stable,
                    Box::new(delegate),
                );
                data.constructed_with(shell_id, &result);
                let result =
                    result.and_then(|()| state.compositor.map(owner, shell_id, WindowState::Normal));
                report(resource, result, xdg_wm_base::Error::Role);
            }
            xdg_surface::Request::GetPopup { id, parent, positioner } => {
                let shell_id = state.compositor.allocate_id();
                let popup = data_init.init(id, shell_id);
                if !data.unconstructed(resource) {
                    return;
                }
                let Some(owner) = state.caller(client, data.surface) else {
                    return;
                };
                let Some(placement) = positioner.data::<Mutex<Positioner>>().map(|p| *p.lock()) else {
                    return;
                };
                if !placement.is_complete() {
                    resource.post_error(
                        xdg_wm_base::Error::InvalidPositioner,
                        "positioner needs a size and an anchor rectangle",
                    );
                    return;
                }
                let parent = parent
                    .as_ref()
                    .and_then(|p| p.data::<XdgSurfaceData>())
                    .and_then(XdgSurfaceData::role);
                let delegate = StablePopup {
                    popup: popup.clone(),
                    surface: resource.clone(),
                };
                let result = match parent {
                    Some(parent) => state.compositor.create_popup(
                        owner,
                        data.wm_base,
                        shell_id,
                        popup.id().protocol_id(),
                        data.surface,
                        parent,
                        placement.placement(),
                        ShellFlavor::Stable,
                        Box::new(delegate),
                    ),
                    None => Err(ProtocolError::InvalidParent(data.surface)),
                };
                data.constructed_with(shell_id, &result);
                report_with(resource, result, |e| match e {
                    ProtocolError::InvalidParent(_) => xdg_wm_base::Error::InvalidPopupParent.into(),
                    _ => xdg_wm_base::Error::Role.into(),
                });
            }
            xdg_surface::Request::SetWindowGeometry { x, y, width, height } => {
                let Some((owner, role)) = constructed(state, client, resource, data) else {
                    return;
                };
                let result = state
                    .compositor
                    .set_window_geometry(owner, role, Rect::new(x, y, width, height));
                report(resource, result, 0u32);
            }
            xdg_surface::Request::AckConfigure { serial } => {
                let Some((owner, role)) = constructed(state, client, resource, data) else {
                    return;
                };
                let result = state.compositor.ack_configure(owner, role, serial);
                report(resource, result, 0u32);
            }
            _ => {}
        }
    }
}

/// Caller and role of an xdg_surface that must already be constructed
fn constructed(
    state: &ServerState,
    client: &Client,
    resource: &xdg_surface::XdgSurface,
    data: &XdgSurfaceData,
) -> Option<(ClientId, ObjectId)> {
    let Some(role) = data.role() else {
        resource.post_error(xdg_surface::Error::NotConstructed, "xdg_surface has no role yet");
        return None;
    };
    state.caller(client, role).map(|owner| (owner, role))
}

impl Dispatch<xdg_toplevel::XdgToplevel, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &xdg_toplevel::XdgToplevel,
        request: xdg_toplevel::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let id = *data;
        let Some(owner) = state.caller(client, id) else {
            return;
        };
        let result = match request {
            xdg_toplevel::Request::SetParent { parent } => {
                let parent = parent.as_ref().and_then(object_of);
                state.compositor.set_parent(owner, id, parent)
            }
            xdg_toplevel::Request::SetTitle { title } => state.compositor.set_title(owner, id, &title),
            xdg_toplevel::Request::SetAppId { app_id } => state.compositor.set_app_id(owner, id, &app_id),
            xdg_toplevel::Request::Move { .. } => state.compositor.start_interaction(owner, id, Interaction::Move),
            xdg_toplevel::Request::Resize { edges, .. } => ResizeEdge::from_bits(enum_value(edges))
                .and_then(|edge| state.compositor.start_interaction(owner, id, Interaction::Resize(edge))),
            xdg_toplevel::Request::SetMaxSize { width, height } => {
                state.compositor.set_max_size(owner, id, Size::new(width, height))
            }
            xdg_toplevel::Request::SetMinSize { width, height } => {
                state.compositor.set_min_size(owner, id, Size::new(width, height))
            }
            xdg_toplevel::Request::SetMaximized => {
                state.compositor.request_state(owner, id, WindowState::Maximized)
            }
            xdg_toplevel::Request::UnsetMaximized | xdg_toplevel::Request::UnsetFullscreen => {
                state.compositor.request_state(owner, id, WindowState::Normal)
            }
            xdg_toplevel::Request::SetFullscreen { .. } => {
                state.compositor.request_state(owner, id, WindowState::Fullscreen)
            }
            xdg_toplevel::Request::SetMinimized => {
                state.compositor.request_state(owner, id, WindowState::Minimized)
            }
            _ => Ok(()),
        };
        report(resource, result, xdg_wm_base::Error::InvalidSurfaceState);
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &xdg_toplevel::XdgToplevel, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<xdg_popup::XdgPopup, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &xdg_popup::XdgPopup,
        request: xdg_popup::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let xdg_popup::Request::Grab { serial, .. } = request {
            trace!("{} grab with serial {serial}, popups never grab", resource.id());
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &xdg_popup::XdgPopup, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}
