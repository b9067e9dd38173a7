//! wl_shell and wl_shell_surface

use super::{object_of, report, ServerState};
use crate::error::ProtocolResult;
use crate::geometry::Point;
use crate::registry::{ClientId, ObjectId};
use crate::shell::flavor::legacy_configure;
use crate::shell::{Configure, Interaction, ResizeEdge, ShellFlavor, ShellSurfaceDelegate, WindowState};
use crate::surface::Role;
use log::trace;
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::{wl_shell, wl_shell_surface, wl_surface};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

struct LegacyShellSurface(wl_shell_surface::WlShellSurface);

impl ShellSurfaceDelegate for LegacyShellSurface {
    fn configure(&mut self, configure: &Configure) {
        let (edges, width, height) = legacy_configure(configure);
        self.0
            .configure(wl_shell_surface::Resize::from_bits_truncate(edges), width, height);
    }

    fn popup_done(&mut self) {
        self.0.popup_done();
    }
}

impl GlobalDispatch<wl_shell::WlShell, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_shell::WlShell>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<wl_shell::WlShell, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_shell::WlShell,
        request: wl_shell::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shell::Request::GetShellSurface { id, surface } = request {
            let shell_id = state.compositor.allocate_id();
            let shell = data_init.init(id, shell_id);
            let (Some(owner), Some(surface)) = (ServerState::client_id(client), object_of(&surface)) else {
                return;
            };
            let result = state.compositor.create_shell_surface(
                owner,
                *data,
                shell_id,
                shell.id().protocol_id(),
                surface,
                Role::Toplevel,
                ShellFlavor::Legacy,
                Box::new(LegacyShellSurface(shell.clone())),
            );
            if result.is_ok() {
                state.pings.legacy.push(shell);
            }
            report(resource, result, wl_shell::Error::Role);
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_shell::WlShell, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

fn resize_edges(edges: WEnum<wl_shell_surface::Resize>) -> u32 {
    match edges {
        WEnum::Value(edges) => edges.bits(),
        WEnum::Unknown(raw) => raw,
    }
}

fn transient(
    state: &mut ServerState,
    owner: ClientId,
    id: ObjectId,
    parent: &wl_surface::WlSurface,
    position: Point,
    popup: bool,
) -> ProtocolResult<()> {
    let Some(parent) = object_of(parent) else {
        return Ok(());
    };
    let parent = state.shell_of(parent)?;
    state.compositor.set_transient(owner, id, parent, position, popup)
}

impl Dispatch<wl_shell_surface::WlShellSurface, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_shell_surface::WlShellSurface,
        request: wl_shell_surface::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let id = *data;
        let Some(owner) = state.caller(client, id) else {
            return;
        };
        let result = match request {
            wl_shell_surface::Request::Pong { serial } => {
                trace!("{id} answered ping {serial}");
                Ok(())
            }
            wl_shell_surface::Request::Move { .. } => state.compositor.start_interaction(owner, id, Interaction::Move),
            wl_shell_surface::Request::Resize { edges, .. } => ResizeEdge::from_bits(resize_edges(edges))
                .and_then(|edge| state.compositor.start_interaction(owner, id, Interaction::Resize(edge))),
            wl_shell_surface::Request::SetToplevel => state.compositor.map(owner, id, WindowState::Normal),
            wl_shell_surface::Request::SetTransient { parent, x, y, .. } => {
                transient(state, owner, id, &parent, Point::new(x, y), false)
            }
            wl_shell_surface::Request::SetPopup { parent, x, y, .. } => {
                transient(state, owner, id, &parent, Point::new(x, y), true)
            }
            wl_shell_surface::Request::SetFullscreen { .. } => state.compositor.map(owner, id, WindowState::Fullscreen),
            wl_shell_surface::Request::SetMaximized { .. } => state.compositor.map(owner, id, WindowState::Maximized),
            wl_shell_surface::Request::SetTitle { title } => state.compositor.set_title(owner, id, &title),
            wl_shell_surface::Request::SetClass { class_ } => state.compositor.set_app_id(owner, id, &class_),
            _ => Ok(()),
        };
        report(resource, result, 0u32);
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &wl_shell_surface::WlShellSurface,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}
