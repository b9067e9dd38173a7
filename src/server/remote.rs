//! zwp_remote_shell_v1, zwp_remote_surface_v1 and
//! zwp_notification_surface_v1
//!
//! Remote surfaces are mapped as soon as they are created and the embedding
//! host drives their state from then on.

use super::{object_of, report, ServerState, SurfaceTable};
use crate::error::ProtocolResult;
use crate::geometry::Rect;
use crate::protocol::remote_shell::{
    zwp_notification_surface_v1, zwp_remote_shell_v1, zwp_remote_surface_v1,
};
use crate::registry::ObjectId;
use crate::shell::flavor::{remote_configure, remote_state_type, remote_transitions, RemoteTransition};
use crate::shell::{
    Configure, Interaction, RemoteShellConfiguration, RemoteShellDelegate, ResizeEdge, ShellFlavor,
    ShellSurfaceDelegate, WindowState,
};
use crate::surface::{Role, Surface};
use log::debug;
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

const CONTAINER_DEFAULT: u32 = 1;
const CONTAINER_OVERLAY: u32 = 2;

struct RemoteShell {
    shell: zwp_remote_shell_v1::ZwpRemoteShellV1,
    surfaces: SurfaceTable,
}

impl RemoteShellDelegate for RemoteShell {
    fn configuration_changed(&mut self, configuration: &RemoteShellConfiguration) {
        let insets = configuration.work_area_insets;
        self.shell.configuration_changed(
            configuration.size.width,
            configuration.size.height,
            configuration.transform,
            configuration.scale,
            insets.left,
            insets.top,
            insets.right,
            insets.bottom,
            configuration.layout_mode.raw(),
        );
    }

    fn activated(&mut self, gained: Option<&Surface>, lost: Option<&Surface>) {
        let gained = gained.and_then(|s| self.surfaces.get(s.id()));
        let lost = lost.and_then(|s| self.surfaces.get(s.id()));
        self.shell.activated(gained.as_ref(), lost.as_ref());
    }
}

struct RemoteSurface(zwp_remote_surface_v1::ZwpRemoteSurfaceV1);

impl ShellSurfaceDelegate for RemoteSurface {
    fn configure(&mut self, configure: &Configure) {
        let (width, height, state_type, activated, serial) = remote_configure(configure);
        self.0.configure(width, height, state_type, activated, serial);
    }

    fn close(&mut self) {
        self.0.close();
    }

    fn state_changed(&mut self, old: WindowState, new: WindowState) {
        for transition in remote_transitions(old, new) {
            match transition {
                RemoteTransition::SetFullscreen => self.0.set_fullscreen(),
                RemoteTransition::UnsetFullscreen => self.0.unset_fullscreen(),
                RemoteTransition::SetMaximized => self.0.set_maximized(),
                RemoteTransition::UnsetMaximized => self.0.unset_maximized(),
            }
        }
        self.0.state_type_changed(remote_state_type(new));
    }
}

impl GlobalDispatch<zwp_remote_shell_v1::ZwpRemoteShellV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_remote_shell_v1::ZwpRemoteShellV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let id = state.compositor.allocate_id();
        let shell = data_init.init(resource, id);
        let Some(owner) = ServerState::client_id(client) else {
            return;
        };
        let delegate = RemoteShell {
            shell: shell.clone(),
            surfaces: state.surfaces.clone(),
        };
        let result = state.compositor.bind_remote_shell(
            owner,
            id,
            shell.version(),
            shell.id().protocol_id(),
            Box::new(delegate),
        );
        report(&shell, result, 0u32);
    }
}

impl Dispatch<zwp_remote_shell_v1::ZwpRemoteShellV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_remote_shell_v1::ZwpRemoteShellV1,
        request: zwp_remote_shell_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let owner = ServerState::client_id(client);
        match request {
            zwp_remote_shell_v1::Request::GetRemoteSurface { id, surface, container } => {
                let shell_id = state.compositor.allocate_id();
                let remote = data_init.init(id, shell_id);
                if !matches!(container, CONTAINER_DEFAULT | CONTAINER_OVERLAY) {
                    resource.post_error(
                        zwp_remote_shell_v1::Error::InvalidContainer,
                        format!("unknown container {container}"),
                    );
                    return;
                }
                let (Some(owner), Some(surface)) = (owner, object_of(&surface)) else {
                    return;
                };
                let result = state
                    .compositor
                    .create_shell_surface(
                        owner,
                        *data,
                        shell_id,
                        remote.id().protocol_id(),
                        surface,
                        Role::Toplevel,
                        ShellFlavor::Remote,
                        Box::new(RemoteSurface(remote.clone())),
                    )
                    .and_then(|()| state.compositor.set_container(owner, shell_id, container))
                    .and_then(|()| state.compositor.map(owner, shell_id, WindowState::Normal));
                report(resource, result, zwp_remote_shell_v1::Error::Role);
            }
            zwp_remote_shell_v1::Request::GetNotificationSurface {
                id,
                surface,
                notification_id,
            } => {
                let shell_id = state.compositor.allocate_id();
                let notification = data_init.init(id, shell_id);
                let (Some(owner), Some(surface)) = (owner, object_of(&surface)) else {
                    return;
                };
                debug!("{surface} becomes notification {notification_id:?}");
                let result = state.compositor.create_notification_surface(
                    owner,
                    *data,
                    shell_id,
                    notification.id().protocol_id(),
                    surface,
                    &notification_id,
                );
                report(resource, result, zwp_remote_shell_v1::Error::Role);
            }
            _ => {}
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_remote_shell_v1::ZwpRemoteShellV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

/// Interaction for a resize_edge value. `none` ends the interaction.
fn resize_interaction(edges: u32) -> ProtocolResult<Interaction> {
    if edges == 0 {
        return Ok(Interaction::None);
    }
    ResizeEdge::from_bits(edges).map(Interaction::Resize)
}

impl Dispatch<zwp_remote_surface_v1::ZwpRemoteSurfaceV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_remote_surface_v1::ZwpRemoteSurfaceV1,
        request: zwp_remote_surface_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        use zwp_remote_surface_v1::Request;

        let id = *data;
        let Some(owner) = state.caller(client, id) else {
            return;
        };
        let compositor = &mut state.compositor;
        let result = match request {
            Request::SetAppId { app_id } => compositor.set_app_id(owner, id, &app_id),
            Request::SetWindowGeometry { x, y, width, height } => {
                compositor.set_window_geometry(owner, id, Rect::new(x, y, width, height))
            }
            Request::SetScale { scale } => compositor.set_window_scale(owner, id, scale),
            Request::SetTitle { title } => compositor.set_title(owner, id, &title),
            Request::SetTopInset { height } => compositor.set_top_inset(owner, id, height),
            Request::Fullscreen => compositor.request_state(owner, id, WindowState::Fullscreen),
            Request::Maximize => compositor.request_state(owner, id, WindowState::Maximized),
            Request::Minimize => compositor.request_state(owner, id, WindowState::Minimized),
            Request::Pin => compositor.request_state(owner, id, WindowState::Pinned),
            Request::Unfullscreen | Request::Restore | Request::Unpin => {
                compositor.request_state(owner, id, WindowState::Normal)
            }
            Request::SetSystemModal => compositor.set_system_modal(owner, id, true),
            Request::UnsetSystemModal => compositor.set_system_modal(owner, id, false),
            Request::SetRectangularShadow { x, y, width, height } => {
                compositor.set_rectangular_shadow(owner, id, Rect::new(x, y, width, height))
            }
            Request::SetShadowBackgroundOpacity { opacity } => {
                compositor.set_shadow_background_opacity(owner, id, opacity)
            }
            Request::Activate { serial } => {
                debug!("{id} asks for activation with serial {serial}");
                compositor.request_activation(owner, id)
            }
            Request::Move => compositor.start_interaction(owner, id, Interaction::Move),
            Request::Resize { edges } => {
                resize_interaction(edges).and_then(|i| compositor.start_interaction(owner, id, i))
            }
            Request::AckConfigure { serial } => compositor.ack_configure(owner, id, serial),
            _ => Ok(()),
        };
        report(resource, result, 0u32);
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_remote_surface_v1::ZwpRemoteSurfaceV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<zwp_notification_surface_v1::ZwpNotificationSurfaceV1, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwp_notification_surface_v1::ZwpNotificationSurfaceV1,
        _request: zwp_notification_surface_v1::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_notification_surface_v1::ZwpNotificationSurfaceV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_edge_none_ends_interaction() {
        assert_eq!(resize_interaction(0), Ok(Interaction::None));
        assert!(matches!(resize_interaction(5), Ok(Interaction::Resize(e)) if e.bits() == 5));
        assert!(resize_interaction(3).is_err());
    }
}
