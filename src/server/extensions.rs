//! wp_viewporter, zwp_secure_output_v1 and zwp_alpha_compositing_v1
//!
//! All three attach at most one object to a surface. The extension object
//! outlives its surface harmlessly: requests on it are ignored afterwards.

use super::{object_of, report, ServerState};
use crate::geometry::{RectF, Size};
use crate::protocol::alpha_compositing::{zwp_alpha_compositing_v1, zwp_blending_v1};
use crate::protocol::secure_output::{zwp_secure_output_v1, zwp_security_v1};
use crate::registry::ObjectId;
use crate::surface::{BlendMode, ExtensionKind};
use wayland_protocols::wp::viewporter::server::{wp_viewport, wp_viewporter};
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::wl_surface;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

/// Shared by the three `get_*` requests
#[allow(clippy::too_many_arguments)]
fn create_extension<R: Resource>(
    state: &mut ServerState,
    client: &Client,
    factory: &R,
    factory_id: ObjectId,
    id: ObjectId,
    protocol_id: u32,
    surface: &wl_surface::WlSurface,
    kind: ExtensionKind,
    exists_code: u32,
) {
    let Some(owner) = ServerState::client_id(client) else {
        return;
    };
    let Some(surface) = object_of(surface) else {
        return;
    };
    let result = state
        .compositor
        .create_extension(owner, factory_id, id, protocol_id, surface, kind);
    report(factory, result, exists_code);
}

impl GlobalDispatch<wp_viewporter::WpViewporter, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wp_viewporter::WpViewporter>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<wp_viewporter::WpViewporter, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wp_viewporter::WpViewporter,
        request: wp_viewporter::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wp_viewporter::Request::GetViewport { id, surface } = request {
            let viewport_id = state.compositor.allocate_id();
            let viewport = data_init.init(id, viewport_id);
            create_extension(
                state,
                client,
                resource,
                *data,
                viewport_id,
                viewport.id().protocol_id(),
                &surface,
                ExtensionKind::Viewport,
                wp_viewporter::Error::ViewportExists.into(),
            );
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wp_viewporter::WpViewporter, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

/// All four source values at -1 unset the crop
fn viewport_source(x: f64, y: f64, width: f64, height: f64) -> Option<RectF> {
    if [x, y, width, height].iter().all(|v| *v == -1.0) {
        None
    } else {
        Some(RectF::new(x, y, width, height))
    }
}

/// Both destination values at -1 unset the scaling
fn viewport_destination(width: i32, height: i32) -> Option<Size> {
    if width == -1 && height == -1 {
        None
    } else {
        Some(Size::new(width, height))
    }
}

impl Dispatch<wp_viewport::WpViewport, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wp_viewport::WpViewport,
        request: wp_viewport::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(owner) = state.caller(client, *data) else {
            return;
        };
        let result = match request {
            wp_viewport::Request::SetSource { x, y, width, height } => {
                state
                    .compositor
                    .viewport_set_source(owner, *data, viewport_source(x, y, width, height))
            }
            wp_viewport::Request::SetDestination { width, height } => {
                state
                    .compositor
                    .viewport_set_destination(owner, *data, viewport_destination(width, height))
            }
            _ => return,
        };
        report(resource, result, wp_viewport::Error::BadValue);
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wp_viewport::WpViewport, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<zwp_secure_output_v1::ZwpSecureOutputV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_secure_output_v1::ZwpSecureOutputV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<zwp_secure_output_v1::ZwpSecureOutputV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_secure_output_v1::ZwpSecureOutputV1,
        request: zwp_secure_output_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_secure_output_v1::Request::GetSecurity { id, surface } = request {
            let security_id = state.compositor.allocate_id();
            let security = data_init.init(id, security_id);
            create_extension(
                state,
                client,
                resource,
                *data,
                security_id,
                security.id().protocol_id(),
                &surface,
                ExtensionKind::Security,
                zwp_secure_output_v1::Error::SecurityExists.into(),
            );
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_secure_output_v1::ZwpSecureOutputV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<zwp_security_v1::ZwpSecurityV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_security_v1::ZwpSecurityV1,
        request: zwp_security_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_security_v1::Request::OnlyVisibleOnSecureOutput = request {
            let Some(owner) = state.caller(client, *data) else {
                return;
            };
            let result = state.compositor.set_only_visible_on_secure_output(owner, *data);
            report(resource, result, 0u32);
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &zwp_security_v1::ZwpSecurityV1, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<zwp_alpha_compositing_v1::ZwpAlphaCompositingV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_alpha_compositing_v1::ZwpAlphaCompositingV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<zwp_alpha_compositing_v1::ZwpAlphaCompositingV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_alpha_compositing_v1::ZwpAlphaCompositingV1,
        request: zwp_alpha_compositing_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_alpha_compositing_v1::Request::GetBlending { id, surface } = request {
            let blending_id = state.compositor.allocate_id();
            let blending = data_init.init(id, blending_id);
            create_extension(
                state,
                client,
                resource,
                *data,
                blending_id,
                blending.id().protocol_id(),
                &surface,
                ExtensionKind::Blending,
                zwp_alpha_compositing_v1::Error::BlendingExists.into(),
            );
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_alpha_compositing_v1::ZwpAlphaCompositingV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

fn blend_mode(equation: u32) -> Option<BlendMode> {
    match equation {
        0 => Some(BlendMode::None),
        1 => Some(BlendMode::Premultiplied),
        2 => Some(BlendMode::Coverage),
        _ => None,
    }
}

impl Dispatch<zwp_blending_v1::ZwpBlendingV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_blending_v1::ZwpBlendingV1,
        request: zwp_blending_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(owner) = state.caller(client, *data) else {
            return;
        };
        match request {
            zwp_blending_v1::Request::SetBlending { equation } => {
                let Some(mode) = blend_mode(equation) else {
                    resource.post_error(
                        zwp_blending_v1::Error::InvalidBlendingEquation,
                        format!("unknown blending equation {equation}"),
                    );
                    return;
                };
                let result = state.compositor.set_blend_mode(owner, *data, mode);
                report(resource, result, zwp_blending_v1::Error::InvalidBlendingEquation);
            }
            zwp_blending_v1::Request::SetAlpha { value } => {
                let result = state.compositor.set_alpha(owner, *data, value);
                report(resource, result, zwp_blending_v1::Error::InvalidAlpha);
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &zwp_blending_v1::ZwpBlendingV1, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}
