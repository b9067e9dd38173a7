//! wl_compositor, wl_surface, wl_region, wl_callback and the sub-surface
//! protocol

use super::{object_of, report, report_with, ServerState};
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::{Point, Rect};
use crate::registry::ObjectId;
use crate::surface::Transform;
use log::{error, trace, warn};
use wayland_server::backend::protocol::ProtocolError as WireError;
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::{
    wl_callback, wl_compositor, wl_region, wl_subcompositor, wl_subsurface, wl_surface,
};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

impl GlobalDispatch<wl_compositor::WlCompositor, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_compositor::WlCompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<wl_compositor::WlCompositor, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_compositor::WlCompositor,
        request: wl_compositor::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let owner = ServerState::client_id(client);
        match request {
            wl_compositor::Request::CreateSurface { id } => {
                let surface_id = state.compositor.allocate_id();
                let surface = data_init.init(id, surface_id);
                let Some(owner) = owner else { return };
                let result = state.compositor.create_surface(
                    owner,
                    *data,
                    surface_id,
                    surface.id().protocol_id(),
                );
                if result.is_ok() {
                    state.surfaces.insert(surface_id, surface);
                }
                report(resource, result, 0u32);
            }
            wl_compositor::Request::CreateRegion { id } => {
                let region_id = state.compositor.allocate_id();
                let region = data_init.init(id, region_id);
                let Some(owner) = owner else { return };
                let result =
                    state
                        .compositor
                        .create_region(owner, *data, region_id, region.id().protocol_id());
                report(resource, result, 0u32);
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_compositor::WlCompositor, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<wl_surface::WlSurface, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_surface::WlSurface,
        request: wl_surface::Request,
        data: &ObjectId,
        dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let surface = *data;
        match request {
            // The callback is initialized even when the surface is gone
            wl_surface::Request::Frame { callback } => {
                let callback_id = state.compositor.allocate_id();
                let callback = data_init.init(callback, callback_id);
                let Some(owner) = state.caller(client, surface) else {
                    return;
                };
                let protocol_id = callback.id().protocol_id();
                let result = state
                    .compositor
                    .frame(owner, surface, callback_id, protocol_id, move |time| callback.done(time));
                report_surface(client, dhandle, resource, result);
            }
            wl_surface::Request::Destroy => {}
            request => {
                let result = surface_request(state, client, resource, surface, request);
                report_surface(client, dhandle, resource, result);
            }
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_surface::WlSurface, data: &ObjectId) {
        state.compositor.destroy_object(*data);
        state.surfaces.remove(*data);
    }
}

/// wl_surface error code for a core error, if the interface has one
pub(super) fn surface_error(err: &ProtocolError) -> Option<wl_surface::Error> {
    match err {
        ProtocolError::InvalidScale(_) => Some(wl_surface::Error::InvalidScale),
        ProtocolError::InvalidDimensions { .. } => Some(wl_surface::Error::InvalidSize),
        _ => None,
    }
}

/// Fatal errors without a wl_surface code name an object the client may not
/// use, which is a wl_display invalid_object error.
fn report_surface(
    client: &Client,
    dhandle: &DisplayHandle,
    resource: &wl_surface::WlSurface,
    result: ProtocolResult<()>,
) {
    match result {
        Err(err) if err.is_fatal() && surface_error(&err).is_none() => {
            error!("{}: {err}", resource.id());
            client.kill(
                dhandle,
                WireError {
                    // wl_display.error.invalid_object (wayland-server does not generate wl_display)
                    code: 0,
                    object_id: 1,
                    object_interface: "wl_display".to_string(),
                    message: err.to_string(),
                },
            );
        }
        result => report_with(resource, result, |err| surface_error(err).map_or(0, u32::from)),
    }
}

fn surface_request(
    state: &mut ServerState,
    client: &Client,
    resource: &wl_surface::WlSurface,
    surface: ObjectId,
    request: wl_surface::Request,
) -> ProtocolResult<()> {
    let Some(owner) = state.caller(client, surface) else {
        return Ok(());
    };
    match request {
        wl_surface::Request::Attach { buffer, x, y } => {
            if x != 0 || y != 0 {
                trace!("{surface} attached with offset {x},{y}");
            }
            let buffer = buffer.as_ref().and_then(object_of);
            state.compositor.attach(owner, surface, buffer, Point::new(x, y))
        }
        wl_surface::Request::Damage { x, y, width, height } => {
            state.compositor.damage(owner, surface, Rect::new(x, y, width, height))
        }
        wl_surface::Request::DamageBuffer { x, y, width, height } => {
            state
                .compositor
                .damage_buffer(owner, surface, Rect::new(x, y, width, height))
        }
        wl_surface::Request::SetOpaqueRegion { region } => {
            let region = region.as_ref().and_then(object_of);
            state.compositor.set_opaque_region(owner, surface, region)
        }
        wl_surface::Request::SetInputRegion { region } => {
            let region = region.as_ref().and_then(object_of);
            state.compositor.set_input_region(owner, surface, region)
        }
        wl_surface::Request::SetBufferScale { scale } => {
            state.compositor.set_buffer_scale(owner, surface, scale)
        }
        wl_surface::Request::SetBufferTransform { transform } => {
            let raw = match transform {
                WEnum::Value(value) => value.into(),
                WEnum::Unknown(raw) => raw,
            };
            match Transform::from_raw(raw) {
                Some(transform) => state.compositor.set_buffer_transform(owner, surface, transform),
                None => {
                    resource.post_error(
                        wl_surface::Error::InvalidTransform,
                        format!("invalid transform {raw}"),
                    );
                    Ok(())
                }
            }
        }
        wl_surface::Request::Commit => state.compositor.commit(owner, surface),
        other => {
            warn!("{surface}: unsupported request {other:?}");
            Ok(())
        }
    }
}

impl Dispatch<wl_callback::WlCallback, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_callback::WlCallback,
        _request: wl_callback::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_callback::WlCallback, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<wl_region::WlRegion, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_region::WlRegion,
        request: wl_region::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(owner) = state.caller(client, *data) else {
            return;
        };
        let result = match request {
            wl_region::Request::Add { x, y, width, height } => {
                state.compositor.region_add(owner, *data, Rect::new(x, y, width, height))
            }
            wl_region::Request::Subtract { x, y, width, height } => {
                state
                    .compositor
                    .region_subtract(owner, *data, Rect::new(x, y, width, height))
            }
            _ => return,
        };
        report(resource, result, 0u32);
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_region::WlRegion, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<wl_subcompositor::WlSubcompositor, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_subcompositor::WlSubcompositor>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<wl_subcompositor::WlSubcompositor, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_subcompositor::WlSubcompositor,
        request: wl_subcompositor::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_subcompositor::Request::GetSubsurface { id, surface, parent } = request {
            let subsurface_id = state.compositor.allocate_id();
            let subsurface = data_init.init(id, subsurface_id);
            let Some(owner) = ServerState::client_id(client) else {
                return;
            };
            let (Some(surface), Some(parent)) = (object_of(&surface), object_of(&parent)) else {
                resource.post_error(wl_subcompositor::Error::BadSurface, "unknown surface");
                return;
            };
            let result = state.compositor.create_subsurface(
                owner,
                *data,
                subsurface_id,
                subsurface.id().protocol_id(),
                surface,
                parent,
            );
            report(resource, result, wl_subcompositor::Error::BadSurface);
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &wl_subcompositor::WlSubcompositor,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<wl_subsurface::WlSubsurface, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_subsurface::WlSubsurface,
        request: wl_subsurface::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let Some(owner) = state.caller(client, *data) else {
            return;
        };
        let sub = *data;
        let result = match request {
            wl_subsurface::Request::SetPosition { x, y } => {
                state.compositor.subsurface_set_position(owner, sub, Point::new(x, y))
            }
            wl_subsurface::Request::PlaceAbove { sibling } => match object_of(&sibling) {
                Some(sibling) => state.compositor.subsurface_place_above(owner, sub, sibling),
                None => return,
            },
            wl_subsurface::Request::PlaceBelow { sibling } => match object_of(&sibling) {
                Some(sibling) => state.compositor.subsurface_place_below(owner, sub, sibling),
                None => return,
            },
            wl_subsurface::Request::SetSync => state.compositor.subsurface_set_sync(owner, sub, true),
            wl_subsurface::Request::SetDesync => state.compositor.subsurface_set_sync(owner, sub, false),
            _ => return,
        };
        report(resource, result, wl_subsurface::Error::BadSurface);
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_subsurface::WlSubsurface, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}
