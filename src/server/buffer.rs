//! wl_shm, wl_shm_pool, wl_buffer and linux-dmabuf

use super::{report_with, ServerState};
use crate::buffer::{Buffer, DmabufParams, ShmPool, DMABUF_FORMATS, SHM_FORMATS};
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::Size;
use crate::registry::ObjectId;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use wayland_protocols::wp::linux_dmabuf::zv1::server::{zwp_linux_buffer_params_v1, zwp_linux_dmabuf_v1};
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::{wl_buffer, wl_shm, wl_shm_pool};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource, WEnum};

/// A pool and the wl_shm binding it was created from. The pool is missing
/// when the descriptor could not be mapped.
pub(crate) struct ShmPoolData {
    factory: ObjectId,
    pool: Option<Arc<ShmPool>>,
}

/// A dma-buf params object and the zwp_linux_dmabuf_v1 binding it belongs to
pub(crate) struct DmabufParamsData {
    factory: ObjectId,
    params: Mutex<DmabufParams>,
}

fn shm_error(err: &ProtocolError) -> u32 {
    match err {
        ProtocolError::InvalidFormat(_) => wl_shm::Error::InvalidFormat.into(),
        ProtocolError::InvalidStride { .. } => wl_shm::Error::InvalidStride.into(),
        _ => wl_shm::Error::InvalidFd.into(),
    }
}

fn dmabuf_error(err: &ProtocolError) -> u32 {
    use zwp_linux_buffer_params_v1::Error;
    let code = match err {
        ProtocolError::AlreadyUsed => Error::AlreadyUsed,
        ProtocolError::PlaneIndex(_) => Error::PlaneIdx,
        ProtocolError::PlaneSet(_) => Error::PlaneSet,
        ProtocolError::InvalidFormat(_) => Error::InvalidFormat,
        ProtocolError::InvalidDimensions { .. } => Error::InvalidDimensions,
        _ => Error::Incomplete,
    };
    code.into()
}

/// Registers a validated buffer with the core and wires its release event
fn register_buffer(
    state: &mut ServerState,
    client: &Client,
    factory: ObjectId,
    id: ObjectId,
    wire: &wl_buffer::WlBuffer,
    buffer: ProtocolResult<Buffer>,
) -> ProtocolResult<()> {
    let Some(owner) = ServerState::client_id(client) else {
        return Ok(());
    };
    state
        .compositor
        .create_buffer(owner, factory, id, wire.id().protocol_id(), buffer?)?;
    let wire = wire.clone();
    state.compositor.set_buffer_release(id, move || wire.release());
    Ok(())
}

impl GlobalDispatch<wl_shm::WlShm, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_shm::WlShm>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let shm = state.bind_global(client, resource, data_init);
        for format in SHM_FORMATS {
            match wl_shm::Format::try_from(format.shm_code()) {
                Ok(code) => shm.format(code),
                Err(_) => debug!("{format:?} has no wl_shm code"),
            }
        }
    }
}

impl Dispatch<wl_shm::WlShm, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        resource: &wl_shm::WlShm,
        request: wl_shm::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_shm::Request::CreatePool { id, fd, size } = request {
            let pool = match usize::try_from(size) {
                Ok(size) if size > 0 => ShmPool::new(fd, size).map(Arc::new).map_err(|e| e.to_string()),
                _ => Err(format!("invalid pool size {size}")),
            };
            let (pool, failure) = match pool {
                Ok(pool) => (Some(pool), None),
                Err(reason) => (None, Some(reason)),
            };
            data_init.init(
                id,
                ShmPoolData {
                    factory: *data,
                    pool,
                },
            );
            if let Some(reason) = failure {
                warn!("{}: cannot map pool: {reason}", resource.id());
                resource.post_error(wl_shm::Error::InvalidFd, reason);
            }
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_shm::WlShm, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ShmPoolData> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_shm_pool::WlShmPool,
        request: wl_shm_pool::Request,
        data: &ShmPoolData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_shm_pool::Request::CreateBuffer {
                id,
                offset,
                width,
                height,
                stride,
                format,
            } => {
                let buffer_id = state.compositor.allocate_id();
                let wire = data_init.init(id, buffer_id);
                let Some(pool) = data.pool.clone() else {
                    return;
                };
                let code = match format {
                    WEnum::Value(format) => format.into(),
                    WEnum::Unknown(raw) => raw,
                };
                let buffer = Buffer::from_shared_memory(pool, code, offset, stride, Size::new(width, height));
                // An unregistered wl_buffer must not outlive the request
                if let Err(err) = register_buffer(state, client, data.factory, buffer_id, &wire, buffer) {
                    error!("{}: {err}", resource.id());
                    resource.post_error(shm_error(&err), err.to_string());
                }
            }
            wl_shm_pool::Request::Resize { size } => {
                let Some(pool) = data.pool.as_ref() else {
                    return;
                };
                let result = usize::try_from(size)
                    .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))
                    .and_then(|size| pool.resize(size));
                if let Err(e) = result {
                    resource.post_error(wl_shm::Error::InvalidFd, format!("cannot resize pool: {e}"));
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_buffer::WlBuffer,
        _request: wl_buffer::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_buffer::WlBuffer, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let dmabuf = state.bind_global(client, resource, data_init);
        for format in DMABUF_FORMATS {
            dmabuf.format(format.fourcc());
        }
    }
}

impl Dispatch<zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1,
        request: zwp_linux_dmabuf_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_linux_dmabuf_v1::Request::CreateParams { params_id } = request {
            data_init.init(
                params_id,
                DmabufParamsData {
                    factory: *data,
                    params: Mutex::new(DmabufParams::new()),
                },
            );
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1, DmabufParamsData> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1,
        request: zwp_linux_buffer_params_v1::Request,
        data: &DmabufParamsData,
        dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let flag_bits = |flags: WEnum<zwp_linux_buffer_params_v1::Flags>| match flags {
            WEnum::Value(flags) => flags.bits(),
            WEnum::Unknown(raw) => raw,
        };
        match request {
            zwp_linux_buffer_params_v1::Request::Add {
                fd,
                plane_idx,
                offset,
                stride,
                modifier_hi,
                modifier_lo,
            } => {
                let modifier = (u64::from(modifier_hi) << 32) | u64::from(modifier_lo);
                let result = data.params.lock().add(fd, plane_idx, offset, stride, modifier);
                report_with(resource, result, dmabuf_error);
            }
            zwp_linux_buffer_params_v1::Request::Create {
                width,
                height,
                format,
                flags,
            } => {
                let buffer = data
                    .params
                    .lock()
                    .create(format, Size::new(width, height), flag_bits(flags));
                if let Err(ProtocolError::AlreadyUsed) = buffer {
                    report_with(resource, Err(ProtocolError::AlreadyUsed), dmabuf_error);
                    return;
                }
                let buffer = match buffer {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        debug!("{}: import failed: {e}", resource.id());
                        resource.failed();
                        return;
                    }
                };
                let buffer_id = state.compositor.allocate_id();
                let wire = match client.create_resource::<wl_buffer::WlBuffer, ObjectId, ServerState>(
                    dhandle, 1, buffer_id,
                ) {
                    Ok(wire) => wire,
                    Err(_) => {
                        resource.failed();
                        return;
                    }
                };
                match register_buffer(state, client, data.factory, buffer_id, &wire, Ok(buffer)) {
                    Ok(()) => resource.created(&wire),
                    Err(e) => {
                        debug!("{}: import failed: {e}", resource.id());
                        resource.failed();
                    }
                }
            }
            zwp_linux_buffer_params_v1::Request::CreateImmed {
                buffer_id,
                width,
                height,
                format,
                flags,
            } => {
                let id = state.compositor.allocate_id();
                let wire = data_init.init(buffer_id, id);
                let buffer = data
                    .params
                    .lock()
                    .create(format, Size::new(width, height), flag_bits(flags));
                // Immediate imports have no failed event, every error is fatal
                if let Err(e) = register_buffer(state, client, data.factory, id, &wire, buffer) {
                    warn!("{}: {e}", resource.id());
                    resource.post_error(dmabuf_error(&e), e.to_string());
                }
            }
            _ => {}
        }
    }
}
