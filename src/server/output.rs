//! wl_output and zwp_vsync_feedback_v1

use super::{object_of, report, ServerState};
use crate::output::{OutputDelegate, OutputMetrics};
use crate::protocol::vsync_feedback::{zwp_vsync_feedback_v1, zwp_vsync_timing_v1};
use crate::registry::ObjectId;
use crate::vsync::{VSyncParameters, VSyncTimingDelegate};
use log::debug;
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::wl_output;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

struct WireOutput(wl_output::WlOutput);

impl OutputDelegate for WireOutput {
    fn metrics(&mut self, metrics: &OutputMetrics) {
        let output = &self.0;
        let subpixel = wl_output::Subpixel::try_from(metrics.subpixel).unwrap_or(wl_output::Subpixel::Unknown);
        let transform = wl_output::Transform::try_from(metrics.transform).unwrap_or(wl_output::Transform::Normal);
        output.geometry(
            metrics.position.x,
            metrics.position.y,
            metrics.physical_size.width,
            metrics.physical_size.height,
            subpixel,
            metrics.make.clone(),
            metrics.model.clone(),
            transform,
        );
        output.mode(
            wl_output::Mode::Current | wl_output::Mode::Preferred,
            metrics.mode.width,
            metrics.mode.height,
            metrics.refresh_mhz,
        );
        if output.version() >= 2 {
            output.scale(metrics.scale);
            output.done();
        }
    }
}

impl GlobalDispatch<wl_output::WlOutput, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_output::WlOutput>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let id = state.compositor.allocate_id();
        let output = data_init.init(resource, id);
        let Some(owner) = ServerState::client_id(client) else {
            return;
        };
        debug!("{owner} bound wl_output v{}", output.version());
        let result = state.compositor.bind_output(
            owner,
            id,
            output.version(),
            output.id().protocol_id(),
            Box::new(WireOutput(output.clone())),
        );
        report(&output, result, 0u32);
    }
}

impl Dispatch<wl_output::WlOutput, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_output::WlOutput,
        _request: wl_output::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_output::WlOutput, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

struct WireTiming(zwp_vsync_timing_v1::ZwpVsyncTimingV1);

impl VSyncTimingDelegate for WireTiming {
    fn update(&mut self, parameters: &VSyncParameters) {
        let split = |value: u64| (value as u32, (value >> 32) as u32);
        let (timebase_lo, timebase_hi) = split(parameters.timebase_us);
        let (interval_lo, interval_hi) = split(parameters.interval_us);
        self.0.update(timebase_lo, timebase_hi, interval_lo, interval_hi);
    }
}

impl GlobalDispatch<zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1,
        request: zwp_vsync_feedback_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_vsync_feedback_v1::Request::GetVsyncTiming { id, output } = request {
            let timing_id = state.compositor.allocate_id();
            let timing = data_init.init(id, timing_id);
            let Some(owner) = ServerState::client_id(client) else {
                return;
            };
            let result = state.compositor.create_vsync_timing(
                owner,
                *data,
                timing_id,
                timing.id().protocol_id(),
                output.as_ref().and_then(object_of),
                Box::new(WireTiming(timing.clone())),
            );
            report(resource, result, 0u32);
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

impl Dispatch<zwp_vsync_timing_v1::ZwpVsyncTimingV1, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwp_vsync_timing_v1::ZwpVsyncTimingV1,
        _request: zwp_vsync_timing_v1::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_vsync_timing_v1::ZwpVsyncTimingV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}
