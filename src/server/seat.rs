//! wl_seat, wl_pointer, wl_keyboard, wl_touch, zwp_stylus_v1 and
//! zwp_gaming_input_v1

use super::{object_of, report, ServerState, SurfaceTable};
use crate::geometry::{Point, PointF};
use crate::protocol::gaming_input::{zwp_gamepad_v1, zwp_gaming_input_v1};
use crate::protocol::stylus::{zwp_pointer_stylus_v1, zwp_stylus_v1};
use crate::registry::ObjectId;
use crate::seat::{
    AxisEvent, AxisSource, GamepadDelegate, KeyboardDelegate, Modifiers, PointerDelegate,
    PointerStylusDelegate, ToolType, TouchDelegate,
};
use crate::surface::Surface;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use wayland_server::backend::ClientId as WireClientId;
use wayland_server::protocol::{wl_keyboard, wl_pointer, wl_seat, wl_touch};
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource};

/// Writes the keymap, NUL terminated, into a sealed memfd that clients can
/// map read-only
fn keymap_file(keymap: &str) -> Result<(OwnedFd, u32)> {
    let name = CString::new("hearth-keymap")?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING) };
    if fd < 0 {
        return Err(anyhow!("memfd_create failed: {}", std::io::Error::last_os_error()));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    let mut file = File::from(fd);
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?;
    let size = u32::try_from(keymap.len() + 1)?;
    let fd = OwnedFd::from(file);

    let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE | libc::F_SEAL_SEAL;
    let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_ADD_SEALS, seals) };
    if ret < 0 {
        return Err(anyhow!("sealing keymap failed: {}", std::io::Error::last_os_error()));
    }
    Ok((fd, size))
}

impl GlobalDispatch<wl_seat::WlSeat, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<wl_seat::WlSeat>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let seat = state.bind_global(client, resource, data_init);
        seat.capabilities(wl_seat::Capability::Pointer | wl_seat::Capability::Keyboard | wl_seat::Capability::Touch);
        if seat.version() >= 2 {
            seat.name(state.seat_name.clone());
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_seat::WlSeat,
        request: wl_seat::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let seat = *data;
        let owner = ServerState::client_id(client);
        match request {
            wl_seat::Request::GetPointer { id } => {
                let pointer_id = state.compositor.allocate_id();
                let pointer = data_init.init(id, pointer_id);
                let Some(owner) = owner else { return };
                let delegate = WirePointer {
                    pointer: pointer.clone(),
                    surfaces: state.surfaces.clone(),
                };
                let result = state.compositor.create_pointer(
                    owner,
                    seat,
                    pointer_id,
                    pointer.id().protocol_id(),
                    Box::new(delegate),
                );
                report(resource, result, 0u32);
            }
            wl_seat::Request::GetKeyboard { id } => {
                let keyboard_id = state.compositor.allocate_id();
                let keyboard = data_init.init(id, keyboard_id);
                let Some(owner) = owner else { return };
                state.send_keymap(&keyboard);
                if keyboard.version() >= 4 {
                    keyboard.repeat_info(state.repeat_rate, state.repeat_delay);
                }
                let delegate = WireKeyboard {
                    keyboard: keyboard.clone(),
                    surfaces: state.surfaces.clone(),
                };
                let result = state.compositor.create_keyboard(
                    owner,
                    seat,
                    keyboard_id,
                    keyboard.id().protocol_id(),
                    Box::new(delegate),
                );
                report(resource, result, 0u32);
            }
            wl_seat::Request::GetTouch { id } => {
                let touch_id = state.compositor.allocate_id();
                let touch = data_init.init(id, touch_id);
                let Some(owner) = owner else { return };
                let delegate = WireTouch {
                    touch: touch.clone(),
                    surfaces: state.surfaces.clone(),
                };
                let result =
                    state
                        .compositor
                        .create_touch(owner, seat, touch_id, touch.id().protocol_id(), Box::new(delegate));
                report(resource, result, 0u32);
            }
            _ => {}
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_seat::WlSeat, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl ServerState {
    fn send_keymap(&self, keyboard: &wl_keyboard::WlKeyboard) {
        let Some(keymap) = self.keymap.as_deref() else {
            debug!("no keymap, {} gets none", keyboard.id());
            return;
        };
        match keymap_file(keymap) {
            Ok((fd, size)) => keyboard.keymap(wl_keyboard::KeymapFormat::XkbV1, fd.as_fd(), size),
            Err(e) => warn!("⚠️ Cannot share keymap with {}: {e:#}", keyboard.id()),
        }
    }
}

struct WirePointer {
    pointer: wl_pointer::WlPointer,
    surfaces: SurfaceTable,
}

impl WirePointer {
    fn axis_events(&self, time: u32, axis: wl_pointer::Axis, value: f64, discrete: Option<i32>, stop: bool) {
        let framed = self.pointer.version() >= 5;
        if stop {
            if framed {
                self.pointer.axis_stop(time, axis);
            }
            return;
        }
        if value == 0.0 {
            return;
        }
        if framed {
            if let Some(clicks) = discrete.filter(|c| *c != 0) {
                self.pointer.axis_discrete(axis, clicks);
            }
        }
        self.pointer.axis(time, axis, value);
    }
}

impl PointerDelegate for WirePointer {
    fn enter(&mut self, surface: &Surface, serial: u32, position: PointF) {
        if let Some(wire) = self.surfaces.get(surface.id()) {
            self.pointer.enter(serial, &wire, position.x, position.y);
        }
    }

    fn leave(&mut self, surface: &Surface, serial: u32) {
        if let Some(wire) = self.surfaces.get(surface.id()) {
            self.pointer.leave(serial, &wire);
        }
    }

    fn motion(&mut self, time: u32, position: PointF) {
        self.pointer.motion(time, position.x, position.y);
    }

    fn button(&mut self, serial: u32, time: u32, button: u32, pressed: bool) {
        let state = if pressed {
            wl_pointer::ButtonState::Pressed
        } else {
            wl_pointer::ButtonState::Released
        };
        self.pointer.button(serial, time, button, state);
    }

    fn axis(&mut self, time: u32, event: &AxisEvent) {
        if self.pointer.version() >= 5 {
            let source = match event.source {
                AxisSource::Wheel => wl_pointer::AxisSource::Wheel,
                AxisSource::Finger => wl_pointer::AxisSource::Finger,
                AxisSource::Continuous => wl_pointer::AxisSource::Continuous,
                AxisSource::WheelTilt if self.pointer.version() >= 6 => wl_pointer::AxisSource::WheelTilt,
                AxisSource::WheelTilt => wl_pointer::AxisSource::Wheel,
            };
            self.pointer.axis_source(source);
        }
        let (h, v) = event.discrete.unzip();
        self.axis_events(time, wl_pointer::Axis::HorizontalScroll, event.horizontal, h, event.stop);
        self.axis_events(time, wl_pointer::Axis::VerticalScroll, event.vertical, v, event.stop);
    }

    fn frame(&mut self) {
        if self.pointer.version() >= 5 {
            self.pointer.frame();
        }
    }
}

impl Dispatch<wl_pointer::WlPointer, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &wl_pointer::WlPointer,
        request: wl_pointer::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_pointer::Request::SetCursor {
            serial: _,
            surface,
            hotspot_x,
            hotspot_y,
        } = request
        {
            let Some(owner) = state.caller(client, *data) else {
                return;
            };
            let surface = surface.as_ref().and_then(object_of);
            let result = state
                .compositor
                .set_cursor(owner, *data, surface, Point::new(hotspot_x, hotspot_y));
            report(resource, result, wl_pointer::Error::Role);
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_pointer::WlPointer, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

struct WireKeyboard {
    keyboard: wl_keyboard::WlKeyboard,
    surfaces: SurfaceTable,
}

impl KeyboardDelegate for WireKeyboard {
    fn enter(&mut self, surface: &Surface, serial: u32, keys: &[u32]) {
        if let Some(wire) = self.surfaces.get(surface.id()) {
            let keys = keys.iter().flat_map(|k| k.to_ne_bytes()).collect();
            self.keyboard.enter(serial, &wire, keys);
        }
    }

    fn leave(&mut self, surface: &Surface, serial: u32) {
        if let Some(wire) = self.surfaces.get(surface.id()) {
            self.keyboard.leave(serial, &wire);
        }
    }

    fn key(&mut self, serial: u32, time: u32, key: u32, pressed: bool) {
        let state = if pressed {
            wl_keyboard::KeyState::Pressed
        } else {
            wl_keyboard::KeyState::Released
        };
        self.keyboard.key(serial, time, key, state);
    }

    fn modifiers(&mut self, serial: u32, modifiers: &Modifiers) {
        self.keyboard.modifiers(
            serial,
            modifiers.depressed,
            modifiers.latched,
            modifiers.locked,
            modifiers.group,
        );
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_keyboard::WlKeyboard,
        _request: wl_keyboard::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_keyboard::WlKeyboard, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

struct WireTouch {
    touch: wl_touch::WlTouch,
    surfaces: SurfaceTable,
}

impl TouchDelegate for WireTouch {
    fn down(&mut self, surface: &Surface, serial: u32, time: u32, id: i32, position: PointF) {
        if let Some(wire) = self.surfaces.get(surface.id()) {
            self.touch.down(serial, time, &wire, id, position.x, position.y);
        }
    }

    fn up(&mut self, serial: u32, time: u32, id: i32) {
        self.touch.up(serial, time, id);
    }

    fn motion(&mut self, time: u32, id: i32, position: PointF) {
        self.touch.motion(time, id, position.x, position.y);
    }

    fn frame(&mut self) {
        self.touch.frame();
    }

    fn cancel(&mut self) {
        self.touch.cancel();
    }
}

impl Dispatch<wl_touch::WlTouch, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_touch::WlTouch,
        _request: wl_touch::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &wl_touch::WlTouch, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<zwp_gaming_input_v1::ZwpGamingInputV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_gaming_input_v1::ZwpGamingInputV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<zwp_gaming_input_v1::ZwpGamingInputV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_gaming_input_v1::ZwpGamingInputV1,
        request: zwp_gaming_input_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_gaming_input_v1::Request::GetGamepad { id, seat } = request {
            let gamepad_id = state.compositor.allocate_id();
            let gamepad = data_init.init(id, gamepad_id);
            let (Some(owner), Some(seat)) = (ServerState::client_id(client), object_of(&seat)) else {
                return;
            };
            let result = state.compositor.create_gamepad(
                owner,
                *data,
                gamepad_id,
                gamepad.id().protocol_id(),
                seat,
                Box::new(WireGamepad(gamepad.clone())),
            );
            report(resource, result, 0u32);
        }
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_gaming_input_v1::ZwpGamingInputV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}

struct WireGamepad(zwp_gamepad_v1::ZwpGamepadV1);

impl GamepadDelegate for WireGamepad {
    fn state_change(&mut self, connected: bool) {
        self.0.state_change(connected as u32);
    }

    fn axis(&mut self, time: u32, axis: u32, value: f64) {
        self.0.axis(time, axis, value);
    }

    fn button(&mut self, time: u32, button: u32, pressed: bool, analog: f64) {
        self.0.button(time, button, pressed as u32, analog);
    }

    fn frame(&mut self, time: u32) {
        self.0.frame(time);
    }
}

impl Dispatch<zwp_gamepad_v1::ZwpGamepadV1, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwp_gamepad_v1::ZwpGamepadV1,
        _request: zwp_gamepad_v1::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &zwp_gamepad_v1::ZwpGamepadV1, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

impl GlobalDispatch<zwp_stylus_v1::ZwpStylusV1, ()> for ServerState {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        client: &Client,
        resource: New<zwp_stylus_v1::ZwpStylusV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        state.bind_global(client, resource, data_init);
    }
}

impl Dispatch<zwp_stylus_v1::ZwpStylusV1, ObjectId> for ServerState {
    fn request(
        state: &mut Self,
        client: &Client,
        resource: &zwp_stylus_v1::ZwpStylusV1,
        request: zwp_stylus_v1::Request,
        data: &ObjectId,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        if let zwp_stylus_v1::Request::GetPointerStylus { id, pointer } = request {
            let stylus_id = state.compositor.allocate_id();
            let stylus = data_init.init(id, stylus_id);
            let (Some(owner), Some(pointer)) = (ServerState::client_id(client), object_of(&pointer)) else {
                return;
            };
            let result = state.compositor.create_pointer_stylus(
                owner,
                *data,
                stylus_id,
                stylus.id().protocol_id(),
                pointer,
                Box::new(WireStylus(stylus.clone())),
            );
            report(resource, result, 0u32);
        }
    }

    fn destroyed(state: &mut Self, _client: WireClientId, _resource: &zwp_stylus_v1::ZwpStylusV1, data: &ObjectId) {
        state.compositor.destroy_object(*data);
    }
}

struct WireStylus(zwp_pointer_stylus_v1::ZwpPointerStylusV1);

impl PointerStylusDelegate for WireStylus {
    fn tool_change(&mut self, tool: ToolType) {
        let tool = match tool {
            ToolType::Mouse => zwp_pointer_stylus_v1::ToolType::Mouse,
            ToolType::Pen => zwp_pointer_stylus_v1::ToolType::Pen,
            ToolType::Touch => zwp_pointer_stylus_v1::ToolType::Touch,
            ToolType::Eraser => zwp_pointer_stylus_v1::ToolType::Eraser,
        };
        self.0.tool_change(tool);
    }

    fn force(&mut self, time: u32, force: f64) {
        self.0.force(time, force);
    }

    fn tilt(&mut self, time: u32, tilt: PointF) {
        self.0.tilt(time, tilt.x, tilt.y);
    }
}

impl Dispatch<zwp_pointer_stylus_v1::ZwpPointerStylusV1, ObjectId> for ServerState {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwp_pointer_stylus_v1::ZwpPointerStylusV1,
        _request: zwp_pointer_stylus_v1::Request,
        _data: &ObjectId,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
    }

    fn destroyed(
        state: &mut Self,
        _client: WireClientId,
        _resource: &zwp_pointer_stylus_v1::ZwpPointerStylusV1,
        data: &ObjectId,
    ) {
        state.compositor.destroy_object(*data);
    }
}
