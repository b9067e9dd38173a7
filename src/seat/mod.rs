//! Seat and input routing
//!
//! Pointer, keyboard, touch and gamepad objects are registered per client
//! with a delegate that encodes events for the wire. A pointer may carry a
//! stylus object that adds tool type, force and tilt to its events. Focus is seat-wide and
//! events for a focused surface only ever reach the devices of the client
//! that owns it. Focus changes send every leave first and then the enters,
//! each with its own serial.


use crate::compositor::Compositor;
use crate::error::ProtocolResult;
use crate::geometry::{Point, PointF};
use crate::poller::GamepadSnapshot;
use crate::registry::{ClientId, ObjectId, ObjectKind};
use crate::surface::{Role, Surface};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// Scroll distance in surface pixels that makes one wheel click
pub const AXIS_DISCRETE_STEP: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AxisSource {
    #[default]
    Wheel,
    Finger,
    Continuous,
    WheelTilt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisEvent {
    pub source: AxisSource,
    pub horizontal: f64,
    pub vertical: f64,
    /// Wheel clicks, only set for wheel sources
    pub discrete: Option<(i32, i32)>,
    /// The scroll sequence ended (finger lifted)
    pub stop: bool,
}

impl AxisEvent {
    /// Wheel scroll, with clicks derived from the distance
    pub fn wheel(horizontal: f64, vertical: f64) -> Self {
        let clicks = |v: f64| (v / AXIS_DISCRETE_STEP).round() as i32;
        Self {
            source: AxisSource::Wheel,
            horizontal,
            vertical,
            discrete: Some((clicks(horizontal), clicks(vertical))),
            stop: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

pub trait PointerDelegate {
    fn enter(&mut self, surface: &Surface, serial: u32, position: PointF);
    fn leave(&mut self, surface: &Surface, serial: u32);
    fn motion(&mut self, time: u32, position: PointF);
    fn button(&mut self, serial: u32, time: u32, button: u32, pressed: bool);
    fn axis(&mut self, time: u32, event: &AxisEvent);
    fn frame(&mut self) {}
}

/// Kind of tool driving the pointer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolType {
    #[default]
    Mouse,
    Pen,
    Touch,
    Eraser,
}

impl ToolType {
    pub fn raw(self) -> u32 {
        match self {
            ToolType::Mouse => 0,
            ToolType::Pen => 1,
            ToolType::Touch => 2,
            ToolType::Eraser => 3,
        }
    }
}

/// Extra pointer data for pen input. Each batch is closed by a frame on the
/// pointers of the same client.
pub trait PointerStylusDelegate {
    fn tool_change(&mut self, tool: ToolType);
    /// `force` is normalized to 0..=1
    fn force(&mut self, time: u32, force: f64);
    /// Degrees from the vertical, positive towards +x and +y
    fn tilt(&mut self, time: u32, tilt: PointF);
}

pub trait KeyboardDelegate {
    /// `keys` holds the keys already pressed when focus arrives
    fn enter(&mut self, surface: &Surface, serial: u32, keys: &[u32]);
    fn leave(&mut self, surface: &Surface, serial: u32);
    fn key(&mut self, serial: u32, time: u32, key: u32, pressed: bool);
    fn modifiers(&mut self, serial: u32, modifiers: &Modifiers);
}

pub trait TouchDelegate {
    fn down(&mut self, surface: &Surface, serial: u32, time: u32, id: i32, position: PointF);
    fn up(&mut self, serial: u32, time: u32, id: i32);
    fn motion(&mut self, time: u32, id: i32, position: PointF);
    fn frame(&mut self);
    fn cancel(&mut self);
}

pub trait GamepadDelegate {
    fn state_change(&mut self, connected: bool);
    fn axis(&mut self, time: u32, axis: u32, value: f64);
    fn button(&mut self, time: u32, button: u32, pressed: bool, analog: f64);
    /// Closes one batch of changes
    fn frame(&mut self, time: u32);
}

/// One difference between two consecutive gamepad snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GamepadChange {
    Connected(bool),
    Axis { axis: u32, value: f64 },
    Button { button: u32, pressed: bool, analog: f64 },
}

/// Lists what changed from `old` to `new`. A disconnect hides every other
/// change.
pub fn diff_gamepad(old: &GamepadSnapshot, new: &GamepadSnapshot) -> Vec<GamepadChange> {
    let mut changes = Vec::new();
    if old.connected != new.connected {
        changes.push(GamepadChange::Connected(new.connected));
    }
    if !new.connected {
        return changes;
    }
    for (index, value) in new.axes.iter().enumerate() {
        if old.axes.get(index) != Some(value) {
            changes.push(GamepadChange::Axis {
                axis: index as u32,
                value: *value,
            });
        }
    }
    for (index, state) in new.buttons.iter().enumerate() {
        if old.buttons.get(index) != Some(state) {
            changes.push(GamepadChange::Button {
                button: index as u32,
                pressed: state.pressed,
                analog: state.analog,
            });
        }
    }
    changes
}

struct Device<D: ?Sized> {
    client: ClientId,
    delegate: Box<D>,
}

fn for_client<D: ?Sized>(
    devices: &mut BTreeMap<ObjectId, Device<D>>,
    client: ClientId,
    mut f: impl FnMut(&mut D),
) {
    for device in devices.values_mut().filter(|d| d.client == client) {
        f(device.delegate.as_mut());
    }
}

struct Stylus {
    pointer: ObjectId,
    client: ClientId,
    /// Tool last announced to this stylus object
    tool: ToolType,
    delegate: Box<dyn PointerStylusDelegate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub surface: ObjectId,
    pub hotspot: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Focus {
    surface: ObjectId,
    client: ClientId,
}

#[derive(Default)]
pub struct Seat {
    pointers: BTreeMap<ObjectId, Device<dyn PointerDelegate>>,
    keyboards: BTreeMap<ObjectId, Device<dyn KeyboardDelegate>>,
    touches: BTreeMap<ObjectId, Device<dyn TouchDelegate>>,
    gamepads: BTreeMap<ObjectId, Device<dyn GamepadDelegate>>,
    styluses: BTreeMap<ObjectId, Stylus>,
    tool: ToolType,
    pointer_focus: Option<Focus>,
    pointer_position: PointF,
    keyboard_focus: Option<Focus>,
    pressed_keys: Vec<u32>,
    pressed_buttons: Vec<u32>,
    modifiers: Modifiers,
    touch_points: BTreeMap<i32, Focus>,
    touch_frame: BTreeSet<ClientId>,
    cursor: Option<Cursor>,
    gamepad_state: GamepadSnapshot,
}

impl Seat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pointer_focus(&self) -> Option<ObjectId> {
        self.pointer_focus.map(|f| f.surface)
    }

    pub fn keyboard_focus(&self) -> Option<ObjectId> {
        self.keyboard_focus.map(|f| f.surface)
    }

    pub fn pressed_keys(&self) -> &[u32] {
        &self.pressed_keys
    }

    pub fn pressed_buttons(&self) -> &[u32] {
        &self.pressed_buttons
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn tool(&self) -> ToolType {
        self.tool
    }

    pub fn stylus_count(&self) -> usize {
        self.styluses.len()
    }

    pub fn active_touch_points(&self) -> usize {
        self.touch_points.len()
    }

    pub fn device_count(&self) -> usize {
        self.pointers.len() + self.keyboards.len() + self.touches.len() + self.gamepads.len()
    }

    /// A destroyed pointer leaves its stylus object inert
    pub(crate) fn remove_device(&mut self, id: ObjectId) {
        if self.pointers.remove(&id).is_some() {
            self.styluses.retain(|_, s| s.pointer != id);
        }
        self.keyboards.remove(&id);
        self.touches.remove(&id);
        self.gamepads.remove(&id);
        self.styluses.remove(&id);
    }

    pub(crate) fn forget_cursor(&mut self, surface: ObjectId) {
        if self.cursor.is_some_and(|c| c.surface == surface) {
            self.cursor = None;
        }
    }

    /// Drops every reference to a destroyed surface. No leave is sent since
    /// the client already knows the surface is gone.
    pub(crate) fn surface_destroyed(&mut self, surface: ObjectId) {
        if self.pointer_focus.is_some_and(|f| f.surface == surface) {
            self.pointer_focus = None;
        }
        if self.keyboard_focus.is_some_and(|f| f.surface == surface) {
            self.keyboard_focus = None;
        }
        self.touch_points.retain(|_, f| f.surface != surface);
        self.forget_cursor(surface);
    }

    /// True while some gamepad belongs to the client owning keyboard focus
    pub fn gamepad_eligible(&self) -> bool {
        let Some(focus) = self.keyboard_focus else {
            return false;
        };
        self.gamepads.values().any(|d| d.client == focus.client)
    }
}

impl Compositor {
    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    fn create_device(
        &mut self,
        client: ClientId,
        seat: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        interface: &'static str,
        kind: ObjectKind,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, seat, ObjectKind::Global)?;
        self.registry.create(id, seat, interface, protocol_id, kind)?;
        Ok(())
    }

    /// Registers a wl_pointer. A client binding late still gets an enter if
    /// one of its surfaces already has pointer focus.
    pub fn create_pointer(
        &mut self,
        client: ClientId,
        seat: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        mut delegate: Box<dyn PointerDelegate>,
    ) -> ProtocolResult<()> {
        self.create_device(client, seat, id, protocol_id, "wl_pointer", ObjectKind::Pointer)?;
        if let Some(focus) = self.seat.pointer_focus.filter(|f| f.client == client) {
            if let Some(surface) = self.surfaces.get(&focus.surface) {
                delegate.enter(surface, self.serials.next(), self.seat.pointer_position);
                delegate.frame();
            }
        }
        self.seat.pointers.insert(id, Device { client, delegate });
        Ok(())
    }

    pub fn create_keyboard(
        &mut self,
        client: ClientId,
        seat: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        mut delegate: Box<dyn KeyboardDelegate>,
    ) -> ProtocolResult<()> {
        self.create_device(client, seat, id, protocol_id, "wl_keyboard", ObjectKind::Keyboard)?;
        if let Some(focus) = self.seat.keyboard_focus.filter(|f| f.client == client) {
            if let Some(surface) = self.surfaces.get(&focus.surface) {
                delegate.enter(surface, self.serials.next(), &self.seat.pressed_keys);
                delegate.modifiers(self.serials.next(), &self.seat.modifiers);
            }
        }
        self.seat.keyboards.insert(id, Device { client, delegate });
        Ok(())
    }

    pub fn create_touch(
        &mut self,
        client: ClientId,
        seat: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        delegate: Box<dyn TouchDelegate>,
    ) -> ProtocolResult<()> {
        self.create_device(client, seat, id, protocol_id, "wl_touch", ObjectKind::Touch)?;
        self.seat.touches.insert(id, Device { client, delegate });
        Ok(())
    }

    /// Registers a gamepad from the gaming input factory for `seat`
    pub fn create_gamepad(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        seat: ObjectId,
        mut delegate: Box<dyn GamepadDelegate>,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, seat, ObjectKind::Global)?;
        self.create_device(client, factory, id, protocol_id, "zwp_gamepad_v1", ObjectKind::Gamepad)?;
        if self.seat.gamepad_state.connected {
            delegate.state_change(true);
        }
        self.seat.gamepads.insert(id, Device { client, delegate });
        Ok(())
    }

    /// Attaches a zwp_pointer_stylus_v1 to `pointer`. A pointer drives one
    /// stylus object; a newer one takes over from the previous.
    pub fn create_pointer_stylus(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        pointer: ObjectId,
        delegate: Box<dyn PointerStylusDelegate>,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.registry.resolve(client, pointer, ObjectKind::Pointer)?;
        self.registry
            .create(id, factory, "zwp_pointer_stylus_v1", protocol_id, ObjectKind::PointerStylus)?;
        let before = self.seat.styluses.len();
        self.seat.styluses.retain(|_, s| s.pointer != pointer);
        if self.seat.styluses.len() != before {
            debug!("{id} replaces the stylus of {pointer}");
        }
        self.seat.styluses.insert(
            id,
            Stylus {
                pointer,
                client,
                tool: ToolType::default(),
                delegate,
            },
        );
        Ok(())
    }

    /// Sends one stylus event to the pointer-focused client, announcing the
    /// current tool first where a stylus has not seen it yet. `f` returns
    /// whether it sent anything.
    fn stylus_event(&mut self, mut f: impl FnMut(&mut dyn PointerStylusDelegate) -> bool) {
        let Some(focus) = self.seat.pointer_focus else {
            return;
        };
        let tool = self.seat.tool;
        let mut sent = false;
        for stylus in self.seat.styluses.values_mut().filter(|s| s.client == focus.client) {
            if stylus.tool != tool {
                stylus.delegate.tool_change(tool);
                stylus.tool = tool;
                sent = true;
            }
            sent |= f(stylus.delegate.as_mut());
        }
        if sent {
            for_client(&mut self.seat.pointers, focus.client, |p| p.frame());
        }
    }

    pub fn pointer_tool_change(&mut self, tool: ToolType) {
        if self.seat.tool == tool {
            return;
        }
        trace!("pointer tool is now {:?}", tool);
        self.seat.tool = tool;
        self.stylus_event(|_| false);
    }

    pub fn pointer_force(&mut self, time: u32, force: f64) {
        self.stylus_event(|s| {
            s.force(time, force);
            true
        });
    }

    pub fn pointer_tilt(&mut self, time: u32, tilt: PointF) {
        self.stylus_event(|s| {
            s.tilt(time, tilt);
            true
        });
    }

    /// Moves pointer focus. `None` or a surface that no longer exists clears
    /// it.
    pub fn set_pointer_focus(&mut self, surface: Option<ObjectId>, position: PointF) {
        let Self {
            seat,
            surfaces,
            serials,
            ..
        } = self;
        let gained = surface.and_then(|id| surfaces.get(&id));
        let new_focus = gained.map(|s| Focus {
            surface: s.id(),
            client: s.client(),
        });
        seat.pointer_position = position;
        if seat.pointer_focus == new_focus {
            return;
        }
        if let Some(old) = seat.pointer_focus.take() {
            if let Some(lost) = surfaces.get(&old.surface) {
                let serial = serials.next();
                for_client(&mut seat.pointers, old.client, |p| {
                    p.leave(lost, serial);
                    p.frame();
                });
            }
        }
        if let (Some(focus), Some(gained)) = (new_focus, gained) {
            let serial = serials.next();
            for_client(&mut seat.pointers, focus.client, |p| {
                p.enter(gained, serial, position);
                p.frame();
            });
        }
        seat.pointer_focus = new_focus;
        self.stylus_event(|_| false);
    }

    pub fn pointer_motion(&mut self, time: u32, position: PointF) {
        self.seat.pointer_position = position;
        let Some(focus) = self.seat.pointer_focus else {
            return;
        };
        for_client(&mut self.seat.pointers, focus.client, |p| {
            p.motion(time, position);
            p.frame();
        });
    }

    pub fn pointer_button(&mut self, time: u32, button: u32, pressed: bool) {
        let buttons = &mut self.seat.pressed_buttons;
        if pressed {
            if !buttons.contains(&button) {
                buttons.push(button);
            }
        } else {
            buttons.retain(|b| *b != button);
        }
        let Some(focus) = self.seat.pointer_focus else {
            return;
        };
        let serial = self.serials.next();
        for_client(&mut self.seat.pointers, focus.client, |p| {
            p.button(serial, time, button, pressed);
            p.frame();
        });
    }

    pub fn pointer_axis(&mut self, time: u32, event: AxisEvent) {
        let Some(focus) = self.seat.pointer_focus else {
            return;
        };
        for_client(&mut self.seat.pointers, focus.client, |p| {
            p.axis(time, &event);
            p.frame();
        });
    }

    /// Assigns the cursor role to `surface` for a pointer of `client`. The
    /// request only takes effect while the client has pointer focus.
    pub fn set_cursor(
        &mut self,
        client: ClientId,
        pointer: ObjectId,
        surface: Option<ObjectId>,
        hotspot: Point,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, pointer, ObjectKind::Pointer)?;
        if let Some(surface) = surface {
            self.client_surface(client, surface)?;
            self.assign_role(surface, Role::Cursor, None)?;
        }
        if !self.seat.pointer_focus.is_some_and(|f| f.client == client) {
            debug!("{client} set a cursor without pointer focus, ignoring");
            return Ok(());
        }
        self.seat.cursor = surface.map(|surface| Cursor { surface, hotspot });
        Ok(())
    }

    /// Moves keyboard focus, carrying the keys already held down into the
    /// enter event.
    pub fn set_keyboard_focus(&mut self, surface: Option<ObjectId>) {
        let was_eligible = self.seat.gamepad_eligible();
        let Self {
            seat,
            surfaces,
            serials,
            ..
        } = self;
        let gained = surface.and_then(|id| surfaces.get(&id));
        let new_focus = gained.map(|s| Focus {
            surface: s.id(),
            client: s.client(),
        });
        if seat.keyboard_focus == new_focus {
            return;
        }
        if let Some(old) = seat.keyboard_focus.take() {
            if let Some(lost) = surfaces.get(&old.surface) {
                let serial = serials.next();
                for_client(&mut seat.keyboards, old.client, |k| k.leave(lost, serial));
            }
        }
        if let (Some(focus), Some(gained)) = (new_focus, gained) {
            let serial = serials.next();
            let modifiers_serial = serials.next();
            let keys = seat.pressed_keys.clone();
            let modifiers = seat.modifiers;
            for_client(&mut seat.keyboards, focus.client, |k| {
                k.enter(gained, serial, &keys);
                k.modifiers(modifiers_serial, &modifiers);
            });
        }
        seat.keyboard_focus = new_focus;
        if was_eligible != self.seat.gamepad_eligible() {
            trace!("gamepad eligibility is now {}", self.seat.gamepad_eligible());
        }
    }

    pub fn keyboard_key(&mut self, time: u32, key: u32, pressed: bool) {
        let keys = &mut self.seat.pressed_keys;
        if pressed {
            if !keys.contains(&key) {
                keys.push(key);
            }
        } else {
            keys.retain(|k| *k != key);
        }
        let Some(focus) = self.seat.keyboard_focus else {
            return;
        };
        let serial = self.serials.next();
        for_client(&mut self.seat.keyboards, focus.client, |k| {
            k.key(serial, time, key, pressed)
        });
    }

    pub fn keyboard_modifiers(&mut self, modifiers: Modifiers) {
        if self.seat.modifiers == modifiers {
            return;
        }
        self.seat.modifiers = modifiers;
        let Some(focus) = self.seat.keyboard_focus else {
            return;
        };
        let serial = self.serials.next();
        for_client(&mut self.seat.keyboards, focus.client, |k| {
            k.modifiers(serial, &modifiers)
        });
    }

    /// Starts a touch point on `surface`. Later motion and up events for the
    /// same id only reach that surface's client.
    pub fn touch_down(&mut self, time: u32, id: i32, surface: ObjectId, position: PointF) {
        let Self {
            seat,
            surfaces,
            serials,
            ..
        } = self;
        let Some(target) = surfaces.get(&surface) else {
            return;
        };
        let focus = Focus {
            surface,
            client: target.client(),
        };
        seat.touch_points.insert(id, focus);
        seat.touch_frame.insert(focus.client);
        let serial = serials.next();
        for_client(&mut seat.touches, focus.client, |t| {
            t.down(target, serial, time, id, position)
        });
    }

    pub fn touch_up(&mut self, time: u32, id: i32) {
        let Some(focus) = self.seat.touch_points.remove(&id) else {
            return;
        };
        self.seat.touch_frame.insert(focus.client);
        let serial = self.serials.next();
        for_client(&mut self.seat.touches, focus.client, |t| t.up(serial, time, id));
    }

    pub fn touch_motion(&mut self, time: u32, id: i32, position: PointF) {
        let Some(focus) = self.seat.touch_points.get(&id).copied() else {
            return;
        };
        self.seat.touch_frame.insert(focus.client);
        for_client(&mut self.seat.touches, focus.client, |t| {
            t.motion(time, id, position)
        });
    }

    /// Ends a batch of touch events for every client that saw one
    pub fn touch_frame(&mut self) {
        let clients = std::mem::take(&mut self.seat.touch_frame);
        for client in clients {
            for_client(&mut self.seat.touches, client, |t| t.frame());
        }
    }

    pub fn touch_cancel(&mut self) {
        let clients: BTreeSet<ClientId> = self.seat.touch_points.values().map(|f| f.client).collect();
        self.seat.touch_points.clear();
        self.seat.touch_frame.clear();
        for client in clients {
            for_client(&mut self.seat.touches, client, |t| t.cancel());
        }
    }

    /// Whether the background gamepad poller should be running
    pub fn gamepad_polling_wanted(&self) -> bool {
        self.seat.gamepad_eligible()
    }

    /// Applies one whole-state snapshot from the poller. The changes reach
    /// the gamepads of the keyboard-focused client, closed by one frame.
    pub fn gamepad_snapshot(&mut self, time: u32, snapshot: GamepadSnapshot) {
        let changes = diff_gamepad(&self.seat.gamepad_state, &snapshot);
        self.seat.gamepad_state = snapshot;
        if changes.is_empty() {
            return;
        }
        let Some(focus) = self.seat.keyboard_focus else {
            trace!("{} gamepad change(s) without focus", changes.len());
            return;
        };
        for_client(&mut self.seat.gamepads, focus.client, |g| {
            for change in &changes {
                match *change {
                    GamepadChange::Connected(connected) => g.state_change(connected),
                    GamepadChange::Axis { axis, value } => g.axis(time, axis, value),
                    GamepadChange::Button {
                        button,
                        pressed,
                        analog,
                    } => g.button(time, button, pressed, analog),
                }
            }
            g.frame(time);
        });
    }
}
