//! Recording collaborators and delegates for unit tests

use crate::buffer::{Buffer, ShmPool};
use crate::compositor::Compositor;
use crate::geometry::{Point, PointF, Rect, Size};
use crate::host::{Renderer, StaticDisplays, WindowHost};
use crate::output::{DisplayInfo, OutputDelegate, OutputMetrics, Rotation};
use crate::region::Region;
use crate::registry::ObjectId;
use crate::seat::{
    AxisEvent, GamepadDelegate, KeyboardDelegate, Modifiers, PointerDelegate, PointerStylusDelegate,
    ToolType, TouchDelegate,
};
use crate::shell::{
    Configure, Interaction, RemoteShellConfiguration, RemoteShellDelegate, ShellSurfaceDelegate,
    WindowState,
};
use crate::surface::{Surface, SurfaceUpdate};
use std::cell::RefCell;
use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::sync::Arc;

/// One committed state as the renderer saw it
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CommitRecord {
    pub surface: ObjectId,
    pub buffer: Option<ObjectId>,
    pub damage: Region,
    pub position: Point,
    pub stacking: Vec<ObjectId>,
}

/// What the renderer and window host were told
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub commits: Vec<CommitRecord>,
    pub destroyed_surfaces: Vec<ObjectId>,
    pub windows: Vec<(ObjectId, Rect, WindowState)>,
    pub destroyed_windows: Vec<ObjectId>,
    pub interactions: Vec<(ObjectId, Interaction)>,
    pub titles: Vec<(ObjectId, String)>,
}

struct RecordingRenderer(Rc<RefCell<Recorder>>);

impl Renderer for RecordingRenderer {
    fn surface_committed(&mut self, update: &SurfaceUpdate<'_>) {
        self.0.borrow_mut().commits.push(CommitRecord {
            surface: update.surface,
            buffer: update.buffer.map(|(id, _)| id),
            damage: update.damage.clone(),
            position: update.position,
            stacking: update.stacking.to_vec(),
        });
    }

    fn surface_destroyed(&mut self, surface: ObjectId) {
        self.0.borrow_mut().destroyed_surfaces.push(surface);
    }
}

struct RecordingHost(Rc<RefCell<Recorder>>);

impl WindowHost for RecordingHost {
    fn window_state_changed(&mut self, window: ObjectId, bounds: Rect, state: WindowState) {
        self.0.borrow_mut().windows.push((window, bounds, state));
    }

    fn window_destroyed(&mut self, window: ObjectId) {
        self.0.borrow_mut().destroyed_windows.push(window);
    }

    fn interaction_requested(&mut self, window: ObjectId, interaction: Interaction) {
        self.0.borrow_mut().interactions.push((window, interaction));
    }

    fn title_changed(&mut self, window: ObjectId, title: &str) {
        self.0.borrow_mut().titles.push((window, title.to_string()));
    }
}

pub(crate) fn display() -> DisplayInfo {
    DisplayInfo {
        id: 1,
        name: "test-1".to_string(),
        bounds: Rect::new(0, 0, 1920, 1080),
        work_area: Rect::new(0, 0, 1920, 1040),
        dpi: 96.0,
        scale: 1.0,
        rotation: Rotation::None,
        refresh_mhz: 60_000,
    }
}

/// A compositor with one 1920x1080 display and recording collaborators
pub(crate) fn headless() -> (Compositor, Rc<RefCell<Recorder>>) {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let compositor = Compositor::new(
        Box::new(RecordingRenderer(recorder.clone())),
        Box::new(RecordingHost(recorder.clone())),
        Box::new(StaticDisplays::new(vec![display()])),
    );
    (compositor, recorder)
}

/// An ARGB8888 buffer backed by an anonymous temporary file
pub(crate) fn shm_buffer(width: i32, height: i32) -> Buffer {
    let stride = width * 4;
    let len = (stride * height) as usize;
    let file = tempfile::tempfile().expect("tempfile");
    file.set_len(len as u64).expect("size pool");
    let pool = ShmPool::new(OwnedFd::from(file), len).expect("pool");
    Buffer::from_shared_memory(Arc::new(pool), 0, 0, stride, Size::new(width, height))
        .expect("buffer")
}

/// Every delegate call, in order
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Configure(Configure),
    Close,
    StateChanged(WindowState, WindowState),
    PopupDone,
    PointerEnter { surface: ObjectId, serial: u32 },
    PointerLeave { surface: ObjectId, serial: u32 },
    Motion(PointF),
    Button { button: u32, pressed: bool },
    Axis(AxisEvent),
    PointerFrame,
    KeyboardEnter { surface: ObjectId, serial: u32, keys: Vec<u32> },
    KeyboardLeave { surface: ObjectId, serial: u32 },
    Key { key: u32, pressed: bool },
    Modifiers { serial: u32, modifiers: Modifiers },
    TouchDown { surface: ObjectId, id: i32 },
    TouchUp { id: i32 },
    TouchMotion { id: i32 },
    TouchFrame,
    TouchCancel,
    ToolChange(ToolType),
    Force(f64),
    Tilt(PointF),
    GamepadState(bool),
    GamepadAxis { axis: u32, value: f64 },
    GamepadButton { button: u32, pressed: bool },
    GamepadFrame,
    Output(OutputMetrics),
    RemoteConfiguration(RemoteShellConfiguration),
    Activated {
        gained: Option<ObjectId>,
        lost: Option<ObjectId>,
    },
}

pub(crate) type EventLog = Rc<RefCell<Vec<Event>>>;

pub(crate) fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Implements every delegate trait by appending to a shared log
pub(crate) struct Recording(pub EventLog);

impl Recording {
    pub fn boxed(log: &EventLog) -> Box<Self> {
        Box::new(Self(log.clone()))
    }

    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }
}

impl ShellSurfaceDelegate for Recording {
    fn configure(&mut self, configure: &Configure) {
        self.push(Event::Configure(*configure));
    }

    fn close(&mut self) {
        self.push(Event::Close);
    }

    fn state_changed(&mut self, old: WindowState, new: WindowState) {
        self.push(Event::StateChanged(old, new));
    }

    fn popup_done(&mut self) {
        self.push(Event::PopupDone);
    }
}

impl PointerDelegate for Recording {
    fn enter(&mut self, surface: &Surface, serial: u32, _position: PointF) {
        self.push(Event::PointerEnter {
            surface: surface.id(),
            serial,
        });
    }

    fn leave(&mut self, surface: &Surface, serial: u32) {
        self.push(Event::PointerLeave {
            surface: surface.id(),
            serial,
        });
    }

    fn motion(&mut self, _time: u32, position: PointF) {
        self.push(Event::Motion(position));
    }

    fn button(&mut self, _serial: u32, _time: u32, button: u32, pressed: bool) {
        self.push(Event::Button { button, pressed });
    }

    fn axis(&mut self, _time: u32, event: &AxisEvent) {
        self.push(Event::Axis(*event));
    }

    fn frame(&mut self) {
        self.push(Event::PointerFrame);
    }
}

impl KeyboardDelegate for Recording {
    fn enter(&mut self, surface: &Surface, serial: u32, keys: &[u32]) {
        self.push(Event::KeyboardEnter {
            surface: surface.id(),
            serial,
            keys: keys.to_vec(),
        });
    }

    fn leave(&mut self, surface: &Surface, serial: u32) {
        self.push(Event::KeyboardLeave {
            surface: surface.id(),
            serial,
        });
    }

    fn key(&mut self, _serial: u32, _time: u32, key: u32, pressed: bool) {
        self.push(Event::Key { key, pressed });
    }

    fn modifiers(&mut self, serial: u32, modifiers: &Modifiers) {
        self.push(Event::Modifiers {
            serial,
            modifiers: *modifiers,
        });
    }
}

impl PointerStylusDelegate for Recording {
    fn tool_change(&mut self, tool: ToolType) {
        self.push(Event::ToolChange(tool));
    }

    fn force(&mut self, _time: u32, force: f64) {
        self.push(Event::Force(force));
    }

    fn tilt(&mut self, _time: u32, tilt: PointF) {
        self.push(Event::Tilt(tilt));
    }
}

impl TouchDelegate for Recording {
    fn down(&mut self, surface: &Surface, _serial: u32, _time: u32, id: i32, _position: PointF) {
        self.push(Event::TouchDown {
            surface: surface.id(),
            id,
        });
    }

    fn up(&mut self, _serial: u32, _time: u32, id: i32) {
        self.push(Event::TouchUp { id });
    }

    fn motion(&mut self, _time: u32, id: i32, _position: PointF) {
        self.push(Event::TouchMotion { id });
    }

    fn frame(&mut self) {
        self.push(Event::TouchFrame);
    }

    fn cancel(&mut self) {
        self.push(Event::TouchCancel);
    }
}

impl GamepadDelegate for Recording {
    fn state_change(&mut self, connected: bool) {
        self.push(Event::GamepadState(connected));
    }

    fn axis(&mut self, _time: u32, axis: u32, value: f64) {
        self.push(Event::GamepadAxis { axis, value });
    }

    fn button(&mut self, _time: u32, button: u32, pressed: bool, _analog: f64) {
        self.push(Event::GamepadButton { button, pressed });
    }

    fn frame(&mut self, _time: u32) {
        self.push(Event::GamepadFrame);
    }
}

impl OutputDelegate for Recording {
    fn metrics(&mut self, metrics: &OutputMetrics) {
        self.push(Event::Output(metrics.clone()));
    }
}

impl RemoteShellDelegate for Recording {
    fn configuration_changed(&mut self, configuration: &RemoteShellConfiguration) {
        self.push(Event::RemoteConfiguration(configuration.clone()));
    }

    fn activated(&mut self, gained: Option<&Surface>, lost: Option<&Surface>) {
        self.push(Event::Activated {
            gained: gained.map(Surface::id),
            lost: lost.map(Surface::id),
        });
    }
}

/// Last configure in the log
pub(crate) fn last_configure(log: &EventLog) -> Option<Configure> {
    log.borrow().iter().rev().find_map(|e| match e {
        Event::Configure(c) => Some(*c),
        _ => None,
    })
}
