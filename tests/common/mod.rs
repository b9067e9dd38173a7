//! Shared helpers for the integration tests

#![allow(dead_code)]

use hearth::buffer::{Buffer, ShmPool};
use hearth::geometry::{Rect, Size};
use hearth::host::{Renderer, StaticDisplays, WindowHost};
use hearth::output::{DisplayInfo, Rotation};
use hearth::registry::{ClientId, ObjectId};
use hearth::shell::{Configure, ShellSurfaceDelegate, WindowState};
use hearth::surface::SurfaceUpdate;
use hearth::Compositor;
use std::cell::RefCell;
use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::sync::Arc;

/// What the collaborators saw, in order
#[derive(Debug, Default)]
pub struct Seen {
    /// (surface, committed buffer, stacking)
    pub commits: Vec<(ObjectId, Option<ObjectId>, Vec<ObjectId>)>,
    pub destroyed_surfaces: Vec<ObjectId>,
    pub windows: Vec<(ObjectId, Rect, WindowState)>,
    pub destroyed_windows: Vec<ObjectId>,
    pub configures: Vec<Configure>,
    pub state_changes: Vec<(WindowState, WindowState)>,
}

pub type Shared = Rc<RefCell<Seen>>;

struct Paint(Shared);

impl Renderer for Paint {
    fn surface_committed(&mut self, update: &SurfaceUpdate<'_>) {
        self.0.borrow_mut().commits.push((
            update.surface,
            update.buffer.map(|(id, _)| id),
            update.stacking.to_vec(),
        ));
    }

    fn surface_destroyed(&mut self, surface: ObjectId) {
        self.0.borrow_mut().destroyed_surfaces.push(surface);
    }
}

struct Host(Shared);

impl WindowHost for Host {
    fn window_state_changed(&mut self, window: ObjectId, bounds: Rect, state: WindowState) {
        self.0.borrow_mut().windows.push((window, bounds, state));
    }

    fn window_destroyed(&mut self, window: ObjectId) {
        self.0.borrow_mut().destroyed_windows.push(window);
    }
}

pub struct Window(pub Shared);

impl ShellSurfaceDelegate for Window {
    fn configure(&mut self, configure: &Configure) {
        self.0.borrow_mut().configures.push(*configure);
    }

    fn state_changed(&mut self, old: WindowState, new: WindowState) {
        self.0.borrow_mut().state_changes.push((old, new));
    }
}

pub fn display() -> DisplayInfo {
    DisplayInfo {
        id: 7,
        name: "it-7".to_string(),
        bounds: Rect::new(0, 0, 1280, 800),
        work_area: Rect::new(0, 0, 1280, 760),
        dpi: 96.0,
        scale: 1.0,
        rotation: Rotation::None,
        refresh_mhz: 60_000,
    }
}

pub fn compositor() -> (Compositor, Shared) {
    let seen = Shared::default();
    let compositor = Compositor::new(
        Box::new(Paint(seen.clone())),
        Box::new(Host(seen.clone())),
        Box::new(StaticDisplays::new(vec![display()])),
    );
    (compositor, seen)
}

/// ARGB8888 buffer over an anonymous file
pub fn shm_buffer(width: i32, height: i32) -> Buffer {
    let stride = width * 4;
    let len = (stride * height) as usize;
    let file = tempfile::tempfile().expect("tempfile");
    file.set_len(len as u64).expect("size pool");
    let pool = ShmPool::new(OwnedFd::from(file), len).expect("pool");
    Buffer::from_shared_memory(Arc::new(pool), 0, 0, stride, Size::new(width, height)).expect("buffer")
}

/// One connected client with the globals most scenarios need
pub struct Client {
    pub id: ClientId,
    pub wl_compositor: ObjectId,
    pub wl_shm: ObjectId,
    pub subcompositor: ObjectId,
    pub wm_base: ObjectId,
    next_protocol_id: u32,
}

impl Client {
    pub fn connect(c: &mut Compositor) -> Self {
        let id = c.connect_client();
        let wl_compositor = c.bind_global(id, "wl_compositor", 4, 1).expect("wl_compositor");
        let wl_shm = c.bind_global(id, "wl_shm", 1, 2).expect("wl_shm");
        let subcompositor = c.bind_global(id, "wl_subcompositor", 1, 3).expect("wl_subcompositor");
        let wm_base = c.bind_global(id, "xdg_wm_base", 1, 4).expect("xdg_wm_base");
        Self {
            id,
            wl_compositor,
            wl_shm,
            subcompositor,
            wm_base,
            next_protocol_id: 10,
        }
    }

    pub fn protocol_id(&mut self) -> u32 {
        self.next_protocol_id += 1;
        self.next_protocol_id
    }

    pub fn surface(&mut self, c: &mut Compositor) -> ObjectId {
        let id = c.allocate_id();
        let pid = self.protocol_id();
        c.create_surface(self.id, self.wl_compositor, id, pid).expect("surface");
        id
    }

    pub fn buffer(&mut self, c: &mut Compositor, width: i32, height: i32) -> ObjectId {
        let id = c.allocate_id();
        let pid = self.protocol_id();
        c.create_buffer(self.id, self.wl_shm, id, pid, shm_buffer(width, height))
            .expect("buffer");
        id
    }

    pub fn subsurface(&mut self, c: &mut Compositor, surface: ObjectId, parent: ObjectId) -> ObjectId {
        let id = c.allocate_id();
        let pid = self.protocol_id();
        c.create_subsurface(self.id, self.subcompositor, id, pid, surface, parent)
            .expect("subsurface");
        id
    }

    pub fn toplevel(&mut self, c: &mut Compositor, surface: ObjectId, seen: &Shared) -> ObjectId {
        let id = c.allocate_id();
        let pid = self.protocol_id();
        c.create_shell_surface(
            self.id,
            self.wm_base,
            id,
            pid,
            surface,
            hearth::surface::Role::Toplevel,
            hearth::shell::ShellFlavor::Stable,
            Box::new(Window(seen.clone())),
        )
        .expect("toplevel");
        id
    }
}
