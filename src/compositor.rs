//! Scene core context
//!
//! [`Compositor`] owns every piece of protocol state: the resource registry,
//! surfaces, buffers, regions, shell surfaces, the seat and the output
//! publisher. It knows nothing about sockets or wire encoding. Frontends feed
//! it already-decoded requests and receive events back through the delegate
//! traits each object is created with.
//!
//! Operations are grouped by concern across modules (`surface`, `shell`,
//! `seat`, `output`), each adding its own `impl Compositor` block.

use crate::buffer::Buffer;
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::Rect;
use crate::host::{DisplayEnumerator, Renderer, WindowHost};
use crate::output::OutputPublisher;
use crate::region::Region;
use crate::registry::{ClientId, ObjectId, ObjectKind, Registry, RegistryError};
use crate::seat::Seat;
use crate::shell::{LayoutMode, RemoteShellBinding, ShellSurface};
use crate::surface::{Extension, Surface};
use crate::vsync::VSyncPublisher;
use log::{debug, info, trace};
use std::collections::{BTreeMap, HashMap};

/// Event serial source shared by every object. Serials start at 1 and only
/// ever increase.
#[derive(Debug, Default)]
pub struct SerialCounter {
    last: u32,
}

impl SerialCounter {
    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        self.last
    }

    pub fn last(&self) -> u32 {
        self.last
    }
}

pub struct Compositor {
    pub(crate) registry: Registry,
    pub(crate) serials: SerialCounter,
    pub(crate) surfaces: BTreeMap<ObjectId, Surface>,
    pub(crate) buffers: HashMap<ObjectId, Buffer>,
    pub(crate) regions: HashMap<ObjectId, Region>,
    pub(crate) callbacks: HashMap<ObjectId, Box<dyn FnOnce(u32)>>,
    /// wl_subsurface object to the surface carrying the role
    pub(crate) subsurfaces: HashMap<ObjectId, ObjectId>,
    pub(crate) extensions: HashMap<ObjectId, Extension>,
    pub(crate) shells: BTreeMap<ObjectId, ShellSurface>,
    pub(crate) active_window: Option<ObjectId>,
    pub(crate) remote_shells: BTreeMap<ObjectId, RemoteShellBinding>,
    pub(crate) layout_mode: LayoutMode,
    pub(crate) seat: Seat,
    pub(crate) outputs: OutputPublisher,
    pub(crate) vsync: VSyncPublisher,
    pub(crate) renderer: Box<dyn Renderer>,
    pub(crate) window_host: Box<dyn WindowHost>,
    pub(crate) displays: Box<dyn DisplayEnumerator>,
}

impl Compositor {
    pub fn new(
        renderer: Box<dyn Renderer>,
        window_host: Box<dyn WindowHost>,
        displays: Box<dyn DisplayEnumerator>,
    ) -> Self {
        info!("Scene core ready with {} display(s)", displays.displays().len());
        Self {
            registry: Registry::new(),
            serials: SerialCounter::default(),
            surfaces: BTreeMap::new(),
            buffers: HashMap::new(),
            regions: HashMap::new(),
            callbacks: HashMap::new(),
            subsurfaces: HashMap::new(),
            extensions: HashMap::new(),
            shells: BTreeMap::new(),
            active_window: None,
            remote_shells: BTreeMap::new(),
            layout_mode: LayoutMode::default(),
            seat: Seat::new(),
            outputs: OutputPublisher::new(),
            vsync: VSyncPublisher::new(),
            renderer,
            window_host,
            displays,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn next_serial(&mut self) -> u32 {
        self.serials.next()
    }

    pub fn connect_client(&mut self) -> ClientId {
        let client = self.registry.connect_client();
        debug!("{client} connected");
        client
    }

    /// Destroys every object the client still owns, newest first so that
    /// children go before the factories they were created from.
    pub fn disconnect_client(&mut self, client: ClientId) {
        let objects = self.registry.objects_of(client);
        debug!("{client} disconnected, sweeping {} object(s)", objects.len());
        for id in objects.into_iter().rev() {
            self.destroy_object(id);
        }
    }

    pub fn allocate_id(&mut self) -> ObjectId {
        self.registry.allocate()
    }

    /// True while the object is bound. Requests on objects that were
    /// destroyed server-side (by a cascade) are ignored by frontends.
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.registry.contains(id)
    }

    pub fn owner(&self, id: ObjectId) -> Option<ClientId> {
        self.registry.owner(id)
    }

    /// Binds a global for `client` under a previously allocated id
    pub fn register_global(
        &mut self,
        id: ObjectId,
        client: ClientId,
        interface: &'static str,
        version: u32,
        protocol_id: u32,
    ) -> ProtocolResult<()> {
        self.registry
            .bind(id, client, interface, version, protocol_id, ObjectKind::Global)?;
        Ok(())
    }

    pub fn bind_global(
        &mut self,
        client: ClientId,
        interface: &'static str,
        version: u32,
        protocol_id: u32,
    ) -> ProtocolResult<ObjectId> {
        let id = self.allocate_id();
        self.register_global(id, client, interface, version, protocol_id)?;
        Ok(id)
    }

    pub fn create_region(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.registry
            .create(id, factory, "wl_region", protocol_id, ObjectKind::Region)?;
        self.regions.insert(id, Region::new());
        Ok(())
    }

    fn client_region(&mut self, client: ClientId, id: ObjectId) -> ProtocolResult<&mut Region> {
        self.registry.resolve(client, id, ObjectKind::Region)?;
        self.regions
            .get_mut(&id)
            .ok_or_else(|| RegistryError::Stale(id).into())
    }

    pub fn region_add(&mut self, client: ClientId, region: ObjectId, rect: Rect) -> ProtocolResult<()> {
        self.client_region(client, region)?.add(rect);
        Ok(())
    }

    pub fn region_subtract(
        &mut self,
        client: ClientId,
        region: ObjectId,
        rect: Rect,
    ) -> ProtocolResult<()> {
        self.client_region(client, region)?.subtract(rect);
        Ok(())
    }

    pub fn region(&self, id: ObjectId) -> Option<&Region> {
        self.regions.get(&id)
    }

    /// Registers a validated buffer created from a wl_shm pool or dma-buf
    /// params object belonging to `factory`.
    pub fn create_buffer(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        buffer: Buffer,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.registry
            .create(id, factory, "wl_buffer", protocol_id, ObjectKind::Buffer)?;
        trace!("{id} is a {} {:?} buffer", buffer.size(), buffer.format());
        self.buffers.insert(id, buffer);
        Ok(())
    }

    pub fn buffer(&self, id: ObjectId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    /// Installs the hook fired when the compositor stops reading the buffer
    pub fn set_buffer_release<F: FnMut() + 'static>(&mut self, id: ObjectId, release: F) -> bool {
        match self.buffers.get_mut(&id) {
            Some(buffer) => {
                buffer.set_release_callback(release);
                true
            }
            None => false,
        }
    }

    /// Client-initiated destroy request. Only the owner may destroy.
    pub fn destroy(&mut self, client: ClientId, id: ObjectId) -> ProtocolResult<()> {
        let owner = self.registry.owner(id).ok_or(RegistryError::Stale(id))?;
        if owner != client {
            return Err(ProtocolError::Registry(RegistryError::Foreign {
                object: id,
                owner,
                caller: client,
            }));
        }
        self.destroy_object(id);
        Ok(())
    }

    /// Tears down the native object behind `id` and everything that cascades
    /// from it, then removes the binding. Unknown ids are ignored.
    pub fn destroy_object(&mut self, id: ObjectId) {
        let Some(kind) = self.registry.kind(id) else {
            return;
        };
        match kind {
            ObjectKind::Surface => self.destroy_surface(id),
            ObjectKind::Region => {
                self.regions.remove(&id);
            }
            ObjectKind::Buffer => {
                self.buffers.remove(&id);
            }
            ObjectKind::Callback => {
                self.callbacks.remove(&id);
            }
            ObjectKind::SubSurface => self.destroy_subsurface(id),
            ObjectKind::ShellSurface => self.destroy_shell_surface(id),
            ObjectKind::Pointer
            | ObjectKind::Keyboard
            | ObjectKind::Touch
            | ObjectKind::Gamepad
            | ObjectKind::PointerStylus => self.seat.remove_device(id),
            ObjectKind::Output => self.outputs.unbind(id),
            ObjectKind::VSyncTiming => self.vsync.remove(id),
            ObjectKind::Viewport | ObjectKind::Security | ObjectKind::Blending => {
                self.destroy_extension(id)
            }
            ObjectKind::Global => {
                self.remote_shells.remove(&id);
            }
        }
        self.registry.destroy(id);
    }
}
