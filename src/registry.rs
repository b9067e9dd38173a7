//! Resource registry
//!
//! Every protocol object a client creates is bound here to a server-side
//! [`ObjectId`]. The registry records who owns the object, which wire id it
//! uses inside that client's namespace, and an optional destructor hook run
//! when the binding goes away. Requests naming another object resolve it
//! through [`Registry::resolve`], which is where foreign and stale references
//! are caught.

use log::trace;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Connection identity, allocated when a client connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Server-side object identity. Never reused for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Native object category behind a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A bound global (wl_compositor, wl_shm, ...)
    Global,
    Surface,
    Region,
    Buffer,
    Callback,
    SubSurface,
    ShellSurface,
    Pointer,
    Keyboard,
    Touch,
    Gamepad,
    PointerStylus,
    Output,
    VSyncTiming,
    Viewport,
    Security,
    Blending,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} does not exist or was destroyed")]
    Stale(ObjectId),

    #[error("{object} belongs to {owner}, not {caller}")]
    Foreign {
        object: ObjectId,
        owner: ClientId,
        caller: ClientId,
    },

    #[error("{object} is a {actual:?}, expected {expected:?}")]
    WrongKind {
        object: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("wire id {protocol_id} already in use by {client}")]
    IdInUse { client: ClientId, protocol_id: u32 },

    #[error("{0} was never allocated")]
    Unallocated(ObjectId),
}

type Destructor = Box<dyn FnOnce()>;

pub struct Entry {
    pub client: ClientId,
    pub protocol_id: u32,
    pub interface: &'static str,
    pub version: u32,
    pub kind: ObjectKind,
    pub parent: Option<ObjectId>,
    destructor: Option<Destructor>,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("client", &self.client)
            .field("protocol_id", &self.protocol_id)
            .field("interface", &self.interface)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Default)]
pub struct Registry {
    next_client: u64,
    next_object: u64,
    entries: BTreeMap<ObjectId, Entry>,
    wire_ids: HashMap<(ClientId, u32), ObjectId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_client(&mut self) -> ClientId {
        self.next_client += 1;
        ClientId(self.next_client)
    }

    /// Reserves a fresh object id. The frontend needs the id before the wire
    /// object exists, so allocation and binding are separate steps.
    pub fn allocate(&mut self) -> ObjectId {
        self.next_object += 1;
        ObjectId(self.next_object)
    }

    /// Binds a global (or any root object) for `client`
    pub fn bind(
        &mut self,
        id: ObjectId,
        client: ClientId,
        interface: &'static str,
        version: u32,
        protocol_id: u32,
        kind: ObjectKind,
    ) -> Result<(), RegistryError> {
        if id.0 == 0 || id.0 > self.next_object {
            return Err(RegistryError::Unallocated(id));
        }
        if self.wire_ids.contains_key(&(client, protocol_id)) {
            return Err(RegistryError::IdInUse {
                client,
                protocol_id,
            });
        }
        trace!("bind {id} {interface} v{version} wire={protocol_id} for {client}");
        self.wire_ids.insert((client, protocol_id), id);
        self.entries.insert(
            id,
            Entry {
                client,
                protocol_id,
                interface,
                version,
                kind,
                parent: None,
                destructor: None,
            },
        );
        Ok(())
    }

    /// Creates a child object from a factory the same client owns. Version
    /// and owner are inherited from the parent.
    pub fn create(
        &mut self,
        id: ObjectId,
        parent: ObjectId,
        interface: &'static str,
        protocol_id: u32,
        kind: ObjectKind,
    ) -> Result<(), RegistryError> {
        let (client, version) = {
            let parent_entry = self.get(parent).ok_or(RegistryError::Stale(parent))?;
            (parent_entry.client, parent_entry.version)
        };
        self.bind(id, client, interface, version, protocol_id, kind)?;
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.parent = Some(parent);
        }
        Ok(())
    }

    pub fn set_destructor<F: FnOnce() + 'static>(&mut self, id: ObjectId, destructor: F) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.destructor = Some(Box::new(destructor));
        }
    }

    pub fn get(&self, id: ObjectId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn owner(&self, id: ObjectId) -> Option<ClientId> {
        self.entries.get(&id).map(|e| e.client)
    }

    pub fn kind(&self, id: ObjectId) -> Option<ObjectKind> {
        self.entries.get(&id).map(|e| e.kind)
    }

    pub fn find(&self, client: ClientId, protocol_id: u32) -> Option<ObjectId> {
        self.wire_ids.get(&(client, protocol_id)).copied()
    }

    /// Resolves a reference made by `caller`, enforcing ownership and kind
    pub fn resolve(
        &self,
        caller: ClientId,
        id: ObjectId,
        expected: ObjectKind,
    ) -> Result<&Entry, RegistryError> {
        let entry = self.entries.get(&id).ok_or(RegistryError::Stale(id))?;
        if entry.client != caller {
            return Err(RegistryError::Foreign {
                object: id,
                owner: entry.client,
                caller,
            });
        }
        if entry.kind != expected {
            return Err(RegistryError::WrongKind {
                object: id,
                expected,
                actual: entry.kind,
            });
        }
        Ok(entry)
    }

    /// Removes the binding and runs its destructor. Destroying an id that is
    /// already gone returns `None` and does nothing else.
    pub fn destroy(&mut self, id: ObjectId) -> Option<Entry> {
        let mut entry = self.entries.remove(&id)?;
        self.wire_ids.remove(&(entry.client, entry.protocol_id));
        trace!("destroy {id} {} for {}", entry.interface, entry.client);
        if let Some(destructor) = entry.destructor.take() {
            destructor();
        }
        Some(entry)
    }

    /// Objects owned by `client`, oldest first
    pub fn objects_of(&self, client: ClientId) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.client == client)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn children_of(&self, parent: ObjectId) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
