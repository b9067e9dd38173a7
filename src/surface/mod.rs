//! Surfaces and the commit pipeline
//!
//! A [`Surface`] holds a pending and a committed attribute record. Requests
//! only touch the pending side; `commit` promotes it atomically. Sub-surfaces
//! in synchronized mode cache their commits until the parent commits, at
//! which point the parent's state is applied first and then each child in
//! creation order.
//!
//! # Usage
//!
//! ```no_run
//! # use hearth::compositor::Compositor;
//! # use hearth::geometry::Rect;
//! # fn demo(c: &mut Compositor) -> hearth::error::ProtocolResult<()> {
//! let client = c.connect_client();
//! let factory = c.bind_global(client, "wl_compositor", 3, 1)?;
//! let surface = c.allocate_id();
//! c.create_surface(client, factory, surface, 2)?;
//! c.damage(client, surface, Rect::new(0, 0, 64, 64))?;
//! c.commit(client, surface)?;
//! # Ok(())
//! # }
//! ```

use crate::compositor::Compositor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::{Point, Rect, RectF, Size};
use crate::properties::{PropertyKey, PropertyStore};
use crate::region::Region;
use crate::registry::{ClientId, ObjectId, ObjectKind};
use log::{debug, trace, warn};

#[cfg(test)]
mod tests;

/// Set while a wp_viewport object exists for the surface
pub static HAS_VIEWPORT: PropertyKey<bool> = PropertyKey::new("has-viewport", || false);
/// Set while a zwp_security_v1 object exists for the surface
pub static HAS_SECURITY: PropertyKey<bool> = PropertyKey::new("has-security", || false);
/// Set while a zwp_blending_v1 object exists for the surface
pub static HAS_BLENDING: PropertyKey<bool> = PropertyKey::new("has-blending", || false);

/// The single window-management capability a surface may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Cursor,
    SubSurface,
    Toplevel,
    Popup,
    Notification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Transform::Normal,
            1 => Transform::Rotate90,
            2 => Transform::Rotate180,
            3 => Transform::Rotate270,
            4 => Transform::Flipped,
            5 => Transform::Flipped90,
            6 => Transform::Flipped180,
            7 => Transform::Flipped270,
            _ => return None,
        })
    }

    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Transform::Rotate90 | Transform::Rotate270 | Transform::Flipped90 | Transform::Flipped270
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    None,
    #[default]
    Premultiplied,
    Coverage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub source: Option<RectF>,
    pub destination: Option<Size>,
}

/// Double-buffered surface attributes
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceAttributes {
    pub buffer: Option<ObjectId>,
    pub buffer_offset: Point,
    pub opaque_region: Region,
    pub input_region: Region,
    pub buffer_scale: i32,
    pub buffer_transform: Transform,
    pub viewport: Viewport,
    pub only_visible_on_secure_output: bool,
    pub blend_mode: BlendMode,
    pub alpha: f32,
}

impl Default for SurfaceAttributes {
    fn default() -> Self {
        Self {
            buffer: None,
            buffer_offset: Point::default(),
            opaque_region: Region::new(),
            input_region: Region::infinite(),
            buffer_scale: 1,
            buffer_transform: Transform::Normal,
            viewport: Viewport::default(),
            only_visible_on_secure_output: false,
            blend_mode: BlendMode::default(),
            alpha: 1.0,
        }
    }
}

/// Everything a commit carries from the pending side
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitState {
    pub attributes: SurfaceAttributes,
    pub damage: Region,
    pub has_contents: bool,
    pub callbacks: Vec<ObjectId>,
}

impl CommitState {
    /// Folds a newer commit on top of this one. Attributes follow the newer
    /// snapshot, damage and callbacks accumulate.
    fn merge(&mut self, newer: CommitState) {
        let buffer = if newer.has_contents {
            newer.attributes.buffer
        } else {
            self.attributes.buffer
        };
        self.attributes = newer.attributes;
        self.attributes.buffer = buffer;
        self.damage.union(&newer.damage);
        self.has_contents |= newer.has_contents;
        self.callbacks.extend(newer.callbacks);
    }
}

/// Relation of a sub-surface to its parent
#[derive(Debug, Clone)]
pub struct SubSurfaceState {
    /// The wl_subsurface object carrying the role
    pub role_object: ObjectId,
    /// `None` once the parent surface has been destroyed
    pub parent: Option<ObjectId>,
    pub position: Point,
    pending_position: Option<Point>,
    pub sync: bool,
}

#[derive(Debug)]
pub struct Surface {
    id: ObjectId,
    client: ClientId,
    role: Option<Role>,
    role_object: Option<ObjectId>,
    pending: CommitState,
    cached: Option<CommitState>,
    committed: SurfaceAttributes,
    committed_damage: Region,
    frame_callbacks: Vec<ObjectId>,
    children: Vec<ObjectId>,
    pending_stacking: Vec<ObjectId>,
    stacking: Vec<ObjectId>,
    subsurface: Option<SubSurfaceState>,
    properties: PropertyStore,
    commit_count: u64,
}

impl Surface {
    fn new(id: ObjectId, client: ClientId) -> Self {
        Self {
            id,
            client,
            role: None,
            role_object: None,
            pending: CommitState::default(),
            cached: None,
            committed: SurfaceAttributes::default(),
            committed_damage: Region::new(),
            frame_callbacks: Vec::new(),
            children: Vec::new(),
            pending_stacking: vec![id],
            stacking: vec![id],
            subsurface: None,
            properties: PropertyStore::new(),
            commit_count: 0,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn role_object(&self) -> Option<ObjectId> {
        self.role_object
    }

    pub fn committed(&self) -> &SurfaceAttributes {
        &self.committed
    }

    pub fn pending(&self) -> &SurfaceAttributes {
        &self.pending.attributes
    }

    pub fn pending_damage(&self) -> &Region {
        &self.pending.damage
    }

    /// Damage carried by the most recent applied commit
    pub fn committed_damage(&self) -> &Region {
        &self.committed_damage
    }

    pub fn has_cached_state(&self) -> bool {
        self.cached.is_some()
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Committed z-order of this surface and its direct children, bottom first
    pub fn stacking(&self) -> &[ObjectId] {
        &self.stacking
    }

    pub fn subsurface(&self) -> Option<&SubSurfaceState> {
        self.subsurface.as_ref()
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    /// Size in surface coordinates of the committed content
    pub fn content_size(&self, buffer_size: Option<Size>) -> Size {
        if let Some(destination) = self.committed.viewport.destination {
            return destination;
        }
        if let Some(source) = self.committed.viewport.source {
            return Size::new(source.width.ceil() as i32, source.height.ceil() as i32);
        }
        let Some(size) = buffer_size else {
            return Size::default();
        };
        let scale = self.committed.buffer_scale.max(1);
        let (w, h) = if self.committed.buffer_transform.swaps_axes() {
            (size.height, size.width)
        } else {
            (size.width, size.height)
        };
        Size::new(w / scale, h / scale)
    }
}

/// Committed state handed to the renderer after every applied commit
#[derive(Debug)]
pub struct SurfaceUpdate<'a> {
    pub surface: ObjectId,
    pub client: ClientId,
    pub role: Option<Role>,
    pub parent: Option<ObjectId>,
    /// Position relative to the parent for sub-surfaces, origin otherwise
    pub position: Point,
    pub buffer: Option<(ObjectId, &'a crate::buffer::Buffer)>,
    pub damage: &'a Region,
    pub attributes: &'a SurfaceAttributes,
    pub stacking: &'a [ObjectId],
}

impl Compositor {
    pub fn create_surface(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.registry
            .create(id, factory, "wl_surface", protocol_id, ObjectKind::Surface)?;
        self.surfaces.insert(id, Surface::new(id, client));
        debug!("surface {id} created for {client}");
        Ok(())
    }

    pub fn surface(&self, id: ObjectId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: ObjectId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    /// Resolves a surface reference made by `client`
    pub(crate) fn client_surface(
        &mut self,
        client: ClientId,
        id: ObjectId,
    ) -> ProtocolResult<&mut Surface> {
        self.registry.resolve(client, id, ObjectKind::Surface)?;
        self.surfaces
            .get_mut(&id)
            .ok_or_else(|| crate::registry::RegistryError::Stale(id).into())
    }

    pub fn attach(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        buffer: Option<ObjectId>,
        offset: Point,
    ) -> ProtocolResult<()> {
        if let Some(buffer) = buffer {
            self.registry.resolve(client, buffer, ObjectKind::Buffer)?;
        }
        if offset != Point::default() {
            debug!("attach to {surface} with offset {},{}", offset.x, offset.y);
        }
        let surface = self.client_surface(client, surface)?;
        surface.pending.attributes.buffer = buffer;
        surface.pending.attributes.buffer_offset = offset;
        surface.pending.has_contents = true;
        Ok(())
    }

    /// Damage in surface coordinates
    pub fn damage(&mut self, client: ClientId, surface: ObjectId, rect: Rect) -> ProtocolResult<()> {
        let surface = self.client_surface(client, surface)?;
        surface.pending.damage.add(rect);
        Ok(())
    }

    /// Damage in buffer coordinates, converted with the pending buffer scale
    pub fn damage_buffer(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        rect: Rect,
    ) -> ProtocolResult<()> {
        let surface = self.client_surface(client, surface)?;
        let scale = surface.pending.attributes.buffer_scale;
        surface.pending.damage.add(rect.to_surface_space(scale));
        Ok(())
    }

    /// `None` clears the opaque region
    pub fn set_opaque_region(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        region: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        let region = self.region_value(client, region)?.unwrap_or_default();
        self.client_surface(client, surface)?.pending.attributes.opaque_region = region;
        Ok(())
    }

    /// `None` restores the infinite input region
    pub fn set_input_region(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        region: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        let region = self
            .region_value(client, region)?
            .unwrap_or_else(Region::infinite);
        self.client_surface(client, surface)?.pending.attributes.input_region = region;
        Ok(())
    }

    fn region_value(
        &self,
        client: ClientId,
        region: Option<ObjectId>,
    ) -> ProtocolResult<Option<Region>> {
        let Some(id) = region else {
            return Ok(None);
        };
        self.registry.resolve(client, id, ObjectKind::Region)?;
        Ok(self.regions.get(&id).cloned())
    }

    pub fn set_buffer_scale(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        scale: i32,
    ) -> ProtocolResult<()> {
        let surface = self.client_surface(client, surface)?;
        if scale < 1 {
            return Err(ProtocolError::InvalidScale(scale));
        }
        surface.pending.attributes.buffer_scale = scale;
        Ok(())
    }

    pub fn set_buffer_transform(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        transform: Transform,
    ) -> ProtocolResult<()> {
        self.client_surface(client, surface)?
            .pending
            .attributes
            .buffer_transform = transform;
        Ok(())
    }

    /// Queues a one-shot callback fired when the surface content is next
    /// presented. `done` receives the presentation time in milliseconds.
    pub fn frame<F>(
        &mut self,
        client: ClientId,
        surface: ObjectId,
        callback: ObjectId,
        protocol_id: u32,
        done: F,
    ) -> ProtocolResult<()>
    where
        F: FnOnce(u32) + 'static,
    {
        self.client_surface(client, surface)?;
        self.registry
            .create(callback, surface, "wl_callback", protocol_id, ObjectKind::Callback)?;
        self.callbacks.insert(callback, Box::new(done));
        if let Some(surface) = self.surfaces.get_mut(&surface) {
            surface.pending.callbacks.push(callback);
        }
        Ok(())
    }

    pub fn commit(&mut self, client: ClientId, surface: ObjectId) -> ProtocolResult<()> {
        let target = self.client_surface(client, surface)?;
        // Attributes persist on the pending side, only the per-commit parts reset
        let state = CommitState {
            attributes: target.pending.attributes.clone(),
            damage: std::mem::take(&mut target.pending.damage),
            has_contents: std::mem::take(&mut target.pending.has_contents),
            callbacks: std::mem::take(&mut target.pending.callbacks),
        };

        if self.is_synchronized(surface) {
            if let Some(s) = self.surfaces.get_mut(&surface) {
                match s.cached.as_mut() {
                    Some(cached) => cached.merge(state),
                    None => s.cached = Some(state),
                }
                trace!("commit on synchronized {surface} cached");
            }
            return Ok(());
        }

        let state = match self.surfaces.get_mut(&surface).and_then(|s| s.cached.take()) {
            Some(mut cached) => {
                cached.merge(state);
                cached
            }
            None => state,
        };
        self.apply_commit(surface, state);
        Ok(())
    }

    /// True when the surface is a sub-surface whose commits wait for the
    /// parent, either through its own mode or an ancestor's.
    pub fn is_synchronized(&self, surface: ObjectId) -> bool {
        let mut current = surface;
        while let Some(sub) = self.surfaces.get(&current).and_then(|s| s.subsurface.as_ref()) {
            let Some(parent) = sub.parent else {
                return false;
            };
            if sub.sync {
                return true;
            }
            current = parent;
        }
        false
    }

    fn apply_commit(&mut self, id: ObjectId, state: CommitState) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        let previous_buffer = surface.committed.buffer;
        let mut attributes = state.attributes;
        if state.has_contents {
            if let Some(buffer) = attributes.buffer {
                if !self.buffers.contains_key(&buffer) {
                    debug!("{id} committed destroyed buffer {buffer}, treating as detach");
                    attributes.buffer = None;
                }
            }
        } else {
            attributes.buffer = previous_buffer;
        }
        let new_buffer = attributes.buffer;
        surface.committed = attributes;
        surface.committed_damage = state.damage;
        surface.frame_callbacks.extend(state.callbacks);
        surface.commit_count += 1;

        // Children positions and stacking are part of the parent's state
        surface.stacking = surface.pending_stacking.clone();
        let children = surface.children.clone();
        for child in &children {
            if let Some(sub) = self
                .surfaces
                .get_mut(child)
                .and_then(|c| c.subsurface.as_mut())
            {
                if let Some(position) = sub.pending_position.take() {
                    sub.position = position;
                }
            }
        }

        if state.has_contents && new_buffer != previous_buffer {
            if let Some(buffer) = new_buffer.and_then(|b| self.buffers.get_mut(&b)) {
                buffer.acquire();
            }
            if let Some(buffer) = previous_buffer.and_then(|b| self.buffers.get_mut(&b)) {
                buffer.release();
            }
        }

        self.shell_surface_committed(id);
        self.notify_renderer(id);

        for child in children {
            if !self.is_synchronized(child) {
                continue;
            }
            let cached = self.surfaces.get_mut(&child).and_then(|c| c.cached.take());
            if let Some(cached) = cached {
                self.apply_commit(child, cached);
            }
        }
    }

    fn notify_renderer(&mut self, id: ObjectId) {
        let Some(surface) = self.surfaces.get(&id) else {
            return;
        };
        let buffer = surface
            .committed
            .buffer
            .and_then(|b| self.buffers.get(&b).map(|buffer| (b, buffer)));
        let update = SurfaceUpdate {
            surface: id,
            client: surface.client,
            role: surface.role,
            parent: surface.subsurface.as_ref().and_then(|s| s.parent),
            position: surface
                .subsurface
                .as_ref()
                .map(|s| s.position)
                .unwrap_or_default(),
            buffer,
            damage: &surface.committed_damage,
            attributes: &surface.committed,
            stacking: &surface.stacking,
        };
        self.renderer.surface_committed(&update);
    }

    /// Fires the frame callbacks of one surface, oldest first
    pub fn frame_presented(&mut self, surface: ObjectId, time_ms: u32) {
        let callbacks = match self.surfaces.get_mut(&surface) {
            Some(s) => std::mem::take(&mut s.frame_callbacks),
            None => return,
        };
        for callback in callbacks {
            if let Some(done) = self.callbacks.remove(&callback) {
                done(time_ms);
            }
            self.registry.destroy(callback);
        }
    }

    /// Fires the frame callbacks of every surface with presented content
    pub fn present(&mut self, time_ms: u32) {
        let ready: Vec<ObjectId> = self
            .surfaces
            .values()
            .filter(|s| !s.frame_callbacks.is_empty())
            .map(|s| s.id)
            .collect();
        for surface in ready {
            self.frame_presented(surface, time_ms);
        }
    }

    /// Fails when the surface already carries a different role, or a live
    /// object of the same one. A surface keeps its role for its lifetime, but
    /// the role object may be recreated after the old one is destroyed.
    pub fn check_role(&self, surface: ObjectId, role: Role) -> ProtocolResult<()> {
        let target = self
            .surfaces
            .get(&surface)
            .ok_or(crate::registry::RegistryError::Stale(surface))?;
        let Some(existing) = target.role else {
            return Ok(());
        };
        let live_object = target
            .role_object
            .is_some_and(|object| self.registry.contains(object));
        if existing != role || live_object {
            warn!("{surface} already has role {existing:?}, rejecting {role:?}");
            return Err(ProtocolError::RoleAlreadyAssigned {
                surface,
                existing,
                requested: role,
            });
        }
        Ok(())
    }

    pub(crate) fn assign_role(
        &mut self,
        surface: ObjectId,
        role: Role,
        role_object: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        self.check_role(surface, role)?;
        if let Some(target) = self.surfaces.get_mut(&surface) {
            target.role = Some(role);
            target.role_object = role_object;
        }
        Ok(())
    }

    pub fn create_subsurface(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        surface: ObjectId,
        parent: ObjectId,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.client_surface(client, surface)?;
        self.client_surface(client, parent)?;
        if surface == parent || self.is_ancestor(surface, parent) {
            return Err(ProtocolError::BadSurface(surface));
        }
        self.check_role(surface, Role::SubSurface)?;
        self.registry
            .create(id, factory, "wl_subsurface", protocol_id, ObjectKind::SubSurface)?;
        self.assign_role(surface, Role::SubSurface, Some(id))?;

        if let Some(child) = self.surfaces.get_mut(&surface) {
            child.subsurface = Some(SubSurfaceState {
                role_object: id,
                parent: Some(parent),
                position: Point::default(),
                pending_position: None,
                sync: true,
            });
        }
        if let Some(parent_surface) = self.surfaces.get_mut(&parent) {
            parent_surface.children.push(surface);
            parent_surface.pending_stacking.push(surface);
        }
        self.subsurfaces.insert(id, surface);
        debug!("{surface} became a sub-surface of {parent}");
        Ok(())
    }

    /// True when `ancestor` is somewhere above `surface` in the tree
    fn is_ancestor(&self, ancestor: ObjectId, surface: ObjectId) -> bool {
        let mut current = surface;
        while let Some(parent) = self
            .surfaces
            .get(&current)
            .and_then(|s| s.subsurface.as_ref())
            .and_then(|s| s.parent)
        {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    fn subsurface_child(&self, client: ClientId, subsurface: ObjectId) -> ProtocolResult<ObjectId> {
        self.registry
            .resolve(client, subsurface, ObjectKind::SubSurface)?;
        self.subsurfaces
            .get(&subsurface)
            .copied()
            .ok_or_else(|| crate::registry::RegistryError::Stale(subsurface).into())
    }

    /// Position takes effect on the parent's next commit
    pub fn subsurface_set_position(
        &mut self,
        client: ClientId,
        subsurface: ObjectId,
        position: Point,
    ) -> ProtocolResult<()> {
        let child = self.subsurface_child(client, subsurface)?;
        if let Some(sub) = self.surfaces.get_mut(&child).and_then(|s| s.subsurface.as_mut()) {
            sub.pending_position = Some(position);
        }
        Ok(())
    }

    pub fn subsurface_place_above(
        &mut self,
        client: ClientId,
        subsurface: ObjectId,
        sibling: ObjectId,
    ) -> ProtocolResult<()> {
        self.restack(client, subsurface, sibling, true)
    }

    pub fn subsurface_place_below(
        &mut self,
        client: ClientId,
        subsurface: ObjectId,
        sibling: ObjectId,
    ) -> ProtocolResult<()> {
        self.restack(client, subsurface, sibling, false)
    }

    fn restack(
        &mut self,
        client: ClientId,
        subsurface: ObjectId,
        sibling: ObjectId,
        above: bool,
    ) -> ProtocolResult<()> {
        let child = self.subsurface_child(client, subsurface)?;
        self.client_surface(client, sibling)?;
        let parent = self
            .surfaces
            .get(&child)
            .and_then(|s| s.subsurface.as_ref())
            .and_then(|s| s.parent)
            .ok_or(ProtocolError::BadSurface(child))?;
        if sibling == child {
            return Err(ProtocolError::BadSurface(sibling));
        }
        let parent_surface = self
            .surfaces
            .get_mut(&parent)
            .ok_or(ProtocolError::BadSurface(parent))?;
        if !parent_surface.pending_stacking.contains(&sibling) {
            return Err(ProtocolError::BadSurface(sibling));
        }
        parent_surface.pending_stacking.retain(|s| *s != child);
        let index = parent_surface
            .pending_stacking
            .iter()
            .position(|s| *s == sibling)
            .unwrap_or(0);
        let index = if above { index + 1 } else { index };
        parent_surface.pending_stacking.insert(index, child);
        Ok(())
    }

    pub fn subsurface_set_sync(
        &mut self,
        client: ClientId,
        subsurface: ObjectId,
        sync: bool,
    ) -> ProtocolResult<()> {
        let child = self.subsurface_child(client, subsurface)?;
        if let Some(sub) = self.surfaces.get_mut(&child).and_then(|s| s.subsurface.as_mut()) {
            sub.sync = sync;
        }
        // Leaving synchronized mode flushes whatever was cached
        if !sync && !self.is_synchronized(child) {
            let cached = self.surfaces.get_mut(&child).and_then(|s| s.cached.take());
            if let Some(cached) = cached {
                self.apply_commit(child, cached);
            }
        }
        Ok(())
    }

    /// Detaches a sub-surface from its parent. The child keeps its role but is
    /// no longer part of the tree.
    pub(crate) fn destroy_subsurface(&mut self, subsurface: ObjectId) {
        let Some(child) = self.subsurfaces.remove(&subsurface) else {
            return;
        };
        let parent = self
            .surfaces
            .get_mut(&child)
            .and_then(|s| s.subsurface.take())
            .and_then(|s| s.parent);
        if let Some(parent) = parent.and_then(|p| self.surfaces.get_mut(&p)) {
            parent.children.retain(|c| *c != child);
            parent.pending_stacking.retain(|c| *c != child);
            parent.stacking.retain(|c| *c != child);
        }
        let cached = self.surfaces.get_mut(&child).and_then(|s| s.cached.take());
        if let Some(cached) = cached {
            for callback in cached.callbacks {
                self.callbacks.remove(&callback);
                self.registry.destroy(callback);
            }
        }
        trace!("sub-surface role object {subsurface} of {child} destroyed");
    }

    /// Tears down a surface and everything that hangs off it. Pending frame
    /// callbacks are dropped without firing.
    pub(crate) fn destroy_surface(&mut self, id: ObjectId) {
        let Some((role, role_object)) = self.surfaces.get(&id).map(|s| (s.role, s.role_object))
        else {
            return;
        };
        match (role, role_object) {
            (Some(Role::Toplevel | Role::Popup | Role::Notification), Some(object)) => {
                self.destroy_shell_surface(object);
                self.registry.destroy(object);
            }
            (Some(Role::SubSurface), Some(object)) => {
                self.destroy_subsurface(object);
                self.registry.destroy(object);
            }
            (Some(Role::Cursor), _) => self.seat.forget_cursor(id),
            _ => {}
        }

        let Some(mut surface) = self.surfaces.remove(&id) else {
            return;
        };
        for child in &surface.children {
            if let Some(sub) = self.surfaces.get_mut(child).and_then(|c| c.subsurface.as_mut()) {
                sub.parent = None;
            }
        }

        let mut dropped = std::mem::take(&mut surface.pending.callbacks);
        dropped.extend(std::mem::take(&mut surface.frame_callbacks));
        if let Some(cached) = surface.cached.take() {
            dropped.extend(cached.callbacks);
        }
        for callback in dropped {
            self.callbacks.remove(&callback);
            self.registry.destroy(callback);
        }

        if let Some(buffer) = surface.committed.buffer.and_then(|b| self.buffers.get_mut(&b)) {
            buffer.release();
        }

        let extensions: Vec<ObjectId> = self
            .extensions
            .iter()
            .filter(|(_, ext)| ext.surface == id)
            .map(|(ext, _)| *ext)
            .collect();
        for ext in extensions {
            if let Some(extension) = self.extensions.get_mut(&ext) {
                extension.orphaned = true;
            }
        }

        surface.properties.clear_all();
        self.seat.surface_destroyed(id);
        self.renderer.surface_destroyed(id);
        self.registry.destroy(id);
        debug!("surface {id} destroyed");
    }
}

/// Surface-attached protocol extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    Viewport,
    Security,
    Blending,
}

impl ExtensionKind {
    fn key(self) -> &'static PropertyKey<bool> {
        match self {
            ExtensionKind::Viewport => &HAS_VIEWPORT,
            ExtensionKind::Security => &HAS_SECURITY,
            ExtensionKind::Blending => &HAS_BLENDING,
        }
    }

    fn object_kind(self) -> ObjectKind {
        match self {
            ExtensionKind::Viewport => ObjectKind::Viewport,
            ExtensionKind::Security => ObjectKind::Security,
            ExtensionKind::Blending => ObjectKind::Blending,
        }
    }

    fn interface(self) -> &'static str {
        match self {
            ExtensionKind::Viewport => "wp_viewport",
            ExtensionKind::Security => "zwp_security_v1",
            ExtensionKind::Blending => "zwp_blending_v1",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Extension {
    pub kind: ExtensionKind,
    pub surface: ObjectId,
    /// The surface was destroyed while the extension object lived on
    pub orphaned: bool,
}

impl Compositor {
    /// Creates a viewport, security or blending object for a surface. Only one
    /// of each may exist per surface at a time.
    pub fn create_extension(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        surface: ObjectId,
        kind: ExtensionKind,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        let key = kind.key();
        let target = self.client_surface(client, surface)?;
        if target.properties.get(key) {
            return Err(ProtocolError::ExtensionExists {
                surface,
                extension: kind.interface(),
            });
        }
        self.registry
            .create(id, factory, kind.interface(), protocol_id, kind.object_kind())?;
        if let Some(target) = self.surfaces.get_mut(&surface) {
            target.properties.set(key, true);
        }
        self.extensions.insert(
            id,
            Extension {
                kind,
                surface,
                orphaned: false,
            },
        );
        Ok(())
    }

    fn extension_surface(
        &mut self,
        client: ClientId,
        id: ObjectId,
        kind: ExtensionKind,
    ) -> ProtocolResult<&mut Surface> {
        self.registry.resolve(client, id, kind.object_kind())?;
        let surface = self
            .extensions
            .get(&id)
            .filter(|e| !e.orphaned)
            .map(|e| e.surface)
            .ok_or(crate::registry::RegistryError::Stale(id))?;
        self.client_surface(client, surface)
    }

    /// `None` unsets the crop. Otherwise origin must be non-negative and the
    /// extent positive.
    pub fn viewport_set_source(
        &mut self,
        client: ClientId,
        viewport: ObjectId,
        source: Option<RectF>,
    ) -> ProtocolResult<()> {
        if let Some(rect) = source {
            if rect.x < 0.0 || rect.y < 0.0 || rect.width <= 0.0 || rect.height <= 0.0 {
                return Err(ProtocolError::ViewportBadValue(format!(
                    "source {},{} {}x{}",
                    rect.x, rect.y, rect.width, rect.height
                )));
            }
        }
        let surface = self.extension_surface(client, viewport, ExtensionKind::Viewport)?;
        surface.pending.attributes.viewport.source = source;
        Ok(())
    }

    /// `None` unsets the destination size
    pub fn viewport_set_destination(
        &mut self,
        client: ClientId,
        viewport: ObjectId,
        destination: Option<Size>,
    ) -> ProtocolResult<()> {
        if let Some(size) = destination {
            if size.is_empty() {
                return Err(ProtocolError::ViewportBadValue(format!(
                    "destination {}",
                    size
                )));
            }
        }
        let surface = self.extension_surface(client, viewport, ExtensionKind::Viewport)?;
        surface.pending.attributes.viewport.destination = destination;
        Ok(())
    }

    pub fn set_only_visible_on_secure_output(
        &mut self,
        client: ClientId,
        security: ObjectId,
    ) -> ProtocolResult<()> {
        let surface = self.extension_surface(client, security, ExtensionKind::Security)?;
        surface.pending.attributes.only_visible_on_secure_output = true;
        Ok(())
    }

    pub fn set_blend_mode(
        &mut self,
        client: ClientId,
        blending: ObjectId,
        mode: BlendMode,
    ) -> ProtocolResult<()> {
        let surface = self.extension_surface(client, blending, ExtensionKind::Blending)?;
        surface.pending.attributes.blend_mode = mode;
        Ok(())
    }

    pub fn set_alpha(
        &mut self,
        client: ClientId,
        blending: ObjectId,
        alpha: f64,
    ) -> ProtocolResult<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ProtocolError::InvalidAlpha(alpha));
        }
        let surface = self.extension_surface(client, blending, ExtensionKind::Blending)?;
        surface.pending.attributes.alpha = alpha as f32;
        Ok(())
    }

    /// Removes an extension object and resets the state it controlled on the
    /// surface's pending side.
    pub(crate) fn destroy_extension(&mut self, id: ObjectId) {
        let Some(extension) = self.extensions.remove(&id) else {
            return;
        };
        if let Some(surface) = self.surfaces.get_mut(&extension.surface) {
            surface.properties.clear(extension.kind.key());
            let pending = &mut surface.pending.attributes;
            match extension.kind {
                ExtensionKind::Viewport => pending.viewport = Viewport::default(),
                ExtensionKind::Security => pending.only_visible_on_secure_output = false,
                ExtensionKind::Blending => {
                    pending.blend_mode = BlendMode::default();
                    pending.alpha = 1.0;
                }
            }
        }
    }
}
