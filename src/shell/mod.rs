//! Shell surfaces: window semantics on top of a surface
//!
//! A [`ShellSurface`] is created from an unroled surface and adds window
//! state, geometry, parent relations and the configure/acknowledge
//! handshake. The legacy, stable and remote shell protocols only differ in
//! how they encode the same transitions; the encodings live in [`flavor`].
//!
//! Every layout-affecting change is offered to the client as a [`Configure`]
//! with a fresh serial and queued. The client acknowledges a serial, and the
//! acknowledged configure is applied on the next commit of the surface.

pub mod flavor;
#[cfg(test)]
mod tests;

use crate::compositor::Compositor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::{Point, Rect, Size};
use crate::output::DisplayInfo;
use crate::registry::{ClientId, ObjectId, ObjectKind, RegistryError};
use crate::surface::{Role, Surface};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Outstanding configures kept per shell surface before the oldest is dropped
pub const MAX_PENDING_CONFIGURES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// wl_shell
    Legacy,
    /// xdg_wm_base
    Stable,
    /// zwp_remote_shell_v1
    Remote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WindowState {
    /// Not mapped yet: invisible and takes no input
    #[default]
    Disabled,
    Normal,
    Maximized,
    Fullscreen,
    Minimized,
    Pinned,
}

/// Window resize edges, using the bit layout shared by every shell protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEdge(u32);

impl ResizeEdge {
    pub const TOP: u32 = 1;
    pub const BOTTOM: u32 = 2;
    pub const LEFT: u32 = 4;
    pub const RIGHT: u32 = 8;

    /// Accepts a single edge or one corner
    pub fn from_bits(bits: u32) -> ProtocolResult<Self> {
        match bits {
            1 | 2 | 4 | 5 | 6 | 8 | 9 | 10 => Ok(Self(bits)),
            other => Err(ProtocolError::InvalidResizeEdge(other)),
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interaction {
    #[default]
    None,
    Move,
    Resize(ResizeEdge),
}

/// One offered layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configure {
    pub serial: u32,
    /// Zero means the client picks its own size
    pub size: Size,
    /// Position relative to the parent, only meaningful for popups
    pub origin: Point,
    pub state: WindowState,
    pub resizing: bool,
    pub activated: bool,
}

/// Receives the events of one shell surface, encoded by the frontend for
/// its protocol flavor.
pub trait ShellSurfaceDelegate {
    fn configure(&mut self, configure: &Configure);

    fn close(&mut self) {}

    /// The applied state changed after an acknowledged commit
    fn state_changed(&mut self, _old: WindowState, _new: WindowState) {}

    fn popup_done(&mut self) {}
}

struct Silent;

impl ShellSurfaceDelegate for Silent {
    fn configure(&mut self, _configure: &Configure) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    #[default]
    Windowed,
    Tablet,
}

impl LayoutMode {
    pub fn raw(self) -> u32 {
        match self {
            LayoutMode::Windowed => 1,
            LayoutMode::Tablet => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Display description sent to remote shell clients
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteShellConfiguration {
    pub size: Size,
    pub transform: i32,
    pub scale: f64,
    pub work_area_insets: Insets,
    pub layout_mode: LayoutMode,
}

impl RemoteShellConfiguration {
    fn from_display(display: &DisplayInfo, layout_mode: LayoutMode) -> Self {
        let (bounds, work) = (display.bounds, display.work_area);
        Self {
            size: bounds.size(),
            transform: display.rotation.transform_raw() as i32,
            scale: display.scale,
            work_area_insets: Insets {
                left: work.x - bounds.x,
                top: work.y - bounds.y,
                right: bounds.right() - work.right(),
                bottom: bounds.bottom() - work.bottom(),
            },
            layout_mode,
        }
    }
}

pub trait RemoteShellDelegate {
    fn configuration_changed(&mut self, configuration: &RemoteShellConfiguration);

    /// Either side is `None` when it does not belong to this client
    fn activated(&mut self, gained: Option<&Surface>, lost: Option<&Surface>);
}

pub(crate) struct RemoteShellBinding {
    client: ClientId,
    delegate: Box<dyn RemoteShellDelegate>,
}

pub struct ShellSurface {
    id: ObjectId,
    surface: ObjectId,
    client: ClientId,
    flavor: ShellFlavor,
    role: Role,
    delegate: Box<dyn ShellSurfaceDelegate>,
    title: String,
    app_id: String,
    parent: Option<ObjectId>,
    popup: bool,
    mapped: bool,
    state: WindowState,
    requested: WindowState,
    bounds: Rect,
    reported_bounds: Option<Rect>,
    restore_bounds: Option<Rect>,
    geometry: Option<Rect>,
    pending_geometry: Option<Rect>,
    pending_configures: VecDeque<Configure>,
    acked: Option<Configure>,
    interaction: Interaction,
    activated: bool,
    min_size: Size,
    max_size: Size,
    scale: f64,
    top_inset: i32,
    system_modal: bool,
    shadow: Option<Rect>,
    shadow_opacity: f64,
    container: u32,
    notification_id: Option<String>,
}

impl ShellSurface {
    fn new(
        id: ObjectId,
        surface: ObjectId,
        client: ClientId,
        flavor: ShellFlavor,
        role: Role,
        delegate: Box<dyn ShellSurfaceDelegate>,
    ) -> Self {
        Self {
            id,
            surface,
            client,
            flavor,
            role,
            delegate,
            title: String::new(),
            app_id: String::new(),
            parent: None,
            popup: false,
            mapped: false,
            state: WindowState::Disabled,
            requested: WindowState::Disabled,
            bounds: Rect::default(),
            reported_bounds: None,
            restore_bounds: None,
            geometry: None,
            pending_geometry: None,
            pending_configures: VecDeque::new(),
            acked: None,
            interaction: Interaction::None,
            activated: false,
            min_size: Size::default(),
            max_size: Size::default(),
            scale: 1.0,
            top_inset: 0,
            system_modal: false,
            shadow: None,
            shadow_opacity: 0.0,
            container: 1,
            notification_id: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn surface(&self) -> ObjectId {
        self.surface
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn flavor(&self) -> ShellFlavor {
        self.flavor
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn is_popup(&self) -> bool {
        self.popup
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// State applied by the client through an acknowledged commit
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// State most recently offered to the client
    pub fn requested_state(&self) -> WindowState {
        self.requested
    }

    /// Window bounds as last reported to the window host
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Visible bounds inside the surface, excluding client decorations
    pub fn geometry(&self) -> Option<Rect> {
        self.geometry
    }

    pub fn pending_configures(&self) -> impl Iterator<Item = &Configure> {
        self.pending_configures.iter()
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn min_size(&self) -> Size {
        self.min_size
    }

    pub fn max_size(&self) -> Size {
        self.max_size
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn top_inset(&self) -> i32 {
        self.top_inset
    }

    pub fn is_system_modal(&self) -> bool {
        self.system_modal
    }

    pub fn shadow(&self) -> Option<Rect> {
        self.shadow
    }

    pub fn shadow_opacity(&self) -> f64 {
        self.shadow_opacity
    }

    pub fn container(&self) -> u32 {
        self.container
    }

    pub fn notification_id(&self) -> Option<&str> {
        self.notification_id.as_deref()
    }

    /// Size offered for `target`, clamped to the client's limits
    fn clamp(&self, size: Size) -> Size {
        let mut size = size;
        if self.min_size.width > 0 {
            size.width = size.width.max(self.min_size.width);
        }
        if self.min_size.height > 0 {
            size.height = size.height.max(self.min_size.height);
        }
        if self.max_size.width > 0 {
            size.width = size.width.min(self.max_size.width);
        }
        if self.max_size.height > 0 {
            size.height = size.height.min(self.max_size.height);
        }
        size
    }

    fn window_bounds(&self, content: Size) -> Rect {
        let size = match self.geometry {
            Some(geometry) => geometry.size(),
            None if !content.is_empty() && self.state == WindowState::Normal => content,
            None => self.bounds.size(),
        };
        Rect::from_origin_size(self.bounds.origin(), size)
    }
}

fn shell_interface(flavor: ShellFlavor, role: Role) -> &'static str {
    match (flavor, role) {
        (ShellFlavor::Legacy, _) => "wl_shell_surface",
        (ShellFlavor::Stable, Role::Popup) => "xdg_popup",
        (ShellFlavor::Stable, _) => "xdg_toplevel",
        (ShellFlavor::Remote, Role::Notification) => "zwp_notification_surface_v1",
        (ShellFlavor::Remote, _) => "zwp_remote_surface_v1",
    }
}

/// Surfaces of other clients are reported to a remote shell as null
fn visible(surface: Option<&Surface>, owner: ClientId) -> Option<&Surface> {
    surface.filter(|s| s.client() == owner)
}

impl Compositor {
    /// Gives `surface` a window role. The shell surface starts disabled and
    /// becomes visible once mapped.
    #[allow(clippy::too_many_arguments)]
    pub fn create_shell_surface(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        surface: ObjectId,
        role: Role,
        flavor: ShellFlavor,
        delegate: Box<dyn ShellSurfaceDelegate>,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, factory, ObjectKind::Global)?;
        self.client_surface(client, surface)?;
        self.check_role(surface, role)?;
        self.registry.create(
            id,
            factory,
            shell_interface(flavor, role),
            protocol_id,
            ObjectKind::ShellSurface,
        )?;
        self.assign_role(surface, role, Some(id))?;
        self.shells
            .insert(id, ShellSurface::new(id, surface, client, flavor, role, delegate));
        debug!("{id} gives {surface} the {role:?} role ({flavor:?})");
        Ok(())
    }

    /// Creates a popup placed relative to `parent`, which must be a live
    /// shell surface of the same client. The popup is mapped right away.
    #[allow(clippy::too_many_arguments)]
    pub fn create_popup(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        surface: ObjectId,
        parent: ObjectId,
        placement: Rect,
        flavor: ShellFlavor,
        delegate: Box<dyn ShellSurfaceDelegate>,
    ) -> ProtocolResult<()> {
        self.check_parent(client, parent)?;
        self.create_shell_surface(
            client,
            factory,
            id,
            protocol_id,
            surface,
            Role::Popup,
            flavor,
            delegate,
        )?;
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.parent = Some(parent);
            shell.popup = true;
            shell.mapped = true;
            shell.bounds = placement;
            shell.requested = WindowState::Normal;
        }
        self.offer(id, Some(placement.size()));
        Ok(())
    }

    /// Notification surfaces carry no configure handshake and are visible as
    /// soon as they exist.
    pub fn create_notification_surface(
        &mut self,
        client: ClientId,
        factory: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        surface: ObjectId,
        notification_id: &str,
    ) -> ProtocolResult<()> {
        self.create_shell_surface(
            client,
            factory,
            id,
            protocol_id,
            surface,
            Role::Notification,
            ShellFlavor::Remote,
            Box::new(Silent),
        )?;
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.notification_id = Some(notification_id.to_string());
            shell.mapped = true;
            shell.state = WindowState::Normal;
            shell.requested = WindowState::Normal;
        }
        Ok(())
    }

    pub fn shell_surface(&self, id: ObjectId) -> Option<&ShellSurface> {
        self.shells.get(&id)
    }

    pub fn shell_surfaces(&self) -> impl Iterator<Item = &ShellSurface> {
        self.shells.values()
    }

    pub fn active_window(&self) -> Option<ObjectId> {
        self.active_window
    }

    fn client_shell(&mut self, client: ClientId, id: ObjectId) -> ProtocolResult<&mut ShellSurface> {
        self.registry.resolve(client, id, ObjectKind::ShellSurface)?;
        self.shells
            .get_mut(&id)
            .ok_or_else(|| RegistryError::Stale(id).into())
    }

    fn check_parent(&self, client: ClientId, parent: ObjectId) -> ProtocolResult<()> {
        let valid = self
            .registry
            .resolve(client, parent, ObjectKind::ShellSurface)
            .is_ok()
            && self.shells.contains_key(&parent);
        if valid {
            Ok(())
        } else {
            Err(ProtocolError::InvalidParent(parent))
        }
    }

    /// Role-defining request: makes the window visible, entering `target`
    /// once the client applies the offered configure. Mapping twice only
    /// changes state.
    pub fn map(&mut self, client: ClientId, id: ObjectId, target: WindowState) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if shell.mapped && shell.requested == target {
            trace!("{id} already mapped as {target:?}");
            return Ok(());
        }
        shell.mapped = true;
        shell.requested = target;
        self.offer(id, None);
        Ok(())
    }

    /// Asks for a window state change, offered to the client as a configure.
    /// [`WindowState::Normal`] restores.
    pub fn request_state(
        &mut self,
        client: ClientId,
        id: ObjectId,
        target: WindowState,
    ) -> ProtocolResult<()> {
        self.client_shell(client, id)?;
        self.change_state(id, target);
        Ok(())
    }

    fn change_state(&mut self, id: ObjectId, target: WindowState) {
        let Some(shell) = self.shells.get_mut(&id) else {
            return;
        };
        if target == WindowState::Disabled {
            return;
        }
        let in_flight = !shell.pending_configures.is_empty() || shell.acked.is_some();
        if shell.requested == target && (shell.state == target || in_flight) {
            trace!("{id} already heading to {target:?}");
            return;
        }
        shell.mapped = true;
        shell.requested = target;
        self.offer(id, None);
    }

    fn proposed_size(&self, shell: &ShellSurface, target: WindowState) -> Size {
        let primary = self.displays.primary();
        let size = match target {
            WindowState::Maximized => primary.map(|d| d.work_area.size()).unwrap_or_default(),
            WindowState::Fullscreen => return primary.map(|d| d.bounds.size()).unwrap_or_default(),
            WindowState::Normal => shell
                .restore_bounds
                .map(|r| r.size())
                .unwrap_or_else(|| shell.bounds.size()),
            WindowState::Minimized | WindowState::Pinned | WindowState::Disabled => {
                shell.bounds.size()
            }
        };
        shell.clamp(size)
    }

    /// Sends a configure for the currently requested state and queues it
    fn offer(&mut self, id: ObjectId, size: Option<Size>) -> Option<u32> {
        let shell = self.shells.get(&id)?;
        if !shell.mapped {
            return None;
        }
        let size = size.unwrap_or_else(|| self.proposed_size(shell, shell.requested));
        let serial = self.serials.next();
        let shell = self.shells.get_mut(&id)?;
        let configure = Configure {
            serial,
            size,
            origin: if shell.popup {
                shell.bounds.origin()
            } else {
                Point::default()
            },
            state: shell.requested,
            resizing: matches!(shell.interaction, Interaction::Resize(_)),
            activated: shell.activated,
        };
        if shell.pending_configures.len() >= MAX_PENDING_CONFIGURES {
            if let Some(dropped) = shell.pending_configures.pop_front() {
                warn!("{id} has too many unacknowledged configures, dropping {}", dropped.serial);
            }
        }
        shell.pending_configures.push_back(configure);
        trace!("{id} configure {configure:?}");
        shell.delegate.configure(&configure);
        Some(serial)
    }

    /// Acknowledges every configure up to and including `serial`. Unknown or
    /// stale serials are ignored so configure/ack races never disconnect.
    pub fn ack_configure(&mut self, client: ClientId, id: ObjectId, serial: u32) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        match shell.pending_configures.iter().position(|c| c.serial == serial) {
            Some(index) => {
                shell.acked = shell.pending_configures.drain(..=index).last();
            }
            None => debug!("{id} acknowledged unknown serial {serial}, ignoring"),
        }
        Ok(())
    }

    /// Applies the acknowledged configure and pending geometry of the shell
    /// surface attached to `surface`, if any. Runs on every applied commit.
    pub(crate) fn shell_surface_committed(&mut self, surface: ObjectId) {
        let Some(id) = self
            .surfaces
            .get(&surface)
            .filter(|s| {
                matches!(
                    s.role(),
                    Some(Role::Toplevel | Role::Popup | Role::Notification)
                )
            })
            .and_then(|s| s.role_object())
        else {
            return;
        };
        let content = self.committed_content_size(surface);
        let Some(shell) = self.shells.get_mut(&id) else {
            return;
        };

        // wl_shell has no ack request, a commit acknowledges what was offered
        if shell.flavor == ShellFlavor::Legacy {
            if let Some(last) = shell.pending_configures.drain(..).last() {
                shell.acked = Some(last);
            }
        }
        if let Some(geometry) = shell.pending_geometry.take() {
            shell.geometry = Some(geometry);
        }

        let old_state = shell.state;
        if let Some(configure) = shell.acked.take() {
            let leaving_normal =
                old_state == WindowState::Normal && configure.state != WindowState::Normal;
            if leaving_normal && shell.restore_bounds.is_none() {
                shell.restore_bounds = Some(shell.bounds);
            }
            if configure.state == WindowState::Normal {
                shell.restore_bounds = None;
            }
            shell.state = configure.state;
            if !configure.size.is_empty() {
                shell.bounds = Rect::from_origin_size(shell.bounds.origin(), configure.size);
            }
        }
        shell.bounds = shell.window_bounds(content);

        let new_state = shell.state;
        if new_state != old_state {
            debug!("{id} is now {new_state:?}");
            shell.delegate.state_changed(old_state, new_state);
        }
        if new_state != WindowState::Disabled
            && (new_state != old_state || shell.reported_bounds != Some(shell.bounds))
        {
            shell.reported_bounds = Some(shell.bounds);
            let bounds = shell.bounds;
            self.window_host.window_state_changed(id, bounds, new_state);
        }
    }

    fn committed_content_size(&self, surface: ObjectId) -> Size {
        let Some(target) = self.surfaces.get(&surface) else {
            return Size::default();
        };
        let buffer_size = target
            .committed()
            .buffer
            .and_then(|b| self.buffers.get(&b))
            .map(|b| b.size());
        target.content_size(buffer_size)
    }

    /// Visible bounds of the window inside its surface. Applied on the next
    /// commit; non-positive sizes are rejected.
    pub fn set_window_geometry(
        &mut self,
        client: ClientId,
        id: ObjectId,
        geometry: Rect,
    ) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if geometry.is_empty() {
            return Err(ProtocolError::InvalidGeometry {
                width: geometry.width,
                height: geometry.height,
            });
        }
        shell.pending_geometry = Some(geometry);
        Ok(())
    }

    pub fn set_title(&mut self, client: ClientId, id: ObjectId, title: &str) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        shell.title = title.to_string();
        self.window_host.title_changed(id, title);
        Ok(())
    }

    pub fn set_app_id(&mut self, client: ClientId, id: ObjectId, app_id: &str) -> ProtocolResult<()> {
        self.client_shell(client, id)?.app_id = app_id.to_string();
        Ok(())
    }

    /// Transient relation. The parent must be another live shell surface of
    /// the same client and may not be a descendant.
    pub fn set_parent(
        &mut self,
        client: ClientId,
        id: ObjectId,
        parent: Option<ObjectId>,
    ) -> ProtocolResult<()> {
        self.client_shell(client, id)?;
        if let Some(parent) = parent {
            self.check_parent(client, parent)?;
            let mut current = Some(parent);
            while let Some(ancestor) = current {
                if ancestor == id {
                    return Err(ProtocolError::InvalidParent(parent));
                }
                current = self.shells.get(&ancestor).and_then(|s| s.parent);
            }
        }
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.parent = parent;
        }
        Ok(())
    }

    /// wl_shell set_transient and set_popup: parent relation plus a position
    /// relative to the parent.
    pub fn set_transient(
        &mut self,
        client: ClientId,
        id: ObjectId,
        parent: ObjectId,
        position: Point,
        popup: bool,
    ) -> ProtocolResult<()> {
        self.set_parent(client, id, Some(parent))?;
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.popup = popup;
            shell.bounds = Rect::from_origin_size(position, shell.bounds.size());
        }
        self.map(client, id, WindowState::Normal)
    }

    pub fn set_min_size(&mut self, client: ClientId, id: ObjectId, size: Size) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if size.width < 0 || size.height < 0 {
            return Err(ProtocolError::InvalidDimensions {
                width: size.width,
                height: size.height,
            });
        }
        shell.min_size = size;
        Ok(())
    }

    pub fn set_max_size(&mut self, client: ClientId, id: ObjectId, size: Size) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if size.width < 0 || size.height < 0 {
            return Err(ProtocolError::InvalidDimensions {
                width: size.width,
                height: size.height,
            });
        }
        shell.max_size = size;
        Ok(())
    }

    /// Client-initiated move or resize. Only mapped windows can be grabbed.
    pub fn start_interaction(
        &mut self,
        client: ClientId,
        id: ObjectId,
        interaction: Interaction,
    ) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if !shell.mapped {
            debug!("{id} is not mapped, ignoring {interaction:?}");
            return Ok(());
        }
        shell.interaction = interaction;
        self.window_host.interaction_requested(id, interaction);
        if matches!(interaction, Interaction::Resize(_)) {
            self.offer(id, None);
        }
        Ok(())
    }

    pub fn set_window_scale(&mut self, client: ClientId, id: ObjectId, scale: f64) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        if scale <= 0.0 || !scale.is_finite() {
            return Err(ProtocolError::InvalidScale(scale.floor() as i32));
        }
        shell.scale = scale;
        Ok(())
    }

    pub fn set_top_inset(&mut self, client: ClientId, id: ObjectId, height: i32) -> ProtocolResult<()> {
        self.client_shell(client, id)?.top_inset = height.max(0);
        Ok(())
    }

    pub fn set_system_modal(
        &mut self,
        client: ClientId,
        id: ObjectId,
        modal: bool,
    ) -> ProtocolResult<()> {
        self.client_shell(client, id)?.system_modal = modal;
        Ok(())
    }

    /// Remote shell container the window is placed in (default or overlay)
    pub fn set_container(
        &mut self,
        client: ClientId,
        id: ObjectId,
        container: u32,
    ) -> ProtocolResult<()> {
        self.client_shell(client, id)?.container = container;
        Ok(())
    }

    /// An empty rectangle removes the shadow
    pub fn set_rectangular_shadow(
        &mut self,
        client: ClientId,
        id: ObjectId,
        shadow: Rect,
    ) -> ProtocolResult<()> {
        let shell = self.client_shell(client, id)?;
        shell.shadow = (!shadow.is_empty()).then_some(shadow);
        Ok(())
    }

    pub fn set_shadow_background_opacity(
        &mut self,
        client: ClientId,
        id: ObjectId,
        opacity: f64,
    ) -> ProtocolResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ProtocolError::InvalidAlpha(opacity));
        }
        self.client_shell(client, id)?.shadow_opacity = opacity;
        Ok(())
    }

    /// Client request to become the active window
    pub fn request_activation(&mut self, client: ClientId, id: ObjectId) -> ProtocolResult<()> {
        self.client_shell(client, id)?;
        self.activate_window(id);
        Ok(())
    }

    /// Makes `id` the single active window: the previous one gets an
    /// `activated = false` configure, the new one `activated = true`, and
    /// keyboard focus follows.
    pub(crate) fn activate_window(&mut self, id: ObjectId) {
        let Some(surface) = self.shells.get(&id).map(|s| s.surface) else {
            return;
        };
        if self.active_window == Some(id) {
            return;
        }
        let previous = self.active_window.replace(id);
        let mut lost_surface = None;
        if let Some(previous) = previous {
            if let Some(shell) = self.shells.get_mut(&previous) {
                shell.activated = false;
                lost_surface = Some(shell.surface);
            }
            self.offer(previous, None);
        }
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.activated = true;
        }
        self.offer(id, None);
        self.set_keyboard_focus(Some(surface));
        self.notify_activation(Some(surface), lost_surface);
    }

    fn notify_activation(&mut self, gained: Option<ObjectId>, lost: Option<ObjectId>) {
        let gained = gained.and_then(|s| self.surfaces.get(&s));
        let lost = lost.and_then(|s| self.surfaces.get(&s));
        for binding in self.remote_shells.values_mut() {
            let owner = binding.client;
            binding
                .delegate
                .activated(visible(gained, owner), visible(lost, owner));
        }
    }

    /// Host placement decision. A size change is offered to the client.
    pub fn host_set_bounds(&mut self, id: ObjectId, bounds: Rect) {
        let Some(shell) = self.shells.get_mut(&id) else {
            return;
        };
        let resized = shell.bounds.size() != bounds.size();
        shell.bounds = Rect::from_origin_size(bounds.origin(), shell.bounds.size());
        if resized {
            self.offer(id, Some(bounds.size()));
        }
    }

    pub fn host_set_state(&mut self, id: ObjectId, state: WindowState) {
        self.change_state(id, state);
    }

    pub fn host_activate(&mut self, id: ObjectId) {
        self.activate_window(id);
    }

    /// Asks the client to close the window
    pub fn host_close(&mut self, id: ObjectId) {
        if let Some(shell) = self.shells.get_mut(&id) {
            shell.delegate.close();
        }
    }

    pub fn host_end_interaction(&mut self, id: ObjectId) {
        let Some(shell) = self.shells.get_mut(&id) else {
            return;
        };
        let was_resizing = matches!(shell.interaction, Interaction::Resize(_));
        shell.interaction = Interaction::None;
        if was_resizing {
            self.offer(id, None);
        }
    }

    /// Dismisses a popup together with every popup stacked on top of it,
    /// topmost first.
    pub fn host_dismiss_popup(&mut self, id: ObjectId) {
        let children: Vec<ObjectId> = self
            .shells
            .values()
            .filter(|s| s.parent == Some(id) && s.popup)
            .map(|s| s.id)
            .collect();
        for child in children.into_iter().rev() {
            self.host_dismiss_popup(child);
        }
        if let Some(shell) = self.shells.get_mut(&id).filter(|s| s.popup) {
            debug!("dismissing popup {id}");
            shell.delegate.popup_done();
        }
    }

    pub(crate) fn destroy_shell_surface(&mut self, id: ObjectId) {
        let Some(shell) = self.shells.remove(&id) else {
            return;
        };
        if self.active_window == Some(id) {
            self.active_window = None;
            self.notify_activation(None, Some(shell.surface));
        }
        for other in self.shells.values_mut() {
            if other.parent == Some(id) {
                if other.popup {
                    other.delegate.popup_done();
                }
                other.parent = None;
            }
        }
        self.window_host.window_destroyed(id);
        debug!("shell surface {id} of {} destroyed", shell.surface);
    }

    pub fn set_layout_mode(&mut self, mode: LayoutMode) {
        self.layout_mode = mode;
        self.publish_remote_configuration();
    }

    fn remote_configuration(&self) -> Option<RemoteShellConfiguration> {
        self.displays
            .primary()
            .map(|display| RemoteShellConfiguration::from_display(&display, self.layout_mode))
    }

    pub fn bind_remote_shell(
        &mut self,
        client: ClientId,
        id: ObjectId,
        version: u32,
        protocol_id: u32,
        mut delegate: Box<dyn RemoteShellDelegate>,
    ) -> ProtocolResult<()> {
        self.register_global(id, client, "zwp_remote_shell_v1", version, protocol_id)?;
        if let Some(configuration) = self.remote_configuration() {
            delegate.configuration_changed(&configuration);
        }
        self.remote_shells
            .insert(id, RemoteShellBinding { client, delegate });
        Ok(())
    }

    pub(crate) fn publish_remote_configuration(&mut self) {
        let Some(configuration) = self.remote_configuration() else {
            return;
        };
        for binding in self.remote_shells.values_mut() {
            binding.delegate.configuration_changed(&configuration);
        }
    }
}
