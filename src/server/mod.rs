//! Wayland socket frontend
//!
//! Decodes requests with `wayland-server`, forwards them to the scene core
//! and encodes core events back onto the wire. Every wire object carries the
//! core [`ObjectId`] it stands for as user data; the handful of objects the
//! core does not model (xdg_surface, xdg_positioner, dma-buf params, shm
//! pools) carry their own frontend state instead.
//!
//! Errors follow one rule: fatal [`ProtocolError`]s are posted on the
//! resource that issued the request, which disconnects that client only.
//! Recoverable ones are logged and the request is dropped.

mod buffer;
mod compositor;
mod extensions;
mod output;
mod remote;
mod seat;
mod shell;
mod socket;
mod xdg;

use crate::compositor::Compositor;
use crate::config::HearthConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::host::{
    DisplayEnumerator, HeadlessRenderer, HeadlessWindowHost, KeymapProvider, Renderer, StaticDisplays,
    WindowHost, XkbKeymapProvider,
};
use crate::poller::{EvdevGamepadSource, GamepadPoller, GamepadSource, PollerEvent};
use crate::protocol::{
    alpha_compositing, gaming_input, remote_shell, secure_output, stylus, vsync_feedback,
};
use crate::registry::{ClientId, ObjectId};
use anyhow::{anyhow, Context, Result};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wayland_protocols::wp::linux_dmabuf::zv1::server::zwp_linux_dmabuf_v1;
use wayland_protocols::wp::viewporter::server::wp_viewporter;
use wayland_protocols::xdg::shell::server::xdg_wm_base;
use wayland_server::backend::{ClientData, ClientId as WireClientId, DisconnectReason};
use wayland_server::protocol::{
    wl_compositor, wl_output, wl_seat, wl_shell, wl_shm, wl_subcompositor, wl_surface,
};
use wayland_server::{Client, DataInit, Dispatch, Display, ListeningSocket, New, Resource};

/// Used when no display reports a refresh rate
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// How often xdg_wm_base and wl_shell_surface objects are pinged
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Everything outside the protocol the server talks to
pub struct Collaborators {
    pub renderer: Box<dyn Renderer>,
    pub window_host: Box<dyn WindowHost>,
    pub displays: Box<dyn DisplayEnumerator>,
    pub keymap: Box<dyn KeymapProvider>,
    /// `None` runs without a gamepad poller
    pub gamepad: Option<Box<dyn GamepadSource>>,
}

impl Collaborators {
    /// Headless renderer and window host, displays from `[[outputs]]`, an
    /// xkb keymap and, when `[gamepad] enabled`, the evdev gamepad source
    pub fn headless(config: &HearthConfig) -> Self {
        let gamepad: Option<Box<dyn GamepadSource>> = if config.gamepad.enabled {
            Some(Box::new(EvdevGamepadSource::new()))
        } else {
            None
        };
        Self {
            renderer: Box::new(HeadlessRenderer::default()),
            window_host: Box::new(HeadlessWindowHost),
            displays: Box::new(StaticDisplays::from_config(&config.outputs)),
            keymap: Box::new(XkbKeymapProvider::new(config.keymap.clone())),
            gamepad,
        }
    }
}

/// Per-connection data handed to `wayland-server`
pub struct ClientState {
    id: ClientId,
    disconnected: Arc<Mutex<Vec<ClientId>>>,
}

impl ClientData for ClientState {
    fn initialized(&self, client_id: WireClientId) {
        debug!("{} attached as {:?}", self.id, client_id);
    }

    fn disconnected(&self, _client_id: WireClientId, reason: DisconnectReason) {
        debug!("{} disconnected: {:?}", self.id, reason);
        self.disconnected.lock().push(self.id);
    }
}

/// Maps core surface ids back to their wire objects, for events that name a
/// surface (enter, activated)
#[derive(Clone, Default)]
pub(crate) struct SurfaceTable(Rc<RefCell<HashMap<ObjectId, wl_surface::WlSurface>>>);

impl SurfaceTable {
    pub(crate) fn get(&self, id: ObjectId) -> Option<wl_surface::WlSurface> {
        self.0.borrow().get(&id).cloned()
    }

    fn insert(&self, id: ObjectId, surface: wl_surface::WlSurface) {
        self.0.borrow_mut().insert(id, surface);
    }

    fn remove(&self, id: ObjectId) {
        self.0.borrow_mut().remove(&id);
    }
}

/// Objects the server pings periodically
#[derive(Default)]
struct Pings {
    wm_bases: Vec<xdg_wm_base::XdgWmBase>,
    legacy: Vec<wayland_server::protocol::wl_shell_surface::WlShellSurface>,
    last: Option<Instant>,
}

/// Dispatch state shared by every protocol handler
pub struct ServerState {
    pub compositor: Compositor,
    pub(crate) surfaces: SurfaceTable,
    keymap: Option<String>,
    seat_name: String,
    repeat_rate: i32,
    repeat_delay: i32,
    pings: Pings,
}

impl ServerState {
    /// Core client behind a wire client
    pub(crate) fn client_id(client: &Client) -> Option<ClientId> {
        client.get_data::<ClientState>().map(|data| data.id)
    }

    /// Resolves the caller of a request on `object`. Requests on objects the
    /// core already destroyed by cascade are ignored.
    pub(crate) fn caller(&self, client: &Client, object: ObjectId) -> Option<ClientId> {
        if !self.compositor.is_live(object) {
            trace!("{object} is gone, ignoring request");
            return None;
        }
        Self::client_id(client)
    }

    /// Binds a global the core only tracks for ownership
    pub(crate) fn bind_global<I>(
        &mut self,
        client: &Client,
        resource: New<I>,
        data_init: &mut DataInit<'_, Self>,
    ) -> I
    where
        I: Resource + 'static,
        Self: Dispatch<I, ObjectId>,
    {
        let id = self.compositor.allocate_id();
        let resource = data_init.init(resource, id);
        if let Some(owner) = Self::client_id(client) {
            let result = self.compositor.register_global(
                id,
                owner,
                I::interface().name,
                resource.version(),
                resource.id().protocol_id(),
            );
            report(&resource, result, 0u32);
        }
        resource
    }

    /// Shell surface that gives `surface` its window role
    pub(crate) fn shell_of(&self, surface: ObjectId) -> ProtocolResult<ObjectId> {
        self.compositor
            .surface(surface)
            .and_then(|s| s.role_object())
            .filter(|shell| self.compositor.shell_surface(*shell).is_some())
            .ok_or(ProtocolError::InvalidParent(surface))
    }

    fn ping_clients(&mut self, serial: u32) {
        self.pings.wm_bases.retain(|base| base.is_alive());
        self.pings.legacy.retain(|surface| surface.is_alive());
        for base in &self.pings.wm_bases {
            base.ping(serial);
        }
        for surface in &self.pings.legacy {
            surface.ping(serial);
        }
    }
}

/// Core object behind a wire resource
pub(crate) fn object_of<R: Resource>(resource: &R) -> Option<ObjectId> {
    resource.data::<ObjectId>().copied()
}

/// Applies the error rule to the outcome of a core operation
pub(crate) fn report<R: Resource>(resource: &R, result: ProtocolResult<()>, code: impl Into<u32>) {
    let code = code.into();
    report_with(resource, result, |_| code);
}

/// Like [`report`], for requests whose wire error code depends on the error
pub(crate) fn report_with<R: Resource>(
    resource: &R,
    result: ProtocolResult<()>,
    code: impl FnOnce(&ProtocolError) -> u32,
) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_fatal() => {
            error!("{}: {err}", resource.id());
            resource.post_error(code(&err), err.to_string());
        }
        Err(err) => warn!("{}: {err}, request dropped", resource.id()),
    }
}

fn create_globals(display: &Display<ServerState>) {
    let dh = display.handle();
    dh.create_global::<ServerState, wl_compositor::WlCompositor, _>(3, ());
    dh.create_global::<ServerState, wl_shm::WlShm, _>(1, ());
    dh.create_global::<ServerState, zwp_linux_dmabuf_v1::ZwpLinuxDmabufV1, _>(2, ());
    dh.create_global::<ServerState, wl_subcompositor::WlSubcompositor, _>(1, ());
    dh.create_global::<ServerState, wl_shell::WlShell, _>(1, ());
    dh.create_global::<ServerState, xdg_wm_base::XdgWmBase, _>(1, ());
    dh.create_global::<ServerState, remote_shell::zwp_remote_shell_v1::ZwpRemoteShellV1, _>(1, ());
    dh.create_global::<ServerState, wl_output::WlOutput, _>(2, ());
    dh.create_global::<ServerState, wl_seat::WlSeat, _>(5, ());
    dh.create_global::<ServerState, wp_viewporter::WpViewporter, _>(1, ());
    dh.create_global::<ServerState, secure_output::zwp_secure_output_v1::ZwpSecureOutputV1, _>(1, ());
    dh.create_global::<ServerState, alpha_compositing::zwp_alpha_compositing_v1::ZwpAlphaCompositingV1, _>(1, ());
    dh.create_global::<ServerState, gaming_input::zwp_gaming_input_v1::ZwpGamingInputV1, _>(1, ());
    dh.create_global::<ServerState, vsync_feedback::zwp_vsync_feedback_v1::ZwpVsyncFeedbackV1, _>(1, ());
    dh.create_global::<ServerState, stylus::zwp_stylus_v1::ZwpStylusV1, _>(1, ());
    debug!(
        "Globals: wl_compositor v3, wl_shm v1, zwp_linux_dmabuf_v1 v2, wl_subcompositor v1, \
         wl_shell v1, xdg_wm_base v1, zwp_remote_shell_v1 v1, wl_output v2, wl_seat v5, \
         wp_viewporter v1, zwp_secure_output_v1 v1, zwp_alpha_compositing_v1 v1, \
         zwp_gaming_input_v1 v1, zwp_vsync_feedback_v1 v1, zwp_stylus_v1 v1"
    );
}

/// CLOCK_MONOTONIC in microseconds, the clock vsync timebases are sent in
fn monotonic_micros() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if ret != 0 {
        return 0;
    }
    ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000
}

fn frame_interval(refresh_mhz: i32) -> Duration {
    if refresh_mhz <= 0 {
        return DEFAULT_FRAME_INTERVAL;
    }
    Duration::from_micros(1_000_000_000 / refresh_mhz as u64)
}

/// The listening socket, the wire display and the scene core
pub struct CompositorServer {
    display: Display<ServerState>,
    listener: ListeningSocket,
    socket_path: PathBuf,
    state: ServerState,
    poller: Option<GamepadPoller>,
    disconnected: Arc<Mutex<Vec<ClientId>>>,
    dispatch_interval: Duration,
    frame_interval: Duration,
    started: Instant,
    last_present: Instant,
    running: Arc<AtomicBool>,
}

impl CompositorServer {
    pub fn new(config: HearthConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let display: Display<ServerState> = Display::new().context("Failed to create Wayland display")?;
        create_globals(&display);

        let (listener, socket_path) = socket::bind(&config.server)?;

        let Collaborators {
            renderer,
            window_host,
            displays,
            keymap,
            gamepad,
        } = collaborators;

        let keymap = match keymap.keymap() {
            Ok(keymap) => Some(keymap),
            Err(e) => {
                warn!("⚠️ No keymap available, keyboards will get none: {e:#}");
                None
            }
        };

        let frame_interval = displays
            .primary()
            .map(|display| frame_interval(display.refresh_mhz))
            .unwrap_or(DEFAULT_FRAME_INTERVAL);

        let mut compositor = Compositor::new(renderer, window_host, displays);
        compositor.set_layout_mode(config.remote_shell.layout_mode);
        // Presentation is paced by the frame timer, so vsync is its phase
        compositor.vsync_parameters_changed(monotonic_micros(), frame_interval.as_micros() as u64);

        let poller = match gamepad.filter(|_| config.gamepad.enabled) {
            Some(source) => match GamepadPoller::spawn(
                source,
                Duration::from_millis(config.gamepad.poll_interval_ms),
                config.gamepad.channel_capacity,
            ) {
                Ok(poller) => Some(poller),
                Err(e) => {
                    warn!("⚠️ Gamepad polling disabled: {e:#}");
                    None
                }
            },
            None => {
                info!("Gamepad polling disabled");
                None
            }
        };

        let now = Instant::now();
        Ok(Self {
            display,
            listener,
            socket_path,
            state: ServerState {
                compositor,
                surfaces: SurfaceTable::default(),
                keymap,
                seat_name: config.seat.name.clone(),
                repeat_rate: config.seat.repeat_rate,
                repeat_delay: config.seat.repeat_delay,
                pings: Pings::default(),
            },
            poller,
            disconnected: Arc::new(Mutex::new(Vec::new())),
            dispatch_interval: Duration::from_millis(config.server.dispatch_interval_ms),
            frame_interval,
            started: now,
            last_present: now,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn compositor(&self) -> &Compositor {
        &self.state.compositor
    }

    /// Host-side access to the core (focus changes, window host commands)
    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.state.compositor
    }

    /// Descriptor that becomes readable when any client sent requests, for
    /// embedding into an outer event loop
    pub fn poll_fd(&mut self) -> BorrowedFd<'_> {
        self.display.backend().poll_fd()
    }

    /// Clearing the flag makes [`run`](Self::run) return after the current
    /// iteration
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Waits up to `timeout` for socket activity, then runs one iteration:
    /// accept clients, dispatch requests, sweep disconnected clients, drain
    /// poller snapshots, present and flush.
    pub fn dispatch(&mut self, timeout: Duration) -> Result<()> {
        self.wait(timeout)?;
        self.accept_clients();
        self.display
            .dispatch_clients(&mut self.state)
            .context("Failed to dispatch clients")?;
        self.sweep_disconnected();
        self.pump_gamepad();
        self.present_if_due();
        self.ping_if_due();
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.display.flush_clients().context("Failed to flush clients")
    }

    fn wait(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Ok(());
        }
        let mut fds = [
            libc::pollfd {
                fd: self.listener.as_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.display.backend().poll_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err).context("Failed to wait for socket activity");
            }
        }
        Ok(())
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok(Some(stream)) => {
                    let id = self.state.compositor.connect_client();
                    let data = Arc::new(ClientState {
                        id,
                        disconnected: self.disconnected.clone(),
                    });
                    if let Err(e) = self.display.handle().insert_client(stream, data) {
                        warn!("Failed to register {id}: {e}");
                        self.state.compositor.disconnect_client(id);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to accept client: {e}");
                    break;
                }
            }
        }
    }

    fn sweep_disconnected(&mut self) {
        let gone: Vec<ClientId> = std::mem::take(&mut *self.disconnected.lock());
        for client in gone {
            self.state.compositor.disconnect_client(client);
        }
    }

    fn pump_gamepad(&mut self) {
        let time = self.now_ms();
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        poller.set_enabled(self.state.compositor.gamepad_polling_wanted());
        for event in poller.drain() {
            match event {
                PollerEvent::Snapshot(snapshot) => self.state.compositor.gamepad_snapshot(time, snapshot),
                PollerEvent::Disabled => trace!("gamepad polling paused"),
            }
        }
    }

    fn present_if_due(&mut self) {
        if self.last_present.elapsed() < self.frame_interval {
            return;
        }
        self.last_present = Instant::now();
        let time = self.now_ms();
        self.state.compositor.present(time);
    }

    fn ping_if_due(&mut self) {
        if self.state.pings.last.is_some_and(|last| last.elapsed() < PING_INTERVAL) {
            return;
        }
        self.state.pings.last = Some(Instant::now());
        let serial = self.state.compositor.next_serial();
        self.state.ping_clients(serial);
    }

    /// Drives [`dispatch`](Self::dispatch) from a calloop timer until the
    /// running flag is cleared
    pub fn run(&mut self) -> Result<()> {
        let mut event_loop: EventLoop<CompositorServer> =
            EventLoop::try_new().context("Failed to create event loop")?;
        let signal = event_loop.get_signal();
        let interval = self.dispatch_interval;

        event_loop
            .handle()
            .insert_source(
                Timer::from_duration(interval),
                move |_deadline: Instant, _meta: &mut (), server: &mut CompositorServer| {
                    if !server.running.load(Ordering::SeqCst) {
                        signal.stop();
                        return TimeoutAction::Drop;
                    }
                    if let Err(e) = server.dispatch(Duration::ZERO) {
                        error!("Dispatch failed: {e:#}");
                    }
                    TimeoutAction::ToDuration(interval)
                },
            )
            .map_err(|_| anyhow!("Failed to register dispatch timer"))?;

        info!("🚀 Serving clients on {}", self.socket_path.display());
        event_loop
            .run(interval, self, |_| {})
            .context("Event loop failed")?;
        info!("Event loop stopped");
        Ok(())
    }
}
