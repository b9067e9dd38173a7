//! Background gamepad poller
//!
//! Device polling runs on a dedicated worker thread. The dispatch thread
//! controls it through a command channel and drains whole-state snapshots
//! from a bounded channel once per loop iteration; it never blocks on the
//! worker. Only copied values cross the thread boundary.

use anyhow::{Context, Result};
use evdev::{AbsoluteAxisType, Device, Key};
use log::{debug, info, trace, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ButtonState {
    pub pressed: bool,
    /// Normalized analog value in 0..=1
    pub analog: f64,
}

/// Complete state of the gamepad at one poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub connected: bool,
    /// Normalized axis values in -1..=1
    pub axes: Vec<f64>,
    pub buttons: Vec<ButtonState>,
}

/// Something the worker can read gamepad state from
pub trait GamepadSource: Send + 'static {
    fn poll(&mut self) -> GamepadSnapshot;
}

impl GamepadSource for Box<dyn GamepadSource> {
    fn poll(&mut self) -> GamepadSnapshot {
        (**self).poll()
    }
}

enum Command {
    Enable,
    Disable,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent {
    Snapshot(GamepadSnapshot),
    /// Acknowledges a disable; no snapshot follows until re-enabled
    Disabled,
}

pub struct GamepadPoller {
    commands: Sender<Command>,
    events: Option<Receiver<PollerEvent>>,
    worker: Option<JoinHandle<()>>,
    enabled: bool,
}

impl GamepadPoller {
    pub fn spawn<S: GamepadSource>(source: S, interval: Duration, capacity: usize) -> Result<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::sync_channel(capacity);
        let worker = thread::Builder::new()
            .name("gamepad-poller".to_string())
            .spawn(move || run_worker(source, interval, command_rx, event_tx))
            .context("Failed to spawn gamepad poller thread")?;
        debug!("gamepad poller started, interval {:?}", interval);
        Ok(Self {
            commands,
            events: Some(events),
            worker: Some(worker),
            enabled: false,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        let command = if enabled {
            Command::Enable
        } else {
            Command::Disable
        };
        if self.commands.send(command).is_err() {
            warn!("gamepad poller thread is gone");
        }
    }

    /// Takes everything the worker posted since the last call
    pub fn drain(&self) -> Vec<PollerEvent> {
        let mut drained = Vec::new();
        let Some(events) = self.events.as_ref() else {
            return drained;
        };
        loop {
            match events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    trace!("gamepad poller channel closed");
                    break;
                }
            }
        }
        drained
    }
}

impl Drop for GamepadPoller {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        // Closing the receiver unblocks a worker waiting to post
        self.events.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("gamepad poller thread panicked");
            }
        }
    }
}

fn run_worker<S: GamepadSource>(
    mut source: S,
    interval: Duration,
    commands: Receiver<Command>,
    events: SyncSender<PollerEvent>,
) {
    let mut enabled = false;
    let mut last: Option<GamepadSnapshot> = None;
    loop {
        let command = if enabled {
            commands.recv_timeout(interval)
        } else {
            commands.recv().map_err(|_| RecvTimeoutError::Disconnected)
        };
        match command {
            Ok(Command::Enable) => {
                enabled = true;
                last = None;
            }
            Ok(Command::Disable) => {
                enabled = false;
                if events.send(PollerEvent::Disabled).is_err() {
                    break;
                }
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let snapshot = source.poll();
                if last.as_ref() == Some(&snapshot) {
                    continue;
                }
                match events.try_send(PollerEvent::Snapshot(snapshot.clone())) {
                    Ok(()) => last = Some(snapshot),
                    Err(TrySendError::Full(_)) => trace!("dispatch is behind, dropping snapshot"),
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
    }
    debug!("gamepad poller stopped");
}

const GAMEPAD_AXES: [AbsoluteAxisType; 8] = [
    AbsoluteAxisType::ABS_X,
    AbsoluteAxisType::ABS_Y,
    AbsoluteAxisType::ABS_RX,
    AbsoluteAxisType::ABS_RY,
    AbsoluteAxisType::ABS_Z,
    AbsoluteAxisType::ABS_RZ,
    AbsoluteAxisType::ABS_HAT0X,
    AbsoluteAxisType::ABS_HAT0Y,
];

const GAMEPAD_BUTTONS: [Key; 13] = [
    Key::BTN_SOUTH,
    Key::BTN_EAST,
    Key::BTN_NORTH,
    Key::BTN_WEST,
    Key::BTN_TL,
    Key::BTN_TR,
    Key::BTN_TL2,
    Key::BTN_TR2,
    Key::BTN_SELECT,
    Key::BTN_START,
    Key::BTN_MODE,
    Key::BTN_THUMBL,
    Key::BTN_THUMBR,
];

const RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Reads the first evdev device under /dev/input that looks like a gamepad
pub struct EvdevGamepadSource {
    device: Option<Device>,
    last_scan: Option<Instant>,
}

impl EvdevGamepadSource {
    pub fn new() -> Self {
        Self {
            device: None,
            last_scan: None,
        }
    }

    fn scan(&mut self) {
        if self.last_scan.is_some_and(|t| t.elapsed() < RESCAN_INTERVAL) {
            return;
        }
        self.last_scan = Some(Instant::now());
        self.device = evdev::enumerate()
            .map(|(_, device)| device)
            .find(|device| {
                device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::BTN_SOUTH))
            });
        if let Some(device) = &self.device {
            info!("🎮 Gamepad found: {}", device.name().unwrap_or("unnamed"));
        }
    }
}

impl Default for EvdevGamepadSource {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(value: i32, minimum: i32, maximum: i32) -> f64 {
    if maximum <= minimum {
        return 0.0;
    }
    let span = f64::from(maximum) - f64::from(minimum);
    ((f64::from(value) - f64::from(minimum)) / span * 2.0 - 1.0).clamp(-1.0, 1.0)
}

impl GamepadSource for EvdevGamepadSource {
    fn poll(&mut self) -> GamepadSnapshot {
        if self.device.is_none() {
            self.scan();
        }
        let Some(device) = self.device.as_ref() else {
            return GamepadSnapshot::default();
        };
        let (keys, abs) = match (device.get_key_state(), device.get_abs_state()) {
            (Ok(keys), Ok(abs)) => (keys, abs),
            _ => {
                debug!("gamepad disappeared");
                self.device = None;
                return GamepadSnapshot::default();
            }
        };
        let axes = GAMEPAD_AXES
            .iter()
            .map(|axis| {
                let info = abs[axis.0 as usize];
                normalize(info.value, info.minimum, info.maximum)
            })
            .collect();
        let buttons = GAMEPAD_BUTTONS
            .iter()
            .map(|key| {
                let pressed = keys.contains(*key);
                ButtonState {
                    pressed,
                    analog: if pressed { 1.0 } else { 0.0 },
                }
            })
            .collect();
        GamepadSnapshot {
            connected: true,
            axes,
            buttons,
        }
    }
}
