//! VSync timing feedback
//!
//! A client asks the feedback global for a timing object and learns the
//! timebase and refresh interval of the display it presents to. The first
//! known parameters are sent when the timing object is created. Later
//! updates with an unchanged interval are only forwarded once the vsync
//! phase moved by at least [`OFFSET_DELTA_THRESHOLD_US`].

use crate::compositor::Compositor;
use crate::error::ProtocolResult;
use crate::registry::{ClientId, ObjectId, ObjectKind};
use log::{debug, trace};
use std::collections::BTreeMap;

/// Smallest phase change, in microseconds, worth telling a client about
pub const OFFSET_DELTA_THRESHOLD_US: u64 = 25;

/// One vsync observation, in CLOCK_MONOTONIC microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VSyncParameters {
    pub timebase_us: u64,
    pub interval_us: u64,
}

impl VSyncParameters {
    /// Position of the vsync inside its interval
    pub fn offset_us(&self) -> u64 {
        self.timebase_us % self.interval_us.max(1)
    }
}

/// Encodes `update` events for one zwp_vsync_timing_v1
pub trait VSyncTimingDelegate {
    fn update(&mut self, parameters: &VSyncParameters);
}

struct Timing {
    delegate: Box<dyn VSyncTimingDelegate>,
    last_interval_us: u64,
    last_offset_us: u64,
}

impl Timing {
    fn new(delegate: Box<dyn VSyncTimingDelegate>) -> Self {
        Self {
            delegate,
            last_interval_us: 0,
            last_offset_us: 0,
        }
    }

    /// Forwards `parameters` unless they only moved the phase by a few
    /// microseconds. Returns whether an update was sent.
    fn observe(&mut self, parameters: &VSyncParameters) -> bool {
        if parameters.interval_us == 0 {
            return false;
        }
        let offset = parameters.offset_us();
        if parameters.interval_us == self.last_interval_us
            && self.last_offset_us.abs_diff(offset) < OFFSET_DELTA_THRESHOLD_US
        {
            return false;
        }
        self.delegate.update(parameters);
        self.last_interval_us = parameters.interval_us;
        self.last_offset_us = offset;
        true
    }
}

#[derive(Default)]
pub struct VSyncPublisher {
    timings: BTreeMap<ObjectId, Timing>,
    current: Option<VSyncParameters>,
}

impl VSyncPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// The latest parameters with a non-zero interval
    pub fn current(&self) -> Option<VSyncParameters> {
        self.current
    }

    pub(crate) fn remove(&mut self, id: ObjectId) {
        self.timings.remove(&id);
    }
}

impl Compositor {
    pub fn vsync(&self) -> &VSyncPublisher {
        &self.vsync
    }

    /// Creates a zwp_vsync_timing_v1 from the feedback global. Every output
    /// shares the primary display's timing, so `output` is only checked.
    pub fn create_vsync_timing(
        &mut self,
        client: ClientId,
        feedback: ObjectId,
        id: ObjectId,
        protocol_id: u32,
        output: Option<ObjectId>,
        delegate: Box<dyn VSyncTimingDelegate>,
    ) -> ProtocolResult<()> {
        self.registry.resolve(client, feedback, ObjectKind::Global)?;
        if let Some(output) = output {
            self.registry.resolve(client, output, ObjectKind::Output)?;
        }
        self.registry
            .create(id, feedback, "zwp_vsync_timing_v1", protocol_id, ObjectKind::VSyncTiming)?;
        let mut timing = Timing::new(delegate);
        if let Some(current) = self.vsync.current {
            timing.observe(&current);
        }
        self.vsync.timings.insert(id, timing);
        debug!("{client} observes vsync through {id}");
        Ok(())
    }

    /// New vsync parameters from whoever drives presentation. A zero
    /// interval carries no information and is dropped.
    pub fn vsync_parameters_changed(&mut self, timebase_us: u64, interval_us: u64) {
        if interval_us == 0 {
            trace!("vsync update without an interval, ignoring");
            return;
        }
        let parameters = VSyncParameters {
            timebase_us,
            interval_us,
        };
        self.vsync.current = Some(parameters);
        let mut sent = 0;
        for timing in self.vsync.timings.values_mut() {
            if timing.observe(&parameters) {
                sent += 1;
            }
        }
        trace!("vsync {:?} sent to {} timing object(s)", parameters, sent);
    }
}
