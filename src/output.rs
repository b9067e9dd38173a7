//! Output metrics publisher
//!
//! Bound wl_output objects receive the geometry, mode and scale of the
//! primary display, once on bind and again whenever the display enumerator
//! reports a change. Without a display nothing is sent.

use crate::compositor::Compositor;
use crate::error::ProtocolResult;
use crate::geometry::{Point, Rect, Size};
use crate::registry::{ClientId, ObjectId, ObjectKind};
use log::{debug, trace};
use std::collections::BTreeMap;

const MM_PER_INCH: f64 = 25.4;

/// wl_output subpixel value for "unknown"
pub const SUBPIXEL_UNKNOWN: u32 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Clockwise90),
            180 => Some(Rotation::Clockwise180),
            270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    /// wl_output transform value
    pub fn transform_raw(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 1,
            Rotation::Clockwise180 => 2,
            Rotation::Clockwise270 => 3,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }
}

/// One physical display as reported by the display enumerator
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub id: u64,
    pub name: String,
    /// Logical bounds in the global space, after rotation
    pub bounds: Rect,
    /// Bounds minus panels and other reserved areas
    pub work_area: Rect,
    pub dpi: f64,
    pub scale: f64,
    pub rotation: Rotation,
    pub refresh_mhz: i32,
}

/// Everything a wl_output announces for one display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMetrics {
    pub position: Point,
    /// Physical size in millimetres
    pub physical_size: Size,
    pub subpixel: u32,
    pub make: String,
    pub model: String,
    pub transform: u32,
    /// Mode in hardware pixels, sent as current and preferred
    pub mode: Size,
    pub refresh_mhz: i32,
    pub scale: i32,
}

impl OutputMetrics {
    pub fn from_display(display: &DisplayInfo) -> Self {
        let bounds = display.bounds;
        let mode = if display.rotation.swaps_axes() {
            Size::new(bounds.height, bounds.width)
        } else {
            bounds.size()
        };
        let to_mm = |px: i32| {
            if display.dpi > 0.0 {
                (f64::from(px) * MM_PER_INCH / display.dpi).round() as i32
            } else {
                0
            }
        };
        Self {
            position: bounds.origin(),
            physical_size: Size::new(to_mm(mode.width), to_mm(mode.height)),
            subpixel: SUBPIXEL_UNKNOWN,
            make: "hearth".to_string(),
            model: display.name.clone(),
            transform: display.rotation.transform_raw(),
            mode,
            refresh_mhz: display.refresh_mhz,
            scale: (display.scale.ceil() as i32).max(1),
        }
    }
}

/// Sends output metrics to one bound wl_output. The frontend gates the
/// scale and done events on the bound version.
pub trait OutputDelegate {
    fn metrics(&mut self, metrics: &OutputMetrics);
}

#[derive(Default)]
pub struct OutputPublisher {
    bindings: BTreeMap<ObjectId, Box<dyn OutputDelegate>>,
    last: Option<OutputMetrics>,
}

impl OutputPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unbind(&mut self, id: ObjectId) {
        self.bindings.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn last(&self) -> Option<&OutputMetrics> {
        self.last.as_ref()
    }
}

impl Compositor {
    pub fn bind_output(
        &mut self,
        client: ClientId,
        id: ObjectId,
        version: u32,
        protocol_id: u32,
        mut delegate: Box<dyn OutputDelegate>,
    ) -> ProtocolResult<()> {
        self.registry
            .bind(id, client, "wl_output", version, protocol_id, ObjectKind::Output)?;
        match self.displays.primary() {
            Some(display) => {
                let metrics = OutputMetrics::from_display(&display);
                delegate.metrics(&metrics);
                self.outputs.last = Some(metrics);
            }
            None => debug!("no display available, {id} stays silent"),
        }
        self.outputs.bindings.insert(id, delegate);
        Ok(())
    }

    /// Re-reads the display enumerator and republishes to every bound output
    /// and remote shell when the primary display changed.
    pub fn displays_changed(&mut self) {
        let Some(display) = self.displays.primary() else {
            debug!("display list is empty, nothing to publish");
            return;
        };
        let metrics = OutputMetrics::from_display(&display);
        if self.outputs.last.as_ref() != Some(&metrics) {
            trace!("primary display is now {:?}", metrics);
            for delegate in self.outputs.bindings.values_mut() {
                delegate.metrics(&metrics);
            }
            self.outputs.last = Some(metrics);
        }
        self.publish_remote_configuration();
    }

    /// Swaps the display enumerator and republishes
    pub fn set_displays(&mut self, displays: Box<dyn crate::host::DisplayEnumerator>) {
        self.displays = displays;
        self.displays_changed();
    }
}
