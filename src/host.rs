//! External collaborators
//!
//! The scene core does not paint, place windows, compile keymaps or talk to
//! display hardware. Those services are consumed through the narrow traits
//! below. The headless implementations back the standalone binary.

use crate::config::{KeymapConfig, OutputConfig};
use crate::geometry::Rect;
use crate::output::{DisplayInfo, Rotation};
use crate::registry::ObjectId;
use crate::shell::{Interaction, WindowState};
use crate::surface::SurfaceUpdate;
use anyhow::{anyhow, Result};
use log::{debug, trace};
use xkbcommon::xkb;

/// Receives committed surface state
pub trait Renderer {
    fn surface_committed(&mut self, update: &SurfaceUpdate<'_>);

    fn surface_destroyed(&mut self, _surface: ObjectId) {}
}

/// Host window manager. Placement decisions flow back into the core through
/// the `host_*` methods on [`crate::compositor::Compositor`].
pub trait WindowHost {
    fn window_state_changed(&mut self, window: ObjectId, bounds: Rect, state: WindowState);

    fn window_destroyed(&mut self, _window: ObjectId) {}

    fn interaction_requested(&mut self, _window: ObjectId, _interaction: Interaction) {}

    fn title_changed(&mut self, _window: ObjectId, _title: &str) {}
}

/// Supplies the serialized keyboard layout sent to every keyboard
pub trait KeymapProvider {
    fn keymap(&self) -> Result<String>;
}

/// Reports the physical displays currently attached
pub trait DisplayEnumerator {
    fn displays(&self) -> Vec<DisplayInfo>;

    fn primary(&self) -> Option<DisplayInfo> {
        self.displays().into_iter().next()
    }
}

/// Renderer that only logs what it would paint
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    commits: u64,
}

impl HeadlessRenderer {
    pub fn commits(&self) -> u64 {
        self.commits
    }
}

impl Renderer for HeadlessRenderer {
    fn surface_committed(&mut self, update: &SurfaceUpdate<'_>) {
        self.commits += 1;
        trace!(
            "render {} buffer={:?} damage={:?}",
            update.surface,
            update.buffer.map(|(id, _)| id),
            update.damage.bounds()
        );
    }

    fn surface_destroyed(&mut self, surface: ObjectId) {
        trace!("render drop {}", surface);
    }
}

/// Window host that accepts every placement as requested
#[derive(Debug, Default)]
pub struct HeadlessWindowHost;

impl WindowHost for HeadlessWindowHost {
    fn window_state_changed(&mut self, window: ObjectId, bounds: Rect, state: WindowState) {
        debug!("window {} is {:?} at {}", window, state, bounds);
    }

    fn window_destroyed(&mut self, window: ObjectId) {
        debug!("window {} closed", window);
    }

    fn interaction_requested(&mut self, window: ObjectId, interaction: Interaction) {
        debug!("window {} requested {:?}", window, interaction);
    }
}

/// Fixed display list, typically built from the `[[outputs]]` config
#[derive(Debug, Clone, Default)]
pub struct StaticDisplays {
    displays: Vec<DisplayInfo>,
}

impl StaticDisplays {
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self { displays }
    }

    pub fn from_config(outputs: &[OutputConfig]) -> Self {
        let displays = outputs
            .iter()
            .enumerate()
            .map(|(index, out)| DisplayInfo {
                id: index as u64 + 1,
                name: out.name.clone(),
                bounds: Rect::new(out.x, out.y, out.width, out.height),
                work_area: Rect::new(
                    out.x + out.inset_left,
                    out.y + out.inset_top,
                    out.width - out.inset_left - out.inset_right,
                    out.height - out.inset_top - out.inset_bottom,
                ),
                dpi: out.dpi,
                scale: out.scale,
                rotation: Rotation::from_degrees(out.rotation).unwrap_or_default(),
                refresh_mhz: out.refresh_mhz,
            })
            .collect();
        Self { displays }
    }
}

impl DisplayEnumerator for StaticDisplays {
    fn displays(&self) -> Vec<DisplayInfo> {
        self.displays.clone()
    }
}

/// Compiles an XKB keymap from RMLVO names
#[derive(Debug, Clone)]
pub struct XkbKeymapProvider {
    config: KeymapConfig,
}

impl XkbKeymapProvider {
    pub fn new(config: KeymapConfig) -> Self {
        Self { config }
    }
}

impl KeymapProvider for XkbKeymapProvider {
    fn keymap(&self) -> Result<String> {
        let ctx = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let keymap = xkb::Keymap::new_from_names(
            &ctx,
            &self.config.rules,
            &self.config.model,
            &self.config.layout,
            &self.config.variant,
            Some(self.config.options.clone()),
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| anyhow!("failed to compile keymap for layout {:?}", self.config.layout))?;
        Ok(keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_displays_from_config() {
        let outputs = vec![OutputConfig {
            inset_bottom: 48,
            ..OutputConfig::default()
        }];
        let displays = StaticDisplays::from_config(&outputs);
        let primary = displays.primary().expect("primary display");
        assert_eq!(primary.bounds, Rect::new(0, 0, 1920, 1080));
        assert_eq!(primary.work_area, Rect::new(0, 0, 1920, 1032));
        assert_eq!(primary.id, 1);
    }

    #[test]
    fn test_empty_display_list_has_no_primary() {
        assert!(StaticDisplays::default().primary().is_none());
    }
}
