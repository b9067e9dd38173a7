use super::*;
use crate::buffer::Buffer;
use crate::registry::RegistryError;
use crate::test_support::{headless, shm_buffer, Recorder};
use anyhow::Result;
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Fixture {
    c: Compositor,
    rec: Rc<RefCell<Recorder>>,
    client: ClientId,
    compositor: ObjectId,
    subcompositor: ObjectId,
    shm: ObjectId,
    extensions: ObjectId,
    next_wire: u32,
}

impl Fixture {
    fn new() -> Result<Self> {
        let (mut c, rec) = headless();
        let client = c.connect_client();
        let compositor = c.bind_global(client, "wl_compositor", 3, 1)?;
        let subcompositor = c.bind_global(client, "wl_subcompositor", 1, 2)?;
        let shm = c.bind_global(client, "wl_shm", 1, 3)?;
        let extensions = c.bind_global(client, "wp_viewporter", 1, 4)?;
        Ok(Self {
            c,
            rec,
            client,
            compositor,
            subcompositor,
            shm,
            extensions,
            next_wire: 10,
        })
    }

    fn wire(&mut self) -> u32 {
        self.next_wire += 1;
        self.next_wire
    }

    fn surface(&mut self) -> Result<ObjectId> {
        let id = self.c.allocate_id();
        let wire = self.wire();
        self.c.create_surface(self.client, self.compositor, id, wire)?;
        Ok(id)
    }

    fn buffer(&mut self, width: i32, height: i32) -> Result<ObjectId> {
        let id = self.c.allocate_id();
        let wire = self.wire();
        self.c
            .create_buffer(self.client, self.shm, id, wire, shm_buffer(width, height))?;
        Ok(id)
    }

    /// Returns (wl_subsurface object, child surface)
    fn subsurface(&mut self, parent: ObjectId) -> Result<(ObjectId, ObjectId)> {
        let child = self.surface()?;
        let id = self.c.allocate_id();
        let wire = self.wire();
        self.c
            .create_subsurface(self.client, self.subcompositor, id, wire, child, parent)?;
        Ok((id, child))
    }

    fn extension(&mut self, surface: ObjectId, kind: ExtensionKind) -> ProtocolResult<ObjectId> {
        let id = self.c.allocate_id();
        let wire = self.wire();
        self.c
            .create_extension(self.client, self.extensions, id, wire, surface, kind)?;
        Ok(id)
    }

    fn commits_of(&self, surface: ObjectId) -> usize {
        self.rec
            .borrow()
            .commits
            .iter()
            .filter(|r| r.surface == surface)
            .count()
    }
}

#[test]
fn test_commit_hands_buffer_and_damage_to_renderer() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let buffer = f.buffer(100, 100)?;

    f.c.attach(f.client, surface, Some(buffer), Point::default())?;
    f.c.damage(f.client, surface, Rect::new(0, 0, 100, 100))?;
    f.c.commit(f.client, surface)?;

    let rec = f.rec.borrow();
    assert_eq!(rec.commits.len(), 1);
    assert_eq!(rec.commits[0].surface, surface);
    assert_eq!(rec.commits[0].buffer, Some(buffer));
    assert_eq!(rec.commits[0].damage, Region::from_rect(Rect::new(0, 0, 100, 100)));
    let state = f.c.surface(surface).expect("surface");
    assert!(state.pending_damage().is_empty());
    assert_eq!(state.committed().buffer, Some(buffer));
    Ok(())
}

#[test]
fn test_damage_accumulates_until_commit() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    f.c.damage(f.client, surface, Rect::new(0, 0, 10, 10))?;
    f.c.damage(f.client, surface, Rect::new(5, 5, 10, 10))?;
    f.c.commit(f.client, surface)?;
    assert_eq!(
        f.c.surface(surface).map(|s| s.committed_damage().area()),
        Some(175)
    );

    f.c.commit(f.client, surface)?;
    assert!(f
        .c
        .surface(surface)
        .is_some_and(|s| s.committed_damage().is_empty()));
    Ok(())
}

#[test]
fn test_buffer_persists_across_commits_without_attach() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let buffer = f.buffer(4, 4)?;
    f.c.attach(f.client, surface, Some(buffer), Point::default())?;
    f.c.commit(f.client, surface)?;
    f.c.set_buffer_scale(f.client, surface, 2)?;
    f.c.commit(f.client, surface)?;

    let state = f.c.surface(surface).expect("surface");
    assert_eq!(state.committed().buffer, Some(buffer));
    assert_eq!(state.committed().buffer_scale, 2);
    assert_eq!(state.commit_count(), 2);
    Ok(())
}

#[test]
fn test_buffer_released_once_when_replaced_or_detached() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let first = f.buffer(4, 4)?;
    let second = f.buffer(4, 4)?;
    let released = Rc::new(RefCell::new(Vec::new()));
    for buffer in [first, second] {
        let log = released.clone();
        assert!(f.c.set_buffer_release(buffer, move || log.borrow_mut().push(buffer)));
    }

    f.c.attach(f.client, surface, Some(first), Point::default())?;
    f.c.commit(f.client, surface)?;
    assert!(f.c.buffer(first).is_some_and(Buffer::is_in_use));
    assert!(released.borrow().is_empty());

    f.c.attach(f.client, surface, Some(second), Point::default())?;
    f.c.commit(f.client, surface)?;
    assert_eq!(*released.borrow(), vec![first]);

    // Re-committing the same buffer does not release it
    f.c.commit(f.client, surface)?;
    assert_eq!(*released.borrow(), vec![first]);

    f.c.attach(f.client, surface, None, Point::default())?;
    f.c.commit(f.client, surface)?;
    assert_eq!(*released.borrow(), vec![first, second]);
    Ok(())
}

#[test]
fn test_destroying_surface_releases_its_buffer() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let buffer = f.buffer(4, 4)?;
    let released = Rc::new(Cell::new(0));
    let counter = released.clone();
    f.c.set_buffer_release(buffer, move || counter.set(counter.get() + 1));
    f.c.attach(f.client, surface, Some(buffer), Point::default())?;
    f.c.commit(f.client, surface)?;

    f.c.destroy(f.client, surface)?;
    assert_eq!(released.get(), 1);
    assert!(f.c.buffer(buffer).is_some_and(|b| !b.is_in_use()));
    Ok(())
}

#[test]
fn test_buffer_destroyed_before_commit_detaches() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let buffer = f.buffer(4, 4)?;
    f.c.attach(f.client, surface, Some(buffer), Point::default())?;
    f.c.destroy(f.client, buffer)?;
    f.c.commit(f.client, surface)?;
    assert_eq!(f.c.surface(surface).and_then(|s| s.committed().buffer), None);
    Ok(())
}

#[test]
fn test_invalid_scale_is_rejected_without_touching_state() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let err = f.c.set_buffer_scale(f.client, surface, 0).unwrap_err();
    assert_eq!(err, ProtocolError::InvalidScale(0));
    assert!(!err.is_fatal());
    assert_eq!(f.c.surface(surface).map(|s| s.pending().buffer_scale), Some(1));
    Ok(())
}

#[test]
fn test_damage_buffer_uses_pending_scale() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    f.c.set_buffer_scale(f.client, surface, 2)?;
    f.c.damage_buffer(f.client, surface, Rect::new(0, 0, 40, 20))?;
    assert_eq!(
        f.c.surface(surface).map(|s| s.pending_damage().bounds()),
        Some(Rect::new(0, 0, 20, 10))
    );
    Ok(())
}

#[test]
fn test_regions_are_copied_into_surface_state() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let region = f.c.allocate_id();
    let wire = f.wire();
    f.c.create_region(f.client, f.compositor, region, wire)?;
    f.c.region_add(f.client, region, Rect::new(0, 0, 50, 50))?;

    f.c.set_opaque_region(f.client, surface, Some(region))?;
    f.c.set_input_region(f.client, surface, Some(region))?;
    f.c.region_add(f.client, region, Rect::new(50, 0, 50, 50))?;
    f.c.destroy(f.client, region)?;
    f.c.commit(f.client, surface)?;

    let committed = f.c.surface(surface).expect("surface").committed().clone();
    assert_eq!(committed.opaque_region.area(), 2500);
    assert!(!committed.input_region.contains(75, 10));

    f.c.set_input_region(f.client, surface, None)?;
    f.c.commit(f.client, surface)?;
    assert!(f
        .c
        .surface(surface)
        .is_some_and(|s| s.committed().input_region.contains(10_000, 10_000)));
    Ok(())
}

#[test]
fn test_frame_callbacks_fire_in_order_on_present() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let fired = Rc::new(RefCell::new(Vec::new()));
    let mut callbacks = Vec::new();
    for tag in ["first", "second"] {
        let callback = f.c.allocate_id();
        let wire = f.wire();
        let log = fired.clone();
        f.c.frame(f.client, surface, callback, wire, move |time| {
            log.borrow_mut().push((tag, time))
        })?;
        callbacks.push(callback);
    }

    f.c.present(16);
    assert!(fired.borrow().is_empty());

    f.c.commit(f.client, surface)?;
    f.c.present(32);
    assert_eq!(*fired.borrow(), vec![("first", 32), ("second", 32)]);
    assert!(callbacks.iter().all(|cb| !f.c.is_live(*cb)));

    f.c.present(48);
    assert_eq!(fired.borrow().len(), 2);
    Ok(())
}

#[test]
fn test_destroyed_surface_drops_callbacks_silently() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    let callback = f.c.allocate_id();
    let wire = f.wire();
    f.c.frame(f.client, surface, callback, wire, move |_| flag.set(true))?;
    f.c.commit(f.client, surface)?;

    f.c.destroy(f.client, surface)?;
    f.c.present(16);
    assert!(!fired.get());
    assert!(!f.c.is_live(callback));
    // Destroying the already-gone callback is a no-op
    f.c.destroy_object(callback);
    Ok(())
}

#[test]
fn test_destroyed_subsurface_drops_cached_callbacks() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (sub, child) = f.subsurface(parent)?;
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    let callback = f.c.allocate_id();
    let wire = f.wire();
    f.c.frame(f.client, child, callback, wire, move |_| flag.set(true))?;
    f.c.commit(f.client, child)?;
    assert!(f.c.surface(child).is_some_and(|s| s.has_cached_state()));

    f.c.destroy(f.client, sub)?;
    assert!(!f.c.is_live(callback));
    assert!(!f.c.callbacks.contains_key(&callback));
    assert!(f.c.surface(child).is_some_and(|s| !s.has_cached_state()));

    f.c.destroy(f.client, child)?;
    f.c.commit(f.client, parent)?;
    f.c.present(16);
    assert!(!fired.get());
    Ok(())
}

#[test]
fn test_synchronized_child_waits_for_parent_commit() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (_sub, child) = f.subsurface(parent)?;
    let buffer = f.buffer(8, 8)?;

    f.c.attach(f.client, child, Some(buffer), Point::default())?;
    f.c.damage(f.client, child, Rect::new(0, 0, 8, 8))?;
    f.c.commit(f.client, child)?;
    assert!(f.c.is_synchronized(child));
    assert_eq!(f.c.surface(child).and_then(|s| s.committed().buffer), None);
    assert!(f.c.surface(child).is_some_and(Surface::has_cached_state));
    assert_eq!(f.commits_of(child), 0);

    f.c.commit(f.client, parent)?;
    assert_eq!(f.c.surface(child).and_then(|s| s.committed().buffer), Some(buffer));
    let order: Vec<ObjectId> = f.rec.borrow().commits.iter().map(|r| r.surface).collect();
    assert_eq!(order, vec![parent, child]);
    Ok(())
}

#[test]
fn test_children_apply_in_creation_order() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (_a_sub, a) = f.subsurface(parent)?;
    let (_b_sub, b) = f.subsurface(parent)?;
    f.c.commit(f.client, b)?;
    f.c.commit(f.client, a)?;

    f.c.commit(f.client, parent)?;
    let order: Vec<ObjectId> = f.rec.borrow().commits.iter().map(|r| r.surface).collect();
    assert_eq!(order, vec![parent, a, b]);
    Ok(())
}

#[test]
fn test_nested_sync_inherits_from_ancestor() -> Result<()> {
    let mut f = Fixture::new()?;
    let root = f.surface()?;
    let (middle_sub, middle) = f.subsurface(root)?;
    assert!(f.c.is_synchronized(middle));
    let (leaf_sub, leaf) = f.subsurface(middle)?;
    f.c.subsurface_set_sync(f.client, leaf_sub, false)?;
    assert!(f.c.is_synchronized(leaf));

    f.c.subsurface_set_sync(f.client, middle_sub, false)?;
    assert!(!f.c.is_synchronized(leaf));
    f.c.commit(f.client, leaf)?;
    assert_eq!(f.commits_of(leaf), 1);
    Ok(())
}

#[test]
fn test_desync_flushes_cached_state() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (sub, child) = f.subsurface(parent)?;
    f.c.damage(f.client, child, Rect::new(0, 0, 4, 4))?;
    f.c.commit(f.client, child)?;
    assert_eq!(f.commits_of(child), 0);

    f.c.subsurface_set_sync(f.client, sub, false)?;
    assert_eq!(f.commits_of(child), 1);
    assert!(f.c.surface(child).is_some_and(|s| !s.has_cached_state()));
    Ok(())
}

#[test]
fn test_position_and_stacking_apply_on_parent_commit() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (a_sub, a) = f.subsurface(parent)?;
    let (_b_sub, b) = f.subsurface(parent)?;

    f.c.subsurface_set_position(f.client, a_sub, Point::new(20, 30))?;
    f.c.subsurface_place_above(f.client, a_sub, b)?;
    assert_eq!(f.c.surface(a).and_then(|s| s.subsurface()).map(|s| s.position), Some(Point::default()));
    assert_eq!(f.c.surface(parent).map(|s| s.stacking().to_vec()), Some(vec![parent]));

    f.c.commit(f.client, parent)?;
    assert_eq!(
        f.c.surface(a).and_then(|s| s.subsurface()).map(|s| s.position),
        Some(Point::new(20, 30))
    );
    assert_eq!(f.c.surface(parent).map(|s| s.stacking().to_vec()), Some(vec![parent, b, a]));

    f.c.subsurface_place_below(f.client, a_sub, parent)?;
    f.c.commit(f.client, parent)?;
    assert_eq!(f.c.surface(parent).map(|s| s.stacking().to_vec()), Some(vec![a, parent, b]));
    Ok(())
}

#[test]
fn test_restack_against_a_stranger_is_rejected() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (a_sub, _a) = f.subsurface(parent)?;
    let stranger = f.surface()?;
    let err = f
        .c
        .subsurface_place_above(f.client, a_sub, stranger)
        .unwrap_err();
    assert_eq!(err, ProtocolError::BadSurface(stranger));
    Ok(())
}

#[test]
fn test_subsurface_cycles_are_rejected() -> Result<()> {
    let mut f = Fixture::new()?;
    let root = f.surface()?;
    let (_sub, child) = f.subsurface(root)?;

    let own = f.c.allocate_id();
    let err = f
        .c
        .create_subsurface(f.client, f.subcompositor, own, 90, root, root)
        .unwrap_err();
    assert_eq!(err, ProtocolError::BadSurface(root));

    let cycle = f.c.allocate_id();
    let err = f
        .c
        .create_subsurface(f.client, f.subcompositor, cycle, 91, root, child)
        .unwrap_err();
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_destroying_surface_destroys_role_object() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (sub, child) = f.subsurface(parent)?;

    f.c.destroy(f.client, child)?;
    assert!(!f.c.is_live(sub));
    assert!(f.c.surface(child).is_none());
    assert_eq!(f.c.surface(parent).map(|s| s.children().len()), Some(0));
    assert_eq!(
        f.c.subsurface_set_position(f.client, sub, Point::new(1, 1)),
        Err(ProtocolError::Registry(RegistryError::Stale(sub)))
    );
    Ok(())
}

#[test]
fn test_parent_destroyed_orphans_children() -> Result<()> {
    let mut f = Fixture::new()?;
    let parent = f.surface()?;
    let (sub, child) = f.subsurface(parent)?;
    f.c.destroy(f.client, parent)?;

    assert!(f.c.is_live(sub));
    assert_eq!(f.c.surface(child).and_then(|s| s.subsurface()).and_then(|s| s.parent), None);
    assert!(!f.c.is_synchronized(child));
    f.c.commit(f.client, child)?;
    assert_eq!(f.commits_of(child), 1);
    Ok(())
}

#[test]
fn test_foreign_surface_is_fatal() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let intruder = f.c.connect_client();
    let err = f.c.commit(intruder, surface).unwrap_err();
    assert!(err.is_fatal());
    assert!(f.c.destroy(intruder, surface).is_err());
    assert!(f.c.surface(surface).is_some());
    Ok(())
}

#[test]
fn test_one_extension_of_each_kind_per_surface() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let viewport = f.extension(surface, ExtensionKind::Viewport)?;
    f.extension(surface, ExtensionKind::Security)?;
    f.extension(surface, ExtensionKind::Blending)?;
    assert!(f.c.surface(surface).is_some_and(|s| s.properties().get(&HAS_VIEWPORT)));

    let err = f.extension(surface, ExtensionKind::Viewport).unwrap_err();
    assert_eq!(
        err,
        ProtocolError::ExtensionExists {
            surface,
            extension: "wp_viewport"
        }
    );

    f.c.destroy(f.client, viewport)?;
    assert!(f.c.surface(surface).is_some_and(|s| !s.properties().get(&HAS_VIEWPORT)));
    f.extension(surface, ExtensionKind::Viewport)?;
    Ok(())
}

#[test]
fn test_failed_extension_create_leaves_surface_unmarked() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;

    // Wire id 4 already belongs to the bound wp_viewporter
    let taken = f.c.allocate_id();
    let err = f
        .c
        .create_extension(f.client, f.extensions, taken, 4, surface, ExtensionKind::Viewport)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Registry(RegistryError::IdInUse { .. })));
    assert!(f.c.surface(surface).is_some_and(|s| !s.properties().get(&HAS_VIEWPORT)));
    assert!(!f.c.is_live(taken));

    let viewport = f.extension(surface, ExtensionKind::Viewport)?;
    assert!(f.c.is_live(viewport));
    assert!(f.c.surface(surface).is_some_and(|s| s.properties().get(&HAS_VIEWPORT)));
    Ok(())
}

#[test]
fn test_viewport_crops_and_scales() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let viewport = f.extension(surface, ExtensionKind::Viewport)?;

    let bad = f
        .c
        .viewport_set_source(f.client, viewport, Some(RectF::new(-1.0, 0.0, 10.0, 10.0)))
        .unwrap_err();
    assert!(matches!(bad, ProtocolError::ViewportBadValue(_)));
    assert!(f
        .c
        .viewport_set_destination(f.client, viewport, Some(Size::new(0, 10)))
        .is_err());

    f.c.viewport_set_source(f.client, viewport, Some(RectF::new(0.0, 0.0, 32.5, 16.0)))?;
    f.c.viewport_set_destination(f.client, viewport, Some(Size::new(64, 32)))?;
    f.c.commit(f.client, surface)?;
    let state = f.c.surface(surface).expect("surface");
    assert_eq!(state.content_size(Some(Size::new(100, 100))), Size::new(64, 32));

    f.c.destroy(f.client, viewport)?;
    f.c.commit(f.client, surface)?;
    let state = f.c.surface(surface).expect("surface");
    assert_eq!(state.committed().viewport, Viewport::default());
    assert_eq!(state.content_size(Some(Size::new(100, 100))), Size::new(100, 100));
    Ok(())
}

#[test]
fn test_blending_and_security_attributes() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let security = f.extension(surface, ExtensionKind::Security)?;
    let blending = f.extension(surface, ExtensionKind::Blending)?;

    f.c.set_only_visible_on_secure_output(f.client, security)?;
    f.c.set_blend_mode(f.client, blending, BlendMode::Coverage)?;
    assert_eq!(
        f.c.set_alpha(f.client, blending, 1.5),
        Err(ProtocolError::InvalidAlpha(1.5))
    );
    f.c.set_alpha(f.client, blending, 0.5)?;
    f.c.commit(f.client, surface)?;

    let committed = f.c.surface(surface).expect("surface").committed().clone();
    assert!(committed.only_visible_on_secure_output);
    assert_eq!(committed.blend_mode, BlendMode::Coverage);
    assert_eq!(committed.alpha, 0.5);
    Ok(())
}

#[test]
fn test_extension_without_surface_rejects_requests() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let viewport = f.extension(surface, ExtensionKind::Viewport)?;
    f.c.destroy(f.client, surface)?;

    assert!(f.c.is_live(viewport));
    let err = f
        .c
        .viewport_set_destination(f.client, viewport, Some(Size::new(5, 5)))
        .unwrap_err();
    assert!(err.is_fatal());
    f.c.destroy(f.client, viewport)?;
    Ok(())
}

#[test]
fn test_transform_swaps_content_axes() -> Result<()> {
    let mut f = Fixture::new()?;
    let surface = f.surface()?;
    let buffer = f.buffer(40, 20)?;
    f.c.attach(f.client, surface, Some(buffer), Point::default())?;
    f.c.set_buffer_transform(f.client, surface, Transform::Rotate90)?;
    f.c.commit(f.client, surface)?;
    let state = f.c.surface(surface).expect("surface");
    assert_eq!(state.content_size(Some(Size::new(40, 20))), Size::new(20, 40));
    assert_eq!(Transform::from_raw(8), None);
    Ok(())
}

proptest! {
    #[test]
    fn prop_committed_damage_is_union_of_pending(
        rects in prop::collection::vec((0i32..64, 0i32..64, 1i32..32, 1i32..32), 1..6)
    ) {
        let mut f = Fixture::new().expect("fixture");
        let surface = f.surface().expect("surface");
        let mut expected = Region::new();
        for (x, y, w, h) in rects {
            let rect = Rect::new(x, y, w, h);
            expected.add(rect);
            f.c.damage(f.client, surface, rect).expect("damage");
        }
        f.c.commit(f.client, surface).expect("commit");
        let state = f.c.surface(surface).expect("surface");
        prop_assert_eq!(state.committed_damage(), &expected);
        prop_assert!(state.pending_damage().is_empty());
    }
}
