use super::flavor::{remote_transitions, RemoteTransition};
use super::*;
use crate::test_support::{event_log, headless, last_configure, shm_buffer, Event, EventLog, Recording};
use anyhow::Result;

/// One connected client with a compositor and a shell global bound
struct Client {
    id: ClientId,
    compositor: ObjectId,
    shell: ObjectId,
    next_wire: u32,
}

impl Client {
    fn connect(c: &mut Compositor) -> Result<Self> {
        let id = c.connect_client();
        let compositor = c.bind_global(id, "wl_compositor", 3, 1)?;
        let shell = c.bind_global(id, "xdg_wm_base", 1, 2)?;
        Ok(Self {
            id,
            compositor,
            shell,
            next_wire: 10,
        })
    }

    fn wire(&mut self) -> u32 {
        self.next_wire += 1;
        self.next_wire
    }

    fn surface(&mut self, c: &mut Compositor) -> Result<ObjectId> {
        let surface = c.allocate_id();
        let wire = self.wire();
        c.create_surface(self.id, self.compositor, surface, wire)?;
        Ok(surface)
    }

    /// Unmapped toplevel: returns (surface, shell surface)
    fn window(
        &mut self,
        c: &mut Compositor,
        flavor: ShellFlavor,
        log: &EventLog,
    ) -> Result<(ObjectId, ObjectId)> {
        let surface = self.surface(c)?;
        let shell = c.allocate_id();
        let wire = self.wire();
        c.create_shell_surface(
            self.id,
            self.shell,
            shell,
            wire,
            surface,
            Role::Toplevel,
            flavor,
            Recording::boxed(log),
        )?;
        Ok((surface, shell))
    }

    /// Toplevel that has gone through map, ack and commit
    fn mapped_window(
        &mut self,
        c: &mut Compositor,
        flavor: ShellFlavor,
        log: &EventLog,
    ) -> Result<(ObjectId, ObjectId)> {
        let (surface, shell) = self.window(c, flavor, log)?;
        c.map(self.id, shell, WindowState::Normal)?;
        let serial = last_configure(log).expect("map configure").serial;
        c.ack_configure(self.id, shell, serial)?;
        c.commit(self.id, surface)?;
        Ok((surface, shell))
    }
}

fn state(c: &Compositor, shell: ObjectId) -> WindowState {
    c.shell_surface(shell).map(ShellSurface::state).unwrap_or_default()
}

#[test]
fn test_new_shell_surface_is_disabled_until_mapped() -> Result<()> {
    let (mut c, rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.window(&mut c, ShellFlavor::Stable, &log)?;

    assert_eq!(state(&c, shell), WindowState::Disabled);
    assert!(log.borrow().is_empty());
    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Disabled);
    assert!(rec.borrow().windows.is_empty());

    c.map(client.id, shell, WindowState::Normal)?;
    let configure = last_configure(&log).expect("configure");
    assert_eq!(configure.state, WindowState::Normal);
    assert!(c.shell_surface(shell).is_some_and(ShellSurface::is_mapped));
    Ok(())
}

#[test]
fn test_fullscreen_applies_only_after_ack_and_commit() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    assert_eq!(state(&c, shell), WindowState::Normal);

    c.request_state(client.id, shell, WindowState::Fullscreen)?;
    let offer = last_configure(&log).expect("fullscreen configure");
    assert_eq!(offer.state, WindowState::Fullscreen);
    assert_eq!(offer.size, Size::new(1920, 1080));

    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Normal);
    assert_eq!(
        c.shell_surface(shell).map(ShellSurface::requested_state),
        Some(WindowState::Fullscreen)
    );

    c.ack_configure(client.id, shell, offer.serial)?;
    assert_eq!(state(&c, shell), WindowState::Normal);
    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Fullscreen);
    assert_eq!(
        c.shell_surface(shell).map(|s| s.bounds().size()),
        Some(Size::new(1920, 1080))
    );
    assert!(log
        .borrow()
        .contains(&Event::StateChanged(WindowState::Normal, WindowState::Fullscreen)));
    Ok(())
}

#[test]
fn test_flavors_reach_the_same_state_and_geometry() -> Result<()> {
    let mut outcomes = Vec::new();
    for flavor in [ShellFlavor::Legacy, ShellFlavor::Stable, ShellFlavor::Remote] {
        let (mut c, _rec) = headless();
        let mut client = Client::connect(&mut c)?;
        let log = event_log();
        let (surface, shell) = client.window(&mut c, flavor, &log)?;

        c.map(client.id, shell, WindowState::Normal)?;
        if flavor != ShellFlavor::Legacy {
            let serial = last_configure(&log).expect("configure").serial;
            c.ack_configure(client.id, shell, serial)?;
        }
        c.commit(client.id, surface)?;

        c.request_state(client.id, shell, WindowState::Maximized)?;
        if flavor != ShellFlavor::Legacy {
            // Not applied before the acknowledgement
            c.commit(client.id, surface)?;
            assert_eq!(state(&c, shell), WindowState::Normal, "{flavor:?}");
            let serial = last_configure(&log).expect("configure").serial;
            c.ack_configure(client.id, shell, serial)?;
        }
        c.commit(client.id, surface)?;

        let shell = c.shell_surface(shell).expect("shell surface");
        outcomes.push((shell.state(), shell.bounds()));
    }
    assert_eq!(outcomes[0].0, WindowState::Maximized);
    assert_eq!(outcomes[0].1.size(), Size::new(1920, 1040));
    assert!(outcomes.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}

#[test]
fn test_legacy_commit_acknowledges_implicitly() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.window(&mut c, ShellFlavor::Legacy, &log)?;

    c.map(client.id, shell, WindowState::Fullscreen)?;
    assert_eq!(state(&c, shell), WindowState::Disabled);
    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Fullscreen);
    assert_eq!(c.shell_surface(shell).map(|s| s.pending_configures().count()), Some(0));
    Ok(())
}

#[test]
fn test_unknown_serial_is_ignored() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    c.request_state(client.id, shell, WindowState::Maximized)?;

    c.ack_configure(client.id, shell, 0xdead)?;
    assert_eq!(c.shell_surface(shell).map(|s| s.pending_configures().count()), Some(1));
    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Normal);
    Ok(())
}

#[test]
fn test_ack_drops_every_older_configure() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    c.request_state(client.id, shell, WindowState::Maximized)?;
    c.request_state(client.id, shell, WindowState::Fullscreen)?;
    let middle = last_configure(&log).expect("configure").serial;
    c.request_state(client.id, shell, WindowState::Minimized)?;

    c.ack_configure(client.id, shell, middle)?;
    let remaining: Vec<WindowState> = c
        .shell_surface(shell)
        .expect("shell surface")
        .pending_configures()
        .map(|configure| configure.state)
        .collect();
    assert_eq!(remaining, vec![WindowState::Minimized]);

    c.commit(client.id, surface)?;
    assert_eq!(state(&c, shell), WindowState::Fullscreen);
    Ok(())
}

#[test]
fn test_configure_queue_is_bounded_and_serials_increase() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    for round in 0..40 {
        let target = if round % 2 == 0 {
            WindowState::Maximized
        } else {
            WindowState::Fullscreen
        };
        c.request_state(client.id, shell, target)?;
    }
    let serials: Vec<u32> = c
        .shell_surface(shell)
        .expect("shell surface")
        .pending_configures()
        .map(|configure| configure.serial)
        .collect();
    assert_eq!(serials.len(), MAX_PENDING_CONFIGURES);
    assert!(serials.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(serials.last().copied(), last_configure(&log).map(|c| c.serial));
    Ok(())
}

#[test]
fn test_repeated_request_offers_once() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    let before = log.borrow().len();

    c.request_state(client.id, shell, WindowState::Maximized)?;
    c.request_state(client.id, shell, WindowState::Maximized)?;
    assert_eq!(log.borrow().len(), before + 1);
    Ok(())
}

#[test]
fn test_restore_returns_to_saved_bounds() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    let ack_commit = |c: &mut Compositor, log: &EventLog| -> Result<()> {
        let serial = last_configure(log).expect("configure").serial;
        c.ack_configure(client.id, shell, serial)?;
        c.commit(client.id, surface)?;
        Ok(())
    };

    c.host_set_bounds(shell, Rect::new(100, 100, 800, 600));
    ack_commit(&mut c, &log)?;
    assert_eq!(c.shell_surface(shell).map(ShellSurface::bounds), Some(Rect::new(100, 100, 800, 600)));

    c.request_state(client.id, shell, WindowState::Maximized)?;
    ack_commit(&mut c, &log)?;
    assert_eq!(state(&c, shell), WindowState::Maximized);

    c.request_state(client.id, shell, WindowState::Normal)?;
    assert_eq!(last_configure(&log).map(|c| c.size), Some(Size::new(800, 600)));
    ack_commit(&mut c, &log)?;
    assert_eq!(state(&c, shell), WindowState::Normal);
    assert_eq!(
        c.shell_surface(shell).map(|s| s.bounds().size()),
        Some(Size::new(800, 600))
    );
    Ok(())
}

#[test]
fn test_window_geometry_defines_reported_bounds() -> Result<()> {
    let (mut c, rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    let shm = c.bind_global(client.id, "wl_shm", 1, 3)?;
    let buffer = c.allocate_id();
    c.create_buffer(client.id, shm, buffer, 4, shm_buffer(120, 90))?;

    c.attach(client.id, surface, Some(buffer), Point::default())?;
    c.commit(client.id, surface)?;
    assert_eq!(c.shell_surface(shell).map(|s| s.bounds().size()), Some(Size::new(120, 90)));

    let err = c
        .set_window_geometry(client.id, shell, Rect::new(0, 0, 0, 10))
        .unwrap_err();
    assert!(!err.is_fatal());

    c.set_window_geometry(client.id, shell, Rect::new(10, 10, 100, 70))?;
    assert_eq!(c.shell_surface(shell).and_then(ShellSurface::geometry), None);
    c.commit(client.id, surface)?;
    assert_eq!(
        c.shell_surface(shell).and_then(ShellSurface::geometry),
        Some(Rect::new(10, 10, 100, 70))
    );
    let last = rec.borrow().windows.last().copied();
    assert_eq!(last.map(|(_, bounds, _)| bounds.size()), Some(Size::new(100, 70)));
    Ok(())
}

#[test]
fn test_size_limits_clamp_offers() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    c.set_max_size(client.id, shell, Size::new(1000, 700))?;
    c.request_state(client.id, shell, WindowState::Maximized)?;
    assert_eq!(last_configure(&log).map(|c| c.size), Some(Size::new(1000, 700)));

    let err = c.set_min_size(client.id, shell, Size::new(-1, 5)).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidDimensions { .. }));
    Ok(())
}

#[test]
fn test_second_role_is_rejected_without_disconnect() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, _shell) = client.window(&mut c, ShellFlavor::Stable, &log)?;

    let popup = c.allocate_id();
    let err = c
        .create_shell_surface(
            client.id,
            client.shell,
            popup,
            99,
            surface,
            Role::Popup,
            ShellFlavor::Stable,
            Recording::boxed(&log),
        )
        .unwrap_err();
    assert!(matches!(err, ProtocolError::RoleAlreadyAssigned { .. }));
    assert!(!err.is_fatal());
    assert!(!c.is_live(popup));
    assert_eq!(c.registry().find(client.id, 99), None);
    Ok(())
}

#[test]
fn test_role_object_can_be_recreated_after_destroy() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.window(&mut c, ShellFlavor::Stable, &log)?;
    c.destroy(client.id, shell)?;

    let again = c.allocate_id();
    c.create_shell_surface(
        client.id,
        client.shell,
        again,
        77,
        surface,
        Role::Toplevel,
        ShellFlavor::Stable,
        Recording::boxed(&log),
    )?;
    assert!(c.shell_surface(again).is_some());
    Ok(())
}

#[test]
fn test_popup_is_placed_relative_to_parent() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let parent_log = event_log();
    let (_parent_surface, parent) = client.mapped_window(&mut c, ShellFlavor::Stable, &parent_log)?;

    let log = event_log();
    let surface = client.surface(&mut c)?;
    let popup = c.allocate_id();
    c.create_popup(
        client.id,
        client.shell,
        popup,
        50,
        surface,
        parent,
        Rect::new(10, 20, 100, 50),
        ShellFlavor::Stable,
        Recording::boxed(&log),
    )?;
    let configure = last_configure(&log).expect("popup configure");
    assert_eq!(configure.origin, Point::new(10, 20));
    assert_eq!(configure.size, Size::new(100, 50));
    let shell = c.shell_surface(popup).expect("popup");
    assert!(shell.is_popup());
    assert_eq!(shell.parent(), Some(parent));
    Ok(())
}

#[test]
fn test_popup_parent_must_belong_to_the_client() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut owner = Client::connect(&mut c)?;
    let mut intruder = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, parent) = owner.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    let surface = intruder.surface(&mut c)?;
    let popup = c.allocate_id();
    let err = c
        .create_popup(
            intruder.id,
            intruder.shell,
            popup,
            50,
            surface,
            parent,
            Rect::new(0, 0, 10, 10),
            ShellFlavor::Stable,
            Recording::boxed(&log),
        )
        .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidParent(parent));
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_dismissing_a_popup_dismisses_its_children() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let parent_log = event_log();
    let (_surface, toplevel) = client.mapped_window(&mut c, ShellFlavor::Stable, &parent_log)?;

    let mut popup_in = |c: &mut Compositor, parent: ObjectId, log: &EventLog| -> Result<ObjectId> {
        let surface = client.surface(c)?;
        let popup = c.allocate_id();
        let wire = client.wire();
        c.create_popup(
            client.id,
            client.shell,
            popup,
            wire,
            surface,
            parent,
            Rect::new(5, 5, 40, 40),
            ShellFlavor::Stable,
            Recording::boxed(log),
        )?;
        Ok(popup)
    };
    let outer_log = event_log();
    let inner_log = event_log();
    let outer = popup_in(&mut c, toplevel, &outer_log)?;
    popup_in(&mut c, outer, &inner_log)?;

    c.host_dismiss_popup(outer);
    assert!(outer_log.borrow().contains(&Event::PopupDone));
    assert!(inner_log.borrow().contains(&Event::PopupDone));
    assert!(!parent_log.borrow().contains(&Event::PopupDone));

    // Dismissing a toplevel is not a thing
    c.host_dismiss_popup(toplevel);
    assert!(!parent_log.borrow().contains(&Event::PopupDone));
    Ok(())
}

#[test]
fn test_destroying_parent_dismisses_popups() -> Result<()> {
    let (mut c, rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let parent_log = event_log();
    let (parent_surface, parent) = client.mapped_window(&mut c, ShellFlavor::Stable, &parent_log)?;

    let log = event_log();
    let surface = client.surface(&mut c)?;
    let popup = c.allocate_id();
    c.create_popup(
        client.id,
        client.shell,
        popup,
        60,
        surface,
        parent,
        Rect::new(0, 0, 20, 20),
        ShellFlavor::Stable,
        Recording::boxed(&log),
    )?;

    c.destroy(client.id, parent_surface)?;
    assert!(!c.is_live(parent));
    assert!(c.shell_surface(parent).is_none());
    assert!(log.borrow().contains(&Event::PopupDone));
    assert_eq!(c.shell_surface(popup).and_then(ShellSurface::parent), None);
    assert!(rec.borrow().destroyed_windows.contains(&parent));
    Ok(())
}

#[test]
fn test_set_parent_rejects_cycles() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_a_surface, a) = client.window(&mut c, ShellFlavor::Stable, &log)?;
    let (_b_surface, b) = client.window(&mut c, ShellFlavor::Stable, &log)?;

    c.set_parent(client.id, b, Some(a))?;
    assert_eq!(c.set_parent(client.id, a, Some(b)), Err(ProtocolError::InvalidParent(b)));
    assert_eq!(c.set_parent(client.id, a, Some(a)), Err(ProtocolError::InvalidParent(a)));
    c.set_parent(client.id, b, None)?;
    assert_eq!(c.shell_surface(b).and_then(ShellSurface::parent), None);
    Ok(())
}

#[test]
fn test_interaction_requests_reach_the_host() -> Result<()> {
    let (mut c, rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, unmapped) = client.window(&mut c, ShellFlavor::Stable, &log)?;
    c.start_interaction(client.id, unmapped, Interaction::Move)?;
    assert!(rec.borrow().interactions.is_empty());

    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;
    let edge = ResizeEdge::from_bits(ResizeEdge::BOTTOM | ResizeEdge::RIGHT)?;
    c.start_interaction(client.id, shell, Interaction::Resize(edge))?;
    assert_eq!(rec.borrow().interactions, vec![(shell, Interaction::Resize(edge))]);
    assert!(last_configure(&log).is_some_and(|c| c.resizing));

    c.host_end_interaction(shell);
    assert!(last_configure(&log).is_some_and(|c| !c.resizing));
    assert_eq!(
        c.shell_surface(shell).map(ShellSurface::interaction),
        Some(Interaction::None)
    );
    Ok(())
}

#[test]
fn test_resize_edges() {
    assert!(ResizeEdge::from_bits(ResizeEdge::TOP | ResizeEdge::LEFT).is_ok());
    assert_eq!(
        ResizeEdge::from_bits(ResizeEdge::TOP | ResizeEdge::BOTTOM),
        Err(ProtocolError::InvalidResizeEdge(3))
    );
    assert!(ResizeEdge::from_bits(0).is_err());
}

#[test]
fn test_host_close_and_title() -> Result<()> {
    let (mut c, rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    c.set_title(client.id, shell, "Terminal")?;
    c.set_app_id(client.id, shell, "org.example.term")?;
    assert_eq!(rec.borrow().titles, vec![(shell, "Terminal".to_string())]);
    assert_eq!(c.shell_surface(shell).map(ShellSurface::app_id), Some("org.example.term"));

    c.host_close(shell);
    assert_eq!(log.borrow().last(), Some(&Event::Close));
    Ok(())
}

#[test]
fn test_activation_moves_between_windows() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut a = Client::connect(&mut c)?;
    let mut b = Client::connect(&mut c)?;
    let (a_log, b_log) = (event_log(), event_log());
    let (a_surface, a_shell) = a.mapped_window(&mut c, ShellFlavor::Stable, &a_log)?;
    let (b_surface, b_shell) = b.mapped_window(&mut c, ShellFlavor::Remote, &b_log)?;

    c.host_activate(a_shell);
    assert_eq!(c.active_window(), Some(a_shell));
    assert!(last_configure(&a_log).is_some_and(|c| c.activated));
    assert_eq!(c.seat().keyboard_focus(), Some(a_surface));

    c.request_activation(b.id, b_shell)?;
    assert_eq!(c.active_window(), Some(b_shell));
    assert!(last_configure(&a_log).is_some_and(|c| !c.activated));
    assert!(last_configure(&b_log).is_some_and(|c| c.activated));
    assert_eq!(c.seat().keyboard_focus(), Some(b_surface));
    assert_eq!(c.shell_surfaces().filter(|s| s.is_activated()).count(), 1);
    Ok(())
}

#[test]
fn test_remote_shells_see_activations_with_foreign_surfaces_nulled() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut a = Client::connect(&mut c)?;
    let mut b = Client::connect(&mut c)?;
    let log = event_log();
    let (a_surface, a_shell) = a.mapped_window(&mut c, ShellFlavor::Remote, &log)?;
    let (_b_surface, b_shell) = b.mapped_window(&mut c, ShellFlavor::Remote, &log)?;

    let remote_log = event_log();
    let remote = c.allocate_id();
    c.bind_remote_shell(a.id, remote, 1, 40, Recording::boxed(&remote_log))?;
    assert!(matches!(
        remote_log.borrow().first(),
        Some(Event::RemoteConfiguration(cfg)) if cfg.size == Size::new(1920, 1080)
            && cfg.work_area_insets.bottom == 40
    ));
    remote_log.borrow_mut().clear();

    let bystander = Client::connect(&mut c)?;
    let bystander_log = event_log();
    let bystander_remote = c.allocate_id();
    c.bind_remote_shell(bystander.id, bystander_remote, 1, 40, Recording::boxed(&bystander_log))?;
    bystander_log.borrow_mut().clear();

    c.host_activate(a_shell);
    c.host_activate(b_shell);
    assert_eq!(
        *remote_log.borrow(),
        vec![
            Event::Activated {
                gained: Some(a_surface),
                lost: None
            },
            Event::Activated {
                gained: None,
                lost: Some(a_surface)
            },
        ]
    );

    // Activation changes are always announced, with foreign surfaces nulled
    let nulled = Event::Activated {
        gained: None,
        lost: None,
    };
    assert_eq!(*bystander_log.borrow(), vec![nulled.clone(), nulled]);
    Ok(())
}

#[test]
fn test_layout_mode_is_republished() -> Result<()> {
    let (mut c, _rec) = headless();
    let client = Client::connect(&mut c)?;
    let log = event_log();
    let remote = c.allocate_id();
    c.bind_remote_shell(client.id, remote, 1, 40, Recording::boxed(&log))?;

    c.set_layout_mode(LayoutMode::Tablet);
    assert!(matches!(
        log.borrow().last(),
        Some(Event::RemoteConfiguration(cfg)) if cfg.layout_mode == LayoutMode::Tablet
    ));

    c.destroy(client.id, remote)?;
    let before = log.borrow().len();
    c.set_layout_mode(LayoutMode::Windowed);
    assert_eq!(log.borrow().len(), before);
    Ok(())
}

#[test]
fn test_remote_surface_attributes() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = client.mapped_window(&mut c, ShellFlavor::Remote, &log)?;

    c.set_window_scale(client.id, shell, 2.0)?;
    assert!(!c.set_window_scale(client.id, shell, 0.0).unwrap_err().is_fatal());
    c.set_top_inset(client.id, shell, 32)?;
    c.set_system_modal(client.id, shell, true)?;
    c.set_rectangular_shadow(client.id, shell, Rect::new(0, 0, 50, 50))?;
    assert!(c.set_shadow_background_opacity(client.id, shell, 1.5).is_err());
    c.set_shadow_background_opacity(client.id, shell, 0.5)?;

    let remote = c.shell_surface(shell).expect("remote surface");
    assert_eq!(remote.scale(), 2.0);
    assert_eq!(remote.top_inset(), 32);
    assert!(remote.is_system_modal());
    assert_eq!(remote.shadow(), Some(Rect::new(0, 0, 50, 50)));
    assert_eq!(remote.shadow_opacity(), 0.5);

    c.set_rectangular_shadow(client.id, shell, Rect::default())?;
    assert_eq!(c.shell_surface(shell).and_then(ShellSurface::shadow), None);
    Ok(())
}

#[test]
fn test_remote_transitions_follow_applied_state() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let log = event_log();
    let (surface, shell) = client.mapped_window(&mut c, ShellFlavor::Remote, &log)?;

    c.request_state(client.id, shell, WindowState::Fullscreen)?;
    let serial = last_configure(&log).expect("configure").serial;
    c.ack_configure(client.id, shell, serial)?;
    c.commit(client.id, surface)?;

    let transitions: Vec<RemoteTransition> = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::StateChanged(old, new) => Some(remote_transitions(*old, *new)),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(transitions, vec![RemoteTransition::SetFullscreen]);
    Ok(())
}

#[test]
fn test_notification_surface_is_visible_immediately() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut client = Client::connect(&mut c)?;
    let surface = client.surface(&mut c)?;
    let notification = c.allocate_id();
    c.create_notification_surface(client.id, client.shell, notification, 70, surface, "n-1")?;

    let shell = c.shell_surface(notification).expect("notification");
    assert_eq!(shell.state(), WindowState::Normal);
    assert_eq!(shell.notification_id(), Some("n-1"));
    assert_eq!(shell.pending_configures().count(), 0);
    assert_eq!(c.surface(surface).and_then(|s| s.role()), Some(Role::Notification));
    Ok(())
}

#[test]
fn test_foreign_shell_surface_is_fatal() -> Result<()> {
    let (mut c, _rec) = headless();
    let mut owner = Client::connect(&mut c)?;
    let intruder = Client::connect(&mut c)?;
    let log = event_log();
    let (_surface, shell) = owner.mapped_window(&mut c, ShellFlavor::Stable, &log)?;

    let err = c
        .request_state(intruder.id, shell, WindowState::Maximized)
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(state(&c, shell), WindowState::Normal);
    Ok(())
}
