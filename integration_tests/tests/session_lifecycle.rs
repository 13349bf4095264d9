mod common;

use std::cell::RefCell;

use anyhow::Result;
use core_patch::enforcer::enforce_scan_target;
use core_patch::{
    attach, context, ActiveMode, ControllerView, EntityId, GuardState, SessionOutcome, Settings,
    Vec3,
};
use patch_ir::{run_method, Value};

#[test]
fn walking_away_cancels_the_session_and_reverts_the_overrides() -> Result<()> {
    common::init_tracing();
    let mut image = common::host_image();
    let mut layer = attach(&mut image, Settings::default())?;

    let yard = common::Yard::with_field_unit(20.0);
    assert!(matches!(
        layer.sessions.begin(&yard, false, 0.0),
        SessionOutcome::FieldUnit(_)
    ));

    layer.sessions.tick(&yard, 0.0);
    *yard.subject.borrow_mut() = Vec3::new(-500.0, 0.0, 0.0);
    layer.sessions.tick(&yard, 2.0);

    assert_eq!(layer.sessions.guard().state(), GuardState::Cancelled);
    assert_eq!(layer.sessions.mode(), ActiveMode::None);

    // Deactivated session: the override is back to baseline behaviour.
    let update = common::controller_method(&image, "OnModeUpdate");
    let out = run_method(update, &[], &layer.sessions.policy())?;
    assert_eq!(out, Some(Value::F32(100.0)));
    Ok(())
}

#[test]
fn loaded_settings_drive_the_session_range() -> Result<()> {
    common::init_tracing();
    let mut image = common::host_image();

    // Out-of-bounds distance clamps on load; the configured signal range
    // flows through unchanged.
    let doc = serde_json::json!({
        "max_distance_m": 400.0,
        "signal_range_m": 40.0,
    });
    let settings = Settings::from_json_str(&doc.to_string())?;
    assert_eq!(settings.max_distance_m, 50.0);

    let mut layer = attach(&mut image, settings)?;
    let yard = common::Yard::with_field_unit(45.0);
    assert!(matches!(
        layer.sessions.begin(&yard, false, 0.0),
        SessionOutcome::FieldUnit(_)
    ));

    let update = common::controller_method(&image, "OnModeUpdate");
    let out = run_method(update, &[], &layer.sessions.policy())?;
    assert_eq!(out, Some(Value::F32(40.0)));
    Ok(())
}

struct ScanView {
    pointed: RefCell<Option<EntityId>>,
}

impl ControllerView for ScanView {
    fn in_scan_state(&self) -> bool {
        true
    }
    fn pointed_target(&self) -> Option<EntityId> {
        *self.pointed.borrow()
    }
    fn clear_pointed_target(&mut self) {
        *self.pointed.borrow_mut() = None;
    }
    fn signal_origin(&self) -> Option<Vec3> {
        Some(Vec3::ZERO)
    }
}

#[test]
fn enforcement_drops_an_out_of_range_target_mid_session() -> Result<()> {
    common::init_tracing();
    let mut image = common::host_image();
    let mut layer = attach(&mut image, Settings::default())?;

    let mut yard = common::Yard::with_field_unit(20.0);
    let boxcar = EntityId::new(9, 1);
    yard.entities
        .push((boxcar, "Boxcar", RefCell::new(Vec3::new(40.0, 0.0, 0.0))));
    assert!(matches!(
        layer.sessions.begin(&yard, false, 0.0),
        SessionOutcome::FieldUnit(_)
    ));

    // Default signal range is 25 m; the boxcar sits at 40 m.
    let mut view = ScanView {
        pointed: RefCell::new(Some(boxcar)),
    };
    let policy = layer.sessions.policy();
    let settings = Settings::default();

    let _scope = context::scoped();
    enforce_scan_target(&mut view, &yard, &policy, &settings, false);
    assert!(view.pointed.borrow().is_none());
    Ok(())
}
