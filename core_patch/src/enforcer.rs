//! Range and weight enforcement around the controller's target-scan state.
//!
//! The literal rewrite widens what the controller can reach; this is the
//! other half of the bargain: in the range-governed mode a pointed target
//! that is too far away or too heavy is dropped again before the host can
//! act on it.

use tracing::debug;

use crate::context;
use crate::host::{ControllerView, HostWorld};
use crate::pair_cache::{CARRIER_MARKER, TENDER_MARKER};
use crate::policy::{ActiveMode, PolicyProvider};
use crate::settings::Settings;

/// Slack added to range and weight comparisons to avoid flapping right at
/// the limit.
const RANGE_SLACK_M: f32 = 0.01;
const WEIGHT_SLACK_T: f32 = 0.01;

/// Apply the range/weight rules to the controller's pointed target.
///
/// Only acts inside the guarded operation and only in the range-governed
/// mode; the crane flow and the unmodified baseline are never touched.
pub fn enforce_scan_target(
    view: &mut dyn ControllerView,
    world: &dyn HostWorld,
    policy: &PolicyProvider,
    settings: &Settings,
    companion_present: bool,
) {
    if !context::is_active() || policy.mode() != ActiveMode::FieldUnit {
        return;
    }
    if !view.in_scan_state() {
        return;
    }
    let Some(target) = view.pointed_target() else {
        return;
    };
    let Some(origin) = view.signal_origin() else {
        return;
    };

    let range = policy.signal_range().max(1.0);
    let weight_limit = settings.weight_limit_t.max(1.0);

    let too_far = world
        .position(target)
        .is_some_and(|p| origin.distance(p) > range + RANGE_SLACK_M);
    let too_heavy = is_too_heavy(world, settings, companion_present, target, weight_limit);

    if too_far || too_heavy {
        debug!(%target, too_far, too_heavy, "clearing pointed target");
        view.clear_pointed_target();
    }
}

fn is_too_heavy(
    world: &dyn HostWorld,
    settings: &Settings,
    companion_present: bool,
    target: crate::host::EntityId,
    weight_limit_t: f32,
) -> bool {
    if companion_present && settings.allow_crane_bypass && is_crane_or_tender(world, target) {
        return false;
    }
    match world.mass_kg(target) {
        Some(kg) => kg.max(0.0) / 1000.0 > weight_limit_t + WEIGHT_SLACK_T,
        None => false,
    }
}

fn is_crane_or_tender(world: &dyn HostWorld, target: crate::host::EntityId) -> bool {
    matches!(
        world.marker_id(target).as_deref(),
        Some(CARRIER_MARKER) | Some(TENDER_MARKER)
    )
}
