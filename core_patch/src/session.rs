//! Interactive-session orchestration.
//!
//! One manager owns the active mode, the crane pair cache and the proximity
//! guard. `begin` decides which cooperating-entity scenario (if any)
//! authorises a session and wires the guard so that walking out of range
//! deactivates the mode again without any help from the host.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::host::{EntityId, HostWorld};
use crate::pair_cache::{crane_service_allowed, PairCache};
use crate::policy::{ActiveMode, PolicyProvider};
use crate::proximity::{GuardSession, GuardTuning, PositionSource, ProximityGuard};
use crate::settings::Settings;

/// Marker id of a mobile field unit that authorises the range-governed mode.
pub const FIELD_UNIT_MARKER: &str = "RecoveryUnit";

/// Floor for the activation range, so a misconfigured distance can never make
/// sessions impossible to start.
pub const MIN_ACTIVATION_RANGE_M: f32 = 10.0;

/// What `begin` decided for this interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Range-governed session; the guard now tracks the given field unit.
    FieldUnit(EntityId),
    /// Price-governed session performed by the crane pair; no guard runs.
    Crane,
    /// Neither scenario applies; the host keeps its baseline behaviour.
    Unavailable,
}

/// Owner of the session lifecycle.
pub struct SessionManager {
    settings: Settings,
    mode: Rc<Cell<ActiveMode>>,
    guard: ProximityGuard,
    pair_cache: PairCache,
}

impl SessionManager {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: settings.sanitized(),
            mode: Rc::new(Cell::new(ActiveMode::None)),
            guard: ProximityGuard::new(),
            pair_cache: PairCache::new(),
        }
    }

    /// Deterministic guard scheduling for tests.
    pub fn with_guard(settings: Settings, guard: ProximityGuard) -> Self {
        Self {
            settings: settings.sanitized(),
            mode: Rc::new(Cell::new(ActiveMode::None)),
            guard,
            pair_cache: PairCache::new(),
        }
    }

    pub fn mode(&self) -> ActiveMode {
        self.mode.get()
    }

    pub fn guard(&self) -> &ProximityGuard {
        &self.guard
    }

    /// Policy provider reflecting the current mode and the session settings.
    pub fn policy(&self) -> PolicyProvider {
        PolicyProvider::new(self.mode.get(), &self.settings)
    }

    /// Start a session. Any running session ends first and its guard callback
    /// never fires.
    pub fn begin(
        &mut self,
        world: &dyn HostWorld,
        companion_present: bool,
        now: f64,
    ) -> SessionOutcome {
        self.end();

        let Some(subject) = world.subject_position() else {
            debug!("no subject position, session unavailable");
            return SessionOutcome::Unavailable;
        };
        let range = self.settings.max_distance_m.max(MIN_ACTIVATION_RANGE_M);
        let range_sqr = range * range;

        // Nearest field unit inside the activation range wins.
        let field_unit = world
            .live_entities()
            .into_iter()
            .filter(|&e| world.marker_id(e).as_deref() == Some(FIELD_UNIT_MARKER))
            .filter_map(|e| {
                let d = subject.distance_squared(world.position(e)?);
                (d <= range_sqr).then_some((e, d))
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(e, _)| e);

        if let Some(unit) = field_unit {
            self.mode.set(ActiveMode::FieldUnit);
            let mode = Rc::clone(&self.mode);
            self.guard.start(
                GuardSession {
                    subject: PositionSource::Subject,
                    target: PositionSource::Entity(unit),
                    max_distance_m: range,
                    line_of_sight: None,
                    on_violation: Box::new(move || {
                        mode.set(ActiveMode::None);
                        Ok(())
                    }),
                    tuning: GuardTuning::default(),
                },
                now,
            );
            info!(%unit, range_m = range, "field unit session started");
            return SessionOutcome::FieldUnit(unit);
        }

        if companion_present
            && crane_service_allowed(&mut self.pair_cache, world, now, subject, range, true)
        {
            self.mode.set(ActiveMode::Crane);
            info!(range_m = range, "crane session started");
            return SessionOutcome::Crane;
        }

        debug!("no cooperating entity in range, session unavailable");
        SessionOutcome::Unavailable
    }

    /// Tear down the session: guard released without firing, mode cleared.
    pub fn end(&mut self) {
        self.guard.stop();
        if self.mode.get() != ActiveMode::None {
            self.mode.set(ActiveMode::None);
            info!("session ended");
        }
    }

    /// Pump the guard. The guard's cancellation callback clears the mode, so
    /// after an out-of-range tick the session is fully deactivated.
    pub fn tick(&mut self, world: &dyn HostWorld, now: f64) {
        self.guard.tick(world, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LayerMask, Vec3};
    use crate::pair_cache::{CARRIER_MARKER, TENDER_MARKER};
    use crate::proximity::GuardState;
    use std::cell::RefCell;

    struct YardWorld {
        entities: Vec<(EntityId, &'static str, RefCell<Vec3>)>,
        couplings: Vec<(EntityId, EntityId)>,
        subject: RefCell<Vec3>,
    }

    impl YardWorld {
        fn empty() -> Self {
            Self {
                entities: Vec::new(),
                couplings: Vec::new(),
                subject: RefCell::new(Vec3::ZERO),
            }
        }

        fn with_field_unit(distance: f32) -> Self {
            let mut world = Self::empty();
            world.entities.push((
                EntityId::new(1, 1),
                FIELD_UNIT_MARKER,
                RefCell::new(Vec3::new(distance, 0.0, 0.0)),
            ));
            world
        }

        fn with_crane_pair() -> Self {
            let mut world = Self::empty();
            world.entities.push((
                EntityId::new(1, 1),
                CARRIER_MARKER,
                RefCell::new(Vec3::new(5.0, 0.0, 0.0)),
            ));
            world.entities.push((
                EntityId::new(2, 1),
                TENDER_MARKER,
                RefCell::new(Vec3::new(5.0, 0.0, -2.0)),
            ));
            world.couplings.push((EntityId::new(1, 1), EntityId::new(2, 1)));
            world
        }
    }

    impl HostWorld for YardWorld {
        fn live_entities(&self) -> Vec<EntityId> {
            self.entities.iter().map(|(e, _, _)| *e).collect()
        }
        fn is_alive(&self, entity: EntityId) -> bool {
            self.entities.iter().any(|(e, _, _)| *e == entity)
        }
        fn marker_id(&self, entity: EntityId) -> Option<String> {
            self.entities
                .iter()
                .find(|(e, _, _)| *e == entity)
                .map(|(_, m, _)| (*m).to_string())
        }
        fn position(&self, entity: EntityId) -> Option<Vec3> {
            self.entities
                .iter()
                .find(|(e, _, _)| *e == entity)
                .map(|(_, _, p)| *p.borrow())
        }
        fn forward(&self, _: EntityId) -> Option<Vec3> {
            None
        }
        fn coupled_to(&self, entity: EntityId) -> Vec<EntityId> {
            self.couplings
                .iter()
                .filter(|(a, _)| *a == entity)
                .map(|(_, b)| *b)
                .collect()
        }
        fn mass_kg(&self, _: EntityId) -> Option<f32> {
            None
        }
        fn subject_position(&self) -> Option<Vec3> {
            Some(*self.subject.borrow())
        }
        fn line_of_sight_blocked(&self, _: Vec3, _: Vec3, _: LayerMask) -> bool {
            false
        }
    }

    fn manager() -> SessionManager {
        SessionManager::with_guard(Settings::default(), ProximityGuard::seeded(11))
    }

    #[test]
    fn nearby_field_unit_starts_a_range_governed_session() {
        let world = YardWorld::with_field_unit(20.0);
        let mut mgr = manager();

        let outcome = mgr.begin(&world, false, 0.0);
        assert_eq!(outcome, SessionOutcome::FieldUnit(EntityId::new(1, 1)));
        assert_eq!(mgr.mode(), ActiveMode::FieldUnit);
        assert!(mgr.guard().is_running());
    }

    #[test]
    fn field_unit_outside_range_is_ignored() {
        let world = YardWorld::with_field_unit(400.0);
        let mut mgr = manager();
        assert_eq!(mgr.begin(&world, false, 0.0), SessionOutcome::Unavailable);
        assert_eq!(mgr.mode(), ActiveMode::None);
        assert!(!mgr.guard().is_running());
    }

    #[test]
    fn nearest_of_several_units_is_tracked() {
        let mut world = YardWorld::with_field_unit(30.0);
        world.entities.push((
            EntityId::new(7, 1),
            FIELD_UNIT_MARKER,
            RefCell::new(Vec3::new(12.0, 0.0, 0.0)),
        ));
        let mut mgr = manager();
        assert_eq!(
            mgr.begin(&world, false, 0.0),
            SessionOutcome::FieldUnit(EntityId::new(7, 1))
        );
    }

    #[test]
    fn walking_out_of_range_deactivates_the_mode() {
        let world = YardWorld::with_field_unit(20.0);
        let mut mgr = manager();
        mgr.begin(&world, false, 0.0);

        mgr.tick(&world, 0.0); // first sample
        *world.subject.borrow_mut() = Vec3::new(-200.0, 0.0, 0.0);
        mgr.tick(&world, 1.0);

        assert_eq!(mgr.guard().state(), GuardState::Cancelled);
        assert_eq!(mgr.mode(), ActiveMode::None);
        assert_eq!(mgr.policy().mode(), ActiveMode::None);
    }

    #[test]
    fn crane_pair_with_companion_starts_a_price_governed_session() {
        let world = YardWorld::with_crane_pair();
        let mut mgr = manager();

        assert_eq!(mgr.begin(&world, true, 0.0), SessionOutcome::Crane);
        assert_eq!(mgr.mode(), ActiveMode::Crane);
        // The crane flow has no spatial constraint to guard.
        assert!(!mgr.guard().is_running());
    }

    #[test]
    fn crane_pair_without_companion_is_unavailable() {
        let world = YardWorld::with_crane_pair();
        let mut mgr = manager();
        assert_eq!(mgr.begin(&world, false, 0.0), SessionOutcome::Unavailable);
        assert_eq!(mgr.mode(), ActiveMode::None);
    }

    #[test]
    fn field_unit_takes_precedence_over_the_crane_pair() {
        let mut world = YardWorld::with_crane_pair();
        world.entities.push((
            EntityId::new(9, 1),
            FIELD_UNIT_MARKER,
            RefCell::new(Vec3::new(8.0, 0.0, 0.0)),
        ));
        let mut mgr = manager();
        assert_eq!(
            mgr.begin(&world, true, 0.0),
            SessionOutcome::FieldUnit(EntityId::new(9, 1))
        );
    }

    #[test]
    fn end_clears_mode_and_releases_the_guard() {
        let world = YardWorld::with_field_unit(20.0);
        let mut mgr = manager();
        mgr.begin(&world, false, 0.0);
        mgr.tick(&world, 0.0);

        mgr.end();
        assert_eq!(mgr.mode(), ActiveMode::None);
        assert!(!mgr.guard().is_running());
        assert_eq!(mgr.guard().state(), GuardState::Stopped);
    }

    #[test]
    fn a_new_session_detaches_the_previous_callback() {
        let world = YardWorld::with_field_unit(20.0);
        let mut mgr = manager();
        mgr.begin(&world, false, 0.0);
        mgr.tick(&world, 0.0);

        // Restart, then violate the constraint: only the new session's
        // callback runs, and the manager ends up cleanly deactivated.
        mgr.begin(&world, false, 1.0);
        assert_eq!(mgr.mode(), ActiveMode::FieldUnit);
        mgr.tick(&world, 1.0);
        *world.subject.borrow_mut() = Vec3::new(-200.0, 0.0, 0.0);
        mgr.tick(&world, 2.0);
        assert_eq!(mgr.mode(), ActiveMode::None);
    }
}
