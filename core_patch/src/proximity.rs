//! Adaptive proximity guard for an in-progress interactive session.
//!
//! A naive implementation would measure distance every frame; against a large
//! world that shows up as lag. This guard polls on its own schedule, gates the
//! expensive checks on actual movement, and tightens its interval only when
//! the subject approaches the boundary. It runs cooperatively: the host pumps
//! [`ProximityGuard::tick`] and the guard decides when a tick is due.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info};

use crate::host::{EntityId, HostWorld, LayerMask, Vec3};

/// Eye-height offset applied to both endpoints of a line-of-sight probe.
pub const EYE_HEIGHT_M: f32 = 1.5;

/// Tuning parameters for the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct GuardTuning {
    /// Interval while near the distance limit, seconds.
    pub min_interval: f32,
    /// Interval while comfortably inside, seconds.
    pub max_interval: f32,
    /// Movement below this is ignored entirely, metres.
    pub movement_epsilon: f32,
    /// Fraction of max distance beyond which polling tightens.
    pub near_threshold: f32,
    /// Upper bound of the random addition to each sleep, seconds. Avoids
    /// phase alignment if several guards ever run in one process.
    pub jitter: f32,
}

impl Default for GuardTuning {
    fn default() -> Self {
        Self {
            min_interval: 0.15,
            max_interval: 0.75,
            movement_epsilon: 0.10,
            near_threshold: 0.85,
            jitter: 0.05,
        }
    }
}

impl GuardTuning {
    /// Clamp the tuning into its supported envelope.
    pub fn sanitized(self) -> Self {
        let min_interval = self.min_interval.max(0.02);
        Self {
            min_interval,
            max_interval: self.max_interval.max(min_interval),
            movement_epsilon: self.movement_epsilon.max(0.001),
            near_threshold: self.near_threshold.clamp(0.0, 1.0),
            jitter: self.jitter.max(0.0),
        }
    }
}

/// Where a guarded position is sampled from each tick.
#[derive(Debug, Clone, Copy)]
pub enum PositionSource {
    /// The interacting subject (player).
    Subject,
    /// A tracked entity.
    Entity(EntityId),
    /// A fixed point.
    Fixed(Vec3),
}

impl PositionSource {
    fn sample(self, world: &dyn HostWorld) -> Option<Vec3> {
        match self {
            PositionSource::Subject => world.subject_position(),
            PositionSource::Entity(e) => world.position(e),
            PositionSource::Fixed(v) => Some(v),
        }
    }
}

/// Callback invoked exactly once when the spatial constraint is violated.
///
/// Failures are reported, never propagated into the guard loop.
pub type CancelCallback = Box<dyn FnMut() -> Result<(), Box<dyn std::error::Error>>>;

/// Everything one guard run needs.
pub struct GuardSession {
    pub subject: PositionSource,
    pub target: PositionSource,
    pub max_distance_m: f32,
    /// When set, an obstructed sight line between eye-height points also
    /// cancels the session.
    pub line_of_sight: Option<LayerMask>,
    pub on_violation: CancelCallback,
    pub tuning: GuardTuning,
}

/// Lifecycle of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    Idle,
    Running,
    /// Terminated by a constraint violation; the callback has fired once.
    Cancelled,
    /// Terminated externally; the callback never fired.
    Stopped,
}

/// Counters for one guard run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// Due ticks processed.
    pub ticks: u32,
    /// Distance/line-of-sight checks actually performed.
    pub checks: u32,
    /// Due ticks skipped by movement gating.
    pub gated_skips: u32,
    /// Position samples that failed and fell back to the last known value.
    pub sample_failures: u32,
}

struct ActiveGuard {
    session: GuardSession,
    max_distance_sqr: f32,
    near_distance: f32,
    last_subject: Vec3,
    last_target: Vec3,
    first_sample_taken: bool,
    next_check_at: f64,
}

/// Supervisor owning at most one running guard.
pub struct ProximityGuard {
    active: Option<ActiveGuard>,
    state: GuardState,
    stats: GuardStats,
    rng: SmallRng,
}

impl Default for ProximityGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProximityGuard {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            active: None,
            state: GuardState::Idle,
            stats: GuardStats::default(),
            rng,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Counters of the current run, or of the last finished one.
    pub fn stats(&self) -> GuardStats {
        self.stats
    }

    /// Start guarding a session. Any prior session is torn down first and its
    /// callback never fires.
    pub fn start(&mut self, mut session: GuardSession, now: f64) {
        if self.active.take().is_some() {
            info!("replacing running proximity guard");
        }
        session.tuning = session.tuning.sanitized();
        session.max_distance_m = session.max_distance_m.max(0.1);

        let max = session.max_distance_m;
        let near = session.tuning.near_threshold * max;
        self.active = Some(ActiveGuard {
            session,
            max_distance_sqr: max * max,
            near_distance: near,
            last_subject: Vec3::ZERO,
            last_target: Vec3::ZERO,
            first_sample_taken: false,
            next_check_at: now,
        });
        self.state = GuardState::Running;
        self.stats = GuardStats::default();
        info!(max_distance_m = max, "proximity guard started");
    }

    /// Stop without invoking the callback and release the session.
    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            self.state = GuardState::Stopped;
            info!("proximity guard stopped");
        }
    }

    /// Advance the guard. Cheap no-op unless a poll is due.
    pub fn tick(&mut self, world: &dyn HostWorld, now: f64) {
        let Some(guard) = self.active.as_mut() else {
            return;
        };
        if now < guard.next_check_at {
            return;
        }
        self.stats.ticks += 1;

        let subject = match guard.session.subject.sample(world) {
            Some(p) => p,
            None => {
                self.stats.sample_failures += 1;
                guard.last_subject
            }
        };
        let target = match guard.session.target.sample(world) {
            Some(p) => p,
            None => {
                self.stats.sample_failures += 1;
                guard.last_target
            }
        };

        if !guard.first_sample_taken {
            guard.last_subject = subject;
            guard.last_target = target;
            guard.first_sample_taken = true;
        } else {
            let eps_sqr = guard.session.tuning.movement_epsilon * guard.session.tuning.movement_epsilon;
            let subject_moved = subject.distance_squared(guard.last_subject) > eps_sqr;
            let target_moved = target.distance_squared(guard.last_target) > eps_sqr;

            if subject_moved || target_moved {
                guard.last_subject = subject;
                guard.last_target = target;
                self.stats.checks += 1;

                if subject.distance_squared(target) > guard.max_distance_sqr {
                    info!("out of range, cancelling session");
                    self.cancel();
                    return;
                }

                if let Some(mask) = guard.session.line_of_sight {
                    let eye = Vec3::UP * EYE_HEIGHT_M;
                    if world.line_of_sight_blocked(subject + eye, target + eye, mask) {
                        info!("line of sight blocked, cancelling session");
                        self.cancel();
                        return;
                    }
                }
            } else {
                self.stats.gated_skips += 1;
            }
        }

        let current = subject.distance(target);
        let mut sleep = if current >= guard.near_distance {
            guard.session.tuning.min_interval
        } else {
            guard.session.tuning.max_interval
        };
        if guard.session.tuning.jitter > 0.0 {
            sleep += self.rng.gen_range(0.0..guard.session.tuning.jitter);
        }
        guard.next_check_at = now + sleep as f64;
    }

    fn cancel(&mut self) {
        // Removing the session first makes a second callback impossible even
        // if the callback itself re-enters the guard.
        let Some(mut guard) = self.active.take() else {
            return;
        };
        self.state = GuardState::Cancelled;
        if let Err(err) = (guard.session.on_violation)() {
            error!(error = %err, "guard cancellation callback failed");
        }
    }
}
