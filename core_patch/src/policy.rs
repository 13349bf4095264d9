//! Override policies: what value a redirected literal actually produces.
//!
//! One provider is built per interactive session with the mode and the
//! sanitised settings captured at session start, so policy reads during the
//! session observe stable inputs.

use std::cell::Cell;

use patch_ir::{OverrideDispatch, OverrideFn, PostfixFn};
use tracing::warn;

use crate::context;
use crate::settings::Settings;

/// Baseline constants compiled into the host.
pub const BASELINE_SIGNAL_RANGE: f32 = 100.0;
pub const BASELINE_BASE_PRICE: f32 = 500.0;
pub const BASELINE_PRICE_PER_METER: f32 = 150.0;

/// Bounds applied to the configured signal range at every read.
pub const SIGNAL_RANGE_MIN: f32 = 1.0;
pub const SIGNAL_RANGE_MAX: f32 = 1000.0;

use crate::settings::{MAX_PRICE_MULTIPLIER, MIN_PRICE_MULTIPLIER};

/// Which cooperating-entity scenario authorised the current session.
///
/// Set exactly once at session start, cleared at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveMode {
    #[default]
    None,
    /// Range-governed: a mobile field unit is nearby.
    FieldUnit,
    /// Price-governed: the heavy crane pair performs the service.
    Crane,
}

/// Session-scoped policy provider.
#[derive(Debug, Clone)]
pub struct PolicyProvider {
    mode: ActiveMode,
    signal_range_m: f32,
    base_price_mul: f32,
    price_per_meter_mul: f32,
    warned_extra_terms: Cell<bool>,
}

impl PolicyProvider {
    pub fn new(mode: ActiveMode, settings: &Settings) -> Self {
        Self {
            mode,
            signal_range_m: settings.signal_range_m,
            base_price_mul: settings.base_price_mul,
            price_per_meter_mul: settings.price_per_meter_mul,
            warned_extra_terms: Cell::new(false),
        }
    }

    pub fn mode(&self) -> ActiveMode {
        self.mode
    }

    /// Effective controller signal range.
    ///
    /// Only the range-governed mode, and only while execution is inside the
    /// guarded operation, sees the configured value; every other combination
    /// gets the baseline, so the crane-only flow is never affected by range
    /// configuration.
    pub fn signal_range(&self) -> f32 {
        if context::is_active() && self.mode == ActiveMode::FieldUnit {
            self.signal_range_m.clamp(SIGNAL_RANGE_MIN, SIGNAL_RANGE_MAX)
        } else {
            BASELINE_SIGNAL_RANGE
        }
    }

    pub fn base_price(&self) -> f32 {
        if self.mode != ActiveMode::Crane {
            return BASELINE_BASE_PRICE;
        }
        BASELINE_BASE_PRICE * self.clamped_base_mul()
    }

    pub fn price_per_meter(&self) -> f32 {
        if self.mode != ActiveMode::Crane {
            return BASELINE_PRICE_PER_METER;
        }
        BASELINE_PRICE_PER_METER * self.clamped_ppm_mul()
    }

    /// Whole-result adjustment for the one operation the broad sweep skips.
    ///
    /// At the postfix point only the finished total is observable, so the
    /// distance component is recovered by inverting the baseline formula
    /// `total = BASE + PPM * d` before the multipliers are reapplied. If the
    /// host formula ever grows extra additive terms the recovered distance
    /// goes negative; that is logged once and clamped rather than trusted.
    pub fn adjust_total(&self, total: f32) -> f32 {
        if self.mode != ActiveMode::Crane {
            return total;
        }

        let implied = (total - BASELINE_BASE_PRICE) / BASELINE_PRICE_PER_METER;
        if implied < 0.0 && !self.warned_extra_terms.get() {
            self.warned_extra_terms.set(true);
            warn!(
                total,
                "host total is below the baseline base price; the inversion \
                 assumes total = BASE + PPM * d and may be inaccurate"
            );
        }
        let d = implied.max(0.0);

        let adjusted = BASELINE_BASE_PRICE * self.clamped_base_mul()
            + BASELINE_PRICE_PER_METER * self.clamped_ppm_mul() * d;
        adjusted.max(0.0)
    }

    fn clamped_base_mul(&self) -> f32 {
        self.base_price_mul
            .clamp(MIN_PRICE_MULTIPLIER, MAX_PRICE_MULTIPLIER)
    }

    fn clamped_ppm_mul(&self) -> f32 {
        self.price_per_meter_mul
            .clamp(MIN_PRICE_MULTIPLIER, MAX_PRICE_MULTIPLIER)
    }
}

impl OverrideDispatch for PolicyProvider {
    fn call_override(&self, f: OverrideFn) -> f32 {
        match f {
            OverrideFn::SignalRange => self.signal_range(),
            OverrideFn::BasePrice => self.base_price(),
            OverrideFn::PricePerMeter => self.price_per_meter(),
        }
    }

    fn apply_postfix(&self, f: PostfixFn, total: f32) -> f32 {
        match f {
            PostfixFn::AdjustTotal => self.adjust_total(total),
        }
    }

    fn on_enter(&self) {
        context::enter();
    }

    fn on_exit(&self) {
        context::exit();
    }
}
