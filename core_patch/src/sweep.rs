//! Patch installation: the narrow range rewrite, the context hooks, and the
//! broad price sweep across everything that smells like the recovery flow.

use patch_ir::{
    rewrite_method, HostImage, LiteralPattern, MethodPatch, OverrideDispatch, OverrideFn,
    PatchError, PatternTable, PostfixFn,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::policy::{BASELINE_BASE_PRICE, BASELINE_PRICE_PER_METER, BASELINE_SIGNAL_RANGE};
use crate::resolver::{ResolveError, TargetCache, PREFERRED_MODULE};

/// Methods of the controller that embed the range literal and define the
/// guarded operation's execution window.
pub const METHOD_ON_MODE_UPDATE: &str = "OnModeUpdate";
pub const METHOD_ON_MODE_USE: &str = "OnModeUse";

/// The one operation the broad sweep must skip: its total is adjusted as a
/// whole after the fact, and rewriting its literals as well would count the
/// multipliers twice.
pub const METHOD_COMPUTE_PRICE: &str = "ComputePrice";

/// Type-name keyword for the broad sweep across the preferred module.
pub const SWEEP_KEYWORD: &str = "recovery";

/// Patterns for the narrow range rewrite.
pub fn signal_range_table() -> PatternTable {
    PatternTable::new(
        "signal_range",
        vec![LiteralPattern::float_only(
            BASELINE_SIGNAL_RANGE,
            OverrideFn::SignalRange,
        )],
    )
}

/// Patterns for the broad price sweep. The price constants also appear as
/// integer literals followed by a widening conversion, so both forms match.
pub fn mass_price_table() -> PatternTable {
    PatternTable::new(
        "mass_price",
        vec![
            LiteralPattern::with_int_form(BASELINE_BASE_PRICE, OverrideFn::BasePrice),
            LiteralPattern::with_int_form(BASELINE_PRICE_PER_METER, OverrideFn::PricePerMeter),
        ],
    )
}

/// Fatal installation failures. Anything here means the override subsystem
/// stays inactive and the host keeps its baseline behaviour.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("override function {0} has no binding")]
    UnboundOverride(OverrideFn),
    #[error("required method {type_name}.{method} not found")]
    MethodMissing { type_name: String, method: String },
    #[error("cached controller handle no longer resolves in this image")]
    StaleHandle,
    #[error("rewrite of {type_name}.{method} failed")]
    Rewrite {
        type_name: String,
        method: String,
        #[source]
        source: PatchError,
    },
}

/// Outcome of one installation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Literals redirected by the narrow range rewrite.
    pub range_literals: usize,
    /// Context hook pairs installed.
    pub context_hooks: usize,
    /// Whether the whole-result price adjustment is in place.
    pub postfix_installed: bool,
    /// Methods the broad sweep rewrote.
    pub price_methods: usize,
    /// Literals the broad sweep redirected.
    pub price_literals: usize,
    /// Methods skipped because a previous run already patched them.
    pub already_patched: usize,
    /// Per-method patch failures; the sweep continued past each.
    pub failures: usize,
    /// Types visited by the broad sweep beyond the controller itself.
    pub swept_types: usize,
}

/// Install every patch.
///
/// Override bindings are checked eagerly: a table must never point at a
/// function the dispatch cannot produce. Per-method failures inside the
/// broad sweep are recoverable; everything else is fatal.
pub fn install(
    image: &mut HostImage,
    cache: &TargetCache,
    dispatch: &dyn OverrideDispatch,
) -> Result<InstallReport, InstallError> {
    let range_table = signal_range_table();
    let price_table = mass_price_table();
    for table in [&range_table, &price_table] {
        for target in table.targets() {
            if !dispatch.supports(target) {
                return Err(InstallError::UnboundOverride(target));
            }
        }
    }

    let handle = cache.controller(image)?;
    let mut report = InstallReport::default();

    // Narrow phase: range literals and context hooks on the two methods that
    // make up the guarded operation.
    {
        // The cache outlives any one image, so the handle is re-checked
        // rather than trusted as an index.
        let controller = image
            .modules
            .get_mut(handle.module)
            .and_then(|m| m.types.get_mut(handle.type_index))
            .ok_or(InstallError::StaleHandle)?;
        let type_name = controller.name.clone();
        for name in [METHOD_ON_MODE_UPDATE, METHOD_ON_MODE_USE] {
            let method = controller
                .method_mut(name)
                .ok_or_else(|| InstallError::MethodMissing {
                    type_name: type_name.clone(),
                    method: name.to_string(),
                })?;
            match rewrite_method(method, &range_table) {
                Ok(MethodPatch::Applied { replaced }) => report.range_literals += replaced,
                Ok(MethodPatch::AlreadyPatched) => report.already_patched += 1,
                Err(source) => {
                    return Err(InstallError::Rewrite {
                        type_name: type_name.clone(),
                        method: name.to_string(),
                        source,
                    })
                }
            }
            if !method.context_hooked {
                method.context_hooked = true;
                report.context_hooks += 1;
            }
        }

        // Whole-result adjustment on the excluded operation.
        let compute = controller
            .method_mut(METHOD_COMPUTE_PRICE)
            .ok_or_else(|| InstallError::MethodMissing {
                type_name: type_name.clone(),
                method: METHOD_COMPUTE_PRICE.to_string(),
            })?;
        compute.postfix = Some(PostfixFn::AdjustTotal);
        report.postfix_installed = true;

        // Broad phase over the controller, nested helpers included.
        sweep_type_methods(controller, &price_table, &mut report);
    }

    // Broad phase over every other type in the preferred module whose name
    // carries the domain keyword.
    if let Some(module) = image.module_index(PREFERRED_MODULE) {
        let type_count = image.modules[module].types.len();
        for type_index in 0..type_count {
            if module == handle.module && type_index == handle.type_index {
                continue;
            }
            let ty = &mut image.modules[module].types[type_index];
            if !ty.name.to_ascii_lowercase().contains(SWEEP_KEYWORD) {
                continue;
            }
            report.swept_types += 1;
            sweep_type_methods(ty, &price_table, &mut report);
        }
    }

    info!(
        range_literals = report.range_literals,
        price_methods = report.price_methods,
        price_literals = report.price_literals,
        failures = report.failures,
        swept_types = report.swept_types,
        "patch installation complete"
    );
    Ok(report)
}

fn sweep_type_methods(
    ty: &mut patch_ir::TypeDef,
    table: &PatternTable,
    report: &mut InstallReport,
) {
    ty.for_each_method_mut(|type_name, method| {
        if method.name == METHOD_COMPUTE_PRICE {
            return;
        }
        match rewrite_method(method, table) {
            Ok(MethodPatch::Applied { replaced }) => {
                report.price_methods += 1;
                report.price_literals += replaced;
            }
            Ok(MethodPatch::AlreadyPatched) => report.already_patched += 1,
            Err(err) => {
                report.failures += 1;
                warn!(
                    type_name,
                    method = %method.name,
                    error = %err,
                    "price sweep could not patch method"
                );
            }
        }
    });
}
