//! One-time resolution of the patch targets inside the host image.
//!
//! Resolution is the only step that can fail fatally: if the controller type
//! cannot be located, nothing downstream is meaningful and the host keeps its
//! unmodified baseline behaviour.

use std::sync::OnceLock;

use patch_ir::{short_name, HostImage, TypeDef};
use thiserror::Error;
use tracing::{debug, info};

/// Module the controller type normally lives in; checked first purely for
/// cost. The wide fallback keeps resolution correct when the host's module
/// layout shifts between versions.
pub const PREFERRED_MODULE: &str = "SimCore";

/// Accepted spellings of the controller type name.
pub const CONTROLLER_TYPE: &str = "RecoveryController";
pub const CONTROLLER_TYPE_QUALIFIED: &str = "Sim.RecoveryController";

/// Capability interface the wide scan requires, to avoid latching onto an
/// unrelated type that happens to share the name.
pub const RADIO_MODE_INTERFACE: &str = "RadioMode";

/// Keyword identifying the optional heavy-crane companion module.
pub const COMPANION_KEYWORD: &str = "heavycrane";

/// Location of the resolved controller type inside a host image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHandle {
    pub module: usize,
    pub type_index: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("controller type {CONTROLLER_TYPE} not found in any loaded module")]
    TargetNotFound,
}

/// Process-lifetime cache for resolution results.
///
/// The installer owns exactly one of these, so the expensive scans run once;
/// the cached handle is immutable afterwards. Nothing partial is ever cached:
/// a failed resolution leaves the cache empty and the next call scans again.
#[derive(Debug, Default)]
pub struct TargetCache {
    controller: OnceLock<TargetHandle>,
    companion: OnceLock<bool>,
}

impl TargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve (or return the cached) controller type handle.
    pub fn controller(&self, image: &HostImage) -> Result<TargetHandle, ResolveError> {
        if let Some(handle) = self.controller.get() {
            return Ok(*handle);
        }
        let handle = resolve_controller_type(image)?;
        info!(
            module = %image.modules[handle.module].name,
            type_name = %image.modules[handle.module].types[handle.type_index].name,
            "cached controller type"
        );
        Ok(*self.controller.get_or_init(|| handle))
    }

    /// Whether the heavy-crane companion module is loaded. Probed once.
    pub fn companion_present(&self, image: &HostImage) -> bool {
        *self.companion.get_or_init(|| {
            let detected = probe_companion_module(image);
            debug!(detected, "companion module probe");
            detected
        })
    }
}

fn resolve_controller_type(image: &HostImage) -> Result<TargetHandle, ResolveError> {
    // Narrow phase: exact name match in the preferred module.
    if let Some(module) = image.module_index(PREFERRED_MODULE) {
        let types = &image.modules[module].types;
        if let Some(type_index) = types
            .iter()
            .position(|t| t.name == CONTROLLER_TYPE || t.name == CONTROLLER_TYPE_QUALIFIED)
        {
            return Ok(TargetHandle { module, type_index });
        }
    }

    // Wide phase: any module, short name plus capability constraint.
    for (module, m) in image.modules.iter().enumerate() {
        if let Some(type_index) = m.types.iter().position(|t| {
            short_name(&t.name) == CONTROLLER_TYPE && t.implements(RADIO_MODE_INTERFACE)
        }) {
            return Ok(TargetHandle { module, type_index });
        }
    }

    Err(ResolveError::TargetNotFound)
}

fn probe_companion_module(image: &HostImage) -> bool {
    image.modules.iter().any(|m| {
        module_name_matches(&m.name) || m.types.iter().any(|t| type_namespace_matches(t))
    })
}

fn module_name_matches(name: &str) -> bool {
    name.to_ascii_lowercase().contains(COMPANION_KEYWORD)
}

fn type_namespace_matches(ty: &TypeDef) -> bool {
    match ty.name.rsplit_once('.') {
        Some((namespace, _)) => namespace.to_ascii_lowercase().contains(COMPANION_KEYWORD),
        None => false,
    }
}
