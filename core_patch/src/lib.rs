//! Runtime patch layer for the recovery-controller host.
//!
//! Rewrites the controller's compiled literals to policy-backed overrides,
//! tracks when execution is inside the guarded operation, orchestrates
//! interactive sessions and keeps them honest with an adaptive proximity
//! guard. [`attach`] wires the whole layer onto a host image in one call.

pub mod context;
pub mod enforcer;
pub mod host;
pub mod pair_cache;
pub mod policy;
pub mod proximity;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod sweep;

use patch_ir::HostImage;

pub use host::{ControllerView, EntityId, HostWorld, LayerMask, Vec3};
pub use pair_cache::{crane_service_allowed, PairCache};
pub use policy::{ActiveMode, PolicyProvider};
pub use proximity::{
    GuardSession, GuardState, GuardStats, GuardTuning, PositionSource, ProximityGuard,
};
pub use resolver::{ResolveError, TargetCache};
pub use session::{SessionManager, SessionOutcome};
pub use settings::{Settings, SettingsError};
pub use sweep::{install, InstallError, InstallReport};

/// Everything the patch layer keeps alive for the lifetime of the host.
pub struct PatchLayer {
    pub cache: TargetCache,
    pub sessions: SessionManager,
    pub report: InstallReport,
}

/// Resolve targets, install every patch and build the session manager.
///
/// The session manager's policy provider backs the installed overrides, so
/// callers execute patched methods with `sessions.policy()` as the dispatch.
pub fn attach(image: &mut HostImage, settings: Settings) -> Result<PatchLayer, InstallError> {
    let cache = TargetCache::new();
    let sessions = SessionManager::new(settings);
    let report = install(image, &cache, &sessions.policy())?;
    Ok(PatchLayer {
        cache,
        sessions,
        report,
    })
}
