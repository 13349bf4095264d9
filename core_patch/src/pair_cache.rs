//! Short-TTL cache of the heavy-crane pair.
//!
//! Finding the crane and its tender means a linear scan over every live
//! entity; callers hit this several times per interaction, so the last found
//! pair is remembered for a moment. The cache stores ids only and re-scans
//! as soon as either id stops resolving.

use tracing::debug;

use crate::host::{EntityId, HostWorld, Vec3};

/// How long a found pair stays trusted, seconds.
pub const PAIR_CACHE_TTL: f64 = 1.0;

/// Distance below which two vehicles count as coupled when the linkage
/// relation cannot be introspected.
pub const COUPLED_DISTANCE_FALLBACK_M: f32 = 2.5;

/// Identity markers of the two cooperating vehicles.
pub const CARRIER_MARKER: &str = "HeavyCrane";
pub const TENDER_MARKER: &str = "CraneTender";

#[derive(Debug, Clone, Copy)]
struct CachedPair {
    carrier: EntityId,
    tender: EntityId,
    cached_at: f64,
}

/// Cache of the last detected carrier/tender pair.
#[derive(Debug, Default)]
pub struct PairCache {
    entry: Option<CachedPair>,
}

impl PairCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the carrier/tender pair, from cache when fresh.
    pub fn try_find_pair(
        &mut self,
        world: &dyn HostWorld,
        now: f64,
    ) -> Option<(EntityId, EntityId)> {
        if let Some(entry) = self.entry {
            if now - entry.cached_at <= PAIR_CACHE_TTL
                && world.is_alive(entry.carrier)
                && world.is_alive(entry.tender)
            {
                return Some((entry.carrier, entry.tender));
            }
        }

        let mut carrier = None;
        let mut tender = None;
        for entity in world.live_entities() {
            match world.marker_id(entity).as_deref() {
                Some(CARRIER_MARKER) if carrier.is_none() => carrier = Some(entity),
                Some(TENDER_MARKER) if tender.is_none() => tender = Some(entity),
                _ => {}
            }
            if carrier.is_some() && tender.is_some() {
                break;
            }
        }

        let (carrier, tender) = (carrier?, tender?);
        debug!(%carrier, %tender, "crane pair located");
        self.entry = Some(CachedPair {
            carrier,
            tender,
            cached_at: now,
        });
        Some((carrier, tender))
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

/// Whether two entities are directly paired: a coupling link in either
/// direction, or near-contact distance as a tolerant fallback.
pub fn directly_paired(world: &dyn HostWorld, a: EntityId, b: EntityId) -> bool {
    if world.coupled_to(a).contains(&b) || world.coupled_to(b).contains(&a) {
        return true;
    }
    match (world.position(a), world.position(b)) {
        (Some(pa), Some(pb)) => pa.distance(pb) < COUPLED_DISTANCE_FALLBACK_M,
        _ => false,
    }
}

/// Whether the tender sits behind the carrier along the carrier's forward
/// axis. Unknown orientation counts as "behind" rather than blocking the
/// service.
pub fn tender_behind_carrier(world: &dyn HostWorld, carrier: EntityId, tender: EntityId) -> bool {
    let (Some(cp), Some(tp), Some(fwd)) = (
        world.position(carrier),
        world.position(tender),
        world.forward(carrier),
    ) else {
        return true;
    };
    let to_tender = (tp - cp).normalized();
    fwd.normalized().dot(to_tender) < 0.0
}

/// Whether the crane pair can perform the service from `origin`.
pub fn crane_service_allowed(
    cache: &mut PairCache,
    world: &dyn HostWorld,
    now: f64,
    origin: Vec3,
    range_m: f32,
    require_tender_behind: bool,
) -> bool {
    let Some((carrier, tender)) = cache.try_find_pair(world, now) else {
        return false;
    };

    if !directly_paired(world, carrier, tender) {
        return false;
    }
    if require_tender_behind && !tender_behind_carrier(world, carrier, tender) {
        return false;
    }

    // The subject only needs to reach one of the two vehicles.
    [carrier, tender].iter().any(|&e| {
        world
            .position(e)
            .is_some_and(|p| origin.distance(p) <= range_m)
    })
}
