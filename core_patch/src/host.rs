use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// World-space position, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        let d = self - other;
        d.x * d.x + d.y * d.y + d.z * d.z
    }

    pub fn distance(self, other: Vec3) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn length(self) -> f32 {
        self.distance(Vec3::ZERO)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Non-owning reference to a host entity.
///
/// Index plus generation: the host recycles slots, so a stale id with an old
/// generation simply stops resolving instead of pointing at a different
/// entity. Nothing here keeps the entity alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

bitflags::bitflags! {
    /// Physics layers consulted by line-of-sight probes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LayerMask: u32 {
        const TERRAIN = 1 << 0;
        const STRUCTURE = 1 << 1;
        const VEHICLE = 1 << 2;
        const FOLIAGE = 1 << 3;
    }
}

/// Read-only view of the host's live world.
///
/// Everything the retrofit engine learns about entities flows through this
/// trait; the real implementation wraps the host process, tests script it.
pub trait HostWorld {
    /// Ids of every live entity, in host enumeration order.
    fn live_entities(&self) -> Vec<EntityId>;

    /// Whether an id still resolves to a live entity of the same generation.
    fn is_alive(&self, entity: EntityId) -> bool;

    /// Stable identity marker of an entity (vehicle catalogue id).
    fn marker_id(&self, entity: EntityId) -> Option<String>;

    fn position(&self, entity: EntityId) -> Option<Vec3>;

    /// Forward direction of the entity, unit length.
    fn forward(&self, entity: EntityId) -> Option<Vec3>;

    /// Entities directly coupled to this one, if the linkage relation can be
    /// introspected at all. An empty result may mean "none" or "unknown";
    /// callers fall back to a distance check.
    fn coupled_to(&self, entity: EntityId) -> Vec<EntityId>;

    fn mass_kg(&self, entity: EntityId) -> Option<f32>;

    /// Current position of the interacting subject (the player), if one is
    /// present in the world right now.
    fn subject_position(&self) -> Option<Vec3>;

    /// Whether anything on the masked layers obstructs the segment.
    fn line_of_sight_blocked(&self, from: Vec3, to: Vec3, mask: LayerMask) -> bool;
}

/// Mutable view of the guarded controller's scan state, for target
/// enforcement. The host's controller object is opaque; this is the minimal
/// surface the enforcer needs.
pub trait ControllerView {
    /// Whether the controller is currently in its target-scan state.
    fn in_scan_state(&self) -> bool;

    /// Entity the controller currently points at, if any.
    fn pointed_target(&self) -> Option<EntityId>;

    /// Drop the pointed target and any highlight attached to it.
    fn clear_pointed_target(&mut self);

    /// Origin the controller measures range from.
    fn signal_origin(&self) -> Option<Vec3>;
}
