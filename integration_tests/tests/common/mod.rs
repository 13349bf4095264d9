use std::cell::RefCell;
use std::sync::Once;

use core_patch::{EntityId, HostWorld, LayerMask, Vec3};
use patch_ir::{CodeModule, HostImage, Method, Op, TypeDef};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Host image resembling the real module layout: the controller in its home
/// module, plus one helper type the broad price sweep should also visit.
pub fn host_image() -> HostImage {
    let mut controller = TypeDef::new("RecoveryController");
    controller.methods.push(Method::new(
        "OnModeUpdate",
        vec![
            Op::PushF32(100.0),
            Op::StoreLocal(0),
            Op::LoadLocal(0),
            Op::Ret,
        ],
    ));
    controller
        .methods
        .push(Method::new("OnModeUse", vec![Op::PushF32(100.0), Op::Ret]));
    // total = 500 + 150 * distance
    controller.methods.push(Method::new(
        "ComputePrice",
        vec![
            Op::PushF32(500.0),
            Op::PushI32(150),
            Op::IntToF32,
            Op::LoadArg(0),
            Op::Mul,
            Op::Add,
            Op::Ret,
        ],
    ));

    let mut billing = TypeDef::new("RecoveryBilling");
    billing.methods.push(Method::new(
        "EstimateDeposit",
        vec![Op::PushI32(500), Op::IntToF32, Op::Ret],
    ));

    HostImage {
        modules: vec![CodeModule {
            name: "SimCore".into(),
            types: vec![controller, billing],
        }],
    }
}

pub fn controller_method<'a>(image: &'a HostImage, name: &str) -> &'a Method {
    image
        .module("SimCore")
        .and_then(|m| m.types.first())
        .and_then(|t| t.method(name))
        .unwrap_or_else(|| panic!("method {name} missing from the test image"))
}

/// Scriptable world shared by the scenario tests.
pub struct Yard {
    pub entities: Vec<(EntityId, &'static str, RefCell<Vec3>)>,
    pub couplings: Vec<(EntityId, EntityId)>,
    pub subject: RefCell<Vec3>,
}

impl Yard {
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            couplings: Vec::new(),
            subject: RefCell::new(Vec3::ZERO),
        }
    }

    pub fn with_field_unit(distance: f32) -> Self {
        let mut yard = Self::empty();
        yard.entities.push((
            EntityId::new(1, 1),
            "RecoveryUnit",
            RefCell::new(Vec3::new(distance, 0.0, 0.0)),
        ));
        yard
    }

    pub fn with_crane_pair() -> Self {
        let mut yard = Self::empty();
        yard.entities.push((
            EntityId::new(1, 1),
            "HeavyCrane",
            RefCell::new(Vec3::new(5.0, 0.0, 0.0)),
        ));
        yard.entities.push((
            EntityId::new(2, 1),
            "CraneTender",
            RefCell::new(Vec3::new(5.0, 0.0, -2.0)),
        ));
        yard.couplings
            .push((EntityId::new(1, 1), EntityId::new(2, 1)));
        yard
    }
}

impl HostWorld for Yard {
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
        Some(20_000.0)
    }

    fn subject_position(&self) -> Option<Vec3> {
        Some(*self.subject.borrow())
    }

    fn line_of_sight_blocked(&self, _: Vec3, _: Vec3, _: LayerMask) -> bool {
        false
    }
}
