//! Sequential-impulse rigid body physics engine.
//!
//! The simulation is deterministic: the same inputs and settings produce
//! bit-identical results on the same floating point hardware.

#[cfg(all(feature = "f64", feature = "f32"))]
compile_error!("the `f64` and `f32` features are mutually exclusive");

#[cfg(not(any(feature = "f64", feature = "f32")))]
compile_error!("one of the `f64` or `f32` features must be enabled");

#[cfg(feature = "f32")]
pub(crate) use parry3d as parry;
#[cfg(feature = "f64")]
pub(crate) use parry3d_f64 as parry;

pub mod body;
pub mod broad_phase;
pub mod cache;
pub mod collider;
pub mod data;
pub mod island;
pub mod material;
pub mod math;
pub mod narrow_phase;
pub mod settings;
pub mod solver;
pub mod tensor;
pub mod world;

pub use body::RigidBody;
pub use collider::{
    Capsule, ColliderId, ColliderMotionState, CompoundPart, ConvexHull, HeightFieldParameters,
    Sphere, TriangleMesh,
};
pub use material::PhysicsMaterial;
pub use math::{Real, Transform3};
pub use settings::{PhysicsSettings, RigidBodySettings};
pub use solver::cone::ConeParameters;
pub use solver::hinge::HingeParameters;
pub use solver::motor::MotorParameters;
pub use world::PhysicsWorld;
