//! Surface and density properties of colliders.

use serde::Deserialize;

use crate::math::Real;

/// Material a collider is made of.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PhysicsMaterial {
    /// Mass per cubic metre, used to derive body mass from shape volume.
    pub density: Real,
    /// Fraction of the closing speed returned on impact.
    pub restitution: Real,
    /// Square root of the friction coefficient.
    ///
    /// Stored as a root so two surfaces combine by plain multiplication.
    pub friction_sqrt: Real,
}

impl PhysicsMaterial {
    /// Construct from raw properties.
    pub fn new(density: Real, restitution: Real, friction_sqrt: Real) -> Self {
        Self {
            density,
            restitution,
            friction_sqrt,
        }
    }

    /// Dense, barely bouncy.
    pub fn iron() -> Self {
        Self::new(7.8, 0.01, 0.22)
    }

    /// Light and springy.
    pub fn rubber() -> Self {
        Self::new(1.3, 0.6, 0.24)
    }

    /// Light with little bounce.
    pub fn plastic() -> Self {
        Self::new(1.4, 0.1, 0.15)
    }

    /// Heavy, almost no bounce, high grip.
    pub fn concrete() -> Self {
        Self::new(2.4, 0.0001, 0.4)
    }

    /// Terrain material for static geometry.
    pub fn ground() -> Self {
        Self::new(Real::MAX, 0.001, 0.75)
    }

    /// Friction coefficient for a pair of touching materials.
    pub fn combine_frictions(&self, other: &Self) -> Real {
        self.friction_sqrt * other.friction_sqrt
    }

    /// Restitution for a pair of touching materials.
    pub fn combine_restitutions(&self, other: &Self) -> Real {
        self.restitution.max(other.restitution)
    }
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self::plastic()
    }
}
