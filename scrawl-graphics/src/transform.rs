//! The linear part of an affine transform.
//!
//! A Scrawl turtle carries a 2×2 matrix composing rotation, scale, and
//! shear. Translation is deliberately excluded — the turtle position is
//! tracked separately and never folded into the matrix, which is what makes
//! function bodies cacheable relative to their own entry frame.
//!
//! Rotation angles are expressed in *turns* (1.0 = one full revolution) so
//! that the symmetric fractions fractal programs need (`1/8`, `1/3`, ...)
//! stay exact in source text.
//!
//! `Transform` is an immutable value type: composition returns a new value,
//! so sibling activations can never alias each other's matrices.

use crate::types::{Scalar, Vec2, NEAR_ZERO};

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// A 2×2 linear map. Applying it to a vector `(x, y)` yields
/// `(xx·x + xy·y, yx·x + yy·y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub xx: Scalar,
    pub xy: Scalar,
    pub yx: Scalar,
    pub yy: Scalar,
}

impl Transform {
    /// The identity map.
    pub const IDENTITY: Self = Self {
        xx: 1.0,
        xy: 0.0,
        yx: 0.0,
        yy: 1.0,
    };

    // -- constructors --

    /// Counter-clockwise rotation by `turns` full revolutions.
    #[must_use]
    pub fn rotation_turns(turns: Scalar) -> Self {
        let a = turns * std::f64::consts::TAU;
        let (s, c) = a.sin_cos();
        Self {
            xx: c,
            xy: -s,
            yx: s,
            yy: c,
        }
    }

    /// Scale the x axis by `k`.
    #[must_use]
    pub const fn stretch_x(k: Scalar) -> Self {
        Self {
            xx: k,
            ..Self::IDENTITY
        }
    }

    /// Scale the y axis by `k`.
    #[must_use]
    pub const fn stretch_y(k: Scalar) -> Self {
        Self {
            yy: k,
            ..Self::IDENTITY
        }
    }

    /// Uniform scale by `k`.
    #[must_use]
    pub const fn scaled(k: Scalar) -> Self {
        Self {
            xx: k,
            yy: k,
            ..Self::IDENTITY
        }
    }

    /// Horizontal shear: `(x, y)` maps to `(x + k·y, y)`.
    #[must_use]
    pub const fn shear_x(k: Scalar) -> Self {
        Self {
            xy: k,
            ..Self::IDENTITY
        }
    }

    /// Vertical shear: `(x, y)` maps to `(x, k·x + y)`.
    #[must_use]
    pub const fn shear_y(k: Scalar) -> Self {
        Self {
            yx: k,
            ..Self::IDENTITY
        }
    }

    // -- operations --

    /// Apply the map to a vector.
    #[inline]
    #[must_use]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.xx.mul_add(v.x, self.xy * v.y),
            self.yx.mul_add(v.x, self.yy * v.y),
        )
    }

    /// Compose: `self` applied first, then `t` (the matrix product `t · self`).
    #[must_use]
    pub fn then(&self, t: &Self) -> Self {
        Self {
            xx: t.xx.mul_add(self.xx, t.xy * self.yx),
            xy: t.xx.mul_add(self.xy, t.xy * self.yy),
            yx: t.yx.mul_add(self.xx, t.yy * self.yx),
            yy: t.yx.mul_add(self.xy, t.yy * self.yy),
        }
    }

    /// Determinant of the map.
    #[must_use]
    pub fn determinant(&self) -> Scalar {
        self.xx.mul_add(self.yy, -(self.xy * self.yx))
    }

    /// The inverse map, or `None` if this map is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < NEAR_ZERO {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            xx: self.yy * inv,
            xy: -self.xy * inv,
            yx: -self.yx * inv,
            yy: self.xx * inv,
        })
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON;

    fn close(v: Vec2, x: Scalar, y: Scalar) -> bool {
        (v.x - x).abs() < EPSILON && (v.y - y).abs() < EPSILON
    }

    #[test]
    fn quarter_turn() {
        let t = Transform::rotation_turns(0.25);
        assert!(close(t.apply(Vec2::new(1.0, 0.0)), 0.0, 1.0));
    }

    #[test]
    fn negative_quarter_turn() {
        let t = Transform::rotation_turns(-0.25);
        assert!(close(t.apply(Vec2::new(1.0, 0.0)), 0.0, -1.0));
    }

    #[test]
    fn full_turn_is_identity() {
        let t = Transform::rotation_turns(1.0);
        assert!(close(t.apply(Vec2::new(3.0, -2.0)), 3.0, -2.0));
    }

    #[test]
    fn stretch_axes() {
        assert!(close(
            Transform::stretch_x(2.0).apply(Vec2::new(3.0, 4.0)),
            6.0,
            4.0
        ));
        assert!(close(
            Transform::stretch_y(2.0).apply(Vec2::new(3.0, 4.0)),
            3.0,
            8.0
        ));
        assert!(close(
            Transform::scaled(0.5).apply(Vec2::new(4.0, 6.0)),
            2.0,
            3.0
        ));
    }

    #[test]
    fn shear() {
        assert!(close(
            Transform::shear_x(1.0).apply(Vec2::new(0.0, 1.0)),
            1.0,
            1.0
        ));
        assert!(close(
            Transform::shear_y(1.0).apply(Vec2::new(1.0, 0.0)),
            1.0,
            1.0
        ));
    }

    #[test]
    fn composition_order() {
        // Stretch x by 2, then rotate a quarter turn:
        // (1, 0) → (2, 0) → (0, 2)
        let t = Transform::stretch_x(2.0).then(&Transform::rotation_turns(0.25));
        assert!(close(t.apply(Vec2::new(1.0, 0.0)), 0.0, 2.0));

        // The opposite order gives a different result: (1,0) → (0,1) → (0,1)
        let u = Transform::rotation_turns(0.25).then(&Transform::stretch_x(2.0));
        assert!(close(u.apply(Vec2::new(1.0, 0.0)), 0.0, 1.0));
    }

    #[test]
    fn inverse_roundtrip() {
        let t = Transform::rotation_turns(0.1)
            .then(&Transform::scaled(3.0))
            .then(&Transform::shear_x(0.5));
        let inv = t.inverse().unwrap();
        let v = Vec2::new(7.0, -11.0);
        assert!(close(inv.apply(t.apply(v)), v.x, v.y));
    }

    #[test]
    fn inverse_singular() {
        assert!(Transform::scaled(0.0).inverse().is_none());
    }

    #[test]
    fn determinant_values() {
        assert!((Transform::IDENTITY.determinant() - 1.0).abs() < EPSILON);
        assert!((Transform::scaled(3.0).determinant() - 9.0).abs() < EPSILON);
        assert!((Transform::rotation_turns(0.125).determinant() - 1.0).abs() < EPSILON);
    }
}
