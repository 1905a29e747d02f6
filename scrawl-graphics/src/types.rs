//! Core types shared across the Scrawl system.
//!
//! Scrawl programs operate on a tiny graphics model: a 2-D point, a pure
//! linear (translation-free) transform, and a flat command/vertex path
//! buffer. Points and vectors come from `kurbo` so the canonical output can
//! hand off to any `kurbo`-speaking renderer without conversion.

pub use kurbo::{Point, Vec2};

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// The numeric type of the language. Every value on the operand stack is a
/// `Scalar`; loop bounds and instruction addresses are stored as integral
/// scalars.
pub type Scalar = f64;

/// Tolerance for floating-point comparisons in tests and geometry checks.
pub const EPSILON: Scalar = 1e-9;

/// Threshold below which a determinant is treated as zero.
pub const NEAR_ZERO: Scalar = 1e-12;
