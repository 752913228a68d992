//! Numeric helpers and nalgebra extensions used by the estimators

use nalgebra::Vector3;

/// Reciprocal square root
///
/// Returns `None` when `x` is not strictly positive, so callers can skip a
/// normalisation step instead of producing `inf`/`NaN`.
pub fn inv_sqrt(x: f32) -> Option<f32> {
    if x > 0.0 { Some(1.0 / x.sqrt()) } else { None }
}

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Whether every component is exactly zero
    fn is_exactly_zero(&self) -> bool;

    /// Normalize via reciprocal square root, `None` for the zero vector
    fn try_unit(&self) -> Option<Vector3<f32>>;
}

impl Vector3Ext for Vector3<f32> {
    fn is_exactly_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    fn try_unit(&self) -> Option<Vector3<f32>> {
        inv_sqrt(self.x * self.x + self.y * self.y + self.z * self.z).map(|r| *self * r)
    }
}
