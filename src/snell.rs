//! Snell's law for complex refractive indices and complex angles.
//!
//! Inside a planar stack the quantity `n·sin θ` is the same in every layer.
//! Given the angle in one reference layer, the angle in any other layer
//! follows from
//!
//! ```text
//! θ_f = asin(n_ref · sin θ_ref / n_f)
//! ```
//!
//! Both the indices and the angles are complex. Past the critical angle, or
//! inside an absorbing medium, the result has a non-zero imaginary part that
//! encodes the evanescent decay of the wave.
//!
//! The complex `asin` is taken from `num_complex`, whose principal branch is
//! `-i·ln(sqrt(1 - z²) + i·z)`. On the real cut `(1, ∞)` this is continuous
//! from below, which gives `cos θ_f` a positive imaginary part for
//! evanescent waves and keeps the field factors bounded.

use num_complex::Complex64;

use crate::error::{Result, StackError};


/// Propagates `theta_ref`, the angle in a medium of index `n_ref`, into a
/// medium of index `n`.
///
/// When both indices are equal the reference angle is returned unchanged, so
/// that layers of the same medium carry bit-identical angles.
pub fn propagate(theta_ref: Complex64, n_ref: Complex64, n: Complex64) -> Result<Complex64> {
    if n == n_ref {
        return Ok(theta_ref);
    }

    let theta = (n_ref * theta_ref.sin() / n).asin();

    if theta.is_finite() {
        Ok(theta)
    } else {
        Err(StackError::Config(format!(
            "refracted angle is not finite (n_ref = {}, n = {}, theta_ref = {})",
            n_ref, n, theta_ref
        )))
    }
}
