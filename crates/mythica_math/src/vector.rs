use glam::DVec3;
use thiserror::Error;

/// Raised when a dynamically sized list cannot become a 3-component vector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected 3 vector components, got {0}")]
pub struct VectorArityError(pub usize);

/// Build a `DVec3` from a slice of exactly three components.
///
/// Values are taken verbatim: no reordering, scaling or NaN filtering.
pub fn vec3d_from_slice(components: &[f64]) -> Result<DVec3, VectorArityError> {
    match *components {
        [x, y, z] => Ok(DVec3::new(x, y, z)),
        _ => Err(VectorArityError(components.len())),
    }
}
