// Re-export glam for convenience
pub use glam::*;

// Mythica math helpers
mod bounds;
mod units;
mod vector;
pub use bounds::Bounds;
pub use units::{engine_to_usd, ENGINE_UNITS_PER_METER};
pub use vector::{vec3d_from_slice, VectorArityError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dvec3_creation() {
        let v = DVec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.x, 1.0);
        assert_eq!(v.y, 2.0);
        assert_eq!(v.z, 3.0);
    }

    #[test]
    fn test_dvec3_from_tuple() {
        let v: DVec3 = (1.0, 2.0, 3.0).into();
        assert_eq!(v, DVec3::new(1.0, 2.0, 3.0));
    }
}
