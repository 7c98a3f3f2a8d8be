//! Conversion from engine space to USD space.
//!
//! Engine space is left-handed and Z-up with centimetre units. The USD files
//! produced by the export pipelines are right-handed and Y-up with one metre
//! per unit.

use glam::DVec3;

/// Engine units (centimetres) per USD unit (metre).
pub const ENGINE_UNITS_PER_METER: f64 = 100.0;

/// Convert an engine-space vector into USD space.
///
/// Swapping Y and Z is the single reflection between the two frames, so
/// positions and offsets share this mapping. The sign of an offset is left
/// to the caller.
pub fn engine_to_usd(v: DVec3) -> DVec3 {
    DVec3::new(v.x, v.z, v.y) / ENGINE_UNITS_PER_METER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swaps_axes_and_rescales() {
        let usd = engine_to_usd(DVec3::new(100.0, 200.0, 300.0));
        assert_eq!(usd, DVec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_engine_up_becomes_usd_up() {
        assert_eq!(engine_to_usd(DVec3::new(0.0, 0.0, 50.0)), DVec3::new(0.0, 0.5, 0.0));
    }
}
