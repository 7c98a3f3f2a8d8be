//! Mythica USD - scene conversion utilities.
//!
//! This crate provides:
//!
//! - **Conversion**: `convert_usd_to_usdz` and `create_offset_scene`
//! - **Export pipelines**: scene and spline export (world, relative or centered)
//! - **USD toolkit**: stages, USDA read/write, USDZ packaging
//!
//! # Example
//!
//! ```ignore
//! use mythica_usd::{convert_usd_to_usdz, create_offset_scene};
//!
//! create_offset_scene("Export.usd", "Export_Offset.usd", (0.0, -1.5, 0.0))?;
//! assert!(convert_usd_to_usdz("Export_Offset.usd", "Export.usdz"));
//! ```

pub mod convert;
pub mod export;
pub mod usd;

// Re-export commonly used items
pub use convert::{
    build_offset_stage, convert_usd_to_usdz, create_offset_scene, NativeToolkit, SceneToolkit,
    ROOT_PRIM_PATH, ROOT_PRIM_TYPE,
};
pub use export::{export_scene, export_spline, ExportError, ExportTransformType};
