//! USD (Universal Scene Description) toolkit for Mythica.
//!
//! This module provides the scene-description operations the exporters
//! delegate to: authoring in-memory stages, writing USDA layers, reading
//! them back, and packaging layers with their dependencies into USDZ.
//!
//! ## Supported
//!
//! - In-memory stages with prim definition and reference arcs
//! - Common transform API (translate, rotate XYZ, scale)
//! - USDA export (`.usda`, `.usd`)
//! - USDA parsing and asset path scanning
//! - USDZ packaging with dependency collection
//!
//! ## Not Supported
//!
//! - Binary `.usdc` encoding (packaged verbatim, never written or scanned)
//! - Composition: references are authored, not resolved
//!
//! # Example
//!
//! ```ignore
//! use mythica_usd::usd::{Stage, XformCommonApi};
//! use mythica_math::DVec3;
//!
//! let mut stage = Stage::create_in_memory();
//! let prim = stage.define_prim("/Root", "Xform")?;
//! XformCommonApi::new(prim)?.set_translate(DVec3::new(0.0, 1.0, 0.0));
//! stage.export("offset.usda")?;
//! ```

mod types;
mod parser;
mod writer;
mod stage;
mod xform;
pub mod package;

pub use types::*;
pub use parser::*;
pub use writer::*;
pub use stage::*;
pub use xform::*;
pub use package::{create_new_usdz_package, PackageError, PackageOptions, UsdzPackageBuilder};
