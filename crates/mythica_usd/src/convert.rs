//! Scene conversion operations.
//!
//! Two stateless operations used by the exporters:
//!
//! - [`convert_usd_to_usdz`] packages a scene into a USDZ archive.
//! - [`create_offset_scene`] writes a new scene that references a source
//!   scene under `/Root`, translated by an offset.
//!
//! Both delegate all scene work to a [`SceneToolkit`]. Inputs are passed
//! through untouched and toolkit failures are returned as-is.

use mythica_math::DVec3;

use crate::usd::package::create_new_usdz_package_with_options;
use crate::usd::{PackageOptions, References, Stage, StageResult, XformCommonApi};

/// Path of the prim that carries the reference and the offset.
pub const ROOT_PRIM_PATH: &str = "/Root";

/// Type of the prim at [`ROOT_PRIM_PATH`].
pub const ROOT_PRIM_TYPE: &str = "Xform";

/// The scene-description calls the conversion operations delegate to.
pub trait SceneToolkit {
    /// Build a USDZ package at `dest` from the layer at `source`.
    fn create_new_usdz_package(&self, source: &str, dest: &str) -> bool;

    /// Write a stage to `dest`, in the format implied by its extension.
    fn export_stage(&self, stage: &Stage, dest: &str) -> StageResult<()>;
}

/// The in-crate toolkit.
#[derive(Clone, Debug, Default)]
pub struct NativeToolkit {
    pub package_options: PackageOptions,
}

impl NativeToolkit {
    pub fn new(package_options: PackageOptions) -> Self {
        Self { package_options }
    }
}

impl SceneToolkit for NativeToolkit {
    fn create_new_usdz_package(&self, source: &str, dest: &str) -> bool {
        create_new_usdz_package_with_options(source, dest, &self.package_options)
    }

    fn export_stage(&self, stage: &Stage, dest: &str) -> StageResult<()> {
        stage.export(dest)
    }
}

/// Package `source` into a USDZ archive at `dest`.
pub fn convert_usd_to_usdz(source: &str, dest: &str) -> bool {
    convert_usd_to_usdz_with(&NativeToolkit::default(), source, dest)
}

/// [`convert_usd_to_usdz`] against a specific toolkit.
pub fn convert_usd_to_usdz_with<T: SceneToolkit + ?Sized>(toolkit: &T, source: &str, dest: &str) -> bool {
    toolkit.create_new_usdz_package(source, dest)
}

/// Compose the offset stage: `/Root` referencing `source`, translated by `offset`.
pub fn build_offset_stage(source: &str, offset: DVec3) -> StageResult<Stage> {
    let mut stage = Stage::create_in_memory();

    let root = stage.define_prim(ROOT_PRIM_PATH, ROOT_PRIM_TYPE)?;
    References::new(root).add_reference(source);
    XformCommonApi::new(root)?.set_translate(offset);

    Ok(stage)
}

/// Write a scene to `dest` that references `source` under `/Root`,
/// translated by `offset`.
pub fn create_offset_scene(source: &str, dest: &str, offset: impl Into<DVec3>) -> StageResult<()> {
    create_offset_scene_with(&NativeToolkit::default(), source, dest, offset)
}

/// [`create_offset_scene`] against a specific toolkit.
pub fn create_offset_scene_with<T: SceneToolkit + ?Sized>(
    toolkit: &T,
    source: &str,
    dest: &str,
    offset: impl Into<DVec3>,
) -> StageResult<()> {
    let stage = build_offset_stage(source, offset.into())?;
    toolkit.export_stage(&stage, dest)
}
