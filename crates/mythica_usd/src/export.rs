//! Export pipelines built on the conversion operations.
//!
//! Both pipelines stage intermediate layers in a `USDExport` directory next
//! to the destination package, then package the result:
//!
//! - [`export_scene`] moves an exported scene so the chosen export origin
//!   lands at the USD origin before packaging.
//! - [`export_spline`] writes spline points as a linear `BasisCurves` prim.
//!
//! The export origin is picked by an [`ExportTransformType`]: the world
//! origin, a caller-supplied origin, or the center of the exported bounds.
//!
//! Engine space is Z-up in centimetres; the written USD is Y-up in metres.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mythica_math::{engine_to_usd, Bounds, DVec3};
use thiserror::Error;

use crate::convert::{convert_usd_to_usdz, create_offset_scene};
use crate::usd::{Attribute, Stage, StageError, Value};

/// Directory for intermediate layers, created next to the destination.
pub const EXPORT_DIR_NAME: &str = "USDExport";

/// Intermediate layer holding exported geometry.
pub const EXPORT_LAYER_NAME: &str = "Export.usd";

/// Intermediate layer holding the re-centred scene.
pub const OFFSET_LAYER_NAME: &str = "Export_Offset.usd";

pub const SPLINE_PRIM_PATH: &str = "/SplineCurve";

/// Errors from the export pipelines.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Spline has no points")]
    EmptySpline,

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("Failed to package {0}")]
    PackageFailed(PathBuf),

    #[error("Unknown export transform type: {0:?} (expected world, relative or centered)")]
    UnknownTransformType(String),
}

/// Result type for export pipelines.
pub type ExportResult<T> = Result<T, ExportError>;

/// Where an export is anchored in engine space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportTransformType {
    /// Keep world positions
    #[default]
    World,
    /// Relative to a caller-supplied origin
    Relative,
    /// Relative to the center of the exported bounds
    Centered,
}

impl ExportTransformType {
    /// Engine-space point that becomes the USD origin.
    pub fn export_origin(self, origin: DVec3, bounds: &Bounds) -> DVec3 {
        match self {
            ExportTransformType::World => DVec3::ZERO,
            ExportTransformType::Relative => origin,
            ExportTransformType::Centered => bounds.center(),
        }
    }
}

impl FromStr for ExportTransformType {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "world" => Ok(ExportTransformType::World),
            "relative" => Ok(ExportTransformType::Relative),
            "centered" => Ok(ExportTransformType::Centered),
            _ => Err(ExportError::UnknownTransformType(s.to_string())),
        }
    }
}

/// Intermediate directory used for a destination package.
pub fn export_dir_for(dest: &Path) -> PathBuf {
    dest.parent()
        .unwrap_or(Path::new(""))
        .join(EXPORT_DIR_NAME)
}

fn path_str(path: &Path) -> ExportResult<&str> {
    path.to_str()
        .ok_or_else(|| ExportError::NonUtf8Path(path.to_path_buf()))
}

fn package(layer: &Path, dest: &Path) -> ExportResult<()> {
    if convert_usd_to_usdz(path_str(layer)?, path_str(dest)?) {
        Ok(())
    } else {
        Err(ExportError::PackageFailed(layer.to_path_buf()))
    }
}

/// Package `source` into `dest`, moved so that the export origin picked by
/// `transform` lands at the USD origin.
///
/// `origin` is used by [`ExportTransformType::Relative`] and `bounds`, the
/// engine-space bounds of the exported content, by
/// [`ExportTransformType::Centered`]. The source is referenced by absolute
/// path from the intermediate layer.
pub fn export_scene(
    source: &Path,
    dest: &Path,
    transform: ExportTransformType,
    origin: DVec3,
    bounds: &Bounds,
) -> ExportResult<PathBuf> {
    let source = fs::canonicalize(source)?;
    let export_dir = export_dir_for(dest);
    fs::create_dir_all(&export_dir)?;

    let export_origin = transform.export_origin(origin, bounds);
    let offset = -engine_to_usd(export_origin);
    let offset_path = export_dir.join(OFFSET_LAYER_NAME);
    log::debug!(
        "Re-centring {} on {:?} ({:?}, USD offset {:?})",
        source.display(),
        export_origin,
        transform,
        offset
    );

    create_offset_scene(path_str(&source)?, path_str(&offset_path)?, offset)?;
    package(&offset_path, dest)?;

    log::info!("Exported {} to {}", source.display(), dest.display());
    Ok(offset_path)
}

/// Build the spline stage for engine-space `points`, relative to the
/// engine-space `export_origin`.
pub fn build_spline_stage(points: &[DVec3], export_origin: DVec3) -> ExportResult<Stage> {
    if points.is_empty() {
        return Err(ExportError::EmptySpline);
    }

    let usd_points = points
        .iter()
        .map(|p| engine_to_usd(*p - export_origin).as_vec3())
        .collect();

    let mut stage = Stage::create_in_memory();
    stage.set_meters_per_unit(1.0);
    stage.set_up_axis("Y");

    let curves = stage.define_prim(SPLINE_PRIM_PATH, "BasisCurves")?;
    curves.set_attribute(Attribute::new(
        "curveVertexCounts",
        "int[]",
        Value::IntArray(vec![points.len() as i32]),
    ));
    curves.set_attribute(Attribute::new(
        "points",
        "point3f[]",
        Value::Point3fArray(usd_points),
    ));
    for (name, token) in [("type", "linear"), ("wrap", "nonperiodic")] {
        curves.set_attribute(Attribute::new(name, "token", Value::Token(token.to_string())).uniform());
    }

    Ok(stage)
}

/// Write spline points as a curve layer and package it into `dest`.
///
/// [`ExportTransformType::Centered`] centres on the bounds of the points.
pub fn export_spline(
    points: &[DVec3],
    dest: &Path,
    transform: ExportTransformType,
    origin: DVec3,
) -> ExportResult<PathBuf> {
    let bounds = Bounds::from_points(points.iter().copied());
    let stage = build_spline_stage(points, transform.export_origin(origin, &bounds))?;

    let export_dir = export_dir_for(dest);
    fs::create_dir_all(&export_dir)?;

    let layer_path = export_dir.join(EXPORT_LAYER_NAME);
    stage.export(&layer_path)?;
    package(&layer_path, dest)?;

    log::info!("Exported spline with {} points to {}", points.len(), dest.display());
    Ok(layer_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::{parse_usda, read_usda, Reference, TRANSLATE_OP};
    use mythica_math::Vec3;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn spline_points(stage: &Stage) -> Vec<Vec3> {
        match &stage.prim(SPLINE_PRIM_PATH).unwrap().attribute("points").unwrap().value {
            Some(Value::Point3fArray(points)) => points.clone(),
            other => panic!("expected points, got {:?}", other),
        }
    }

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-6, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_export_origin_per_transform_type() {
        let origin = DVec3::new(10.0, 20.0, 30.0);
        let bounds = Bounds::new(DVec3::new(-100.0, 0.0, 0.0), DVec3::new(100.0, 50.0, 200.0));

        assert_eq!(ExportTransformType::World.export_origin(origin, &bounds), DVec3::ZERO);
        assert_eq!(ExportTransformType::Relative.export_origin(origin, &bounds), origin);
        assert_eq!(
            ExportTransformType::Centered.export_origin(origin, &bounds),
            DVec3::new(0.0, 25.0, 100.0)
        );
        assert_eq!(
            ExportTransformType::Centered.export_origin(origin, &Bounds::EMPTY),
            DVec3::ZERO
        );
    }

    #[test]
    fn test_transform_type_from_str() {
        assert_eq!("world".parse::<ExportTransformType>().unwrap(), ExportTransformType::World);
        assert_eq!("Relative".parse::<ExportTransformType>().unwrap(), ExportTransformType::Relative);
        assert_eq!("CENTERED".parse::<ExportTransformType>().unwrap(), ExportTransformType::Centered);
        assert!(matches!(
            "local".parse::<ExportTransformType>(),
            Err(ExportError::UnknownTransformType(_))
        ));
    }

    #[test]
    fn test_spline_stage() {
        let points = [
            DVec3::new(100.0, 0.0, 0.0),
            DVec3::new(200.0, 100.0, 300.0),
        ];
        let stage = build_spline_stage(&points, DVec3::new(100.0, 0.0, 0.0)).unwrap();

        let metadata = &stage.root_layer().metadata;
        assert_eq!(metadata.meters_per_unit, Some(1.0));
        assert_eq!(metadata.up_axis.as_deref(), Some("Y"));

        let curves = stage.prim(SPLINE_PRIM_PATH).unwrap();
        assert_eq!(curves.type_name.as_deref(), Some("BasisCurves"));
        assert_eq!(
            curves.attribute("curveVertexCounts").unwrap().value,
            Some(Value::IntArray(vec![2]))
        );

        let usd_points = spline_points(&stage);
        assert_eq!(usd_points[0], Vec3::ZERO);
        assert_close(usd_points[1], Vec3::new(1.0, 3.0, 1.0));

        assert_eq!(
            curves.attribute("type").unwrap().value,
            Some(Value::Token("linear".to_string()))
        );
        assert!(curves.attribute("basis").is_none());
    }

    #[test]
    fn test_spline_matches_scene_mapping() {
        // A point at the scene origin after re-centring stays there in the spline too
        let origin = DVec3::new(50.0, -20.0, 300.0);
        let point = DVec3::new(150.0, 80.0, 500.0);

        let stage = build_spline_stage(&[point], origin).unwrap();
        let expected = (engine_to_usd(point) - engine_to_usd(origin)).as_vec3();
        assert_close(spline_points(&stage)[0], expected);
    }

    #[test]
    fn test_empty_spline() {
        assert!(matches!(
            build_spline_stage(&[], DVec3::ZERO),
            Err(ExportError::EmptySpline)
        ));
    }

    #[test]
    fn test_export_spline_transform_types() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("spline.usdz");
        let points = [DVec3::new(0.0, 0.0, 0.0), DVec3::new(200.0, 0.0, 100.0)];
        let origin = DVec3::new(100.0, 0.0, 0.0);

        let cases = [
            (ExportTransformType::World, [Vec3::ZERO, Vec3::new(2.0, 1.0, 0.0)]),
            (ExportTransformType::Relative, [Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)]),
            (ExportTransformType::Centered, [Vec3::new(-1.0, -0.5, 0.0), Vec3::new(1.0, 0.5, 0.0)]),
        ];
        for (transform, expected) in cases {
            let layer_path = export_spline(&points, &dest, transform, origin).unwrap();
            assert_eq!(layer_path, dir.path().join(EXPORT_DIR_NAME).join(EXPORT_LAYER_NAME));
            assert!(dest.exists());

            let layer = read_usda(&layer_path).unwrap();
            assert_eq!(layer.metadata.up_axis.as_deref(), Some("Y"));
            let curve = &layer.root_prims[0];
            assert_eq!(curve.name, "SplineCurve");
            assert_eq!(
                curve.attribute("wrap").unwrap().value,
                Some(Value::Token("nonperiodic".to_string()))
            );

            let Some(Value::Point3fArray(written)) = &curve.attribute("points").unwrap().value else {
                panic!("expected points");
            };
            for (got, want) in written.iter().zip(expected) {
                assert_close(*got, want);
            }
        }
    }

    fn offset_of(path: &Path) -> Option<Value> {
        let layer = parse_usda(&fs::read_to_string(path).unwrap()).unwrap();
        layer.root_prims[0].attribute(TRANSLATE_OP)?.value.clone()
    }

    #[test]
    fn test_export_scene_transform_types() {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("level.usda");
        fs::write(&source, "#usda 1.0\n\ndef Xform \"Level\"\n{\n}\n").unwrap();

        let dest = dir.path().join("level.usdz");
        let origin = DVec3::new(100.0, 200.0, 300.0);
        let bounds = Bounds::new(DVec3::ZERO, DVec3::new(200.0, 400.0, 1000.0));

        let cases = [
            (ExportTransformType::World, DVec3::ZERO),
            (ExportTransformType::Relative, DVec3::new(-1.0, -3.0, -2.0)),
            (ExportTransformType::Centered, DVec3::new(-1.0, -5.0, -2.0)),
        ];
        for (transform, expected) in cases {
            let offset_path = export_scene(&source, &dest, transform, origin, &bounds).unwrap();
            assert!(dest.exists());
            assert_eq!(offset_path, dir.path().join(EXPORT_DIR_NAME).join(OFFSET_LAYER_NAME));
            assert_eq!(offset_of(&offset_path), Some(Value::Double3(expected)));
        }

        let offset_path = dir.path().join(EXPORT_DIR_NAME).join(OFFSET_LAYER_NAME);
        let layer = parse_usda(&fs::read_to_string(offset_path).unwrap()).unwrap();
        let canonical = fs::canonicalize(&source).unwrap();
        assert_eq!(layer.root_prims[0].references, vec![Reference::new(canonical.to_str().unwrap())]);
    }

    #[test]
    fn test_export_with_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = export_scene(
            &dir.path().join("missing.usda"),
            &dir.path().join("out.usdz"),
            ExportTransformType::World,
            DVec3::ZERO,
            &Bounds::EMPTY,
        );
        assert!(matches!(result, Err(ExportError::Io(_))));
    }
}
