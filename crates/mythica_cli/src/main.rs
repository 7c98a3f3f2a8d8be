// Mythica USD command line tool
// Run with: cargo run --bin mythica-usd -- <command> ...

mod args;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use mythica_math::DVec3;
use mythica_usd::convert::{convert_usd_to_usdz_with, NativeToolkit};
use mythica_usd::usd::PackageOptions;
use mythica_usd::{create_offset_scene, export_scene, export_spline, ExportTransformType};
use serde::Deserialize;

use args::{parse_args, Command, USAGE};

/// Spline input file: `{ "points": [[x, y, z], ...], "transform": "relative", "origin": [x, y, z] }`
#[derive(Debug, Deserialize)]
struct SplineInput {
    points: Vec<[f64; 3]>,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    origin: [f64; 3],
}

#[derive(Debug, PartialEq)]
struct Spline {
    points: Vec<DVec3>,
    transform: ExportTransformType,
    origin: DVec3,
}

fn parse_spline(text: &str) -> Result<Spline> {
    let input: SplineInput = serde_json::from_str(text)?;
    let transform = match input.transform {
        Some(name) => name.parse()?,
        None => ExportTransformType::default(),
    };

    Ok(Spline {
        points: input.points.into_iter().map(DVec3::from).collect(),
        transform,
        origin: DVec3::from(input.origin),
    })
}

fn read_spline(path: &Path) -> Result<Spline> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse_spline(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Package { source, dest, strict } => {
            let toolkit = NativeToolkit::new(PackageOptions {
                strict,
                ..Default::default()
            });
            if !convert_usd_to_usdz_with(&toolkit, &source, &dest) {
                bail!("failed to package {} into {}", source, dest);
            }
            println!("Wrote {}", dest);
        }
        Command::Offset { source, dest, offset } => {
            create_offset_scene(&source, &dest, offset)?;
            println!("Wrote {} (offset {}, {}, {})", dest, offset.x, offset.y, offset.z);
        }
        Command::Export {
            source,
            dest,
            transform,
            origin,
            bounds,
        } => {
            let offset_layer = export_scene(&source, &dest, transform, origin, &bounds)?;
            println!("Wrote {} via {}", dest.display(), offset_layer.display());
        }
        Command::Spline { points, dest } => {
            let spline = read_spline(&points)?;
            let layer = export_spline(&spline.points, &dest, spline.transform, spline.origin)?;
            println!("Wrote {} via {}", dest.display(), layer.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {:#}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    log::debug!("Running {:?}", command);
    run(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_spline_defaults_to_world() {
        let spline = parse_spline(r#"{ "points": [[0, 0, 0], [100, 0, 50]] }"#).unwrap();
        assert_eq!(spline.transform, ExportTransformType::World);
        assert_eq!(spline.origin, DVec3::ZERO);
        assert_eq!(spline.points, vec![DVec3::ZERO, DVec3::new(100.0, 0.0, 50.0)]);
    }

    #[test]
    fn test_parse_spline_transform() {
        let spline = parse_spline(
            r#"{ "points": [[1, 2, 3]], "transform": "relative", "origin": [10, 20, 30] }"#,
        )
        .unwrap();
        assert_eq!(spline.transform, ExportTransformType::Relative);
        assert_eq!(spline.origin, DVec3::new(10.0, 20.0, 30.0));

        assert!(parse_spline(r#"{ "points": [], "transform": "sideways" }"#).is_err());
        assert!(parse_spline(r#"{ "points": [[1, 2]] }"#).is_err());
    }
}
