//! Command line parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use mythica_math::{vec3d_from_slice, Bounds, DVec3};
use mythica_usd::ExportTransformType;

pub const USAGE: &str = "\
Usage:
  mythica-usd package <source> <dest.usdz> [--strict]
  mythica-usd offset  <source> <dest.usd[a]> <x> <y> <z>
  mythica-usd export  <source> <dest.usdz> world
  mythica-usd export  <source> <dest.usdz> relative <origin-x> <origin-y> <origin-z>
  mythica-usd export  <source> <dest.usdz> centered <min-x> <min-y> <min-z> <max-x> <max-y> <max-z>
  mythica-usd spline  <points.json> <dest.usdz>

Export coordinates are engine space (Z-up, centimetres). A spline file holds
{ \"points\": [[x, y, z], ...], \"transform\": \"world|relative|centered\", \"origin\": [x, y, z] }.

Logging is controlled by RUST_LOG (default: info).";

#[derive(Debug, PartialEq)]
pub enum Command {
    Package {
        source: String,
        dest: String,
        strict: bool,
    },
    Offset {
        source: String,
        dest: String,
        offset: DVec3,
    },
    Export {
        source: PathBuf,
        dest: PathBuf,
        transform: ExportTransformType,
        origin: DVec3,
        bounds: Bounds,
    },
    Spline {
        points: PathBuf,
        dest: PathBuf,
    },
}

/// Parse arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let (name, rest) = args.split_first().ok_or_else(|| anyhow!("missing command"))?;

    match name.as_str() {
        "package" => {
            let strict = rest.iter().any(|a| a == "--strict");
            let positional: Vec<&String> = rest.iter().filter(|a| *a != "--strict").collect();
            let [source, dest] = positional[..] else {
                bail!("package expects <source> <dest.usdz>");
            };
            Ok(Command::Package {
                source: source.clone(),
                dest: dest.clone(),
                strict,
            })
        }
        "offset" => {
            let [source, dest, components @ ..] = rest else {
                bail!("offset expects <source> <dest> <x> <y> <z>");
            };
            Ok(Command::Offset {
                source: source.clone(),
                dest: dest.clone(),
                offset: parse_vec3(components).context("invalid offset")?,
            })
        }
        "export" => {
            let [source, dest, mode, components @ ..] = rest else {
                bail!("export expects <source> <dest.usdz> <world|relative|centered> ...");
            };
            let transform: ExportTransformType = mode.parse()?;
            let (origin, bounds) = match transform {
                ExportTransformType::World if components.is_empty() => (DVec3::ZERO, Bounds::EMPTY),
                ExportTransformType::World => bail!("world export takes no coordinates"),
                ExportTransformType::Relative => {
                    (parse_vec3(components).context("invalid origin")?, Bounds::EMPTY)
                }
                ExportTransformType::Centered => {
                    if components.len() != 6 {
                        bail!("centered export expects <min-x> <min-y> <min-z> <max-x> <max-y> <max-z>");
                    }
                    let min = parse_vec3(&components[..3]).context("invalid bounds minimum")?;
                    let max = parse_vec3(&components[3..]).context("invalid bounds maximum")?;
                    (DVec3::ZERO, Bounds::new(min, max))
                }
            };
            Ok(Command::Export {
                source: PathBuf::from(source),
                dest: PathBuf::from(dest),
                transform,
                origin,
                bounds,
            })
        }
        "spline" => {
            let [points, dest] = rest else {
                bail!("spline expects <points.json> <dest.usdz>");
            };
            Ok(Command::Spline {
                points: PathBuf::from(points),
                dest: PathBuf::from(dest),
            })
        }
        other => bail!("unknown command: {}", other),
    }
}

/// Parse numeric components; anything but three fails at vector construction.
fn parse_vec3(components: &[String]) -> Result<DVec3> {
    let values = components
        .iter()
        .map(|c| {
            c.parse::<f64>()
                .with_context(|| format!("not a number: {:?}", c))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(vec3d_from_slice(&values)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_package() {
        let cmd = parse_args(&args(&["package", "a.usd", "a.usdz", "--strict"])).unwrap();
        assert_eq!(
            cmd,
            Command::Package {
                source: "a.usd".to_string(),
                dest: "a.usdz".to_string(),
                strict: true,
            }
        );
    }

    #[test]
    fn test_parse_offset() {
        let cmd = parse_args(&args(&["offset", "a.usd", "b.usda", "1", "-2.5", "3e2"])).unwrap();
        assert_eq!(
            cmd,
            Command::Offset {
                source: "a.usd".to_string(),
                dest: "b.usda".to_string(),
                offset: DVec3::new(1.0, -2.5, 300.0),
            }
        );
    }

    #[test]
    fn test_offset_arity_errors() {
        assert!(parse_args(&args(&["offset", "a.usd", "b.usda", "1", "2"])).is_err());
        assert!(parse_args(&args(&["offset", "a.usd", "b.usda", "1", "2", "3", "4"])).is_err());
        assert!(parse_args(&args(&["offset", "a.usd", "b.usda", "1", "x", "3"])).is_err());
    }

    #[test]
    fn test_parse_export_modes() {
        let world = parse_args(&args(&["export", "a.usd", "a.usdz", "world"])).unwrap();
        assert_eq!(
            world,
            Command::Export {
                source: PathBuf::from("a.usd"),
                dest: PathBuf::from("a.usdz"),
                transform: ExportTransformType::World,
                origin: DVec3::ZERO,
                bounds: Bounds::EMPTY,
            }
        );

        let relative =
            parse_args(&args(&["export", "a.usd", "a.usdz", "relative", "100", "0", "-50"])).unwrap();
        let Command::Export { transform, origin, .. } = relative else {
            panic!("expected export");
        };
        assert_eq!(transform, ExportTransformType::Relative);
        assert_eq!(origin, DVec3::new(100.0, 0.0, -50.0));

        let centered = parse_args(&args(&[
            "export", "a.usd", "a.usdz", "centered", "0", "0", "0", "200", "100", "50",
        ]))
        .unwrap();
        let Command::Export { transform, bounds, .. } = centered else {
            panic!("expected export");
        };
        assert_eq!(transform, ExportTransformType::Centered);
        assert_eq!(bounds.center(), DVec3::new(100.0, 50.0, 25.0));
    }

    #[test]
    fn test_export_mode_errors() {
        assert!(parse_args(&args(&["export", "a.usd", "a.usdz"])).is_err());
        assert!(parse_args(&args(&["export", "a.usd", "a.usdz", "local"])).is_err());
        assert!(parse_args(&args(&["export", "a.usd", "a.usdz", "world", "1"])).is_err());
        assert!(parse_args(&args(&["export", "a.usd", "a.usdz", "relative", "1", "2"])).is_err());
        assert!(parse_args(&args(&["export", "a.usd", "a.usdz", "centered", "1", "2", "3"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_args(&args(&["render"])).is_err());
        assert!(parse_args(&[]).is_err());
    }
}
