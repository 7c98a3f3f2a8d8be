//! USDZ packaging.
//!
//! A USDZ package is a zip archive whose entries are stored uncompressed
//! with their data aligned to 64 bytes, and whose first entry is the root
//! layer. The builder gathers the root layer and everything it depends on:
//!
//! - sublayers, references and payloads of USDA layers, recursively
//! - asset-valued attributes (textures and the like)
//!
//! Dependencies below the root layer's directory keep their relative
//! location. Anything outside it is moved under an external directory in
//! the archive, and the layers that point at it are rewritten.
//!
//! # Example
//!
//! ```ignore
//! use mythica_usd::usd::package::UsdzPackageBuilder;
//!
//! let manifest = UsdzPackageBuilder::new("scene.usda").write("scene.usdz")?;
//! println!("Packaged {} files", manifest.entries.len());
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::parser::{detect_layer_format, rewrite_asset_paths, scan_asset_paths, LayerFormat};

/// Data alignment of every entry in a USDZ archive.
pub const USDZ_ALIGNMENT: u16 = 64;

/// Errors that can occur while building a package.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Source layer not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Destination must be a .usdz file: {0}")]
    InvalidDestination(PathBuf),

    #[error("Unresolved asset path {asset:?} in {layer}")]
    MissingDependency { asset: String, layer: PathBuf },

    #[error("Layer is not valid UTF-8: {0}")]
    InvalidEncoding(PathBuf),
}

/// Result type for packaging operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Packaging configuration.
#[derive(Clone, Debug)]
pub struct PackageOptions {
    /// Fail on unresolved dependencies instead of skipping them
    pub strict: bool,

    /// Archive directory for dependencies outside the root layer's directory
    pub external_dir: String,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            strict: false,
            external_dir: "external".to_string(),
        }
    }
}

/// One file in a written package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageEntry {
    /// Path inside the archive
    pub archive_path: String,

    /// File it was read from
    pub source: PathBuf,

    /// Stored size in bytes (after any asset path rewriting)
    pub size: u64,

    /// Whether asset paths inside this layer were rewritten
    pub rewritten: bool,
}

/// What went into a package, in archive order.
#[derive(Clone, Debug, Default)]
pub struct PackageManifest {
    pub entries: Vec<PackageEntry>,

    /// Asset paths that could not be resolved and were left out
    pub skipped: Vec<String>,
}

struct PackagedFile {
    entry: PackageEntry,
    data: Vec<u8>,
}

/// Builds a USDZ package from a root layer.
pub struct UsdzPackageBuilder {
    source: PathBuf,
    options: PackageOptions,
}

impl UsdzPackageBuilder {
    pub fn new<P: AsRef<Path>>(source: P) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            options: PackageOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PackageOptions) -> Self {
        self.options = options;
        self
    }

    /// Gather and write the package to `dest`.
    ///
    /// Nothing is written if dependency collection fails. A partially
    /// written archive is removed on error.
    pub fn write<P: AsRef<Path>>(&self, dest: P) -> PackageResult<PackageManifest> {
        let dest = dest.as_ref();
        let is_usdz = dest
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("usdz"));
        if !is_usdz {
            return Err(PackageError::InvalidDestination(dest.to_path_buf()));
        }

        let (files, skipped) = self.collect()?;

        if let Err(e) = write_archive(dest, &files) {
            let _ = fs::remove_file(dest);
            return Err(e);
        }

        log::info!(
            "Packaged {} files into {}",
            files.len(),
            dest.display()
        );

        Ok(PackageManifest {
            entries: files.into_iter().map(|f| f.entry).collect(),
            skipped,
        })
    }

    /// Resolve the root layer and its dependencies, root first.
    fn collect(&self) -> PackageResult<(Vec<PackagedFile>, Vec<String>)> {
        let root = fs::canonicalize(&self.source)
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| PackageError::SourceNotFound(self.source.clone()))?;
        let root_dir = root.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut archive_paths: HashMap<PathBuf, String> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::new();
        let mut files = Vec::new();
        let mut skipped = Vec::new();

        let root_name = file_name(&root);
        taken.insert(root_name.clone());
        archive_paths.insert(root.clone(), root_name);
        queue.push_back(root);

        while let Some(path) = queue.pop_front() {
            let archive_path = archive_paths[&path].clone();
            let data = fs::read(&path)?;

            let (data, rewritten) = match detect_layer_format(&data) {
                LayerFormat::Usda => {
                    let text = String::from_utf8(data)
                        .map_err(|_| PackageError::InvalidEncoding(path.clone()))?;
                    let layer_dir = path.parent().unwrap_or(Path::new(""));
                    let archive_dir = parent_dir(&archive_path);

                    let mut rewrites = HashMap::new();
                    let mut seen = HashSet::new();
                    for asset in scan_asset_paths(&text) {
                        let literal = asset.literal;
                        if literal.is_empty() || literal.contains("://") || !seen.insert(literal.clone()) {
                            continue;
                        }

                        let resolved = match fs::canonicalize(layer_dir.join(&literal)) {
                            Ok(resolved) if resolved.is_file() => resolved,
                            _ => {
                                if self.options.strict {
                                    return Err(PackageError::MissingDependency {
                                        asset: literal,
                                        layer: path.clone(),
                                    });
                                }
                                log::warn!(
                                    "Skipping unresolved asset {:?} (line {}) in {}",
                                    literal,
                                    asset.line,
                                    path.display()
                                );
                                skipped.push(literal);
                                continue;
                            }
                        };

                        let target = match archive_paths.get(&resolved) {
                            Some(existing) => existing.clone(),
                            None => {
                                let assigned = self.assign_archive_path(&resolved, &root_dir, &mut taken);
                                log::debug!("Adding dependency {} as {}", resolved.display(), assigned);
                                archive_paths.insert(resolved.clone(), assigned.clone());
                                queue.push_back(resolved);
                                assigned
                            }
                        };

                        let relative = relative_archive_path(archive_dir, &target);
                        if normalize_relative(&literal) != relative {
                            rewrites.insert(literal, relative);
                        }
                    }

                    if rewrites.is_empty() {
                        (text.into_bytes(), false)
                    } else {
                        log::debug!("Rewriting {} asset paths in {}", rewrites.len(), archive_path);
                        (rewrite_asset_paths(&text, &rewrites).into_bytes(), true)
                    }
                }
                LayerFormat::Usdc => {
                    log::warn!(
                        "Packaging binary layer {} without scanning its dependencies",
                        path.display()
                    );
                    (data, false)
                }
                LayerFormat::Other => (data, false),
            };

            files.push(PackagedFile {
                entry: PackageEntry {
                    archive_path,
                    source: path,
                    size: data.len() as u64,
                    rewritten,
                },
                data,
            });
        }

        Ok((files, skipped))
    }

    /// Pick a unique archive path for a dependency.
    ///
    /// Files under the root directory keep their relative path and the rest
    /// go under the external directory. Either way a name already in the
    /// archive gets a numeric suffix.
    fn assign_archive_path(&self, resolved: &Path, root_dir: &Path, taken: &mut HashSet<String>) -> String {
        let preferred = match resolved.strip_prefix(root_dir) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => format!("{}/{}", self.options.external_dir, file_name(resolved)),
        };

        let path = unique_archive_path(&preferred, taken);
        if path != preferred {
            log::debug!("Archive path {} is taken, using {}", preferred, path);
        }
        taken.insert(path.clone());
        path
    }
}

/// `preferred`, or the first `stem_N.ext` variant of it not in `taken`.
fn unique_archive_path(preferred: &str, taken: &HashSet<String>) -> String {
    let (dir, name) = match preferred.rsplit_once('/') {
        Some((dir, name)) => (format!("{}/", dir), name),
        None => (String::new(), preferred),
    };
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (name, String::new()),
    };

    let mut candidate = preferred.to_string();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{}{}_{}{}", dir, stem, n, ext);
        n += 1;
    }
    candidate
}

fn write_archive(dest: &Path, files: &[PackagedFile]) -> PackageResult<()> {
    let mut zip = ZipWriter::new(File::create(dest)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for file in files {
        zip.start_file_aligned(file.entry.archive_path.clone(), options, USDZ_ALIGNMENT)?;
        zip.write_all(&file.data)?;
    }

    zip.finish()?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Directory part of an archive path (`""` at the archive root).
fn parent_dir(archive_path: &str) -> &str {
    archive_path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Path from archive directory `from_dir` to archive file `to`.
fn relative_archive_path(from_dir: &str, to: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|c| !c.is_empty()).collect();
    let to: Vec<&str> = to.split('/').filter(|c| !c.is_empty()).collect();

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

/// Lexically normalise a relative asset path (`./a/../b.usda` -> `b.usda`).
fn normalize_relative(literal: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(literal).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push("..".to_string()),
            },
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            // Absolute paths never match an archive-relative path
            Component::RootDir | Component::Prefix(_) => return literal.to_string(),
        }
    }
    parts.join("/")
}

/// Build a USDZ package at `dest` from the layer at `source`.
///
/// Returns whether the package was written; failures are logged.
pub fn create_new_usdz_package<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> bool {
    create_new_usdz_package_with_options(source, dest, &PackageOptions::default())
}

/// [`create_new_usdz_package`] with explicit options.
pub fn create_new_usdz_package_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    dest: Q,
    options: &PackageOptions,
) -> bool {
    let (source, dest) = (source.as_ref(), dest.as_ref());
    match UsdzPackageBuilder::new(source)
        .with_options(options.clone())
        .write(dest)
    {
        Ok(_) => true,
        Err(e) => {
            log::error!(
                "Failed to package {} into {}: {}",
                source.display(),
                dest.display(),
                e
            );
            false
        }
    }
}
