//! In-memory USD stages.
//!
//! A [`Stage`] owns a single anonymous root layer that prims are authored
//! into. Composition is not evaluated: references are authored as arcs and
//! resolved by whatever opens the exported file.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::types::*;
use super::writer::write_layer;

/// Errors from stage authoring and export.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid prim path: {0:?}")]
    InvalidPath(String),

    #[error("No prim at path {0}")]
    NoSuchPrim(String),

    #[error("Prim {prim:?} of type {type_name:?} is not transformable")]
    NotXformable {
        prim: String,
        type_name: Option<String>,
    },

    #[error("Cannot determine file format of {0:?}: missing extension")]
    MissingExtension(String),

    #[error("Unsupported file format for export: {0:?}")]
    UnsupportedFormat(String),
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Text encodings this crate can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Usda,
}

impl ExportFormat {
    /// Choose the format implied by a destination's file extension.
    ///
    /// `.usd` is written as text; readers detect the encoding from content.
    pub fn from_path(path: &Path) -> StageResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| StageError::MissingExtension(path.display().to_string()))?;

        match ext.to_ascii_lowercase().as_str() {
            "usda" | "usd" => Ok(ExportFormat::Usda),
            _ => Err(StageError::UnsupportedFormat(ext.to_string())),
        }
    }
}

/// An in-memory stage with one root layer.
#[derive(Clone, Debug, Default)]
pub struct Stage {
    root_layer: Layer,
}

impl Stage {
    /// Create a new, empty, anonymous stage.
    pub fn create_in_memory() -> Self {
        log::debug!("Creating in-memory stage");
        Self::default()
    }

    pub fn root_layer(&self) -> &Layer {
        &self.root_layer
    }

    pub fn root_layer_mut(&mut self) -> &mut Layer {
        &mut self.root_layer
    }

    /// Define a prim at `path` with the given type.
    ///
    /// Missing ancestors are defined as typeless prims. An existing prim is
    /// made a `def` and retyped.
    pub fn define_prim(&mut self, path: &str, type_name: &str) -> StageResult<&mut PrimSpec> {
        let sdf_path = SdfPath::new(path).ok_or_else(|| StageError::InvalidPath(path.to_string()))?;
        let (first, rest) = sdf_path
            .names()
            .split_first()
            .ok_or_else(|| StageError::InvalidPath(path.to_string()))?;

        let mut prim = define_in(&mut self.root_layer.root_prims, first);
        for name in rest {
            prim = define_in(&mut prim.children, name);
        }

        prim.specifier = Specifier::Def;
        prim.type_name = if type_name.is_empty() {
            None
        } else {
            Some(type_name.to_string())
        };

        log::debug!("Defined prim {} ({})", sdf_path, type_name);
        Ok(prim)
    }

    pub fn prim(&self, path: &str) -> Option<&PrimSpec> {
        self.root_layer.prim_at(&SdfPath::new(path)?)
    }

    pub fn prim_mut(&mut self, path: &str) -> Option<&mut PrimSpec> {
        self.root_layer.prim_at_mut(&SdfPath::new(path)?)
    }

    /// Reference list editor for the prim at `path`.
    pub fn references(&mut self, path: &str) -> StageResult<References<'_>> {
        let prim = self
            .prim_mut(path)
            .ok_or_else(|| StageError::NoSuchPrim(path.to_string()))?;
        Ok(References::new(prim))
    }

    pub fn set_default_prim(&mut self, name: impl Into<String>) {
        self.root_layer.metadata.default_prim = Some(name.into());
    }

    pub fn set_up_axis(&mut self, axis: impl Into<String>) {
        self.root_layer.metadata.up_axis = Some(axis.into());
    }

    pub fn set_meters_per_unit(&mut self, meters_per_unit: f64) {
        self.root_layer.metadata.meters_per_unit = Some(meters_per_unit);
    }

    pub fn set_doc(&mut self, doc: impl Into<String>) {
        self.root_layer.metadata.doc = Some(doc.into());
    }

    /// Serialize the root layer as USDA text.
    pub fn export_to_string(&self) -> String {
        write_layer(&self.root_layer)
    }

    /// Write the stage to `path`, in the format implied by its extension.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> StageResult<()> {
        let path = path.as_ref();
        let text = match ExportFormat::from_path(path)? {
            ExportFormat::Usda => self.export_to_string(),
        };

        fs::write(path, text)?;
        log::info!(
            "Exported stage ({} prims) to {}",
            self.root_layer.prim_count(),
            path.display()
        );
        Ok(())
    }
}

fn define_in<'a>(prims: &'a mut Vec<PrimSpec>, name: &str) -> &'a mut PrimSpec {
    let index = match prims.iter().position(|p| p.name == name) {
        Some(index) => index,
        None => {
            prims.push(PrimSpec::new(name, None));
            prims.len() - 1
        }
    };
    &mut prims[index]
}

/// Edits the reference list of one prim.
pub struct References<'a> {
    prim: &'a mut PrimSpec,
}

impl<'a> References<'a> {
    pub fn new(prim: &'a mut PrimSpec) -> Self {
        Self { prim }
    }

    /// Add a reference to the default prim of `asset_path`.
    ///
    /// The asset path is authored verbatim.
    pub fn add_reference(&mut self, asset_path: &str) {
        self.add(Reference::new(asset_path));
    }

    /// Add a reference to a specific prim inside `asset_path`.
    pub fn add_reference_to_prim(&mut self, asset_path: &str, prim_path: &str) {
        self.add(Reference::new(asset_path).with_prim_path(prim_path));
    }

    fn add(&mut self, reference: Reference) {
        if self.prim.references.contains(&reference) {
            return;
        }
        if self.prim.references.is_empty() {
            self.prim.reference_op = ListOp::Prepend;
        }
        log::debug!("Adding reference {:?} to {}", reference.asset_path, self.prim.name);
        self.prim.references.push(reference);
    }
}
