//! USD layer types.
//!
//! These types hold the authored content of a single layer: layer metadata,
//! prim specs, their metadata and attributes. Nothing here composes layers.

use std::fmt;
use std::str::FromStr;

use mythica_math::{DVec3, Vec3};

/// An absolute prim path such as `/World/Model`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SdfPath {
    names: Vec<String>,
}

impl SdfPath {
    /// Parse and validate an absolute prim path.
    ///
    /// Returns `None` for relative paths, the pseudo-root `/`, empty
    /// components and names that are not identifiers.
    pub fn new(path: &str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }

        let mut names = Vec::new();
        for name in rest.split('/') {
            if !is_valid_identifier(name) {
                return None;
            }
            names.push(name.to_string());
        }

        Some(Self { names })
    }

    /// Prim names from the root down.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        // Construction guarantees at least one name
        self.names.last().map(String::as_str).unwrap_or_default()
    }

    /// Parent prim path, or `None` for root prims.
    pub fn parent(&self) -> Option<SdfPath> {
        if self.names.len() < 2 {
            return None;
        }
        Some(Self {
            names: self.names[..self.names.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for SdfPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.names {
            write!(f, "/{}", name)?;
        }
        Ok(())
    }
}

impl FromStr for SdfPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SdfPath::new(s).ok_or_else(|| s.to_string())
    }
}

/// Check whether a prim name is a valid USD identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// How a prim spec is introduced in a layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Specifier {
    #[default]
    Def,
    Over,
    Class,
}

impl Specifier {
    pub fn keyword(self) -> &'static str {
        match self {
            Specifier::Def => "def",
            Specifier::Over => "over",
            Specifier::Class => "class",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "def" => Some(Specifier::Def),
            "over" => Some(Specifier::Over),
            "class" => Some(Specifier::Class),
            _ => None,
        }
    }
}

/// Attribute variability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Variability {
    #[default]
    Varying,
    Uniform,
}

/// List editing operation used for references and payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListOp {
    /// `references = ...`
    Explicit,
    /// `prepend references = ...`
    #[default]
    Prepend,
    /// `append references = ...`
    Append,
}

impl ListOp {
    /// Keyword prefix as written in USDA (empty for explicit lists).
    pub fn prefix(self) -> &'static str {
        match self {
            ListOp::Explicit => "",
            ListOp::Prepend => "prepend ",
            ListOp::Append => "append ",
        }
    }
}

/// A reference or payload arc to an external layer.
/// Syntax: `@path/to/file.usda@</PrimPath>`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reference {
    /// Asset path exactly as authored
    pub asset_path: String,

    /// Optional target prim inside the referenced layer
    pub prim_path: Option<String>,
}

impl Reference {
    pub fn new(asset_path: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            prim_path: None,
        }
    }

    pub fn with_prim_path(mut self, prim_path: impl Into<String>) -> Self {
        self.prim_path = Some(prim_path.into());
        self
    }
}

/// An authored attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f32),
    Double(f64),
    Double3(DVec3),
    Float3(Vec3),
    Token(String),
    String(String),
    Asset(String),
    IntArray(Vec<i32>),
    TokenArray(Vec<String>),
    Point3fArray(Vec<Vec3>),
    /// Value text kept verbatim for types this crate does not interpret
    Raw(String),
}

/// A USD attribute spec.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Full attribute name including namespaces (e.g. `xformOp:translate`)
    pub name: String,

    /// USD value type name (e.g. `double3`, `token[]`)
    pub type_name: String,

    pub variability: Variability,

    /// Default value, `None` for declared-only attributes
    pub value: Option<Value>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            variability: Variability::Varying,
            value: Some(value),
        }
    }

    pub fn uniform(mut self) -> Self {
        self.variability = Variability::Uniform;
        self
    }
}

/// A prim spec and its namespace children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimSpec {
    /// Prim name (last component of its path)
    pub name: String,

    pub specifier: Specifier,

    /// Schema type name (e.g. `Xform`), `None` for typeless prims
    pub type_name: Option<String>,

    /// Model kind metadata (e.g. `component`)
    pub kind: Option<String>,

    pub references: Vec<Reference>,
    pub reference_op: ListOp,

    pub payloads: Vec<Reference>,
    pub payload_op: ListOp,

    /// Attributes in authoring order
    pub attributes: Vec<Attribute>,

    pub children: Vec<PrimSpec>,
}

impl PrimSpec {
    pub fn new(name: impl Into<String>, type_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Author an attribute, replacing any existing one of the same name
    /// in place so authoring order stays stable.
    pub fn set_attribute(&mut self, attribute: Attribute) {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn child(&self, name: &str) -> Option<&PrimSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PrimSpec> {
        self.children.iter_mut().find(|c| c.name == name)
    }
}

/// Layer-level metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerMetadata {
    pub default_prim: Option<String>,
    pub doc: Option<String>,
    pub meters_per_unit: Option<f64>,
    pub up_axis: Option<String>,
    pub sub_layers: Vec<String>,
}

impl LayerMetadata {
    pub fn is_empty(&self) -> bool {
        self.default_prim.is_none()
            && self.doc.is_none()
            && self.meters_per_unit.is_none()
            && self.up_axis.is_none()
            && self.sub_layers.is_empty()
    }
}

/// The authored content of one layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layer {
    pub metadata: LayerMetadata,
    pub root_prims: Vec<PrimSpec>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the prim spec at `path`.
    pub fn prim_at(&self, path: &SdfPath) -> Option<&PrimSpec> {
        let (first, rest) = path.names().split_first()?;
        let mut prim = self.root_prims.iter().find(|p| &p.name == first)?;
        for name in rest {
            prim = prim.child(name)?;
        }
        Some(prim)
    }

    /// Find the prim spec at `path` for editing.
    pub fn prim_at_mut(&mut self, path: &SdfPath) -> Option<&mut PrimSpec> {
        let (first, rest) = path.names().split_first()?;
        let mut prim = self.root_prims.iter_mut().find(|p| &p.name == first)?;
        for name in rest {
            prim = prim.child_mut(name)?;
        }
        Some(prim)
    }

    /// Count of all prim specs in the layer.
    pub fn prim_count(&self) -> usize {
        fn count(prims: &[PrimSpec]) -> usize {
            prims.iter().map(|p| 1 + count(&p.children)).sum()
        }
        count(&self.root_prims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdf_path_valid() {
        let path = SdfPath::new("/World/Model_1").unwrap();
        assert_eq!(path.names(), ["World", "Model_1"]);
        assert_eq!(path.name(), "Model_1");
        assert_eq!(path.to_string(), "/World/Model_1");
        assert_eq!(path.parent().unwrap().to_string(), "/World");
        assert!(SdfPath::new("/Root").unwrap().parent().is_none());
    }

    #[test]
    fn test_sdf_path_invalid() {
        assert!(SdfPath::new("").is_none());
        assert!(SdfPath::new("/").is_none());
        assert!(SdfPath::new("Root").is_none());
        assert!(SdfPath::new("/World//Model").is_none());
        assert!(SdfPath::new("/1Model").is_none());
        assert!(SdfPath::new("/Model-A").is_none());
    }

    #[test]
    fn test_set_attribute_replaces_in_place() {
        let mut prim = PrimSpec::new("Root", Some("Xform"));
        prim.set_attribute(Attribute::new("a", "int", Value::Int(1)));
        prim.set_attribute(Attribute::new("b", "int", Value::Int(2)));
        prim.set_attribute(Attribute::new("a", "int", Value::Int(3)));

        assert_eq!(prim.attributes.len(), 2);
        assert_eq!(prim.attributes[0].name, "a");
        assert_eq!(prim.attributes[0].value, Some(Value::Int(3)));
    }

    #[test]
    fn test_layer_prim_lookup() {
        let mut world = PrimSpec::new("World", Some("Xform"));
        world.children.push(PrimSpec::new("Cube", Some("Mesh")));
        let layer = Layer {
            root_prims: vec![world],
            ..Default::default()
        };

        let cube = layer.prim_at(&SdfPath::new("/World/Cube").unwrap()).unwrap();
        assert_eq!(cube.type_name.as_deref(), Some("Mesh"));
        assert!(layer.prim_at(&SdfPath::new("/World/Sphere").unwrap()).is_none());
        assert_eq!(layer.prim_count(), 2);
    }
}
