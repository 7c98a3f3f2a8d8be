//! Common transform API.
//!
//! Authors translate, rotate and scale xformOps on a transformable prim
//! without touching raw op lists. The op order is always the common one:
//! translate, rotate, scale.

use mythica_math::{DVec3, Vec3};

use super::stage::{StageError, StageResult};
use super::types::*;

pub const TRANSLATE_OP: &str = "xformOp:translate";
pub const ROTATE_XYZ_OP: &str = "xformOp:rotateXYZ";
pub const SCALE_OP: &str = "xformOp:scale";
pub const XFORM_OP_ORDER: &str = "xformOpOrder";

/// Canonical position of each op in `xformOpOrder`.
const COMMON_OP_ORDER: [&str; 3] = [TRANSLATE_OP, ROTATE_XYZ_OP, SCALE_OP];

/// Prim types that carry xformOps.
const XFORMABLE_TYPES: &[&str] = &[
    "Xform",
    "Mesh",
    "BasisCurves",
    "Points",
    "PointInstancer",
    "Camera",
    "Cube",
    "Sphere",
    "Cylinder",
    "Cone",
    "Capsule",
    "Plane",
    "SkelRoot",
    "DistantLight",
    "DomeLight",
    "RectLight",
    "SphereLight",
    "DiskLight",
    "CylinderLight",
];

/// Check whether a prim type can be transformed.
pub fn is_xformable(type_name: Option<&str>) -> bool {
    type_name.is_some_and(|t| XFORMABLE_TYPES.contains(&t))
}

/// Rotation order for Euler rotations. Only XYZ is authored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RotationOrder {
    #[default]
    XYZ,
}

/// Transform convenience wrapper around one prim.
pub struct XformCommonApi<'a> {
    prim: &'a mut PrimSpec,
}

impl<'a> XformCommonApi<'a> {
    /// Wrap a prim. Fails if its type cannot carry transforms.
    pub fn new(prim: &'a mut PrimSpec) -> StageResult<Self> {
        if !is_xformable(prim.type_name.as_deref()) {
            return Err(StageError::NotXformable {
                prim: prim.name.clone(),
                type_name: prim.type_name.clone(),
            });
        }
        Ok(Self { prim })
    }

    /// Set the translation as a double-precision vector.
    pub fn set_translate(&mut self, translation: DVec3) {
        log::debug!("Setting translate on {} to {:?}", self.prim.name, translation);
        self.set_op(TRANSLATE_OP, "double3", Value::Double3(translation));
    }

    /// Set the Euler rotation in degrees.
    pub fn set_rotate(&mut self, degrees: Vec3, order: RotationOrder) {
        match order {
            RotationOrder::XYZ => self.set_op(ROTATE_XYZ_OP, "float3", Value::Float3(degrees)),
        }
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.set_op(SCALE_OP, "float3", Value::Float3(scale));
    }

    /// The authored translation, if any.
    pub fn get_translate(&self) -> Option<DVec3> {
        match self.prim.attribute(TRANSLATE_OP)?.value {
            Some(Value::Double3(t)) => Some(t),
            _ => None,
        }
    }

    /// The authored op order.
    pub fn xform_op_order(&self) -> Vec<String> {
        match self.prim.attribute(XFORM_OP_ORDER).and_then(|a| a.value.as_ref()) {
            Some(Value::TokenArray(ops)) => ops.clone(),
            _ => Vec::new(),
        }
    }

    fn set_op(&mut self, op_name: &str, type_name: &str, value: Value) {
        self.prim.set_attribute(Attribute::new(op_name, type_name, value));

        let mut order = self.xform_op_order();
        if !order.iter().any(|op| op == op_name) {
            order.push(op_name.to_string());
        }
        order.sort_by_key(|op| {
            COMMON_OP_ORDER
                .iter()
                .position(|common| *common == op.as_str())
                .unwrap_or(COMMON_OP_ORDER.len())
        });

        self.prim.set_attribute(
            Attribute::new(XFORM_OP_ORDER, "token[]", Value::TokenArray(order)).uniform(),
        );
    }
}
