//! USDA (ASCII) layer writer.
//!
//! Produces the text form of a [`Layer`]:
//!
//! ```text
//! #usda 1.0
//! (
//!     defaultPrim = "Root"
//! )
//!
//! def Xform "Root" (
//!     prepend references = @./model.usda@
//! )
//! {
//!     double3 xformOp:translate = (1, 2, 3)
//!     uniform token[] xformOpOrder = ["xformOp:translate"]
//! }
//! ```

use std::fmt::Write;

use super::types::*;

const INDENT: &str = "    ";

/// Serialize a layer to USDA text.
pub fn write_layer(layer: &Layer) -> String {
    let mut out = String::from("#usda 1.0\n");

    if !layer.metadata.is_empty() {
        write_layer_metadata(&mut out, &layer.metadata);
    }

    for prim in &layer.root_prims {
        out.push('\n');
        write_prim(&mut out, prim, 0);
    }

    out
}

fn write_layer_metadata(out: &mut String, metadata: &LayerMetadata) {
    out.push_str("(\n");

    if let Some(default_prim) = &metadata.default_prim {
        let _ = writeln!(out, "{INDENT}defaultPrim = {}", quote(default_prim));
    }
    if let Some(doc) = &metadata.doc {
        let _ = writeln!(out, "{INDENT}doc = {}", quote(doc));
    }
    if let Some(mpu) = metadata.meters_per_unit {
        let _ = writeln!(out, "{INDENT}metersPerUnit = {}", format_double(mpu));
    }
    if !metadata.sub_layers.is_empty() {
        let _ = writeln!(out, "{INDENT}subLayers = [");
        let last = metadata.sub_layers.len() - 1;
        for (i, layer) in metadata.sub_layers.iter().enumerate() {
            let sep = if i == last { "" } else { "," };
            let _ = writeln!(out, "{INDENT}{INDENT}{}{}", format_asset(layer), sep);
        }
        let _ = writeln!(out, "{INDENT}]");
    }
    if let Some(up_axis) = &metadata.up_axis {
        let _ = writeln!(out, "{INDENT}upAxis = {}", quote(up_axis));
    }

    out.push_str(")\n");
}

fn write_prim(out: &mut String, prim: &PrimSpec, depth: usize) {
    let pad = INDENT.repeat(depth);

    let _ = write!(out, "{pad}{} ", prim.specifier.keyword());
    if let Some(type_name) = &prim.type_name {
        let _ = write!(out, "{} ", type_name);
    }
    let _ = write!(out, "{}", quote(&prim.name));

    let has_metadata =
        prim.kind.is_some() || !prim.references.is_empty() || !prim.payloads.is_empty();
    if has_metadata {
        out.push_str(" (\n");
        if let Some(kind) = &prim.kind {
            let _ = writeln!(out, "{pad}{INDENT}kind = {}", quote(kind));
        }
        if !prim.payloads.is_empty() {
            let _ = writeln!(
                out,
                "{pad}{INDENT}{}payload = {}",
                prim.payload_op.prefix(),
                format_arcs(&prim.payloads)
            );
        }
        if !prim.references.is_empty() {
            let _ = writeln!(
                out,
                "{pad}{INDENT}{}references = {}",
                prim.reference_op.prefix(),
                format_arcs(&prim.references)
            );
        }
        let _ = write!(out, "{pad})");
    }

    let _ = writeln!(out, "\n{pad}{{");

    for attribute in &prim.attributes {
        write_attribute(out, attribute, depth + 1);
    }

    for (i, child) in prim.children.iter().enumerate() {
        if i > 0 || !prim.attributes.is_empty() {
            out.push('\n');
        }
        write_prim(out, child, depth + 1);
    }

    let _ = writeln!(out, "{pad}}}");
}

fn write_attribute(out: &mut String, attribute: &Attribute, depth: usize) {
    let pad = INDENT.repeat(depth);
    let uniform = match attribute.variability {
        Variability::Uniform => "uniform ",
        Variability::Varying => "",
    };

    let _ = write!(out, "{pad}{uniform}{} {}", attribute.type_name, attribute.name);
    if let Some(value) = &attribute.value {
        let _ = write!(out, " = {}", format_value(value));
    }
    out.push('\n');
}

fn format_arcs(arcs: &[Reference]) -> String {
    let formatted: Vec<String> = arcs.iter().map(format_arc).collect();
    if formatted.len() == 1 {
        formatted.into_iter().next().unwrap_or_default()
    } else {
        format!("[{}]", formatted.join(", "))
    }
}

fn format_arc(arc: &Reference) -> String {
    match &arc.prim_path {
        Some(prim_path) => format!("{}<{}>", format_asset(&arc.asset_path), prim_path),
        None => format_asset(&arc.asset_path),
    }
}

/// Delimit an asset path. Paths containing `@` need the triple form.
pub fn format_asset(path: &str) -> String {
    if path.contains('@') {
        format!("@@@{}@@@", path)
    } else {
        format!("@{}@", path)
    }
}

/// Format a value the way it appears after `=` in USDA.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Double(d) => format_double(*d),
        Value::Double3(v) => format_tuple(&[v.x, v.y, v.z]),
        Value::Float3(v) => format_float3(v.x, v.y, v.z),
        Value::Token(s) | Value::String(s) => quote(s),
        Value::Asset(path) => format_asset(path),
        Value::IntArray(values) => {
            let items: Vec<String> = values.iter().map(|i| i.to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        Value::TokenArray(tokens) => {
            let items: Vec<String> = tokens.iter().map(|t| quote(t)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Point3fArray(points) => {
            let items: Vec<String> = points
                .iter()
                .map(|p| format_float3(p.x, p.y, p.z))
                .collect();
            format!("[{}]", items.join(", "))
        }
        Value::Raw(text) => text.clone(),
    }
}

fn format_tuple(components: &[f64]) -> String {
    let items: Vec<String> = components.iter().map(|c| format_double(*c)).collect();
    format!("({})", items.join(", "))
}

fn format_float3(x: f32, y: f32, z: f32) -> String {
    let items: Vec<String> = [x, y, z].iter().map(|c| format_float(*c)).collect();
    format!("({})", items.join(", "))
}

fn format_float(value: f32) -> String {
    match non_finite(value as f64) {
        Some(text) => text.to_string(),
        None if use_exponent(value as f64) => format!("{:e}", value),
        None => value.to_string(),
    }
}

/// Shortest round-trip form; USD spells non-finite values `nan`, `inf`, `-inf`.
///
/// Magnitudes of 1e21 and above or below 1e-6 are written with an exponent.
pub fn format_double(value: f64) -> String {
    match non_finite(value) {
        Some(text) => text.to_string(),
        None if use_exponent(value) => format!("{:e}", value),
        None => value.to_string(),
    }
}

fn use_exponent(value: f64) -> bool {
    let magnitude = value.abs();
    magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude)
}

fn non_finite(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("nan")
    } else if value == f64::INFINITY {
        Some("inf")
    } else if value == f64::NEG_INFINITY {
        Some("-inf")
    } else {
        None
    }
}

/// Quote and escape a string or token value.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
