//! # Typed Accessor Generation
//!
//! Rust has no runtime reflection over table schemas, so the typed accessor
//! layer is generated: one record struct per table whose fields positionally
//! match the column list, a [`crate::rows::FromRow`] impl per struct, and
//! one argument-builder per reducer. The generated module is a thin wrapper
//! over the row decoder and the schema-aware encoder; nothing in it is
//! load-bearing beyond name mapping.
//!
//! ```text
//! table "players" (id: u64, name: string)
//!          │ generate
//!          ▼
//! pub struct Players { pub id: u64, pub name: String }
//! impl FromRow for Players { ... }
//! ```
//!
//! Columns with composite types (arrays, options, products, sums) map to
//! [`crate::types::AlgebraicValue`] and pass through untyped; applications
//! that want richer shapes define their own `FromRow` impls.

use std::fmt::Write as _;

use crate::error::Result;
use crate::schema::Schema;
use crate::types::AlgebraicType;

/// Rust keywords that need escaping when they appear as column names.
const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "type", "unsafe", "use",
    "where", "while",
];

/// Generates a self-contained Rust module of typed accessors for `schema`.
pub fn generate(schema: &Schema) -> Result<String> {
    let mut out = String::new();
    out.push_str("// Generated by stdb-codegen. Do not edit.\n");
    out.push_str("#![allow(dead_code, clippy::all)]\n\n");
    out.push_str("use stdb_client::{AlgebraicValue, Error, Field, FromRow, Result, Row};\n\n");

    for table in &schema.tables {
        let struct_name = camel_case(&table.name);
        writeln!(out, "/// Row of the `{}` table.", table.name).unwrap();
        out.push_str("#[derive(Debug, Clone, PartialEq)]\n");
        writeln!(out, "pub struct {struct_name} {{").unwrap();
        for (idx, col) in table.columns.iter().enumerate() {
            let field = field_name(col.name.as_deref(), idx);
            writeln!(out, "    pub {field}: {},", rust_type(&col.ty)).unwrap();
        }
        out.push_str("}\n\n");

        writeln!(out, "impl FromRow for {struct_name} {{").unwrap();
        out.push_str("    fn from_row(row: &Row) -> Result<Self> {\n");
        out.push_str("        Ok(Self {\n");
        for (idx, col) in table.columns.iter().enumerate() {
            let field = field_name(col.name.as_deref(), idx);
            match value_variant(&col.ty) {
                Some(variant) => {
                    writeln!(
                        out,
                        "            {field}: match &row.fields[{idx}].value {{\n                \
                         AlgebraicValue::{variant}(v) => v.clone(),\n                \
                         other => return Err(Error::TypeMismatch {{\n                    \
                         expected: \"{}\".to_string(),\n                    \
                         got: other.case_name().to_string(),\n                \
                         }}),\n            }},",
                        col.ty.case_name()
                    )
                    .unwrap();
                }
                None => {
                    writeln!(out, "            {field}: row.fields[{idx}].value.clone(),")
                        .unwrap();
                }
            }
        }
        out.push_str("        })\n    }\n}\n\n");
    }

    for reducer in &schema.reducers {
        writeln!(out, "/// Arguments for the `{}` reducer.", reducer.name).unwrap();
        let fn_name = format!("{}_args", snake_case(&reducer.name));
        let params: Vec<String> = reducer
            .params
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                format!(
                    "{}: {}",
                    field_name(p.name.as_deref(), idx),
                    rust_type(&p.ty)
                )
            })
            .collect();
        writeln!(out, "pub fn {fn_name}({}) -> Vec<Field> {{", params.join(", ")).unwrap();
        out.push_str("    vec![\n");
        for (idx, p) in reducer.params.iter().enumerate() {
            let arg = field_name(p.name.as_deref(), idx);
            let wire_name = p.name.clone().unwrap_or_else(|| format!("f{idx}"));
            writeln!(
                out,
                "        Field::named(\"{wire_name}\", {}),",
                wrap_value(&p.ty, &arg)
            )
            .unwrap();
        }
        out.push_str("    ]\n}\n\n");
    }

    Ok(out)
}

/// The Rust type a column maps to. Composites pass through as values.
fn rust_type(ty: &AlgebraicType) -> &'static str {
    match ty {
        AlgebraicType::Bool => "bool",
        AlgebraicType::U8 => "u8",
        AlgebraicType::U16 => "u16",
        AlgebraicType::U32 => "u32",
        AlgebraicType::U64 => "u64",
        AlgebraicType::U128 => "u128",
        AlgebraicType::U256 => "stdb_client::U256Bits",
        AlgebraicType::I8 => "i8",
        AlgebraicType::I16 => "i16",
        AlgebraicType::I32 => "i32",
        AlgebraicType::I64 => "i64",
        AlgebraicType::I128 => "i128",
        AlgebraicType::I256 => "stdb_client::I256Bits",
        AlgebraicType::F32 => "f32",
        AlgebraicType::F64 => "f64",
        AlgebraicType::String => "String",
        AlgebraicType::Bytes => "Vec<u8>",
        _ => "AlgebraicValue",
    }
}

/// The `AlgebraicValue` variant a primitive column matches; `None` for
/// composites, which clone the value whole.
fn value_variant(ty: &AlgebraicType) -> Option<&'static str> {
    Some(match ty {
        AlgebraicType::Bool => "Bool",
        AlgebraicType::U8 => "U8",
        AlgebraicType::U16 => "U16",
        AlgebraicType::U32 => "U32",
        AlgebraicType::U64 => "U64",
        AlgebraicType::U128 => "U128",
        AlgebraicType::U256 => "U256",
        AlgebraicType::I8 => "I8",
        AlgebraicType::I16 => "I16",
        AlgebraicType::I32 => "I32",
        AlgebraicType::I64 => "I64",
        AlgebraicType::I128 => "I128",
        AlgebraicType::I256 => "I256",
        AlgebraicType::F32 => "F32",
        AlgebraicType::F64 => "F64",
        AlgebraicType::String => "String",
        AlgebraicType::Bytes => "Bytes",
        _ => return None,
    })
}

/// Expression wrapping a typed argument back into an `AlgebraicValue`.
fn wrap_value(ty: &AlgebraicType, arg: &str) -> String {
    match value_variant(ty) {
        Some(variant) => format!("AlgebraicValue::{variant}({arg})"),
        None => arg.to_string(),
    }
}

fn field_name(name: Option<&str>, idx: usize) -> String {
    match name {
        Some(name) => sanitize_ident(&snake_case(name)),
        None => format!("f{idx}"),
    }
}

fn sanitize_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c == '_' || c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    sanitize_ident(&out)
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_json(
            br#"{ "tables": [ { "name": "game_players",
                "columns": [ { "name": "id", "type": "u64" },
                             { "name": "name", "type": "string" },
                             { "name": "tags", "type": { "array": "string" } } ],
                "primary_key": [0] } ],
              "reducers": [ { "name": "setName",
                "params": [ { "name": "id", "type": "u64" },
                            { "name": "to", "type": "string" } ] } ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_generates_struct_and_from_row() {
        let code = generate(&schema()).unwrap();
        assert!(code.contains("pub struct GamePlayers {"));
        assert!(code.contains("pub id: u64,"));
        assert!(code.contains("pub name: String,"));
        // Composite column passes through as a value.
        assert!(code.contains("pub tags: AlgebraicValue,"));
        assert!(code.contains("impl FromRow for GamePlayers {"));
        assert!(code.contains("AlgebraicValue::U64(v) => v.clone(),"));
        assert!(code.contains("row.fields[2].value.clone(),"));
    }

    #[test]
    fn test_generates_reducer_args() {
        let code = generate(&schema()).unwrap();
        assert!(code.contains("pub fn set_name_args(id: u64, to: String) -> Vec<Field> {"));
        assert!(code.contains("Field::named(\"id\", AlgebraicValue::U64(id)),"));
        assert!(code.contains("Field::named(\"to\", AlgebraicValue::String(to)),"));
    }

    #[test]
    fn test_name_mapping() {
        assert_eq!(camel_case("game_players"), "GamePlayers");
        assert_eq!(camel_case("users"), "Users");
        assert_eq!(snake_case("setName"), "set_name");
        assert_eq!(sanitize_ident("type"), "type_");
        assert_eq!(sanitize_ident("9lives"), "_9lives");
        assert_eq!(sanitize_ident("with space"), "with_space");
    }

    #[test]
    fn test_generated_code_is_balanced() {
        // Cheap structural sanity for the emitted text.
        let code = generate(&schema()).unwrap();
        assert_eq!(
            code.matches('{').count(),
            code.matches('}').count(),
            "unbalanced braces in generated code"
        );
    }
}
