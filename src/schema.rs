//! # Schema Model
//!
//! This module parses the server's JSON schema descriptor into a fully
//! resolved model: tables, reducers, and a typespace. The descriptor is the
//! one JSON surface of the protocol; everything after it is binary.
//!
//! ## Descriptor Shape
//!
//! ```json
//! {
//!   "typespace": [
//!     { "product": [ { "name": "id", "type": "u64" },
//!                    { "name": "name", "type": "string" } ] }
//!   ],
//!   "tables": [
//!     { "name": "players",
//!       "columns": [ { "name": "id", "type": "u64" },
//!                    { "name": "name", "type": "string" } ],
//!       "primary_key": [0] }
//!   ],
//!   "reducers": [
//!     { "name": "rename", "params": [ { "name": "id", "type": "u64" },
//!                                     { "name": "to", "type": "string" } ] }
//!   ]
//! }
//! ```
//!
//! Types are either a primitive name (`"u32"`, `"string"`, ...) or a
//! one-key object: `{"array": T}`, `{"option": T}`, `{"product": [cols]}`,
//! `{"sum": [variants]}`, `{"ref": N}`.
//!
//! ## Reference Resolution
//!
//! `ref` indirections into the typespace are expanded here, at load time.
//! Every `ref` must resolve to a non-`ref` type; out-of-range indices and
//! cycles are [`Error::InvalidTypeRef`]. Downstream code (codec, rows,
//! cache) never observes an unresolved `ref` — that is this module's
//! contract, checked once instead of defended against everywhere.
//!
//! ## Validation
//!
//! - Primary-key indices are all within `[0, columns.len)`.
//! - Table and reducer names are unique within their list.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{AlgebraicType, Column};

// =============================================================================
// Resolved Model
// =============================================================================

/// A table declaration: name, column list, and primary-key column indices.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Table name, unique within the schema.
    pub name: String,
    /// Columns in declaration order. Types contain no `Ref`.
    pub columns: Vec<Column>,
    /// Indices into `columns` forming the primary key, in declaration
    /// order. Empty when the table declares no primary key.
    pub primary_key: Vec<usize>,
}

/// A reducer declaration: name plus parameter columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerSchema {
    /// Reducer name, unique within the schema.
    pub name: String,
    /// Parameters in declaration order. Types contain no `Ref`.
    pub params: Vec<Column>,
}

/// The fully resolved schema: tables, reducers, and the typespace the
/// descriptor's `ref`s pointed into.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Tables in descriptor order.
    pub tables: Vec<TableSchema>,
    /// Reducers in descriptor order.
    pub reducers: Vec<ReducerSchema>,
    /// Resolved typespace. Kept for diagnostics; `tables` and `reducers`
    /// are already expanded.
    pub typespace: Vec<AlgebraicType>,
}

impl Schema {
    /// Parses and resolves a JSON schema descriptor.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let raw: RawSchema = serde_json::from_slice(json)?;
        Self::from_raw(raw)
    }

    /// Looks up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Looks up a reducer by name.
    pub fn reducer(&self, name: &str) -> Option<&ReducerSchema> {
        self.reducers.iter().find(|r| r.name == name)
    }

    fn from_raw(raw: RawSchema) -> Result<Self> {
        // Resolve the typespace first; table and reducer types may ref it.
        let mut typespace = Vec::with_capacity(raw.typespace.len());
        for (index, raw_ty) in raw.typespace.iter().enumerate() {
            let ty = resolve_type(raw_ty, &raw.typespace, &mut vec![index])?;
            typespace.push(ty);
        }

        let mut tables = Vec::with_capacity(raw.tables.len());
        for raw_table in &raw.tables {
            let columns = resolve_columns(&raw_table.columns, &raw.typespace)?;
            for &pk in &raw_table.primary_key {
                if pk >= columns.len() {
                    return Err(Error::InvalidSchema(format!(
                        "table '{}': primary key index {} out of range (columns: {})",
                        raw_table.name,
                        pk,
                        columns.len()
                    )));
                }
            }
            if tables.iter().any(|t: &TableSchema| t.name == raw_table.name) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate table name '{}'",
                    raw_table.name
                )));
            }
            tables.push(TableSchema {
                name: raw_table.name.clone(),
                columns,
                primary_key: raw_table.primary_key.clone(),
            });
        }

        let mut reducers = Vec::with_capacity(raw.reducers.len());
        for raw_reducer in &raw.reducers {
            if reducers
                .iter()
                .any(|r: &ReducerSchema| r.name == raw_reducer.name)
            {
                return Err(Error::InvalidSchema(format!(
                    "duplicate reducer name '{}'",
                    raw_reducer.name
                )));
            }
            reducers.push(ReducerSchema {
                name: raw_reducer.name.clone(),
                params: resolve_columns(&raw_reducer.params, &raw.typespace)?,
            });
        }

        Ok(Self {
            tables,
            reducers,
            typespace,
        })
    }
}

// =============================================================================
// Raw Descriptor (serde side)
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default)]
    typespace: Vec<RawType>,
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    reducers: Vec<RawReducer>,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    name: String,
    columns: Vec<RawColumn>,
    #[serde(default)]
    primary_key: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct RawReducer {
    name: String,
    #[serde(default)]
    params: Vec<RawColumn>,
}

#[derive(Debug, Deserialize)]
struct RawColumn {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: RawType,
}

/// A type in the descriptor: a primitive name or a one-key composite.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawType {
    Prim(String),
    Composite(RawComposite),
}

#[derive(Debug, Deserialize)]
struct RawComposite {
    #[serde(default)]
    array: Option<Box<RawType>>,
    #[serde(default)]
    option: Option<Box<RawType>>,
    #[serde(default)]
    product: Option<Vec<RawColumn>>,
    #[serde(default)]
    sum: Option<Vec<RawColumn>>,
    #[serde(default, rename = "ref")]
    type_ref: Option<usize>,
}

// =============================================================================
// Resolution
// =============================================================================

/// Expands one raw type, following `ref`s through the raw typespace.
///
/// `visiting` carries the typespace indices on the current resolution path;
/// re-entering one is a cycle.
fn resolve_type(
    raw: &RawType,
    typespace: &[RawType],
    visiting: &mut Vec<usize>,
) -> Result<AlgebraicType> {
    match raw {
        RawType::Prim(name) => prim_type(name),
        RawType::Composite(c) => {
            if let Some(inner) = &c.array {
                return Ok(AlgebraicType::Array(Box::new(resolve_type(
                    inner, typespace, visiting,
                )?)));
            }
            if let Some(inner) = &c.option {
                return Ok(AlgebraicType::Option(Box::new(resolve_type(
                    inner, typespace, visiting,
                )?)));
            }
            if let Some(cols) = &c.product {
                return Ok(AlgebraicType::Product(resolve_columns_inner(
                    cols, typespace, visiting,
                )?));
            }
            if let Some(variants) = &c.sum {
                return Ok(AlgebraicType::Sum(resolve_columns_inner(
                    variants, typespace, visiting,
                )?));
            }
            if let Some(index) = c.type_ref {
                let target = typespace.get(index).ok_or(Error::InvalidTypeRef {
                    index,
                    reason: format!("typespace has {} entries", typespace.len()),
                })?;
                if visiting.contains(&index) {
                    return Err(Error::InvalidTypeRef {
                        index,
                        reason: "cyclic reference".to_string(),
                    });
                }
                visiting.push(index);
                let resolved = resolve_type(target, typespace, visiting)?;
                visiting.pop();
                return Ok(resolved);
            }
            Err(Error::UnknownType("<empty composite>".to_string()))
        }
    }
}

fn resolve_columns(cols: &[RawColumn], typespace: &[RawType]) -> Result<Vec<Column>> {
    resolve_columns_inner(cols, typespace, &mut Vec::new())
}

fn resolve_columns_inner(
    cols: &[RawColumn],
    typespace: &[RawType],
    visiting: &mut Vec<usize>,
) -> Result<Vec<Column>> {
    cols.iter()
        .map(|c| {
            Ok(Column {
                name: c.name.clone(),
                ty: resolve_type(&c.ty, typespace, visiting)?,
            })
        })
        .collect()
}

fn prim_type(name: &str) -> Result<AlgebraicType> {
    Ok(match name {
        "bool" => AlgebraicType::Bool,
        "u8" => AlgebraicType::U8,
        "u16" => AlgebraicType::U16,
        "u32" => AlgebraicType::U32,
        "u64" => AlgebraicType::U64,
        "u128" => AlgebraicType::U128,
        "u256" => AlgebraicType::U256,
        "i8" => AlgebraicType::I8,
        "i16" => AlgebraicType::I16,
        "i32" => AlgebraicType::I32,
        "i64" => AlgebraicType::I64,
        "i128" => AlgebraicType::I128,
        "i256" => AlgebraicType::I256,
        "f32" => AlgebraicType::F32,
        "f64" => AlgebraicType::F64,
        "string" => AlgebraicType::String,
        "bytes" => AlgebraicType::Bytes,
        other => return Err(Error::UnknownType(other.to_string())),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "typespace": [
            { "product": [ { "name": "x", "type": "f32" },
                           { "name": "y", "type": "f32" } ] }
        ],
        "tables": [
            { "name": "players",
              "columns": [ { "name": "id", "type": "u64" },
                           { "name": "name", "type": "string" },
                           { "name": "pos", "type": { "ref": 0 } } ],
              "primary_key": [0] },
            { "name": "log",
              "columns": [ { "name": "line", "type": "string" } ] }
        ],
        "reducers": [
            { "name": "rename",
              "params": [ { "name": "id", "type": "u64" },
                          { "name": "to", "type": "string" } ] }
        ]
    }"#;

    #[test]
    fn test_parse_and_resolve() {
        let schema = Schema::from_json(DESCRIPTOR.as_bytes()).unwrap();
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.reducers.len(), 1);

        let players = schema.table("players").unwrap();
        assert_eq!(players.primary_key, vec![0]);
        assert_eq!(players.columns.len(), 3);
        assert_eq!(players.columns[0].ty, AlgebraicType::U64);

        // The ref expanded into the typespace's product.
        match &players.columns[2].ty {
            AlgebraicType::Product(cols) => {
                assert_eq!(cols.len(), 2);
                assert_eq!(cols[0].name.as_deref(), Some("x"));
                assert_eq!(cols[0].ty, AlgebraicType::F32);
            }
            other => panic!("ref did not resolve to product: {other:?}"),
        }

        let log = schema.table("log").unwrap();
        assert!(log.primary_key.is_empty());

        assert!(schema.table("missing").is_none());
        assert_eq!(schema.reducer("rename").unwrap().params.len(), 2);
    }

    #[test]
    fn test_resolved_types_contain_no_refs() {
        let schema = Schema::from_json(DESCRIPTOR.as_bytes()).unwrap();
        for table in &schema.tables {
            for col in &table.columns {
                assert!(!col.ty.contains_ref(), "unresolved ref in {}", table.name);
            }
        }
        for reducer in &schema.reducers {
            for param in &reducer.params {
                assert!(!param.ty.contains_ref());
            }
        }
        for ty in &schema.typespace {
            assert!(!ty.contains_ref());
        }
    }

    #[test]
    fn test_ref_out_of_range() {
        let json = r#"{ "tables": [ { "name": "t",
            "columns": [ { "name": "a", "type": { "ref": 7 } } ] } ] }"#;
        let err = Schema::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidTypeRef { index: 7, .. }));
    }

    #[test]
    fn test_ref_cycle() {
        let json = r#"{
            "typespace": [ { "ref": 1 }, { "ref": 0 } ],
            "tables": []
        }"#;
        let err = Schema::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidTypeRef { .. }));
    }

    #[test]
    fn test_pk_index_out_of_range() {
        let json = r#"{ "tables": [ { "name": "t",
            "columns": [ { "name": "a", "type": "u8" } ],
            "primary_key": [3] } ] }"#;
        let err = Schema::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_duplicate_table_name() {
        let json = r#"{ "tables": [
            { "name": "t", "columns": [ { "name": "a", "type": "u8" } ] },
            { "name": "t", "columns": [ { "name": "b", "type": "u8" } ] }
        ] }"#;
        let err = Schema::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_unknown_primitive() {
        let json = r#"{ "tables": [ { "name": "t",
            "columns": [ { "name": "a", "type": "u7" } ] } ] }"#;
        let err = Schema::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::UnknownType(name) if name == "u7"));
    }

    #[test]
    fn test_not_json() {
        let err = Schema::from_json(b"{oops").unwrap_err();
        assert!(matches!(err, Error::InvalidJson(_)));
    }
}
