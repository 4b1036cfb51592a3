//! # Client Cache
//!
//! The cache mirrors the subscribed view of the database: one keyed store
//! per table, driven by server messages, emitting an ordered change stream
//! for the application.
//!
//! ## Keying
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ ClientCache                                                   │
//! │   "users"  → TableStore { pk: [0] }                           │
//! │                 BSATN(id=1) → {id: 1, name: "Alice"}          │
//! │                 BSATN(id=2) → {id: 2, name: "Bob"}            │
//! │   "log"    → TableStore { pk: [] }    (no declared PK)        │
//! │                 BSATN(whole row) → {line: "..."}              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are the BSATN encoding of the primary-key columns in declaration
//! order, concatenated with no separator. A table without a declared
//! primary key is keyed by the encoding of the whole row: the store then
//! behaves as a set, and genuine updates degrade to delete+insert.
//!
//! ## Update Detection
//!
//! A transaction that deletes and reinserts the same primary key is one
//! logical update. The delete phase parks removed rows in a scratch map;
//! the insert phase matches against it:
//!
//! ```text
//! deletes: [{1, Alice}, {2, Bob}]      inserts: [{1, Alicia}]
//!
//!   scratch: {k1: Alice, k2: Bob}      k1 matched   → Update(Alice→Alicia)
//!                                      k2 unmatched → Delete(Bob)
//!
//!   emitted: [Update{1}, Delete{2}]    (insert order, then delete order)
//! ```
//!
//! Changes inside one transaction are emitted inserts/updates first in the
//! server's insert order, then unmatched deletes in the order the server
//! sent the deletes.
//!
//! ## Failure Handling
//!
//! Both row lists of a table update are fully decoded before the store is
//! touched, so a decode error rolls the operation back to the last
//! completed table update. Completed table updates from the same call stay
//! applied; their changes are discarded with the error, and callers
//! typically respond by disconnecting.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::codec::Encoder;
use crate::error::{Error, Result};
use crate::protocol::{QueryRows, QuerySetUpdate, TableUpdateRows};
use crate::rows::{decode_rows, Row};
use crate::schema::Schema;
use crate::types::AlgebraicValue;

// =============================================================================
// Changes
// =============================================================================

/// A single row-level event emitted by the cache.
///
/// Rows are owned: the change list stays valid independent of later cache
/// mutation, and dropping it frees exactly the rows it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A row became live in the cache.
    Insert {
        /// Table the row belongs to.
        table: String,
        /// The inserted row.
        row: Row,
    },
    /// A row left the cache.
    Delete {
        /// Table the row belonged to.
        table: String,
        /// The removed row (or the decoded delete payload when the cache
        /// held no matching entry).
        row: Row,
    },
    /// A row was replaced under the same primary key.
    Update {
        /// Table the row belongs to.
        table: String,
        /// The row that was in the cache.
        old: Row,
        /// The row that replaced it.
        new: Row,
    },
}

// =============================================================================
// Table Store
// =============================================================================

/// The keyed store for one table.
#[derive(Debug, Default)]
pub struct TableStore {
    rows: HashMap<Vec<u8>, Row>,
    pk_indices: Vec<usize>,
}

impl TableStore {
    fn new(pk_indices: Vec<usize>) -> Self {
        Self {
            rows: HashMap::new(),
            pk_indices,
        }
    }

    /// Computes the store key for a row: PK columns in declaration order,
    /// or the whole row when no PK is declared.
    fn key_of(&self, row: &Row) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        if self.pk_indices.is_empty() {
            for field in &row.fields {
                enc.encode_value(&field.value)?;
            }
        } else {
            for &idx in &self.pk_indices {
                let field = row.fields.get(idx).ok_or_else(|| {
                    Error::InvalidSchema(format!(
                        "primary key index {idx} out of range for row with {} fields",
                        row.fields.len()
                    ))
                })?;
                enc.encode_value(&field.value)?;
            }
        }
        Ok(enc.into_bytes())
    }

    /// Computes the store key for a caller-supplied primary-key value.
    ///
    /// Single-column keys take the bare value; composite keys take a
    /// product whose fields line up with the PK columns in order.
    fn key_of_pk_value(&self, pk: &AlgebraicValue) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        if self.pk_indices.len() <= 1 {
            enc.encode_value(pk)?;
        } else {
            match pk {
                AlgebraicValue::Product(fields) if fields.len() == self.pk_indices.len() => {
                    for field in fields {
                        enc.encode_value(&field.value)?;
                    }
                }
                other => {
                    return Err(Error::TypeMismatch {
                        expected: format!("product of {} pk columns", self.pk_indices.len()),
                        got: other.case_name().to_string(),
                    })
                }
            }
        }
        Ok(enc.into_bytes())
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// Client Cache
// =============================================================================

/// Per-table keyed store driven by server messages.
#[derive(Debug, Default)]
pub struct ClientCache {
    tables: HashMap<String, TableStore>,
}

impl ClientCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn store_for(&mut self, schema: &Schema, table: &str) -> Option<&mut TableStore> {
        let decl = schema.table(table)?;
        Some(
            self.tables
                .entry(table.to_string())
                .or_insert_with(|| TableStore::new(decl.primary_key.clone())),
        )
    }

    /// Applies a subscription's initial rows, emitting one `Insert` per row.
    ///
    /// Tables the schema does not declare are tolerated as no-ops.
    pub fn apply_subscribe_applied(
        &mut self,
        schema: &Schema,
        rows: &QueryRows<'_>,
    ) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for table_rows in &rows.tables {
            let Some(decl) = schema.table(&table_rows.table_name) else {
                warn!(table = %table_rows.table_name, "initial rows for unknown table, skipping");
                continue;
            };
            let decoded = decode_rows(&table_rows.rows, &decl.columns)?;
            let store = self
                .store_for(schema, &table_rows.table_name)
                .expect("declaration checked above");
            for row in decoded {
                let key = store.key_of(&row)?;
                store.rows.insert(key, row.clone());
                changes.push(Change::Insert {
                    table: table_rows.table_name.clone(),
                    row,
                });
            }
        }
        debug!(inserts = changes.len(), "applied initial subscription rows");
        Ok(changes)
    }

    /// Applies one transaction's row changes across query sets and tables.
    ///
    /// Emission order per persistent group: inserts/updates in the server's
    /// insert order, then unmatched deletes in the server's delete order.
    /// `Event` groups are transient: never stored, no change emitted.
    pub fn apply_transaction_update(
        &mut self,
        schema: &Schema,
        updates: &[QuerySetUpdate<'_>],
    ) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for query_set in updates {
            for table_update in &query_set.tables {
                let Some(decl) = schema.table(&table_update.table_name) else {
                    warn!(
                        table = %table_update.table_name,
                        "transaction update for unknown table, skipping"
                    );
                    continue;
                };

                // Decode every group of this table update before touching
                // the store: a decode failure must leave the table as it
                // was (all-or-nothing per table update).
                let mut decoded_groups = Vec::with_capacity(table_update.rows.len());
                for group in &table_update.rows {
                    match group {
                        TableUpdateRows::Persistent { inserts, deletes } => {
                            decoded_groups.push(Some((
                                decode_rows(inserts, &decl.columns)?,
                                decode_rows(deletes, &decl.columns)?,
                            )));
                        }
                        TableUpdateRows::Event(_) => decoded_groups.push(None),
                    }
                }

                let store = self
                    .store_for(schema, &table_update.table_name)
                    .expect("declaration checked above");

                for group in decoded_groups.into_iter().flatten() {
                    let (inserts, deletes) = group;

                    // Delete phase: park removed rows in the scratch map.
                    // `delete_order` preserves the server's delete order for
                    // the unmatched leftovers.
                    let mut scratch: HashMap<Vec<u8>, Row> = HashMap::new();
                    let mut delete_order: Vec<Vec<u8>> = Vec::with_capacity(deletes.len());
                    for deleted in deletes {
                        let key = store.key_of(&deleted)?;
                        let old = store.rows.remove(&key).unwrap_or(deleted);
                        if !scratch.contains_key(&key) {
                            delete_order.push(key.clone());
                        }
                        scratch.insert(key, old);
                    }

                    // Insert phase: a key parked in scratch is an update.
                    for inserted in inserts {
                        let key = store.key_of(&inserted)?;
                        if let Some(old) = scratch.remove(&key) {
                            store.rows.insert(key, inserted.clone());
                            changes.push(Change::Update {
                                table: table_update.table_name.clone(),
                                old,
                                new: inserted,
                            });
                        } else {
                            store.rows.insert(key, inserted.clone());
                            changes.push(Change::Insert {
                                table: table_update.table_name.clone(),
                                row: inserted,
                            });
                        }
                    }

                    // Whatever stayed parked is a genuine delete.
                    for key in delete_order {
                        if let Some(old) = scratch.remove(&key) {
                            changes.push(Change::Delete {
                                table: table_update.table_name.clone(),
                                row: old,
                            });
                        }
                    }
                }
            }
        }
        debug!(changes = changes.len(), "applied transaction update");
        Ok(changes)
    }

    /// Fresh owned snapshot of every row in a table, for cross-thread reads.
    pub fn get_all(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|store| store.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live rows in a table.
    pub fn count(&self, table: &str) -> usize {
        self.tables.get(table).map(TableStore::len).unwrap_or(0)
    }

    /// Looks up one row by primary-key value, returning an owned copy.
    pub fn find(&self, table: &str, pk: &AlgebraicValue) -> Result<Option<Row>> {
        let Some(store) = self.tables.get(table) else {
            return Ok(None);
        };
        let key = store.key_of_pk_value(pk)?;
        Ok(store.rows.get(&key).cloned())
    }

    /// True when no table holds any row.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(TableStore::is_empty)
    }

    #[cfg(test)]
    fn key_invariant_holds(&self) -> bool {
        self.tables.values().all(|store| {
            store
                .rows
                .iter()
                .all(|(key, row)| store.key_of(row).map(|k| &k == key).unwrap_or(false))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
