//! # Wire Protocol Framing
//!
//! This module defines both message families of the binary WebSocket
//! protocol and the one-byte compression envelope server frames arrive in.
//!
//! ## Frame Anatomy
//!
//! ```text
//! client → server:   [tag u8][body ...]                 (never enveloped)
//!
//! server → client:   [envelope u8][payload ...]
//!                     0x00 none    payload as-is (no copy)
//!                     0x01 brotli  payload = compressed inner message
//!                     0x02 gzip    payload = compressed inner message
//!                    inner message: [tag u8][body ...]
//! ```
//!
//! ## Ownership of Decoded Messages
//!
//! [`ServerMessage`] is parameterized over the frame's lifetime: composite
//! arrays (`table_update`, `query_set_update`) are owned, while leaf bytes —
//! the opaque `rows_data`, offset tables, reducer return payloads — borrow
//! the received frame. Callers materialize owned rows (via
//! [`crate::rows::decode_rows`]) before letting the frame go; the high-level
//! client does this inside `process_frame`.
//!
//! ## Decompression Collaborator
//!
//! Gzip and brotli live outside the core. [`Decompressor`] is the narrow
//! interface the core consumes; [`NoDecompression`] is the default and
//! fails any enveloped frame with `DecompressionFailed`. The uncompressed
//! envelope (`0x00`) never touches the collaborator and never copies.

use std::borrow::Cow;

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::rows::RowList;
use crate::types::{AuthToken, ConnectionId, Identity, QuerySetId, RequestId};

// =============================================================================
// Compression Envelope
// =============================================================================

/// Compression applied to a server frame's payload, and requested by the
/// client in the connect URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression; payload is the inner message.
    #[default]
    None,
    /// Brotli-compressed payload.
    Brotli,
    /// Gzip-compressed payload.
    Gzip,
}

impl Compression {
    /// The envelope byte for this algorithm.
    pub fn envelope_byte(&self) -> u8 {
        match self {
            Compression::None => 0x00,
            Compression::Brotli => 0x01,
            Compression::Gzip => 0x02,
        }
    }

    /// The spelling used in the connect URL's `compression` query parameter.
    pub fn query_param(&self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Brotli => "Brotli",
            Compression::Gzip => "Gzip",
        }
    }

    /// Parses an envelope byte.
    pub fn from_envelope_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Compression::None),
            0x01 => Ok(Compression::Brotli),
            0x02 => Ok(Compression::Gzip),
            other => Err(Error::UnknownCompression(other)),
        }
    }
}

/// The decompression collaborator: turns a compressed payload back into the
/// inner message bytes.
///
/// The core never links a compression library; implementations supply one.
pub trait Decompressor {
    /// Decompresses `data` per `algo`. Never called for
    /// [`Compression::None`].
    fn decompress(&self, algo: Compression, data: &[u8]) -> Result<Vec<u8>>;
}

/// Default collaborator for clients that request `compression=None`: any
/// enveloped frame is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecompression;

impl Decompressor for NoDecompression {
    fn decompress(&self, algo: Compression, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::DecompressionFailed(format!(
            "no decompressor configured for {algo:?}"
        )))
    }
}

/// Strips the envelope byte and produces the inner message bytes.
///
/// `0x00` borrows the payload without a copy; other envelopes dispatch to
/// the collaborator and yield an owned buffer. An empty frame is
/// [`Error::EmptyFrame`].
pub fn decompress_frame<'a>(
    frame: &'a [u8],
    decompressor: &dyn Decompressor,
) -> Result<Cow<'a, [u8]>> {
    let (&envelope, payload) = frame.split_first().ok_or(Error::EmptyFrame)?;
    match Compression::from_envelope_byte(envelope)? {
        Compression::None => Ok(Cow::Borrowed(payload)),
        algo => Ok(Cow::Owned(decompressor.decompress(algo, payload)?)),
    }
}

// =============================================================================
// Client Messages
// =============================================================================

/// Per-message flag requesting that `unsubscribe_applied` carry the rows the
/// subscription was holding.
pub const UNSUBSCRIBE_FLAG_SEND_DROPPED_ROWS: u8 = 0x01;

/// Client → server message family. One leading tag byte; no envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Tag 0: subscribe a query set.
    Subscribe {
        /// Correlates the eventual `subscribe_applied`.
        request_id: RequestId,
        /// Addresses the query set from now on.
        query_set_id: QuerySetId,
        /// SQL queries, transported uninterpreted.
        queries: Vec<String>,
    },
    /// Tag 1: drop a query set.
    Unsubscribe {
        /// Correlates the eventual `unsubscribe_applied`.
        request_id: RequestId,
        /// The set to drop.
        query_set_id: QuerySetId,
        /// Bit 0 requests the dropped rows back.
        flags: u8,
    },
    /// Tag 2: run one query outside any subscription.
    OneOffQuery {
        /// Correlates the eventual `one_off_query_result`.
        request_id: RequestId,
        /// The SQL text.
        query: String,
    },
    /// Tag 3: invoke a reducer. `args` is a BSATN product of the reducer's
    /// parameter types.
    CallReducer {
        /// Correlates the eventual `reducer_result`.
        request_id: RequestId,
        /// Reducer name.
        reducer: String,
        /// BSATN-encoded argument product.
        args: Vec<u8>,
    },
    /// Tag 4: invoke a procedure. Same shape as `CallReducer`.
    CallProcedure {
        /// Correlates the eventual `procedure_result`.
        request_id: RequestId,
        /// Procedure name.
        procedure: String,
        /// BSATN-encoded argument product.
        args: Vec<u8>,
    },
}

impl ClientMessage {
    /// Encodes the message for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        match self {
            ClientMessage::Subscribe {
                request_id,
                query_set_id,
                queries,
            } => {
                enc.put_u8(0);
                enc.put_u32(request_id.as_raw());
                enc.put_u32(query_set_id.as_raw());
                let count = u32::try_from(queries.len())
                    .map_err(|_| Error::Overflow(format!("{} queries", queries.len())))?;
                enc.put_u32(count);
                for query in queries {
                    enc.put_str(query)?;
                }
            }
            ClientMessage::Unsubscribe {
                request_id,
                query_set_id,
                flags,
            } => {
                enc.put_u8(1);
                enc.put_u32(request_id.as_raw());
                enc.put_u32(query_set_id.as_raw());
                enc.put_u8(*flags);
            }
            ClientMessage::OneOffQuery { request_id, query } => {
                enc.put_u8(2);
                enc.put_u32(request_id.as_raw());
                enc.put_str(query)?;
            }
            ClientMessage::CallReducer {
                request_id,
                reducer,
                args,
            } => {
                enc.put_u8(3);
                enc.put_u32(request_id.as_raw());
                // Flags byte is fixed to zero for reducer calls.
                enc.put_u8(0);
                enc.put_str(reducer)?;
                enc.put_bytes(args)?;
            }
            ClientMessage::CallProcedure {
                request_id,
                procedure,
                args,
            } => {
                enc.put_u8(4);
                enc.put_u32(request_id.as_raw());
                enc.put_u8(0);
                enc.put_str(procedure)?;
                enc.put_bytes(args)?;
            }
        }
        Ok(enc.into_bytes())
    }
}

// =============================================================================
// Server Message Composites
// =============================================================================

/// One table's rows inside a query-rows payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRows<'a> {
    /// The table the rows belong to.
    pub table_name: String,
    /// The rows, still in wire form.
    pub rows: RowList<'a>,
}

/// Rows grouped by table, as carried by `subscribe_applied`,
/// `unsubscribe_applied`, and one-off query results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRows<'a> {
    /// Per-table row lists.
    pub tables: Vec<TableRows<'a>>,
}

/// Row changes for one table inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TableUpdateRows<'a> {
    /// Tag 0: rows that live in the cache.
    Persistent {
        /// Rows the transaction inserted.
        inserts: RowList<'a>,
        /// Rows the transaction deleted.
        deletes: RowList<'a>,
    },
    /// Tag 1: transient rows, delivered but never cached.
    Event(RowList<'a>),
}

/// All changes to one table from one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TableUpdate<'a> {
    /// The table the changes apply to.
    pub table_name: String,
    /// Change groups in server order.
    pub rows: Vec<TableUpdateRows<'a>>,
}

/// Changes for one query set from one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySetUpdate<'a> {
    /// The query set observing the changes.
    pub query_set_id: QuerySetId,
    /// Per-table changes in server order.
    pub tables: Vec<TableUpdate<'a>>,
}

/// Result carried by `reducer_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerOutcome<'a> {
    /// Tag 0: the reducer returned a value and a transaction.
    Ok {
        /// BSATN-encoded return value; opaque to the core.
        return_value: &'a [u8],
        /// Row changes the reducer produced, applied to the cache exactly
        /// as a standalone `transaction_update` would be.
        transaction: Vec<QuerySetUpdate<'a>>,
    },
    /// Tag 1: success with nothing to report.
    OkEmpty,
    /// Tag 2: the reducer failed with an application payload.
    Err(&'a [u8]),
    /// Tag 3: the host failed running the reducer.
    InternalError(String),
}

/// Result carried by `one_off_query_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOffResult<'a> {
    /// Tag 0: the query produced rows.
    Rows(QueryRows<'a>),
    /// Tag 1: the query failed.
    Error(String),
}

/// Status carried by `procedure_result`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureStatus {
    /// Tag 0: the procedure returned a BSATN payload.
    Returned(Vec<u8>),
    /// Tag 1: the procedure ran past its budget.
    TimedOut,
    /// Tag 2: the procedure aborted with a message.
    Aborted(String),
    /// Tag 3: the host failed running the procedure.
    InternalError(String),
}

// =============================================================================
// Server Messages
// =============================================================================

/// Server → client message family, decoded after envelope stripping.
///
/// Lifetimes tie leaf byte slices to the frame buffer; see the module docs
/// for the ownership rules.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage<'a> {
    /// Tag 0: credentials for this connection.
    InitialConnection {
        /// The 256-bit identity.
        identity: Identity,
        /// The 128-bit connection id.
        connection_id: ConnectionId,
        /// The bearer token to present on reconnect.
        token: AuthToken,
    },
    /// Tag 1: a subscribe completed; initial rows follow.
    SubscribeApplied {
        /// Echo of the subscribe's request id.
        request_id: RequestId,
        /// The query set that became live.
        query_set_id: QuerySetId,
        /// The subscription's initial rows.
        rows: QueryRows<'a>,
    },
    /// Tag 2: an unsubscribe completed.
    UnsubscribeApplied {
        /// Echo of the unsubscribe's request id.
        request_id: RequestId,
        /// The query set that was dropped.
        query_set_id: QuerySetId,
        /// The dropped rows, when the unsubscribe asked for them.
        rows: Option<QueryRows<'a>>,
    },
    /// Tag 3: a subscription failed, at subscribe time or later.
    SubscriptionError {
        /// The failing subscribe's request id, absent for errors raised
        /// after the subscribe completed.
        request_id: Option<RequestId>,
        /// The query set involved.
        query_set_id: QuerySetId,
        /// Human-readable error.
        error: String,
    },
    /// Tag 4: row changes from one server transaction.
    TransactionUpdate {
        /// Changes grouped by query set.
        updates: Vec<QuerySetUpdate<'a>>,
    },
    /// Tag 5: the result of a one-off query.
    OneOffQueryResult {
        /// Echo of the query's request id.
        request_id: RequestId,
        /// Rows or an error.
        result: OneOffResult<'a>,
    },
    /// Tag 6: the result of a reducer call.
    ReducerResult {
        /// Echo of the call's request id.
        request_id: RequestId,
        /// Server-side timestamp.
        timestamp: i64,
        /// The outcome, possibly embedding a transaction.
        outcome: ReducerOutcome<'a>,
    },
    /// Tag 7: the result of a procedure call.
    ProcedureResult {
        /// The procedure's status.
        status: ProcedureStatus,
        /// Server-side timestamp.
        timestamp: i64,
        /// Host-measured execution duration.
        host_duration: i64,
        /// Echo of the call's request id.
        request_id: RequestId,
    },
}

impl<'a> ServerMessage<'a> {
    /// Decodes an inner message (envelope already stripped).
    pub fn decode(payload: &'a [u8]) -> Result<Self> {
        let mut dec = Decoder::new(payload);
        let tag = dec.get_u8().map_err(|_| Error::EmptyFrame)?;
        let msg = match tag {
            0 => {
                let identity_bytes: [u8; 32] = dec
                    .get_raw(32)?
                    .try_into()
                    .expect("sized read");
                let connection_bytes: [u8; 16] = dec
                    .get_raw(16)?
                    .try_into()
                    .expect("sized read");
                let token = dec.get_str()?.to_string();
                ServerMessage::InitialConnection {
                    identity: Identity::from_bytes(identity_bytes),
                    connection_id: ConnectionId::from_bytes(connection_bytes),
                    token: AuthToken::new(token),
                }
            }
            1 => ServerMessage::SubscribeApplied {
                request_id: RequestId::from_raw(dec.get_u32()?),
                query_set_id: QuerySetId::from_raw(dec.get_u32()?),
                rows: decode_query_rows(&mut dec)?,
            },
            2 => {
                let request_id = RequestId::from_raw(dec.get_u32()?);
                let query_set_id = QuerySetId::from_raw(dec.get_u32()?);
                let rows = match dec.get_u8()? {
                    0 => Some(decode_query_rows(&mut dec)?),
                    1 => None,
                    other => return Err(Error::InvalidOptionTag(other)),
                };
                ServerMessage::UnsubscribeApplied {
                    request_id,
                    query_set_id,
                    rows,
                }
            }
            3 => {
                let request_id = match dec.get_u8()? {
                    0 => Some(RequestId::from_raw(dec.get_u32()?)),
                    1 => None,
                    other => return Err(Error::InvalidOptionTag(other)),
                };
                ServerMessage::SubscriptionError {
                    request_id,
                    query_set_id: QuerySetId::from_raw(dec.get_u32()?),
                    error: dec.get_str()?.to_string(),
                }
            }
            4 => ServerMessage::TransactionUpdate {
                updates: decode_query_set_updates(&mut dec)?,
            },
            5 => {
                let request_id = RequestId::from_raw(dec.get_u32()?);
                let result = match dec.get_u8()? {
                    0 => OneOffResult::Rows(decode_query_rows(&mut dec)?),
                    1 => OneOffResult::Error(dec.get_str()?.to_string()),
                    other => return Err(Error::UnknownOneOffResult(other)),
                };
                ServerMessage::OneOffQueryResult { request_id, result }
            }
            6 => {
                let request_id = RequestId::from_raw(dec.get_u32()?);
                let timestamp = dec.get_i64()?;
                let outcome = match dec.get_u8()? {
                    0 => ReducerOutcome::Ok {
                        return_value: dec.get_bytes()?,
                        transaction: decode_query_set_updates(&mut dec)?,
                    },
                    1 => ReducerOutcome::OkEmpty,
                    2 => ReducerOutcome::Err(dec.get_bytes()?),
                    3 => ReducerOutcome::InternalError(dec.get_str()?.to_string()),
                    other => return Err(Error::UnknownReducerOutcome(other)),
                };
                ServerMessage::ReducerResult {
                    request_id,
                    timestamp,
                    outcome,
                }
            }
            7 => {
                let status = match dec.get_u8()? {
                    0 => ProcedureStatus::Returned(dec.get_bytes()?.to_vec()),
                    1 => ProcedureStatus::TimedOut,
                    2 => ProcedureStatus::Aborted(dec.get_str()?.to_string()),
                    3 => ProcedureStatus::InternalError(dec.get_str()?.to_string()),
                    other => return Err(Error::UnknownProcedureStatus(other)),
                };
                ServerMessage::ProcedureResult {
                    status,
                    timestamp: dec.get_i64()?,
                    host_duration: dec.get_i64()?,
                    request_id: RequestId::from_raw(dec.get_u32()?),
                }
            }
            other => return Err(Error::UnknownMessageTag(other)),
        };
        Ok(msg)
    }
}

fn decode_query_rows<'a>(dec: &mut Decoder<'a>) -> Result<QueryRows<'a>> {
    let count = dec.get_u32()? as usize;
    let mut tables = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let table_name = dec.get_str()?.to_string();
        let rows = RowList::decode(dec)?;
        tables.push(TableRows { table_name, rows });
    }
    Ok(QueryRows { tables })
}

fn decode_query_set_updates<'a>(dec: &mut Decoder<'a>) -> Result<Vec<QuerySetUpdate<'a>>> {
    let count = dec.get_u32()? as usize;
    let mut updates = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let query_set_id = QuerySetId::from_raw(dec.get_u32()?);
        let table_count = dec.get_u32()? as usize;
        let mut tables = Vec::with_capacity(table_count.min(1024));
        for _ in 0..table_count {
            let table_name = dec.get_str()?.to_string();
            let group_count = dec.get_u32()? as usize;
            let mut rows = Vec::with_capacity(group_count.min(1024));
            for _ in 0..group_count {
                rows.push(match dec.get_u8()? {
                    0 => TableUpdateRows::Persistent {
                        inserts: RowList::decode(dec)?,
                        deletes: RowList::decode(dec)?,
                    },
                    1 => TableUpdateRows::Event(RowList::decode(dec)?),
                    other => return Err(Error::UnknownTableUpdateTag(other)),
                });
            }
            tables.push(TableUpdate { table_name, rows });
        }
        updates.push(QuerySetUpdate {
            query_set_id,
            tables,
        });
    }
    Ok(updates)
}

// =============================================================================
// Tests
// =============================================================================
