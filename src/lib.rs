//! # stdb-client - Streaming Database Client
//!
//! A client library for a database that streams row-level changes to
//! subscribed clients over a binary WebSocket protocol. It provides:
//!
//! - **BSATN codec**: a typed, length-prefixed, little-endian wire format
//! - **Subscriptions**: SQL query sets whose results stream as row changes
//! - **Local cache**: a per-table mirror of the subscribed view, with
//!   delete+insert collapsed into update events
//! - **Reducer calls**: server-side procedures invoked by name with typed
//!   arguments
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Application                               │
//! │          (EventHandler callbacks, cache snapshots)              │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     DbClient (one consumer)                     │
//! │                                                                 │
//! │  ┌──────────────┐  ┌─────────────┐  ┌───────────────────────┐  │
//! │  │  Connection  │  │ ClientCache │  │  Schema + Codec       │  │
//! │  │ state machine│  │ change      │  │  (BSATN, row lists)   │  │
//! │  │ ids, backoff │  │ detection   │  │                       │  │
//! │  └──────────────┘  └─────────────┘  └───────────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Transport (binary WebSocket)                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! These invariants are enforced throughout the codebase:
//!
//! 1. **Round-trip fidelity**: `decode(T, encode(v)) == v` for every value
//!    whose type is fully resolved
//! 2. **Single consumer**: cache and subscription state are touched only by
//!    the thread driving the receive loop
//! 3. **Key coherence**: every cached row sits under the BSATN encoding of
//!    its own primary-key columns
//! 4. **Ordered delivery**: row callbacks follow the cache's deterministic
//!    emission order, and frames are processed in arrival order
//! 5. **Monotonic ids**: request and query-set ids start at 1 and strictly
//!    increase within a connection
//!
//! ## Module Organization
//!
//! - [`error`]: Custom error types for all failure modes
//! - [`types`]: Algebraic types/values and connection identifiers
//! - [`codec`]: BSATN encoder/decoder and schema-aware value encoding
//! - [`schema`]: Schema model, JSON descriptor parsing, ref resolution
//! - [`rows`]: Zero-copy row lists and row decoding
//! - [`protocol`]: Client/server message families, compression envelope
//! - [`cache`]: Per-table keyed store with change detection
//! - [`connection`]: Connection state machine, request ids, backoff
//! - [`client`]: High-level client and event handler dispatch
//! - [`transport`]: Transport trait and the WebSocket implementation
//! - [`http`]: REST endpoint surface over a pluggable HTTP transport
//! - [`creds`]: On-disk credential persistence
//! - [`codegen`]: Typed accessor generation (used by the CLI)

/// Error types for client operations.
pub mod error;

/// Algebraic types, algebraic values, and connection identifiers.
pub mod types;

/// BSATN encoding and decoding.
///
/// This module provides the binary codec underlying every wire value, plus
/// the schema-aware encoding used for reducer arguments.
pub mod codec;

/// Schema model and JSON descriptor parsing.
///
/// Typespace references are resolved here, once, at load time.
pub mod schema;

/// Row lists and row decoding.
///
/// Server row payloads arrive as concatenated blobs; this module splits
/// them zero-copy and materializes typed rows.
pub mod rows;

/// Wire protocol message families.
///
/// Client messages encode with a leading tag byte; server messages decode
/// after a one-byte compression envelope is stripped.
pub mod protocol;

/// The client cache.
///
/// A per-table keyed store driven by server transactions, detecting
/// delete+insert with identical primary key as a single update event and
/// emitting an ordered change stream.
pub mod cache;

/// Connection lifecycle state machine.
///
/// Pure state: transitions, id allocation, and backoff math live here;
/// the high-level client drives them against a real transport.
pub mod connection;

/// The high-level client.
///
/// Orchestrates subscribe, reducer calls, frame processing, cache
/// application, and application callbacks. The main entry point is
/// [`DbClient`](client::DbClient).
pub mod client;

/// Transport abstraction and the WebSocket implementation.
pub mod transport;

/// HTTP REST surface over a pluggable transport.
pub mod http;

/// On-disk credential persistence.
pub mod creds;

/// Typed accessor generation from a schema.
pub mod codegen;

pub use client::{
    ClientHandle, DbClient, EventHandler, NullHandler, QueryResult, ReducerStatus, TableRowSet,
};
pub use error::{Error, Result};
pub use schema::{ReducerSchema, Schema, TableSchema};

// Re-export the types that appear in almost every signature.
pub use types::{
    AlgebraicType, AlgebraicValue, AuthToken, Column, ConnectionId, Field, I256Bits, Identity,
    QuerySetId, RequestId, U256Bits,
};

// Re-export the wire-facing surface.
pub use cache::{Change, ClientCache};
pub use codec::{Decoder, Encoder};
pub use connection::{BackoffPolicy, Connection, ConnectionConfig, ConnectionState};
pub use protocol::{ClientMessage, Compression, Decompressor, ProcedureStatus, ServerMessage};
pub use rows::{FromRow, Row, RowList, SizeHint};
pub use transport::{Transport, TransportEvent, WsTransport};
