//! # Error Handling
//!
//! This module defines the error types used throughout the client. We use a
//! single error enum ([`Error`]) to represent all failure modes, which keeps
//! function signatures simple and lets callers handle errors uniformly.
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Codec | Short buffer, bad bool/option/sum tag | Drop the frame, report `on_error` |
//! | Framing | Unknown compression or message tag | Drop the frame, report `on_error` |
//! | Schema | Bad JSON, unresolvable type ref | Abort connect, fix the descriptor |
//! | Value encoding | Missing field, carrier mismatch | Surface to the caller synchronously |
//! | Connection | Not connected, transport failure | Record disconnect, maybe reconnect |
//! | HTTP | 401/404/5xx from the REST surface | Surface to the caller |
//!
//! Codec, framing, and schema errors are non-recoverable for the affected
//! frame; the receive loop reports them and drops the frame without leaving
//! the `Authenticated` state. Transport errors tear the connection down.

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in client operations.
///
/// The `#[error(...)]` attribute defines the `Display` message shown when the
/// error is printed; `#[from]` variants convert automatically under `?`.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Codec Errors (malformed BSATN)
    // =========================================================================
    /// The decoder ran off the end of the buffer.
    ///
    /// `needed` is the number of bytes the current read required; `remaining`
    /// is how many were actually left.
    #[error("buffer too short: needed {needed} bytes, {remaining} remaining")]
    BufferTooShort {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A `bool` byte was neither `0x00` nor `0x01`.
    #[error("invalid bool byte 0x{0:02x}")]
    InvalidBool(u8),

    /// An `option` tag byte was neither `0` (present) nor `1` (absent).
    #[error("invalid option tag 0x{0:02x}")]
    InvalidOptionTag(u8),

    /// A `sum` tag byte named a variant past the end of the variant list.
    #[error("invalid sum tag {tag}: type has {variants} variants")]
    InvalidSumTag {
        /// The tag byte that was read.
        tag: u8,
        /// Number of variants the sum type declares.
        variants: usize,
    },

    /// A length or count did not fit the wire's `u32` prefix.
    #[error("value too large for wire encoding: {0}")]
    Overflow(String),

    /// A decoded string was not valid UTF-8.
    ///
    /// The wire format does not validate UTF-8; this is surfaced here because
    /// Rust's `String` assumes it.
    #[error("string is not valid utf-8")]
    InvalidUtf8,

    /// A row's bytes were not fully consumed by its column list.
    #[error("row decode left {0} trailing bytes")]
    TrailingBytes(usize),

    // =========================================================================
    // Protocol Framing Errors (malformed server frame)
    // =========================================================================
    /// The compression envelope byte was not `0x00`, `0x01`, or `0x02`.
    #[error("unknown compression envelope 0x{0:02x}")]
    UnknownCompression(u8),

    /// A received frame had zero bytes.
    #[error("empty frame")]
    EmptyFrame,

    /// The configured decompressor failed, or none was configured for a
    /// compressed envelope.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// The server message tag was outside the known family.
    #[error("unknown server message tag 0x{0:02x}")]
    UnknownMessageTag(u8),

    /// A `row_list` size hint tag was neither fixed-stride nor offset-table.
    #[error("unknown row size hint tag 0x{0:02x}")]
    UnknownRowSizeHint(u8),

    /// A `table_update_rows` tag was neither persistent nor event.
    #[error("unknown table update tag 0x{0:02x}")]
    UnknownTableUpdateTag(u8),

    /// A reducer outcome tag was outside `0..=3`.
    #[error("unknown reducer outcome tag 0x{0:02x}")]
    UnknownReducerOutcome(u8),

    /// A one-off query result tag was neither rows nor error.
    #[error("unknown one-off query result tag 0x{0:02x}")]
    UnknownOneOffResult(u8),

    /// A procedure status tag was outside `0..=3`.
    #[error("unknown procedure status tag 0x{0:02x}")]
    UnknownProcedureStatus(u8),

    // =========================================================================
    // Schema Errors
    // =========================================================================
    /// The schema descriptor was not valid JSON.
    #[error("invalid schema json: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The schema descriptor named a type kind this client does not know.
    #[error("unknown type '{0}' in schema")]
    UnknownType(String),

    /// A typespace reference was out of range or cyclic.
    #[error("invalid type ref {index}: {reason}")]
    InvalidTypeRef {
        /// The typespace index that failed to resolve.
        index: usize,
        /// Why resolution failed.
        reason: String,
    },

    /// A named field required by a product encoding (or schema object) was
    /// absent.
    #[error("missing field '{0}'")]
    MissingField(String),

    /// The descriptor parsed as JSON but violated a structural invariant
    /// (primary-key index out of range, duplicate table or reducer name).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    // =========================================================================
    // Value Encoding Errors
    // =========================================================================
    /// A value's runtime carrier did not match the expected type.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Short name of the expected type case.
        expected: String,
        /// Short name of the value's actual case.
        got: String,
    },

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// An operation required a live connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// The WebSocket handshake did not complete.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The initial connect to the server failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport reported an error mid-connection.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The client was asked to call a reducer the schema does not declare.
    #[error("unknown reducer '{0}'")]
    UnknownReducer(String),

    /// The client was asked about a table the schema does not declare.
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    // =========================================================================
    // HTTP Collaborator Errors
    // =========================================================================
    /// The HTTP collaborator failed before producing a response.
    #[error("http request failed: {0}")]
    RequestFailed(String),

    /// The HTTP response body did not parse as expected.
    #[error("invalid http response: {0}")]
    InvalidResponse(String),

    /// The server rejected the bearer token (401/403).
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource does not exist (404).
    #[error("not found")]
    NotFound,

    /// The server reported an internal failure (5xx).
    #[error("server error: status {0}")]
    ServerError(u16),

    // =========================================================================
    // I/O (credential files, codegen output)
    // =========================================================================
    /// Filesystem failure from credential persistence or codegen output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages appear in logs and `on_error` callbacks; keep them
    /// readable and complete.
    #[test]
    fn test_error_display() {
        let short = Error::BufferTooShort {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            short.to_string(),
            "buffer too short: needed 4 bytes, 1 remaining"
        );

        let tag = Error::InvalidSumTag {
            tag: 9,
            variants: 3,
        };
        assert_eq!(tag.to_string(), "invalid sum tag 9: type has 3 variants");

        let mismatch = Error::TypeMismatch {
            expected: "u32".to_string(),
            got: "string".to_string(),
        };
        assert_eq!(
            mismatch.to_string(),
            "type mismatch: expected u32, got string"
        );

        assert_eq!(
            Error::UnknownCompression(0x7f).to_string(),
            "unknown compression envelope 0x7f"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let our_err: Error = io_err.into();
        assert!(matches!(our_err, Error::Io(_)));
        assert!(our_err.to_string().contains("io error"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let our_err: Error = json_err.into();
        assert!(matches!(our_err, Error::InvalidJson(_)));
    }
}
