//! # Algebraic Types and Values
//!
//! This module defines the type model underlying every wire value: a closed
//! variant type ([`AlgebraicType`]) describing the shape of data, and its
//! runtime-tagged counterpart ([`AlgebraicValue`]) carrying actual data.
//!
//! ## The Type/Value Pairing
//!
//! ```text
//! AlgebraicType                      AlgebraicValue
//! ┌──────────────────────┐           ┌──────────────────────────┐
//! │ U32                  │ ◄────────►│ U32(42)                  │
//! │ String               │ ◄────────►│ String("Alice")          │
//! │ Option(Box<U64>)     │ ◄────────►│ OptionVal(Some(U64(7)))  │
//! │ Product([id, name])  │ ◄────────►│ Product([F(1), F("x")])  │
//! │ Sum([ok, err])       │ ◄────────►│ Sum { tag: 0, value }    │
//! └──────────────────────┘           └──────────────────────────┘
//! ```
//!
//! Both are closed tagged unions: all consumer code dispatches exhaustively
//! by variant, with no open hierarchy and no runtime type inspection beyond
//! tag comparison.
//!
//! ## Invariants
//!
//! - A value's active case matches its type's active case at every level.
//! - For `Sum`, the tag is less than the variant count.
//! - For `Product`, the field list has the same length and order as the
//!   type's column list. Field names are informational.
//! - 256-bit integers are 32 raw bytes; endianness is carrier-opaque.
//! - Decoded strings were validated as UTF-8 at the codec boundary.
//!
//! ## Identity Newtypes
//!
//! The connection-level identifiers ([`Identity`], [`ConnectionId`],
//! [`AuthToken`], [`RequestId`], [`QuerySetId`]) follow the newtype pattern:
//! wrapping the raw carrier prevents mixing a request id with a query set id
//! in a signature, and gives each a home for its formatting and invariants.

use std::fmt;

// =============================================================================
// Algebraic Types
// =============================================================================

/// A column of a product or a variant of a sum: an optional name plus a type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Field or variant name. Informational for products; absent in
    /// anonymous tuples.
    pub name: Option<String>,
    /// The element's type.
    pub ty: AlgebraicType,
}

impl Column {
    /// Creates a named column.
    pub fn named(name: impl Into<String>, ty: AlgebraicType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Creates an anonymous column.
    pub fn anon(ty: AlgebraicType) -> Self {
        Self { name: None, ty }
    }
}

/// The variant type describing every wire value.
///
/// `Ref` is an indirection into the schema's typespace. It exists only while
/// a schema descriptor is being loaded: schema parsing resolves every `Ref`
/// into the referenced type, so downstream code (codec, cache, rows) never
/// observes one.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraicType {
    /// One byte, `0x00` or `0x01` on the wire.
    Bool,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer, little-endian.
    U16,
    /// Unsigned 32-bit integer, little-endian.
    U32,
    /// Unsigned 64-bit integer, little-endian.
    U64,
    /// Unsigned 128-bit integer, little-endian.
    U128,
    /// Unsigned 256-bit integer, 32 raw bytes.
    U256,
    /// Signed 8-bit integer, two's complement.
    I8,
    /// Signed 16-bit integer, two's complement little-endian.
    I16,
    /// Signed 32-bit integer, two's complement little-endian.
    I32,
    /// Signed 64-bit integer, two's complement little-endian.
    I64,
    /// Signed 128-bit integer, two's complement little-endian.
    I128,
    /// Signed 256-bit integer, 32 raw bytes.
    I256,
    /// IEEE 754 single precision, little-endian bits.
    F32,
    /// IEEE 754 double precision, little-endian bits.
    F64,
    /// UTF-8 string, u32 length prefix.
    String,
    /// Opaque bytes, u32 length prefix.
    Bytes,
    /// Ordered sequence, u32 count prefix.
    Array(Box<AlgebraicType>),
    /// One value or nothing, one tag byte.
    Option(Box<AlgebraicType>),
    /// Ordered, named-field record. Fields concatenate with no prefix.
    Product(Vec<Column>),
    /// Discriminated union, one tag byte then the variant's payload.
    Sum(Vec<Column>),
    /// Indirection into the typespace; resolved at schema-load time.
    Ref(usize),
}

impl AlgebraicType {
    /// Short lowercase name of the active case, used in error messages.
    pub fn case_name(&self) -> &'static str {
        match self {
            AlgebraicType::Bool => "bool",
            AlgebraicType::U8 => "u8",
            AlgebraicType::U16 => "u16",
            AlgebraicType::U32 => "u32",
            AlgebraicType::U64 => "u64",
            AlgebraicType::U128 => "u128",
            AlgebraicType::U256 => "u256",
            AlgebraicType::I8 => "i8",
            AlgebraicType::I16 => "i16",
            AlgebraicType::I32 => "i32",
            AlgebraicType::I64 => "i64",
            AlgebraicType::I128 => "i128",
            AlgebraicType::I256 => "i256",
            AlgebraicType::F32 => "f32",
            AlgebraicType::F64 => "f64",
            AlgebraicType::String => "string",
            AlgebraicType::Bytes => "bytes",
            AlgebraicType::Array(_) => "array",
            AlgebraicType::Option(_) => "option",
            AlgebraicType::Product(_) => "product",
            AlgebraicType::Sum(_) => "sum",
            AlgebraicType::Ref(_) => "ref",
        }
    }

    /// Returns true if the type (recursively) contains an unresolved `Ref`.
    ///
    /// A fully loaded schema guarantees this is false for every table column
    /// and reducer parameter.
    pub fn contains_ref(&self) -> bool {
        match self {
            AlgebraicType::Ref(_) => true,
            AlgebraicType::Array(inner) | AlgebraicType::Option(inner) => inner.contains_ref(),
            AlgebraicType::Product(cols) | AlgebraicType::Sum(cols) => {
                cols.iter().any(|c| c.ty.contains_ref())
            }
            _ => false,
        }
    }
}

// =============================================================================
// 256-bit Carriers
// =============================================================================

/// Raw carrier for a 256-bit unsigned integer: 32 bytes, endianness opaque.
///
/// The codec moves these byte-for-byte; arithmetic is not this crate's
/// concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256Bits(pub [u8; 32]);

/// Raw carrier for a 256-bit signed integer: 32 bytes, endianness opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct I256Bits(pub [u8; 32]);

impl U256Bits {
    /// Wraps 32 raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl I256Bits {
    /// Wraps 32 raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// =============================================================================
// Algebraic Values
// =============================================================================

/// A named field of a product value.
///
/// The name mirrors the column name of the corresponding type and is
/// informational; positional order is what the codec relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name, when the column declared one.
    pub name: Option<String>,
    /// The field's value.
    pub value: AlgebraicValue,
}

impl Field {
    /// Creates a named field.
    pub fn named(name: impl Into<String>, value: AlgebraicValue) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }

    /// Creates an anonymous field.
    pub fn anon(value: AlgebraicValue) -> Self {
        Self { name: None, value }
    }
}

/// The tag-matched runtime counterpart of [`AlgebraicType`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraicValue {
    /// Boolean carrier.
    Bool(bool),
    /// Unsigned 8-bit carrier.
    U8(u8),
    /// Unsigned 16-bit carrier.
    U16(u16),
    /// Unsigned 32-bit carrier.
    U32(u32),
    /// Unsigned 64-bit carrier.
    U64(u64),
    /// Unsigned 128-bit carrier.
    U128(u128),
    /// Unsigned 256-bit carrier, 32 raw bytes.
    U256(U256Bits),
    /// Signed 8-bit carrier.
    I8(i8),
    /// Signed 16-bit carrier.
    I16(i16),
    /// Signed 32-bit carrier.
    I32(i32),
    /// Signed 64-bit carrier.
    I64(i64),
    /// Signed 128-bit carrier.
    I128(i128),
    /// Signed 256-bit carrier, 32 raw bytes.
    I256(I256Bits),
    /// Single-precision float carrier.
    F32(f32),
    /// Double-precision float carrier.
    F64(f64),
    /// Owned string bytes.
    String(String),
    /// Owned opaque bytes.
    Bytes(Vec<u8>),
    /// Ordered sequence of values.
    Array(Vec<AlgebraicValue>),
    /// Optional boxed value.
    OptionVal(Option<Box<AlgebraicValue>>),
    /// Ordered list of named fields.
    Product(Vec<Field>),
    /// Tagged variant: `tag` selects the type's variant, `value` is its
    /// payload.
    Sum {
        /// Zero-based variant tag.
        tag: u8,
        /// The variant's payload.
        value: Box<AlgebraicValue>,
    },
}

impl AlgebraicValue {
    /// Short lowercase name of the active case, used in error messages.
    pub fn case_name(&self) -> &'static str {
        match self {
            AlgebraicValue::Bool(_) => "bool",
            AlgebraicValue::U8(_) => "u8",
            AlgebraicValue::U16(_) => "u16",
            AlgebraicValue::U32(_) => "u32",
            AlgebraicValue::U64(_) => "u64",
            AlgebraicValue::U128(_) => "u128",
            AlgebraicValue::U256(_) => "u256",
            AlgebraicValue::I8(_) => "i8",
            AlgebraicValue::I16(_) => "i16",
            AlgebraicValue::I32(_) => "i32",
            AlgebraicValue::I64(_) => "i64",
            AlgebraicValue::I128(_) => "i128",
            AlgebraicValue::I256(_) => "i256",
            AlgebraicValue::F32(_) => "f32",
            AlgebraicValue::F64(_) => "f64",
            AlgebraicValue::String(_) => "string",
            AlgebraicValue::Bytes(_) => "bytes",
            AlgebraicValue::Array(_) => "array",
            AlgebraicValue::OptionVal(_) => "option",
            AlgebraicValue::Product(_) => "product",
            AlgebraicValue::Sum { .. } => "sum",
        }
    }
}

// =============================================================================
// Connection Identifiers
// =============================================================================

/// The server-issued 256-bit identity, received on `initial_connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Wraps 32 raw identity bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, as used by the REST surface and the
    /// credentials file.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    /// Parses the 64-character hex rendering back into raw bytes.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(s, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The server-issued 128-bit connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId([u8; 16]);

impl ConnectionId {
    /// Wraps 16 raw connection-id bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw connection-id bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// The variable-width bearer token issued at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AuthToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AuthToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Correlates a client message with its server reply.
///
/// Allocated by the connection, starting at 1 and strictly increasing;
/// never wraps within a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u32);

impl RequestId {
    /// The first id allocated on a fresh connection.
    pub const FIRST: RequestId = RequestId(1);

    /// Wraps a raw id, as read off the wire.
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw u32 for wire encoding.
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses one group of queries subscribed together.
///
/// Allocated per `subscribe`, starting at 1 and strictly increasing;
/// the same id later addresses the matching `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuerySetId(u32);

impl QuerySetId {
    /// The first id allocated on a fresh connection.
    pub const FIRST: QuerySetId = QuerySetId(1);

    /// Wraps a raw id, as read off the wire.
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw u32 for wire encoding.
    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for QuerySetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
