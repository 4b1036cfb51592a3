//! # BSATN Encoding and Decoding
//!
//! This module provides the binary codec for the algebraic type system: a
//! typed, length-prefixed, little-endian wire format.
//!
//! ## Framing Rules
//!
//! ```text
//! integers      native width, little-endian, two's complement for signed
//! u256/i256     32 raw bytes, byte-for-byte (endianness opaque)
//! bool          one byte: 0x00 = false, 0x01 = true (strict on decode)
//! f32/f64       IEEE 754 bits, little-endian
//! string/bytes  u32 length prefix + raw bytes
//! array(T)      u32 count prefix + count encoded elements
//! option(T)     tag byte: 0 = present (followed by T), 1 = absent (strict)
//! product       fields in declaration order, no separators, no prefix
//! sum           one tag byte + the named variant's encoding
//! ```
//!
//! ## Encoder / Decoder Pairing
//!
//! [`Encoder`] is an append-only buffer with typed append operations plus a
//! polymorphic [`Encoder::encode_value`] that dispatches on the value's
//! runtime tag. [`Decoder`] is a byte-slice cursor; each read advances it by
//! exactly the bytes consumed, and [`Decoder::decode_value`] takes an
//! [`AlgebraicType`] and recursively decodes.
//!
//! The round-trip guarantee: `decode(T, encode(v)) == v` for every value
//! whose type contains no unresolved `Ref`.
//!
//! ## Schema-Aware Encoding
//!
//! [`encode_product_fields`] encodes a field list against a column list,
//! looking fields up by name and checking carriers against expected types.
//! Reducer-argument encoding is this applied to a reducer's parameter
//! columns.

use crate::error::{Error, Result};
use crate::types::{AlgebraicType, AlgebraicValue, Column, Field, I256Bits, U256Bits};

// =============================================================================
// Encoder
// =============================================================================

/// Append-only BSATN output buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

macro_rules! put_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            /// Appends the value in little-endian byte order.
            pub fn $name(&mut self, v: $ty) {
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
        )*
    };
}

impl Encoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates an encoder with preallocated capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    put_le! {
        put_u8: u8, put_u16: u16, put_u32: u32, put_u64: u64, put_u128: u128,
        put_i8: i8, put_i16: i16, put_i32: i32, put_i64: i64, put_i128: i128,
        put_f32: f32, put_f64: f64,
    }

    /// Appends a 256-bit unsigned carrier: 32 raw bytes.
    pub fn put_u256(&mut self, v: &U256Bits) {
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Appends a 256-bit signed carrier: 32 raw bytes.
    pub fn put_i256(&mut self, v: &I256Bits) {
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Appends one byte: `0x00` for false, `0x01` for true.
    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Appends a u32 length prefix followed by the string's bytes.
    pub fn put_str(&mut self, s: &str) -> Result<()> {
        self.put_len(s.len())?;
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Appends a u32 length prefix followed by the raw bytes.
    pub fn put_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.put_len(b.len())?;
        self.buf.extend_from_slice(b);
        Ok(())
    }

    /// Appends raw bytes with no prefix.
    pub fn put_raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| Error::Overflow(format!("length {len} exceeds u32")))?;
        self.put_u32(len);
        Ok(())
    }

    /// Encodes any value by dispatching on its runtime tag.
    ///
    /// For `Product`, fields are emitted in list order with no prefix. For
    /// `Sum`, one tag byte then the payload. For `OptionVal`, the one-byte
    /// present/absent tag.
    pub fn encode_value(&mut self, value: &AlgebraicValue) -> Result<()> {
        match value {
            AlgebraicValue::Bool(v) => self.put_bool(*v),
            AlgebraicValue::U8(v) => self.put_u8(*v),
            AlgebraicValue::U16(v) => self.put_u16(*v),
            AlgebraicValue::U32(v) => self.put_u32(*v),
            AlgebraicValue::U64(v) => self.put_u64(*v),
            AlgebraicValue::U128(v) => self.put_u128(*v),
            AlgebraicValue::U256(v) => self.put_u256(v),
            AlgebraicValue::I8(v) => self.put_i8(*v),
            AlgebraicValue::I16(v) => self.put_i16(*v),
            AlgebraicValue::I32(v) => self.put_i32(*v),
            AlgebraicValue::I64(v) => self.put_i64(*v),
            AlgebraicValue::I128(v) => self.put_i128(*v),
            AlgebraicValue::I256(v) => self.put_i256(v),
            AlgebraicValue::F32(v) => self.put_f32(*v),
            AlgebraicValue::F64(v) => self.put_f64(*v),
            AlgebraicValue::String(v) => self.put_str(v)?,
            AlgebraicValue::Bytes(v) => self.put_bytes(v)?,
            AlgebraicValue::Array(items) => {
                self.put_len(items.len())?;
                for item in items {
                    self.encode_value(item)?;
                }
            }
            AlgebraicValue::OptionVal(opt) => match opt {
                Some(inner) => {
                    self.put_u8(0);
                    self.encode_value(inner)?;
                }
                None => self.put_u8(1),
            },
            AlgebraicValue::Product(fields) => {
                for field in fields {
                    self.encode_value(&field.value)?;
                }
            }
            AlgebraicValue::Sum { tag, value } => {
                self.put_u8(*tag);
                self.encode_value(value)?;
            }
        }
        Ok(())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Extracts the buffer, taking ownership.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// A cursor over a byte slice. Every read advances the cursor by exactly the
/// bytes it consumed; reads past the end are [`Error::BufferTooShort`].
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! get_le {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            /// Reads the value in little-endian byte order.
            pub fn $name(&mut self) -> Result<$ty> {
                let bytes = self.take(std::mem::size_of::<$ty>())?;
                Ok(<$ty>::from_le_bytes(bytes.try_into().expect("sized take")))
            }
        )*
    };
}

impl<'a> Decoder<'a> {
    /// Creates a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Consumes `n` bytes, returning the borrowed slice.
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.buf.len() - self.pos;
        if n > remaining {
            return Err(Error::BufferTooShort {
                needed: n,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    get_le! {
        get_u8: u8, get_u16: u16, get_u32: u32, get_u64: u64, get_u128: u128,
        get_i8: i8, get_i16: i16, get_i32: i32, get_i64: i64, get_i128: i128,
        get_f32: f32, get_f64: f64,
    }

    /// Reads a 256-bit unsigned carrier: 32 raw bytes.
    pub fn get_u256(&mut self) -> Result<U256Bits> {
        let bytes = self.take(32)?;
        Ok(U256Bits::from_bytes(bytes.try_into().expect("sized take")))
    }

    /// Reads a 256-bit signed carrier: 32 raw bytes.
    pub fn get_i256(&mut self) -> Result<I256Bits> {
        let bytes = self.take(32)?;
        Ok(I256Bits::from_bytes(bytes.try_into().expect("sized take")))
    }

    /// Reads a strict bool byte. Anything but `0x00`/`0x01` is
    /// [`Error::InvalidBool`].
    pub fn get_bool(&mut self) -> Result<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidBool(other)),
        }
    }

    /// Reads a u32-length-prefixed byte run, borrowed from the input.
    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    /// Reads a u32-length-prefixed UTF-8 string.
    ///
    /// Invalid UTF-8 is [`Error::InvalidUtf8`]; the wire itself carries
    /// unvalidated bytes, this boundary is where `String` picks them up.
    pub fn get_str(&mut self) -> Result<&'a str> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }

    /// Consumes `n` bytes with no prefix, borrowed from the input.
    pub fn get_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Recursively decodes one value of the given type.
    ///
    /// `ty` must not contain unresolved `Ref`s; a resolved schema guarantees
    /// that, and an unexpected `Ref` here is reported as
    /// [`Error::InvalidTypeRef`].
    pub fn decode_value(&mut self, ty: &AlgebraicType) -> Result<AlgebraicValue> {
        Ok(match ty {
            AlgebraicType::Bool => AlgebraicValue::Bool(self.get_bool()?),
            AlgebraicType::U8 => AlgebraicValue::U8(self.get_u8()?),
            AlgebraicType::U16 => AlgebraicValue::U16(self.get_u16()?),
            AlgebraicType::U32 => AlgebraicValue::U32(self.get_u32()?),
            AlgebraicType::U64 => AlgebraicValue::U64(self.get_u64()?),
            AlgebraicType::U128 => AlgebraicValue::U128(self.get_u128()?),
            AlgebraicType::U256 => AlgebraicValue::U256(self.get_u256()?),
            AlgebraicType::I8 => AlgebraicValue::I8(self.get_i8()?),
            AlgebraicType::I16 => AlgebraicValue::I16(self.get_i16()?),
            AlgebraicType::I32 => AlgebraicValue::I32(self.get_i32()?),
            AlgebraicType::I64 => AlgebraicValue::I64(self.get_i64()?),
            AlgebraicType::I128 => AlgebraicValue::I128(self.get_i128()?),
            AlgebraicType::I256 => AlgebraicValue::I256(self.get_i256()?),
            AlgebraicType::F32 => AlgebraicValue::F32(self.get_f32()?),
            AlgebraicType::F64 => AlgebraicValue::F64(self.get_f64()?),
            AlgebraicType::String => AlgebraicValue::String(self.get_str()?.to_string()),
            AlgebraicType::Bytes => AlgebraicValue::Bytes(self.get_bytes()?.to_vec()),
            AlgebraicType::Array(elem) => {
                let count = self.get_u32()? as usize;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.decode_value(elem)?);
                }
                AlgebraicValue::Array(items)
            }
            AlgebraicType::Option(inner) => match self.get_u8()? {
                0 => AlgebraicValue::OptionVal(Some(Box::new(self.decode_value(inner)?))),
                1 => AlgebraicValue::OptionVal(None),
                other => return Err(Error::InvalidOptionTag(other)),
            },
            AlgebraicType::Product(cols) => {
                let mut fields = Vec::with_capacity(cols.len());
                for col in cols {
                    fields.push(Field {
                        name: col.name.clone(),
                        value: self.decode_value(&col.ty)?,
                    });
                }
                AlgebraicValue::Product(fields)
            }
            AlgebraicType::Sum(variants) => {
                let tag = self.get_u8()?;
                let variant = variants.get(tag as usize).ok_or(Error::InvalidSumTag {
                    tag,
                    variants: variants.len(),
                })?;
                AlgebraicValue::Sum {
                    tag,
                    value: Box::new(self.decode_value(&variant.ty)?),
                }
            }
            AlgebraicType::Ref(index) => {
                return Err(Error::InvalidTypeRef {
                    index: *index,
                    reason: "unresolved ref reached the decoder".to_string(),
                })
            }
        })
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True when the cursor has consumed every byte.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

// =============================================================================
// Schema-Aware Value Encoding
// =============================================================================

/// Encodes `value` checking its carrier against `ty` at every level.
///
/// Where [`Encoder::encode_value`] trusts the value, this is the boundary
/// for application-supplied data: a wrong carrier is [`Error::TypeMismatch`]
/// instead of bytes the server cannot parse.
pub fn encode_value_typed(
    enc: &mut Encoder,
    ty: &AlgebraicType,
    value: &AlgebraicValue,
) -> Result<()> {
    let mismatch = || Error::TypeMismatch {
        expected: ty.case_name().to_string(),
        got: value.case_name().to_string(),
    };
    match (ty, value) {
        (AlgebraicType::Bool, AlgebraicValue::Bool(v)) => enc.put_bool(*v),
        (AlgebraicType::U8, AlgebraicValue::U8(v)) => enc.put_u8(*v),
        (AlgebraicType::U16, AlgebraicValue::U16(v)) => enc.put_u16(*v),
        (AlgebraicType::U32, AlgebraicValue::U32(v)) => enc.put_u32(*v),
        (AlgebraicType::U64, AlgebraicValue::U64(v)) => enc.put_u64(*v),
        (AlgebraicType::U128, AlgebraicValue::U128(v)) => enc.put_u128(*v),
        (AlgebraicType::U256, AlgebraicValue::U256(v)) => enc.put_u256(v),
        (AlgebraicType::I8, AlgebraicValue::I8(v)) => enc.put_i8(*v),
        (AlgebraicType::I16, AlgebraicValue::I16(v)) => enc.put_i16(*v),
        (AlgebraicType::I32, AlgebraicValue::I32(v)) => enc.put_i32(*v),
        (AlgebraicType::I64, AlgebraicValue::I64(v)) => enc.put_i64(*v),
        (AlgebraicType::I128, AlgebraicValue::I128(v)) => enc.put_i128(*v),
        (AlgebraicType::I256, AlgebraicValue::I256(v)) => enc.put_i256(v),
        (AlgebraicType::F32, AlgebraicValue::F32(v)) => enc.put_f32(*v),
        (AlgebraicType::F64, AlgebraicValue::F64(v)) => enc.put_f64(*v),
        (AlgebraicType::String, AlgebraicValue::String(v)) => enc.put_str(v)?,
        (AlgebraicType::Bytes, AlgebraicValue::Bytes(v)) => enc.put_bytes(v)?,
        (AlgebraicType::Array(elem), AlgebraicValue::Array(items)) => {
            let len = u32::try_from(items.len())
                .map_err(|_| Error::Overflow(format!("array of {} elements", items.len())))?;
            enc.put_u32(len);
            for item in items {
                encode_value_typed(enc, elem, item)?;
            }
        }
        (AlgebraicType::Option(inner), AlgebraicValue::OptionVal(opt)) => match opt {
            Some(v) => {
                enc.put_u8(0);
                encode_value_typed(enc, inner, v)?;
            }
            None => enc.put_u8(1),
        },
        (AlgebraicType::Product(cols), AlgebraicValue::Product(fields)) => {
            if cols.len() != fields.len() {
                return Err(mismatch());
            }
            for (col, field) in cols.iter().zip(fields) {
                encode_value_typed(enc, &col.ty, &field.value)?;
            }
        }
        (AlgebraicType::Sum(variants), AlgebraicValue::Sum { tag, value }) => {
            let variant = variants.get(*tag as usize).ok_or(Error::InvalidSumTag {
                tag: *tag,
                variants: variants.len(),
            })?;
            enc.put_u8(*tag);
            encode_value_typed(enc, &variant.ty, value)?;
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Encodes a product from named fields, looked up against a column list.
///
/// For each column in declaration order, the field with the matching name is
/// found in `fields` and encoded against the column's type. A column whose
/// name has no matching field is [`Error::MissingField`].
///
/// Reducer-argument encoding is exactly this, applied to the reducer's
/// parameter columns.
pub fn encode_product_fields(
    enc: &mut Encoder,
    columns: &[Column],
    fields: &[Field],
) -> Result<()> {
    for col in columns {
        let col_name = col
            .name
            .as_deref()
            .ok_or_else(|| Error::MissingField("<unnamed column>".to_string()))?;
        let field = fields
            .iter()
            .find(|f| f.name.as_deref() == Some(col_name))
            .ok_or_else(|| Error::MissingField(col_name.to_string()))?;
        encode_value_typed(enc, &col.ty, &field.value)?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
