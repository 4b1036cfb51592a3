//! # Row Lists and Row Decoding
//!
//! A `row_list` is the wire's way of shipping many rows of one table in a
//! single allocation: a framing hint plus one concatenated payload.
//!
//! ```text
//! fixed-stride:            offset-table:
//! ┌─────┬─────┬─────┐      offsets: [0, 11, 17]        (u64 little-endian)
//! │ 24B │ 24B │ 24B │      ┌───────────┬──────┬───────────────┐
//! └─────┴─────┴─────┘      │ row 0     │ row1 │ row 2         │
//! every row = stride       └───────────┴──────┴───────────────┘
//!                          row i = [offset[i], offset[i+1])
//! ```
//!
//! [`RowList`] borrows both the payload and the unparsed offset table from
//! the received frame; individual offsets are read on demand. Keeping the
//! table unparsed is load-bearing for throughput on large updates.
//!
//! [`decode_rows`] materializes owned [`Row`]s by running each row's bytes
//! through the codec against a column list. Each row must be consumed
//! exactly; trailing bytes are a format error.

use crate::codec::Decoder;
use crate::error::{Error, Result};
use crate::types::{Column, Field};

// =============================================================================
// Row
// =============================================================================

/// One decoded table row: named fields positionally aligned to the table's
/// column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Fields in column declaration order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Builds a row from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns the field with the given name, if present.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.as_deref() == Some(name))
    }
}

/// Conversion from a decoded [`Row`] into an application record type.
///
/// Implementations are typically generated (see the codegen collaborator);
/// fields convert positionally from the row's column order.
pub trait FromRow: Sized {
    /// Converts a row; a carrier that does not match the record's field is
    /// [`Error::TypeMismatch`].
    fn from_row(row: &Row) -> Result<Self>;
}

// =============================================================================
// Row List View
// =============================================================================

/// Framing for a [`RowList`]: how the concatenated payload splits into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeHint<'a> {
    /// Every row is the same number of bytes.
    FixedStride(u16),
    /// Explicit row-start offsets. `offsets` is the raw, unparsed table:
    /// `count` little-endian u64 values aliasing the received frame.
    OffsetTable {
        /// Number of rows.
        count: u32,
        /// `count * 8` raw bytes of little-endian u64 offsets.
        offsets: &'a [u8],
    },
}

/// Zero-copy view over one table's concatenated row payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowList<'a> {
    hint: SizeHint<'a>,
    rows_data: &'a [u8],
}

impl<'a> RowList<'a> {
    /// An empty row list (zero rows).
    pub fn empty() -> Self {
        Self {
            hint: SizeHint::FixedStride(0),
            rows_data: &[],
        }
    }

    /// Builds a view directly from parts. Used by tests and the protocol
    /// decoder.
    pub fn from_parts(hint: SizeHint<'a>, rows_data: &'a [u8]) -> Self {
        Self { hint, rows_data }
    }

    /// Decodes the wire form: size-hint sum, then length-prefixed payload.
    pub fn decode(dec: &mut Decoder<'a>) -> Result<Self> {
        let hint = match dec.get_u8()? {
            0 => SizeHint::FixedStride(dec.get_u16()?),
            1 => {
                let count = dec.get_u32()?;
                let table_len = (count as usize)
                    .checked_mul(8)
                    .ok_or_else(|| Error::Overflow(format!("offset table of {count} rows")))?;
                SizeHint::OffsetTable {
                    count,
                    offsets: dec.get_raw(table_len)?,
                }
            }
            other => return Err(Error::UnknownRowSizeHint(other)),
        };
        let rows_data = dec.get_bytes()?;
        Ok(Self { hint, rows_data })
    }

    /// Encodes the wire form. The inverse of [`RowList::decode`]; used by
    /// tests to fabricate server frames.
    pub fn encode(&self, enc: &mut crate::codec::Encoder) -> Result<()> {
        match self.hint {
            SizeHint::FixedStride(stride) => {
                enc.put_u8(0);
                enc.put_u16(stride);
            }
            SizeHint::OffsetTable { count, offsets } => {
                enc.put_u8(1);
                enc.put_u32(count);
                enc.put_raw(offsets);
            }
        }
        enc.put_bytes(self.rows_data)
    }

    /// The framing hint.
    pub fn size_hint(&self) -> SizeHint<'a> {
        self.hint
    }

    /// The raw concatenated payload.
    pub fn rows_data(&self) -> &'a [u8] {
        self.rows_data
    }

    /// Number of rows in the view.
    ///
    /// Fixed-stride is `payload / stride` (zero stride or empty payload is
    /// zero rows); offset-table is exactly its declared count.
    pub fn len(&self) -> usize {
        match self.hint {
            SizeHint::FixedStride(0) => 0,
            SizeHint::FixedStride(stride) => self.rows_data.len() / stride as usize,
            SizeHint::OffsetTable { count, .. } => count as usize,
        }
    }

    /// True when the view holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns row `i`'s bytes, read from the framing on demand.
    ///
    /// Offset-table rows occupy `[offset[i], offset[i+1])`, the last ending
    /// at the payload's end. Offsets that leave the payload or run backwards
    /// are format errors.
    pub fn row(&self, i: usize) -> Result<&'a [u8]> {
        let len = self.len();
        if i >= len {
            return Err(Error::BufferTooShort {
                needed: i + 1,
                remaining: len,
            });
        }
        match self.hint {
            SizeHint::FixedStride(stride) => {
                let stride = stride as usize;
                Ok(&self.rows_data[i * stride..(i + 1) * stride])
            }
            SizeHint::OffsetTable { .. } => {
                let start = self.offset(i)?;
                let end = if i + 1 == len {
                    self.rows_data.len()
                } else {
                    self.offset(i + 1)?
                };
                if start > end || end > self.rows_data.len() {
                    return Err(Error::BufferTooShort {
                        needed: end,
                        remaining: self.rows_data.len(),
                    });
                }
                Ok(&self.rows_data[start..end])
            }
        }
    }

    /// Reads one raw offset out of the unparsed table.
    fn offset(&self, i: usize) -> Result<usize> {
        match self.hint {
            SizeHint::OffsetTable { offsets, .. } => {
                let slice = offsets.get(i * 8..i * 8 + 8).ok_or(Error::BufferTooShort {
                    needed: i * 8 + 8,
                    remaining: offsets.len(),
                })?;
                let bytes: [u8; 8] = slice.try_into().expect("sized slice");
                let off = u64::from_le_bytes(bytes);
                usize::try_from(off)
                    .map_err(|_| Error::Overflow(format!("row offset {off}")))
            }
            SizeHint::FixedStride(_) => unreachable!("offsets only exist for offset tables"),
        }
    }

    /// Iterates the row byte slices.
    pub fn iter(&self) -> RowListIter<'a> {
        RowListIter {
            list: *self,
            next: 0,
        }
    }
}

/// Iterator over the raw row slices of a [`RowList`].
#[derive(Debug)]
pub struct RowListIter<'a> {
    list: RowList<'a>,
    next: usize,
}

impl<'a> Iterator for RowListIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.list.len() {
            return None;
        }
        let item = self.list.row(self.next);
        self.next += 1;
        Some(item)
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Decodes every row in the list against a column list.
///
/// Each row gets a fresh decoder over exactly its bytes; each column's type
/// drives one `decode_value`. A row whose bytes are not fully consumed is
/// [`Error::TrailingBytes`]. On any failure the rows decoded so far are
/// dropped before the error propagates, so no partial result is visible.
pub fn decode_rows(list: &RowList<'_>, columns: &[Column]) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(list.len());
    for raw in list.iter() {
        let raw = raw?;
        let mut dec = Decoder::new(raw);
        let mut fields = Vec::with_capacity(columns.len());
        for col in columns {
            fields.push(Field {
                name: col.name.clone(),
                value: dec.decode_value(&col.ty)?,
            });
        }
        if !dec.is_empty() {
            return Err(Error::TrailingBytes(dec.remaining()));
        }
        rows.push(Row { fields });
    }
    Ok(rows)
}

// =============================================================================
// Tests
// =============================================================================
