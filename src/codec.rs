//! Scalar byte encodings and the custom codec registry.
//!
//! Every value-type tag maps to one deterministic encoding rule; encode and
//! decode round-trip exactly for every representable value. All multi-byte
//! integers are little-endian. Presence flags for nullable columns and the
//! recursive shapes (nested objects, arrays, lists) are layered on top by
//! the column store; this module handles only the leaf payloads.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schema::ColumnType;
use crate::value::{Timestamp, TimestampTz, Value};

/// Writes an unsigned integer as a 7-bit varint.
///
/// Low 7 bits per byte, continuation in the high bit. Used for text length
/// prefixes and registry name lengths.
pub(crate) fn write_varint(w: &mut impl Write, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return w.write_all(&[byte]);
        }
        w.write_all(&[byte | 0x80])?;
    }
}

/// Reads a 7-bit varint written by [`write_varint`].
pub(crate) fn read_varint(r: &mut impl Read) -> io::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = read_array::<1>(r)?[0];
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint length prefix overflows 64 bits",
            ));
        }
    }
}

fn read_array<const N: usize>(r: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Packs a decimal into its four persisted 32-bit words: lo, mid, hi, flags.
///
/// The flags word carries the scale in bits 16-23 and the sign in bit 31,
/// matching the 96-bit-mantissa layout the batch decoder consumes.
pub(crate) fn decimal_to_words(value: &Decimal) -> [u32; 4] {
    let mantissa = value.mantissa().unsigned_abs();
    let lo = mantissa as u32;
    let mid = (mantissa >> 32) as u32;
    let hi = (mantissa >> 64) as u32;
    let mut flags = value.scale() << 16;
    if value.is_sign_negative() {
        flags |= 0x8000_0000;
    }
    [lo, mid, hi, flags]
}

/// Rebuilds a decimal from its four persisted 32-bit words.
pub(crate) fn decimal_from_words(words: [u32; 4]) -> Decimal {
    let [lo, mid, hi, flags] = words;
    let negative = flags & 0x8000_0000 != 0;
    let scale = (flags >> 16) & 0xff;
    Decimal::from_parts(lo, mid, hi, negative, scale)
}

fn mismatch(column: &str, ty: &ColumnType, value: &Value) -> Error {
    Error::ColumnTypeMismatch {
        column: column.to_string(),
        expected: ty.to_string(),
        actual: value.shape().to_string(),
    }
}

/// Encodes one non-null scalar value under the given type tag.
///
/// # Errors
///
/// Returns [`Error::ColumnTypeMismatch`] when the value's shape contradicts
/// the tag, and propagates I/O failures.
pub(crate) fn encode_scalar(
    w: &mut impl Write,
    column: &str,
    ty: &ColumnType,
    value: &Value,
) -> Result<()> {
    match (ty, value) {
        (ColumnType::Bool, Value::Bool(v)) => w.write_all(&[u8::from(*v)])?,
        (ColumnType::I8, Value::I8(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::U8, Value::U8(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::I16, Value::I16(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::U16, Value::U16(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::I32, Value::I32(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::U32, Value::U32(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::I64, Value::I64(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::U64, Value::U64(v)) => w.write_all(&v.to_le_bytes())?,
        (ColumnType::Uuid, Value::Uuid(v)) => w.write_all(v.as_bytes())?,
        (ColumnType::Decimal, Value::Decimal(v)) => {
            for word in decimal_to_words(v) {
                w.write_all(&word.to_le_bytes())?;
            }
        }
        (ColumnType::Timestamp, Value::Timestamp(v)) => w.write_all(&v.ticks().to_le_bytes())?,
        (ColumnType::TimestampTz, Value::TimestampTz(v)) => {
            w.write_all(&v.ticks().to_le_bytes())?;
            w.write_all(&v.offset_ticks().to_le_bytes())?;
        }
        (ColumnType::Str, Value::Str(v)) => {
            write_varint(w, v.len() as u64)?;
            w.write_all(v.as_bytes())?;
        }
        // Out-of-range enum members truncate to the declared width, the
        // same as a narrowing integer cast.
        (ColumnType::Enum { bits: 8 }, Value::Enum(v)) => w.write_all(&(*v as u8).to_le_bytes())?,
        (ColumnType::Enum { bits: 16 }, Value::Enum(v)) => {
            w.write_all(&(*v as i16).to_le_bytes())?;
        }
        (ColumnType::Enum { bits: 32 }, Value::Enum(v)) => {
            w.write_all(&(*v as i32).to_le_bytes())?;
        }
        (ty, value) => return Err(mismatch(column, ty, value)),
    }
    Ok(())
}

/// Decodes one non-null scalar value under the given type tag.
///
/// The inverse of [`encode_scalar`]. Enum widths other than 8/16/32 are
/// rejected at schema validation, before any decode runs.
pub(crate) fn decode_scalar(r: &mut impl Read, column: &str, ty: &ColumnType) -> Result<Value> {
    let value = match ty {
        ColumnType::Bool => Value::Bool(read_array::<1>(r)?[0] != 0),
        ColumnType::I8 => Value::I8(i8::from_le_bytes(read_array(r)?)),
        ColumnType::U8 => Value::U8(u8::from_le_bytes(read_array(r)?)),
        ColumnType::I16 => Value::I16(i16::from_le_bytes(read_array(r)?)),
        ColumnType::U16 => Value::U16(u16::from_le_bytes(read_array(r)?)),
        ColumnType::I32 => Value::I32(i32::from_le_bytes(read_array(r)?)),
        ColumnType::U32 => Value::U32(u32::from_le_bytes(read_array(r)?)),
        ColumnType::I64 => Value::I64(i64::from_le_bytes(read_array(r)?)),
        ColumnType::U64 => Value::U64(u64::from_le_bytes(read_array(r)?)),
        ColumnType::Uuid => Value::Uuid(Uuid::from_bytes(read_array(r)?)),
        ColumnType::Decimal => {
            let mut words = [0u32; 4];
            for word in &mut words {
                *word = u32::from_le_bytes(read_array(r)?);
            }
            Value::Decimal(decimal_from_words(words))
        }
        ColumnType::Timestamp => {
            Value::Timestamp(Timestamp::from_ticks(i64::from_le_bytes(read_array(r)?)))
        }
        ColumnType::TimestampTz => {
            let ticks = i64::from_le_bytes(read_array(r)?);
            let offset = i64::from_le_bytes(read_array(r)?);
            Value::TimestampTz(TimestampTz::from_ticks(ticks, offset))
        }
        ColumnType::Str => {
            let len = read_varint(r)? as usize;
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes)?;
            let text = String::from_utf8(bytes).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("column `{column}` holds invalid UTF-8: {e}"),
                )
            })?;
            Value::Str(text)
        }
        ColumnType::Enum { bits: 8 } => Value::Enum(i64::from(u8::from_le_bytes(read_array(r)?))),
        ColumnType::Enum { bits: 16 } => Value::Enum(i64::from(i16::from_le_bytes(read_array(r)?))),
        ColumnType::Enum { bits: 32 } => Value::Enum(i64::from(i32::from_le_bytes(read_array(r)?))),
        other => {
            // Recursive and custom shapes are handled by the column store
            // and never reach the scalar decoder.
            return Err(Error::ColumnTypeMismatch {
                column: column.to_string(),
                expected: "scalar".to_string(),
                actual: other.to_string(),
            });
        }
    };
    Ok(value)
}

/// Type alias for a custom column encoder.
pub type EncodeFn = Arc<dyn Fn(&Value, &mut dyn Write) -> Result<()> + Send + Sync>;

/// Type alias for a custom column decoder.
pub type DecodeFn = Arc<dyn Fn(&mut dyn Read) -> Result<Value> + Send + Sync>;

/// A caller-supplied encode/decode pair for one custom value type.
///
/// Custom columns bypass the built-in rules entirely: the pair owns the
/// byte layout and must be its own exact inverse. Registered on the store
/// under the name referenced by [`ColumnType::Custom`].
#[derive(Clone)]
pub struct CustomCodec {
    encode: EncodeFn,
    decode: DecodeFn,
}

impl CustomCodec {
    /// Builds a codec from an encode/decode closure pair.
    pub fn new(
        encode: impl Fn(&Value, &mut dyn Write) -> Result<()> + Send + Sync + 'static,
        decode: impl Fn(&mut dyn Read) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub(crate) fn encode(&self, value: &Value, w: &mut dyn Write) -> Result<()> {
        (self.encode)(value, w)
    }

    pub(crate) fn decode(&self, r: &mut dyn Read) -> Result<Value> {
        (self.decode)(r)
    }
}

// Manual `Debug`: the closures carry no useful state to print.
impl std::fmt::Debug for CustomCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCodec").finish_non_exhaustive()
    }
}

/// Name-keyed registry of custom codecs owned by a store handle.
#[derive(Debug, Clone, Default)]
pub(crate) struct CodecRegistry {
    codecs: HashMap<&'static str, CustomCodec>,
}

impl CodecRegistry {
    pub(crate) fn insert(&mut self, name: &'static str, codec: CustomCodec) {
        self.codecs.insert(name, codec);
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&CustomCodec> {
        self.codecs.get(name)
    }
}
