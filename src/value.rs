//! Runtime value representation for column encoding and decoding.
//!
//! Every persistable property surfaces through accessors as a [`Value`],
//! letting the column machinery stay monomorphic while event types remain
//! plain structs. The tick-based timestamp newtypes round-trip the on-disk
//! representation exactly, with no clock or timezone library in the loop.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Number of 100-nanosecond ticks in one second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick count of the Unix epoch relative to the store epoch (0001-01-01).
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// A calendar timestamp stored as a raw tick count.
///
/// Ticks are 100-nanosecond intervals since the store epoch, 0001-01-01
/// 00:00:00. The value is persisted verbatim as 8 little-endian bytes, so
/// round-trips are exact regardless of platform.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Timestamp {
    ticks: i64,
}

impl Timestamp {
    /// Build a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Build a timestamp from whole seconds since the Unix epoch.
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self {
            ticks: UNIX_EPOCH_TICKS + seconds * TICKS_PER_SECOND,
        }
    }

    /// Returns the raw tick count.
    pub const fn ticks(self) -> i64 {
        self.ticks
    }
}

/// A timestamp paired with a UTC offset, both stored as raw tick counts.
///
/// Persisted as two 8-byte little-endian fields: the instant's ticks
/// followed by the offset's ticks.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TimestampTz {
    ticks: i64,
    offset_ticks: i64,
}

impl TimestampTz {
    /// Build a timestamp-with-offset from raw tick counts.
    pub const fn from_ticks(ticks: i64, offset_ticks: i64) -> Self {
        Self {
            ticks,
            offset_ticks,
        }
    }

    /// Returns the instant's raw tick count.
    pub const fn ticks(self) -> i64 {
        self.ticks
    }

    /// Returns the UTC offset as a raw tick count.
    pub const fn offset_ticks(self) -> i64 {
        self.offset_ticks
    }
}

/// One column value in transit between an event struct and its column file.
///
/// Accessors produce a `Value` per column on write and consume one per
/// column on read. `Null` stands for an absent value of a nullable column,
/// an absent nested object, or an absent array/list. Nested objects carry
/// their own column values positionally in [`Value::Record`]; arrays and
/// lists carry one such record per element in [`Value::Array`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value of a nullable column, nested object, array, or list.
    Null,
    /// Boolean, 1 byte.
    Bool(bool),
    /// Signed 8-bit integer.
    I8(i8),
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 128-bit unique identifier, 16 raw bytes.
    Uuid(Uuid),
    /// High-precision decimal, 16 bytes as four 32-bit words.
    Decimal(Decimal),
    /// Calendar timestamp, 8-byte tick count.
    Timestamp(Timestamp),
    /// Timestamp with UTC offset, 8 + 8 byte tick counts.
    TimestampTz(TimestampTz),
    /// Text, varint length prefix plus UTF-8 bytes.
    Str(String),
    /// Enumeration member, widened to `i64`; encoded at the declared
    /// underlying width.
    Enum(i64),
    /// A nested object's column values, in its schema's declaration order.
    Record(Vec<Value>),
    /// Array or list elements, each a nested record.
    Array(Vec<Vec<Value>>),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    pub(crate) fn shape(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::Uuid(_) => "uuid",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamp with offset",
            Self::Str(_) => "text",
            Self::Enum(_) => "enum",
            Self::Record(_) => "nested record",
            Self::Array(_) => "array",
        }
    }
}
