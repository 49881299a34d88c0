//! Crate-level error types for store access, encoding, and projection runs.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by store, codec, and projection operations.
///
/// All failure modes are fatal: I/O is local-disk and sequential, so there
/// is nothing sensible to retry. Configuration problems (unsupported column
/// shapes, incompatible proxies, unknown handled types) surface when readers
/// and writers are constructed, never on first data access.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required store file is missing.
    ///
    /// Raised at open time when `records.idx` or `types.idx` does not
    /// exist under the store directory. There is no partial-store recovery.
    #[error("store file not found: {0}")]
    StoreNotFound(PathBuf),

    /// The global record index or the type registry is damaged.
    ///
    /// Covers truncation mid-entry (an odd byte count in `records.idx`,
    /// or a `types.idx` entry cut short) and duplicate registry entries.
    #[error("corrupt index {path}: {reason}")]
    CorruptIndex {
        /// The damaged file.
        path: PathBuf,
        /// What failed to parse.
        reason: String,
    },

    /// A column's declared shape has no encoding rule.
    ///
    /// Includes enumerations whose underlying width is not 8, 16, or 32
    /// bits, and custom columns whose codec was never registered. Raised
    /// when a column writer or reader is constructed.
    #[error("unsupported column `{column}` on `{type_name}`: {reason}")]
    UnsupportedColumn {
        /// Full name of the type declaring the column.
        type_name: String,
        /// The offending property name.
        column: String,
        /// Why no codec could be selected.
        reason: String,
    },

    /// A projection registered a handler for a type that was never stored.
    ///
    /// The type registry has no id for the handler's storage type, so no
    /// column files can exist for it. Raised at registration time.
    #[error("no events of type `{0}` have ever been recorded")]
    UnknownHandledType(String),

    /// A proxy view declares a column its storage type does not have.
    ///
    /// Every view column must exist on the storage type by identical name,
    /// type tag, and nullability. Raised at registration time, before any
    /// data is read.
    #[error("proxy `{view}` is incompatible with `{storage}`: column `{column}` {reason}")]
    ProxyMismatch {
        /// Full name of the view type.
        view: String,
        /// Full name of the storage type being substituted.
        storage: String,
        /// The view column that failed validation.
        column: String,
        /// How it diverges from the stored column.
        reason: String,
    },

    /// An accessor produced a value that contradicts the declared schema.
    ///
    /// For example, a column declared `i32` whose accessor returned a
    /// string, or a non-nullable column handed `Value::Null`.
    #[error("column `{column}` expected a {expected} value, got {actual}")]
    ColumnTypeMismatch {
        /// The property whose accessor misbehaved.
        column: String,
        /// The value shape the schema declares.
        expected: String,
        /// The value shape the accessor produced.
        actual: String,
    },

    /// A record carried the wrong number of column values.
    #[error("record for `{type_name}` carried {actual} values, schema declares {expected}")]
    RecordArity {
        /// Full name of the type being encoded or decoded.
        type_name: String,
        /// Column count the schema declares.
        expected: usize,
        /// Value count actually supplied.
        actual: usize,
    },

    /// The 16-bit type id space is exhausted.
    #[error("type id space exhausted: cannot register more than 65536 types")]
    TypeSpaceExhausted,

    /// The writer refused an append after an earlier one failed.
    ///
    /// A failed append can leave a type's column files at unequal lengths,
    /// and any further append would skew positions for good. The handle
    /// must be discarded and a fresh writer opened.
    #[error("writer poisoned by an earlier failed append; discard it and open a new one")]
    WriterPoisoned,

    /// Disk I/O failure.
    ///
    /// An underlying filesystem error occurred while reading or appending
    /// store files. Propagates immediately and aborts the run.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
