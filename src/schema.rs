//! Schema descriptions for persisted types.
//!
//! A [`TypeSchema`] is the explicit, declaration-ordered list of columns a
//! type persists. Column files carry no keys: the i-th value of every column
//! file jointly describes the i-th record of the type, so the schema must be
//! identical between the writer and every reader of that type, by name *and*
//! position. Reordering or renaming columns between write and read sessions
//! silently corrupts data.
//!
//! Schemas are declared once per type through [`Persist`], which also
//! supplies positional accessors. Accessor wiring happens at schema
//! declaration time, not per value.

use std::fmt;
use std::sync::Arc;

use crate::codec::CodecRegistry;
use crate::error::{Error, Result};
use crate::value::Value;

/// Value-type tag of a single column, driving codec selection.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Boolean, 1 byte.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 128-bit unique identifier, 16 raw bytes.
    Uuid,
    /// High-precision decimal, 16 bytes.
    Decimal,
    /// Calendar timestamp, 8-byte tick count.
    Timestamp,
    /// Timestamp with UTC offset, two 8-byte tick counts.
    TimestampTz,
    /// Text, varint length prefix plus UTF-8 bytes.
    Str,
    /// Enumeration encoded at its declared underlying integer width.
    ///
    /// Only widths of 8, 16, and 32 bits are supported; anything else is
    /// rejected when a reader or writer is constructed.
    Enum {
        /// Underlying integer width in bits.
        bits: u8,
    },
    /// Nested object with its own columns, stored under a dotted sub-path.
    Nested(Arc<TypeSchema>),
    /// Fixed array of nested elements, at most 65535 per record.
    Array(Arc<TypeSchema>),
    /// Growable list of nested elements, at most 65535 per record.
    List(Arc<TypeSchema>),
    /// Caller-registered custom type, delegated entirely to its codec.
    Custom(&'static str),
}

impl ColumnType {
    /// Whether values of this type carry their own presence flag.
    ///
    /// Nested objects, arrays, and lists always encode a leading presence
    /// byte, so marking them nullable in addition is redundant.
    pub(crate) fn has_inherent_presence(&self) -> bool {
        matches!(self, Self::Nested(_) | Self::Array(_) | Self::List(_))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::I8 => f.write_str("i8"),
            Self::U8 => f.write_str("u8"),
            Self::I16 => f.write_str("i16"),
            Self::U16 => f.write_str("u16"),
            Self::I32 => f.write_str("i32"),
            Self::U32 => f.write_str("u32"),
            Self::I64 => f.write_str("i64"),
            Self::U64 => f.write_str("u64"),
            Self::Uuid => f.write_str("uuid"),
            Self::Decimal => f.write_str("decimal"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::TimestampTz => f.write_str("timestamp with offset"),
            Self::Str => f.write_str("text"),
            Self::Enum { bits } => write!(f, "enum/{bits}"),
            Self::Nested(schema) => write!(f, "nested {}", schema.name()),
            Self::Array(schema) => write!(f, "array of {}", schema.name()),
            Self::List(schema) => write!(f, "list of {}", schema.name()),
            Self::Custom(name) => write!(f, "custom {name}"),
        }
    }
}

/// One column declaration: property name, value type, and nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Property name; doubles as the column file's base name.
    pub name: String,
    /// Value-type tag.
    pub ty: ColumnType,
    /// Whether the encoded value is prefixed with a presence flag.
    pub nullable: bool,
}

/// Immutable, declaration-ordered schema of one persisted type.
///
/// Created once per distinct type via [`TypeSchema::builder`] and looked up
/// by full type name in the persisted type registry.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TypeSchema {
    /// Start building a schema for the given full type name.
    ///
    /// The name doubles as the on-disk folder for the type's column files,
    /// so it must be stable across sessions.
    pub fn builder(name: impl Into<String>) -> TypeSchemaBuilder {
        TypeSchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Full type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Looks up a column by property name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Checks every column (recursively) against the supported encoding
    /// rules and the set of registered custom codecs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedColumn`] for an enumeration whose
    /// underlying width is not 8, 16, or 32 bits, or a custom column whose
    /// codec is unregistered. Called whenever a reader or writer is
    /// constructed, so misconfiguration never surfaces at data time.
    pub(crate) fn validate(&self, codecs: &CodecRegistry) -> Result<()> {
        for column in &self.columns {
            match &column.ty {
                ColumnType::Enum { bits } if !matches!(bits, 8 | 16 | 32) => {
                    return Err(Error::UnsupportedColumn {
                        type_name: self.name.clone(),
                        column: column.name.clone(),
                        reason: format!(
                            "enum underlying width must be 8, 16, or 32 bits, got {bits}"
                        ),
                    });
                }
                ColumnType::Custom(codec_name) if !codecs.contains(codec_name) => {
                    return Err(Error::UnsupportedColumn {
                        type_name: self.name.clone(),
                        column: column.name.clone(),
                        reason: format!("no codec registered under `{codec_name}`"),
                    });
                }
                ColumnType::Nested(inner) | ColumnType::Array(inner) | ColumnType::List(inner) => {
                    inner.validate(codecs)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Builder for [`TypeSchema`], declaring columns in persistence order.
#[derive(Debug)]
pub struct TypeSchemaBuilder {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TypeSchemaBuilder {
    /// Declare a non-nullable column.
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Declare a nullable column: a 1-byte presence flag precedes the value.
    ///
    /// Nested objects, arrays, and lists already carry a presence flag and
    /// should be declared with [`TypeSchemaBuilder::column`].
    pub fn nullable(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        let nullable = !ty.has_inherent_presence();
        self.columns.push(ColumnDef {
            name: name.into(),
            ty,
            nullable,
        });
        self
    }

    /// Finish the schema.
    pub fn build(self) -> TypeSchema {
        TypeSchema {
            name: self.name,
            columns: self.columns,
        }
    }
}

/// A persisted event type: declared schema plus positional accessors.
///
/// Implementations enumerate their columns once in [`Persist::schema`] and
/// move values in and out by column ordinal. The ordinals passed to
/// [`Persist::get`] and [`Persist::set`] always match the schema's
/// declaration order.
///
/// # Examples
///
/// ```
/// use eventcol::{ColumnType, Persist, TypeSchema, Value};
///
/// #[derive(Debug, Default)]
/// struct Deposited {
///     account: u32,
///     amount_cents: i64,
/// }
///
/// impl Persist for Deposited {
///     fn schema() -> TypeSchema {
///         TypeSchema::builder("bank.Deposited")
///             .column("Account", ColumnType::U32)
///             .column("AmountCents", ColumnType::I64)
///             .build()
///     }
///
///     fn get(&self, column: usize) -> Value {
///         match column {
///             0 => Value::U32(self.account),
///             _ => Value::I64(self.amount_cents),
///         }
///     }
///
///     fn set(&mut self, column: usize, value: Value) {
///         match (column, value) {
///             (0, Value::U32(v)) => self.account = v,
///             (1, Value::I64(v)) => self.amount_cents = v,
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait Persist: Default + 'static {
    /// The type's column schema, in persistence order.
    fn schema() -> TypeSchema;

    /// Extract the value of the column at `column` (schema ordinal).
    fn get(&self, column: usize) -> Value;

    /// Store a decoded value into the column at `column` (schema ordinal).
    fn set(&mut self, column: usize, value: Value);

    /// Collect all column values in declaration order.
    ///
    /// Convenience for building [`Value::Record`] from a nested object
    /// inside a parent accessor.
    fn to_values(&self) -> Vec<Value> {
        let count = Self::schema().columns().len();
        (0..count).map(|i| self.get(i)).collect()
    }

    /// Apply column values in declaration order.
    ///
    /// Convenience for rebuilding a nested object from [`Value::Record`]
    /// inside a parent's `set`.
    fn apply_values(&mut self, values: Vec<Value>) {
        for (i, value) in values.into_iter().enumerate() {
            self.set(i, value);
        }
    }
}

/// Validates that `view` may substitute for `storage` in a projection.
///
/// Every view column must exist on the storage type with an identical name,
/// type tag, and nullability; the view may declare them in any order and
/// may omit storage columns it does not need.
///
/// # Errors
///
/// Returns [`Error::ProxyMismatch`] naming the first incompatible column.
pub(crate) fn check_proxy(view: &TypeSchema, storage: &TypeSchema) -> Result<()> {
    for column in view.columns() {
        let Some(stored) = storage.column(&column.name) else {
            return Err(Error::ProxyMismatch {
                view: view.name().to_string(),
                storage: storage.name().to_string(),
                column: column.name.clone(),
                reason: "is not declared by the storage type".to_string(),
            });
        };
        if stored.ty != column.ty {
            return Err(Error::ProxyMismatch {
                view: view.name().to_string(),
                storage: storage.name().to_string(),
                column: column.name.clone(),
                reason: format!("is declared as {} but stored as {}", column.ty, stored.ty),
            });
        }
        if stored.nullable != column.nullable {
            return Err(Error::ProxyMismatch {
                view: view.name().to_string(),
                storage: storage.name().to_string(),
                column: column.name.clone(),
                reason: "differs in nullability from the stored column".to_string(),
            });
        }
    }
    Ok(())
}
