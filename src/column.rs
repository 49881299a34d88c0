//! The per-type column store: one append-only file per property.
//!
//! A [`RecordWriter`] owns one [`ColumnWriter`] per column of its type and
//! appends one encoded value to each, in declaration order, per record. A
//! [`RecordReader`] scans the same files sequentially, advancing every
//! column by exactly one value per record. Records are never materialized
//! on disk: the i-th value of each column file jointly *is* the i-th
//! record.
//!
//! Nested objects, arrays, and lists recurse into a sub-store whose column
//! files live in the same folder under a dotted prefix
//! (`Parent.Child.col`), one level deeper per nesting level.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::codec::{self, CodecRegistry, CustomCodec};
use crate::decimal::DecimalReader;
use crate::error::{Error, Result};
use crate::schema::{ColumnDef, ColumnType, Persist, TypeSchema};
use crate::storage::column_file;
use crate::value::Value;

/// Read/write buffer per column file, matching the batch decoder's staging
/// size.
const COLUMN_BUFFER_SIZE: usize = 64 * 1024;

/// Longest encodable array or list; the element count is stored as a u16.
pub const MAX_SEQUENCE_LEN: usize = u16::MAX as usize;

fn null_mismatch(column: &str, ty: &ColumnType, value: &Value) -> Error {
    Error::ColumnTypeMismatch {
        column: column.to_string(),
        expected: ty.to_string(),
        actual: value.shape().to_string(),
    }
}

/// Appender for a single column file.
enum ColumnWriter {
    /// Built-in scalar encoding, with an optional presence flag.
    Scalar { def: ColumnDef, file: BufWriter<File> },
    /// Caller-registered codec; the pair owns the byte layout.
    Custom { codec: CustomCodec, file: BufWriter<File> },
    /// Nested object: presence byte here, columns in a dotted sub-store.
    Nested {
        def: ColumnDef,
        file: BufWriter<File>,
        inner: Box<RecordWriter>,
    },
    /// Array or list: presence byte and element count here, element
    /// columns in a dotted sub-store.
    Sequence {
        def: ColumnDef,
        file: BufWriter<File>,
        inner: Box<RecordWriter>,
    },
}

impl ColumnWriter {
    fn create(
        dir: &Path,
        prefix: &str,
        def: &ColumnDef,
        type_name: &str,
        codecs: &CodecRegistry,
    ) -> Result<Self> {
        let path = column_file(dir, prefix, &def.name);
        let file = BufWriter::with_capacity(
            COLUMN_BUFFER_SIZE,
            OpenOptions::new().create(true).append(true).open(&path)?,
        );

        let writer = match &def.ty {
            ColumnType::Custom(codec_name) => {
                let codec =
                    codecs
                        .get(codec_name)
                        .cloned()
                        .ok_or_else(|| Error::UnsupportedColumn {
                            type_name: type_name.to_string(),
                            column: def.name.clone(),
                            reason: format!("no codec registered under `{codec_name}`"),
                        })?;
                Self::Custom { codec, file }
            }
            ColumnType::Nested(schema) => Self::Nested {
                def: def.clone(),
                file,
                inner: Box::new(RecordWriter::open_columns(
                    dir,
                    &format!("{prefix}{}.", def.name),
                    schema,
                    codecs,
                )?),
            },
            ColumnType::Array(schema) | ColumnType::List(schema) => Self::Sequence {
                def: def.clone(),
                file,
                inner: Box::new(RecordWriter::open_columns(
                    dir,
                    &format!("{prefix}{}.", def.name),
                    schema,
                    codecs,
                )?),
            },
            _ => Self::Scalar {
                def: def.clone(),
                file,
            },
        };
        Ok(writer)
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match self {
            Self::Scalar { def, file } => match value {
                Value::Null if def.nullable => file.write_all(&[0]).map_err(Into::into),
                Value::Null => Err(null_mismatch(&def.name, &def.ty, value)),
                value => {
                    if def.nullable {
                        file.write_all(&[1])?;
                    }
                    codec::encode_scalar(file, &def.name, &def.ty, value)
                }
            },
            Self::Custom { codec, file } => codec.encode(value, file),
            Self::Nested { def, file, inner } => match value {
                Value::Null => file.write_all(&[0]).map_err(Into::into),
                Value::Record(values) => {
                    file.write_all(&[1])?;
                    inner.write_values(values)
                }
                value => Err(null_mismatch(&def.name, &def.ty, value)),
            },
            Self::Sequence { def, file, inner } => match value {
                Value::Null => file.write_all(&[0]).map_err(Into::into),
                Value::Array(elements) => {
                    // Longer sequences are out of contract: the stored
                    // count is a u16, so the tail past 65535 is dropped.
                    let count = elements.len().min(MAX_SEQUENCE_LEN);
                    file.write_all(&[1])?;
                    file.write_all(&(count as u16).to_le_bytes())?;
                    for element in &elements[..count] {
                        inner.write_values(element)?;
                    }
                    Ok(())
                }
                value => Err(null_mismatch(&def.name, &def.ty, value)),
            },
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Self::Scalar { file, .. } | Self::Custom { file, .. } => {
                file.flush().map_err(Into::into)
            }
            Self::Nested { file, inner, .. } | Self::Sequence { file, inner, .. } => {
                file.flush()?;
                inner.flush()
            }
        }
    }
}

/// Appender for all columns of one type, in declaration order.
///
/// Opened in append mode with shared reads allowed, so readers may trail a
/// live writer. Exactly one writer per store is assumed; there is no
/// write-write coordination.
pub(crate) struct RecordWriter {
    type_name: String,
    columns: Vec<ColumnWriter>,
}

// Manual `Debug`: column writers hold open files and no printable state.
impl std::fmt::Debug for RecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordWriter")
            .field("type_name", &self.type_name)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl RecordWriter {
    /// Opens (creating as needed) every column file of `schema` under `dir`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedColumn`] if any column shape has no
    /// encoding rule, before any file is touched for data.
    pub(crate) fn create(dir: &Path, schema: &TypeSchema, codecs: &CodecRegistry) -> Result<Self> {
        schema.validate(codecs)?;
        Self::open_columns(dir, "", schema, codecs)
    }

    fn open_columns(
        dir: &Path,
        prefix: &str,
        schema: &TypeSchema,
        codecs: &CodecRegistry,
    ) -> Result<Self> {
        let columns = schema
            .columns()
            .iter()
            .map(|def| ColumnWriter::create(dir, prefix, def, schema.name(), codecs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            type_name: schema.name().to_string(),
            columns,
        })
    }

    /// Appends one record: one value per column, in declaration order.
    pub(crate) fn append<T: Persist>(&mut self, event: &T) -> Result<()> {
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.write_value(&event.get(i))?;
        }
        Ok(())
    }

    /// Appends one record from positional values (nested elements).
    fn write_values(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::RecordArity {
                type_name: self.type_name.clone(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.write_value(value)?;
        }
        Ok(())
    }

    /// Drains buffered bytes of every column file to disk, recursively.
    pub(crate) fn flush(&mut self) -> Result<()> {
        for column in &mut self.columns {
            column.flush()?;
        }
        Ok(())
    }
}

/// Sequential scanner for a single column file.
enum ColumnReader {
    /// Built-in scalar decoding, with an optional presence flag.
    Scalar { def: ColumnDef, file: BufReader<File> },
    /// A non-nullable decimal column is a dense 16-byte run; decode it
    /// through the batch decoder instead of value-at-a-time reads.
    DecimalRun(DecimalReader<File>),
    /// Caller-registered codec.
    Custom { codec: CustomCodec, file: BufReader<File> },
    /// Nested object: presence byte here, columns in a dotted sub-store.
    Nested {
        file: BufReader<File>,
        inner: Box<RecordReader>,
    },
    /// Array or list: presence byte and element count here.
    Sequence {
        file: BufReader<File>,
        inner: Box<RecordReader>,
    },
}

impl ColumnReader {
    fn open(
        dir: &Path,
        prefix: &str,
        def: &ColumnDef,
        type_name: &str,
        codecs: &CodecRegistry,
    ) -> Result<Self> {
        let path = column_file(dir, prefix, &def.name);

        let reader = match &def.ty {
            ColumnType::Custom(codec_name) => {
                let codec =
                    codecs
                        .get(codec_name)
                        .cloned()
                        .ok_or_else(|| Error::UnsupportedColumn {
                            type_name: type_name.to_string(),
                            column: def.name.clone(),
                            reason: format!("no codec registered under `{codec_name}`"),
                        })?;
                Self::Custom {
                    codec,
                    file: BufReader::with_capacity(COLUMN_BUFFER_SIZE, File::open(&path)?),
                }
            }
            ColumnType::Decimal if !def.nullable => {
                Self::DecimalRun(DecimalReader::new(File::open(&path)?)?)
            }
            ColumnType::Nested(schema) => Self::Nested {
                file: BufReader::with_capacity(COLUMN_BUFFER_SIZE, File::open(&path)?),
                inner: Box::new(RecordReader::open_columns(
                    dir,
                    &format!("{prefix}{}.", def.name),
                    schema,
                    codecs,
                )?),
            },
            ColumnType::Array(schema) | ColumnType::List(schema) => Self::Sequence {
                file: BufReader::with_capacity(COLUMN_BUFFER_SIZE, File::open(&path)?),
                inner: Box::new(RecordReader::open_columns(
                    dir,
                    &format!("{prefix}{}.", def.name),
                    schema,
                    codecs,
                )?),
            },
            _ => Self::Scalar {
                def: def.clone(),
                file: BufReader::with_capacity(COLUMN_BUFFER_SIZE, File::open(&path)?),
            },
        };
        Ok(reader)
    }

    fn read_value(&mut self) -> Result<Value> {
        match self {
            Self::Scalar { def, file } => {
                if def.nullable && !read_presence(file)? {
                    return Ok(Value::Null);
                }
                codec::decode_scalar(file, &def.name, &def.ty)
            }
            Self::DecimalRun(decimals) => Ok(Value::Decimal(decimals.read_decimal()?)),
            Self::Custom { codec, file } => codec.decode(file),
            Self::Nested { file, inner } => {
                if !read_presence(file)? {
                    return Ok(Value::Null);
                }
                Ok(Value::Record(inner.read_record()?))
            }
            Self::Sequence { file, inner } => {
                if !read_presence(file)? {
                    return Ok(Value::Null);
                }
                let mut len_bytes = [0u8; 2];
                file.read_exact(&mut len_bytes)?;
                let count = usize::from(u16::from_le_bytes(len_bytes));
                let mut elements = Vec::with_capacity(count);
                for _ in 0..count {
                    elements.push(inner.read_record()?);
                }
                Ok(Value::Array(elements))
            }
        }
    }
}

fn read_presence(r: &mut impl Read) -> Result<bool> {
    let mut flag = [0u8; 1];
    r.read_exact(&mut flag)?;
    Ok(flag[0] != 0)
}

/// Sequential scanner for all columns of one type.
///
/// Every read advances each column file by exactly one value; skipping a
/// record is impossible by construction, which is what keeps the keyless
/// positional format coherent.
pub(crate) struct RecordReader {
    columns: Vec<ColumnReader>,
}

// Manual `Debug`: column readers hold open files and no printable state.
impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl RecordReader {
    /// Opens every column file of `schema` under `dir` for scanning.
    ///
    /// `schema` may be the folder type's own schema or a validated proxy
    /// view of it; only the columns it declares are opened.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedColumn`] for unmappable column
    /// shapes and propagates I/O failures (including a missing column
    /// file).
    pub(crate) fn open(dir: &Path, schema: &TypeSchema, codecs: &CodecRegistry) -> Result<Self> {
        schema.validate(codecs)?;
        Self::open_columns(dir, "", schema, codecs)
    }

    fn open_columns(
        dir: &Path,
        prefix: &str,
        schema: &TypeSchema,
        codecs: &CodecRegistry,
    ) -> Result<Self> {
        let columns = schema
            .columns()
            .iter()
            .map(|def| ColumnReader::open(dir, prefix, def, schema.name(), codecs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Decodes the next record into a caller-supplied instance.
    ///
    /// The hot path: projections reuse one scratch instance per type for
    /// an entire run, so replay allocates no instances.
    pub(crate) fn read_into<T: Persist>(&mut self, instance: &mut T) -> Result<()> {
        for (i, column) in self.columns.iter_mut().enumerate() {
            instance.set(i, column.read_value()?);
        }
        Ok(())
    }

    /// Decodes the next record into freshly allocated values.
    ///
    /// Used for elements nested inside arrays, lists, and objects, where
    /// many independent values must coexist.
    pub(crate) fn read_record(&mut self) -> Result<Vec<Value>> {
        self.columns
            .iter_mut()
            .map(ColumnReader::read_value)
            .collect()
    }
}
