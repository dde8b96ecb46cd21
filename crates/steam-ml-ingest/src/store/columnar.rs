//! Parquet encoding/decoding of tagged-scalar records.
//!
//! Snapshots have no fixed schema. Each column's physical type is inferred
//! from every non-null value in the table being written:
//!
//! | values present            | Arrow type |
//! |---------------------------|------------|
//! | only booleans             | `Boolean`  |
//! | only integers             | `Int64`    |
//! | integers and/or floats    | `Float64`  |
//! | only strings, or nothing  | `Utf8`     |
//! | any other mixture         | `Utf8` (every value rendered as text) |
//!
//! Since the whole table is retyped on each write and text reads back as
//! text, a column that was coerced to `Utf8` once stays `Utf8`.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::compute::{cast, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::ChunkReader;
use parquet::format::KeyValue;
use steam_ml_common::types::{Record, Scalar};

#[derive(Debug, thiserror::Error)]
pub enum ColumnarError {
    #[error("arrow: {0}")]
    Arrow(#[from] ArrowError),

    #[error("parquet: {0}")]
    Parquet(#[from] ParquetError),
}

/// Physical type chosen for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnType {
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Scalar>) -> Self {
        let mut seen: Option<ColumnType> = None;

        for value in values {
            let current = match value {
                Scalar::Null => continue,
                Scalar::Bool(_) => ColumnType::Boolean,
                Scalar::Int(_) => ColumnType::Int64,
                Scalar::Float(_) => ColumnType::Float64,
                Scalar::Str(_) => ColumnType::Utf8,
            };

            seen = Some(match (seen, current) {
                (None, t) => t,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Int64), ColumnType::Float64)
                | (Some(ColumnType::Float64), ColumnType::Int64) => ColumnType::Float64,
                _ => return ColumnType::Utf8,
            });
        }

        seen.unwrap_or(ColumnType::Utf8)
    }

    fn data_type(self) -> DataType {
        match self {
            ColumnType::Boolean => DataType::Boolean,
            ColumnType::Int64 => DataType::Int64,
            ColumnType::Float64 => DataType::Float64,
            ColumnType::Utf8 => DataType::Utf8,
        }
    }
}

/// Union of the record keys: `seed` first, then first-seen order.
pub fn column_order(records: &[Record], seed: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    let keys = seed
        .iter()
        .copied()
        .chain(records.iter().flat_map(|r| r.keys().map(String::as_str)));
    for key in keys {
        if seen.insert(key) {
            columns.push(key.to_string());
        }
    }
    columns
}

fn build_array(ty: ColumnType, cells: &[&Scalar]) -> ArrayRef {
    match ty {
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            cells
                .iter()
                .map(|v| match v {
                    Scalar::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Int64 => Arc::new(Int64Array::from(
            cells
                .iter()
                .map(|v| match v {
                    Scalar::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float64 => Arc::new(Float64Array::from(
            cells
                .iter()
                .map(|v| match v {
                    Scalar::Int(i) => Some(*i as f64),
                    Scalar::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Utf8 => Arc::new(StringArray::from(
            cells
                .iter()
                .map(|v| (!v.is_null()).then(|| v.render()))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Build one record batch holding `records` under `columns`.
///
/// Keys of a record that are missing from `columns` are ignored; columns a
/// record lacks are null for that row.
pub fn encode_batch(records: &[Record], columns: &[String]) -> Result<RecordBatch, ColumnarError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for name in columns {
        let cells: Vec<&Scalar> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&Scalar::Null))
            .collect();
        let ty = ColumnType::infer(cells.iter().copied());

        fields.push(Field::new(name.as_str(), ty.data_type(), true));
        arrays.push(build_array(ty, &cells));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

fn writer_properties() -> WriterProperties {
    let created_by = KeyValue {
        key: "created_by".to_string(),
        value: Some("steam-ml".to_string()),
    };
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![created_by]))
        .build()
}

/// Serialize a batch as a complete Parquet file into `sink`.
pub fn write_parquet<W: Write + Send>(sink: W, batch: &RecordBatch) -> Result<(), ColumnarError> {
    let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(writer_properties()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Contents of a decoded Parquet file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column names in schema order, including columns with no rows
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// Decode every row of a Parquet file back into records.
///
/// Null cells are kept as [`Scalar::Null`] so that all-null columns survive a
/// read-modify-write cycle.
pub fn read_parquet<R: ChunkReader + 'static>(source: R) -> Result<Table, ColumnarError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(source)?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();

    let mut records = Vec::new();
    for batch in builder.build()? {
        decode_batch(&batch?, &mut records)?;
    }
    Ok(Table { columns, records })
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<Record>) -> Result<(), ColumnarError> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(column_scalars)
        .collect::<Result<Vec<_>, _>>()?;

    for row in 0..batch.num_rows() {
        let record = schema
            .fields()
            .iter()
            .zip(&columns)
            .map(|(field, values)| (field.name().clone(), values[row].clone()))
            .collect();
        out.push(record);
    }
    Ok(())
}

fn column_scalars(array: &ArrayRef) -> Result<Vec<Scalar>, ArrowError> {
    let len = array.len();

    let values = match array.data_type() {
        DataType::Null => vec![Scalar::Null; len],
        DataType::Boolean => {
            let col = array.as_boolean();
            (0..len)
                .map(|i| if col.is_null(i) { Scalar::Null } else { Scalar::Bool(col.value(i)) })
                .collect()
        },
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            // Unsigned values beyond i64::MAX are an error, not a null
            let checked = CastOptions {
                safe: false,
                ..CastOptions::default()
            };
            let widened = cast_with_options(array.as_ref(), &DataType::Int64, &checked)?;
            let col = widened.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| if col.is_null(i) { Scalar::Null } else { Scalar::Int(col.value(i)) })
                .collect()
        },
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let widened = cast(array.as_ref(), &DataType::Float64)?;
            let col = widened.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| if col.is_null(i) { Scalar::Null } else { Scalar::Float(col.value(i)) })
                .collect()
        },
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let narrowed = cast(array.as_ref(), &DataType::Utf8)?;
            let col = narrowed.as_string::<i32>();
            (0..len)
                .map(|i| {
                    if col.is_null(i) {
                        Scalar::Null
                    } else {
                        Scalar::Str(col.value(i).to_string())
                    }
                })
                .collect()
        },
        // Dates, decimals, nested types from foreign writers: keep them as text.
        _ => (0..len)
            .map(|i| {
                if array.is_null(i) {
                    Ok(Scalar::Null)
                } else {
                    array_value_to_string(array.as_ref(), i).map(Scalar::Str)
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(values)
}
