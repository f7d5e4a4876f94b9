//! Row types ↔ Arrow `RecordBatch`
//!
//! Tables live in memory as `Vec<Row>`; Arrow is only the persistence
//! format. Decoding looks columns up by name, so a row type can be read
//! back out of a wider merged table. A row type whose columns depend on
//! configuration (survival flags per follow-up year) carries that in its
//! `Layout`; fixed row types use `()`.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Int8Array, Int32Array, RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Float64Type, Int8Type, Int32Type, SchemaRef};

use crate::error::{Error, Result};

/// A row type with an Arrow column layout.
pub trait Columnar: Sized {
    type Layout;

    /// Column definitions, in output order.
    fn fields(layout: &Self::Layout) -> Vec<Field>;

    /// Arrays for `rows`, one per entry of [`fields`](Columnar::fields).
    fn columns(layout: &Self::Layout, rows: &[Self]) -> Vec<ArrayRef>;

    /// Decode rows from a batch holding (at least) this type's columns.
    fn decode(layout: &Self::Layout, batch: &RecordBatch) -> Result<Vec<Self>>;

    fn schema(layout: &Self::Layout) -> SchemaRef {
        Arc::new(arrow::datatypes::Schema::new(Self::fields(layout)))
    }

    fn to_batch(layout: &Self::Layout, rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(layout),
            Self::columns(layout, rows),
        )?)
    }

    fn decode_all(layout: &Self::Layout, batches: &[RecordBatch]) -> Result<Vec<Self>> {
        let mut out = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());
        for batch in batches {
            out.extend(Self::decode(layout, batch)?);
        }
        Ok(out)
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str, expected: &DataType) -> Result<&'a ArrayRef> {
    let col = batch.column_by_name(name).ok_or_else(|| {
        Error::Arrow(arrow::error::ArrowError::SchemaError(format!(
            "missing column {name}"
        )))
    })?;
    if col.data_type() != expected {
        return Err(Error::Arrow(arrow::error::ArrowError::SchemaError(format!(
            "column {name}: expected {expected}, found {}",
            col.data_type()
        ))));
    }
    Ok(col)
}

pub fn utf8_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<String>>> {
    let arr = column(batch, name, &DataType::Utf8)?.as_string::<i32>();
    Ok(arr.iter().map(|v| v.map(str::to_string)).collect())
}

/// Non-null text column; a null here means the artifact is corrupt.
pub fn utf8_required(batch: &RecordBatch, name: &str) -> Result<Vec<String>> {
    utf8_values(batch, name)?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                Error::Arrow(arrow::error::ArrowError::InvalidArgumentError(format!(
                    "null in non-nullable column {name}"
                )))
            })
        })
        .collect()
}

pub fn i32_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<i32>>> {
    let arr = column(batch, name, &DataType::Int32)?.as_primitive::<Int32Type>();
    Ok(arr.iter().collect())
}

pub fn i8_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<i8>>> {
    let arr = column(batch, name, &DataType::Int8)?.as_primitive::<Int8Type>();
    Ok(arr.iter().collect())
}

pub fn f64_values(batch: &RecordBatch, name: &str) -> Result<Vec<Option<f64>>> {
    let arr = column(batch, name, &DataType::Float64)?.as_primitive::<Float64Type>();
    Ok(arr.iter().collect())
}

pub fn utf8_array<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

pub fn i32_array(values: impl Iterator<Item = Option<i32>>) -> ArrayRef {
    Arc::new(values.collect::<Int32Array>())
}

pub fn i8_array(values: impl Iterator<Item = Option<i8>>) -> ArrayRef {
    Arc::new(values.collect::<Int8Array>())
}

pub fn f64_array(values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
    Arc::new(values.collect::<Float64Array>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Row {
        id: String,
        n: Option<i32>,
    }

    impl Columnar for Row {
        type Layout = ();

        fn fields(_: &()) -> Vec<Field> {
            vec![
                Field::new("id", DataType::Utf8, false),
                Field::new("n", DataType::Int32, true),
            ]
        }

        fn columns(_: &(), rows: &[Self]) -> Vec<ArrayRef> {
            vec![
                utf8_array(rows.iter().map(|r| Some(r.id.as_str()))),
                i32_array(rows.iter().map(|r| r.n)),
            ]
        }

        fn decode(_: &(), batch: &RecordBatch) -> Result<Vec<Self>> {
            let id = utf8_required(batch, "id")?;
            let n = i32_values(batch, "n")?;
            Ok(id
                .into_iter()
                .zip(n)
                .map(|(id, n)| Row { id, n })
                .collect())
        }
    }

    #[test]
    fn batch_round_trip_keeps_nulls() {
        let rows = vec![
            Row {
                id: "a".into(),
                n: Some(1),
            },
            Row {
                id: "b".into(),
                n: None,
            },
        ];
        let batch = Row::to_batch(&(), &rows).unwrap();
        assert_eq!(Row::decode(&(), &batch).unwrap(), rows);
    }

    #[test]
    fn empty_rows_produce_empty_batch() {
        let batch = Row::to_batch(&(), &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn missing_column_is_error() {
        let batch = Row::to_batch(&(), &[]).unwrap();
        assert!(f64_values(&batch, "nope").is_err());
    }

    #[test]
    fn wrong_type_is_error() {
        let batch = Row::to_batch(&(), &[]).unwrap();
        assert!(f64_values(&batch, "n").is_err());
    }
}
