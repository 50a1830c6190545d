//! Parquet reading and writing for profile tables.

use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

fn open(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(ScreenError::FileNotFound(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

/// Column names from a Parquet footer, without reading any row group.
pub fn parquet_column_names(path: &Path) -> Result<Vec<String>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?)?;
    Ok(builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect())
}

/// Convert one Arrow column into cell values.
fn array_to_variables(array: &ArrayRef) -> Result<Vec<Variable>> {
    let n = array.len();
    let values = match array.data_type() {
        DataType::Boolean => {
            let arr = array.as_boolean();
            (0..n)
                .map(|i| if arr.is_null(i) { Variable::Missing } else { Variable::Boolean(arr.value(i)) })
                .collect()
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let casted = cast(array, &DataType::Int64)?;
            let arr = casted.as_primitive::<Int64Type>();
            (0..n)
                .map(|i| if arr.is_null(i) { Variable::Missing } else { Variable::Ordinal(arr.value(i)) })
                .collect()
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            let casted = cast(array, &DataType::Float64)?;
            let arr = casted.as_primitive::<Float64Type>();
            (0..n)
                .map(|i| if arr.is_null(i) { Variable::Missing } else { Variable::Continuous(arr.value(i)) })
                .collect()
        }
        _ => {
            let casted = cast(array, &DataType::Utf8)?;
            let arr = casted.as_string::<i32>();
            (0..n)
                .map(|i| {
                    if arr.is_null(i) {
                        Variable::Missing
                    } else {
                        Variable::Categorical(arr.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

/// Read a whole Parquet file into a table.
pub fn read_parquet(path: &Path) -> Result<ProfileTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(open(path)?)?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut columns: Vec<Vec<Variable>> = vec![Vec::new(); names.len()];
    for batch in reader {
        let batch = batch?;
        for (idx, column) in columns.iter_mut().enumerate() {
            column.extend(array_to_variables(batch.column(idx))?);
        }
    }

    ProfileTable::from_columns(names.into_iter().zip(columns).collect())
}

/// Pick an Arrow type for a column and build the array.
fn variables_to_array(values: &[Variable]) -> (DataType, ArrayRef) {
    let present = || values.iter().filter(|v| !matches!(v, Variable::Missing));
    let has_values = present().next().is_some();

    if has_values && present().all(|v| matches!(v, Variable::Ordinal(_))) {
        let arr: Int64Array = values.iter().map(Variable::as_ordinal).collect();
        (DataType::Int64, Arc::new(arr))
    } else if has_values && present().all(|v| v.as_f64().is_some()) {
        let arr: Float64Array = values.iter().map(Variable::as_f64).collect();
        (DataType::Float64, Arc::new(arr))
    } else if has_values && present().all(|v| matches!(v, Variable::Boolean(_))) {
        let arr: BooleanArray = values.iter().map(Variable::as_bool).collect();
        (DataType::Boolean, Arc::new(arr))
    } else {
        let arr: StringArray = values
            .iter()
            .map(|v| if v.is_missing() { None } else { Some(v.to_string()) })
            .collect();
        (DataType::Utf8, Arc::new(arr))
    }
}

/// Write a table to a Snappy-compressed Parquet file.
pub fn write_parquet(table: &ProfileTable, path: &Path) -> Result<()> {
    if table.n_columns() == 0 {
        return Err(ScreenError::EmptyData(
            "cannot write a table without columns".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(table.n_columns());
    let mut arrays = Vec::with_capacity(table.n_columns());
    for (name, values) in table.iter_columns() {
        let (data_type, array) = variables_to_array(values);
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}
