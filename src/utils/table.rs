//! Feature-table extraction from polars DataFrames

use crate::error::{LimebagError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Column names in table order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

/// Extract named columns into a row-major `Array2<f64>`.
/// Every column must be castable to Float64 and free of nulls.
pub fn table_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let column = df
                .column(col_name)
                .map_err(|_| LimebagError::FeatureNotFound(col_name.clone()))?;
            column_values(column, col_name)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

/// Extract a label column as `Array1<f64>`
pub fn labels_to_array1(df: &DataFrame, label_column: &str) -> Result<Array1<f64>> {
    let column = df
        .column(label_column)
        .map_err(|_| LimebagError::FeatureNotFound(label_column.to_string()))?;
    Ok(Array1::from_vec(column_values(column, label_column)?))
}

fn column_values(column: &Column, name: &str) -> Result<Vec<f64>> {
    let as_f64 = column.cast(&DataType::Float64).map_err(|e| {
        LimebagError::DataError(format!("column '{}' is not numeric: {}", name, e))
    })?;
    as_f64
        .f64()
        .map_err(|e| LimebagError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| LimebagError::DataError(format!("column '{}' has missing values", name)))
        })
        .collect()
}
