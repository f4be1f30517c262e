// src/process/loader.rs
use super::utils::{dedupe_headers, infer_column_type};
use crate::{
    dataset::{KeyColumns, YearlyDataset},
    error::{ItpError, ItpResult},
};
use arrow::{
    array::{ArrayRef, DictionaryArray, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Int32Type, Schema},
    record_batch::RecordBatch,
};
use csv::ReaderBuilder;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, info, instrument};

pub const DELIMITER: u8 = b';';

/// Forced type for a named column, bypassing inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnHint {
    Categorical,
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct TypeHints(HashMap<String, ColumnHint>);

impl TypeHints {
    pub fn with(mut self, column: impl Into<String>, hint: ColumnHint) -> Self {
        self.0.insert(column.into(), hint);
        self
    }

    /// State candidates are categorical, entity candidates plain text.
    pub fn for_keys(keys: &KeyColumns) -> Self {
        let mut hints = TypeHints::default();
        for c in &keys.state {
            hints = hints.with(c.clone(), ColumnHint::Categorical);
        }
        for c in &keys.entity {
            hints = hints.with(c.clone(), ColumnHint::Text);
        }
        hints
    }

    pub fn get(&self, column: &str) -> Option<ColumnHint> {
        self.0.get(column).copied()
    }
}

/// Parse `;`-separated text into one Arrow batch, header names verbatim.
#[instrument(level = "info", skip(text, hints), fields(chars = text.len()))]
pub fn parse_csv(year: u16, text: &str, hints: &TypeHints) -> ItpResult<RecordBatch> {
    let start = Instant::now();
    let mut rdr = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ItpError::parse(year, format!("reading header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();
    if raw_headers.is_empty() || raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ItpError::parse(year, "missing header row"));
    }
    let headers = dedupe_headers(&raw_headers);
    let width = headers.len();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    for (idx, result) in rdr.records().enumerate() {
        let record = result
            .map_err(|e| ItpError::parse(year, format!("record {}: {}", idx + 1, e)))?;
        if record.len() > width {
            let line = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 2);
            return Err(ItpError::parse(
                year,
                format!(
                    "line {}: expected {} fields, saw {}",
                    line,
                    width,
                    record.len()
                ),
            ));
        }
        for (col, slot) in columns.iter_mut().enumerate() {
            let value = record.get(col).filter(|v| !v.is_empty()).map(str::to_string);
            slot.push(value);
        }
    }

    let mut fields = Vec::with_capacity(width);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(width);
    for (name, values) in headers.iter().zip(columns.iter()) {
        let (dtype, array) = build_column(values, hints.get(name));
        fields.push(Field::new(name, dtype, true));
        arrays.push(array);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|e| ItpError::parse(year, e.to_string()))?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        elapsed = ?start.elapsed(),
        "parsed"
    );
    Ok(batch)
}

/// Parse and wrap as a dataset with resolved key columns.
pub fn load_dataset(year: u16, text: &str, keys: &KeyColumns) -> ItpResult<YearlyDataset> {
    let batch = parse_csv(year, text, &TypeHints::for_keys(keys))?;
    YearlyDataset::new(year, batch, keys)
}

fn build_column(values: &[Option<String>], hint: Option<ColumnHint>) -> (DataType, ArrayRef) {
    let strs = || values.iter().map(|v| v.as_deref());
    let dtype = match hint {
        Some(ColumnHint::Categorical) => {
            let dict: DictionaryArray<Int32Type> = strs().collect();
            return (
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                Arc::new(dict),
            );
        }
        Some(ColumnHint::Text) => DataType::Utf8,
        None => infer_column_type(strs()),
    };
    debug!(?dtype, "column typed");

    let array: ArrayRef = match dtype {
        DataType::Int64 => Arc::new(
            strs()
                .map(|v| v.and_then(|s| s.trim().parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
        DataType::Float64 => Arc::new(
            strs()
                .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        _ => Arc::new(strs().collect::<StringArray>()),
    };
    (dtype, array)
}
