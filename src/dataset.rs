// src/dataset.rs
use crate::error::{ItpError, ItpResult};
use arrow::{
    array::{Array, ArrayRef},
    datatypes::SchemaRef,
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};

/// Names of the two key columns, resolved against a dataset's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    pub state: Vec<String>,
    pub entity: Vec<String>,
}

impl KeyColumns {
    pub fn new(state: &[String], entity: &[String]) -> Self {
        Self {
            state: state.to_vec(),
            entity: entity.to_vec(),
        }
    }
}

/// One reporting year's rows. Shared read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct YearlyDataset {
    year: u16,
    batch: RecordBatch,
    state_idx: usize,
    entity_idx: usize,
}

impl YearlyDataset {
    /// Wrap a batch, locating the key columns by the first candidate name present.
    pub fn new(year: u16, batch: RecordBatch, keys: &KeyColumns) -> ItpResult<Self> {
        let schema = batch.schema();
        let find = |candidates: &[String], what: &str| {
            candidates
                .iter()
                .find_map(|name| schema.index_of(name).ok())
                .ok_or_else(|| {
                    ItpError::parse(
                        year,
                        format!("no {} column; expected one of {:?}", what, candidates),
                    )
                })
        };
        let state_idx = find(&keys.state, "state")?;
        let entity_idx = find(&keys.entity, "entity")?;
        Ok(Self {
            year,
            batch,
            state_idx,
            entity_idx,
        })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Stringified cell; `None` for nulls or out-of-range positions.
    pub fn cell(&self, row: usize, col: usize) -> Option<String> {
        if col >= self.batch.num_columns() || row >= self.batch.num_rows() {
            return None;
        }
        cell_string(self.batch.column(col), row)
    }

    pub fn state_column(&self) -> &str {
        self.batch.schema_ref().field(self.state_idx).name()
    }

    pub fn entity_column(&self) -> &str {
        self.batch.schema_ref().field(self.entity_idx).name()
    }

    pub fn state_at(&self, row: usize) -> Option<String> {
        self.cell(row, self.state_idx)
    }

    pub fn entity_at(&self, row: usize) -> Option<String> {
        self.cell(row, self.entity_idx)
    }

    /// Same rows, labelled as another year.
    pub fn relabel(&self, year: u16) -> Self {
        Self {
            year,
            ..self.clone()
        }
    }
}

pub(crate) fn cell_string(array: &ArrayRef, row: usize) -> Option<String> {
    if array.is_null(row) {
        return None;
    }
    array_value_to_string(array, row).ok()
}
