// src/process/mod.rs
use crate::{
    dataset::{KeyColumns, YearlyDataset},
    error::ItpResult,
};
use tracing::info;

pub mod archive;
pub mod loader;
pub mod utils;

pub use archive::{list_members, read_member, ArchiveMember};
pub use loader::{load_dataset, parse_csv, ColumnHint, TypeHints};

/// ZIP bytes → chosen CSV member → dataset.
#[tracing::instrument(level = "info", skip(bytes, keys), fields(bytes = bytes.len()))]
pub fn dataset_from_zip(
    year: u16,
    bytes: &[u8],
    member: &str,
    keys: &KeyColumns,
) -> ItpResult<YearlyDataset> {
    let ArchiveMember { name, text } = read_member(year, bytes, member)?;
    let ds = load_dataset(year, &text, keys)?;
    info!(member = %name, rows = ds.num_rows(), columns = ds.num_columns(), "loaded");
    Ok(ds)
}
