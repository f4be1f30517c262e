// src/fetch/mod.rs
use crate::{
    config::{SourceConfig, YearConfig},
    error::ItpResult,
};
use std::{path::Path, sync::Arc};

pub mod local;
pub mod remote;

pub use local::LocalZipSource;
pub use remote::RemoteZipSource;

/// Produces the raw ZIP bytes for one year.
pub trait ZipSource: Send + Sync {
    /// Human-readable origin, used in logs and snapshot metadata.
    fn describe(&self) -> String;

    fn fetch(&self, year: u16) -> ItpResult<Vec<u8>>;
}

/// Build the source for one configured year.
pub fn source_for(year: &YearConfig, data_dir: &Path) -> ItpResult<Arc<dyn ZipSource>> {
    let source: Arc<dyn ZipSource> = match &year.source {
        SourceConfig::Local { patterns } => {
            Arc::new(LocalZipSource::new(data_dir, patterns.clone()))
        }
        SourceConfig::Remote { url, timeout_secs } => {
            Arc::new(RemoteZipSource::new(url, *timeout_secs)?)
        }
    };
    Ok(source)
}
