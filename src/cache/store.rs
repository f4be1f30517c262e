// src/cache/store.rs
use crate::error::{ItpError, ItpResult};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use chrono::{DateTime, Utc};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{debug, info, instrument, warn};

/// Sidecar describing a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub year: u16,
    pub built_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: usize,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub batch: RecordBatch,
}

/// Where materialized years are kept between runs.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted for `year`.
    fn load(&self, year: u16) -> ItpResult<Option<Snapshot>>;

    fn save(&self, meta: &SnapshotMeta, batch: &RecordBatch) -> ItpResult<()>;

    fn remove(&self, year: u16) -> ItpResult<()>;

    /// Metadata only, without reading the rows.
    fn meta(&self, year: u16) -> ItpResult<Option<SnapshotMeta>>;
}

/// Snappy-compressed Parquet per year with a JSON sidecar.
///
/// Layout: `<dir>/itp_<year>.parquet` and `<dir>/itp_<year>.meta.json`.
/// The sidecar is written last, so a snapshot without one is ignored.
pub struct ParquetSnapshotStore {
    dir: PathBuf,
}

impl ParquetSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn data_path(&self, year: u16) -> PathBuf {
        self.dir.join(format!("itp_{}.parquet", year))
    }

    pub fn meta_path(&self, year: u16) -> PathBuf {
        self.dir.join(format!("itp_{}.meta.json", year))
    }

    fn write_parquet(&self, year: u16, batch: &RecordBatch, path: &Path) -> ItpResult<()> {
        let tmp = path.with_extension("parquet.tmp");
        let result = write_batch(year, batch, &tmp).and_then(|()| {
            fs::rename(&tmp, path).map_err(|e| {
                ItpError::snapshot(
                    year,
                    format!("renaming {} → {}: {}", tmp.display(), path.display(), e),
                )
            })
        });
        if result.is_err() {
            if let Err(e) = remove_if_present(&tmp) {
                warn!(path = %tmp.display(), error = %e, "could not remove partial snapshot");
            }
        }
        result
    }

    fn read_parquet(&self, year: u16, path: &Path) -> ItpResult<RecordBatch> {
        let file = File::open(path)
            .map_err(|e| ItpError::snapshot(year, format!("opening {}: {}", path.display(), e)))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| ItpError::snapshot(year, e))?;
        let schema = builder.schema().clone();
        let reader = builder.build().map_err(|e| ItpError::snapshot(year, e))?;
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ItpError::snapshot(year, e))?;
        concat_batches(&schema, &batches).map_err(|e| ItpError::snapshot(year, e))
    }
}

fn write_batch(year: u16, batch: &RecordBatch, tmp: &Path) -> ItpResult<()> {
    let file = File::create(tmp)
        .map_err(|e| ItpError::snapshot(year, format!("creating {}: {}", tmp.display(), e)))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .map_err(|e| ItpError::snapshot(year, e))?;
    writer
        .write(batch)
        .map_err(|e| ItpError::snapshot(year, e))?;
    writer.close().map_err(|e| ItpError::snapshot(year, e))?;
    Ok(())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl SnapshotStore for ParquetSnapshotStore {
    fn meta(&self, year: u16) -> ItpResult<Option<SnapshotMeta>> {
        let path = self.meta_path(year);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ItpError::snapshot(
                    year,
                    format!("opening {}: {}", path.display(), e),
                ))
            }
        };
        let meta: SnapshotMeta = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ItpError::snapshot(year, format!("{}: {}", path.display(), e)))?;
        Ok(Some(meta))
    }

    #[instrument(level = "debug", skip(self), fields(dir = %self.dir.display()))]
    fn load(&self, year: u16) -> ItpResult<Option<Snapshot>> {
        let Some(meta) = self.meta(year)? else {
            debug!("no snapshot sidecar");
            return Ok(None);
        };
        let path = self.data_path(year);
        if !path.is_file() {
            debug!(path = %path.display(), "sidecar without data file");
            return Ok(None);
        }
        let batch = self.read_parquet(year, &path)?;
        Ok(Some(Snapshot { meta, batch }))
    }

    #[instrument(level = "info", skip(self, meta, batch), fields(year = meta.year))]
    fn save(&self, meta: &SnapshotMeta, batch: &RecordBatch) -> ItpResult<()> {
        let year = meta.year;
        fs::create_dir_all(&self.dir).map_err(|e| {
            ItpError::snapshot(year, format!("creating {}: {}", self.dir.display(), e))
        })?;

        // Data without a sidecar is ignored on load.
        remove_if_present(&self.meta_path(year)).map_err(|e| ItpError::snapshot(year, e))?;
        let data_path = self.data_path(year);
        self.write_parquet(year, batch, &data_path)?;

        let meta_path = self.meta_path(year);
        let tmp = meta_path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(meta).map_err(|e| ItpError::snapshot(year, e))?;
        fs::write(&tmp, json).map_err(|e| ItpError::snapshot(year, e))?;
        fs::rename(&tmp, &meta_path).map_err(|e| ItpError::snapshot(year, e))?;

        info!(path = %data_path.display(), rows = meta.rows, "snapshot written");
        Ok(())
    }

    fn remove(&self, year: u16) -> ItpResult<()> {
        remove_if_present(&self.meta_path(year)).map_err(|e| ItpError::snapshot(year, e))?;
        remove_if_present(&self.data_path(year)).map_err(|e| ItpError::snapshot(year, e))?;
        Ok(())
    }
}

/// Keeps snapshots in process memory; nothing survives a restart.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<u16, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: Snapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(snapshot.meta.year, snapshot);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, year: u16) -> ItpResult<Option<Snapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&year)
            .cloned())
    }

    fn save(&self, meta: &SnapshotMeta, batch: &RecordBatch) -> ItpResult<()> {
        self.insert(Snapshot {
            meta: meta.clone(),
            batch: batch.clone(),
        });
        Ok(())
    }

    fn remove(&self, year: u16) -> ItpResult<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&year);
        Ok(())
    }

    fn meta(&self, year: u16) -> ItpResult<Option<SnapshotMeta>> {
        Ok(self.load(year)?.map(|s| s.meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::cell_string;
    use crate::process::{parse_csv, ColumnHint, TypeHints};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn sample() -> (SnapshotMeta, RecordBatch) {
        let hints = TypeHints::default()
            .with("estado", ColumnHint::Categorical)
            .with("entidade", ColumnHint::Text);
        let batch = parse_csv(
            2025,
            "estado;entidade;valor;nota\nPR;PREFEITURA X;10;1.5\nSP;PREFEITURA Y;20;\n",
            &hints,
        )
        .unwrap();
        let meta = SnapshotMeta {
            year: 2025,
            built_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            rows: batch.num_rows(),
            columns: batch.num_columns(),
            source: "test".into(),
        };
        (meta, batch)
    }

    fn assert_same_contents(got: &RecordBatch, want: &RecordBatch) {
        assert_eq!(got.num_rows(), want.num_rows());
        for (g, w) in got.schema().fields().iter().zip(want.schema().fields().iter()) {
            assert_eq!(g.name(), w.name());
            assert_eq!(g.data_type(), w.data_type());
        }
        for col in 0..want.num_columns() {
            for row in 0..want.num_rows() {
                assert_eq!(
                    cell_string(got.column(col), row),
                    cell_string(want.column(col), row)
                );
            }
        }
    }

    #[test]
    fn parquet_round_trip_keeps_types_and_meta() {
        let dir = tempdir().unwrap();
        let store = ParquetSnapshotStore::new(dir.path().join("cache"));
        assert!(store.load(2025).unwrap().is_none());

        let (meta, batch) = sample();
        store.save(&meta, &batch).unwrap();
        assert!(store.data_path(2025).is_file());
        assert!(store.meta_path(2025).is_file());

        let snap = store.load(2025).unwrap().expect("snapshot present");
        assert_eq!(snap.meta, meta);
        assert_same_contents(&snap.batch, &batch);
        assert_eq!(store.meta(2025).unwrap(), Some(meta));
    }

    #[test]
    fn remove_and_missing_sidecar() {
        let dir = tempdir().unwrap();
        let store = ParquetSnapshotStore::new(dir.path());
        let (meta, batch) = sample();
        store.save(&meta, &batch).unwrap();

        fs::remove_file(store.meta_path(2025)).unwrap();
        assert!(store.load(2025).unwrap().is_none());

        store.remove(2025).unwrap();
        assert!(!store.data_path(2025).exists());
        store.remove(2025).unwrap();
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let store = ParquetSnapshotStore::new(dir.path());
        let (meta, batch) = sample();
        // A directory in the way makes the final rename fail after the data is written.
        fs::create_dir(store.data_path(2025)).unwrap();
        fs::write(store.data_path(2025).join("blocker"), b"x").unwrap();

        assert!(matches!(
            store.save(&meta, &batch),
            Err(ItpError::Snapshot { year: 2025, .. })
        ));
        assert!(!store.data_path(2025).with_extension("parquet.tmp").exists());
        assert!(store.meta(2025).unwrap().is_none());
    }

    #[test]
    fn corrupt_data_is_an_error() {
        let dir = tempdir().unwrap();
        let store = ParquetSnapshotStore::new(dir.path());
        let (meta, batch) = sample();
        store.save(&meta, &batch).unwrap();
        fs::write(store.data_path(2025), b"garbage").unwrap();
        assert!(matches!(
            store.load(2025),
            Err(ItpError::Snapshot { year: 2025, .. })
        ));
    }

    #[test]
    fn memory_store_behaves_like_disk() {
        let store = MemorySnapshotStore::new();
        let (meta, batch) = sample();
        store.save(&meta, &batch).unwrap();
        assert_same_contents(&store.load(2025).unwrap().unwrap().batch, &batch);
        store.remove(2025).unwrap();
        assert!(store.meta(2025).unwrap().is_none());
    }
}
