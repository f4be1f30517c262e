// src/cache/mod.rs
use crate::{
    config::ItpConfig,
    dataset::{KeyColumns, YearlyDataset},
    error::{ItpError, ItpResult},
    fetch::{self, ZipSource},
    process,
};
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, RwLock},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{MemorySnapshotStore, ParquetSnapshotStore, Snapshot, SnapshotMeta, SnapshotStore};

/// Where one year's bytes come from and which member to read.
#[derive(Clone)]
pub struct YearSource {
    pub source: Arc<dyn ZipSource>,
    pub member: String,
}

struct MemoEntry {
    dataset: Arc<YearlyDataset>,
    built_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<MemoEntry>>>;

/// Process-wide cache of loaded years.
///
/// Both layers share one TTL: a memoized year and an on-disk snapshot are
/// each fresh while `now - built_at < ttl`. Builds are serialized per year,
/// so concurrent misses for the same year fetch once.
pub struct SnapshotCache {
    sources: BTreeMap<u16, YearSource>,
    keys: KeyColumns,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slots: RwLock<HashMap<u16, Slot>>,
}

impl SnapshotCache {
    pub fn new(
        sources: BTreeMap<u16, YearSource>,
        keys: KeyColumns,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            sources,
            keys,
            store,
            clock,
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Parquet snapshots under `cache_dir`, wall-clock time.
    pub fn from_config(cfg: &ItpConfig) -> ItpResult<Self> {
        let sources = cfg
            .years
            .iter()
            .map(|y| {
                let source = fetch::source_for(y, &cfg.data_dir)?;
                Ok((
                    y.year,
                    YearSource {
                        source,
                        member: y.member.clone(),
                    },
                ))
            })
            .collect::<ItpResult<BTreeMap<_, _>>>()?;
        Ok(Self::new(
            sources,
            KeyColumns::new(&cfg.state_columns, &cfg.entity_columns),
            Arc::new(ParquetSnapshotStore::new(&cfg.cache_dir)),
            Arc::new(SystemClock),
            cfg.freshness(),
        ))
    }

    /// Configured years, newest first.
    pub fn years(&self) -> Vec<u16> {
        self.sources.keys().rev().copied().collect()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source(&self, year: u16) -> Option<&YearSource> {
        self.sources.get(&year)
    }

    pub fn snapshot_meta(&self, year: u16) -> ItpResult<Option<SnapshotMeta>> {
        self.store.meta(year)
    }

    fn is_fresh(&self, built_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - built_at < self.ttl
    }

    fn slot(&self, year: u16) -> Slot {
        {
            let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
            if let Some(slot) = slots.get(&year) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(slots.entry(year).or_default())
    }

    /// Memo, then a fresh snapshot, then a full rebuild from the source.
    #[instrument(level = "info", skip(self))]
    pub fn load_or_build(&self, year: u16) -> ItpResult<Arc<YearlyDataset>> {
        let year_source = self
            .sources
            .get(&year)
            .ok_or_else(|| ItpError::Config(format!("year {} is not configured", year)))?;

        let slot = self.slot(year);
        let mut memo = slot.lock().unwrap_or_else(|p| p.into_inner());
        let now = self.clock.now();

        if let Some(entry) = memo.as_ref() {
            if self.is_fresh(entry.built_at, now) {
                debug!("memo hit");
                return Ok(Arc::clone(&entry.dataset));
            }
            info!(built_at = %entry.built_at, "memo expired");
        }

        if let Some((dataset, built_at)) = self.from_snapshot(year, now) {
            let dataset = Arc::new(dataset);
            *memo = Some(MemoEntry {
                dataset: Arc::clone(&dataset),
                built_at,
            });
            return Ok(dataset);
        }

        let dataset = Arc::new(self.build(year, year_source, now)?);
        *memo = Some(MemoEntry {
            dataset: Arc::clone(&dataset),
            built_at: now,
        });
        Ok(dataset)
    }

    fn from_snapshot(&self, year: u16, now: DateTime<Utc>) -> Option<(YearlyDataset, DateTime<Utc>)> {
        let snapshot = match self.store.load(year) {
            Ok(Some(s)) => s,
            Ok(None) => {
                debug!("no snapshot");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "unreadable snapshot; rebuilding");
                return None;
            }
        };
        if !self.is_fresh(snapshot.meta.built_at, now) {
            info!(built_at = %snapshot.meta.built_at, "snapshot stale; rebuilding");
            return None;
        }
        match YearlyDataset::new(year, snapshot.batch, &self.keys) {
            Ok(ds) => {
                info!(rows = ds.num_rows(), built_at = %snapshot.meta.built_at, "snapshot hit");
                Some((ds, snapshot.meta.built_at))
            }
            Err(e) => {
                warn!(error = %e, "snapshot no longer matches key columns; rebuilding");
                None
            }
        }
    }

    fn build(&self, year: u16, ys: &YearSource, now: DateTime<Utc>) -> ItpResult<YearlyDataset> {
        let start = Instant::now();
        let bytes = ys.source.fetch(year)?;
        let dataset = process::dataset_from_zip(year, &bytes, &ys.member, &self.keys)?;

        let meta = SnapshotMeta {
            year,
            built_at: now,
            rows: dataset.num_rows(),
            columns: dataset.num_columns(),
            source: ys.source.describe(),
        };
        if let Err(e) = self.store.save(&meta, dataset.batch()) {
            warn!(error = %e, "could not persist snapshot");
        }
        info!(rows = meta.rows, elapsed = ?start.elapsed(), "built");
        Ok(dataset)
    }

    /// Forget `year` in memory and on disk.
    pub fn invalidate(&self, year: u16) -> ItpResult<()> {
        let slot = self.slot(year);
        let mut memo = slot.lock().unwrap_or_else(|p| p.into_inner());
        *memo = None;
        self.store.remove(year)?;
        info!(year, "invalidated");
        Ok(())
    }

    pub fn clear(&self) -> ItpResult<()> {
        for year in self.years() {
            self.invalidate(year)?;
        }
        Ok(())
    }
}
