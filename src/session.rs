// src/session.rs
use crate::{
    cache::SnapshotCache,
    config::DegradedPolicy,
    dataset::YearlyDataset,
    error::{ItpError, ItpResult},
    export::{download_filename, export, sheet_name},
    query::{self, FilterOutcome, StateOption},
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A year's data as served to the user.
#[derive(Debug, Clone)]
pub struct LoadedYear {
    pub year: u16,
    pub dataset: Arc<YearlyDataset>,
    /// Set when the rows really belong to another year (`DegradedPolicy::Duplicate`).
    pub substituted_from: Option<u16>,
}

/// What the user has picked so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub state: Option<String>,
    pub search: String,
    pub entity: Option<String>,
}

impl Selection {
    pub fn clear(&mut self) {
        *self = Selection::default();
    }

    /// Picking a new state invalidates the entity.
    pub fn choose_state(&mut self, state: impl Into<String>) {
        self.state = Some(state.into());
        self.search.clear();
        self.entity = None;
    }

    pub fn choose_entity(&mut self, entity: impl Into<String>) {
        self.entity = Some(entity.into());
    }
}

#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug)]
pub struct YearExport {
    pub year: u16,
    pub substituted_from: Option<u16>,
    pub result: ItpResult<Download>,
}

#[derive(Debug)]
pub enum Generated {
    Ready(Vec<YearExport>),
    NotFound { state: String, entity: String },
}

/// Every configured year that could be loaded, plus the failures.
pub struct Session {
    years: Vec<LoadedYear>,
    failures: Vec<ItpError>,
    entity_name_max: usize,
}

impl Session {
    /// Load every configured year independently. All failing is `NoData`.
    pub fn load(cache: &SnapshotCache, policy: DegradedPolicy, entity_name_max: usize) -> ItpResult<Self> {
        let results: Vec<(u16, ItpResult<Arc<YearlyDataset>>)> = cache
            .years()
            .into_par_iter()
            .map(|year| (year, cache.load_or_build(year)))
            .collect();
        Self::assemble(results, policy, entity_name_max)
    }

    fn assemble(
        results: Vec<(u16, ItpResult<Arc<YearlyDataset>>)>,
        policy: DegradedPolicy,
        entity_name_max: usize,
    ) -> ItpResult<Self> {
        let mut loaded = Vec::new();
        let mut missing = Vec::new();
        let mut failures = Vec::new();
        for (year, result) in results {
            match result {
                Ok(dataset) => loaded.push(LoadedYear {
                    year,
                    dataset,
                    substituted_from: None,
                }),
                Err(e) => {
                    error!(year, error = %e, "year unavailable");
                    missing.push(year);
                    failures.push(e);
                }
            }
        }

        let newest = loaded.iter().max_by_key(|y| y.year).cloned();
        let Some(newest) = newest else {
            error!("no year could be loaded");
            return Err(ItpError::NoData);
        };

        if policy == DegradedPolicy::Duplicate {
            for year in &missing {
                warn!(year, from = newest.year, "serving substitute data");
                loaded.push(LoadedYear {
                    year: *year,
                    dataset: Arc::new(newest.dataset.relabel(*year)),
                    substituted_from: Some(newest.year),
                });
            }
        } else if !missing.is_empty() {
            warn!(?missing, "continuing without missing years");
        }

        loaded.sort_by(|a, b| b.year.cmp(&a.year));
        info!(years = ?loaded.iter().map(|y| y.year).collect::<Vec<_>>(), "session ready");
        Ok(Self {
            years: loaded,
            failures,
            entity_name_max,
        })
    }

    /// Loaded years, newest first.
    pub fn years(&self) -> &[LoadedYear] {
        &self.years
    }

    pub fn failures(&self) -> &[ItpError] {
        &self.failures
    }

    fn datasets(&self) -> impl Iterator<Item = &YearlyDataset> {
        self.years.iter().map(|y| y.dataset.as_ref())
    }

    pub fn states(&self) -> Vec<StateOption> {
        query::state_options(&query::distinct_states(self.datasets()))
    }

    /// Entities in `state` whose name contains `search`, ignoring case.
    pub fn entities(&self, state: &str, search: &str) -> Vec<String> {
        let all = query::distinct_entities(self.datasets(), state);
        query::search_entities(&all, search)
    }

    pub fn filter(&self, state: &str, entity: &str) -> FilterOutcome {
        query::filter_rows(self.datasets(), state, entity)
    }

    /// Build one workbook per year with matching rows. Each export fails on its own.
    pub fn generate(&self, state: &str, entity: &str) -> Generated {
        let outcome = self.filter(state, entity);
        let total = outcome.total_rows();
        let found = match outcome {
            FilterOutcome::Found(found) => found,
            FilterOutcome::Empty => {
                info!(state, entity, "no rows");
                return Generated::NotFound {
                    state: state.to_string(),
                    entity: entity.to_string(),
                };
            }
        };

        let exports = found
            .into_iter()
            .map(|fy| {
                let substituted_from = self
                    .years
                    .iter()
                    .find(|y| y.year == fy.year)
                    .and_then(|y| y.substituted_from);
                let result = export(&fy.batch, &sheet_name(fy.year)).map(|bytes| Download {
                    filename: download_filename(fy.year, state, entity, self.entity_name_max),
                    bytes,
                    rows: fy.batch.num_rows(),
                    columns: fy.batch.num_columns(),
                });
                if let Err(e) = &result {
                    error!(year = fy.year, error = %e, "export failed");
                }
                YearExport {
                    year: fy.year,
                    substituted_from,
                    result,
                }
            })
            .collect::<Vec<_>>();
        info!(state, entity, rows = total, files = exports.len(), "exports built");
        Generated::Ready(exports)
    }

    /// Run the selection as it stands; `None` until both keys are chosen.
    pub fn generate_selection(&self, selection: &Selection) -> Option<Generated> {
        let state = selection.state.as_deref()?;
        let entity = selection.entity.as_deref()?;
        Some(self.generate(state, entity))
    }
}
