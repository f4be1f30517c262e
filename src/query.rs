// src/query.rs
use crate::{dataset::YearlyDataset, states::state_label};
use arrow::{array::BooleanArray, compute::filter_record_batch, record_batch::RecordBatch};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A state code with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateOption {
    pub code: String,
    pub label: String,
}

/// One year's matching rows.
#[derive(Debug, Clone)]
pub struct FilteredYear {
    pub year: u16,
    pub batch: RecordBatch,
}

#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// At least one year matched; years without matches are left out.
    Found(Vec<FilteredYear>),
    Empty,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, FilterOutcome::Empty)
    }

    pub fn total_rows(&self) -> usize {
        match self {
            FilterOutcome::Found(years) => years.iter().map(|y| y.batch.num_rows()).sum(),
            FilterOutcome::Empty => 0,
        }
    }
}

/// Every state code present in any dataset, sorted on the raw code.
pub fn distinct_states<'a, I>(datasets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a YearlyDataset>,
{
    let mut codes = BTreeSet::new();
    for ds in datasets {
        for row in 0..ds.num_rows() {
            if let Some(code) = ds.state_at(row) {
                codes.insert(code);
            }
        }
    }
    codes.into_iter().collect()
}

/// Labels for codes, keeping their order.
pub fn state_options(codes: &[String]) -> Vec<StateOption> {
    codes
        .iter()
        .map(|code| StateOption {
            code: code.clone(),
            label: state_label(code),
        })
        .collect()
}

/// Entity names within `state`, across all datasets, sorted and unique.
pub fn distinct_entities<'a, I>(datasets: I, state: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a YearlyDataset>,
{
    let mut names = BTreeSet::new();
    for ds in datasets {
        for row in 0..ds.num_rows() {
            if ds.state_at(row).as_deref() != Some(state) {
                continue;
            }
            if let Some(name) = ds.entity_at(row) {
                names.insert(name);
            }
        }
    }
    names.into_iter().collect()
}

/// Case-insensitive substring search; only an empty term keeps everything.
/// Whitespace is part of the term.
pub fn search_entities(entities: &[String], term: &str) -> Vec<String> {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return entities.to_vec();
    }
    entities
        .iter()
        .filter(|e| e.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Rows matching both keys exactly, per year, as new batches.
pub fn filter_rows<'a, I>(datasets: I, state: &str, entity: &str) -> FilterOutcome
where
    I: IntoIterator<Item = &'a YearlyDataset>,
{
    let mut found = Vec::new();
    for ds in datasets {
        let mask: BooleanArray = (0..ds.num_rows())
            .map(|row| {
                Some(
                    ds.state_at(row).as_deref() == Some(state)
                        && ds.entity_at(row).as_deref() == Some(entity),
                )
            })
            .collect();
        let batch = match filter_record_batch(ds.batch(), &mask) {
            Ok(b) => b,
            Err(e) => {
                warn!(year = ds.year(), error = %e, "filter failed");
                continue;
            }
        };
        debug!(year = ds.year(), rows = batch.num_rows(), "filtered");
        if batch.num_rows() > 0 {
            found.push(FilteredYear {
                year: ds.year(),
                batch,
            });
        }
    }
    if found.is_empty() {
        FilterOutcome::Empty
    } else {
        FilterOutcome::Found(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::tests::{keys, SAMPLE_CSV},
        dataset::cell_string,
        process::load_dataset,
    };

    fn two_years() -> Vec<YearlyDataset> {
        vec![
            load_dataset(2025, SAMPLE_CSV, &keys()).unwrap(),
            load_dataset(
                2024,
                "uf;entidade_nome;valor\nPR;PREFEITURA X;7\nXX;ORGAO Z;1\nAC;;2\n",
                &keys(),
            )
            .unwrap(),
        ]
    }

    #[test]
    fn states_sorted_unique_raw_codes() {
        let ds = two_years();
        let codes = distinct_states(&ds);
        assert_eq!(codes, vec!["AC", "PR", "SP", "XX"]);
        let opts = state_options(&codes);
        assert_eq!(opts[1].label, "PR - Paraná");
        assert_eq!(opts[3].label, "XX");
    }

    #[test]
    fn entities_are_scoped_to_state_and_deduplicated() {
        let ds = two_years();
        assert_eq!(
            distinct_entities(&ds, "PR"),
            vec!["CAMARA MUNICIPAL DE X", "PREFEITURA X"]
        );
        assert!(distinct_entities(&ds, "AC").is_empty());
        assert!(distinct_entities(&ds, "RJ").is_empty());
    }

    #[test]
    fn search_ignores_case() {
        let names = vec!["CAMARA MUNICIPAL DE X".to_string(), "PREFEITURA X".to_string()];
        assert_eq!(search_entities(&names, "prefeit"), vec!["PREFEITURA X"]);
        assert_eq!(search_entities(&names, ""), names);
        assert_eq!(search_entities(&names, " "), names);
        assert!(search_entities(&names, "  ").is_empty());
        assert_eq!(search_entities(&names, "de x"), vec!["CAMARA MUNICIPAL DE X"]);
        assert!(search_entities(&names, "curitiba").is_empty());
    }

    #[test]
    fn filter_matches_both_keys_per_year() {
        let ds = two_years();
        let outcome = filter_rows(&ds, "PR", "PREFEITURA X");
        assert_eq!(outcome.total_rows(), 2);
        let FilterOutcome::Found(years) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(years.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2025, 2024]);
        for fy in &years {
            for row in 0..fy.batch.num_rows() {
                assert_eq!(cell_string(fy.batch.column(0), row).as_deref(), Some("PR"));
                assert_eq!(
                    cell_string(fy.batch.column(1), row).as_deref(),
                    Some("PREFEITURA X")
                );
            }
        }
        assert_eq!(cell_string(years[1].batch.column(2), 0).as_deref(), Some("7"));

        // Source tables are untouched.
        assert_eq!(ds[0].num_rows(), 3);
    }

    #[test]
    fn absent_pair_is_empty_outcome() {
        let ds = two_years();
        assert!(filter_rows(&ds, "SP", "PREFEITURA X").is_empty());
        assert!(filter_rows(&ds, "PR", "prefeitura x").is_empty());
        assert!(filter_rows(Vec::<&YearlyDataset>::new(), "PR", "PREFEITURA X").is_empty());
    }
}
