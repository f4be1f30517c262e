// src/config.rs
use crate::error::{ItpError, ItpResult};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;
use url::Url;

pub const DEFAULT_FRESHNESS_HOURS: u64 = 24;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MEMBER_HINT: &str = ".csv";
/// Largest window `chrono::Duration` can represent in whole hours.
pub const MAX_FRESHNESS_HOURS: u64 = (i64::MAX / 1000 / 3600) as u64;

/// What to do when some, but not all, configured years fail to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Drop the missing year.
    #[default]
    Omit,
    /// Serve the newest available year's rows in place of the missing one.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Glob patterns tried in order, relative to `data_dir`.
    Local { patterns: Vec<String> },
    Remote {
        url: String,
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearConfig {
    pub year: u16,
    pub source: SourceConfig,
    /// Substring the CSV member's name must contain.
    #[serde(default = "default_member")]
    pub member: String,
}

impl YearConfig {
    /// The two patterns the PR extraction ships under.
    pub fn local_default(year: u16) -> Self {
        Self {
            year,
            source: SourceConfig::Local {
                patterns: vec![format!("itp{}_pr*.zip", year), format!("*{}*.zip", year)],
            },
            member: default_member(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub entity_name_max: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            entity_name_max: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItpConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub freshness_hours: u64,
    pub degraded: DegradedPolicy,
    /// Candidate names for the state key, first present wins.
    pub state_columns: Vec<String>,
    /// Candidate names for the entity key, first present wins.
    pub entity_columns: Vec<String>,
    pub export: ExportConfig,
    pub years: Vec<YearConfig>,
}

impl Default for ItpConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            cache_dir: PathBuf::from("cache"),
            freshness_hours: DEFAULT_FRESHNESS_HOURS,
            degraded: DegradedPolicy::default(),
            state_columns: vec!["estado".into(), "uf".into()],
            entity_columns: vec!["entidade".into(), "entidade_nome".into()],
            export: ExportConfig::default(),
            years: vec![YearConfig::local_default(2025), YearConfig::local_default(2024)],
        }
    }
}

impl ItpConfig {
    /// Read a YAML config; missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ItpResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ItpError::Config(format!("reading {}: {}", path.display(), e)))?;
        let cfg = Self::from_yaml(&text)?;
        info!(path = %path.display(), years = cfg.years.len(), "loaded config");
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> ItpResult<Self> {
        let cfg: ItpConfig =
            serde_yaml::from_str(text).map_err(|e| ItpError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ItpResult<()> {
        if self.years.is_empty() {
            return Err(ItpError::Config("at least one year is required".into()));
        }
        if self.state_columns.is_empty() || self.entity_columns.is_empty() {
            return Err(ItpError::Config(
                "state_columns and entity_columns must not be empty".into(),
            ));
        }
        if self.freshness_hours == 0 {
            return Err(ItpError::Config("freshness_hours must be positive".into()));
        }
        if self.freshness_hours > MAX_FRESHNESS_HOURS {
            return Err(ItpError::Config(format!(
                "freshness_hours must be at most {}",
                MAX_FRESHNESS_HOURS
            )));
        }
        let mut seen = Vec::with_capacity(self.years.len());
        for y in &self.years {
            if seen.contains(&y.year) {
                return Err(ItpError::Config(format!("year {} listed twice", y.year)));
            }
            seen.push(y.year);
            match &y.source {
                SourceConfig::Local { patterns } if patterns.is_empty() => {
                    return Err(ItpError::Config(format!(
                        "year {}: local source needs at least one pattern",
                        y.year
                    )));
                }
                SourceConfig::Remote { url, .. } => {
                    Url::parse(url).map_err(|e| {
                        ItpError::Config(format!("year {}: bad url '{}': {}", y.year, url, e))
                    })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Saturates at `MAX_FRESHNESS_HOURS` for configs that skipped `validate`.
    pub fn freshness(&self) -> chrono::Duration {
        let hours = self.freshness_hours.min(MAX_FRESHNESS_HOURS) as i64;
        chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::MAX)
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_member() -> String {
    DEFAULT_MEMBER_HINT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year(cfg: &ItpConfig, year: u16) -> &YearConfig {
        cfg.years.iter().find(|y| y.year == year).unwrap()
    }

    #[test]
    fn defaults_cover_both_years() {
        let cfg = ItpConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.years.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2025, 2024]);
        assert_eq!(cfg.freshness_hours, 24);
        assert_eq!(cfg.degraded, DegradedPolicy::Omit);
        match &year(&cfg, 2024).source {
            SourceConfig::Local { patterns } => {
                assert_eq!(patterns, &vec!["itp2024_pr*.zip".to_string(), "*2024*.zip".to_string()])
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn parses_remote_years_and_policy() {
        let yaml = r#"
cache_dir: /tmp/itp
degraded: duplicate
years:
  - year: 2025
    source:
      kind: remote
      url: https://example.org/itp2025.zip
    member: itp_2025.csv
  - year: 2024
    source:
      kind: local
      patterns: ["*2024*.zip"]
"#;
        let cfg = ItpConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.degraded, DegradedPolicy::Duplicate);
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/itp"));
        let y25 = year(&cfg, 2025);
        assert_eq!(y25.member, "itp_2025.csv");
        assert_eq!(
            y25.source,
            SourceConfig::Remote {
                url: "https://example.org/itp2025.zip".into(),
                timeout_secs: DEFAULT_TIMEOUT_SECS
            }
        );
        assert_eq!(year(&cfg, 2024).member, ".csv");
        assert_eq!(cfg.entity_columns, ItpConfig::default().entity_columns);
    }

    #[test]
    fn rejects_bad_url_and_duplicate_years() {
        let bad_url = r#"
years:
  - year: 2025
    source: { kind: remote, url: "not a url" }
"#;
        assert!(matches!(ItpConfig::from_yaml(bad_url), Err(ItpError::Config(_))));

        let dup = r#"
years:
  - year: 2025
    source: { kind: local, patterns: ["a.zip"] }
  - year: 2025
    source: { kind: local, patterns: ["b.zip"] }
"#;
        assert!(matches!(ItpConfig::from_yaml(dup), Err(ItpError::Config(_))));
    }

    #[test]
    fn freshness_window_is_bounded() {
        let huge = "freshness_hours: 3000000000000000\n";
        assert!(matches!(ItpConfig::from_yaml(huge), Err(ItpError::Config(_))));

        let edge = format!("freshness_hours: {}\n", MAX_FRESHNESS_HOURS);
        let cfg = ItpConfig::from_yaml(&edge).unwrap();
        assert!(cfg.freshness() > chrono::Duration::days(365 * 1000));

        let unchecked = ItpConfig {
            freshness_hours: u64::MAX,
            ..ItpConfig::default()
        };
        assert_eq!(
            unchecked.freshness(),
            chrono::Duration::hours(MAX_FRESHNESS_HOURS as i64)
        );
    }
}
