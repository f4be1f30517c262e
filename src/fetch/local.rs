// src/fetch/local.rs
use super::ZipSource;
use crate::error::{ItpError, ItpResult, SourceFailure};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// ZIP archives sitting in a directory, found by glob patterns tried in order.
pub struct LocalZipSource {
    dir: PathBuf,
    patterns: Vec<String>,
}

impl LocalZipSource {
    pub fn new(dir: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            patterns,
        }
    }

    /// Every file matching the first pattern that matches anything.
    /// Only the patterns are globs; the directory is taken literally.
    pub fn matches(&self) -> Vec<PathBuf> {
        let dir = Pattern::escape(&self.dir.display().to_string());
        for pattern in &self.patterns {
            let full = format!("{}/{}", dir, pattern);
            let entries = match glob(&full) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(pattern = %full, error = %e, "invalid glob pattern");
                    continue;
                }
            };
            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| match entry {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!("cannot read glob entry: {}", e);
                        None
                    }
                })
                .filter(|p| p.is_file())
                .collect();
            if !found.is_empty() {
                found.sort();
                debug!(pattern = %full, n = found.len(), "pattern matched");
                return found;
            }
        }
        Vec::new()
    }

    fn read(&self, year: u16, path: &Path) -> ItpResult<Vec<u8>> {
        fs::read(path).map_err(|source| ItpError::SourceUnavailable {
            year,
            failure: SourceFailure::Io {
                path: path.display().to_string(),
                source,
            },
        })
    }
}

impl ZipSource for LocalZipSource {
    fn describe(&self) -> String {
        format!("{}/{{{}}}", self.dir.display(), self.patterns.join(","))
    }

    #[instrument(level = "info", skip(self), fields(dir = %self.dir.display()))]
    fn fetch(&self, year: u16) -> ItpResult<Vec<u8>> {
        let found = self.matches();
        let path = found.first().ok_or_else(|| ItpError::SourceUnavailable {
            year,
            failure: SourceFailure::NotFound {
                patterns: self.patterns.clone(),
            },
        })?;
        let bytes = self.read(year, path)?;
        info!(path = %path.display(), bytes = bytes.len(), "read local archive");
        Ok(bytes)
    }
}
