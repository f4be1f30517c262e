// src/error.rs
use thiserror::Error;

/// Why a year's byte source could not be produced.
#[derive(Debug, Error)]
pub enum SourceFailure {
    #[error("no file matches any of {patterns:?}")]
    NotFound { patterns: Vec<String> },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("could not reach {url}: {message}")]
    Connection { url: String, message: String },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a readable ZIP archive: {0}")]
    CorruptArchive(String),
}

/// Every failure the pipeline can report. Empty query results are not
/// errors; see `query::FilterOutcome` and `session::Generated`.
#[derive(Debug, Error)]
pub enum ItpError {
    #[error("data for {year} is unavailable: {failure}")]
    SourceUnavailable {
        year: u16,
        #[source]
        failure: SourceFailure,
    },

    #[error("no archive member matching '{wanted}' for {year}; members: {members:?}")]
    ArchiveMemberNotFound {
        year: u16,
        wanted: String,
        members: Vec<String>,
    },

    #[error("member '{member}' for {year} is not valid UTF-8: {message}")]
    DecodeFailure {
        year: u16,
        member: String,
        message: String,
    },

    #[error("could not parse data for {year}: {message}")]
    ParseFailure { year: u16, message: String },

    #[error("could not build spreadsheet: {0}")]
    ExportFailure(String),

    #[error("snapshot for {year}: {message}")]
    Snapshot { year: u16, message: String },

    #[error("no year could be loaded")]
    NoData,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ItpError {
    pub fn parse(year: u16, message: impl Into<String>) -> Self {
        ItpError::ParseFailure {
            year,
            message: message.into(),
        }
    }

    pub fn snapshot(year: u16, message: impl ToString) -> Self {
        ItpError::Snapshot {
            year,
            message: message.to_string(),
        }
    }

    /// Year the failure belongs to, when it belongs to one.
    pub fn year(&self) -> Option<u16> {
        match self {
            ItpError::SourceUnavailable { year, .. }
            | ItpError::ArchiveMemberNotFound { year, .. }
            | ItpError::DecodeFailure { year, .. }
            | ItpError::ParseFailure { year, .. }
            | ItpError::Snapshot { year, .. } => Some(*year),
            ItpError::ExportFailure(_) | ItpError::NoData | ItpError::Config(_) => None,
        }
    }
}

pub type ItpResult<T> = Result<T, ItpError>;

impl From<rust_xlsxwriter::XlsxError> for ItpError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ItpError::ExportFailure(err.to_string())
    }
}
