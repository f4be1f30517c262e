//! Look up a public-sector entity's ITP questionnaire rows and hand them
//! back as a spreadsheet.
//!
//! Pipeline: [`fetch`] a year's ZIP → [`process`] its CSV member into a
//! [`dataset::YearlyDataset`] → keep it in the [`cache`] → narrow it with
//! [`query`] → serialize with [`export`]. [`session`] ties the steps into
//! one request cycle.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod fetch;
pub mod process;
pub mod query;
pub mod session;
pub mod states;

pub use config::{DegradedPolicy, ItpConfig};
pub use dataset::YearlyDataset;
pub use error::{ItpError, ItpResult};
pub use session::{Generated, Selection, Session};
