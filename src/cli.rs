//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Look up an entity's ITP rows and save them as a spreadsheet
#[derive(Parser, Debug)]
#[command(name = "itpquery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// YAML config file
    #[arg(short, long, global = true, env = "ITP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory searched for local ZIP archives
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding Parquet snapshots
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List states present in the data
    States,

    /// List entities of a state, optionally filtered by a search term
    Entities(EntitiesArgs),

    /// Write one spreadsheet per year for a state and entity
    Export(ExportArgs),

    /// Show sources, snapshots and loaded columns per year
    Info(InfoArgs),

    /// Delete every snapshot so the next run rebuilds from source
    ClearCache,
}

#[derive(Args, Debug)]
pub struct EntitiesArgs {
    /// Two-letter state code, e.g. PR
    #[arg(short, long)]
    pub state: String,

    /// Case-insensitive part of the entity name
    #[arg(long, default_value = "")]
    pub search: String,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(short, long)]
    pub state: String,

    /// Exact entity name as listed by `entities`
    #[arg(short, long)]
    pub entity: String,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Also fetch each source and list its archive members
    #[arg(long)]
    pub members: bool,
}
