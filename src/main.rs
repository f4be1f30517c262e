use anyhow::{Context, Result};
use clap::Parser;
use itpquery::{
    cache::SnapshotCache,
    process,
    session::{Generated, Session},
    ItpConfig,
};
use std::fs;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::{Cli, Commands, EntitiesArgs, ExportArgs, InfoArgs};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) config + overrides ───────────────────────────────────────
    let mut cfg = match &cli.global.config {
        Some(path) => ItpConfig::load(path)?,
        None => ItpConfig::default(),
    };
    if let Some(dir) = cli.global.data_dir {
        cfg.data_dir = dir;
    }
    if let Some(dir) = cli.global.cache_dir {
        cfg.cache_dir = dir;
    }
    cfg.validate()?;

    let cache = SnapshotCache::from_config(&cfg)?;
    info!(years = ?cache.years(), cache_dir = %cfg.cache_dir.display(), "startup");

    // ─── 3) dispatch ─────────────────────────────────────────────────
    match cli.command {
        Commands::States => {
            let session = open_session(&cache, &cfg)?;
            for opt in session.states() {
                println!("{}\t{}", opt.code, opt.label);
            }
        }
        Commands::Entities(args) => run_entities(&cache, &cfg, args)?,
        Commands::Export(args) => run_export(&cache, &cfg, args)?,
        Commands::Info(args) => run_info(&cache, &cfg, args)?,
        Commands::ClearCache => {
            cache.clear()?;
            println!("cache cleared: {}", cfg.cache_dir.display());
        }
    }
    Ok(())
}

fn open_session(cache: &SnapshotCache, cfg: &ItpConfig) -> Result<Session> {
    let session = Session::load(cache, cfg.degraded, cfg.export.entity_name_max)
        .context("could not load ITP data")?;
    for failure in session.failures() {
        match failure.year() {
            Some(year) => eprintln!("warning: continuing without {}: {}", year, failure),
            None => eprintln!("warning: {}", failure),
        }
    }
    for y in session.years() {
        if let Some(from) = y.substituted_from {
            eprintln!("warning: {} is showing {} data", y.year, from);
        }
    }
    Ok(session)
}

fn run_entities(cache: &SnapshotCache, cfg: &ItpConfig, args: EntitiesArgs) -> Result<()> {
    let session = open_session(cache, cfg)?;
    let state = args.state.to_uppercase();
    let entities = session.entities(&state, &args.search);
    if entities.is_empty() {
        if args.search.is_empty() {
            eprintln!("no entities found for {}", state);
        } else {
            eprintln!("no entity in {} contains '{}'", state, args.search);
        }
        return Ok(());
    }
    for e in &entities {
        println!("{}", e);
    }
    eprintln!("{} entit{} found", entities.len(), if entities.len() == 1 { "y" } else { "ies" });
    Ok(())
}

fn run_export(cache: &SnapshotCache, cfg: &ItpConfig, args: ExportArgs) -> Result<()> {
    let session = open_session(cache, cfg)?;
    let state = args.state.to_uppercase();
    let exports = match session.generate(&state, &args.entity) {
        Generated::Ready(exports) => exports,
        Generated::NotFound { state, entity } => {
            eprintln!("no data for '{}' in {}", entity, state);
            return Ok(());
        }
    };

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;
    for ex in exports {
        match ex.result {
            Ok(dl) => {
                let path = args.out.join(&dl.filename);
                fs::write(&path, &dl.bytes)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!(
                    "{}\tentity={}\trows={}\tcolumns={}",
                    path.display(),
                    args.entity,
                    dl.rows,
                    dl.columns
                );
            }
            Err(e) => {
                error!(year = ex.year, "export failed");
                eprintln!("could not build spreadsheet for {}: {}", ex.year, e);
            }
        }
    }
    Ok(())
}

fn run_info(cache: &SnapshotCache, cfg: &ItpConfig, args: InfoArgs) -> Result<()> {
    println!("data dir:  {}", cfg.data_dir.display());
    println!("cache dir: {}", cfg.cache_dir.display());
    println!(
        "freshness: {}h, degraded mode: {:?}",
        cache.ttl().num_hours(),
        cfg.degraded
    );

    for year in cache.years() {
        println!();
        println!("== {} ==", year);
        if let Some(ys) = cache.source(year) {
            println!("source:   {} (member contains '{}')", ys.source.describe(), ys.member);
            if args.members {
                match ys.source.fetch(year) {
                    Ok(bytes) => match process::list_members(year, &bytes) {
                        Ok(members) => println!("members:  {:?}", members),
                        Err(e) => println!("members:  {}", e),
                    },
                    Err(e) => println!("members:  {}", e),
                }
            }
        }
        match cache.snapshot_meta(year) {
            Ok(Some(meta)) => println!(
                "snapshot: built {} ({} rows, {} columns)",
                meta.built_at, meta.rows, meta.columns
            ),
            Ok(None) => println!("snapshot: none"),
            Err(e) => println!("snapshot: {}", e),
        }
    }

    let session = open_session(cache, cfg)?;
    for y in session.years() {
        println!();
        println!(
            "{}: {} rows, {} columns (state: {}, entity: {})",
            y.year,
            y.dataset.num_rows(),
            y.dataset.num_columns(),
            y.dataset.state_column(),
            y.dataset.entity_column()
        );
        println!("columns: {}", y.dataset.column_names().join(", "));
    }
    Ok(())
}
