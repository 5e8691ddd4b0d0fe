use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prop_edge::config::{PipelineConfig, path_arg};
use prop_edge::http_client::build_http_client;
use prop_edge::pipeline;
use prop_edge::publish::XlsxSink;
use prop_edge::store;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_logging();

    let cfg = PipelineConfig::from_env();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let db_path = path_arg(&args, "--db")
        .or_else(|| cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let output_path = path_arg(&args, "--out").unwrap_or_else(|| cfg.output_path.clone());

    let conn = store::open_db(&db_path)?;
    let historical = store::load_store(&conn)
        .with_context(|| format!("load historical store {}", db_path.display()))?;
    if historical.rows.is_empty() {
        warn!(db = %db_path.display(), "historical store is empty; every prop will be unresolved");
    }

    let client = build_http_client(cfg.fetch_timeout)?;
    let mut sink = XlsxSink::new(&output_path);
    let report = pipeline::run(&historical, &client, &cfg, &mut sink)?;

    for source in &report.sources {
        info!(
            source = source.source.code(),
            props = source.summary.total,
            located = source.summary.located(),
            risky = source.summary.risky,
            odds = source.summary.odds_attached,
            "source done"
        );
    }
    for failure in &report.failures {
        warn!(feed = failure.feed.name(), kind = failure.kind, "{}", failure.message);
    }
    info!(
        out = %output_path.display(),
        tables = report.tables.len(),
        cross_rows = report.cross_rows,
        cross_duplicates = report.cross_duplicates,
        "run complete"
    );
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
