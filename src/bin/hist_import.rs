use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use prop_edge::config::{path_arg, positional_args};
use prop_edge::store::{self, ImportFile};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let inputs = positional_args(&args, &["--db"]);
    if inputs.is_empty() {
        return Err(anyhow!(
            "usage: hist_import [--db <path>] <rows.json> [more.json ...]"
        ));
    }

    let db_path = path_arg(&args, "--db")
        .or_else(|| {
            std::env::var("PROPS_DB_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
        })
        .or_else(store::default_db_path)
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;

    println!("Historical import");
    println!("DB: {}", db_path.display());
    let mut failed = 0usize;
    for input in &inputs {
        match import_one(&mut conn, input) {
            Ok(summary) => println!(
                "{}: rows={} id_mappings={} profiles={}",
                input.display(),
                summary.rows_upserted,
                summary.id_mappings,
                summary.profiles
            ),
            Err(err) => {
                failed += 1;
                println!("{}: failed: {err:#}", input.display());
            }
        }
    }

    let total = store::load_historical_rows(&conn)?.len();
    println!("Rows in store: {total}");
    if failed > 0 {
        return Err(anyhow!("{failed}/{} imports failed", inputs.len()));
    }
    Ok(())
}

fn import_one(conn: &mut rusqlite::Connection, input: &Path) -> Result<store::ImportSummary> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("read {}", input.display()))?;
    let file: ImportFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid import json {}", input.display()))?;
    store::import_file(conn, &input.display().to_string(), &file)
}
