use anyhow::{Context, Result};
use clap::Parser;
use graphcrawl::db::{migrate, Db};
use graphcrawl::{seed, store, Config};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Import a seed list (one DID per line, optional ,handle) as pending users")]
struct Args {
    /// Seed list to import. Defaults to bulk_seed.path from config.toml.
    path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let path = args
        .path
        .or_else(|| config.bulk_seed.path.clone())
        .context("No seed list given and bulk_seed.path is not set in config.toml")?;

    let db = Db::new(config.db_path());
    db.with_connection(migrate::run_migrations).await?;

    let imported = seed::import_all(&db, &path)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;

    let frontier = store::phase1_frontier(&db).await?;
    println!("Imported {} users from {}", imported.len(), path.display());
    println!("Phase 1 frontier now holds {} pending users", frontier.len());

    Ok(())
}
