use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphcrawl::crawler::{check_min_connections, crawl_mutual_core, expand_by_threshold};
use graphcrawl::db::{migrate, Db};
use graphcrawl::directory::{BlueskyDirectory, Directory, IntervalGate, PacedDirectory};
use graphcrawl::store::{self, CountScope, GraphStats};
use graphcrawl::{seed, Config};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "graphcrawl")]
#[command(about = "Crawl the mutual-follow graph around a seed account into SQLite")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Phase 1 (mutual core) followed by Phase 2 (threshold expansion). The default.
    Crawl {
        /// Stop after Phase 1
        #[arg(long)]
        no_expand: bool,
    },
    /// Phase 2 only, e.g. to re-run expansion with a different threshold
    Expand {
        /// Override expansion.min_connections from config.toml
        #[arg(long)]
        min_connections: Option<usize>,

        /// Count only mutual-core neighbors ("mutual_core") or all known users ("graph")
        #[arg(long)]
        scope: Option<CountScope>,
    },
}

type LiveDirectory = PacedDirectory<BlueskyDirectory, IntervalGate>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Everything that can fail as configuration fails here, before any network call.
    let config = Config::load()?;

    // RUST_LOG wins over crawler.log_level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.crawler.log_level)
    ).init();

    let command = args.command.unwrap_or(Command::Crawl { no_expand: false });
    let (min_connections, scope) = match &command {
        Command::Expand { min_connections, scope } => (
            min_connections.unwrap_or(config.expansion.min_connections),
            scope.unwrap_or(config.expansion.count_scope),
        ),
        Command::Crawl { .. } => (config.expansion.min_connections, config.expansion.count_scope),
    };
    check_min_connections(min_connections)?;
    let (handle, password) = config.credentials()?;

    log::info!("Database path: {}", config.db_path().display());
    let db = Db::new(config.db_path());
    db.with_connection(migrate::run_migrations).await?;

    if config.bulk_seed.enabled {
        if let Some(path) = &config.bulk_seed.path {
            seed::import_all(&db, path).await?;
        }
    }

    log_stats("Database stats", &store::stats(&db).await?);

    if matches!(command, Command::Expand { .. }) {
        let queued = store::phase1_frontier(&db).await?.len();
        if queued > 0 {
            anyhow::bail!(
                "Phase 1 still has {} users queued; run `graphcrawl crawl` until it finishes",
                queued
            );
        }
    }

    let directory = connect(&config, &handle, &password).await?;

    match command {
        Command::Crawl { no_expand } => {
            let seed = resolve_seed(&config, &directory).await?;
            let phase1 =
                crawl_mutual_core(&db, &directory, &seed, config.crawler.phase1_max_users).await?;
            if phase1.remaining > 0 && !no_expand {
                log::warn!(
                    "Phase 1 stopped with {} users queued; skipping Phase 2 until a later run finishes it",
                    phase1.remaining
                );
            } else if !no_expand {
                expand_by_threshold(
                    &db,
                    &directory,
                    min_connections,
                    scope,
                    config.crawler.phase2_max_users,
                )
                .await?;
            }
        }
        Command::Expand { .. } => {
            expand_by_threshold(
                &db,
                &directory,
                min_connections,
                scope,
                config.crawler.phase2_max_users,
            )
            .await?;
        }
    }

    log_stats("Final results", &store::stats(&db).await?);
    log::info!("Database saved to: {}", config.db_path().display());
    Ok(())
}

/// Log in and wrap the client in the configured pacing/retry policy.
async fn connect(config: &Config, handle: &str, password: &str) -> Result<LiveDirectory> {
    let gate = IntervalGate::from_config(&config.rate_limit);
    let client = BlueskyDirectory::login(
        &config.directory.service_url,
        handle,
        password,
        config.directory.page_limit,
        Duration::from_secs(config.directory.timeout_secs),
        Arc::new(gate.clone()),
    )
    .await
    .context("Failed to log in to the directory service")?;

    Ok(PacedDirectory::new(client, gate, config.rate_limit.max_retries))
}

/// The configured seed, or the logged-in account. Handles are resolved to DIDs.
async fn resolve_seed(config: &Config, directory: &LiveDirectory) -> Result<String> {
    let seed = match &config.crawler.seed {
        Some(seed) => seed.clone(),
        None => {
            let client = directory.inner();
            log::info!("No seed configured, starting from @{}", client.session_handle());
            return Ok(client.session_did().to_string());
        }
    };
    if seed.starts_with("did:") {
        return Ok(seed);
    }
    let profile = directory
        .get_profile(seed.trim_start_matches('@'))
        .await
        .with_context(|| format!("Failed to resolve seed handle {}", seed))?;
    log::info!("Resolved seed {} to {}", seed, profile.did);
    Ok(profile.did)
}

fn log_stats(title: &str, stats: &GraphStats) {
    log::info!("=== {} ===", title);
    log::info!("  Total users: {}", stats.total_users);
    log::info!(
        "  Crawled: {} (mutual core: {}), skipped: {}, pending: {}",
        stats.crawled_users,
        stats.mutual_core_users,
        stats.skipped_users,
        stats.pending_users
    );
    log::info!(
        "  Follow relationships: {} ({} mutual)",
        stats.total_follows,
        stats.mutual_follows
    );
}
