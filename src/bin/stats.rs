use anyhow::Result;
use clap::Parser;
use graphcrawl::db::{migrate, Db};
use graphcrawl::store::{self, ConnectionCount, CountScope, GraphStats};
use graphcrawl::Config;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "stats")]
#[command(about = "Summarize the crawl database and the best Phase 2 candidates")]
struct Args {
    /// How many pending candidates to list
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Neighbor scope for candidate counts. Defaults to expansion.count_scope.
    #[arg(long)]
    scope: Option<CountScope>,

    /// Print machine-readable JSON instead of tables
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    stats: GraphStats,
    min_connections: usize,
    candidates: Vec<ConnectionCount>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let db = Db::new(config.db_path());
    // A fresh db_path reports an empty store instead of failing on missing tables
    db.with_connection(migrate::run_migrations).await?;
    let scope = args.scope.unwrap_or(config.expansion.count_scope);

    let stats = store::stats(&db).await?;
    let mut candidates = store::connection_counts(&db, 1, scope).await?;
    // stable sort keeps discovery order among ties
    candidates.sort_by(|a, b| b.connections.cmp(&a.connections));
    candidates.truncate(args.top);

    let report = Report {
        stats,
        min_connections: config.expansion.min_connections,
        candidates,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let s = &report.stats;
    println!("\n=== Crawl Database Statistics ===\n");
    println!("{:-<50}", "");
    println!("{:<30} {:>15}", "Total users", s.total_users);
    println!("{:<30} {:>15}", "  crawled", s.crawled_users);
    println!("{:<30} {:>15}", "    mutual core", s.mutual_core_users);
    println!("{:<30} {:>15}", "  skipped", s.skipped_users);
    println!("{:<30} {:>15}", "  pending", s.pending_users);
    println!("{:<30} {:>15}", "Follow relationships", s.total_follows);
    println!("{:<30} {:>15}", "  mutual", s.mutual_follows);
    println!("{:-<50}", "");

    if report.candidates.is_empty() {
        println!("\nNo pending users have known connections.");
        return Ok(());
    }

    println!(
        "\nTop pending users by connections ({:?} scope, admission threshold {}):\n",
        scope, report.min_connections
    );
    println!("{:-<80}", "");
    println!("{:<40} {:<28} {:>10}", "DID", "Handle", "Links");
    println!("{:-<80}", "");
    for c in &report.candidates {
        let marker = if c.connections >= report.min_connections { "*" } else { "" };
        println!("{:<40} {:<28} {:>9}{}", c.did, c.handle, c.connections, marker);
    }
    println!("{:-<80}", "");
    println!("* will be admitted by the next Phase 2 run\n");

    Ok(())
}
