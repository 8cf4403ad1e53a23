//! Schema migrations, compiled into the binary.
//!
//! The crawler is started from wherever the user keeps `config.toml`, so the SQL
//! files under `migrations/` are embedded rather than read at runtime. Applied
//! versions are recorded in `schema_migrations`; each migration runs in its own
//! transaction together with its bookkeeping row.

use rusqlite::{params, Connection};
use std::collections::HashSet;

use crate::error::{GraphcrawlError, Result};

/// One embedded schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Every schema step, oldest first. Versions must be strictly increasing.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "graph_tables",
    sql: include_str!("../../migrations/001_graph_tables.sql"),
}];

/// Bring the database up to the newest schema. Returns how many steps were applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize> {
    apply(conn, MIGRATIONS)
}

fn applied_versions(conn: &Connection) -> Result<HashSet<u32>> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )?;
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(versions)
}

fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<usize> {
    let applied = applied_versions(conn)?;
    let mut count = 0;

    for migration in migrations.iter().filter(|m| !applied.contains(&m.version)) {
        log::info!("Applying migration {:03}_{}", migration.version, migration.name);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            GraphcrawlError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!(
                    "migration {:03}_{} failed: {}",
                    migration.version, migration.name, e
                )),
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    if count == 0 {
        log::debug!("Schema up to date");
    }
    Ok(count)
}
