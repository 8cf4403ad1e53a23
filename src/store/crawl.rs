use serde::Serialize;

use super::edges::upsert_edge_conn;
use super::users::{mark_mutual_core_conn, mark_status_conn, upsert_user_conn};
use super::{CrawlStatus, Edge, UserAttrs};
use crate::db::Db;
use crate::error::Result;

/// Everything learned from expanding one user.
#[derive(Debug, Clone)]
pub struct CrawlRecord {
    pub did: String,
    pub profile: UserAttrs,
    /// Accounts seen in the follow/follower lists, deduplicated.
    pub neighbors: Vec<(String, UserAttrs)>,
    pub edges: Vec<Edge>,
    /// Set when the user is expanded by Phase 1.
    pub mutual_core: bool,
}

/// Commit one expanded user as a single transaction.
///
/// Users go in before edges so no edge is ever written without its endpoints.
/// The crawled mark is part of the same transaction: after a crash the user is
/// either fully recorded or still pending.
pub async fn record_crawl(db: &Db, record: CrawlRecord) -> Result<()> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        upsert_user_conn(&tx, &record.did, &record.profile, false)?;
        for (did, attrs) in &record.neighbors {
            upsert_user_conn(&tx, did, attrs, false)?;
        }
        for edge in &record.edges {
            upsert_edge_conn(&tx, &edge.follower, &edge.followee, edge.is_mutual)?;
        }
        mark_status_conn(&tx, &record.did, CrawlStatus::Crawled)?;
        if record.mutual_core {
            mark_mutual_core_conn(&tx, &record.did)?;
        }
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Store-wide counters for progress logs and the stats report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub total_users: usize,
    pub crawled_users: usize,
    pub skipped_users: usize,
    pub pending_users: usize,
    pub mutual_core_users: usize,
    pub total_follows: usize,
    pub mutual_follows: usize,
}

pub async fn stats(db: &Db) -> Result<GraphStats> {
    db.with_connection(|conn| {
        let stats = conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM users WHERE crawl_status = 'crawled'),
                (SELECT COUNT(*) FROM users WHERE crawl_status = 'skipped'),
                (SELECT COUNT(*) FROM users WHERE crawl_status = 'pending'),
                (SELECT COUNT(*) FROM users WHERE is_mutual_core = 1),
                (SELECT COUNT(*) FROM follows),
                (SELECT COUNT(*) FROM follows WHERE is_mutual = 1)
            "#,
            [],
            |row| {
                Ok(GraphStats {
                    total_users: row.get::<_, i64>(0)? as usize,
                    crawled_users: row.get::<_, i64>(1)? as usize,
                    skipped_users: row.get::<_, i64>(2)? as usize,
                    pending_users: row.get::<_, i64>(3)? as usize,
                    mutual_core_users: row.get::<_, i64>(4)? as usize,
                    total_follows: row.get::<_, i64>(5)? as usize,
                    mutual_follows: row.get::<_, i64>(6)? as usize,
                })
            },
        )?;
        Ok(stats)
    })
    .await
}
