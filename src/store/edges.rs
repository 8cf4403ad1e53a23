use rusqlite::{params, Connection};
use serde::Serialize;

use super::users::ensure_user_conn;
use super::{CountScope, Edge};
use crate::db::Db;
use crate::error::Result;

/// Insert-or-ignore the edge, then bring `is_mutual` for the pair in line with
/// whether the reverse edge exists.
///
/// Asserting `is_mutual` records the reverse edge as well, so both directions
/// always carry the same flag. Rows are only rewritten when the flag changes.
pub(super) fn upsert_edge_conn(
    conn: &Connection,
    follower: &str,
    followee: &str,
    is_mutual: bool,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_did, followee_did, is_mutual) VALUES (?1, ?2, 0)",
        params![follower, followee],
    )?;
    if is_mutual {
        conn.execute(
            "INSERT OR IGNORE INTO follows (follower_did, followee_did, is_mutual) VALUES (?1, ?2, 0)",
            params![followee, follower],
        )?;
    }

    let reverse_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_did = ?1 AND followee_did = ?2)",
        params![followee, follower],
        |row| row.get(0),
    )?;

    conn.execute(
        r#"
        UPDATE follows SET is_mutual = ?3
        WHERE ((follower_did = ?1 AND followee_did = ?2)
            OR (follower_did = ?2 AND followee_did = ?1))
          AND is_mutual <> ?3
        "#,
        params![follower, followee, reverse_exists],
    )?;
    Ok(())
}

/// Record a follow edge. Missing endpoints are created as pending users first.
pub async fn upsert_edge(db: &Db, follower: &str, followee: &str, is_mutual: bool) -> Result<()> {
    let follower = follower.to_string();
    let followee = followee.to_string();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        ensure_user_conn(&tx, &follower)?;
        ensure_user_conn(&tx, &followee)?;
        upsert_edge_conn(&tx, &follower, &followee, is_mutual)?;
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Every edge touching `did`, in either direction.
pub async fn edges_of(db: &Db, did: &str) -> Result<Vec<Edge>> {
    let did = did.to_string();
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT follower_did, followee_did, is_mutual FROM follows \
             WHERE follower_did = ?1 OR followee_did = ?1 \
             ORDER BY follower_did, followee_did",
        )?;
        let rows = stmt.query_map(params![did], |row| {
            Ok(Edge::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get(2)?,
            ))
        })?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    })
    .await
}

/// Every stored edge, sorted by (follower, followee).
pub async fn all_edges(db: &Db) -> Result<Vec<Edge>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT follower_did, followee_did, is_mutual FROM follows \
             ORDER BY follower_did, followee_did",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Edge::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get(2)?,
            ))
        })?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    })
    .await
}

/// A pending user and how many distinct known users link to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCount {
    pub did: String,
    pub handle: String,
    pub connections: usize,
}

/// Pending edge endpoints with at least `min_threshold` distinct neighbors, in discovery order.
pub async fn connection_counts(
    db: &Db,
    min_threshold: usize,
    scope: CountScope,
) -> Result<Vec<ConnectionCount>> {
    let scope_join = match scope {
        CountScope::Graph => "",
        CountScope::MutualCore => "JOIN users o ON o.did = n.other AND o.is_mutual_core = 1",
    };
    let query = format!(
        r#"
        SELECT u.did, u.handle, COUNT(DISTINCT n.other) AS connections
        FROM (
            SELECT followee_did AS did, follower_did AS other FROM follows
            UNION ALL
            SELECT follower_did AS did, followee_did AS other FROM follows
        ) n
        JOIN users u ON u.did = n.did
        {}
        WHERE u.crawl_status = 'pending' AND n.other <> n.did
        GROUP BY u.did
        HAVING COUNT(DISTINCT n.other) >= ?1
        ORDER BY MIN(u.rowid)
        "#,
        scope_join
    );

    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![min_threshold as i64], |row| {
            Ok(ConnectionCount {
                did: row.get(0)?,
                handle: row.get(1)?,
                connections: row.get::<_, i64>(2)? as usize,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    })
    .await
}
