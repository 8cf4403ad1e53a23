use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use super::{CrawlStatus, User, UserAttrs};
use crate::db::Db;
use crate::error::{GraphcrawlError, Result};

impl ToSql for CrawlStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CrawlStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: GraphcrawlError| FromSqlError::Other(Box::new(e)))
    }
}

const USER_COLUMNS: &str = "did, handle, display_name, description, followers_count, \
     follows_count, crawl_status, is_mutual_core, imported, discovered_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let discovered_at: String = row.get(9)?;
    let discovered_at = DateTime::parse_from_rfc3339(&discovered_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(User {
        did: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        followers_count: row.get::<_, i64>(4)?.max(0) as u64,
        follows_count: row.get::<_, i64>(5)?.max(0) as u64,
        crawl_status: row.get(6)?,
        is_mutual_core: row.get(7)?,
        imported: row.get(8)?,
        discovered_at,
    })
}

/// Insert a user or merge a re-sighting into the stored row.
///
/// The handle is refreshed whenever one is given; counts and optional text only
/// overwrite when the new value is known. `crawl_status` and `discovered_at` are
/// never touched on conflict, and `imported` only ever turns on.
pub(super) fn upsert_user_conn(
    conn: &Connection,
    did: &str,
    attrs: &UserAttrs,
    imported: bool,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO users (
            did, handle, display_name, description,
            followers_count, follows_count, imported, discovered_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(did) DO UPDATE SET
            handle = CASE WHEN excluded.handle <> '' THEN excluded.handle ELSE users.handle END,
            display_name = COALESCE(excluded.display_name, users.display_name),
            description = COALESCE(excluded.description, users.description),
            followers_count = CASE WHEN excluded.followers_count > 0
                THEN excluded.followers_count ELSE users.followers_count END,
            follows_count = CASE WHEN excluded.follows_count > 0
                THEN excluded.follows_count ELSE users.follows_count END,
            imported = MAX(users.imported, excluded.imported)
        "#,
        params![
            did,
            attrs.handle,
            attrs.display_name,
            attrs.description,
            attrs.followers_count as i64,
            attrs.follows_count as i64,
            imported,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Create a bare pending row for `did` if none exists yet.
pub(super) fn ensure_user_conn(conn: &Connection, did: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (did, discovered_at) VALUES (?1, ?2)",
        params![did, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Move `did` to `target` if that is an upward transition. Returns whether the row changed.
pub(super) fn mark_status_conn(conn: &Connection, did: &str, target: CrawlStatus) -> Result<bool> {
    let changed = match target {
        CrawlStatus::Pending => 0,
        CrawlStatus::Skipped => conn.execute(
            "UPDATE users SET crawl_status = 'skipped' WHERE did = ?1 AND crawl_status = 'pending'",
            params![did],
        )?,
        CrawlStatus::Crawled => conn.execute(
            "UPDATE users SET crawl_status = 'crawled' WHERE did = ?1 AND crawl_status <> 'crawled'",
            params![did],
        )?,
    };
    Ok(changed > 0)
}

pub(super) fn mark_mutual_core_conn(conn: &Connection, did: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET is_mutual_core = 1 WHERE did = ?1",
        params![did],
    )?;
    Ok(())
}

/// Insert or merge a user (see [`UserAttrs`] for the merge rules).
pub async fn upsert_user(db: &Db, did: &str, attrs: UserAttrs) -> Result<()> {
    let did = did.to_string();
    db.with_connection(move |conn| upsert_user_conn(conn, &did, &attrs, false))
        .await
}

/// Make sure a row exists for `did` without changing an existing one.
pub async fn ensure_user(db: &Db, did: &str) -> Result<()> {
    let did = did.to_string();
    db.with_connection(move |conn| ensure_user_conn(conn, &did)).await
}

/// Insert imported identifiers as pending users in one transaction.
///
/// Existing users keep their status; they are only flagged as imported.
pub async fn import_users(db: &Db, entries: Vec<(String, UserAttrs)>) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        for (did, attrs) in &entries {
            upsert_user_conn(&tx, did, attrs, true)?;
        }
        tx.commit()?;
        Ok(entries.len())
    })
    .await
}

/// Mark a user crawled. No-op (returns false) if already crawled or unknown.
pub async fn mark_crawled(db: &Db, did: &str) -> Result<bool> {
    let did = did.to_string();
    db.with_connection(move |conn| mark_status_conn(conn, &did, CrawlStatus::Crawled))
        .await
}

/// Mark a user skipped. No-op (returns false) unless the user is pending.
pub async fn mark_skipped(db: &Db, did: &str) -> Result<bool> {
    let did = did.to_string();
    db.with_connection(move |conn| mark_status_conn(conn, &did, CrawlStatus::Skipped))
        .await
}

pub async fn crawl_status(db: &Db, did: &str) -> Result<Option<CrawlStatus>> {
    let did = did.to_string();
    db.with_connection(move |conn| {
        let status = conn
            .query_row(
                "SELECT crawl_status FROM users WHERE did = ?1",
                params![did],
                |row| row.get::<_, CrawlStatus>(0),
            )
            .optional()?;
        Ok(status)
    })
    .await
}

pub async fn get_user(db: &Db, did: &str) -> Result<Option<User>> {
    let did = did.to_string();
    db.with_connection(move |conn| {
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE did = ?1", USER_COLUMNS),
                params![did],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    })
    .await
}

/// All pending identifiers in discovery order.
pub async fn pending_users(db: &Db) -> Result<Vec<String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT did FROM users WHERE crawl_status = 'pending' ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut dids = Vec::new();
        for row in rows {
            dids.push(row?);
        }
        Ok(dids)
    })
    .await
}

/// Pending users Phase 1 still has to expand, in discovery order.
///
/// These are imported users plus every pending user holding a mutual edge with a
/// crawled mutual-core user. Mutual edges are symmetric, so one direction is enough.
pub async fn phase1_frontier(db: &Db) -> Result<Vec<String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT u.did FROM users u
            WHERE u.crawl_status = 'pending'
              AND (
                u.imported = 1
                OR EXISTS (
                    SELECT 1 FROM follows f
                    JOIN users c ON c.did = f.follower_did
                    WHERE f.followee_did = u.did
                      AND f.is_mutual = 1
                      AND c.crawl_status = 'crawled'
                      AND c.is_mutual_core = 1
                )
              )
            ORDER BY u.rowid
            "#,
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut dids = Vec::new();
        for row in rows {
            dids.push(row?);
        }
        Ok(dids)
    })
    .await
}

/// Keep only the identifiers whose stored status is pending, preserving order.
pub async fn filter_pending(db: &Db, dids: Vec<String>) -> Result<Vec<String>> {
    if dids.is_empty() {
        return Ok(dids);
    }
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare("SELECT crawl_status FROM users WHERE did = ?1")?;
        let mut pending = Vec::new();
        for did in dids {
            let status = stmt
                .query_row(params![did], |row| row.get::<_, CrawlStatus>(0))
                .optional()?;
            if status == Some(CrawlStatus::Pending) {
                pending.push(did);
            }
        }
        Ok(pending)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::setup_test_db;

    fn attrs(handle: &str) -> UserAttrs {
        UserAttrs {
            handle: handle.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_pending_user() {
        let (db, _temp) = setup_test_db().await;
        upsert_user(&db, "did:plc:a", attrs("a.test")).await.unwrap();

        let user = get_user(&db, "did:plc:a").await.unwrap().unwrap();
        assert_eq!(user.handle, "a.test");
        assert_eq!(user.crawl_status, CrawlStatus::Pending);
        assert!(!user.is_mutual_core);
        assert!(!user.imported);
    }

    #[tokio::test]
    async fn test_upsert_merges_without_losing_known_data() {
        let (db, _temp) = setup_test_db().await;
        upsert_user(
            &db,
            "did:plc:a",
            UserAttrs {
                handle: "a.test".to_string(),
                display_name: Some("Alpha".to_string()),
                description: Some("bio".to_string()),
                followers_count: 120,
                follows_count: 80,
            },
        )
        .await
        .unwrap();
        let first = get_user(&db, "did:plc:a").await.unwrap().unwrap();

        // A later sighting from a follow list: new handle, nothing else known
        upsert_user(&db, "did:plc:a", attrs("alpha.test")).await.unwrap();

        let user = get_user(&db, "did:plc:a").await.unwrap().unwrap();
        assert_eq!(user.handle, "alpha.test");
        assert_eq!(user.display_name.as_deref(), Some("Alpha"));
        assert_eq!(user.description.as_deref(), Some("bio"));
        assert_eq!(user.followers_count, 120);
        assert_eq!(user.follows_count, 80);
        assert_eq!(user.discovered_at, first.discovered_at);
    }

    #[tokio::test]
    async fn test_upsert_never_resets_status() {
        let (db, _temp) = setup_test_db().await;
        upsert_user(&db, "did:plc:a", attrs("a.test")).await.unwrap();
        assert!(mark_crawled(&db, "did:plc:a").await.unwrap());

        upsert_user(&db, "did:plc:a", attrs("a.test")).await.unwrap();
        assert_eq!(
            crawl_status(&db, "did:plc:a").await.unwrap(),
            Some(CrawlStatus::Crawled)
        );
    }

    #[tokio::test]
    async fn test_status_transitions_are_monotonic() {
        let (db, _temp) = setup_test_db().await;
        ensure_user(&db, "did:plc:a").await.unwrap();
        ensure_user(&db, "did:plc:b").await.unwrap();

        assert!(mark_skipped(&db, "did:plc:a").await.unwrap());
        assert!(!mark_skipped(&db, "did:plc:a").await.unwrap());

        assert!(mark_crawled(&db, "did:plc:b").await.unwrap());
        assert!(!mark_crawled(&db, "did:plc:b").await.unwrap());
        // crawled is beyond skipped: no downgrade
        assert!(!mark_skipped(&db, "did:plc:b").await.unwrap());
        assert_eq!(
            crawl_status(&db, "did:plc:b").await.unwrap(),
            Some(CrawlStatus::Crawled)
        );

        // unknown users are a silent no-op
        assert!(!mark_crawled(&db, "did:plc:nobody").await.unwrap());
        assert_eq!(crawl_status(&db, "did:plc:nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_users_in_discovery_order() {
        let (db, _temp) = setup_test_db().await;
        for did in ["did:plc:c", "did:plc:a", "did:plc:b"] {
            ensure_user(&db, did).await.unwrap();
        }
        mark_crawled(&db, "did:plc:a").await.unwrap();
        // re-sighting keeps the original position
        upsert_user(&db, "did:plc:c", attrs("c.test")).await.unwrap();

        assert_eq!(
            pending_users(&db).await.unwrap(),
            vec!["did:plc:c".to_string(), "did:plc:b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_import_flags_existing_users_without_status_change() {
        let (db, _temp) = setup_test_db().await;
        ensure_user(&db, "did:plc:a").await.unwrap();
        mark_crawled(&db, "did:plc:a").await.unwrap();

        let n = import_users(
            &db,
            vec![
                ("did:plc:a".to_string(), UserAttrs::default()),
                ("did:plc:b".to_string(), attrs("b.test")),
            ],
        )
        .await
        .unwrap();
        assert_eq!(n, 2);

        let a = get_user(&db, "did:plc:a").await.unwrap().unwrap();
        assert!(a.imported);
        assert_eq!(a.crawl_status, CrawlStatus::Crawled);

        assert_eq!(phase1_frontier(&db).await.unwrap(), vec!["did:plc:b".to_string()]);
    }

    #[tokio::test]
    async fn test_filter_pending_preserves_order() {
        let (db, _temp) = setup_test_db().await;
        for did in ["did:plc:a", "did:plc:b", "did:plc:c"] {
            ensure_user(&db, did).await.unwrap();
        }
        mark_skipped(&db, "did:plc:b").await.unwrap();

        let pending = filter_pending(
            &db,
            vec![
                "did:plc:c".to_string(),
                "did:plc:b".to_string(),
                "did:plc:missing".to_string(),
                "did:plc:a".to_string(),
            ],
        )
        .await
        .unwrap();
        assert_eq!(pending, vec!["did:plc:c".to_string(), "did:plc:a".to_string()]);
    }
}
