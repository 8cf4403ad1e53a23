//! Bulk seed import: pre-populate the Phase 1 frontier from a member list.
//!
//! One entry per line, either `did` or `did,handle`. Blank lines and lines
//! starting with `#` are ignored; duplicates keep their first position.

use std::collections::HashSet;
use std::path::Path;

use crate::db::Db;
use crate::error::{GraphcrawlError, Result};
use crate::store::{self, UserAttrs};

/// One parsed line of a seed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub did: String,
    pub handle: Option<String>,
}

/// Parse a seed list. Entries that are not DIDs are rejected with their line number.
pub fn parse_seed_list(content: &str) -> Result<Vec<SeedEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(2, ',').map(str::trim);
        let did = fields.next().unwrap_or_default();
        let handle = fields
            .next()
            .map(|h| h.trim_start_matches('@'))
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        if !did.starts_with("did:") || did.contains(char::is_whitespace) {
            return Err(GraphcrawlError::Parse(format!(
                "line {}: expected a DID, got {:?}",
                idx + 1,
                did
            )));
        }

        if seen.insert(did.to_string()) {
            entries.push(SeedEntry {
                did: did.to_string(),
                handle,
            });
        }
    }

    Ok(entries)
}

/// Import every identifier in `path` as a pending user with no edges.
///
/// Returns the imported identifiers in file order.
pub async fn import_all(db: &Db, path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    let entries = parse_seed_list(&content)?;
    let dids: Vec<String> = entries.iter().map(|e| e.did.clone()).collect();

    let rows = entries
        .into_iter()
        .map(|e| {
            let attrs = UserAttrs {
                handle: e.handle.unwrap_or_default(),
                ..Default::default()
            };
            (e.did, attrs)
        })
        .collect();
    let count = store::import_users(db, rows).await?;
    log::info!("Imported {} seed users from {}", count, path.display());

    Ok(dids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::setup_test_db;
    use crate::store::{all_edges, get_user, CrawlStatus};

    #[test]
    fn test_parse_skips_comments_blanks_and_duplicates() {
        let entries = parse_seed_list(
            "# member list export\n\
             did:plc:aaa\n\
             \n\
             did:plc:bbb, @bee.test\n\
             did:plc:aaa,other.test\n",
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                SeedEntry { did: "did:plc:aaa".to_string(), handle: None },
                SeedEntry { did: "did:plc:bbb".to_string(), handle: Some("bee.test".to_string()) },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_non_did() {
        let err = parse_seed_list("did:plc:aaa\nsomeone.bsky.social\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_import_creates_pending_frontier_users() {
        let (db, temp) = setup_test_db().await;
        let path = temp.path().join("seeds.txt");
        std::fs::write(&path, "did:plc:aaa,aaa.test\ndid:plc:bbb\n").unwrap();

        let dids = import_all(&db, &path).await.unwrap();
        assert_eq!(dids, vec!["did:plc:aaa".to_string(), "did:plc:bbb".to_string()]);

        let a = get_user(&db, "did:plc:aaa").await.unwrap().unwrap();
        assert_eq!(a.handle, "aaa.test");
        assert_eq!(a.crawl_status, CrawlStatus::Pending);
        assert!(a.imported);
        assert!(all_edges(&db).await.unwrap().is_empty());
        assert_eq!(store::phase1_frontier(&db).await.unwrap(), dids);
    }

    #[tokio::test]
    async fn test_import_missing_file_is_io_error() {
        let (db, temp) = setup_test_db().await;
        let err = import_all(&db, &temp.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, GraphcrawlError::Io(_)));
    }
}
