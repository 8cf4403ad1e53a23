//! Two-phase frontier crawler.
//!
//! Phase 1 walks breadth-first through mutual follows from a seed. Phase 2
//! admits any pending user already linked to enough known users and repeats
//! until a scan admits nobody. Both phases expand a user the same way: fetch,
//! record in one transaction, mark crawled (or skipped on failure).

mod frontier;
mod phase1;
mod phase2;

pub use frontier::Frontier;
pub use phase1::{crawl_mutual_core, Phase1Summary};
pub use phase2::{check_min_connections, expand_by_threshold, Phase2Summary};

use std::collections::HashSet;

use crate::db::Db;
use crate::directory::{Directory, FetchError};
use crate::error::Result;
use crate::store::{self, CrawlRecord, Edge, UserAttrs};

/// Result of expanding one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Crawled {
        /// Mutual follows, in the order the user's follow list gave them.
        mutuals: Vec<String>,
        following: usize,
        followers: usize,
    },
    Skipped(FetchError),
}

/// Fetch `did` and commit everything it reveals.
///
/// Directory failures about the account (after whatever retries the directory
/// applies) mark the user skipped and are reported in the outcome. Store errors
/// and a rejected session propagate.
pub(crate) async fn crawl_user<D>(
    db: &Db,
    directory: &D,
    did: &str,
    mutual_core: bool,
) -> Result<CrawlOutcome>
where
    D: Directory + ?Sized,
{
    log::debug!("Fetching {}", did);

    let profile = match directory.get_profile(did).await {
        Ok(profile) => profile,
        Err(e) => return skip(db, did, e).await,
    };
    let following = match directory.list_following(did).await {
        Ok(accounts) => accounts,
        Err(e) => return skip(db, did, e).await,
    };
    let followers = match directory.list_followers(did).await {
        Ok(accounts) => accounts,
        Err(e) => return skip(db, did, e).await,
    };

    let follower_dids: HashSet<&str> = followers.iter().map(|a| a.did.as_str()).collect();
    let following_dids: HashSet<&str> = following.iter().map(|a| a.did.as_str()).collect();

    let mut neighbors: Vec<(String, UserAttrs)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut edges = Vec::with_capacity(following.len() + followers.len());
    let mut mutuals = Vec::new();

    for account in following.iter().filter(|a| a.did != did) {
        let is_mutual = follower_dids.contains(account.did.as_str());
        if is_mutual {
            mutuals.push(account.did.clone());
        }
        edges.push(Edge::new(did, account.did.as_str(), is_mutual));
        if seen.insert(account.did.as_str()) {
            neighbors.push((account.did.clone(), UserAttrs::from(account)));
        }
    }
    for account in followers.iter().filter(|a| a.did != did) {
        let is_mutual = following_dids.contains(account.did.as_str());
        edges.push(Edge::new(account.did.as_str(), did, is_mutual));
        if seen.insert(account.did.as_str()) {
            neighbors.push((account.did.clone(), UserAttrs::from(account)));
        }
    }

    let label = if profile.handle.is_empty() { did } else { profile.handle.as_str() };
    log::info!(
        "✓ {} (@{}): {} follows, {} followers, {} mutuals",
        profile.display_name.as_deref().unwrap_or(label),
        label,
        following.len(),
        followers.len(),
        mutuals.len()
    );

    store::record_crawl(
        db,
        CrawlRecord {
            did: did.to_string(),
            profile: UserAttrs::from(&profile),
            neighbors,
            edges,
            mutual_core,
        },
    )
    .await?;

    Ok(CrawlOutcome::Crawled {
        mutuals,
        following: following.len(),
        followers: followers.len(),
    })
}

/// Mark `did` skipped for an account-level failure. Session failures abort the
/// run instead and leave the user pending.
async fn skip(db: &Db, did: &str, error: FetchError) -> Result<CrawlOutcome> {
    if !error.is_per_account() {
        log::error!("Stopping at {}: {}", did, error);
        return Err(error.into());
    }
    log::warn!("✗ Skipping {}: {}", did, error);
    store::mark_skipped(db, did).await?;
    Ok(CrawlOutcome::Skipped(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::MockDirectory;
    use crate::store::testing::setup_test_db;
    use crate::store::{all_edges, get_user, CrawlStatus};

    #[tokio::test]
    async fn test_crawl_user_records_mutual_and_one_way_edges() {
        let (db, _temp) = setup_test_db().await;
        let directory = MockDirectory::new()
            .mutual("did:plc:a", "did:plc:b")
            .follow("did:plc:a", "did:plc:c")
            .follow("did:plc:d", "did:plc:a");
        store::ensure_user(&db, "did:plc:a").await.unwrap();

        let outcome = crawl_user(&db, &directory, "did:plc:a", true).await.unwrap();
        assert_eq!(
            outcome,
            CrawlOutcome::Crawled {
                mutuals: vec!["did:plc:b".to_string()],
                following: 2,
                followers: 2,
            }
        );

        assert_eq!(
            all_edges(&db).await.unwrap(),
            vec![
                Edge::new("did:plc:a", "did:plc:b", true),
                Edge::new("did:plc:a", "did:plc:c", false),
                Edge::new("did:plc:b", "did:plc:a", true),
                Edge::new("did:plc:d", "did:plc:a", false),
            ]
        );

        let a = get_user(&db, "did:plc:a").await.unwrap().unwrap();
        assert_eq!(a.crawl_status, CrawlStatus::Crawled);
        assert_eq!(a.handle, "a.test");
        assert!(a.is_mutual_core);
        for did in ["did:plc:b", "did:plc:c", "did:plc:d"] {
            let user = get_user(&db, did).await.unwrap().unwrap();
            assert_eq!(user.crawl_status, CrawlStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_crawl_user_failure_marks_skipped() {
        let (db, _temp) = setup_test_db().await;
        let directory = MockDirectory::new()
            .account("did:plc:a")
            .fail_always("did:plc:a", FetchError::PrivacyRestricted("did:plc:a".to_string()));
        store::ensure_user(&db, "did:plc:a").await.unwrap();

        let outcome = crawl_user(&db, &directory, "did:plc:a", true).await.unwrap();
        assert!(matches!(outcome, CrawlOutcome::Skipped(FetchError::PrivacyRestricted(_))));

        let a = get_user(&db, "did:plc:a").await.unwrap().unwrap();
        assert_eq!(a.crawl_status, CrawlStatus::Skipped);
        assert!(!a.is_mutual_core);
        assert!(all_edges(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_session_aborts_and_leaves_user_pending() {
        let (db, _temp) = setup_test_db().await;
        let directory = MockDirectory::new()
            .mutual("did:plc:a", "did:plc:b")
            .fail_always("did:plc:a", FetchError::Unauthorized("ExpiredToken".to_string()));
        store::ensure_user(&db, "did:plc:a").await.unwrap();

        let err = crawl_user(&db, &directory, "did:plc:a", true).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::GraphcrawlError::Directory(FetchError::Unauthorized(_))
        ));
        assert_eq!(
            store::crawl_status(&db, "did:plc:a").await.unwrap(),
            Some(CrawlStatus::Pending)
        );
    }
}
