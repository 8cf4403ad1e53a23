use serde::Serialize;

use super::{crawl_user, CrawlOutcome, Frontier};
use crate::db::Db;
use crate::directory::Directory;
use crate::error::Result;
use crate::store::{self, CrawlStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Phase1Summary {
    pub crawled: usize,
    pub skipped: usize,
    /// Queue entries left when the run stopped (non-zero only if `max_users` was hit).
    pub remaining: usize,
}

/// Phase 1: breadth-first expansion through mutual follows, starting at `seed`.
///
/// Resumes from whatever the store already holds. Only mutual neighbors are
/// queued; one-way follows are recorded as edges and left pending for Phase 2.
/// `max_users` caps how many users this call expands.
pub async fn crawl_mutual_core<D>(
    db: &Db,
    directory: &D,
    seed: &str,
    max_users: Option<usize>,
) -> Result<Phase1Summary>
where
    D: Directory + ?Sized,
{
    store::ensure_user(db, seed).await?;
    let mut frontier = Frontier::resume(db, seed).await?;
    let mut summary = Phase1Summary::default();

    log::info!("=== Phase 1: mutual core from {} ===", seed);
    log::info!("Frontier: {} queued", frontier.len());
    if let Some(limit) = max_users {
        log::info!("Limit: {} users", limit);
    }

    while let Some(did) = frontier.pop() {
        if store::crawl_status(db, &did).await? != Some(CrawlStatus::Pending) {
            continue;
        }
        if let Some(limit) = max_users {
            if summary.crawled + summary.skipped >= limit {
                log::warn!("Reached Phase 1 limit of {} users", limit);
                summary.remaining = frontier.len() + 1;
                break;
            }
        }

        match crawl_user(db, directory, &did, true).await? {
            CrawlOutcome::Crawled { mutuals, .. } => {
                summary.crawled += 1;
                frontier.extend(store::filter_pending(db, mutuals).await?);
                let stats = store::stats(db).await?;
                log::info!(
                    "  Progress: {} mutual core crawled, {} queued, {} accounts in graph",
                    stats.mutual_core_users,
                    frontier.len(),
                    stats.total_users
                );
            }
            CrawlOutcome::Skipped(_) => summary.skipped += 1,
        }
    }

    log::info!(
        "Phase 1 complete: {} crawled, {} skipped",
        summary.crawled,
        summary.skipped
    );
    Ok(summary)
}
