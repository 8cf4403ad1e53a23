use serde::Serialize;

use super::{crawl_user, CrawlOutcome};
use crate::db::Db;
use crate::directory::Directory;
use crate::error::{GraphcrawlError, Result};
use crate::store::{self, CountScope, CrawlStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Phase2Summary {
    pub crawled: usize,
    pub skipped: usize,
    /// Scans that admitted at least one user.
    pub passes: usize,
    /// True if `max_users` stopped the run before the fixed point.
    pub limit_reached: bool,
}

/// Reject thresholds that would admit every known user.
pub fn check_min_connections(min_connections: usize) -> Result<()> {
    if min_connections < 1 {
        return Err(GraphcrawlError::Config(
            "min_connections must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Phase 2: admit pending users with at least `min_connections` distinct known
/// neighbors (either direction), crawl them, and rescan until a scan admits nobody.
///
/// The threshold is validated, and Phase 1 must have drained its frontier,
/// before the directory is touched. Admitting a queued core user here would
/// record it outside the mutual core for good.
pub async fn expand_by_threshold<D>(
    db: &Db,
    directory: &D,
    min_connections: usize,
    scope: CountScope,
    max_users: Option<usize>,
) -> Result<Phase2Summary>
where
    D: Directory + ?Sized,
{
    check_min_connections(min_connections)?;
    let queued = store::phase1_frontier(db).await?.len();
    if queued > 0 {
        return Err(GraphcrawlError::Phase1Incomplete(queued));
    }

    let mut summary = Phase2Summary::default();
    log::info!("=== Phase 2: expanding beyond the mutual core ===");
    log::info!("Minimum connections: {} ({:?} scope)", min_connections, scope);
    if let Some(limit) = max_users {
        log::info!("Limit: {} users", limit);
    }

    loop {
        let candidates = store::connection_counts(db, min_connections, scope).await?;
        if candidates.is_empty() {
            break;
        }
        summary.passes += 1;
        log::info!("Pass {}: {} candidates admitted", summary.passes, candidates.len());

        for candidate in candidates {
            if let Some(limit) = max_users {
                if summary.crawled + summary.skipped >= limit {
                    log::warn!("Reached Phase 2 limit of {} users", limit);
                    summary.limit_reached = true;
                    return Ok(summary);
                }
            }
            if store::crawl_status(db, &candidate.did).await? != Some(CrawlStatus::Pending) {
                continue;
            }

            log::info!(
                "Admitting {} (@{}): {} connections",
                candidate.did,
                candidate.handle,
                candidate.connections
            );
            match crawl_user(db, directory, &candidate.did, false).await? {
                CrawlOutcome::Crawled { .. } => summary.crawled += 1,
                CrawlOutcome::Skipped(_) => summary.skipped += 1,
            }
        }
    }

    log::info!(
        "Phase 2 complete: {} crawled, {} skipped over {} passes",
        summary.crawled,
        summary.skipped,
        summary.passes
    );
    Ok(summary)
}
