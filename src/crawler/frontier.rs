use std::collections::VecDeque;

use crate::db::Db;
use crate::error::Result;
use crate::store::{self, CrawlStatus};

/// FIFO queue of identifiers waiting for expansion.
///
/// Membership is not tracked here: the same identifier may be queued twice, and
/// the crawler checks the stored status when popping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    queue: VecDeque<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the Phase 1 frontier from the store.
    ///
    /// The seed comes first if it is still pending, followed by every pending
    /// imported user or mutual of the crawled core, in discovery order.
    pub async fn resume(db: &Db, seed: &str) -> Result<Self> {
        let mut frontier = Self::new();
        if store::crawl_status(db, seed).await? == Some(CrawlStatus::Pending) {
            frontier.push(seed);
        }
        for did in store::phase1_frontier(db).await? {
            if did != seed {
                frontier.push(did);
            }
        }
        Ok(frontier)
    }

    pub fn push(&mut self, did: impl Into<String>) {
        self.queue.push_back(did.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Extend<String> for Frontier {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.queue.extend(iter);
    }
}
