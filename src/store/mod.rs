//! Graph store: users and directed follow edges persisted in SQLite.
//!
//! Every write is an upsert or an upward status transition, so whatever is on
//! disk after an interrupt is a valid state to resume from. The `crawl_status`
//! column is the only record of which users have been visited.

mod crawl;
mod edges;
mod users;

pub use crawl::{record_crawl, stats, CrawlRecord, GraphStats};
pub use edges::{all_edges, connection_counts, edges_of, upsert_edge, ConnectionCount};
pub use users::{
    crawl_status, ensure_user, filter_pending, get_user, import_users, mark_crawled,
    mark_skipped, pending_users, phase1_frontier, upsert_user,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::directory::{Account, Profile};
use crate::error::GraphcrawlError;

/// Crawl state of a user. Ordered: a user only ever moves to a greater variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Pending,
    Skipped,
    Crawled,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Pending => "pending",
            CrawlStatus::Skipped => "skipped",
            CrawlStatus::Crawled => "crawled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CrawlStatus::Pending)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlStatus {
    type Err = GraphcrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CrawlStatus::Pending),
            "skipped" => Ok(CrawlStatus::Skipped),
            "crawled" => Ok(CrawlStatus::Crawled),
            other => Err(GraphcrawlError::Parse(format!("unknown crawl status: {}", other))),
        }
    }
}

/// Which neighbors count toward a candidate's connection count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountScope {
    /// Every known user linked to the candidate, in either direction.
    #[default]
    Graph,
    /// Only users crawled as part of the Phase 1 mutual core.
    MutualCore,
}

impl FromStr for CountScope {
    type Err = GraphcrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph" => Ok(CountScope::Graph),
            "mutual_core" | "mutual-core" => Ok(CountScope::MutualCore),
            other => Err(GraphcrawlError::Parse(format!("unknown count scope: {}", other))),
        }
    }
}

/// Mutable user attributes as seen on one sighting.
///
/// Empty/zero values mean "unknown here" and never overwrite stored data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAttrs {
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub followers_count: u64,
    pub follows_count: u64,
}

impl From<&Account> for UserAttrs {
    fn from(account: &Account) -> Self {
        Self {
            handle: account.handle.clone(),
            display_name: account.display_name.clone(),
            ..Default::default()
        }
    }
}

impl From<&Profile> for UserAttrs {
    fn from(profile: &Profile) -> Self {
        Self {
            handle: profile.handle.clone(),
            display_name: profile.display_name.clone(),
            description: profile.description.clone(),
            followers_count: profile.followers_count,
            follows_count: profile.follows_count,
        }
    }
}

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub followers_count: u64,
    pub follows_count: u64,
    pub crawl_status: CrawlStatus,
    pub is_mutual_core: bool,
    pub imported: bool,
    pub discovered_at: DateTime<Utc>,
}

/// A directed follow edge (follower --follows--> followee).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub follower: String,
    pub followee: String,
    pub is_mutual: bool,
}

impl Edge {
    pub fn new(follower: impl Into<String>, followee: impl Into<String>, is_mutual: bool) -> Self {
        Self {
            follower: follower.into(),
            followee: followee.into(),
            is_mutual,
        }
    }
}
