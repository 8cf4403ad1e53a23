//! Remote directory: the network's follow and profile endpoints.
//!
//! [`Directory`] is the seam the crawler depends on. [`BlueskyDirectory`] talks
//! XRPC over HTTP, [`PacedDirectory`] wraps any directory with the mandatory
//! inter-call delay and the retry policy.

mod bluesky;
#[cfg(test)]
pub(crate) mod mock;
mod paced;
mod rate_limit;

pub use bluesky::BlueskyDirectory;
pub use paced::PacedDirectory;
pub use rate_limit::{IntervalGate, NoDelay, RateLimiter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An account as listed in a follows/followers page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
}

/// Full profile of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub followers_count: u64,
    pub follows_count: u64,
}

/// Failure of a single directory call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Account deleted, deactivated or never existed
    #[error("account not found: {0}")]
    NotFound(String),

    /// Account blocks us or hides its graph
    #[error("account is privacy restricted: {0}")]
    PrivacyRestricted(String),

    #[error("rate limited by remote service")]
    RateLimited,

    /// Network failure, timeout or server-side error
    #[error("transient error: {0}")]
    Transient(String),

    /// The session itself was rejected. Says nothing about the account asked for.
    #[error("session rejected: {0}")]
    Unauthorized(String),
}

impl FetchError {
    /// Whether retrying after a backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Transient(_))
    }

    /// Whether the failure is about the account, so skipping it is the right outcome.
    pub fn is_per_account(&self) -> bool {
        !matches!(self, FetchError::Unauthorized(_))
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_profile(&self, did: &str) -> Result<Profile, FetchError>;

    /// Accounts `did` follows, all pages, in the order the service lists them.
    async fn list_following(&self, did: &str) -> Result<Vec<Account>, FetchError>;

    /// Accounts following `did`, all pages, in the order the service lists them.
    async fn list_followers(&self, did: &str) -> Result<Vec<Account>, FetchError>;
}
