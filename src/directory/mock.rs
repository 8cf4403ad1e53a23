//! In-memory directory for tests.
//!
//! Accounts and follow edges are kept in insertion order so list results, and
//! therefore traversal order, are deterministic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Account, Directory, FetchError, Profile};

#[derive(Default)]
pub struct MockDirectory {
    accounts: Vec<String>,
    follows: Vec<(String, String)>,
    /// Failures returned (front first) before calls for a DID start succeeding.
    scripted_failures: Mutex<HashMap<String, Vec<FetchError>>>,
    permanent_failures: HashMap<String, FetchError>,
    calls: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, did: &str) -> Self {
        if !self.accounts.iter().any(|a| a == did) {
            self.accounts.push(did.to_string());
        }
        self
    }

    /// `follower` follows `followee`.
    pub fn follow(self, follower: &str, followee: &str) -> Self {
        let mut this = self.account(follower).account(followee);
        this.follows.push((follower.to_string(), followee.to_string()));
        this
    }

    pub fn mutual(self, a: &str, b: &str) -> Self {
        self.follow(a, b).follow(b, a)
    }

    /// The next `times` calls concerning `did` fail with `error`.
    pub fn fail_times(self, did: &str, error: FetchError, times: usize) -> Self {
        self.scripted_failures
            .lock()
            .unwrap()
            .entry(did.to_string())
            .or_default()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// Every call concerning `did` fails with `error`.
    pub fn fail_always(mut self, did: &str, error: FetchError) -> Self {
        self.permanent_failures.insert(did.to_string(), error);
        self
    }

    /// Total calls made, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn handle_of(did: &str) -> String {
        format!("{}.test", did.rsplit(':').next().unwrap_or(did))
    }

    fn as_account(did: &str) -> Account {
        Account {
            did: did.to_string(),
            handle: Self::handle_of(did),
            display_name: None,
        }
    }

    fn check(&self, did: &str) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.permanent_failures.get(did) {
            return Err(error.clone());
        }
        let mut scripted = self.scripted_failures.lock().unwrap();
        if let Some(queue) = scripted.get_mut(did) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        if !self.accounts.iter().any(|a| a == did) {
            return Err(FetchError::NotFound(did.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MockDirectory {
    async fn get_profile(&self, did: &str) -> Result<Profile, FetchError> {
        self.check(did)?;
        let followers = self.follows.iter().filter(|(_, to)| to == did).count() as u64;
        let following = self.follows.iter().filter(|(from, _)| from == did).count() as u64;
        Ok(Profile {
            did: did.to_string(),
            handle: Self::handle_of(did),
            display_name: Some(did.to_uppercase()),
            description: None,
            followers_count: followers,
            follows_count: following,
        })
    }

    async fn list_following(&self, did: &str) -> Result<Vec<Account>, FetchError> {
        self.check(did)?;
        Ok(self
            .follows
            .iter()
            .filter(|(from, _)| from == did)
            .map(|(_, to)| Self::as_account(to))
            .collect())
    }

    async fn list_followers(&self, did: &str) -> Result<Vec<Account>, FetchError> {
        self.check(did)?;
        Ok(self
            .follows
            .iter()
            .filter(|(_, to)| to == did)
            .map(|(from, _)| Self::as_account(from))
            .collect())
    }
}
