use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use super::{Account, Directory, FetchError, Profile, RateLimiter};
use crate::error::{GraphcrawlError, Result};

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const GET_PROFILE: &str = "app.bsky.actor.getProfile";
const GET_FOLLOWS: &str = "app.bsky.graph.getFollows";
const GET_FOLLOWERS: &str = "app.bsky.graph.getFollowers";

/// Request body for createSession
#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

/// Response of createSession / refreshSession
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    did: String,
    handle: String,
    display_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    followers_count: u64,
    #[serde(default)]
    follows_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRef {
    did: String,
    handle: String,
    display_name: Option<String>,
}

/// One page of getFollows or getFollowers
#[derive(Deserialize)]
struct GraphPage {
    #[serde(alias = "follows", alias = "followers")]
    accounts: Vec<ProfileRef>,
    cursor: Option<String>,
}

/// XRPC error body, e.g. `{"error": "RateLimitExceeded", "message": "..."}`
#[derive(Deserialize, Default)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

struct Session {
    access_jwt: String,
    refresh_jwt: String,
}

/// Directory client for an AT Protocol service (XRPC over HTTPS).
///
/// Authenticates once with an app password and refreshes the access token when
/// the service reports it expired. Pages of a follow listing are separated by
/// `page_gate.pause()`; pacing between whole calls belongs to
/// [`PacedDirectory`](super::PacedDirectory).
pub struct BlueskyDirectory {
    client: Client,
    service: Url,
    session: RwLock<Session>,
    did: String,
    handle: String,
    page_limit: u32,
    page_gate: Arc<dyn RateLimiter>,
}

impl BlueskyDirectory {
    /// Log in with `identifier` (handle or DID) and an app password.
    pub async fn login(
        service_url: &str,
        identifier: &str,
        password: &str,
        page_limit: u32,
        timeout: Duration,
        page_gate: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let service = Url::parse(service_url)
            .map_err(|e| GraphcrawlError::Config(format!("Invalid service URL {}: {}", service_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("graphcrawl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraphcrawlError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let url = xrpc_url(&service, CREATE_SESSION)?;
        let response = client
            .post(url)
            .json(&CreateSessionRequest { identifier, password })
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                return Err(GraphcrawlError::Config(format!(
                    "Login rejected for {}: {}",
                    identifier,
                    body.message.unwrap_or_else(|| "invalid credentials".to_string())
                )));
            }
            return Err(classify_failure(status, &body, identifier).into());
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to parse session: {}", e)))?;

        log::info!("Logged in as {} ({})", session.handle, session.did);

        Ok(Self {
            client,
            service,
            session: RwLock::new(Session {
                access_jwt: session.access_jwt,
                refresh_jwt: session.refresh_jwt,
            }),
            did: session.did,
            handle: session.handle,
            page_limit: page_limit.clamp(1, 100),
            page_gate,
        })
    }

    /// DID of the logged-in account
    pub fn session_did(&self) -> &str {
        &self.did
    }

    pub fn session_handle(&self) -> &str {
        &self.handle
    }

    async fn refresh(&self) -> std::result::Result<(), FetchError> {
        let mut session = self.session.write().await;
        let response = self
            .client
            .post(xrpc_url(&self.service, REFRESH_SESSION)?)
            .bearer_auth(&session.refresh_jwt)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            // A refresh that fails for good leaves no usable session
            return Err(match classify_failure(status, &body, &self.did) {
                e if e.is_retryable() || !e.is_per_account() => e,
                other => FetchError::Unauthorized(format!("refreshSession failed: {}", other)),
            });
        }

        let refreshed: SessionResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to parse session: {}", e)))?;
        session.access_jwt = refreshed.access_jwt;
        session.refresh_jwt = refreshed.refresh_jwt;
        log::info!("Refreshed session for {}", self.handle);
        Ok(())
    }

    /// GET an XRPC query, refreshing the session once if the token expired.
    async fn get_json<T: DeserializeOwned>(
        &self,
        nsid: &str,
        subject: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, FetchError> {
        let url = xrpc_url(&self.service, nsid)?;
        let mut refreshed = false;

        loop {
            let token = self.session.read().await.access_jwt.clone();
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(token)
                .query(query)
                .send()
                .await
                .map_err(network_error)?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| FetchError::Transient(format!("Failed to parse {} response: {}", nsid, e)));
            }

            let body: XrpcErrorBody = response.json().await.unwrap_or_default();
            if !refreshed && body.error.as_deref() == Some("ExpiredToken") {
                self.refresh().await?;
                refreshed = true;
                continue;
            }
            return Err(classify_failure(status, &body, subject));
        }
    }

    async fn list_all(&self, nsid: &str, did: &str) -> std::result::Result<Vec<Account>, FetchError> {
        let mut accounts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("actor", did.to_string()), ("limit", self.page_limit.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: GraphPage = self.get_json(nsid, did, &query).await?;
            let page_len = page.accounts.len();
            accounts.extend(page.accounts.into_iter().map(|p| Account {
                did: p.did,
                handle: p.handle,
                display_name: p.display_name,
            }));

            match page.cursor {
                Some(next) if page_len > 0 && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                    self.page_gate.pause().await;
                }
                _ => break,
            }
        }

        log::debug!("{} for {}: {} accounts", nsid, did, accounts.len());
        Ok(accounts)
    }
}

#[async_trait]
impl Directory for BlueskyDirectory {
    async fn get_profile(&self, did: &str) -> std::result::Result<Profile, FetchError> {
        let view: ProfileView = self
            .get_json(GET_PROFILE, did, &[("actor", did.to_string())])
            .await?;
        Ok(Profile {
            did: view.did,
            handle: view.handle,
            display_name: view.display_name,
            description: view.description,
            followers_count: view.followers_count,
            follows_count: view.follows_count,
        })
    }

    async fn list_following(&self, did: &str) -> std::result::Result<Vec<Account>, FetchError> {
        self.list_all(GET_FOLLOWS, did).await
    }

    async fn list_followers(&self, did: &str) -> std::result::Result<Vec<Account>, FetchError> {
        self.list_all(GET_FOLLOWERS, did).await
    }
}

fn xrpc_url(service: &Url, nsid: &str) -> std::result::Result<Url, FetchError> {
    service
        .join(&format!("xrpc/{}", nsid))
        .map_err(|e| FetchError::Transient(format!("Invalid XRPC URL for {}: {}", nsid, e)))
}

fn network_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient(format!("Timeout: {}", e))
    } else {
        FetchError::Transient(format!("Network error: {}", e))
    }
}

/// Map a failed XRPC response onto the crawler's error taxonomy.
fn classify_failure(status: StatusCode, body: &XrpcErrorBody, subject: &str) -> FetchError {
    let code = body.error.as_deref().unwrap_or("");
    let message = body.message.as_deref().unwrap_or("");

    if status == StatusCode::TOO_MANY_REQUESTS || code == "RateLimitExceeded" {
        return FetchError::RateLimited;
    }
    if status.is_server_error() {
        return FetchError::Transient(format!("HTTP {}: {}", status, message));
    }
    // Session problems would hit every account alike
    if matches!(code, "ExpiredToken" | "InvalidToken" | "AuthenticationRequired" | "AuthMissing")
        || status == StatusCode::UNAUTHORIZED
    {
        let reason = if code.is_empty() { "HTTP 401" } else { code };
        return FetchError::Unauthorized(format!("{} ({})", reason, message));
    }
    if matches!(code, "BlockedActor" | "BlockedByActor") || status == StatusCode::FORBIDDEN {
        return FetchError::PrivacyRestricted(subject.to_string());
    }
    if matches!(
        code,
        "NotFound" | "ActorNotFound" | "ProfileNotFound" | "RepoNotFound"
            | "AccountDeactivated" | "AccountTakedown"
    ) || status == StatusCode::NOT_FOUND
        || message.to_lowercase().contains("not found")
    {
        return FetchError::NotFound(subject.to_string());
    }
    // Any other client error will not improve on retry; treat the account as unavailable.
    FetchError::NotFound(format!("{} (HTTP {} {}: {})", subject, status.as_u16(), code, message))
}
