//! Google Drive API client for the permission audit.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::error::{DriveError, Result};
use crate::models::{About, ApiErrorResponse, FileDetail, FileListResponse, User};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Largest page files.list will return.
pub const PAGE_SIZE: u32 = 1000;

/// Fields requested for each file during enrichment.
pub const DETAIL_FIELDS: &str = "name, shared, permissions, mimeType";

/// Error reasons Drive uses on 403 responses when throttling.
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Upper bound on the computed backoff between retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(64);

/// How throttled requests are retried.
///
/// The default never retries, so a rate-limit response fails the run like any
/// other API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Wait before the first retry when the server sends no `Retry-After`;
    /// doubled on every further attempt, up to [`MAX_BACKOFF`].
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32, headers: &HeaderMap) -> Duration {
        retry_after(headers).unwrap_or_else(|| {
            self.initial_backoff
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(MAX_BACKOFF)
        })
    }
}

/// Client for the Drive endpoints the audit needs.
pub struct DriveClient {
    base_url: String,
    auth: Authenticator,
    http: Client,
    retry: RetryPolicy,
}

impl DriveClient {
    pub fn new(auth: Authenticator) -> Self {
        Self {
            base_url: DRIVE_API_BASE.to_string(),
            auth,
            http: Client::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The account the credential belongs to.
    pub async fn about_me(&self) -> Result<User> {
        let about: About = self.get_json("/about", &[("fields", "user")]).await?;
        Ok(about.user)
    }

    /// Fetch one page of the file listing.
    pub async fn list_page(&self, page_token: Option<&str>) -> Result<FileListResponse> {
        let page_size = PAGE_SIZE.to_string();
        let mut query = vec![("pageSize", page_size.as_str())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        self.get_json("/files", &query).await
    }

    /// Fetch name, sharing flag, permissions and mime type of one file.
    pub async fn get_file_detail(&self, file_id: &str) -> Result<FileDetail> {
        self.get_json(&format!("/files/{}", file_id), &[("fields", DETAIL_FIELDS)])
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let token = self.auth.get_access_token().await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }

            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();

            if attempt < self.retry.max_retries && is_rate_limited(status, &error_body) {
                let delay = self.retry.delay(attempt, &headers);
                warn!(
                    %url,
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            debug!(%url, status = status.as_u16(), "Drive API request failed");
            return Err(api_error(status, &error_body));
        }
    }
}

/// Decode Google's error envelope, falling back to the raw body.
fn api_error(status: StatusCode, body: &str) -> DriveError {
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(body) {
        return DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::ApiError {
        status: status.as_u16(),
        message: body.to_string(),
    }
}

fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != StatusCode::FORBIDDEN {
        return false;
    }

    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| {
            e.error
                .errors
                .iter()
                .any(|r| RATE_LIMIT_REASONS.contains(&r.reason.as_str()))
        })
        .unwrap_or(false)
}

/// `Retry-After` given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
