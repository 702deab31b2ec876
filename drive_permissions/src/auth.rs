//! Access tokens for the Drive API, from a user credential or a service account.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::credential_store::{CredentialStore, StoredCredential};
use crate::error::{DriveError, Result};
use crate::models::{ServiceAccountCredentials, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only access to file metadata, including permissions.
pub const DRIVE_METADATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.metadata.readonly";

/// Tokens closer than this to expiry are refreshed before use.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // OAuth scope
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

enum TokenSource {
    ServiceAccount(ServiceAccountCredentials),
    User {
        credential: StoredCredential,
        store: Option<CredentialStore>,
    },
}

/// Authenticator for the Drive API.
#[derive(Clone)]
pub struct Authenticator {
    source: Arc<TokenSource>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Create a new authenticator from a service account JSON file.
    pub fn from_service_account_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let credentials: ServiceAccountCredentials = serde_json::from_str(&content)?;
        Ok(Self::service_account(credentials))
    }

    pub fn service_account(credentials: ServiceAccountCredentials) -> Self {
        Self::with_source(TokenSource::ServiceAccount(credentials), None)
    }

    /// Create an authenticator from a user credential.
    ///
    /// The stored access token is used until it expires. Refreshed tokens are
    /// written back to `store` when one is given.
    pub fn from_stored(credential: StoredCredential, store: Option<CredentialStore>) -> Self {
        let cached = CachedToken {
            access_token: credential.access_token.clone(),
            expires_at: UNIX_EPOCH + Duration::from_secs(credential.token_expiry),
        };
        Self::with_source(TokenSource::User { credential, store }, Some(cached))
    }

    fn with_source(source: TokenSource, cached: Option<CachedToken>) -> Self {
        Self {
            source: Arc::new(source),
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(cached)),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_BUFFER {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    async fn refresh_token(&self) -> Result<CachedToken> {
        match self.source.as_ref() {
            TokenSource::ServiceAccount(credentials) => self.exchange_jwt(credentials).await,
            TokenSource::User { credential, store } => {
                self.refresh_user_token(credential, store.as_ref()).await
            }
        }
    }

    /// Exchange a signed JWT assertion for an access token.
    async fn exchange_jwt(&self, credentials: &ServiceAccountCredentials) -> Result<CachedToken> {
        let now = unix_now();
        let token_uri = credentials.token_uri.as_deref().unwrap_or(TOKEN_URI);

        let claims = Claims {
            iss: credentials.client_email.clone(),
            scope: DRIVE_METADATA_SCOPE.to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];

        debug!(service_account = %credentials.client_email, "Requesting service account token");
        let response = self.client.post(token_uri).form(&params).send().await?;
        let token_response = read_token_response(response).await?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(token_response.expires_in),
        })
    }

    /// Use the refresh token to obtain a new access token.
    async fn refresh_user_token(
        &self,
        credential: &StoredCredential,
        store: Option<&CredentialStore>,
    ) -> Result<CachedToken> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            DriveError::TokenRefreshError("credential has no refresh token".to_string())
        })?;

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
        ];
        if let Some(secret) = credential.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!("Refreshing user access token");
        let response = self
            .client
            .post(&credential.token_uri)
            .form(&params)
            .send()
            .await?;
        let token_response = read_token_response(response).await?;

        let token_expiry = unix_now() + token_response.expires_in;
        if let Some(store) = store {
            let refreshed = StoredCredential {
                access_token: token_response.access_token.clone(),
                refresh_token: token_response
                    .refresh_token
                    .or_else(|| credential.refresh_token.clone()),
                token_expiry,
                ..credential.clone()
            };
            if let Err(e) = store.save(&refreshed) {
                warn!(error = %e, "Could not update credential cache");
            } else {
                info!(path = %store.path().display(), "Updated cached credential");
            }
        }

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: UNIX_EPOCH + Duration::from_secs(token_expiry),
        })
    }
}

pub(crate) async fn read_token_response(response: Response) -> Result<TokenResponse> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DriveError::TokenRefreshError(format!(
            "Status {}: {}",
            status, body
        )));
    }

    Ok(response.json().await?)
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
