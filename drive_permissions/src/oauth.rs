//! Interactive OAuth 2.0 consent flow for installed applications.
//!
//! The user is sent to Google's consent page; the authorization code comes
//! back either to a short-lived loopback web server or the user pastes the
//! redirected URL into the terminal. Both variants redirect to a loopback
//! address, use PKCE and verify the `state` parameter.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{read_token_response, unix_now, Authenticator, DRIVE_METADATA_SCOPE};
use crate::credential_store::{CredentialStore, StoredCredential};
use crate::error::{DriveError, Result};
use crate::models::{ClientSecrets, ClientSecretsFile};

const SUCCESS_PAGE: &str = "The authentication flow has completed. You may close this window.";

/// How long the loopback server may take to finish its last response.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How the consent flow receives the authorization code.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub host: String,
    /// Ports tried in order for the loopback server.
    pub ports: Vec<u16>,
    /// When false the user pastes the redirected URL into the terminal.
    pub local_webserver: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            ports: vec![8080, 8090],
            local_webserver: true,
        }
    }
}

/// PKCE code verifier together with the CSRF state value.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(verifier)).
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Query parameters Google appends to the redirect.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Read the `client_secret.json` downloaded from the Cloud console.
pub fn load_client_secrets<P: AsRef<Path>>(path: P) -> Result<ClientSecrets> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| DriveError::ClientSecrets(format!("{}: {}", path.display(), e)))?;
    let file: ClientSecretsFile = serde_json::from_str(&content)?;

    file.installed.or(file.web).ok_or_else(|| {
        DriveError::ClientSecrets("expected an \"installed\" or \"web\" section".to_string())
    })
}

/// Parse what the user pasted after the manual flow.
///
/// Accepts the full URL the browser was redirected to, whose `state` is then
/// checked like a loopback callback, or the bare `code` value, which carries
/// no state of its own.
pub fn parse_pasted_response(input: &str, verifier: &PkceVerifier) -> Result<CallbackParams> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DriveError::ConsentDenied("no authorization response entered".into()));
    }

    if !input.contains("://") {
        return Ok(CallbackParams {
            code: Some(input.to_string()),
            state: Some(verifier.state().to_string()),
            error: None,
        });
    }

    let url = Url::parse(input)
        .map_err(|e| DriveError::AuthenticationError(format!("malformed redirect URL: {}", e)))?;

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}

/// Installed-application authorization code flow.
pub struct InstalledFlow {
    secrets: ClientSecrets,
    scope: String,
    options: FlowOptions,
    http: Client,
}

impl InstalledFlow {
    pub fn new(secrets: ClientSecrets, options: FlowOptions) -> Self {
        Self {
            secrets,
            scope: DRIVE_METADATA_SCOPE.to_string(),
            options,
            http: Client::new(),
        }
    }

    /// Consent page URL for the given redirect target.
    pub fn authorization_url(&self, redirect_uri: &str, verifier: &PkceVerifier) -> Result<String> {
        let mut url = Url::parse(&self.secrets.auth_uri)
            .map_err(|e| DriveError::ClientSecrets(format!("invalid auth_uri: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("state", verifier.state())
            .append_pair("code_challenge", &verifier.challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline");

        Ok(url.to_string())
    }

    /// Ask the user for consent and exchange the resulting code.
    pub async fn run(&self) -> Result<StoredCredential> {
        let verifier = PkceVerifier::new();

        if self.options.local_webserver {
            if let Some((listener, port)) = self.bind_loopback().await {
                let redirect_uri = format!("http://{}:{}/", self.options.host, port);
                let auth_url = self.authorization_url(&redirect_uri, &verifier)?;

                println!("Your browser needs to visit the following link to authorize access:");
                println!();
                println!("    {}", auth_url);
                println!();
                println!("Waiting for the authorization response on {}", redirect_uri);

                let code = receive_code(listener, &verifier).await?;
                return self.exchange_code(&code, &redirect_uri, &verifier).await;
            }
            warn!(
                host = %self.options.host,
                ports = ?self.options.ports,
                "Could not start a local web server, falling back to manual entry"
            );
        }

        let redirect_uri = self.manual_redirect_uri();
        let auth_url = self.authorization_url(&redirect_uri, &verifier)?;
        println!("Go to the following link in your browser:");
        println!();
        println!("    {}", auth_url);
        println!();
        println!("After granting access the browser is sent to {} which will", redirect_uri);
        println!("not load. Copy the full URL from the address bar (or its code value).");

        let pasted = prompt_for_response().await?;
        let code = code_from_callback(parse_pasted_response(&pasted, &verifier)?, &verifier)?;
        self.exchange_code(&code, &redirect_uri, &verifier).await
    }

    /// Loopback redirect used when nothing listens for it.
    fn manual_redirect_uri(&self) -> String {
        let port = self.options.ports.first().copied().unwrap_or(8080);
        format!("http://{}:{}/", self.options.host, port)
    }

    async fn bind_loopback(&self) -> Option<(TcpListener, u16)> {
        for &port in &self.options.ports {
            match TcpListener::bind((self.options.host.as_str(), port)).await {
                Ok(listener) => return Some((listener, port)),
                Err(e) => debug!(port, error = %e, "Loopback port unavailable"),
            }
        }
        None
    }

    /// Trade an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: &PkceVerifier,
    ) -> Result<StoredCredential> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.secrets.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(secret) = self.secrets.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await?;
        let tokens = read_token_response(response)
            .await
            .map_err(|e| DriveError::AuthenticationError(e.to_string()))?;

        Ok(StoredCredential {
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            refresh_token: tokens.refresh_token,
            token_uri: self.secrets.token_uri.clone(),
            access_token: tokens.access_token,
            token_expiry: unix_now() + tokens.expires_in,
        })
    }
}

#[derive(Clone)]
struct CallbackState {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    if params.code.is_none() && params.error.is_none() {
        return (StatusCode::NOT_FOUND, "");
    }

    let sender = state.sender.lock().ok().and_then(|mut sender| sender.take());
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }
    (StatusCode::OK, SUCCESS_PAGE)
}

/// Serve the redirect target until a request carries a code or an error.
///
/// Connections that never send a request, or send one without either
/// parameter, are left to the server and do not end the wait.
async fn receive_code(listener: TcpListener, verifier: &PkceVerifier) -> Result<String> {
    let (params_tx, params_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let state = CallbackState {
        sender: Arc::new(Mutex::new(Some(params_tx))),
    };
    let router = Router::new()
        .route("/", get(handle_callback))
        .with_state(state);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let params = params_rx.await.map_err(|_| {
        DriveError::AuthenticationError("callback server stopped before a response".into())
    })?;

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
        debug!("Loopback server still draining connections, aborting it");
        server.abort();
    }

    code_from_callback(params, verifier)
}

fn code_from_callback(params: CallbackParams, verifier: &PkceVerifier) -> Result<String> {
    if let Some(error) = params.error {
        return Err(DriveError::ConsentDenied(error));
    }

    let state = params.state.unwrap_or_default();
    if state != verifier.state() {
        return Err(DriveError::StateMismatch {
            expected: verifier.state().to_string(),
            actual: state,
        });
    }

    params
        .code
        .ok_or_else(|| DriveError::AuthenticationError("callback did not include a code".into()))
}

async fn prompt_for_response() -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"Enter the redirected URL or code: ").await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line)
}

/// Produce an authenticator for the current user.
///
/// The cached credential is reused when it is still valid or can be
/// refreshed. Otherwise the consent flow runs and its result is cached.
pub async fn authorize_user<P: AsRef<Path>>(
    client_secret_path: P,
    store: CredentialStore,
    options: FlowOptions,
) -> Result<Authenticator> {
    store.ensure_dir()?;

    if let Some(credential) = store.load()? {
        let auth = Authenticator::from_stored(credential, Some(store.clone()));
        match auth.get_access_token().await {
            Ok(_) => {
                debug!(path = %store.path().display(), "Using cached credential");
                return Ok(auth);
            }
            Err(e) => warn!(error = %e, "Cached credential is no longer valid"),
        }
    }

    let secrets = load_client_secrets(client_secret_path)?;
    let credential = InstalledFlow::new(secrets, options).run().await?;

    store.save(&credential)?;
    println!("Storing credentials to {}", store.path().display());

    Ok(Authenticator::from_stored(credential, Some(store)))
}
