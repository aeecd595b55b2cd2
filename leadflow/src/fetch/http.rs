//! `reqwest`-backed transport and OAuth token refresh for the CRM API.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::paginator::{PageResponse, PageTransport, TokenRefresher};
use crate::errors::{FatalFetchError, FetchError, TransientFetchError, TransientKind};

/// Access and refresh token pair.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token.
    pub access_token: String,
    /// Token used to obtain the next pair.
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Token pair shared by the transport and the refresher.
#[derive(Debug, Clone, Default)]
pub struct TokenStore(Arc<RwLock<TokenPair>>);

impl TokenStore {
    /// Creates a store holding `pair`.
    #[must_use]
    pub fn new(pair: TokenPair) -> Self {
        Self(Arc::new(RwLock::new(pair)))
    }

    /// Current access token.
    #[must_use]
    pub fn access_token(&self) -> String {
        self.0.read().access_token.clone()
    }

    /// Current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> String {
        self.0.read().refresh_token.clone()
    }

    /// Installs a new pair.
    pub fn replace(&self, pair: TokenPair) {
        *self.0.write() = pair;
    }
}

/// Connection settings for one CRM account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Account subdomain.
    pub subdomain: String,
    /// CRM domain.
    pub domain: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpConfig {
    /// Settings for `subdomain` on the default domain.
    #[must_use]
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            domain: "amocrm.ru".to_string(),
            timeout_secs: 30,
        }
    }

    /// Root of the REST API.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("https://{}.{}/api/v4", self.subdomain, self.domain)
    }

    /// OAuth token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("https://{}.{}/oauth2/access_token", self.subdomain, self.domain)
    }
}

fn build_client(config: &HttpConfig) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| FatalFetchError::new("", format!("Failed to create HTTP client: {e}")).into())
}

fn send_error(path: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        TransientFetchError::new(TransientKind::Connection, path, error.to_string()).into()
    } else {
        FatalFetchError::new(path, error.to_string()).into()
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Maps an HTTP status and body to a page or a classified error.
///
/// # Errors
///
/// 429, 413, 414 and 5xx are transient, as is an unparsable body. Any
/// other 4xx except 401 is fatal; 401 is passed through for token refresh.
pub fn classify_response(path: &str, status: u16, text: &str) -> Result<PageResponse, FetchError> {
    let transient = |kind: TransientKind| -> FetchError {
        TransientFetchError::new(kind, path, excerpt(text))
            .with_status(status)
            .into()
    };
    match status {
        204 => return Ok(PageResponse::no_content()),
        429 => return Err(transient(TransientKind::Throttled)),
        413 | 414 => return Err(transient(TransientKind::Oversized)),
        500..=599 => return Err(transient(TransientKind::Upstream)),
        401 => {}
        400..=499 => {
            return Err(FatalFetchError::new(path, excerpt(text))
                .with_status(status)
                .into())
        }
        _ => {}
    }
    if text.trim().is_empty() {
        return Ok(PageResponse { status, body: None });
    }
    match serde_json::from_str::<Value>(text) {
        Ok(body) => Ok(PageResponse {
            status,
            body: Some(body),
        }),
        Err(e) => Err(TransientFetchError::new(TransientKind::MalformedBody, path, e.to_string())
            .with_status(status)
            .into()),
    }
}

/// [`PageTransport`] over HTTPS with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    tokens: TokenStore,
}

impl HttpTransport {
    /// Creates a transport for the account in `config`.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(config: &HttpConfig, tokens: TokenStore) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.api_base(),
            tokens,
        })
    }

    /// Overrides the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Shared token store.
    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .bearer_auth(self.tokens.access_token())
            .send()
            .await
            .map_err(|e| send_error(path, &e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| send_error(path, &e))?;
        debug!(path, status, bytes = text.len(), "CRM response");
        classify_response(path, status, &text)
    }
}

/// OAuth application credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    /// Integration id.
    pub client_id: String,
    /// Integration secret.
    pub client_secret: String,
    /// Registered redirect URI.
    pub redirect_uri: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
    redirect_uri: &'a str,
}

/// Exchanges the refresh token for a new pair.
#[derive(Debug, Clone)]
pub struct OAuthRefresher {
    client: Client,
    token_url: String,
    credentials: OAuthCredentials,
    tokens: TokenStore,
}

impl OAuthRefresher {
    /// Creates a refresher writing into `tokens`.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(
        config: &HttpConfig,
        credentials: OAuthCredentials,
        tokens: TokenStore,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(config)?,
            token_url: config.token_url(),
            credentials,
            tokens,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self) -> Result<(), FetchError> {
        let refresh_token = self.tokens.refresh_token();
        let request = RefreshRequest {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            grant_type: "refresh_token",
            refresh_token: &refresh_token,
            redirect_uri: &self.credentials.redirect_uri,
        };
        let path = "oauth2/access_token";
        let response = self
            .client
            .post(&self.token_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(path, &e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| send_error(path, &e))?;
        if status == 401 {
            return Err(FatalFetchError::new(path, "refresh token rejected")
                .with_status(status)
                .into());
        }
        let page = classify_response(path, status, &text)?;
        let pair: TokenPair = page
            .body
            .and_then(|body| serde_json::from_value(body).ok())
            .ok_or_else(|| {
                FetchError::from(
                    TransientFetchError::new(TransientKind::MalformedBody, path, "no token pair")
                        .with_status(status),
                )
            })?;
        self.tokens.replace(pair);
        info!("Access token refreshed");
        Ok(())
    }
}
