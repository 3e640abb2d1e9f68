use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::ProviderError;
use crate::provider::OAuthProvider;
use crate::types::{AccessToken, TenantId};

/// Scopes requested by default: identity, offline access and the accounting
/// scopes the accounts/contacts sync needs.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "offline_access",
    "accounting.settings",
    "accounting.transactions",
    "accounting.contacts",
    "accounting.journals.read",
    "accounting.reports.read",
    "accounting.attachments",
];

/// Xero `OAuth2` client configuration.
///
/// Required fields are constructor parameters; endpoints default to Xero's
/// production identity service.
///
/// ```rust,ignore
/// use xero_sync::OAuthConfig;
///
/// let config = OAuthConfig::new("client-id", "secret", "https://my-app.com/xero/redirect".parse()?)
///     .with_token_url("https://identity.example.com/connect/token".parse()?);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) connections_url: Url,
    pub(crate) scopes: Vec<String>,
}

impl OAuthConfig {
    pub const DEFAULT_AUTH_URL: &'static str = "https://login.xero.com/identity/connect/authorize";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://identity.xero.com/connect/token";
    pub const DEFAULT_CONNECTIONS_URL: &'static str = "https://api.xero.com/connections";

    /// Create a new `OAuth2` configuration.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            auth_url: default_url(Self::DEFAULT_AUTH_URL),
            token_url: default_url(Self::DEFAULT_TOKEN_URL),
            connections_url: default_url(Self::DEFAULT_CONNECTIONS_URL),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the connections-listing endpoint.
    #[must_use]
    pub fn with_connections_url(mut self, url: Url) -> Self {
        self.connections_url = url;
        self
    }

    /// Override the requested scopes (default: [`DEFAULT_SCOPES`]).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn connections_url(&self) -> &Url {
        &self.connections_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("connections_url", &self.connections_url.as_str())
            .field("scopes", &self.scopes)
            .finish()
    }
}

fn default_url(s: &str) -> Url {
    s.parse().expect("valid default URL")
}

/// Token response from the identity service.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// Lifetime of `access_token` in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".into(),
            expires_in: Some(expires_in),
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

/// One tenant the user granted access to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Connection {
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub tenant_type: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

impl Connection {
    #[must_use]
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            id: None,
            tenant_id: tenant_id.into(),
            tenant_type: None,
            tenant_name: None,
        }
    }

    #[must_use]
    pub fn with_tenant_name(mut self, name: impl Into<String>) -> Self {
        self.tenant_name = Some(name.into());
        self
    }
}

/// `OAuth2` client for Xero's identity service.
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or timeouts).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    async fn token_grant(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(params)
            .send()
            .await?;

        let response = ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }
}

impl OAuthProvider for AuthClient {
    fn authorization_url(&self, state: &str, scopes: &[String]) -> String {
        let scope = scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", state);

        url.into()
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_grant(&params, "token exchange").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_grant(&params, "token refresh").await
    }

    async fn connections(
        &self,
        access_token: &AccessToken,
    ) -> Result<Vec<Connection>, ProviderError> {
        let response = self
            .http
            .get(self.config.connections_url.clone())
            .bearer_auth(access_token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = ensure_success(response, "connections request").await?;
        response.json::<Vec<Connection>>().await.map_err(Into::into)
    }
}

/// Checks HTTP response status; returns the response on success or an error with details.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        operation,
        status,
        detail: body,
    })
}
