use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use super::state::AppState;
use crate::api::AccountingClient;
use crate::error::ConfigError;
use crate::oauth::{AuthClient, DEFAULT_SCOPES, OAuthConfig};

/// Runtime settings shared by the route handlers.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub(super) data_dir: PathBuf,
    pub(super) frontend_redirect: String,
    pub(super) scopes: Vec<String>,
    pub(super) http_timeout: Duration,
    pub(super) page_size: u32,
}

impl ServerSettings {
    pub const DEFAULT_FRONTEND_REDIRECT: &'static str = "http://localhost:3001?authStatus=success";
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_PAGE_SIZE: u32 = 100;

    /// Settings caching into `data_dir`; everything else uses defaults.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            frontend_redirect: Self::DEFAULT_FRONTEND_REDIRECT.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            http_timeout: Self::DEFAULT_HTTP_TIMEOUT,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Where the browser is sent after a successful callback and initial sync.
    #[must_use]
    pub fn with_frontend_redirect(mut self, url: impl Into<String>) -> Self {
        self.frontend_redirect = url.into();
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Upper bound for every outbound call (token endpoint, connections, pages).
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Service configuration.
///
/// Required credentials are constructor parameters of [`OAuthConfig`]; use
/// [`from_env()`](AppConfig::from_env) for the conventional setup or
/// [`new()`](AppConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct AppConfig {
    oauth: OAuthConfig,
    api_url: Url,
    host: String,
    port: u16,
    log_dir: Option<PathBuf>,
    settings: ServerSettings,
}

impl AppConfig {
    /// Config with default API URL, bind address and settings.
    #[must_use]
    pub fn new(oauth: OAuthConfig) -> Self {
        let settings = ServerSettings::default().with_scopes(oauth.scopes().to_vec());
        Self {
            api_url: AccountingClient::DEFAULT_BASE_URL
                .parse()
                .expect("valid default URL"),
            host: "0.0.0.0".into(),
            port: 8080,
            log_dir: None,
            oauth,
            settings,
        }
    }

    /// Create config from environment variables (and `.env`, if present).
    ///
    /// # Required env vars
    /// - `XERO_CLIENT_ID`, `XERO_CLIENT_SECRET`
    /// - `XERO_REDIRECT_URI`: OAuth2 callback URI (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `XERO_AUTH_URL`, `XERO_TOKEN_URL`, `XERO_CONNECTIONS_URL`, `XERO_API_URL`
    /// - `XERO_SCOPES`: comma- or space-separated OAuth2 scopes
    /// - `HOST`, `PORT`, `DATA_DIR`, `FRONTEND_REDIRECT_URL`
    /// - `HTTP_TIMEOUT_SECS`, `PAGE_SIZE`, `LOG_DIR`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required var is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError(format!("{key} is required")))
        };
        let client_id = required("XERO_CLIENT_ID")?;
        let client_secret = required("XERO_CLIENT_SECRET")?;
        let redirect_uri: Url = parse("XERO_REDIRECT_URI", &required("XERO_REDIRECT_URI")?)?;

        let mut oauth = OAuthConfig::new(client_id, client_secret, redirect_uri);
        if let Some(url) = var("XERO_AUTH_URL") {
            oauth = oauth.with_auth_url(parse("XERO_AUTH_URL", &url)?);
        }
        if let Some(url) = var("XERO_TOKEN_URL") {
            oauth = oauth.with_token_url(parse("XERO_TOKEN_URL", &url)?);
        }
        if let Some(url) = var("XERO_CONNECTIONS_URL") {
            oauth = oauth.with_connections_url(parse("XERO_CONNECTIONS_URL", &url)?);
        }
        if let Some(scopes) = var("XERO_SCOPES") {
            let scopes: Vec<String> = scopes
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if scopes.is_empty() {
                return Err(ConfigError("XERO_SCOPES is empty".into()));
            }
            oauth = oauth.with_scopes(scopes);
        }

        let mut config = Self::new(oauth);
        if let Some(url) = var("XERO_API_URL") {
            config = config.with_api_url(parse("XERO_API_URL", &url)?);
        }
        if let Some(host) = var("HOST") {
            config = config.with_host(host);
        }
        if let Some(port) = var("PORT") {
            config = config.with_port(parse("PORT", &port)?);
        }
        if let Some(dir) = var("LOG_DIR").filter(|d| !d.is_empty()) {
            config = config.with_log_dir(dir);
        }

        let mut settings = config.settings.clone();
        if let Some(dir) = var("DATA_DIR") {
            settings.data_dir = dir.into();
        }
        if let Some(url) = var("FRONTEND_REDIRECT_URL") {
            settings = settings.with_frontend_redirect(url);
        }
        if let Some(secs) = var("HTTP_TIMEOUT_SECS") {
            settings = settings.with_http_timeout(Duration::from_secs(parse("HTTP_TIMEOUT_SECS", &secs)?));
        }
        if let Some(size) = var("PAGE_SIZE") {
            let size: u32 = parse("PAGE_SIZE", &size)?;
            if size == 0 {
                return Err(ConfigError("PAGE_SIZE must be positive".into()));
            }
            settings = settings.with_page_size(size);
        }

        Ok(config.with_settings(settings))
    }

    #[must_use]
    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = url;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Also write logs to `<dir>/app.log`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthConfig {
        &self.oauth
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `HOST` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = parse("HOST", &self.host)?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Builds the HTTP clients and the shared route state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the HTTP client cannot be constructed.
    pub fn into_state(self) -> Result<AppState<AuthClient, AccountingClient>, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(self.settings.http_timeout)
            .build()
            .map_err(|e| ConfigError(format!("HTTP client: {e}")))?;

        let provider = AuthClient::new(self.oauth).with_http_client(http.clone());
        let api = AccountingClient::new(self.api_url).with_http_client(http);

        Ok(AppState::new(Arc::new(provider), Arc::new(api), self.settings))
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError(format!("{key}: {e}")))
}
