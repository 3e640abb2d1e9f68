use std::future::Future;

use time::OffsetDateTime;

use crate::api::{Page, PageQuery};
use crate::error::ProviderError;
use crate::oauth::{Connection, TokenResponse};
use crate::types::{AccessToken, TenantId};

/// The OAuth2 authorization server plus its connections listing.
///
/// [`AuthClient`](crate::AuthClient) is the HTTP implementation. Tests substitute
/// an in-memory provider.
///
/// # Example
///
/// ```rust,ignore
/// impl OAuthProvider for Recorded {
///     fn authorization_url(&self, state: &str, scopes: &[String]) -> String {
///         format!("https://login.example/authorize?state={state}")
///     }
///
///     async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
///         self.tokens.get(code).cloned().ok_or(ProviderError::Invalid("unknown code".into()))
///     }
///     // ...
/// }
/// ```
pub trait OAuthProvider: Send + Sync + 'static {
    /// Consent-screen URL embedding `state` and the requested scopes.
    fn authorization_url(&self, state: &str, scopes: &[String]) -> String;

    /// `authorization_code` grant. A code is only ever accepted once.
    fn exchange_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<TokenResponse, ProviderError>> + Send;

    /// `refresh_token` grant.
    fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, ProviderError>> + Send;

    /// Tenants the access token has been granted, most recently connected first.
    fn connections(
        &self,
        access_token: &AccessToken,
    ) -> impl Future<Output = Result<Vec<Connection>, ProviderError>> + Send;
}

/// Paged listing endpoints of the accounting API.
pub trait AccountingApi: Send + Sync + 'static {
    /// Fetches exactly one page described by `query`.
    fn fetch_page(
        &self,
        access_token: &AccessToken,
        tenant_id: &TenantId,
        query: &PageQuery,
    ) -> impl Future<Output = Result<Page, ProviderError>> + Send;
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
