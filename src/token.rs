use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use crate::error::{AuthError, ProviderError};
use crate::oauth::TokenResponse;
use crate::provider::{Clock, OAuthProvider, SystemClock};
use crate::session::{Session, SessionHandle, TokenSet};
use crate::types::{AccessToken, TenantId};

/// Access-token lifetime assumed when the provider omits `expires_in` (Xero issues 30 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::minutes(30);

/// Hands out usable access tokens, refreshing them when they expire.
///
/// Every read and refresh happens under the session lock, so concurrent callers
/// racing on an expired token cause a single refresh call.
pub struct TokenManager<P> {
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    timeout: StdDuration,
}

impl<P: OAuthProvider> TokenManager<P> {
    /// `timeout` bounds each call to the provider.
    #[must_use]
    pub fn new(provider: Arc<P>, timeout: StdDuration) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            timeout,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The stored access token if unexpired, otherwise a freshly refreshed one.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoSession`] when nothing is stored, [`AuthError::RefreshFailed`]
    /// when renewal fails.
    pub async fn valid_access_token(&self, session: &SessionHandle) -> Result<AccessToken, AuthError> {
        let mut guard = session.lock().await;
        self.valid_token_locked(session, &mut guard).await
    }

    /// A usable access token together with the session's tenant, read under one lock.
    ///
    /// # Errors
    ///
    /// As [`valid_access_token`](Self::valid_access_token), plus
    /// [`AuthError::NoTenant`] when no tenant has been resolved.
    pub async fn credentials(
        &self,
        session: &SessionHandle,
    ) -> Result<(AccessToken, TenantId), AuthError> {
        let mut guard = session.lock().await;
        let token = self.valid_token_locked(session, &mut guard).await?;
        let tenant_id = guard.tenant_id().cloned().ok_or(AuthError::NoTenant)?;
        Ok((token, tenant_id))
    }

    /// Exchanges the refresh token for a new token set, regardless of expiry.
    ///
    /// Callers that were queued behind a refresh that completed while they
    /// waited get that result instead of issuing another grant.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoSession`] when nothing is stored, [`AuthError::RefreshFailed`]
    /// when the grant fails.
    pub async fn refresh(&self, session: &SessionHandle) -> Result<TokenSet, AuthError> {
        let observed = session.refresh_generation();
        let mut guard = session.lock().await;
        if session.refresh_generation() != observed {
            return guard.tokens().current().cloned().ok_or(AuthError::NoSession);
        }
        self.refresh_locked(session, &mut guard).await
    }

    async fn valid_token_locked(
        &self,
        handle: &SessionHandle,
        session: &mut Session,
    ) -> Result<AccessToken, AuthError> {
        if session.tokens().current().is_none() {
            return Err(AuthError::NoSession);
        }
        if let Some(token) = session.tokens().usable_at(self.clock.now()) {
            return Ok(token.clone());
        }
        tracing::debug!("Access token expired; refreshing");
        self.refresh_locked(handle, session)
            .await
            .map(|tokens| tokens.access_token)
    }

    async fn refresh_locked(
        &self,
        handle: &SessionHandle,
        session: &mut Session,
    ) -> Result<TokenSet, AuthError> {
        let current = session.tokens().current().ok_or(AuthError::NoSession)?;
        let Some(refresh_token) = current.refresh_token.clone() else {
            tracing::warn!("No refresh token stored; session must re-authorize");
            session.invalidate();
            return Err(AuthError::RefreshFailed(ProviderError::Invalid(
                "no refresh token was issued".into(),
            )));
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.refresh_token(refresh_token.as_str()),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout("token refresh")));

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_rejection() => {
                tracing::warn!(error = %e, "Refresh token rejected; session must re-authorize");
                session.invalidate();
                return Err(AuthError::RefreshFailed(e));
            }
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed");
                return Err(AuthError::RefreshFailed(e));
            }
        };

        let mut tokens = token_set(response, self.clock.now());
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        session.tokens_mut().replace(tokens.clone());
        handle.bump_refresh_generation();

        tracing::info!(expires_at = %tokens.expires_at, "Access token refreshed");
        Ok(tokens)
    }
}

/// Builds a [`TokenSet`] whose expiry is `now` plus the provider-reported lifetime.
pub(crate) fn token_set(response: TokenResponse, now: OffsetDateTime) -> TokenSet {
    let ttl = response
        .expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .map_or(DEFAULT_TOKEN_TTL, Duration::seconds);

    TokenSet {
        access_token: response.access_token.into(),
        refresh_token: response.refresh_token.map(Into::into),
        expires_at: now + ttl,
    }
}
