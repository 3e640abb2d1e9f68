use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::csrf;
use crate::error::{AuthError, ProviderError};
use crate::provider::{Clock, OAuthProvider, SystemClock};
use crate::session::{SessionHandle, TokenSet};
use crate::token::token_set;
use crate::types::TenantId;

/// Authorization URL and the state value stored against the session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Credentials committed to the session by a successful callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionTokens {
    pub tokens: TokenSet,
    pub tenant_id: TenantId,
}

/// Authorization-code flow: `Idle → AwaitingCallback → Authorized | Failed`.
pub struct AuthorizationFlow<P> {
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    timeout: StdDuration,
}

impl<P: OAuthProvider> AuthorizationFlow<P> {
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

    /// Issues a fresh state value, stores it on the session and builds the
    /// consent-screen URL. Any earlier pending state is superseded.
    pub async fn begin_authorization(
        &self,
        session: &SessionHandle,
        scopes: &[String],
    ) -> AuthorizationRequest {
        let state = csrf::generate_state();
        let url = self.provider.authorization_url(&state, scopes);

        session.lock().await.await_callback(state.clone());
        tracing::debug!("Authorization started; awaiting callback");

        AuthorizationRequest { url, state }
    }

    /// Validates the callback state, exchanges `code` and resolves the tenant.
    ///
    /// The stored state is consumed whatever the outcome. Tokens and tenant are
    /// written to the session only when every step succeeds; any failure drops
    /// the credentials of an earlier authorization as well. The session lock
    /// is held throughout, so a concurrent [`begin_authorization`](Self::begin_authorization)
    /// cannot swap the state mid-validation.
    ///
    /// # Errors
    ///
    /// - [`AuthError::StateMismatch`] if `returned_state` is absent, empty or wrong.
    /// - [`AuthError::ExchangeFailed`] if the code is missing or the provider
    ///   rejects it, fails, or times out (including the connections lookup).
    /// - [`AuthError::NoTenant`] if the user connected no tenant.
    pub async fn complete_authorization(
        &self,
        session: &SessionHandle,
        returned_state: Option<&str>,
        code: Option<&str>,
    ) -> Result<SessionTokens, AuthError> {
        let mut guard = session.lock().await;

        let stored_state = guard.take_csrf_state();
        if !csrf::state_matches(returned_state, stored_state.as_deref()) {
            tracing::warn!("OAuth state mismatch");
            guard.invalidate();
            return Err(AuthError::StateMismatch);
        }

        match self.exchange(code).await {
            Ok(authorized) => {
                guard.authorize(authorized.tokens.clone(), authorized.tenant_id.clone());
                tracing::info!(tenant_id = %authorized.tenant_id, "Xero authorization successful");
                Ok(authorized)
            }
            Err(e) => {
                tracing::error!(error = %e, "Xero authorization failed");
                guard.invalidate();
                Err(e)
            }
        }
    }

    async fn exchange(&self, code: Option<&str>) -> Result<SessionTokens, AuthError> {
        let code = code.filter(|c| !c.is_empty()).ok_or_else(|| {
            AuthError::ExchangeFailed(ProviderError::Invalid("missing authorization code".into()))
        })?;

        let response = tokio::time::timeout(self.timeout, self.provider.exchange_code(code))
            .await
            .unwrap_or(Err(ProviderError::Timeout("token exchange")))
            .map_err(AuthError::ExchangeFailed)?;
        let tokens = token_set(response, self.clock.now());

        let connections = tokio::time::timeout(
            self.timeout,
            self.provider.connections(&tokens.access_token),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout("connections request")))
        .map_err(AuthError::ExchangeFailed)?;

        let tenant_id = connections
            .into_iter()
            .next()
            .map(|c| c.tenant_id)
            .ok_or(AuthError::NoTenant)?;

        Ok(SessionTokens { tokens, tenant_id })
    }
}
