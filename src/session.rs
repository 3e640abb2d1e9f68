//! Delegated-access state for the single Xero session.
//!
//! [`Session`] is plain data. [`SessionHandle`] wraps it in an async mutex so
//! every token read/write and every authorization transition is serialized;
//! holders of the guard may await network calls without another task
//! observing a half-updated session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::{AccessToken, RefreshToken, TenantId};

/// Access token, refresh token and absolute access-token expiry.
///
/// Always replaced as a unit so no reader sees a token paired with another
/// token's expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub expires_at: OffsetDateTime,
}

impl TokenSet {
    /// Whether the access token may still be used at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// Holds the current [`TokenSet`], if any. No I/O.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    current: Option<TokenSet>,
}

impl TokenStore {
    #[must_use]
    pub fn current(&self) -> Option<&TokenSet> {
        self.current.as_ref()
    }

    /// The access token if one is stored and unexpired at `now`.
    #[must_use]
    pub fn usable_at(&self, now: OffsetDateTime) -> Option<&AccessToken> {
        self.current
            .as_ref()
            .filter(|set| set.is_valid_at(now))
            .map(|set| &set.access_token)
    }

    pub fn replace(&mut self, tokens: TokenSet) {
        self.current = Some(tokens);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Position in the authorization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    #[default]
    Idle,
    AwaitingCallback,
    Authorized,
    Failed,
}

/// One user's delegated access.
#[derive(Debug, Clone, Default)]
pub struct Session {
    tokens: TokenStore,
    csrf_state: Option<String>,
    tenant_id: Option<TenantId>,
    phase: AuthPhase,
}

impl Session {
    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub(crate) fn tokens_mut(&mut self) -> &mut TokenStore {
        &mut self.tokens
    }

    /// Tenant resolved by the last successful authorization.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Pending anti-CSRF state, set between redirect and callback.
    #[must_use]
    pub fn csrf_state(&self) -> Option<&str> {
        self.csrf_state.as_deref()
    }

    pub(crate) fn await_callback(&mut self, state: String) {
        self.csrf_state = Some(state);
        self.phase = AuthPhase::AwaitingCallback;
    }

    /// Removes the pending state; a state value is only ever checked once.
    pub(crate) fn take_csrf_state(&mut self) -> Option<String> {
        self.csrf_state.take()
    }

    pub(crate) fn authorize(&mut self, tokens: TokenSet, tenant_id: TenantId) {
        self.tokens.replace(tokens);
        self.tenant_id = Some(tenant_id);
        self.phase = AuthPhase::Authorized;
    }

    /// Drops every credential; the session has to re-authorize from scratch.
    pub(crate) fn invalidate(&mut self) {
        self.tokens.clear();
        self.tenant_id = None;
        self.phase = AuthPhase::Failed;
    }
}

/// Shared, lock-protected [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<SessionCell>,
}

#[derive(Debug, Default)]
struct SessionCell {
    session: Mutex<Session>,
    refresh_generation: AtomicU64,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the per-session critical section.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().await
    }

    /// Copy of the current state, for inspection and diagnostics.
    pub async fn snapshot(&self) -> Session {
        self.lock().await.clone()
    }

    /// Number of successful refreshes so far.
    pub(crate) fn refresh_generation(&self) -> u64 {
        self.inner.refresh_generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_refresh_generation(&self) {
        self.inner.refresh_generation.fetch_add(1, Ordering::AcqRel);
    }
}
