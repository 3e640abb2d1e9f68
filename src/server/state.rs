use std::sync::Arc;

use super::config::ServerSettings;
use crate::cache::CacheWriter;
use crate::fetch::PaginatedFetcher;
use crate::flow::AuthorizationFlow;
use crate::provider::{AccountingApi, OAuthProvider};
use crate::session::SessionHandle;
use crate::sync::Synchronizer;
use crate::token::TokenManager;

/// Shared state for the route handlers: one logical session per process.
pub struct AppState<P, A> {
    pub(super) flow: Arc<AuthorizationFlow<P>>,
    pub(super) sync: Arc<Synchronizer<P, A>>,
    pub(super) session: SessionHandle,
    pub(super) settings: ServerSettings,
}

// Manual Clone: avoid derive adding `P: Clone, A: Clone` bounds.
impl<P, A> Clone for AppState<P, A> {
    fn clone(&self) -> Self {
        Self {
            flow: self.flow.clone(),
            sync: self.sync.clone(),
            session: self.session.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<P: OAuthProvider, A: AccountingApi> AppState<P, A> {
    /// Wires the flow, token manager, fetcher and cache around a fresh session.
    #[must_use]
    pub fn new(provider: Arc<P>, api: Arc<A>, settings: ServerSettings) -> Self {
        let timeout = settings.http_timeout;
        let flow = AuthorizationFlow::new(provider.clone(), timeout);
        let tokens = Arc::new(TokenManager::new(provider, timeout));
        let sync = Synchronizer::new(
            tokens,
            PaginatedFetcher::new(api, timeout),
            CacheWriter::new(settings.data_dir.clone()),
            settings.page_size,
        );

        Self {
            flow: Arc::new(flow),
            sync: Arc::new(sync),
            session: SessionHandle::new(),
            settings,
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}
