use std::sync::Arc;
use std::time::Duration;

use crate::api::PageQuery;
use crate::error::{FetchError, ProviderError};
use crate::provider::{AccountingApi, OAuthProvider};
use crate::session::SessionHandle;
use crate::token::TokenManager;
use crate::types::ResourceRecord;

/// Walks a paged listing from page 1 until the API reports the last page.
pub struct PaginatedFetcher<A> {
    api: Arc<A>,
    timeout: Duration,
}

impl<A> Clone for PaginatedFetcher<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            timeout: self.timeout,
        }
    }
}

impl<A: AccountingApi> PaginatedFetcher<A> {
    /// `timeout` bounds each page request.
    #[must_use]
    pub fn new(api: Arc<A>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    /// Fetches every page of `query.resource`, starting at page 1 whatever
    /// `query.page` says, and returns the records in arrival order.
    ///
    /// Each page request obtains its own token, so an expiry mid-sync triggers a
    /// refresh rather than a failure. The session lock is released while a page
    /// is in flight.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Auth`] when no usable token can be obtained.
    /// - [`FetchError::Unauthorized`] when the API rejects the token.
    /// - [`FetchError::Transport`] for any other failed page.
    ///
    /// Nothing collected so far is returned on error.
    pub async fn fetch_all<P: OAuthProvider>(
        &self,
        tokens: &TokenManager<P>,
        session: &SessionHandle,
        query: &PageQuery,
    ) -> Result<Vec<ResourceRecord>, FetchError> {
        let resource = query.resource;
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let (access_token, tenant_id) = tokens.credentials(session).await?;
            let request = query.with_page(page);

            let response = tokio::time::timeout(
                self.timeout,
                self.api.fetch_page(&access_token, &tenant_id, &request),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout("page request")))
            .map_err(|e| {
                tracing::error!(%resource, page, error = %e, "Page request failed");
                classify(e)
            })?;

            let received = response.records.len();
            records.extend(response.records);

            let (current, count) = response
                .pagination
                .map_or((page, page), |p| (p.page, p.page_count));
            tracing::debug!(%resource, page, received, page_count = count, "Fetched page");

            if current < count && page < count {
                page += 1;
            } else {
                break;
            }
        }

        tracing::info!(%resource, pages = page, records = records.len(), "Fetched collection");
        Ok(records)
    }
}

fn classify(e: ProviderError) -> FetchError {
    match e.status() {
        Some(401 | 403) => FetchError::Unauthorized,
        _ => FetchError::Transport(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::api::Page;
    use crate::error::AuthError;
    use crate::oauth::{Connection, TokenResponse};
    use crate::session::TokenSet;
    use crate::types::{AccessToken, Resource, TenantId};

    struct NoRefresh;

    impl OAuthProvider for NoRefresh {
        fn authorization_url(&self, _state: &str, _scopes: &[String]) -> String {
            String::new()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, ProviderError> {
            unreachable!()
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, ProviderError> {
            unreachable!("token is valid for the whole test")
        }

        async fn connections(
            &self,
            _access_token: &AccessToken,
        ) -> Result<Vec<Connection>, ProviderError> {
            unreachable!()
        }
    }

    /// Serves scripted responses in order and records the pages requested.
    struct ScriptedApi {
        responses: Mutex<Vec<Result<Page, ProviderError>>>,
        requested: Mutex<Vec<u32>>,
    }

    impl ScriptedApi {
        fn new(mut responses: Vec<Result<Page, ProviderError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requested: Mutex::new(Vec::new()),
            })
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl AccountingApi for ScriptedApi {
        async fn fetch_page(
            &self,
            access_token: &AccessToken,
            tenant_id: &TenantId,
            query: &PageQuery,
        ) -> Result<Page, ProviderError> {
            assert_eq!(access_token.as_str(), "access");
            assert_eq!(tenant_id.as_str(), "abc-123");
            self.requested.lock().unwrap().push(query.page);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("no more scripted responses")
        }
    }

    fn records(range: std::ops::Range<u32>) -> Vec<ResourceRecord> {
        range.map(|i| json!({"Name": format!("Vendor {i:03}")})).collect()
    }

    async fn session() -> SessionHandle {
        let handle = SessionHandle::new();
        handle.lock().await.authorize(
            TokenSet {
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
            },
            "abc-123".into(),
        );
        handle
    }

    async fn run(api: Arc<ScriptedApi>) -> Result<Vec<ResourceRecord>, FetchError> {
        let tokens = TokenManager::new(Arc::new(NoRefresh), Duration::from_secs(5));
        let fetcher = PaginatedFetcher::new(api, Duration::from_secs(5));
        fetcher
            .fetch_all(&tokens, &session().await, &PageQuery::first(Resource::Vendors, 100))
            .await
    }

    #[tokio::test]
    async fn three_pages_are_requested_in_order_and_concatenated() {
        let api = ScriptedApi::new(vec![
            Ok(Page::new(records(0..100)).with_pagination(1, 3)),
            Ok(Page::new(records(100..200)).with_pagination(2, 3)),
            Ok(Page::new(records(200..250)).with_pagination(3, 3)),
        ]);

        let all = run(api.clone()).await.unwrap();

        assert_eq!(api.requested(), vec![1, 2, 3]);
        assert_eq!(all, records(0..250));
    }

    #[tokio::test]
    async fn missing_pagination_block_is_a_single_page() {
        let api = ScriptedApi::new(vec![Ok(Page::new(records(0..7)))]);

        let all = run(api.clone()).await.unwrap();

        assert_eq!(api.requested(), vec![1]);
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn zero_page_count_is_a_single_page() {
        let api = ScriptedApi::new(vec![Ok(Page::new(vec![]).with_pagination(1, 0))]);

        let all = run(api.clone()).await.unwrap();

        assert_eq!(api.requested(), vec![1]);
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn stale_current_page_still_terminates() {
        let api = ScriptedApi::new(vec![
            Ok(Page::new(records(0..1)).with_pagination(1, 2)),
            Ok(Page::new(records(1..2)).with_pagination(1, 2)),
        ]);

        let all = run(api.clone()).await.unwrap();

        assert_eq!(api.requested(), vec![1, 2]);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn rejected_token_mid_sync_is_unauthorized() {
        let api = ScriptedApi::new(vec![
            Ok(Page::new(records(0..100)).with_pagination(1, 3)),
            Err(ProviderError::Status {
                operation: "page request",
                status: 401,
                detail: "AuthenticationUnsuccessful".into(),
            }),
        ]);

        let err = run(api.clone()).await.unwrap_err();

        assert!(matches!(err, FetchError::Unauthorized));
        assert_eq!(api.requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn failed_page_is_transport_and_not_retried() {
        let api = ScriptedApi::new(vec![
            Ok(Page::new(records(0..100)).with_pagination(1, 2)),
            Err(ProviderError::Status {
                operation: "page request",
                status: 503,
                detail: String::new(),
            }),
        ]);

        let err = run(api.clone()).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(ProviderError::Status { status: 503, .. })));
        assert_eq!(api.requested(), vec![1, 2]);
    }

    struct ManualClock(Mutex<OffsetDateTime>);

    impl crate::provider::Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct RefreshingProvider {
        refreshes: std::sync::atomic::AtomicUsize,
    }

    impl OAuthProvider for RefreshingProvider {
        fn authorization_url(&self, _state: &str, _scopes: &[String]) -> String {
            String::new()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, ProviderError> {
            unreachable!()
        }

        async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
            assert_eq!(refresh_token, "refresh");
            self.refreshes
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(TokenResponse::new("fresh", 1800))
        }

        async fn connections(
            &self,
            _access_token: &AccessToken,
        ) -> Result<Vec<Connection>, ProviderError> {
            unreachable!()
        }
    }

    /// Two-page listing whose first page takes longer than the token lifetime.
    struct SlowFirstPageApi {
        clock: Arc<ManualClock>,
        tokens_used: Mutex<Vec<String>>,
    }

    impl AccountingApi for SlowFirstPageApi {
        async fn fetch_page(
            &self,
            access_token: &AccessToken,
            _tenant_id: &TenantId,
            query: &PageQuery,
        ) -> Result<Page, ProviderError> {
            self.tokens_used
                .lock()
                .unwrap()
                .push(access_token.as_str().to_owned());
            if query.page == 1 {
                *self.clock.0.lock().unwrap() += time::Duration::hours(1);
            }
            Ok(Page::new(vec![json!(query.page)]).with_pagination(query.page, 2))
        }
    }

    #[tokio::test]
    async fn token_expiring_mid_sync_is_refreshed_once() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let clock = Arc::new(ManualClock(Mutex::new(start)));
        let provider = Arc::new(RefreshingProvider::default());
        let tokens = TokenManager::new(provider.clone(), Duration::from_secs(5))
            .with_clock(clock.clone());
        let api = Arc::new(SlowFirstPageApi {
            clock,
            tokens_used: Mutex::new(Vec::new()),
        });
        let fetcher = PaginatedFetcher::new(api.clone(), Duration::from_secs(5));

        let session = SessionHandle::new();
        session.lock().await.authorize(
            TokenSet {
                access_token: "access".into(),
                refresh_token: Some("refresh".into()),
                expires_at: start + time::Duration::minutes(30),
            },
            "abc-123".into(),
        );

        let all = fetcher
            .fetch_all(&tokens, &session, &PageQuery::first(Resource::Accounts, 100))
            .await
            .unwrap();

        assert_eq!(all, vec![json!(1), json!(2)]);
        assert_eq!(*api.tokens_used.lock().unwrap(), vec!["access", "fresh"]);
        assert_eq!(
            provider.refreshes.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        let snapshot = session.snapshot().await;
        let current = snapshot.tokens().current().unwrap();
        assert_eq!(current.access_token.as_str(), "fresh");
        assert_eq!(current.refresh_token.as_ref().unwrap().as_str(), "refresh");
    }

    #[tokio::test]
    async fn unauthorized_session_fails_before_any_request() {
        let api = ScriptedApi::new(vec![]);
        let tokens = TokenManager::new(Arc::new(NoRefresh), Duration::from_secs(5));
        let fetcher = PaginatedFetcher::new(api.clone(), Duration::from_secs(5));

        let err = fetcher
            .fetch_all(&tokens, &SessionHandle::new(), &PageQuery::first(Resource::Accounts, 100))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Auth(AuthError::NoSession)));
        assert!(api.requested().is_empty());
    }
}
