use std::sync::Arc;

use serde::Serialize;

use crate::api::PageQuery;
use crate::cache::CacheWriter;
use crate::error::SyncError;
use crate::fetch::PaginatedFetcher;
use crate::provider::{AccountingApi, OAuthProvider};
use crate::session::SessionHandle;
use crate::token::TokenManager;
use crate::types::Resource;

/// Record counts written by [`Synchronizer::sync_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub accounts: usize,
    pub vendors: usize,
}

/// Fetches a collection and, only if every page arrived, replaces its cache artifact.
pub struct Synchronizer<P, A> {
    tokens: Arc<TokenManager<P>>,
    fetcher: PaginatedFetcher<A>,
    cache: CacheWriter,
    page_size: u32,
}

impl<P: OAuthProvider, A: AccountingApi> Synchronizer<P, A> {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenManager<P>>,
        fetcher: PaginatedFetcher<A>,
        cache: CacheWriter,
        page_size: u32,
    ) -> Self {
        Self {
            tokens,
            fetcher,
            cache,
            page_size,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager<P> {
        &self.tokens
    }

    #[must_use]
    pub fn cache(&self) -> &CacheWriter {
        &self.cache
    }

    /// Syncs one resource with its default filter and order; returns the record count.
    ///
    /// # Errors
    ///
    /// [`SyncError::Fetch`] if any page fails (the previous artifact is left
    /// untouched), [`SyncError::Cache`] if the artifact cannot be written.
    pub async fn sync(&self, session: &SessionHandle, resource: Resource) -> Result<usize, SyncError> {
        let query = PageQuery::first(resource, self.page_size);
        let records = self
            .fetcher
            .fetch_all(&self.tokens, session, &query)
            .await
            .map_err(|source| SyncError::Fetch { resource, source })?;

        let count = records.len();
        self.cache
            .save(resource.cache_name(), records)
            .await
            .map_err(|source| SyncError::Cache { resource, source })?;

        tracing::info!(%resource, records = count, "Collection synced");
        Ok(count)
    }

    /// Syncs accounts and vendors concurrently.
    ///
    /// Each resource succeeds or fails on its own; when both fail the accounts
    /// error is reported.
    ///
    /// # Errors
    ///
    /// The first [`SyncError`], accounts before vendors.
    pub async fn sync_all(&self, session: &SessionHandle) -> Result<SyncReport, SyncError> {
        let (accounts, vendors) = tokio::join!(
            self.sync(session, Resource::Accounts),
            self.sync(session, Resource::Vendors),
        );
        Ok(SyncReport {
            accounts: accounts?,
            vendors: vendors?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::api::Page;
    use crate::error::{FetchError, ProviderError};
    use crate::oauth::{Connection, TokenResponse};
    use crate::session::TokenSet;
    use crate::types::{AccessToken, TenantId};

    struct NoRefresh;

    impl OAuthProvider for NoRefresh {
        fn authorization_url(&self, _state: &str, _scopes: &[String]) -> String {
            String::new()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenResponse, ProviderError> {
            unreachable!()
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, ProviderError> {
            unreachable!()
        }

        async fn connections(
            &self,
            _access_token: &AccessToken,
        ) -> Result<Vec<Connection>, ProviderError> {
            unreachable!()
        }
    }

    /// Accounts succeed on a single page; vendors fail on page 2 when `fail_vendors`.
    struct TwoResourceApi {
        fail_vendors: bool,
        filters: Mutex<Vec<(Resource, Option<String>, Option<String>)>>,
    }

    impl AccountingApi for TwoResourceApi {
        async fn fetch_page(
            &self,
            _access_token: &AccessToken,
            _tenant_id: &TenantId,
            query: &PageQuery,
        ) -> Result<Page, ProviderError> {
            self.filters.lock().unwrap().push((
                query.resource,
                query.filter.clone(),
                query.order.clone(),
            ));
            match (query.resource, query.page) {
                (Resource::Accounts, _) => Ok(Page::new(vec![json!({"Name": "Sales"})])),
                (Resource::Vendors, 1) => {
                    Ok(Page::new(vec![json!({"Name": "Acme"})]).with_pagination(1, 2))
                }
                (Resource::Vendors, _) if self.fail_vendors => Err(ProviderError::Timeout("page request")),
                (Resource::Vendors, _) => {
                    Ok(Page::new(vec![json!({"Name": "Zenith"})]).with_pagination(2, 2))
                }
            }
        }
    }

    async fn setup(
        fail_vendors: bool,
        dir: &std::path::Path,
    ) -> (Synchronizer<NoRefresh, TwoResourceApi>, Arc<TwoResourceApi>, SessionHandle) {
        let api = Arc::new(TwoResourceApi {
            fail_vendors,
            filters: Mutex::new(Vec::new()),
        });
        let tokens = Arc::new(TokenManager::new(Arc::new(NoRefresh), Duration::from_secs(5)));
        let sync = Synchronizer::new(
            tokens,
            PaginatedFetcher::new(api.clone(), Duration::from_secs(5)),
            CacheWriter::new(dir),
            100,
        );

        let session = SessionHandle::new();
        session.lock().await.authorize(
            TokenSet {
                access_token: "access".into(),
                refresh_token: None,
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
            },
            "abc-123".into(),
        );
        (sync, api, session)
    }

    #[tokio::test]
    async fn sync_all_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (sync, api, session) = setup(false, dir.path()).await;

        let report = sync.sync_all(&session).await.unwrap();

        assert_eq!(report, SyncReport { accounts: 1, vendors: 2 });
        let vendors: Vec<serde_json::Value> =
            serde_json::from_slice(&sync.cache().read_collection("vendors").unwrap().unwrap())
                .unwrap();
        assert_eq!(vendors, vec![json!({"Name": "Acme"}), json!({"Name": "Zenith"})]);
        assert!(sync.cache().read_collection("accounts").unwrap().is_some());

        let filters = api.filters.lock().unwrap();
        assert!(filters.contains(&(
            Resource::Accounts,
            Some("Status==\"ACTIVE\"".into()),
            Some("Name ASC".into())
        )));
        assert!(filters.contains(&(
            Resource::Vendors,
            Some("IsSupplier==true".into()),
            Some("Name ASC".into())
        )));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (sync, _api, session) = setup(true, dir.path()).await;
        sync.cache()
            .write_collection("vendors", &[json!({"Name": "Previous"})])
            .unwrap();

        let err = sync.sync(&session, Resource::Vendors).await.unwrap_err();

        assert!(matches!(
            err,
            SyncError::Fetch {
                resource: Resource::Vendors,
                source: FetchError::Transport(ProviderError::Timeout(_))
            }
        ));
        let vendors: Vec<serde_json::Value> =
            serde_json::from_slice(&sync.cache().read_collection("vendors").unwrap().unwrap())
                .unwrap();
        assert_eq!(vendors, vec![json!({"Name": "Previous"})]);
    }

    #[tokio::test]
    async fn one_failing_resource_does_not_block_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let (sync, _api, session) = setup(true, dir.path()).await;

        let err = sync.sync_all(&session).await.unwrap_err();

        assert!(matches!(err, SyncError::Fetch { resource: Resource::Vendors, .. }));
        assert!(sync.cache().read_collection("accounts").unwrap().is_some());
        assert!(sync.cache().read_collection("vendors").unwrap().is_none());
    }
}
