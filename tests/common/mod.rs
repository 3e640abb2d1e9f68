#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use xero_sync::server::{AppState, ServerSettings, app_routes};
use xero_sync::{
    AccessToken, AccountingApi, Connection, OAuthProvider, Page, PageQuery, ProviderError,
    Resource, ResourceRecord, TenantId, TokenResponse,
};

pub const TENANT_ID: &str = "abc-123";
pub const FRONTEND: &str = "http://localhost:3001?authStatus=success";
pub const ACCOUNT_COUNT: usize = 250;
pub const VENDOR_COUNT: usize = 3;

/// Identity service that accepts the code `valid` exactly once.
#[derive(Default)]
pub struct FakeProvider {
    redeemed: Mutex<HashSet<String>>,
}

impl OAuthProvider for FakeProvider {
    fn authorization_url(&self, state: &str, scopes: &[String]) -> String {
        format!(
            "https://login.example/authorize?scope={}&state={state}",
            scopes.join("%20")
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        if code != "valid" || !self.redeemed.lock().unwrap().insert(code.to_owned()) {
            return Err(ProviderError::Status {
                operation: "token exchange",
                status: 400,
                detail: r#"{"error":"invalid_grant"}"#.into(),
            });
        }
        Ok(TokenResponse::new("access-1", 1800).with_refresh_token("refresh-1"))
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        Ok(TokenResponse::new("access-2", 1800))
    }

    async fn connections(
        &self,
        _access_token: &AccessToken,
    ) -> Result<Vec<Connection>, ProviderError> {
        Ok(vec![Connection::new(TENANT_ID).with_tenant_name("Demo Company")])
    }
}

/// Accounting API serving `ACCOUNT_COUNT` paged accounts and a single
/// unpaginated page of vendors.
#[derive(Default)]
pub struct FakeApi {
    requested: Mutex<Vec<(Resource, u32)>>,
}

impl FakeApi {
    pub fn requested(&self, resource: Resource) -> Vec<u32> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == resource)
            .map(|(_, page)| *page)
            .collect()
    }
}

impl AccountingApi for FakeApi {
    async fn fetch_page(
        &self,
        access_token: &AccessToken,
        tenant_id: &TenantId,
        query: &PageQuery,
    ) -> Result<Page, ProviderError> {
        assert_eq!(access_token.as_str(), "access-1");
        assert_eq!(tenant_id.as_str(), TENANT_ID);
        self.requested
            .lock()
            .unwrap()
            .push((query.resource, query.page));

        match query.resource {
            Resource::Accounts => {
                let size = query.page_size as usize;
                let start = (query.page as usize - 1) * size;
                let end = (start + size).min(ACCOUNT_COUNT);
                let page_count = ACCOUNT_COUNT.div_ceil(size) as u32;
                Ok(Page::new(account_records(start..end)).with_pagination(query.page, page_count))
            }
            _ => Ok(Page::new(
                (0..VENDOR_COUNT)
                    .map(|i| json!({"Name": format!("Supplier {i}"), "IsSupplier": true}))
                    .collect(),
            )),
        }
    }
}

pub fn account_records(range: std::ops::Range<usize>) -> Vec<ResourceRecord> {
    range
        .map(|i| json!({"Code": format!("{i:03}"), "Name": format!("Account {i:03}")}))
        .collect()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState<FakeProvider, FakeApi>,
    pub api: Arc<FakeApi>,
    pub data_dir: TempDir,
}

/// Build the full router against in-memory fakes and a temporary cache directory.
pub fn build_test_app() -> TestApp {
    let data_dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::default());
    let settings = ServerSettings::new(data_dir.path())
        .with_frontend_redirect(FRONTEND)
        .with_page_size(100);
    let state = AppState::new(Arc::new(FakeProvider::default()), api.clone(), settings);

    TestApp {
        router: app_routes(state.clone()),
        state,
        api,
        data_dir,
    }
}

pub async fn send(app: &TestApp, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("origin", "http://localhost:3001")
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get("location")
        .expect("redirect has a location")
        .to_str()
        .unwrap()
        .to_owned()
}

/// Starts authorization and returns the state embedded in the consent URL.
pub async fn begin_authorization(app: &TestApp) -> String {
    let response = get(app, "/xero/authenticate").await;
    let url = url::Url::parse(&location(&response)).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state in authorization URL")
}
