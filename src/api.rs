use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::ProviderError;
use crate::oauth::ensure_success;
use crate::provider::AccountingApi;
use crate::types::{AccessToken, Resource, ResourceRecord, TenantId};

/// Parameters of one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub resource: Resource,
    /// Server-side filter (`where`), e.g. `IsSupplier==true`.
    pub filter: Option<String>,
    /// Server-side sort (`order`), e.g. `Name ASC`.
    pub order: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl PageQuery {
    /// First page of `resource` using its default filter and order.
    #[must_use]
    pub fn first(resource: Resource, page_size: u32) -> Self {
        Self {
            resource,
            filter: Some(resource.default_filter().to_owned()),
            order: Some(resource.default_order().to_owned()),
            page: 1,
            page_size,
        }
    }

    /// Same query, different page.
    #[must_use]
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(5);
        if let Some(filter) = &self.filter {
            pairs.push(("where", filter.clone()));
        }
        if let Some(order) = &self.order {
            pairs.push(("order", order.clone()));
        }
        pairs.push(("page", self.page.to_string()));
        pairs.push(("pageSize", self.page_size.to_string()));
        if self.resource == Resource::Vendors {
            pairs.push(("summaryOnly", "false".to_owned()));
        }
        pairs
    }
}

/// Pagination block of a listing response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub item_count: Option<u64>,
}

impl Pagination {
    #[must_use]
    pub fn new(page: u32, page_count: u32) -> Self {
        Self {
            page,
            page_count,
            ..Self::default()
        }
    }
}

/// One listing response: records in API order plus the pagination block, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<ResourceRecord>,
    pub pagination: Option<Pagination>,
}

impl Page {
    #[must_use]
    pub fn new(records: Vec<ResourceRecord>) -> Self {
        Self {
            records,
            pagination: None,
        }
    }

    #[must_use]
    pub fn with_pagination(mut self, page: u32, page_count: u32) -> Self {
        self.pagination = Some(Pagination::new(page, page_count));
        self
    }

    /// Extracts the `resource` collection and the pagination block from a
    /// response body. A missing collection is an empty page.
    pub fn from_body(resource: Resource, mut body: JsonValue) -> Result<Self, ProviderError> {
        let records = match body.get_mut(resource.collection_key()).map(JsonValue::take) {
            Some(JsonValue::Array(records)) => records,
            Some(JsonValue::Null) | None => Vec::new(),
            Some(other) => {
                return Err(ProviderError::Invalid(format!(
                    "{} is not an array: {other}",
                    resource.collection_key()
                )));
            }
        };

        let pagination = match body.get_mut("pagination").map(JsonValue::take) {
            Some(JsonValue::Null) | None => None,
            Some(block) => Some(serde_json::from_value::<Pagination>(block).map_err(|e| {
                ProviderError::Invalid(format!("malformed pagination block: {e}"))
            })?),
        };

        Ok(Self {
            records,
            pagination,
        })
    }
}

/// HTTP client for the Xero accounting API (`api.xro/2.0`).
pub struct AccountingClient {
    base_url: Url,
    http: reqwest::Client,
}

impl AccountingClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.xero.com/api.xro/2.0/";

    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or timeouts).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Listing URL for `resource`, tolerant of a missing trailing slash on the base.
    pub fn endpoint_url(&self, resource: Resource) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::Invalid(format!("cannot use {} as API base URL", self.base_url))
            })?
            .pop_if_empty()
            .push(resource.endpoint());
        Ok(url)
    }
}

impl AccountingApi for AccountingClient {
    async fn fetch_page(
        &self,
        access_token: &AccessToken,
        tenant_id: &TenantId,
        query: &PageQuery,
    ) -> Result<Page, ProviderError> {
        let url = self.endpoint_url(query.resource)?;

        let response = self
            .http
            .get(url)
            .query(&query.query_pairs())
            .bearer_auth(access_token.as_str())
            .header("xero-tenant-id", tenant_id.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let response = ensure_success(response, "page request").await?;
        let body = response.json::<JsonValue>().await?;
        Page::from_body(query.resource, body)
    }
}
