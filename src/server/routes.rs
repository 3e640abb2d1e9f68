use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use super::error::ApiError;
use super::state::AppState;
use crate::provider::{AccountingApi, OAuthProvider};
use crate::sync::SyncReport;
use crate::types::Resource;

/// Create the service router: authorization, cached reads and on-demand sync.
pub fn app_routes<P, A>(state: AppState<P, A>) -> Router
where
    P: OAuthProvider,
    A: AccountingApi,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);
    // Cached reads advertise the methods on every response, not only on preflight.
    let allow_methods = SetResponseHeaderLayer::if_not_present(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );

    Router::new()
        .route("/xero/authenticate", get(authenticate::<P, A>))
        .route("/xero/redirect", get(callback::<P, A>))
        .route("/accounts", get(accounts::<P, A>).layer(allow_methods.clone()))
        .route("/vendors", get(vendors::<P, A>).layer(allow_methods))
        .route("/sync", post(sync::<P, A>))
        .layer(cors)
        .with_state(state)
}

// ── Authorization ──────────────────────────────────────────────────

async fn authenticate<P: OAuthProvider, A: AccountingApi>(
    State(state): State<AppState<P, A>>,
) -> Response {
    let request = state
        .flow
        .begin_authorization(&state.session, &state.settings.scopes)
        .await;
    found(request.url)
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback<P: OAuthProvider, A: AccountingApi>(
    State(state): State<AppState<P, A>>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = &params.error {
        tracing::warn!(error = %error, "OAuth2 error from Xero");
    }

    state
        .flow
        .complete_authorization(&state.session, params.state.as_deref(), params.code.as_deref())
        .await?;

    let report = state
        .sync
        .sync_all(&state.session)
        .await
        .map_err(ApiError::InitialSync)?;
    tracing::info!(
        accounts = report.accounts,
        vendors = report.vendors,
        "Initial sync complete"
    );

    Ok(found(state.settings.frontend_redirect.clone()))
}

// ── Cached collections ─────────────────────────────────────────────

async fn accounts<P: OAuthProvider, A: AccountingApi>(
    State(state): State<AppState<P, A>>,
) -> Result<Response, ApiError> {
    cached(&state, Resource::Accounts).await
}

async fn vendors<P: OAuthProvider, A: AccountingApi>(
    State(state): State<AppState<P, A>>,
) -> Result<Response, ApiError> {
    cached(&state, Resource::Vendors).await
}

// ── Sync ───────────────────────────────────────────────────────────

async fn sync<P: OAuthProvider, A: AccountingApi>(
    State(state): State<AppState<P, A>>,
) -> Result<Json<SyncReport>, ApiError> {
    let report = state
        .sync
        .sync_all(&state.session)
        .await
        .map_err(ApiError::Sync)?;
    Ok(Json(report))
}

// ── Helpers ────────────────────────────────────────────────────────

async fn cached<P: OAuthProvider, A: AccountingApi>(
    state: &AppState<P, A>,
    resource: Resource,
) -> Result<Response, ApiError> {
    let Some(bytes) = state.sync.cache().load(resource.cache_name()).await? else {
        tracing::debug!(%resource, "No cached data");
        return Err(ApiError::NotFound(resource));
    };
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// 302 to `location`; `Redirect::to` answers 303.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}
