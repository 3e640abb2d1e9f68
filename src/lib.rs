#![doc = include_str!("../README.md")]

pub mod api;
pub mod cache;
pub mod csrf;
pub mod error;
pub mod fetch;
pub mod flow;
pub mod oauth;
pub mod provider;
#[cfg(feature = "server")]
pub mod server;
pub mod session;
pub mod sync;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use api::{AccountingClient, Page, PageQuery, Pagination};
pub use cache::CacheWriter;
pub use error::{AuthError, CacheError, ConfigError, FetchError, ProviderError, SyncError};
pub use fetch::PaginatedFetcher;
pub use flow::{AuthorizationFlow, AuthorizationRequest, SessionTokens};
pub use oauth::{AuthClient, Connection, DEFAULT_SCOPES, OAuthConfig, TokenResponse};
pub use provider::{AccountingApi, Clock, OAuthProvider, SystemClock};
pub use session::{AuthPhase, Session, SessionHandle, TokenSet, TokenStore};
pub use sync::{SyncReport, Synchronizer};
pub use token::{DEFAULT_TOKEN_TTL, TokenManager};
pub use types::{AccessToken, RefreshToken, Resource, ResourceRecord, TenantId};
