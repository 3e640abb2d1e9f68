use std::path::PathBuf;

use crate::types::Resource;

/// Failure of a single call to the OAuth provider or the accounting API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The remote endpoint answered with a non-success status.
    #[error("{operation} failed with status {status}: {detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Request could not be built or the response was unusable.
    #[error("{0}")]
    Invalid(String),
}

impl ProviderError {
    /// HTTP status reported by the remote endpoint, if it answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Timeout(_) | Self::Invalid(_) => None,
        }
    }

    /// Whether the endpoint rejected the request itself, as opposed to the
    /// request never completing.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

/// Authorization and token-lifecycle errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No tokens are stored; the user has to authorize first.
    #[error("no authorized session")]
    NoSession,

    /// The refresh grant failed. When the provider rejected the refresh token the
    /// session has been cleared and must re-authorize.
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] ProviderError),

    #[error("invalid state parameter")]
    StateMismatch,

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(#[source] ProviderError),

    #[error("no tenant connection available")]
    NoTenant,
}

/// Errors raised while paging through a remote collection.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The API rejected the access token mid-sync.
    #[error("access token rejected by the API")]
    Unauthorized,

    #[error("page request failed: {0}")]
    Transport(#[source] ProviderError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl FetchError {
    /// Whether the failure means the session has to re-authorize.
    #[must_use]
    pub fn requires_authorization(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Auth(AuthError::NoSession | AuthError::RefreshFailed(_))
        )
    }
}

/// Errors raised while persisting a cache artifact.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {name}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A resource sync that did not complete; nothing was written for `resource`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("Error fetching {resource}: {source}")]
    Fetch {
        resource: Resource,
        #[source]
        source: FetchError,
    },

    #[error("Error caching {resource}: {source}")]
    Cache {
        resource: Resource,
        #[source]
        source: CacheError,
    },
}

/// Missing or invalid configuration.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);
