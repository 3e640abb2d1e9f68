use std::fmt;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

const MASK_PREFIX_LEN: usize = 6;
const MASK_SUFFIX_LEN: usize = 4;

/// Short-lived bearer credential for API calls.
///
/// `Debug` output is masked; use [`AccessToken::as_str`] to get the raw value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&mask(&self.0)).finish()
    }
}

/// Long-lived credential used to obtain a new [`AccessToken`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RefreshToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefreshToken").field(&mask(&self.0)).finish()
    }
}

/// Xero tenant (organisation) identifier, sent as the `xero-tenant-id` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A single account or contact exactly as the API returned it.
pub type ResourceRecord = serde_json::Value;

/// The collections mirrored into the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Chart of accounts, restricted to active accounts.
    Accounts,
    /// Contacts flagged as suppliers.
    Vendors,
}

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::Accounts, Resource::Vendors];

    /// Path segment of the listing endpoint under the accounting API root.
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Accounts => "Accounts",
            Self::Vendors => "Contacts",
        }
    }

    /// Key of the record array in the listing response body.
    #[must_use]
    pub fn collection_key(self) -> &'static str {
        self.endpoint()
    }

    /// Cache artifact name, without extension.
    #[must_use]
    pub fn cache_name(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Vendors => "vendors",
        }
    }

    /// Capitalized name used in user-facing messages.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Accounts => "Accounts",
            Self::Vendors => "Vendors",
        }
    }

    #[must_use]
    pub fn default_filter(self) -> &'static str {
        match self {
            Self::Accounts => r#"Status=="ACTIVE""#,
            Self::Vendors => "IsSupplier==true",
        }
    }

    #[must_use]
    pub fn default_order(self) -> &'static str {
        "Name ASC"
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_name())
    }
}

/// Masks a credential for logs, keeping only a short prefix and suffix.
pub(crate) fn mask(token: &str) -> String {
    let len = token.len();
    if len <= MASK_PREFIX_LEN + MASK_SUFFIX_LEN || !token.is_ascii() {
        return "*".repeat(len.min(8));
    }
    format!(
        "{}...{}",
        &token[..MASK_PREFIX_LEN],
        &token[len - MASK_SUFFIX_LEN..]
    )
}
