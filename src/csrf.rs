use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Generates a cryptographically random `OAuth2` state parameter.
///
/// Returns a 43-character URL-safe string (32 random bytes → base64url).
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Compares a callback's state against the stored one.
///
/// Empty or absent values never match. The comparison runs in constant time
/// over the returned value.
#[must_use]
pub fn state_matches(returned: Option<&str>, stored: Option<&str>) -> bool {
    let (Some(returned), Some(stored)) = (returned, stored) else {
        return false;
    };
    if returned.is_empty() || stored.is_empty() {
        return false;
    }
    returned.as_bytes().ct_eq(stored.as_bytes()).into()
}
