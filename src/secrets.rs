//! Handling of exchange credentials.
//!
//! API secrets are wrapped in [`Zeroizing`] so they are wiped from memory when
//! a gateway instance is dropped, and every read surface that exposes an
//! account to the dashboard goes through [`mask_secret`] first.

use zeroize::Zeroizing;

/// A Binance API key/secret pair. The secret is zeroized on drop.
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: Zeroizing::new(api_secret.into()),
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_secret", &"***")
            .finish()
    }
}

/// Reduce a secret to its first and last four characters.
///
/// Values too short to mask meaningfully are replaced entirely so that a
/// truncated secret never leaks more than it would when long. Counts
/// characters, not bytes, so pasted non-ASCII input cannot break a read
/// endpoint.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 8 {
        return "****".to_string();
    }
    let head: String = secret.chars().take(4).collect();
    let tail: String = secret.chars().skip(len - 4).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_secret() {
        let masked = mask_secret("abcd1234efgh5678");
        assert_eq!(masked, "abcd...5678");
    }

    #[test]
    fn short_secret_fully_masked() {
        assert_eq!(mask_secret("tiny"), "****");
        assert_eq!(mask_secret(""), "****");
        assert_eq!(mask_secret("12345678"), "****");
    }

    #[test]
    fn multibyte_secret_masks_without_panicking() {
        // curly quotes land inside the head and tail windows
        assert_eq!(mask_secret("ab\u{201c}d1234efgh56\u{201d}8"), "ab\u{201c}d...56\u{201d}8");
        // five emoji are eight chars or fewer, fully masked
        assert_eq!(mask_secret("🔑🔑🔑🔑🔑"), "****");
    }

    #[test]
    fn credentials_debug_never_prints_secret() {
        let creds = ApiCredentials::new("key-1234567890", "secret-1234567890");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-1234567890"));
        assert!(!debug.contains("key-1234567890"));
    }
}
