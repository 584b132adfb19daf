//! Normalized futures symbol.

/// A symbol normalized for USDT-margined futures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a raw token captured from message text.
    ///
    /// Trims, uppercases, strips a leading `$`/`#` and a trailing
    /// `/USDT`, `-USDT` or `_USDT`, then appends `USDT` when missing.
    /// Normalization is idempotent.
    pub fn normalize(raw: &str) -> Symbol {
        let mut s = raw.trim().to_ascii_uppercase();

        for prefix in ["$", "#"] {
            if let Some(stripped) = s.strip_prefix(prefix) {
                s = stripped.to_string();
            }
        }
        for suffix in ["/USDT", "-USDT", "_USDT"] {
            if let Some(stripped) = s.strip_suffix(suffix) {
                s = stripped.to_string();
            }
        }
        if !s.ends_with("USDT") {
            s.push_str("USDT");
        }

        Symbol(s)
    }

    /// Shape validation: 4–20 chars, `[A-Z0-9]` only, `USDT` suffix.
    pub fn is_valid(&self) -> bool {
        let s = &self.0;
        if s.len() < 4 || s.len() > 20 {
            return false;
        }
        if !s.ends_with("USDT") {
            return false;
        }
        s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
