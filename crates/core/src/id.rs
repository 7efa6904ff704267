// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 8-hex-char session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId([u8; 8]);

impl SessionId {
    /// Generate a new random session id from the low 32 bits of a UUIDv4.
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let hex = uuid.simple().to_string();
        Self::parse(&hex[..8]).expect("uuid hex prefix is always valid ascii-hex")
    }

    /// Parse an 8-hex-char string into a session id.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(s.as_bytes());
        Some(Self(buf))
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: constructed only from ascii-hexdigit bytes.
        std::str::from_utf8(&self.0).unwrap_or("00000000")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.as_str())
    }
}

/// `[A-Za-z0-9_-]{1,32}` — the friendly-name constraint from the data model.
pub fn friendly_name_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("static pattern"))
}

pub fn is_valid_friendly_name(name: &str) -> bool {
    friendly_name_regex().is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_8_hex_chars() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_roundtrips() {
        let id = SessionId::generate();
        let parsed = SessionId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(SessionId::parse("abc").is_none());
        assert!(SessionId::parse("123456789").is_none());
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(SessionId::parse("zzzzzzzz").is_none());
    }

    #[test]
    fn friendly_name_validation() {
        assert!(is_valid_friendly_name("dev-1"));
        assert!(is_valid_friendly_name("a"));
        assert!(is_valid_friendly_name(&"a".repeat(32)));
        assert!(!is_valid_friendly_name(&"a".repeat(33)));
        assert!(!is_valid_friendly_name(""));
        assert!(!is_valid_friendly_name("has space"));
        assert!(!is_valid_friendly_name("has.dot"));
    }
}
