// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named-key to tmux `send-keys` argument translation, for keys tmux's own
//! key-name syntax doesn't directly cover.

/// Translate a named key to the literal argument `tmux send-keys` expects.
/// Returns `None` for names tmux already understands natively (most of
/// them) — callers should pass those straight through.
pub fn encode_key(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "enter" | "return" => Some("Enter"),
        "escape" | "esc" => Some("Escape"),
        "tab" => Some("Tab"),
        "backspace" => Some("BSpace"),
        "delete" | "del" => Some("DC"),
        "up" => Some("Up"),
        "down" => Some("Down"),
        "left" => Some("Left"),
        "right" => Some("Right"),
        "space" => Some("Space"),
        _ => None,
    }
}

/// True if `key` looks like a `Ctrl-<letter>` request tmux's `C-<letter>`
/// syntax can express directly.
pub fn as_ctrl_sequence(key: &str) -> Option<String> {
    let lower = key.to_lowercase();
    let ch = lower.strip_prefix("ctrl-")?.chars().next()?;
    if ch.is_ascii_lowercase() {
        Some(format!("C-{ch}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_names() {
        assert_eq!(encode_key("Enter"), Some("Enter"));
        assert_eq!(encode_key("escape"), Some("Escape"));
    }

    #[test]
    fn passes_through_unknown_literal_keys() {
        assert_eq!(encode_key("y"), None);
    }

    #[test]
    fn ctrl_sequence_parsing() {
        assert_eq!(as_ctrl_sequence("Ctrl-c"), Some("C-c".to_string()));
        assert_eq!(as_ctrl_sequence("ctrl-C"), None);
    }
}
