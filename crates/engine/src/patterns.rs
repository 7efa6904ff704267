// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pattern classification for the output monitor (`spec.md` §4.4,
//! SPEC_FULL.md §4.4). Three alternations, each compiled once: a
//! `RegexSet` for the fast classification pass, individual `Regex` values
//! when the matched span itself is needed.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;

const PERMISSION_PATTERNS: &[&str] = &[
    r"\[Y/n\]",
    r"\[y/N\]",
    r"\[Yes/no\]",
    r"Allow .+\?",
    r"Do you want to proceed\?",
    r"Permission required",
    r"Press Enter to continue",
    r"Approve\?",
    r"Run command\?",
    r"Allow once\?",
    r"\(y\)es",
    r"\(n\)o",
];

const ERROR_PATTERNS: &[&str] = &[
    r"Error:",
    r"ERROR:",
    r"error:",
    r"Failed to",
    r"Exception:",
    r"Traceback \(most recent call last\)",
    r"command not found",
    r"Permission denied",
];

const COMPLETION_PATTERNS: &[&str] =
    &[r"Task complete", r"Done\.", r"Finished\.", r"All tests passed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternClass {
    Permission,
    Error,
    Completion,
}

struct Classifier {
    permission: RegexSet,
    error: RegexSet,
    completion: RegexSet,
}

fn classifier() -> &'static Classifier {
    static CLASSIFIER: OnceLock<Classifier> = OnceLock::new();
    CLASSIFIER.get_or_init(|| Classifier {
        permission: RegexSet::new(PERMISSION_PATTERNS).expect("static patterns"),
        error: RegexSet::new(ERROR_PATTERNS).expect("static patterns"),
        completion: RegexSet::new(COMPLETION_PATTERNS).expect("static patterns"),
    })
}

/// Classify a chunk of freshly-tailed output. Permission wins ties inside
/// a single chunk (`spec.md` §4.4 step 2).
pub fn classify(chunk: &str) -> Option<PatternClass> {
    let c = classifier();
    if c.permission.is_match(chunk) {
        Some(PatternClass::Permission)
    } else if c.error.is_match(chunk) {
        Some(PatternClass::Error)
    } else if c.completion.is_match(chunk) {
        Some(PatternClass::Completion)
    } else {
        None
    }
}

/// Claude's own crash signature: the agent TUI process itself died,
/// distinct from an in-conversation `Error:` match above (`spec.md`
/// §4.4 step 5). Grounded in the original's crash-signature regex.
pub fn is_crash_signature(chunk: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)panicked at|segmentation fault|core dumped|fatal runtime error")
            .expect("static pattern")
    })
    .is_match(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_prompt_detected() {
        assert_eq!(classify("Allow this command? [y/N]"), Some(PatternClass::Permission));
        assert_eq!(classify("Run command?"), Some(PatternClass::Permission));
    }

    #[test]
    fn error_detected_without_permission_match() {
        assert_eq!(classify("Error: build failed"), Some(PatternClass::Error));
    }

    #[test]
    fn completion_detected() {
        assert_eq!(classify("All tests passed"), Some(PatternClass::Completion));
    }

    #[test]
    fn permission_wins_tie_in_same_chunk() {
        let chunk = "Error: retry?\nAllow once?";
        assert_eq!(classify(chunk), Some(PatternClass::Permission));
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(classify("just some normal output"), None);
    }

    #[test]
    fn crash_signature_matches_panic() {
        assert!(is_crash_signature("thread 'main' panicked at src/main.rs:10"));
        assert!(!is_crash_signature("Error: something"));
    }
}
