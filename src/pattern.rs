//! Expression pattern compilation
//!
//! Scraper patterns are compiled case-insensitive, multi-line and with `.`
//! matching newlines. A pattern the regex engine rejects is matched as a
//! literal string instead. Compiled patterns are cached process-wide since
//! the same definitions run over and over.

use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

static PATTERN_CACHE: LazyLock<RwLock<HashMap<String, Regex>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

// ReDoS protection limits
const REGEX_SIZE_LIMIT: usize = 10_000_000;
const REGEX_DFA_SIZE_LIMIT: usize = 10_000_000;

/// Patterns built from register contents vary per document; start over past this
const MAX_CACHED_PATTERNS: usize = 4096;

fn build(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .dot_matches_new_line(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_DFA_SIZE_LIMIT)
        .build()
}

fn compile_uncached(pattern: &str) -> Regex {
    match build(pattern) {
        Ok(re) => re,
        Err(e) => {
            if has_lookaround(pattern) {
                log::warn!(
                    "Lookaround is not supported; matching pattern literally: {}",
                    pattern
                );
            } else {
                log::warn!("Pattern rejected ({}); matching it literally: {}", e, pattern);
            }
            // An escaped pattern is always valid unless it blows the size limit
            build(&regex::escape(pattern)).unwrap_or_else(|_| never_matches())
        }
    }
}

/// Whether a pattern contains a lookahead or lookbehind group
fn has_lookaround(pattern: &str) -> bool {
    ["(?=", "(?!", "(?<=", "(?<!"]
        .iter()
        .any(|group| pattern.contains(group))
}

fn never_matches() -> Regex {
    static NEVER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b\B").unwrap_or_else(|e| panic!("Failed to build empty regex: {}", e))
    });
    NEVER.clone()
}

/// Compile a scraper pattern, falling back to literal matching
pub fn compile(pattern: &str) -> Regex {
    if let Ok(cache) = PATTERN_CACHE.read()
        && let Some(re) = cache.get(pattern)
    {
        return re.clone();
    }

    let re = compile_uncached(pattern);
    if let Ok(mut cache) = PATTERN_CACHE.write() {
        if cache.len() >= MAX_CACHED_PATTERNS {
            cache.clear();
        }
        cache.insert(pattern.to_string(), re.clone());
    }
    re
}
