//! Thread-safe set of known keywords with equal-length masking.
//!
//! The mutable mask set is the only state shared across concurrent workers;
//! `apply` takes a lock-free snapshot copy so the hot path never blocks on
//! the writer.

use std::collections::HashSet;
use std::sync::RwLock;

const DEFAULT_MASK_CHAR: char = '*';

/// Monotonic, add-only set of discovered keywords plus the equal-length
/// substitution operation used to shrink probe surfaces across workers.
pub struct GlobalMaskManager {
    keywords: RwLock<HashSet<String>>,
    mask_char: char,
}

impl Default for GlobalMaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_CHAR)
    }
}

impl GlobalMaskManager {
    pub fn new(mask_char: char) -> Self {
        Self {
            keywords: RwLock::new(HashSet::new()),
            mask_char,
        }
    }

    /// Adds `kw` to the known set. Returns `true` if it was not already present.
    pub fn add(&self, kw: &str) -> bool {
        if kw.is_empty() {
            return false;
        }
        let mut guard = self.keywords.write().expect("mask manager lock poisoned");
        guard.insert(kw.to_string())
    }

    /// A point-in-time copy of the known keywords, sorted by descending
    /// char length so `apply` masks longer keywords before any shorter
    /// keyword that might be one of their substrings.
    pub fn snapshot(&self) -> Vec<String> {
        let guard = self.keywords.read().expect("mask manager lock poisoned");
        let mut snap: Vec<String> = guard.iter().cloned().collect();
        snap.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        snap
    }

    /// Replaces every occurrence of every known keyword in `text` with a
    /// same-char-length run of the mask character. `len(apply(text)) ==
    /// len(text)` always holds (in chars), since each substitution swaps in
    /// a replacement of identical char length.
    pub fn apply(&self, text: &str) -> String {
        apply_snapshot(&self.snapshot(), text, self.mask_char)
    }

    /// Clears the known set. Only valid at scan start; once a keyword is
    /// added mid-scan it must stay masked for the scan's remainder.
    pub fn reset(&self) {
        let mut guard = self.keywords.write().expect("mask manager lock poisoned");
        guard.clear();
    }
}

fn apply_snapshot(snapshot: &[String], text: &str, mask_char: char) -> String {
    let mut out = text.to_string();
    for kw in snapshot {
        if kw.is_empty() || !out.contains(kw.as_str()) {
            continue;
        }
        let replacement: String = std::iter::repeat(mask_char).take(kw.chars().count()).collect();
        out = out.replace(kw.as_str(), &replacement);
    }
    out
}
