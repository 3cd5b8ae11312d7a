//! Bidirectional-squeeze minimization of a short blocked region.
//!
//! Operates on chars throughout so offsets line up with every other
//! component. Internal probes bypass the global mask — the squeeze needs
//! to see the raw candidate substrings, not whatever a peer has already
//! masked over.

use crate::probe_engine::ProbeEngine;
use std::sync::Arc;
use tracing::warn;

const MAX_ITERATIONS: usize = 1000;
const LONG_RESULT_THRESHOLD: usize = 10;

/// A minimal blocked substring in original-text coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

pub struct PrecisionScanner {
    engine: Arc<ProbeEngine>,
}

impl PrecisionScanner {
    pub fn new(engine: Arc<ProbeEngine>) -> Self {
        Self { engine }
    }

    /// Searches `text` (known `BLOCKED`, located at `base_pos` in the
    /// original input) for the ordered set of minimal blocked substrings.
    pub async fn scan(&self, text: &str, base_pos: usize) -> Vec<Finding> {
        let guard = self.engine.probe(text, false).await;
        if guard.is_safe() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let total_len = chars.len();
        let mut findings = Vec::new();
        let mut offset = 0usize;
        let mut iterations = 0usize;

        while offset < total_len {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                warn!(target: "precision_scanner", offset, "hit iteration fuse, aborting");
                break;
            }
            if self.engine.is_cancelled() {
                break;
            }

            let residual: Vec<char> = chars[offset..].to_vec();

            match self.find_trigger_prefix(&residual).await {
                TriggerOutcome::NotFound => break,
                TriggerOutcome::TransportError => {
                    findings.push(Finding {
                        text: chars[offset..].iter().collect(),
                        start: base_pos + offset,
                        end: base_pos + total_len,
                    });
                    break;
                }
                TriggerOutcome::Found(prefix) => {
                    match self.left_squeeze(&prefix).await {
                        SqueezeOutcome::Word { word, left } => {
                            let verified = self.engine.probe(&word, true).await;
                            let (final_word, final_left) = if verified.is_blocked() {
                                (word, left)
                            } else {
                                match self.minimal_blocked_substring(&prefix).await {
                                    Some((w, s)) => (w, s),
                                    None => (word, left),
                                }
                            };

                            let start = base_pos + offset + final_left;
                            let word_len = final_word.chars().count();
                            findings.push(Finding {
                                text: final_word,
                                start,
                                end: start + word_len,
                            });
                            offset += final_left + word_len;
                        }
                        SqueezeOutcome::TransportError => {
                            findings.push(Finding {
                                text: chars[offset..].iter().collect(),
                                start: base_pos + offset,
                                end: base_pos + total_len,
                            });
                            break;
                        }
                    }
                }
            }
        }

        self.clean_long_results(findings).await
    }

    /// Scans `residual` left to right for the first prefix that probes
    /// `BLOCKED`, isolating one target keyword.
    async fn find_trigger_prefix(&self, residual: &[char]) -> TriggerOutcome {
        for i in 1..=residual.len() {
            let candidate: String = residual[..i].iter().collect();
            let result = self.engine.probe(&candidate, true).await;
            if result.is_blocked() {
                return TriggerOutcome::Found(candidate);
            }
            if matches!(result, crate::response_analyzer::ProbeResult::Error { .. }) {
                return TriggerOutcome::TransportError;
            }
        }
        TriggerOutcome::NotFound
    }

    /// Shrinks `prefix` from the left until removing one more character
    /// would make it `SAFE`.
    async fn left_squeeze(&self, prefix: &str) -> SqueezeOutcome {
        let chars: Vec<char> = prefix.chars().collect();
        let len = chars.len();
        if len <= 1 {
            return SqueezeOutcome::Word {
                word: prefix.to_string(),
                left: 0,
            };
        }

        let mut left = 0usize;
        for j in 0..len - 1 {
            let candidate: String = chars[j + 1..].iter().collect();
            let result = self.engine.probe(&candidate, true).await;
            if matches!(result, crate::response_analyzer::ProbeResult::Error { .. }) {
                return SqueezeOutcome::TransportError;
            }
            if result.is_blocked() {
                left = j + 1;
                continue;
            }
            let word: String = chars[j..].iter().collect();
            return SqueezeOutcome::Word { word, left: j };
        }

        let word: String = chars[left..].iter().collect();
        SqueezeOutcome::Word { word, left }
    }

    /// `O(n^2)` fallback: ascending window size, first start position that
    /// probes `BLOCKED` wins. Used when the squeezed word fails
    /// verification, and for long-result cleaning.
    async fn minimal_blocked_substring(&self, text: &str) -> Option<(String, usize)> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        for w in 1..=n {
            for s in 0..=(n - w) {
                let candidate: String = chars[s..s + w].iter().collect();
                if self.engine.probe(&candidate, true).await.is_blocked() {
                    return Some((candidate, s));
                }
            }
        }
        None
    }

    /// Re-minimizes any finding longer than 10 chars, in case concurrent
    /// over-shoot left it wider than the true minimal keyword.
    async fn clean_long_results(&self, findings: Vec<Finding>) -> Vec<Finding> {
        let mut cleaned = Vec::with_capacity(findings.len());
        for finding in findings {
            if finding.text.chars().count() <= LONG_RESULT_THRESHOLD {
                cleaned.push(finding);
                continue;
            }
            match self.minimal_blocked_substring(&finding.text).await {
                Some((shorter, rel_start)) if shorter.chars().count() < finding.text.chars().count() => {
                    let new_start = finding.start + rel_start;
                    let new_len = shorter.chars().count();
                    cleaned.push(Finding {
                        text: shorter,
                        start: new_start,
                        end: new_start + new_len,
                    });
                }
                _ => cleaned.push(finding),
            }
        }
        cleaned
    }
}

enum TriggerOutcome {
    Found(String),
    NotFound,
    TransportError,
}

enum SqueezeOutcome {
    Word { word: String, left: usize },
    TransportError,
}
