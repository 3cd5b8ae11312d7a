//! Classifies a raw HTTP response into a [`ProbeResult`].
//!
//! Decision order is keyword match, then status-block, then status-retry,
//! then safe-below-400, then error, and context is a fixed ±50-char window
//! around the match.

use serde::Serialize;

const CONTEXT_WINDOW: usize = 50;

/// The four-way classification every probe resolves to. Tagged, not
/// duck-typed: the variant itself carries whatever evidence is relevant,
/// rather than a status field plus optional attributes bolted on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum ProbeResult {
    Safe,
    Blocked {
        evidence: BlockEvidence,
        http_code: u16,
    },
    Retry {
        http_code: u16,
    },
    Error {
        http_code: u16,
        is_unknown_error_code: bool,
    },
}

impl ProbeResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ProbeResult::Blocked { .. })
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, ProbeResult::Safe)
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, ProbeResult::Retry { .. })
    }

    pub fn is_unknown_error_code(&self) -> bool {
        matches!(
            self,
            ProbeResult::Error {
                is_unknown_error_code: true,
                ..
            }
        )
    }
}

/// What triggered a `BLOCKED` classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockEvidence {
    Keyword { value: String, context: String },
    StatusCode { value: u16 },
}

/// Extracts a `±window`-char context snippet around `needle` in `haystack`,
/// marking truncation on either side with `...`.
fn extract_context(haystack: &str, needle_start: usize, needle_end: usize, window: usize) -> String {
    let chars: Vec<char> = haystack.chars().collect();
    let len = chars.len();
    let start = needle_start.saturating_sub(window);
    let end = (needle_end + window).min(len);
    let mut snippet: String = chars[start..end].iter().collect();
    if end < len {
        snippet.push_str("...");
    }
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    snippet
}

/// Classifies a response. `response_body` is searched for each of
/// `block_keywords` as a plain substring (the remote endpoint's response
/// text, not the probed segment).
pub fn analyze(
    http_code: u16,
    response_body: &str,
    block_keywords: &[String],
    block_status_codes: &[u16],
    retry_status_codes: &[u16],
) -> ProbeResult {
    for kw in block_keywords {
        if kw.is_empty() {
            continue;
        }
        if let Some(byte_idx) = response_body.find(kw.as_str()) {
            let char_start = response_body[..byte_idx].chars().count();
            let char_end = char_start + kw.chars().count();
            let context = extract_context(response_body, char_start, char_end, CONTEXT_WINDOW);
            return ProbeResult::Blocked {
                evidence: BlockEvidence::Keyword {
                    value: kw.clone(),
                    context,
                },
                http_code,
            };
        }
    }

    if block_status_codes.contains(&http_code) {
        return ProbeResult::Blocked {
            evidence: BlockEvidence::StatusCode { value: http_code },
            http_code,
        };
    }

    if retry_status_codes.contains(&http_code) {
        return ProbeResult::Retry { http_code };
    }

    if http_code < 400 {
        return ProbeResult::Safe;
    }

    let is_unknown_error_code =
        http_code >= 400 && !block_status_codes.contains(&http_code) && !retry_status_codes.contains(&http_code);
    ProbeResult::Error {
        http_code,
        is_unknown_error_code,
    }
}
