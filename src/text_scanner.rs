//! End-to-end scan orchestrator: segment → concurrent probe → deep-dive →
//! golden-flow post-processing.
//!
//! The golden flow (Validation → Refinement → Enumeration) purifies
//! whatever the concurrent segment probes turned up, in the same phased,
//! logged style as the rest of the orchestrator.

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::events::{EventEmitter, LogLevel};
use crate::mask_manager::GlobalMaskManager;
use crate::precision_scanner::{Finding, PrecisionScanner};
use crate::probe_engine::ProbeEngine;
use crate::response_analyzer::BlockEvidence;
use crate::segmenter::TextSegmenter;
use crate::binary_searcher::BinarySearcher;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Final, purified scan output.
#[derive(Debug, Clone)]
pub struct ScanResults {
    pub results: BTreeMap<String, Vec<(usize, usize)>>,
    pub sensitive_count: usize,
    pub api_calls: usize,
    pub unknown_status_codes: Vec<u16>,
    pub unknown_status_code_counts: HashMap<u16, usize>,
    pub elapsed_seconds: f64,
    pub evidence: Vec<BlockEvidence>,
}

impl ScanResults {
    pub fn results_as_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (kw, positions) in &self.results {
            let arr: Vec<Value> = positions
                .iter()
                .map(|(start, end)| json!({ "start": start, "end": end }))
                .collect();
            obj.insert(kw.clone(), Value::Array(arr));
        }
        Value::Object(obj)
    }
}

/// `"2m 57s"` for durations of a minute or more, `"3.45s"` otherwise.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.2}s")
    } else {
        let total = seconds.round() as u64;
        format!("{}m {}s", total / 60, total % 60)
    }
}

/// Guidance hint for an unknown status code, grouped by class.
pub fn status_code_hint(code: u16) -> String {
    match code {
        401 => "401 Unauthorized — check api_key.".to_string(),
        404 => "404 Not Found — check api_url path.".to_string(),
        429 => "429 Too Many Requests — consider lowering concurrency.".to_string(),
        400..=499 => format!("{code} is a client error — check request_template and model."),
        500..=599 => format!("{code} is a server error — the endpoint may be unstable."),
        _ => format!("{code} is not a recognized block/retry status — add it to the config if intentional."),
    }
}

/// Non-overlapping occurrences of `needle` in `haystack`: after a match,
/// scanning resumes at its end rather than one character later.
fn find_all_occurrences(haystack: &[char], needle: &[char]) -> Vec<(usize, usize)> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    let mut occurrences = Vec::new();
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            occurrences.push((i, i + needle.len()));
            i += needle.len();
        } else {
            i += 1;
        }
    }
    occurrences
}

struct RunningResults {
    positions: HashMap<String, BTreeSet<(usize, usize)>>,
}

impl RunningResults {
    fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    fn add_all(&mut self, keyword: &str, occurrences: &[(usize, usize)]) {
        let set = self.positions.entry(keyword.to_string()).or_default();
        for pos in occurrences {
            set.insert(*pos);
        }
    }

    fn sensitive_count(&self) -> usize {
        self.positions.values().map(|s| s.len()).sum()
    }

    fn to_json(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (kw, positions) in &self.positions {
            let arr: Vec<Value> = positions
                .iter()
                .map(|(start, end)| json!({ "start": start, "end": end }))
                .collect();
            obj.insert(kw.clone(), Value::Array(arr));
        }
        Value::Object(obj)
    }
}

pub struct TextScanner {
    config: Arc<ScanConfig>,
    engine: Arc<ProbeEngine>,
    mask_manager: Arc<GlobalMaskManager>,
    searcher: Arc<BinarySearcher>,
    segmenter: TextSegmenter,
    emitter: Arc<EventEmitter>,
    cancel_flag: Arc<AtomicBool>,
}

impl TextScanner {
    pub fn new(config: ScanConfig, emitter: Arc<EventEmitter>, cancel_flag: Arc<AtomicBool>) -> Result<Self, ScanError> {
        let config = Arc::new(config.normalize()?);
        let mask_manager = Arc::new(GlobalMaskManager::default());
        let engine = Arc::new(ProbeEngine::new(
            config.clone(),
            mask_manager.clone(),
            emitter.clone(),
            cancel_flag.clone(),
        )?);
        let precision = Arc::new(PrecisionScanner::new(engine.clone()));
        let searcher = Arc::new(BinarySearcher::new(engine.clone(), precision, config.clone()));
        let segmenter = TextSegmenter::new(config.chunk_size, config.overlap_size);

        Ok(Self {
            config,
            engine,
            mask_manager,
            searcher,
            segmenter,
            emitter,
            cancel_flag,
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Runs the full pipeline against `text`. Emits `scan_start`, throttled
    /// `progress`, buffered `sensitive_found_batch`, and exactly one
    /// terminal event (`scan_complete` xor `scan_cancelled` xor
    /// `scan_error`).
    pub async fn scan(&self, text: &str) -> Result<ScanResults, ScanError> {
        let start_time = Instant::now();
        self.mask_manager.reset();

        let chars: Vec<char> = text.chars().collect();
        let total_len = chars.len();
        let segments = self.segmenter.split(text);

        info!(target: "text_scanner", concurrency = self.config.concurrency, timeout = self.config.timeout, "network config");
        info!(target: "text_scanner", algorithm_mode = ?self.config.algorithm_mode, threshold = self.config.algorithm_switch_threshold, "algorithm config");
        info!(target: "text_scanner", chunk_size = self.config.chunk_size, overlap_size = self.config.overlap_size, "text processing config");
        info!(target: "text_scanner", block_keywords = self.config.block_keywords.len(), block_status_codes = ?self.config.block_status_codes, "rule config");

        self.emitter
            .scan_started(total_len, self.config.chunk_size, self.config.redacted());

        let running = Arc::new(Mutex::new(RunningResults::new()));
        let total_segments = segments.len();
        let scanned = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let results_stream = stream::iter(segments.into_iter().map(|segment| {
            let engine = self.engine.clone();
            let mask_manager = self.mask_manager.clone();
            let searcher = self.searcher.clone();
            let emitter = self.emitter.clone();
            let running = running.clone();
            let scanned = scanned.clone();
            let chars = chars.clone();

            async move {
                if engine.is_cancelled() {
                    return;
                }

                let masked = mask_manager.apply(&segment.text);
                let is_fully_masked = !masked.is_empty() && masked.chars().all(|c| c == '*' || c.is_whitespace());

                if !is_fully_masked {
                    let result = engine.probe(&masked, true).await;
                    if result.is_blocked() {
                        let raw_findings = searcher.search(&segment.text, segment.start).await;
                        for finding in raw_findings {
                            let rel_start = finding.start.saturating_sub(segment.start);
                            let rel_end = finding.end.saturating_sub(segment.start);
                            let seg_chars: Vec<char> = segment.text.chars().collect();
                            if rel_end > seg_chars.len() || rel_start >= rel_end {
                                continue;
                            }
                            let word: String = seg_chars[rel_start..rel_end].iter().collect();

                            let newly_added = mask_manager.add(&word);
                            if newly_added {
                                let word_chars: Vec<char> = word.chars().collect();
                                let occurrences = find_all_occurrences(&chars, &word_chars);
                                running.lock().expect("lock poisoned").add_all(&word, &occurrences);
                                for (s, e) in &occurrences {
                                    emitter.sensitive_found(word.clone(), *s, *e);
                                }
                            }
                        }
                    }
                }

                let done = scanned.fetch_add(1, Ordering::Relaxed) + 1;
                let sensitive_count = running.lock().expect("lock poisoned").sensitive_count();
                emitter.progress_updated(done, total_segments.max(1), sensitive_count, None, false);
            }
        }))
        .buffer_unordered(self.config.concurrency.max(1));

        results_stream.collect::<Vec<()>>().await;

        if self.is_cancelled() {
            self.emitter.scan_cancelled("cancelled during segment probing");
            return Err(ScanError::ScanCancelled("scan was cancelled".to_string()));
        }

        let golden_results = self.golden_flow(&chars, running).await;

        self.emitter.progress_updated(total_segments, total_segments.max(1), golden_results.sensitive_count(), Some(golden_results.to_json()), true);

        let (api_calls, _safe, _blocked, _errors) = self.engine.counters.snapshot();
        let unknown_status_codes = self.engine.unknown_status_codes();
        let unknown_status_code_counts = self.engine.unknown_status_code_counts();
        let evidence = self.engine.evidence();
        let elapsed_seconds = start_time.elapsed().as_secs_f64();
        let duration_text = format_duration(elapsed_seconds);

        for code in &unknown_status_codes {
            self.emitter.warning_occurred(status_code_hint(*code));
        }

        let results = ScanResults {
            results: golden_results
                .positions
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
                .collect(),
            sensitive_count: golden_results.sensitive_count(),
            api_calls,
            unknown_status_codes: unknown_status_codes.clone(),
            unknown_status_code_counts: unknown_status_code_counts.clone(),
            elapsed_seconds,
            evidence: evidence.clone(),
        };

        let evidence_json: Vec<Value> = evidence
            .iter()
            .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .collect();
        let counts_json: Value = unknown_status_code_counts
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into();

        self.emitter.scan_completed(
            results.sensitive_count,
            api_calls,
            unknown_status_codes,
            Some(counts_json),
            Some(Value::Array(evidence_json)),
            results.results_as_json(),
            duration_text,
            elapsed_seconds,
        );

        self.emitter.log_message(LogLevel::Success, format!("scan complete: {} sensitive matches", results.sensitive_count));

        Ok(results)
    }

    /// Validation → Refinement → Enumeration, purifying findings
    /// accumulated under concurrent over-shoot.
    async fn golden_flow(&self, original_chars: &[char], running: Arc<Mutex<RunningResults>>) -> RunningResults {
        let candidates: Vec<String> = {
            let guard = running.lock().expect("lock poisoned");
            guard.positions.keys().cloned().collect()
        };

        // Validation: drop candidates that re-probe SAFE in isolation.
        let validations = stream::iter(candidates.into_iter().map(|candidate| {
            let engine = self.engine.clone();
            async move {
                let result = engine.probe(&candidate, true).await;
                let keep = !result.is_safe();
                (candidate, keep)
            }
        }))
        .buffer_unordered(self.config.concurrency.max(1))
        .collect::<Vec<(String, bool)>>()
        .await;

        let mut survivors: Vec<String> = validations
            .into_iter()
            .filter_map(|(candidate, keep)| if keep { Some(candidate) } else { None })
            .collect();

        // Refinement: keep only minimal candidates.
        survivors.sort_by_key(|s| s.chars().count());
        let mut minimal: Vec<String> = Vec::new();
        for candidate in survivors {
            let is_redundant = minimal.iter().any(|kept: &String| candidate.contains(kept.as_str()));
            if !is_redundant {
                minimal.push(candidate);
            }
        }

        // Enumeration: literal re-scan of the original input for each kept keyword.
        let mut final_results = RunningResults::new();
        for keyword in minimal {
            let needle: Vec<char> = keyword.chars().collect();
            let occurrences = find_all_occurrences(original_chars, &needle);
            if !occurrences.is_empty() {
                final_results.add_all(&keyword, &occurrences);
            }
        }
        final_results
    }
}
