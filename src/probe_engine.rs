//! Single-segment probe: build → send → classify → retry → account.
//!
//! Owns the shared HTTP client and the per-scan counters; `probe` never
//! throws — transport failures and exhausted retries become
//! `ProbeResult::Error`, so upstream algorithms never see a network error
//! reinterpreted as `Safe`.

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::events::EventEmitter;
use crate::mask_manager::GlobalMaskManager;
use crate::request_builder;
use crate::response_analyzer::{self, BlockEvidence, ProbeResult};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(10);
const HARD_ATTEMPT_CAP: usize = 5;
const JITTER_SECONDS: f64 = 0.5;

#[derive(Debug, Default)]
pub struct ProbeCounters {
    pub requests: AtomicUsize,
    pub safe: AtomicUsize,
    pub blocked: AtomicUsize,
    pub errors: AtomicUsize,
}

impl ProbeCounters {
    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.requests.load(Ordering::Relaxed),
            self.safe.load(Ordering::Relaxed),
            self.blocked.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }
}

fn evidence_key(evidence: &BlockEvidence) -> String {
    match evidence {
        BlockEvidence::Keyword { value, .. } => format!("kw:{value}"),
        BlockEvidence::StatusCode { value } => format!("code:{value}"),
    }
}

pub struct ProbeEngine {
    client: reqwest::Client,
    config: Arc<ScanConfig>,
    mask_manager: Arc<GlobalMaskManager>,
    emitter: Arc<EventEmitter>,
    cancel_flag: Arc<AtomicBool>,
    pub counters: ProbeCounters,
    unknown_status_counts: Mutex<HashMap<u16, usize>>,
    seen_unknown_codes: Mutex<HashSet<u16>>,
    evidence: Mutex<Vec<BlockEvidence>>,
    seen_evidence_keys: Mutex<HashSet<String>>,
}

impl ProbeEngine {
    /// Builds a shared HTTP client with keep-alive and a pool sized by
    /// `config.concurrency`.
    pub fn new(
        config: Arc<ScanConfig>,
        mask_manager: Arc<GlobalMaskManager>,
        emitter: Arc<EventEmitter>,
        cancel_flag: Arc<AtomicBool>,
    ) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .pool_max_idle_per_host(config.concurrency)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ScanError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            mask_manager,
            emitter,
            cancel_flag,
            counters: ProbeCounters::default(),
            unknown_status_counts: Mutex::new(HashMap::new()),
            seen_unknown_codes: Mutex::new(HashSet::new()),
            evidence: Mutex::new(Vec::new()),
            seen_evidence_keys: Mutex::new(HashSet::new()),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    pub fn unknown_status_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self.seen_unknown_codes.lock().expect("lock poisoned").iter().copied().collect();
        codes.sort_unstable();
        codes
    }

    pub fn unknown_status_code_counts(&self) -> HashMap<u16, usize> {
        self.unknown_status_counts.lock().expect("lock poisoned").clone()
    }

    pub fn evidence(&self) -> Vec<BlockEvidence> {
        self.evidence.lock().expect("lock poisoned").clone()
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(BACKOFF_CAP);
        let jitter = rand::rng().random_range(-JITTER_SECONDS..=JITTER_SECONDS);
        let millis = (capped.as_secs_f64() * 1000.0 + jitter * 1000.0).max(0.0);
        Duration::from_millis(millis as u64)
    }

    fn record_unknown_code(&self, code: u16) {
        let mut counts = self.unknown_status_counts.lock().expect("lock poisoned");
        *counts.entry(code).or_insert(0) += 1;
        drop(counts);

        let mut seen = self.seen_unknown_codes.lock().expect("lock poisoned");
        if seen.insert(code) {
            drop(seen);
            debug!(target: "probe_engine", code, "first occurrence of unknown status code");
        }
    }

    fn record_evidence_once(&self, evidence: &BlockEvidence) {
        let key = evidence_key(evidence);
        let mut seen = self.seen_evidence_keys.lock().expect("lock poisoned");
        if seen.insert(key) {
            drop(seen);
            self.evidence.lock().expect("lock poisoned").push(evidence.clone());
        }
    }

    /// Probes `text`, applying the global mask unless `bypass_mask` is set.
    /// Retries transport errors and `RETRY` classifications with
    /// exponential backoff (base 1s, cap 10s) up to a hard ceiling of 5
    /// attempts, honoring cancellation between attempts. The ceiling is
    /// fixed independent of `config.max_retries` — that field only bounds
    /// the underlying transport's own connection-level retry behavior, not
    /// this classify-and-retry loop.
    pub async fn probe(&self, text: &str, bypass_mask: bool) -> ProbeResult {
        let probe_text = if bypass_mask {
            text.to_string()
        } else {
            let masked = self.mask_manager.apply(text);
            debug_assert_eq!(masked.chars().count(), text.chars().count());
            masked
        };

        let max_attempts = HARD_ATTEMPT_CAP;
        let mut last_http_code: u16 = 0;

        for attempt in 0..max_attempts {
            if self.is_cancelled() {
                return ProbeResult::Error {
                    http_code: last_http_code,
                    is_unknown_error_code: false,
                };
            }

            if attempt > 0 {
                tokio::time::sleep(Self::backoff_delay(attempt as u32 - 1)).await;
                if self.is_cancelled() {
                    return ProbeResult::Error {
                        http_code: last_http_code,
                        is_unknown_error_code: false,
                    };
                }
            }

            let request = match request_builder::build(&probe_text, &self.config) {
                Ok(r) => r,
                Err(e) => {
                    warn!(target: "probe_engine", error = %e, "request build failed");
                    return ProbeResult::Error {
                        http_code: 0,
                        is_unknown_error_code: false,
                    };
                }
            };

            self.counters.requests.fetch_add(1, Ordering::Relaxed);

            let send_result = self
                .client
                .post(&request.url)
                .bearer_auth(&self.config.api_key)
                .json(&request.body)
                .send()
                .await;

            let response = match send_result {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(target: "probe_engine", error = %e, attempt, "transport error");
                    last_http_code = 0;
                    continue;
                }
            };

            let http_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            last_http_code = http_code;

            let result = response_analyzer::analyze(
                http_code,
                &body,
                &self.config.block_keywords,
                &self.config.block_status_codes,
                &self.config.retry_status_codes,
            );

            match &result {
                ProbeResult::Retry { .. } => {
                    continue;
                }
                ProbeResult::Safe => {
                    self.counters.safe.fetch_add(1, Ordering::Relaxed);
                    return result;
                }
                ProbeResult::Blocked { evidence, .. } => {
                    self.counters.blocked.fetch_add(1, Ordering::Relaxed);
                    self.record_evidence_once(evidence);
                    return result;
                }
                ProbeResult::Error {
                    http_code,
                    is_unknown_error_code,
                } => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    if *is_unknown_error_code {
                        self.record_unknown_code(*http_code);
                        self.emitter.unknown_status_code_found(*http_code, &body);
                    }
                    return result;
                }
            }
        }

        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        ProbeResult::Error {
            http_code: last_http_code,
            is_unknown_error_code: false,
        }
    }
}
