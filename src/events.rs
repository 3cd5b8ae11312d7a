//! Typed scan events, throttling, and batching.
//!
//! The emitter owns no transport of its own — a caller plugs in a sink; a
//! missing sink means events are logged and dropped, never buffered
//! forever.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(200);
const SMALL_INPUT_THRESHOLD: usize = 100;
const FINDINGS_FLUSH_COUNT: usize = 10;
const FINDINGS_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingWire {
    pub keyword: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ScanEventKind {
    ScanStart {
        total_length: usize,
        segment_size: usize,
        config: Value,
    },
    Progress {
        scanned: usize,
        total: usize,
        percentage: f64,
        sensitive_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<Value>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    SensitiveFoundBatch {
        findings: Vec<FindingWire>,
    },
    UnknownStatusCode {
        status_code: u16,
        response_snippet: String,
    },
    ScanComplete {
        sensitive_count: usize,
        total_requests: usize,
        unknown_status_codes: Vec<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unknown_status_code_counts: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sensitive_word_evidence: Option<Value>,
        results: Value,
        duration_text: String,
        duration_seconds: f64,
    },
    ScanCancelled {
        reason: String,
    },
    ScanError {
        error_message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanEvent {
    #[serde(flatten)]
    pub kind: ScanEventKind,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// The transport a scan's events are pushed onto. Implementations must not
/// block the caller for long — the emitter calls this inline.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        let _ = self.send(event);
    }
}

/// Truncates a response body to the `response_snippet` size the wire
/// contract allows for `unknown_status_code` events.
pub fn truncate_snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        body.chars().take(MAX).collect()
    }
}

pub struct EventEmitter {
    sink: Option<Arc<dyn EventSink>>,
    session_id: Option<String>,
    last_progress_emit: Mutex<Option<Instant>>,
    findings_buffer: Mutex<Vec<FindingWire>>,
    last_flush: Mutex<Instant>,
}

impl EventEmitter {
    pub fn new(sink: Option<Arc<dyn EventSink>>, session_id: Option<String>) -> Self {
        Self {
            sink,
            session_id,
            last_progress_emit: Mutex::new(None),
            findings_buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
        }
    }

    fn emit(&self, kind: ScanEventKind) {
        match &self.sink {
            Some(sink) => sink.emit(ScanEvent {
                kind,
                timestamp: Utc::now().to_rfc3339(),
                session_id: self.session_id.clone(),
            }),
            None => warn!(target: "event_emitter", "no sink configured, dropping event"),
        }
    }

    pub fn scan_started(&self, total_length: usize, segment_size: usize, config: Value) {
        self.emit(ScanEventKind::ScanStart {
            total_length,
            segment_size,
            config,
        });
    }

    /// Emits a progress update, throttled to at most 5/s unless `force`,
    /// the scan is complete, or the total input is small enough that
    /// throttling would hide all visible movement.
    pub fn progress_updated(
        &self,
        scanned: usize,
        total: usize,
        sensitive_count: usize,
        results: Option<Value>,
        force: bool,
    ) {
        let percentage = if total == 0 {
            100.0
        } else {
            (scanned as f64 / total as f64) * 100.0
        };
        let is_complete = scanned >= total;
        let small_input = total <= SMALL_INPUT_THRESHOLD;

        let mut last = self.last_progress_emit.lock().expect("emitter lock poisoned");
        let due = last.map_or(true, |t| t.elapsed() >= PROGRESS_MIN_INTERVAL);
        if !(force || is_complete || small_input || due) {
            return;
        }
        *last = Some(Instant::now());
        drop(last);

        self.emit(ScanEventKind::Progress {
            scanned,
            total,
            percentage,
            sensitive_count,
            results,
        });
    }

    pub fn log_message(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(ScanEventKind::Log {
            level,
            message: message.into(),
        });
    }

    /// Buffers a finding; flushes the batch once it reaches 10 items or
    /// 500ms have passed since the last flush.
    pub fn sensitive_found(&self, keyword: impl Into<String>, start: usize, end: usize) {
        let mut buf = self.findings_buffer.lock().expect("emitter lock poisoned");
        buf.push(FindingWire {
            keyword: keyword.into(),
            start,
            end,
        });

        let stale = self.last_flush.lock().expect("emitter lock poisoned").elapsed() >= FINDINGS_FLUSH_INTERVAL;
        if buf.len() >= FINDINGS_FLUSH_COUNT || stale {
            let findings = std::mem::take(&mut *buf);
            drop(buf);
            *self.last_flush.lock().expect("emitter lock poisoned") = Instant::now();
            self.emit(ScanEventKind::SensitiveFoundBatch { findings });
        }
    }

    pub fn unknown_status_code_found(&self, status_code: u16, response_body: &str) {
        self.emit(ScanEventKind::UnknownStatusCode {
            status_code,
            response_snippet: truncate_snippet(response_body),
        });
    }

    pub fn error_occurred(&self, message: impl Into<String>) {
        self.log_message(LogLevel::Error, message);
    }

    pub fn warning_occurred(&self, message: impl Into<String>) {
        self.log_message(LogLevel::Warning, message);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn scan_completed(
        &self,
        sensitive_count: usize,
        total_requests: usize,
        unknown_status_codes: Vec<u16>,
        unknown_status_code_counts: Option<Value>,
        sensitive_word_evidence: Option<Value>,
        results: Value,
        duration_text: String,
        duration_seconds: f64,
    ) {
        self.flush_all();
        self.emit(ScanEventKind::ScanComplete {
            sensitive_count,
            total_requests,
            unknown_status_codes,
            unknown_status_code_counts,
            sensitive_word_evidence,
            results,
            duration_text,
            duration_seconds,
        });
    }

    pub fn scan_cancelled(&self, reason: impl Into<String>) {
        self.flush_all();
        self.emit(ScanEventKind::ScanCancelled {
            reason: reason.into(),
        });
    }

    pub fn scan_error(&self, error_message: impl Into<String>, error_code: Option<String>) {
        self.flush_all();
        self.emit(ScanEventKind::ScanError {
            error_message: error_message.into(),
            error_code,
        });
    }

    /// Flushes any buffered findings immediately. Always invoked before a
    /// terminal event, so no finding is lost behind an unflushed batch.
    pub fn flush_all(&self) {
        let mut buf = self.findings_buffer.lock().expect("emitter lock poisoned");
        if !buf.is_empty() {
            let findings = std::mem::take(&mut *buf);
            drop(buf);
            self.emit(ScanEventKind::SensitiveFoundBatch { findings });
        }
        *self.last_flush.lock().expect("emitter lock poisoned") = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CollectingSink {
        events: StdMutex<Vec<ScanEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: ScanEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn emitter_with_collector() -> (EventEmitter, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink {
            events: StdMutex::new(Vec::new()),
        });
        let emitter = EventEmitter::new(Some(sink.clone() as Arc<dyn EventSink>), None);
        (emitter, sink)
    }

    #[test]
    fn progress_always_emits_at_completion() {
        let (emitter, sink) = emitter_with_collector();
        emitter.progress_updated(1000, 1000, 0, None, false);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn progress_always_emits_for_small_inputs() {
        let (emitter, sink) = emitter_with_collector();
        emitter.progress_updated(1, 50, 0, None, false);
        emitter.progress_updated(2, 50, 0, None, false);
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn progress_throttles_large_inputs() {
        let (emitter, sink) = emitter_with_collector();
        emitter.progress_updated(1, 10_000, 0, None, false);
        emitter.progress_updated(2, 10_000, 0, None, false);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn progress_force_bypasses_throttle() {
        let (emitter, sink) = emitter_with_collector();
        emitter.progress_updated(1, 10_000, 0, None, false);
        emitter.progress_updated(2, 10_000, 0, None, true);
        assert_eq!(sink.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn findings_flush_at_ten() {
        let (emitter, sink) = emitter_with_collector();
        for i in 0..9 {
            emitter.sensitive_found("x", i, i + 1);
        }
        assert_eq!(sink.events.lock().unwrap().len(), 0);
        emitter.sensitive_found("x", 9, 10);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn flush_all_emits_partial_batch() {
        let (emitter, sink) = emitter_with_collector();
        emitter.sensitive_found("x", 0, 1);
        emitter.flush_all();
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn missing_sink_drops_events_without_panic() {
        let emitter = EventEmitter::new(None, None);
        emitter.scan_started(10, 5, Value::Null);
    }

    #[test]
    fn snippet_truncates_at_200_chars() {
        let long = "a".repeat(500);
        assert_eq!(truncate_snippet(&long).chars().count(), 200);
    }
}
