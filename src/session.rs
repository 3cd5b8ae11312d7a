//! Per-scan lifecycle: cancellation, status/results snapshots.
//!
//! WebSocket/HTTP transport is out of scope here; this module owns only
//! the in-process lifecycle and the typed snapshots a transport layer
//! would serve.

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::events::{EventEmitter, EventSink, ScanEvent, ScanEventKind};
use crate::text_scanner::{ScanResults, TextScanner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Scanning,
    Completed,
    Error,
    Canceled,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percent: f64,
}

pub struct SessionState {
    pub status: SessionStatus,
    pub progress: Progress,
    pub results: Option<ScanResults>,
    pub log_buffer: Vec<String>,
    pub error: Option<ScanError>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            progress: Progress::default(),
            results: None,
            log_buffer: Vec::new(),
            error: None,
        }
    }
}

/// Feeds scan events both into the session's own polling state and, if
/// present, onward to a caller-supplied transport sink.
struct SessionSink {
    state: Arc<Mutex<SessionState>>,
    forward: Option<Arc<dyn EventSink>>,
}

impl EventSink for SessionSink {
    fn emit(&self, event: ScanEvent) {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            match &event.kind {
                ScanEventKind::Progress { scanned, total, percentage, .. } => {
                    state.progress = Progress {
                        current: *scanned,
                        total: *total,
                        percent: *percentage,
                    };
                }
                ScanEventKind::Log { message, .. } => {
                    state.log_buffer.push(message.clone());
                }
                _ => {}
            }
        }
        if let Some(forward) = &self.forward {
            forward.emit(event);
        }
    }
}

pub struct Session {
    id: String,
    config: ScanConfig,
    state: Arc<Mutex<SessionState>>,
    cancel_flag: Arc<AtomicBool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    fn new(id: String, config: ScanConfig) -> Self {
        Self {
            id,
            config,
            state: Arc::new(Mutex::new(SessionState::default())),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().expect("session state lock poisoned").status
    }

    pub fn progress(&self) -> Progress {
        self.state.lock().expect("session state lock poisoned").progress
    }

    pub fn results(&self) -> Option<ScanResults> {
        self.state.lock().expect("session state lock poisoned").results.clone()
    }

    pub fn error(&self) -> Option<ScanError> {
        self.state.lock().expect("session state lock poisoned").error.clone()
    }

    /// Starts a scan task. Refuses if one is already running.
    pub fn start_scan(self: &Arc<Self>, text: String, sink: Option<Arc<dyn EventSink>>) -> Result<(), ScanError> {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            if state.status == SessionStatus::Scanning {
                return Err(ScanError::SessionAlreadyRunning(self.id.clone()));
            }
            *state = SessionState {
                status: SessionStatus::Scanning,
                ..SessionState::default()
            };
        }
        self.cancel_flag.store(false, Ordering::Relaxed);

        let session_sink: Arc<dyn EventSink> = Arc::new(SessionSink {
            state: self.state.clone(),
            forward: sink,
        });
        let emitter = Arc::new(EventEmitter::new(Some(session_sink), Some(self.id.clone())));
        let scanner = TextScanner::new(self.config.clone(), emitter, self.cancel_flag.clone())?;

        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            match scanner.scan(&text).await {
                Ok(results) => {
                    let mut s = state.lock().expect("session state lock poisoned");
                    s.status = SessionStatus::Completed;
                    s.results = Some(results);
                }
                Err(ScanError::ScanCancelled(_)) => {
                    let mut s = state.lock().expect("session state lock poisoned");
                    s.status = SessionStatus::Canceled;
                }
                Err(e) => {
                    let mut s = state.lock().expect("session state lock poisoned");
                    s.status = SessionStatus::Error;
                    s.error = Some(e);
                }
            }
        });
        *self.task.lock().expect("task lock poisoned") = Some(handle);
        Ok(())
    }

    /// Sets the cooperative stop flag consulted by the searcher and emitter.
    pub fn cancel_scan(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    /// Awaits outstanding scan cleanup.
    async fn shutdown(&self) {
        self.cancel_scan();
        let handle = self.task.lock().expect("task lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Blocks until the spawned scan task has set its terminal status,
    /// without requesting cancellation. Callers that drive their own event
    /// loop off the same scan (e.g. the CLI) should await this after their
    /// loop observes a terminal event, so `status()`/`results()` are read
    /// only once the task itself has actually finished writing them.
    pub async fn await_completion(&self) {
        let handle = self.task.lock().expect("task lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Owns every live `Session`. One session per scan; sessions are created
/// explicitly and torn down explicitly.
#[derive(Default)]
pub struct SessionCoordinator {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, id: String, config: ScanConfig) -> Arc<Session> {
        let session = Arc::new(Session::new(id.clone(), config));
        self.sessions.lock().expect("coordinator lock poisoned").insert(id, session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Result<Arc<Session>, ScanError> {
        self.sessions
            .lock()
            .expect("coordinator lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ScanError::SessionNotFound(id.to_string()))
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), ScanError> {
        let session = self
            .sessions
            .lock()
            .expect("coordinator lock poisoned")
            .remove(id)
            .ok_or_else(|| ScanError::SessionNotFound(id.to_string()))?;
        session.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmMode;

    fn test_config(api_url: String) -> ScanConfig {
        ScanConfig {
            api_url,
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            request_template: r#"{"model":"{{MODEL}}","messages":[{"role":"user","content":"{{TEXT}}"}]}"#
                .to_string(),
            block_status_codes: vec![400],
            retry_status_codes: vec![429, 502, 503, 504],
            block_keywords: vec![],
            concurrency: 4,
            timeout: 5,
            max_retries: 1,
            chunk_size: 30_000,
            overlap_size: 12,
            min_granularity: 1,
            algorithm_mode: AlgorithmMode::Hybrid,
            algorithm_switch_threshold: 35,
            name: "test".to_string(),
        }
    }

    #[test]
    fn session_not_found_for_unknown_id() {
        let coordinator = SessionCoordinator::new();
        let err = coordinator.get("missing").unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn start_scan_refuses_when_already_running() {
        let coordinator = SessionCoordinator::new();
        let session = coordinator.create_session("s1".to_string(), test_config("http://127.0.0.1:1".to_string()));
        session.start_scan("hello world".to_string(), None).unwrap();
        let err = session.start_scan("again".to_string(), None).unwrap_err();
        assert_eq!(err.code(), "SESSION_ALREADY_RUNNING");
        coordinator.delete_session("s1").await.unwrap();
    }

    #[tokio::test]
    async fn delete_session_removes_it() {
        let coordinator = SessionCoordinator::new();
        coordinator.create_session("s2".to_string(), test_config("http://127.0.0.1:1".to_string()));
        coordinator.delete_session("s2").await.unwrap();
        assert!(coordinator.get("s2").is_err());
    }
}
