//! Scan configuration: the record the rest of the engine treats as given.
//!
//! Layered loading/validation of presets and settings files lives outside
//! this crate; what this module owns is normalizing whatever record a
//! caller hands in — aliasing legacy field names and enforcing the one
//! invariant the rest of the pipeline depends on
//! (`algorithm_switch_threshold > 2 * overlap_size`).

use crate::errors::ScanError;
use serde::{Deserialize, Serialize};

/// Which family of localization algorithm the `BinarySearcher` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmMode {
    /// Always bisect down to `min_granularity`, never hand off to the micro scanner.
    Binary,
    /// Always run the bidirectional squeeze, skipping bisection entirely.
    Precision,
    /// Bisect until `len <= algorithm_switch_threshold`, then hand off (default).
    Hybrid,
}

impl Default for AlgorithmMode {
    fn default() -> Self {
        AlgorithmMode::Hybrid
    }
}

fn default_chunk_size() -> usize {
    30_000
}
fn default_overlap_size() -> usize {
    12
}
fn default_concurrency() -> usize {
    15
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retries() -> usize {
    3
}
fn default_min_granularity() -> usize {
    1
}
fn default_switch_threshold() -> usize {
    35
}
fn default_retry_status_codes() -> Vec<u16> {
    vec![429, 502, 503, 504]
}

/// Immutable per-scan configuration. Built directly by callers, or
/// deserialized from whatever layered config source owns the presets/
/// settings JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub api_url: String,

    pub api_key: String,

    #[serde(alias = "api_model")]
    pub model: String,

    pub request_template: String,

    #[serde(default)]
    pub block_status_codes: Vec<u16>,

    #[serde(default = "default_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,

    #[serde(default)]
    pub block_keywords: Vec<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(alias = "timeout_seconds", default = "default_timeout")]
    pub timeout: u64,

    /// Transport-level retry budget (connection resets, DNS hiccups), not
    /// the classify-and-retry loop in `ProbeEngine::probe` — that loop's
    /// ceiling is fixed at 5 attempts regardless of this value.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_overlap_size")]
    pub overlap_size: usize,

    #[serde(default = "default_min_granularity")]
    pub min_granularity: usize,

    #[serde(default)]
    pub algorithm_mode: AlgorithmMode,

    #[serde(default = "default_switch_threshold")]
    pub algorithm_switch_threshold: usize,

    /// Which rule bundle produced this config; carried for logging only.
    #[serde(alias = "preset", default)]
    pub name: String,
}

impl ScanConfig {
    /// Validates and normalizes this config, enforcing the one invariant the
    /// `BinarySearcher`/`PrecisionScanner` handoff depends on to terminate:
    /// `algorithm_switch_threshold > 2 * overlap_size`.
    pub fn normalize(mut self) -> Result<Self, ScanError> {
        if self.api_url.trim().is_empty() {
            return Err(ScanError::ConfigMissingField("api_url".into()));
        }
        if self.api_key.trim().is_empty() {
            return Err(ScanError::ConfigMissingField("api_key".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ScanError::ConfigMissingField("model".into()));
        }

        self.api_url = self.api_url.trim().to_string();
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ScanError::ConfigInvalid(format!(
                "api_url must start with http:// or https://, got '{}'",
                self.api_url
            )));
        }

        if self.concurrency == 0 {
            return Err(ScanError::ConfigInvalid(
                "concurrency must be >= 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ScanError::ConfigInvalid(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.overlap_size >= self.chunk_size {
            return Err(ScanError::ConfigInvalid(format!(
                "overlap_size ({}) must be smaller than chunk_size ({})",
                self.overlap_size, self.chunk_size
            )));
        }
        if self.algorithm_switch_threshold <= 2 * self.overlap_size {
            return Err(ScanError::ConfigInvalid(format!(
                "algorithm_switch_threshold ({}) must be > 2 * overlap_size ({})",
                self.algorithm_switch_threshold,
                2 * self.overlap_size
            )));
        }

        Ok(self)
    }

    /// A copy of this config with credentials redacted, suitable for the
    /// `scan_start` event's `config` field.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "api_url": self.api_url,
            "model": self.model,
            "chunk_size": self.chunk_size,
            "overlap_size": self.overlap_size,
            "concurrency": self.concurrency,
            "timeout": self.timeout,
            "max_retries": self.max_retries,
            "min_granularity": self.min_granularity,
            "algorithm_mode": self.algorithm_mode,
            "algorithm_switch_threshold": self.algorithm_switch_threshold,
            "block_status_codes": self.block_status_codes,
            "retry_status_codes": self.retry_status_codes,
            "block_keywords": self.block_keywords.len(),
            "name": self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ScanConfig {
        ScanConfig {
            api_url: "https://example.com/v1/".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            request_template: "{\"model\":\"{{MODEL}}\",\"messages\":[{\"role\":\"user\",\"content\":\"{{TEXT}}\"}]}".to_string(),
            block_status_codes: vec![400],
            retry_status_codes: default_retry_status_codes(),
            block_keywords: vec![],
            concurrency: 15,
            timeout: 30,
            max_retries: 3,
            chunk_size: 30_000,
            overlap_size: 12,
            min_granularity: 1,
            algorithm_mode: AlgorithmMode::Hybrid,
            algorithm_switch_threshold: 35,
            name: "default".to_string(),
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(base_config().normalize().is_ok());
    }

    #[test]
    fn rejects_threshold_not_exceeding_twice_overlap() {
        let mut cfg = base_config();
        cfg.overlap_size = 20;
        cfg.algorithm_switch_threshold = 40;
        let err = cfg.normalize().unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn rejects_missing_credentials() {
        let mut cfg = base_config();
        cfg.api_key = String::new();
        let err = cfg.normalize().unwrap_err();
        assert_eq!(err.code(), "CONFIG_MISSING_FIELD");
    }

    #[test]
    fn rejects_non_http_url() {
        let mut cfg = base_config();
        cfg.api_url = "ftp://example.com".to_string();
        let err = cfg.normalize().unwrap_err();
        assert_eq!(err.code(), "CONFIG_INVALID");
    }

    #[test]
    fn aliases_deserialize_correctly() {
        let json = serde_json::json!({
            "api_url": "https://example.com/",
            "api_key": "key",
            "api_model": "gpt-test",
            "request_template": "{}",
            "timeout_seconds": 45,
            "preset": "strict",
        });
        let cfg: ScanConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.model, "gpt-test");
        assert_eq!(cfg.timeout, 45);
        assert_eq!(cfg.name, "strict");
        assert_eq!(cfg.retry_status_codes, default_retry_status_codes());
    }

    #[test]
    fn redacted_omits_api_key() {
        let cfg = base_config();
        let redacted = cfg.redacted();
        assert!(redacted.get("api_key").is_none());
        assert_eq!(redacted["api_url"], "https://example.com/v1/");
    }
}
