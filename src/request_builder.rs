//! Shapes the remote HTTP request for a text segment: URL joining with a
//! single separator, template placeholder substitution, and `max_tokens`
//! injection after the template is parsed back into JSON.

use crate::config::ScanConfig;
use crate::errors::ScanError;
use serde_json::Value;

const MAX_TOKENS: u64 = 10;

/// `(url, body)` ready to hand to the HTTP client.
pub struct Request {
    pub url: String,
    pub body: Value,
}

/// JSON-escapes `text` the way a JSON string literal would, without
/// re-normalizing Unicode — `serde_json`'s string escaping already
/// preserves `text`'s char length semantics one-for-one modulo the escape
/// sequences themselves.
fn json_escape(text: &str) -> String {
    let quoted = serde_json::to_string(text).expect("string serialization cannot fail");
    quoted[1..quoted.len() - 1].to_string()
}

fn join_url(api_url: &str, path: &str) -> String {
    if api_url.ends_with('/') {
        format!("{api_url}{path}")
    } else {
        format!("{api_url}/{path}")
    }
}

/// Builds the `(url, body)` pair for probing `segment_text` under `config`.
pub fn build(segment_text: &str, config: &ScanConfig) -> Result<Request, ScanError> {
    if !(config.api_url.starts_with("http://") || config.api_url.starts_with("https://")) {
        return Err(ScanError::ConfigInvalid(format!(
            "api_url must be http(s), got '{}'",
            config.api_url
        )));
    }
    if config.api_key.trim().is_empty() {
        return Err(ScanError::ConfigMissingField("api_key".to_string()));
    }
    if config.model.trim().is_empty() {
        return Err(ScanError::ConfigMissingField("model".to_string()));
    }

    let url = join_url(&config.api_url, "chat/completions");

    let rendered = config
        .request_template
        .replace("{{TEXT}}", &json_escape(segment_text))
        .replace("{{MODEL}}", &json_escape(config.model.as_str()));

    if rendered.contains("{{") && rendered.contains("}}") {
        return Err(ScanError::ConfigInvalid(
            "request_template has unresolved placeholders after substitution".to_string(),
        ));
    }

    let mut body: Value = serde_json::from_str(&rendered).map_err(|e| {
        ScanError::ConfigInvalid(format!("request_template does not render to valid JSON: {e}"))
    })?;

    let obj = body.as_object_mut().ok_or_else(|| {
        ScanError::ConfigInvalid("request_template must render to a JSON object".to_string())
    })?;
    obj.insert("max_tokens".to_string(), Value::from(MAX_TOKENS));

    Ok(Request { url, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmMode;

    fn config(api_url: &str) -> ScanConfig {
        ScanConfig {
            api_url: api_url.to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-test".to_string(),
            request_template: r#"{"model":"{{MODEL}}","messages":[{"role":"user","content":"{{TEXT}}"}]}"#
                .to_string(),
            block_status_codes: vec![400],
            retry_status_codes: vec![429, 502, 503, 504],
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
    fn joins_url_with_single_separator() {
        let req = build("hello", &config("https://example.com/v1")).unwrap();
        assert_eq!(req.url, "https://example.com/v1/chat/completions");

        let req2 = build("hello", &config("https://example.com/v1/")).unwrap();
        assert_eq!(req2.url, "https://example.com/v1/chat/completions");
    }

    #[test]
    fn substitutes_text_and_model() {
        let req = build("hi \"there\"", &config("https://example.com/")).unwrap();
        assert_eq!(req.body["model"], "gpt-test");
        assert_eq!(req.body["messages"][0]["content"], "hi \"there\"");
        assert_eq!(req.body["max_tokens"], 10);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = build("hi", &config("ftp://example.com")).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_non_object_body() {
        let mut cfg = config("https://example.com/");
        cfg.request_template = "\"{{TEXT}}\"".to_string();
        let err = build("hi", &cfg).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid(_)));
    }

    #[test]
    fn rejects_invalid_json_template() {
        let mut cfg = config("https://example.com/");
        cfg.request_template = "{ not json {{TEXT}}".to_string();
        let err = build("hi", &cfg).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid(_)));
    }

    #[test]
    fn preserves_unicode_length_semantics() {
        let text = "轮奸测试";
        let escaped = json_escape(text);
        assert_eq!(escaped.chars().count(), text.chars().count());
    }
}
