//! End-to-end scenarios run through `TextScanner` against a mocked
//! moderation endpoint.

use modreaper::config::AlgorithmMode;
use modreaper::events::EventEmitter;
use modreaper::text_scanner::TextScanner;
use modreaper::ScanConfig;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_config(api_url: String, mode: AlgorithmMode) -> ScanConfig {
    ScanConfig {
        api_url,
        api_key: "sk-test".to_string(),
        model: "gpt-test".to_string(),
        request_template: r#"{"model":"{{MODEL}}","messages":[{"role":"user","content":"{{TEXT}}"}]}"#
            .to_string(),
        block_status_codes: vec![400],
        retry_status_codes: vec![429, 502, 503, 504],
        block_keywords: vec!["forbidden".to_string()],
        concurrency: 4,
        timeout: 5,
        max_retries: 2,
        chunk_size: 30_000,
        overlap_size: 8,
        min_granularity: 1,
        algorithm_mode: mode,
        algorithm_switch_threshold: 20,
        name: "scenario-test".to_string(),
    }
}

async fn scanner_for(server_uri: String, mode: AlgorithmMode, config_patch: impl FnOnce(&mut ScanConfig)) -> TextScanner {
    let mut config = base_config(server_uri, mode);
    config_patch(&mut config);
    let emitter = Arc::new(EventEmitter::new(None, None));
    let cancel_flag = Arc::new(AtomicBool::new(false));
    TextScanner::new(config, emitter, cancel_flag).expect("valid config")
}

/// Scenario 1: a single keyword embedded in a short text is isolated
/// exactly, with the right offsets.
#[tokio::test]
async fn single_keyword_is_isolated() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("dangerous"))
        .respond_with(ResponseTemplate::new(200).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let scanner = scanner_for(server.uri(), AlgorithmMode::Precision, |_| {}).await;
    let results = scanner.scan("this text is dangerous today").await.unwrap();

    assert_eq!(results.results.len(), 1);
    let positions = results.results.get("dangerous").expect("keyword found");
    assert_eq!(positions.len(), 1);
    let (start, end) = positions[0];
    let chars: Vec<char> = "this text is dangerous today".chars().collect();
    let slice: String = chars[start..end].iter().collect();
    assert_eq!(slice, "dangerous");
}

/// Scenario 2: the same keyword occurs more than once; the Golden Flow
/// enumeration pass must report every occurrence, not just the one found
/// during localization.
#[tokio::test]
async fn multiple_occurrences_are_all_enumerated() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("kaboom"))
        .respond_with(ResponseTemplate::new(200).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let text = "kaboom at the start, and another kaboom near the end";
    let scanner = scanner_for(server.uri(), AlgorithmMode::Precision, |_| {}).await;
    let results = scanner.scan(text).await.unwrap();

    let positions = results.results.get("kaboom").expect("keyword found");
    assert_eq!(positions.len(), 2);
    let chars: Vec<char> = text.chars().collect();
    for (start, end) in positions {
        let slice: String = chars[*start..*end].iter().collect();
        assert_eq!(slice, "kaboom");
    }
}

/// Scenario 3: when a shorter keyword is itself a substring of a longer
/// blocked span, only the minimal form survives.
#[tokio::test]
async fn overlapping_candidates_collapse_to_the_minimal_form() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("cat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let text = "please concatenate these files";
    let scanner = scanner_for(server.uri(), AlgorithmMode::Precision, |_| {}).await;
    let results = scanner.scan(text).await.unwrap();

    assert_eq!(results.results.len(), 1, "only the minimal keyword should survive: {:?}", results.results);
    assert!(results.results.contains_key("cat"));
    assert!(!results.results.contains_key("concat"));
    assert!(!results.results.contains_key("concatenate"));
}

/// Scenario 4: a keyword embedded well inside a single oversized segment
/// is still found correctly once recursive bisection narrows in on it and
/// hands off to the precision scanner, regardless of where bisection
/// boundaries happen to fall relative to the keyword.
#[tokio::test]
async fn keyword_straddling_a_bisection_boundary_is_found() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("abcdef"))
        .respond_with(ResponseTemplate::new(200).set_body_string("forbidden"))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let text = "padding-padding-abcdef-padding-padding";
    let scanner = scanner_for(server.uri(), AlgorithmMode::Hybrid, |_| {}).await;
    let results = scanner.scan(text).await.unwrap();

    let positions = results.results.get("abcdef").expect("straddling keyword found");
    assert_eq!(positions.len(), 1);
    let chars: Vec<char> = text.chars().collect();
    let (start, end) = positions[0];
    let slice: String = chars[start..end].iter().collect();
    assert_eq!(slice, "abcdef");
}

/// Scenario 5: transient retryable failures resolve to a correct
/// classification once the endpoint recovers, without the caller seeing
/// the intermediate errors.
#[tokio::test]
async fn transient_failures_are_retried_to_a_final_classification() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("unstable"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("unstable"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let scanner = scanner_for(server.uri(), AlgorithmMode::Precision, |cfg| {
        cfg.block_keywords = Vec::new();
    })
    .await;
    let results = scanner.scan("the endpoint is unstable right now").await.unwrap();

    let positions = results.results.get("unstable").expect("keyword found after retries");
    assert_eq!(positions.len(), 1);
    assert!(results.api_calls >= 3, "expected at least 3 calls (2 retries + 1 success), got {}", results.api_calls);
}

/// Scenario 6: an HTTP status outside both the block and retry lists is
/// recorded as an unknown status code and the scan still completes
/// cleanly, reporting no finding for that region.
#[tokio::test]
async fn unknown_status_code_is_recorded_without_failing_the_scan() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("teapot"))
        .respond_with(ResponseTemplate::new(418).set_body_string("I'm a teapot"))
        .mount(&server)
        .await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let scanner = scanner_for(server.uri(), AlgorithmMode::Precision, |_| {}).await;
    let results = scanner.scan("a cup of teapot nonsense").await.unwrap();

    assert!(results.results.is_empty(), "418 is neither a block nor retry code: {:?}", results.results);
    assert!(results.unknown_status_codes.contains(&418));
    assert_eq!(*results.unknown_status_code_counts.get(&418).unwrap_or(&0), 1);
}
