//! CLI entry point for `modreaper`.
//!
//! Parses arguments into a `ScanConfig`, drives one `Session` through
//! `SessionCoordinator`, and renders throttled progress plus a colorized
//! final keyword/offset table via indicatif and colored.

use clap::Parser;
use colored::Colorize;
use modreaper::config::{AlgorithmMode, ScanConfig};
use modreaper::events::{ScanEvent, ScanEventKind};
use modreaper::session::{SessionCoordinator, SessionStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::signal;

mod args;
mod output;

const DEFAULT_REQUEST_TEMPLATE: &str = r#"{"model":"{{MODEL}}","messages":[{"role":"user","content":"{{TEXT}}"}]}"#;

fn parse_algorithm_mode(s: &str) -> Result<AlgorithmMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "binary" => Ok(AlgorithmMode::Binary),
        "precision" => Ok(AlgorithmMode::Precision),
        "hybrid" => Ok(AlgorithmMode::Hybrid),
        other => Err(format!("unknown algorithm_mode '{other}' (expected binary, precision, or hybrid)")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = args::Args::parse();

    let text = std::fs::read_to_string(&args.text_file)?;
    let request_template = match &args.request_template {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_REQUEST_TEMPLATE.to_string(),
    };
    let algorithm_mode = parse_algorithm_mode(&args.algorithm_mode)?;

    let config = ScanConfig {
        api_url: args.api_url.clone(),
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        request_template,
        block_status_codes: args.block_status_codes.clone(),
        retry_status_codes: args.retry_status_codes.clone(),
        block_keywords: args.block_keywords.clone(),
        concurrency: args.concurrency,
        timeout: args.timeout,
        max_retries: args.max_retries,
        chunk_size: args.chunk_size,
        overlap_size: args.overlap_size,
        min_granularity: args.min_granularity,
        algorithm_mode,
        algorithm_switch_threshold: args.algorithm_switch_threshold,
        name: "cli".to_string(),
    };

    let coordinator = SessionCoordinator::new();
    let session = coordinator.create_session("cli-scan".to_string(), config);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ScanEvent>();

    let progress_bar = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new(text.chars().count() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message("Scanning...");
        Some(pb)
    };

    let session_for_signal = session.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\nReceived Ctrl+C, cancelling scan...");
            session_for_signal.cancel_scan();
        }
    });

    let sink: Arc<dyn modreaper::events::EventSink> = Arc::new(tx);
    session.start_scan(text, Some(sink))?;

    while let Some(event) = rx.recv().await {
        match event.kind {
            ScanEventKind::Progress { scanned, total, .. } => {
                if let Some(ref pb) = progress_bar {
                    pb.set_length(total.max(1) as u64);
                    pb.set_position(scanned as u64);
                }
            }
            ScanEventKind::Log { level, message } => {
                let line = format!("[{level:?}] {message}");
                if let Some(ref pb) = progress_bar {
                    pb.suspend(|| println!("{line}"));
                } else {
                    println!("{line}");
                }
            }
            ScanEventKind::SensitiveFoundBatch { findings } => {
                for finding in findings {
                    let line = format!(
                        "{} {}",
                        finding.keyword.red().bold(),
                        format!("[{}..{}]", finding.start, finding.end).cyan()
                    );
                    if let Some(ref pb) = progress_bar {
                        pb.suspend(|| println!("{line}"));
                    } else {
                        println!("{line}");
                    }
                }
            }
            ScanEventKind::UnknownStatusCode { status_code, .. } => {
                let line = format!("{} unknown status code {status_code}", "warning:".yellow().bold());
                if let Some(ref pb) = progress_bar {
                    pb.suspend(|| println!("{line}"));
                } else {
                    println!("{line}");
                }
            }
            ScanEventKind::ScanComplete { .. } | ScanEventKind::ScanCancelled { .. } | ScanEventKind::ScanError { .. } => {
                break;
            }
            ScanEventKind::ScanStart { .. } => {}
        }
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_and_clear();
    }

    session.await_completion().await;

    match session.status() {
        SessionStatus::Completed => {
            let results = session.results().expect("completed session must carry results");
            println!("{}", output::format_results(&results));
            println!("{}", output::format_summary(&results));
            if let Some(output_file) = &args.output_file {
                output::save_results_json(&results, output_file)?;
                println!("Results saved to: {output_file}");
            }
        }
        SessionStatus::Canceled => {
            println!("{}", "Scan cancelled.".yellow().bold());
        }
        SessionStatus::Error => {
            let err = session.error();
            eprintln!("{} {:?}", "Scan failed:".red().bold(), err);
            std::process::exit(1);
        }
        _ => {}
    }

    Ok(())
}
