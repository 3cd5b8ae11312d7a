//! Command-line arguments, parsed with `clap` into knobs for a `ScanConfig`.

use clap::Parser;

/// Discovers a remote moderation endpoint's blocking keywords from a text file.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base URL of the moderation endpoint (chat/completions is appended).
    #[arg(short, long)]
    pub api_url: String,

    /// Bearer token sent as `Authorization: Bearer {api_key}`.
    #[arg(long, env = "MODREAPER_API_KEY")]
    pub api_key: String,

    /// Model name substituted for `{{MODEL}}` in the request template.
    #[arg(short, long, default_value = "gpt-3.5-turbo")]
    pub model: String,

    /// Path to a JSON request body template with `{{TEXT}}`/`{{MODEL}}` placeholders.
    #[arg(long)]
    pub request_template: Option<String>,

    /// Path to the text file to scan.
    #[arg(short, long)]
    pub text_file: String,

    /// HTTP status codes that indicate a block.
    #[arg(long, value_delimiter = ',', default_value = "400")]
    pub block_status_codes: Vec<u16>,

    /// HTTP status codes that should be retried.
    #[arg(long, value_delimiter = ',', default_value = "429,502,503,504")]
    pub retry_status_codes: Vec<u16>,

    /// Literal substrings in the response body that indicate a block.
    #[arg(long, value_delimiter = ',')]
    pub block_keywords: Vec<String>,

    /// Maximum in-flight probes.
    #[arg(short, long, default_value_t = 15)]
    pub concurrency: usize,

    /// Per-attempt HTTP timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Retry attempts before giving up on a probe.
    #[arg(long, default_value_t = 3)]
    pub max_retries: usize,

    /// Chunk size (chars) for the initial text segmentation.
    #[arg(long, default_value_t = 30_000)]
    pub chunk_size: usize,

    /// Overlap (chars) between adjacent chunks and bisection windows.
    #[arg(long, default_value_t = 12)]
    pub overlap_size: usize,

    /// Smallest span the bisection will record as a finding on its own.
    #[arg(long, default_value_t = 1)]
    pub min_granularity: usize,

    /// Localization algorithm: binary, precision, or hybrid.
    #[arg(long, default_value = "hybrid")]
    pub algorithm_mode: String,

    /// Bisection span length at which hybrid mode hands off to the precision scanner.
    #[arg(long, default_value_t = 35)]
    pub algorithm_switch_threshold: usize,

    /// Hide the progress bar during the scan.
    #[arg(long)]
    pub no_progress: bool,

    /// Write the final scan results as JSON to this path.
    #[arg(long)]
    pub output_file: Option<String>,
}
