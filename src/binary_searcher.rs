//! Recursive bisection with a three-way probe, handing off to the micro
//! scanner once a region is small enough.
//!
//! Kept as an explicit recursive async fn rather than an iterative work
//! queue: the depth cap (30) and the strictly-shrinking-overlap invariant
//! already guarantee stack safety, and straight-line recursion reads more
//! directly than a hand-rolled queue here.

use crate::config::{AlgorithmMode, ScanConfig};
use crate::precision_scanner::{Finding, PrecisionScanner};
use crate::probe_engine::ProbeEngine;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

const MAX_DEPTH: usize = 30;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn clamp_overlap(value: usize, len: usize) -> usize {
    let hi = ((len.saturating_sub(1)) / 2).max(1);
    value.max(1).min(hi)
}

pub struct BinarySearcher {
    engine: Arc<ProbeEngine>,
    precision: Arc<PrecisionScanner>,
    config: Arc<ScanConfig>,
}

impl BinarySearcher {
    pub fn new(engine: Arc<ProbeEngine>, precision: Arc<PrecisionScanner>, config: Arc<ScanConfig>) -> Self {
        Self {
            engine,
            precision,
            config,
        }
    }

    /// Searches a `BLOCKED` chunk (`text`, located at `base_pos`) for the
    /// `Finding`s within it. Depth-bounded at 30; each recursion strictly
    /// shrinks the text length.
    pub async fn search(&self, text: &str, base_pos: usize) -> Vec<Finding> {
        self.search_inner(text.to_string(), base_pos, 0).await
    }

    fn search_inner(&self, text: String, base_pos: usize, depth: usize) -> BoxFuture<'_, Vec<Finding>> {
        Box::pin(async move {
            if depth >= MAX_DEPTH {
                warn!(target: "binary_searcher", depth, base_pos, "hit max recursion depth, recording coarse finding");
                let len = text.chars().count();
                return vec![Finding {
                    text,
                    start: base_pos,
                    end: base_pos + len,
                }];
            }
            if self.engine.is_cancelled() {
                return Vec::new();
            }

            let probe_result = self.engine.probe(&text, false).await;
            if probe_result.is_safe() {
                return Vec::new();
            }

            let chars: Vec<char> = text.chars().collect();
            let len = chars.len();

            let use_precision = self.config.algorithm_mode == AlgorithmMode::Precision
                || (self.config.algorithm_mode == AlgorithmMode::Hybrid
                    && len <= self.config.algorithm_switch_threshold);
            if use_precision {
                return self.precision.scan(&text, base_pos).await;
            }

            if len <= self.config.min_granularity {
                return vec![Finding {
                    text,
                    start: base_pos,
                    end: base_pos + len,
                }];
            }

            let mid = len / 2;
            let overlap = clamp_overlap(
                self.config.overlap_size.max(self.config.min_granularity.min(len / 4)),
                len,
            );

            let l_end = (mid + overlap).min(len);
            let l_text: String = chars[0..l_end].iter().collect();
            let r_start = mid.saturating_sub(overlap);
            let r_text: String = chars[r_start..len].iter().collect();

            if self.engine.is_cancelled() {
                return Vec::new();
            }

            let (l_result, r_result) =
                tokio::join!(self.engine.probe(&l_text, false), self.engine.probe(&r_text, false));
            let l_blocked = l_result.is_blocked();
            let r_blocked = r_result.is_blocked();

            let mut findings = Vec::new();
            if l_blocked {
                findings.extend(self.search_inner(l_text.clone(), base_pos, depth + 1).await);
            }
            if r_blocked {
                findings.extend(self.search_inner(r_text.clone(), base_pos + r_start, depth + 1).await);
            }

            if !l_blocked && !r_blocked {
                let m_start = mid.saturating_sub(overlap);
                let m_end = (mid + overlap).min(len);
                let m_text: String = chars[m_start..m_end].iter().collect();
                if m_text.chars().count() < len {
                    findings.extend(self.search_inner(m_text, base_pos + m_start, depth + 1).await);
                } else {
                    let start = base_pos + m_start;
                    let m_len = m_text.chars().count();
                    findings.push(Finding {
                        text: m_text,
                        start,
                        end: start + m_len,
                    });
                }
            }

            findings
        })
    }
}
