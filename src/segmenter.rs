//! Splits input text into overlapping windows for coarse probing.
//!
//! Windows are computed over chars, not bytes, so positions line up with
//! every other component's coordinate system.

use tracing::warn;

/// One window over the original input: `text` is `chars[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

pub struct TextSegmenter {
    chunk_size: usize,
    overlap_size: usize,
}

impl TextSegmenter {
    /// Clamps an invalid `(chunk_size, overlap_size)` pair to a safe
    /// configuration, logging a warning rather than failing outright.
    pub fn new(chunk_size: usize, overlap_size: usize) -> Self {
        let mut chunk_size = chunk_size;
        let mut overlap_size = overlap_size;

        if chunk_size == 0 {
            warn!(target: "segmenter", "chunk_size must be > 0, clamping to 1");
            chunk_size = 1;
        }
        if overlap_size >= chunk_size {
            let clamped = chunk_size.saturating_sub(1);
            warn!(
                target: "segmenter",
                chunk_size, overlap_size, clamped, "overlap_size >= chunk_size, clamping"
            );
            overlap_size = clamped;
        }

        Self {
            chunk_size,
            overlap_size,
        }
    }

    /// Splits `text` into an ordered, finite sequence of overlapping
    /// windows. `next_start = prev_end - overlap`, clipped at end-of-text,
    /// always covering the final tail.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if len == 0 {
            return Vec::new();
        }

        let mut segments = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(len);
            segments.push(Segment {
                text: chars[start..end].iter().collect(),
                start,
                end,
            });
            if end >= len {
                break;
            }
            let next_start = end.saturating_sub(self.overlap_size);
            // Guard against a stalled cursor (overlap_size == chunk_size
            // would otherwise loop forever); `new` already prevents this,
            // but keep the fuse in case callers mutate fields directly.
            start = if next_start > start { next_start } else { start + 1 };
        }
        segments
    }
}
