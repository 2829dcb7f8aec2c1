//! Stream Segmenter
//!
//! The model's token stream arrives in small increments, and the delimiter
//! markers can be split arbitrarily across increments (`<exec` then `ute>`).
//! The segmenter therefore buffers an unclassified tail and re-scans it on
//! every feed instead of scanning each increment in isolation.

use crate::segment::{Segment, SegmentKind};

/// Marker opening a code fragment
pub const DEFAULT_OPEN_MARKER: &str = "<execute>";
/// Marker closing a code fragment
pub const DEFAULT_CLOSE_MARKER: &str = "</execute>";

/// Cap on the unclassified tail; see [`StreamSegmenter::with_max_pending`]
const DEFAULT_MAX_PENDING: usize = 1024 * 1024;

/// Incrementally classifies a growing text stream into ordered
/// `text` / `code` segments based on a pair of delimiter markers.
///
/// One segmenter instance serves one stream. Invariant: the pending buffer
/// never contains a complete open..close marker pair when a call returns.
#[derive(Debug, Clone)]
pub struct StreamSegmenter {
    /// Unclassified tail of the stream received so far
    pending: String,
    open_marker: String,
    close_marker: String,
    max_pending: usize,
}

impl Default for StreamSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSegmenter {
    /// Create a segmenter with the default `<execute>` / `</execute>` markers
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_OPEN_MARKER, DEFAULT_CLOSE_MARKER)
    }

    /// Create a segmenter with custom delimiter markers
    pub fn with_markers(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            pending: String::new(),
            open_marker: open.into(),
            close_marker: close.into(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Override the pending-buffer cap.
    ///
    /// When the tail grows past the cap while holding no open marker, the
    /// buffered text is emitted early instead of growing without bound. A
    /// buffered open marker defers the cap until its pair completes or the
    /// stream is flushed, so a marker pair is never torn.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// The unclassified tail buffered so far
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Consume one stream increment and return the segments it completed.
    ///
    /// Emits a `text` segment for anything before each completed marker pair
    /// and a `code` segment for the pair's body, left to right, until no
    /// complete pair remains. The remaining tail stays buffered. A close
    /// marker with no preceding open marker is inert. Nesting is not
    /// supported: the first open marker pairs with the first close marker
    /// that follows it.
    pub fn feed(&mut self, delta: &str) -> Vec<Segment> {
        self.pending.push_str(delta);

        let mut segments = Vec::new();
        loop {
            let Some(open) = self.pending.find(&self.open_marker) else {
                break;
            };
            let code_start = open + self.open_marker.len();
            let Some(close) = self.pending[code_start..].find(&self.close_marker) else {
                break;
            };

            emit(&mut segments, SegmentKind::Text, &self.pending[..open]);
            emit(
                &mut segments,
                SegmentKind::Code,
                &self.pending[code_start..code_start + close],
            );

            let after = code_start + close + self.close_marker.len();
            self.pending.drain(..after);
        }

        self.enforce_cap(&mut segments);
        segments
    }

    /// Finalize buffered text and append a `tool` segment.
    ///
    /// Called when the orchestration loop has a code-execution result ready:
    /// any text accumulated since the last code segment is emitted first so
    /// the transcript order matches arrival order.
    pub fn flush_for_tool_result(&mut self, result: &str) -> Vec<Segment> {
        let mut segments = Vec::new();
        emit(&mut segments, SegmentKind::Text, &self.pending);
        self.pending.clear();
        emit(&mut segments, SegmentKind::Tool, result);
        segments
    }

    /// Drain any remaining buffered text at stream end. Idempotent.
    pub fn flush(&mut self) -> Vec<Segment> {
        let mut segments = Vec::new();
        emit(&mut segments, SegmentKind::Text, &self.pending);
        self.pending.clear();
        segments
    }

    /// Early-emit an oversized tail that cannot be part of a code fragment.
    ///
    /// Keeps the last `open_marker.len() - 1` bytes buffered so a marker
    /// split across the cap boundary still pairs up later.
    fn enforce_cap(&mut self, segments: &mut Vec<Segment>) {
        if self.pending.len() <= self.max_pending || self.pending.contains(&self.open_marker) {
            return;
        }

        let keep = self.open_marker.len().saturating_sub(1).min(self.pending.len());
        let mut split = self.pending.len() - keep;
        while !self.pending.is_char_boundary(split) {
            split -= 1;
        }

        emit(segments, SegmentKind::Text, &self.pending[..split]);
        self.pending.drain(..split);
    }
}

/// Push a segment unless its trimmed content is empty
fn emit(segments: &mut Vec<Segment>, kind: SegmentKind, raw: &str) {
    let segment = Segment::new(kind, raw);
    if !segment.is_empty() {
        segments.push(segment);
    }
}
