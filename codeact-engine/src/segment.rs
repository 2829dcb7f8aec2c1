//! Segment data model
//!
//! A segment is one classified unit of the agent's output stream. Segments are
//! emitted in arrival order; that order is exactly the presentation order shown
//! to the end user and fed back to the model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Plain prose from the model
    Text,
    /// An executable code fragment extracted from the stream
    Code,
    /// Output of executing a code fragment
    Tool,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentKind::Text => "text",
            SegmentKind::Code => "code",
            SegmentKind::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}

/// One classified unit of the agent's output stream.
///
/// Serializes as `{"type": "...", "content": "..."}` so transcripts match the
/// chunk shape consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub content: String,
}

impl Segment {
    /// Create a segment of the given kind; content is trimmed
    pub fn new(kind: SegmentKind, content: impl AsRef<str>) -> Self {
        Self {
            kind,
            content: content.as_ref().trim().to_string(),
        }
    }

    /// Create a text segment (trimmed)
    pub fn text(content: impl AsRef<str>) -> Self {
        Self::new(SegmentKind::Text, content)
    }

    /// Create a code segment (trimmed)
    pub fn code(content: impl AsRef<str>) -> Self {
        Self::new(SegmentKind::Code, content)
    }

    /// Create a tool segment (trimmed)
    pub fn tool(content: impl AsRef<str>) -> Self {
        Self::new(SegmentKind::Tool, content)
    }

    /// A segment with empty trimmed content is never emitted
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
