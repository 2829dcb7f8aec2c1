//! # codeact-engine
//!
//! The core of a code-act agent: an LLM emits free-form text with embedded
//! `<execute>...</execute>` code fragments, and this crate turns that stream
//! into something runnable.
//!
//! ## Core Concepts
//! - **Segments**: ordered `text` / `code` / `tool` units of the agent's output
//! - **Stream Segmenter**: incremental delimiter scanner over the token stream
//! - **Execution Session**: persistent Python bindings that survive across calls
//! - **Trailing expression**: a snippet's final bare expression is captured and
//!   echoed, REPL-style

pub mod error;
pub mod rewrite;
pub mod segment;
pub mod session;
pub mod stream;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use segment::{Segment, SegmentKind};
pub use session::{ExecutionResult, ExecutionSession, SessionBuilder};
pub use stream::StreamSegmenter;
