//! Trailing-expression capture
//!
//! Agent-authored snippets follow the interactive-scripting idiom of ending on
//! a bare expression whose value is the point of the snippet. A REPL would
//! print it; `exec` discards it. Before execution the snippet is parsed, and
//! when its final top-level statement is a bare expression, the source is
//! rewritten so that value lands in a reserved binding instead.
//!
//! Parse failure is an expected branch, not an error: the caller executes the
//! snippet unmodified and lets the interpreter report whatever is wrong.

use rustpython_ast::{Mod, Stmt};
use rustpython_parser::{parse, Mode};

/// Reserved binding receiving the trailing-expression value.
/// Read back and deleted after every execution so values never leak forward.
pub const RESULT_BINDING: &str = "__result__";

/// Rewrite `snippet` so its trailing bare expression is assigned to
/// [`RESULT_BINDING`], or return `None` when there is nothing to capture
/// (no trailing expression, empty body, or the snippet does not parse).
///
/// The split happens at the final statement's byte offset, so multi-line
/// trailing expressions and statement-terminated fragments are handled
/// without line surgery.
pub fn capture_trailing_expression(snippet: &str) -> Option<String> {
    let parsed = parse(snippet, Mode::Module, "<snippet>").ok()?;
    let Mod::Module(module) = parsed else {
        return None;
    };
    let Some(Stmt::Expr(trailing)) = module.body.last() else {
        return None;
    };

    let offset = trailing.range.start().to_usize();
    let (head, tail) = snippet.split_at(offset);
    Some(format!("{}{} = {}", head, RESULT_BINDING, tail))
}
