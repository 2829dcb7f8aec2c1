//! Execution Session
//!
//! Owns the persistent binding environment a code-act agent executes against:
//! a fixed scope (injected modules/values, supplied once at construction) and
//! a mutable scope that code reads and writes, accumulating state across every
//! call for the life of the session. A variable defined in call N is visible
//! in call N+1 because the same two scopes are reused by identity.
//!
//! `execute` never raises: snippet failures of any shape (syntax errors,
//! runtime exceptions, deadline hits) are folded into the returned
//! [`ExecutionResult`] as a formatted error description.

use crate::error::{self, Error, Result};
use crate::rewrite;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::time::Duration;

/// Default wall-clock deadline for one `execute` call
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Helper namespace installed once per session.
///
/// `sys.settrace` is the only in-process hook that can interrupt an arbitrary
/// snippet: the tracer fires on every call/line event of interpreted code and
/// raises `TimeoutError` inside the running frame once the deadline passes.
/// Limits: a snippet that catches `TimeoutError`, or one blocked inside a
/// single C call, is not interruptible this way.
const DEADLINE_HELPERS: &str = r#"
import sys as _sys
import time as _time

def _arm(deadline_secs):
    end = _time.monotonic() + deadline_secs
    def _tracer(frame, event, arg):
        if _time.monotonic() > end:
            raise TimeoutError(
                'snippet exceeded %.1fs execution deadline' % deadline_secs)
        return _tracer
    _sys.settrace(_tracer)

def _disarm():
    _sys.settrace(None)
"#;

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Result
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of executing one snippet.
///
/// `output` is always a single string: captured stdout, then captured stderr
/// (if non-empty), then the trailing-expression value (if any), separated by
/// blank lines. On failure it holds the formatted error description instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub output: String,
}

impl ExecutionResult {
    fn success(output: String) -> Self {
        Self {
            succeeded: true,
            output,
        }
    }

    fn failure(output: String) -> Self {
        Self {
            succeeded: false,
            output,
        }
    }

    /// The text fed back to the model as the tool segment.
    ///
    /// Segments with empty content are never emitted, so a silent snippet
    /// gets a placeholder to keep the code/tool pairing in the transcript.
    pub fn tool_output(&self) -> String {
        let trimmed = self.output.trim();
        if trimmed.is_empty() {
            "(no output)".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds an [`ExecutionSession`], injecting the capability set executed
/// snippets will see.
///
/// ```no_run
/// use codeact_engine::SessionBuilder;
///
/// let session = SessionBuilder::new()
///     .import("m", "math")
///     .prelude("def double(x):\n    return x * 2\n")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    imports: Vec<(String, String)>,
    preludes: Vec<String>,
    deadline: Option<Duration>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            imports: Vec::new(),
            preludes: Vec::new(),
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a module at build time and expose it under `alias` in the
    /// fixed bindings (e.g. `import("np", "numpy")`).
    pub fn import(mut self, alias: impl Into<String>, module: impl Into<String>) -> Self {
        self.imports.push((alias.into(), module.into()));
        self
    }

    /// Run a Python source once at build time with the session's scopes, so
    /// its top-level definitions land in the mutable bindings. This is how
    /// integrator-supplied tool functions are injected.
    pub fn prelude(mut self, source: impl Into<String>) -> Self {
        self.preludes.push(source.into());
        self
    }

    /// Set the per-call execution deadline (default 30s)
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Disable the execution deadline entirely
    pub fn no_deadline(mut self) -> Self {
        self.deadline = None;
        self
    }

    /// Initialize the interpreter scopes. The only fallible step of a
    /// session's life: a bad import or a failing prelude surfaces here.
    pub fn build(self) -> Result<ExecutionSession> {
        Python::attach(|py| {
            let fixed = PyDict::new(py);
            let vars = PyDict::new(py);
            let helpers = PyDict::new(py);

            let helper_code = to_cstring(DEADLINE_HELPERS)
                .map_err(|e| e.with_operation("session::build"))?;
            py.run(helper_code.as_c_str(), Some(&helpers), Some(&helpers))
                .map_err(|e| {
                    error::interpreter_init(format_exception(py, &e))
                        .with_operation("session::build")
                })?;

            for (alias, module) in &self.imports {
                let module_obj = py.import(module.as_str()).map_err(|e| {
                    error::interpreter_init(format_exception(py, &e))
                        .with_operation("session::build")
                        .with_context("module", module.clone())
                })?;
                fixed.set_item(alias.as_str(), module_obj).map_err(|e| {
                    error::interpreter_init(format_exception(py, &e))
                        .with_operation("session::build")
                })?;
            }

            for source in &self.preludes {
                let code = to_cstring(source).map_err(|e| e.with_operation("session::build"))?;
                py.run(code.as_c_str(), Some(&fixed), Some(&vars))
                    .map_err(|e| {
                        error::interpreter_init(format_exception(py, &e))
                            .with_operation("session::build")
                            .with_context("step", "prelude")
                    })?;
            }

            Ok(ExecutionSession {
                fixed: fixed.unbind(),
                vars: vars.unbind(),
                helpers: helpers.unbind(),
                deadline: self.deadline,
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Session
// ═══════════════════════════════════════════════════════════════════════════════

/// A persistent snippet-execution environment.
///
/// Owned by exactly one conversation; callers serialize `execute` calls (one
/// active turn at a time). Dropping the session drops its bindings.
#[derive(Debug)]
pub struct ExecutionSession {
    /// Injected modules/values; read-mostly context for executed code
    fixed: Py<PyDict>,
    /// Mutable bindings; the persistence mechanism across turns
    vars: Py<PyDict>,
    /// Private namespace holding the deadline tracer
    helpers: Py<PyDict>,
    deadline: Option<Duration>,
}

impl ExecutionSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Execute one snippet against the session's bindings.
    ///
    /// Never returns an error and never panics on snippet misbehavior: parse
    /// ambiguity falls back to plain execution, and every interpreter
    /// exception is folded into the result.
    pub fn execute(&self, snippet: &str) -> ExecutionResult {
        Python::attach(|py| match self.execute_inner(py, snippet) {
            Ok(result) => result,
            // failures of the capture plumbing itself, not of the snippet
            Err(err) => ExecutionResult::failure(format_exception(py, &err)),
        })
    }

    fn execute_inner(&self, py: Python<'_>, snippet: &str) -> PyResult<ExecutionResult> {
        let rewritten = rewrite::capture_trailing_expression(snippet);
        let (code, capture) = match rewritten.as_deref() {
            Some(code) => (code, true),
            None => (snippet, false),
        };
        let code = CString::new(code)
            .map_err(|_| PyValueError::new_err("snippet contains a NUL byte"))?;

        let io = py.import("io")?;
        let sys = py.import("sys")?;
        let stdout = io.getattr("StringIO")?.call0()?;
        let stderr = io.getattr("StringIO")?.call0()?;
        let prev_stdout = sys.getattr("stdout")?;
        let prev_stderr = sys.getattr("stderr")?;
        sys.setattr("stdout", &stdout)?;
        sys.setattr("stderr", &stderr)?;

        let ran = match self.arm_deadline(py) {
            Ok(()) => {
                let ran = py.run(
                    code.as_c_str(),
                    Some(self.fixed.bind(py)),
                    Some(self.vars.bind(py)),
                );
                self.disarm_deadline(py);
                ran
            }
            Err(err) => Err(err),
        };

        // restore before reading anything else, error or not
        sys.setattr("stdout", prev_stdout)?;
        sys.setattr("stderr", prev_stderr)?;

        let stdout_text: String = stdout.call_method0("getvalue")?.extract()?;
        let stderr_text: String = stderr.call_method0("getvalue")?.extract()?;

        match ran {
            Ok(()) => {
                let value = if capture {
                    self.take_result_binding(py)?
                } else {
                    None
                };
                Ok(ExecutionResult::success(assemble_output(
                    &stdout_text,
                    &stderr_text,
                    value.as_deref(),
                )))
            }
            Err(err) => Ok(ExecutionResult::failure(format_exception(py, &err))),
        }
    }

    /// Read back and clear the reserved binding so stale values never leak
    /// into a later call.
    fn take_result_binding(&self, py: Python<'_>) -> PyResult<Option<String>> {
        let vars = self.vars.bind(py);
        let Some(value) = vars.get_item(rewrite::RESULT_BINDING)? else {
            return Ok(None);
        };
        let text = if value.is_none() {
            None
        } else {
            Some(py_str(&value)?)
        };
        vars.del_item(rewrite::RESULT_BINDING)?;
        Ok(text)
    }

    fn arm_deadline(&self, py: Python<'_>) -> PyResult<()> {
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        let helpers = self.helpers.bind(py);
        let arm = helpers.get_item("_arm")?.ok_or_else(|| {
            PyValueError::new_err("deadline helper namespace is missing '_arm'")
        })?;
        arm.call1((deadline.as_secs_f64(),))?;
        Ok(())
    }

    fn disarm_deadline(&self, py: Python<'_>) {
        if self.deadline.is_none() {
            return;
        }
        if let Ok(Some(disarm)) = self.helpers.bind(py).get_item("_disarm") {
            let _ = disarm.call0();
        }
    }

    /// Read the `str()` form of a mutable binding, e.g. for debugging a
    /// session from the CLI.
    pub fn lookup(&self, name: &str) -> Result<String> {
        Python::attach(|py| {
            let vars = self.vars.bind(py);
            let value = vars
                .get_item(name)
                .map_err(|e| {
                    Error::unexpected(format_exception(py, &e)).with_operation("session::lookup")
                })?
                .ok_or_else(|| {
                    error::binding_not_found(name).with_operation("session::lookup")
                })?;
            py_str(&value).map_err(|e| {
                Error::unexpected(format_exception(py, &e)).with_operation("session::lookup")
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Assemble the result output: stdout, stderr, trailing-expression value,
/// non-empty parts separated by blank lines.
fn assemble_output(stdout: &str, stderr: &str, value: Option<&str>) -> String {
    let stdout = stdout.trim_end();
    let stderr = stderr.trim_end();

    let mut parts: Vec<&str> = Vec::new();
    if !stdout.is_empty() {
        parts.push(stdout);
    }
    if !stderr.is_empty() {
        parts.push(stderr);
    }
    if let Some(value) = value {
        if !value.is_empty() {
            parts.push(value);
        }
    }
    parts.join("\n\n")
}

/// `Error: {type}: {message}` plus the formatted stack trace when available
fn format_exception(py: Python<'_>, err: &PyErr) -> String {
    let kind = err
        .get_type(py)
        .qualname()
        .and_then(|name| name.extract::<String>())
        .unwrap_or_else(|_| "Exception".to_string());
    let message = err
        .value(py)
        .str()
        .and_then(|s| s.extract::<String>())
        .unwrap_or_default();

    let mut text = format!("Error: {}: {}", kind, message);
    if let Some(trace) = err.traceback(py).and_then(|tb| tb.format().ok()) {
        let trace = trace.trim_end();
        if !trace.is_empty() {
            text.push('\n');
            text.push_str(trace);
        }
    }
    text
}

fn py_str(value: &Bound<'_, PyAny>) -> PyResult<String> {
    value.str()?.extract()
}

fn to_cstring(source: &str) -> Result<CString> {
    CString::new(source)
        .map_err(|_| error::invalid_argument("python source contains a NUL byte"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// sys.stdout/sys.stderr redirection is process-global; serialize the
    /// tests that execute snippets so captures cannot interleave.
    static PY_LOCK: Mutex<()> = Mutex::new(());

    fn lock() -> MutexGuard<'static, ()> {
        PY_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session() -> ExecutionSession {
        ExecutionSession::builder().build().unwrap()
    }

    #[test]
    fn test_binding_persistence_across_calls() {
        let _guard = lock();
        let session = session();

        let first = session.execute("x = 41");
        assert!(first.succeeded);
        assert_eq!(first.output, "");

        let second = session.execute("x + 1");
        assert!(second.succeeded);
        assert_eq!(second.output, "42");
    }

    #[test]
    fn test_trailing_expression_is_echoed() {
        let _guard = lock();
        let session = session();

        let result = session.execute("x = 2\nx + 3");
        assert!(result.succeeded);
        assert_eq!(result.output, "5");
    }

    #[test]
    fn test_trailing_assignment_is_not_echoed() {
        let _guard = lock();
        let session = session();

        let result = session.execute("x = 2\nx = x + 3");
        assert!(result.succeeded);
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_fault_containment() {
        let _guard = lock();
        let session = session();

        let result = session.execute("1/0");
        assert!(!result.succeeded);
        assert!(result.output.contains("ZeroDivisionError"));
        assert!(result.output.contains("Error:"));
    }

    #[test]
    fn test_syntax_error_is_contained() {
        let _guard = lock();
        let session = session();

        let result = session.execute("def broken(:");
        assert!(!result.succeeded);
        assert!(result.output.contains("SyntaxError"));
    }

    #[test]
    fn test_stdout_capture() {
        let _guard = lock();
        let session = session();

        let result = session.execute("print('hello')");
        assert!(result.succeeded);
        assert_eq!(result.output, "hello");
    }

    #[test]
    fn test_stdout_then_value() {
        let _guard = lock();
        let session = session();

        let result = session.execute("print('a')\n1 + 1");
        assert!(result.succeeded);
        assert_eq!(result.output, "a\n\n2");
    }

    #[test]
    fn test_stderr_capture() {
        let _guard = lock();
        let session = session();

        let result = session.execute("import sys\nn = sys.stderr.write('warn')");
        assert!(result.succeeded);
        assert_eq!(result.output, "warn");
    }

    #[test]
    fn test_stdout_stderr_separated_by_blank_line() {
        let _guard = lock();
        let session = session();

        let result =
            session.execute("import sys\nprint('out')\nn = sys.stderr.write('err')");
        assert!(result.succeeded);
        assert_eq!(result.output, "out\n\nerr");
    }

    #[test]
    fn test_result_binding_never_leaks_forward() {
        let _guard = lock();
        let session = session();

        assert_eq!(session.execute("7 * 6").output, "42");

        // the reserved binding is gone before the next call
        let result = session.execute("'__result__' in dir()");
        assert!(result.succeeded);
        assert_eq!(result.output, "False");
    }

    #[test]
    fn test_control_flow_tail_falls_back_to_plain_execution() {
        let _guard = lock();
        let session = session();

        let result = session.execute("total = 0\nfor i in range(4):\n    total += i");
        assert!(result.succeeded);
        assert_eq!(result.output, "");
        assert_eq!(session.execute("total").output, "6");
    }

    #[test]
    fn test_imported_module_is_visible() {
        let _guard = lock();
        let session = ExecutionSession::builder()
            .import("m", "math")
            .build()
            .unwrap();

        let result = session.execute("m.floor(2.7)");
        assert!(result.succeeded);
        assert_eq!(result.output, "2");
    }

    #[test]
    fn test_prelude_tools_are_callable() {
        let _guard = lock();
        let session = ExecutionSession::builder()
            .prelude("def double(x):\n    return x * 2\n")
            .build()
            .unwrap();

        let result = session.execute("double(21)");
        assert!(result.succeeded);
        assert_eq!(result.output, "42");
    }

    #[test]
    fn test_bad_import_fails_at_build() {
        let _guard = lock();
        let err = ExecutionSession::builder()
            .import("nope", "definitely_not_a_module")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InterpreterInit);
    }

    #[test]
    fn test_deadline_interrupts_runaway_snippet() {
        let _guard = lock();
        let session = ExecutionSession::builder()
            .deadline(Duration::from_millis(300))
            .build()
            .unwrap();

        let result = session.execute("while True:\n    pass");
        assert!(!result.succeeded);
        assert!(result.output.contains("TimeoutError"));
    }

    #[test]
    fn test_lookup() {
        let _guard = lock();
        let session = session();

        session.execute("answer = 42");
        assert_eq!(session.lookup("answer").unwrap(), "42");

        let err = session.lookup("missing").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::BindingNotFound);
    }

    #[test]
    fn test_tool_output_placeholder() {
        let result = ExecutionResult::success(String::new());
        assert_eq!(result.tool_output(), "(no output)");

        let result = ExecutionResult::success("4".to_string());
        assert_eq!(result.tool_output(), "4");
    }

    #[test]
    fn test_sessions_are_independent() {
        let _guard = lock();
        let a = session();
        let b = session();

        a.execute("only_in_a = 1");
        let result = b.execute("'only_in_a' in dir()");
        assert_eq!(result.output, "False");
    }

    #[test]
    fn test_assemble_output() {
        assert_eq!(assemble_output("out\n", "", None), "out");
        assert_eq!(assemble_output("out\n", "err\n", Some("3")), "out\n\nerr\n\n3");
        assert_eq!(assemble_output("", "", Some("3")), "3");
        assert_eq!(assemble_output("", "", None), "");
    }
}
