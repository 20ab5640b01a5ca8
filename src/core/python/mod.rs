//! Purpose: Embed CPython and expose the handful of interpreter operations the engines need.
//! Exports: `prepare`, `SysPathBinding`, `exec_module`, `import_module`, `classify`, `FaultExt`, helpers.
//! Role: Only module that talks to the interpreter directly; engines work on loaded objects.
//! Invariants: The search-path lock is always taken before the GIL, never while holding it.
//! Invariants: Python exceptions surface as classified `Error` values, never as panics.
//! Invariants: Modules loaded during a guarded scope are evicted from `sys.modules` when it ends.

mod binding;
mod loader;
mod robot_shim;

use std::path::Path;

use pyo3::exceptions::{PyImportError, PySyntaxError};
use pyo3::prelude::*;
use pyo3::types::PyTraceback;

use crate::core::error::{Error, ErrorKind};

pub use binding::SysPathBinding;
pub use loader::{exec_module, import_module};

/// Initialize the interpreter on the calling thread (the process main thread in the CLI).
pub fn prepare() {
    pyo3::prepare_freethreaded_python();
}

/// Classify a pending Python exception.
///
/// `SyntaxError` (and its `IndentationError`/`TabError` subclasses) keeps the
/// offending file and line; `ImportError` keeps the interpreter's message;
/// everything else becomes `DataError: <Type>: <message>`.
pub fn classify(py: Python<'_>, err: &PyErr) -> Error {
    let value = err.value(py);
    if err.is_instance_of::<PySyntaxError>(py) {
        let message = value
            .getattr("msg")
            .and_then(|msg| msg.extract::<String>())
            .unwrap_or_else(|_| value.to_string());
        let mut classified = Error::new(ErrorKind::SyntaxError).with_message(message);
        if let Ok(line) = value.getattr("lineno").and_then(|line| line.extract::<u32>()) {
            classified = classified.with_line(line);
        }
        if let Ok(file) = value.getattr("filename").and_then(|file| file.extract::<String>()) {
            classified = classified.with_path(file);
        }
        return classified;
    }
    if err.is_instance_of::<PyImportError>(py) {
        return Error::new(ErrorKind::ImportError).with_message(value.to_string());
    }
    let type_name = err
        .get_type(py)
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "Exception".to_string());
    let text = value.to_string();
    let message = if text.is_empty() {
        type_name
    } else {
        format!("{type_name}: {text}")
    };
    Error::new(ErrorKind::DataError).with_message(message)
}

/// Like `classify`, also recording the deepest traceback line inside `origin`.
pub fn classify_in(py: Python<'_>, err: &PyErr, origin: &Path) -> Error {
    let classified = classify(py, err);
    if classified.kind() == ErrorKind::SyntaxError {
        return classified.or_path(origin);
    }
    let origin_text = origin.to_string_lossy();
    match err.traceback(py).and_then(|tb| line_in(&tb, &origin_text)) {
        Some(line) => classified.with_path(origin).with_line(line),
        None => classified.with_path(origin),
    }
}

fn line_in(traceback: &Bound<'_, PyTraceback>, origin: &str) -> Option<u32> {
    let mut current = Some(traceback.clone().into_any());
    let mut found = None;
    while let Some(frame) = current.filter(|tb| !tb.is_none()) {
        let file = frame
            .getattr("tb_frame")
            .and_then(|f| f.getattr("f_code"))
            .and_then(|code| code.getattr("co_filename"))
            .and_then(|name| name.extract::<String>());
        if file.is_ok_and(|file| file == origin) {
            found = frame.getattr("tb_lineno").and_then(|line| line.extract::<u32>()).ok();
        }
        current = frame.getattr("tb_next").ok();
    }
    found
}

/// `map_err(classify)` for interpreter results.
pub trait FaultExt<T> {
    fn or_fault(self, py: Python<'_>) -> Result<T, Error>;
}

impl<T> FaultExt<T> for PyResult<T> {
    fn or_fault(self, py: Python<'_>) -> Result<T, Error> {
        self.map_err(|err| classify(py, &err))
    }
}

/// `str(value)`.
pub fn render(value: &Bound<'_, PyAny>) -> PyResult<String> {
    value.str()?.extract()
}

/// `type(value).__name__`.
pub fn type_name(value: &Bound<'_, PyAny>) -> String {
    value
        .get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "object".to_string())
}

/// Attribute lookup that treats a missing attribute as `None`.
pub fn attr<'py>(object: &Bound<'py, PyAny>, name: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
    if object.hasattr(name)? {
        Ok(Some(object.getattr(name)?))
    } else {
        Ok(None)
    }
}

/// Current `sys.path` entries, as strings.
pub fn sys_path_entries() -> Result<Vec<String>, Error> {
    Python::with_gil(|py| {
        let entries: PyResult<Vec<String>> = py
            .import("sys")
            .and_then(|sys| sys.getattr("path"))
            .and_then(|path| path.extract());
        entries.or_fault(py)
    })
}

#[cfg(test)]
mod tests {
    use super::{FaultExt, classify, render};
    use crate::core::error::ErrorKind;
    use crate::core::search_path::with_extended_search_path;
    use pyo3::prelude::*;

    fn evaluate(expression: &str) -> Result<String, crate::core::error::Error> {
        with_extended_search_path(&[], |_| {
            Python::with_gil(|py| {
                let builtins = py.import("builtins").or_fault(py)?;
                let value = builtins.getattr("eval").and_then(|eval| eval.call1((expression,)));
                value.and_then(|value| render(&value)).or_fault(py)
            })
        })
    }

    #[test]
    fn values_render_through_str() {
        assert_eq!(evaluate("2 ** 64").expect("int"), "18446744073709551616");
        assert_eq!(evaluate("round(2.675, 2)").expect("round"), "2.67");
        assert_eq!(evaluate("b'ab'").expect("bytes"), "b'ab'");
    }

    #[test]
    fn exceptions_are_classified_by_type() {
        let err = evaluate("1 +").expect_err("syntax");
        assert_eq!(err.kind(), ErrorKind::SyntaxError);

        let err = evaluate("__import__('no_module_by_this_name')").expect_err("import");
        assert_eq!(err.kind(), ErrorKind::ImportError);
        assert_eq!(err.message(), Some("No module named 'no_module_by_this_name'"));

        let err = evaluate("1 / 0").expect_err("zero division");
        assert_eq!(err.kind(), ErrorKind::DataError);
        assert_eq!(err.message(), Some("ZeroDivisionError: division by zero"));
    }

    #[test]
    fn bare_exception_uses_type_name() {
        with_extended_search_path(&[], |_| {
            Python::with_gil(|py| {
                let err = pyo3::exceptions::PyRuntimeError::new_err(());
                assert_eq!(classify(py, &err).message(), Some("RuntimeError"));
            })
        });
    }
}
