//! Purpose: Execute a variable file and collect its variables as rendered strings.
//! Exports: `extract_variables`, `VariableTable`.
//! Role: Core of `get_variables`; the only caller that runs user code for its side effects.
//! Invariants: Only `.py` files are executed; every other extension fails before loading.
//! Invariants: Failures other than syntax errors surface as `DataError` carrying the original fault text.
//! Invariants: Shapes are tried in order: getter function, class named after the file, module bindings.

use std::collections::BTreeMap;
use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyTuple, PyType};
use tracing::debug;

use crate::core::container::read_source;
use crate::core::error::{Error, ErrorKind};
use crate::core::python::{self, FaultExt, render, type_name};
use crate::core::search_path::ScopedSearchPath;

pub type VariableTable = BTreeMap<String, String>;

const GETTER_NAMES: &[&str] = &["get_variables", "getVariables"];

/// Robot's typed-variable prefixes, stripped from returned names.
const TYPE_PREFIXES: &[&str] = &["LIST__", "DICT__"];

pub fn extract_variables(
    location: &Path,
    args: &[String],
    scope: &ScopedSearchPath,
) -> Result<VariableTable, Error> {
    let is_python = location
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("py"));
    if !is_python {
        return Err(Error::new(ErrorKind::DataError)
            .with_message("unsupported variable file type; only .py files can be loaded")
            .with_path(location));
    }
    if !location.is_file() {
        return Err(Error::new(ErrorKind::DataError)
            .with_message("variable file does not exist")
            .with_path(location));
    }
    let source = read_source(location).map_err(|err| processing_failed(location, err))?;
    if let Some(dir) = location.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        scope.add_import_roots(&[dir.to_path_buf()])?;
    }

    let name = location
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let table = Python::with_gil(|py| {
        let module = python::exec_module(py, &name, location, &source, None)?;
        collect(py, &module, &name, args)
    })
    .map_err(|err| processing_failed(location, err))?;
    debug!(file = %location.display(), variables = table.len(), "variables extracted");
    Ok(table)
}

fn processing_failed(location: &Path, err: Error) -> Error {
    if err.kind() == ErrorKind::SyntaxError {
        return err.or_path(location);
    }
    let detail = err.message().unwrap_or_default();
    let detail = match err.kind() {
        ErrorKind::DataError => detail.to_string(),
        kind => format!("{}: {detail}", kind.label()),
    };
    let mut failed = Error::new(ErrorKind::DataError)
        .with_message(format!("Processing variable file failed: {detail}"))
        .with_path(location);
    if let Some(line) = err.line() {
        failed = failed.with_line(line);
    }
    failed
}

fn collect(
    py: Python<'_>,
    module: &Bound<'_, PyModule>,
    name: &str,
    args: &[String],
) -> Result<VariableTable, Error> {
    let args = PyTuple::new(py, args).or_fault(py)?;
    for getter in GETTER_NAMES {
        let Some(func) = python::attr(module, getter).or_fault(py)? else {
            continue;
        };
        if func.is_callable() {
            let returned = func.call1(&args).or_fault(py)?;
            return from_mapping(py, getter, &returned);
        }
    }
    let class = python::attr(module, name)
        .or_fault(py)?
        .and_then(|found| found.downcast_into::<PyType>().ok());
    if let Some(class) = class {
        let owner: Option<String> = class.getattr("__module__").and_then(|m| m.extract()).ok();
        if owner.as_deref() == Some(name) {
            return from_class(&class, &args).or_fault(py);
        }
    }
    from_module(module).or_fault(py)
}

fn from_mapping(py: Python<'_>, getter: &str, returned: &Bound<'_, PyAny>) -> Result<VariableTable, Error> {
    let mapping = py
        .import("collections.abc")
        .and_then(|abc| abc.getattr("Mapping"))
        .and_then(|mapping| returned.is_instance(&mapping))
        .or_fault(py)?;
    if !mapping {
        return Err(Error::new(ErrorKind::DataError).with_message(format!(
            "Expected '{getter}' to return dictionary-like value, got {}.",
            type_name(returned)
        )));
    }
    let mut table = VariableTable::new();
    let items = returned.call_method0("items").and_then(|items| items.try_iter()).or_fault(py)?;
    for item in items {
        let (key, value): (Bound<'_, PyAny>, Bound<'_, PyAny>) =
            item.and_then(|item| item.extract()).or_fault(py)?;
        let key = render(&key).or_fault(py)?;
        let key = TYPE_PREFIXES
            .iter()
            .find_map(|prefix| key.strip_prefix(prefix))
            .map(str::to_string)
            .unwrap_or(key);
        table.insert(key, render(&value).or_fault(py)?);
    }
    Ok(table)
}

fn is_variable_value(value: &Bound<'_, PyAny>) -> bool {
    !(value.is_callable() || value.is_instance_of::<PyModule>())
}

fn from_class(class: &Bound<'_, PyType>, args: &Bound<'_, PyTuple>) -> PyResult<VariableTable> {
    let instance = class.call1(args)?;
    let mut table = VariableTable::new();
    for name in instance.dir()?.iter() {
        let name: String = name.extract()?;
        if name.starts_with('_') {
            continue;
        }
        let value = instance.getattr(name.as_str())?;
        if is_variable_value(&value) {
            table.insert(name, render(&value)?);
        }
    }
    Ok(table)
}

fn from_module(module: &Bound<'_, PyModule>) -> PyResult<VariableTable> {
    let exported: Option<Vec<String>> = match python::attr(module, "__all__")? {
        Some(all) => Some(all.extract()?),
        None => None,
    };
    let mut table = VariableTable::new();
    for (name, value) in module.dict().iter() {
        let name: String = name.extract()?;
        if name.starts_with('_') || !is_variable_value(&value) {
            continue;
        }
        if exported.as_ref().is_some_and(|names| !names.contains(&name)) {
            continue;
        }
        table.insert(name, render(&value)?);
    }
    Ok(table)
}
