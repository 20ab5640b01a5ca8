//! Load source text as a module object, or import a module by its dotted name.

use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::debug;

use super::classify_in;
use crate::core::error::Error;

/// Compile `source` as `filename` and run it in `namespace`.
pub(super) fn run_source(
    py: Python<'_>,
    source: &str,
    filename: &str,
    namespace: &Bound<'_, PyDict>,
) -> PyResult<()> {
    let builtins = py.import("builtins")?;
    let code = builtins
        .getattr("compile")?
        .call1((source, filename, "exec"))?;
    builtins.getattr("exec")?.call1((code, namespace))?;
    Ok(())
}

/// Execute `source` as module `name`, loaded from `origin`.
///
/// A `package_dir` makes the module a package whose submodules are looked up
/// there. The module is registered in `sys.modules` under `name` while it runs
/// unless that name is already taken; the enclosing scope evicts it afterwards.
pub fn exec_module<'py>(
    py: Python<'py>,
    name: &str,
    origin: &Path,
    source: &str,
    package_dir: Option<&Path>,
) -> Result<Bound<'py, PyModule>, Error> {
    load(py, name, origin, source, package_dir).map_err(|err| classify_in(py, &err, origin))
}

fn load<'py>(
    py: Python<'py>,
    name: &str,
    origin: &Path,
    source: &str,
    package_dir: Option<&Path>,
) -> PyResult<Bound<'py, PyModule>> {
    let module = PyModule::new(py, name)?;
    let filename = origin.to_string_lossy();
    module.setattr("__file__", filename.as_ref())?;
    module.setattr("__builtins__", py.import("builtins")?)?;
    match package_dir {
        Some(dir) => {
            module.setattr("__path__", vec![dir.to_string_lossy().into_owned()])?;
            module.setattr("__package__", name)?;
        }
        None => {
            let parent = name.rsplit_once('.').map_or("", |(parent, _)| parent);
            module.setattr("__package__", parent)?;
        }
    }

    let modules = py.import("sys")?.getattr("modules")?.downcast_into::<PyDict>()?;
    if !modules.contains(name)? {
        modules.set_item(name, &module)?;
    }
    debug!(module = name, origin = %filename, "executing module");
    run_source(py, source, &filename, &module.dict())?;
    Ok(module)
}

/// `importlib.import_module(name)`.
pub fn import_module<'py>(py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyAny>> {
    py.import("importlib")?
        .getattr("import_module")?
        .call1((name,))
}
