//! Interpreter state owned by one guarded search-path scope.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use tracing::{debug, warn};

use super::robot_shim;

/// Binds `sys.path` to a scope's directory list and undoes every interpreter-side effect on drop.
///
/// On bind: `sys.path` becomes the scope dirs followed by the interpreter's own entries,
/// `sys.stdout` is pointed at `sys.stderr`, and import caches are invalidated. On drop:
/// `sys.path` and `sys.stdout` are restored, and `sys.modules` entries added or replaced
/// during the scope are evicted or put back, except modules living under the interpreter's
/// install prefixes.
pub struct SysPathBinding {
    path: Py<PyList>,
    saved_path: Vec<PyObject>,
    saved_modules: Py<PyDict>,
    saved_stdout: PyObject,
    dirs: Vec<String>,
}

impl SysPathBinding {
    pub fn bind(dirs: &[PathBuf]) -> PyResult<Self> {
        Python::with_gil(|py| {
            let sys = py.import("sys")?;
            let path = sys.getattr("path")?.downcast_into::<PyList>()?;
            let saved_path: Vec<PyObject> = path.iter().map(Bound::unbind).collect();
            let saved_modules = sys.getattr("modules")?.downcast_into::<PyDict>()?.copy()?;
            let saved_stdout = sys.getattr("stdout")?.unbind();
            let dirs: Vec<String> = dirs
                .iter()
                .map(|dir| dir.to_string_lossy().into_owned())
                .collect();

            let binding = Self {
                path: path.clone().unbind(),
                saved_path,
                saved_modules: saved_modules.unbind(),
                saved_stdout,
                dirs,
            };
            path.del_slice(0, path.len())?;
            for dir in &binding.dirs {
                path.append(dir)?;
            }
            for entry in &binding.saved_path {
                path.append(entry.bind(py))?;
            }
            sys.setattr("stdout", sys.getattr("stderr")?)?;
            py.import("importlib")?.call_method0("invalidate_caches")?;
            robot_shim::install_if_missing(py)?;
            debug!(prepended = binding.dirs.len(), "sys.path bound");
            Ok(binding)
        })
    }

    /// Put `roots` in front of the live `sys.path` for the rest of the scope.
    pub fn prepend(&self, py: Python<'_>, roots: &[PathBuf]) -> PyResult<()> {
        let path = py.import("sys")?.getattr("path")?.downcast_into::<PyList>()?;
        for (index, root) in roots.iter().enumerate() {
            path.insert(index, root.to_string_lossy().as_ref())?;
        }
        Ok(())
    }

    fn restore(&self, py: Python<'_>) -> PyResult<()> {
        let sys = py.import("sys")?;
        let path = self.path.bind(py);
        sys.setattr("path", path)?;
        path.del_slice(0, path.len())?;
        for entry in &self.saved_path {
            path.append(entry.bind(py))?;
        }
        sys.setattr("stdout", self.saved_stdout.bind(py))?;

        let importer_cache = sys.getattr("path_importer_cache")?;
        for dir in &self.dirs {
            importer_cache.call_method1("pop", (dir, py.None()))?;
        }

        let prefixes = install_prefixes(&sys)?;
        let modules = sys.getattr("modules")?.downcast_into::<PyDict>()?;
        let saved = self.saved_modules.bind(py);
        let mut evicted = 0usize;
        for (name, module) in modules.copy()?.iter() {
            match saved.get_item(&name)? {
                Some(previous) if previous.is(&module) => {}
                Some(previous) => modules.set_item(&name, previous)?,
                None if is_installed(&module, &prefixes)? => {}
                None => {
                    modules.del_item(&name)?;
                    evicted += 1;
                }
            }
        }
        for (name, module) in saved.iter() {
            if !modules.contains(&name)? {
                modules.set_item(name, module)?;
            }
        }
        debug!(evicted, "sys.path restored");
        Ok(())
    }
}

impl Drop for SysPathBinding {
    fn drop(&mut self) {
        if let Err(err) = Python::with_gil(|py| self.restore(py)) {
            warn!(error = %err, "failed to restore interpreter state");
        }
    }
}

fn install_prefixes(sys: &Bound<'_, PyModule>) -> PyResult<Vec<String>> {
    let mut prefixes = Vec::new();
    for key in ["prefix", "base_prefix", "exec_prefix", "base_exec_prefix"] {
        let prefix: String = sys.getattr(key)?.extract()?;
        if !prefix.is_empty() && !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    Ok(prefixes)
}

/// Built-in, frozen, or loaded from below an install prefix.
fn is_installed(module: &Bound<'_, PyAny>, prefixes: &[String]) -> PyResult<bool> {
    if let Some(file) = super::attr(module, "__file__")?.filter(|file| !file.is_none()) {
        let file: String = file.extract().unwrap_or_default();
        return Ok(prefixes.iter().any(|prefix| file.starts_with(prefix.as_str())));
    }
    let Some(spec) = super::attr(module, "__spec__")?.filter(|spec| !spec.is_none()) else {
        return Ok(false);
    };
    let origin: Option<String> = spec.getattr("origin")?.extract().unwrap_or_default();
    Ok(matches!(origin.as_deref(), Some("built-in" | "frozen")))
}
