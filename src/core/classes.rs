//! Purpose: Enumerate fully-qualified class names reachable from a resolved container.
//! Exports: `list_classes`.
//! Role: Core of `get_classes_from_module`; loads every unit in the interpreter and walks its classes.
//! Invariants: The inventory is duplicate-free and sorted; callers must not rely on the order.
//! Invariants: Any fault raised while loading a unit (or its imports) fails the whole enumeration.
//! Invariants: Only classes whose `__module__` is the loaded unit are reported; function-local ones never are.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use pyo3::prelude::*;
use pyo3::types::PyType;
use tracing::debug;

use crate::core::container::{ContainerHandle, ContainerKind, SourceUnit};
use crate::core::error::Error;
use crate::core::python::{self, FaultExt};
use crate::core::search_path::ScopedSearchPath;

pub fn list_classes(handle: &ContainerHandle, scope: &ScopedSearchPath) -> Result<Vec<String>, Error> {
    scope.add_import_roots(&handle.import_roots)?;

    let mut shallow = Vec::new();
    Python::with_gil(|py| -> Result<(), Error> {
        for unit in &handle.units {
            let (module_name, package_dir) = load_target(handle, unit);
            let module = python::exec_module(
                py,
                &module_name,
                &unit.origin,
                &unit.source,
                package_dir.as_deref(),
            )?;
            if !unit.name.is_empty() {
                shallow.push(unit.name.clone());
            }
            collect_class_names(&module, &module_name, &unit.name, &mut shallow).or_fault(py)?;
        }
        Ok(())
    })?;
    shallow.extend(handle.members.iter().cloned());

    let mut inventory = BTreeSet::new();
    for name in &shallow {
        if handle.bare_names {
            inventory.insert(name.clone());
        }
        for qualifier in &handle.qualifiers {
            inventory.insert(qualify(qualifier, name));
        }
    }
    inventory.extend(handle.compiled_classes.iter().cloned());
    debug!(root = %handle.root_name, classes = inventory.len(), "classes enumerated");
    Ok(inventory.into_iter().collect())
}

/// Module name a unit runs under, and its package directory when it is a package initializer.
fn load_target(handle: &ContainerHandle, unit: &SourceUnit) -> (String, Option<PathBuf>) {
    let is_init = unit
        .origin
        .file_name()
        .is_some_and(|name| name == "__init__.py");
    let package_dir = is_init.then(|| unit.origin.parent().map(Path::to_path_buf)).flatten();
    let name = match handle.kind {
        ContainerKind::SourceFile | ContainerKind::Package => handle.root_name.clone(),
        ContainerKind::ZipArchive | ContainerKind::JarArchive if unit.name.is_empty() => {
            handle.root_name.clone()
        }
        ContainerKind::ZipArchive | ContainerKind::JarArchive => unit.name.clone(),
    };
    (name, package_dir)
}

fn qualify(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}.{name}"),
    }
}

/// Classes defined by `module_name`, nested classes included, named `<prefix>.<qualname>`.
fn collect_class_names(
    module: &Bound<'_, PyModule>,
    module_name: &str,
    prefix: &str,
    names: &mut Vec<String>,
) -> PyResult<()> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<Bound<'_, PyAny>> = module.dict().values().iter().collect();
    while let Some(value) = pending.pop() {
        let Ok(class) = value.downcast_into::<PyType>() else {
            continue;
        };
        let owner: Option<String> = class.getattr("__module__")?.extract().ok();
        if owner.as_deref() != Some(module_name) {
            continue;
        }
        let qualname = class.qualname()?.to_string();
        if qualname.contains("<locals>") || !seen.insert(qualname.clone()) {
            continue;
        }
        let members = class.getattr("__dict__")?.call_method0("values")?;
        for member in members.try_iter()? {
            let member = member?;
            let nested = member
                .downcast::<PyType>()
                .ok()
                .and_then(|nested| nested.qualname().ok())
                .is_some_and(|nested| nested.to_string().starts_with(&format!("{qualname}.")));
            if nested {
                pending.push(member);
            }
        }
        names.push(qualify(prefix, &qualname));
    }
    Ok(())
}
