//! Purpose: Own the process-wide module search path and its scoped mutation.
//! Exports: `with_extended_search_path`, `ScopedSearchPath`, `snapshot`, `seed_base_search_path`.
//! Role: Single gate through which loaders read the path; drives the interpreter's `sys.path`.
//! Invariants: After a guarded scope ends the path equals its pre-scope snapshot, for every outcome.
//! Invariants: While a scope is live, `sys.path` is the scope dirs followed by the interpreter's own entries.
//! Invariants: A scope holds the path lock for its whole lifetime; scopes never nest on one thread.
//! Invariants: Extra directories are prepended in caller order, unvalidated and not deduplicated.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pyo3::Python;
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::python::{FaultExt, SysPathBinding};

static SEARCH_PATH: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

fn lock_path() -> MutexGuard<'static, Vec<PathBuf>> {
    // A panic inside a scope still restored the snapshot while unwinding.
    SEARCH_PATH.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seed the base path once at startup (from `--path` and `RED_INTROSPECT_PATH`).
pub fn seed_base_search_path(dirs: Vec<PathBuf>) {
    let mut path = lock_path();
    debug!(entries = dirs.len(), "seeding base search path");
    *path = dirs;
}

/// Copy of the current path, taken under the lock.
pub fn snapshot() -> Vec<PathBuf> {
    lock_path().clone()
}

/// Live view of the extended path handed to a guarded body.
pub struct ScopedSearchPath {
    // Field order matters: the interpreter is restored before the lock is released.
    binding: Result<SysPathBinding, String>,
    guard: MutexGuard<'static, Vec<PathBuf>>,
    saved: Vec<PathBuf>,
}

impl ScopedSearchPath {
    pub fn dirs(&self) -> &[PathBuf] {
        &self.guard
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.guard.iter().any(|entry| entry == dir)
    }

    /// Fails when `sys.path` could not be bound at scope entry.
    pub fn interpreter(&self) -> Result<&SysPathBinding, Error> {
        self.binding.as_ref().map_err(|detail| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("interpreter unavailable: {detail}"))
        })
    }

    /// Put container import roots in front of `sys.path` until the scope ends.
    pub fn add_import_roots(&self, roots: &[PathBuf]) -> Result<(), Error> {
        let binding = self.interpreter()?;
        Python::with_gil(|py| binding.prepend(py, roots).or_fault(py))
    }
}

impl Drop for ScopedSearchPath {
    fn drop(&mut self) {
        *self.guard = std::mem::take(&mut self.saved);
    }
}

pub fn with_extended_search_path<T>(
    extra_dirs: &[PathBuf],
    body: impl FnOnce(&ScopedSearchPath) -> T,
) -> T {
    let mut guard = lock_path();
    let saved = guard.clone();
    let mut extended = Vec::with_capacity(extra_dirs.len() + saved.len());
    extended.extend(extra_dirs.iter().cloned());
    extended.extend(saved.iter().cloned());
    let binding = SysPathBinding::bind(&extended).map_err(|err| {
        warn!(error = %err, "failed to bind sys.path");
        err.to_string()
    });
    *guard = extended;
    debug!(prepended = extra_dirs.len(), "search path extended");

    let scope = ScopedSearchPath {
        binding,
        guard,
        saved,
    };
    body(&scope)
}
