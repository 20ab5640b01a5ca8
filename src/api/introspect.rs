//! Purpose: Entry points for class enumeration, variable extraction and libdoc generation.
//! Exports: `get_classes_from_module`, `get_variables`, `create_libdoc` and their `Result` variants.
//! Role: Scopes the search path, runs the core on an isolated worker, wraps the outcome.
//! Invariants: The search path after a call equals the path before it, for every outcome.
//! Invariants: Envelope variants never panic and never return both a result and an exception.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::envelope::ResponseEnvelope;
use super::worker::run_isolated;
use crate::core::classes::list_classes;
use crate::core::container::resolve;
use crate::core::error::Error;
use crate::core::libdoc::{JsonRenderer, LibdocPayload, LibdocRenderer, generate_libdoc};
use crate::core::search_path::with_extended_search_path;
use crate::core::variables::{VariableTable, extract_variables};

fn concat_dirs(first: &[PathBuf], second: &[PathBuf]) -> Vec<PathBuf> {
    first.iter().chain(second).cloned().collect()
}

fn log_outcome<T>(operation: &str, outcome: &Result<T, Error>) {
    match outcome {
        Ok(_) => debug!(operation, "request succeeded"),
        Err(err) => debug!(operation, kind = err.kind().label(), error = %err, "request failed"),
    }
}

pub fn classes_from_module(
    location: &Path,
    python_paths: &[PathBuf],
    class_paths: &[PathBuf],
) -> Result<Vec<String>, Error> {
    info!(location = %location.display(), "get_classes_from_module");
    let extra = concat_dirs(python_paths, class_paths);
    let outcome = run_isolated("get_classes_from_module", || {
        with_extended_search_path(&extra, |scope| {
            let handle = resolve(location)?;
            list_classes(&handle, scope)
        })
    });
    log_outcome("get_classes_from_module", &outcome);
    outcome
}

pub fn variables(location: &Path, args: &[String]) -> Result<VariableTable, Error> {
    info!(location = %location.display(), args = args.len(), "get_variables");
    let outcome = run_isolated("get_variables", || {
        with_extended_search_path(&[], |scope| extract_variables(location, args, scope))
    });
    log_outcome("get_variables", &outcome);
    outcome
}

pub fn libdoc(
    library_name: &str,
    class_dirs: &[PathBuf],
    general_dirs: &[PathBuf],
) -> Result<LibdocPayload, Error> {
    info!(library = library_name, "create_libdoc");
    let extra = concat_dirs(class_dirs, general_dirs);
    let outcome = run_isolated("create_libdoc", || {
        with_extended_search_path(&extra, |scope| generate_libdoc(library_name, scope))
    });
    log_outcome("create_libdoc", &outcome);
    outcome
}

/// Libdoc rendered through `renderer`.
pub fn render_libdoc(
    renderer: &dyn LibdocRenderer,
    library_name: &str,
    class_dirs: &[PathBuf],
    general_dirs: &[PathBuf],
) -> Result<serde_json::Value, Error> {
    let payload = libdoc(library_name, class_dirs, general_dirs)?;
    renderer.render(&payload)
}

pub fn get_classes_from_module(
    location: &Path,
    python_paths: &[PathBuf],
    class_paths: &[PathBuf],
) -> ResponseEnvelope<Vec<String>> {
    classes_from_module(location, python_paths, class_paths).into()
}

pub fn get_variables(location: &Path, args: &[String]) -> ResponseEnvelope<VariableTable> {
    variables(location, args).into()
}

pub fn create_libdoc(
    library_name: &str,
    class_dirs: &[PathBuf],
    general_dirs: &[PathBuf],
) -> ResponseEnvelope<serde_json::Value> {
    render_libdoc(&JsonRenderer, library_name, class_dirs, general_dirs).into()
}

#[cfg(test)]
mod tests {
    use super::{create_libdoc, get_classes_from_module, get_variables};
    use crate::core::search_path::snapshot;
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;

    #[test]
    fn classes_call_leaves_search_path_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let package = dir.path().join("module");
        fs::create_dir(&package).expect("mkdir");
        fs::write(package.join("__init__.py"), "").expect("write");
        fs::write(package.join("mod_1.py"), "").expect("write");

        let before: BTreeSet<_> = snapshot().into_iter().collect();
        let envelope = get_classes_from_module(
            &package.join("__init__.py"),
            &[dir.path().join("a")],
            &[dir.path().join("b")],
        );
        let after: BTreeSet<_> = snapshot().into_iter().collect();
        assert_eq!(before, after);
        let names: BTreeSet<String> = envelope.result.expect("result").into_iter().collect();
        let expected: BTreeSet<String> = ["module", "mod_1", "module.module", "module.mod_1"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, expected);
        assert!(envelope.exception.is_none());
    }

    #[test]
    fn failures_land_in_the_exception_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let envelope = get_classes_from_module(&dir.path().join("missing.py"), &[], &[]);
        assert!(envelope.result.is_none());
        assert!(envelope.exception.expect("exception").starts_with("NotFound: "));

        let syntax = dir.path().join("vars_with_syntax.py");
        fs::write(&syntax, "x = (\n").expect("write");
        let envelope = get_variables(&syntax, &[]);
        assert!(envelope.result.is_none());
        assert!(envelope.exception.expect("exception").contains("SyntaxError: "));
    }

    #[test]
    fn variables_with_argument() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vars_with_argument.py");
        fs::write(
            &path,
            "def get_variables(suffix):\n    return {'a': '1' + suffix, 'b': '2' + suffix, 'c': '3' + suffix}\n",
        )
        .expect("write");
        let envelope = get_variables(&path, &["_arg".to_string()]);
        let expected: BTreeMap<String, String> = [("a", "1_arg"), ("b", "2_arg"), ("c", "3_arg")]
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        assert_eq!(envelope.result, Some(expected));
        assert_eq!(envelope.exception, None);

        let envelope = get_variables(&path, &[]);
        assert_eq!(envelope.result, None);
        assert!(envelope.exception.expect("exception").contains("DataError: "));
    }

    #[test]
    fn libdoc_is_not_memoized_by_name() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        fs::write(first.path().join("lib.py"), "def first_keyword():\n    pass\n").expect("write");
        fs::write(second.path().join("lib.py"), "def second_keyword():\n    pass\n").expect("write");
        let one = create_libdoc("lib", &[first.path().to_path_buf()], &[]);
        let two = create_libdoc("lib", &[second.path().to_path_buf()], &[]);
        assert!(one.is_success() && two.is_success());
        assert_ne!(one, two);
        assert_eq!(
            one.result.expect("payload")["keywords"][0]["name"],
            "First Keyword"
        );
    }
}
