//! Minimal `robot.api.deco` for interpreters without Robot Framework installed.
//!
//! Libraries import `keyword`, `not_keyword` and `library` at load time; the
//! markers they set (`robot_name`, `robot_tags`, `robot_not_keyword`,
//! `ROBOT_AUTO_KEYWORDS`, ...) are the same attributes the real package sets.

use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::debug;

use super::loader::run_source;

const DECO_SOURCE: &str = r#"
def _target(func):
    return getattr(func, '__func__', func)


def keyword(name=None, tags=(), types=()):
    if callable(name):
        return keyword()(name)

    def decorator(func):
        target = _target(func)
        target.robot_name = name
        target.robot_tags = list(tags)
        target.robot_types = types
        return func

    return decorator


def not_keyword(func):
    _target(func).robot_not_keyword = True
    return func


def library(scope=None, version=None, converters=None, doc_format=None,
            listener=None, auto_keywords=False):
    if isinstance(scope, type):
        return library()(scope)

    def decorator(cls):
        if scope is not None:
            cls.ROBOT_LIBRARY_SCOPE = scope
        if version is not None:
            cls.ROBOT_LIBRARY_VERSION = version
        if converters is not None:
            cls.ROBOT_LIBRARY_CONVERTERS = converters
        if doc_format is not None:
            cls.ROBOT_LIBRARY_DOC_FORMAT = doc_format
        if listener is not None:
            cls.ROBOT_LIBRARY_LISTENER = listener
        cls.ROBOT_AUTO_KEYWORDS = auto_keywords
        return cls

    return decorator
"#;

/// Register `robot`, `robot.api` and `robot.api.deco` unless a real `robot` is importable.
pub(super) fn install_if_missing(py: Python<'_>) -> PyResult<bool> {
    let modules = py.import("sys")?.getattr("modules")?.downcast_into::<PyDict>()?;
    if modules.contains("robot")? {
        return Ok(false);
    }
    let find_spec = py.import("importlib.util")?.getattr("find_spec")?;
    if !find_spec.call1(("robot",))?.is_none() {
        return Ok(false);
    }

    let deco = PyModule::new(py, "robot.api.deco")?;
    run_source(py, DECO_SOURCE, "<robot.api.deco>", &deco.dict())?;
    let api = PyModule::new(py, "robot.api")?;
    for name in ["keyword", "not_keyword", "library"] {
        api.setattr(name, deco.getattr(name)?)?;
    }
    api.setattr("deco", &deco)?;
    let robot = PyModule::new(py, "robot")?;
    robot.setattr("api", &api)?;

    modules.set_item("robot", &robot)?;
    modules.set_item("robot.api", &api)?;
    modules.set_item("robot.api.deco", &deco)?;
    debug!("robot.api.deco fallback installed");
    Ok(true)
}
