//! Purpose: Load a named library and describe its keywords as a libdoc payload.
//! Exports: `LibdocPayload`, `KeywordDoc`, `ArgumentDoc`, `ArgumentKind`, `LibdocRenderer`, `JsonRenderer`, `generate_libdoc`.
//! Role: Core of `create_libdoc`; renderers turn the payload into the wire document.
//! Invariants: Every call imports afresh inside the scope it is given; nothing is memoized by name.
//! Invariants: Keywords are sorted case-insensitively by their printable name.

use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyType};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::container::read_source;
use crate::core::error::{Error, ErrorKind};
use crate::core::python::{self, FaultExt, render};
use crate::core::search_path::ScopedSearchPath;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LibdocPayload {
    pub name: String,
    pub doc: String,
    pub version: String,
    pub scope: String,
    #[serde(rename = "docFormat")]
    pub doc_format: String,
    #[serde(rename = "type")]
    pub library_type: String,
    pub source: Option<String>,
    pub lineno: u32,
    pub inits: Vec<KeywordDoc>,
    pub keywords: Vec<KeywordDoc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeywordDoc {
    pub name: String,
    pub args: Vec<ArgumentDoc>,
    pub doc: String,
    pub shortdoc: String,
    pub tags: Vec<String>,
    pub lineno: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArgumentDoc {
    pub name: String,
    pub kind: ArgumentKind,
    #[serde(rename = "defaultValue")]
    pub default_value: Option<String>,
    pub repr: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArgumentKind {
    PositionalOnly,
    PositionalOrNamed,
    VarPositional,
    NamedOnly,
    VarNamed,
}

pub trait LibdocRenderer {
    fn render(&self, payload: &LibdocPayload) -> Result<serde_json::Value, Error>;
}

/// Renders the payload as the libdoc JSON document.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl LibdocRenderer for JsonRenderer {
    fn render(&self, payload: &LibdocPayload) -> Result<serde_json::Value, Error> {
        serde_json::to_value(payload).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode libdoc")
                .with_source(err)
        })
    }
}

enum Library<'py> {
    Module(Bound<'py, PyAny>),
    Class(Bound<'py, PyType>, Bound<'py, PyAny>),
}

impl<'py> Library<'py> {
    fn module(&self) -> &Bound<'py, PyAny> {
        match self {
            Library::Module(module) | Library::Class(_, module) => module,
        }
    }

    fn object(&self) -> &Bound<'py, PyAny> {
        match self {
            Library::Module(module) => module,
            Library::Class(class, _) => class.as_any(),
        }
    }
}

/// Interpreter helpers looked up once per request.
struct Inspect<'py> {
    inspect: Bound<'py, PyModule>,
    function_type: Bound<'py, PyAny>,
    static_method: Bound<'py, PyAny>,
    class_method: Bound<'py, PyAny>,
}

impl<'py> Inspect<'py> {
    fn new(py: Python<'py>) -> PyResult<Self> {
        let builtins = py.import("builtins")?;
        Ok(Self {
            inspect: py.import("inspect")?,
            function_type: py.import("types")?.getattr("FunctionType")?,
            static_method: builtins.getattr("staticmethod")?,
            class_method: builtins.getattr("classmethod")?,
        })
    }
}

pub fn generate_libdoc(library_name: &str, scope: &ScopedSearchPath) -> Result<LibdocPayload, Error> {
    let name = library_name.trim();
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("library name is empty"));
    }
    let from_path = name.ends_with(".py");
    if from_path {
        if let Some(dir) = Path::new(name).parent().filter(|dir| !dir.as_os_str().is_empty()) {
            scope.add_import_roots(&[dir.to_path_buf()])?;
        }
    } else {
        scope.interpreter()?;
    }
    let payload = Python::with_gil(|py| {
        let library = if from_path {
            load_from_path(py, Path::new(name))?
        } else {
            load_by_name(py, name)?
        };
        describe(py, display_name(name), &library)
    })?;
    info!(
        library = %payload.name,
        keywords = payload.keywords.len(),
        "libdoc generated"
    );
    Ok(payload)
}

fn display_name(name: &str) -> &str {
    match name.strip_suffix(".py") {
        Some(stem) => stem.rsplit(['/', '\\']).next().unwrap_or(stem),
        None => name,
    }
}

fn import_failed(name: &str, err: Error) -> Error {
    let kind = match err.kind() {
        ErrorKind::SyntaxError | ErrorKind::ImportError => err.kind(),
        _ => ErrorKind::DataError,
    };
    let detail = err.to_string();
    let mut failed = Error::new(kind).with_message(format!("Importing library '{name}' failed: {detail}"));
    if let Some(line) = err.line() {
        failed = failed.with_line(line);
    }
    failed
}

/// The class named like its module, when the module defines one.
fn own_class<'py>(module: &Bound<'py, PyAny>, name: &str) -> PyResult<Option<Bound<'py, PyType>>> {
    let Some(candidate) = python::attr(module, name)? else {
        return Ok(None);
    };
    let Ok(class) = candidate.downcast_into::<PyType>() else {
        return Ok(None);
    };
    let owner = class.getattr("__module__")?;
    Ok(owner.eq(module.getattr("__name__")?)?.then_some(class))
}

fn load_from_path<'py>(py: Python<'py>, path: &Path) -> Result<Library<'py>, Error> {
    let name = display_name(&path.to_string_lossy()).to_string();
    if !path.is_file() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message(format!("library file for '{name}' does not exist"))
            .with_path(path));
    }
    let source = read_source(path)?;
    let module = python::exec_module(py, &name, path, &source, None)
        .map_err(|err| import_failed(&name, err))?
        .into_any();
    Ok(match own_class(&module, &name).or_fault(py)? {
        Some(class) => Library::Class(class, module),
        None => Library::Module(module),
    })
}

fn load_by_name<'py>(py: Python<'py>, name: &str) -> Result<Library<'py>, Error> {
    let last = name.rsplit('.').next().unwrap_or(name);
    let err = match python::import_module(py, name) {
        Ok(module) => {
            return Ok(match own_class(&module, last).or_fault(py)? {
                Some(class) => Library::Class(class, module),
                None => Library::Module(module),
            });
        }
        Err(err) => python::classify(py, &err),
    };
    let Some((parent, class_name)) = name.rsplit_once('.') else {
        return Err(import_failed(name, err));
    };
    if err.kind() != ErrorKind::ImportError {
        return Err(import_failed(name, err));
    }
    debug!(library = name, parent, "retrying import as module attribute");
    let Ok(module) = python::import_module(py, parent) else {
        return Err(import_failed(name, err));
    };
    match python::attr(&module, class_name).or_fault(py)?.map(|found| found.downcast_into::<PyType>()) {
        Some(Ok(class)) => Ok(Library::Class(class, module)),
        _ => Err(import_failed(name, err)),
    }
}

fn describe(py: Python<'_>, name: &str, library: &Library<'_>) -> Result<LibdocPayload, Error> {
    let inspect = Inspect::new(py).or_fault(py)?;
    build_payload(&inspect, name, library)
        .map_err(|err| import_failed(name, python::classify(py, &err)))
}

fn build_payload(inspect: &Inspect<'_>, name: &str, library: &Library<'_>) -> PyResult<LibdocPayload> {
    let module = library.module();
    let object = library.object();
    let is_class = matches!(library, Library::Class(..));

    let doc = text_attr(object, "__doc__")?.unwrap_or_default();
    let lineno = match library {
        Library::Module(_) => 1,
        Library::Class(class, _) => source_line(inspect, class.as_any()),
    };
    let setting = |key: &str| python::attr(object, key);

    let version = match setting("ROBOT_LIBRARY_VERSION")? {
        Some(value) => Some(value),
        None => python::attr(module, "__version__")?,
    }
    .map(|value| render(&value))
    .transpose()?
    .unwrap_or_default();
    let scope = match setting("ROBOT_LIBRARY_SCOPE")? {
        Some(value) if is_class => normalize_scope(&render(&value)?),
        _ if is_class => "TEST".to_string(),
        _ => "GLOBAL".to_string(),
    };
    let doc_format = match setting("ROBOT_LIBRARY_DOC_FORMAT")? {
        Some(value) => render(&value)?.trim().to_ascii_uppercase(),
        None => String::new(),
    };
    let doc_format = if doc_format.is_empty() {
        "ROBOT".to_string()
    } else {
        doc_format
    };
    let auto_keywords = match setting("ROBOT_AUTO_KEYWORDS")? {
        Some(value) => value.is_truthy()?,
        None => true,
    };

    let (inits, mut keywords) = match library {
        Library::Module(module) => (Vec::new(), module_keywords(inspect, module, auto_keywords)?),
        Library::Class(class, _) => (
            class_inits(inspect, class)?,
            class_keywords(inspect, class, auto_keywords)?,
        ),
    };
    keywords.sort_by_key(|keyword| keyword.name.to_lowercase());

    Ok(LibdocPayload {
        name: name.to_string(),
        doc: cleandoc(&doc),
        version,
        scope,
        doc_format,
        library_type: "LIBRARY".to_string(),
        source: text_attr(module, "__file__")?,
        lineno,
        inits,
        keywords,
    })
}

/// String attribute; anything else (including `None`) reads as absent.
fn text_attr(object: &Bound<'_, PyAny>, name: &str) -> PyResult<Option<String>> {
    Ok(python::attr(object, name)?.and_then(|value| value.extract::<String>().ok()))
}

fn source_line(inspect: &Inspect<'_>, object: &Bound<'_, PyAny>) -> u32 {
    inspect
        .inspect
        .getattr("getsourcelines")
        .and_then(|getsourcelines| getsourcelines.call1((object,)))
        .and_then(|found| found.get_item(1))
        .and_then(|line| line.extract())
        .unwrap_or(1)
}

fn normalize_scope(scope: &str) -> String {
    let upper = scope.trim().to_ascii_uppercase().replace(['_', ' '], "");
    match upper.as_str() {
        "TESTCASE" | "TEST" => "TEST",
        "TESTSUITE" | "SUITE" => "SUITE",
        "GLOBAL" => "GLOBAL",
        _ => "TEST",
    }
    .to_string()
}

fn module_keywords(
    inspect: &Inspect<'_>,
    module: &Bound<'_, PyAny>,
    auto_keywords: bool,
) -> PyResult<Vec<KeywordDoc>> {
    let exported: Option<Vec<String>> = match python::attr(module, "__all__")? {
        Some(all) => Some(all.extract()?),
        None => None,
    };
    let module_name = module.getattr("__name__")?;
    let namespace = module.getattr("__dict__")?.downcast_into::<PyDict>()?;
    let mut keywords = Vec::new();
    for (name, value) in namespace.iter() {
        let name: String = name.extract()?;
        if !value.is_instance(&inspect.function_type)? {
            continue;
        }
        let listed = match &exported {
            Some(names) => names.contains(&name),
            None => !name.starts_with('_') && value.getattr("__module__")?.eq(&module_name)?,
        };
        if listed && is_keyword(&value, auto_keywords)? {
            keywords.push(keyword_doc(inspect, &value, false)?);
        }
    }
    Ok(keywords)
}

/// Members of `class` and its bases, first definition wins; builtin owners are skipped.
fn class_members<'py>(class: &Bound<'py, PyType>) -> PyResult<Vec<(String, Bound<'py, PyAny>)>> {
    let mut members: Vec<(String, Bound<'py, PyAny>)> = Vec::new();
    for owner in class.mro().iter() {
        let owner_module: Option<String> = owner.getattr("__module__")?.extract().ok();
        if owner_module.as_deref() == Some("builtins") {
            continue;
        }
        let items = owner.getattr("__dict__")?.call_method0("items")?;
        for item in items.try_iter()? {
            let (name, member): (String, Bound<'py, PyAny>) = item?.extract()?;
            if !members.iter().any(|(seen, _)| *seen == name) {
                members.push((name, member));
            }
        }
    }
    Ok(members)
}

fn class_keywords(
    inspect: &Inspect<'_>,
    class: &Bound<'_, PyType>,
    auto_keywords: bool,
) -> PyResult<Vec<KeywordDoc>> {
    let mut keywords = Vec::new();
    for (name, member) in class_members(class)? {
        if name.starts_with('_') {
            continue;
        }
        let (function, skip_first) = if member.is_instance(&inspect.function_type)? {
            (member.clone(), true)
        } else if member.is_instance(&inspect.static_method)? {
            (member.getattr("__func__")?, false)
        } else if member.is_instance(&inspect.class_method)? {
            (member.getattr("__func__")?, true)
        } else {
            continue;
        };
        if is_keyword(&function, auto_keywords)? {
            keywords.push(keyword_doc(inspect, &function, skip_first)?);
        }
    }
    Ok(keywords)
}

fn class_inits(inspect: &Inspect<'_>, class: &Bound<'_, PyType>) -> PyResult<Vec<KeywordDoc>> {
    let init = class_members(class)?
        .into_iter()
        .find(|(name, _)| name == "__init__")
        .map(|(_, init)| init);
    match init {
        Some(init) if init.is_instance(&inspect.function_type)? => {
            let mut doc = keyword_doc(inspect, &init, true)?;
            doc.name = "__init__".to_string();
            Ok(vec![doc])
        }
        _ => Ok(Vec::new()),
    }
}

fn is_keyword(function: &Bound<'_, PyAny>, auto_keywords: bool) -> PyResult<bool> {
    let excluded = match python::attr(function, "robot_not_keyword")? {
        Some(marker) => marker.is_truthy()?,
        None => false,
    };
    if excluded {
        return Ok(false);
    }
    Ok(auto_keywords || function.hasattr("robot_name")?)
}

fn keyword_doc(inspect: &Inspect<'_>, function: &Bound<'_, PyAny>, skip_first: bool) -> PyResult<KeywordDoc> {
    let name = match text_attr(function, "robot_name")? {
        Some(custom) => custom,
        None => printable_name(&function.getattr("__name__")?.extract::<String>()?),
    };
    let tags = match python::attr(function, "robot_tags")? {
        Some(tags) if !tags.is_none() => tags
            .try_iter()?
            .map(|tag| tag.and_then(|tag| render(&tag)))
            .collect::<PyResult<Vec<_>>>()?,
        _ => Vec::new(),
    };
    let doc = cleandoc(&text_attr(function, "__doc__")?.unwrap_or_default());
    let lineno = inspect
        .inspect
        .getattr("unwrap")
        .and_then(|unwrap| unwrap.call1((function,)))
        .and_then(|inner| inner.getattr("__code__"))
        .and_then(|code| code.getattr("co_firstlineno"))
        .and_then(|line| line.extract())
        .unwrap_or(0);
    Ok(KeywordDoc {
        name,
        args: argument_docs(inspect, function, skip_first)?,
        shortdoc: shortdoc(&doc),
        doc,
        tags,
        lineno,
    })
}

fn argument_docs(
    inspect: &Inspect<'_>,
    function: &Bound<'_, PyAny>,
    skip_first: bool,
) -> PyResult<Vec<ArgumentDoc>> {
    let Ok(signature) = inspect.inspect.getattr("signature")?.call1((function,)) else {
        return Ok(Vec::new());
    };
    let parameters = signature.getattr("parameters")?.call_method0("values")?;
    let mut args = Vec::new();
    for (index, parameter) in parameters.try_iter()?.enumerate() {
        let parameter = parameter?;
        if skip_first && index == 0 {
            continue;
        }
        let name: String = parameter.getattr("name")?.extract()?;
        let kind_name: String = parameter.getattr("kind")?.getattr("name")?.extract()?;
        let (kind, marker) = match kind_name.as_str() {
            "POSITIONAL_ONLY" => (ArgumentKind::PositionalOnly, ""),
            "VAR_POSITIONAL" => (ArgumentKind::VarPositional, "*"),
            "KEYWORD_ONLY" => (ArgumentKind::NamedOnly, ""),
            "VAR_KEYWORD" => (ArgumentKind::VarNamed, "**"),
            _ => (ArgumentKind::PositionalOrNamed, ""),
        };
        let default = parameter.getattr("default")?;
        let default_value = if default.is(&parameter.getattr("empty")?) {
            None
        } else {
            Some(render(&default)?)
        };
        let repr = match &default_value {
            Some(default) => format!("{marker}{name}={default}"),
            None => format!("{marker}{name}"),
        };
        args.push(ArgumentDoc {
            name,
            kind,
            default_value,
            repr,
        });
    }
    Ok(args)
}

/// `my_keyword` and `myKeyword` both become `My Keyword`.
pub fn printable_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut parts: Vec<String> = spaced.split_whitespace().map(str::to_string).collect();
    if parts.len() == 1 && !(name.chars().all(char::is_alphabetic) && name == name.to_lowercase()) {
        parts = split_camel_case(&parts[0]);
    }
    parts
        .iter()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_camel_case(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut tokens = Vec::new();
    let mut token = String::new();
    for (index, &current) in chars.iter().enumerate() {
        if index > 0 && current.is_uppercase() {
            let previous = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            let boundary = previous.is_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_uppercase() && next_is_lower);
            if boundary && !token.is_empty() {
                tokens.push(std::mem::take(&mut token));
            }
        }
        token.push(current);
    }
    if !token.is_empty() {
        tokens.push(token);
    }
    tokens
}

/// Docstring cleanup the way `inspect.cleandoc` does it.
pub fn cleandoc(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned: Vec<&str> = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if index == 0 {
            cleaned.push(line.trim_start());
        } else {
            cleaned.push(line.get(margin..).unwrap_or("").trim_end());
        }
    }
    while cleaned.first().is_some_and(|line| line.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

/// First paragraph of a cleaned doc, joined onto one line.
fn shortdoc(doc: &str) -> String {
    doc.lines()
        .take_while(|line| !line.trim().is_empty())
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}
