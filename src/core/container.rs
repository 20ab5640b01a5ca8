//! Purpose: Classify a target location and expose it as uniform source units.
//! Exports: `ContainerKind`, `ContainerHandle`, `SourceUnit`, `resolve`.
//! Role: Front door of class enumeration; the only module that knows container layouts.
//! Invariants: Unit and member names are relative to the container; qualifiers carry the rest.
//! Invariants: Qualifiers are ordered innermost package first, root package last.
//! Invariants: Handles are built per request and never cached.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::archive::{Archive, ArchiveFlavor, archive_flavor};
use crate::core::error::{Error, ErrorKind};

const INIT_FILE: &str = "__init__.py";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    SourceFile,
    Package,
    ZipArchive,
    JarArchive,
}

impl ContainerKind {
    pub fn label(self) -> &'static str {
        match self {
            ContainerKind::SourceFile => "source file",
            ContainerKind::Package => "package",
            ContainerKind::ZipArchive => "zip archive",
            ContainerKind::JarArchive => "jar archive",
        }
    }
}

/// A loadable source text inside a container.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    /// Dotted name relative to the container; empty for an archive's own initializer.
    pub name: String,
    pub origin: PathBuf,
    pub source: String,
}

#[derive(Debug)]
pub struct ContainerHandle {
    pub kind: ContainerKind,
    pub location: PathBuf,
    /// Fully-qualified name of the container root (`module.mod_2`, `compressed`).
    pub root_name: String,
    /// Prefixes applied to every shallow name.
    pub qualifiers: Vec<String>,
    /// Whether shallow names are reported unqualified as well.
    pub bare_names: bool,
    /// Scanned for class definitions.
    pub units: Vec<SourceUnit>,
    /// Submodules and nested packages reported by name only.
    pub members: Vec<String>,
    /// Compiled classes from jar archives, already fully qualified.
    pub compiled_classes: Vec<String>,
    /// Directories or archives that imports of the container itself resolve against.
    pub import_roots: Vec<PathBuf>,
}

pub fn resolve(location: &Path) -> Result<ContainerHandle, Error> {
    if !location.exists() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("module location does not exist")
            .with_path(location));
    }
    let handle = if location.is_dir() {
        if !location.join(INIT_FILE).is_file() {
            return Err(Error::new(ErrorKind::UnsupportedContainer)
                .with_message("directory is not a package (no __init__.py)")
                .with_path(location)
                .with_hint("Point at a package, a .py file, or a .zip/.jar archive."));
        }
        resolve_package(location)?
    } else if let Some(flavor) = archive_flavor(location) {
        resolve_archive(location, flavor)?
    } else if location.file_name().is_some_and(|name| name == INIT_FILE) {
        let dir = location
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        resolve_package(dir)?
    } else if location.extension().is_some_and(|ext| ext == "py") {
        resolve_source_file(location)?
    } else {
        return Err(Error::new(ErrorKind::UnsupportedContainer)
            .with_message("unsupported module file type")
            .with_path(location)
            .with_hint("Supported: .py files, packages with __init__.py, .zip and .jar archives."));
    };
    debug!(
        kind = handle.kind.label(),
        root = %handle.root_name,
        units = handle.units.len(),
        members = handle.members.len(),
        "container resolved"
    );
    Ok(handle)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Names of the enclosing packages of `dir` (itself included), root first.
fn package_chain(dir: &Path) -> (Vec<String>, PathBuf) {
    let mut chain = Vec::new();
    let mut current = dir.to_path_buf();
    while current.join(INIT_FILE).is_file() {
        let Some(name) = current.file_name() else {
            break;
        };
        chain.push(name.to_string_lossy().into_owned());
        if !current.pop() {
            break;
        }
    }
    chain.reverse();
    (chain, current)
}

/// `[a, b, c]` gives `c`, `b.c`, `a.b.c`.
fn qualifiers_for(chain: &[String]) -> Vec<String> {
    (0..chain.len()).rev().map(|start| chain[start..].join(".")).collect()
}

fn resolve_source_file(path: &Path) -> Result<ContainerHandle, Error> {
    let dir = absolute_parent(path);
    let (chain, outer) = package_chain(&dir);
    let name = file_stem(path);
    let mut root_name = chain.join(".");
    if !root_name.is_empty() {
        root_name.push('.');
    }
    root_name.push_str(&name);
    let source = read_source(path)?;
    Ok(ContainerHandle {
        kind: ContainerKind::SourceFile,
        location: path.to_path_buf(),
        root_name,
        qualifiers: qualifiers_for(&chain),
        bare_names: true,
        units: vec![SourceUnit {
            name,
            origin: path.to_path_buf(),
            source,
        }],
        members: Vec::new(),
        compiled_classes: Vec::new(),
        import_roots: dedup_roots(vec![dir, outer]),
    })
}

fn resolve_package(dir: &Path) -> Result<ContainerHandle, Error> {
    let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    let (chain, outer) = package_chain(&dir);
    let init = dir.join(INIT_FILE);
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut members = Vec::new();
    collect_members(&dir, "", &mut members)?;
    let source = read_source(&init)?;
    Ok(ContainerHandle {
        kind: ContainerKind::Package,
        location: init.clone(),
        root_name: chain.join("."),
        qualifiers: qualifiers_for(&chain),
        bare_names: true,
        units: vec![SourceUnit {
            name,
            origin: init,
            source,
        }],
        members,
        compiled_classes: Vec::new(),
        import_roots: dedup_roots(vec![dir.clone(), outer]),
    })
}

fn absolute_parent(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    absolute.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn dedup_roots(mut roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots.dedup();
    roots
}

/// Direct submodules plus nested packages, recursively, in name order.
fn collect_members(dir: &Path, prefix: &str, members: &mut Vec<String>) -> Result<(), Error> {
    let entries = std::fs::read_dir(dir).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to list package")
            .with_path(dir)
            .with_source(err)
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            if !path.join(INIT_FILE).is_file() {
                continue;
            }
            let name = format!("{prefix}{}", path.file_name().unwrap_or_default().to_string_lossy());
            members.push(name.clone());
            collect_members(&path, &format!("{name}."), members)?;
        } else if path.extension().is_some_and(|ext| ext == "py")
            && path.file_name().is_some_and(|name| name != INIT_FILE)
        {
            let stem = file_stem(&path);
            if is_identifier(&stem) {
                members.push(format!("{prefix}{stem}"));
            }
        }
    }
    Ok(())
}

fn resolve_archive(path: &Path, flavor: ArchiveFlavor) -> Result<ContainerHandle, Error> {
    let archive = Archive::open(path)?;
    let root = file_stem(path);
    let units = archive
        .source_entries()
        .filter_map(|(entry, source)| {
            archive_unit_name(entry, &root).map(|name| SourceUnit {
                name,
                origin: archive.entry_path(entry),
                source: source.to_string(),
            })
        })
        .collect();
    let compiled_classes = match flavor {
        ArchiveFlavor::Jar => archive
            .names()
            .iter()
            .filter_map(|entry| compiled_class_name(entry))
            .collect(),
        ArchiveFlavor::Zip => Vec::new(),
    };
    let kind = match flavor {
        ArchiveFlavor::Zip => ContainerKind::ZipArchive,
        ArchiveFlavor::Jar => ContainerKind::JarArchive,
    };
    Ok(ContainerHandle {
        kind,
        location: path.to_path_buf(),
        root_name: root.clone(),
        qualifiers: vec![root],
        bare_names: false,
        units,
        members: Vec::new(),
        compiled_classes,
        import_roots: vec![path.to_path_buf()],
    })
}

/// Source text of `path`; invalid UTF-8 is replaced rather than rejected.
pub fn read_source(path: &Path) -> Result<String, Error> {
    let bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read source")
            .with_path(path)
            .with_source(err)
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Dotted unit name of a source entry; a leading directory named after the archive is folded in.
fn archive_unit_name(entry: &str, root: &str) -> Option<String> {
    let entry = entry.strip_prefix(&format!("{root}/")).unwrap_or(entry);
    let stem = entry.strip_suffix(".py")?;
    let stem = match stem.strip_suffix("__init__") {
        Some(package) => package.trim_end_matches('/'),
        None => stem,
    };
    if stem.is_empty() {
        return Some(String::new());
    }
    let segments: Vec<&str> = stem.split('/').collect();
    segments
        .iter()
        .all(|segment| is_identifier(segment))
        .then(|| segments.join("."))
}

/// `org/acme/Lib$Inner.class` becomes `org.acme.Lib.Inner`; anonymous classes are skipped.
fn compiled_class_name(entry: &str) -> Option<String> {
    if entry.starts_with("META-INF/") {
        return None;
    }
    let stem = entry.strip_suffix(".class")?;
    let (package, class) = match stem.rsplit_once('/') {
        Some((package, class)) => (Some(package), class),
        None => (None, stem),
    };
    if class == "module-info" || class == "package-info" {
        return None;
    }
    let parts: Vec<&str> = class.split('$').collect();
    if parts
        .iter()
        .any(|part| part.is_empty() || part.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let mut name = package.map(|p| p.replace('/', ".")).unwrap_or_default();
    for part in parts {
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(part);
    }
    Some(name)
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}
