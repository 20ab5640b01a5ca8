//! Purpose: Read zip-family and jar archives into an in-memory virtual namespace.
//! Exports: `Archive`, `ArchiveFlavor`, `archive_flavor`.
//! Role: Backs archive containers; imports from archives on `sys.path` go through the interpreter.
//! Invariants: Entry names use `/` separators and never start with `/`.
//! Invariants: Only source entries are decoded; other entries are listed by name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveFlavor {
    Zip,
    Jar,
}

/// Archive flavor implied by the file extension, if any.
pub fn archive_flavor(path: &Path) -> Option<ArchiveFlavor> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "zip" | "egg" | "whl" => Some(ArchiveFlavor::Zip),
        "jar" => Some(ArchiveFlavor::Jar),
        _ => None,
    }
}

pub struct Archive {
    path: PathBuf,
    names: Vec<String>,
    sources: BTreeMap<String, String>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open archive")
                .with_path(path)
                .with_source(err)
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|err| {
            Error::new(ErrorKind::DataError)
                .with_message("invalid archive")
                .with_path(path)
                .with_source(err)
        })?;

        let mut names = Vec::with_capacity(archive.len());
        let mut sources = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|err| {
                Error::new(ErrorKind::DataError)
                    .with_message("unreadable archive entry")
                    .with_path(path)
                    .with_source(err)
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').replace('\\', "/");
            if name.ends_with(".py") {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message(format!("failed to read archive entry '{name}'"))
                        .with_path(path)
                        .with_source(err)
                })?;
                sources.insert(name.clone(), String::from_utf8_lossy(&bytes).into_owned());
            }
            names.push(name);
        }
        debug!(
            archive = %path.display(),
            entries = names.len(),
            sources = sources.len(),
            "archive indexed"
        );
        Ok(Self {
            path: path.to_path_buf(),
            names,
            sources,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Source entries in name order.
    pub fn source_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }

    /// Display path of an entry, e.g. `lib.zip/pkg/mod.py`.
    pub fn entry_path(&self, entry: &str) -> PathBuf {
        self.path.join(entry)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    pub fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).expect("create archive");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in entries {
            zip.start_file(*name, options).expect("start entry");
            zip.write_all(body.as_bytes()).expect("write entry");
        }
        zip.finish().expect("finish archive");
    }
}
