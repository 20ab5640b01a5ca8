use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    UnsupportedContainer,
    DataError,
    SyntaxError,
    ImportError,
    Io,
}

impl ErrorKind {
    /// Label rendered in front of every message; callers match on it by substring.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Internal => "InternalError",
            ErrorKind::Usage => "UsageError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::UnsupportedContainer => "UnsupportedContainer",
            ErrorKind::DataError => "DataError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::Io => "IOError",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    line: Option<u32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            line: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach a path only when none was recorded closer to the fault.
    pub fn or_path(mut self, path: impl Into<PathBuf>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.label())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, " ({}, line {line})", path.display())?,
            (Some(path), None) => write!(f, " ({})", path.display())?,
            (None, Some(line)) => write!(f, " (line {line})")?,
            (None, None) => {}
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::UnsupportedContainer => 4,
        ErrorKind::DataError => 5,
        ErrorKind::SyntaxError => 6,
        ErrorKind::ImportError => 7,
        ErrorKind::Io => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, to_exit_code};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::NotFound, 3),
            (ErrorKind::UnsupportedContainer, 4),
            (ErrorKind::DataError, 5),
            (ErrorKind::SyntaxError, 6),
            (ErrorKind::ImportError, 7),
            (ErrorKind::Io, 8),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_leads_with_kind_label() {
        let err = Error::new(ErrorKind::SyntaxError)
            .with_message("invalid syntax")
            .with_path("/tmp/vars.py")
            .with_line(3);
        assert_eq!(err.to_string(), "SyntaxError: invalid syntax (/tmp/vars.py, line 3)");

        let err = Error::new(ErrorKind::DataError).with_message("no result");
        assert!(err.to_string().starts_with("DataError: "));
    }

    #[test]
    fn or_path_keeps_innermost_location() {
        let err = Error::new(ErrorKind::SyntaxError)
            .with_path("/inner.py")
            .or_path("/outer.py");
        assert_eq!(err.path().unwrap().to_str(), Some("/inner.py"));
    }
}
