//! Purpose: Uniform `{ result, exception }` wrapper returned by every entry point.
//! Exports: `ResponseEnvelope`.
//! Role: Wire shape shared by the library API, the JSON-RPC server and the CLI.
//! Invariants: Exactly one of `result` and `exception` is present.
//! Invariants: `exception` starts with the error kind label, e.g. `DataError: `.

use serde::Serialize;

use crate::core::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseEnvelope<T> {
    pub result: Option<T>,
    pub exception: Option<String>,
}

impl<T> ResponseEnvelope<T> {
    pub fn success(result: T) -> Self {
        Self {
            result: Some(result),
            exception: None,
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            result: None,
            exception: Some(describe(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

impl<T> From<Result<T, Error>> for ResponseEnvelope<T> {
    fn from(outcome: Result<T, Error>) -> Self {
        match outcome {
            Ok(result) => Self::success(result),
            Err(err) => Self::failure(&err),
        }
    }
}

fn describe(err: &Error) -> String {
    match err.hint() {
        Some(hint) => format!("{err}\nHint: {hint}"),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::ResponseEnvelope;
    use crate::core::error::{Error, ErrorKind};
    use serde_json::json;

    #[test]
    fn success_serializes_null_exception() {
        let envelope = ResponseEnvelope::success(vec!["a".to_string()]);
        assert!(envelope.is_success());
        assert_eq!(
            serde_json::to_value(&envelope).expect("encode"),
            json!({"result": ["a"], "exception": null})
        );
    }

    #[test]
    fn failure_keeps_kind_label() {
        let err = Error::new(ErrorKind::SyntaxError)
            .with_message("invalid syntax")
            .with_line(3);
        let envelope: ResponseEnvelope<Vec<String>> = Err(err).into();
        assert!(!envelope.is_success());
        let exception = envelope.exception.expect("exception");
        assert!(exception.starts_with("SyntaxError: "), "{exception}");
        assert!(exception.contains("line 3"));
    }
}
