//! Purpose: Run one introspection request on a dedicated thread with a deep stack.
//! Exports: `run_isolated`.
//! Role: Gives the interpreter's parser and compiler room to recurse and turns panics into errors.
//! Invariants: A panic never escapes; it becomes an `Internal` error naming the operation.
//! Invariants: The caller blocks until the worker finishes, so requests stay sequential.

use std::any::Any;
use std::thread;

use tracing::error;

use crate::core::error::{Error, ErrorKind};

const WORKER_STACK_BYTES: usize = 64 * 1024 * 1024;

pub fn run_isolated<T, F>(operation: &str, body: F) -> Result<T, Error>
where
    T: Send,
    F: FnOnce() -> Result<T, Error> + Send,
{
    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name(format!("introspect-{operation}"))
            .stack_size(WORKER_STACK_BYTES)
            .spawn_scoped(scope, body)
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to start introspection worker")
                    .with_source(err)
            })?;
        worker.join().unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(operation, panic = %message, "introspection worker panicked");
            Err(Error::new(ErrorKind::Internal)
                .with_message(format!("{operation} panicked: {message}")))
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
