//! Purpose: Define the public Rust API boundary for introspection requests.
//! Exports: Entry points, the response envelope, libdoc payload types and errors.
//! Role: Public, additive-only surface used by the JSON-RPC server and the CLI.
//! Invariants: Callers never touch the search path directly; entry points scope it.
//! Invariants: The embedded interpreter stays reachable only through these entry points.

mod envelope;
mod introspect;
mod worker;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::libdoc::{
    ArgumentDoc, ArgumentKind, JsonRenderer, KeywordDoc, LibdocPayload, LibdocRenderer,
};
pub use crate::core::python::prepare as prepare_interpreter;
pub use crate::core::search_path::{seed_base_search_path, snapshot as search_path_snapshot};
pub use crate::core::variables::VariableTable;
pub use envelope::ResponseEnvelope;
pub use introspect::{
    classes_from_module, create_libdoc, get_classes_from_module, get_variables, libdoc,
    render_libdoc, variables,
};
