//! Purpose: Library crate behind the `red-introspect` CLI and JSON-RPC server.
//! Exports: `api` (entry points, envelope, errors), `core` (engines, embedded interpreter), `rpc`.
//! Role: Answers class, variable and libdoc questions about Robot Framework libraries.
//! Invariants: Only `api` entry points mutate the shared search path, and only inside a guard scope.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod rpc;
