// Core modules: search-path guard, embedded interpreter, container handling, introspection engines and errors.
pub mod archive;
pub mod classes;
pub mod container;
pub mod error;
pub mod libdoc;
pub mod python;
pub mod search_path;
pub mod variables;
