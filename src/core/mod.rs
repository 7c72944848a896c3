//! Recipe compiler core — parsing, overlays, evaluation, binding, validation.

pub mod binder;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod entity;
pub mod error;
mod evaluator;
pub mod extend;
pub mod overlay;
pub mod parser;
pub mod provenance;
pub mod registry;
pub mod types;
pub mod validate;

pub use compiler::{CompileOptions, CompiledRecipe, Compiler};
pub use error::{CompileError, ErrorKind};
pub use registry::Registry;
