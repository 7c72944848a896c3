//! recipec — deployment recipe compiler.
//!
//! Parses service, application, cloud and template recipes, resolves
//! layered property overlays and `extend` inheritance, binds declarations
//! onto typed entities and runs post-construction validation.

pub mod cli;
pub mod core;
