//! Core types: task identity, scopes, contexts, settings and errors.

pub mod context;
pub mod environment;
pub mod error;
pub mod scope;
pub mod settings;
pub mod task;
pub mod types;
