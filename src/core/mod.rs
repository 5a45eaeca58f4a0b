//! Core modules for intercept.
//!
//! Everything except argument parsing lives here: locating executables, rule documents, the
//! rewrite pipeline, wrapper generation and the interception state machine.

pub mod error;
pub mod interception;
pub mod journal;
pub mod launch;
pub mod migration;
pub mod output;
pub mod resolver;
pub mod rewrite;
pub mod rules;
pub mod settings;
pub mod store;
pub mod wrapper;
