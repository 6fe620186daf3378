//! Declarative test automation engine.
//!
//! Cases are JSON documents grouped by module (api, ui, ssh) and
//! submodule, loaded from a case tree, filtered by tags and executed by
//! per-backend interpreters behind a shared bounded-concurrency
//! scheduler. Every attempted case produces exactly one uniform
//! [`model::CaseResult`].

pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod report;
pub mod store;
