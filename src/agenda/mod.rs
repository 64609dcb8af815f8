// src/agenda/mod.rs

//! Agenda document handling.
//!
//! The agenda is the declarative YAML document listing procedures
//! (parameterized command templates), stages (coarse ordering barriers over
//! procedure names), and tasks (procedure instantiations with concrete
//! arguments and declared input/output files).
//!
//! - [`model`] holds the raw serde types and the normalized [`Agenda`].
//! - [`loader`] reads YAML from disk or a string.
//! - [`validate`] turns a raw document into a normalized one, rejecting the
//!   first structural violation found.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{Agenda, RawAgenda, RawTask, TaskIdentity, TaskSpec};
