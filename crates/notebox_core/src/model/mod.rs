//! Domain model for notes.
//!
//! # Responsibility
//! - Define the data structures shared by repository, service and HTTP layers.
//!
//! # Invariants
//! - Every note is identified by a stable `NoteId`.
//! - Deletion is a hard delete; there is no tombstone state.

pub mod note;
