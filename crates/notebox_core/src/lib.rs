//! Core domain logic for notebox.
//! This crate is the single source of truth for note invariants and
//! rate-limit accounting; the HTTP crate only translates.

pub mod db;
pub mod logging;
pub mod model;
pub mod ratelimit;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::note::{Note, NoteDraft, NoteId, NoteValidationError};
pub use ratelimit::{Decision, FixedWindowLimiter, KeyStrategy, RateLimitConfig};
pub use repo::note_repo::{NoteRepository, SqliteNoteRepository};
pub use repo::{RepoError, RepoResult};
pub use service::note_service::{NoteService, NoteServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
