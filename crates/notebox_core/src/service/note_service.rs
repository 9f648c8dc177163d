//! Note use-case service.
//!
//! # Responsibility
//! - Provide the create/list/get/update/delete use-cases behind the API.
//! - Validate raw input before anything touches storage.
//! - Collapse repository errors into the domain error taxonomy.
//!
//! # Invariants
//! - Invalid input never reaches the repository, so it alters nothing.
//! - `update` uses full replacement semantics for title and content.
//! - Note list is always sorted by `updated_at DESC, id ASC`.

use crate::model::note::{Note, NoteDraft, NoteId, NoteValidationError};
use crate::repo::note_repo::NoteRepository;
use crate::repo::RepoError;
use chrono::{DateTime, SubsecRound, Utc};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

// Timestamps are persisted as epoch milliseconds.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Service error for note use-cases.
#[derive(Debug)]
pub enum NoteServiceError {
    /// Caller supplied missing or blank fields.
    Validation(NoteValidationError),
    /// Target note does not exist.
    NotFound(NoteId),
    /// Store unreachable or returned unusable data.
    StorageUnavailable(RepoError),
}

impl Display for NoteServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for NoteServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StorageUnavailable(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for NoteServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::StorageUnavailable(other),
        }
    }
}

impl From<NoteValidationError> for NoteServiceError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Note service facade over repository implementations.
pub struct NoteService<R: NoteRepository> {
    repo: R,
}

impl<R: NoteRepository> NoteService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one note with a generated id and fresh timestamps.
    pub fn create(
        &self,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Note, NoteServiceError> {
        let draft = NoteDraft::parse(title, content)?;
        let note = Note::new(draft, now_millis());
        self.repo.insert_note(&note)?;
        debug!("event=note_create module=service status=ok note_id={}", note.id);
        Ok(note)
    }

    /// Returns every note, most recently updated first.
    pub fn list(&self) -> Result<Vec<Note>, NoteServiceError> {
        Ok(self.repo.list_notes()?)
    }

    /// Gets one note by stable id.
    pub fn get_by_id(&self, id: NoteId) -> Result<Note, NoteServiceError> {
        self.repo
            .get_note(id)?
            .ok_or(NoteServiceError::NotFound(id))
    }

    /// Replaces title and content of an existing note.
    pub fn update(
        &self,
        id: NoteId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Note, NoteServiceError> {
        let draft = NoteDraft::parse(title, content)?;
        let note = self.repo.update_note(id, draft, now_millis())?;
        debug!("event=note_update module=service status=ok note_id={}", note.id);
        Ok(note)
    }

    /// Permanently deletes one note.
    pub fn delete(&self, id: NoteId) -> Result<(), NoteServiceError> {
        self.repo.delete_note(id)?;
        debug!("event=note_delete module=service status=ok note_id={id}");
        Ok(())
    }
}
