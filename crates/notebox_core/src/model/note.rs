//! Note domain model.
//!
//! # Responsibility
//! - Define the canonical note record exposed by the API.
//! - Validate user-supplied note fields before they reach storage.
//!
//! # Invariants
//! - `id` is stable and never reused for another note.
//! - `updated_at` is never earlier than `created_at`.
//! - `title` and `content` are never blank once persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a note.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type NoteId = Uuid;

/// Persisted note as returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every successful mutation.
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new note from validated fields with a generated ID.
    ///
    /// `created_at` and `updated_at` both start at `now`.
    pub fn new(draft: NoteDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            content: draft.content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces title/content and bumps `updated_at`.
    ///
    /// The new timestamp is at least one millisecond after the previous one,
    /// so two updates inside the same clock tick still order strictly.
    pub fn apply(&mut self, draft: NoteDraft, now: DateTime<Utc>) {
        self.title = draft.title;
        self.content = draft.content;
        self.updated_at = next_updated_at(self.updated_at, now);
    }
}

/// Computes the next `updated_at` value for a mutation at `now`.
pub fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::milliseconds(1);
    if now < floor {
        floor
    } else {
        now
    }
}

/// Validation failures for user-supplied note fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteValidationError {
    MissingTitle,
    MissingContent,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTitle => write!(f, "title is required"),
            Self::MissingContent => write!(f, "content is required"),
        }
    }
}

impl Error for NoteValidationError {}

/// Validated title/content pair used by create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    /// Validates raw input.
    ///
    /// Missing and empty values are rejected. Any other string, including
    /// whitespace-only text, is stored as given.
    pub fn parse(
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Self, NoteValidationError> {
        let title = title
            .filter(|value| !value.is_empty())
            .ok_or(NoteValidationError::MissingTitle)?;
        let content = content
            .filter(|value| !value.is_empty())
            .ok_or(NoteValidationError::MissingContent)?;
        Ok(Self { title, content })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
