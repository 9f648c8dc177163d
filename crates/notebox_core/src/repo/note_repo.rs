//! Note repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD persistence APIs over the `notes` table.
//! - Keep read-modify-write updates inside one savepoint so they nest under
//!   a caller-owned transaction.
//!
//! # Invariants
//! - Timestamps are stored as Unix epoch milliseconds.
//! - Listing is always sorted by `updated_at DESC, id ASC`.
//! - Delete is permanent; no tombstone rows remain.

use crate::db::with_savepoint;
use crate::model::note::{Note, NoteDraft, NoteId};
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const NOTE_SELECT_SQL: &str = "SELECT
    id,
    title,
    content,
    created_at,
    updated_at
FROM notes";

/// Repository interface for note CRUD operations.
pub trait NoteRepository {
    /// Persists a brand-new note.
    fn insert_note(&self, note: &Note) -> RepoResult<()>;
    /// Gets one note by id.
    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>>;
    /// Lists every note, most recently updated first.
    fn list_notes(&self) -> RepoResult<Vec<Note>>;
    /// Replaces title/content of an existing note and returns the stored row.
    fn update_note(&self, id: NoteId, draft: NoteDraft, now: DateTime<Utc>) -> RepoResult<Note>;
    /// Permanently removes one note.
    fn delete_note(&self, id: NoteId) -> RepoResult<()>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// Returns `InvalidData` when the `notes` table is absent.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_notes_table(conn)?;
        Ok(Self { conn })
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn insert_note(&self, note: &Note) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                note.id.to_string(),
                note.title.as_str(),
                note.content.as_str(),
                note.created_at.timestamp_millis(),
                note.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn get_note(&self, id: NoteId) -> RepoResult<Option<Note>> {
        load_note(self.conn, id)
    }

    fn list_notes(&self) -> RepoResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL} ORDER BY updated_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_note_row(row)?);
        }
        Ok(notes)
    }

    fn update_note(&self, id: NoteId, draft: NoteDraft, now: DateTime<Utc>) -> RepoResult<Note> {
        with_savepoint(self.conn, "note_update", |conn| {
            let mut note = load_note(conn, id)?.ok_or(RepoError::NotFound(id))?;
            note.apply(draft, now);

            let changed = conn.execute(
                "UPDATE notes
                 SET
                    title = ?2,
                    content = ?3,
                    updated_at = ?4
                 WHERE id = ?1;",
                params![
                    id.to_string(),
                    note.title.as_str(),
                    note.content.as_str(),
                    note.updated_at.timestamp_millis(),
                ],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(id));
            }
            Ok(note)
        })
    }

    fn delete_note(&self, id: NoteId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn load_note(conn: &Connection, id: NoteId) -> RepoResult<Option<Note>> {
    let mut stmt = conn.prepare(&format!("{NOTE_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id.to_string()], |row| Ok(parse_note_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_note_row(row: &Row<'_>) -> RepoResult<Note> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{id_text}` in notes.id")))?;

    Ok(Note {
        id,
        title: row.get("title")?,
        content: row.get("content")?,
        created_at: millis_to_datetime(row.get("created_at")?, "created_at")?,
        updated_at: millis_to_datetime(row.get("updated_at")?, "updated_at")?,
    })
}

fn millis_to_datetime(value: i64, column: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("timestamp `{value}` out of range in notes.{column}"))
    })
}

fn ensure_notes_table(conn: &Connection) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'notes'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(RepoError::InvalidData(
            "required table `notes` is missing; run migrations first".to_string(),
        ));
    }
    Ok(())
}
