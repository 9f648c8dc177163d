//! Note route handlers.
//!
//! # Responsibility
//! - Translate requests into `NoteService` calls run through the `NoteStore`.
//!
//! # Invariants
//! - Ids that are not UUIDs and unparsable bodies never reach storage.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use notebox_core::{core_version, Note, NoteId, NoteService, NoteServiceError, SqliteNoteRepository};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Body of create and update requests. Fields are optional here so that a
/// missing field is reported as a validation error rather than a parse error.
#[derive(Debug, Deserialize)]
pub struct NoteInput {
    title: Option<String>,
    content: Option<String>,
}

pub async fn list_notes(State(state): State<AppState>) -> Result<Json<Vec<Note>>, ApiError> {
    let notes = state
        .store
        .run(|conn| with_notes(conn, |notes| notes.list()))
        .await?;

    Ok(Json(notes))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    let id = parse_note_id(&id)?;
    let note = state
        .store
        .run(move |conn| with_notes(conn, |notes| notes.get_by_id(id)))
        .await?;

    Ok(Json(note))
}

pub async fn create_note(
    State(state): State<AppState>,
    payload: Result<Json<NoteInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let note = state
        .store
        .run(move |conn| with_notes(conn, |notes| notes.create(input.title, input.content)))
        .await?;

    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NoteInput>, JsonRejection>,
) -> Result<Json<Note>, ApiError> {
    let id = parse_note_id(&id)?;
    let Json(input) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let note = state
        .store
        .run(move |conn| with_notes(conn, |notes| notes.update(id, input.title, input.content)))
        .await?;

    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_note_id(&id)?;
    state
        .store
        .run(move |conn| with_notes(conn, |notes| notes.delete(id)))
        .await?;

    Ok(Json(json!({ "message": "Note deleted successfully" })))
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": core_version() }))
}

pub async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

fn with_notes<T>(
    conn: &Connection,
    op: impl FnOnce(&NoteService<SqliteNoteRepository<'_>>) -> Result<T, NoteServiceError>,
) -> Result<T, ApiError> {
    let service = NoteService::new(SqliteNoteRepository::try_new(conn)?);
    Ok(op(&service)?)
}

// Ids that are not UUIDs cannot name a stored note.
fn parse_note_id(raw: &str) -> Result<NoteId, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}
