//! Nestable atomic sections.
//!
//! `SAVEPOINT` opens a transaction when none is active and nests inside one
//! otherwise, so repository and limiter writes stay atomic both on a bare
//! connection and under a caller-owned transaction.

use log::warn;
use rusqlite::Connection;

/// Runs `op` inside the savepoint `name`.
///
/// The savepoint is released when `op` succeeds and rolled back when it fails.
/// `name` must be a plain SQL identifier.
pub fn with_savepoint<T, E>(
    conn: &Connection,
    name: &str,
    op: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;

    let outcome = op(conn).and_then(|value| {
        conn.execute_batch(&format!("RELEASE {name};"))?;
        Ok(value)
    });

    if outcome.is_err() {
        if let Err(err) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};")) {
            warn!("event=savepoint_rollback module=db status=error name={name} error={err}");
        }
    }
    outcome
}
