//! Process-wide handle to the SQLite connection.
//!
//! # Responsibility
//! - Own the single migrated connection, shared with every handler through
//!   router state.
//! - Run blocking SQLite calls on the blocking pool, bounded by `timeout`.
//!
//! # Invariants
//! - Each call runs inside its own transaction; it commits only when the call
//!   finishes before its deadline.
//! - A call that misses its deadline is interrupted or skipped and its writes
//!   are rolled back, so a `StorageUnavailable` answer never hides a write.
//! - Failures are never retried here.
//! - After `close`, every call fails with `StorageUnavailable`.
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;

use log::warn;
use notebox_core::db::{close_db, DbResult};
use rusqlite::{Connection, InterruptHandle};
use tokio::{task::spawn_blocking, time::timeout};

use crate::error::ApiError;

const CALL_QUEUED: u8 = 0;
const CALL_RUNNING: u8 = 1;
const CALL_FINISHED: u8 = 2;
const CALL_ABANDONED: u8 = 3;

#[derive(Clone)]
pub struct NoteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    interrupt: Arc<InterruptHandle>,
    timeout: Duration,
}

impl NoteStore {
    pub fn new(conn: Connection, timeout: Duration) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt,
            timeout,
        }
    }

    /// Runs `op` in a transaction on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let state = Arc::new(AtomicU8::new(CALL_QUEUED));
        let worker_state = Arc::clone(&state);

        let mut task = spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ApiError::StorageUnavailable("connection lock poisoned".into()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| ApiError::StorageUnavailable("store is closed".into()))?;

            if !advance(&worker_state, CALL_QUEUED, CALL_RUNNING) {
                return Err(abandoned());
            }
            let tx = conn.unchecked_transaction()?;
            let value = op(&*tx)?;
            if !advance(&worker_state, CALL_RUNNING, CALL_FINISHED) {
                // Dropping `tx` rolls the call back.
                return Err(abandoned());
            }
            tx.commit()?;
            Ok(value)
        });

        match timeout(self.timeout, &mut task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                warn!(
                    "event=storage_timeout module=store status=error timeout_ms={}",
                    self.timeout.as_millis()
                );
                if advance(&state, CALL_QUEUED, CALL_ABANDONED) {
                    return Err(self.timed_out());
                }
                if advance(&state, CALL_RUNNING, CALL_ABANDONED) {
                    self.interrupt.interrupt();
                    return Err(self.timed_out());
                }
                // The call finished its work right at the deadline and is
                // committing; report what actually happened.
                flatten(task.await)
            }
        }
    }

    /// Closes the underlying connection. Safe to call more than once.
    ///
    /// Blocks until in-flight calls release the connection.
    pub fn close(&self) -> DbResult<()> {
        let taken = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match taken {
            Some(conn) => close_db(conn),
            None => Ok(()),
        }
    }

    fn timed_out(&self) -> ApiError {
        ApiError::StorageUnavailable(format!(
            "storage call exceeded {} ms",
            self.timeout.as_millis()
        ))
    }
}

fn advance(state: &AtomicU8, from: u8, to: u8) -> bool {
    state
        .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn abandoned() -> ApiError {
    ApiError::StorageUnavailable("storage call abandoned after timeout".into())
}

fn flatten<T>(joined: Result<Result<T, ApiError>, tokio::task::JoinError>) -> Result<T, ApiError> {
    joined.unwrap_or_else(|join_error| {
        Err(ApiError::StorageUnavailable(format!(
            "storage task failed: {join_error}"
        )))
    })
}
