//! Bounded SQLite connection pool.
//!
//! # Responsibility
//! - Hand out migrated connections to concurrent callers.
//! - Open file connections lazily up to `max_size`.
//!
//! # Invariants
//! - The pool mutex is never held across SQLite I/O.
//! - In-memory pools own exactly one connection; a second in-memory
//!   connection would be a different, empty database.
//! - Checkout waits at most `checkout_timeout`.

use super::open::{open_file_with, open_memory_with, DEFAULT_BUSY_TIMEOUT};
use super::{DbError, DbResult};
use log::{debug, warn};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Pool sizing and timeout knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: usize,
    pub busy_timeout: Duration,
    pub checkout_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            checkout_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
enum Target {
    File(PathBuf),
    Memory,
}

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Shared connection pool; safe for unlimited concurrent checkouts.
pub struct ConnectionPool {
    target: Target,
    options: PoolOptions,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    /// Opens a pool over a database file, migrating it on first open.
    pub fn open_file(path: impl AsRef<Path>, options: PoolOptions) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let first = open_file_with(&path, options.busy_timeout)?;
        Ok(Self::with_first(Target::File(path), options, first))
    }

    /// Opens a single-connection pool over a private in-memory database.
    pub fn in_memory(options: PoolOptions) -> DbResult<Self> {
        let first = open_memory_with(options.busy_timeout)?;
        let options = PoolOptions {
            max_size: 1,
            ..options
        };
        Ok(Self::with_first(Target::Memory, options, first))
    }

    fn with_first(target: Target, options: PoolOptions, first: Connection) -> Self {
        Self {
            target,
            options: PoolOptions {
                max_size: options.max_size.max(1),
                ..options
            },
            state: Mutex::new(PoolState {
                idle: vec![first],
                open: 1,
            }),
            available: Condvar::new(),
        }
    }

    pub fn options(&self) -> PoolOptions {
        self.options
    }

    /// Number of connections currently opened by this pool.
    pub fn open_connections(&self) -> usize {
        self.lock_state().open
    }

    /// Borrows one connection, opening a new one or waiting if all are busy.
    ///
    /// # Errors
    /// - `DbError::PoolTimeout` when nothing frees up before the checkout
    ///   timeout.
    /// - Any bootstrap error from opening a new file connection.
    pub fn checkout(&self) -> DbResult<PooledConnection<'_>> {
        let started_at = Instant::now();
        let deadline = started_at + self.options.checkout_timeout;
        let mut state = self.lock_state();

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(self, conn));
            }

            if let Target::File(path) = &self.target {
                if state.open < self.options.max_size {
                    state.open += 1;
                    let open_count = state.open;
                    drop(state);
                    debug!("event=pool_grow module=db status=start open={open_count}");
                    return match open_file_with(path, self.options.busy_timeout) {
                        Ok(conn) => Ok(PooledConnection::new(self, conn)),
                        Err(err) => {
                            self.lock_state().open -= 1;
                            self.available.notify_one();
                            Err(err)
                        }
                    };
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = started_at.elapsed().as_millis();
                warn!(
                    "event=pool_checkout module=db status=error error_code=pool_timeout waited_ms={waited_ms}"
                );
                return Err(DbError::PoolTimeout { waited_ms });
            }

            let (next, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    fn checkin(&self, conn: Connection) {
        self.lock_state().idle.push(conn);
        self.available.notify_one();
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // Pool state is a plain list; a panicking holder cannot leave it torn.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection borrowed from a [`ConnectionPool`]; returned on drop.
pub struct PooledConnection<'pool> {
    pool: &'pool ConnectionPool,
    conn: Option<Connection>,
}

impl<'pool> PooledConnection<'pool> {
    fn new(pool: &'pool ConnectionPool, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.checkin(conn);
        }
    }
}
