//! Connection pooling for database access.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::{Connection, OpenFlags};

use super::config::DatabaseConfig;
use super::error::{DatabaseError, DatabaseResult};

/// A database connection borrowed from the pool.
///
/// Goes back to the pool when dropped.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ConnectionPoolInner>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

struct PoolState {
    idle: VecDeque<Connection>,
    created: usize,
}

struct ConnectionPoolInner {
    config: DatabaseConfig,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl ConnectionPoolInner {
    fn release(&self, conn: Connection) {
        let mut state = self.state.lock();
        if conn.is_autocommit() {
            state.idle.push_back(conn);
        } else {
            // Still inside a transaction; never hand this one out again.
            warn!("discarding pooled connection left inside a transaction");
            state.created -= 1;
        }
        drop(state);
        self.released.notify_one();
    }
}

/// Bounded pool of SQLite connections.
///
/// Connections are opened lazily up to the configured limit. Cloning the
/// pool shares it.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<ConnectionPoolInner>,
}

impl ConnectionPool {
    /// Create a new connection pool.
    ///
    /// One connection is opened immediately so a bad path or a missing file
    /// fails here rather than on first use.
    pub fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;

        if let Some(path) = config.path() {
            if !config.create_if_missing && !path.exists() {
                return Err(DatabaseError::NotFound(path.to_path_buf()));
            }
        }

        let first = open_connection(&config)?;
        let inner = Arc::new(ConnectionPoolInner {
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::from([first]),
                created: 1,
            }),
            released: Condvar::new(),
        });

        Ok(Self { inner })
    }

    /// Get a connection from the pool.
    ///
    /// Blocks until a connection is free or the acquire timeout passes.
    pub fn get(&self) -> DatabaseResult<PooledConnection> {
        let started = Instant::now();
        let deadline = started + self.inner.config.acquire_timeout_duration();
        let limit = self.inner.config.connection_limit();

        let mut state = self.inner.state.lock();
        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(self.wrap(conn));
            }

            if state.created < limit {
                // Reserve the slot, then open outside the lock.
                state.created += 1;
                drop(state);

                return match open_connection(&self.inner.config) {
                    Ok(conn) => {
                        debug!("opened pooled connection ({} of {})", self.created(), limit);
                        Ok(self.wrap(conn))
                    }
                    Err(e) => {
                        self.inner.state.lock().created -= 1;
                        self.inner.released.notify_one();
                        Err(e)
                    }
                };
            }

            if self
                .inner
                .released
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.idle.is_empty()
                && state.created >= limit
            {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!("connection pool exhausted after {}ms", waited_ms);
                return Err(DatabaseError::PoolTimeout {
                    waited_ms,
                    max_connections: limit,
                });
            }
        }
    }

    fn wrap(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
        }
    }

    /// Get the number of idle connections.
    pub fn available(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Get the total number of open connections, idle or borrowed.
    pub fn created(&self) -> usize {
        self.inner.state.lock().created
    }

    /// Get the configuration the pool was built from.
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionPool")
            .field("path", &self.inner.config.path)
            .field("idle", &state.idle.len())
            .field("created", &state.created)
            .finish()
    }
}

fn open_connection(config: &DatabaseConfig) -> DatabaseResult<Connection> {
    let conn = match config.path() {
        Some(path) => {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if config.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            Connection::open_with_flags(path, flags)?
        }
        None => Connection::open_in_memory()?,
    };

    conn.busy_timeout(config.busy_timeout_duration())?;

    if config.wal && !config.is_in_memory() {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("journal mode set to {}", mode);
    }

    Ok(conn)
}
