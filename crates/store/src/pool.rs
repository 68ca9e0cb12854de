//! A small blocking connection pool, grounded on the same
//! checkout/return/Condvar shape used elsewhere in the retrieval pack for
//! SQLite pooling. The store is a single on-disk file so the pool mostly
//! exists to let concurrent readers proceed without serializing through
//! one connection, while writers still benefit from WAL's
//! single-writer/many-readers model.

use crate::StoreError;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl<'a> std::ops::Deref for PooledConnection<'a> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection already returned to pool")
    }
}

impl<'a> std::ops::DerefMut for PooledConnection<'a> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection already returned to pool")
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

struct Inner {
    idle: VecDeque<Connection>,
    total: usize,
}

pub struct ConnectionPool {
    path: PathBuf,
    inner: Mutex<Inner>,
    condvar: Condvar,
    max_size: usize,
    wait_timeout: Duration,
}

impl ConnectionPool {
    pub fn open(path: impl AsRef<Path>, max_size: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let seed = Self::new_connection(&path)?;
        let mut idle = VecDeque::with_capacity(max_size);
        idle.push_back(seed);
        Ok(Self {
            path,
            inner: Mutex::new(Inner { idle, total: 1 }),
            condvar: Condvar::new(),
            max_size,
            wait_timeout: Duration::from_secs(5),
        })
    }

    fn new_connection(path: &Path) -> Result<Connection, StoreError> {
        let conn = Connection::open(path)?;
        for stmt in [
            crate::schema::ENABLE_WAL,
            crate::schema::SET_SYNCHRONOUS,
            crate::schema::ENABLE_FOREIGN_KEYS,
            crate::schema::SET_BUSY_TIMEOUT,
        ] {
            conn.execute_batch(stmt)?;
        }
        Ok(conn)
    }

    /// Checks out a connection, blocking up to `wait_timeout` if the pool
    /// is exhausted. Grows the pool lazily up to `max_size`.
    pub fn checkout(&self) -> Result<PooledConnection<'_>, StoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(conn) = guard.idle.pop_front() {
                return Ok(PooledConnection { conn: Some(conn), pool: self });
            }
            if guard.total < self.max_size {
                guard.total += 1;
                drop(guard);
                let conn = Self::new_connection(&self.path)?;
                return Ok(PooledConnection { conn: Some(conn), pool: self });
            }
            let (next, timed_out) =
                self.condvar.wait_timeout(guard, self.wait_timeout).unwrap_or_else(|e| e.into_inner());
            guard = next;
            if timed_out.timed_out() {
                return Err(StoreError::PoolExhausted);
            }
        }
    }

    fn release(&self, conn: Connection) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.idle.push_back(conn);
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_and_release_reuses_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("store.db"), 2).unwrap();
        {
            let conn = pool.checkout().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
        }
        let conn = pool.checkout().unwrap();
        conn.execute("INSERT INTO t (x) VALUES (1)", []).unwrap();
    }

    #[test]
    fn pool_grows_up_to_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ConnectionPool::open(dir.path().join("store.db"), 2).unwrap();
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        drop(a);
        drop(b);
    }
}
