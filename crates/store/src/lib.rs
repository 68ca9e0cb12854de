//! bridge_store
//!
//! Component J — the embedded relational persistence layer. rusqlite in
//! WAL mode, schema created idempotently at startup, file mode 0600 and
//! directory mode 0700 enforced on Unix. No migrations: the store's
//! state is operational, not a system of record.

mod pool;
pub mod schema;

pub use pool::{ConnectionPool, PooledConnection};

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("pool exhausted: no connection became available before the wait timeout")]
    PoolExhausted,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Opens (creating if absent) the database at `path`, applies the
    /// schema, and secures file/directory permissions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
                secure_dir_permissions(dir)?;
            }
        }
        let pool = ConnectionPool::open(path, 4)?;
        {
            let conn = pool.checkout()?;
            apply_schema(&conn)?;
        }
        secure_file_permissions(path)?;
        Ok(Self { pool })
    }

    pub fn checkout(&self) -> Result<PooledConnection<'_>, StoreError> {
        self.pool.checkout()
    }

    /// Runs `f` with a pooled connection. Convenience wrapper for callers
    /// that don't need to hold the connection across awaits.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, StoreError> {
        let conn = self.checkout()?;
        f(&conn).map_err(StoreError::from)
    }

    /// Deletes expired rows from every TTL'd table (spec §4.J). Returns
    /// the number of rows removed, for logging by the caller.
    pub fn cleanup_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let conn = self.checkout()?;
        let mut total = 0u64;
        for (table, column) in schema::TTL_TABLES {
            let sql = format!("DELETE FROM {table} WHERE {column} < ?1");
            total += conn.execute(&sql, [now_ms])? as u64;
        }
        Ok(total)
    }
}

fn apply_schema(conn: &Connection) -> Result<(), StoreError> {
    for stmt in schema::ALL_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}

#[cfg(unix)]
fn secure_dir_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn secure_dir_permissions(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn secure_file_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn secure_file_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sub").join("bridge.db");
        let store = Store::open(&db_path).unwrap();
        let store2 = Store::open(&db_path).unwrap();
        store.with_conn(|c| c.execute("INSERT INTO sessions (token_hash, scope, issued_at, expires_at) VALUES ('a','direct',0,100)", [])).unwrap();
        let count: i64 =
            store2.with_conn(|c| c.query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))).unwrap();
        assert_eq!(count, 1);
    }

    #[cfg(unix)]
    #[test]
    fn file_and_dir_permissions_are_secured() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sub").join("bridge.db");
        Store::open(&db_path).unwrap();
        let dir_mode = std::fs::metadata(db_path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        let file_mode = std::fs::metadata(&db_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }

    #[test]
    fn cleanup_expired_removes_stale_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("bridge.db")).unwrap();
        store
            .with_conn(|c| {
                c.execute(
                    "INSERT INTO approvals (decision_id, actor, risk_class, granted, created_at, expires_at) VALUES ('d1','a','read',1,0,100)",
                    [],
                )
            })
            .unwrap();
        let removed = store.cleanup_expired(1_000).unwrap();
        assert_eq!(removed, 1);
        let count: i64 = store.with_conn(|c| c.query_row("SELECT COUNT(*) FROM approvals", [], |r| r.get(0))).unwrap();
        assert_eq!(count, 0);
    }
}
