//! FieldForge Store
//!
//! A single SQLite database shared by every repository.
//!
//! - **error**: Error types
//! - **schema**: Idempotent schema and catalog seed
//!
//! The connection lives behind a `Mutex`; repositories borrow it through
//! [`Store::with_conn`] or [`Store::with_tx`] and never hold it across an
//! `.await`.

pub mod error;
mod schema;

pub use error::{StoreError, StoreResult};

use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Text-backed enum stored as its snake_case name
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    rusqlite::types::FromSqlError::Other(format!("unknown {} '{}'", stringify!($name), text).into())
                })
            }
        }
    };
}
pub(crate) use text_enum;

/// Shared SQLite handle
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Create or open the database file and apply the schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database (tests, one-shot CLI calculations)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;
        conn.execute_batch(schema::SEED)?;

        tracing::debug!(path = ?path, "Store schema applied");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        f(&conn)
    }

    /// Run a closure inside a transaction, committing when it returns `Ok`
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Cheap liveness query for readiness probes
    pub fn ping(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(StoreError::from)
        })
        .map(|v| v == 1)
        .unwrap_or(false)
    }
}

/// Clamp a caller-supplied page size into `[min, max]`, using `default` when absent
pub fn clamp_limit(limit: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(min, max)
}

/// Decode a JSON text column
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(raw: &str) -> StoreResult<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Map a missing row to `None` instead of an error
pub(crate) trait OptionalRow<T> {
    fn optional_row(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalRow<T> for Result<T, rusqlite::Error> {
    fn optional_row(self) -> StoreResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_seeds_catalog() {
        let store = Store::open_in_memory().unwrap();
        let packages: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM spark_packages", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(packages, 5);
        assert!(store.ping());
        assert!(store.path().is_none());
    }

    #[test]
    fn test_open_file_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("fieldforge.db");

        {
            let store = Store::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
        }
        let store = Store::open(&path).unwrap();
        let tiers: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM subscription_tiers", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(tiers, 3);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: StoreResult<()> = store.with_tx(|tx| {
            tx.execute("DELETE FROM spark_packages", [])?;
            Err(StoreError::invalid("abort"))
        });
        assert!(result.is_err());

        let packages: i64 = store
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM spark_packages", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(packages, 5);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 20, 1, 100), 20);
        assert_eq!(clamp_limit(Some(0), 20, 1, 100), 1);
        assert_eq!(clamp_limit(Some(500), 20, 1, 100), 100);
        assert_eq!(clamp_limit(Some(42), 20, 1, 100), 42);
    }
}
