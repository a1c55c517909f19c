//! Persistent record store.
//!
//! Handlers talk to a `RecordStore`; the production implementation is
//! `SqliteStore`, a single SQLite connection guarded by a mutex. The store
//! owns all of its concurrency control, so callers share it as an
//! `Arc<dyn RecordStore>` without extra locking.
//!
//! Every statement binds its values through `?N` parameters.

use crate::todo::{Priority, TodoItem};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const SELECT_COLUMNS: &str =
    "SELECT id, title, description, completed, priority, created_at, updated_at FROM todos";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS todos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT DEFAULT '',
    completed INTEGER DEFAULT 0,
    priority TEXT DEFAULT 'medium',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_todos_completed ON todos(completed);
    CREATE INDEX IF NOT EXISTS idx_todos_priority ON todos(priority);
    CREATE INDEX IF NOT EXISTS idx_todos_created_at ON todos(created_at);
";

/// Operations the request handlers need from persistence.
///
/// Lists are ordered newest first.
pub trait RecordStore: Send + Sync {
    /// Insert a record, returning it with the assigned identifier.
    fn create(&self, item: &TodoItem) -> Result<TodoItem, StoreError>;
    fn get(&self, id: i64) -> Result<Option<TodoItem>, StoreError>;
    fn list(&self) -> Result<Vec<TodoItem>, StoreError>;
    fn list_by_status(&self, completed: bool) -> Result<Vec<TodoItem>, StoreError>;
    fn list_by_priority(&self, priority: Priority) -> Result<Vec<TodoItem>, StoreError>;
    /// Overwrite the mutable fields of an existing record. `created_at` is
    /// left untouched. Returns `false` if no record has that identifier.
    fn update(&self, item: &TodoItem) -> Result<bool, StoreError>;
    /// Returns `false` if no record has that identifier.
    fn delete(&self, id: i64) -> Result<bool, StoreError>;
    fn count_total(&self) -> Result<u64, StoreError>;
    fn count_completed(&self) -> Result<u64, StoreError>;
    fn count_incomplete(&self) -> Result<u64, StoreError>;
    /// Cheap liveness probe.
    fn is_connected(&self) -> bool;
}

/// SQLite-backed record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Database opened");
        Self::with_connection(conn)
    }

    /// A private, non-persistent store.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(CREATE_TABLE)?;
        if let Err(e) = conn.execute_batch(CREATE_INDEXES) {
            warn!(error = %e, "Failed to create indexes (non-critical)");
        }
        debug!("Database schema ready");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// A panic while the lock was held poisons it; SQLite rolls back any
    /// unfinished statement, so the connection is still usable.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering database connection after a panic");
            self.conn.clear_poison();
            poisoned.into_inner()
        })
    }

    fn query_list<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
    ) -> Result<Vec<TodoItem>, StoreError> {
        let conn = self.lock();
        let sql = format!("{SELECT_COLUMNS}{filter} ORDER BY created_at DESC, id DESC");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params, row_to_item)?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn query_count<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl RecordStore for SqliteStore {
    fn create(&self, item: &TodoItem) -> Result<TodoItem, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO todos (title, description, completed, priority, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.title,
                item.description,
                item.completed,
                item.priority.as_str(),
                item.created_at,
                item.updated_at,
            ],
        )?;
        let mut created = item.clone();
        created.id = conn.last_insert_rowid();
        info!(id = created.id, "Created todo");
        Ok(created)
    }

    fn get(&self, id: i64) -> Result<Option<TodoItem>, StoreError> {
        let conn = self.lock();
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let item = conn.query_row(&sql, params![id], row_to_item).optional()?;
        Ok(item)
    }

    fn list(&self) -> Result<Vec<TodoItem>, StoreError> {
        self.query_list("", [])
    }

    fn list_by_status(&self, completed: bool) -> Result<Vec<TodoItem>, StoreError> {
        self.query_list(" WHERE completed = ?1", params![completed])
    }

    fn list_by_priority(&self, priority: Priority) -> Result<Vec<TodoItem>, StoreError> {
        self.query_list(" WHERE priority = ?1", params![priority.as_str()])
    }

    fn update(&self, item: &TodoItem) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE todos SET title = ?1, description = ?2, completed = ?3, priority = ?4, \
             updated_at = ?5 WHERE id = ?6",
            params![
                item.title,
                item.description,
                item.completed,
                item.priority.as_str(),
                item.updated_at,
                item.id,
            ],
        )?;
        if changed > 0 {
            info!(id = item.id, "Updated todo");
        }
        Ok(changed > 0)
    }

    fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock();
        let changed = conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        if changed > 0 {
            info!(id, "Deleted todo");
        }
        Ok(changed > 0)
    }

    fn count_total(&self) -> Result<u64, StoreError> {
        self.query_count("SELECT COUNT(*) FROM todos", [])
    }

    fn count_completed(&self) -> Result<u64, StoreError> {
        self.query_count("SELECT COUNT(*) FROM todos WHERE completed = ?1", params![true])
    }

    fn count_incomplete(&self) -> Result<u64, StoreError> {
        self.query_count("SELECT COUNT(*) FROM todos WHERE completed = ?1", params![false])
    }

    fn is_connected(&self) -> bool {
        self.lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<TodoItem> {
    let priority: String = row.get(4)?;
    Ok(TodoItem {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        completed: row.get::<_, Option<bool>>(3)?.unwrap_or(false),
        priority: Priority::parse(&priority).unwrap_or_default(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Store failures. Details are for logs only.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
        }
    }
}
