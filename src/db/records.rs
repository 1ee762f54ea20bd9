use crate::errors::{AppError, AppResult};
use crate::models::{NewTodoRecord, TodoRecord};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Schema migration hook, run inside the upgrade transaction with `(stored, requested)` versions.
pub type UpgradeHook = fn(&Transaction<'_>, u32, u32) -> rusqlite::Result<()>;

type SharedConnection = Arc<Mutex<Connection>>;

/// Creates the auto-keyed `todos` collection. AUTOINCREMENT keeps deleted ids from being reused.
pub fn create_todos_collection(
    tx: &Transaction<'_>,
    stored: u32,
    _requested: u32,
) -> rusqlite::Result<()> {
    if stored < 1 {
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS todos (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               title TEXT NOT NULL,
               completed INTEGER NOT NULL DEFAULT 0
             );",
        )?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<RecordStoreInner>,
}

struct RecordStoreInner {
    db_path: PathBuf,
    version: u32,
    upgrade: UpgradeHook,
    handle: RwLock<Option<SharedConnection>>,
}

impl RecordStore {
    pub fn new(db_path: &Path, version: u32) -> Self {
        Self::with_upgrade(db_path, version, create_todos_collection)
    }

    pub fn with_upgrade(db_path: &Path, version: u32, upgrade: UpgradeHook) -> Self {
        Self {
            inner: Arc::new(RecordStoreInner {
                db_path: db_path.to_path_buf(),
                version,
                upgrade,
                handle: RwLock::new(None),
            }),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.handle.read().await.is_some()
    }

    /// Opens the database, upgrading the schema first when the stored version is behind.
    /// Calling it on an already open handle is a no-op.
    pub async fn init(&self) -> AppResult<()> {
        let mut handle = self.inner.handle.write().await;
        if handle.is_some() {
            return Ok(());
        }

        let db_path = self.inner.db_path.clone();
        let version = self.inner.version;
        let upgrade = self.inner.upgrade;
        let conn =
            tokio::task::spawn_blocking(move || open_versioned(&db_path, version, upgrade))
                .await??;

        *handle = Some(Arc::new(Mutex::new(conn)));
        tracing::info!(database = %self.inner.db_path.display(), version, "record store opened");
        Ok(())
    }

    pub async fn add(&self, record: NewTodoRecord) -> AppResult<i64> {
        let id = self
            .with_connection("add", move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO todos (title, completed) VALUES (?1, ?2)",
                    params![record.title, record.completed],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            })
            .await?;
        tracing::debug!(id, "todo record added");
        Ok(id)
    }

    /// Removes the record if present. Absent ids are not an error.
    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let removed = self
            .with_connection("delete", move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM todos WHERE id = ?1", [id])?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        tracing::debug!(id, removed, "todo record delete");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> AppResult<Option<TodoRecord>> {
        self.with_connection("get", move |conn| {
            let record = conn
                .query_row(
                    "SELECT id, title, completed FROM todos WHERE id = ?1",
                    [id],
                    parse_record_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    pub async fn list(&self) -> AppResult<Vec<TodoRecord>> {
        self.with_connection("list", |conn| {
            let mut statement =
                conn.prepare("SELECT id, title, completed FROM todos ORDER BY id ASC")?;
            let rows = statement.query_map([], parse_record_row)?;
            let mut result = Vec::new();
            for row in rows {
                result.push(row?);
            }
            Ok(result)
        })
        .await
    }

    /// Drops the open handle. Later operations need a fresh `init`.
    pub async fn close(&self) {
        let mut handle = self.inner.handle.write().await;
        if handle.take().is_some() {
            tracing::info!(database = %self.inner.db_path.display(), "record store closed");
        }
    }

    /// Destroys the whole database: records, key counter and schema.
    pub async fn reset_database(&self) -> AppResult<()> {
        let mut handle = self.inner.handle.write().await;
        drop(handle.take());

        let db_path = self.inner.db_path.clone();
        tokio::task::spawn_blocking(move || remove_database_files(&db_path)).await??;
        tracing::info!(database = %self.inner.db_path.display(), "record store database deleted");
        Ok(())
    }

    async fn with_connection<T, F>(&self, operation: &'static str, work: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        // the read guard is held until the blocking work finishes so init/reset cannot interleave
        let handle = self.inner.handle.read().await;
        let Some(conn) = handle.as_ref().map(Arc::clone) else {
            return Err(AppError::NotInitialized(format!(
                "{} called before init on {}",
                operation,
                self.inner.db_path.display()
            )));
        };

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
            work(&mut conn)
        })
        .await?;
        drop(handle);
        result
    }
}

fn open_versioned(db_path: &Path, requested: u32, upgrade: UpgradeHook) -> AppResult<Connection> {
    if requested == 0 {
        return Err(AppError::Internal("schema version must be at least 1".to_string()));
    }
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
    }

    let mut conn = Connection::open(db_path)?;
    let stored: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if stored > requested {
        return Err(AppError::EngineFailure(format!(
            "VersionError: stored schema version {} is newer than requested {}",
            stored, requested
        )));
    }

    if stored < requested {
        tracing::info!(
            database = %db_path.display(),
            from = stored,
            to = requested,
            "upgrading record store schema"
        );
        let tx = conn.transaction()?;
        upgrade(&tx, stored, requested)?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", requested))?;
        tx.commit()?;
    }

    Ok(conn)
}

fn remove_database_files(db_path: &Path) -> AppResult<()> {
    let mut candidates = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut sibling = db_path.as_os_str().to_owned();
        sibling.push(suffix);
        candidates.push(PathBuf::from(sibling));
    }

    for candidate in candidates {
        match fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(AppError::EngineFailure(format!("{}: {}", candidate.display(), err)))
            }
        }
    }
    Ok(())
}

fn parse_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TodoRecord> {
    Ok(TodoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: row.get(2)?,
    })
}
