//! SQLite row source and sink.
//!
//! [`SqliteClient`] runs the SQL compiled for the GeoPackage dialect on
//! rusqlite connections. Statements run on one shared connection. Every
//! query streams from its own reader connection on a background thread,
//! handing rows over a bounded channel so a slow consumer holds back the
//! reader. Values are handed to the core as text tagged with their storage
//! class: integers and reals in their decimal form, blobs hex encoded.

use featsql_core::decode::{RowStream, SqlRow, ValueKind};
use featsql_core::{ExecutionError, ExecutionErrorKind, SqlClient};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags, Row};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Rows buffered between a reader thread and its consumer.
pub const DEFAULT_BATCH_SIZE: usize = 256;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DATABASES: AtomicUsize = AtomicUsize::new(0);

/// Where reader connections open the database.
#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    /// Shared-cache URI of an in-memory database.
    Memory(String),
}

impl Target {
    fn flags(&self) -> OpenFlags {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            Target::File(_) => flags,
            Target::Memory(_) => flags | OpenFlags::SQLITE_OPEN_URI,
        }
    }

    fn connect(&self) -> Result<Connection, ExecutionError> {
        let conn = match self {
            Target::File(path) => Connection::open_with_flags(path, self.flags()),
            Target::Memory(uri) => Connection::open_with_flags(uri, self.flags()),
        }
        .map_err(execution_error)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(execution_error)?;
        Ok(conn)
    }
}

/// A [`SqlClient`] over a SQLite database.
pub struct SqliteClient {
    conn: Mutex<Connection>,
    target: Target,
    batch_size: usize,
}

impl SqliteClient {
    fn connect(target: Target) -> Result<Self, ExecutionError> {
        let conn = target.connect()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(execution_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
            target,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, ExecutionError> {
        let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:featsql-mem-{}-{}?mode=memory&cache=shared", std::process::id(), n);
        Self::connect(Target::Memory(uri))
    }

    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        Self::connect(Target::File(path.as_ref().to_path_buf()))
    }

    /// Set how many rows a query buffers ahead of its consumer.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run a batch of statements, typically schema setup.
    pub fn execute_batch(&self, sql: &str) -> Result<(), ExecutionError> {
        self.conn.lock().execute_batch(sql).map_err(execution_error)
    }
}

impl SqlClient for SqliteClient {
    fn query(&self, sql: &str) -> Result<RowStream<'_>, ExecutionError> {
        debug!(sql = %sql, "sqlite query");
        let reader = RowReader::spawn(self.target.clone(), sql.to_string(), self.batch_size)?;
        Ok(Box::new(reader))
    }

    fn execute(&self, sql: &str) -> Result<Option<String>, ExecutionError> {
        debug!(sql = %sql, "sqlite statement");
        let conn = self.conn.lock();
        let mut statement = conn.prepare(sql).map_err(execution_error)?;
        let returning = statement.column_count() > 0;
        let mut rows = statement.query([]).map_err(execution_error)?;

        // changes are applied by the first step, RETURNING or not
        match rows.next().map_err(execution_error)? {
            Some(row) if returning => Ok(text(row.get_ref(0).map_err(execution_error)?).0),
            _ => Ok(None),
        }
    }
}

type RowResult = Result<SqlRow, ExecutionError>;

/// Rows of one query, read ahead by a background thread.
///
/// Dropping the reader disconnects the channel, which stops the thread at
/// its next row, and waits for it so the reader connection is closed.
struct RowReader {
    rows: Option<Receiver<RowResult>>,
    handle: Option<JoinHandle<()>>,
}

impl RowReader {
    /// Start reading `sql`. Open and prepare failures are returned here.
    fn spawn(target: Target, sql: String, batch_size: usize) -> Result<Self, ExecutionError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (rows_tx, rows_rx) = mpsc::sync_channel(batch_size);
        let handle = thread::Builder::new()
            .name("featsql-sqlite-reader".to_string())
            .spawn(move || read_rows(&target, &sql, ready_tx, rows_tx))
            .map_err(|e| ExecutionError::new(ExecutionErrorKind::Other, e.to_string()))?;

        let reader = Self {
            rows: Some(rows_rx),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(reader),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ExecutionError::new(
                ExecutionErrorKind::Other,
                "sqlite reader stopped before the query started",
            )),
        }
    }
}

impl Iterator for RowReader {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.as_ref().and_then(|rows| rows.recv().ok())
    }
}

impl Drop for RowReader {
    fn drop(&mut self) {
        self.rows = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Body of a reader thread.
fn read_rows(target: &Target, sql: &str, ready: SyncSender<Result<(), ExecutionError>>, out: SyncSender<RowResult>) {
    let conn = match target.connect() {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut statement = match conn.prepare(sql) {
        Ok(statement) => statement,
        Err(e) => {
            let _ = ready.send(Err(execution_error(e)));
            return;
        }
    };
    let width = statement.column_count();
    let mut rows = match statement.query([]) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = ready.send(Err(execution_error(e)));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut count = 0usize;
    loop {
        let row = match rows.next() {
            Ok(Some(row)) => read_row(row, width),
            Ok(None) => break,
            Err(e) => Err(execution_error(e)),
        };
        let failed = row.is_err();
        // a closed channel means the consumer is gone
        if out.send(row).is_err() || failed {
            break;
        }
        count += 1;
    }
    trace!(rows = count, "sqlite reader finished");
}

fn read_row(row: &Row<'_>, width: usize) -> RowResult {
    let (values, kinds): (Vec<_>, Vec<_>) = (0..width)
        .map(|i| row.get_ref(i).map(text).map_err(execution_error))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .unzip();
    Ok(SqlRow::new(values).with_kinds(kinds))
}

fn text(value: ValueRef<'_>) -> (Option<String>, ValueKind) {
    match value {
        ValueRef::Null => (None, ValueKind::Text),
        ValueRef::Integer(i) => (Some(i.to_string()), ValueKind::Integer),
        ValueRef::Real(f) => (Some(f.to_string()), ValueKind::Real),
        ValueRef::Text(t) => (Some(String::from_utf8_lossy(t).into_owned()), ValueKind::Text),
        ValueRef::Blob(b) => (Some(hex::encode(b)), ValueKind::Blob),
    }
}

fn execution_error(e: rusqlite::Error) -> ExecutionError {
    let message = e.to_string();
    let kind = match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => ExecutionErrorKind::Constraint,
        Some(ErrorCode::TypeMismatch) => ExecutionErrorKind::Parse,
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::SystemIoFailure,
        ) => ExecutionErrorKind::Connection,
        _ if message.contains("syntax error") => ExecutionErrorKind::Parse,
        _ => ExecutionErrorKind::Other,
    };
    ExecutionError::new(kind, message)
}
