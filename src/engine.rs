//! The storage engine gateway.
//!
//! The paged storage engine (instances, sessions, attach/detach, B-tree
//! cursors, the transaction log) is not implemented by this crate. It is
//! consumed through the [`Engine`] trait, which mirrors the engine's C
//! interface closely: every handle is an opaque id handed out by the engine
//! and every call may fail with an engine error code.
//!
//! Only one retrieval primitive is required ([`Engine::retrieve`], returning a
//! column's raw bytes); the typed accessors decode those bytes and may be
//! overridden by backends that know better (e.g. code-page aware text).

use std::{fmt, path::Path};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    catalog::column::ColumnDescriptor,
    error::DbResult,
    util::{
        io::decode_fixed,
        time::ole_date_to_datetime,
    },
};

pub mod code_page;
pub mod header;

#[cfg(windows)]
pub mod esent;

use header::{DatabaseHeader, DatabaseState, FileType};

macro_rules! engine_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

engine_id!(
    /// An engine instance handle.
    InstanceId(usize)
);
engine_id!(
    /// A session handle.
    SessionId(usize)
);
engine_id!(
    /// An opened database id.
    DatabaseId(u32)
);
engine_id!(
    /// An opened table (cursor) handle.
    TableId(usize)
);
engine_id!(
    /// A column id, unique within its table.
    ColumnId(u32)
);

/// Engine configuration parameters. Global parameters (those set with no
/// instance) must be set before any instance is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineParam {
    /// Database page size, in bytes. Global.
    DatabasePageSize(u32),
    /// Whether the engine replays its transaction logs on initialization.
    Recovery(bool),
    /// Whether only the log files newer than the last checkpoint are kept.
    CircularLog(bool),
    /// The three-character prefix of the transaction log and checkpoint files.
    BaseName(String),
    /// Directory holding the checkpoint file.
    SystemPath(String),
    /// Directory holding the transaction log files.
    LogFilePath(String),
    /// Path of the temporary database.
    TempPath(String),
}

/// User credentials for [`Engine::begin_session`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The storage engine primitives.
///
/// All methods take `&self`; a backend that needs to track state does so with
/// interior mutability. Sessions are never shared across threads.
pub trait Engine {
    /// Sets a parameter, globally (`None`) or for the given instance.
    fn set_param(&self, instance: Option<InstanceId>, param: EngineParam) -> DbResult<()>;

    /// Creates a new, uninitialized instance.
    fn create_instance(&self, name: &str) -> DbResult<InstanceId>;

    /// Initializes the instance. Runs log recovery if the instance was
    /// configured to.
    fn init_instance(&self, instance: InstanceId) -> DbResult<()>;

    /// Terminates the instance, releasing every resource it holds.
    fn term_instance(&self, instance: InstanceId) -> DbResult<()>;

    /// Begins a session.
    fn begin_session(
        &self,
        instance: InstanceId,
        credentials: Option<&Credentials>,
    ) -> DbResult<SessionId>;

    /// Ends the session.
    fn end_session(&self, session: SessionId) -> DbResult<()>;

    /// Registers the database file with the session's instance.
    fn attach_database(&self, session: SessionId, path: &Path, read_only: bool) -> DbResult<()>;

    /// Opens an attached database.
    fn open_database(
        &self,
        session: SessionId,
        path: &Path,
        read_only: bool,
    ) -> DbResult<DatabaseId>;

    /// Closes an opened database.
    fn close_database(&self, session: SessionId, database: DatabaseId) -> DbResult<()>;

    /// Unregisters the database file.
    fn detach_database(&self, session: SessionId, path: &Path) -> DbResult<()>;

    /// Returns the file type recorded by the database header.
    fn file_type(&self, path: &Path) -> DbResult<FileType> {
        Ok(DatabaseHeader::read(path)?.file_type)
    }

    /// Returns the page size recorded by the database header.
    fn page_size(&self, path: &Path) -> DbResult<u32> {
        Ok(DatabaseHeader::read(path)?.page_size)
    }

    /// Returns the shutdown state recorded by the database header.
    fn database_state(&self, path: &Path) -> DbResult<DatabaseState> {
        Ok(DatabaseHeader::read(path)?.state)
    }

    /// Returns the names of the user tables of the database.
    fn table_names(&self, session: SessionId, database: DatabaseId) -> DbResult<Vec<String>>;

    /// Opens a cursor over the named table (read-only).
    fn open_table(&self, session: SessionId, database: DatabaseId, name: &str)
        -> DbResult<TableId>;

    /// Closes the cursor.
    fn close_table(&self, session: SessionId, table: TableId) -> DbResult<()>;

    /// Returns the column metadata of an opened table.
    fn table_columns(&self, session: SessionId, table: TableId)
        -> DbResult<Vec<ColumnDescriptor>>;

    /// Moves the cursor to the first record. Returns `false` if the table has
    /// no records.
    fn move_first(&self, session: SessionId, table: TableId) -> DbResult<bool>;

    /// Moves the cursor to the next record. Returns `false` past the last one.
    fn move_next(&self, session: SessionId, table: TableId) -> DbResult<bool>;

    /// Returns the raw bytes of a column of the current record, or `None` if
    /// the column is not set.
    fn retrieve(
        &self,
        session: SessionId,
        table: TableId,
        column: ColumnId,
    ) -> DbResult<Option<Vec<u8>>>;

    fn retrieve_bool(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<bool>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<1, bool>(c, raw))
            .transpose()
    }

    fn retrieve_u8(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<u8>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<1, u8>(c, raw))
            .transpose()
    }

    fn retrieve_i16(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<i16>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<2, i16>(c, raw))
            .transpose()
    }

    fn retrieve_i32(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<i32>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<4, i32>(c, raw))
            .transpose()
    }

    fn retrieve_i64(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<i64>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<8, i64>(c, raw))
            .transpose()
    }

    fn retrieve_f32(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<f32>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<4, f32>(c, raw))
            .transpose()
    }

    fn retrieve_f64(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<f64>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<8, f64>(c, raw))
            .transpose()
    }

    /// Retrieves an engine-native date. `Err(days)` holds the raw value of a
    /// date that can't be represented as a UTC timestamp.
    fn retrieve_date_time(
        &self,
        s: SessionId,
        t: TableId,
        c: ColumnId,
    ) -> DbResult<Option<Result<DateTime<Utc>, f64>>> {
        Ok(self
            .retrieve_f64(s, t, c)?
            .map(|days| ole_date_to_datetime(days).ok_or(days)))
    }

    /// Retrieves a column as text, with embedded NULs removed. The default
    /// implementation treats the bytes as (lossy) UTF-8.
    fn retrieve_string(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<String>> {
        Ok(self
            .retrieve(s, t, c)?
            .map(|raw| code_page::decode_text(raw, None)))
    }

    fn retrieve_bytes(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<Vec<u8>>> {
        self.retrieve(s, t, c)
    }
}
