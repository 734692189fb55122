use std::{io, path::PathBuf};

use crate::engine::ColumnId;

pub type DbResult<T, E = Error> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file does not exist.
    #[error("database file not found: `{}`", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists, but its header says it is not a database.
    #[error("`{}` is not a database file (file type {file_type})", path.display())]
    NotADatabase { path: PathBuf, file_type: u32 },

    /// The database header could not be parsed.
    #[error("corrupted header: {0}")]
    CorruptedHeader(&'static str),

    /// Attach/open failed on every tier, including log recovery and repair.
    #[error("could not open `{}` after log recovery and repair: {source}", path.display())]
    OpenExhausted {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// Attach/open failed and the caller did not allow the destructive
    /// recovery tiers to run.
    #[error("could not open `{}` and recovery was not permitted: {source}", path.display())]
    RecoveryNotPermitted {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The column metadata of a table could not be read.
    #[error("could not read columns of table `{table}`: {source}")]
    Schema {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// A table could not be opened or one of its rows could not be decoded.
    #[error("could not scan table `{table}`: {source}")]
    Scan {
        table: String,
        #[source]
        source: Box<Error>,
    },

    /// At least one teardown step failed. Holds the first failure.
    #[error("session teardown failed: {0}")]
    Close(#[source] Box<Error>),

    /// Row decoding was requested with no columns.
    #[error("row decoding requires at least one column")]
    EmptyColumnSet,

    /// A raw cell value did not have the width its column type requires.
    #[error("invalid size for column {column:?}: expected {expected} bytes, but found {actual}")]
    InvalidCellSize {
        column: ColumnId,
        expected: usize,
        actual: usize,
    },

    /// An engine call returned an error code.
    #[error("engine call `{op}` failed with code {code}")]
    Engine { op: &'static str, code: i32 },

    /// The engine library could not be loaded or lacks an entry point.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The external recovery/repair utility exited unsuccessfully.
    #[error("`{tool}` exited with {status}")]
    RepairTool { tool: String, status: String },

    /// An generic IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` for errors raised before (or while) a session could be
    /// established, i.e., errors that are fatal to a whole run.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound(_)
                | Error::NotADatabase { .. }
                | Error::CorruptedHeader(_)
                | Error::OpenExhausted { .. }
                | Error::RecoveryNotPermitted { .. }
        )
    }
}
