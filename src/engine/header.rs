use std::{fs::File, path::Path};

use buff::Buff;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    config::{HEADER_SIZE, LEGACY_PAGE_SIZE},
    error::{DbResult, Error},
    util::io::read_prefix,
};

/// Magic number at offset 4 of every database (and streaming) file.
pub const SIGNATURE: u32 = 0x89AB_CDEF;

mod offset {
    pub const SIGNATURE: usize = 4;
    pub const FORMAT_VERSION: usize = 8;
    pub const FILE_TYPE: usize = 12;
    pub const STATE: usize = 52;
    pub const FORMAT_REVISION: usize = 232;
    pub const PAGE_SIZE: usize = 236;
}

/// The file type recorded in the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Database,
    StreamingFile,
    Other(u32),
}

impl FileType {
    fn from_code(code: u32) -> Self {
        match code {
            0 => FileType::Database,
            1 => FileType::StreamingFile,
            other => FileType::Other(other),
        }
    }

    /// Returns the on-disk code.
    pub fn code(self) -> u32 {
        match self {
            FileType::Database => 0,
            FileType::StreamingFile => 1,
            FileType::Other(code) => code,
        }
    }
}

/// The database state recorded in the header; [`DatabaseState::DirtyShutdown`]
/// means the engine did not terminate cleanly and recovery may be needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    JustCreated,
    DirtyShutdown,
    CleanShutdown,
    BeingConverted,
    ForceDetach,
    Other(u32),
}

impl DatabaseState {
    fn from_code(code: u32) -> Self {
        match code {
            1 => DatabaseState::JustCreated,
            2 => DatabaseState::DirtyShutdown,
            3 => DatabaseState::CleanShutdown,
            4 => DatabaseState::BeingConverted,
            5 => DatabaseState::ForceDetach,
            other => DatabaseState::Other(other),
        }
    }

    /// Whether the file needs the transaction logs (or a repair) to be
    /// consistent.
    pub fn is_dirty(self) -> bool {
        matches!(self, DatabaseState::DirtyShutdown | DatabaseState::ForceDetach)
    }
}

/// The fields of the database file header this crate cares about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseHeader {
    pub format_version: u32,
    pub format_revision: u32,
    pub file_type: FileType,
    pub state: DatabaseState,
    pub page_size: u32,
}

impl DatabaseHeader {
    /// Reads the header of the file at the given path.
    #[instrument(level = "debug")]
    pub fn read(path: &Path) -> DbResult<Self> {
        let mut raw = read_prefix(File::open(path)?, HEADER_SIZE)?;
        debug!(read = raw.len(), "read header bytes");
        Self::parse(&mut raw)
    }

    /// Parses the header from its raw bytes.
    pub fn parse(raw: &mut [u8]) -> DbResult<Self> {
        let mut buf = Buff::new(raw);
        let mut field = |offset: usize, name: &'static str| {
            buf.read_at::<4, u32>(offset)
                .ok_or(Error::CorruptedHeader(name))
        };

        if field(offset::SIGNATURE, "truncated signature")? != SIGNATURE {
            return Err(Error::CorruptedHeader("bad signature"));
        }
        let format_version = field(offset::FORMAT_VERSION, "truncated format version")?;
        let file_type = FileType::from_code(field(offset::FILE_TYPE, "truncated file type")?);
        let state = DatabaseState::from_code(field(offset::STATE, "truncated database state")?);
        let format_revision = field(offset::FORMAT_REVISION, "truncated format revision")?;
        let page_size = match field(offset::PAGE_SIZE, "truncated page size")? {
            0 => LEGACY_PAGE_SIZE,
            page_size => page_size,
        };

        Ok(DatabaseHeader {
            format_version,
            format_revision,
            file_type,
            state,
            page_size,
        })
    }
}
