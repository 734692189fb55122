use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::{info, instrument, warn};

use crate::{
    catalog::column::ColumnDescriptor,
    config::{default_future_time_limit, DEFAULT_INSTANCE_NAME, DEFAULT_LOG_PREFIX},
    engine::{Credentials, Engine},
    error::{DbResult, Error},
    exec::scan::{scan_database, scan_table, DatabaseResult, ScanOptions, TableResult},
    process::{stop_all, ProcessControl},
    repair::RepairTool,
    schema::{list_columns, list_tables},
    session::{OpenTier, Session, SessionOptions},
};

/// An opened database, with the schema and scan operations bound to it.
#[derive(Debug)]
pub struct Db<'e, E: Engine + ?Sized> {
    session: Session<'e, E>,
}

impl<'e, E: Engine + ?Sized> Db<'e, E> {
    /// Opens the database. See [`Session::open`].
    pub fn open(
        engine: &'e E,
        repair_tool: &dyn RepairTool,
        path: &Path,
        options: &SessionOptions,
    ) -> DbResult<Self> {
        let session = Session::open(engine, repair_tool, path, options)?;
        Ok(Db { session })
    }

    pub fn session(&self) -> &Session<'e, E> {
        &self.session
    }

    pub fn tier(&self) -> OpenTier {
        self.session.tier()
    }

    pub fn tables(&self) -> DbResult<Vec<String>> {
        list_tables(self.session.engine(), self.session.handle())
    }

    pub fn columns(&self, table: &str) -> DbResult<Vec<ColumnDescriptor>> {
        list_columns(self.session.engine(), self.session.handle(), table)
    }

    pub fn scan_table(&self, table: &str, options: &ScanOptions) -> DbResult<TableResult> {
        scan_table(self.session.engine(), self.session.handle(), table, options)
    }

    pub fn scan(&self, options: &ScanOptions) -> DbResult<DatabaseResult> {
        scan_database(self.session.engine(), self.session.handle(), options)
    }

    /// Releases the database. See [`Session::close`].
    pub fn close(self) -> DbResult<()> {
        self.session.close()
    }
}

/// Options for [`dump`].
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub path: PathBuf,
    pub log_prefix: String,
    /// Processes that hold the database open, stopped before opening it.
    pub stop_processes: Vec<String>,
    pub page_size: Option<u32>,
    pub recovery: bool,
    pub circular_logging: bool,
    pub credentials: Option<Credentials>,
    /// Defaults to [`default_future_time_limit`].
    pub future_time_limit: Option<Duration>,
    /// Allows log recovery and repair to modify the database and its logs.
    pub consent: bool,
    pub binary_as_bytes: bool,
    pub tables: Option<Vec<String>>,
}

impl DumpOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DumpOptions {
            path: path.into(),
            log_prefix: DEFAULT_LOG_PREFIX.into(),
            stop_processes: Vec::new(),
            page_size: None,
            recovery: true,
            circular_logging: false,
            credentials: None,
            future_time_limit: None,
            consent: false,
            binary_as_bytes: false,
            tables: None,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            log_prefix: self.log_prefix.clone(),
            page_size: self.page_size,
            recovery: self.recovery,
            circular_logging: self.circular_logging,
            credentials: self.credentials.clone(),
            allow_destructive_recovery: self.consent,
            instance_name: DEFAULT_INSTANCE_NAME.into(),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            future_time_limit: self
                .future_time_limit
                .unwrap_or_else(default_future_time_limit),
            binary_as_bytes: self.binary_as_bytes,
            tables: self.tables.clone(),
        }
    }
}

/// Opens the database, reads every table and closes it again.
///
/// The session is released on every path. A failure to release it after the
/// tables were read is logged and does not discard the result.
#[instrument(level = "debug", skip_all, fields(path = %options.path.display()))]
pub fn dump<E: Engine + ?Sized>(
    engine: &E,
    repair_tool: &dyn RepairTool,
    processes: &dyn ProcessControl,
    options: &DumpOptions,
) -> DbResult<DatabaseResult> {
    stop_all(processes, &options.stop_processes);

    let db = Db::open(engine, repair_tool, &options.path, &options.session_options())?;
    let result = db.scan(&options.scan_options());
    if let Err(error) = db.close() {
        warn!(%error, "could not close database");
    }

    let result = result?;
    info!(
        tables = result.tables.len(),
        diagnostics = result.diagnostics.len(),
        "dump complete"
    );
    Ok(result)
}

/// Like [`dump`], but asks for consent when it is needed instead of up front.
///
/// If the database can't be opened without log recovery or repair and
/// `options.consent` is unset, `confirm` is called; when it agrees, the dump is
/// retried with consent. A database that opens directly never calls it.
pub fn dump_with_consent<E: Engine + ?Sized>(
    engine: &E,
    repair_tool: &dyn RepairTool,
    processes: &dyn ProcessControl,
    options: &DumpOptions,
    confirm: impl FnOnce() -> DbResult<bool>,
) -> DbResult<DatabaseResult> {
    match dump(engine, repair_tool, processes, options) {
        Err(error @ Error::RecoveryNotPermitted { .. }) => {
            if !confirm()? {
                return Err(error);
            }
            info!("recovery allowed, opening again");
            let options = DumpOptions {
                consent: true,
                ..options.clone()
            };
            dump(engine, repair_tool, processes, &options)
        }
        result => result,
    }
}
