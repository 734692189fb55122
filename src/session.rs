//! Session acquisition and teardown.
//!
//! Opening follows a three-tier protocol, each tier more destructive than the
//! previous one:
//!
//! 1. a fresh instance and session, then a read-only attach/open;
//! 2. log recovery by the external repair tool, then attach/open again;
//! 3. repair of the database file itself, then a final attach/open.
//!
//! Tiers 2 and 3 modify the file and its logs, so they only run when the
//! caller explicitly allows it ([`SessionOptions::allow_destructive_recovery`]).

use std::{
    fmt,
    path::{Path, PathBuf, MAIN_SEPARATOR},
};

use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::{DEFAULT_INSTANCE_NAME, DEFAULT_LOG_PREFIX, PAGE_SIZE_GRANULARITY},
    engine::{
        header::FileType, Credentials, DatabaseId, Engine, EngineParam, InstanceId, SessionId,
    },
    error::{DbResult, Error},
    repair::RepairTool,
};

/// Options for [`Session::open`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Prefix of the transaction log files (e.g. `edb`, `V01`).
    pub log_prefix: String,
    /// Page size hint. Used only if it is a non-zero multiple of
    /// [`PAGE_SIZE_GRANULARITY`]; otherwise the page size is read from the file.
    pub page_size: Option<u32>,
    /// Whether the engine replays the transaction logs when it initializes.
    pub recovery: bool,
    /// Whether the engine uses circular logging.
    pub circular_logging: bool,
    /// Optional session credentials.
    pub credentials: Option<Credentials>,
    /// Whether the log recovery and repair tiers may run.
    pub allow_destructive_recovery: bool,
    /// Name of the engine instance.
    pub instance_name: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            log_prefix: DEFAULT_LOG_PREFIX.into(),
            page_size: None,
            recovery: true,
            circular_logging: false,
            credentials: None,
            allow_destructive_recovery: false,
            instance_name: DEFAULT_INSTANCE_NAME.into(),
        }
    }
}

/// The tier that produced a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenTier {
    Direct,
    AfterRecovery,
    AfterRepair,
}

/// Correlates the engine resources of an opened database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHandle {
    instance: InstanceId,
    session: SessionId,
    database: DatabaseId,
    path: PathBuf,
}

impl DatabaseHandle {
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn database(&self) -> DatabaseId {
        self.database
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An opened database. Owns the [`DatabaseHandle`]; the engine resources are
/// released by [`Session::close`] or, failing that, on drop.
pub struct Session<'e, E: Engine + ?Sized> {
    engine: &'e E,
    handle: Option<DatabaseHandle>,
    tier: OpenTier,
}

impl<'e, E: Engine + ?Sized> Session<'e, E> {
    /// Opens the database at `path`. See the module documentation for the
    /// fallback protocol.
    ///
    /// The file type is checked, and the page size resolved, before any engine
    /// resource is created.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn open(
        engine: &'e E,
        repair_tool: &dyn RepairTool,
        path: &Path,
        options: &SessionOptions,
    ) -> DbResult<Self> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_owned()));
        }
        let file_type = engine.file_type(path)?;
        if file_type != FileType::Database {
            return Err(Error::NotADatabase {
                path: path.to_owned(),
                file_type: file_type.code(),
            });
        }
        let page_size = resolve_page_size(engine, path, options.page_size)?;
        match engine.database_state(path) {
            Ok(state) if state.is_dirty() => {
                warn!(?state, "database was not shut down cleanly");
            }
            Ok(state) => debug!(?state, "database state"),
            Err(error) => debug!(%error, "could not read database state"),
        }

        let mut acquired = Acquired {
            engine,
            path,
            instance: None,
            session: None,
            attached: false,
        };
        let opened = match acquired.start(page_size, options) {
            Ok((instance, session)) => acquired
                .open_with_fallback(session, repair_tool, options)
                .map(|(database, tier)| (instance, session, database, tier)),
            Err(error) => Err(error),
        };

        match opened {
            Ok((instance, session, database, tier)) => {
                info!(?tier, %database, "database opened");
                Ok(Session {
                    engine,
                    handle: Some(DatabaseHandle {
                        instance,
                        session,
                        database,
                        path: path.to_owned(),
                    }),
                    tier,
                })
            }
            Err(error) => {
                acquired.release();
                Err(error)
            }
        }
    }

    /// Returns the handle of the opened database.
    pub fn handle(&self) -> &DatabaseHandle {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("handle is only taken on close"),
        }
    }

    /// Returns the underlying engine.
    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Returns the tier that opened the database.
    pub fn tier(&self) -> OpenTier {
        self.tier
    }

    /// Closes the database, detaches it, ends the session and terminates the
    /// instance, in that order. Every step runs even if a previous one failed;
    /// the first failure is returned.
    #[instrument(level = "debug", skip_all)]
    pub fn close(mut self) -> DbResult<()> {
        match self.handle.take() {
            Some(handle) => teardown(self.engine, &handle),
            None => Ok(()),
        }
    }
}

impl<E: Engine + ?Sized> Drop for Session<'_, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(error) = teardown(self.engine, &handle) {
                error!(%error, "could not release dropped session");
            }
        }
    }
}

impl<E: Engine + ?Sized> fmt::Debug for Session<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("tier", &self.tier)
            .finish()
    }
}

/// Returns the page size hint if it is usable, or reads the page size from the
/// database file otherwise.
pub fn resolve_page_size<E: Engine + ?Sized>(
    engine: &E,
    path: &Path,
    hint: Option<u32>,
) -> DbResult<u32> {
    match hint {
        Some(page_size) if page_size != 0 && page_size % PAGE_SIZE_GRANULARITY == 0 => {
            Ok(page_size)
        }
        hint => {
            if let Some(hint) = hint {
                debug!(hint, "ignoring page size hint");
            }
            let page_size = engine.page_size(path)?;
            debug!(page_size, "page size read from file");
            Ok(page_size)
        }
    }
}

fn teardown<E: Engine + ?Sized>(engine: &E, handle: &DatabaseHandle) -> DbResult<()> {
    let mut first_error = None;
    let mut step = |name: &'static str, result: DbResult<()>| {
        if let Err(error) = result {
            warn!(step = name, %error, "teardown step failed");
            first_error.get_or_insert(error);
        }
    };

    step(
        "close database",
        engine.close_database(handle.session, handle.database),
    );
    step(
        "detach database",
        engine.detach_database(handle.session, &handle.path),
    );
    step("end session", engine.end_session(handle.session));
    step("terminate instance", engine.term_instance(handle.instance));

    match first_error {
        Some(error) => Err(Error::Close(Box::new(error))),
        None => Ok(()),
    }
}

/// Engine resources acquired while a session is being opened, released in
/// reverse order if opening fails.
struct Acquired<'a, E: Engine + ?Sized> {
    engine: &'a E,
    path: &'a Path,
    instance: Option<InstanceId>,
    session: Option<SessionId>,
    attached: bool,
}

impl<E: Engine + ?Sized> Acquired<'_, E> {
    /// Configures and initializes a fresh instance and begins a session.
    fn start(
        &mut self,
        page_size: u32,
        options: &SessionOptions,
    ) -> DbResult<(InstanceId, SessionId)> {
        let engine = self.engine;
        engine.set_param(None, EngineParam::DatabasePageSize(page_size))?;

        let instance = engine.create_instance(&options.instance_name)?;
        self.instance = Some(instance);

        let dir = directory_of(self.path);
        let temp = std::env::temp_dir().join(format!("{}.tmp.edb", options.instance_name));
        let params = [
            EngineParam::Recovery(options.recovery),
            EngineParam::CircularLog(options.circular_logging),
            EngineParam::BaseName(options.log_prefix.clone()),
            EngineParam::SystemPath(dir.clone()),
            EngineParam::LogFilePath(dir),
            EngineParam::TempPath(temp.display().to_string()),
        ];
        for param in params {
            engine.set_param(Some(instance), param)?;
        }
        engine.init_instance(instance)?;

        let session = engine.begin_session(instance, options.credentials.as_ref())?;
        self.session = Some(session);
        Ok((instance, session))
    }

    /// Attaches and opens the database, falling back to log recovery and then
    /// to repair.
    fn open_with_fallback(
        &mut self,
        session: SessionId,
        repair_tool: &dyn RepairTool,
        options: &SessionOptions,
    ) -> DbResult<(DatabaseId, OpenTier)> {
        let error = match self.attach_and_open(session) {
            Ok(database) => return Ok((database, OpenTier::Direct)),
            Err(error) => error,
        };
        warn!(%error, "could not open database");

        if !options.allow_destructive_recovery {
            return Err(Error::RecoveryNotPermitted {
                path: self.path.to_owned(),
                source: Box::new(error),
            });
        }

        let log_dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_owned(),
            _ => PathBuf::from("."),
        };
        info!(log_prefix = %options.log_prefix, "running log recovery");
        if let Err(error) = repair_tool.recover(&options.log_prefix, &log_dir) {
            warn!(%error, "log recovery failed");
        }
        let error = match self.attach_and_open(session) {
            Ok(database) => return Ok((database, OpenTier::AfterRecovery)),
            Err(error) => error,
        };
        warn!(%error, "could not open database after log recovery");

        info!("running repair");
        if let Err(error) = repair_tool.repair(self.path) {
            warn!(%error, "repair failed");
        }
        match self.attach_and_open(session) {
            Ok(database) => Ok((database, OpenTier::AfterRepair)),
            Err(error) => Err(Error::OpenExhausted {
                path: self.path.to_owned(),
                source: Box::new(error),
            }),
        }
    }

    /// Read-only attach + open. If the open fails, the database is detached
    /// again right away so that recovery and repair find the file released.
    fn attach_and_open(&mut self, session: SessionId) -> DbResult<DatabaseId> {
        self.engine.attach_database(session, self.path, true)?;
        self.attached = true;
        match self.engine.open_database(session, self.path, true) {
            Ok(database) => Ok(database),
            Err(error) => {
                self.detach_quietly(session);
                Err(error)
            }
        }
    }

    fn detach_quietly(&mut self, session: SessionId) {
        self.attached = false;
        if let Err(error) = self.engine.detach_database(session, self.path) {
            debug!(%error, "could not detach database");
        }
    }

    /// Releases whatever was acquired. Failures are logged and swallowed so
    /// that the error that made the open fail is the one reported.
    fn release(mut self) {
        if let Some(session) = self.session.take() {
            if self.attached {
                self.detach_quietly(session);
            }
            if let Err(error) = self.engine.end_session(session) {
                debug!(%error, "could not end session");
            }
        }
        if let Some(instance) = self.instance.take() {
            if let Err(error) = self.engine.term_instance(instance) {
                debug!(%error, "could not terminate instance");
            }
        }
    }
}

/// The engine expects directories with a trailing separator.
fn directory_of(path: &Path) -> String {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.display().to_string(),
        _ => ".".to_owned(),
    };
    if dir.ends_with(MAIN_SEPARATOR) {
        dir
    } else {
        format!("{dir}{MAIN_SEPARATOR}")
    }
}
