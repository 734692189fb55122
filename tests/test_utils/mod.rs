use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    path::{Path, PathBuf},
};

use buff::AsBytes;
use esedump::{
    catalog::column::ColumnDescriptor,
    engine::{
        code_page::{decode_text, CodePageCache},
        header::FileType,
        ColumnId, Credentials, DatabaseId, Engine, EngineParam, InstanceId, SessionId, TableId,
    },
    error::{DbResult, Error},
    repair::RepairTool,
};
use tempfile::NamedTempFile;

/// Sets up tracing subscriber.
#[allow(dead_code)]
pub fn setup_tracing(level: Option<&str>) {
    use tracing_subscriber::{
        fmt::{format::FmtSpan, layer},
        layer::SubscriberExt,
        util::SubscriberInitExt,
        EnvFilter,
    };

    let filter_layer = level
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or("warn".into()));
    let fmt_layer = layer().with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

/// Engine error code returned by injected failures.
pub const FAKE_ERROR_CODE: i32 = -1206;

/// Encodes a fixed-width value the way the engine stores it.
#[allow(dead_code)]
pub fn cell<T>(value: T) -> Vec<u8>
where
    T: AsBytes,
    T::Repr: AsRef<[u8]>,
{
    value.serialize().as_ref().to_vec()
}

/// Encodes text as UTF-8, NUL-terminated like the engine's ANSI text.
#[allow(dead_code)]
pub fn text(value: &str) -> Vec<u8> {
    let mut raw = value.as_bytes().to_vec();
    raw.push(0);
    raw
}

/// An in-memory table.
#[derive(Debug, Clone)]
pub struct FakeTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub code_pages: Vec<(ColumnId, u32)>,
    pub rows: Vec<HashMap<ColumnId, Vec<u8>>>,
}

#[allow(dead_code)]
impl FakeTable {
    pub fn new(name: &str) -> Self {
        FakeTable {
            name: name.into(),
            columns: Vec::new(),
            code_pages: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, code: u32, id: u32) -> Self {
        self.columns.push(ColumnDescriptor::new(name, code, id));
        self
    }

    /// Adds a text column stored in the given code page.
    pub fn text_column(mut self, name: &str, code: u32, id: u32, code_page: u32) -> Self {
        self.code_pages.push((ColumnId(id), code_page));
        self.column(name, code, id)
    }

    /// Adds a record; columns not listed are unset.
    pub fn row(mut self, cells: impl IntoIterator<Item = (u32, Vec<u8>)>) -> Self {
        self.rows.push(
            cells
                .into_iter()
                .map(|(id, raw)| (ColumnId(id), raw))
                .collect(),
        );
        self
    }
}

struct Cursor {
    table: usize,
    database: DatabaseId,
    position: Option<usize>,
}

/// An in-memory [`Engine`] that records every call and fails on demand.
pub struct FakeEngine {
    pub file_type: FileType,
    pub page_size: u32,
    tables: Vec<FakeTable>,
    failures: RefCell<HashMap<String, usize>>,
    calls: RefCell<Vec<String>>,
    cursors: RefCell<HashMap<TableId, Cursor>>,
    code_pages: RefCell<CodePageCache>,
    next_id: Cell<usize>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine {
            file_type: FileType::Database,
            page_size: 8192,
            tables: Vec::new(),
            failures: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
            cursors: RefCell::new(HashMap::new()),
            code_pages: RefCell::new(CodePageCache::default()),
            next_id: Cell::new(1),
        }
    }

    pub fn with_table(mut self, table: FakeTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Makes the next `times` calls of `op` fail. `op` is either a method name
    /// (`"open_database"`) or a method name and table name (`"open_table:T"`).
    pub fn fail(self, op: &str, times: usize) -> Self {
        self.failures.borrow_mut().insert(op.into(), times);
        self
    }

    /// Makes every call of `op` fail.
    pub fn fail_always(self, op: &str) -> Self {
        self.fail(op, usize::MAX)
    }

    /// Returns the names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.borrow().len()
    }

    fn call(&self, op: &'static str, target: Option<&str>) -> DbResult<()> {
        let name = match target {
            Some(target) => format!("{op}:{target}"),
            None => op.to_owned(),
        };
        self.calls.borrow_mut().push(name.clone());

        let mut failures = self.failures.borrow_mut();
        for key in [name.as_str(), op] {
            if let Some(remaining) = failures.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Engine {
                        op,
                        code: FAKE_ERROR_CODE,
                    });
                }
            }
        }
        Ok(())
    }

    fn cursor_database(&self, table: TableId) -> DbResult<DatabaseId> {
        self.cursors
            .borrow()
            .get(&table)
            .map(|cursor| cursor.database)
            .ok_or(Error::Engine {
                op: "cursor",
                code: -1003,
            })
    }

    fn next_id(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn cursor_table(&self, table: TableId) -> DbResult<&FakeTable> {
        match self.cursors.borrow().get(&table) {
            Some(cursor) => Ok(&self.tables[cursor.table]),
            None => Err(Error::Engine {
                op: "cursor",
                code: -1003,
            }),
        }
    }

    fn move_to(&self, table: TableId, position: usize) -> DbResult<bool> {
        let len = self.cursor_table(table)?.rows.len();
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors.get_mut(&table).expect("cursor checked above");
        if position < len {
            cursor.position = Some(position);
            Ok(true)
        } else {
            cursor.position = None;
            Ok(false)
        }
    }
}

impl Engine for FakeEngine {
    fn set_param(&self, _: Option<InstanceId>, param: EngineParam) -> DbResult<()> {
        let name = match param {
            EngineParam::DatabasePageSize(size) => format!("page_size={size}"),
            EngineParam::Recovery(on) => format!("recovery={on}"),
            EngineParam::CircularLog(on) => format!("circular_log={on}"),
            EngineParam::BaseName(name) => format!("base_name={name}"),
            EngineParam::SystemPath(_) => "system_path".into(),
            EngineParam::LogFilePath(_) => "log_file_path".into(),
            EngineParam::TempPath(_) => "temp_path".into(),
        };
        self.call("set_param", Some(&name))
    }

    fn create_instance(&self, _: &str) -> DbResult<InstanceId> {
        self.call("create_instance", None)?;
        Ok(InstanceId(self.next_id()))
    }

    fn init_instance(&self, _: InstanceId) -> DbResult<()> {
        self.call("init_instance", None)
    }

    fn term_instance(&self, _: InstanceId) -> DbResult<()> {
        self.call("term_instance", None)
    }

    fn begin_session(&self, _: InstanceId, _: Option<&Credentials>) -> DbResult<SessionId> {
        self.call("begin_session", None)?;
        Ok(SessionId(self.next_id()))
    }

    fn end_session(&self, _: SessionId) -> DbResult<()> {
        self.call("end_session", None)
    }

    fn attach_database(&self, _: SessionId, _: &Path, read_only: bool) -> DbResult<()> {
        assert!(read_only, "databases must be attached read-only");
        self.call("attach_database", None)
    }

    fn open_database(&self, _: SessionId, _: &Path, read_only: bool) -> DbResult<DatabaseId> {
        assert!(read_only, "databases must be opened read-only");
        self.call("open_database", None)?;
        Ok(DatabaseId(self.next_id() as u32))
    }

    fn close_database(&self, _: SessionId, _: DatabaseId) -> DbResult<()> {
        self.call("close_database", None)
    }

    fn detach_database(&self, _: SessionId, _: &Path) -> DbResult<()> {
        self.call("detach_database", None)
    }

    fn file_type(&self, _: &Path) -> DbResult<FileType> {
        self.call("file_type", None)?;
        Ok(self.file_type)
    }

    fn page_size(&self, _: &Path) -> DbResult<u32> {
        self.call("page_size", None)?;
        Ok(self.page_size)
    }

    fn table_names(&self, _: SessionId, _: DatabaseId) -> DbResult<Vec<String>> {
        self.call("table_names", None)?;
        Ok(self.tables.iter().map(|table| table.name.clone()).collect())
    }

    fn open_table(&self, _: SessionId, database: DatabaseId, name: &str) -> DbResult<TableId> {
        self.call("open_table", Some(name))?;
        let index = self
            .tables
            .iter()
            .position(|table| table.name == name)
            .ok_or(Error::Engine {
                op: "open_table",
                code: -1305,
            })?;
        let id = TableId(self.next_id());
        self.cursors.borrow_mut().insert(
            id,
            Cursor {
                table: index,
                database,
                position: None,
            },
        );
        Ok(id)
    }

    fn close_table(&self, _: SessionId, table: TableId) -> DbResult<()> {
        self.cursors.borrow_mut().remove(&table);
        self.call("close_table", None)
    }

    fn table_columns(&self, _: SessionId, table: TableId) -> DbResult<Vec<ColumnDescriptor>> {
        let fake = self.cursor_table(table)?;
        self.call("table_columns", Some(&fake.name))?;
        let database = self.cursor_database(table)?;
        self.code_pages
            .borrow_mut()
            .insert(database, &fake.name, fake.code_pages.iter().copied());
        Ok(fake.columns.clone())
    }

    fn move_first(&self, _: SessionId, table: TableId) -> DbResult<bool> {
        let name = self.cursor_table(table)?.name.clone();
        self.call("move_first", Some(&name))?;
        self.move_to(table, 0)
    }

    fn move_next(&self, _: SessionId, table: TableId) -> DbResult<bool> {
        let name = self.cursor_table(table)?.name.clone();
        self.call("move_next", Some(&name))?;
        let next = match self.cursors.borrow().get(&table).and_then(|c| c.position) {
            Some(position) => position + 1,
            None => usize::MAX,
        };
        self.move_to(table, next)
    }

    fn retrieve(
        &self,
        _: SessionId,
        table: TableId,
        column: ColumnId,
    ) -> DbResult<Option<Vec<u8>>> {
        let fake = self.cursor_table(table)?;
        self.call("retrieve", Some(&fake.name))?;
        let position = self
            .cursors
            .borrow()
            .get(&table)
            .and_then(|cursor| cursor.position)
            .ok_or(Error::Engine {
                op: "retrieve",
                code: -1603,
            })?;
        Ok(fake.rows[position].get(&column).cloned())
    }

    /// Decodes text by the code page recorded when the table's columns were
    /// listed, on whichever cursor that was.
    fn retrieve_string(
        &self,
        s: SessionId,
        table: TableId,
        column: ColumnId,
    ) -> DbResult<Option<String>> {
        let name = self.cursor_table(table)?.name.clone();
        let database = self.cursor_database(table)?;
        let code_page = self.code_pages.borrow().get(database, &name, column);
        Ok(self.retrieve(s, table, column)?.map(|raw| decode_text(raw, code_page)))
    }
}

/// A [`RepairTool`] that records its invocations and optionally fixes the
/// fake engine's failures.
#[derive(Default)]
pub struct FakeRepair {
    calls: RefCell<Vec<String>>,
}

#[allow(dead_code)]
impl FakeRepair {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl RepairTool for FakeRepair {
    fn recover(&self, log_prefix: &str, _: &Path) -> DbResult<()> {
        self.calls.borrow_mut().push(format!("recover:{log_prefix}"));
        Ok(())
    }

    fn repair(&self, _: &Path) -> DbResult<()> {
        self.calls.borrow_mut().push("repair".into());
        Ok(())
    }
}

/// A database file on disk. The fake engine doesn't read it, but the session
/// requires it to exist.
pub struct TestFile(NamedTempFile);

#[allow(dead_code)]
impl TestFile {
    pub fn new() -> Self {
        TestFile(NamedTempFile::new().unwrap())
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    pub fn missing() -> PathBuf {
        std::env::temp_dir().join("esedump-missing-file.edb")
    }
}
