//! [`Engine`] backend over the system's `esent.dll`, loaded at run time.
//!
//! Only the ANSI entry points are used. Table and column metadata are read
//! from the `MSysObjects` catalog table, whose rows describe tables
//! (`Type == 1`) and their columns (`Type == 2`, keyed by `ObjidTable`).

use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::{c_char, c_void, CString},
    io,
    mem,
    path::Path,
    ptr,
};

use libloading::Library;
use tracing::{debug, trace};

use crate::{
    catalog::column::ColumnDescriptor,
    engine::{
        code_page::{decode_text, CodePageCache},
        ColumnId, Credentials, DatabaseId, Engine, EngineParam, InstanceId, SessionId, TableId,
    },
    error::{DbResult, Error},
    util::io::decode_fixed,
};

type JetErr = i32;

const LIBRARY: &str = "esent.dll";
const CATALOG_TABLE: &str = "MSysObjects";
const SYSTEM_TABLE_PREFIX: &str = "MSys";

const CATALOG_TYPE_TABLE: i16 = 1;
const CATALOG_TYPE_COLUMN: i16 = 2;

mod param_id {
    pub const SYSTEM_PATH: u32 = 0;
    pub const TEMP_PATH: u32 = 1;
    pub const LOG_FILE_PATH: u32 = 2;
    pub const BASE_NAME: u32 = 3;
    pub const CIRCULAR_LOG: u32 = 17;
    pub const RECOVERY: u32 = 34;
    pub const DATABASE_PAGE_SIZE: u32 = 64;
}

mod bit {
    pub const DB_READ_ONLY: u32 = 0x0000_0001;
    pub const TABLE_READ_ONLY: u32 = 0x0000_0004;
}

const MOVE_FIRST: i32 = i32::MIN;
const MOVE_NEXT: i32 = 1;

const ERR_INVALID_PARAMETER: JetErr = -1003;
const ERR_NO_CURRENT_RECORD: JetErr = -1603;
const WRN_COLUMN_NULL: JetErr = 1004;
const WRN_BUFFER_TRUNCATED: JetErr = 1006;

const COL_INFO: u32 = 0;

/// `JET_COLUMNDEF`.
#[repr(C)]
#[derive(Default)]
#[allow(dead_code)]
struct ColumnDef {
    cb_struct: u32,
    column_id: u32,
    coltyp: u32,
    country: u16,
    lang_id: u16,
    code_page: u16,
    collate: u16,
    cb_max: u32,
    grbit: u32,
}

macro_rules! esent_api {
    ($($field:ident = $symbol:literal ($($arg:ty),*);)+) => {
        struct Api {
            $($field: unsafe extern "system" fn($($arg),*) -> JetErr,)+
        }

        impl Api {
            /// # Safety
            ///
            /// `library` must be the engine library, so that the declared
            /// signatures match the exported ones.
            unsafe fn load(library: &Library) -> DbResult<Self> {
                Ok(Api {
                    $($field: *library
                        .get::<unsafe extern "system" fn($($arg),*) -> JetErr>(
                            concat!($symbol, "\0").as_bytes(),
                        )
                        .map_err(|error| {
                            Error::EngineUnavailable(format!("{}: {error}", $symbol))
                        })?,)+
                })
            }
        }
    };
}

esent_api! {
    set_system_parameter = "JetSetSystemParameterA"
        (*mut usize, usize, u32, usize, *const c_char);
    create_instance = "JetCreateInstanceA" (*mut usize, *const c_char);
    init = "JetInit" (*mut usize);
    term = "JetTerm" (usize);
    begin_session = "JetBeginSessionA" (usize, *mut usize, *const c_char, *const c_char);
    end_session = "JetEndSession" (usize, u32);
    attach_database = "JetAttachDatabaseA" (usize, *const c_char, u32);
    detach_database = "JetDetachDatabaseA" (usize, *const c_char);
    open_database = "JetOpenDatabaseA"
        (usize, *const c_char, *const c_char, *mut u32, u32);
    close_database = "JetCloseDatabase" (usize, u32, u32);
    open_table = "JetOpenTableA"
        (usize, u32, *const c_char, *const c_void, u32, u32, *mut usize);
    close_table = "JetCloseTable" (usize, usize);
    get_column_info = "JetGetColumnInfoA"
        (usize, u32, *const c_char, *const c_char, *mut c_void, u32, u32);
    move_cursor = "JetMove" (usize, usize, i32, u32);
    retrieve_column = "JetRetrieveColumn"
        (usize, usize, u32, *mut c_void, u32, *mut u32, u32, *mut c_void);
}

/// Catalog column ids of `MSysObjects`.
struct CatalogColumns {
    objid_table: ColumnId,
    ty: ColumnId,
    id: ColumnId,
    name: ColumnId,
    coltyp: ColumnId,
    code_page: ColumnId,
}

struct CatalogColumn {
    objid_table: i32,
    descriptor: ColumnDescriptor,
    code_page: u32,
}

/// An open table, as tracked by the backend.
struct OpenTable {
    name: String,
    database: DatabaseId,
}

/// The native engine.
pub struct EsentEngine {
    api: Api,
    tables: RefCell<HashMap<TableId, OpenTable>>,
    code_pages: RefCell<CodePageCache>,
    _library: Library,
}

impl EsentEngine {
    /// Loads the engine library.
    pub fn load() -> DbResult<Self> {
        // SAFETY: the system engine library has no initialization routines
        // with preconditions.
        let library = unsafe { Library::new(LIBRARY) }
            .map_err(|error| Error::EngineUnavailable(format!("{LIBRARY}: {error}")))?;
        // SAFETY: the symbols are looked up in the engine library.
        let api = unsafe { Api::load(&library)? };
        debug!("loaded {LIBRARY}");
        Ok(EsentEngine {
            api,
            tables: RefCell::new(HashMap::new()),
            code_pages: RefCell::new(CodePageCache::default()),
            _library: library,
        })
    }

    fn open_table_raw(
        &self,
        session: SessionId,
        database: DatabaseId,
        name: &str,
    ) -> DbResult<TableId> {
        let name = c_string(name)?;
        let mut table = 0;
        // SAFETY: all pointers are valid for the duration of the call.
        check("JetOpenTableA", unsafe {
            (self.api.open_table)(
                session.0,
                database.0,
                name.as_ptr(),
                ptr::null(),
                0,
                bit::TABLE_READ_ONLY,
                &mut table,
            )
        })?;
        Ok(TableId(table))
    }

    fn close_table_raw(&self, session: SessionId, table: TableId) -> DbResult<()> {
        // SAFETY: plain handles.
        check("JetCloseTable", unsafe {
            (self.api.close_table)(session.0, table.0)
        })?;
        Ok(())
    }

    /// Moves the cursor. `false` means there is no record to move to.
    fn move_cursor(&self, session: SessionId, table: TableId, rows: i32) -> DbResult<bool> {
        // SAFETY: plain handles.
        let code = unsafe { (self.api.move_cursor)(session.0, table.0, rows, 0) };
        match code {
            ERR_NO_CURRENT_RECORD => Ok(false),
            code => check("JetMove", code).map(|_| true),
        }
    }

    fn catalog_column(
        &self,
        session: SessionId,
        database: DatabaseId,
        name: &str,
    ) -> DbResult<ColumnId> {
        let table = c_string(CATALOG_TABLE)?;
        let column = c_string(name)?;
        let mut def = ColumnDef {
            cb_struct: mem::size_of::<ColumnDef>() as u32,
            ..ColumnDef::default()
        };
        // SAFETY: `def` is a `JET_COLUMNDEF` of the advertised size.
        check("JetGetColumnInfoA", unsafe {
            (self.api.get_column_info)(
                session.0,
                database.0,
                table.as_ptr(),
                column.as_ptr(),
                &mut def as *mut ColumnDef as *mut c_void,
                mem::size_of::<ColumnDef>() as u32,
                COL_INFO,
            )
        })?;
        Ok(ColumnId(def.column_id))
    }

    fn catalog_columns(
        &self,
        session: SessionId,
        database: DatabaseId,
    ) -> DbResult<CatalogColumns> {
        let get = |name| self.catalog_column(session, database, name);
        Ok(CatalogColumns {
            objid_table: get("ObjidTable")?,
            ty: get("Type")?,
            id: get("Id")?,
            name: get("Name")?,
            coltyp: get("ColtypOrPgnoFDP")?,
            code_page: get("PagesOrLocale")?,
        })
    }

    /// Calls `visit` with the cursor positioned on each catalog record.
    fn walk_catalog(
        &self,
        session: SessionId,
        database: DatabaseId,
        mut visit: impl FnMut(TableId, &CatalogColumns) -> DbResult<()>,
    ) -> DbResult<()> {
        let columns = self.catalog_columns(session, database)?;
        let catalog = self.open_table_raw(session, database, CATALOG_TABLE)?;
        let mut walk = || -> DbResult<()> {
            let mut more = self.move_cursor(session, catalog, MOVE_FIRST)?;
            while more {
                visit(catalog, &columns)?;
                more = self.move_cursor(session, catalog, MOVE_NEXT)?;
            }
            Ok(())
        };
        let result = walk();
        let closed = self.close_table_raw(session, catalog);
        result.and(closed)
    }

    fn read_i16(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<i16>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<2, i16>(c, raw))
            .transpose()
    }

    fn read_i32(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<i32>> {
        self.retrieve(s, t, c)?
            .map(|raw| decode_fixed::<4, i32>(c, raw))
            .transpose()
    }

    fn read_name(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<String> {
        let raw = self.retrieve(s, t, c)?.unwrap_or_default();
        Ok(decode_text(raw, None))
    }

    /// Returns the open table's name and database.
    fn open_table_key(&self, op: &'static str, table: TableId) -> DbResult<(String, DatabaseId)> {
        match self.tables.borrow().get(&table) {
            Some(open) => Ok((open.name.clone(), open.database)),
            None => Err(Error::Engine {
                op,
                code: ERR_INVALID_PARAMETER,
            }),
        }
    }
}

impl Engine for EsentEngine {
    fn set_param(&self, instance: Option<InstanceId>, param: EngineParam) -> DbResult<()> {
        let (id, number, text) = match param {
            EngineParam::DatabasePageSize(size) => {
                (param_id::DATABASE_PAGE_SIZE, size as usize, None)
            }
            EngineParam::Recovery(on) => {
                let value = if on { "On" } else { "Off" };
                (param_id::RECOVERY, 0, Some(value.to_owned()))
            }
            EngineParam::CircularLog(on) => (param_id::CIRCULAR_LOG, usize::from(on), None),
            EngineParam::BaseName(name) => (param_id::BASE_NAME, 0, Some(name)),
            EngineParam::SystemPath(path) => (param_id::SYSTEM_PATH, 0, Some(path)),
            EngineParam::LogFilePath(path) => (param_id::LOG_FILE_PATH, 0, Some(path)),
            EngineParam::TempPath(path) => (param_id::TEMP_PATH, 0, Some(path)),
        };
        let text = text.as_deref().map(c_string).transpose()?;
        let mut instance = instance.map(|instance| instance.0);
        let instance_ptr = instance
            .as_mut()
            .map_or(ptr::null_mut(), |instance| instance as *mut usize);
        trace!(id, number, ?text, "setting engine parameter");
        // SAFETY: the instance pointer is either null (global parameter) or
        // points to a live local.
        check("JetSetSystemParameterA", unsafe {
            (self.api.set_system_parameter)(
                instance_ptr,
                0,
                id,
                number,
                text.as_ref().map_or(ptr::null(), |text| text.as_ptr()),
            )
        })?;
        Ok(())
    }

    fn create_instance(&self, name: &str) -> DbResult<InstanceId> {
        let name = c_string(name)?;
        let mut instance = 0;
        // SAFETY: both pointers are valid for the duration of the call.
        check("JetCreateInstanceA", unsafe {
            (self.api.create_instance)(&mut instance, name.as_ptr())
        })?;
        Ok(InstanceId(instance))
    }

    fn init_instance(&self, instance: InstanceId) -> DbResult<()> {
        let mut instance = instance.0;
        // SAFETY: points to a live local.
        check("JetInit", unsafe { (self.api.init)(&mut instance) })?;
        Ok(())
    }

    fn term_instance(&self, instance: InstanceId) -> DbResult<()> {
        // SAFETY: plain handle.
        check("JetTerm", unsafe { (self.api.term)(instance.0) })?;
        Ok(())
    }

    fn begin_session(
        &self,
        instance: InstanceId,
        credentials: Option<&Credentials>,
    ) -> DbResult<SessionId> {
        let username = c_string(credentials.map_or("", |c| c.username.as_str()))?;
        let password = c_string(credentials.map_or("", |c| c.password.as_str()))?;
        let mut session = 0;
        // SAFETY: all pointers are valid for the duration of the call.
        check("JetBeginSessionA", unsafe {
            (self.api.begin_session)(
                instance.0,
                &mut session,
                username.as_ptr(),
                password.as_ptr(),
            )
        })?;
        Ok(SessionId(session))
    }

    fn end_session(&self, session: SessionId) -> DbResult<()> {
        // SAFETY: plain handle.
        check("JetEndSession", unsafe {
            (self.api.end_session)(session.0, 0)
        })?;
        Ok(())
    }

    fn attach_database(&self, session: SessionId, path: &Path, read_only: bool) -> DbResult<()> {
        let path = path_string(path)?;
        let grbit = if read_only { bit::DB_READ_ONLY } else { 0 };
        // SAFETY: the path outlives the call.
        check("JetAttachDatabaseA", unsafe {
            (self.api.attach_database)(session.0, path.as_ptr(), grbit)
        })?;
        Ok(())
    }

    fn open_database(
        &self,
        session: SessionId,
        path: &Path,
        read_only: bool,
    ) -> DbResult<DatabaseId> {
        let path = path_string(path)?;
        let grbit = if read_only { bit::DB_READ_ONLY } else { 0 };
        let mut database = 0;
        // SAFETY: all pointers are valid for the duration of the call.
        check("JetOpenDatabaseA", unsafe {
            (self.api.open_database)(session.0, path.as_ptr(), ptr::null(), &mut database, grbit)
        })?;
        Ok(DatabaseId(database))
    }

    fn close_database(&self, session: SessionId, database: DatabaseId) -> DbResult<()> {
        self.code_pages.borrow_mut().remove_database(database);
        // SAFETY: plain handles.
        check("JetCloseDatabase", unsafe {
            (self.api.close_database)(session.0, database.0, 0)
        })?;
        Ok(())
    }

    fn detach_database(&self, session: SessionId, path: &Path) -> DbResult<()> {
        let path = path_string(path)?;
        // SAFETY: the path outlives the call.
        check("JetDetachDatabaseA", unsafe {
            (self.api.detach_database)(session.0, path.as_ptr())
        })?;
        Ok(())
    }

    fn table_names(&self, session: SessionId, database: DatabaseId) -> DbResult<Vec<String>> {
        let mut names = Vec::new();
        self.walk_catalog(session, database, |catalog, columns| {
            if self.read_i16(session, catalog, columns.ty)? == Some(CATALOG_TYPE_TABLE) {
                let name = self.read_name(session, catalog, columns.name)?;
                if !name.starts_with(SYSTEM_TABLE_PREFIX) {
                    names.push(name);
                }
            }
            Ok(())
        })?;
        Ok(names)
    }

    fn open_table(
        &self,
        session: SessionId,
        database: DatabaseId,
        name: &str,
    ) -> DbResult<TableId> {
        let table = self.open_table_raw(session, database, name)?;
        self.tables.borrow_mut().insert(
            table,
            OpenTable {
                name: name.to_owned(),
                database,
            },
        );
        Ok(table)
    }

    fn close_table(&self, session: SessionId, table: TableId) -> DbResult<()> {
        self.tables.borrow_mut().remove(&table);
        self.close_table_raw(session, table)
    }

    fn table_columns(&self, session: SessionId, table: TableId) -> DbResult<Vec<ColumnDescriptor>> {
        let (name, database) = self.open_table_key("table_columns", table)?;

        let mut objid = None;
        let mut entries = Vec::new();
        self.walk_catalog(session, database, |catalog, columns| {
            let objid_table = self.read_i32(session, catalog, columns.objid_table)?.unwrap_or(0);
            match self.read_i16(session, catalog, columns.ty)? {
                Some(CATALOG_TYPE_TABLE) => {
                    if self.read_name(session, catalog, columns.name)? == name {
                        objid = Some(objid_table);
                    }
                }
                Some(CATALOG_TYPE_COLUMN) => {
                    let id = self.read_i32(session, catalog, columns.id)?.unwrap_or(0);
                    let coltyp = self.read_i32(session, catalog, columns.coltyp)?.unwrap_or(0);
                    let code_page = self
                        .read_i32(session, catalog, columns.code_page)?
                        .unwrap_or(0);
                    entries.push(CatalogColumn {
                        objid_table,
                        descriptor: ColumnDescriptor::new(
                            self.read_name(session, catalog, columns.name)?,
                            coltyp as u32,
                            id as u32,
                        ),
                        code_page: code_page as u32,
                    });
                }
                _ => {}
            }
            Ok(())
        })?;

        let Some(objid) = objid else {
            return Ok(Vec::new());
        };
        let mut code_pages = Vec::new();
        let descriptors = entries
            .into_iter()
            .filter(|entry| entry.objid_table == objid)
            .map(|entry| {
                code_pages.push((entry.descriptor.id, entry.code_page));
                entry.descriptor
            })
            .collect();
        self.code_pages.borrow_mut().insert(database, &name, code_pages);
        Ok(descriptors)
    }

    fn move_first(&self, session: SessionId, table: TableId) -> DbResult<bool> {
        self.move_cursor(session, table, MOVE_FIRST)
    }

    fn move_next(&self, session: SessionId, table: TableId) -> DbResult<bool> {
        self.move_cursor(session, table, MOVE_NEXT)
    }

    fn retrieve(
        &self,
        session: SessionId,
        table: TableId,
        column: ColumnId,
    ) -> DbResult<Option<Vec<u8>>> {
        let mut buf = vec![0; 256];
        loop {
            let mut actual = 0;
            // SAFETY: `buf` is valid for writes of its whole length.
            let code = unsafe {
                (self.api.retrieve_column)(
                    session.0,
                    table.0,
                    column.0,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as u32,
                    &mut actual,
                    0,
                    ptr::null_mut(),
                )
            };
            match check("JetRetrieveColumn", code)? {
                WRN_COLUMN_NULL => return Ok(None),
                WRN_BUFFER_TRUNCATED => buf.resize(actual as usize, 0),
                _ => {
                    buf.truncate(actual as usize);
                    return Ok(Some(buf));
                }
            }
        }
    }

    fn retrieve_string(&self, s: SessionId, t: TableId, c: ColumnId) -> DbResult<Option<String>> {
        let (name, database) = self.open_table_key("retrieve_string", t)?;
        if !self.code_pages.borrow().contains(database, &name) {
            // The catalog was not read for this table yet.
            self.table_columns(s, t)?;
        }
        let code_page = self.code_pages.borrow().get(database, &name, c);
        Ok(self.retrieve(s, t, c)?.map(|raw| decode_text(raw, code_page)))
    }
}

/// Negative codes are errors; positive ones are warnings and are returned.
fn check(op: &'static str, code: JetErr) -> DbResult<JetErr> {
    if code < 0 {
        Err(Error::Engine { op, code })
    } else {
        Ok(code)
    }
}

fn c_string(text: &str) -> DbResult<CString> {
    CString::new(text).map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error).into())
}

fn path_string(path: &Path) -> DbResult<CString> {
    c_string(&path.to_string_lossy())
}
