use tracing::{debug, trace};

use crate::{
    engine::{Engine, SessionId, TableId},
    error::DbResult,
    session::DatabaseHandle,
};

/// An opened table. The table is closed when the cursor is dropped.
pub struct TableCursor<'a, E: Engine + ?Sized> {
    engine: &'a E,
    session: SessionId,
    table: TableId,
}

impl<'a, E: Engine + ?Sized> TableCursor<'a, E> {
    /// Opens the named table (read-only).
    pub fn open(engine: &'a E, handle: &DatabaseHandle, name: &str) -> DbResult<Self> {
        let table = engine.open_table(handle.session(), handle.database(), name)?;
        trace!(name, %table, "opened table");
        Ok(TableCursor {
            engine,
            session: handle.session(),
            table,
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    /// Positions the cursor on the first record. `false` means the table is
    /// empty.
    pub fn move_first(&mut self) -> DbResult<bool> {
        self.engine.move_first(self.session, self.table)
    }

    /// Advances the cursor. `false` means there are no more records.
    pub fn move_next(&mut self) -> DbResult<bool> {
        self.engine.move_next(self.session, self.table)
    }
}

impl<E: Engine + ?Sized> Drop for TableCursor<'_, E> {
    fn drop(&mut self) {
        if let Err(error) = self.engine.close_table(self.session, self.table) {
            debug!(table = %self.table, %error, "could not close table");
        }
    }
}
