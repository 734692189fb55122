use tracing::{debug, instrument};

use crate::{
    catalog::column::{sort_by_ordinal, ColumnDescriptor},
    engine::Engine,
    error::{DbResult, Error},
    exec::cursor::TableCursor,
    session::DatabaseHandle,
};

/// Returns the names of all the tables of the database, in engine order.
#[instrument(level = "debug", skip_all)]
pub fn list_tables<E: Engine + ?Sized>(
    engine: &E,
    handle: &DatabaseHandle,
) -> DbResult<Vec<String>> {
    let names = engine.table_names(handle.session(), handle.database())?;
    debug!(count = names.len(), "listed tables");
    Ok(names)
}

/// Returns the columns of the named table, ordered by ordinal.
///
/// The table is opened only for the duration of the call.
#[instrument(level = "debug", skip(engine, handle))]
pub fn list_columns<E: Engine + ?Sized>(
    engine: &E,
    handle: &DatabaseHandle,
    table: &str,
) -> DbResult<Vec<ColumnDescriptor>> {
    let read = || -> DbResult<Vec<ColumnDescriptor>> {
        let cursor = TableCursor::open(engine, handle, table)?;
        let mut columns = engine.table_columns(cursor.session(), cursor.table())?;
        sort_by_ordinal(&mut columns);
        Ok(columns)
    };
    read().map_err(|source| Error::Schema {
        table: table.to_owned(),
        source: Box::new(source),
    })
}
