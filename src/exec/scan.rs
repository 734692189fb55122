use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    catalog::column::ColumnDescriptor,
    config::default_future_time_limit,
    engine::Engine,
    error::{DbResult, Error},
    exec::{
        cursor::TableCursor,
        decode::{DecodeWarning, RowDecoder},
        row::Row,
    },
    schema::{list_columns, list_tables},
    session::DatabaseHandle,
};

/// Options for [`scan_table`] and [`scan_database`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How far past the current time a code 15 value may lie and still be
    /// taken as a timestamp.
    pub future_time_limit: Duration,
    /// Decode binary columns as raw bytes instead of text.
    pub binary_as_bytes: bool,
    /// Only scan these tables, if set. Names that don't exist are ignored.
    pub tables: Option<Vec<String>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            future_time_limit: default_future_time_limit(),
            binary_as_bytes: false,
            tables: None,
        }
    }
}

/// The decoded contents of a table, in scan order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableResult {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    pub warnings: Vec<DecodeWarning>,
}

/// A non-fatal problem found while scanning a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The column's values were all recorded as null.
    UnknownColumnType { code: u32 },
    /// The table is missing from the result.
    TableSkipped { reason: String },
}

/// The decoded contents of a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseResult {
    pub tables: Vec<TableResult>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DatabaseResult {
    pub fn table(&self, name: &str) -> Option<&TableResult> {
        self.tables.iter().find(|table| table.name == name)
    }

    fn push(&mut self, table: TableResult) {
        self.diagnostics
            .extend(table.warnings.iter().map(|warning| Diagnostic {
                table: table.name.clone(),
                column: Some(warning.column.clone()),
                kind: DiagnosticKind::UnknownColumnType { code: warning.code },
            }));
        self.tables.push(table);
    }

    fn skip(&mut self, table: String, error: &Error) {
        self.diagnostics.push(Diagnostic {
            table,
            column: None,
            kind: DiagnosticKind::TableSkipped {
                reason: error.to_string(),
            },
        });
    }
}

/// Reads every record of the named table.
///
/// Fails with [`Error::Schema`] if the columns can't be listed and with
/// [`Error::Scan`] if the table can't be read afterwards. An empty table is not
/// an error.
#[instrument(level = "debug", skip(engine, handle, options))]
pub fn scan_table<E: Engine + ?Sized>(
    engine: &E,
    handle: &DatabaseHandle,
    table: &str,
    options: &ScanOptions,
) -> DbResult<TableResult> {
    scan_table_at(engine, handle, table, options, Utc::now())
}

fn scan_table_at<E: Engine + ?Sized>(
    engine: &E,
    handle: &DatabaseHandle,
    table: &str,
    options: &ScanOptions,
    now: DateTime<Utc>,
) -> DbResult<TableResult> {
    let columns = list_columns(engine, handle, table)?;
    let read = || -> DbResult<TableResult> {
        let decoder = RowDecoder::new(
            columns,
            options.future_time_limit,
            now,
            options.binary_as_bytes,
        )?;
        let mut cursor = TableCursor::open(engine, handle, table)?;

        let mut rows = Vec::new();
        let mut more = cursor.move_first()?;
        while more {
            rows.push(decoder.decode(engine, cursor.session(), cursor.table())?);
            more = cursor.move_next()?;
        }
        debug!(rows = rows.len(), "scanned table");

        Ok(TableResult {
            name: table.to_owned(),
            columns: decoder.columns().to_vec(),
            rows,
            warnings: decoder.warnings().to_vec(),
        })
    };
    read().map_err(|source| Error::Scan {
        table: table.to_owned(),
        source: Box::new(source),
    })
}

/// Reads every table of the database.
///
/// A table that fails is left out of the result and reported as a diagnostic;
/// only failing to list the tables is fatal.
#[instrument(level = "debug", skip_all)]
pub fn scan_database<E: Engine + ?Sized>(
    engine: &E,
    handle: &DatabaseHandle,
    options: &ScanOptions,
) -> DbResult<DatabaseResult> {
    let now = Utc::now();
    let names = list_tables(engine, handle)?
        .into_iter()
        .filter(|name| {
            options
                .tables
                .as_ref()
                .map_or(true, |wanted| wanted.contains(name))
        });

    let result = names.fold(DatabaseResult::default(), |mut result, name| {
        match scan_table_at(engine, handle, &name, options, now) {
            Ok(table) => result.push(table),
            Err(error) => {
                warn!(table = %name, %error, "skipping table");
                result.skip(name, &error);
            }
        }
        result
    });
    debug!(
        tables = result.tables.len(),
        diagnostics = result.diagnostics.len(),
        "scanned database"
    );
    Ok(result)
}
