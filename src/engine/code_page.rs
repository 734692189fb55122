//! Text columns and their code pages.

use std::collections::HashMap;

use crate::{
    engine::{ColumnId, DatabaseId},
    util::io::{decode_utf16le, strip_nul},
};

/// Code page of UTF-16LE text columns.
pub const UNICODE: u32 = 1200;

/// Decodes the raw bytes of a text column. Columns with no known code page,
/// or with an ANSI one, are read as (lossy) UTF-8. Embedded NULs are removed.
pub fn decode_text(raw: Vec<u8>, code_page: Option<u32>) -> String {
    match code_page {
        Some(UNICODE) => strip_nul(&decode_utf16le(raw)),
        _ => strip_nul(&String::from_utf8_lossy(&raw)),
    }
}

/// Column code pages per table, keyed by database and table name so that they
/// outlive the cursor the catalog was read through.
#[derive(Debug, Default)]
pub struct CodePageCache {
    tables: HashMap<(DatabaseId, String), HashMap<ColumnId, u32>>,
}

impl CodePageCache {
    /// Records the code pages of a table's columns, replacing earlier ones.
    pub fn insert(
        &mut self,
        database: DatabaseId,
        table: &str,
        code_pages: impl IntoIterator<Item = (ColumnId, u32)>,
    ) {
        self.tables
            .insert((database, table.to_owned()), code_pages.into_iter().collect());
    }

    /// Whether the table's columns were recorded.
    pub fn contains(&self, database: DatabaseId, table: &str) -> bool {
        self.tables.contains_key(&(database, table.to_owned()))
    }

    pub fn get(&self, database: DatabaseId, table: &str, column: ColumnId) -> Option<u32> {
        self.tables
            .get(&(database, table.to_owned()))
            .and_then(|columns| columns.get(&column).copied())
    }

    /// Forgets every table of a closed database.
    pub fn remove_database(&mut self, database: DatabaseId) {
        self.tables.retain(|(db, _), _| *db != database);
    }
}
