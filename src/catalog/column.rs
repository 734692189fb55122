use serde::Serialize;

use crate::{catalog::ty::ColumnType, engine::ColumnId};

/// A column definition, as read from the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// The column identifier.
    pub name: String,
    /// The column value type.
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// The engine's column id. Also the column's physical ordinal.
    pub id: ColumnId,
}

impl ColumnDescriptor {
    /// Creates a new column descriptor from the catalog's type code.
    pub fn new(name: impl Into<String>, code: u32, id: u32) -> Self {
        ColumnDescriptor {
            name: name.into(),
            ty: ColumnType::from_code(code),
            id: ColumnId(id),
        }
    }
}

/// Sorts the given columns by physical ordinal.
pub fn sort_by_ordinal(columns: &mut [ColumnDescriptor]) {
    columns.sort_by_key(|column| column.id);
}
