use indexmap::IndexMap;
use serde::Serialize;

use crate::exec::value::CellValue;

/// A decoded record: column name to value, in column ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, CellValue>);

impl Row {
    pub fn with_capacity(capacity: usize) -> Self {
        Row(IndexMap::with_capacity(capacity))
    }

    /// Inserts a value. A name that is already present keeps its position and
    /// takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: CellValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&CellValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a String, &'a CellValue);
    type IntoIter = indexmap::map::Iter<'a, String, CellValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
