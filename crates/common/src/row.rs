use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One record: an ordered mapping from column name to [`Value`].
///
/// Column order is schema-defined. Rows are never mutated after
/// production; operators that transform rows build new ones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// An empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from `(name, value)` pairs in order.
    pub fn from_pairs(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value of a column by exact name; `None` when absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Appends a column; replaces the value when the name already exists.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.columns.push((name, value)),
        }
    }

    /// Iterates `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Consumes the row into its pairs.
    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
