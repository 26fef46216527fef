use serde::{Deserialize, Serialize};

use crate::error::{FsqError, Result};
use crate::types::DataType;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name, unique within its schema.
    pub name: String,
    /// Declared column type.
    pub data_type: DataType,
}

impl Field {
    /// Creates a field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered mapping from column name to [`DataType`].
///
/// Every row produced under a schema carries values whose types equal the
/// declared type or are null.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema from fields; later duplicates of a name are dropped.
    pub fn new(fields: Vec<Field>) -> Self {
        let mut out: Vec<Field> = Vec::with_capacity(fields.len());
        for f in fields {
            if !out.iter().any(|e| e.name == f.name) {
                out.push(f);
            }
        }
        Self { fields: out }
    }

    /// The empty schema.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Position of a column by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// True if the column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Declared type of a column, if present.
    pub fn data_type(&self, name: &str) -> Option<DataType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.data_type)
    }

    /// Appends a column, replacing the type of an existing same-named one.
    pub fn push(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => existing.data_type = field.data_type,
            None => self.fields.push(field),
        }
    }

    /// Column-name union of two schemas; overlapping columns promote
    /// through the type lattice. Order: self's columns, then other's new
    /// columns.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        for f in &other.fields {
            match fields.iter_mut().find(|e| e.name == f.name) {
                Some(existing) => {
                    existing.data_type = existing.data_type.promote(f.data_type);
                }
                None => fields.push(f.clone()),
            }
        }
        Schema { fields }
    }

    /// Narrows to the named columns, preserving the requested order.
    pub fn project(&self, columns: &[String]) -> Result<Schema> {
        let mut fields = Vec::with_capacity(columns.len());
        for c in columns {
            match self.fields.iter().find(|f| &f.name == c) {
                Some(f) => fields.push(f.clone()),
                None => {
                    return Err(FsqError::Schema(format!(
                        "column '{}' not found; available: {}",
                        c,
                        self.names().join(", ")
                    )))
                }
            }
        }
        Ok(Schema { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Integer),
            Field::new("b", DataType::String),
            Field::new("c", DataType::Float),
        ])
    }

    #[test]
    fn merge_unions_and_promotes() {
        let left = abc();
        let right = Schema::new(vec![
            Field::new("c", DataType::Decimal),
            Field::new("d", DataType::Boolean),
        ]);
        let merged = left.merge(&right);
        assert_eq!(merged.names(), vec!["a", "b", "c", "d"]);
        assert_eq!(merged.data_type("c"), Some(DataType::Decimal));
    }

    #[test]
    fn project_errors_on_unknown_column() {
        let err = abc().project(&["a".into(), "zzz".into()]).unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn duplicate_names_keep_first() {
        let s = Schema::new(vec![
            Field::new("a", DataType::Integer),
            Field::new("a", DataType::String),
        ]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.data_type("a"), Some(DataType::Integer));
    }
}
