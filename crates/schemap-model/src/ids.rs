#![deny(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Separator between the table and column parts of a [`ColumnRef`].
pub const COLUMN_SEPARATOR: char = '.';

/// A validated `table.column` identifier.
///
/// Exactly one separator is allowed and both parts must be non-empty after
/// trimming. Each part is stored trimmed, so `"emp .id"` is `emp.id`. Ordering follows the full identifier string, which is the
/// tie-break order used throughout ranking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    id: String,
    split: usize,
}

impl ColumnRef {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        let mut separators = trimmed.match_indices(COLUMN_SEPARATOR);
        let Some((split, _)) = separators.next() else {
            return Err(ModelError::InvalidColumnRef(value));
        };
        if separators.next().is_some() {
            return Err(ModelError::InvalidColumnRef(value));
        }
        let (table, column) = (trimmed[..split].trim(), trimmed[split + 1..].trim());
        if table.is_empty() || column.is_empty() {
            return Err(ModelError::InvalidColumnRef(value));
        }
        Ok(Self {
            id: format!("{table}{COLUMN_SEPARATOR}{column}"),
            split: table.len(),
        })
    }

    /// Builds a reference from separate table and column names.
    pub fn from_parts(table: &str, column: &str) -> Result<Self, ModelError> {
        Self::new(format!("{}{COLUMN_SEPARATOR}{}", table.trim(), column.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn table(&self) -> &str {
        &self.id[..self.split]
    }

    pub fn column(&self) -> &str {
        &self.id[self.split + 1..]
    }
}

/// Returns the table part of a raw identifier, or `None` if it is not a
/// well-formed `table.column` id.
pub fn table_of(raw: &str) -> Option<String> {
    ColumnRef::new(raw).ok().map(|r| r.table().to_string())
}

impl FromStr for ColumnRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl serde::Serialize for ColumnRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<'de> serde::Deserialize<'de> for ColumnRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Name of a retrieval method contributing scores (e.g. `bm25`, `minilm`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct MethodName(String);

impl MethodName {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidMethodName(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The built-in lexical method.
    pub fn bm25() -> Self {
        Self("bm25".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MethodName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MethodName {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MethodName> for String {
    fn from(value: MethodName) -> Self {
        value.0
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
