//! Introspected schema documents.
//!
//! The schema introspector is an external collaborator; this module only
//! defines the document it hands over and how that document is flattened
//! into per-column text for retrieval and arbitration context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ColumnRef;

/// Optional free-text descriptions keyed by `table.column` id.
pub type ColumnDescriptions = BTreeMap<String, String>;

/// Schema as returned by the introspector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default, alias = "table", alias = "name")]
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(default, alias = "column", alias = "name")]
    pub column_name: Option<String>,
    #[serde(default, alias = "type")]
    pub data_type: Option<String>,
}

/// One flattened column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDocument {
    pub id: ColumnRef,
    pub data_type: String,
}

impl ColumnDocument {
    /// Lowercase `table column type` text used for lexical retrieval.
    pub fn lexical_text(&self, description: Option<&str>) -> String {
        let mut text = format!(
            "{} {} {}",
            self.id.table(),
            self.id.column(),
            self.data_type
        );
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            text.push(' ');
            text.push_str(description.trim());
        }
        text.to_lowercase()
    }

    /// Human-readable context handed to the arbitration service.
    pub fn context_text(&self, description: Option<&str>) -> String {
        let description = description.map(str::trim).unwrap_or_default();
        format!(
            "{} type {} description {}",
            self.id, self.data_type, description
        )
        .trim()
        .to_string()
    }
}

impl SchemaDocument {
    /// Flattens the schema into column documents.
    ///
    /// Tables or columns without a name, and names that do not form a valid
    /// `table.column` id, are skipped.
    pub fn columns(&self) -> Vec<ColumnDocument> {
        let mut out = Vec::new();
        for table in &self.tables {
            let Some(table_name) = table.table_name.as_deref() else {
                continue;
            };
            for column in &table.columns {
                let Some(column_name) = column.column_name.as_deref() else {
                    continue;
                };
                let Ok(id) = ColumnRef::from_parts(table_name, column_name) else {
                    continue;
                };
                out.push(ColumnDocument {
                    id,
                    data_type: column.data_type.clone().unwrap_or_default(),
                });
            }
        }
        out
    }
}
