//! Reading run inputs from disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use schemap_model::{ColumnDescriptions, MethodMatch, MethodName, MethodResults, SchemaDocument};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// A `--method` argument: `[NAME=]FILE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFile {
    pub name: Option<MethodName>,
    pub path: PathBuf,
}

impl FromStr for MethodFile {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("method file path is empty".to_string());
        }
        if let Some((name, path)) = raw.split_once('=')
            && !name.contains(['/', '\\'])
        {
            if path.is_empty() {
                return Err(format!("missing file after `{name}=`"));
            }
            let name = MethodName::new(name).map_err(|e| e.to_string())?;
            return Ok(Self {
                name: Some(name),
                path: PathBuf::from(path),
            });
        }
        Ok(Self {
            name: None,
            path: PathBuf::from(raw),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MethodFileContents {
    Named(MethodResults),
    Bare(Vec<MethodMatch>),
}

/// Parses a method result file.
///
/// A name given on the command line wins over the one in the file; a bare
/// match array without one is named after the file stem.
pub fn parse_method_results(contents: &str, file: &MethodFile) -> Result<MethodResults> {
    let parsed: MethodFileContents = serde_json::from_str(contents).with_context(|| {
        format!(
            "{} is neither a method result document nor a match array",
            file.path.display()
        )
    })?;
    let results = match parsed {
        MethodFileContents::Named(mut results) => {
            if let Some(name) = &file.name {
                results.method = name.clone();
            }
            results
        }
        MethodFileContents::Bare(matches) => {
            let method = match &file.name {
                Some(name) => name.clone(),
                None => name_from_stem(&file.path)?,
            };
            MethodResults { method, matches }
        }
    };
    Ok(results)
}

fn name_from_stem(path: &Path) -> Result<MethodName> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("cannot infer a method name from {}", path.display()))?;
    MethodName::new(stem)
        .with_context(|| format!("cannot infer a method name from {}", path.display()))
}

pub fn load_method_results(file: &MethodFile) -> Result<MethodResults> {
    let contents = fs::read_to_string(&file.path)
        .with_context(|| format!("read method results {}", file.path.display()))?;
    let results = parse_method_results(&contents, file)?;
    debug!(
        method = %results.method,
        matches = results.matches.len(),
        path = %file.path.display(),
        "loaded method results"
    );
    Ok(results)
}

pub fn load_schema(path: &Path) -> Result<SchemaDocument> {
    read_json(path, "schema")
}

/// Loads `{"table.column": "description"}`.
pub fn load_descriptions(path: &Path) -> Result<ColumnDescriptions> {
    read_json(path, "descriptions")
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {what} {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {what} {}", path.display()))
}
