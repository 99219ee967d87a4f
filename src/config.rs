// ⚙️ Configuration - run settings read from JSON, every field defaulted

use crate::applier::TableFields;
use crate::ramp::RampConfig;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Csv,
    Sqlite,
}

impl OutputKind {
    /// Guess from a file extension; anything unknown is CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sqlite") | Some("db") | Some("sqlite3") => OutputKind::Sqlite,
            _ => OutputKind::Csv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub kind: Option<OutputKind>,

    /// Table name used for SQLite output
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

fn default_table_name() -> String {
    "transformed".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            kind: None,
            table_name: default_table_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub fields: TableFields,

    /// First period that may be transformed
    #[serde(default)]
    pub baseline_period: i64,

    #[serde(default)]
    pub ramp: RampConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Restrict the default variable scope to one taxonomy namespace
    #[serde(default)]
    pub namespace: Option<String>,
}

impl TransformConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Output kind: explicit config wins, else inferred from the output path
    pub fn output_kind(&self, path: &Path) -> OutputKind {
        self.output.kind.unwrap_or_else(|| OutputKind::from_path(path))
    }
}
