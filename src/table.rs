// 📋 Table - time-indexed, column-oriented data
//
// One row per (region, time period). Columns are typed once at load time and
// cloned verbatim unless the applier replaces them.

use crate::error::{Result, TransformError};
use anyhow::Context as AnyhowContext;
use std::io::{Read, Write};
use std::path::Path;

// ============================================================================
// COLUMN
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Integer(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Integer(_) => "integer",
            Column::Float(_) => "float",
            Column::Text(_) => "text",
        }
    }

    /// Cell rendered for CSV output; missing floats are written blank
    pub fn cell(&self, row: usize) -> String {
        match self {
            Column::Integer(v) => v[row].to_string(),
            Column::Float(v) if v[row].is_nan() => String::new(),
            Column::Float(v) => v[row].to_string(),
            Column::Text(v) => v[row].clone(),
        }
    }

    /// Build a column from raw cells. Inferred columns are float when every
    /// cell is a number or missing, text otherwise.
    fn infer(name: &str, cells: Vec<String>, kind: FieldKind) -> Result<Column> {
        match kind {
            FieldKind::Integer => {
                let parsed: std::result::Result<Vec<i64>, _> =
                    cells.iter().map(|c| c.trim().parse::<i64>()).collect();
                parsed.map(Column::Integer).map_err(|_| TransformError::ColumnType {
                    column: name.to_string(),
                    expected: "integer",
                    found: "text",
                })
            }
            FieldKind::Text => Ok(Column::Text(cells)),
            FieldKind::Inferred => {
                // zero-padded codes would not survive a float round trip
                if cells.iter().any(|c| is_zero_padded(c)) {
                    return Ok(Column::Text(cells));
                }

                let parsed: Option<Vec<f64>> = cells.iter().map(|c| parse_float(c)).collect();
                Ok(match parsed {
                    Some(values) => Column::Float(values),
                    None => Column::Text(cells),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer,
    Text,
    Inferred,
}

/// Markers read as a missing value in float columns
const MISSING_MARKERS: [&str; 4] = ["", "NA", "NaN", "nan"];

fn parse_float(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if MISSING_MARKERS.contains(&cell) {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

fn is_zero_padded(cell: &str) -> bool {
    let digits = cell.trim().trim_start_matches(['-', '+']).as_bytes();
    digits.len() > 1 && digits[0] == b'0' && digits[1].is_ascii_digit()
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a column (fails on length mismatch or duplicate name)
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(TransformError::DuplicateColumn { column: name });
        }
        self.set_column(name, column)?;
        Ok(self)
    }

    /// Replace a column in place, or append it if absent
    pub fn set_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(TransformError::ColumnLength {
                column: name,
                expected: self.n_rows,
                found: column.len(),
            });
        }

        if self.columns.is_empty() {
            self.n_rows = column.len();
        }

        match self.position(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| TransformError::MissingColumn {
            column: name.to_string(),
        })
    }

    pub fn float_column(&self, name: &str) -> Result<&[f64]> {
        match self.require(name)? {
            Column::Float(v) => Ok(v),
            other => Err(type_error(name, "float", other)),
        }
    }

    pub fn integer_column(&self, name: &str) -> Result<&[i64]> {
        match self.require(name)? {
            Column::Integer(v) => Ok(v),
            other => Err(type_error(name, "integer", other)),
        }
    }

    pub fn text_column(&self, name: &str) -> Result<&[String]> {
        match self.require(name)? {
            Column::Text(v) => Ok(v),
            other => Err(type_error(name, "text", other)),
        }
    }

    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    // ========================================================================
    // CSV
    // ========================================================================

    /// Read CSV; `integer_fields` are parsed as integers, `text_fields` kept
    /// verbatim, the rest inferred
    pub fn from_csv_reader<R: Read>(
        reader: R,
        integer_fields: &[&str],
        text_fields: &[&str],
    ) -> anyhow::Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(str::to_string)
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (line, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
            for (i, value) in record.iter().enumerate().take(headers.len()) {
                cells[i].push(value.to_string());
            }
        }

        let mut table = Table::new();
        for (name, raw) in headers.into_iter().zip(cells) {
            let kind = if integer_fields.contains(&name.as_str()) {
                FieldKind::Integer
            } else if text_fields.contains(&name.as_str()) {
                FieldKind::Text
            } else {
                FieldKind::Inferred
            };
            let column = Column::infer(&name, raw, kind)?;
            table = table.with_column(name, column)?;
        }

        Ok(table)
    }

    pub fn from_csv_path<P: AsRef<Path>>(
        path: P,
        integer_fields: &[&str],
        text_fields: &[&str],
    ) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open CSV file: {:?}", path.as_ref()))?;
        Table::from_csv_reader(file, integer_fields, text_fields)
    }

    pub fn to_csv_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.names).context("Failed to write CSV header")?;

        for row in 0..self.n_rows {
            let record: Vec<String> = self.columns.iter().map(|c| c.cell(row)).collect();
            wtr.write_record(&record)
                .with_context(|| format!("Failed to write CSV row {}", row))?;
        }

        wtr.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }

    pub fn to_csv_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let file = std::fs::File::create(path.as_ref())
            .with_context(|| format!("Failed to create CSV file: {:?}", path.as_ref()))?;
        self.to_csv_writer(file)
    }
}

fn type_error(column: &str, expected: &'static str, found: &Column) -> TransformError {
    TransformError::ColumnType {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}
