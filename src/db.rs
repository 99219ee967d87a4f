// 🗄️ Output Database - transformed tables + run log in SQLite
//
// Each run writes its output table and one row in `runs`:
// run id (caller-supplied or UUID), timestamp, mode, plan fingerprint.

use crate::magnitude::DescriptorMap;
use crate::table::{Column, Table};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

// ============================================================================
// RUN RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub plan_hash: String,
    pub n_descriptors: i64,
    pub n_rows: i64,
    pub output_table: String,
}

impl RunRecord {
    /// New record; `run_id` defaults to a fresh UUID
    pub fn new(
        run_id: Option<String>,
        mode: &str,
        descriptors: &DescriptorMap,
        n_rows: usize,
        output_table: &str,
    ) -> Result<Self> {
        let plan_hash = descriptors
            .fingerprint()
            .context("Failed to fingerprint descriptor plan")?;

        Ok(RunRecord {
            run_id: run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            created_at: Utc::now(),
            mode: mode.to_string(),
            plan_hash,
            n_descriptors: descriptors.len() as i64,
            n_rows: n_rows as i64,
            output_table: output_table.to_string(),
        })
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL keeps readers unblocked while a run writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL,
            mode TEXT NOT NULL,
            plan_hash TEXT NOT NULL,
            n_descriptors INTEGER NOT NULL,
            n_rows INTEGER NOT NULL,
            output_table TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_plan_hash ON runs(plan_hash)",
        [],
    )?;

    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(column: &Column) -> &'static str {
    match column {
        Column::Integer(_) => "INTEGER",
        Column::Float(_) => "REAL",
        Column::Text(_) => "TEXT",
    }
}

fn sql_value(column: &Column, row: usize) -> Value {
    match column {
        Column::Integer(v) => Value::Integer(v[row]),
        Column::Float(v) if v[row].is_nan() => Value::Null,
        Column::Float(v) => Value::Real(v[row]),
        Column::Text(v) => Value::Text(v[row].clone()),
    }
}

// ============================================================================
// WRITE
// ============================================================================

/// Replace `name` with the contents of `table`; returns rows written
pub fn write_table(conn: &mut Connection, name: &str, table: &Table) -> Result<usize> {
    let quoted = quote_ident(name);
    let columns: Vec<(&str, &Column)> = table.columns().collect();

    let definition = columns
        .iter()
        .map(|(n, c)| format!("{} {}", quote_ident(n), sql_type(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let field_list = columns
        .iter()
        .map(|(n, _)| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let tx = conn.transaction()?;

    tx.execute(&format!("DROP TABLE IF EXISTS {}", quoted), [])?;
    tx.execute(&format!("CREATE TABLE {} ({})", quoted, definition), [])
        .with_context(|| format!("Failed to create output table {}", name))?;

    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted, field_list, placeholders
        ))?;

        for row in 0..table.n_rows() {
            let values = columns.iter().map(|(_, c)| sql_value(c, row));
            stmt.execute(params_from_iter(values))
                .with_context(|| format!("Failed to insert row {} into {}", row, name))?;
        }
    }

    tx.commit()?;
    Ok(table.n_rows())
}

pub fn record_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO runs (run_id, created_at, mode, plan_hash, n_descriptors, n_rows, output_table)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run.run_id,
            run.created_at.to_rfc3339(),
            run.mode,
            run.plan_hash,
            run.n_descriptors,
            run.n_rows,
            run.output_table,
        ],
    )
    .with_context(|| format!("Failed to record run {}", run.run_id))?;

    Ok(())
}

pub fn get_runs(conn: &Connection) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, created_at, mode, plan_hash, n_descriptors, n_rows, output_table
         FROM runs ORDER BY id",
    )?;

    let rows = stmt.query_map([], |row| {
        let created_at: String = row.get(1)?;
        Ok((
            row.get::<_, String>(0)?,
            created_at,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut runs = Vec::new();
    for row in rows {
        let (run_id, created_at, mode, plan_hash, n_descriptors, n_rows, output_table) = row?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .with_context(|| format!("Invalid timestamp for run {}", run_id))?
            .with_timezone(&Utc);

        runs.push(RunRecord {
            run_id,
            created_at,
            mode,
            plan_hash,
            n_descriptors,
            n_rows,
            output_table,
        });
    }

    Ok(runs)
}

pub fn count_rows(conn: &Connection, name: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(name)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================
