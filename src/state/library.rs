use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Result as SqlResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::data::CatalogRecord;

/// The Catalog wraps one connection to an existing SQLite catalog database.
///
/// Table and column names come from the caller, so every identifier is quoted
/// before it is spliced into SQL. Values always go through bound parameters.
pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Open an existing catalog for reading and writing.
    ///
    /// The file is never created: a wrong path is an error, not an empty catalog.
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        debug!("📁 Catalog opened at: {}", db_path.display());

        Ok(Catalog {
            conn,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Column names of `table`; empty when the table does not exist
    pub fn table_columns(&self, table: &str) -> SqlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names.collect()
    }

    /// All rows of `table` in rowid order
    pub fn list_rows(&self, table: &str, image_column: &str) -> SqlResult<Vec<CatalogRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT rowid, * FROM {} ORDER BY rowid",
            quote_ident(table)
        ))?;

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let records = stmt.query_map([], |row| {
            let row_id: i64 = row.get(0)?;
            let mut image_ref = None;
            let mut columns = BTreeMap::new();

            // Column 0 is the rowid itself
            for (index, name) in names.iter().enumerate().skip(1) {
                let value: Value = row.get(index)?;
                if name == image_column {
                    image_ref = match &value {
                        Value::Text(text) => Some(text.clone()),
                        Value::Integer(number) => Some(number.to_string()),
                        _ => None,
                    };
                }
                columns.insert(name.clone(), to_json(value));
            }

            Ok(CatalogRecord {
                table: table.to_string(),
                row_id,
                image_ref,
                columns,
            })
        })?;

        records.collect()
    }

    /// Insert one row from column/value pairs. Returns the new rowid.
    pub fn insert_row(&self, table: &str, values: &[(String, Value)]) -> SqlResult<i64> {
        let columns = values
            .iter()
            .map(|(column, _)| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                columns,
                placeholders
            ),
            params_from_iter(values.iter().map(|(_, value)| value)),
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Delete rows by rowid in a single statement. Returns the number of rows removed.
    pub fn delete_rows(&self, table: &str, row_ids: &[i64]) -> SqlResult<usize> {
        if row_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; row_ids.len()].join(",");
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE rowid IN ({})",
                quote_ident(table),
                placeholders
            ),
            params_from_iter(row_ids.iter()),
        )
    }
}

/// Quote an SQL identifier, doubling embedded quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(number) => number.into(),
        Value::Real(number) => serde_json::Number::from_f64(number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(text) => text.into(),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()).into(),
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}
