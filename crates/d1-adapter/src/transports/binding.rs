use rusqlite::Connection;

use crate::core::result::{QueryMeta, QueryOutcome, RawRows};
use crate::core::rewrite::{self, RewriteOptions};
use crate::core::value::Value;
use crate::error::{DbError, DbResult};
use crate::transports::Transport;

/// In-process durable-storage binding. The host hands the worker a prepared
/// statement surface over its local storage engine; here that surface is a
/// rusqlite handle. Autocommit, no transaction verbs.
pub struct BindingTransport {
    conn: Connection,
    raw_rows: bool,
}

impl BindingTransport {
    pub fn open(path: &str, raw_rows: bool) -> DbResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| DbError::Internal(format!("failed to open binding: {e}")))?;
        Ok(Self { conn, raw_rows })
    }

    pub fn in_memory() -> DbResult<Self> {
        Self::open(":memory:", false)
    }

    fn run_single(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        let mut stmt = self.conn.prepare(sql)?;
        let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut keyed = Vec::new();
        let mut positional = Vec::new();
        let mut rows_read: u64 = 0;

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            rows_read += 1;
            if self.raw_rows {
                let mut tuple = Vec::with_capacity(col_names.len());
                for i in 0..col_names.len() {
                    tuple.push(Value::from_sqlite(row.get_ref(i)?).to_json());
                }
                positional.push(tuple);
            } else {
                let mut object = serde_json::Map::with_capacity(col_names.len());
                for (i, name) in col_names.iter().enumerate() {
                    object.insert(name.clone(), Value::from_sqlite(row.get_ref(i)?).to_json());
                }
                keyed.push(object);
            }
        }
        drop(rows);
        drop(stmt);

        let meta = QueryMeta {
            rows_read,
            rows_written: self.conn.changes(),
            last_row_id: Some(self.conn.last_insert_rowid()),
        };

        let raw = if self.raw_rows {
            RawRows::Positional(positional)
        } else {
            RawRows::Keyed(keyed)
        };
        Ok(QueryOutcome {
            rows: raw,
            meta: Some(meta),
        })
    }
}

impl Transport for BindingTransport {
    fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            inline_nulls: true,
            alias_columns: false,
        }
    }

    fn run_query(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        // Foreign-key deferral arrives as a pragma-bracketed batch, but the
        // local engine binds parameters to one prepared statement at a time.
        // Run the pragmas on their own around the inner statement.
        if let Some(stmt) = rewrite::unwrap_defer_foreign_keys(sql) {
            let stmt = stmt.to_string();
            self.conn.pragma_update(None, "defer_foreign_keys", true)?;
            let result = self.run_single(&stmt, params);
            self.conn.pragma_update(None, "defer_foreign_keys", false)?;
            return result;
        }
        self.run_single(sql, params)
    }
}
