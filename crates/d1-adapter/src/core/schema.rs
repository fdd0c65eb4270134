use crate::core::cursor::Connection;
use crate::core::rewrite::quote_name;
use crate::error::DbResult;

/// Migration-scope schema editor. The remote engine cannot roll back
/// partially-applied DDL, so statements marked deferrable are queued and
/// only run, in original order, when the scope closes without error. A
/// scope dropped on the error path discards its queue; DDL already executed
/// earlier in the scope stays applied.
pub struct SchemaEditor<'a> {
    conn: &'a mut Connection,
    deferred: Vec<String>,
    finished: bool,
}

impl<'a> SchemaEditor<'a> {
    pub fn new(conn: &'a mut Connection) -> SchemaEditor<'a> {
        SchemaEditor {
            conn,
            deferred: Vec::new(),
            finished: false,
        }
    }

    /// Run a statement immediately, outside the deferral queue.
    pub fn execute(&mut self, sql: &str) -> DbResult<()> {
        self.conn.cursor().execute(sql, &[])?;
        Ok(())
    }

    /// Queue a statement until the scope closes successfully.
    pub fn collect(&mut self, sql: impl Into<String>) {
        self.deferred.push(sql.into());
    }

    pub fn alter_db_table(&mut self, old_db_table: &str, new_db_table: &str) -> DbResult<()> {
        if old_db_table == new_db_table {
            return Ok(());
        }
        self.execute(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_name(old_db_table),
            quote_name(new_db_table)
        ))
    }

    /// Close the scope successfully: every queued statement runs in the
    /// order it was collected.
    pub fn finish(mut self) -> DbResult<()> {
        self.finished = true;
        let deferred = std::mem::take(&mut self.deferred);
        for sql in deferred {
            self.conn.cursor().execute(&sql, &[])?;
        }
        Ok(())
    }
}

impl Drop for SchemaEditor<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.deferred.is_empty() {
            tracing::debug!(
                discarded = self.deferred.len(),
                "migration scope closed with error; deferred DDL discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::transports::binding::BindingTransport;

    fn memory_conn() -> Connection {
        Connection::over(Box::new(BindingTransport::in_memory().unwrap()))
    }

    fn table_count(conn: &mut Connection) -> i64 {
        let mut cursor = conn.cursor();
        cursor
            .execute(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                &[],
            )
            .unwrap();
        match cursor.fetchone() {
            Some(row) => match row[0] {
                Value::Integer(n) => n,
                _ => panic!("expected integer"),
            },
            None => panic!("expected one row"),
        }
    }

    #[test]
    fn deferred_ddl_runs_in_order_at_finish() {
        let mut conn = memory_conn();
        let mut editor = SchemaEditor::new(&mut conn);
        editor.collect("CREATE TABLE a (id INTEGER)");
        editor.collect("CREATE TABLE b (a_id INTEGER REFERENCES a(id))");
        editor.collect("CREATE INDEX b_a_id ON b (a_id)");
        assert_eq!(editor.deferred.len(), 3);
        editor.finish().unwrap();
        assert_eq!(table_count(&mut conn), 2);
    }

    #[test]
    fn errored_scope_discards_deferred_ddl() {
        let mut conn = memory_conn();
        {
            let mut editor = SchemaEditor::new(&mut conn);
            editor.collect("CREATE TABLE never (id INTEGER)");
            // Scope unwinds without finish(), as it would on a migration error.
        }
        assert_eq!(table_count(&mut conn), 0);
    }

    #[test]
    fn immediate_statements_apply_even_when_scope_errors() {
        let mut conn = memory_conn();
        {
            let mut editor = SchemaEditor::new(&mut conn);
            editor.execute("CREATE TABLE early (id INTEGER)").unwrap();
            editor.collect("CREATE TABLE late (id INTEGER)");
        }
        assert_eq!(table_count(&mut conn), 1);
    }

    #[test]
    fn alter_db_table_renames_via_quoted_identifiers() {
        let mut conn = memory_conn();
        let mut editor = SchemaEditor::new(&mut conn);
        editor.execute("CREATE TABLE old_name (id INTEGER)").unwrap();
        editor.alter_db_table("old_name", "new_name").unwrap();
        editor.alter_db_table("new_name", "new_name").unwrap();
        editor.finish().unwrap();

        let mut cursor = conn.cursor();
        cursor
            .execute(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                &[],
            )
            .unwrap();
        assert_eq!(cursor.fetchone(), Some(vec![Value::Text("new_name".into())]));
    }
}
