use crate::core::result::{ResultSet, Row};
use crate::core::rewrite;
use crate::core::value::Value;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::transports::{self, ConnectParams, Transport};

/// DB-API-shaped connection: one transport handle, one cursor's worth of
/// query state. The ORM drives it through `cursor()`, `execute` and the
/// fetch family.
pub struct Connection {
    transport: Option<Box<dyn Transport>>,
    defer_foreign_keys: bool,
    result: Option<ResultSet>,
}

impl Connection {
    pub fn connect(params: &ConnectParams) -> DbResult<Connection> {
        let transport = transports::open(params)?;
        Ok(Connection {
            transport: Some(transport),
            defer_foreign_keys: false,
            result: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn over(transport: Box<dyn Transport>) -> Connection {
        Connection {
            transport: Some(transport),
            defer_foreign_keys: false,
            result: None,
        }
    }

    /// The single cursor. The exclusive borrow makes overlapping `execute`
    /// calls on one connection unrepresentable.
    pub fn cursor(&mut self) -> Cursor<'_> {
        Cursor { conn: self }
    }

    pub fn begin(&mut self) -> DbResult<()> {
        self.transport_mut()?.begin()
    }

    pub fn commit(&mut self) -> DbResult<()> {
        self.transport_mut()?.commit()
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.transport_mut()?.rollback()
    }

    /// Idempotent; the transport handle is released on the first call.
    pub fn close(&mut self) -> DbResult<()> {
        if let Some(mut transport) = self.transport.take() {
            transport.close()?;
        }
        self.result = None;
        Ok(())
    }

    pub fn defer_foreign_keys(&mut self, state: bool) {
        self.defer_foreign_keys = state;
    }

    /// Dynamic error-kind lookup, mirroring the attribute-based discovery
    /// the framework performs on its database object.
    pub fn error_kind(&self, name: &str) -> Option<ErrorKind> {
        ErrorKind::from_name(name)
    }

    fn transport_mut(&mut self) -> DbResult<&mut Box<dyn Transport>> {
        self.transport
            .as_mut()
            .ok_or_else(|| DbError::Interface("connection is closed".into()))
    }
}

pub struct Cursor<'a> {
    conn: &'a mut Connection,
}

impl Cursor<'_> {
    /// Run one statement: normalize params, rewrite the SQL for the
    /// backend, dispatch, materialize. Any previous result is dropped up
    /// front, so a failed call never leaves stale rows fetchable.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<&mut Self> {
        self.conn.result = None;

        let defer = self.conn.defer_foreign_keys;
        let transport = self.conn.transport_mut()?;
        let options = transport.rewrite_options();

        let (mut rewritten, rewritten_params) = rewrite::rewrite(sql, params, options);
        if defer {
            rewritten = rewrite::wrap_defer_foreign_keys(&rewritten);
        }

        tracing::trace!(sql = %rewritten, params = rewritten_params.len(), "execute");
        let outcome = transport.run_query(&rewritten, &rewritten_params)?;

        // Classification reads the caller's SQL, not the rewritten text.
        self.conn.result = Some(ResultSet::materialize(sql, outcome));
        Ok(self)
    }

    /// Convenience for callers holding wire-typed params; booleans are
    /// normalized to 1/0 on the way in.
    pub fn execute_json(&mut self, sql: &str, params: &[serde_json::Value]) -> DbResult<&mut Self> {
        let params = crate::core::value::normalize_bool_params(params);
        self.execute(sql, &params)
    }

    pub fn fetchone(&mut self) -> Option<Row> {
        self.conn.result.as_mut().and_then(ResultSet::fetchone)
    }

    pub fn fetchmany(&mut self, size: usize) -> Vec<Row> {
        self.conn
            .result
            .as_mut()
            .map(|r| r.fetchmany(size))
            .unwrap_or_default()
    }

    pub fn fetchall(&mut self) -> Vec<Row> {
        self.conn
            .result
            .as_mut()
            .map(ResultSet::fetchall)
            .unwrap_or_default()
    }

    pub fn lastrowid(&self) -> Option<i64> {
        self.conn.result.as_ref().and_then(|r| r.lastrowid)
    }

    pub fn rowcount(&self) -> i64 {
        self.conn.result.as_ref().map(|r| r.rowcount).unwrap_or(-1)
    }
}
