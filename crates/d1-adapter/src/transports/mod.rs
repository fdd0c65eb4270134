pub mod api;
pub mod binding;
pub mod socket;

use crate::core::result::QueryOutcome;
use crate::core::rewrite::RewriteOptions;
use crate::core::value::Value;
use crate::error::DbResult;

/// One concrete backend satisfying the cursor's query contract. Selected
/// once at connect time from configuration and never switched
/// mid-connection.
pub trait Transport {
    /// Rewriting knobs for this backend (literal-null inlining, column
    /// aliasing).
    fn rewrite_options(&self) -> RewriteOptions;

    /// Submit one statement and return the raw tabular response. Calls are
    /// issued strictly in order; each completes before the next begins.
    fn run_query(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome>;

    /// Transaction verbs. Autocommit backends leave these as no-ops; the
    /// socket transport issues real remote calls.
    fn begin(&mut self) -> DbResult<()> {
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        Ok(())
    }

    /// Release the transport handle. Must be safe to call more than once.
    fn close(&mut self) -> DbResult<()> {
        Ok(())
    }
}

/// Connection destination, one variant per deployment configuration.
#[derive(Debug, Clone)]
pub enum ConnectParams {
    /// Management REST API: account/database/token triple.
    Api {
        account_id: String,
        database_id: String,
        token: String,
    },
    /// In-process durable-storage binding (local SQLite handle).
    Binding {
        path: String,
        /// Use the positional raw-row path instead of keyed rows.
        raw_rows: bool,
    },
    /// Persistent socket RPC endpoint, host:port.
    Socket {
        endpoint: String,
        cache: bool,
        /// Tables eligible for the read cache.
        cache_tables: Vec<String>,
        debug: bool,
    },
}

pub fn open(params: &ConnectParams) -> DbResult<Box<dyn Transport>> {
    match params {
        ConnectParams::Api {
            account_id,
            database_id,
            token,
        } => Ok(Box::new(api::ApiTransport::new(
            account_id.clone(),
            database_id.clone(),
            token.clone(),
        )?)),
        ConnectParams::Binding { path, raw_rows } => {
            Ok(Box::new(binding::BindingTransport::open(path, *raw_rows)?))
        }
        ConnectParams::Socket {
            endpoint,
            cache,
            cache_tables,
            debug,
        } => Ok(Box::new(socket::SocketTransport::connect(
            endpoint,
            *cache,
            cache_tables.clone(),
            *debug,
        )?)),
    }
}
