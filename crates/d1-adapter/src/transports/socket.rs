use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::core::result::{QueryMeta, QueryOutcome, RawRows, StatementKind};
use crate::core::rewrite::RewriteOptions;
use crate::core::value::Value;
use crate::error::{DbError, DbResult};
use crate::transports::Transport;

const CACHE_TTL: Duration = Duration::from_secs(300);

/// One request/response exchange over a persistent connection. JSON
/// envelopes carry no raw newlines, so a line is a message.
pub trait RpcChannel {
    fn roundtrip(&mut self, line: &str) -> DbResult<String>;
    fn close(&mut self) -> DbResult<()>;
}

pub struct TcpChannel {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    open: bool,
}

impl TcpChannel {
    pub fn connect(endpoint: &str) -> DbResult<Self> {
        let stream = TcpStream::connect(endpoint).map_err(|e| {
            DbError::Interface(format!("unable to connect to {endpoint}: {e}"))
        })?;
        let write_half = stream
            .try_clone()
            .map_err(|e| DbError::Interface(e.to_string()))?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer: BufWriter::new(write_half),
            open: true,
        })
    }
}

impl RpcChannel for TcpChannel {
    fn roundtrip(&mut self, line: &str) -> DbResult<String> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut response = String::new();
        let n = self.reader.read_line(&mut response)?;
        if n == 0 {
            return Err(DbError::Interface("connection closed by peer".into()));
        }
        Ok(response.trim_end_matches(['\r', '\n']).to_string())
    }

    fn close(&mut self) -> DbResult<()> {
        if self.open {
            let _ = self.reader.get_ref().shutdown(std::net::Shutdown::Both);
            self.open = false;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Option<ResponseResult>,
}

#[derive(Debug, Deserialize)]
struct ResponseResult {
    #[serde(default)]
    results: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    meta: Option<QueryMeta>,
}

struct CacheEntry {
    response: String,
    table: String,
    expires: Instant,
}

/// Side cache for hot read-only lookups (session and user rows). Keys are a
/// hash of the full request envelope; entries expire after a fixed TTL and
/// are evicted when a write touches their table.
#[derive(Default)]
struct QueryCache {
    entries: HashMap<String, CacheEntry>,
}

impl QueryCache {
    fn key(envelope: &str) -> String {
        blake3::hash(envelope.as_bytes()).to_hex().to_string()
    }

    fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&mut self, key: String, table: String, response: String) {
        self.entries.insert(
            key,
            CacheEntry {
                response,
                table,
                expires: Instant::now() + CACHE_TTL,
            },
        );
    }

    fn invalidate_table(&mut self, table: &str) {
        self.entries.retain(|_, entry| entry.table != table);
    }
}

/// Socket RPC transport. Unlike the other backends this one has real
/// begin/commit/rollback, sent as literal SQL through the same channel and
/// serialized with ordinary statements.
pub struct SocketTransport<C: RpcChannel = TcpChannel> {
    channel: C,
    cache: Option<QueryCache>,
    cache_tables: Vec<String>,
    pragma_foreign_keys: Option<bool>,
    debug: bool,
}

impl SocketTransport<TcpChannel> {
    pub fn connect(
        endpoint: &str,
        cache: bool,
        cache_tables: Vec<String>,
        debug: bool,
    ) -> DbResult<Self> {
        Ok(Self::over(TcpChannel::connect(endpoint)?, cache, cache_tables, debug))
    }
}

impl<C: RpcChannel> SocketTransport<C> {
    pub fn over(channel: C, cache: bool, cache_tables: Vec<String>, debug: bool) -> Self {
        Self {
            channel,
            cache: cache.then(QueryCache::default),
            cache_tables,
            pragma_foreign_keys: None,
            debug,
        }
    }

    /// The ORM probes and toggles foreign-key enforcement with pragmas that
    /// the remote engine does not accept standalone; track the state locally
    /// and replay it as a statement prefix.
    fn intercept_pragma(&mut self, sql: &str) -> Option<QueryOutcome> {
        let trimmed = sql.trim();
        let state = match trimmed {
            "PRAGMA foreign_keys = OFF" => {
                self.pragma_foreign_keys = Some(false);
                Vec::new()
            }
            "PRAGMA foreign_keys = ON" => {
                self.pragma_foreign_keys = Some(true);
                Vec::new()
            }
            "PRAGMA foreign_keys" => match self.pragma_foreign_keys {
                Some(true) => vec![vec![serde_json::json!(1)]],
                Some(false) => vec![vec![serde_json::json!(0)]],
                None => Vec::new(),
            },
            _ => return None,
        };
        Some(QueryOutcome {
            rows: RawRows::Positional(state),
            meta: None,
        })
    }

    /// Table from the configured pair that a read against it could be cached
    /// under, or that a write should invalidate.
    fn cache_table_for(&self, sql: &str) -> Option<(String, bool)> {
        let upper = sql.to_uppercase();
        let is_write = StatementKind::classify(sql).is_write();
        for table in &self.cache_tables {
            let table_upper = table.to_uppercase();
            if is_write {
                if upper.contains(&format!("\"{table_upper}\"")) || upper.contains(&table_upper) {
                    return Some((table.clone(), true));
                }
            } else if upper.contains(&format!("FROM \"{table_upper}\"")) {
                return Some((table.clone(), false));
            }
        }
        None
    }

    fn statement(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        if params.is_empty() {
            if let Some(outcome) = self.intercept_pragma(sql) {
                return Ok(outcome);
            }
        }

        let effective_sql = match self.pragma_foreign_keys {
            Some(true) => format!("PRAGMA foreign_keys = ON; {sql}"),
            Some(false) => format!("PRAGMA foreign_keys = OFF; {sql}"),
            None => sql.to_string(),
        };

        let envelope = serde_json::json!({
            "type": "request",
            "request": {
                "type": "execute",
                "stmt": {
                    "arguments": params.iter().map(Value::to_json).collect::<Vec<_>>(),
                    "query": effective_sql,
                }
            }
        })
        .to_string();

        let cache_slot = if self.cache.is_some() {
            self.cache_table_for(sql)
        } else {
            None
        };

        let mut cache_store: Option<(String, String)> = None;
        let response = match &cache_slot {
            Some((table, true)) => {
                // A write against a cached table makes its cached reads
                // stale; evict before the write goes out.
                if let Some(cache) = self.cache.as_mut() {
                    cache.invalidate_table(table);
                }
                None
            }
            Some((table, false)) => {
                let key = QueryCache::key(&envelope);
                let hit = self.cache.as_mut().and_then(|c| c.get(&key));
                if hit.is_none() {
                    cache_store = Some((key, table.clone()));
                }
                hit
            }
            None => None,
        };

        let response = match response {
            Some(cached) => cached,
            None => {
                if self.debug {
                    tracing::debug!(sql = %effective_sql, params = ?params, "socket request");
                }
                self.channel.roundtrip(&envelope)?
            }
        };

        if self.debug {
            tracing::debug!(raw = %response, "socket response");
        }

        let parsed: ResponseEnvelope =
            serde_json::from_str(&response).map_err(|_| DbError::Internal(response.clone()))?;

        if parsed.kind == "response_error" {
            let message = parsed.error.unwrap_or_else(|| "unknown error".into());
            return Err(match DbError::classify_remote(&message) {
                DbError::Database(m) => DbError::Database(format!("{m}\n{effective_sql}")),
                other => other,
            });
        }

        if let Some((key, table)) = cache_store {
            if let Some(cache) = self.cache.as_mut() {
                cache.put(key, table, response);
            }
        }

        let result = parsed.result.unwrap_or(ResponseResult {
            results: Vec::new(),
            meta: None,
        });
        Ok(QueryOutcome {
            rows: RawRows::Positional(result.results),
            meta: result.meta,
        })
    }
}

impl<C: RpcChannel> Transport for SocketTransport<C> {
    fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            inline_nulls: false,
            alias_columns: true,
        }
    }

    fn run_query(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        self.statement(sql, params)
    }

    fn begin(&mut self) -> DbResult<()> {
        self.statement("begin;", &[]).map(|_| ())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.statement("commit;", &[]).map(|_| ())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.statement("rollback;", &[]).map(|_| ())
    }

    fn close(&mut self) -> DbResult<()> {
        self.channel.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted channel: hands out canned responses and records requests.
    struct Script {
        responses: Vec<String>,
        pub sent: Vec<String>,
    }

    impl Script {
        fn new(responses: Vec<&str>) -> Self {
            let mut responses: Vec<String> = responses.into_iter().map(String::from).collect();
            responses.reverse();
            Self {
                responses,
                sent: Vec::new(),
            }
        }
    }

    impl RpcChannel for Script {
        fn roundtrip(&mut self, line: &str) -> DbResult<String> {
            self.sent.push(line.to_string());
            self.responses
                .pop()
                .ok_or_else(|| DbError::Interface("script exhausted".into()))
        }

        fn close(&mut self) -> DbResult<()> {
            Ok(())
        }
    }

    const OK_EMPTY: &str = r#"{"type":"response","result":{"results":[],"meta":{"rows_read":0,"rows_written":0}}}"#;
    const OK_ONE_ROW: &str = r#"{"type":"response","result":{"results":[[1,"alice"]],"meta":{"rows_read":1,"rows_written":0}}}"#;

    fn transport(responses: Vec<&str>, cache: bool) -> SocketTransport<Script> {
        SocketTransport::over(
            Script::new(responses),
            cache,
            vec!["django_session".into(), "auth_user".into()],
            false,
        )
    }

    #[test]
    fn pragma_probe_answers_locally() {
        let mut t = transport(vec![], false);
        let out = t.run_query("PRAGMA foreign_keys = ON", &[]).unwrap();
        assert!(matches!(out.rows, RawRows::Positional(ref r) if r.is_empty()));

        let out = t.run_query("PRAGMA foreign_keys", &[]).unwrap();
        match out.rows {
            RawRows::Positional(rows) => assert_eq!(rows, vec![vec![serde_json::json!(1)]]),
            RawRows::Keyed(_) => panic!("expected positional"),
        }
        assert!(t.channel.sent.is_empty());
    }

    #[test]
    fn pragma_state_prefixes_later_statements() {
        let mut t = transport(vec![OK_EMPTY], false);
        t.run_query("PRAGMA foreign_keys = OFF", &[]).unwrap();
        t.run_query("DELETE FROM t", &[]).unwrap();
        assert!(t.channel.sent[0].contains("PRAGMA foreign_keys = OFF; DELETE FROM t"));
    }

    #[test]
    fn response_error_classifies_by_message() {
        let mut t = transport(
            vec![r#"{"type":"response_error","error":"UNIQUE constraint failed: auth_user.username"}"#],
            false,
        );
        let err = t.run_query("INSERT INTO t VALUES (1)", &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);
    }

    #[test]
    fn repeated_cached_read_hits_once() {
        let mut t = transport(vec![OK_ONE_ROW], true);
        let sql = "SELECT id, username FROM \"auth_user\" WHERE id = 1";
        t.run_query(sql, &[]).unwrap();
        let out = t.run_query(sql, &[]).unwrap();
        assert_eq!(t.channel.sent.len(), 1);
        match out.rows {
            RawRows::Positional(rows) => assert_eq!(rows.len(), 1),
            RawRows::Keyed(_) => panic!("expected positional"),
        }
    }

    #[test]
    fn write_to_cached_table_evicts_its_entries() {
        let mut t = transport(vec![OK_ONE_ROW, OK_EMPTY, OK_ONE_ROW], true);
        let select = "SELECT id, username FROM \"auth_user\" WHERE id = 1";
        t.run_query(select, &[]).unwrap();
        t.run_query("UPDATE \"auth_user\" SET username = 'bob' WHERE id = 1", &[])
            .unwrap();
        t.run_query(select, &[]).unwrap();
        // Select, update, then the select again because the cache was evicted.
        assert_eq!(t.channel.sent.len(), 3);
    }

    #[test]
    fn uncached_tables_bypass_the_cache() {
        let mut t = transport(vec![OK_ONE_ROW, OK_ONE_ROW], true);
        let sql = "SELECT id FROM \"app_order\" WHERE id = 1";
        t.run_query(sql, &[]).unwrap();
        t.run_query(sql, &[]).unwrap();
        assert_eq!(t.channel.sent.len(), 2);
    }

    #[test]
    fn transaction_verbs_travel_over_the_channel() {
        let mut t = transport(vec![OK_EMPTY, OK_EMPTY, OK_EMPTY], false);
        t.begin().unwrap();
        t.commit().unwrap();
        t.rollback().unwrap();
        assert!(t.channel.sent[0].contains("begin;"));
        assert!(t.channel.sent[1].contains("commit;"));
        assert!(t.channel.sent[2].contains("rollback;"));
    }
}
