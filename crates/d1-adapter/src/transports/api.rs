use serde::Deserialize;

use crate::bridge::SyncBridge;
use crate::core::result::{QueryMeta, QueryOutcome, RawRows};
use crate::core::rewrite::RewriteOptions;
use crate::core::value::Value;
use crate::error::{DbError, DbResult};
use crate::transports::Transport;

const API_HOST: &str = "https://api.cloudflare.com";
const RETRY_ATTEMPTS: usize = 3;

/// Management-API transport: HTTPS POST per statement, bearer-token auth.
/// The REST client is async; every call goes through the synchronous
/// bridge. Transient (internal) failures are retried a bounded number of
/// times, then one final attempt is returned unsuppressed.
pub struct ApiTransport {
    bridge: SyncBridge,
    client: reqwest::Client,
    account_id: String,
    database_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiErrorMessage>,
    #[serde(default)]
    result: Vec<ApiQueryResult>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiQueryResult {
    success: bool,
    #[serde(default)]
    results: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    meta: Option<QueryMeta>,
}

impl ApiTransport {
    pub fn new(account_id: String, database_id: String, token: String) -> DbResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| DbError::Internal(e.to_string()))?;
        Ok(Self {
            bridge: SyncBridge::new()?,
            client,
            account_id,
            database_id,
            token,
        })
    }

    fn query_url(&self) -> String {
        format!(
            "{API_HOST}/client/v4/accounts/{}/d1/database/{}/query",
            self.account_id, self.database_id
        )
    }

    fn post_once(&self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        let payload = serde_json::json!({
            "sql": sql,
            "params": params.iter().map(Value::to_json).collect::<Vec<_>>(),
        });
        let url = self.query_url();

        let body = self.bridge.run_blocking(async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .json(&payload)
                .send()
                .await?;
            resp.text().await.map_err(DbError::from)
        })?;

        parse_api_response(&body)
    }
}

fn parse_api_response(body: &str) -> DbResult<QueryOutcome> {
    // A body that is not structured data at all is an internal failure,
    // eligible for retry.
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|_| DbError::Internal(body.to_string()))?;

    if !envelope.success {
        let message = envelope
            .errors
            .first()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown remote failure");
        return Err(DbError::classify_remote(message));
    }

    let query_result = envelope
        .result
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Database("empty result envelope".into()))?;
    if !query_result.success {
        return Err(DbError::Database("statement failed remotely".into()));
    }

    Ok(QueryOutcome {
        rows: RawRows::Keyed(query_result.results),
        meta: query_result.meta,
    })
}

/// Retry `f` while it fails with an internal error, up to `attempts` times,
/// then run it one final time and hand the outcome back as-is. Any
/// non-internal error propagates immediately.
pub fn with_retry<T>(attempts: usize, mut f: impl FnMut() -> DbResult<T>) -> DbResult<T> {
    for attempt in 0..attempts {
        match f() {
            Err(DbError::Internal(message)) => {
                tracing::warn!(attempt = attempt + 1, attempts, %message, "internal error, retrying");
            }
            other => return other,
        }
    }
    f()
}

impl Transport for ApiTransport {
    fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            inline_nulls: false,
            alias_columns: false,
        }
    }

    fn run_query(&mut self, sql: &str, params: &[Value]) -> DbResult<QueryOutcome> {
        with_retry(RETRY_ATTEMPTS, || self.post_once(sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn three_internal_failures_then_success_succeeds() {
        let mut calls = 0;
        let out = with_retry(3, || {
            calls += 1;
            if calls <= 3 {
                Err(DbError::Internal("flaky".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(out.unwrap(), 4);
    }

    #[test]
    fn fourth_internal_failure_is_raised() {
        let mut calls = 0;
        let out: DbResult<()> = with_retry(3, || {
            calls += 1;
            Err(DbError::Internal(format!("failure {calls}")))
        });
        assert_eq!(calls, 4);
        assert!(matches!(out, Err(DbError::Internal(m)) if m == "failure 4"));
    }

    #[test]
    fn non_internal_errors_never_retry() {
        let mut calls = 0;
        let out: DbResult<()> = with_retry(3, || {
            calls += 1;
            Err(DbError::Integrity("dup".into()))
        });
        assert_eq!(calls, 1);
        assert_eq!(out.unwrap_err().kind(), ErrorKind::Integrity);
    }

    #[test]
    fn failure_envelope_classifies_by_message() {
        let body = r#"{"success": false, "errors": [{"message": "UNIQUE constraint failed: t.x"}]}"#;
        let err = parse_api_response(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let body = r#"{"success": false, "errors": [{"message": "no such table: t"}]}"#;
        let err = parse_api_response(body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
    }

    #[test]
    fn unparseable_body_is_internal() {
        let err = parse_api_response("<html>502 Bad Gateway</html>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn success_envelope_yields_keyed_rows_and_meta() {
        let body = r#"{
            "success": true,
            "result": [{
                "success": true,
                "results": [{"id": 1, "name": "a"}],
                "meta": {"rows_read": 1, "rows_written": 0, "last_row_id": 0}
            }]
        }"#;
        let outcome = parse_api_response(body).unwrap();
        match outcome.rows {
            RawRows::Keyed(rows) => assert_eq!(rows.len(), 1),
            RawRows::Positional(_) => panic!("expected keyed rows"),
        }
        assert_eq!(outcome.meta.unwrap().rows_read, 1);
    }
}
