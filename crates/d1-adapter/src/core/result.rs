use std::collections::VecDeque;

use serde::Deserialize;

use crate::core::value::Value;

/// Ordered, fixed-arity row as delivered to the ORM.
pub type Row = Vec<Value>;

/// Execution metadata reported by the remote engine alongside the rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryMeta {
    #[serde(default)]
    pub rows_read: u64,
    #[serde(default)]
    pub rows_written: u64,
    #[serde(default)]
    pub last_row_id: Option<i64>,
}

/// Raw tabular shape returned by a transport. The transactional write path
/// yields object-keyed rows; the raw read path some transports expose yields
/// bare positional rows.
#[derive(Debug, Clone)]
pub enum RawRows {
    Keyed(Vec<serde_json::Map<String, serde_json::Value>>),
    Positional(Vec<Vec<serde_json::Value>>),
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub rows: RawRows,
    pub meta: Option<QueryMeta>,
}

/// Read/write categorization of a statement, used to pick rowcount
/// semantics. Classification reads the first keyword after whitespace and
/// comments rather than substring-scanning the whole text, so keywords
/// inside string literals do not misclassify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
    Read,
}

impl StatementKind {
    pub fn classify(sql: &str) -> StatementKind {
        let keyword = first_keyword(sql);
        match keyword.as_str() {
            "INSERT" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            _ => StatementKind::Read,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, StatementKind::Read)
    }
}

fn first_keyword(sql: &str) -> String {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            match stripped.find('\n') {
                Some(nl) => rest = stripped[nl + 1..].trim_start(),
                None => return String::new(),
            }
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            match stripped.find("*/") {
                Some(end) => rest = stripped[end + 2..].trim_start(),
                None => return String::new(),
            }
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase()
}

/// A consumable sequence of rows plus statement metadata. Each row is
/// delivered exactly once across repeated `fetchone` calls.
#[derive(Debug, Default)]
pub struct ResultSet {
    rows: VecDeque<Row>,
    pub lastrowid: Option<i64>,
    pub rowcount: i64,
}

impl ResultSet {
    /// Convert a transport response into ordered row tuples and derive the
    /// rowcount/lastrowid metadata from the statement classification.
    pub fn materialize(sql: &str, outcome: QueryOutcome) -> ResultSet {
        let kind = StatementKind::classify(sql);
        let rows: VecDeque<Row> = match outcome.rows {
            RawRows::Keyed(rows) => rows
                .into_iter()
                .map(|row| row.values().map(Value::from_json).collect())
                .collect(),
            RawRows::Positional(rows) => rows
                .into_iter()
                .map(|row| row.iter().map(Value::from_json).collect())
                .collect(),
        };

        let mut result = ResultSet {
            rows,
            lastrowid: None,
            rowcount: -1,
        };

        if let Some(meta) = outcome.meta {
            result.rowcount = if kind.is_write() {
                meta.rows_written as i64
            } else {
                meta.rows_read as i64
            };
            if kind == StatementKind::Insert {
                result.lastrowid = meta.last_row_id;
            }
        }

        result
    }

    pub fn fetchone(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    pub fn fetchmany(&mut self, size: usize) -> Vec<Row> {
        let mut out = Vec::with_capacity(size.min(self.rows.len()));
        for _ in 0..size {
            match self.fetchone() {
                Some(row) => out.push(row),
                None => break,
            }
        }
        out
    }

    pub fn fetchall(&mut self) -> Vec<Row> {
        let mut out = Vec::with_capacity(self.rows.len());
        while let Some(row) = self.fetchone() {
            out.push(row);
        }
        out
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(rows: Vec<serde_json::Value>) -> RawRows {
        RawRows::Keyed(
            rows.into_iter()
                .map(|v| match v {
                    serde_json::Value::Object(m) => m,
                    _ => panic!("expected object"),
                })
                .collect(),
        )
    }

    #[test]
    fn update_rowcount_reflects_rows_written() {
        let outcome = QueryOutcome {
            rows: RawRows::Positional(vec![]),
            meta: Some(QueryMeta {
                rows_read: 0,
                rows_written: 3,
                last_row_id: None,
            }),
        };
        let result = ResultSet::materialize("UPDATE t SET x=1", outcome);
        assert_eq!(result.rowcount, 3);
    }

    #[test]
    fn select_rowcount_reflects_rows_read() {
        let outcome = QueryOutcome {
            rows: RawRows::Positional(vec![]),
            meta: Some(QueryMeta {
                rows_read: 7,
                rows_written: 0,
                last_row_id: None,
            }),
        };
        let result = ResultSet::materialize("SELECT * FROM t", outcome);
        assert_eq!(result.rowcount, 7);
    }

    #[test]
    fn lastrowid_set_only_for_inserts() {
        let meta = QueryMeta {
            rows_read: 0,
            rows_written: 1,
            last_row_id: Some(42),
        };
        let insert = ResultSet::materialize(
            "INSERT INTO t VALUES (1)",
            QueryOutcome {
                rows: RawRows::Positional(vec![]),
                meta: Some(meta.clone()),
            },
        );
        assert_eq!(insert.lastrowid, Some(42));

        let update = ResultSet::materialize(
            "UPDATE t SET x=1",
            QueryOutcome {
                rows: RawRows::Positional(vec![]),
                meta: Some(meta),
            },
        );
        assert_eq!(update.lastrowid, None);
    }

    #[test]
    fn keyword_in_string_literal_does_not_misclassify() {
        assert_eq!(
            StatementKind::classify("SELECT * FROM t WHERE name = 'DELETE ME'"),
            StatementKind::Read
        );
        assert_eq!(
            StatementKind::classify("  -- touch-up\n  UPDATE t SET x=1"),
            StatementKind::Update
        );
        assert_eq!(
            StatementKind::classify("/* hint */ INSERT INTO t VALUES (1)"),
            StatementKind::Insert
        );
    }

    #[test]
    fn keyed_rows_materialize_in_column_order() {
        let outcome = QueryOutcome {
            rows: keyed(vec![serde_json::json!({"id": 1, "name": "a", "flag": null})]),
            meta: None,
        };
        let mut result = ResultSet::materialize("SELECT id, name, flag FROM t", outcome);
        assert_eq!(
            result.fetchone(),
            Some(vec![Value::Integer(1), Value::Text("a".into()), Value::Null])
        );
    }

    #[test]
    fn rows_are_delivered_exactly_once() {
        let outcome = QueryOutcome {
            rows: RawRows::Positional(vec![
                vec![serde_json::json!(1)],
                vec![serde_json::json!(2)],
                vec![serde_json::json!(3)],
            ]),
            meta: None,
        };
        let mut result = ResultSet::materialize("SELECT x FROM t", outcome);
        let all = result.fetchall();
        assert_eq!(all.len(), 3);
        assert!(result.fetchall().is_empty());
        assert_eq!(result.fetchone(), None);
    }

    #[test]
    fn fetchmany_respects_the_requested_size() {
        let outcome = QueryOutcome {
            rows: RawRows::Positional(vec![
                vec![serde_json::json!(1)],
                vec![serde_json::json!(2)],
                vec![serde_json::json!(3)],
            ]),
            meta: None,
        };
        let mut result = ResultSet::materialize("SELECT x FROM t", outcome);
        assert_eq!(result.fetchmany(2).len(), 2);
        assert_eq!(result.fetchmany(2).len(), 1);
        assert!(result.fetchmany(2).is_empty());
    }
}
