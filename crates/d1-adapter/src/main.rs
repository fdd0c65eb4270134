use std::io::{BufRead, BufReader, BufWriter, Write};

use clap::Parser;

use d1_adapter::cli::Args;
use d1_adapter::error::{DbError, DbResult};
use d1_adapter::transports::ConnectParams;
use d1_adapter::{logging, Connection};

fn main() -> DbResult<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let params = connect_params(&args)?;
    let mut conn = Connection::connect(&params)?;
    conn.defer_foreign_keys(args.defer_foreign_keys);

    let result = match &args.sql {
        Some(sql) => run_statement(&mut conn, sql),
        None => shell(&mut conn),
    };
    conn.close()?;
    result
}

fn connect_params(args: &Args) -> DbResult<ConnectParams> {
    match args.backend.as_str() {
        "api" => {
            let (account_id, database_id, token) = match (
                args.account_id.clone(),
                args.database_id.clone(),
                args.token.clone(),
            ) {
                (Some(a), Some(d), Some(t)) => (a, d, t),
                _ => {
                    return Err(DbError::Interface(
                        "api backend needs --account-id, --database-id and --token".into(),
                    ))
                }
            };
            Ok(ConnectParams::Api {
                account_id,
                database_id,
                token,
            })
        }
        "binding" => Ok(ConnectParams::Binding {
            path: args.db_path.clone(),
            raw_rows: args.raw_rows,
        }),
        "socket" => {
            let endpoint = args
                .endpoint
                .clone()
                .ok_or_else(|| DbError::Interface("socket backend needs --endpoint".into()))?;
            Ok(ConnectParams::Socket {
                endpoint,
                cache: args.cache,
                cache_tables: vec!["django_session".into(), "auth_user".into()],
                debug: args.debug,
            })
        }
        other => Err(DbError::Interface(format!("unknown backend: {other}"))),
    }
}

fn run_statement(conn: &mut Connection, sql: &str) -> DbResult<()> {
    let mut stdout = BufWriter::new(std::io::stdout());
    let mut cursor = conn.cursor();
    cursor.execute(sql, &[])?;
    let rowcount = cursor.rowcount();
    for row in cursor.fetchall() {
        let json: Vec<serde_json::Value> = row.iter().map(|v| v.to_json()).collect();
        serde_json::to_writer(&mut stdout, &json)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    tracing::info!(rowcount, "statement complete");
    Ok(())
}

/// One statement per stdin line, one JSON row per stdout line. Errors are
/// reported and the loop continues, so a bad statement does not end the
/// session.
fn shell(conn: &mut Connection) -> DbResult<()> {
    let stdin = BufReader::new(std::io::stdin());
    for line in stdin.lines() {
        let line = line?;
        let sql = line.trim();
        if sql.is_empty() {
            continue;
        }
        if let Err(e) = run_statement(conn, sql) {
            tracing::error!(code = e.code(), error = %e, "statement failed");
        }
    }
    Ok(())
}
