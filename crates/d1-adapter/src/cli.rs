use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "d1-adapter")]
pub struct Args {
    /// Backend transport: "api", "binding" or "socket".
    #[arg(long, default_value = "binding")]
    pub backend: String,

    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Management API: account identifier.
    #[arg(long)]
    pub account_id: Option<String>,

    /// Management API: database identifier.
    #[arg(long)]
    pub database_id: Option<String>,

    /// Management API: bearer token.
    #[arg(long)]
    pub token: Option<String>,

    /// Binding transport: database path (":memory:" for a throwaway db).
    #[arg(long, default_value = ":memory:")]
    pub db_path: String,

    /// Binding transport: return positional raw rows instead of keyed rows.
    #[arg(long)]
    pub raw_rows: bool,

    /// Socket transport: endpoint, host:port.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Socket transport: enable the read cache for session/user lookups.
    #[arg(long)]
    pub cache: bool,

    /// Log outgoing SQL/params and raw responses verbatim.
    #[arg(long)]
    pub debug: bool,

    /// Wrap statements in PRAGMA defer_foreign_keys toggling.
    #[arg(long)]
    pub defer_foreign_keys: bool,

    /// Execute a single statement and exit instead of reading stdin.
    #[arg(long)]
    pub sql: Option<String>,
}
