//! Adapter layer letting a synchronous ORM cursor contract drive a remote,
//! network-attached SQLite-flavored store reached through asynchronous
//! transports.

pub mod bridge;
pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
pub mod transports;

pub use crate::core::cursor::{Connection, Cursor};
pub use crate::core::features::{Capabilities, CAPABILITIES};
pub use crate::core::result::{QueryMeta, QueryOutcome, RawRows, ResultSet, Row, StatementKind};
pub use crate::core::schema::SchemaEditor;
pub use crate::core::value::Value;
pub use crate::error::{DbError, DbResult, ErrorKind};
pub use crate::transports::{ConnectParams, Transport};
