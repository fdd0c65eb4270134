use thiserror::Error;

/// Error taxonomy mirroring the DB-API exception hierarchy the ORM expects.
/// Most variants are reserved for the framework's own classification paths;
/// the adapter itself raises `Integrity`, `Database`, `Internal` and
/// `Interface`.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("data error: {0}")]
    Data(String),

    #[error("operational error: {0}")]
    Operational(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("programming error: {0}")]
    Programming(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("interface error: {0}")]
    Interface(String),
}

/// Kind tags for the taxonomy, discoverable by name at runtime. The ORM
/// looks exception classes up dynamically on the connection object; the
/// Rust surface exposes the same closed set through `from_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Operational,
    Integrity,
    Internal,
    Programming,
    NotSupported,
    Database,
    Interface,
    Error,
}

impl ErrorKind {
    pub fn from_name(name: &str) -> Option<ErrorKind> {
        match name {
            "DataError" => Some(ErrorKind::Data),
            "OperationalError" => Some(ErrorKind::Operational),
            "IntegrityError" => Some(ErrorKind::Integrity),
            "InternalError" => Some(ErrorKind::Internal),
            "ProgrammingError" => Some(ErrorKind::Programming),
            "NotSupportedError" => Some(ErrorKind::NotSupported),
            "DatabaseError" => Some(ErrorKind::Database),
            "InterfaceError" => Some(ErrorKind::Interface),
            "Error" => Some(ErrorKind::Error),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Data => "DataError",
            ErrorKind::Operational => "OperationalError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Programming => "ProgrammingError",
            ErrorKind::NotSupported => "NotSupportedError",
            ErrorKind::Database => "DatabaseError",
            ErrorKind::Interface => "InterfaceError",
            ErrorKind::Error => "Error",
        }
    }
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Data(_) => ErrorKind::Data,
            DbError::Operational(_) => ErrorKind::Operational,
            DbError::Integrity(_) => ErrorKind::Integrity,
            DbError::Internal(_) => ErrorKind::Internal,
            DbError::Programming(_) => ErrorKind::Programming,
            DbError::NotSupported(_) => ErrorKind::NotSupported,
            DbError::Database(_) => ErrorKind::Database,
            DbError::Interface(_) => ErrorKind::Interface,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DbError::Data(_) => "DATA_ERROR",
            DbError::Operational(_) => "OPERATIONAL_ERROR",
            DbError::Integrity(_) => "INTEGRITY_ERROR",
            DbError::Internal(_) => "INTERNAL_ERROR",
            DbError::Programming(_) => "PROGRAMMING_ERROR",
            DbError::NotSupported(_) => "NOT_SUPPORTED",
            DbError::Database(_) => "DATABASE_ERROR",
            DbError::Interface(_) => "INTERFACE_ERROR",
        }
    }

    /// Classify a structured failure message from the remote engine.
    /// Uniqueness violations are detected by substring, the way the engine
    /// reports them.
    pub fn classify_remote(message: &str) -> DbError {
        if message.to_lowercase().contains("unique constraint failed") {
            DbError::Integrity(message.to_string())
        } else {
            DbError::Database(message.to_string())
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        // A response that does not parse as structured data at all.
        DbError::Internal(e.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::classify_remote(&e.to_string())
    }
}

impl From<reqwest::Error> for DbError {
    fn from(e: reqwest::Error) -> Self {
        DbError::Internal(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_integrity() {
        let e = DbError::classify_remote("UNIQUE constraint failed: app_user.email");
        assert_eq!(e.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn other_failures_are_database_errors() {
        let e = DbError::classify_remote("no such table: app_user");
        assert_eq!(e.kind(), ErrorKind::Database);
    }

    #[test]
    fn kind_lookup_by_name_covers_the_taxonomy() {
        for name in [
            "DataError",
            "OperationalError",
            "IntegrityError",
            "InternalError",
            "ProgrammingError",
            "NotSupportedError",
            "DatabaseError",
            "InterfaceError",
            "Error",
        ] {
            let kind = ErrorKind::from_name(name).expect(name);
            assert_eq!(kind.name(), name);
        }
        assert!(ErrorKind::from_name("TimeoutError").is_none());
    }
}
