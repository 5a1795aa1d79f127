//! Unified error type for the monitoring core.
//!
//! `AppError` is returned by every fallible operation that crosses the core's
//! boundary. It serializes as `{ "kind": "...", "message": "..." }` so a UI
//! layer can programmatically distinguish error categories.

use serde::ser::SerializeStruct;

/// Core-level error.
///
/// Each variant maps to a distinct failure domain.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Errors originating from SQLite / database operations.
    #[error("{0}")]
    Database(String),

    /// A state change could not be persisted (e.g. blocklist save).
    #[error("{0}")]
    Persistence(String),

    /// Invalid or missing caller input.
    #[error("{0}")]
    InvalidInput(String),

    /// Byte range outside of a payload.
    #[error("range {start}+{size} out of bounds for payload of {len} bytes")]
    OutOfBounds { start: usize, size: usize, len: usize },

    /// I/O and OS-level errors.
    #[error("{0}")]
    Io(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Persistence(_) => "Persistence",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::OutOfBounds { .. } => "OutOfBounds",
            AppError::Io(_) => "Io",
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

/// Failures raised by SQLite map to `Database`; any other storage failure is
/// a `Persistence` error.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if err.chain().any(|cause| cause.is::<rusqlite::Error>()) {
            AppError::Database(format!("{err:#}"))
        } else {
            AppError::Persistence(format!("{err:#}"))
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}
