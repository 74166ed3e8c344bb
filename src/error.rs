//! Error taxonomy for the ingestion and query paths.

use thiserror::Error;

/// A decoded frame's type code was unrecognized, or its payload was
/// shorter than the declared frame size requires.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: unknown type code {0}")]
    UnknownType(u32),

    #[error("malformed frame: declared size {declared} exceeds available {available} bytes")]
    Truncated { declared: usize, available: usize },
}

/// The embedded SQL engine rejected a bind or step while servicing
/// `add_tripdata` or a canned report.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("failed to bind parameter: {0}")]
    Bind(#[source] rusqlite::Error),

    #[error("failed to step statement: {0}")]
    Step(#[source] rusqlite::Error),
}

/// A REPORT line had the wrong number (or shape) of arguments.
#[derive(Debug, Error)]
#[error("REPORT{report} takes lat1, lat2, long1, long2")]
pub struct ReportArityError {
    pub report: u8,
}
