use std::fmt::{Display, Formatter};
use std::{error::Error, fmt, io};

/// Errors surfaced by the routing-tables engine.
///
/// Protocol-level problems inside an otherwise valid record (for example a
/// malformed element) are not errors at this level: the element is skipped
/// and counted. Errors here are the ones a driver must react to.
#[derive(Debug)]
pub enum TablesError {
    /// The engine ran out of a resource it cannot recover from (for example
    /// the peer-id space). The engine refuses further records.
    ResourceExhausted(String),
    /// A record referenced a collector or peer in a way that violates the
    /// source contract.
    InvalidRecord(String),
}

impl Error for TablesError {}

impl Display for TablesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let message = match self {
            TablesError::ResourceExhausted(s) => s,
            TablesError::InvalidRecord(s) => s,
        };
        write!(f, "Error: {}", message)
    }
}

/// Failure while handing a view to a sink. Sink failures are surfaced as
/// warnings by the interval driver and never poison the engine.
#[derive(Debug)]
pub struct SinkError {
    pub message: String,
}

impl Error for SinkError {}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sink error: {}", self.message)
    }
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        SinkError {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError {
            message: e.to_string(),
        }
    }
}
