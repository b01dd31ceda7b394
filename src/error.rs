use thiserror::Error;

/// Failures surfaced by the reading and balance pipeline.
///
/// Fetch and parse problems at the meter boundary never appear here: a day
/// that cannot be read degrades to an empty reading list so that historical
/// scans keep going.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    #[error("invalid range: {0}")]
    Range(&'static str),

    #[error("could not resolve all readings for the requested period")]
    DataUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
