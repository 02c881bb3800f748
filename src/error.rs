use thiserror::Error;

/// Setup-and-configuration error taxonomy for the stream-observation core.
///
/// Steady-state data-path conditions (`BufferFull`, `IncompleteMessage`,
/// `MalformedFrame`, `MaxEventSizeExceeded`, `Closed`) are *not* represented
/// here — they are ordinary, expected outcomes of a running pipeline, not
/// failures, and are modeled as plain return values
/// ([`crate::ring::WriteOutcome`], [`crate::detect::DetectOutcome`]) instead.
/// `CoreError` covers only configuration/setup failures and internal
/// invariant violations that must never happen in a correct build.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid registration: {0}")]
    Registration(String),

    #[error("internal invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
