use thiserror::Error;

/// Result type alias for cellbook-core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the cell execution engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error for file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("validation error: {0}")]
    Validation(String),

    /// The model call capability failed (transport, auth, rate limit, ...)
    #[error("model call failed: {0}")]
    CallFailure(String),

    /// A cell position outside the current sequence bounds
    #[error("position {position} out of range for sequence of length {len}")]
    IndexOutOfRange { position: usize, len: usize },

    /// A collaborator expected structured output but the text did not parse
    #[error("malformed structured response: {0}")]
    MalformedStructuredResponse(String),

    /// Another coordinator operation is in flight
    #[error("notebook is busy with another run")]
    Busy,

    /// A cascade stopped at `position`; earlier cells stay committed
    #[error("cascade halted at cell {position}: {source}")]
    CascadeHalted {
        position: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Build an [`Error::IndexOutOfRange`] for `position` against a sequence of `len`.
    pub fn out_of_range(position: usize, len: usize) -> Self {
        Self::IndexOutOfRange { position, len }
    }

    /// Whether this error originated in the model call capability.
    pub fn is_call_failure(&self) -> bool {
        match self {
            Self::CallFailure(_) => true,
            Self::CascadeHalted { source, .. } => source.is_call_failure(),
            _ => false,
        }
    }
}
