use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("table service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("table not found: {0}")]
    MissingTable(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Transport(#[from] wreq::Error),
}

impl TableError {
    /// Status code of a rejected request, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TableError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
