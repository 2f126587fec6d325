use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LensError {
    #[error("Analyzer transport failed: {0}")]
    Transport(String),

    #[error("Analyzer did not answer within {0} ms")]
    Timeout(u32),

    #[error("Invalid analyzer response: {0}")]
    InvalidResponse(String),

    #[error("Position store error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Page access failed: {0}")]
    Page(String),
}

impl LensError {
    /// Errors the local analyzer can stand in for
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LensError::Transport(_) | LensError::Timeout(_) | LensError::InvalidResponse(_)
        )
    }
}
