use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from tag API")]
    UnexpectedStatus { status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
