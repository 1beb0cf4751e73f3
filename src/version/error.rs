use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemVerError {
    #[error("invalid semantic version: {0}")]
    InvalidFormat(String),
    #[error("version component overflow: cannot increment {0}")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("invalid identifier format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown increment kind: {0} (expected patch, minor or major)")]
pub struct IncrementKindError(pub String);
