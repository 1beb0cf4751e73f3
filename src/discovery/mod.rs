//! Seed lookup for identifiers that have never been versioned
//!
//! - [`tags`]: `TagDiscovery` trait
//! - [`gitlab`]: GitLab repository tags client
//! - [`error`]: `TagError`

pub mod error;
pub mod gitlab;
pub mod tags;

pub use error::TagError;
pub use gitlab::GitLabTags;
pub use tags::TagDiscovery;
