//! Version values and the records that carry them
//!
//! - [`semver`]: parsing, ordering and arithmetic on `MAJOR.MINOR.PATCH[-PRE]`
//! - [`record`]: identifiers, `VersionRecord` and the durable document layout
//! - [`error`]: parse errors

pub mod error;
pub mod record;
pub mod semver;

pub use record::{Identifier, IncrementKind, VersionMap, VersionRecord};
pub use semver::SemVer;
