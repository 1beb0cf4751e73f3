//! Version orchestration
//!
//! ```text
//!  caller ──▶ VersionService ──▶ Resolver ──▶ cache ─▶ durable ─▶ tags ─▶ default
//!                 │                  │
//!                 ▼                  ▼
//!          IncrementLock     PersistencePipeline ──▶ cache (sync)
//!                                    │
//!                                    └──▶ workers ──▶ durable (retry/backoff)
//!                                                        │
//!                                                        ▼
//!                                  HealthMonitor ◀── maintenance tasks
//! ```
//!
//! - [`version_service`]: `VersionService`, the public operations
//! - [`resolver`]: cache → durable → tag discovery → default lookup
//! - [`pipeline`]: synchronous cache write, background durable write
//! - [`health`]: health verdict and write metrics
//! - [`maintenance`]: periodic metrics summary and push retry
//! - [`lock`]: increment serialization
//! - [`error`]: `ServiceError`

pub mod error;
pub mod health;
pub mod lock;
pub mod maintenance;
pub mod pipeline;
pub mod resolver;
pub mod version_service;

pub use error::ServiceError;
pub use health::{HealthStatus, Metrics};
pub use version_service::{HealthReport, ServiceOptions, VersionService};
