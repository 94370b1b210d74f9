//! service-core: Shared infrastructure for the identity workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use serde_json;
pub use sqlx;
pub use tokio;
pub use tracing;
pub use validator;
