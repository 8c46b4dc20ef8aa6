//! Repodoc Core - shared data structures and trait definitions
//!
//! Error handling, configuration, logging and the collaborator traits used by
//! every stage of the repository analysis pipeline.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod language;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use language::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
