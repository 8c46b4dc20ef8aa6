//! Repodoc Repository - remote repository access
//!
//! Code host API clients, fetch filtering and the content fetcher.

pub mod api;
pub mod fetcher;
pub mod filter;

pub use api::*;
pub use fetcher::*;
pub use filter::*;
