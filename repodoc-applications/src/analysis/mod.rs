pub mod errors;
pub mod export;
pub mod manager;
pub mod pipeline;
pub mod storage;

pub use errors::*;
pub use export::*;
pub use manager::*;
pub use pipeline::*;
pub use storage::*;
