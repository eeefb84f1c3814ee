pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod search;
pub mod test_utils;

pub use error::{NormError, Result};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
