//! AIOS Core - Types, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::AiosConfig;
pub use error::{Error, Result};
pub use types::*;
