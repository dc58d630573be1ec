//! Shared types, traits, configuration and chunking for clausewise.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorKind, Result, ServiceError};
