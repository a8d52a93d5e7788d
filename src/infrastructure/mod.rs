//! Infrastructure concerns that sit outside the domain: configuration
//! loading and logging setup.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigLoader};
