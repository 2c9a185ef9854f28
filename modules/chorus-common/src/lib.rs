pub mod config;
pub mod error;
pub mod types;

pub use config::{BusyMode, Config, ConfigError};
pub use error::PayloadError;
pub use types::*;
