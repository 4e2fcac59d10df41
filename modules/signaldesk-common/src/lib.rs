pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RevealConfig};
pub use error::{ConfigError, RecordRejection};
pub use types::*;
