pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, Provider};
pub use error::PostmillError;
pub use types::*;
