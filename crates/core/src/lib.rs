//! Ambient pieces shared by the poolkit crates and binaries: environment
//! settings, the application error and tracing setup.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::Settings;
pub use error::AppError;
