pub mod circuit_breaker;
pub mod config;
pub mod error;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CallPermit, CircuitBreaker};
pub use config::AppConfig;
pub use error::{AppError, Result};
