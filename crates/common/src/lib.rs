//! Common utilities and shared types for weft.
//!
//! This crate provides the foundations used by every other weft crate:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//!
//! # Example
//!
//! ```no_run
//! use weft_common::{AppResult, Config};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Delivering for {}", config.server.url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;

pub use config::{
    CacheConfig, Config, DatabaseConfig, DeliveryConfig, FederationConfig, InboxConfig,
    RedisConfig, ServerConfig,
};
pub use error::{AppError, AppResult};
