//! # kiln-common
//!
//! Common configuration, constants and error codes for Kiln.
//!
//! This crate is shared by every Kiln component. It includes:
//!
//! - **Config**: `EngineConfig` and `BuildConfig` (TOML backed)
//! - **Constants**: directory names, type capacities and limits
//! - **Errors**: the stable `ErrorCode` taxonomy
//!
//! ## Example
//!
//! ```rust
//! use kiln_common::config::EngineConfig;
//!
//! let config = EngineConfig::with_data_dir("/tmp/kiln");
//! assert!(config.validate().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;

pub use config::{BuildConfig, ConfigError, EngineConfig};
pub use constants::*;
pub use error::ErrorCode;
