//! Shared configuration and error handling for PharmyDash
//!
//! This crate provides common functionality used across the monitor:
//! - Configuration management following 12-factor principles
//! - Error types and their HTTP mapping

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{Error, Result};
