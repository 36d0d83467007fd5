//! # Aural Common Library
//!
//! Shared code for the aural label server and its tooling:
//! - Bootstrap configuration (TOML) and root folder resolution
//! - SQLite pool initialization
//! - Event types and the broadcast EventBus
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
