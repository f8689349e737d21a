//! Shared foundations for the Relay bridge workspace.
//!
//! This crate bundles the pieces every service needs: configuration
//! loading with environment overrides, the common error type, logging
//! initialization, and text helpers for chat message normalization.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod text;

pub use config::Config;
pub use error::{Error, Result};
