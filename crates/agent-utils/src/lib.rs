//! Shared utilities for the multi-model workspace
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and configuration file helpers.

pub mod config;
pub mod logging;

pub use config::{env_parse, load_json_file};
pub use logging::{LogFormat, init_tracing, try_init_tracing};
