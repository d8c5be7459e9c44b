//! Gateway Configuration Module
//!
//! Provides deployment configuration loaded from TOML files, replacing all
//! hardcoded thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `TACFEED_CONFIG` environment variable (path to TOML file)
//! 2. `tacfeed.toml` in the current working directory
//! 3. Built-in defaults (matching the constants in [`defaults`])
//!
//! Components take their config section explicitly at construction, so there
//! is no global config state to initialize.

mod gateway_config;
pub mod defaults;

pub use gateway_config::*;
