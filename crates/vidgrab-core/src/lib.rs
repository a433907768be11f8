#![deny(missing_docs)]
//! Vidgrab core library.
//!
//! Media download engine, credential resolution, usage ledger and shared
//! configuration for the vidgrab bot.

/// Configuration management.
pub mod config;
/// Shared handler state.
pub mod context;
/// Credential and strategy resolution.
pub mod credentials;
/// Download engine and extraction backends.
pub mod download;
/// Per-user usage statistics.
pub mod ledger;
/// URL validation and platform detection.
pub mod platform;

#[cfg(test)]
pub mod testing;
