//! Core types, config, and errors for Delve.

pub mod config;
pub mod error;
pub mod types;
