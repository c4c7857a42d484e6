//! # Recipe RAG CLI Library
//!
//! Command implementations and configuration for the `recipe-rag` binary.
//!
//! ## Modules
//!
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration management
//! - [`errors`] - Error display
//! - [`exit_codes`] - Standard exit codes
//! - [`output`] - Terminal rendering of decisions, evidence and answers

pub mod commands;
pub mod config;
pub mod errors;
pub mod exit_codes;
pub mod output;

pub use config::Config;
