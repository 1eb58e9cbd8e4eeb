//! # pictag common library
//!
//! Shared plumbing for the pictag workspace:
//! - Common error type and `Result` alias
//! - Data folder resolution and layout
//! - Database pool construction and schema creation
//! - Elapsed-time formatting for run summaries

pub mod config;
pub mod db;
pub mod error;
pub mod human_time;

pub use error::{Error, Result};
