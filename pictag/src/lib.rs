//! pictag library interface
//!
//! Exposes the cataloging pipeline for the CLI binary and for
//! integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod workflow;

pub use crate::error::PipelineError;
