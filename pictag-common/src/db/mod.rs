//! Database pool construction and schema creation

pub mod init;

pub use init::*;
