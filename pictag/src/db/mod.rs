//! Catalog database operations

pub mod images;
pub mod tags;
