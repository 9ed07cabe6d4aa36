//! Data models for the adapter layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionTestResult, DialectKind};
pub use query::{ParameterizedQuery, QueryParam, QueryResult, Row};
pub use schema::{Column, IntrospectionResult, Table, format_reference};
