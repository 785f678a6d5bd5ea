//! Common utilities and types shared across the querysync crates.
//!
//! This module provides the error type and the structured path and scope
//! identifiers that the store and the sync engine agree on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{PathSegment, PropertyPath, ScopeId};
