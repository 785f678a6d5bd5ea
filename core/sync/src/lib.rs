//! querysync Sync Engine
//!
//! This module keeps bound component properties mirrored into the query
//! string, including:
//! - Structured property paths resolved against a JSON property tree
//! - Per-binding aliases, except values, nullability and history mode
//! - Type-aware encoding with explicit declared-type descriptors
//! - A synchronous, non-reentrant recompute cycle per component scope

pub mod binding;
pub mod codec;
pub mod declaration;
pub mod engine;
pub mod path;
pub mod scope;

// Re-export main types
pub use binding::{Binding, BindingOptions, BindingRegistry};
pub use codec::{BackingValue, DeclaredType, EnumBacking, EnumType};
pub use declaration::Declaration;
pub use engine::{EngineConfig, Mutation, MutationBatch, SyncEngine, SyncPhase, SyncReport, UpdateHook};
pub use scope::{ComponentDefinition, ComponentScope};
