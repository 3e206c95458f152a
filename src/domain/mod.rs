//! Domain layer types and invariants.

pub mod content;
pub mod entities;
pub mod error;
pub mod roles;
pub mod slug;
pub mod submissions;
pub mod types;
pub mod validation;
pub mod workflow;
