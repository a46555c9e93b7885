//! Cloud provider contract
//!
//! The operation set consumed and re-exposed by every cache layer, its
//! value types and errors, plus an in-memory implementation.

pub mod errors;
pub mod memory;
pub mod traits;
pub mod types;

pub use errors::{CloudError, CloudResult};
pub use memory::{InMemoryProvider, Operation};
pub use traits::CloudProvider;
pub use types::*;
