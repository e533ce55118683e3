//! Backend implementations of the storage seams
//!
//! - `memory`: in-process store, shared between clones
//! - `test`: wraps `memory` with failure injection and call accounting

pub mod memory;

pub use memory::MemoryStore;
pub use test::{Operation, TestStore};
