//! Utility modules for the loop tree.
//!
//! Currently only the error types shared by every component.

pub mod errors;

// Re-exports
pub use errors::*;
