//! Iteration-space representation of a program.
//!
//! - `node`: iterators and computations
//! - `tree`: the arena that owns them
//! - `sections`: branch-free iterator runs used for candidate enumeration
//! - `structure`: the backend-provided description a tree is built from

pub mod node;
pub mod tree;
pub mod sections;
pub mod structure;

pub use node::{Bound, Computation, IteratorId, IteratorNode};
pub use tree::{IterationTree, TreeBuilder};
pub use sections::Section;
pub use structure::{ComputationSpec, IteratorSpec, ProgramStructure};
