//! # looptree - Iteration-Space Trees and Loop Transformation Actions
//!
//! A model of a program's loop nests for schedule search, including:
//! - The iteration-space tree (iterators, computations, execution order)
//! - Candidate sections and per-action candidate enumeration
//! - Transformation actions (tiling, interchange, parallelization, ...)
//! - Fusion-level resolution for re-linearizing computations
//! - Schedules that accumulate legal actions against a compiler backend
//!
//! ## Architecture
//!
//! ```text
//! JSON structure → IterationTree → candidates → Action (bound to a snapshot) → Schedule → backend
//! ```
//!
//! The compiler itself (legality checks, code generation, timing) is behind
//! the [`schedule::CompilerBackend`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use looptree::prelude::*;
//!
//! let tree = TreeBuilder::new()
//!     .iterator("i0", None, 1024)
//!     .iterator("i1", Some("i0"), 1024)
//!     .iterator("i2", Some("i1"), 1024)
//!     .computation("comp", "i2", "")
//!     .build()?;
//!
//! let params = "i0:0,i1:1,i2:2,32,32,32"
//!     .split(',')
//!     .map(str::parse)
//!     .collect::<Result<Vec<ActionParam>, _>>()?;
//! let mut tiling = Action::new(ActionType::Tiling3D, params, None)?;
//! tiling.initialize_action_for_tree(&tree)?;
//! assert_eq!(tiling.optim_str()?, "comp.tile(0, 1, 2, 32, 32, 32);\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ir;
pub mod analysis;
pub mod transform;
pub mod schedule;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::analysis::{fusion_levels, shared_fusion_level, FusionLevel};
    pub use crate::ir::{
        Bound, Computation, IterationTree, IteratorId, IteratorNode, ProgramStructure, Section, TreeBuilder,
    };
    pub use crate::schedule::{ApplyOutcome, CompilerBackend, Legality, Schedule, ScheduleConfig};
    pub use crate::transform::{Action, ActionKind, ActionParam, ActionType, Candidates, Transformation};
    pub use crate::utils::errors::*;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse a comma-separated parameter list such as `comp:0,comp:1,32`.
pub fn parse_params(text: &str) -> Result<Vec<transform::ActionParam>, utils::errors::ActionError> {
    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ActionParam;
    use crate::ir::IteratorId;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params("comp:0, comp:1 ,32").unwrap();
        assert_eq!(
            params,
            vec![
                ActionParam::Iterator(IteratorId::new("comp", 0)),
                ActionParam::Iterator(IteratorId::new("comp", 1)),
                ActionParam::Int(32),
            ]
        );
        assert!(parse_params("comp:0,x").is_err());
    }
}
