//! Analyses over the iteration tree.

pub mod fusion;

pub use fusion::{fusion_levels, shared_fusion_level, FusionLevel};
