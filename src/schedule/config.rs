//! Schedule configuration

use serde::{Deserialize, Serialize};

/// Configuration for a [`Schedule`](super::Schedule)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Number of timed runs for [`Schedule::run`](super::Schedule::run)
    pub execution_runs: usize,

    /// Ask the backend about every action in `add_optimizations`
    pub check_legality_per_action: bool,

    /// Refuse to execute a program the backend reports as illegal
    pub legality_before_execute: bool,

    /// Log rejected actions at `warn` instead of `info`
    pub log_rejections: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            execution_runs: 1,
            check_legality_per_action: false,
            legality_before_execute: true,
            log_rejections: true,
        }
    }
}

impl ScheduleConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of timed runs
    pub fn execution_runs(mut self, runs: usize) -> Self {
        self.execution_runs = runs;
        self
    }

    /// Enable/disable per-action legality checks in `add_optimizations`
    pub fn check_legality_per_action(mut self, check: bool) -> Self {
        self.check_legality_per_action = check;
        self
    }

    /// Enable/disable the legality check before execution
    pub fn legality_before_execute(mut self, check: bool) -> Self {
        self.legality_before_execute = check;
        self
    }

    /// Enable/disable warnings for rejected actions
    pub fn log_rejections(mut self, log: bool) -> Self {
        self.log_rejections = log;
        self
    }
}
