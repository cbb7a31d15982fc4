//! Schedules: ordered sequences of accepted actions.
//!
//! A schedule owns the current tree and a compiler backend. Every accepted
//! action replaces the current tree with the action's transformed snapshot
//! and appends its strings to the cumulative program, so later actions are
//! bound against the program as it looks after the earlier ones.
//!
//! # Example
//!
//! ```ignore
//! use looptree::prelude::*;
//!
//! let tree = IterationTree::from_json_file("blur.json")?;
//! let mut schedule = Schedule::new(tree, backend);
//! let params = looptree::parse_params("comp:0,comp:1,comp:2,32,32,32")?;
//! let tiling = Action::new(ActionType::Tiling3D, params, None)?;
//! match schedule.apply_action(tiling)? {
//!     ApplyOutcome::Accepted => println!("{}", schedule),
//!     ApplyOutcome::Rejected { reason } => println!("rejected: {}", reason),
//! }
//! ```

mod backend;
mod config;

pub use backend::{CompilerBackend, Legality};
pub use config::ScheduleConfig;

use crate::ir::IterationTree;
use crate::transform::Action;
use crate::utils::errors::{ActionError, ScheduleError};
use log::{debug, info, warn};
use std::fmt;

/// Result of offering an action to a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The action was legal and is now part of the schedule
    Accepted,
    /// The backend rejected the action; the schedule is unchanged
    Rejected {
        /// Reason reported by the backend
        reason: String,
    },
}

impl ApplyOutcome {
    /// Check if the action was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApplyOutcome::Accepted)
    }
}

/// An ordered sequence of actions applied to one program.
pub struct Schedule<B: CompilerBackend> {
    tree: IterationTree,
    backend: B,
    config: ScheduleConfig,
    actions: Vec<Action>,
    optim_str: String,
    legality_check_string: String,
}

impl<B: CompilerBackend> Schedule<B> {
    /// Start an empty schedule on `tree`.
    pub fn new(tree: IterationTree, backend: B) -> Self {
        Self {
            tree,
            backend,
            config: ScheduleConfig::default(),
            actions: Vec::new(),
            optim_str: String::new(),
            legality_check_string: String::new(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ScheduleConfig) -> Self {
        self.config = config;
        self
    }

    /// The tree after every accepted action.
    pub fn tree(&self) -> &IterationTree {
        &self.tree
    }

    /// Accepted actions, in order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Configuration.
    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Cumulative transformation program.
    pub fn optim_str(&self) -> &str {
        &self.optim_str
    }

    /// Cumulative legality-check program.
    pub fn legality_check_string(&self) -> &str {
        &self.legality_check_string
    }

    /// Bind `actions` one after the other, each against the tree left by the
    /// previous one.
    ///
    /// Either every action is added or none is. With
    /// [`ScheduleConfig::check_legality_per_action`] the backend is asked
    /// about each prefix and an illegal one aborts with
    /// [`ScheduleError::Illegal`].
    pub fn add_optimizations(&mut self, actions: Vec<Action>) -> Result<(), ScheduleError> {
        let mut tree = self.tree.clone();
        let mut optim_str = self.optim_str.clone();
        let mut legality = self.legality_check_string.clone();
        let mut bound = Vec::with_capacity(actions.len());

        for mut action in actions {
            action.initialize_action_for_tree(&tree)?;
            optim_str.push_str(action.optim_str()?);
            legality.push_str(action.legality_check_string()?);

            if self.config.check_legality_per_action {
                if let Legality::Illegal(reason) = self.backend.check_legality(&optim_str, &legality)? {
                    return Err(ScheduleError::Illegal(format!("{}: {}", action, reason)));
                }
            }

            tree = action
                .tree()
                .cloned()
                .ok_or(ActionError::Unbound(action.action_type()))?;
            debug!("queued {}", action);
            bound.push(action);
        }

        info!("added {} optimizations", bound.len());
        self.tree = tree;
        self.optim_str = optim_str;
        self.legality_check_string = legality;
        self.actions.extend(bound);
        Ok(())
    }

    /// Bind `action` to the current tree and keep it if the backend says
    /// the extended program is legal.
    ///
    /// A rejection is not an error: the schedule is left exactly as it was.
    pub fn apply_action(&mut self, mut action: Action) -> Result<ApplyOutcome, ScheduleError> {
        action.initialize_action_for_tree(&self.tree)?;
        let optim_str = format!("{}{}", self.optim_str, action.optim_str()?);
        let legality = format!("{}{}", self.legality_check_string, action.legality_check_string()?);

        match self.backend.check_legality(&optim_str, &legality)? {
            Legality::Legal => {
                info!("accepted {}", action);
                if let Some(tree) = action.tree() {
                    self.tree = tree.clone();
                }
                self.optim_str = optim_str;
                self.legality_check_string = legality;
                self.actions.push(action);
                Ok(ApplyOutcome::Accepted)
            }
            Legality::Illegal(reason) => {
                if self.config.log_rejections {
                    warn!("rejected {}: {}", action, reason);
                } else {
                    info!("rejected {}: {}", action, reason);
                }
                Ok(ApplyOutcome::Rejected { reason })
            }
        }
    }

    /// Ask the backend whether the cumulative program is legal.
    pub fn is_legal(&mut self) -> Result<bool, ScheduleError> {
        let verdict = self
            .backend
            .check_legality(&self.optim_str, &self.legality_check_string)?;
        Ok(verdict.is_legal())
    }

    /// Run the cumulative program `runs` times on the backend.
    pub fn execute(&mut self, runs: usize) -> Result<Vec<f64>, ScheduleError> {
        if self.config.legality_before_execute {
            if let Legality::Illegal(reason) = self
                .backend
                .check_legality(&self.optim_str, &self.legality_check_string)?
            {
                return Err(ScheduleError::Illegal(reason));
            }
        }
        debug!("executing {} ({} runs)", self, runs);
        Ok(self.backend.execute(&self.optim_str, runs)?)
    }

    /// Run the cumulative program the configured number of times.
    pub fn run(&mut self) -> Result<Vec<f64>, ScheduleError> {
        self.execute(self.config.execution_runs)
    }
}

impl<B: CompilerBackend> fmt::Display for Schedule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signatures: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        write!(
            f,
            "S({})={}",
            self.tree.computations_in_order().join(","),
            signatures.join("|")
        )
    }
}

impl<B: CompilerBackend> fmt::Debug for Schedule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("actions", &self.actions.len())
            .field("config", &self.config)
            .field("optim_str", &self.optim_str)
            .finish()
    }
}
