//! Transformation actions over the iteration tree.
//!
//! Every action goes through the same lifecycle:
//!
//! ```text
//! unbound ──initialize_action_for_tree──▶ bound ──(backend)──▶ accepted | rejected
//! ```
//!
//! Construction checks the parameter shape. Binding copies the tree,
//! resolves computation-relative iterator references, derives the target
//! computations when none were given, renders the backend strings from the
//! caller's tree and finally applies the transformation to the copy. The
//! caller's tree is never modified, so rejecting an action is just dropping it.
//!
//! The variants form a closed set ([`ActionKind`]); their shape-specific
//! behaviour lives behind the [`Transformation`] trait.

pub mod tiling;
pub mod tiling_2d;
pub mod tiling_3d;
pub mod interchange;
pub mod parallelization;
pub mod unrolling;
pub mod reversal;
pub mod fusion;

pub use fusion::Fusion;
pub use interchange::Interchange;
pub use parallelization::Parallelization;
pub use reversal::Reversal;
pub use tiling_2d::Tiling2D;
pub use tiling_3d::Tiling3D;
pub use unrolling::Unrolling;

use crate::analysis::{fusion_levels, FusionLevel};
use crate::ir::{IterationTree, IteratorId};
use crate::utils::errors::{ActionError, TreeError};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Candidate parameter choices, grouped by the root iterator they live under.
pub type Candidates<T> = BTreeMap<IteratorId, Vec<T>>;

/// The closed set of action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    /// Tile two perfectly nested loops
    #[serde(rename = "tiling_2d")]
    Tiling2D,
    /// Tile three perfectly nested loops
    #[serde(rename = "tiling_3d")]
    Tiling3D,
    /// Swap two loops of one nest
    #[serde(rename = "interchange")]
    Interchange,
    /// Run a loop in parallel
    #[serde(rename = "parallelization")]
    Parallelization,
    /// Unroll a loop
    #[serde(rename = "unrolling")]
    Unrolling,
    /// Iterate a loop backwards
    #[serde(rename = "reversal")]
    Reversal,
    /// Merge two sibling loops
    #[serde(rename = "fusion")]
    Fusion,
}

impl ActionType {
    /// Every action type.
    pub const ALL: [ActionType; 7] = [
        ActionType::Tiling2D,
        ActionType::Tiling3D,
        ActionType::Interchange,
        ActionType::Parallelization,
        ActionType::Unrolling,
        ActionType::Reversal,
        ActionType::Fusion,
    ];

    /// Lowercase name used in logs and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            ActionType::Tiling2D => "tiling_2d",
            ActionType::Tiling3D => "tiling_3d",
            ActionType::Interchange => "interchange",
            ActionType::Parallelization => "parallelization",
            ActionType::Unrolling => "unrolling",
            ActionType::Reversal => "reversal",
            ActionType::Fusion => "fusion",
        }
    }

    /// Number of loop levels the action inserts above its target computations.
    ///
    /// Fusion levels between two targets are shifted by this amount.
    pub fn introduced_levels(self) -> usize {
        match self {
            ActionType::Tiling2D => Tiling2D::INTRODUCED_LEVELS,
            ActionType::Tiling3D => Tiling3D::INTRODUCED_LEVELS,
            ActionType::Interchange => Interchange::INTRODUCED_LEVELS,
            ActionType::Parallelization => Parallelization::INTRODUCED_LEVELS,
            ActionType::Unrolling => Unrolling::INTRODUCED_LEVELS,
            ActionType::Reversal => Reversal::INTRODUCED_LEVELS,
            ActionType::Fusion => Fusion::INTRODUCED_LEVELS,
        }
    }

    /// Enumerate candidate iterator choices for this action type.
    pub fn get_candidates(self, tree: &IterationTree) -> Candidates<Vec<IteratorId>> {
        let candidates = match self {
            ActionType::Tiling2D => erase(Tiling2D::get_candidates(tree)),
            ActionType::Tiling3D => erase(Tiling3D::get_candidates(tree)),
            ActionType::Interchange => erase(Interchange::get_candidates(tree)),
            ActionType::Parallelization => erase(Parallelization::get_candidates(tree)),
            ActionType::Unrolling => erase(Unrolling::get_candidates(tree)),
            ActionType::Reversal => erase(Reversal::get_candidates(tree)),
            ActionType::Fusion => erase(Fusion::get_candidates(tree)),
        };
        debug!(
            "{}: {} candidates over {} roots",
            self,
            candidates.values().map(Vec::len).sum::<usize>(),
            candidates.len()
        );
        candidates
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ActionType::ALL
            .into_iter()
            .find(|t| t.name() == normalized)
            .ok_or_else(|| ActionError::UnknownActionType(s.to_string()))
    }
}

fn erase<C: CandidateIterators>(candidates: Candidates<C>) -> Candidates<Vec<IteratorId>> {
    candidates
        .into_iter()
        .map(|(root, list)| (root, list.into_iter().map(C::into_iterators).collect()))
        .collect()
}

/// A candidate that can be flattened into its iterators.
pub trait CandidateIterators {
    /// The candidate's iterators, outermost parameter first.
    fn into_iterators(self) -> Vec<IteratorId>;
}

impl CandidateIterators for IteratorId {
    fn into_iterators(self) -> Vec<IteratorId> {
        vec![self]
    }
}

impl<const N: usize> CandidateIterators for [IteratorId; N] {
    fn into_iterators(self) -> Vec<IteratorId> {
        self.into()
    }
}

/// One positional action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionParam {
    /// An iterator, or a `(computation, level)` reference resolved at binding
    Iterator(IteratorId),
    /// An integer such as a tile size or unroll factor
    Int(i64),
}

impl From<IteratorId> for ActionParam {
    fn from(id: IteratorId) -> Self {
        ActionParam::Iterator(id)
    }
}

impl From<(&str, usize)> for ActionParam {
    fn from(id: (&str, usize)) -> Self {
        ActionParam::Iterator(id.into())
    }
}

impl From<i64> for ActionParam {
    fn from(v: i64) -> Self {
        ActionParam::Int(v)
    }
}

impl fmt::Display for ActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionParam::Iterator(id) => write!(f, "{}:{}", id.name, id.level),
            ActionParam::Int(v) => write!(f, "{}", v),
        }
    }
}

impl FromStr for ActionParam {
    type Err = ActionError;

    /// Parse `name:level` or an integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unparsable = || ActionError::UnparsableParameter(s.to_string());
        match s.rsplit_once(':') {
            Some((name, level)) if !name.is_empty() => {
                let level = level.trim().parse().map_err(|_| unparsable())?;
                Ok(ActionParam::Iterator(IteratorId::new(name.trim(), level)))
            }
            Some(_) => Err(unparsable()),
            None => s.parse().map(ActionParam::Int).map_err(|_| unparsable()),
        }
    }
}

/// Shape-specific behaviour of one action variant.
pub trait Transformation: fmt::Debug + Clone + Into<ActionKind> {
    /// Tag of this variant.
    const ACTION_TYPE: ActionType;
    /// Loop levels inserted above the target computations.
    const INTRODUCED_LEVELS: usize;
    /// One enumerated parameter choice.
    type Candidate: CandidateIterators;

    /// Build from positional parameters, checking arity and types.
    fn from_params(params: &[ActionParam]) -> Result<Self, ActionError>;

    /// Positional parameters equivalent to this action.
    fn params(&self) -> Vec<ActionParam>;

    /// Iterator parameters, in parameter order.
    fn iterators(&self) -> &[IteratorId];

    /// Iterator parameters, for resolution at binding.
    fn iterators_mut(&mut self) -> &mut [IteratorId];

    /// Check the resolved iterators against the tree.
    fn check_iterators(&self, _tree: &IterationTree) -> Result<(), ActionError> {
        Ok(())
    }

    /// Computations targeted when the caller gives none: everything under the
    /// outermost iterator parameter, in absolute order.
    fn target_computations(&self, tree: &IterationTree) -> Result<Vec<String>, ActionError> {
        let outermost = outermost_iterator(self.iterators()).ok_or_else(|| ActionError::InvalidParameterShape {
            action: Self::ACTION_TYPE,
            message: "no iterator parameters".to_string(),
        })?;
        let mut comps = tree.get_iterator_subtree_computations(outermost)?;
        tree.sort_by_absolute_order(&mut comps);
        Ok(comps)
    }

    /// Backend statement for one target computation, without the trailing `;`.
    fn statement(&self, comp: &str) -> Option<String>;

    /// Compact signature for logs and deduplication.
    fn signature(&self, comps: &[String]) -> String;

    /// Override fusion levels the generic resolver got wrong for this action.
    fn adjust_fusion_levels(
        &self,
        _tree: &IterationTree,
        _ordered: &[String],
        _levels: &mut [FusionLevel],
    ) -> Result<(), TreeError> {
        Ok(())
    }

    /// Apply the structural change to a snapshot.
    fn apply(&self, tree: &mut IterationTree) -> Result<(), TreeError>;

    /// Enumerate candidates from the tree's sections.
    fn get_candidates(tree: &IterationTree) -> Candidates<Self::Candidate>;
}

/// The outermost iterator; the first one wins on equal levels.
pub fn outermost_iterator(iterators: &[IteratorId]) -> Option<&IteratorId> {
    iterators.iter().min_by_key(|id| id.level)
}

/// Format computation names as `['a', 'b']`.
pub(crate) fn format_comps(comps: &[String]) -> String {
    let quoted: Vec<String> = comps.iter().map(|c| format!("'{}'", c)).collect();
    format!("[{}]", quoted.join(", "))
}

pub(crate) fn expect_arity(action: ActionType, params: &[ActionParam], arity: usize) -> Result<(), ActionError> {
    if params.len() != arity {
        return Err(ActionError::InvalidParameterShape {
            action,
            message: format!("expected {} parameters, got {}", arity, params.len()),
        });
    }
    Ok(())
}

pub(crate) fn iterator_param(action: ActionType, params: &[ActionParam], idx: usize) -> Result<IteratorId, ActionError> {
    match params.get(idx) {
        Some(ActionParam::Iterator(id)) => Ok(id.clone()),
        other => Err(ActionError::InvalidParameterShape {
            action,
            message: format!("parameter {} must be an iterator, got {:?}", idx, other),
        }),
    }
}

pub(crate) fn positive_param(action: ActionType, params: &[ActionParam], idx: usize) -> Result<u32, ActionError> {
    match params.get(idx) {
        Some(ActionParam::Int(v)) if *v > 0 && *v <= i64::from(u32::MAX) => Ok(*v as u32),
        other => Err(ActionError::InvalidParameterShape {
            action,
            message: format!("parameter {} must be a positive integer, got {:?}", idx, other),
        }),
    }
}

/// A variant together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// 2D tiling
    Tiling2D(Tiling2D),
    /// 3D tiling
    Tiling3D(Tiling3D),
    /// Interchange
    Interchange(Interchange),
    /// Parallelization
    Parallelization(Parallelization),
    /// Unrolling
    Unrolling(Unrolling),
    /// Reversal
    Reversal(Reversal),
    /// Fusion
    Fusion(Fusion),
}

macro_rules! dispatch {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            ActionKind::Tiling2D($t) => $body,
            ActionKind::Tiling3D($t) => $body,
            ActionKind::Interchange($t) => $body,
            ActionKind::Parallelization($t) => $body,
            ActionKind::Unrolling($t) => $body,
            ActionKind::Reversal($t) => $body,
            ActionKind::Fusion($t) => $body,
        }
    };
}

macro_rules! impl_variant_conversions {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for ActionKind {
                fn from(t: $variant) -> Self {
                    ActionKind::$variant(t)
                }
            }

            impl From<$variant> for Action {
                fn from(t: $variant) -> Self {
                    Action::from_kind(t.into())
                }
            }
        )*
    };
}

impl_variant_conversions!(Tiling2D, Tiling3D, Interchange, Parallelization, Unrolling, Reversal, Fusion);

impl ActionKind {
    /// Tag of the variant.
    pub fn action_type(&self) -> ActionType {
        fn tag<T: Transformation>(_: &T) -> ActionType {
            T::ACTION_TYPE
        }
        dispatch!(self, t => tag(t))
    }

    /// Iterator parameters.
    pub fn iterators(&self) -> &[IteratorId] {
        dispatch!(self, t => t.iterators())
    }

    fn iterators_mut(&mut self) -> &mut [IteratorId] {
        dispatch!(self, t => t.iterators_mut())
    }

    /// Positional parameters.
    pub fn params(&self) -> Vec<ActionParam> {
        dispatch!(self, t => t.params())
    }
}

/// Strings generated for a bound action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representations {
    /// Transformation program for the backend
    pub optim_str: String,
    /// Compact signature
    pub signature: String,
    /// Program submitted to the legality check
    pub legality_check_string: String,
}

#[derive(Debug, Clone)]
struct Binding {
    tree: IterationTree,
    comps: Vec<String>,
    representations: Representations,
}

/// A transformation action, unbound or bound to a tree snapshot.
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    comps: Option<Vec<String>>,
    binding: Option<Binding>,
}

impl Action {
    /// Build an action from positional parameters.
    ///
    /// `comps` restricts the action to explicit computations; when `None` the
    /// targets are derived at binding.
    pub fn new(
        action_type: ActionType,
        params: Vec<ActionParam>,
        comps: Option<Vec<String>>,
    ) -> Result<Self, ActionError> {
        let kind: ActionKind = match action_type {
            ActionType::Tiling2D => Tiling2D::from_params(&params)?.into(),
            ActionType::Tiling3D => Tiling3D::from_params(&params)?.into(),
            ActionType::Interchange => Interchange::from_params(&params)?.into(),
            ActionType::Parallelization => Parallelization::from_params(&params)?.into(),
            ActionType::Unrolling => Unrolling::from_params(&params)?.into(),
            ActionType::Reversal => Reversal::from_params(&params)?.into(),
            ActionType::Fusion => Fusion::from_params(&params)?.into(),
        };
        check_explicit_comps(action_type, comps.as_deref())?;
        Ok(Self { kind, comps, binding: None })
    }

    fn from_kind(kind: ActionKind) -> Self {
        Self { kind, comps: None, binding: None }
    }

    /// Restrict the action to explicit computations.
    pub fn with_comps(mut self, comps: Vec<String>) -> Self {
        self.comps = Some(comps);
        self
    }

    /// Tag of the action.
    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }

    /// Variant and parameters.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Positional parameters, resolved once the action is bound.
    pub fn params(&self) -> Vec<ActionParam> {
        self.kind.params()
    }

    /// Iterator parameters, resolved once the action is bound.
    pub fn iterators(&self) -> &[IteratorId] {
        self.kind.iterators()
    }

    /// Target computations: the bound list, or the explicit one before binding.
    pub fn comps(&self) -> Option<&[String]> {
        match &self.binding {
            Some(binding) => Some(&binding.comps),
            None => self.comps.as_deref(),
        }
    }

    /// Check if the action has been bound to a tree.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// The transformed snapshot, once bound.
    pub fn tree(&self) -> Option<&IterationTree> {
        self.binding.as_ref().map(|b| &b.tree)
    }

    /// Take the transformed snapshot, once bound.
    pub fn into_tree(self) -> Option<IterationTree> {
        self.binding.map(|b| b.tree)
    }

    /// Bind the action to a copy of `tree`.
    ///
    /// On error the action is left exactly as it was.
    pub fn initialize_action_for_tree(&mut self, tree: &IterationTree) -> Result<(), ActionError> {
        let action_type = self.action_type();
        let mut snapshot = tree.snapshot();
        let mut kind = self.kind.clone();

        for iterator in kind.iterators_mut() {
            if !snapshot.contains_iterator(iterator) {
                let resolved = snapshot.resolve_iterator(iterator)?;
                trace!("{}: resolved {} to {}", action_type, iterator, resolved);
                *iterator = resolved;
            }
        }
        dispatch!(&kind, t => t.check_iterators(&snapshot))?;

        let comps = match &self.comps {
            Some(comps) => {
                check_explicit_comps(action_type, Some(comps.as_slice()))?;
                for comp in comps {
                    if snapshot.computation(comp).is_none() {
                        return Err(TreeError::ComputationNotFound(comp.clone()).into());
                    }
                }
                comps.clone()
            }
            None => dispatch!(&kind, t => t.target_computations(&snapshot))?,
        };

        let representations = render(&kind, &comps, tree)?;

        dispatch!(&kind, t => t.apply(&mut snapshot))
            .and_then(|()| {
                snapshot.recompute_absolute_order();
                snapshot.validate()
            })
            .map_err(|source| ActionError::InvalidResult { action: action_type, source })?;

        debug!("bound {}", representations.signature);
        self.kind = kind;
        self.binding = Some(Binding { tree: snapshot, comps, representations });
        Ok(())
    }

    /// Regenerate the backend strings against `tree`.
    pub fn set_string_representations(&mut self, tree: &IterationTree) -> Result<(), ActionError> {
        let binding = self
            .binding
            .as_mut()
            .ok_or(ActionError::Unbound(self.kind.action_type()))?;
        binding.representations = render(&self.kind, &binding.comps, tree)?;
        Ok(())
    }

    /// All generated strings.
    pub fn representations(&self) -> Result<&Representations, ActionError> {
        self.binding
            .as_ref()
            .map(|b| &b.representations)
            .ok_or(ActionError::Unbound(self.action_type()))
    }

    /// Transformation program for the backend.
    pub fn optim_str(&self) -> Result<&str, ActionError> {
        Ok(&self.representations()?.optim_str)
    }

    /// Compact signature.
    pub fn signature(&self) -> Result<&str, ActionError> {
        Ok(&self.representations()?.signature)
    }

    /// Program submitted to the legality check.
    pub fn legality_check_string(&self) -> Result<&str, ActionError> {
        Ok(&self.representations()?.legality_check_string)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(signature) = self.signature() {
            return f.write_str(signature);
        }
        let params: Vec<String> = self.params().iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.action_type(), params.join(","))
    }
}

fn check_explicit_comps(action: ActionType, comps: Option<&[String]>) -> Result<(), ActionError> {
    match comps {
        Some([]) => Err(ActionError::InvalidParameterShape {
            action,
            message: "explicit computation list is empty".to_string(),
        }),
        _ => Ok(()),
    }
}

fn render(kind: &ActionKind, comps: &[String], tree: &IterationTree) -> Result<Representations, ActionError> {
    let mut optim_str = String::new();
    for comp in comps {
        if let Some(statement) = dispatch!(kind, t => t.statement(comp)) {
            optim_str.push_str(&statement);
            optim_str.push_str(";\n");
        }
    }

    let ordered = tree.computations_in_order();
    if ordered.len() > 1 {
        let mut levels = fusion_levels(tree, &ordered, comps, kind.action_type().introduced_levels())?;
        dispatch!(kind, t => t.adjust_fusion_levels(tree, &ordered, &mut levels))?;
        optim_str.push_str(&relinearization(&ordered, &levels));
    }

    let signature = dispatch!(kind, t => t.signature(comps));
    Ok(Representations {
        legality_check_string: optim_str.clone(),
        optim_str,
        signature,
    })
}

/// Statement that rebuilds the execution order: every computation runs after
/// its predecessor, sharing loops up to the given fusion level.
pub fn relinearization(ordered: &[String], levels: &[FusionLevel]) -> String {
    let Some((first, rest)) = ordered.split_first() else {
        return String::new();
    };
    let chain: String = rest
        .iter()
        .zip(levels)
        .map(|(comp, level)| format!(".then({},{})", comp, level))
        .collect();
    format!("clear_implicit_function_sched_graph();\n    {}{};\n", first, chain)
}
