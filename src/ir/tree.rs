//! The iteration-space tree.
//!
//! The tree is an arena of [`IteratorNode`]s keyed by name. Links between
//! nodes are names, so cloning the tree yields a fully independent snapshot:
//! actions mutate their own clone and the caller's tree is never touched.

use super::node::{Bound, Computation, IteratorId, IteratorNode};
use crate::utils::errors::TreeError;
use std::collections::{HashMap, HashSet};

/// Loop-nest structure of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationTree {
    /// Iterators by name
    iterators: HashMap<String, IteratorNode>,
    /// Root iterators in program order
    roots: Vec<String>,
    /// Computations by name
    computations: HashMap<String, Computation>,
    /// Rank of each computation in execution order
    computations_absolute_order: HashMap<String, usize>,
    /// Innermost iterator of each computation
    computation_iterators: HashMap<String, String>,
}

impl IterationTree {
    /// Assemble a tree from parts and check its invariants.
    pub(crate) fn from_parts(
        iterators: HashMap<String, IteratorNode>,
        roots: Vec<String>,
        computations: HashMap<String, Computation>,
        computations_absolute_order: HashMap<String, usize>,
        computation_iterators: HashMap<String, String>,
    ) -> Result<Self, TreeError> {
        let tree = Self {
            iterators,
            roots,
            computations,
            computations_absolute_order,
            computation_iterators,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Take an independent copy to mutate.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Number of iterators.
    pub fn iterator_count(&self) -> usize {
        self.iterators.len()
    }

    /// Number of computations.
    pub fn computation_count(&self) -> usize {
        self.computations.len()
    }

    /// Look up an iterator by identifier. Both name and level must match.
    pub fn iterator(&self, id: &IteratorId) -> Option<&IteratorNode> {
        self.iterators.get(&id.name).filter(|node| node.level == id.level)
    }

    /// Look up an iterator by name.
    pub fn iterator_by_name(&self, name: &str) -> Option<&IteratorNode> {
        self.iterators.get(name)
    }

    /// Check if the identifier names an iterator of this tree.
    pub fn contains_iterator(&self, id: &IteratorId) -> bool {
        self.iterator(id).is_some()
    }

    /// All iterators, in no particular order.
    pub fn iterators(&self) -> impl Iterator<Item = &IteratorNode> {
        self.iterators.values()
    }

    /// Root iterators in program order.
    pub fn roots(&self) -> impl Iterator<Item = &IteratorNode> {
        self.roots.iter().map(move |name| self.node(name))
    }

    /// Look up a computation.
    pub fn computation(&self, name: &str) -> Option<&Computation> {
        self.computations.get(name)
    }

    /// Rank of a computation in the absolute execution order.
    pub fn absolute_order(&self, comp: &str) -> Option<usize> {
        self.computations_absolute_order.get(comp).copied()
    }

    /// All computation names sorted by absolute order.
    pub fn computations_in_order(&self) -> Vec<String> {
        let mut comps: Vec<String> = self.computations.keys().cloned().collect();
        self.sort_by_absolute_order(&mut comps);
        comps
    }

    /// Sort computation names by absolute order.
    pub fn sort_by_absolute_order(&self, comps: &mut [String]) {
        comps.sort_by_key(|c| self.absolute_order(c).unwrap_or(usize::MAX));
    }

    /// Resolve a computation to an iterator of its loop nest.
    ///
    /// With `level = None` this is the innermost iterator. With a level, the
    /// enclosing iterator at that depth.
    pub fn get_iterator_of_computation(
        &self,
        comp: &str,
        level: Option<usize>,
    ) -> Result<&IteratorNode, TreeError> {
        let name = self
            .computation_iterators
            .get(comp)
            .ok_or_else(|| TreeError::ComputationNotFound(comp.to_string()))?;
        let mut node = self
            .iterators
            .get(name)
            .ok_or_else(|| TreeError::IteratorNotFound(name.clone()))?;

        let Some(level) = level else {
            return Ok(node);
        };
        let not_found = || TreeError::LevelNotFound {
            computation: comp.to_string(),
            level,
        };
        if level > node.level {
            return Err(not_found());
        }
        while node.level > level {
            let parent = node.parent.as_ref().ok_or_else(not_found)?;
            node = self
                .iterators
                .get(parent)
                .ok_or_else(|| TreeError::IteratorNotFound(parent.clone()))?;
        }
        Ok(node)
    }

    /// Iterators a computation executes under, outermost first.
    pub fn computation_chain(&self, comp: &str) -> Result<Vec<&IteratorNode>, TreeError> {
        let mut current = self.get_iterator_of_computation(comp, None)?;
        let mut chain = vec![current];
        while let Some(parent) = current.parent.as_ref() {
            current = self.node(parent);
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Resolve an identifier that may name a computation instead of an iterator.
    pub fn resolve_iterator(&self, id: &IteratorId) -> Result<IteratorId, TreeError> {
        if self.contains_iterator(id) {
            return Ok(id.clone());
        }
        Ok(self.get_iterator_of_computation(&id.name, Some(id.level))?.id())
    }

    /// Computations nested anywhere under an iterator, in absolute order.
    pub fn get_iterator_subtree_computations(&self, id: &IteratorId) -> Result<Vec<String>, TreeError> {
        if !self.contains_iterator(id) {
            return Err(TreeError::IteratorNotFound(id.to_string()));
        }
        let mut comps = Vec::new();
        let mut stack = vec![id.name.as_str()];
        while let Some(name) = stack.pop() {
            let node = self.node(name);
            comps.extend(node.computations.iter().cloned());
            stack.extend(node.child_iterators.iter().map(String::as_str));
        }
        self.sort_by_absolute_order(&mut comps);
        Ok(comps)
    }

    /// Check if `ancestor` encloses `descendant` (strictly).
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut current = self.iterators.get(descendant).and_then(|n| n.parent.as_deref());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.iterators.get(name).and_then(|n| n.parent.as_deref());
        }
        false
    }

    /// Get a node known to exist.
    ///
    /// Panics if the name is dangling, which the tree invariants rule out.
    pub(crate) fn node(&self, name: &str) -> &IteratorNode {
        &self.iterators[name]
    }

    pub(crate) fn node_mut(&mut self, name: &str) -> Result<&mut IteratorNode, TreeError> {
        self.iterators
            .get_mut(name)
            .ok_or_else(|| TreeError::IteratorNotFound(name.to_string()))
    }

    /// A name derived from `base` that no iterator uses yet.
    pub(crate) fn fresh_iterator_name(&self, base: &str) -> String {
        if !self.iterators.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.iterators.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add a node to the arena. Links are the caller's responsibility.
    pub(crate) fn insert_node(&mut self, node: IteratorNode) {
        self.iterators.insert(node.name.clone(), node);
    }

    /// Remove a node from the arena and from its parent's (or the root) list.
    pub(crate) fn remove_node(&mut self, name: &str) -> Result<IteratorNode, TreeError> {
        let node = self
            .iterators
            .remove(name)
            .ok_or_else(|| TreeError::IteratorNotFound(name.to_string()))?;
        match node.parent.as_deref() {
            Some(parent) => self.node_mut(parent)?.child_iterators.retain(|c| c != name),
            None => self.roots.retain(|r| r != name),
        }
        Ok(node)
    }

    /// Replace `old` by `new` in the list that holds `old` (parent's children or roots).
    pub(crate) fn replace_in_parent(&mut self, old: &str, new: &str, parent: Option<&str>) -> Result<(), TreeError> {
        let list = match parent {
            Some(p) => &mut self.node_mut(p)?.child_iterators,
            None => &mut self.roots,
        };
        let slot = list
            .iter_mut()
            .find(|n| n.as_str() == old)
            .ok_or_else(|| TreeError::Malformed(format!("`{}` is not listed under its parent", old)))?;
        *slot = new.to_string();
        Ok(())
    }

    /// Point computations at a new innermost iterator.
    pub(crate) fn move_computations(&mut self, comps: &[String], to: &str) -> Result<(), TreeError> {
        for comp in comps {
            self.computation_iterators.insert(comp.clone(), to.to_string());
        }
        self.node_mut(to)?.computations.extend(comps.iter().cloned());
        Ok(())
    }

    /// Add `delta` to the level of an iterator and everything under it.
    pub(crate) fn shift_subtree_levels(&mut self, name: &str, delta: usize) -> Result<(), TreeError> {
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            let node = self.node_mut(&current)?;
            node.level += delta;
            stack.extend(node.child_iterators.iter().cloned());
        }
        Ok(())
    }

    /// Rename iterators everywhere they are referenced.
    ///
    /// `renames` maps old names to new names; it may swap two names.
    pub(crate) fn rename_iterators(&mut self, renames: &HashMap<String, String>) {
        let rename = |name: &mut String| {
            if let Some(new) = renames.get(name.as_str()) {
                *name = new.clone();
            }
        };
        let nodes: Vec<IteratorNode> = self.iterators.drain().map(|(_, node)| node).collect();
        for mut node in nodes {
            rename(&mut node.name);
            if let Some(parent) = node.parent.as_mut() {
                rename(parent);
            }
            node.child_iterators.iter_mut().for_each(rename);
            self.iterators.insert(node.name.clone(), node);
        }
        self.roots.iter_mut().for_each(rename);
        self.computation_iterators.values_mut().for_each(rename);
    }

    /// Recompute the absolute order after a structural change.
    ///
    /// The walk is depth-first. Inside one iterator, computations and nested
    /// iterators are interleaved by the previous rank of their first computation.
    pub(crate) fn recompute_absolute_order(&mut self) {
        let mut first_rank = HashMap::new();
        for root in &self.roots {
            self.first_rank(root, &mut first_rank);
        }

        let mut roots = self.roots.clone();
        roots.sort_by_key(|r| first_rank.get(r).copied().unwrap_or(usize::MAX));

        let mut order = Vec::with_capacity(self.computations.len());
        for root in &roots {
            self.collect_in_order(root, &first_rank, &mut order);
        }

        self.computations_absolute_order = order
            .into_iter()
            .enumerate()
            .map(|(rank, comp)| (comp, rank))
            .collect();

        let ranks = self.computations_absolute_order.clone();
        for node in self.iterators.values_mut() {
            node.computations.sort_by_key(|c| ranks.get(c).copied().unwrap_or(usize::MAX));
        }
    }

    fn first_rank(&self, name: &str, memo: &mut HashMap<String, usize>) -> usize {
        let node = self.node(name);
        let own = node.computations.iter().filter_map(|c| self.absolute_order(c)).min();
        let nested = node
            .child_iterators
            .iter()
            .map(|child| self.first_rank(child, memo))
            .min();
        let rank = own.into_iter().chain(nested).min().unwrap_or(usize::MAX);
        memo.insert(name.to_string(), rank);
        rank
    }

    fn collect_in_order(&self, name: &str, first_rank: &HashMap<String, usize>, order: &mut Vec<String>) {
        enum Item<'a> {
            Comp(&'a str),
            Child(&'a str),
        }
        let node = self.node(name);
        let mut items: Vec<(usize, Item<'_>)> = node
            .computations
            .iter()
            .map(|c| (self.absolute_order(c).unwrap_or(usize::MAX), Item::Comp(c)))
            .chain(node.child_iterators.iter().map(|c| {
                (first_rank.get(c).copied().unwrap_or(usize::MAX), Item::Child(c))
            }))
            .collect();
        items.sort_by_key(|(rank, _)| *rank);

        for (_, item) in items {
            match item {
                Item::Comp(comp) => order.push(comp.to_string()),
                Item::Child(child) => self.collect_in_order(child, first_rank, order),
            }
        }
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> Result<(), TreeError> {
        let malformed = |msg: String| Err(TreeError::Malformed(msg));

        // Walk from the roots; every node must be reached exactly once.
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        for root in &self.roots {
            let Some(node) = self.iterators.get(root) else {
                return malformed(format!("root `{}` does not exist", root));
            };
            if node.parent.is_some() {
                return malformed(format!("root `{}` has a parent", root));
            }
            if node.level != 0 {
                return malformed(format!("root `{}` is at level {}", root, node.level));
            }
            stack.push(root.as_str());
        }
        while let Some(name) = stack.pop() {
            if !seen.insert(name) {
                return malformed(format!("iterator `{}` is reachable twice", name));
            }
            let node = self.node(name);
            for child in &node.child_iterators {
                let Some(child_node) = self.iterators.get(child) else {
                    return malformed(format!("child `{}` of `{}` does not exist", child, name));
                };
                if child_node.parent.as_deref() != Some(name) {
                    return malformed(format!("`{}` does not point back to parent `{}`", child, name));
                }
                if child_node.level != node.level + 1 {
                    return malformed(format!(
                        "`{}` is at level {} under `{}` at level {}",
                        child, child_node.level, name, node.level
                    ));
                }
                stack.push(child);
            }
        }
        if seen.len() != self.iterators.len() {
            return malformed("some iterators are not reachable from a root".to_string());
        }

        for (comp, iterator) in &self.computation_iterators {
            if !self.computations.contains_key(comp) {
                return malformed(format!("unknown computation `{}` is scheduled", comp));
            }
            match self.iterators.get(iterator) {
                Some(node) if node.computations.contains(comp) => {}
                Some(_) => return malformed(format!("`{}` does not list computation `{}`", iterator, comp)),
                None => return malformed(format!("computation `{}` is under missing iterator `{}`", comp, iterator)),
            }
        }
        for comp in self.computations.keys() {
            if !self.computation_iterators.contains_key(comp) {
                return malformed(format!("computation `{}` has no iterator", comp));
            }
            if !self.computations_absolute_order.contains_key(comp) {
                return malformed(format!("computation `{}` has no absolute order", comp));
            }
        }
        let ranks: HashSet<usize> = self.computations_absolute_order.values().copied().collect();
        if ranks.len() != self.computations.len() || self.computations_absolute_order.len() != self.computations.len() {
            return malformed("absolute order is not a permutation of the computations".to_string());
        }
        Ok(())
    }
}

/// Builder for trees, mostly useful in tests and examples.
///
/// Iterators must be declared after their parent; computations are ranked in
/// declaration order.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    iterators: HashMap<String, IteratorNode>,
    roots: Vec<String>,
    computations: Vec<(String, String, String)>,
    error: Option<TreeError>,
}

impl TreeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an iterator running from 0 to `upper`.
    pub fn iterator(self, name: &str, parent: Option<&str>, upper: i64) -> Self {
        self.iterator_with_bounds(name, parent, Bound::Concrete(0), Bound::Concrete(upper))
    }

    /// Declare an iterator with explicit bounds.
    pub fn iterator_with_bounds(
        mut self,
        name: &str,
        parent: Option<&str>,
        lower: Bound,
        upper: Bound,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.iterators.contains_key(name) {
            self.error = Some(TreeError::Malformed(format!("duplicate iterator `{}`", name)));
            return self;
        }
        let level = match parent {
            None => 0,
            Some(p) => match self.iterators.get_mut(p) {
                Some(parent_node) => {
                    parent_node.child_iterators.push(name.to_string());
                    parent_node.level + 1
                }
                None => {
                    self.error = Some(TreeError::IteratorNotFound(p.to_string()));
                    return self;
                }
            },
        };
        let mut node = IteratorNode::new(name, level, lower, upper);
        node.parent = parent.map(str::to_string);
        if parent.is_none() {
            self.roots.push(name.to_string());
        }
        self.iterators.insert(name.to_string(), node);
        self
    }

    /// Declare a computation whose innermost iterator is `iterator`.
    pub fn computation(mut self, name: &str, iterator: &str, expression: &str) -> Self {
        self.computations
            .push((name.to_string(), iterator.to_string(), expression.to_string()));
        self
    }

    /// Build and validate the tree.
    pub fn build(mut self) -> Result<IterationTree, TreeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let mut computations = HashMap::new();
        let mut order = HashMap::new();
        let mut innermost = HashMap::new();
        for (rank, (name, iterator, expression)) in self.computations.into_iter().enumerate() {
            let node = self
                .iterators
                .get_mut(&iterator)
                .ok_or_else(|| TreeError::IteratorNotFound(iterator.clone()))?;
            node.computations.push(name.clone());
            if computations.insert(name.clone(), Computation::new(name.clone(), expression)).is_some() {
                return Err(TreeError::Malformed(format!("duplicate computation `{}`", name)));
            }
            order.insert(name.clone(), rank);
            innermost.insert(name, iterator);
        }
        IterationTree::from_parts(self.iterators, self.roots, computations, order, innermost)
    }
}
