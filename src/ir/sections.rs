//! Candidate sections: maximal branch-free runs of nested iterators.
//!
//! A section starts at a root or at a child of a branching iterator and
//! follows single children downwards. It ends at an iterator with zero or
//! several children; a computation attached partway down does not end it.
//! Every action's candidate enumeration is built on these sections.

use super::node::IteratorId;
use super::tree::IterationTree;
use std::collections::{BTreeMap, VecDeque};

/// Consecutive iterators, outermost first.
pub type Section = Vec<IteratorId>;

impl IterationTree {
    /// Sections of every root, in breadth-first order of their first iterator.
    pub fn get_candidate_sections(&self) -> BTreeMap<IteratorId, Vec<Section>> {
        let mut candidate_sections = BTreeMap::new();
        for root in self.roots() {
            let mut sections = Vec::new();
            let mut to_visit = VecDeque::from([root.name.as_str()]);
            while let Some(start) = to_visit.pop_front() {
                let (section, next) = self.section_from(start);
                sections.push(section);
                to_visit.extend(next);
            }
            candidate_sections.insert(root.id(), sections);
        }
        candidate_sections
    }

    /// Follow single children from `start`. Returns the section and the
    /// iterators that start new sections below it.
    fn section_from<'a>(&'a self, start: &str) -> (Section, Vec<&'a str>) {
        let mut node = self.node(start);
        let mut section = vec![node.id()];
        while let [only_child] = node.child_iterators.as_slice() {
            node = self.node(only_child);
            section.push(node.id());
        }
        let next = node.child_iterators.iter().map(String::as_str).collect();
        (section, next)
    }
}
