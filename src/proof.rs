//! Proof DAG arena
//!
//! Every accepted fact is witnessed by a [`ProofNode`]: the rule that fired,
//! a human-readable statement, and the parent nodes it was derived from.
//! Nodes live in an arena owned by the engine; identity is the integer id,
//! so equality and hashing are cheap and structural sharing is explicit.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

/// Handle to a node in the proof arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProofId(pub usize);

impl ProofId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// One derivation step.
#[derive(Debug, Clone)]
pub struct ProofNode {
    /// Name of the deduction rule (or predicate, for assumption nodes).
    pub rule: String,
    /// Rendered statement of the derived fact.
    pub statement: String,
    /// Witnessing facts; empty for assumptions.
    pub parents: Vec<ProofId>,
}

/// Arena of proof nodes.
#[derive(Debug, Default)]
pub struct ProofForest {
    nodes: Vec<ProofNode>,
}

impl ProofForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its handle. Parent order is kept as given
    /// (callers pass ordered sets, so traces are reproducible).
    pub fn add(
        &mut self,
        rule: impl Into<String>,
        statement: impl Into<String>,
        parents: impl IntoIterator<Item = ProofId>,
    ) -> ProofId {
        let id = ProofId(self.nodes.len());
        self.nodes.push(ProofNode {
            rule: rule.into(),
            statement: statement.into(),
            parents: parents.into_iter().collect(),
        });
        id
    }

    pub fn node(&self, id: ProofId) -> &ProofNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reachable from `roots`, parents before children.
    ///
    /// Iterative DFS with an explicit expansion marker; arena ids only grow,
    /// so parent ids are always smaller than the child's and the walk
    /// terminates.
    pub fn topo_order(&self, roots: &BTreeSet<ProofId>) -> Vec<ProofId> {
        let mut order = Vec::new();
        let mut done: FxHashSet<ProofId> = FxHashSet::default();
        let mut stack: Vec<(ProofId, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            if done.contains(&id) {
                continue;
            }
            if expanded {
                done.insert(id);
                order.push(id);
            } else {
                stack.push((id, true));
                for &p in self.node(id).parents.iter().rev() {
                    if !done.contains(&p) {
                        stack.push((p, false));
                    }
                }
            }
        }
        order
    }

    /// Render the derivation of `roots` as one numbered line per node.
    pub fn render_trace(&self, roots: &BTreeSet<ProofId>) -> String {
        let order = self.topo_order(roots);
        let index_of: rustc_hash::FxHashMap<ProofId, usize> =
            order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut out = String::new();
        for (i, &id) in order.iter().enumerate() {
            let node = self.node(id);
            out.push_str(&format!("{i:>3}. [{}] {}", node.rule, node.statement));
            if !node.parents.is_empty() {
                let parents: Vec<String> = node
                    .parents
                    .iter()
                    .map(|p| index_of[p].to_string())
                    .collect();
                out.push_str(&format!("  <- {}", parents.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_puts_parents_first() {
        let mut f = ProofForest::new();
        let a = f.add("hyp", "a", []);
        let b = f.add("hyp", "b", []);
        let c = f.add("rule", "c", [a, b]);
        let d = f.add("rule", "d", [c, a]);
        let order = f.topo_order(&BTreeSet::from([d]));
        let pos = |id: ProofId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(c));
        assert!(pos(c) < pos(d));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn trace_references_emitted_indices() {
        let mut f = ProofForest::new();
        let a = f.add("hyp", "coll(x y z)", []);
        let b = f.add("para", "para(x y, u v)", [a]);
        let trace = f.render_trace(&BTreeSet::from([b]));
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[hyp] coll(x y z)"));
        assert!(lines[1].contains("[para]"));
        assert!(lines[1].ends_with("<- 0"));
    }

    #[test]
    fn shared_ancestors_emitted_once() {
        let mut f = ProofForest::new();
        let a = f.add("hyp", "a", []);
        let b = f.add("r", "b", [a]);
        let c = f.add("r", "c", [a]);
        let d = f.add("r", "d", [b, c]);
        assert_eq!(f.topo_order(&BTreeSet::from([d])).len(), 4);
    }
}
