//! Definition processing: propagating the consequences of a new edge through the
//! relators.
//!
//! A definition `(c, x)` means the edge `c --x--> t` was just created.  Any relator
//! side containing `x` may now be fully traceable through that edge from some node, and
//! if it is, its endpoint must agree with the endpoint of the partner side.  The search
//! for such nodes walks the graph *backwards* from `c` along the reverse-edge index,
//! mirroring each step in the [`FelschTree`](crate::felsch_tree::FelschTree); matches
//! reported by the tree are exactly the (side, pivot) pairs whose whole prefix lies
//! along the walked path.

use wordgraph::{last_node_on_path, Letter, Node, UNDEFINED};

use super::FelschGraph;
use crate::settings::DefVersion;

impl FelschGraph {
    /// Drains the definition stack, then the coincidence stack, and repeats until both
    /// are empty.
    pub(crate) fn process_definitions(&mut self) {
        if self.sides.is_empty() {
            // No relators: definitions can't force anything
            self.defs.clear();
            self.process_coincidences(false);
            return;
        }
        loop {
            while let Some((s, a)) = self.defs.pop() {
                if self.arena.is_active(s) {
                    self.process_definition(s, a);
                }
            }
            if self.coincidences.is_empty() {
                return;
            }
            // Reassigned edges re-enter the definition stack
            self.process_coincidences(true);
        }
    }

    pub(crate) fn process_definition(&mut self, c: Node, x: Letter) {
        match self.def_version {
            DefVersion::One => {
                if self.tree.push_back(x) {
                    self.definition_dfs_v1(c);
                }
            }
            DefVersion::Two => {
                let t = self.graph.target(c, x);
                debug_assert!(t != UNDEFINED);
                if self.tree.push_back(x) {
                    self.definition_dfs_v2(c, t, c);
                }
            }
        }
    }

    /// Version one: every matched side is retraced from scratch.
    fn definition_dfs_v1(&mut self, c: Node) {
        for k in 0..self.tree.match_count() {
            let (side, _) = self.tree.match_at(k);
            self.trace_and_merge(c, side, true);
        }
        for b in 0..self.out_degree() as Letter {
            if self.tree.push_front(b) {
                let mut s = self.graph.first_source(c, b);
                while s != UNDEFINED {
                    let next = self.graph.next_source(s, b);
                    self.definition_dfs_v1(s);
                    s = next;
                }
                self.tree.pop_front();
            }
        }
    }

    /// Version two: the matched prefix is known to end at `t` through the definition
    /// edge `(c0, x)`, so tracing resumes from `t` instead of re-walking the prefix.
    /// Identical output to version one.
    fn definition_dfs_v2(&mut self, c0: Node, t: Node, c: Node) {
        for k in 0..self.tree.match_count() {
            let (side, pivot) = self.tree.match_at(k);
            let Some((x, a)) = self.walk_side_suffix(c0, t, side, pivot) else {
                continue;
            };
            let Some((y, b)) = self.walk_side_prefix(c, side ^ 1) else {
                continue;
            };
            self.merge_endpoints(x, a, y, b, true, false);
        }
        for b in 0..self.out_degree() as Letter {
            if self.tree.push_front(b) {
                let mut s = self.graph.first_source(c, b);
                while s != UNDEFINED {
                    let next = self.graph.next_source(s, b);
                    self.definition_dfs_v2(c0, t, s);
                    s = next;
                }
                self.tree.pop_front();
            }
        }
    }

    /// Traces both sides of the pair containing `side` from `c` and, if neither walk
    /// falls off an undefined edge before its final letter, forces the final targets
    /// together.  The scan of a relator stops at the first missing edge.
    pub(super) fn trace_and_merge(&mut self, c: Node, side: usize, register: bool) {
        let Some((x, a)) = self.walk_side_prefix(c, side) else {
            return;
        };
        let Some((y, b)) = self.walk_side_prefix(c, side ^ 1) else {
            return;
        };
        self.merge_endpoints(x, a, y, b, register, false);
    }

    /// Walks all but the last letter of `sides[side]` from `c`.  Returns the node
    /// reached and the final letter, `(c, None)` for an empty side, or `None` if an
    /// edge is missing.
    fn walk_side_prefix(&self, c: Node, side: usize) -> Option<(Node, Option<Letter>)> {
        let w = &self.sides[side];
        if w.is_empty() {
            return Some((c, None));
        }
        let (node, consumed) = last_node_on_path(&self.graph, c, &w[..w.len() - 1]);
        if consumed + 1 < w.len() {
            return None;
        }
        Some((node, Some(w[w.len() - 1])))
    }

    /// As [`walk_side_prefix`](Self::walk_side_prefix), but skipping the prefix
    /// `sides[side][0..=pivot]`, which is known to end at `t` via the edge out of `c0`.
    fn walk_side_suffix(
        &self,
        c0: Node,
        t: Node,
        side: usize,
        pivot: usize,
    ) -> Option<(Node, Option<Letter>)> {
        let w = &self.sides[side];
        debug_assert!(pivot < w.len());
        if pivot + 1 == w.len() {
            // The definition edge is the last edge of the side
            return Some((c0, Some(w[pivot])));
        }
        let rest = &w[pivot + 1..w.len() - 1];
        let (node, consumed) = last_node_on_path(&self.graph, t, rest);
        if consumed < rest.len() {
            return None;
        }
        Some((node, Some(w[w.len() - 1])))
    }

    /// Ensures `target(x, a) == target(y, b)`, where `None` labels mean "the node
    /// itself" (the endpoint of an empty relator side).
    ///
    /// - both targets defined and equal: nothing to do;
    /// - both defined and unequal: a coincidence is stacked;
    /// - exactly one defined: the defined target is copied to the other slot;
    /// - neither defined: a fresh node is created for both iff `create` (the HLT path),
    ///   otherwise nothing happens.
    pub(super) fn merge_endpoints(
        &mut self,
        x: Node,
        a: Option<Letter>,
        y: Node,
        b: Option<Letter>,
        register: bool,
        create: bool,
    ) {
        let xa = match a {
            None => x,
            Some(a) => self.graph.target(x, a),
        };
        let yb = match b {
            None => y,
            Some(b) => self.graph.target(y, b),
        };
        match (xa != UNDEFINED, yb != UNDEFINED) {
            (true, true) => {
                if xa != yb {
                    self.merge_nodes(xa, yb);
                }
            }
            (true, false) => {
                self.set_edge(y, b.unwrap(), xa, register);
            }
            (false, true) => {
                self.set_edge(x, a.unwrap(), yb, register);
            }
            (false, false) => {
                if create {
                    let d = self.new_node();
                    let a = a.unwrap();
                    let b = b.unwrap();
                    self.set_edge(x, a, d, register);
                    if a != b || x != y {
                        self.set_edge(y, b, d, register);
                    }
                }
            }
        }
    }
}
