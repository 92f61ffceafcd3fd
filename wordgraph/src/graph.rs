//! A labelled digraph of bounded out-degree which also indexes, for every `(target,
//! label)` pair, the linked list of source nodes pointing at it.
//!
//! All storage is flat arrays indexed by node id; there are no per-node heap
//! allocations.  The reverse index is what lets the Felsch engine walk relators
//! *backwards* through the graph, and what lets coincidence processing redirect every
//! edge into a dying node without scanning the whole graph.

use bit_vec::BitVec;

use crate::{
    forest::Forest,
    node::{Node, UNDEFINED},
    Letter, Word,
};

/// A deterministic word graph over the alphabet `{0, .., out_degree - 1}` with
/// reverse-edge indices.
///
/// **Invariant** (reverse-link integrity): for every node `s` the caller treats as
/// valid, `t = target(s, a) != UNDEFINED` implies that `s` appears exactly once in the
/// linked list rooted at `first_source(t, a)` and threaded by `next_source`.  The
/// invariant holds before and after every public operation except while a merge is in
/// flight; validity of nodes is the caller's business (the graph itself does not track
/// which nodes are active).
#[derive(Debug, Clone, Default, datasize::DataSize)]
pub struct SourceGraph {
    num_nodes: usize,
    out_degree: usize,
    target: Vec<Node>,
    first_source: Vec<Node>,
    /// `next_source[s * out_degree + a]` is the source after `s` in the list of the node
    /// that `s` points at under `a`.
    next_source: Vec<Node>,
}

impl SourceGraph {
    pub fn new(num_nodes: usize, out_degree: usize) -> Self {
        SourceGraph {
            num_nodes,
            out_degree,
            target: vec![UNDEFINED; num_nodes * out_degree],
            first_source: vec![UNDEFINED; num_nodes * out_degree],
            next_source: vec![UNDEFINED; num_nodes * out_degree],
        }
    }

    /* ===== ACCESSORS ===== */

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    pub fn out_degree(&self) -> usize {
        self.out_degree
    }

    #[inline]
    fn at(&self, s: Node, a: Letter) -> usize {
        debug_assert!(s.index() < self.num_nodes);
        debug_assert!((a as usize) < self.out_degree);
        s.index() * self.out_degree + a as usize
    }

    #[inline]
    pub fn target(&self, s: Node, a: Letter) -> Node {
        self.target[self.at(s, a)]
    }

    #[inline]
    pub fn first_source(&self, t: Node, a: Letter) -> Node {
        self.first_source[self.at(t, a)]
    }

    #[inline]
    pub fn next_source(&self, s: Node, a: Letter) -> Node {
        self.next_source[self.at(s, a)]
    }

    /// Linear search of the source list at `(t, a)` for `s`.  Costly; used only in
    /// assertions and tests.
    pub fn is_source(&self, s: Node, a: Letter, t: Node) -> bool {
        let mut current = self.first_source(t, a);
        while current != UNDEFINED {
            if current == s {
                return true;
            }
            current = self.next_source(current, a);
        }
        false
    }

    /// An [`Iterator`] over the `(label, target)` pairs of the edges leaving `s`.
    pub fn targets(&self, s: Node) -> impl Iterator<Item = (Letter, Node)> + '_ {
        let base = s.index() * self.out_degree;
        self.target[base..base + self.out_degree]
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_defined())
            .map(|(a, &t)| (a as Letter, t))
    }

    /* ===== MODIFIERS ===== */

    pub fn add_nodes(&mut self, count: usize) {
        self.num_nodes += count;
        let len = self.num_nodes * self.out_degree;
        self.target.resize(len, UNDEFINED);
        self.first_source.resize(len, UNDEFINED);
        self.next_source.resize(len, UNDEFINED);
    }

    /// Records the edge `s --a--> t` and prepends `s` to the source list at `(t, a)`.
    /// The slot must currently be empty.
    pub fn set_target(&mut self, s: Node, a: Letter, t: Node) {
        debug_assert!(self.target(s, a) == UNDEFINED);
        let sa = self.at(s, a);
        self.target[sa] = t;
        self.add_source(t, a, s);
    }

    /// Unlinks `s` from the source list of its current target under `a` and clears the
    /// edge.  O(1) if `s` is at the head of the list, linear in the list otherwise.
    pub fn remove_target(&mut self, s: Node, a: Letter) {
        let t = self.target(s, a);
        debug_assert!(t != UNDEFINED);
        self.remove_source(t, a, s);
        let sa = self.at(s, a);
        self.target[sa] = UNDEFINED;
        self.next_source[sa] = UNDEFINED;
    }

    /// Points `s --a-->` at `t`, registering `s` as a source of `t`, *without* touching
    /// the source list of the old target.  Used while a merge is dismantling the old
    /// target's lists wholesale.
    pub fn replace_target(&mut self, s: Node, a: Letter, t: Node) {
        let sa = self.at(s, a);
        self.target[sa] = t;
        self.add_source(t, a, s);
    }

    /// In the source list at `(t, a)`, replaces the entry `old_s` with `new_s`, keeping
    /// the list position.  `new_s`'s target slot is the caller's business.
    pub fn replace_source(&mut self, old_s: Node, new_s: Node, a: Letter, t: Node) {
        debug_assert!(self.is_source(old_s, a, t));
        let next = self.next_source(old_s, a);
        let new_sa = self.at(new_s, a);
        self.next_source[new_sa] = next;
        if self.first_source(t, a) == old_s {
            let ta = self.at(t, a);
            self.first_source[ta] = new_s;
        } else {
            let mut current = self.first_source(t, a);
            loop {
                let after = self.next_source(current, a);
                if after == old_s {
                    let ca = self.at(current, a);
                    self.next_source[ca] = new_s;
                    break;
                }
                current = after;
            }
        }
        let old_sa = self.at(old_s, a);
        self.next_source[old_sa] = UNDEFINED;
    }

    /// Writes the target slot of `(s, a)` directly, with no source-list maintenance.
    /// Only for use while a merge is in flight (large collapses fix the reverse index
    /// with a single [`rebuild_sources`](Self::rebuild_sources) afterwards).
    pub fn write_target(&mut self, s: Node, a: Letter, t: Node) {
        let sa = self.at(s, a);
        self.target[sa] = t;
    }

    /// Transfers the edge `old_s --a--> t` to leave `new_s` instead, replacing the
    /// source-list entry in place.  `new_s` must not yet have an `a`-target.
    pub fn move_edge(&mut self, old_s: Node, new_s: Node, a: Letter) {
        let t = self.target(old_s, a);
        debug_assert!(t != UNDEFINED);
        debug_assert!(self.target(new_s, a) == UNDEFINED);
        self.replace_source(old_s, new_s, a, t);
        let new_sa = self.at(new_s, a);
        self.target[new_sa] = t;
        let old_sa = self.at(old_s, a);
        self.target[old_sa] = UNDEFINED;
    }

    #[inline]
    fn add_source(&mut self, t: Node, a: Letter, s: Node) {
        let ta = self.at(t, a);
        let sa = self.at(s, a);
        self.next_source[sa] = self.first_source[ta];
        self.first_source[ta] = s;
    }

    fn remove_source(&mut self, t: Node, a: Letter, s: Node) {
        let ta = self.at(t, a);
        if self.first_source[ta] == s {
            self.first_source[ta] = self.next_source(s, a);
            return;
        }
        let mut current = self.first_source[ta];
        loop {
            debug_assert!(current != UNDEFINED, "source list missing an entry");
            let next = self.next_source(current, a);
            if next == s {
                let ca = self.at(current, a);
                self.next_source[ca] = self.next_source(s, a);
                return;
            }
            current = next;
        }
    }

    /// Drops every source-list entry rooted at `t` under `a`.  The entries' target
    /// slots are untouched; callers follow up with [`replace_target`](Self::replace_target)
    /// or [`rebuild_sources`](Self::rebuild_sources).
    pub fn clear_sources(&mut self, t: Node, a: Letter) {
        let ta = self.at(t, a);
        self.first_source[ta] = UNDEFINED;
    }

    /// Clears and reconstructs the reverse index for the given set of nodes in one
    /// pass.  Used after a large collapse instead of per-edge repair: every node in
    /// `nodes` has its lists reset, then every edge leaving one of them is re-inserted.
    pub fn rebuild_sources(&mut self, nodes: impl Iterator<Item = Node> + Clone) {
        for n in nodes.clone() {
            let base = n.index() * self.out_degree;
            for slot in &mut self.first_source[base..base + self.out_degree] {
                *slot = UNDEFINED;
            }
            for slot in &mut self.next_source[base..base + self.out_degree] {
                *slot = UNDEFINED;
            }
        }
        for s in nodes {
            for a in 0..self.out_degree as Letter {
                let t = self.target(s, a);
                if t != UNDEFINED {
                    self.add_source(t, a, s);
                }
            }
        }
    }

    /// Appends a copy of `other`'s nodes and edges, with all of `other`'s ids shifted
    /// up by the current node count.
    pub fn disjoint_union_in_place(&mut self, other: &SourceGraph) {
        debug_assert_eq!(self.out_degree, other.out_degree);
        let shift = self.num_nodes;
        self.add_nodes(other.num_nodes);
        for s in 0..other.num_nodes {
            for (a, t) in other.targets(Node::new(s)) {
                self.set_target(Node::new(s + shift), a, Node::new(t.index() + shift));
            }
        }
    }

    /// Renumbers every node through `perm` (a bijection of `0 .. num_nodes`), then
    /// rebuilds the reverse index from scratch.
    pub fn permute_nodes_no_checks(&mut self, perm: &[Node]) {
        debug_assert_eq!(perm.len(), self.num_nodes);
        let mut new_target = vec![UNDEFINED; self.target.len()];
        for s in 0..self.num_nodes {
            let new_s = perm[s].index();
            for a in 0..self.out_degree {
                let t = self.target[s * self.out_degree + a];
                new_target[new_s * self.out_degree + a] = if t == UNDEFINED {
                    UNDEFINED
                } else {
                    perm[t.index()]
                };
            }
        }
        self.target = new_target;
        self.rebuild_sources((0..self.num_nodes).map(Node::new));
    }

    /// Restricts the graph to the nodes `0 .. count`, dropping all other rows.  Every
    /// surviving edge must already point inside the range.
    pub fn induced_subgraph_no_checks(&mut self, count: usize) {
        debug_assert!(count <= self.num_nodes);
        debug_assert!((0..count)
            .flat_map(|s| self.targets(Node::new(s)))
            .all(|(_, t)| t.index() < count));
        self.num_nodes = count;
        let len = count * self.out_degree;
        self.target.truncate(len);
        self.first_source.truncate(len);
        self.next_source.truncate(len);
        // Source lists may reference dropped rows
        self.rebuild_sources((0..count).map(Node::new));
    }

    /// Checks reverse-link integrity for every node in `nodes`, panicking on violation.
    pub fn validate(&self, nodes: impl Iterator<Item = Node> + Clone) {
        for s in nodes.clone() {
            for a in 0..self.out_degree as Letter {
                let t = self.target(s, a);
                if t != UNDEFINED {
                    let count = {
                        let mut n = 0;
                        let mut current = self.first_source(t, a);
                        while current != UNDEFINED {
                            if current == s {
                                n += 1;
                            }
                            current = self.next_source(current, a);
                        }
                        n
                    };
                    assert_eq!(
                        count, 1,
                        "edge {s} --{a}--> {t} appears {count} times in the source list"
                    );
                }
            }
        }
    }
}

/* ===== PATH HELPERS ===== */

/// Follows `word` from `from`; returns the endpoint, or [`UNDEFINED`] if the path falls
/// off the defined part of the graph.
pub fn follow_path(graph: &SourceGraph, from: Node, word: &[Letter]) -> Node {
    let mut current = from;
    for &a in word {
        current = graph.target(current, a);
        if current == UNDEFINED {
            return UNDEFINED;
        }
    }
    current
}

/// Follows `word` from `from` as far as possible; returns the last node reached and the
/// number of letters consumed.
pub fn last_node_on_path(graph: &SourceGraph, from: Node, word: &[Letter]) -> (Node, usize) {
    let mut current = from;
    for (i, &a) in word.iter().enumerate() {
        let next = graph.target(current, a);
        if next == UNDEFINED {
            return (current, i);
        }
        current = next;
    }
    (current, word.len())
}

/// `true` iff every node yielded by `nodes` has all `out_degree` targets defined.
pub fn is_complete(graph: &SourceGraph, mut nodes: impl Iterator<Item = Node>) -> bool {
    nodes.all(|n| (0..graph.out_degree() as Letter).all(|a| graph.target(n, a) != UNDEFINED))
}

/// Fills `forest` with a breadth-first spanning tree of the graph rooted at `root`,
/// following labels in increasing order.  Nodes unreachable from `root` keep an
/// undefined parent.
pub fn spanning_tree_no_checks(graph: &SourceGraph, root: Node, forest: &mut Forest) {
    forest.init(graph.num_nodes());
    let mut seen = BitVec::from_elem(graph.num_nodes(), false);
    seen.set(root.index(), true);
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(n) = queue.pop_front() {
        for (a, t) in graph.targets(n) {
            if !seen[t.index()] {
                seen.set(t.index(), true);
                forest.set(t, n, a);
                queue.push_back(t);
            }
        }
    }
}

/// Collects the word labelling the unique forest path from the root to `n` (i.e. a
/// spelling of the class represented by `n`).
pub fn path_from_root(forest: &Forest, n: Node) -> Word {
    let mut word = forest.path_to_root(n);
    word.reverse();
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A graph on 3 nodes with edges 0 --0--> 1, 0 --1--> 2, 1 --0--> 2, 2 --0--> 2.
    fn diamond() -> SourceGraph {
        let mut g = SourceGraph::new(3, 2);
        g.set_target(Node(0), 0, Node(1));
        g.set_target(Node(0), 1, Node(2));
        g.set_target(Node(1), 0, Node(2));
        g.set_target(Node(2), 0, Node(2));
        g
    }

    #[test]
    fn set_and_remove_target() {
        let mut g = diamond();
        g.validate((0..3).map(Node::new));
        assert_eq!(g.target(Node(0), 0), Node(1));
        assert!(g.is_source(Node(0), 0, Node(1)));
        assert!(g.is_source(Node(1), 0, Node(2)));
        assert!(g.is_source(Node(2), 0, Node(2)));
        assert!(!g.is_source(Node(2), 1, Node(2)));

        g.remove_target(Node(1), 0);
        assert_eq!(g.target(Node(1), 0), UNDEFINED);
        assert!(!g.is_source(Node(1), 0, Node(2)));
        g.validate((0..3).map(Node::new));
    }

    #[test]
    fn follow_paths() {
        let g = diamond();
        assert_eq!(follow_path(&g, Node(0), &[0, 0]), Node(2));
        assert_eq!(follow_path(&g, Node(0), &[1, 0, 0, 0]), Node(2));
        assert_eq!(follow_path(&g, Node(0), &[0, 1]), UNDEFINED);
        assert_eq!(follow_path(&g, Node(0), &[]), Node(0));
        assert_eq!(last_node_on_path(&g, Node(0), &[0, 1, 0]), (Node(1), 1));
    }

    #[test]
    fn rebuild_matches_incremental() {
        let mut g = diamond();
        let mut rebuilt = g.clone();
        rebuilt.rebuild_sources((0..3).map(Node::new));
        rebuilt.validate((0..3).map(Node::new));
        // Rebuilding must index exactly the same edges
        for s in 0..3 {
            for a in 0..2 {
                let t = g.target(Node(s), a);
                if t != UNDEFINED {
                    assert!(rebuilt.is_source(Node(s), a, t));
                }
            }
        }
        g.validate((0..3).map(Node::new));
    }

    #[test]
    fn disjoint_union_shifts_ids() {
        use itertools::Itertools;

        let mut g = diamond();
        let other = diamond();
        g.disjoint_union_in_place(&other);
        assert_eq!(g.num_nodes(), 6);
        assert_eq!(
            g.targets(Node(3)).collect_vec(),
            vec![(0, Node(4)), (1, Node(5))]
        );
        assert_eq!(g.target(Node(5), 0), Node(5));
        g.validate((0..6).map(Node::new));
    }

    #[test]
    fn permute_relabels_everything() {
        let mut g = diamond();
        // Swap nodes 1 and 2
        g.permute_nodes_no_checks(&[Node(0), Node(2), Node(1)]);
        assert_eq!(g.target(Node(0), 0), Node(2));
        assert_eq!(g.target(Node(0), 1), Node(1));
        assert_eq!(g.target(Node(2), 0), Node(1));
        assert_eq!(g.target(Node(1), 0), Node(1));
        g.validate((0..3).map(Node::new));
    }

    #[test]
    fn spanning_tree_of_diamond() {
        let g = diamond();
        let mut forest = Forest::default();
        spanning_tree_no_checks(&g, Node(0), &mut forest);
        assert_eq!(forest.parent(Node(1)), Node(0));
        // 2 is first reached from 0 (BFS), not from 1
        assert_eq!(forest.parent(Node(2)), Node(0));
        assert_eq!(path_from_root(&forest, Node(2)), vec![1]);
        assert_eq!(path_from_root(&forest, Node(0)), Vec::<Letter>::new());
    }
}
