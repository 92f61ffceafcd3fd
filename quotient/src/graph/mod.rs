//! The Felsch graph: a source-indexed word graph plus a node arena, a presentation,
//! the Felsch tree over its relators, the definition stack and the coincidence stack.
//!
//! This is the shared mutable state that every engine (HLT, Felsch, lookahead,
//! lookbehind, Stephen) drives.  The submodules hold the two closure mechanisms:
//! [`felsch`] propagates forced equalities along relators, [`coincidence`] merges
//! nodes discovered equal.

mod coincidence;
mod felsch;

use datasize::data_size;
use wordgraph::{
    self as wg, Forest, Letter, Node, NodeArena, Order, Presentation, SourceGraph, Word,
    UNDEFINED,
};

use crate::{
    definitions::Definitions,
    felsch_tree::FelschTree,
    settings::{DefPolicy, DefVersion, Settings},
};

/// Word graph, node arena and closure state for one congruence.
#[derive(Debug)]
pub(crate) struct FelschGraph {
    /// The engine's internal presentation.  For two-sided congruences with generating
    /// pairs this is the caller's presentation *plus* the pairs as extra rules.
    presentation: Presentation,
    /// Rule sides, flattened: `sides[2 * i]` and `sides[2 * i + 1]` are the two sides
    /// of rule `i`; the partner of side `j` is `j ^ 1`.
    sides: Vec<Word>,
    graph: SourceGraph,
    arena: NodeArena,
    tree: FelschTree,
    defs: Definitions,
    coincidences: Vec<(Node, Node)>,

    /* Cursors (persist across run calls) */
    pub(crate) cursor: Node,
    pub(crate) lookahead_cursor: Node,

    /* Settings, copied in from the driver before every run */
    def_version: DefVersion,
    def_policy: DefPolicy,
    def_max: usize,
    large_collapse: usize,

    /* Spanning tree cache */
    forest: Forest,
    forest_valid: bool,
    standardization_order: Order,
}

impl FelschGraph {
    pub(crate) fn new(presentation: Presentation) -> Self {
        let arena = NodeArena::new();
        let out_degree = presentation.alphabet_size();
        let graph = SourceGraph::new(arena.capacity(), out_degree);
        let sides = flatten_rules(&presentation);
        let tree = FelschTree::new(out_degree, &sides);
        FelschGraph {
            presentation,
            sides,
            graph,
            arena,
            tree,
            defs: Definitions::default(),
            coincidences: Vec::new(),
            cursor: Node::INITIAL,
            lookahead_cursor: Node::INITIAL,
            def_version: DefVersion::default(),
            def_policy: DefPolicy::default(),
            def_max: 2_000,
            large_collapse: 100_000,
            forest: Forest::default(),
            forest_valid: false,
            standardization_order: Order::None,
        }
    }

    /// Builds on top of an existing word graph (e.g. to resume a partial enumeration).
    /// `graph` must be over the presentation's alphabet with nodes `0 .. n` all in use.
    pub(crate) fn from_word_graph(presentation: Presentation, graph: SourceGraph) -> Self {
        let mut this = Self::new(presentation);
        let n = graph.num_nodes();
        this.graph = graph;
        while this.arena.num_active() < n {
            this.arena.new_active_node();
        }
        if this.arena.capacity() > this.graph.num_nodes() {
            this.graph.add_nodes(this.arena.capacity() - this.graph.num_nodes());
        }
        this.graph
            .rebuild_sources((0..n).map(Node::new));
        this
    }

    /// Replaces the internal presentation (and rebuilds the relator index), leaving the
    /// graph untouched.
    pub(crate) fn set_presentation(&mut self, presentation: Presentation) {
        debug_assert_eq!(
            presentation.alphabet_size(),
            self.presentation.alphabet_size()
        );
        self.sides = flatten_rules(&presentation);
        self.tree = FelschTree::new(presentation.alphabet_size(), &self.sides);
        self.presentation = presentation;
    }

    pub(crate) fn apply_settings(&mut self, settings: &Settings) {
        self.def_version = settings.def_version;
        self.def_policy = settings.def_policy;
        self.def_max = settings.def_max;
        self.large_collapse = settings.large_collapse;
    }

    /* ===== ACCESSORS ===== */

    pub(crate) fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub(crate) fn graph(&self) -> &SourceGraph {
        &self.graph
    }

    pub(crate) fn arena(&self) -> &NodeArena {
        &self.arena
    }

    #[inline]
    pub(crate) fn out_degree(&self) -> usize {
        self.graph.out_degree()
    }

    #[inline]
    pub(crate) fn num_active(&self) -> usize {
        self.arena.num_active()
    }

    #[inline]
    pub(crate) fn first_free(&self) -> Node {
        self.arena.first_free()
    }

    #[inline]
    pub(crate) fn next_active(&self, n: Node) -> Node {
        self.arena.next_active(n)
    }

    pub(crate) fn any_skipped(&self) -> bool {
        self.defs.any_skipped()
    }

    pub(crate) fn reset_any_skipped(&mut self) {
        self.defs.reset_skipped();
    }

    pub(crate) fn num_coincidences(&self) -> usize {
        self.coincidences.len()
    }

    /// Estimated heap footprint of the graph and arena, in bytes.
    pub(crate) fn heap_bytes(&self) -> usize {
        data_size(&self.graph) + data_size(&self.arena)
    }

    pub(crate) fn is_complete(&self) -> bool {
        wg::is_complete(&self.graph, self.arena.active_nodes())
    }

    /* ===== MODIFIERS ===== */

    fn invalidate_forest(&mut self) {
        self.forest_valid = false;
        self.standardization_order = Order::None;
    }

    /// Allocates a fresh node, growing the edge arrays alongside the arena.
    pub(crate) fn new_node(&mut self) -> Node {
        let n = self.arena.new_active_node();
        if self.arena.capacity() > self.graph.num_nodes() {
            self.graph
                .add_nodes(self.arena.capacity() - self.graph.num_nodes());
        }
        n
    }

    /// Records the edge `s --a--> t`, optionally pushing it onto the definition stack.
    pub(crate) fn set_edge(&mut self, s: Node, a: Letter, t: Node, register: bool) {
        self.invalidate_forest();
        self.graph.set_target(s, a, t);
        if register {
            self.defs
                .push((s, a), &self.arena, self.def_policy, self.def_max);
        }
    }

    /// Follows `word` from `c`, creating a fresh node for every missing edge.  Returns
    /// whether anything was defined, and the endpoint.
    pub(crate) fn complete_path(
        &mut self,
        c: Node,
        word: &[Letter],
        register: bool,
    ) -> (bool, Node) {
        let mut current = c;
        let mut defined_any = false;
        for &a in word {
            let next = self.graph.target(current, a);
            current = if next == UNDEFINED {
                let d = self.new_node();
                self.set_edge(current, a, d, register);
                defined_any = true;
                d
            } else {
                next
            };
        }
        (defined_any, current)
    }

    /// Schedules the identification of `a` and `b`; does not process it.
    pub(crate) fn merge_nodes(&mut self, a: Node, b: Node) {
        debug_assert!(a != b);
        self.coincidences.push((a, b));
    }

    /// Traces the relator pair `(u, v)` from `c`, creating all but the last edge along
    /// each side, then forces the two final targets together.
    pub(crate) fn push_definition_hlt(&mut self, c: Node, u: &[Letter], v: &[Letter], register: bool) {
        debug_assert!(self.arena.is_active(c));
        let (x, a) = if u.is_empty() {
            (c, None)
        } else {
            let end = self.complete_path(c, &u[..u.len() - 1], register).1;
            (end, Some(u[u.len() - 1]))
        };
        let (y, b) = if v.is_empty() {
            (c, None)
        } else {
            let end = self.complete_path(c, &v[..v.len() - 1], register).1;
            (end, Some(v[v.len() - 1]))
        };
        self.merge_endpoints(x, a, y, b, register, true);
    }

    #[inline]
    pub(crate) fn num_rules(&self) -> usize {
        self.sides.len() / 2
    }

    /// Walks all but the last letter of rule side `side` from `c`, creating nodes for
    /// missing edges; returns the node reached and the final letter (`None` for an
    /// empty side).
    fn complete_side_prefix(
        &mut self,
        c: Node,
        side: usize,
        register: bool,
    ) -> (Node, Option<Letter>) {
        let len = self.sides[side].len();
        if len == 0 {
            return (c, None);
        }
        let mut current = c;
        let mut i = 0;
        while i + 1 < len {
            let a = self.sides[side][i];
            let next = self.graph.target(current, a);
            current = if next == UNDEFINED {
                let d = self.new_node();
                self.set_edge(current, a, d, register);
                d
            } else {
                next
            };
            i += 1;
        }
        (current, Some(self.sides[side][len - 1]))
    }

    /// [`push_definition_hlt`](Self::push_definition_hlt) for the `rule`-th rule of the
    /// internal presentation.
    pub(crate) fn push_definition_hlt_for_rule(&mut self, c: Node, rule: usize, register: bool) {
        debug_assert!(self.arena.is_active(c));
        let i = 2 * rule;
        let (x, a) = self.complete_side_prefix(c, i, register);
        let (y, b) = self.complete_side_prefix(c, i ^ 1, register);
        self.merge_endpoints(x, a, y, b, register, true);
    }

    /// One lookahead step: traces every relator pair from `n` without registering
    /// definitions or creating nodes.
    pub(crate) fn make_compatible_at(&mut self, n: Node) {
        for i in (0..self.sides.len()).step_by(2) {
            self.trace_and_merge(n, i, false);
        }
    }

    /// Pushes `(n, a)` for every label onto a cleared definition stack; used by
    /// Felsch-style lookaheads.
    pub(crate) fn push_node_definitions(&mut self, n: Node) {
        self.defs.clear();
        for a in 0..self.out_degree() as Letter {
            if self.graph.target(n, a) != UNDEFINED {
                self.defs
                    .push((n, a), &self.arena, self.def_policy, self.def_max);
            }
        }
    }

    /* ===== SPANNING TREE & STANDARDISATION ===== */

    /// The spanning tree of the current graph, rebuilt on demand.  Indexed by raw node
    /// ids (which need not be contiguous before standardisation).
    pub(crate) fn current_spanning_tree(&mut self) -> &Forest {
        if !self.forest_valid {
            self.standardization_order = Order::None;
            wg::spanning_tree_no_checks(&self.graph, Node::INITIAL, &mut self.forest);
            self.forest_valid = true;
        }
        &self.forest
    }

    pub(crate) fn is_standardized(&self, order: Order) -> bool {
        self.standardization_order == order
    }

    pub(crate) fn standardization_order(&self) -> Order {
        self.standardization_order
    }

    /// Renumbers the active nodes according to `order`.  Returns `true` iff the graph
    /// changed.  `order` must not be [`Order::None`] (rejected at the API boundary).
    pub(crate) fn standardize(&mut self, order: Order) -> bool {
        if self.is_standardized(order) {
            return false;
        }
        log::debug!(
            "standardizing {} active nodes with respect to {order}",
            self.num_active()
        );
        let perm = wg::standardize(&mut self.graph, &mut self.arena, &mut self.forest, order);
        self.forest_valid = true;
        self.standardization_order = order;
        match perm {
            None => false,
            Some(perm) => {
                // The enumeration cursors survive as their renamed selves
                if self.cursor.is_defined() && self.cursor.index() < perm.len() {
                    self.cursor = perm[self.cursor.index()];
                }
                if self.lookahead_cursor.is_defined()
                    && self.lookahead_cursor.index() < perm.len()
                {
                    self.lookahead_cursor = perm[self.lookahead_cursor.index()];
                }
                true
            }
        }
    }

    /// Removes the free nodes entirely, compacting storage to the active range.  The
    /// graph must be standardised first.
    pub(crate) fn erase_free_nodes(&mut self) {
        debug_assert!(self.standardization_order != Order::None);
        let n = self.arena.num_active();
        self.arena.erase_free_nodes();
        self.graph.induced_subgraph_no_checks(n);
    }

    /// Debug-build validation of the compound invariants.
    pub(crate) fn validate(&self) {
        self.arena.validate();
        self.graph.validate(self.arena.active_nodes());
        if self.coincidences.is_empty() {
            for n in self.arena.active_nodes() {
                for (a, t) in self.graph.targets(n) {
                    assert!(
                        self.arena.is_active(t),
                        "active node {n} has an edge under {a} to the dead node {t}"
                    );
                }
            }
        }
    }
}

fn flatten_rules(presentation: &Presentation) -> Vec<Word> {
    let mut sides = Vec::with_capacity(presentation.rules().len() * 2);
    for (u, v) in presentation.rules() {
        sides.push(u.clone());
        sides.push(v.clone());
    }
    sides
}
