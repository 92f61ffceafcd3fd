//! Coincidence processing: merging nodes discovered equal, in LIFO order, repairing
//! the edge and reverse-edge structure as it goes.
//!
//! Merging is two-step: [`union_nodes`](wordgraph::NodeArena::union_nodes) is cheap (a
//! forwarding address), and the edge surgery happens here.  When a collapse is so
//! large that per-merge
//! source-list repair would dominate, the loop drops to a raw mode which only rewrites
//! target slots and reconstructs the whole reverse index in one pass afterwards.

use itertools::Itertools;
use wordgraph::{Letter, Node, UNDEFINED};

use super::FelschGraph;

impl FelschGraph {
    /// Drains the coincidence stack.  `register` controls whether edges copied onto a
    /// surviving node re-enter the definition stack.
    pub(crate) fn process_coincidences(&mut self, register: bool) {
        if self.coincidences.is_empty() {
            return;
        }
        self.invalidate_forest();
        while let Some((a, b)) = self.coincidences.pop() {
            if self.coincidences.len() + 1 >= self.large_collapse {
                self.coincidences.push((a, b));
                return self.process_coincidences_large(register);
            }
            let a = self.arena.find(a);
            let b = self.arena.find(b);
            if a == b {
                continue;
            }
            let (min, max) = if a < b { (a, b) } else { (b, a) };
            self.arena.union_nodes(min, max);
            self.merge_into(min, max, register);
        }
        #[cfg(debug_assertions)]
        self.validate();
    }

    /// Moves every edge incident to `max` over to `min`, stacking fresh coincidences
    /// where both nodes already had a target.
    fn merge_into(&mut self, min: Node, max: Node, register: bool) {
        for a in 0..self.out_degree() as Letter {
            // Redirect every s --a--> max to point at min.  The list at (max, a) is
            // dismantled wholesale; each entry is re-threaded onto (min, a)'s list.
            let mut s = self.graph.first_source(max, a);
            self.graph.clear_sources(max, a);
            while s != UNDEFINED {
                let next = self.graph.next_source(s, a);
                self.graph.replace_target(s, a, min);
                s = next;
            }

            // Move or merge max's outgoing edge under a
            let t = self.graph.target(max, a);
            if t != UNDEFINED {
                let mt = self.graph.target(min, a);
                if mt == UNDEFINED {
                    self.graph.move_edge(max, min, a);
                    if register {
                        self.defs
                            .push((min, a), &self.arena, self.def_policy, self.def_max);
                    }
                } else {
                    self.graph.remove_target(max, a);
                    if t != mt {
                        self.coincidences.push((t, mt));
                    }
                }
            }
        }
    }

    /// The bulk path: no source-list maintenance per merge.  Once the stack drains,
    /// one pass rewrites every surviving target through `find` and rebuilds the
    /// reverse index for all active nodes.
    fn process_coincidences_large(&mut self, register: bool) {
        log::debug!(
            "large collapse: {} pending coincidences with {} active nodes",
            self.coincidences.len(),
            self.num_active()
        );
        while let Some((a, b)) = self.coincidences.pop() {
            let a = self.arena.find(a);
            let b = self.arena.find(b);
            if a == b {
                continue;
            }
            let (min, max) = if a < b { (a, b) } else { (b, a) };
            self.arena.union_nodes(min, max);
            for a in 0..self.out_degree() as Letter {
                let t = self.graph.target(max, a);
                if t != UNDEFINED {
                    let mt = self.graph.target(min, a);
                    if mt == UNDEFINED {
                        self.graph.write_target(min, a, t);
                        if register {
                            self.defs
                                .push((min, a), &self.arena, self.def_policy, self.def_max);
                        }
                    } else if t != mt {
                        self.coincidences.push((t, mt));
                    }
                    self.graph.write_target(max, a, UNDEFINED);
                }
                self.graph.clear_sources(max, a);
            }
        }

        // Repair pass: chase forwarding addresses in every surviving edge, then
        // reconstruct the reverse index in one sweep
        let active = self.arena.active_nodes().collect_vec();
        for &s in &active {
            for a in 0..self.out_degree() as Letter {
                let t = self.graph.target(s, a);
                if t != UNDEFINED {
                    let ft = self.arena.find(t);
                    if ft != t {
                        self.graph.write_target(s, a, ft);
                    }
                }
            }
        }
        self.graph.rebuild_sources(active.iter().copied());
        log::debug!("large collapse done: {} active nodes remain", active.len());
        #[cfg(debug_assertions)]
        self.validate();
    }
}

#[cfg(test)]
mod tests {
    use wordgraph::Presentation;

    use super::*;

    fn three_chain() -> FelschGraph {
        // 0 --0--> 1, 0 --1--> 2, 1 --0--> 1, 2 --0--> 2 over a 2-letter alphabet
        let mut fg = FelschGraph::new(Presentation::new(2));
        let n1 = fg.new_node();
        let n2 = fg.new_node();
        fg.set_edge(Node(0), 0, n1, false);
        fg.set_edge(Node(0), 1, n2, false);
        fg.set_edge(n1, 0, n1, false);
        fg.set_edge(n2, 0, n2, false);
        fg
    }

    #[test]
    fn merging_redirects_edges() {
        let mut fg = three_chain();
        fg.merge_nodes(Node(1), Node(2));
        fg.process_coincidences(false);
        assert_eq!(fg.num_active(), 2);
        // Both labels out of node 0 now reach the surviving node 1
        assert_eq!(fg.graph().target(Node(0), 0), Node(1));
        assert_eq!(fg.graph().target(Node(0), 1), Node(1));
        assert_eq!(fg.graph().target(Node(1), 0), Node(1));
        fg.validate();
    }

    #[test]
    fn cascading_merges() {
        // Merging 1 and 2 makes their self-loops collide, which is already the same
        // coincidence, so the cascade stops immediately; then merging 0 with 1 leaves
        // the trivial graph.
        let mut fg = three_chain();
        fg.merge_nodes(Node(1), Node(2));
        fg.process_coincidences(false);
        fg.merge_nodes(Node(0), Node(1));
        fg.process_coincidences(false);
        assert_eq!(fg.num_active(), 1);
        assert_eq!(fg.graph().target(Node(0), 0), Node(0));
        assert_eq!(fg.graph().target(Node(0), 1), Node(0));
        fg.validate();
    }

    #[test]
    fn large_collapse_agrees_with_incremental() {
        let build = |large_collapse: usize| {
            let mut fg = three_chain();
            // A threshold of 1 forces the bulk path immediately
            let settings = crate::Settings {
                large_collapse,
                ..crate::Settings::default()
            };
            fg.apply_settings(&settings);
            fg.merge_nodes(Node(1), Node(2));
            fg.process_coincidences(false);
            fg.validate();
            (
                fg.num_active(),
                fg.graph().target(Node(0), 0),
                fg.graph().target(Node(0), 1),
            )
        };
        assert_eq!(build(1), build(usize::MAX));
    }
}
