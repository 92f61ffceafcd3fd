//! Canonical renumbering of the active nodes of a word graph.
//!
//! Standardising a graph renumbers its active nodes so that the numbering agrees with
//! the order in which a chosen word ordering first spells each node from the root.
//! After standardisation the active ids are exactly `{0, .., num_active - 1}`, and the
//! spanning forest built as a side product converts classes to words in O(word length).

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use bit_vec::BitVec;

use crate::{
    forest::Forest,
    graph::SourceGraph,
    node::{Node, NodeArena, UNDEFINED},
    Letter,
};

/// The word orderings a graph can be standardised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Don't standardise.  Passing this to an engine's `standardize` is an error.
    #[default]
    None,
    /// Order words by length, then lexicographically.  Traversal: breadth-first.
    Shortlex,
    /// Order words lexicographically.  Traversal: depth-first, preferring small labels.
    Lex,
    /// Recursive-path order.  Traversal: label-major — all collapse under smaller
    /// labels is exhausted before a larger label is followed.
    Recursive,
}

impl Display for Order {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Order::None => "none",
            Order::Shortlex => "shortlex",
            Order::Lex => "lex",
            Order::Recursive => "recursive",
        };
        write!(f, "{name}")
    }
}

/// Renumbers the active nodes of `graph`/`arena` according to `order`, rebuilding
/// `forest` as the traversal's spanning tree (in the *new* numbering).
///
/// Returns `Some(perm)` (the applied permutation, `perm[old] = new`) if the numbering
/// changed, and `None` if the graph was already standardised with respect to `order`;
/// the forest is valid either way.  Every active node must be reachable from node 0.
///
/// `Order::None` is rejected by the engines before this is ever called.
pub fn standardize(
    graph: &mut SourceGraph,
    arena: &mut NodeArena,
    forest: &mut Forest,
    order: Order,
) -> Option<Vec<Node>> {
    debug_assert!(order != Order::None);
    let traversal = match order {
        Order::None => unreachable!("Order::None is rejected at the API boundary"),
        Order::Shortlex => traverse_shortlex(graph, arena),
        Order::Lex => traverse_lex(graph, arena),
        Order::Recursive => traverse_recursive(graph, arena),
    };
    debug_assert_eq!(traversal.visit_order.len(), arena.num_active());

    let num_active = traversal.visit_order.len();
    let unchanged = traversal
        .visit_order
        .iter()
        .enumerate()
        .all(|(new, old)| old.index() == new);

    if unchanged {
        forest.init(num_active);
        for (&child, &(parent, label)) in traversal
            .visit_order
            .iter()
            .zip(&traversal.tree)
            .skip(1)
        {
            forest.set(child, parent, label);
        }
        return None;
    }

    // Extend the renumbering of the actives to a bijection of all ids: inactive ids
    // fill the remaining slots in increasing order.
    let capacity = graph.num_nodes();
    let mut perm = vec![UNDEFINED; capacity];
    for (new, &old) in traversal.visit_order.iter().enumerate() {
        perm[old.index()] = Node::new(new);
    }
    let mut next = num_active;
    for slot in perm.iter_mut() {
        if *slot == UNDEFINED {
            *slot = Node::new(next);
            next += 1;
        }
    }

    forest.init(num_active);
    for (&child, &(parent, label)) in traversal.visit_order.iter().zip(&traversal.tree).skip(1) {
        forest.set(perm[child.index()], perm[parent.index()], label);
    }

    graph.permute_nodes_no_checks(&perm);
    arena.apply_permutation(&perm);
    Some(perm)
}

/// The result of a standardisation traversal: the active nodes in visit order (node 0
/// first), and for each visited node the (parent, label) it was first reached through.
struct Traversal {
    visit_order: Vec<Node>,
    /// Indexed parallel to `visit_order`; entry 0 is meaningless (the root).
    tree: Vec<(Node, Letter)>,
}

fn traverse_shortlex(graph: &SourceGraph, arena: &NodeArena) -> Traversal {
    let mut seen = BitVec::from_elem(graph.num_nodes(), false);
    seen.set(0, true);
    let mut traversal = Traversal {
        visit_order: vec![Node::INITIAL],
        tree: vec![(UNDEFINED, 0)],
    };
    let mut queue = VecDeque::new();
    queue.push_back(Node::INITIAL);
    while let Some(n) = queue.pop_front() {
        for a in 0..graph.out_degree() as Letter {
            let t = graph.target(n, a);
            if t != UNDEFINED && !seen[t.index()] {
                debug_assert!(arena.is_active(t));
                seen.set(t.index(), true);
                traversal.visit_order.push(t);
                traversal.tree.push((n, a));
                queue.push_back(t);
            }
        }
    }
    traversal
}

fn traverse_lex(graph: &SourceGraph, arena: &NodeArena) -> Traversal {
    let mut seen = BitVec::from_elem(graph.num_nodes(), false);
    seen.set(0, true);
    let mut traversal = Traversal {
        visit_order: vec![Node::INITIAL],
        tree: vec![(UNDEFINED, 0)],
    };
    // Preorder DFS; each stack entry is (node, next label to try)
    let mut stack: Vec<(Node, Letter)> = vec![(Node::INITIAL, 0)];
    loop {
        let Some(top) = stack.last_mut() else { break };
        let (n, label) = *top;
        if label as usize == graph.out_degree() {
            stack.pop();
            continue;
        }
        top.1 += 1;
        let t = graph.target(n, label);
        if t != UNDEFINED && !seen[t.index()] {
            debug_assert!(arena.is_active(t));
            seen.set(t.index(), true);
            traversal.visit_order.push(t);
            traversal.tree.push((n, label));
            stack.push((t, 0));
        }
    }
    traversal
}

fn traverse_recursive(graph: &SourceGraph, arena: &NodeArena) -> Traversal {
    let mut seen = BitVec::from_elem(graph.num_nodes(), false);
    seen.set(0, true);
    let mut traversal = Traversal {
        visit_order: vec![Node::INITIAL],
        tree: vec![(UNDEFINED, 0)],
    };
    // For each label, how far along `visit_order` the scan below has progressed.  The
    // scan is monotone: targets never become un-seen, and new nodes are only appended.
    let mut position = vec![0usize; graph.out_degree()];
    'search: loop {
        for a in 0..graph.out_degree() as Letter {
            let mut i = position[a as usize];
            while i < traversal.visit_order.len() {
                let n = traversal.visit_order[i];
                let t = graph.target(n, a);
                if t != UNDEFINED && !seen[t.index()] {
                    debug_assert!(arena.is_active(t));
                    seen.set(t.index(), true);
                    traversal.visit_order.push(t);
                    traversal.tree.push((n, a));
                    position[a as usize] = i;
                    // A new node may open fresh edges under smaller labels
                    continue 'search;
                }
                i += 1;
            }
            position[a as usize] = i;
        }
        break;
    }
    traversal
}
