//! An index over the relator words answering: "which relators does a new edge with a
//! given label feed into, and where?"
//!
//! The tree is a trie containing, for every relator side `w` and every position `p`,
//! the word `w[p], w[p-1], .., w[0]` — i.e. every prefix of every side, spelled
//! backwards.  The Felsch engine walks the word graph *backwards* from a freshly
//! defined edge, descending this trie one prepended letter at a time; whenever it sits
//! on a state holding `(side, pivot)` entries, the whole prefix `w[0..=pivot]` of that
//! side has been matched along the walked path (ending in the new edge), so side `side`
//! must be retraced from the current graph node.  Prefix sharing inside the trie plays
//! the role of an Aho-Corasick failure function: a walk never matches the same factor
//! twice.

use wordgraph::{Letter, Word};

const NO_STATE: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct State {
    /// One slot per letter; `NO_STATE` where no relator prefix continues.
    children: Vec<u32>,
    parent: u32,
    /// `(side, pivot)` pairs: the path to this state spells
    /// `sides[side][pivot], .., sides[side][0]`.
    matches: Vec<(usize, usize)>,
}

/// Trie over the reversed prefixes of every relator side, with a built-in cursor used
/// during the backward walks of definition processing.
#[derive(Debug, Clone)]
pub(crate) struct FelschTree {
    out_degree: usize,
    states: Vec<State>,
    /// Length of the longest indexed prefix; bounds the depth of any backward walk.
    height: usize,
    current: u32,
    depth: usize,
}

impl FelschTree {
    pub(crate) fn new(out_degree: usize, sides: &[Word]) -> Self {
        let mut tree = FelschTree {
            out_degree,
            states: vec![State {
                children: vec![NO_STATE; out_degree],
                parent: NO_STATE,
                matches: Vec::new(),
            }],
            height: 0,
            current: 0,
            depth: 0,
        };
        for (side, w) in sides.iter().enumerate() {
            for pivot in 0..w.len() {
                let mut state = 0u32;
                for &letter in w[..=pivot].iter().rev() {
                    state = tree.child_or_insert(state, letter);
                }
                tree.states[state as usize].matches.push((side, pivot));
                tree.height = tree.height.max(pivot + 1);
            }
        }
        tree
    }

    fn child_or_insert(&mut self, state: u32, letter: Letter) -> u32 {
        let existing = self.states[state as usize].children[letter as usize];
        if existing != NO_STATE {
            return existing;
        }
        let new = self.states.len() as u32;
        self.states.push(State {
            children: vec![NO_STATE; self.out_degree],
            parent: state,
            matches: Vec::new(),
        });
        self.states[state as usize].children[letter as usize] = new;
        new
    }

    /* ===== CURSOR ===== */

    /// Starts a walk on the one-letter factor `x` (the label of the new edge).
    /// Returns `false` if no relator prefix ends with `x`.
    pub(crate) fn push_back(&mut self, x: Letter) -> bool {
        let state = self.states[0].children[x as usize];
        self.current = state;
        self.depth = 1;
        state != NO_STATE
    }

    /// Extends the current factor by `b` at the front (one step backwards through the
    /// graph).  Returns `false`, leaving the cursor put, if the extended factor is not
    /// a reversed prefix.
    pub(crate) fn push_front(&mut self, b: Letter) -> bool {
        if self.depth >= self.height {
            return false;
        }
        let state = self.states[self.current as usize].children[b as usize];
        if state == NO_STATE {
            return false;
        }
        self.current = state;
        self.depth += 1;
        true
    }

    /// Undoes a successful [`push_front`](Self::push_front).
    pub(crate) fn pop_front(&mut self) {
        self.current = self.states[self.current as usize].parent;
        self.depth -= 1;
        debug_assert!(self.current != NO_STATE);
    }

    /// The number of `(side, pivot)` matches at the cursor.
    pub(crate) fn match_count(&self) -> usize {
        self.states[self.current as usize].matches.len()
    }

    pub(crate) fn match_at(&self, i: usize) -> (usize, usize) {
        self.states[self.current as usize].matches[i]
    }
}
