//! Node identifiers, and the arena which manages their lifecycle.
//!
//! Every node that ever exists is a 32-bit index into a set of flat arrays.  The
//! [`NodeArena`] threads all of them onto a single doubly linked list: the *active*
//! segment starts at node 0 and is immediately followed by the *free* segment starting at
//! [`first_free`](NodeArena::first_free).  Killing a node splices it from the active
//! segment onto the front of the free segment, and leaves a union-find "forwarding
//! address" behind so that anything still holding the dead id can recover the survivor
//! with [`find`](NodeArena::find).

use std::fmt::{Debug, Display, Formatter};

use datasize::DataSize;

/// The unique identifier of a node within a [`SourceGraph`](crate::SourceGraph).
///
/// Node 0 is always the initial node.  [`UNDEFINED`] (all bits set) is the sentinel for
/// "no such node"; it is never a valid index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, DataSize)]
pub struct Node(pub u32);

/// Sentinel denoting "no such node".
pub const UNDEFINED: Node = Node(u32::MAX);

impl Node {
    /// The initial node, which every graph contains.
    pub const INITIAL: Self = Node(0);

    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index < u32::MAX as usize);
        Node(index as u32)
    }

    /// This `Node` as a `usize`, for indexing into arrays.
    #[inline]
    pub fn index(self) -> usize {
        debug_assert!(self != UNDEFINED);
        self.0 as usize
    }

    /// `true` unless `self` is the [`UNDEFINED`] sentinel.
    #[inline]
    pub fn is_defined(self) -> bool {
        self != UNDEFINED
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == UNDEFINED {
            write!(f, "-")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Pool of node identifiers with recycling.
///
/// **Invariants**:
/// - exactly [`num_active`](Self::num_active) ids `i` satisfy `identity[i] == i`;
/// - walking `forward` from node 0 visits every active node exactly once before reaching
///   [`first_free`](Self::first_free);
/// - `forward[last_active] == first_free` and (if there are free nodes)
///   `backward[first_free] == last_active`.
#[derive(Debug, Clone, DataSize)]
pub struct NodeArena {
    /* Stats */
    active: usize,
    defined: usize,
    killed: usize,

    /* Settings */
    growth_factor: f32,

    /* Data */
    forward: Vec<Node>,
    backward: Vec<Node>,
    /// Union-find parents.  `identity[i] == i` iff node `i` is active; a freshly free
    /// node (never activated, or compacted away) holds [`UNDEFINED`] here.
    identity: Vec<Node>,
    first_free: Node,
    last_active: Node,
}

const DEFAULT_CAPACITY: usize = 2;

impl Default for NodeArena {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl NodeArena {
    /// Creates an arena with node 0 active and everything else free.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(DEFAULT_CAPACITY);
        let mut arena = NodeArena {
            active: 0,
            defined: 0,
            killed: 0,
            growth_factor: 2.0,
            forward: Vec::new(),
            backward: Vec::new(),
            identity: Vec::new(),
            first_free: UNDEFINED,
            last_active: UNDEFINED,
        };
        arena.reset(capacity);
        arena
    }

    fn reset(&mut self, capacity: usize) {
        self.forward.clear();
        self.backward.clear();
        self.identity.clear();
        for i in 0..capacity {
            self.forward.push(if i + 1 < capacity {
                Node::new(i + 1)
            } else {
                UNDEFINED
            });
            self.backward
                .push(if i == 0 { UNDEFINED } else { Node::new(i - 1) });
            self.identity.push(UNDEFINED);
        }
        self.identity[0] = Node::INITIAL;
        self.first_free = Node(1);
        self.last_active = Node::INITIAL;
        self.active = 1;
        self.defined = 1;
        self.killed = 0;
    }

    /* ===== ACCESSORS ===== */

    #[inline]
    pub fn capacity(&self) -> usize {
        self.forward.len()
    }

    /// The first node of the free segment, or [`UNDEFINED`] if every node is active.
    /// Active-node iteration stops when it reaches this id.
    #[inline]
    pub fn first_free(&self) -> Node {
        self.first_free
    }

    #[inline]
    pub fn is_valid(&self, n: Node) -> bool {
        n.is_defined() && n.index() < self.capacity()
    }

    #[inline]
    pub fn is_active(&self, n: Node) -> bool {
        debug_assert!(n == UNDEFINED || n.index() < self.identity.len());
        n.is_defined() && self.identity[n.index()] == n
    }

    /// O(1) successor of `n` in the active list.
    #[inline]
    pub fn next_active(&self, n: Node) -> Node {
        debug_assert!(self.is_active(n));
        self.forward[n.index()]
    }

    #[inline]
    pub fn num_active(&self) -> usize {
        self.active
    }

    /// Total number of nodes ever allocated (including later-killed ones).
    #[inline]
    pub fn num_defined(&self) -> usize {
        self.defined
    }

    /// Total number of nodes merged away so far.
    #[inline]
    pub fn num_killed(&self) -> usize {
        self.killed
    }

    pub fn growth_factor(&self) -> f32 {
        self.growth_factor
    }

    pub fn set_growth_factor(&mut self, val: f32) {
        assert!(val >= 1.0, "growth factor must be at least 1.0, got {val}");
        self.growth_factor = val;
    }

    /// An [`Iterator`] over the active nodes, in list order starting from node 0.
    ///
    /// The iterator is invalidated by *any* mutation of the arena; engines that mutate
    /// while walking must instead re-acquire their position with
    /// [`next_active`](Self::next_active).
    pub fn active_nodes(&self) -> impl Iterator<Item = Node> + Clone + '_ {
        let mut current = Node::INITIAL;
        std::iter::from_fn(move || {
            if current == self.first_free {
                None
            } else {
                let n = current;
                current = self.forward[n.index()];
                Some(n)
            }
        })
    }

    /* ===== MODIFIERS ===== */

    /// Takes the head of the free list and appends it to the active list, growing the
    /// arena by [`growth_factor`](Self::growth_factor) if no free node exists.
    pub fn new_active_node(&mut self) -> Node {
        if self.first_free == UNDEFINED {
            let target = (self.capacity() as f32 * self.growth_factor).ceil() as usize;
            self.grow(target.max(self.capacity() + 1));
        }
        let c = self.first_free;
        self.first_free = self.forward[c.index()];
        self.identity[c.index()] = c;
        self.last_active = c;
        self.active += 1;
        self.defined += 1;
        c
    }

    fn grow(&mut self, new_capacity: usize) {
        debug_assert!(self.first_free == UNDEFINED);
        debug_assert!(new_capacity > self.capacity());
        let old = self.capacity();
        for i in old..new_capacity {
            self.forward.push(if i + 1 < new_capacity {
                Node::new(i + 1)
            } else {
                UNDEFINED
            });
            self.backward.push(Node::new(i - 1));
            self.identity.push(UNDEFINED);
        }
        // Attach the fresh segment after the last active node
        self.forward[self.last_active.index()] = Node::new(old);
        self.backward[old] = self.last_active;
        self.first_free = Node::new(old);
    }

    /// Splices `c` out of the active list and pushes it onto the front of the free list.
    /// The caller is responsible for cleaning up any edges incident to `c`.
    pub fn free_node(&mut self, c: Node) {
        debug_assert!(self.is_active(c));
        debug_assert!(c != Node::INITIAL);
        let prev = self.backward[c.index()];
        let next = self.forward[c.index()];
        if c == self.last_active {
            self.last_active = prev;
        }
        self.forward[prev.index()] = next;
        if next != UNDEFINED {
            self.backward[next.index()] = prev;
        }
        // Re-insert `c` between the last active node and the old free head
        self.forward[c.index()] = self.first_free;
        if self.first_free != UNDEFINED {
            self.backward[self.first_free.index()] = c;
        }
        self.backward[c.index()] = self.last_active;
        self.forward[self.last_active.index()] = c;
        self.first_free = c;
        self.identity[c.index()] = UNDEFINED;
        self.active -= 1;
    }

    /// Merges `max` into `min`, leaving a permanent forwarding address so that
    /// [`find(max)`](Self::find) returns `min` (or whatever `min` is later merged into).
    pub fn union_nodes(&mut self, min: Node, max: Node) {
        debug_assert!(self.is_active(min));
        debug_assert!(self.is_active(max));
        debug_assert!(min < max);
        self.free_node(max);
        self.identity[max.index()] = min;
        self.killed += 1;
    }

    /// Union-find lookup with path halving.  Returns [`UNDEFINED`] for a node that was
    /// never activated (it has no representative to forward to).
    pub fn find(&mut self, mut c: Node) -> Node {
        debug_assert!(self.is_valid(c));
        loop {
            let d = self.identity[c.index()];
            if d == UNDEFINED || d == c {
                return d;
            }
            let e = self.identity[d.index()];
            if d == e {
                return d;
            }
            self.identity[c.index()] = e;
            c = e;
        }
    }

    /// Renumbers the active nodes according to `perm` (which must map the active node
    /// ids bijectively onto `{0, .., num_active - 1}` and every id into `0 .. capacity`),
    /// then rebuilds the lists so the active segment is exactly `0 .. num_active`.
    ///
    /// All union-find forwarding is discarded: dead ids become plain free nodes.
    pub fn apply_permutation(&mut self, perm: &[Node]) {
        debug_assert_eq!(perm.len(), self.capacity());
        debug_assert!(self
            .active_nodes()
            .all(|n| perm[n.index()].index() < self.active));
        self.compact();
    }

    /// Rebuilds the lists assuming the active ids are exactly `{0, .., num_active - 1}`.
    pub fn compact(&mut self) {
        let capacity = self.capacity();
        let active = self.active;
        for i in 0..capacity {
            self.forward[i] = if i + 1 < capacity {
                Node::new(i + 1)
            } else {
                UNDEFINED
            };
            self.backward[i] = if i == 0 { UNDEFINED } else { Node::new(i - 1) };
            self.identity[i] = if i < active { Node::new(i) } else { UNDEFINED };
        }
        self.last_active = Node::new(active - 1);
        self.first_free = if active < capacity {
            Node::new(active)
        } else {
            UNDEFINED
        };
    }

    /// Drops the free segment entirely, shrinking capacity to the active count.  Only
    /// meaningful after [`compact`](Self::compact).
    pub fn erase_free_nodes(&mut self) {
        let active = self.active;
        self.forward.truncate(active);
        self.backward.truncate(active);
        self.identity.truncate(active);
        self.forward[active - 1] = UNDEFINED;
        self.first_free = UNDEFINED;
    }

    /// Checks the list/identity invariants, panicking on violation.  Debug builds call
    /// this from the engines; it is also used directly by tests.
    pub fn validate(&self) {
        let mut seen = 0;
        let mut prev = UNDEFINED;
        let mut current = Node::INITIAL;
        while current != self.first_free {
            assert!(
                self.is_active(current),
                "inactive node {current} on the active list"
            );
            assert_eq!(self.backward[current.index()], prev);
            seen += 1;
            assert!(seen <= self.active, "active list longer than `active`");
            prev = current;
            current = self.forward[current.index()];
        }
        assert_eq!(seen, self.active);
        assert_eq!(prev, self.last_active);
        let total_active = (0..self.capacity())
            .filter(|&i| self.identity[i] == Node::new(i))
            .count();
        assert_eq!(total_active, self.active);
    }
}
