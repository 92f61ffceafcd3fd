//! The Stephen construction: the left-factor automaton of a single word.
//!
//! Given a presentation `P` and a word `w`, [`Stephen`] builds a deterministic, trim,
//! accessible word graph whose initial node is 0 and whose accept node is the endpoint
//! of the path labelled `w`.  A word is accepted iff it is congruent to `w` in the
//! one-sided congruence generated by `P` with `w` as a left factor; the words tracing
//! *any* path from 0 are exactly the left factors of the class of `w`.
//!
//! For [inverse presentations](crate::InversePresentation) the graph is additionally
//! closed under edge reversal (every `s --a--> t` forces `t --a? --> s`), which makes
//! it the Schützenberger graph of `w`.
//!
//! The construction terminates iff the left-factor graph is finite; use
//! [`run_for`](Stephen::run_for) when that is not known in advance.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use wordgraph::{last_node_on_path, Forest, Letter, Node, SourceGraph, Word, UNDEFINED};

use crate::{
    graph::FelschGraph, stop::StopWhen, Error, InversePresentation, Presentation, Result,
};

/// Builder of the left-factor automaton of one word.  Reuses the coset-enumeration
/// word graph and coincidence machinery, with a different control loop.
#[derive(Debug)]
pub struct Stephen {
    presentation: Presentation,
    /// `Some` iff this is the inverse-presentation flavour.
    inverses: Option<Vec<Letter>>,
    word: Word,
    graph: FelschGraph,
    finished: bool,
    accept_state: Node,
}

impl Stephen {
    pub fn new(presentation: Presentation) -> Result<Self> {
        if presentation.alphabet_size() == 0 {
            return Err(Error::InvalidAlphabet);
        }
        Ok(Stephen {
            graph: FelschGraph::new(presentation.clone()),
            presentation,
            inverses: None,
            word: Word::new(),
            finished: false,
            accept_state: UNDEFINED,
        })
    }

    /// The inverse-presentation flavour, producing Schützenberger graphs.
    pub fn new_inverse(presentation: InversePresentation) -> Result<Self> {
        let inverses = (0..presentation.presentation().alphabet_size() as Letter)
            .map(|a| presentation.inverse(a))
            .collect();
        let mut this = Self::new(presentation.presentation().clone())?;
        this.inverses = Some(inverses);
        Ok(this)
    }

    /// Sets the word whose left-factor graph to build, discarding any previous run.
    pub fn set_word(&mut self, word: Word) -> Result<&mut Self> {
        self.presentation.validate_word(&word)?;
        self.finished = false;
        self.accept_state = UNDEFINED;
        self.word = word;
        Ok(self)
    }

    pub fn word(&self) -> &Word {
        &self.word
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    /// The word graph built so far.  Only meaningful once [`finished`](Self::finished)
    /// returns `true`, at which point it is shortlex-standardised and trim.
    pub fn word_graph(&self) -> &SourceGraph {
        self.graph.graph()
    }

    pub fn spanning_tree(&mut self) -> &Forest {
        self.graph.current_spanning_tree()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Runs to completion.  Does not return if the left-factor graph is infinite; use
    /// [`run_for`](Self::run_for) if in doubt.
    pub fn run(&mut self) -> Result<()> {
        self.run_stopping(&mut StopWhen::Never)
    }

    /// Runs for at most `duration`.  An interrupted construction is not resumable: a
    /// later `run*` call rebuilds from the seed path.
    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        self.run_stopping(&mut StopWhen::Deadline(Instant::now() + duration))
    }

    pub fn run_until(&mut self, mut predicate: impl FnMut() -> bool) -> Result<()> {
        self.run_stopping(&mut StopWhen::External(&mut predicate))
    }

    /// The node accepting exactly the words congruent to `self.word()`.
    pub fn accept_state(&mut self) -> Result<Node> {
        if self.accept_state == UNDEFINED {
            self.run()?;
            self.accept_state =
                last_node_on_path(self.graph.graph(), Node::INITIAL, &self.word).0;
        }
        Ok(self.accept_state)
    }

    fn run_stopping(&mut self, stop: &mut StopWhen) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        log::info!(
            "building the left-factor graph of a word of length {}",
            self.word.len()
        );
        // Start afresh: seed the graph with the path spelling the word
        self.graph = FelschGraph::new(self.presentation.clone());
        self.accept_state = UNDEFINED;
        self.graph.complete_path(Node::INITIAL, &self.word, false);

        let mut stopped = false;
        let mut did_change = true;
        while did_change && !stopped {
            did_change = false;
            let mut current = Node::INITIAL;
            while current != self.graph.first_free() {
                if stop.fires(self.graph.num_active()) {
                    stopped = true;
                    break;
                }
                for rule in 0..self.graph.num_rules() {
                    did_change |= self.apply_rule_at(current, rule);
                    if !self.graph.arena().is_active(current) {
                        break;
                    }
                }
                if self.graph.arena().is_active(current) && self.inverses.is_some() {
                    did_change |= self.close_under_inversion_at(current);
                }
                current = if self.graph.arena().is_active(current) {
                    self.graph.next_active(current)
                } else {
                    // A merge swallowed the node being scanned: restart the pass.
                    // Recycled ids mean the survivor may sit later in the active list,
                    // so forwarding to it could skip never-scanned nodes
                    Node::INITIAL
                };
            }
        }
        if !stopped {
            self.finished = true;
            self.graph.standardize(wordgraph::Order::Shortlex);
            self.graph.erase_free_nodes();
            log::info!(
                "left-factor graph complete with {} nodes",
                self.graph.num_active()
            );
        }
        Ok(())
    }

    /// One saturation step: if either side of the rule traces fully from `current`,
    /// complete the other side up to its last edge and force the endpoints together.
    /// Edges are only ever created for a side whose partner is already fully traced.
    fn apply_rule_at(&mut self, current: Node, rule: usize) -> bool {
        let (u, v) = &self.presentation.rules()[rule];
        let (u_end, u_consumed) = last_node_on_path(self.graph.graph(), current, u);
        if u_consumed == u.len() {
            // u is fully traced; make v trace to the same endpoint
            let (c, did_def) = if v.is_empty() {
                (current, false)
            } else {
                let (did_def, c) = self.graph.complete_path(current, &v[..v.len() - 1], false);
                (c, did_def)
            };
            let v_end = if v.is_empty() {
                c
            } else {
                self.graph.graph().target(c, v[v.len() - 1])
            };
            if v_end == UNDEFINED {
                self.graph.set_edge(c, v[v.len() - 1], u_end, false);
                true
            } else if u_end != v_end {
                self.graph.merge_nodes(u_end, v_end);
                self.graph.process_coincidences(false);
                true
            } else {
                did_def
            }
        } else {
            // u is incomplete: only proceed if v is fully traced, and never for an
            // empty u (its endpoint is `current` and was handled above)
            let (v_end, v_consumed) = last_node_on_path(self.graph.graph(), current, v);
            if v_consumed < v.len() || u.is_empty() {
                return false;
            }
            let c = self
                .graph
                .complete_path(current, &u[..u.len() - 1], false)
                .1;
            let slot = self.graph.graph().target(c, u[u.len() - 1]);
            if slot == UNDEFINED {
                self.graph.set_edge(c, u[u.len() - 1], v_end, false);
            } else if slot != v_end {
                self.graph.merge_nodes(slot, v_end);
                self.graph.process_coincidences(false);
            }
            true
        }
    }

    /// For inverse presentations: every edge `s --a--> t` forces `t --a? --> s`.
    fn close_under_inversion_at(&mut self, current: Node) -> bool {
        let inverses = self.inverses.as_deref().expect("only called when inverse");
        let mut did_change = false;
        for a in 0..inverses.len() as Letter {
            let t = self.graph.graph().target(current, a);
            if t == UNDEFINED {
                continue;
            }
            let back = inverses[a as usize];
            let source = self.graph.graph().target(t, back);
            if source == UNDEFINED {
                self.graph.set_edge(t, back, current, false);
                did_change = true;
            } else if source != current {
                self.graph.merge_nodes(source, current);
                self.graph.process_coincidences(false);
                did_change = true;
            }
        }
        did_change
    }
}

/// Runs `stephen` and decides whether it accepts `word` (i.e. whether `word` is
/// congruent to `stephen.word()`).
pub fn accepts(stephen: &mut Stephen, word: &[Letter]) -> Result<bool> {
    stephen.presentation().validate_word(word)?;
    let accept = stephen.accept_state()?;
    let (end, consumed) = last_node_on_path(stephen.word_graph(), Node::INITIAL, word);
    Ok(consumed == word.len() && end == accept)
}

/// Runs `stephen` and decides whether `word` is a left factor of something congruent
/// to `stephen.word()`.
pub fn is_left_factor(stephen: &mut Stephen, word: &[Letter]) -> Result<bool> {
    stephen.presentation().validate_word(word)?;
    stephen.run()?;
    let (_, consumed) = last_node_on_path(stephen.word_graph(), Node::INITIAL, word);
    Ok(consumed == word.len())
}

/// Runs `stephen` and enumerates its left-factor language in shortlex order.  The
/// iterator is infinite whenever the graph has a cycle; bound it with
/// [`Iterator::take`] or similar.
pub fn left_factors(stephen: &mut Stephen) -> Result<ShortlexPaths<'_>> {
    stephen.run()?;
    Ok(ShortlexPaths::new(stephen.word_graph(), None))
}

/// Runs `stephen` and enumerates the accepted words in shortlex order.
pub fn words_accepted(stephen: &mut Stephen) -> Result<ShortlexPaths<'_>> {
    let accept = stephen.accept_state()?;
    Ok(ShortlexPaths::new(stephen.word_graph(), Some(accept)))
}

/// Breadth-first enumeration of the words labelling paths from node 0, optionally
/// restricted to paths ending at a single target node.
pub struct ShortlexPaths<'a> {
    graph: &'a SourceGraph,
    target: Option<Node>,
    queue: VecDeque<(Node, Word)>,
}

impl<'a> ShortlexPaths<'a> {
    fn new(graph: &'a SourceGraph, target: Option<Node>) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back((Node::INITIAL, Word::new()));
        ShortlexPaths {
            graph,
            target,
            queue,
        }
    }
}

impl Iterator for ShortlexPaths<'_> {
    type Item = Word;

    fn next(&mut self) -> Option<Word> {
        while let Some((node, word)) = self.queue.pop_front() {
            for (a, t) in self.graph.targets(node) {
                let mut next = word.clone();
                next.push(a);
                self.queue.push_back((t, next));
            }
            if self.target.map_or(true, |t| t == node) {
                return Some(word);
            }
        }
        None
    }
}
