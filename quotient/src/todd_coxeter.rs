//! The Todd-Coxeter engine: interleaves HLT tracing, Felsch closure, lookahead and
//! lookbehind phases over one shared word graph until the quotient action is complete.

use std::sync::Arc;
use std::time::{Duration, Instant};

use wordgraph::{
    follow_path, path_from_root, Forest, Letter, Node, Order, Presentation, SourceGraph, Word,
    UNDEFINED,
};

use crate::{
    graph::FelschGraph,
    report::{Counters, Phase, PhaseGuard, Reporter, Ticker},
    settings::{LookaheadExtent, LookaheadStyle, Settings, Strategy},
    stop::StopWhen,
    Answer, Error, Kind, Result, POSITIVE_INFINITY,
};

/// Coset enumerator for the congruence on a finitely presented monoid or semigroup
/// generated by a set of extra word pairs.
///
/// Construct one with [`new`](Self::new), optionally add generating pairs and tweak
/// settings, then drive it with [`run`](Self::run) (or its budgeted variants) and read
/// the answers off with [`number_of_classes`](Self::number_of_classes),
/// [`contains`](Self::contains), [`reduce`](Self::reduce),
/// [`index_of`](Self::index_of) and [`word_of`](Self::word_of).
pub struct ToddCoxeter {
    kind: Kind,
    /// The presentation as the caller supplied it; word validation always goes through
    /// this one.
    presentation: Presentation,
    generating_pairs: Vec<(Word, Word)>,
    graph: FelschGraph,
    /// Scoped overrides push a copy; the base settings sit at the bottom.
    settings_stack: Vec<Settings>,
    started: bool,
    finished: bool,
    from_word_graph: bool,
    stop_fired: bool,
    ticker_running: bool,
    counters: Arc<Counters>,
    reporter: Option<Reporter>,
}

impl std::fmt::Debug for ToddCoxeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToddCoxeter")
            .field("kind", &self.kind)
            .field("presentation", &self.presentation)
            .field("generating_pairs", &self.generating_pairs)
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("active", &self.graph.num_active())
            .finish_non_exhaustive()
    }
}

impl ToddCoxeter {
    /* ===== CONSTRUCTORS ===== */

    /// Creates an engine for the `kind`-sided congruence over `presentation`.
    ///
    /// **The returned engine won't start until you explicitly call
    /// [`run`](Self::run)** (or a query that runs for you).
    pub fn new(kind: Kind, presentation: Presentation) -> Result<Self> {
        if presentation.alphabet_size() == 0 && !presentation.rules().is_empty() {
            return Err(Error::InvalidAlphabet);
        }
        Ok(ToddCoxeter {
            kind,
            graph: FelschGraph::new(presentation.clone()),
            presentation,
            generating_pairs: Vec::new(),
            settings_stack: vec![Settings::default()],
            started: false,
            finished: false,
            from_word_graph: false,
            stop_fired: false,
            ticker_running: false,
            counters: Arc::new(Counters::default()),
            reporter: None,
        })
    }

    /// As [`new`](Self::new), but with the rules given as a flat list of words, pairing
    /// them up in order.  The list must have even length.
    pub fn from_flat_rules(
        kind: Kind,
        alphabet_size: usize,
        words: &[Word],
        contains_empty_word: bool,
    ) -> Result<Self> {
        if words.len() % 2 != 0 {
            return Err(Error::InvalidRule);
        }
        if alphabet_size == 0 && !words.is_empty() {
            return Err(Error::InvalidAlphabet);
        }
        let mut presentation = Presentation::new(alphabet_size);
        if contains_empty_word {
            presentation = presentation.with_empty_word();
        }
        for pair in words.chunks(2) {
            presentation.add_rule(pair[0].clone(), pair[1].clone())?;
        }
        Self::new(kind, presentation)
    }

    /// Continues an enumeration from a pre-built word graph over the presentation's
    /// alphabet, with nodes `0 .. graph.num_nodes()` all in use.
    pub fn with_word_graph(kind: Kind, presentation: Presentation, graph: SourceGraph) -> Result<Self> {
        if graph.out_degree() != presentation.alphabet_size() {
            return Err(Error::InvalidAlphabet);
        }
        let mut this = Self::new(kind, presentation.clone())?;
        this.graph = FelschGraph::from_word_graph(presentation, graph);
        this.from_word_graph = true;
        Ok(this)
    }

    /// Creates an engine presenting the quotient of `other`'s congruence: `other`'s
    /// generating pairs become rules of the new presentation.
    pub fn from_engine(kind: Kind, other: &ToddCoxeter) -> Result<Self> {
        let mut presentation = other.presentation.clone();
        presentation.add_rules_from(&other.generating_pairs);
        Self::new(kind, presentation)
    }

    /* ===== SETTINGS ===== */

    pub fn settings(&self) -> &Settings {
        self.settings_stack.last().expect("settings stack is never empty")
    }

    fn settings_top(&mut self) -> &mut Settings {
        self.settings_stack
            .last_mut()
            .expect("settings stack is never empty")
    }

    pub fn strategy(&mut self, val: Strategy) -> &mut Self {
        self.settings_top().strategy = val;
        self
    }

    pub fn save(&mut self, val: bool) -> &mut Self {
        self.settings_top().save = val;
        self
    }

    pub fn use_relations_in_extra(&mut self, val: bool) -> &mut Self {
        self.settings_top().use_relations_in_extra = val;
        self
    }

    pub fn hlt_defs(&mut self, val: usize) -> &mut Self {
        self.settings_top().hlt_defs = val;
        self
    }

    pub fn f_defs(&mut self, val: usize) -> &mut Self {
        self.settings_top().f_defs = val;
        self
    }

    pub fn def_max(&mut self, val: usize) -> &mut Self {
        self.settings_top().def_max = val;
        self
    }

    pub fn def_policy(&mut self, val: crate::DefPolicy) -> &mut Self {
        self.settings_top().def_policy = val;
        self
    }

    pub fn def_version(&mut self, val: crate::DefVersion) -> &mut Self {
        self.settings_top().def_version = val;
        self
    }

    pub fn large_collapse(&mut self, val: usize) -> &mut Self {
        self.settings_top().large_collapse = val;
        self
    }

    pub fn lookahead_style(&mut self, val: LookaheadStyle) -> &mut Self {
        self.settings_top().lookahead_style = val;
        self
    }

    pub fn lookahead_extent(&mut self, val: LookaheadExtent) -> &mut Self {
        self.settings_top().lookahead_extent = val;
        self
    }

    pub fn lookahead_next(&mut self, val: usize) -> &mut Self {
        self.settings_top().lookahead_next = val;
        self
    }

    pub fn lookahead_min(&mut self, val: usize) -> &mut Self {
        self.settings_top().lookahead_min = val;
        self
    }

    pub fn lookahead_stop_early_interval(&mut self, val: Duration) -> &mut Self {
        self.settings_top().lookahead_stop_early_interval = val;
        self
    }

    pub fn lookahead_stop_early_ratio(&mut self, val: f32) -> &mut Self {
        self.settings_top().lookahead_stop_early_ratio = val;
        self
    }

    pub fn lower_bound(&mut self, val: Option<usize>) -> &mut Self {
        self.settings_top().lower_bound = val;
        self
    }

    pub fn mem_limit(&mut self, val: usize) -> &mut Self {
        self.settings_top().mem_limit = val;
        self
    }

    /// Installs a callback receiving [`report::Event`](crate::report::Event)s: phase
    /// boundaries synchronously from the engine thread, and progress snapshots from a
    /// ticker thread while a run is in flight.
    pub fn set_reporter(&mut self, reporter: Reporter) -> &mut Self {
        self.reporter = Some(reporter);
        self
    }

    /// Runs `f` with a copy of the current settings pushed onto the stack; the copy is
    /// discarded on exit, even if `f` panics.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.settings_stack.push(self.settings().clone());
        struct Guard<'a>(&'a mut ToddCoxeter);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.settings_stack.pop();
            }
        }
        let mut guard = Guard(self);
        f(&mut *guard.0)
    }

    /* ===== MUTATING OPERATIONS BEFORE `run` ===== */

    /// Declares `u` and `v` congruent.  Fails with [`Error::AlreadyStarted`] once the
    /// enumeration has started, and validates both words before storing either.
    pub fn add_generating_pair(&mut self, u: Word, v: Word) -> Result<&mut Self> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.presentation.validate_word(&u)?;
        self.presentation.validate_word(&v)?;
        self.generating_pairs.push((u, v));
        Ok(self)
    }

    /* ===== ACCESSORS ===== */

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn generating_pairs(&self) -> &[(Word, Word)] {
        &self.generating_pairs
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// `true` iff the word graph is provably complete, i.e. every query answer is
    /// final.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// The current word graph, whatever state it is in.  No enumeration is triggered.
    pub fn current_word_graph(&self) -> &SourceGraph {
        self.graph.graph()
    }

    /// The spanning tree of the current word graph, rebuilt on demand.  No enumeration
    /// is triggered.
    pub fn current_spanning_tree(&mut self) -> &Forest {
        self.graph.current_spanning_tree()
    }

    /// Runs to completion, standardises shortlex, and returns the word graph.
    pub fn word_graph(&mut self) -> Result<&SourceGraph> {
        self.run()?;
        self.graph.standardize(Order::Shortlex);
        Ok(self.graph.graph())
    }

    /// Runs to completion, standardises shortlex, and returns the spanning tree.
    pub fn spanning_tree(&mut self) -> Result<&Forest> {
        self.run()?;
        self.graph.standardize(Order::Shortlex);
        Ok(self.graph.current_spanning_tree())
    }

    pub fn number_of_nodes_active(&self) -> usize {
        self.graph.num_active()
    }

    /// A cheap sufficient test for the congruence having infinitely many classes:
    /// a letter absent from every relation, or strictly fewer relations than letters
    /// (the abelianisation has positive rank either way).  `false` means "don't know".
    pub fn is_obviously_infinite(&self) -> bool {
        if self.finished || self.from_word_graph {
            return false;
        }
        let n = self.presentation.alphabet_size();
        if n == 0 {
            return false;
        }
        // One-sided generating pairs don't quotient the underlying monoid, so no cheap
        // conclusion is available
        if self.kind == Kind::OneSided && !self.generating_pairs.is_empty() {
            return false;
        }
        let mut used = vec![false; n];
        let mut num_relations = self.presentation.rules().len();
        for (u, v) in self.presentation.rules() {
            for &a in u.iter().chain(v) {
                used[a as usize] = true;
            }
        }
        if self.kind == Kind::TwoSided {
            num_relations += self.generating_pairs.len();
            for (u, v) in &self.generating_pairs {
                for &a in u.iter().chain(v) {
                    used[a as usize] = true;
                }
            }
        }
        used.contains(&false) || num_relations < n
    }

    /* ===== DRIVING ===== */

    /// Runs the configured strategy to completion, **blocking the current thread**.
    pub fn run(&mut self) -> Result<()> {
        self.run_stopping(&mut StopWhen::Never)
    }

    /// Runs for at most `duration`, then returns normally with the graph in a
    /// consistent (not necessarily complete) state.  A later `run*` call resumes where
    /// this one left off.
    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        self.run_stopping(&mut StopWhen::Deadline(Instant::now() + duration))
    }

    /// As [`run`](Self::run), but returning as soon as `predicate` answers `true` at a
    /// cooperative point.
    pub fn run_until(&mut self, mut predicate: impl FnMut() -> bool) -> Result<()> {
        self.run_stopping(&mut StopWhen::External(&mut predicate))
    }

    fn run_stopping(&mut self, stop: &mut StopWhen) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let strategy = self.settings().strategy;
        if !stop.is_budgeted() && self.is_obviously_infinite() {
            return Err(Error::UnboundedEnumeration);
        }
        if matches!(stop, StopWhen::External(_))
            && !matches!(
                strategy,
                Strategy::Hlt | Strategy::Felsch | Strategy::Lookahead | Strategy::Lookbehind
            )
        {
            return Err(Error::UnsupportedStrategy {
                reason: "composite strategies cannot be used with `run_until`",
            });
        }
        // A budgeted run is allowed to do nothing and come back; an unbudgeted HLT run
        // with no relators to trace would just block the caller
        if !stop.is_budgeted()
            && strategy == Strategy::Hlt
            && self.graph.presentation().rules().is_empty()
            && self.presentation.alphabet_size() > 0
            && (self.generating_pairs.is_empty() || self.kind == Kind::OneSided)
            && self.graph.num_active() == 1
        {
            return Err(Error::UnsupportedStrategy {
                reason: "the HLT strategy cannot be used with a presentation with > 0 \
                         generators and 0 rules unless a word graph was supplied at \
                         construction",
            });
        }

        // One ticker for the outermost run only; composite strategies re-enter here
        let ticker = if self.ticker_running {
            None
        } else {
            self.reporter
                .clone()
                .map(|r| Ticker::spawn(r, Arc::clone(&self.counters)))
        };
        self.ticker_running |= ticker.is_some();

        // The stop latch is per run invocation: a burst reaching its target must not
        // read as the enclosing composite having been interrupted
        let outer_fired = self.stop_fired;
        self.stop_fired = false;
        let result = self.really_run(stop);
        self.stop_fired = outer_fired;

        if ticker.is_some() {
            self.ticker_running = false;
        }
        result
    }

    fn really_run(&mut self, stop: &mut StopWhen) -> Result<()> {
        self.before_run()?;
        let strategy = self.settings().strategy;
        log::info!(
            "running {} with {} active nodes",
            strategy,
            self.graph.num_active()
        );
        match strategy {
            Strategy::Hlt => {
                let _guard = self.phase_guard(Phase::Hlt);
                self.hlt(stop)?;
            }
            Strategy::Felsch => {
                let _guard = self.phase_guard(Phase::Felsch);
                self.felsch(stop)?;
            }
            Strategy::Lookahead => self.lookahead_impl(stop, false)?,
            Strategy::Lookbehind => self.lookbehind_impl::<fn(&[Letter]) -> Word>(stop, None)?,
            Strategy::CR => self.alternating_style(stop)?,
            Strategy::ROverC => self.r_over_c_style(stop)?,
            Strategy::Cr => self.felsch_biased_style(stop)?,
            Strategy::Rc => self.hlt_biased_style(stop)?,
        }
        self.after_run(stop)
    }

    /// First-run seeding: trace the generating pairs (and, when configured, the
    /// relations) from the initial node, and fold two-sided pairs into the internal
    /// presentation as extra rules.
    fn before_run(&mut self) -> Result<()> {
        let settings = self.settings().clone();
        self.graph.apply_settings(&settings);
        if self.started {
            return Ok(());
        }
        self.started = true;

        let register = settings.save || settings.strategy == Strategy::Felsch;
        let pairs = self.generating_pairs.clone();
        for (u, v) in &pairs {
            self.graph.push_definition_hlt(Node::INITIAL, u, v, register);
            self.graph.process_coincidences(register);
        }

        if settings.use_relations_in_extra && settings.strategy == Strategy::Felsch {
            let rules = self.presentation.rules().to_vec();
            for (u, v) in &rules {
                self.graph.push_definition_hlt(Node::INITIAL, u, v, true);
                self.graph.process_coincidences(true);
            }
        }

        if self.kind == Kind::TwoSided && !pairs.is_empty() {
            let mut internal = self.presentation.clone();
            internal.add_rules_from(&pairs);
            self.graph.set_presentation(internal);
        }

        if register {
            self.graph.process_definitions();
        }
        self.record_progress();
        Ok(())
    }

    fn after_run(&mut self, stop: &mut StopWhen) -> Result<()> {
        let strategy = self.settings().strategy;
        let stopped = self.should_stop(stop);
        if strategy != Strategy::Lookahead && strategy != Strategy::Lookbehind && !stopped {
            if self.graph.any_skipped() {
                let complete = self.graph.is_complete();
                if self.settings().lower_bound != Some(self.graph.num_active()) || !complete {
                    // Skipped definitions mean unchecked edges: a full lookahead is
                    // mandatory before the graph may be called finished
                    self.scoped(|tc| {
                        tc.settings_top().lookahead_extent = LookaheadExtent::Full;
                        tc.settings_top().lookahead_style = LookaheadStyle::Hlt;
                        tc.lookahead_impl(&mut StopWhen::Never, false)
                    })?;
                    self.graph.reset_any_skipped();
                }
            }
            if !self.is_obviously_infinite() {
                // We can still be obviously infinite when running for a fixed budget,
                // in which case we are never finished
                self.finished = true;
            }
        }
        self.record_progress();
        log::info!(
            "run ended with {} active nodes (finished: {})",
            self.graph.num_active(),
            self.finished
        );
        Ok(())
    }

    /* ===== COOPERATION ===== */

    fn should_stop(&mut self, stop: &mut StopWhen) -> bool {
        if self.stop_fired {
            return true;
        }
        if stop.fires(self.graph.num_active()) {
            self.stop_fired = true;
        }
        self.stop_fired
    }

    fn check_capacity(&self) -> Result<()> {
        let limit = self.settings().mem_limit;
        if self.graph.heap_bytes() > limit {
            return Err(Error::GraphTooBig { limit_bytes: limit });
        }
        Ok(())
    }

    fn record_progress(&self) {
        let arena = self.graph.arena();
        self.counters.record(
            arena.num_active() as u64,
            arena.num_defined() as u64,
            arena.num_killed() as u64,
            self.graph.heap_bytes() as u64,
        );
    }

    fn phase_guard(&self, phase: Phase) -> PhaseGuard {
        PhaseGuard::enter(Arc::clone(&self.counters), self.reporter.clone(), phase)
    }

    /// A cursor whose node merged away restarts its sweep at the initial node.
    ///
    /// Restarting (rather than forwarding to the survivor) is what keeps the sweeps
    /// exhaustive: recycled ids mean the survivor can sit *later* in the active list
    /// than the dead cursor, and advancing from there would skip nodes that were never
    /// scanned.  Re-scanning nodes whose relators are already satisfied only walks the
    /// relator words, and every restart is paid for by at least one killed node, so the
    /// sweeps still terminate.
    fn reacquire(&mut self, cursor: Node) -> Node {
        let arena = self.graph.arena();
        if cursor != UNDEFINED && cursor.index() < arena.capacity() && arena.is_active(cursor) {
            cursor
        } else {
            Node::INITIAL
        }
    }

    /* ===== MAIN STRATEGIES ===== */

    fn hlt(&mut self, stop: &mut StopWhen) -> Result<()> {
        let save = self.settings().save;
        self.graph.cursor = self.reacquire(self.graph.cursor);
        loop {
            let cursor = self.graph.cursor;
            if cursor == self.graph.first_free() || self.should_stop(stop) {
                break;
            }
            self.check_capacity()?;
            for rule in 0..self.graph.num_rules() {
                self.graph.push_definition_hlt_for_rule(cursor, rule, save);
                if save {
                    self.graph.process_definitions();
                } else {
                    self.graph.process_coincidences(false);
                }
                if !self.graph.arena().is_active(cursor) {
                    break;
                }
            }
            if !self.graph.arena().is_active(cursor) {
                // The scanned node was merged away: restart the sweep (see `reacquire`)
                self.graph.cursor = Node::INITIAL;
                continue;
            }
            if (!save || self.graph.any_skipped())
                && self.graph.num_active() > self.settings().lookahead_next
            {
                // With save on and nothing skipped, definitions were already fully
                // processed, so a lookahead would find nothing
                self.lookahead_impl(stop, true)?;
            }
            self.graph.cursor = if self.graph.arena().is_active(cursor) {
                self.graph.next_active(cursor)
            } else {
                // The lookahead merged the scanned node away
                Node::INITIAL
            };
            self.record_progress();
        }
        Ok(())
    }

    fn felsch(&mut self, stop: &mut StopWhen) -> Result<()> {
        self.graph.process_definitions();
        self.graph.cursor = self.reacquire(self.graph.cursor);
        loop {
            let cursor = self.graph.cursor;
            if cursor == self.graph.first_free() || self.should_stop(stop) {
                break;
            }
            self.check_capacity()?;
            for a in 0..self.graph.out_degree() as Letter {
                if self.graph.graph().target(cursor, a) == UNDEFINED {
                    let d = self.graph.new_node();
                    self.graph.set_edge(cursor, a, d, true);
                    self.graph.process_definitions();
                    if !self.graph.arena().is_active(cursor) {
                        break;
                    }
                }
            }
            if !self.graph.arena().is_active(cursor) {
                self.graph.cursor = Node::INITIAL;
                continue;
            }
            self.graph.cursor = self.graph.next_active(cursor);
            self.record_progress();
        }
        Ok(())
    }

    /* ===== COMPOSITE STRATEGIES ===== */

    fn run_active_target(&mut self, target: usize) -> Result<()> {
        self.run_stopping(&mut StopWhen::ActiveAtLeast(target))
    }

    /// `CR`: alternate bounded Felsch and HLT phases until one of them completes, then
    /// close with a full HLT-style lookahead.
    fn alternating_style(&mut self, outer: &mut StopWhen) -> Result<()> {
        self.scoped(|tc| {
            let n = tc.graph.presentation().length().max(1);
            while !tc.finished {
                tc.settings_top().strategy = Strategy::Felsch;
                let target = tc.graph.num_active() + tc.settings().f_defs;
                tc.run_active_target(target)?;
                if tc.finished || tc.should_stop(outer) {
                    break;
                }
                tc.settings_top().strategy = Strategy::Hlt;
                let target = tc.graph.num_active() + tc.settings().hlt_defs / n;
                tc.run_active_target(target)?;
                if tc.should_stop(outer) {
                    break;
                }
            }
            tc.settings_top().lookahead_extent = LookaheadExtent::Full;
            tc.settings_top().lookahead_style = LookaheadStyle::Hlt;
            tc.lookahead_impl(&mut StopWhen::Never, false)
        })
    }

    /// `R/C`: HLT until the lookahead threshold, one full stop-early lookahead, then
    /// [`alternating_style`](Self::alternating_style).
    fn r_over_c_style(&mut self, outer: &mut StopWhen) -> Result<()> {
        self.scoped(|tc| {
            tc.settings_top().strategy = Strategy::Hlt;
            let target = tc.settings().lookahead_next;
            tc.run_active_target(target)?;
            tc.settings_top().lookahead_extent = LookaheadExtent::Full;
            tc.lookahead_impl(&mut StopWhen::Never, true)?;
            if tc.should_stop(outer) {
                return Ok(());
            }
            tc.alternating_style(outer)
        })
    }

    /// `Cr`: one Felsch burst, one HLT burst, then Felsch to completion and a full
    /// HLT-style lookahead.
    fn felsch_biased_style(&mut self, outer: &mut StopWhen) -> Result<()> {
        self.scoped(|tc| {
            tc.settings_top().strategy = Strategy::Felsch;
            let target = tc.graph.num_active() + tc.settings().f_defs;
            tc.run_active_target(target)?;
            tc.settings_top().strategy = Strategy::Hlt;
            let n = tc.graph.presentation().length().max(1);
            let target = tc.graph.num_active() + tc.settings().hlt_defs / n;
            tc.run_active_target(target)?;
            if tc.should_stop(outer) {
                return Ok(());
            }
            tc.settings_top().strategy = Strategy::Felsch;
            tc.run_stopping(&mut StopWhen::Never)?;
            tc.settings_top().lookahead_extent = LookaheadExtent::Full;
            tc.settings_top().lookahead_style = LookaheadStyle::Hlt;
            tc.lookahead_impl(&mut StopWhen::Never, false)
        })
    }

    /// `Rc`: one HLT burst, one Felsch burst, then HLT to completion and a full
    /// HLT-style lookahead.
    fn hlt_biased_style(&mut self, outer: &mut StopWhen) -> Result<()> {
        self.scoped(|tc| {
            tc.settings_top().strategy = Strategy::Hlt;
            let n = tc.graph.presentation().length().max(1);
            let target = tc.graph.num_active() + tc.settings().hlt_defs / n;
            tc.run_active_target(target)?;
            tc.settings_top().strategy = Strategy::Felsch;
            let target = tc.graph.num_active() + tc.settings().f_defs;
            tc.run_active_target(target)?;
            if tc.should_stop(outer) {
                return Ok(());
            }
            tc.settings_top().strategy = Strategy::Hlt;
            tc.run_stopping(&mut StopWhen::Never)?;
            tc.settings_top().lookahead_extent = LookaheadExtent::Full;
            tc.settings_top().lookahead_style = LookaheadStyle::Hlt;
            tc.lookahead_impl(&mut StopWhen::Never, false)
        })
    }

    /* ===== LOOKAHEAD ===== */

    /// Bulk relator sweep without node creation.  Collapses the graph, then adapts
    /// `lookahead_next` unless the lookahead was invoked as a strategy of its own.
    fn lookahead_impl(&mut self, stop: &mut StopWhen, should_stop_early: bool) -> Result<()> {
        if self.graph.num_active() == 1 {
            // Nothing can collapse
            return Ok(());
        }
        let _guard = self.phase_guard(Phase::Lookahead);
        let settings = self.settings().clone();
        log::info!(
            "{:?} {:?} lookahead at {} active nodes",
            settings.lookahead_extent,
            settings.lookahead_style,
            self.graph.num_active()
        );

        self.graph.lookahead_cursor = match settings.lookahead_extent {
            LookaheadExtent::Full => Node::INITIAL,
            LookaheadExtent::Partial => {
                let cursor = self.reacquire(self.graph.cursor);
                self.graph.next_active(cursor)
            }
        };

        let killed_before = self.graph.arena().num_killed();
        let mut killed_at_prev_interval = killed_before;
        let mut last_check = Instant::now();

        loop {
            let cursor = self.graph.lookahead_cursor;
            if cursor == self.graph.first_free() || self.should_stop(stop) {
                break;
            }
            match settings.lookahead_style {
                LookaheadStyle::Hlt => {
                    self.graph.make_compatible_at(cursor);
                    self.graph.process_coincidences(false);
                }
                LookaheadStyle::Felsch => {
                    self.graph.push_node_definitions(cursor);
                    self.graph.process_definitions();
                }
            }
            self.graph.lookahead_cursor = if self.graph.arena().is_active(cursor) {
                self.graph.next_active(cursor)
            } else {
                // The scanned node was merged away: restart the sweep (see `reacquire`)
                Node::INITIAL
            };
            if self.lookahead_stop_early(
                &settings,
                should_stop_early,
                &mut last_check,
                &mut killed_at_prev_interval,
            ) {
                break;
            }
            self.record_progress();
        }

        let killed_by_me = self.graph.arena().num_killed() - killed_before;
        log::info!(
            "lookahead killed {} nodes, {} remain active",
            killed_by_me,
            self.graph.num_active()
        );
        if settings.strategy != Strategy::Lookahead {
            self.lookahead_update_settings(killed_by_me);
        }
        Ok(())
    }

    /// Samples the kill rate once per configured interval; a stop-early lookahead is
    /// abandoned when an interval kills less than the configured fraction of the
    /// active nodes.
    fn lookahead_stop_early(
        &mut self,
        settings: &Settings,
        should_stop_early: bool,
        last_check: &mut Instant,
        killed_at_prev_interval: &mut usize,
    ) -> bool {
        if !should_stop_early
            || last_check.elapsed() <= settings.lookahead_stop_early_interval
        {
            return false;
        }
        let killed = self.graph.arena().num_killed();
        let killed_last_interval = killed - *killed_at_prev_interval;
        *killed_at_prev_interval = killed;
        *last_check = Instant::now();
        let expected =
            (self.graph.num_active() as f32 * settings.lookahead_stop_early_ratio) as usize;
        if killed_last_interval < expected {
            log::info!(
                "lookahead stopping early: killed {killed_last_interval} in the last \
                 interval, expected at least {expected}"
            );
            return true;
        }
        false
    }

    fn lookahead_update_settings(&mut self, killed_by_me: usize) {
        let num_nodes = self.graph.num_active();
        let settings = self.settings_top();
        let growth_factor = settings.lookahead_growth_factor;
        if (num_nodes as f32 * growth_factor) < settings.lookahead_next as f32
            || num_nodes > settings.lookahead_next
        {
            // Either the lookahead killed plenty (pull the threshold back down to a
            // multiple of what is left), or it was triggered too low to make progress
            // (push it up for the same reason)
            settings.lookahead_next = settings
                .lookahead_min
                .max((growth_factor * num_nodes as f32) as usize);
        } else if killed_by_me < (num_nodes + killed_by_me) / settings.lookahead_growth_threshold {
            // Too few kills: raise the threshold so the next lookahead is later
            settings.lookahead_next =
                (settings.lookahead_next as f32 * growth_factor) as usize;
        }
    }

    /// Runs one full lookahead pass right now, seeding the graph first if this engine
    /// has never run.
    pub fn perform_lookahead(&mut self, stop_early: bool) -> Result<()> {
        self.lookahead_single_shot(&mut StopWhen::Never, stop_early)
    }

    /// As [`perform_lookahead`](Self::perform_lookahead), but abandoning the pass once
    /// `duration` has elapsed.
    pub fn perform_lookahead_for(&mut self, duration: Duration, stop_early: bool) -> Result<()> {
        self.lookahead_single_shot(
            &mut StopWhen::Deadline(Instant::now() + duration),
            stop_early,
        )
    }

    fn lookahead_single_shot(&mut self, stop: &mut StopWhen, stop_early: bool) -> Result<()> {
        let outer_fired = self.stop_fired;
        self.stop_fired = false;
        let result = self.scoped(|tc| {
            tc.settings_top().strategy = Strategy::Lookahead;
            tc.settings_top().lookahead_extent = LookaheadExtent::Full;
            tc.before_run()?;
            tc.lookahead_impl(stop, stop_early)
        });
        self.stop_fired = outer_fired;
        result
    }

    /* ===== LOOKBEHIND ===== */

    const LOOKBEHIND_FLUSH: usize = 32_768;

    fn lookbehind_impl<F>(&mut self, stop: &mut StopWhen, mut reducer: Option<&mut F>) -> Result<()>
    where
        F: FnMut(&[Letter]) -> Word + ?Sized,
    {
        if self.kind == Kind::OneSided && !self.generating_pairs.is_empty() {
            return Err(Error::UnsupportedStrategy {
                reason: "lookbehind requires a two-sided congruence, or a one-sided one \
                         with no generating pairs",
            });
        }
        if self.graph.num_active() == 1 {
            return Ok(());
        }
        let _guard = self.phase_guard(Phase::Lookbehind);
        log::info!("lookbehind at {} active nodes", self.graph.num_active());

        self.graph.lookahead_cursor = Node::INITIAL;
        loop {
            let cursor = self.graph.lookahead_cursor;
            if cursor == self.graph.first_free() || self.should_stop(stop) {
                break;
            }
            // The spanning tree cache is refreshed lazily after each coincidence flush
            let w1 = path_from_root(self.graph.current_spanning_tree(), cursor);
            let w2 = match reducer.as_mut() {
                Some(f) => f(&w1),
                None => self.reduce_via_forest(&w1),
            };
            if w1 != w2 {
                let other = follow_path(self.graph.graph(), Node::INITIAL, &w2);
                if other != UNDEFINED && other != cursor {
                    self.graph.merge_nodes(cursor, other);
                    if self.graph.num_coincidences() > Self::LOOKBEHIND_FLUSH {
                        self.graph.process_coincidences(false);
                    }
                }
            }
            self.graph.lookahead_cursor = if self.graph.arena().is_active(cursor) {
                self.graph.next_active(cursor)
            } else {
                // A flush merged the scanned node away: restart (see `reacquire`)
                Node::INITIAL
            };
            self.record_progress();
        }
        self.graph.process_coincidences(false);
        self.record_progress();
        Ok(())
    }

    /// Runs one lookbehind pass with a caller-supplied reducer: each active node's
    /// spanning-tree spelling is rewritten by `reducer`, and any node whose rewritten
    /// spelling traces to a different node is merged with it.
    pub fn perform_lookbehind(
        &mut self,
        mut reducer: impl FnMut(&[Letter]) -> Word,
    ) -> Result<()> {
        self.lookbehind_single_shot(&mut StopWhen::Never, &mut reducer)
    }

    /// As [`perform_lookbehind`](Self::perform_lookbehind), but abandoning the pass
    /// once `duration` has elapsed.
    pub fn perform_lookbehind_for(
        &mut self,
        duration: Duration,
        mut reducer: impl FnMut(&[Letter]) -> Word,
    ) -> Result<()> {
        self.lookbehind_single_shot(
            &mut StopWhen::Deadline(Instant::now() + duration),
            &mut reducer,
        )
    }

    fn lookbehind_single_shot<F>(&mut self, stop: &mut StopWhen, reducer: &mut F) -> Result<()>
    where
        F: FnMut(&[Letter]) -> Word + ?Sized,
    {
        let outer_fired = self.stop_fired;
        self.stop_fired = false;
        let result = self.scoped(|tc| {
            tc.settings_top().strategy = Strategy::Lookbehind;
            tc.before_run()?;
            tc.lookbehind_impl(stop, Some(reducer))
        });
        self.stop_fired = outer_fired;
        result
    }

    /// The built-in reducer: trace the word, then spell the endpoint through the
    /// current spanning tree.  Words that fall off the graph reduce to themselves.
    fn reduce_via_forest(&mut self, word: &[Letter]) -> Word {
        let node = follow_path(self.graph.graph(), Node::INITIAL, word);
        if node == UNDEFINED {
            return word.to_vec();
        }
        path_from_root(self.graph.current_spanning_tree(), node)
    }

    /* ===== STANDARDISATION ===== */

    /// Renumbers the active nodes with respect to `order` and rebuilds the spanning
    /// forest.  Returns `true` iff the graph changed.  `Order::None` is an error.
    pub fn standardize(&mut self, order: Order) -> Result<bool> {
        if order == Order::None {
            return Err(Error::InvalidOrder);
        }
        Ok(self.graph.standardize(order))
    }

    pub fn is_standardized(&self, order: Order) -> bool {
        self.graph.is_standardized(order)
    }

    /// Compacts inactive nodes away.  Does nothing until [`finished`](Self::finished)
    /// returns `true` (an interim compaction would be undone by the next run anyway).
    pub fn shrink_to_fit(&mut self) {
        if !self.finished {
            return;
        }
        self.graph.standardize(Order::Shortlex);
        self.graph.erase_free_nodes();
    }

    fn ensure_standardized(&mut self) {
        if self.graph.standardization_order() == Order::None {
            self.graph.standardize(Order::Shortlex);
        }
    }

    /* ===== QUERIES ===== */

    /// Index of the class of node 0 relative to class numbering: node ids and class
    /// indices differ by one when the empty word is not an element.
    fn class_offset(&self) -> u64 {
        if self.presentation.contains_empty_word() {
            0
        } else {
            1
        }
    }

    /// Runs to completion and counts the congruence classes, or returns
    /// [`POSITIVE_INFINITY`] if the congruence is provably infinite.
    pub fn number_of_classes(&mut self) -> Result<u64> {
        if self.is_obviously_infinite() {
            return Ok(POSITIVE_INFINITY);
        }
        self.run()?;
        Ok(self.graph.num_active() as u64 - self.class_offset())
    }

    /// The class index of `word` in the current graph, without running.  `None` when
    /// the word's path is not yet fully defined.
    pub fn current_index_of(&self, word: &[Letter]) -> Result<Option<u64>> {
        self.presentation.validate_word(word)?;
        let node = follow_path(self.graph.graph(), Node::INITIAL, word);
        if node == UNDEFINED || (node.index() as u64) < self.class_offset() {
            return Ok(None);
        }
        Ok(Some(node.index() as u64 - self.class_offset()))
    }

    /// Runs to completion, standardises (shortlex, unless already standardised), and
    /// returns the index of the class of `word`.
    pub fn index_of(&mut self, word: &[Letter]) -> Result<u64> {
        self.presentation.validate_word(word)?;
        self.run()?;
        self.ensure_standardized();
        Ok(self
            .current_index_of(word)?
            .expect("a finished graph traces every valid word"))
    }

    /// The shortest spelling of class `index` in the current standardised graph,
    /// without running.
    pub fn current_word_of(&mut self, index: u64) -> Result<Word> {
        // Class indices only make sense against contiguous ids
        self.ensure_standardized();
        let node = index + self.class_offset();
        let bound = self.graph.num_active() as u64;
        if node >= bound {
            return Err(Error::IndexOutOfBounds {
                index,
                bound: bound - self.class_offset(),
            });
        }
        Ok(path_from_root(
            self.graph.current_spanning_tree(),
            Node(node as u32),
        ))
    }

    /// Runs to completion and returns the canonical (shortlex-least) spelling of class
    /// `index`.
    pub fn word_of(&mut self, index: u64) -> Result<Word> {
        self.run()?;
        self.ensure_standardized();
        self.current_word_of(index)
    }

    /// Runs to completion and produces the canonical representative of the class of
    /// `word`.
    pub fn reduce(&mut self, word: &[Letter]) -> Result<Word> {
        self.presentation.validate_word(word)?;
        self.run()?;
        self.reduce_no_run(word)
    }

    /// As [`reduce`](Self::reduce) but never enumerates: words whose path is not yet
    /// defined reduce to themselves.
    pub fn reduce_no_run(&mut self, word: &[Letter]) -> Result<Word> {
        self.presentation.validate_word(word)?;
        self.ensure_standardized();
        Ok(self.reduce_via_forest(word))
    }

    /// Runs to completion and decides whether `u` and `v` lie in the same class.
    pub fn contains(&mut self, u: &[Letter], v: &[Letter]) -> Result<bool> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        self.run()?;
        let nu = follow_path(self.graph.graph(), Node::INITIAL, u);
        let nv = follow_path(self.graph.graph(), Node::INITIAL, v);
        debug_assert!(nu != UNDEFINED && nv != UNDEFINED);
        Ok(nu == nv)
    }

    /// Three-valued containment on the current graph; never runs.  `False` can only be
    /// answered once the enumeration is finished, since unfinished nodes may yet merge.
    pub fn currently_contains(&self, u: &[Letter], v: &[Letter]) -> Result<Answer> {
        self.presentation.validate_word(u)?;
        self.presentation.validate_word(v)?;
        if u == v {
            return Ok(Answer::True);
        }
        let nu = follow_path(self.graph.graph(), Node::INITIAL, u);
        let nv = follow_path(self.graph.graph(), Node::INITIAL, v);
        if nu == UNDEFINED || nv == UNDEFINED {
            return Ok(Answer::Unknown);
        }
        if nu == nv {
            Ok(Answer::True)
        } else if self.finished {
            Ok(Answer::False)
        } else {
            Ok(Answer::Unknown)
        }
    }
}
