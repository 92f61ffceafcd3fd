//! Settings controlling how an enumeration is driven.
//!
//! `Settings` *won't* change which congruence is computed — any strategy that
//! terminates produces the same quotient — only how quickly and with how much memory.

use std::time::Duration;

use sysinfo::SystemExt;

/// The overall shape of the enumeration.
///
/// `R` stands for relator-driven (HLT) phases and `C` for closure-driven (Felsch)
/// phases; the composite names follow the classical literature, e.g. `Rc` is "a short
/// HLT burst, a short Felsch burst, then HLT to completion".
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Pure HLT: trace every relator from every node, creating nodes as needed.
    #[default]
    Hlt,
    /// Pure Felsch: propagate the consequences of every new edge through the relators.
    Felsch,
    /// Alternate bounded Felsch and HLT phases until one of them finishes.
    CR,
    /// HLT until the first lookahead threshold, one full lookahead, then [`CR`](Self::CR).
    ROverC,
    /// One Felsch burst, one HLT burst, then Felsch to completion.
    Cr,
    /// One HLT burst, one Felsch burst, then HLT to completion.
    Rc,
    /// A single lookahead pass over the current graph.
    Lookahead,
    /// A single lookbehind pass over the current graph (two-sided congruences only).
    Lookbehind,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::Hlt => "hlt",
            Strategy::Felsch => "felsch",
            Strategy::CR => "CR",
            Strategy::ROverC => "R/C",
            Strategy::Cr => "Cr",
            Strategy::Rc => "Rc",
            Strategy::Lookahead => "lookahead",
            Strategy::Lookbehind => "lookbehind",
        };
        write!(f, "{name}")
    }
}

/// Whether a lookahead traces relators (HLT-style) or replays definitions
/// (Felsch-style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookaheadStyle {
    #[default]
    Hlt,
    Felsch,
}

/// Whether a lookahead sweeps every active node or only those past the HLT cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookaheadExtent {
    #[default]
    Partial,
    Full,
}

/// What to do with a new definition when the definition stack is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefPolicy {
    /// Drop the new entry and remember that something was skipped.
    #[default]
    NoStackIfNoSpace,
    /// Pop dead entries off the top until an active one surfaces.
    PurgeFromTop,
    /// Drop every dead entry in the stack.
    PurgeAll,
    /// Clear the whole stack and remember that something was skipped.
    DiscardAllIfNoSpace,
    /// Never drop anything; the stack grows without bound.
    Unlimited,
}

/// Which implementation of definition processing to use.  Version two skips re-walking
/// the already-matched prefix of each relator; the two versions produce identical
/// graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefVersion {
    One,
    #[default]
    Two,
}

/// Configuration for a [`ToddCoxeter`](crate::ToddCoxeter) engine.  All fields can
/// also be set through the engine's builder-style methods.
#[derive(Debug, Clone)]
pub struct Settings {
    pub strategy: Strategy,
    /// In HLT phases, process definitions after every relator trace.
    pub save: bool,
    /// In Felsch runs, additionally trace the presentation rules at the initial node.
    pub use_relations_in_extra: bool,

    /// Target number of definitions per HLT burst in composite strategies.
    pub hlt_defs: usize,
    /// Target number of definitions per Felsch burst in composite strategies.
    pub f_defs: usize,

    pub def_max: usize,
    pub def_policy: DefPolicy,
    pub def_version: DefVersion,

    /// Queue depth at which coincidence processing switches to bulk source rebuilding.
    pub large_collapse: usize,

    pub lookahead_style: LookaheadStyle,
    pub lookahead_extent: LookaheadExtent,
    /// Number of active nodes which triggers the next lookahead.
    pub lookahead_next: usize,
    pub lookahead_min: usize,
    pub lookahead_growth_factor: f32,
    pub lookahead_growth_threshold: usize,
    pub lookahead_stop_early_interval: Duration,
    /// Abort a stop-early lookahead when an interval kills fewer than this fraction of
    /// the active nodes.
    pub lookahead_stop_early_ratio: f32,

    /// A known lower bound on the number of classes, if the caller has one.
    pub lower_bound: Option<usize>,

    /// The maximum number of bytes of heap memory the word graph may occupy.  Defaults
    /// to 80% of available memory; the enumeration aborts with
    /// [`Error::GraphTooBig`](crate::Error::GraphTooBig) instead of OOM-crashing.
    pub mem_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        // Use as a memory limit either 80% of available memory, or 5GB if availability
        // cannot be queried
        let ideal_mem_limit = if sysinfo::System::IS_SUPPORTED {
            (sysinfo::System::new_all().available_memory() as f32 * 0.8) as u64
        } else {
            5_000_000_000u64
        };
        // Never exceed what a pointer can address (minus headroom), so 32-bit targets
        // get a sane default too
        let pointer_size_limit = (usize::MAX as u64).saturating_sub(500_000_000);
        let mem_limit = ideal_mem_limit.min(pointer_size_limit) as usize;

        Settings {
            strategy: Strategy::default(),
            save: false,
            use_relations_in_extra: false,

            hlt_defs: 200_000,
            f_defs: 100_000,

            def_max: 2_000,
            def_policy: DefPolicy::default(),
            def_version: DefVersion::default(),

            large_collapse: 100_000,

            lookahead_style: LookaheadStyle::default(),
            lookahead_extent: LookaheadExtent::default(),
            lookahead_next: 5_000_000,
            lookahead_min: 10_000,
            lookahead_growth_factor: 2.0,
            lookahead_growth_threshold: 4,
            lookahead_stop_early_interval: Duration::from_secs(1),
            lookahead_stop_early_ratio: 0.01,

            lower_bound: None,

            mem_limit,
        }
    }
}
