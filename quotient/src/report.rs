//! Progress reporting for in-flight enumerations.
//!
//! The engines are single-threaded; all an observer gets is a callback.  Install one
//! with [`ToddCoxeter::set_reporter`](crate::ToddCoxeter::set_reporter) to receive
//! phase boundaries synchronously and, while a run is in flight, a [`Progress`]
//! snapshot roughly every 500 ms from a background ticker thread.  The snapshot is
//! assembled from relaxed atomic counters, so consecutive fields may be mutually
//! inconsistent by a few updates — fine for progress bars, not for bookkeeping.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

/// What the engine is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Hlt,
    Felsch,
    Lookahead,
    Lookbehind,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Hlt,
            2 => Phase::Felsch,
            3 => Phase::Lookahead,
            4 => Phase::Lookbehind,
            _ => Phase::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Hlt => 1,
            Phase::Felsch => 2,
            Phase::Lookahead => 3,
            Phase::Lookbehind => 4,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Hlt => "hlt",
            Phase::Felsch => "felsch",
            Phase::Lookahead => "lookahead",
            Phase::Lookbehind => "lookbehind",
        };
        write!(f, "{name}")
    }
}

/// How much of an enumeration has happened so far.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub phase: Phase,
    /// Number of currently active nodes (congruence classes found so far).
    pub active: u64,
    /// Total number of nodes ever defined.
    pub defined: u64,
    /// Total number of nodes merged away.
    pub killed: u64,
    /// Estimated heap footprint of the word graph, in bytes.
    pub graph_bytes: u64,
}

/// Update message from an in-progress enumeration.
#[derive(Debug, Clone, Copy)]
pub enum Event {
    PhaseStart(Phase),
    PhaseStop(Phase),
    Progress(Progress),
}

/// The callback installed by the caller.  Shared with the ticker thread, hence the
/// `Send + Sync` bounds.
pub type Reporter = Arc<dyn Fn(Event) + Send + Sync>;

/// Counters shared between the engine thread and the ticker thread.  All accesses are
/// `Relaxed`: the reporter tolerates jitter, and nothing synchronises through these.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    active: AtomicU64,
    defined: AtomicU64,
    killed: AtomicU64,
    graph_bytes: AtomicU64,
    phase: AtomicU8,
}

impl Counters {
    pub(crate) fn record(&self, active: u64, defined: u64, killed: u64, graph_bytes: u64) {
        self.active.store(active, Ordering::Relaxed);
        self.defined.store(defined, Ordering::Relaxed);
        self.killed.store(killed, Ordering::Relaxed);
        self.graph_bytes.store(graph_bytes, Ordering::Relaxed);
    }

    pub(crate) fn set_phase(&self, phase: Phase) -> Phase {
        Phase::from_u8(self.phase.swap(phase.as_u8(), Ordering::Relaxed))
    }

    pub(crate) fn snapshot(&self) -> Progress {
        Progress {
            phase: Phase::from_u8(self.phase.load(Ordering::Relaxed)),
            active: self.active.load(Ordering::Relaxed),
            defined: self.defined.load(Ordering::Relaxed),
            killed: self.killed.load(Ordering::Relaxed),
            graph_bytes: self.graph_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Emits [`Event::PhaseStart`] on creation and [`Event::PhaseStop`] when dropped, and
/// keeps the shared phase counter in sync.  Being a drop guard, the phase is restored
/// on every exit path.
pub(crate) struct PhaseGuard {
    counters: Arc<Counters>,
    reporter: Option<Reporter>,
    phase: Phase,
    previous: Phase,
}

impl PhaseGuard {
    pub(crate) fn enter(counters: Arc<Counters>, reporter: Option<Reporter>, phase: Phase) -> Self {
        let previous = counters.set_phase(phase);
        log::debug!("entering {phase} phase");
        if let Some(r) = &reporter {
            r(Event::PhaseStart(phase));
        }
        PhaseGuard {
            counters,
            reporter,
            phase,
            previous,
        }
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.counters.set_phase(self.previous);
        log::debug!("leaving {} phase", self.phase);
        if let Some(r) = &self.reporter {
            r(Event::PhaseStop(self.phase));
        }
    }
}

pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// A background thread which forwards a [`Progress`] snapshot to the reporter every
/// [`TICK_INTERVAL`] until dropped.
pub(crate) struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub(crate) fn spawn(reporter: Reporter, counters: Arc<Counters>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop2.load(Ordering::Relaxed) {
                std::thread::park_timeout(TICK_INTERVAL);
                if stop2.load(Ordering::Relaxed) {
                    break;
                }
                reporter(Event::Progress(counters.snapshot()));
            }
        });
        Ticker {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}
