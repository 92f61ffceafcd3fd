//! Coset enumeration for finitely presented semigroups and monoids.
//!
//! The centrepiece is [`ToddCoxeter`]: given a finite presentation and (optionally)
//! extra generating pairs defining a one- or two-sided congruence, it incrementally
//! builds the finite quotient action as a labelled word graph whose nodes are the
//! congruence classes.  [`Stephen`] reuses the same graph machinery to build the
//! left-factor automaton of a single word.
//!
//! The enumeration engines are strictly single-threaded; progress can be observed from
//! another thread through the [`report`] module's callback and ticker.

#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]

mod definitions;
mod felsch_tree;
mod graph;
pub mod report;
mod settings;
pub mod stephen;
mod stop;
mod todd_coxeter;

pub use settings::{
    DefPolicy, DefVersion, LookaheadExtent, LookaheadStyle, Settings, Strategy,
};
pub use stephen::Stephen;
pub use todd_coxeter::ToddCoxeter;

// Re-export the primitives which appear in this crate's public API
pub use wordgraph::{
    Forest, InversePresentation, Letter, Node, Order, Presentation, SourceGraph, Word, WordError,
    UNDEFINED,
};

use std::fmt::{Display, Formatter};

/// Returned by [`ToddCoxeter::number_of_classes`] when the congruence provably has
/// infinitely many classes.
pub const POSITIVE_INFINITY: u64 = u64::MAX;

/// Whether a congruence is compatible with multiplication on one side or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A right congruence: generating pairs only relate the classes they name.
    OneSided,
    /// A two-sided congruence: generating pairs act as extra relations.
    TwoSided,
}

/// A three-valued answer for queries which may be undecided until an enumeration has
/// run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    True,
    False,
    Unknown,
}

/// The ways any `quotient` operation can fail.
///
/// Every fallible entry point returns or throws *before* mutating observable state, so
/// an error never leaves an engine half-updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Rules or generating pairs were supplied over an empty alphabet.
    InvalidAlphabet,
    /// A flat rule list had odd length.
    InvalidRule,
    /// A letter was outside the alphabet of the presentation.
    LetterOutOfBounds {
        letter: Letter,
        alphabet_size: usize,
    },
    /// The empty word was used with a presentation that does not contain it.
    EmptyWord,
    /// [`ToddCoxeter::add_generating_pair`] was called after the enumeration started.
    AlreadyStarted,
    /// The requested strategy cannot be used in this configuration.
    UnsupportedStrategy { reason: &'static str },
    /// `standardize` was asked for [`Order::None`].
    InvalidOrder,
    /// The congruence is obviously infinite and no time budget was given, so the
    /// enumeration would never terminate.
    UnboundedEnumeration,
    /// A class index at least the number of classes was passed to `word_of`.
    IndexOutOfBounds { index: u64, bound: u64 },
    /// The word graph outgrew the configured memory limit.
    GraphTooBig { limit_bytes: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidAlphabet => {
                write!(f, "rules and generating pairs require a non-empty alphabet")
            }
            Error::InvalidRule => write!(f, "a rule list must contain an even number of words"),
            Error::LetterOutOfBounds {
                letter,
                alphabet_size,
            } => write!(
                f,
                "letter {letter} is out of bounds for an alphabet of size {alphabet_size}"
            ),
            Error::EmptyWord => {
                write!(f, "the empty word is not an element of this presentation")
            }
            Error::AlreadyStarted => write!(
                f,
                "generating pairs cannot be added once the enumeration has started"
            ),
            Error::UnsupportedStrategy { reason } => write!(f, "{reason}"),
            Error::InvalidOrder => write!(f, "cannot standardize with respect to `Order::None`"),
            Error::UnboundedEnumeration => write!(
                f,
                "there are infinitely many classes in the congruence, so the enumeration \
                 will never terminate"
            ),
            Error::IndexOutOfBounds { index, bound } => {
                write!(f, "class index {index} is out of bounds (there are {bound} classes)")
            }
            Error::GraphTooBig { limit_bytes } => write!(
                f,
                "the word graph outgrew the configured memory limit of {limit_bytes} bytes"
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<WordError> for Error {
    fn from(e: WordError) -> Self {
        match e {
            WordError::LetterOutOfBounds {
                letter,
                alphabet_size,
            } => Error::LetterOutOfBounds {
                letter,
                alphabet_size,
            },
            WordError::EmptyWord => Error::EmptyWord,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
