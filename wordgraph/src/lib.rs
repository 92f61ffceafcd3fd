//! Idiomatic Rust representations of the primitives used when computing with finitely
//! presented semigroups and monoids: words over a finite alphabet, labelled word graphs
//! with reverse-edge indices, node arenas with recycling, spanning forests and
//! standardisation orders.
//!
//! The types in this crate deliberately know nothing about coset enumeration itself;
//! they are the substrate that the `quotient` crate's engines are built on.

#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod forest;
pub mod graph;
pub mod node;
pub mod presentation;
pub mod standardize;

// Re-export useful data types into the top level of the crate
pub use forest::Forest;
pub use graph::{
    follow_path, is_complete, last_node_on_path, path_from_root, spanning_tree_no_checks,
    SourceGraph,
};
pub use node::{Node, NodeArena, UNDEFINED};
pub use presentation::{InversePresentation, Presentation, WordError};
pub use standardize::{standardize, Order};

/// A letter of a finite alphabet `{0, .., alphabet_size - 1}`.
pub type Letter = u32;

/// A word over a finite alphabet, i.e. a (possibly empty) sequence of [`Letter`]s.
pub type Word = Vec<Letter>;
