//! Tagged finite-state acceptors and transducers over annotated sequences.
//!
//! An automaton is built with [`FstBuilder`] and compiled into an immutable
//! [`Fst`]. Arcs are guarded by opaque [`Constraint`] values rather than a
//! symbol alphabet, so the engine works over any annotation scheme that can
//! express matching, unification and negation. Capture groups are realized
//! as Laurikari-style tag registers updated by [`TagMapCommand`]s during
//! traversal.
//!
//! The compiled automaton supports recognition and transduction over a
//! [`Document`], tagged subset construction ([`Fst::determinize`] and
//! friends), partition-refinement minimization, and intersection/composition
//! product constructions.

pub mod analysis;
pub mod annotation;
pub mod builder;
pub mod constraint;
pub mod determinize;
pub mod fst;
pub mod graphviz;
pub mod minimize;
pub mod output;
pub mod product;
pub mod registers;
pub mod state;
pub mod traverse;

#[cfg(test)]
pub(crate) mod test_util;

pub use crate::annotation::{Annotation, Document, Span};
pub use crate::builder::FstBuilder;
pub use crate::constraint::Constraint;
pub use crate::fst::{Fst, FstResult, MatchOptions};
pub use crate::output::{Output, OutputDoc, RewriteOps, StandardOps};
pub use crate::registers::{CommandSrc, Registers, TagMapCommand};
pub use crate::state::{AcceptInfo, ArcPriority, Input, State, Transition};

/// State identifier inside one automaton. Stable across traversal, not
/// across optimization passes.
pub type StateId = usize;

/// Traversal direction over a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

impl Default for Direction {
    fn default() -> Self {
        Direction::LeftToRight
    }
}

/// Errors produced by automaton construction and the compiled operations.
#[derive(Debug, thiserror::Error)]
pub enum FstError {
    #[error("no start state has been set")]
    NoStartState,
    #[error("automaton is an acceptor and cannot produce output")]
    AcceptorOnly,
    #[error("operation requires a deterministic automaton")]
    NotDeterministic,
    #[error("automaton is not determinizable")]
    NotDeterminizable,
    #[error("automaton has an epsilon loop and cannot be quasideterminized")]
    EpsilonLoop,
}
