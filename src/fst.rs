//! The compiled automaton and its match results.

use core::cmp::Ordering;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::annotation::Document;
use crate::builder::{AnnotationFilter, SharedRewriteOps};
use crate::constraint::Constraint;
use crate::output::OutputDoc;
use crate::registers::{Registers, TagMapCommand};
use crate::state::State;
use crate::traverse::Transduction;
use crate::{Direction, FstError, StateId};

/// Traversal options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Do not restart the scan past the first annotation offset.
    pub start_anchor: bool,
    /// Only accept at the end of the annotation sequence.
    pub end_anchor: bool,
    /// Collect every match instead of stopping at the first batch.
    pub all_matches: bool,
    /// Let constraints fall back to default feature values when matching.
    pub use_defaults: bool,
    /// Initial size of the traversal instance pool.
    pub pool_size: usize,
}

impl MatchOptions {
    pub const fn default() -> MatchOptions {
        MatchOptions {
            start_anchor: false,
            end_anchor: false,
            all_matches: true,
            use_defaults: false,
            pool_size: 128,
        }
    }
}

impl Default for MatchOptions {
    fn default() -> MatchOptions {
        MatchOptions::default()
    }
}

/// One successful traversal. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct FstResult<C: Constraint> {
    pub(crate) id: Option<SmolStr>,
    pub(crate) registers: Registers,
    pub(crate) output: Option<OutputDoc<C>>,
    pub(crate) bindings: C::Bindings,
    pub(crate) priority: i32,
    pub(crate) lazy: bool,
    pub(crate) next_ann: usize,
    pub(crate) priorities: Option<Vec<i32>>,
    pub(crate) order: usize,
}

impl<C: Constraint> FstResult<C> {
    /// Rule id of the accept info that produced this result.
    pub fn id(&self) -> Option<&SmolStr> {
        self.id.as_ref()
    }

    /// Register snapshot after finisher execution; feed to
    /// [`Fst::group_span`] to read capture groups.
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Rewritten document, for transducer matches.
    pub fn output(&self) -> Option<&OutputDoc<C>> {
        self.output.as_ref()
    }

    pub fn bindings(&self) -> &C::Bindings {
        &self.bindings
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Index of the first annotation after the match, in traversal order.
    pub fn next_annotation(&self) -> usize {
        self.next_ann
    }

    pub(crate) fn priorities(&self) -> Option<&[i32]> {
        self.priorities.as_deref()
    }
}

/// A compiled tagged finite-state automaton. No mutation surface; safe for
/// unsynchronized concurrent reads.
pub struct Fst<C: Constraint> {
    pub(crate) states: Vec<State<C>>,
    pub(crate) start: StateId,
    pub(crate) groups: HashMap<SmolStr, usize>,
    pub(crate) initializers: Vec<TagMapCommand>,
    pub(crate) register_count: usize,
    pub(crate) next_tag: usize,
    pub(crate) direction: Direction,
    pub(crate) deterministic: bool,
    pub(crate) ops: Option<SharedRewriteOps<C>>,
    pub(crate) filter: Option<AnnotationFilter<C>>,
    pub(crate) try_all_inputs: bool,
}

impl<C: Constraint> Fst<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        states: Vec<State<C>>,
        start: StateId,
        groups: HashMap<SmolStr, usize>,
        initializers: Vec<TagMapCommand>,
        register_count: usize,
        next_tag: usize,
        direction: Direction,
        deterministic: bool,
        ops: Option<SharedRewriteOps<C>>,
        filter: Option<AnnotationFilter<C>>,
        try_all_inputs: bool,
    ) -> Fst<C> {
        Fst {
            states,
            start,
            groups,
            initializers,
            register_count,
            next_tag,
            direction,
            deterministic,
            ops,
            filter,
            try_all_inputs,
        }
    }

    pub fn start_state(&self) -> StateId {
        self.start
    }

    pub fn state(&self, id: StateId) -> &State<C> {
        &self.states[id]
    }

    pub fn states(&self) -> &[State<C>] {
        &self.states
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn is_transducer(&self) -> bool {
        self.ops.is_some()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }

    pub fn group_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.groups.keys()
    }

    pub(crate) fn group_tag(&self, group: &str) -> Option<usize> {
        self.groups.get(group).copied()
    }

    pub(crate) fn group_name_for_tag(&self, start_tag: usize) -> Option<&SmolStr> {
        self.groups
            .iter()
            .find(|(_, &tag)| tag == start_tag)
            .map(|(name, _)| name)
    }

    /// The span captured by a group in a result's register snapshot, with
    /// edges flipped back for right-to-left automata.
    pub fn group_span(&self, group: &str, registers: &Registers) -> Option<(usize, usize)> {
        let tag = self.group_tag(group)?;
        let start = registers.cell(tag).start?;
        let end = registers.cell(tag + 1).end?;
        Some(match self.direction {
            Direction::LeftToRight => (start, end),
            Direction::RightToLeft => (end, start),
        })
    }

    /// Match without producing output. Works on acceptors and transducers.
    pub fn recognize(&self, doc: &Document<C>, options: &MatchOptions) -> Vec<FstResult<C>> {
        self.match_all::<()>(doc, options)
    }

    /// Match and rewrite. Fails with [`FstError::AcceptorOnly`] when the
    /// automaton carries no rewrite operations.
    pub fn transduce(
        &self,
        doc: &Document<C>,
        options: &MatchOptions,
    ) -> Result<Vec<FstResult<C>>, FstError> {
        if !self.is_transducer() {
            return Err(FstError::AcceptorOnly);
        }
        Ok(self.match_all::<Transduction<C>>(doc, options))
    }

    /// Result order: priority ascending, then insertion index, flipped for
    /// lazy accepting states and flipped again for nondeterministic
    /// automata; priority trails break remaining ties.
    pub(crate) fn result_compare(&self, x: &FstResult<C>, y: &FstResult<C>) -> Ordering {
        let cmp = x.priority.cmp(&y.priority);
        if cmp != Ordering::Equal {
            return cmp;
        }
        let mut cmp = x.order.cmp(&y.order);
        if x.lazy {
            cmp = cmp.reverse();
        }
        if !self.deterministic {
            cmp = cmp.reverse();
        }
        if cmp != Ordering::Equal {
            return cmp;
        }
        match (x.priorities(), y.priorities()) {
            (Some(xs), Some(ys)) => xs.cmp(ys),
            _ => Ordering::Equal,
        }
    }

    /// Drop results identical up to id, captured registers and output
    /// value, keeping the best-ordered one.
    pub(crate) fn dedup_results(&self, results: &mut Vec<FstResult<C>>) {
        let mut seen: HashSet<(Option<SmolStr>, Registers, Option<OutputDoc<C>>)> =
            HashSet::with_capacity(results.len());
        results.retain(|r| {
            seen.insert((r.id.clone(), r.registers.clone(), r.output.clone()))
        });
    }
}
