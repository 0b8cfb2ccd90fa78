//! States, transitions and acceptance metadata.

use std::sync::Arc as SharedArc;

use smol_str::SmolStr;

use crate::annotation::Document;
use crate::constraint::Constraint;
use crate::fst::FstResult;
use crate::output::Output;
use crate::registers::TagMapCommand;
use crate::StateId;

/// Relative scheduling class for epsilon transitions; transitions are kept
/// sorted from `High` to `VeryLow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArcPriority {
    High,
    Medium,
    Low,
    VeryLow,
}

/// The guard of a transition: an optional positive constraint, negated
/// constraints carved out by determinization, and the number of input
/// annotations queued for output processing when the transition is taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Input<C> {
    guard: Option<C>,
    negated: Vec<C>,
    enqueue_count: usize,
}

impl<C: Constraint> Input<C> {
    /// A zero-width input that consumes nothing.
    pub fn epsilon() -> Input<C> {
        Input {
            guard: None,
            negated: Vec::new(),
            enqueue_count: 0,
        }
    }

    pub fn guarded(guard: C) -> Input<C> {
        Input {
            guard: Some(guard),
            negated: Vec::new(),
            enqueue_count: 1,
        }
    }

    /// A guarded input that queues the consumed annotation `enqueue_count`
    /// times, so a single rewrite can spend several output actions on it.
    pub fn with_enqueue_count(guard: C, negated: Vec<C>, enqueue_count: usize) -> Input<C> {
        Input {
            guard: Some(guard),
            negated,
            enqueue_count,
        }
    }

    pub(crate) fn new(guard: Option<C>, negated: Vec<C>, enqueue_count: usize) -> Input<C> {
        Input {
            guard,
            negated,
            enqueue_count,
        }
    }

    #[inline(always)]
    pub fn is_epsilon(&self) -> bool {
        self.guard.is_none()
    }

    pub fn guard(&self) -> Option<&C> {
        self.guard.as_ref()
    }

    pub fn negated(&self) -> &[C] {
        &self.negated
    }

    pub fn enqueue_count(&self) -> usize {
        self.enqueue_count
    }

    /// Does the annotation value pass the positive guard and fail every
    /// negated one?
    pub fn matches(&self, candidate: &C, use_defaults: bool, bindings: &mut C::Bindings) -> bool {
        let guard = match &self.guard {
            Some(guard) => guard,
            None => return false,
        };
        if !guard.matches(candidate, use_defaults, bindings) {
            return false;
        }
        let mut scratch = C::Bindings::default();
        !self
            .negated
            .iter()
            .any(|neg| neg.matches(candidate, use_defaults, &mut scratch))
    }

    /// Conservative satisfiability check for partitioned guards: the input
    /// is empty when a negated constraint subsumes the positive guard.
    pub(crate) fn is_satisfiable(&self) -> bool {
        let guard = match &self.guard {
            Some(guard) => guard,
            None => return true,
        };
        self.negated.iter().all(|neg| match guard.unify(neg) {
            Some(meet) => &meet != guard,
            None => true,
        })
    }
}

/// Acceptance metadata attached to an accepting state. Several infos can
/// pile up on one state after determinization merges rules.
pub struct AcceptInfo<C: Constraint> {
    id: Option<SmolStr>,
    priority: i32,
    acceptable: Option<AcceptPredicate<C>>,
}

pub type AcceptPredicate<C> =
    SharedArc<dyn Fn(&Document<C>, &FstResult<C>) -> bool + Send + Sync>;

impl<C: Constraint> AcceptInfo<C> {
    pub fn new(
        id: Option<SmolStr>,
        priority: i32,
        acceptable: Option<AcceptPredicate<C>>,
    ) -> AcceptInfo<C> {
        AcceptInfo {
            id,
            priority,
            acceptable,
        }
    }

    pub fn id(&self) -> Option<&SmolStr> {
        self.id.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn acceptable(&self) -> Option<&AcceptPredicate<C>> {
        self.acceptable.as_ref()
    }
}

impl<C: Constraint> Clone for AcceptInfo<C> {
    fn clone(&self) -> AcceptInfo<C> {
        AcceptInfo {
            id: self.id.clone(),
            priority: self.priority,
            acceptable: self.acceptable.clone(),
        }
    }
}

// predicate identity is irrelevant for state equivalence
impl<C: Constraint> PartialEq for AcceptInfo<C> {
    fn eq(&self, other: &AcceptInfo<C>) -> bool {
        self.id == other.id && self.priority == other.priority
    }
}

impl<C: Constraint> Eq for AcceptInfo<C> {}

impl<C: Constraint> core::hash::Hash for AcceptInfo<C> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.priority.hash(state);
    }
}

impl<C: Constraint> core::fmt::Debug for AcceptInfo<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AcceptInfo")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("acceptable", &self.acceptable.is_some())
            .finish()
    }
}

/// A transition between states.
#[derive(Debug, Clone)]
pub struct Transition<C: Constraint> {
    pub(crate) target: StateId,
    pub(crate) input: Input<C>,
    pub(crate) outputs: Vec<Output<C>>,
    pub(crate) tag: Option<usize>,
    pub(crate) commands: Vec<TagMapCommand>,
    pub(crate) priority_type: ArcPriority,
    pub(crate) priority: i32,
}

impl<C: Constraint> Transition<C> {
    pub(crate) fn new(
        target: StateId,
        input: Input<C>,
        outputs: Vec<Output<C>>,
        tag: Option<usize>,
        commands: Vec<TagMapCommand>,
        priority_type: ArcPriority,
    ) -> Transition<C> {
        Transition {
            target,
            input,
            outputs,
            tag,
            commands,
            priority_type,
            priority: -1,
        }
    }

    pub fn target(&self) -> StateId {
        self.target
    }

    pub fn input(&self) -> &Input<C> {
        &self.input
    }

    pub fn outputs(&self) -> &[Output<C>] {
        &self.outputs
    }

    pub fn tag(&self) -> Option<usize> {
        self.tag
    }

    pub fn commands(&self) -> &[TagMapCommand] {
        &self.commands
    }

    pub fn priority_type(&self) -> ArcPriority {
        self.priority_type
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// One automaton state.
#[derive(Debug, Clone)]
pub struct State<C: Constraint> {
    pub(crate) index: StateId,
    pub(crate) accepting: bool,
    pub(crate) lazy: bool,
    pub(crate) accept_infos: Vec<AcceptInfo<C>>,
    pub(crate) finishers: Vec<TagMapCommand>,
    pub(crate) transitions: Vec<Transition<C>>,
}

impl<C: Constraint> State<C> {
    pub(crate) fn new(index: StateId, accepting: bool) -> State<C> {
        State {
            index,
            accepting,
            lazy: false,
            accept_infos: Vec::new(),
            finishers: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub(crate) fn with_accept_infos(
        index: StateId,
        accept_infos: Vec<AcceptInfo<C>>,
        finishers: Vec<TagMapCommand>,
        lazy: bool,
    ) -> State<C> {
        State {
            index,
            accepting: true,
            lazy,
            accept_infos,
            finishers,
            transitions: Vec::new(),
        }
    }

    pub fn index(&self) -> StateId {
        self.index
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn accept_infos(&self) -> &[AcceptInfo<C>] {
        &self.accept_infos
    }

    pub fn finishers(&self) -> &[TagMapCommand] {
        &self.finishers
    }

    pub fn transitions(&self) -> &[Transition<C>] {
        &self.transitions
    }

    /// Insert keeping the list sorted from `High` to `VeryLow`, stable for
    /// equal priority classes.
    pub(crate) fn add_transition(&mut self, transition: Transition<C>) {
        let pos = self
            .transitions
            .iter()
            .rposition(|t| t.priority_type <= transition.priority_type)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.transitions.insert(pos, transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sym;

    fn epsilon_transition(target: StateId, priority_type: ArcPriority) -> Transition<crate::test_util::SymSet> {
        Transition::new(target, Input::epsilon(), Vec::new(), None, Vec::new(), priority_type)
    }

    #[test]
    fn transitions_stay_sorted_by_priority_class() {
        let mut state: State<crate::test_util::SymSet> = State::new(0, false);
        state.add_transition(epsilon_transition(1, ArcPriority::Low));
        state.add_transition(epsilon_transition(2, ArcPriority::High));
        state.add_transition(epsilon_transition(3, ArcPriority::Medium));
        state.add_transition(epsilon_transition(4, ArcPriority::Medium));
        let order: Vec<StateId> = state.transitions().iter().map(|t| t.target()).collect();
        assert_eq!(order, vec![2, 3, 4, 1]);
    }

    #[test]
    fn negated_guards_block_matches() {
        let input = Input::new(Some(sym("ab")), vec![sym("b")], 1);
        let mut bindings = ();
        assert!(input.matches(&sym("a"), false, &mut bindings));
        assert!(!input.matches(&sym("b"), false, &mut bindings));
    }

    #[test]
    fn subsumed_guard_is_unsatisfiable() {
        let input = Input::new(Some(sym("a")), vec![sym("ab")], 1);
        assert!(!input.is_satisfiable());
        let wide = Input::new(Some(sym("ab")), vec![sym("b")], 1);
        assert!(wide.is_satisfiable());
    }
}
