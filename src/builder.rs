//! Mutable automaton construction. `build` compiles into the immutable
//! [`Fst`], after which no mutation surface exists.

use std::sync::Arc as SharedArc;

use hashbrown::{HashMap, HashSet};
use smol_str::SmolStr;

use crate::annotation::Annotation;
use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::output::{Output, RewriteOps};
use crate::registers::TagMapCommand;
use crate::state::{AcceptInfo, AcceptPredicate, ArcPriority, Input, State, Transition};
use crate::{Direction, FstError, StateId};

/// Predicate selecting which annotations a compiled automaton looks at.
pub type AnnotationFilter<C> = SharedArc<dyn Fn(&Annotation<C>) -> bool + Send + Sync>;

pub(crate) type SharedRewriteOps<C> = SharedArc<dyn RewriteOps<C>>;

pub struct FstBuilder<C: Constraint> {
    states: Vec<State<C>>,
    start: Option<StateId>,
    groups: HashMap<SmolStr, usize>,
    next_tag: usize,
    register_count: usize,
    direction: Direction,
    ops: Option<SharedRewriteOps<C>>,
    filter: Option<AnnotationFilter<C>>,
    try_all_inputs: bool,
    initializers: Vec<TagMapCommand>,
    deterministic: bool,
    explicit_priorities: bool,
}

impl<C: Constraint> FstBuilder<C> {
    /// An automaton that recognizes but never rewrites.
    pub fn acceptor() -> FstBuilder<C> {
        FstBuilder::with_config(None, Direction::LeftToRight, None)
    }

    /// An automaton whose arcs may carry output actions, applied through
    /// `ops`.
    pub fn transducer(ops: impl RewriteOps<C> + 'static) -> FstBuilder<C> {
        FstBuilder::with_config(Some(SharedArc::new(ops)), Direction::LeftToRight, None)
    }

    pub(crate) fn with_config(
        ops: Option<SharedRewriteOps<C>>,
        direction: Direction,
        filter: Option<AnnotationFilter<C>>,
    ) -> FstBuilder<C> {
        FstBuilder {
            states: Vec::new(),
            start: None,
            groups: HashMap::new(),
            next_tag: 0,
            register_count: 0,
            direction,
            ops,
            filter,
            try_all_inputs: false,
            initializers: Vec::new(),
            deterministic: false,
            explicit_priorities: false,
        }
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_filter(&mut self, filter: AnnotationFilter<C>) {
        self.filter = Some(filter);
    }

    /// Deterministic traversal normally commits to the first matching arc;
    /// with this set it explores every matching arc.
    pub fn set_try_all_inputs(&mut self, try_all: bool) {
        self.try_all_inputs = try_all;
    }

    pub fn is_transducer(&self) -> bool {
        self.ops.is_some()
    }

    pub fn add_state(&mut self) -> StateId {
        let index = self.states.len();
        self.states.push(State::new(index, false));
        index
    }

    pub fn add_accepting_state(&mut self) -> StateId {
        let index = self.states.len();
        self.states.push(State::new(index, true));
        index
    }

    /// An accepting state tagged with a rule id, result priority and an
    /// optional acceptance predicate evaluated on candidate results.
    pub fn add_accepting_state_with(
        &mut self,
        id: impl Into<SmolStr>,
        priority: i32,
        acceptable: Option<AcceptPredicate<C>>,
    ) -> StateId {
        let info = AcceptInfo::new(Some(id.into()), priority, acceptable);
        self.add_accepting_state_full(vec![info], Vec::new(), false)
    }

    pub(crate) fn add_accepting_state_full(
        &mut self,
        accept_infos: Vec<AcceptInfo<C>>,
        finishers: Vec<TagMapCommand>,
        lazy: bool,
    ) -> StateId {
        let index = self.states.len();
        self.states
            .push(State::with_accept_infos(index, accept_infos, finishers, lazy));
        index
    }

    pub fn set_start(&mut self, state: StateId) {
        self.start = Some(state);
    }

    pub fn set_lazy(&mut self, state: StateId, lazy: bool) {
        self.states[state].lazy = lazy;
    }

    /// The tag owned by a capture group's start or end boundary, allocating
    /// the group on first use.
    pub fn tag(&mut self, group: impl Into<SmolStr>, is_start: bool) -> usize {
        let group = group.into();
        let start_tag = match self.groups.get(&group) {
            Some(&tag) => tag,
            None => {
                let tag = self.next_tag;
                self.next_tag += 2;
                if self.register_count < self.next_tag {
                    self.register_count = self.next_tag;
                }
                self.groups.insert(group, tag);
                tag
            }
        };
        if is_start {
            start_tag
        } else {
            start_tag + 1
        }
    }

    /// Zero-width transition.
    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.add_epsilon_with_priority(from, to, ArcPriority::Medium);
    }

    pub fn add_epsilon_with_priority(&mut self, from: StateId, to: StateId, priority: ArcPriority) {
        self.states[from].add_transition(Transition::new(
            to,
            Input::epsilon(),
            Vec::new(),
            None,
            Vec::new(),
            priority,
        ));
    }

    /// Zero-width transition that records a capture-group boundary.
    pub fn add_tag(&mut self, from: StateId, to: StateId, group: impl Into<SmolStr>, is_start: bool) {
        let tag = self.tag(group, is_start);
        self.add_tag_raw(from, to, tag);
    }

    pub(crate) fn add_tag_raw(&mut self, from: StateId, to: StateId, tag: usize) {
        self.states[from].add_transition(Transition::new(
            to,
            Input::epsilon(),
            Vec::new(),
            Some(tag),
            vec![TagMapCommand::set_position(tag)],
            ArcPriority::Medium,
        ));
    }

    /// Guarded transition with no output actions.
    pub fn add_guard(&mut self, from: StateId, guard: C, to: StateId) {
        self.add_rewrite(from, Input::guarded(guard), Vec::new(), to);
    }

    /// Guarded transition carrying output actions.
    pub fn add_rewrite(&mut self, from: StateId, input: Input<C>, outputs: Vec<Output<C>>, to: StateId) {
        self.states[from].add_transition(Transition::new(
            to,
            input,
            outputs,
            None,
            Vec::new(),
            ArcPriority::Medium,
        ));
    }

    /// The fully specified internal form used by the optimization passes.
    pub(crate) fn add_full(
        &mut self,
        from: StateId,
        input: Input<C>,
        outputs: Vec<Output<C>>,
        to: StateId,
        commands: Vec<TagMapCommand>,
        priority: i32,
    ) {
        let mut transition =
            Transition::new(to, input, outputs, None, commands, ArcPriority::Medium);
        transition.priority = priority;
        self.states[from].add_transition(transition);
    }

    pub(crate) fn state(&self, id: StateId) -> &State<C> {
        &self.states[id]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut State<C> {
        &mut self.states[id]
    }

    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
    }

    pub(crate) fn set_explicit_priorities(&mut self) {
        self.explicit_priorities = true;
    }

    pub(crate) fn set_initializers(&mut self, initializers: Vec<TagMapCommand>) {
        self.initializers = initializers;
    }

    pub(crate) fn set_next_tag(&mut self, next_tag: usize) {
        self.next_tag = next_tag;
        if self.register_count < next_tag {
            self.register_count = next_tag;
        }
    }

    pub(crate) fn set_register_count(&mut self, count: usize) {
        self.register_count = count;
    }

    pub(crate) fn register_count(&self) -> usize {
        self.register_count
    }

    pub(crate) fn bump_register_count(&mut self) -> usize {
        let reg = self.register_count;
        self.register_count += 1;
        reg
    }

    pub(crate) fn copy_groups(&mut self, groups: &HashMap<SmolStr, usize>) {
        for (name, tag) in groups {
            self.groups.insert(name.clone(), *tag);
        }
    }

    pub(crate) fn ops(&self) -> Option<&SharedRewriteOps<C>> {
        self.ops.as_ref()
    }

    /// Compile. Assigns depth-first arc priorities unless an optimization
    /// pass already provided explicit ones.
    pub fn build(mut self) -> Result<Fst<C>, FstError> {
        let start = self.start.ok_or(FstError::NoStartState)?;
        if !self.explicit_priorities {
            self.mark_arc_priorities(start);
        }
        log::debug!(
            "compiled automaton: {} states, {} registers, deterministic={}",
            self.states.len(),
            self.register_count,
            self.deterministic
        );
        Ok(Fst::from_parts(
            self.states,
            start,
            self.groups,
            self.initializers,
            self.register_count,
            self.next_tag,
            self.direction,
            self.deterministic,
            self.ops,
            self.filter,
            self.try_all_inputs,
        ))
    }

    fn mark_arc_priorities(&mut self, start: StateId) {
        let mut visited: HashSet<StateId> = HashSet::new();
        let mut todo: Vec<(StateId, usize)> = (0..self.states[start].transitions.len())
            .rev()
            .map(|i| (start, i))
            .collect();
        let mut next_priority = 0;
        while let Some((state, index)) = todo.pop() {
            self.states[state].transitions[index].priority = next_priority;
            next_priority += 1;
            let target = self.states[state].transitions[index].target;
            if visited.insert(target) {
                for i in 0..self.states[target].transitions.len() {
                    todo.push((target, i));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{sym, SymSet};

    #[test]
    fn build_without_start_state_fails() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        builder.add_state();
        match builder.build() {
            Err(FstError::NoStartState) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn tags_are_allocated_in_pairs() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        assert_eq!(builder.tag("first", true), 0);
        assert_eq!(builder.tag("first", false), 1);
        assert_eq!(builder.tag("second", true), 2);
        assert_eq!(builder.tag("first", true), 0);
    }

    #[test]
    fn build_assigns_depth_first_arc_priorities() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s1);
        builder.add_guard(s0, sym("b"), s2);
        builder.add_guard(s1, sym("c"), s2);
        builder.set_start(s0);
        let fst = builder.build().unwrap();
        let priorities: Vec<i32> = fst
            .state(s0)
            .transitions()
            .iter()
            .map(|t| t.priority())
            .collect();
        assert_eq!(priorities, vec![0, 1]);
        assert_eq!(fst.state(s1).transitions()[0].priority(), 2);
    }
}
