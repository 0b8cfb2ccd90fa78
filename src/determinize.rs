//! Tagged subset construction: determinization, quasideterminization and
//! epsilon removal.
//!
//! A macro-state is a set of NFA threads, each carrying the pending output
//! actions, the priority window used to collapse ambiguity, and a map from
//! tags to the register slot their last write landed in. Macro-states are
//! memoized by structural equality; revisiting an equal set with different
//! slot assignments emits compensation commands instead of a new state.

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use crate::builder::FstBuilder;
use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::output::Output;
use crate::registers::{CommandSrc, TagMapCommand};
use crate::state::{AcceptInfo, Input};
use crate::{FstError, StateId};

/// One NFA thread inside a macro-state.
#[derive(Debug, Clone)]
struct NfaThread<C: Constraint> {
    state: StateId,
    outputs: Vec<Output<C>>,
    max_priority: i32,
    last_priority: i32,
    tags: HashMap<usize, usize>,
}

impl<C: Constraint> NfaThread<C> {
    fn priority_cmp(&self, other: &NfaThread<C>) -> Ordering {
        self.max_priority
            .cmp(&other.max_priority)
            .then_with(|| self.last_priority.cmp(&other.last_priority))
    }

    fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

// Equality ignores priorities and tag slot values; two threads in the same
// state with the same pending outputs and the same set of written tags are
// the same thread for subset purposes.
impl<C: Constraint> PartialEq for NfaThread<C> {
    fn eq(&self, other: &NfaThread<C>) -> bool {
        self.state == other.state
            && self.tags.len() == other.tags.len()
            && self.tags.keys().all(|tag| other.tags.contains_key(tag))
            && self.outputs == other.outputs
    }
}

impl<C: Constraint> Eq for NfaThread<C> {}

impl<C: Constraint> Hash for NfaThread<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.outputs.hash(state);
        let key_xor = self.tags.keys().fold(0usize, |acc, &tag| acc ^ tag);
        key_xor.hash(state);
    }
}

/// A memoizable set of threads.
#[derive(Debug, Clone)]
struct SubsetState<C: Constraint> {
    threads: Vec<NfaThread<C>>,
}

impl<C: Constraint> SubsetState<C> {
    fn new(threads: Vec<NfaThread<C>>) -> SubsetState<C> {
        let mut unique: Vec<NfaThread<C>> = Vec::with_capacity(threads.len());
        for thread in threads {
            if !unique.contains(&thread) {
                unique.push(thread);
            }
        }
        SubsetState { threads: unique }
    }
}

impl<C: Constraint> PartialEq for SubsetState<C> {
    fn eq(&self, other: &SubsetState<C>) -> bool {
        self.threads.len() == other.threads.len()
            && self.threads.iter().all(|t| other.threads.contains(t))
    }
}

impl<C: Constraint> Eq for SubsetState<C> {}

impl<C: Constraint> Hash for SubsetState<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let xor = self
            .threads
            .iter()
            .fold(0u64, |acc, thread| acc ^ thread.hash_value());
        xor.hash(state);
    }
}

/// The arc a selector synthesizes between macro-states.
struct ArcSynth<C: Constraint> {
    target: SubsetState<C>,
    input: Input<C>,
    outputs: Vec<Output<C>>,
    priority: i32,
}

#[derive(Clone, Copy)]
enum ArcsSelector {
    Deterministic,
    EpsilonRemoval,
}

fn first_free_index<C: Constraint>(subset: &SubsetState<C>) -> usize {
    let mut max: isize = -1;
    for thread in &subset.threads {
        for &value in thread.tags.values() {
            max = max.max(value as isize);
        }
    }
    (max + 1) as usize
}

fn get_register_index(
    next_tag: usize,
    register_indices: &mut HashMap<(usize, usize), usize>,
    tag: usize,
    index: usize,
) -> usize {
    if index == 0 {
        return tag;
    }
    let allocated = register_indices.len();
    *register_indices
        .entry((tag, index))
        .or_insert(next_tag + allocated)
}

/// Epsilon closure with priority collapsing: an entry for the same state
/// and pending outputs is replaced only by a strictly better priority
/// window. Tag writes record `index` as their slot.
fn epsilon_closure<C: Constraint>(
    fst: &Fst<C>,
    from: Vec<NfaThread<C>>,
    index: usize,
) -> Vec<NfaThread<C>> {
    let mut closure: HashMap<(StateId, Vec<Output<C>>), NfaThread<C>> = HashMap::new();
    let mut stack: Vec<NfaThread<C>> = Vec::new();
    for thread in from {
        closure.insert((thread.state, thread.outputs.clone()), thread.clone());
        stack.push(thread);
    }

    while let Some(top) = stack.pop() {
        for transition in fst.state(top.state).transitions() {
            if !transition.input().is_epsilon() {
                continue;
            }
            let mut outputs = top.outputs.clone();
            outputs.extend(transition.outputs().iter().cloned());
            let mut thread = NfaThread {
                state: transition.target(),
                outputs,
                max_priority: transition.priority().max(top.max_priority),
                last_priority: transition.priority(),
                tags: top.tags.clone(),
            };
            let key = (thread.state, thread.outputs.clone());
            if let Some(existing) = closure.get(&key) {
                if existing.max_priority < thread.max_priority {
                    continue;
                }
                if existing.max_priority == thread.max_priority
                    && existing.last_priority <= thread.last_priority
                {
                    continue;
                }
            }
            if let Some(tag) = transition.tag() {
                thread.tags.insert(tag, index);
            }
            stack.push(thread.clone());
            closure.insert(key, thread);
        }
    }
    closure.into_values().collect()
}

/// Partition the outgoing guards of a macro-state into disjoint regions via
/// unification and negation, then synthesize one arc per region and per
/// combination of duplicate-equal threads.
fn deterministic_arcs<C: Constraint>(fst: &Fst<C>, from: &SubsetState<C>) -> Vec<ArcSynth<C>> {
    let mut conditions: Vec<(Input<C>, Vec<NfaThread<C>>)> = Vec::new();
    for thread in &from.threads {
        for transition in fst.state(thread.state).transitions() {
            if transition.input().is_epsilon() {
                continue;
            }
            let mut outputs = thread.outputs.clone();
            outputs.extend(transition.outputs().iter().cloned());
            let applied = NfaThread {
                state: transition.target(),
                outputs,
                max_priority: transition.priority().max(thread.max_priority),
                last_priority: transition.priority(),
                tags: thread.tags.clone(),
            };
            match conditions
                .iter_mut()
                .find(|(input, _)| input == transition.input())
            {
                Some((_, threads)) => threads.push(applied),
                None => conditions.push((transition.input().clone(), vec![applied])),
            }
        }
    }

    type Region<C> = (Option<C>, Vec<C>, Vec<NfaThread<C>>);
    let mut regions: Vec<Region<C>> = vec![(None, Vec::new(), Vec::new())];
    for (input, threads) in &conditions {
        let guard = match input.guard() {
            Some(guard) => guard,
            None => continue,
        };
        let mut split: Vec<Region<C>> = Vec::new();
        for (cond, negated, members) in &regions {
            let new_cond = match cond {
                None => Some(guard.clone()),
                Some(cond) => cond.unify(guard),
            };
            if let Some(new_cond) = new_cond {
                let mut joined = members.clone();
                joined.extend(threads.iter().cloned());
                split.push((Some(new_cond), negated.clone(), joined));
            }
            if !guard.is_any() {
                let mut negated = negated.clone();
                negated.push(guard.clone());
                split.push((cond.clone(), negated, members.clone()));
            }
        }
        regions = split;
    }

    let mut out: Vec<ArcSynth<C>> = Vec::new();
    for (cond, negated, members) in regions {
        let cond = match cond {
            Some(cond) => cond,
            None => continue,
        };
        let mut groups: Vec<Vec<NfaThread<C>>> = Vec::new();
        for thread in members {
            match groups.iter_mut().find(|group| group[0] == thread) {
                Some(group) => group.push(thread),
                None => groups.push(vec![thread]),
            }
        }
        if groups.is_empty() {
            continue;
        }
        let input = Input::new(Some(cond), negated, 1);
        if !input.is_satisfiable() {
            continue;
        }
        let mut chosen: Vec<NfaThread<C>> = Vec::new();
        all_arcs_for_input(fst, &input, from, &groups, 0, &mut chosen, &mut out);
    }
    out
}

/// Expand one guard region into arcs, choosing one representative from
/// every duplicate-equal thread group, closing over epsilon transitions and
/// factoring the common output prefix onto the arc itself. Threads whose
/// outputs run short of the enqueue count are padded with `Null`.
fn all_arcs_for_input<C: Constraint>(
    fst: &Fst<C>,
    input: &Input<C>,
    from: &SubsetState<C>,
    groups: &[Vec<NfaThread<C>>],
    index: usize,
    chosen: &mut Vec<NfaThread<C>>,
    out: &mut Vec<ArcSynth<C>>,
) {
    if index == groups.len() {
        let mut targets = epsilon_closure(fst, chosen.clone(), first_free_index(from));
        if targets.is_empty() {
            return;
        }
        let enqueue_count = input.enqueue_count()
            + targets
                .iter()
                .map(|t| {
                    fst.state(t.state)
                        .transitions()
                        .iter()
                        .filter(|tr| tr.input().is_epsilon())
                        .map(|tr| tr.input().enqueue_count())
                        .max()
                        .unwrap_or(0)
                })
                .sum::<usize>();

        let mut common: Vec<Output<C>> = Vec::new();
        let mut first = true;
        for thread in targets.iter_mut() {
            for i in 0..thread.outputs.len() {
                if first {
                    common.push(thread.outputs[i].clone());
                } else if i < common.len() && common[i] != thread.outputs[i] {
                    common.truncate(i);
                }
            }
            let dequeue = enqueue_count.saturating_sub(thread.outputs.len());
            for _ in 0..dequeue {
                thread.outputs.push(Output::Null);
            }
            first = false;
        }
        if !common.is_empty() {
            for thread in targets.iter_mut() {
                thread.outputs.drain(..common.len());
            }
        }

        out.push(ArcSynth {
            target: SubsetState::new(targets),
            input: Input::new(
                input.guard().cloned(),
                input.negated().to_vec(),
                enqueue_count,
            ),
            outputs: common,
            priority: 0,
        });
    } else {
        for thread in &groups[index] {
            chosen.push(thread.clone());
            all_arcs_for_input(fst, input, from, groups, index + 1, chosen, out);
            chosen.pop();
        }
    }
}

/// Epsilon removal keeps guards as they are and only closes targets over
/// epsilon transitions.
fn epsilon_removal_arcs<C: Constraint>(fst: &Fst<C>, from: &SubsetState<C>) -> Vec<ArcSynth<C>> {
    let mut out = Vec::new();
    for thread in &from.threads {
        for transition in fst.state(thread.state).transitions() {
            if transition.input().is_epsilon() {
                continue;
            }
            let seed = NfaThread {
                state: transition.target(),
                outputs: Vec::new(),
                max_priority: thread.max_priority.max(transition.priority()),
                last_priority: transition.priority(),
                tags: thread.tags.clone(),
            };
            let closure = epsilon_closure(fst, vec![seed], first_free_index(from));
            let priority = closure.iter().map(|t| t.max_priority).min().unwrap_or(0);
            out.push(ArcSynth {
                target: SubsetState::new(closure),
                input: transition.input().clone(),
                outputs: transition.outputs().to_vec(),
                priority,
            });
        }
    }
    out
}

fn is_lazy_accepting_state<C: Constraint>(fst: &Fst<C>, subset: &SubsetState<C>) -> bool {
    let best = match subset.threads.iter().min_by(|a, b| a.priority_cmp(b)) {
        Some(thread) => thread,
        None => return false,
    };
    let mut cur = best.state;
    let mut seen: HashSet<StateId> = HashSet::new();
    while !fst.state(cur).is_accepting() && seen.insert(cur) {
        let highest = fst
            .state(cur)
            .transitions()
            .iter()
            .min_by_key(|t| t.priority());
        match highest {
            Some(transition) if transition.input().is_epsilon() => cur = transition.target(),
            _ => break,
        }
    }
    if !fst.state(cur).is_accepting() {
        return false;
    }
    subset.threads.iter().any(|t| {
        fst.state(t.state)
            .transitions()
            .iter()
            .any(|tr| !tr.input().is_epsilon())
    })
}

fn create_optimized_state<C: Constraint>(
    fst: &Fst<C>,
    builder: &mut FstBuilder<C>,
    subset: &SubsetState<C>,
    register_indices: &mut HashMap<(usize, usize), usize>,
) -> StateId {
    let mut accepting_threads: Vec<&NfaThread<C>> = subset
        .threads
        .iter()
        .filter(|t| fst.state(t.state).is_accepting())
        .collect();
    accepting_threads.sort_by(|a, b| b.priority_cmp(a));
    if accepting_threads.is_empty() {
        return builder.add_state();
    }

    let accept_infos: Vec<AcceptInfo<C>> = accepting_threads
        .iter()
        .flat_map(|t| fst.state(t.state).accept_infos().iter().cloned())
        .collect();
    let lazy = is_lazy_accepting_state(fst, subset);

    let mut finishers: Vec<TagMapCommand> = Vec::new();
    let mut finished_tags: HashSet<usize> = HashSet::new();
    let mut remaining: Vec<&NfaThread<C>> = Vec::new();
    let mut accepting = false;
    for thread in &accepting_threads {
        if thread.outputs.is_empty() {
            accepting = true;
        } else {
            remaining.push(thread);
        }
        for (&tag, &value) in &thread.tags {
            if value > 0 && finished_tags.insert(tag) {
                let src = get_register_index(fst.next_tag, register_indices, tag, value);
                let dest = get_register_index(fst.next_tag, register_indices, tag, 0);
                finishers.push(TagMapCommand::copy(dest, src));
            }
        }
    }

    if accepting {
        builder.add_accepting_state_full(accept_infos, finishers, lazy)
    } else {
        let id = builder.add_state();
        // pending outputs flush over a zero-width arc into a secondary
        // accepting state, so finishers still run after them
        for thread in remaining {
            let acc = builder.add_accepting_state_full(accept_infos.clone(), finishers.clone(), lazy);
            builder.add_full(id, Input::epsilon(), thread.outputs.clone(), acc, Vec::new(), 0);
        }
        id
    }
}

/// When a structurally equal macro-state already exists but its threads
/// landed their tags in different slots, emit copy commands translating the
/// new slot assignment into the stored one.
fn reorder_tag_indices<C: Constraint>(
    fst: &Fst<C>,
    from: &SubsetState<C>,
    to: &SubsetState<C>,
    register_indices: &mut HashMap<(usize, usize), usize>,
    cmds: &mut Vec<TagMapCommand>,
) {
    let mut new_cmds: Vec<TagMapCommand> = Vec::new();
    let mut reordered_indices: HashMap<(usize, usize), usize> = HashMap::new();
    let mut reordered_priorities: HashMap<(usize, usize), (i32, i32)> = HashMap::new();

    for from_thread in &from.threads {
        for to_thread in &to.threads {
            if to_thread.state != from_thread.state {
                continue;
            }
            for (&tag, &from_value) in &from_thread.tags {
                let to_value = match to_thread.tags.get(&tag) {
                    Some(&value) => value,
                    None => continue,
                };
                let tag_index = (tag, to_value);

                if let Some(&index) = reordered_indices.get(&tag_index) {
                    let (max_priority, last_priority) = reordered_priorities[&tag_index];
                    if index != from_value
                        && max_priority <= from_thread.max_priority
                        && last_priority <= from_thread.last_priority
                    {
                        continue;
                    }
                    let src = get_register_index(fst.next_tag, register_indices, tag, index);
                    let dest = get_register_index(fst.next_tag, register_indices, tag, to_value);
                    new_cmds.retain(|cmd| {
                        !(cmd.src == CommandSrc::Register(src) && cmd.dest == dest)
                    });
                }

                if to_value != from_value {
                    let src = get_register_index(fst.next_tag, register_indices, tag, from_value);
                    let dest = get_register_index(fst.next_tag, register_indices, tag, to_value);
                    new_cmds.push(TagMapCommand::copy(dest, src));
                }

                reordered_indices.insert(tag_index, from_value);
                reordered_priorities.insert(
                    tag_index,
                    (from_thread.max_priority, from_thread.last_priority),
                );
            }
        }
    }
    cmds.extend(new_cmds);
}

#[allow(clippy::too_many_arguments)]
fn create_optimized_arc<C: Constraint>(
    fst: &Fst<C>,
    builder: &mut FstBuilder<C>,
    subset_ids: &mut HashMap<SubsetState<C>, (StateId, SubsetState<C>)>,
    queue: &mut VecDeque<(StateId, SubsetState<C>)>,
    register_indices: &mut HashMap<(usize, usize), usize>,
    cur_id: StateId,
    cur: &SubsetState<C>,
    synth: ArcSynth<C>,
) {
    let ArcSynth {
        target,
        input,
        outputs,
        priority,
    } = synth;

    let mut cmd_tags: HashMap<usize, usize> = HashMap::new();
    for thread in &target.threads {
        for (&tag, &value) in &thread.tags {
            let already_set = cur
                .threads
                .iter()
                .any(|c| c.tags.get(&tag) == Some(&value));
            if !already_set {
                cmd_tags.insert(tag, value);
            }
        }
    }

    let mut cmds: Vec<TagMapCommand> = Vec::new();
    let target_id = match subset_ids.get(&target) {
        Some((id, stored)) => {
            reorder_tag_indices(fst, &target, stored, register_indices, &mut cmds);
            *id
        }
        None => {
            let id = create_optimized_state(fst, builder, &target, register_indices);
            subset_ids.insert(target.clone(), (id, target.clone()));
            queue.push_back((id, target));
            id
        }
    };

    for (&tag, &value) in &cmd_tags {
        let reg = get_register_index(fst.next_tag, register_indices, tag, value);
        match cmds
            .iter_mut()
            .find(|cmd| cmd.src == CommandSrc::Register(reg))
        {
            Some(cmd) => cmd.src = CommandSrc::CurrentPosition,
            None => cmds.push(TagMapCommand::set_position(reg)),
        }
    }

    builder.add_full(cur_id, input, outputs, target_id, cmds, priority);
}

fn renumber_commands(
    reg_nums: &mut HashMap<usize, usize>,
    register_count: &mut usize,
    cmds: &mut Vec<TagMapCommand>,
) {
    for cmd in cmds.iter_mut() {
        if let CommandSrc::Register(src) = cmd.src {
            let renumbered = *reg_nums.entry(src).or_insert_with(|| {
                let next = *register_count;
                *register_count += 1;
                next
            });
            cmd.src = CommandSrc::Register(renumbered);
        }
        let renumbered = *reg_nums.entry(cmd.dest).or_insert_with(|| {
            let next = *register_count;
            *register_count += 1;
            next
        });
        cmd.dest = renumbered;
    }
    cmds.sort();
}

impl<C: Constraint> Fst<C> {
    fn optimize(&self, selector: ArcsSelector, deterministic: bool) -> Result<Fst<C>, FstError> {
        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(self.ops.clone(), self.direction, self.filter.clone());
        builder.set_deterministic(deterministic);
        builder.set_explicit_priorities();
        builder.set_next_tag(self.next_tag);
        builder.copy_groups(&self.groups);
        builder.set_try_all_inputs(self.try_all_inputs);

        let mut register_indices: HashMap<(usize, usize), usize> = HashMap::new();

        let start_thread = NfaThread {
            state: self.start,
            outputs: Vec::new(),
            max_priority: 0,
            last_priority: 0,
            tags: HashMap::new(),
        };
        let subset_start = SubsetState::new(epsilon_closure(self, vec![start_thread], 0));
        let start_id = create_optimized_state(self, &mut builder, &subset_start, &mut register_indices);
        builder.set_start(start_id);

        let mut cmd_tags: HashMap<usize, usize> = HashMap::new();
        for thread in &subset_start.threads {
            for (&tag, &value) in &thread.tags {
                cmd_tags.insert(tag, value);
            }
        }
        let initializers: Vec<TagMapCommand> = cmd_tags
            .iter()
            .map(|(&tag, &value)| {
                TagMapCommand::set_position(get_register_index(
                    self.next_tag,
                    &mut register_indices,
                    tag,
                    value,
                ))
            })
            .collect();
        builder.set_initializers(initializers);

        let mut subset_ids: HashMap<SubsetState<C>, (StateId, SubsetState<C>)> = HashMap::new();
        subset_ids.insert(subset_start.clone(), (start_id, subset_start.clone()));
        let mut queue: VecDeque<(StateId, SubsetState<C>)> = VecDeque::new();
        queue.push_back((start_id, subset_start));

        while let Some((cur_id, cur)) = queue.pop_front() {
            let arcs = match selector {
                ArcsSelector::Deterministic => deterministic_arcs(self, &cur),
                ArcsSelector::EpsilonRemoval => epsilon_removal_arcs(self, &cur),
            };
            log::trace!("macro-state {}: {} synthesized arcs", cur_id, arcs.len());
            for synth in arcs {
                create_optimized_arc(
                    self,
                    &mut builder,
                    &mut subset_ids,
                    &mut queue,
                    &mut register_indices,
                    cur_id,
                    &cur,
                    synth,
                );
            }
        }

        let mut reg_nums: HashMap<usize, usize> = HashMap::new();
        for i in 0..self.next_tag {
            reg_nums.insert(i, i);
        }
        let mut register_count = self.next_tag;
        for id in 0..builder.state_count() {
            let state = builder.state_mut(id);
            renumber_commands(&mut reg_nums, &mut register_count, &mut state.finishers);
            for transition in &mut state.transitions {
                renumber_commands(&mut reg_nums, &mut register_count, &mut transition.commands);
            }
        }
        builder.set_register_count(register_count);

        builder.build()
    }

    /// Tagged subset construction. The caller is responsible for checking
    /// [`Fst::is_determinizable`] first; on an automaton with ambiguous
    /// outputs the result collapses them by arc priority.
    pub fn determinize(&self) -> Result<Fst<C>, FstError> {
        self.optimize(ArcsSelector::Deterministic, true)
    }

    /// Determinize after verifying the automaton is determinizable.
    pub fn try_determinize(&self) -> Result<Fst<C>, FstError> {
        if !self.is_determinizable() {
            return Err(FstError::NotDeterminizable);
        }
        self.determinize()
    }

    /// The same construction as [`Fst::determinize`] under the weaker
    /// precondition that only epsilon loops are absent; genuinely ambiguous
    /// outputs are collapsed by priority. Overlapping guards are still
    /// partitioned into disjoint negated regions, so the resulting arc
    /// structure can be finer than a per-guard grouping would give, with
    /// the same language and outputs.
    pub fn quasideterminize(&self) -> Result<Fst<C>, FstError> {
        self.optimize(ArcsSelector::Deterministic, true)
    }

    /// Quasideterminize after verifying there is no epsilon loop.
    pub fn try_quasideterminize(&self) -> Result<Fst<C>, FstError> {
        if !self.is_quasideterminizable() {
            return Err(FstError::EpsilonLoop);
        }
        self.quasideterminize()
    }

    /// Close every guard over epsilon transitions, yielding an equivalent
    /// automaton with no epsilon arcs but possibly nondeterministic guards.
    pub fn epsilon_removal(&self) -> Result<Fst<C>, FstError> {
        self.optimize(ArcsSelector::EpsilonRemoval, false)
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::FstBuilder;
    use crate::fst::MatchOptions;
    use crate::test_util::{doc, sym, SymSet};

    fn anchored() -> MatchOptions {
        MatchOptions {
            end_anchor: true,
            ..MatchOptions::default()
        }
    }

    #[test]
    fn determinize_removes_epsilon_arcs_and_preserves_language() {
        // (a|ab) with epsilon plumbing
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_state();
        let s3 = builder.add_accepting_state();
        builder.add_epsilon(s0, s1);
        builder.add_guard(s1, sym("a"), s2);
        builder.add_epsilon(s2, s3);
        builder.add_guard(s2, sym("b"), s3);
        builder.set_start(s0);
        let nfa = builder.build().unwrap();
        assert!(!nfa.is_deterministic());

        let dfa = nfa.determinize().unwrap();
        assert!(dfa.is_deterministic());
        for state in dfa.states() {
            for transition in state.transitions() {
                assert!(!transition.input().is_epsilon());
            }
        }
        assert_eq!(dfa.recognize(&doc("a"), &anchored()).len(), 1);
        assert_eq!(dfa.recognize(&doc("ab"), &anchored()).len(), 1);
        assert!(dfa.recognize(&doc("b"), &anchored()).is_empty());
    }

    #[test]
    fn determinize_merges_accept_infos_and_orders_by_priority() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let acc1 = builder.add_accepting_state_with("first", 0, None);
        let acc2 = builder.add_accepting_state_with("second", 1, None);
        builder.add_guard(s0, sym("a"), s1);
        builder.add_epsilon(s1, acc1);
        builder.add_epsilon(s1, acc2);
        builder.set_start(s0);
        let dfa = builder.build().unwrap().determinize().unwrap();

        let results = dfa.recognize(&doc("a"), &anchored());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id().map(|s| s.as_str()), Some("first"));
        assert_eq!(results[0].priority(), 0);
        assert_eq!(results[1].id().map(|s| s.as_str()), Some("second"));
        assert_eq!(results[1].priority(), 1);
    }

    #[test]
    fn determinize_partitions_overlapping_guards() {
        // [ab] vs [b]: overlapping symbol sets must split into disjoint
        // regions so one input annotation takes exactly one arc
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let wide = builder.add_accepting_state_with("wide", 0, None);
        let narrow = builder.add_accepting_state_with("narrow", 1, None);
        builder.add_guard(s0, sym("ab"), wide);
        builder.add_guard(s0, sym("b"), narrow);
        builder.set_start(s0);
        let dfa = builder.build().unwrap().determinize().unwrap();

        // "a" satisfies only the wide guard
        let results = dfa.recognize(&doc("a"), &anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id().map(|s| s.as_str()), Some("wide"));

        // "b" satisfies both rules through a single partitioned arc
        let results = dfa.recognize(&doc("b"), &anchored());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn determinized_capture_groups_report_the_same_spans() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_state();
        let s3 = builder.add_state();
        let s4 = builder.add_accepting_state();
        builder.add_tag(s0, s1, "g", true);
        builder.add_guard(s1, sym("a"), s2);
        builder.add_guard(s2, sym("b"), s3);
        builder.add_tag(s3, s4, "g", false);
        builder.set_start(s0);
        let nfa = builder.build().unwrap();
        let dfa = nfa.determinize().unwrap();

        let results = dfa.recognize(&doc("ab"), &anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(dfa.group_span("g", results[0].registers()), Some((0, 2)));
    }

    #[test]
    fn epsilon_removal_keeps_nondeterminism_but_drops_epsilons() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_accepting_state();
        builder.add_epsilon(s0, s1);
        builder.add_guard(s1, sym("a"), s2);
        builder.add_guard(s0, sym("a"), s2);
        builder.set_start(s0);
        let fst = builder.build().unwrap().epsilon_removal().unwrap();

        assert!(!fst.is_deterministic());
        for state in fst.states() {
            for transition in state.transitions() {
                assert!(!transition.input().is_epsilon());
            }
        }
        assert_eq!(fst.recognize(&doc("a"), &anchored()).len(), 1);
    }
}
