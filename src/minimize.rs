//! Partition-refinement minimization for deterministic automata.
//!
//! States are distinguishable when they disagree on acceptance metadata or
//! when some input (together with its register commands) leads them into
//! different partitions. Nondistinguishable states collapse onto one
//! representative and arcs are redirected.

use hashbrown::{HashMap, HashSet};

use crate::builder::FstBuilder;
use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::registers::TagMapCommand;
use crate::state::{AcceptInfo, Input, State};
use crate::{FstError, StateId};

/// Acceptance signature: accepting states are distinguishable unless their
/// finishers and accept infos agree.
type AcceptKey<C> = Option<(Vec<TagMapCommand>, Vec<AcceptInfo<C>>)>;

/// Refinement key for predecessor grouping: the state's acceptance
/// signature plus the commands and input of the arc under consideration.
type GroupKey<C> = (AcceptKey<C>, Vec<TagMapCommand>, Input<C>);

fn accept_key<C: Constraint>(state: &State<C>) -> AcceptKey<C> {
    if state.is_accepting() {
        Some((state.finishers().to_vec(), state.accept_infos().to_vec()))
    } else {
        None
    }
}

fn resolve(redirect: &HashMap<StateId, StateId>, mut state: StateId) -> StateId {
    while let Some(&next) = redirect.get(&state) {
        state = next;
    }
    state
}

impl<C: Constraint> Fst<C> {
    /// The minimal automaton recognizing the same language with the same
    /// tags and outputs. Requires a deterministic operand.
    pub fn minimize(&self) -> Result<Fst<C>, FstError> {
        if !self.deterministic {
            return Err(FstError::NotDeterministic);
        }

        let mut accepting: HashSet<StateId> = HashSet::new();
        let mut nonaccepting: HashSet<StateId> = HashSet::new();
        for state in &self.states {
            if state.is_accepting() {
                accepting.insert(state.index());
            } else {
                nonaccepting.insert(state.index());
            }
        }

        let mut partitions: Vec<HashSet<StateId>> = vec![nonaccepting];
        let mut waiting: Vec<HashSet<StateId>> = Vec::new();
        let mut accepting_groups: Vec<(AcceptKey<C>, HashSet<StateId>)> = Vec::new();
        for &id in &accepting {
            let key = accept_key(self.state(id));
            match accepting_groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, set)) => {
                    set.insert(id);
                }
                None => {
                    let mut set = HashSet::new();
                    set.insert(id);
                    accepting_groups.push((key, set));
                }
            }
        }
        for (_, set) in accepting_groups {
            partitions.push(set.clone());
            waiting.push(set);
        }

        while !waiting.is_empty() {
            let a = waiting.remove(0);

            // predecessors of `a`, grouped by their acceptance signature
            // and the commands and input of the arc that reaches `a`
            let mut groups: Vec<(GroupKey<C>, HashSet<StateId>)> = Vec::new();
            for state in &self.states {
                for arc in state.transitions() {
                    if !a.contains(&arc.target()) {
                        continue;
                    }
                    let key = (
                        accept_key(state),
                        arc.commands().to_vec(),
                        arc.input().clone(),
                    );
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, set)) => {
                            set.insert(state.index());
                        }
                        None => {
                            let mut set = HashSet::new();
                            set.insert(state.index());
                            groups.push((key, set));
                        }
                    }
                }
            }

            for (_, x) in groups {
                for i in (0..partitions.len()).rev() {
                    let y = partitions[i].clone();
                    let subset1: HashSet<StateId> = x.intersection(&y).copied().collect();
                    if subset1.is_empty() {
                        continue;
                    }
                    let subset2: HashSet<StateId> = y.difference(&x).copied().collect();
                    partitions[i] = subset1.clone();
                    if !subset2.is_empty() {
                        partitions.push(subset2.clone());
                    }
                    let mut found = false;
                    for slot in waiting.iter_mut() {
                        if *slot == y {
                            *slot = subset1.clone();
                            found = true;
                            break;
                        }
                    }
                    if found {
                        if !subset2.is_empty() {
                            waiting.push(subset2);
                        }
                    } else if subset1.len() <= subset2.len() {
                        waiting.push(subset1);
                    } else if !subset2.is_empty() {
                        waiting.push(subset2);
                    }
                }
            }
        }

        let mut redirect: HashMap<StateId, StateId> = HashMap::new();
        for partition in &partitions {
            if partition.len() <= 1 {
                continue;
            }
            let rep = match partition.iter().min() {
                Some(&rep) => rep,
                None => continue,
            };
            for &state in partition {
                if state != rep {
                    redirect.insert(state, rep);
                }
            }
        }

        let kept: HashSet<StateId> = if redirect.is_empty() {
            (0..self.states.len()).collect()
        } else {
            let mut kept: HashSet<StateId> = HashSet::new();
            kept.insert(self.start);
            for state in &self.states {
                for arc in state.transitions() {
                    kept.insert(resolve(&redirect, arc.target()));
                }
            }
            kept
        };
        log::debug!(
            "minimized {} states to {}",
            self.states.len(),
            kept.len()
        );

        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(self.ops.clone(), self.direction, self.filter.clone());
        builder.set_deterministic(true);
        builder.set_explicit_priorities();
        builder.set_next_tag(self.next_tag);
        builder.set_register_count(self.register_count);
        builder.copy_groups(&self.groups);
        builder.set_initializers(self.initializers.clone());
        builder.set_try_all_inputs(self.try_all_inputs);

        let mut new_ids: HashMap<StateId, StateId> = HashMap::new();
        for state in &self.states {
            if !kept.contains(&state.index()) {
                continue;
            }
            let id = if state.is_accepting() {
                builder.add_accepting_state_full(
                    state.accept_infos().to_vec(),
                    state.finishers().to_vec(),
                    state.is_lazy(),
                )
            } else {
                builder.add_state()
            };
            new_ids.insert(state.index(), id);
        }
        let start = new_ids
            .get(&self.start)
            .copied()
            .ok_or(FstError::NoStartState)?;
        builder.set_start(start);

        for state in &self.states {
            let from = match new_ids.get(&state.index()) {
                Some(&from) => from,
                None => continue,
            };
            for arc in state.transitions() {
                let target = resolve(&redirect, arc.target());
                let to = match new_ids.get(&target) {
                    Some(&to) => to,
                    None => continue,
                };
                builder.add_full(
                    from,
                    arc.input().clone(),
                    arc.outputs().to_vec(),
                    to,
                    arc.commands().to_vec(),
                    arc.priority(),
                );
            }
        }
        builder.build()
    }
}
