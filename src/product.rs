//! Product constructions: intersection of acceptors and composition of
//! transducers. Both walk the cartesian product of the operands' states
//! breadth-first, creating product states lazily.

use std::collections::VecDeque;

use hashbrown::HashMap;

use crate::builder::FstBuilder;
use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::output::Output;
use crate::state::{AcceptInfo, ArcPriority, Input};
use crate::{FstError, StateId};

/// Re-allocate a capture tag inside the product builder, keyed by the
/// group name it belongs to in the source automaton.
fn copy_tag<C: Constraint>(src: &Fst<C>, builder: &mut FstBuilder<C>, tag: usize) -> Option<usize> {
    let is_start = tag % 2 == 0;
    let start_tag = if is_start { tag } else { tag - 1 };
    let name = src.group_name_for_tag(start_tag)?.clone();
    Some(builder.tag(name, is_start))
}

struct GuardArc<C> {
    left: StateId,
    right: StateId,
    guard: Option<C>,
    tag: Option<usize>,
    priority: ArcPriority,
}

struct RewriteArc<C> {
    left: StateId,
    right: StateId,
    input: Input<C>,
    output: Option<Output<C>>,
    tag: Option<usize>,
    priority: ArcPriority,
}

impl<C: Constraint> Fst<C> {
    /// The acceptor recognizing exactly the sequences both operands
    /// recognize. Guards of paired arcs are unified; epsilon and tag arcs
    /// of either side are interleaved. Outputs are discarded.
    pub fn intersect(&self, other: &Fst<C>) -> Result<Fst<C>, FstError> {
        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(None, self.direction, self.filter.clone());
        let start = if self.state(self.start).is_accepting() && other.state(other.start).is_accepting()
        {
            builder.add_accepting_state()
        } else {
            builder.add_state()
        };
        builder.set_start(start);

        let mut new_states: HashMap<(StateId, StateId), StateId> = HashMap::new();
        new_states.insert((self.start, other.start), start);
        let mut queue: VecDeque<(StateId, StateId)> = VecDeque::new();
        queue.push_back((self.start, other.start));

        while let Some((l, r)) = queue.pop_front() {
            let s = new_states[&(l, r)];

            let mut new_arcs: Vec<GuardArc<C>> = Vec::new();
            for arc1 in self.state(l).transitions() {
                if arc1.input().is_epsilon() {
                    let tag = arc1.tag().and_then(|t| copy_tag(self, &mut builder, t));
                    new_arcs.push(GuardArc {
                        left: arc1.target(),
                        right: r,
                        guard: None,
                        tag,
                        priority: arc1.priority_type(),
                    });
                    continue;
                }
                for arc2 in other
                    .state(r)
                    .transitions()
                    .iter()
                    .filter(|a| !a.input().is_epsilon())
                {
                    let meet = match (arc1.input().guard(), arc2.input().guard()) {
                        (Some(g1), Some(g2)) => g1.unify(g2),
                        _ => None,
                    };
                    if let Some(meet) = meet {
                        new_arcs.push(GuardArc {
                            left: arc1.target(),
                            right: arc2.target(),
                            guard: Some(meet),
                            tag: None,
                            priority: ArcPriority::Medium,
                        });
                    }
                }
            }
            for arc2 in other
                .state(r)
                .transitions()
                .iter()
                .filter(|a| a.input().is_epsilon())
            {
                let tag = arc2.tag().and_then(|t| copy_tag(other, &mut builder, t));
                new_arcs.push(GuardArc {
                    left: l,
                    right: arc2.target(),
                    guard: None,
                    tag,
                    priority: arc2.priority_type(),
                });
            }

            for arc in new_arcs {
                let target = product_state(self, other, &mut builder, &mut new_states, &mut queue, (arc.left, arc.right));
                match arc.guard {
                    Some(guard) => builder.add_guard(s, guard, target),
                    None => match arc.tag {
                        Some(tag) => builder.add_tag_raw(s, target, tag),
                        None => builder.add_epsilon_with_priority(s, target, arc.priority),
                    },
                }
            }
        }
        builder.build()
    }

    /// The transducer applying `self` and feeding its output through
    /// `other`. An arc of `self` whose output would feed nothing (no
    /// output, or a removal) passes the right operand by; otherwise its
    /// output payload must be unifiable with a right-side guard, and the
    /// two rewrites are fused.
    pub fn compose(&self, other: &Fst<C>) -> Result<Fst<C>, FstError> {
        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(self.ops.clone(), self.direction, self.filter.clone());
        let start = if self.state(self.start).is_accepting() && other.state(other.start).is_accepting()
        {
            builder.add_accepting_state()
        } else {
            builder.add_state()
        };
        builder.set_start(start);

        let mut new_states: HashMap<(StateId, StateId), StateId> = HashMap::new();
        new_states.insert((self.start, other.start), start);
        let mut queue: VecDeque<(StateId, StateId)> = VecDeque::new();
        queue.push_back((self.start, other.start));

        while let Some((l, r)) = queue.pop_front() {
            let s = new_states[&(l, r)];

            let mut new_arcs: Vec<RewriteArc<C>> = Vec::new();
            for arc1 in self.state(l).transitions() {
                let first = arc1.outputs().first();
                let forwards = matches!(first, None | Some(Output::Remove) | Some(Output::Null));
                if forwards {
                    let tag = arc1.tag().and_then(|t| copy_tag(self, &mut builder, t));
                    new_arcs.push(RewriteArc {
                        left: arc1.target(),
                        right: r,
                        input: arc1.input().clone(),
                        output: first.cloned(),
                        tag,
                        priority: arc1.priority_type(),
                    });
                    continue;
                }
                let guard = match arc1.input().guard() {
                    Some(guard) => guard,
                    None => continue,
                };
                let first = match first {
                    Some(first) => first,
                    None => continue,
                };
                // the value the right operand sees for this arc
                let compare = match first {
                    Output::PriorityUnion(value) => guard.priority_union(value),
                    _ => match first.value() {
                        Some(value) => value.clone(),
                        None => continue,
                    },
                };
                for arc2 in other
                    .state(r)
                    .transitions()
                    .iter()
                    .filter(|a| !a.input().is_epsilon())
                {
                    let matches = arc2
                        .input()
                        .guard()
                        .map(|g2| g2.is_unifiable(&compare))
                        .unwrap_or(false);
                    if !matches {
                        continue;
                    }
                    let output = match arc2.outputs().first() {
                        None => None,
                        Some(Output::PriorityUnion(value2)) => {
                            let merged = match first.value() {
                                Some(value1) => value1.priority_union(value2),
                                None => value2.clone(),
                            };
                            Some(match first {
                                Output::PriorityUnion(_) => Output::PriorityUnion(merged),
                                Output::Insert(_) => Output::Insert(merged),
                                _ => Output::Replace(merged),
                            })
                        }
                        Some(output2) => Some(output2.clone()),
                    };
                    new_arcs.push(RewriteArc {
                        left: arc1.target(),
                        right: arc2.target(),
                        input: arc1.input().clone(),
                        output,
                        tag: None,
                        priority: ArcPriority::Medium,
                    });
                }
            }
            for arc2 in other
                .state(r)
                .transitions()
                .iter()
                .filter(|a| a.input().is_epsilon())
            {
                let tag = arc2.tag().and_then(|t| copy_tag(other, &mut builder, t));
                new_arcs.push(RewriteArc {
                    left: l,
                    right: arc2.target(),
                    input: arc2.input().clone(),
                    output: arc2.outputs().first().cloned(),
                    tag,
                    priority: arc2.priority_type(),
                });
            }

            for arc in new_arcs {
                let target = product_state(self, other, &mut builder, &mut new_states, &mut queue, (arc.left, arc.right));
                if arc.input.enqueue_count() == 0 {
                    match arc.tag {
                        Some(tag) => builder.add_tag_raw(s, target, tag),
                        None => builder.add_epsilon_with_priority(s, target, arc.priority),
                    }
                } else {
                    builder.add_rewrite(s, arc.input, arc.output.into_iter().collect(), target);
                }
            }
        }
        builder.build()
    }
}

/// Look up or create the product state for a pair, queuing newly created
/// ones for expansion. Accepting iff both members accept; their accept
/// infos are concatenated.
fn product_state<C: Constraint>(
    left: &Fst<C>,
    right: &Fst<C>,
    builder: &mut FstBuilder<C>,
    new_states: &mut HashMap<(StateId, StateId), StateId>,
    queue: &mut VecDeque<(StateId, StateId)>,
    key: (StateId, StateId),
) -> StateId {
    if let Some(&id) = new_states.get(&key) {
        return id;
    }
    let (l, r) = key;
    let id = if left.state(l).is_accepting() && right.state(r).is_accepting() {
        let infos: Vec<AcceptInfo<C>> = left
            .state(l)
            .accept_infos()
            .iter()
            .chain(right.state(r).accept_infos())
            .cloned()
            .collect();
        builder.add_accepting_state_full(infos, Vec::new(), false)
    } else {
        builder.add_state()
    };
    queue.push_back(key);
    new_states.insert(key, id);
    id
}

#[cfg(test)]
mod tests {
    use crate::builder::FstBuilder;
    use crate::fst::MatchOptions;
    use crate::output::{Output, StandardOps};
    use crate::state::Input;
    use crate::test_util::{doc, sym, SymSet};

    fn anchored() -> MatchOptions {
        MatchOptions {
            end_anchor: true,
            ..MatchOptions::default()
        }
    }

    fn symbol_acceptor(chars: &str) -> crate::fst::Fst<SymSet> {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_guard(s0, sym(chars), s1);
        builder.set_start(s0);
        builder.build().unwrap()
    }

    #[test]
    fn intersect_unifies_overlapping_guards() {
        let left = symbol_acceptor("ab");
        let right = symbol_acceptor("bc");
        let meet = left.intersect(&right).unwrap();
        assert!(!meet.is_transducer());
        assert_eq!(meet.recognize(&doc("b"), &anchored()).len(), 1);
        assert!(meet.recognize(&doc("a"), &anchored()).is_empty());
        assert!(meet.recognize(&doc("c"), &anchored()).is_empty());
    }

    #[test]
    fn intersect_of_disjoint_alphabets_matches_nothing() {
        let left = symbol_acceptor("ab");
        let right = symbol_acceptor("cd");
        let meet = left.intersect(&right).unwrap();
        // no guard pair unifies, so only the start pair is reachable
        assert_eq!(meet.state_count(), 1);
        assert!(meet.recognize(&doc("a"), &anchored()).is_empty());
        assert!(meet.recognize(&doc("c"), &anchored()).is_empty());
    }

    #[test]
    fn intersect_carries_capture_groups_across() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_state();
        let s3 = builder.add_accepting_state();
        builder.add_tag(s0, s1, "g", true);
        builder.add_guard(s1, sym("a"), s2);
        builder.add_tag(s2, s3, "g", false);
        builder.set_start(s0);
        let tagged = builder.build().unwrap();

        let plain = symbol_acceptor("a");
        let meet = tagged.intersect(&plain).unwrap();

        let results = meet.recognize(&doc("a"), &anchored());
        assert_eq!(results.len(), 1);
        assert_eq!(meet.group_span("g", results[0].registers()), Some((0, 1)));
    }

    fn replace_transducer(from: &str, to: &str) -> crate::fst::Fst<SymSet> {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(
            s0,
            Input::guarded(sym(from)),
            vec![Output::Replace(sym(to))],
            s1,
        );
        builder.set_start(s0);
        builder.build().unwrap()
    }

    #[test]
    fn compose_fuses_replacements() {
        let left = replace_transducer("a", "x");
        let right = replace_transducer("x", "y");
        let composed = left.compose(&right).unwrap();
        assert!(composed.is_transducer());

        let results = composed.transduce(&doc("a"), &anchored()).unwrap();
        assert_eq!(results.len(), 1);
        let values: Vec<SymSet> = results[0]
            .output()
            .unwrap()
            .annotations()
            .map(|a| a.value.clone())
            .collect();
        assert_eq!(values, vec![sym("y")]);
    }

    #[test]
    fn compose_forwards_removals_past_the_right_operand() {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(s0, Input::guarded(sym("a")), vec![Output::Remove], s1);
        builder.set_start(s0);
        let remover = builder.build().unwrap();

        let mut builder = FstBuilder::transducer(StandardOps);
        let t0 = builder.add_accepting_state();
        builder.add_rewrite(
            t0,
            Input::guarded(sym("x")),
            vec![Output::Replace(sym("y"))],
            t0,
        );
        builder.set_start(t0);
        let rewriter = builder.build().unwrap();

        let composed = remover.compose(&rewriter).unwrap();
        let results = composed.transduce(&doc("a"), &anchored()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output().unwrap().annotations().count(), 0);
    }

    #[test]
    fn compose_mismatched_output_yields_no_path() {
        let left = replace_transducer("a", "x");
        let right = replace_transducer("z", "y");
        let composed = left.compose(&right).unwrap();
        assert!(composed
            .transduce(&doc("a"), &anchored())
            .unwrap()
            .is_empty());
    }
}
