//! Structural analyses over compiled automata: loop detection, ambiguity
//! between outgoing arcs, acceptor projections and language equivalence.
//! These back the preconditions of the subset construction: an automaton
//! with an epsilon loop cannot be determinized at all, and one with
//! unbounded ambiguity whose loops emit different outputs cannot be
//! determinized without losing transductions.

use hashbrown::{HashMap, HashSet};

use crate::builder::FstBuilder;
use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::state::{State, Transition};
use crate::{FstError, StateId};

/// Which guard a copied arc keeps.
#[derive(Clone, Copy)]
enum ArcProjection {
    /// Input and outputs both, unchanged.
    Full,
    /// The first output payload becomes the guard; removals and bare
    /// consumptions turn into epsilon arcs.
    OutputGuard,
    /// The positive input guard alone; negations are dropped.
    InputGuard,
}

/// Distinguishes the two operand automata inside the merging-set
/// equivalence check, where state ids from both live in the same sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Left,
    Right,
}

impl<C: Constraint> Fst<C> {
    /// Is there a cycle consisting solely of epsilon transitions?
    pub fn has_epsilon_loop(&self) -> bool {
        let mut visited_states: HashSet<StateId> = HashSet::new();
        let mut visited_arcs: HashSet<(StateId, usize)> = HashSet::new();
        (0..self.states.len())
            .any(|s| self.epsilon_loop_impl(s, s, &mut visited_states, &mut visited_arcs))
    }

    fn epsilon_loop_impl(
        &self,
        origin: StateId,
        current: StateId,
        visited_states: &mut HashSet<StateId>,
        visited_arcs: &mut HashSet<(StateId, usize)>,
    ) -> bool {
        if !visited_states.insert(current) {
            return true;
        }
        for (i, arc) in self.state(current).transitions().iter().enumerate() {
            if arc.input().is_epsilon() && visited_arcs.insert((current, i)) {
                if arc.target() == origin {
                    return true;
                }
                if self.epsilon_loop_impl(origin, arc.target(), visited_states, visited_arcs) {
                    return true;
                }
            }
            visited_arcs.remove(&(current, i));
        }
        visited_states.remove(&origin);
        false
    }

    /// Is any state reachable from the start state more than once? This is
    /// a conservative reachability check, not proper cycle detection:
    /// reconverging acyclic paths also count.
    pub fn has_loop(&self) -> bool {
        let mut visited: HashSet<StateId> = HashSet::new();
        self.has_loop_impl(self.start, &mut visited)
    }

    fn has_loop_impl(&self, state: StateId, visited: &mut HashSet<StateId>) -> bool {
        if !visited.insert(state) {
            return true;
        }
        self.state(state)
            .transitions()
            .iter()
            .any(|arc| self.has_loop_impl(arc.target(), visited))
    }

    /// Can [`Fst::determinize`] preserve this automaton's transductions?
    pub fn is_determinizable(&self) -> bool {
        if self.has_epsilon_loop() {
            return false;
        }
        !self.has_unbounded_loops_with_nonidentical_output()
    }

    /// The weaker gate for [`Fst::quasideterminize`]: only epsilon loops
    /// are ruled out.
    pub fn is_quasideterminizable(&self) -> bool {
        !self.has_epsilon_loop()
    }

    fn has_unbounded_loops_with_nonidentical_output(&self) -> bool {
        // analysis failures count as unbounded ambiguity
        self.check_unbounded_loops().unwrap_or(true)
    }

    fn check_unbounded_loops(&self) -> Result<bool, FstError> {
        for state in &self.states {
            for (i, j) in self.ambiguous_arc_pairs(state) {
                let fst1 = self.extract_transducer(state.index(), i)?;
                let fst2 = self.extract_transducer(state.index(), j)?;
                if !fst1.has_loop() || !fst2.has_loop() {
                    continue;
                }
                if !fst1.intersect(&fst2)?.has_loop() {
                    continue;
                }
                let out1 = fst1.output_acceptor()?.determinize()?;
                let out2 = fst2.output_acceptor()?.determinize()?;
                if !out1.is_equivalent_to(&out2)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Pairs of outgoing arcs whose guard languages overlap after closing
    /// over epsilon transitions.
    fn ambiguous_arc_pairs(&self, state: &State<C>) -> Vec<(usize, usize)> {
        let arcs = state.transitions();
        let mut pairs = Vec::new();
        for i in 0..arcs.len().saturating_sub(1) {
            let inputs1 = self.closured_inputs(&arcs[i]);
            for j in i + 1..arcs.len() {
                let ambiguous = self
                    .closured_inputs(&arcs[j])
                    .iter()
                    .any(|g2| inputs1.iter().any(|g1| g1.is_unifiable(g2)));
                if ambiguous {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// The distinct guards reachable through an arc: its own guard plus
    /// every guard leaving the epsilon closure of its target.
    fn closured_inputs(&self, arc: &Transition<C>) -> Vec<C> {
        let mut guards: Vec<C> = Vec::new();
        for state in self.state_epsilon_closure(arc.target()) {
            for transition in self.state(state).transitions() {
                if let Some(guard) = transition.input().guard() {
                    if !guards.contains(guard) {
                        guards.push(guard.clone());
                    }
                }
            }
        }
        if let Some(guard) = arc.input().guard() {
            if !guards.contains(guard) {
                guards.push(guard.clone());
            }
        }
        guards
    }

    fn state_epsilon_closure(&self, state: StateId) -> Vec<StateId> {
        let mut closure: Vec<StateId> = vec![state];
        let mut stack: Vec<StateId> = vec![state];
        while let Some(top) = stack.pop() {
            for arc in self.state(top).transitions() {
                if arc.input().is_epsilon() && !closure.contains(&arc.target()) {
                    closure.push(arc.target());
                    stack.push(arc.target());
                }
            }
        }
        closure
    }

    /// The sub-transducer rooted at one arc of a state: the state becomes
    /// the start, the chosen arc its only transition, and everything
    /// reachable beyond it is copied.
    fn extract_transducer(&self, state: StateId, arc_index: usize) -> Result<Fst<C>, FstError> {
        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(self.ops.clone(), self.direction, self.filter.clone());
        let src = self.state(state);
        let start = if src.is_accepting() {
            builder.add_accepting_state_full(src.accept_infos().to_vec(), Vec::new(), false)
        } else {
            builder.add_state()
        };
        builder.set_start(start);
        let mut copies: HashMap<StateId, StateId> = HashMap::new();
        copies.insert(state, start);
        let arc = &src.transitions()[arc_index];
        let child = copy_state(self, &mut builder, arc.target(), ArcProjection::Full, &mut copies);
        builder.add_rewrite(start, arc.input().clone(), arc.outputs().to_vec(), child);
        builder.build()
    }

    /// An acceptor over this transducer's output side: every rewriting
    /// arc's first output payload becomes a guard.
    pub fn output_acceptor(&self) -> Result<Fst<C>, FstError> {
        self.project(ArcProjection::OutputGuard)
    }

    /// An acceptor over this transducer's input side, with negations and
    /// outputs stripped.
    pub fn input_acceptor(&self) -> Result<Fst<C>, FstError> {
        self.project(ArcProjection::InputGuard)
    }

    fn project(&self, projection: ArcProjection) -> Result<Fst<C>, FstError> {
        let mut builder: FstBuilder<C> =
            FstBuilder::with_config(None, self.direction, self.filter.clone());
        builder.set_next_tag(self.next_tag);
        builder.set_register_count(self.register_count);
        builder.copy_groups(&self.groups);
        let mut copies: HashMap<StateId, StateId> = HashMap::new();
        let start = copy_state(self, &mut builder, self.start, projection, &mut copies);
        builder.set_start(start);
        builder.build()
    }

    /// Do two deterministic acceptors recognize the same language? States
    /// of both operands are merged into candidate-equivalent sets; a
    /// mismatch in acceptance or in outgoing inputs refutes equivalence.
    pub fn is_equivalent_to(&self, other: &Fst<C>) -> Result<bool, FstError> {
        if !self.deterministic || !other.deterministic {
            return Err(FstError::NotDeterministic);
        }

        let mut sets: Vec<HashSet<(Side, StateId)>> = vec![[
            (Side::Left, self.start),
            (Side::Right, other.start),
        ]
        .into_iter()
        .collect()];
        let mut stack: Vec<(StateId, StateId)> = vec![(self.start, other.start)];

        while let Some((s1, s2)) = stack.pop() {
            if self.state(s1).is_accepting() != other.state(s2).is_accepting() {
                return Ok(false);
            }

            let mut arcs2: Vec<usize> = (0..other.state(s2).transitions().len()).collect();
            for arc1 in self.state(s1).transitions() {
                let mut found = false;
                for (pos, &a2) in arcs2.iter().enumerate() {
                    let arc2 = &other.state(s2).transitions()[a2];
                    if arc1.input() != arc2.input() {
                        continue;
                    }
                    let t1 = (Side::Left, arc1.target());
                    let t2 = (Side::Right, arc2.target());
                    let mut r1 = None;
                    let mut r2 = None;
                    for (i, set) in sets.iter().enumerate() {
                        if set.contains(&t1) {
                            r1 = Some(i);
                        }
                        if set.contains(&t2) {
                            r2 = Some(i);
                        }
                        if r1.is_some() && r2.is_some() {
                            break;
                        }
                    }
                    match (r1, r2) {
                        (None, None) => {
                            sets.push([t1, t2].into_iter().collect());
                            stack.push((arc1.target(), arc2.target()));
                        }
                        (None, Some(r2)) => {
                            sets[r2].insert(t1);
                            stack.push((arc1.target(), arc2.target()));
                        }
                        (Some(r1), None) => {
                            sets[r1].insert(t2);
                            stack.push((arc1.target(), arc2.target()));
                        }
                        (Some(r1), Some(r2)) if r1 != r2 => {
                            let merged = sets.remove(r2);
                            let r1 = if r2 < r1 { r1 - 1 } else { r1 };
                            sets[r1].extend(merged);
                            stack.push((arc1.target(), arc2.target()));
                        }
                        _ => {}
                    }
                    arcs2.remove(pos);
                    found = true;
                    break;
                }
                if !found {
                    return Ok(false);
                }
            }
            if !arcs2.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn copy_state<C: Constraint>(
    fst: &Fst<C>,
    builder: &mut FstBuilder<C>,
    source: StateId,
    projection: ArcProjection,
    copies: &mut HashMap<StateId, StateId>,
) -> StateId {
    if let Some(&id) = copies.get(&source) {
        return id;
    }
    let src = fst.state(source);
    let id = if src.is_accepting() {
        builder.add_accepting_state_full(src.accept_infos().to_vec(), Vec::new(), false)
    } else {
        builder.add_state()
    };
    copies.insert(source, id);
    for arc in fst.state(source).transitions() {
        let child = copy_state(fst, builder, arc.target(), projection, copies);
        copy_arc(builder, id, arc, child, projection);
    }
    id
}

fn copy_arc<C: Constraint>(
    builder: &mut FstBuilder<C>,
    from: StateId,
    arc: &Transition<C>,
    to: StateId,
    projection: ArcProjection,
) {
    if arc.input().enqueue_count() == 0 {
        match arc.tag() {
            Some(tag) => builder.add_tag_raw(from, to, tag),
            None => builder.add_epsilon_with_priority(from, to, arc.priority_type()),
        }
        return;
    }
    match projection {
        ArcProjection::Full => {
            builder.add_rewrite(from, arc.input().clone(), arc.outputs().to_vec(), to);
        }
        ArcProjection::OutputGuard => {
            match arc.outputs().first().and_then(|output| output.value()) {
                Some(value) => builder.add_guard(from, value.clone(), to),
                None => builder.add_epsilon(from, to),
            }
        }
        ArcProjection::InputGuard => match arc.input().guard() {
            Some(guard) => builder.add_guard(from, guard.clone(), to),
            None => builder.add_epsilon(from, to),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::FstBuilder;
    use crate::fst::MatchOptions;
    use crate::output::{Output, StandardOps};
    use crate::state::Input;
    use crate::test_util::{doc, sym, SymSet};
    use crate::FstError;

    fn anchored() -> MatchOptions {
        MatchOptions {
            end_anchor: true,
            ..MatchOptions::default()
        }
    }

    #[test]
    fn epsilon_self_loop_is_detected() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_accepting_state();
        builder.add_epsilon(s0, s0);
        builder.set_start(s0);
        let fst = builder.build().unwrap();
        assert!(fst.has_epsilon_loop());
        assert!(!fst.is_quasideterminizable());
        assert!(!fst.is_determinizable());
    }

    #[test]
    fn acyclic_acceptor_is_determinizable() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s1);
        builder.set_start(s0);
        let fst = builder.build().unwrap();
        assert!(!fst.has_epsilon_loop());
        assert!(!fst.has_loop());
        assert!(fst.is_quasideterminizable());
        assert!(fst.is_determinizable());
    }

    #[test]
    fn guarded_cycle_reports_a_loop_but_no_epsilon_loop() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s1);
        builder.add_guard(s1, sym("a"), s0);
        builder.set_start(s0);
        let fst = builder.build().unwrap();
        assert!(fst.has_loop());
        assert!(!fst.has_epsilon_loop());
    }

    fn looping_transducer(first: &str, second: &str) -> crate::fst::Fst<SymSet> {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        let s2 = builder.add_accepting_state();
        builder.add_rewrite(
            s0,
            Input::guarded(sym("a")),
            vec![Output::Replace(sym(first))],
            s1,
        );
        builder.add_rewrite(
            s1,
            Input::guarded(sym("a")),
            vec![Output::Replace(sym(first))],
            s1,
        );
        builder.add_rewrite(
            s0,
            Input::guarded(sym("a")),
            vec![Output::Replace(sym(second))],
            s2,
        );
        builder.add_rewrite(
            s2,
            Input::guarded(sym("a")),
            vec![Output::Replace(sym(second))],
            s2,
        );
        builder.set_start(s0);
        builder.build().unwrap()
    }

    #[test]
    fn matching_loop_outputs_stay_determinizable() {
        let fst = looping_transducer("x", "x");
        assert!(fst.is_determinizable());
    }

    #[test]
    fn divergent_loop_outputs_block_determinization() {
        let fst = looping_transducer("x", "y");
        assert!(!fst.is_determinizable());
        // quasideterminization only cares about epsilon loops
        assert!(fst.is_quasideterminizable());
    }

    #[test]
    fn projections_accept_the_expected_sides() {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(
            s0,
            Input::guarded(sym("a")),
            vec![Output::Replace(sym("x"))],
            s1,
        );
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let out = fst.output_acceptor().unwrap();
        assert!(!out.is_transducer());
        assert_eq!(out.recognize(&doc("x"), &anchored()).len(), 1);
        assert!(out.recognize(&doc("a"), &anchored()).is_empty());

        let input = fst.input_acceptor().unwrap();
        assert_eq!(input.recognize(&doc("a"), &anchored()).len(), 1);
        assert!(input.recognize(&doc("x"), &anchored()).is_empty());
    }

    #[test]
    fn equivalence_ignores_state_layout() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s1);
        builder.add_guard(s1, sym("a"), s1);
        builder.set_start(s0);
        let compact = builder.build().unwrap().determinize().unwrap();

        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let t0 = builder.add_state();
        let t1 = builder.add_accepting_state();
        let t2 = builder.add_accepting_state();
        builder.add_guard(t0, sym("a"), t1);
        builder.add_guard(t1, sym("a"), t2);
        builder.add_guard(t2, sym("a"), t2);
        builder.set_start(t0);
        let unrolled = builder.build().unwrap().determinize().unwrap();

        assert!(compact.is_equivalent_to(&unrolled).unwrap());
        assert!(unrolled.is_equivalent_to(&compact).unwrap());

        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let u0 = builder.add_state();
        let u1 = builder.add_accepting_state();
        builder.add_guard(u0, sym("a"), u1);
        builder.set_start(u0);
        let single = builder.build().unwrap().determinize().unwrap();

        assert!(!compact.is_equivalent_to(&single).unwrap());
        assert!(!single.is_equivalent_to(&compact).unwrap());
    }

    #[test]
    fn equivalence_requires_deterministic_operands() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s1);
        builder.set_start(s0);
        let nfa = builder.build().unwrap();
        match nfa.is_equivalent_to(&nfa) {
            Err(FstError::NotDeterministic) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
