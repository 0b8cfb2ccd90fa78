//! The traversal core shared by recognition and transduction.
//!
//! One engine serves every automaton shape. The output axis is a strategy
//! type: `()` for acceptors and [`Transduction`] for transducers. The
//! determinism axis is a runtime property of the compiled automaton: a
//! deterministic traversal commits to the first matching transition (unless
//! `try_all_inputs` is set), a nondeterministic one explores all of them and
//! bounds the search by deduplicating reachable configurations.
//!
//! Traversal instances are pooled; forking a branch copies an instance into
//! a recycled slot instead of allocating fresh registers and output buffers.

use core::hash::Hash;
use std::collections::VecDeque;

use hashbrown::HashSet;
use lifeguard::{Pool, Recycled};

use crate::annotation::{Document, Span};
use crate::constraint::Constraint;
use crate::fst::{Fst, FstResult, MatchOptions};
use crate::output::{Output, OutputDoc, RewriteOps};
use crate::registers::{Registers, TagMapCommand};
use crate::state::Transition as StateTransition;
use crate::StateId;

/// What a traversal accumulates besides registers. Implemented by `()` for
/// pure recognition and by [`Transduction`] for rewriting.
pub(crate) trait OutputState<C: Constraint>:
    Clone + Default + PartialEq + Eq + Hash + core::fmt::Debug
{
    /// Prepare for a fresh traversal over `doc`.
    fn begin(&mut self, doc: &Document<C>);
    /// Queue an input annotation for later output actions, `count` times.
    fn enqueue(&mut self, ann: usize, count: usize);
    /// Run a transition's output actions.
    fn execute(&mut self, outputs: &[Output<C>], ops: Option<&dyn RewriteOps<C>>);
    fn copy_from(&mut self, other: &Self);
    /// Snapshot attached to an accepted result.
    fn result(&self) -> Option<OutputDoc<C>>;
}

impl<C: Constraint> OutputState<C> for () {
    fn begin(&mut self, _doc: &Document<C>) {}
    fn enqueue(&mut self, _ann: usize, _count: usize) {}
    fn execute(&mut self, _outputs: &[Output<C>], _ops: Option<&dyn RewriteOps<C>>) {}
    fn copy_from(&mut self, _other: &Self) {}
    fn result(&self) -> Option<OutputDoc<C>> {
        None
    }
}

/// Output accumulation for transducers: the rewritten document plus the
/// FIFO of consumed annotations whose output actions are still pending.
/// Arena indices coincide with input annotation indices, so no separate
/// input-to-output map is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Transduction<C: Constraint> {
    doc: OutputDoc<C>,
    queue: VecDeque<usize>,
}

impl<C: Constraint> Default for Transduction<C> {
    fn default() -> Transduction<C> {
        Transduction {
            doc: OutputDoc::default(),
            queue: VecDeque::new(),
        }
    }
}

impl<C: Constraint> OutputState<C> for Transduction<C> {
    fn begin(&mut self, doc: &Document<C>) {
        self.doc = OutputDoc::from_document(doc);
        self.queue.clear();
    }

    fn enqueue(&mut self, ann: usize, count: usize) {
        for _ in 0..count {
            self.queue.push_back(ann);
        }
    }

    fn execute(&mut self, outputs: &[Output<C>], ops: Option<&dyn RewriteOps<C>>) {
        let ops = match ops {
            Some(ops) => ops,
            None => return,
        };
        let mut prev: Option<usize> = None;
        for action in outputs {
            let target = match (action.chains_on_previous(), prev) {
                (true, Some(p)) => p,
                _ => match self.queue.pop_front() {
                    Some(i) => i,
                    None => {
                        log::warn!("output action with no queued annotation; skipped");
                        continue;
                    }
                },
            };
            prev = action.update_output(&mut self.doc, target, ops);
        }
    }

    fn copy_from(&mut self, other: &Transduction<C>) {
        self.doc.copy_from(&other.doc);
        self.queue.clear();
        self.queue.extend(other.queue.iter().copied());
    }

    fn result(&self) -> Option<OutputDoc<C>> {
        Some(self.doc.clone())
    }
}

/// One thread of a traversal.
#[derive(Debug, Clone)]
pub(crate) struct Instance<C: Constraint, O: OutputState<C>> {
    state: StateId,
    ann: usize,
    registers: Registers,
    bindings: C::Bindings,
    visited: HashSet<StateId>,
    priorities: Option<Vec<i32>>,
    out: O,
}

impl<C: Constraint, O: OutputState<C>> lifeguard::Recycleable for Instance<C, O> {
    fn new() -> Self {
        Instance {
            state: 0,
            ann: 0,
            registers: Registers::default(),
            bindings: C::Bindings::default(),
            visited: HashSet::new(),
            priorities: None,
            out: O::default(),
        }
    }

    fn reset(&mut self) {
        // fields are overwritten on reuse
    }
}

impl<C: Constraint, O: OutputState<C>> lifeguard::InitializeWith<&Instance<C, O>>
    for Instance<C, O>
{
    fn initialize_with(&mut self, source: &Instance<C, O>) {
        self.state = source.state;
        self.ann = source.ann;
        self.registers.copy_from(&source.registers);
        self.bindings = source.bindings.clone();
        self.visited.clear();
        self.visited.extend(source.visited.iter().copied());
        self.priorities = source.priorities.clone();
        self.out.copy_from(&source.out);
    }
}

/// Per-call traversal context: the automaton, the document, and the
/// direction-ordered, filtered view of its annotations.
pub(crate) struct Traverser<'a, C: Constraint> {
    fst: &'a Fst<C>,
    doc: &'a Document<C>,
    options: &'a MatchOptions,
    anns: Vec<usize>,
}

impl<'a, C: Constraint> Traverser<'a, C> {
    pub(crate) fn new(
        fst: &'a Fst<C>,
        doc: &'a Document<C>,
        options: &'a MatchOptions,
    ) -> Traverser<'a, C> {
        let mut anns: Vec<usize> = (0..doc.annotations().len())
            .filter(|&i| match &fst.filter {
                Some(filter) => filter(&doc.annotations()[i]),
                None => true,
            })
            .collect();
        let dir = fst.direction;
        anns.sort_by(|&x, &y| {
            let xa = &doc.annotations()[x];
            let ya = &doc.annotations()[y];
            let span_cmp = match dir {
                crate::Direction::LeftToRight => xa.span.cmp(&ya.span),
                crate::Direction::RightToLeft => ya.span.cmp(&xa.span),
            };
            span_cmp.then_with(|| xa.depth.cmp(&ya.depth))
        });
        Traverser { fst, doc, options, anns }
    }

    pub(crate) fn len(&self) -> usize {
        self.anns.len()
    }

    #[inline(always)]
    fn span_of(&self, index: usize) -> Span {
        self.doc.annotations()[self.anns[index]].span
    }

    #[inline(always)]
    fn value_of(&self, index: usize) -> &C {
        &self.doc.annotations()[self.anns[index]].value
    }

    #[inline(always)]
    fn is_optional(&self, index: usize) -> bool {
        self.doc.annotations()[self.anns[index]].optional
    }

    pub(crate) fn start_offset(&self, index: usize) -> usize {
        self.span_of(index).start(self.fst.direction)
    }

    fn next_nonoverlapping(&self, start: usize) -> usize {
        let cur = self.span_of(start);
        for i in start + 1..self.anns.len() {
            if !cur.overlaps(&self.span_of(i)) {
                return i;
            }
        }
        self.anns.len()
    }

    fn prev_nonoverlapping(&self, start: usize) -> Option<usize> {
        if start >= self.anns.len() {
            return self.anns.len().checked_sub(1);
        }
        let cur = self.span_of(start);
        (0..start).rev().find(|&i| !cur.overlaps(&self.span_of(i)))
    }

    /// Spawn the start-state instances for every annotation co-located at
    /// the scan position, branching into skips of optional annotations.
    fn initialize<'p, O: OutputState<C>>(
        &self,
        pool: &'p Pool<Instance<C, O>>,
        ann_index: &mut usize,
        registers: &Registers,
        cmds: &[TagMapCommand],
        init_anns: &mut HashSet<usize>,
        insts: &mut Vec<Recycled<'p, Instance<C, O>>>,
    ) {
        let dir = self.fst.direction;
        let offset = self.span_of(*ann_index).start(dir);

        let mut i = *ann_index;
        while i < self.anns.len() && self.span_of(i).start(dir) == offset {
            if self.is_optional(i) {
                let next = self.next_nonoverlapping(i);
                if next < self.anns.len() {
                    let mut next_index = next;
                    self.initialize(pool, &mut next_index, registers, cmds, init_anns, insts);
                }
            }
            i += 1;
        }

        let mut new_registers = registers.clone();
        new_registers.execute(cmds, Some(offset), None);

        while *ann_index < self.anns.len() && self.span_of(*ann_index).start(dir) == offset {
            if init_anns.insert(*ann_index) {
                let mut inst = pool.new();
                inst.state = self.fst.start;
                inst.ann = *ann_index;
                inst.registers.copy_from(&new_registers);
                inst.bindings = C::Bindings::default();
                inst.visited.clear();
                inst.priorities = if self.fst.deterministic {
                    None
                } else {
                    Some(Vec::new())
                };
                inst.out.begin(self.doc);
                insts.push(inst);
            }
            *ann_index += 1;
        }
    }

    /// Consume `ann` over `transition`, branching into skips of optional
    /// annotations at the next position. `proto` holds the pre-command
    /// registers and the already executed output state.
    #[allow(clippy::too_many_arguments)]
    fn advance_from<'p, O: OutputState<C>>(
        &self,
        pool: &'p Pool<Instance<C, O>>,
        proto: &Instance<C, O>,
        ann: usize,
        transition: &StateTransition<C>,
        results: &mut Vec<FstResult<C>>,
        into: &mut Vec<Recycled<'p, Instance<C, O>>>,
    ) {
        let dir = self.fst.direction;
        let next = self.next_nonoverlapping(ann);
        let next_offset = if next < self.anns.len() {
            self.span_of(next).start(dir)
        } else {
            self.span_of(self.anns.len() - 1).end(dir)
        };
        let end = self.span_of(ann).end(dir);

        let mut new_registers = proto.registers.clone();
        new_registers.execute(transition.commands(), Some(next_offset), Some(end));
        let new_priorities = proto.priorities.as_ref().map(|p| {
            let mut p = p.clone();
            p.push(transition.priority());
            p
        });
        self.check_accepting(
            next,
            &new_registers,
            &proto.out,
            &proto.bindings,
            transition,
            results,
            new_priorities.as_deref(),
        );

        if next < self.anns.len() {
            let mut i = next;
            while i < self.anns.len() && self.span_of(i).start(dir) == next_offset {
                if self.is_optional(i) {
                    self.advance_from(pool, proto, i, transition, results, into);
                }
                i += 1;
            }
            for j in next..i {
                let mut ni = pool.new_from(proto);
                ni.state = transition.target();
                ni.ann = j;
                ni.registers.copy_from(&new_registers);
                ni.visited.clear();
                ni.priorities = new_priorities.clone();
                into.push(ni);
            }
        } else {
            let mut ni = pool.new_from(proto);
            ni.state = transition.target();
            ni.ann = next;
            ni.registers.copy_from(&new_registers);
            ni.visited.clear();
            ni.priorities = new_priorities;
            into.push(ni);
        }
    }

    /// Cross a zero-width transition in place: commands run at the current
    /// position with the previous annotation's trailing edge.
    fn epsilon_advance<'p, O: OutputState<C>>(
        &self,
        mut inst: Recycled<'p, Instance<C, O>>,
        transition: &StateTransition<C>,
        results: &mut Vec<FstResult<C>>,
    ) -> Recycled<'p, Instance<C, O>> {
        let dir = self.fst.direction;
        let start = if inst.ann < self.anns.len() {
            self.span_of(inst.ann).start(dir)
        } else {
            self.doc.span().end(dir)
        };
        let prev_end = match self.prev_nonoverlapping(inst.ann) {
            Some(prev) => self.span_of(prev).end(dir),
            None => self.doc.span().start(dir),
        };
        inst.registers
            .execute(transition.commands(), Some(start), Some(prev_end));
        self.check_accepting(
            inst.ann,
            &inst.registers,
            &inst.out,
            &inst.bindings,
            transition,
            results,
            inst.priorities.as_deref(),
        );
        inst.state = transition.target();
        inst
    }

    #[allow(clippy::too_many_arguments)]
    fn check_accepting<O: OutputState<C>>(
        &self,
        ann: usize,
        registers: &Registers,
        out: &O,
        bindings: &C::Bindings,
        transition: &StateTransition<C>,
        results: &mut Vec<FstResult<C>>,
        priorities: Option<&[i32]>,
    ) {
        let target = self.fst.state(transition.target());
        if !target.is_accepting() {
            return;
        }
        if self.options.end_anchor && ann < self.anns.len() {
            return;
        }
        let mut match_registers = registers.clone();
        match_registers.execute(target.finishers(), None, None);
        if !target.accept_infos().is_empty() {
            for info in target.accept_infos() {
                let candidate = FstResult {
                    id: info.id().cloned(),
                    registers: match_registers.clone(),
                    output: out.result(),
                    bindings: bindings.clone(),
                    priority: info.priority(),
                    lazy: target.is_lazy(),
                    next_ann: ann,
                    priorities: priorities.map(|p| p.to_vec()),
                    order: results.len(),
                };
                let acceptable = match info.acceptable() {
                    Some(f) => f(self.doc, &candidate),
                    None => true,
                };
                if acceptable {
                    log::trace!(
                        "accepted at state {} (id {:?})",
                        target.index(),
                        candidate.id
                    );
                    results.push(candidate);
                }
            }
        } else {
            results.push(FstResult {
                id: None,
                registers: match_registers,
                output: out.result(),
                bindings: bindings.clone(),
                priority: -1,
                lazy: target.is_lazy(),
                next_ann: ann,
                priorities: priorities.map(|p| p.to_vec()),
                order: results.len(),
            });
        }
    }

    /// One traversal batch from the current scan position. Advances
    /// `ann_index` past the annotations used to seed instances.
    pub(crate) fn traverse<'p, O: OutputState<C>>(
        &self,
        pool: &'p Pool<Instance<C, O>>,
        ann_index: &mut usize,
        registers: Registers,
        cmds: &[TagMapCommand],
        init_anns: &mut HashSet<usize>,
    ) -> Vec<FstResult<C>> {
        let deterministic = self.fst.deterministic;
        let ops = self.fst.ops.as_deref();
        let mut results: Vec<FstResult<C>> = Vec::new();
        let mut stack: Vec<Recycled<'p, Instance<C, O>>> = Vec::new();
        self.initialize(pool, ann_index, &registers, cmds, init_anns, &mut stack);

        let mut seen: HashSet<(StateId, usize, Registers, O)> = HashSet::new();

        while let Some(inst) = stack.pop() {
            let state = self.fst.state(inst.state);
            for transition in state.transitions() {
                if transition.input().is_epsilon() {
                    if inst.visited.contains(&transition.target()) {
                        continue;
                    }
                    let mut ti = pool.new_from(&*inst);
                    ti.out.execute(transition.outputs(), ops);
                    ti.visited.insert(transition.target());
                    let ti = self.epsilon_advance(ti, transition, &mut results);
                    if deterministic
                        || seen.insert((ti.state, ti.ann, ti.registers.clone(), ti.out.clone()))
                    {
                        stack.push(ti);
                    }
                } else if inst.ann < self.anns.len() {
                    let mut bindings = inst.bindings.clone();
                    if !transition.input().matches(
                        self.value_of(inst.ann),
                        self.options.use_defaults,
                        &mut bindings,
                    ) {
                        continue;
                    }
                    let mut ti = pool.new_from(&*inst);
                    ti.bindings = bindings;
                    ti.out
                        .enqueue(self.anns[inst.ann], transition.input().enqueue_count());
                    ti.out.execute(transition.outputs(), ops);
                    let mut new_insts = Vec::new();
                    self.advance_from(pool, &ti, ti.ann, transition, &mut results, &mut new_insts);
                    for ni in new_insts {
                        if deterministic
                            || seen.insert((ni.state, ni.ann, ni.registers.clone(), ni.out.clone()))
                        {
                            stack.push(ni);
                        }
                    }
                    if deterministic && !self.fst.try_all_inputs {
                        break;
                    }
                }
            }
        }
        results
    }
}

impl<C: Constraint> Fst<C> {
    pub(crate) fn match_all<O: OutputState<C>>(
        &self,
        doc: &Document<C>,
        options: &MatchOptions,
    ) -> Vec<FstResult<C>> {
        let traverser = Traverser::new(self, doc, options);
        if traverser.len() == 0 {
            return Vec::new();
        }
        let pool: Pool<Instance<C, O>> =
            Pool::with_size_and_max(options.pool_size, options.pool_size);
        let mut results: Vec<FstResult<C>> = Vec::new();
        let mut init_anns: HashSet<usize> = HashSet::new();
        let mut ann_index = 0;

        while ann_index < traverser.len() {
            let mut registers = Registers::new(self.register_count);
            let mut cmds: Vec<TagMapCommand> = Vec::new();
            let start_offset = traverser.start_offset(ann_index);
            for cmd in &self.initializers {
                if cmd.dest == 0 {
                    registers.set(0, Some(start_offset), None);
                } else {
                    cmds.push(*cmd);
                }
            }
            let mut cur =
                traverser.traverse(&pool, &mut ann_index, registers, &cmds, &mut init_anns);
            if !cur.is_empty() {
                cur.sort_by(|x, y| self.result_compare(x, y));
                results.append(&mut cur);
                if !options.all_matches {
                    break;
                }
            }
            if options.start_anchor {
                break;
            }
        }

        if !self.deterministic && options.all_matches {
            self.dedup_results(&mut results);
        }
        results
    }
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

    #[test]
    fn self_loop_acceptor_yields_one_result() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_accepting_state();
        builder.add_guard(s0, sym("a"), s0);
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let options = MatchOptions {
            end_anchor: true,
            all_matches: false,
            ..MatchOptions::default()
        };
        let results = fst.recognize(&doc("aaa"), &options);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].priority(), -1);
        assert_eq!(results[0].next_annotation(), 3);
    }

    #[test]
    fn replace_transduction_rewrites_the_annotation() {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(s0, Input::guarded(sym("x")), vec![Output::Replace(sym("y"))], s1);
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let results = fst.transduce(&doc("x"), &anchored()).unwrap();
        assert_eq!(results.len(), 1);
        let output = results[0].output().unwrap();
        let values: Vec<SymSet> = output.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("y")]);
    }

    #[test]
    fn enqueue_count_feeds_several_output_actions() {
        // one consumed annotation queued twice: the second Replace lands on
        // the slot the first one left behind
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(
            s0,
            Input::with_enqueue_count(sym("a"), Vec::new(), 2),
            vec![Output::Replace(sym("x")), Output::Replace(sym("y"))],
            s1,
        );
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let results = fst.transduce(&doc("a"), &anchored()).unwrap();
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
    fn insert_chains_after_the_inserted_annotation() {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state();
        builder.add_rewrite(
            s0,
            Input::guarded(sym("a")),
            vec![Output::Insert(sym("y")), Output::Insert(sym("z"))],
            s1,
        );
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let results = fst.transduce(&doc("a"), &anchored()).unwrap();
        assert_eq!(results.len(), 1);
        let values: Vec<SymSet> = results[0]
            .output()
            .unwrap()
            .annotations()
            .map(|a| a.value.clone())
            .collect();
        assert_eq!(values, vec![sym("a"), sym("y"), sym("z")]);
    }

    #[test]
    fn capture_group_records_span_offsets() {
        // start --G:start--> s1 --a--> s2 --b--> s3 --G:end--> accept
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
        let fst = builder.build().unwrap();

        let results = fst.recognize(&doc("ab"), &anchored());
        assert_eq!(results.len(), 1);
        let span = fst.group_span("g", results[0].registers()).unwrap();
        assert_eq!(span, (0, 2));
    }

    #[test]
    fn optional_annotations_fork_skipping_branches() {
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_accepting_state_with("short", 0, None);
        let s2 = builder.add_accepting_state_with("long", 1, None);
        builder.add_guard(s0, sym("a"), s1);
        builder.add_guard(s1, sym("b"), s2);
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        // "a" then an optional "b": both the consuming and the skipping
        // branch reach the end anchor
        let source = doc("ab");
        let mut document = crate::annotation::Document::new(source.span());
        for (i, ann) in source.annotations().iter().enumerate() {
            let mut ann = ann.clone();
            if i == 1 {
                ann.optional = true;
            }
            document.push(ann);
        }

        let results = fst.recognize(&document, &anchored());
        let mut ids: Vec<String> = results
            .iter()
            .map(|r| r.id().map(|s| s.to_string()).unwrap_or_default())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["long".to_string(), "short".to_string()]);
    }

    #[test]
    fn nondeterministic_duplicates_are_deduplicated() {
        // two epsilon paths to the same consuming state
        let mut builder: FstBuilder<SymSet> = FstBuilder::acceptor();
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_accepting_state();
        builder.add_epsilon(s0, s1);
        builder.add_epsilon(s0, s1);
        builder.add_guard(s1, sym("a"), s2);
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let results = fst.recognize(&doc("a"), &anchored());
        assert_eq!(results.len(), 1);
    }
}
