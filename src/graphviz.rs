//! Dot-format rendering of an automaton, for debugging rule compilers.

use std::io::{self, Write};

use hashbrown::HashSet;
use itertools::Itertools;

use crate::constraint::Constraint;
use crate::fst::Fst;
use crate::output::Output;
use crate::state::Transition;
use crate::StateId;

fn output_label<C: Constraint>(output: &Output<C>) -> String {
    match output {
        Output::Null => "0".to_string(),
        Output::Remove => "-".to_string(),
        Output::Insert(value) => format!("+{:?}", value),
        Output::Replace(value) => format!("{:?}", value),
        Output::PriorityUnion(value) => format!("&{:?}", value),
    }
}

fn transition_label<C: Constraint>(arc: &Transition<C>) -> String {
    let mut label = match arc.input().guard() {
        Some(guard) => format!("{:?}", guard),
        None => match arc.tag() {
            Some(tag) => format!("tag {}", tag),
            None => "\u{3b5}".to_string(),
        },
    };
    for negated in arc.input().negated() {
        label.push_str(&format!(" !{:?}", negated));
    }
    if !arc.outputs().is_empty() {
        let outputs = arc.outputs().iter().map(output_label).join(",");
        label.push_str(&format!(":{}", outputs));
    }
    label
}

impl<C: Constraint> Fst<C> {
    /// Write the automaton as a graphviz digraph. The start state is a
    /// green diamond, accepting states are double-circled in red.
    pub fn write_graphviz<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "digraph G {{")?;

        let mut stack: Vec<StateId> = vec![self.start];
        let mut processed: HashSet<StateId> = HashSet::new();
        while let Some(id) = stack.pop() {
            processed.insert(id);
            let state = self.state(id);
            let shape = if id == self.start { "diamond" } else { "circle" };
            let color = if id == self.start {
                "green"
            } else if state.is_accepting() {
                "red"
            } else {
                "black"
            };
            write!(writer, "  {} [shape=\"{}\", color=\"{}\"", id, shape, color)?;
            if state.is_accepting() {
                write!(writer, ", peripheries=\"2\"")?;
            }
            writeln!(writer, "];")?;

            for arc in state.transitions() {
                writeln!(
                    writer,
                    "  {} -> {} [label=\"{}\"];",
                    id,
                    arc.target(),
                    transition_label(arc).replace('"', "\\\"")
                )?;
                if !processed.contains(&arc.target()) && !stack.contains(&arc.target()) {
                    stack.push(arc.target());
                }
            }
        }

        writeln!(writer, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::FstBuilder;
    use crate::output::{Output, StandardOps};
    use crate::state::Input;
    use crate::test_util::sym;

    #[test]
    fn renders_states_and_arcs() {
        let mut builder = FstBuilder::transducer(StandardOps);
        let s0 = builder.add_state();
        let s1 = builder.add_state();
        let s2 = builder.add_accepting_state();
        builder.add_epsilon(s0, s1);
        builder.add_rewrite(
            s1,
            Input::guarded(sym("ab")),
            vec![Output::Replace(sym("x"))],
            s2,
        );
        builder.set_start(s0);
        let fst = builder.build().unwrap();

        let mut rendered = Vec::new();
        fst.write_graphviz(&mut rendered).unwrap();
        let rendered = String::from_utf8(rendered).unwrap();
        assert!(rendered.starts_with("digraph G {"));
        assert!(rendered.contains("0 -> 1"));
        assert!(rendered.contains("1 -> 2"));
        assert!(rendered.contains("[ab]:[x]"));
        assert!(rendered.contains("peripheries=\"2\""));
        assert!(rendered.trim_end().ends_with('}'));
    }
}
