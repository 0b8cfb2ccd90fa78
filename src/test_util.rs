//! Shared test fixture: a symbol-set constraint over the lowercase Latin
//! alphabet. Matching is subset containment, unification is intersection
//! and negation is complement, which exercises every capability the engine
//! asks of a constraint.

use std::collections::BTreeSet;

use crate::annotation::{Annotation, Document, Span};
use crate::constraint::Constraint;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SymSet {
    chars: BTreeSet<char>,
}

fn universe() -> BTreeSet<char> {
    ('a'..='z').collect()
}

impl SymSet {
    pub(crate) fn of(chars: &str) -> SymSet {
        SymSet {
            chars: chars.chars().collect(),
        }
    }

    pub(crate) fn any() -> SymSet {
        SymSet { chars: universe() }
    }
}

impl core::fmt::Debug for SymSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s: String = self.chars.iter().collect();
        write!(f, "[{}]", s)
    }
}

impl Constraint for SymSet {
    type Bindings = ();

    fn matches(&self, candidate: &SymSet, _use_defaults: bool, _bindings: &mut ()) -> bool {
        candidate.chars.is_subset(&self.chars)
    }

    fn unify(&self, other: &SymSet) -> Option<SymSet> {
        let meet: BTreeSet<char> = self.chars.intersection(&other.chars).copied().collect();
        if meet.is_empty() {
            None
        } else {
            Some(SymSet { chars: meet })
        }
    }

    fn negation(&self) -> Option<SymSet> {
        let complement: BTreeSet<char> = universe().difference(&self.chars).copied().collect();
        if complement.is_empty() {
            None
        } else {
            Some(SymSet { chars: complement })
        }
    }

    fn priority_union(&self, other: &SymSet) -> SymSet {
        other.clone()
    }

    fn is_any(&self) -> bool {
        self.chars == universe()
    }
}

/// Single-symbol constraint.
pub(crate) fn sym(chars: &str) -> SymSet {
    SymSet::of(chars)
}

/// One annotation per character, spanning `(i, i + 1)`.
pub(crate) fn doc(text: &str) -> Document<SymSet> {
    let len = text.chars().count();
    let mut document = Document::new(Span::new(0, len));
    for (i, ch) in text.chars().enumerate() {
        let mut value = String::new();
        value.push(ch);
        document.push(Annotation::new(Span::new(i, i + 1), SymSet::of(&value)));
    }
    document
}
