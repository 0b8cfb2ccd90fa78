//! Output actions and the output document they rewrite.
//!
//! A transducer arc carries a list of [`Output`] actions. During traversal
//! each consumed annotation is queued, and actions dequeue and rewrite the
//! corresponding output annotation. `Null` placeholders inserted by
//! determinization consume a queue slot without touching the document.

use crate::annotation::{Document, Span};
use crate::constraint::Constraint;

/// One output action on a transducer arc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Output<C> {
    /// Consume a queued annotation, change nothing.
    Null,
    /// Add a new annotation after the queued one.
    Insert(C),
    /// Delete the queued annotation.
    Remove,
    /// Overwrite the queued annotation's value.
    Replace(C),
    /// Merge into the queued annotation's value, new values winning.
    PriorityUnion(C),
}

impl<C> Output<C> {
    /// Payload constraint, if the action carries one.
    pub fn value(&self) -> Option<&C> {
        match self {
            Output::Insert(c) | Output::Replace(c) | Output::PriorityUnion(c) => Some(c),
            Output::Null | Output::Remove => None,
        }
    }

    /// Inserts chain after the annotation they just created instead of
    /// dequeueing another input annotation.
    pub(crate) fn chains_on_previous(&self) -> bool {
        matches!(self, Output::Insert(_))
    }
}

impl<C: Constraint> Output<C> {
    /// Apply this action to `target` in the output document. Returns the
    /// index of a newly created annotation for chaining, if any.
    pub(crate) fn update_output(
        &self,
        doc: &mut OutputDoc<C>,
        target: usize,
        ops: &dyn RewriteOps<C>,
    ) -> Option<usize> {
        match self {
            Output::Null => None,
            Output::Insert(value) => Some(ops.insert(doc, target, value)),
            Output::Remove => {
                ops.remove(doc, target);
                None
            }
            Output::Replace(value) => {
                ops.replace(doc, target, value);
                None
            }
            Output::PriorityUnion(value) => {
                let merged = doc.arena[target].value.priority_union(value);
                ops.replace(doc, target, &merged);
                None
            }
        }
    }
}

/// The primitive rewrites a transducer needs from its output representation.
/// The standard implementation edits the flat arena directly; callers with
/// richer documents can interpose their own bookkeeping.
pub trait RewriteOps<C: Constraint>: Send + Sync {
    fn replace(&self, doc: &mut OutputDoc<C>, target: usize, value: &C);
    /// Insert a new annotation ordered after `target`, returning its index.
    fn insert(&self, doc: &mut OutputDoc<C>, target: usize, value: &C) -> usize;
    fn remove(&self, doc: &mut OutputDoc<C>, target: usize);
}

/// Arena rewrites with no extra bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardOps;

impl<C: Constraint> RewriteOps<C> for StandardOps {
    fn replace(&self, doc: &mut OutputDoc<C>, target: usize, value: &C) {
        doc.replace(target, value.clone());
    }

    fn insert(&self, doc: &mut OutputDoc<C>, target: usize, value: &C) -> usize {
        doc.insert_after(target, value.clone())
    }

    fn remove(&self, doc: &mut OutputDoc<C>, target: usize) {
        doc.remove(target);
    }
}

/// One annotation in the output arena. Removed entries stay in place so
/// indices held by the input→output map remain valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputAnn<C> {
    pub span: Span,
    pub value: C,
    pub removed: bool,
}

/// A flat, index-addressed output document. Cloning snapshots the arena;
/// there is no graph to deep-copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputDoc<C> {
    arena: Vec<OutputAnn<C>>,
    order: Vec<usize>,
}

impl<C> Default for OutputDoc<C> {
    fn default() -> OutputDoc<C> {
        OutputDoc {
            arena: Vec::new(),
            order: Vec::new(),
        }
    }
}

impl<C: Constraint> OutputDoc<C> {
    pub(crate) fn from_document(doc: &Document<C>) -> OutputDoc<C> {
        let arena: Vec<OutputAnn<C>> = doc
            .annotations()
            .iter()
            .map(|ann| OutputAnn {
                span: ann.span,
                value: ann.value.clone(),
                removed: false,
            })
            .collect();
        let order = (0..arena.len()).collect();
        OutputDoc { arena, order }
    }

    /// Live annotations in document order.
    pub fn annotations(&self) -> impl Iterator<Item = &OutputAnn<C>> {
        self.order
            .iter()
            .map(move |&i| &self.arena[i])
            .filter(|a| !a.removed)
    }

    pub(crate) fn replace(&mut self, target: usize, value: C) {
        self.arena[target].value = value;
        self.arena[target].removed = false;
    }

    pub(crate) fn remove(&mut self, target: usize) {
        self.arena[target].removed = true;
    }

    pub(crate) fn insert_after(&mut self, target: usize, value: C) -> usize {
        let span = self.arena[target].span;
        let index = self.arena.len();
        self.arena.push(OutputAnn {
            span,
            value,
            removed: false,
        });
        let pos = self
            .order
            .iter()
            .position(|&i| i == target)
            .map(|p| p + 1)
            .unwrap_or(self.order.len());
        self.order.insert(pos, index);
        index
    }

    pub(crate) fn copy_from(&mut self, other: &OutputDoc<C>) {
        self.arena.clear();
        self.arena.extend_from_slice(&other.arena);
        self.order.clear();
        self.order.extend_from_slice(&other.order);
    }

    pub(crate) fn clear(&mut self) {
        self.arena.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{doc, sym};

    #[test]
    fn replace_overwrites_value_in_place() {
        let input = doc("ab");
        let mut out = OutputDoc::from_document(&input);
        out.replace(0, sym("x"));
        let values: Vec<_> = out.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("x"), sym("b")]);
    }

    #[test]
    fn remove_keeps_indices_stable() {
        let input = doc("abc");
        let mut out = OutputDoc::from_document(&input);
        out.remove(1);
        let values: Vec<_> = out.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("a"), sym("c")]);
        // index 2 still addresses the original annotation
        out.replace(2, sym("z"));
        let values: Vec<_> = out.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("a"), sym("z")]);
    }

    #[test]
    fn insert_after_preserves_document_order() {
        let input = doc("ac");
        let mut out = OutputDoc::from_document(&input);
        let idx = out.insert_after(0, sym("b"));
        assert_eq!(idx, 2);
        let values: Vec<_> = out.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("a"), sym("b"), sym("c")]);
    }

    #[test]
    fn priority_union_merges_through_update_output() {
        let input = doc("a");
        let mut out = OutputDoc::from_document(&input);
        let action = Output::PriorityUnion(sym("b"));
        let chained = action.update_output(&mut out, 0, &StandardOps);
        assert!(chained.is_none());
        let values: Vec<_> = out.annotations().map(|a| a.value.clone()).collect();
        assert_eq!(values, vec![sym("b")]);
    }
}
