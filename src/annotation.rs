//! Annotated input documents.

use crate::constraint::Constraint;
use crate::Direction;

/// A half-open offset range over a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// Leading edge with respect to the traversal direction.
    #[inline(always)]
    pub fn start(&self, dir: Direction) -> usize {
        match dir {
            Direction::LeftToRight => self.start,
            Direction::RightToLeft => self.end,
        }
    }

    /// Trailing edge with respect to the traversal direction.
    #[inline(always)]
    pub fn end(&self, dir: Direction) -> usize {
        match dir {
            Direction::LeftToRight => self.end,
            Direction::RightToLeft => self.start,
        }
    }

    #[inline(always)]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Span) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Span {
    fn cmp(&self, other: &Span) -> core::cmp::Ordering {
        // longer spans sort before the spans they contain
        self.start
            .cmp(&other.start)
            .then_with(|| other.end.cmp(&self.end))
    }
}

/// One annotated position: a span, its constraint value, and flags the
/// traversal consults. Co-located alternatives share a span; containment is
/// expressed by `depth`.
#[derive(Debug, Clone)]
pub struct Annotation<C> {
    pub span: Span,
    pub value: C,
    pub optional: bool,
    pub depth: usize,
}

impl<C> Annotation<C> {
    pub fn new(span: Span, value: C) -> Annotation<C> {
        Annotation {
            span,
            value,
            optional: false,
            depth: 0,
        }
    }

    pub fn optional(mut self, optional: bool) -> Annotation<C> {
        self.optional = optional;
        self
    }

    pub fn depth(mut self, depth: usize) -> Annotation<C> {
        self.depth = depth;
        self
    }
}

/// A flattened sequence of annotations over a total span.
#[derive(Debug, Clone)]
pub struct Document<C> {
    span: Span,
    annotations: Vec<Annotation<C>>,
}

impl<C: Constraint> Document<C> {
    pub fn new(span: Span) -> Document<C> {
        Document {
            span,
            annotations: Vec::new(),
        }
    }

    pub fn push(&mut self, ann: Annotation<C>) {
        self.annotations.push(ann);
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn annotations(&self) -> &[Annotation<C>] {
        &self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    #[test]
    fn span_ordering_puts_containing_span_first() {
        let outer = Span::new(0, 3);
        let inner = Span::new(0, 1);
        assert!(outer < inner);
        assert!(Span::new(0, 1) < Span::new(1, 2));
    }

    #[test]
    fn span_edges_flip_with_direction() {
        let span = Span::new(2, 5);
        assert_eq!(span.start(Direction::LeftToRight), 2);
        assert_eq!(span.end(Direction::LeftToRight), 5);
        assert_eq!(span.start(Direction::RightToLeft), 5);
        assert_eq!(span.end(Direction::RightToLeft), 2);
    }

    #[test]
    fn overlap_is_strict() {
        assert!(Span::new(0, 2).overlaps(&Span::new(1, 3)));
        assert!(!Span::new(0, 2).overlaps(&Span::new(2, 4)));
    }
}
