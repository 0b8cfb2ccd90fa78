//! The constraint capability that guards arcs and fills annotations.
//!
//! The engine never inspects constraint internals. Matching against an
//! annotation, unification for determinization and intersection, negation
//! for guard partitioning and priority union for composition are all
//! expressed through this trait.

use core::fmt;
use core::hash::Hash;

/// An opaque feature-structure-like value.
///
/// Implementations must give `unify` intersection semantics: the result
/// matches exactly the candidates both operands match, and `None` means the
/// combination is unsatisfiable. `negation` returns `None` when the
/// complement cannot be represented (or is empty).
pub trait Constraint: Clone + PartialEq + Eq + Hash + fmt::Debug {
    /// Variable bindings threaded through matching. Use `()` when the
    /// constraint language has no variables.
    type Bindings: Clone + Default + PartialEq + fmt::Debug;

    /// Does `candidate` satisfy this constraint? May record variable
    /// bindings; on a failed match the bindings are discarded by the caller.
    fn matches(&self, candidate: &Self, use_defaults: bool, bindings: &mut Self::Bindings) -> bool;

    /// Greatest lower bound of two constraints, `None` if unsatisfiable.
    fn unify(&self, other: &Self) -> Option<Self>;

    /// Complement of this constraint, `None` if empty or unrepresentable.
    fn negation(&self) -> Option<Self>;

    /// Asymmetric union: values from `other` win on conflict.
    fn priority_union(&self, other: &Self) -> Self;

    /// True when this constraint matches every candidate.
    fn is_any(&self) -> bool;

    /// Can any candidate satisfy both constraints?
    fn is_unifiable(&self, other: &Self) -> bool {
        self.unify(other).is_some()
    }
}
