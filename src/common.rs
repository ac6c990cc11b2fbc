// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module defines the most basic data types that are used throughout all
//! the code of our library: the identifiers of the arena-allocated nodes and
//! cuts, the polarized edge type, the error type returned by the mapper, and
//! the epsilon-based floating point comparators.

use thiserror::Error;

// ----------------------------------------------------------------------------
// --- IDENTIFIERS ------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The identifier of a node: it indicates the position of the referenced node
/// in the 'nodes' vector of the mapping manager.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub(crate) usize);

/// The identifier of a cut: it indicates the position of the referenced cut
/// in the 'cuts' vector of the mapping manager.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CutId(pub(crate) usize);

// ----------------------------------------------------------------------------
// --- EDGE -------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A polarized reference to a node of the mapping graph. Negation lives on
/// the edges of an and-inverter graph, so an edge is the pair of a target
/// node and a complement bit; it is deliberately *not* a tagged pointer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Edge {
    pub(crate) node: NodeId,
    pub(crate) compl: bool,
}

impl Edge {
    /// Creates a plain (non complemented) edge onto the given node.
    pub(crate) fn to(node: NodeId) -> Self {
        Edge { node, compl: false }
    }
    /// The node this edge points to, regardless of the polarity.
    #[inline]
    pub fn node(self) -> NodeId {
        self.node
    }
    /// True iff the edge carries an inverter.
    #[inline]
    pub fn is_complement(self) -> bool {
        self.compl
    }
    /// The negation of this edge.
    #[inline]
    pub fn not(self) -> Self {
        Edge { node: self.node, compl: !self.compl }
    }
    /// Negates the edge iff the given condition holds.
    #[inline]
    pub fn not_if(self, cond: bool) -> Self {
        Edge { node: self.node, compl: self.compl ^ cond }
    }
}

// ----------------------------------------------------------------------------
// --- ERRORS -----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The reasons why a mapping run can fail. Every variant aborts the current
/// `map()` call; warnings (choice statistics, an unmet delay target, odd pin
/// delays) are only ever logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    /// An internal node owns no cut besides the trivial one, yet the current
    /// criterion needed a real match for it.
    #[error("node {node} has no feasible cut besides the trivial one")]
    NodeWithoutCuts { node: i32 },
    /// No cut of the node meets its required time and there is no previously
    /// selected cut to fall back on.
    #[error("no cut of node {node} meets its required time of {required}")]
    UnmeetableRequired { node: i32, required: f32 },
    /// The LUT library cannot drive the mapper (zero size, non-positive
    /// delays, or a cut wider than the largest LUT).
    #[error("inconsistent LUT library: {reason}")]
    LibraryInconsistent { reason: String },
    /// A structural post-condition was violated. This always indicates a bug
    /// in the engine, never a problem with the caller's input.
    #[error("structural invariant violated: {reason}")]
    StructuralInvariant { reason: String },
}

// ----------------------------------------------------------------------------
// --- FLOAT COMPARISONS ------------------------------------------------------
// ----------------------------------------------------------------------------
/// True iff `a` and `b` are equal up to the given epsilon.
///
/// All floating point decisions of the engine go through these three
/// predicates; raw `==` on `f32` is never used, which is what makes repeated
/// runs produce identical covers.
///
/// # Example
/// ```
/// # use lutmap::eq_eps;
/// assert!(eq_eps(1.0, 1.0005, 1e-3));
/// assert!(!eq_eps(1.0, 1.1, 1e-3));
/// ```
#[inline]
pub fn eq_eps(a: f32, b: f32, eps: f32) -> bool {
    a > b - eps && a < b + eps
}
/// True iff `a` is strictly smaller than `b` by more than epsilon.
#[inline]
pub fn lt_eps(a: f32, b: f32, eps: f32) -> bool {
    a < b - eps
}
/// True iff `a` is strictly greater than `b` by more than epsilon.
#[inline]
pub fn gt_eps(a: f32, b: f32, eps: f32) -> bool {
    a > b + eps
}

// These macros retrieve an element of the manager by its id.
// ---> Simply to avoid the need to fight the borrow checker
macro_rules! get {
    (    node $id:expr, $man:expr) => {&    $man.nodes[$id.0]};
    (mut node $id:expr, $man:expr) => {&mut $man.nodes[$id.0]};
    (    cut  $id:expr, $man:expr) => {&    $man.cuts [$id.0]};
    (mut cut  $id:expr, $man:expr) => {&mut $man.cuts [$id.0]};
}
pub(crate) use get;

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_edge {
    use crate::common::{Edge, NodeId};

    #[test]
    fn not_flips_the_polarity_and_keeps_the_target() {
        let e = Edge::to(NodeId(42));
        assert_eq!(NodeId(42), e.node());
        assert!(!e.is_complement());

        let n = e.not();
        assert_eq!(NodeId(42), n.node());
        assert!(n.is_complement());
        assert_eq!(e, n.not());
    }

    #[test]
    fn not_if_is_conditional() {
        let e = Edge::to(NodeId(7));
        assert_eq!(e, e.not_if(false));
        assert_eq!(e.not(), e.not_if(true));
        assert_eq!(e, e.not_if(true).not_if(true));
    }
}

#[cfg(test)]
mod test_float {
    use crate::common::{eq_eps, gt_eps, lt_eps};

    const EPS: f32 = 1e-3;

    #[test]
    fn values_within_epsilon_are_equal() {
        assert!(eq_eps(2.0, 2.0, EPS));
        assert!(eq_eps(2.0, 2.0 + 0.5 * EPS, EPS));
        assert!(!eq_eps(2.0, 2.0 + 2.0 * EPS, EPS));
    }

    #[test]
    fn strict_orders_leave_an_epsilon_band() {
        assert!(lt_eps(1.0, 2.0, EPS));
        assert!(!lt_eps(2.0, 2.0, EPS));
        assert!(!lt_eps(2.0 - 0.5 * EPS, 2.0, EPS));

        assert!(gt_eps(2.0, 1.0, EPS));
        assert!(!gt_eps(2.0 + 0.5 * EPS, 2.0, EPS));
    }

    #[test]
    fn infinities_compare_as_sentinels() {
        assert!(gt_eps(f32::INFINITY, 1.0, EPS));
        assert!(lt_eps(f32::NEG_INFINITY, 0.0, EPS));
        assert!(!gt_eps(f32::NEG_INFINITY, 0.0, EPS));
    }
}
