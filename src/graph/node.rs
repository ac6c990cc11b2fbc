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

//! This module provides the record stored for every vertex of the mapping
//! graph inside the manager's node arena.

use crate::common::{CutId, Edge, NodeId};
use crate::graph::flags::NodeFlags;

/// The kind of a vertex of the subject graph.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeKind {
    /// The single constant-one vertex.
    Const1,
    /// A primary input.
    Input,
    /// A two-input AND gate.
    And,
}

/// One vertex of the and-inverter graph being mapped, together with all the
/// bookkeeping the mapper attaches to it. Nodes live in the manager's arena
/// and reference each other by id; nothing here owns anything.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// The unique number of this node: -1 for the constant, `0..n_inputs`
    /// for the primary inputs, then creation order for the AND gates.
    pub num: i32,
    /// The two children (absent on the constant and the inputs).
    pub fanin0: Option<Edge>,
    pub fanin1: Option<Edge>,
    /// Length of the longest AND path from any input (inputs sit at 0).
    pub level: u32,
    /// How many times the node is referenced by the currently selected
    /// cover. Mutated only by the matcher; it never goes negative.
    pub refs: i32,
    /// Inverted-phase bit and the traversal mark.
    pub flags: NodeFlags,
    /// The latest acceptable arrival time at this node (+inf until the
    /// backward pass tightens it).
    pub required: f32,
    /// Exponential moving average of `refs` across the outer iterations.
    /// Negative until the first matching pass seeds it.
    pub est_fanouts: f32,
    /// Externally supplied switching activity.
    pub switching: f32,
    /// Head of the singly-linked list of enumerated cuts. The trivial cut
    /// always sits first.
    pub cuts: Option<CutId>,
    /// The cut currently selected for this node, if any.
    pub best_cut: Option<CutId>,
    /// Choice class linkage: the class representative, and the next member
    /// on the representative's chain.
    pub repr: Option<NodeId>,
    pub next_equiv: Option<NodeId>,
    /// Scratch slot owned by the host for back-mapping to its own netlist.
    pub aux: u64,
}

impl Node {
    pub fn new(num: i32, fanin0: Option<Edge>, fanin1: Option<Edge>, level: u32) -> Self {
        Node {
            num,
            fanin0,
            fanin1,
            level,
            refs: 0,
            flags: NodeFlags::new(),
            required: f32::INFINITY,
            est_fanouts: -1.0,
            switching: 0.0,
            cuts: None,
            best_cut: None,
            repr: None,
            next_equiv: None,
            aux: 0,
        }
    }

    #[inline]
    pub fn is_and(&self) -> bool {
        self.fanin0.is_some()
    }
    #[inline]
    pub fn is_const(&self) -> bool {
        self.num == -1
    }
    #[inline]
    pub fn is_input(&self) -> bool {
        self.fanin0.is_none() && self.num >= 0
    }
    pub fn kind(&self) -> NodeKind {
        if self.is_const() {
            NodeKind::Const1
        } else if self.is_and() {
            NodeKind::And
        } else {
            NodeKind::Input
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_node {
    use super::{Node, NodeKind};
    use crate::common::{Edge, NodeId};

    #[test]
    fn kind_is_derived_from_num_and_children() {
        let constant = Node::new(-1, None, None, 0);
        assert_eq!(NodeKind::Const1, constant.kind());
        assert!(constant.is_const() && !constant.is_and() && !constant.is_input());

        let input = Node::new(0, None, None, 0);
        assert_eq!(NodeKind::Input, input.kind());
        assert!(input.is_input());

        let gate = Node::new(2, Some(Edge::to(NodeId(1))), Some(Edge::to(NodeId(2))), 1);
        assert_eq!(NodeKind::And, gate.kind());
        assert!(gate.is_and());
    }

    #[test]
    fn fresh_nodes_carry_the_sentinels() {
        let n = Node::new(5, None, None, 0);
        assert_eq!(f32::INFINITY, n.required);
        assert_eq!(-1.0, n.est_fanouts);
        assert_eq!(0, n.refs);
        assert!(n.cuts.is_none() && n.best_cut.is_none());
    }
}
