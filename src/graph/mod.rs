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

//! This module provides the mapping manager: the owner of the subject graph.
//! The manager keeps every node and every cut in a vector arena and builds
//! the and-inverter graph through a structural hashing table, so that the
//! host never sees two distinct AND gates with the same (canonically
//! ordered) children. All the mapping passes operate on the orders computed
//! here: the forward DFS order over the graph and the reverse topological
//! order over the nodes retained by the current cover.

mod flags;
mod node;

pub use node::NodeKind;

use fxhash::FxHashMap;
use log::warn;

use crate::common::{get, CutId, Edge, NodeId};
use crate::common::{eq_eps, gt_eps, lt_eps};
use crate::lut::LutLibrary;
use crate::mapping::cuts::Cut;
use node::Node;

// ----------------------------------------------------------------------------
// --- MANAGER ----------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The mapping manager. The host creates one with a fixed number of primary
/// inputs and outputs, builds its combinational logic with [`Manager::and`]
/// and friends, wires the outputs, and calls [`Manager::map`]; afterwards the
/// selected cover is read back through [`Manager::mapping_nodes`] and
/// [`Manager::best_cut`] and the manager is dropped.
///
/// Nodes and cuts are arena-allocated and never freed individually; the
/// reference counters on the nodes track membership in the currently
/// selected cover, not liveness.
pub struct Manager {
    /// The node arena. Slot 0 holds the constant-one node; the primary
    /// inputs follow, then the AND gates in creation order, so a node with
    /// number `k` lives in slot `k + 1`.
    pub(crate) nodes: Vec<Node>,
    /// The cut arena, together with the recycling free-list.
    pub(crate) cuts: Vec<Cut>,
    pub(crate) free_cuts: Vec<CutId>,
    /// The primary inputs, dense by input index.
    pub(crate) inputs: Vec<NodeId>,
    /// The primary outputs; wired one by one by the host.
    pub(crate) outputs: Vec<Option<Edge>>,
    /// Structural hashing table: canonically ordered fanin pair to gate.
    pub(crate) strhash: FxHashMap<(Edge, Edge), NodeId>,
    /// Forward DFS order over the graph (choice members included); the
    /// traversal order of cut enumeration and matching.
    pub(crate) dfs: Vec<NodeId>,
    /// Reverse topological order of the nodes used by the current cover.
    pub(crate) mapping: Vec<NodeId>,
    /// The LUT library the cover is costed against.
    pub(crate) lut_lib: LutLibrary,
    /// The epsilon of every floating point comparison.
    pub(crate) epsilon: f32,
    /// Externally supplied arrival times of the primary inputs.
    pub(crate) pi_arrivals: Vec<f32>,

    // configuration
    pub(crate) area_recovery: bool,
    pub(crate) switching_cost: bool,
    pub(crate) latch_paths: bool,
    pub(crate) latch_count: usize,
    pub(crate) delay_target: f32,
    pub(crate) verbose: bool,

    // results of the last mapping run
    pub(crate) required_global: f32,
    pub(crate) arrival_global: f32,
    pub(crate) area_global: f32,
}

impl Manager {
    /// Creates a manager for a graph with the given number of primary inputs
    /// and outputs. The default LUT library is the unit-cost 4-LUT library;
    /// area recovery is on, everything else is off.
    pub fn new(n_inputs: usize, n_outputs: usize, verbose: bool) -> Self {
        let mut man = Manager {
            nodes: Vec::with_capacity(1 + n_inputs),
            cuts: vec![],
            free_cuts: vec![],
            inputs: Vec::with_capacity(n_inputs),
            outputs: vec![None; n_outputs],
            strhash: FxHashMap::default(),
            dfs: vec![],
            mapping: vec![],
            lut_lib: LutLibrary::uniform(4),
            epsilon: 1e-3,
            pi_arrivals: vec![0.0; n_inputs],
            area_recovery: true,
            switching_cost: false,
            latch_paths: false,
            latch_count: 0,
            delay_target: -1.0,
            verbose,
            required_global: 0.0,
            arrival_global: 0.0,
            area_global: 0.0,
        };
        // the constant node gets number -1 and the inverted phase, so that
        // the simulated complement of an edge into it is consistent
        let mut constant = Node::new(-1, None, None, 0);
        constant.flags.set_inverted(true);
        man.nodes.push(constant);
        for i in 0..n_inputs {
            let id = NodeId(man.nodes.len());
            man.nodes.push(Node::new(i as i32, None, None, 0));
            man.inputs.push(id);
        }
        man
    }

    // ------------------------------------------------------------------------
    // --- CONFIGURATION ------------------------------------------------------
    // ------------------------------------------------------------------------

    /// Replaces the LUT library the cover is costed against.
    pub fn set_lut_library(&mut self, lib: LutLibrary) {
        self.lut_lib = lib;
    }
    /// Sets the arrival times of the primary inputs (one entry per input).
    pub fn set_pi_arrivals(&mut self, arrivals: &[f32]) {
        assert_eq!(arrivals.len(), self.inputs.len());
        self.pi_arrivals.copy_from_slice(arrivals);
    }
    /// Records the switching activity of the node with the given number.
    pub fn set_switching(&mut self, node_num: i32, value: f32) {
        let slot = (node_num + 1) as usize;
        self.nodes[slot].switching = value;
    }
    /// Sets the delay target; a negative value means the mapper is free to
    /// settle at whatever delay the delay-oriented pass achieves.
    pub fn set_delay_target(&mut self, t: f32) {
        self.delay_target = t;
    }
    /// Restricts delay optimization to the paths ending in latches; all the
    /// other paths are mapped for area.
    pub fn set_latch_paths(&mut self, on: bool) {
        self.latch_paths = on;
    }
    /// Declares how many of the trailing inputs/outputs belong to latches.
    pub fn set_latch_count(&mut self, n: usize) {
        self.latch_count = n;
    }
    /// Enables or disables the area recovery passes that follow the
    /// delay-oriented one.
    pub fn set_area_recovery(&mut self, on: bool) {
        self.area_recovery = on;
    }
    /// Makes the last recovery pass minimize switching activity instead of
    /// exact area.
    pub fn set_switching_cost(&mut self, on: bool) {
        self.switching_cost = on;
    }

    // ------------------------------------------------------------------------
    // --- GRAPH CONSTRUCTION -------------------------------------------------
    // ------------------------------------------------------------------------

    /// The edge onto the constant-one node.
    #[inline]
    pub fn const1_edge(&self) -> Edge {
        Edge::to(NodeId(0))
    }
    /// The edge onto the i-th primary input.
    #[inline]
    pub fn input_edge(&self, i: usize) -> Edge {
        Edge::to(self.inputs[i])
    }

    /// Returns the canonical AND of the two edges. Trivial identities are
    /// simplified away before the structural hashing table is consulted, so
    /// two requests for the same function always yield the same edge.
    pub fn and(&mut self, a: Edge, b: Edge) -> Edge {
        if a == b {
            return a;
        }
        if a == b.not() {
            return self.const1_edge().not();
        }
        if get!(node a.node, self).is_const() {
            return if a == self.const1_edge() { b } else { self.const1_edge().not() };
        }
        if get!(node b.node, self).is_const() {
            return if b == self.const1_edge() { a } else { self.const1_edge().not() };
        }
        // canonical order: the fanin with the smaller number comes first
        let (p1, p2) = if get!(node a.node, self).num > get!(node b.node, self).num {
            (b, a)
        } else {
            (a, b)
        };
        if let Some(&hit) = self.strhash.get(&(p1, p2)) {
            return Edge::to(hit);
        }
        let level = 1 + get!(node p1.node, self).level.max(get!(node p2.node, self).level);
        let inv = self.sim_compl(p1) & self.sim_compl(p2);
        let id = NodeId(self.nodes.len());
        let mut gate = Node::new(self.nodes.len() as i32 - 1, Some(p1), Some(p2), level);
        gate.flags.set_inverted(inv);
        self.nodes.push(gate);
        // the fanin counts taken at construction time seed the fanout
        // estimation of the first matching pass
        get!(mut node p1.node, self).refs += 1;
        get!(mut node p2.node, self).refs += 1;
        self.strhash.insert((p1, p2), id);
        Edge::to(id)
    }

    /// The OR of two edges, expressed through AND and negation.
    pub fn or(&mut self, a: Edge, b: Edge) -> Edge {
        self.and(a.not(), b.not()).not()
    }
    /// The multiplexer `if c then t else e`.
    pub fn mux(&mut self, c: Edge, t: Edge, e: Edge) -> Edge {
        let then_arm = self.and(c, t);
        let else_arm = self.and(c.not(), e);
        self.or(then_arm, else_arm)
    }
    /// The XOR of two edges.
    pub fn xor(&mut self, a: Edge, b: Edge) -> Edge {
        self.mux(a, b.not(), b)
    }

    /// Wires the i-th primary output to the given edge.
    pub fn set_output(&mut self, i: usize, e: Edge) {
        self.outputs[i] = Some(e);
    }

    /// Declares `other` to be functionally equivalent to `repr` (up to the
    /// recorded phase); `other` joins the choice class of `repr`. The host
    /// is trusted on the equivalence, nothing is verified here.
    pub fn add_choice(&mut self, repr: NodeId, other: NodeId) {
        let after = get!(node repr, self).next_equiv;
        get!(mut node other, self).next_equiv = after;
        get!(mut node other, self).repr = Some(repr);
        get!(mut node repr, self).next_equiv = Some(other);
    }

    /// The complement attribute of the function reached through this edge,
    /// accounting for the inverted phase of the target node.
    #[inline]
    pub(crate) fn sim_compl(&self, e: Edge) -> bool {
        e.compl ^ get!(node e.node, self).flags.is_inverted()
    }

    // ------------------------------------------------------------------------
    // --- FLOAT DECISIONS ----------------------------------------------------
    // ------------------------------------------------------------------------

    #[inline]
    pub(crate) fn f_eq(&self, a: f32, b: f32) -> bool {
        eq_eps(a, b, self.epsilon)
    }
    #[inline]
    pub(crate) fn f_lt(&self, a: f32, b: f32) -> bool {
        lt_eps(a, b, self.epsilon)
    }
    #[inline]
    pub(crate) fn f_gt(&self, a: f32, b: f32) -> bool {
        gt_eps(a, b, self.epsilon)
    }

    // ------------------------------------------------------------------------
    // --- TRAVERSALS ---------------------------------------------------------
    // ------------------------------------------------------------------------

    /// Collects every node reachable from the outputs in DFS order: inputs
    /// first, then the AND gates with all fanins before their fanouts. With
    /// `collect_equiv`, the members of a choice class are visited right
    /// before their representative.
    pub(crate) fn dfs_collect(&mut self, collect_equiv: bool) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for i in 0..self.inputs.len() {
            let id = self.inputs[i];
            get!(mut node id, self).flags.set_marked(true);
            order.push(id);
        }
        for i in 0..self.outputs.len() {
            if let Some(e) = self.outputs[i] {
                self.dfs_rec(e.node, collect_equiv, &mut order);
            }
        }
        for &id in order.iter() {
            get!(mut node id, self).flags.set_marked(false);
        }
        order
    }

    fn dfs_rec(&mut self, id: NodeId, equiv: bool, order: &mut Vec<NodeId>) {
        if get!(node id, self).flags.is_marked() {
            return;
        }
        if get!(node id, self).is_and() {
            let f0 = get!(node id, self).fanin0.unwrap().node;
            let f1 = get!(node id, self).fanin1.unwrap().node;
            self.dfs_rec(f0, equiv, order);
            self.dfs_rec(f1, equiv, order);
        }
        if equiv {
            if let Some(next) = get!(node id, self).next_equiv {
                self.dfs_rec(next, equiv, order);
            }
        }
        get!(mut node id, self).flags.set_marked(true);
        order.push(id);
    }

    /// Raises the level of every node of a choice class to the maximum over
    /// the class, so that sorting by level remains a valid reverse
    /// topological order for the required-time propagation.
    pub(crate) fn set_choice_levels(&mut self) {
        for i in 0..self.outputs.len() {
            if let Some(e) = self.outputs[i] {
                self.update_level_rec(e.node);
            }
        }
        for n in self.nodes.iter_mut() {
            n.flags.set_marked(false);
        }
    }

    fn update_level_rec(&mut self, id: NodeId) -> u32 {
        if !get!(node id, self).is_and() || get!(node id, self).flags.is_marked() {
            return get!(node id, self).level;
        }
        get!(mut node id, self).flags.set_marked(true);
        let f0 = get!(node id, self).fanin0.unwrap().node;
        let f1 = get!(node id, self).fanin1.unwrap().node;
        let l0 = self.update_level_rec(f0);
        let l1 = self.update_level_rec(f1);
        let mut level = 1 + l0.max(l1);
        if let Some(next) = get!(node id, self).next_equiv {
            level = level.max(self.update_level_rec(next));
        }
        get!(mut node id, self).level = level;
        if get!(node id, self).repr.is_none() {
            // align the whole class on the representative's level
            let mut walk = get!(node id, self).next_equiv;
            while let Some(m) = walk {
                get!(mut node m, self).level = level;
                walk = get!(node m, self).next_equiv;
            }
        }
        level
    }

    /// Logs how many choice classes the graph carries; their presence changes
    /// the shape of the cut lists, which is worth knowing when debugging a
    /// surprising cover.
    pub(crate) fn report_choices(&self) {
        let mut class_count = 0usize;
        let mut member_count = 0usize;
        for &id in self.dfs.iter() {
            let n = get!(node id, self);
            if n.repr.is_none() && n.next_equiv.is_some() {
                class_count += 1;
                let mut walk = Some(id);
                while let Some(m) = walk {
                    member_count += 1;
                    walk = get!(node m, self).next_equiv;
                }
            }
        }
        if class_count > 0 {
            warn!("the subject graph carries {} choice classes ({} nodes total)", class_count, member_count);
        }
    }

    /// The largest level over the whole graph.
    pub(crate) fn max_level(&self) -> u32 {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // --- COVER ACCOUNTING ---------------------------------------------------
    // ------------------------------------------------------------------------

    /// Recomputes the reference counters from the selected cuts, rebuilds
    /// `mapping` (the nodes of the cover in reverse topological order) and
    /// returns the total cover area.
    pub(crate) fn set_refs_and_area(&mut self) -> f32 {
        for n in self.nodes.iter_mut() {
            n.refs = 0;
        }
        let level_max = self.max_level() as usize;
        let mut store: Vec<Vec<NodeId>> = vec![vec![]; level_max + 1];

        let mut area = 0.0;
        for i in 0..self.outputs.len() {
            let Some(e) = self.outputs[i] else { continue };
            if get!(node e.node, self).is_const() {
                continue;
            }
            area += self.refs_area_rec(e.node, &mut store);
            get!(mut node e.node, self).refs += 1;
        }

        self.mapping.clear();
        for level in (0..=level_max).rev() {
            self.mapping.extend_from_slice(&store[level]);
        }
        area
    }

    fn refs_area_rec(&mut self, id: NodeId, store: &mut [Vec<NodeId>]) -> f32 {
        let seen = get!(node id, self).refs > 0;
        get!(mut node id, self).refs += 1;
        if seen || !get!(node id, self).is_and() {
            return 0.0;
        }
        let best = get!(node id, self).best_cut.expect("mapped node without a selected cut");
        store[get!(node id, self).level as usize].push(id);
        let leaves: Vec<NodeId> = get!(cut best, self).leaves.to_vec();
        let mut area = self.lut_lib.area_of(leaves.len());
        for leaf in leaves {
            area += self.refs_area_rec(leaf, store);
        }
        area
    }

    /// Computes the area of the current cover by a marked traversal from the
    /// outputs, without touching the reference counters.
    pub(crate) fn mapping_area_trav(&mut self) -> f32 {
        let mut visited = vec![];
        let mut area = 0.0;
        for i in 0..self.outputs.len() {
            if let Some(e) = self.outputs[i] {
                area += self.area_rec(e.node, &mut visited);
            }
        }
        for id in visited {
            get!(mut node id, self).flags.set_marked(false);
        }
        area
    }

    fn area_rec(&mut self, id: NodeId, visited: &mut Vec<NodeId>) -> f32 {
        if !get!(node id, self).is_and() || get!(node id, self).flags.is_marked() {
            return 0.0;
        }
        get!(mut node id, self).flags.set_marked(true);
        visited.push(id);
        let best = get!(node id, self).best_cut.expect("mapped node without a selected cut");
        let leaves: Vec<NodeId> = get!(cut best, self).leaves.to_vec();
        let mut area = self.lut_lib.area_of(leaves.len());
        for leaf in leaves {
            area += self.area_rec(leaf, visited);
        }
        area
    }

    // ------------------------------------------------------------------------
    // --- READING THE MAPPING BACK -------------------------------------------
    // ------------------------------------------------------------------------

    /// The nodes retained by the cover of the last `map()` run, in reverse
    /// topological order.
    pub fn mapping_nodes(&self) -> &[NodeId] {
        &self.mapping
    }
    /// The cut selected for the given node, if any.
    pub fn best_cut(&self, n: NodeId) -> Option<CutId> {
        get!(node n, self).best_cut
    }
    /// The unique number of the node (-1 for the constant).
    pub fn node_num(&self, n: NodeId) -> i32 {
        get!(node n, self).num
    }
    /// The level of the node.
    pub fn node_level(&self, n: NodeId) -> u32 {
        get!(node n, self).level
    }
    /// How many times the node is referenced by the current cover.
    pub fn node_refs(&self, n: NodeId) -> i32 {
        get!(node n, self).refs
    }
    /// The kind of the node.
    pub fn node_kind(&self, n: NodeId) -> NodeKind {
        get!(node n, self).kind()
    }
    /// The arrival time of the node under the current cover.
    pub fn arrival(&self, n: NodeId) -> f32 {
        match get!(node n, self).best_cut {
            Some(c) => get!(cut c, self).arrival,
            None => f32::NEG_INFINITY,
        }
    }
    /// The required time of the node under the current cover.
    pub fn required_time(&self, n: NodeId) -> f32 {
        get!(node n, self).required
    }
    /// Stores a host-owned scratch word on the node (typically a key back
    /// into the host netlist).
    pub fn set_node_aux(&mut self, n: NodeId, aux: u64) {
        get!(mut node n, self).aux = aux;
    }
    /// Reads the host-owned scratch word of the node.
    pub fn node_aux(&self, n: NodeId) -> u64 {
        get!(node n, self).aux
    }
    /// The arrival time of the slowest selected output.
    pub fn global_arrival(&self) -> f32 {
        self.arrival_global
    }
    /// The total area of the selected cover.
    pub fn total_area(&self) -> f32 {
        self.area_global
    }
    /// The sum of the area flows seen at the primary outputs; a cheap
    /// indicator of cover quality between the exact accountings.
    pub fn area_flow_total(&self) -> f32 {
        let mut total = 0.0;
        for out in self.outputs.iter().flatten() {
            let n = get!(node out.node, self);
            if n.is_const() {
                continue;
            }
            if let Some(c) = n.best_cut {
                total += get!(cut c, self).area_flow;
            }
        }
        total
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_traversal {
    use crate::graph::Manager;

    #[test]
    fn dfs_orders_fanins_before_fanouts() {
        let mut man = Manager::new(4, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let y = man.and(i2, i3);
        let top = man.and(x, y);
        man.set_output(0, top);

        let order = man.dfs_collect(false);
        let pos = |n| order.iter().position(|&o| o == n).unwrap();
        assert!(pos(x.node()) < pos(top.node()));
        assert!(pos(y.node()) < pos(top.node()));
        assert!(pos(i0.node()) < pos(x.node()));
        // the traversal is replayable
        assert_eq!(order, man.dfs_collect(false));
    }

    #[test]
    fn choice_members_precede_their_representative() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        // two structurally different gates declared equivalent
        let r = man.and(i0, i1);
        let m = man.and(i1, i2);
        let top = man.and(r, i2);
        man.set_output(0, top);
        man.add_choice(r.node(), m.node());

        let order = man.dfs_collect(true);
        let pos = |n| order.iter().position(|&o| o == n).unwrap();
        assert!(pos(m.node()) < pos(r.node()));
    }

    #[test]
    fn choice_levels_align_on_the_class_maximum() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let shallow = man.and(i0, i1);
        let step = man.and(i1, i2);
        let deep = man.and(step, i0);
        let top = man.and(shallow, i2);
        man.set_output(0, top);
        man.add_choice(shallow.node(), deep.node());

        man.dfs = man.dfs_collect(true);
        man.set_choice_levels();
        assert_eq!(2, man.node_level(shallow.node()));
        assert_eq!(2, man.node_level(deep.node()));
        assert_eq!(3, man.node_level(top.node()));
    }
}
