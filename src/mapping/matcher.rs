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

//! This module provides the matcher: the pass that walks the graph in
//! topological order and selects, for every AND gate, the best cut of its
//! list under the criterion of the current outer iteration. The first
//! iteration minimizes arrival time with area flow as the tie-breaker; the
//! recovery iterations minimize area flow, then exact area (or switching
//! activity), among the cuts that still meet the gate's required time.

use crate::common::{get, CutId, MappingError, NodeId};
use crate::graph::Manager;

impl Manager {
    /// Seeds the arrival time of every primary input from the host-supplied
    /// figures. When latch paths drive the optimization, the latch-fed
    /// inputs are pinned to minus infinity so they never shape the critical
    /// path.
    pub(crate) fn assign_pi_arrivals(&mut self) {
        let n = self.inputs.len();
        for i in 0..n {
            let id = self.inputs[i];
            let best = get!(node id, self).best_cut.expect("input without its elementary cut");
            let arrival = if self.latch_paths && i + self.latch_count >= n {
                f32::NEG_INFINITY
            } else {
                self.pi_arrivals[i]
            };
            get!(mut cut best, self).arrival = arrival;
        }
    }

    /// One full matching sweep under the delay-oriented criterion (arrival
    /// first, area flow as tie-breaker) or the area-flow criterion (area
    /// flow first among the cuts meeting the required time, arrival as
    /// tie-breaker). Non-representative members of choice classes are
    /// skipped; they are covered through their representative.
    pub(crate) fn matches(&mut self, delay_oriented: bool) -> Result<(), MappingError> {
        self.assign_pi_arrivals();
        let order = self.dfs.clone();
        for id in order {
            if !get!(node id, self).is_and() || get!(node id, self).repr.is_some() {
                continue;
            }
            self.match_node(id, delay_oriented)?;
        }
        Ok(())
    }

    fn match_node(&mut self, id: NodeId, delay_oriented: bool) -> Result<(), MappingError> {
        let head = get!(node id, self).cuts.expect("matching before cut enumeration");
        if get!(cut head, self).next.is_none() {
            return Err(MappingError::NodeWithoutCuts { node: get!(node id, self).num });
        }

        // refresh the fanout estimation: the raw fanout count on the first
        // pass, a moving average afterwards
        {
            let node = get!(mut node id, self);
            node.est_fanouts = if node.est_fanouts < 0.0 {
                node.refs as f32
            } else {
                (2.0 * node.est_fanouts + node.refs as f32) / 3.0
            };
        }

        let old_best = get!(node id, self).best_cut;
        let required = get!(node id, self).required;
        get!(mut node id, self).best_cut = None;

        let mut walk = get!(cut head, self).next;
        while let Some(c) = walk {
            self.cut_parameters(c);
            let arrival = get!(cut c, self).arrival;
            let flow = get!(cut c, self).area_flow;
            walk = get!(cut c, self).next;
            if self.f_gt(arrival, required) {
                continue;
            }
            let Some(best) = get!(node id, self).best_cut else {
                get!(mut node id, self).best_cut = Some(c);
                continue;
            };
            let b_arr = get!(cut best, self).arrival;
            let b_flow = get!(cut best, self).area_flow;
            let better = if delay_oriented {
                self.f_gt(b_arr, arrival) || (self.f_eq(b_arr, arrival) && self.f_gt(b_flow, flow))
            } else {
                self.f_gt(b_flow, flow) || (self.f_eq(b_flow, flow) && self.f_gt(b_arr, arrival))
            };
            if better {
                get!(mut node id, self).best_cut = Some(c);
            }
        }

        if get!(node id, self).best_cut.is_none() {
            let Some(old) = old_best else {
                return Err(MappingError::UnmeetableRequired { node: get!(node id, self).num, required });
            };
            get!(mut node id, self).best_cut = Some(old);
        }
        Ok(())
    }

    /// Computes the arrival time and the area flow of a cut from the
    /// currently selected cuts of its leaves.
    pub(crate) fn cut_parameters(&mut self, c: CutId) {
        let leaves = get!(cut c, self).leaves.clone();
        let mut arrival = f32::NEG_INFINITY;
        let mut flow = self.lut_lib.area_of(leaves.len());
        for &l in leaves.iter() {
            let lb = get!(node l, self).best_cut.expect("leaf without a selected cut");
            let leaf_arrival = get!(cut lb, self).arrival;
            let leaf_flow = get!(cut lb, self).area_flow;
            if arrival < leaf_arrival {
                arrival = leaf_arrival;
            }
            // an unreferenced leaf contributes its whole flow
            let leaf = get!(node l, self);
            if leaf.refs == 0 {
                flow += leaf_flow;
            } else {
                flow += leaf_flow / leaf.est_fanouts.max(1.0);
            }
        }
        arrival += self.lut_lib.pin_delay(leaves.len(), 0);
        let cut = get!(mut cut c, self);
        cut.arrival = arrival;
        cut.area_flow = flow;
    }

    // ------------------------------------------------------------------------
    // --- EXACT AREA ---------------------------------------------------------
    // ------------------------------------------------------------------------

    /// One full matching sweep under the exact-area criterion.
    pub(crate) fn matches_area(&mut self) -> Result<(), MappingError> {
        self.assign_pi_arrivals();
        let order = self.dfs.clone();
        for id in order {
            if !get!(node id, self).is_and() || get!(node id, self).repr.is_some() {
                continue;
            }
            self.match_node_area(id)?;
        }
        Ok(())
    }

    fn match_node_area(&mut self, id: NodeId) -> Result<(), MappingError> {
        let head = get!(node id, self).cuts.expect("matching before cut enumeration");
        if get!(cut head, self).next.is_none() {
            return Err(MappingError::NodeWithoutCuts { node: get!(node id, self).num });
        }

        let old_best = get!(node id, self).best_cut;
        let required = get!(node id, self).required;
        let referenced = get!(node id, self).refs > 0;
        if referenced {
            self.cut_deref(old_best.expect("a referenced node keeps a selected cut"))?;
        }

        get!(mut node id, self).best_cut = None;
        let mut walk = get!(cut head, self).next;
        while let Some(c) = walk {
            let arrival = self.cut_arrival(c);
            get!(mut cut c, self).arrival = arrival;
            walk = get!(cut c, self).next;
            if self.f_gt(arrival, required) {
                continue;
            }
            let area = self.cut_area_derefed(c)?;
            get!(mut cut c, self).area_flow = area;
            let Some(best) = get!(node id, self).best_cut else {
                get!(mut node id, self).best_cut = Some(c);
                continue;
            };
            let b_arr = get!(cut best, self).arrival;
            let b_area = get!(cut best, self).area_flow;
            if self.f_gt(b_area, area) || (self.f_eq(b_area, area) && self.f_gt(b_arr, arrival)) {
                get!(mut node id, self).best_cut = Some(c);
            }
        }

        let chosen = match get!(node id, self).best_cut {
            Some(c) => c,
            None => {
                // fall back on the previous selection rather than failing
                let Some(old) = old_best else {
                    return Err(MappingError::UnmeetableRequired { node: get!(node id, self).num, required });
                };
                get!(mut node id, self).best_cut = Some(old);
                old
            }
        };
        if referenced {
            let area = self.cut_ref(chosen)?;
            get!(mut cut chosen, self).area_flow = area;
        }
        Ok(())
    }

    /// References the cut: bumps the counters of its leaves and recursively
    /// reclaims the subgraphs that just became live. Returns the area that
    /// became part of the cover.
    pub(crate) fn cut_ref(&mut self, c: CutId) -> Result<f32, MappingError> {
        let leaves = get!(cut c, self).leaves.clone();
        let mut area = self.lut_lib.area_of(leaves.len());
        for &l in leaves.iter() {
            let newly_live = {
                let leaf = get!(mut node l, self);
                leaf.refs += 1;
                leaf.refs == 1
            };
            if !newly_live || !get!(node l, self).is_and() {
                continue;
            }
            let lb = get!(node l, self).best_cut.expect("live node without a selected cut");
            area += self.cut_ref(lb)?;
        }
        Ok(area)
    }

    /// Dereferences the cut: the exact mirror of [`Manager::cut_ref`].
    /// Returns the area that dropped out of the cover.
    pub(crate) fn cut_deref(&mut self, c: CutId) -> Result<f32, MappingError> {
        let leaves = get!(cut c, self).leaves.clone();
        let mut area = self.lut_lib.area_of(leaves.len());
        for &l in leaves.iter() {
            {
                let leaf = get!(mut node l, self);
                if leaf.refs == 0 {
                    return Err(MappingError::StructuralInvariant {
                        reason: format!("the reference count of node {} would drop below zero", leaf.num),
                    });
                }
                leaf.refs -= 1;
                if leaf.refs > 0 {
                    continue;
                }
            }
            if !get!(node l, self).is_and() {
                continue;
            }
            let lb = get!(node l, self).best_cut.expect("mapped node without a selected cut");
            area += self.cut_deref(lb)?;
        }
        Ok(area)
    }

    /// Exact area of a currently referenced cut: a deref/ref round trip that
    /// leaves every counter untouched.
    pub(crate) fn cut_area_refed(&mut self, c: CutId) -> Result<f32, MappingError> {
        if get!(cut c, self).n_leaves() == 1 {
            return Ok(0.0);
        }
        let freed = self.cut_deref(c)?;
        let taken = self.cut_ref(c)?;
        if !self.f_eq(freed, taken) {
            return Err(MappingError::StructuralInvariant {
                reason: format!("deref/ref round trip diverged ({} vs {})", freed, taken),
            });
        }
        Ok(freed)
    }

    /// Exact area of a currently unreferenced cut: a ref/deref round trip.
    pub(crate) fn cut_area_derefed(&mut self, c: CutId) -> Result<f32, MappingError> {
        if get!(cut c, self).n_leaves() == 1 {
            return Ok(0.0);
        }
        let taken = self.cut_ref(c)?;
        let freed = self.cut_deref(c)?;
        if !self.f_eq(freed, taken) {
            return Err(MappingError::StructuralInvariant {
                reason: format!("ref/deref round trip diverged ({} vs {})", taken, freed),
            });
        }
        Ok(freed)
    }

    // ------------------------------------------------------------------------
    // --- SWITCHING ----------------------------------------------------------
    // ------------------------------------------------------------------------

    /// One full matching sweep minimizing switched capacitance instead of
    /// exact area; identical schedule otherwise.
    pub(crate) fn matches_switch(&mut self) -> Result<(), MappingError> {
        self.assign_pi_arrivals();
        let order = self.dfs.clone();
        for id in order {
            if !get!(node id, self).is_and() || get!(node id, self).repr.is_some() {
                continue;
            }
            self.match_node_switch(id)?;
        }
        Ok(())
    }

    fn match_node_switch(&mut self, id: NodeId) -> Result<(), MappingError> {
        let head = get!(node id, self).cuts.expect("matching before cut enumeration");
        if get!(cut head, self).next.is_none() {
            return Err(MappingError::NodeWithoutCuts { node: get!(node id, self).num });
        }

        let old_best = get!(node id, self).best_cut;
        let required = get!(node id, self).required;
        let referenced = get!(node id, self).refs > 0;
        if referenced {
            self.cut_deref_switch(id, old_best.expect("a referenced node keeps a selected cut"))?;
        }

        get!(mut node id, self).best_cut = None;
        let mut walk = get!(cut head, self).next;
        while let Some(c) = walk {
            let arrival = self.cut_arrival(c);
            get!(mut cut c, self).arrival = arrival;
            walk = get!(cut c, self).next;
            if self.f_gt(arrival, required) {
                continue;
            }
            let switch = self.cut_switch_derefed(id, c)?;
            get!(mut cut c, self).area_flow = switch;
            let Some(best) = get!(node id, self).best_cut else {
                get!(mut node id, self).best_cut = Some(c);
                continue;
            };
            let b_arr = get!(cut best, self).arrival;
            let b_switch = get!(cut best, self).area_flow;
            if self.f_gt(b_switch, switch) || (self.f_eq(b_switch, switch) && self.f_gt(b_arr, arrival)) {
                get!(mut node id, self).best_cut = Some(c);
            }
        }

        let chosen = match get!(node id, self).best_cut {
            Some(c) => c,
            None => {
                let Some(old) = old_best else {
                    return Err(MappingError::UnmeetableRequired { node: get!(node id, self).num, required });
                };
                get!(mut node id, self).best_cut = Some(old);
                old
            }
        };
        if referenced {
            let switch = self.cut_ref_switch(id, chosen)?;
            get!(mut cut chosen, self).area_flow = switch;
        }
        Ok(())
    }

    /// Switching counterpart of [`Manager::cut_ref`]: accumulates the
    /// activity of the root and of every subgraph that becomes live.
    pub(crate) fn cut_ref_switch(&mut self, root: NodeId, c: CutId) -> Result<f32, MappingError> {
        let mut total = get!(node root, self).switching;
        if get!(cut c, self).n_leaves() == 1 {
            return Ok(total);
        }
        let leaves = get!(cut c, self).leaves.clone();
        for &l in leaves.iter() {
            let newly_live = {
                let leaf = get!(mut node l, self);
                leaf.refs += 1;
                leaf.refs == 1
            };
            if !newly_live {
                continue;
            }
            let lb = get!(node l, self).best_cut.expect("live node without a selected cut");
            total += self.cut_ref_switch(l, lb)?;
        }
        Ok(total)
    }

    /// Switching counterpart of [`Manager::cut_deref`].
    pub(crate) fn cut_deref_switch(&mut self, root: NodeId, c: CutId) -> Result<f32, MappingError> {
        let mut total = get!(node root, self).switching;
        if get!(cut c, self).n_leaves() == 1 {
            return Ok(total);
        }
        let leaves = get!(cut c, self).leaves.clone();
        for &l in leaves.iter() {
            {
                let leaf = get!(mut node l, self);
                if leaf.refs == 0 {
                    return Err(MappingError::StructuralInvariant {
                        reason: format!("the reference count of node {} would drop below zero", leaf.num),
                    });
                }
                leaf.refs -= 1;
                if leaf.refs > 0 {
                    continue;
                }
            }
            let lb = get!(node l, self).best_cut.expect("mapped node without a selected cut");
            total += self.cut_deref_switch(l, lb)?;
        }
        Ok(total)
    }

    /// Switched capacitance a currently unreferenced cut would add to the
    /// cover: a ref/deref round trip over the activity figures.
    pub(crate) fn cut_switch_derefed(&mut self, root: NodeId, c: CutId) -> Result<f32, MappingError> {
        self.cut_ref_switch(root, c)?;
        self.cut_deref_switch(root, c)
    }

    /// The switched capacitance of the current cover, plus one buffer for
    /// every output driven directly by an input.
    pub fn total_switching(&self) -> f32 {
        let mut total = 0.0;
        for &id in self.mapping.iter() {
            total += get!(node id, self).switching;
        }
        for out in self.outputs.iter().flatten() {
            let n = get!(node out.node, self);
            if n.is_input() && !out.is_complement() {
                total += n.switching;
            }
        }
        total
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
