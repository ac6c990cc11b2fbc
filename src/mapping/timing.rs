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

//! This module provides the timing engine: the forward arrival computation
//! used while matching, the derivation of the global required time from the
//! selected outputs, and the backward propagation that tightens the required
//! time of every node through the leaves of its selected cut.

use log::{info, warn};

use crate::common::{get, CutId, Edge};
use crate::graph::Manager;

impl Manager {
    /// The arrival time of a cut: the slowest of its leaves plus the
    /// worst-case delay of the LUT the cut would occupy.
    pub(crate) fn cut_arrival(&self, c: CutId) -> f32 {
        let cut = get!(cut c, self);
        let mut arrival = f32::NEG_INFINITY;
        for &l in cut.leaves.iter() {
            let lb = get!(node l, self).best_cut.expect("leaf without a selected cut");
            let leaf_arrival = get!(cut lb, self).arrival;
            if arrival < leaf_arrival {
                arrival = leaf_arrival;
            }
        }
        arrival + self.lut_lib.pin_delay(cut.n_leaves(), 0)
    }

    /// The outputs that constrain the timing of the cover: all of them, or
    /// only the latch-driving ones when latch paths rule the optimization.
    fn timed_outputs(&self) -> &[Option<Edge>] {
        if self.latch_paths {
            &self.outputs[self.outputs.len().saturating_sub(self.latch_count)..]
        } else {
            &self.outputs[..]
        }
    }

    /// The arrival time of the slowest selected output.
    pub(crate) fn arrival_max(&self) -> f32 {
        let mut arrival = f32::NEG_INFINITY;
        for out in self.timed_outputs().iter().flatten() {
            let n = get!(node out.node, self);
            if n.is_const() {
                continue;
            }
            if let Some(best) = n.best_cut {
                arrival = arrival.max(get!(cut best, self).arrival);
            }
        }
        arrival
    }

    /// Derives the global required time from the current arrival times and
    /// the delay target, then back-propagates it over the cover. The target
    /// may raise the required time; it is never allowed to squeeze the cover
    /// below what the delay-oriented pass achieved.
    pub(crate) fn compute_required_global(&mut self, first_time: bool) {
        self.required_global = self.arrival_max();
        if self.delay_target >= 0.0 {
            if self.f_gt(self.required_global, self.delay_target) {
                if first_time {
                    warn!(
                        "cannot meet the target required time of {:.2}; mapping continues at {:.2}",
                        self.delay_target, self.required_global
                    );
                }
            } else if self.f_lt(self.required_global, self.delay_target) {
                if first_time {
                    info!(
                        "relaxing the required time from {:.2} to the target {:.2}",
                        self.required_global, self.delay_target
                    );
                }
                self.required_global = self.delay_target;
            }
        }
        self.compute_required(self.required_global);
    }

    /// Resets every required time, pins the selected outputs to the given
    /// figure and tightens the fanin cones through the best cuts, walking
    /// the mapped nodes in reverse topological order.
    fn compute_required(&mut self, required: f32) {
        for i in 0..self.dfs.len() {
            let id = self.dfs[i];
            get!(mut node id, self).required = f32::INFINITY;
        }
        let timed = if self.latch_paths {
            self.outputs.len().saturating_sub(self.latch_count)
        } else {
            0
        };
        for i in timed..self.outputs.len() {
            if let Some(e) = self.outputs[i] {
                get!(mut node e.node, self).required = required;
            }
        }
        for i in 0..self.mapping.len() {
            let id = self.mapping[i];
            if !get!(node id, self).is_and() {
                continue;
            }
            let best = get!(node id, self).best_cut.expect("mapped node without a selected cut");
            let leaves = get!(cut best, self).leaves.clone();
            let fanin_required =
                get!(node id, self).required - self.lut_lib.pin_delay(leaves.len(), 0);
            for &l in leaves.iter() {
                let leaf = get!(mut node l, self);
                leaf.required = leaf.required.min(fanin_required);
            }
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_timing {
    use crate::graph::Manager;
    use crate::lut::LutLibrary;

    /// A two-level tree: `out = (i0 & i1) & i2` under 2-LUTs of unit delay.
    fn chain() -> Manager {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let x = man.and(i0, i1);
        let top = man.and(x, i2);
        man.set_output(0, top);
        man.set_lut_library(LutLibrary::uniform(2));
        man
    }

    #[test]
    fn required_times_walk_back_one_lut_per_level() {
        let mut man = chain();
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();
        man.matches(true).unwrap();
        man.set_refs_and_area();
        man.compute_required_global(true);

        let x = man.outputs[0].unwrap();
        assert_eq!(2.0, man.required_global);
        assert_eq!(2.0, man.required_time(x.node()));
        // every leaf of the selected cut must settle one LUT delay earlier
        let fanin = man.nodes[x.node().0].fanin0.unwrap().node();
        assert_eq!(1.0, man.required_time(fanin));
        // the inputs one more
        assert_eq!(0.0, man.required_time(man.inputs[0]));
    }

    #[test]
    fn a_loose_delay_target_raises_the_required_time() {
        let mut man = chain();
        man.set_delay_target(10.0);
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();
        man.matches(true).unwrap();
        man.set_refs_and_area();
        man.compute_required_global(true);

        assert_eq!(10.0, man.required_global);
        let out = man.outputs[0].unwrap();
        assert_eq!(10.0, man.required_time(out.node()));
    }

    #[test]
    fn a_tight_delay_target_is_ignored_with_a_warning() {
        let mut man = chain();
        man.set_delay_target(0.5);
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();
        man.matches(true).unwrap();
        man.set_refs_and_area();
        man.compute_required_global(true);

        // the achievable delay wins over the impossible target
        assert_eq!(2.0, man.required_global);
    }
}
