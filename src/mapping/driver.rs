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

//! This module provides the outer mapping schedule. A run is one
//! delay-oriented matching pass that fixes the achievable depth, followed
//! (unless area recovery is off) by one area-flow pass and one
//! exact-area-or-switching pass, each performed under the required times
//! derived from the pass before it. The schedule is a fixed three passes;
//! iterating further is a quality dial the engine deliberately does not
//! turn on its own.

use log::{debug, info, warn};

use crate::common::{get, MappingError};
use crate::graph::Manager;

impl Manager {
    /// Maps the graph onto the configured LUT library: delay first, then
    /// area recovery. On success the cover is available through
    /// [`Manager::mapping_nodes`] and [`Manager::best_cut`].
    pub fn map(&mut self) -> Result<(), MappingError> {
        self.lut_lib.check()?;
        if self.latch_paths && self.latch_count == 0 {
            warn!("latch-path optimization requested on a graph without latches");
            self.latch_paths = false;
        }

        // the traversal orders and the choice-aware levels come first
        self.dfs = self.dfs_collect(true);
        self.report_choices();
        self.set_choice_levels();

        // a single-input library admits no gate-absorbing cut at all; every
        // gate then stands as its own unit LUT
        if self.lut_lib.lut_max() == 1 {
            return self.map_unit_luts();
        }

        self.enumerate_cuts()?;
        debug!("enumerated {} cuts over {} nodes", self.cut_count_all(), self.dfs.len());

        // pass 1: depth
        self.matches(true)?;
        let mut area = self.set_refs_and_area();
        if self.verbose {
            info!("Iteration 1D :  Area = {:8.1}  Delay = {:5.2}", area, self.arrival_max());
        }

        if !self.area_recovery {
            self.finish(area);
            return Ok(());
        }

        // pass 2: area flow under the depth achieved by pass 1
        self.compute_required_global(true);
        self.matches(false)?;
        area = self.mapping_area_trav();
        // the reference counters are deliberately left stale here; they are
        // recomputed wholesale right below
        if self.verbose {
            info!("Iteration 2F :  Area = {:8.1}  Delay = {:5.2}", area, self.arrival_max());
        }
        self.set_refs_and_area();

        // pass 3: exact area (or switching) under refreshed required times
        self.compute_required_global(false);
        if self.switching_cost {
            self.matches_switch()?;
        } else {
            self.matches_area()?;
        }
        area = self.set_refs_and_area();
        if self.verbose {
            info!(
                "Iteration 3{} :  Area = {:8.1}  Delay = {:5.2}",
                if self.switching_cost { 'S' } else { 'A' },
                area,
                self.arrival_max()
            );
        }

        self.finish(area);
        Ok(())
    }

    fn finish(&mut self, area: f32) {
        self.area_global = area;
        self.arrival_global = self.arrival_max();
        if !self.area_recovery {
            self.required_global = self.arrival_global;
        }
    }

    /// Degenerate mapping for a library of single-input LUTs: every gate
    /// keeps its elementary cut, arrivals follow the AND depth, and the
    /// cover is the set of reachable gates.
    fn map_unit_luts(&mut self) -> Result<(), MappingError> {
        self.enumerate_cuts()?;
        self.assign_pi_arrivals();

        let delay = self.lut_lib.pin_delay(1, 0);
        let unit_area = self.lut_lib.area_of(1);
        let order = self.dfs.clone();
        let mut gates = vec![];
        for id in order {
            if !get!(node id, self).is_and() {
                continue;
            }
            let f0 = get!(node id, self).fanin0.unwrap();
            let f1 = get!(node id, self).fanin1.unwrap();
            let arrival = self.arrival(f0.node).max(self.arrival(f1.node)) + delay;
            let head = get!(node id, self).cuts.unwrap();
            {
                let cut = get!(mut cut head, self);
                cut.arrival = arrival;
                cut.area_flow = unit_area;
            }
            get!(mut node id, self).best_cut = Some(head);
            gates.push(id);
        }
        for i in 0..self.outputs.len() {
            let Some(e) = self.outputs[i] else { continue };
            if !get!(node e.node, self).is_const() {
                get!(mut node e.node, self).refs += 1;
            }
        }

        self.area_global = unit_area * gates.len() as f32;
        self.mapping = gates.into_iter().rev().collect();
        self.arrival_global = self.arrival_max();
        self.required_global = self.arrival_global;
        let required = self.required_global;
        for i in 0..self.mapping.len() {
            let id = self.mapping[i];
            get!(mut node id, self).required = required;
        }
        Ok(())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_mapping {
    use crate::graph::Manager;
    use crate::lut::LutLibrary;

    /// The running 4-LUT library: area doubling with the input count and a
    /// delay of k for the k-input LUT.
    fn lib4() -> LutLibrary {
        LutLibrary::new(
            &[1.0, 2.0, 4.0, 8.0],
            &[vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
        )
    }

    #[test]
    fn an_output_driven_by_an_input_needs_no_lut() {
        let mut man = Manager::new(1, 1, false);
        let i0 = man.input_edge(0);
        let one = man.const1_edge();
        let out = man.and(i0, one);
        assert_eq!(i0, out);
        man.set_output(0, out);
        man.set_lut_library(lib4());
        man.set_pi_arrivals(&[3.5]);
        man.map().unwrap();

        assert!(man.mapping_nodes().is_empty());
        assert_eq!(0.0, man.total_area());
        assert_eq!(3.5, man.global_arrival());
    }

    #[test]
    fn a_single_and_becomes_a_single_lut() {
        let mut man = Manager::new(2, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let out = man.and(i0, i1);
        man.set_output(0, out);
        man.set_lut_library(lib4());
        man.map().unwrap();

        assert_eq!(1, man.mapping_nodes().len());
        assert_eq!(out.node(), man.mapping_nodes()[0]);
        let best = man.best_cut(out.node()).unwrap();
        assert_eq!(&[i0.node(), i1.node()], man.cut_leaves(best));
        assert_eq!(2.0, man.arrival(out.node()));
        assert_eq!(2.0, man.global_arrival());
        assert_eq!(2.0, man.total_area());
    }

    #[test]
    fn a_balanced_tree_is_absorbed_into_one_wide_lut() {
        // when every LUT size costs the same, collapsing the whole tree
        // into a single 4-LUT dominates any cover built from 2-LUTs
        let mut man = Manager::new(4, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let y = man.and(i2, i3);
        let top = man.and(x, y);
        man.set_output(0, top);
        man.set_lut_library(LutLibrary::new(
            &[8.0, 8.0, 8.0, 8.0],
            &[vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
        ));
        man.map().unwrap();

        assert_eq!(1, man.mapping_nodes().len());
        let best = man.best_cut(top.node()).unwrap();
        assert_eq!(
            &[i0.node(), i1.node(), i2.node(), i3.node()],
            man.cut_leaves(best)
        );
        assert_eq!(4.0, man.arrival(top.node()));
        assert_eq!(8.0, man.total_area());
        // the intermediate gates are absorbed
        assert!(!man.mapping_nodes().contains(&x.node()));
        assert!(!man.mapping_nodes().contains(&y.node()));
    }

    #[test]
    fn area_recovery_prefers_the_shared_cover() {
        // out0 and out1 both reuse x; three 2-LUTs beat two 3-LUTs
        let mut man = Manager::new(4, 2, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let o0 = man.and(x, i2);
        let o1 = man.and(x, i3);
        man.set_output(0, o0);
        man.set_output(1, o1);
        man.set_lut_library(LutLibrary::new(
            &[1.0, 2.0, 4.0, 8.0],
            &[vec![1.0], vec![1.0], vec![2.0], vec![2.0]],
        ));
        man.map().unwrap();

        assert_eq!(6.0, man.total_area());
        assert_eq!(3, man.mapping_nodes().len());
        assert!(man.mapping_nodes().contains(&x.node()));
        for &out in &[o0.node(), o1.node()] {
            assert_eq!(2, man.cut_len(man.best_cut(out).unwrap()));
        }
    }

    #[test]
    fn latch_fed_inputs_never_shape_the_critical_path() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let x = man.and(i0, i1);
        let out = man.and(x, i2);
        man.set_output(0, out);
        man.set_lut_library(LutLibrary::uniform(2));
        // the latch-fed input claims a very late arrival which must be masked
        man.set_pi_arrivals(&[0.0, 0.0, 5.0]);
        man.set_latch_paths(true);
        man.set_latch_count(1);
        man.map().unwrap();

        assert_eq!(2.0, man.global_arrival());
    }

    #[test]
    fn a_loose_delay_target_leaves_slack_for_area() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let x = man.and(i0, i1);
        let out = man.and(x, i2);
        man.set_output(0, out);
        man.set_lut_library(LutLibrary::uniform(2));
        man.set_delay_target(10.0);
        man.map().unwrap();

        assert_eq!(10.0, man.required_time(out.node()));
        assert!(man.global_arrival() <= 10.0);
        assert_eq!(2.0, man.global_arrival());
    }

    #[test]
    fn unit_luts_map_every_gate_as_itself() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let x = man.and(i0, i1);
        let out = man.and(x, i2);
        man.set_output(0, out);
        man.set_lut_library(LutLibrary::uniform(1));
        man.map().unwrap();

        assert_eq!(2, man.mapping_nodes().len());
        assert_eq!(2.0, man.total_area());
        assert_eq!(2.0, man.global_arrival());
    }

    #[test]
    fn an_unusable_library_aborts_the_run() {
        let mut man = Manager::new(2, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let out = man.and(i0, i1);
        man.set_output(0, out);
        man.set_lut_library(LutLibrary::new(&[1.0, 1.0], &[vec![1.0], vec![0.0]]));
        assert!(man.map().is_err());
    }

    #[test]
    fn disabling_area_recovery_keeps_the_depth_cover() {
        let mut man = Manager::new(4, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let y = man.and(i2, i3);
        let top = man.and(x, y);
        man.set_output(0, top);
        man.set_lut_library(lib4());
        man.set_area_recovery(false);
        man.map().unwrap();

        // the depth pass already settles on a legal cover
        assert!(man.total_area() > 0.0);
        assert!(!man.mapping_nodes().is_empty());
        assert_eq!(man.global_arrival(), man.arrival(top.node()));
    }

    #[test]
    fn selected_cuts_meet_their_required_times() {
        let mut man = Manager::new(4, 2, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let y = man.and(x, i2);
        let o0 = man.and(y, i3);
        let o1 = man.and(x, i3.not());
        man.set_output(0, o0);
        man.set_output(1, o1);
        man.set_lut_library(lib4());
        man.map().unwrap();

        for &id in man.mapping_nodes() {
            assert!(
                man.arrival(id) <= man.required_time(id) + 1e-3,
                "node {} misses its required time",
                man.node_num(id)
            );
        }
    }

    #[test]
    fn replaying_a_run_is_deterministic() {
        fn build_and_map() -> (Vec<i32>, Vec<Vec<i32>>) {
            let mut man = Manager::new(5, 2, false);
            let ins: Vec<_> = (0..5).map(|i| man.input_edge(i)).collect();
            let a = man.and(ins[0], ins[1]);
            let b = man.and(ins[1].not(), ins[2]);
            let c = man.and(a, b);
            let d = man.xor(ins[3], ins[4]);
            let o0 = man.and(c, d);
            let o1 = man.or(b, d.not());
            man.set_output(0, o0);
            man.set_output(1, o1);
            man.set_lut_library(LutLibrary::new(
                &[1.0, 2.0, 4.0, 8.0],
                &[vec![1.0], vec![1.0], vec![2.0], vec![2.0]],
            ));
            man.map().unwrap();

            let nodes = man.mapping_nodes().iter().map(|&n| man.node_num(n)).collect();
            let leaves = man
                .mapping_nodes()
                .iter()
                .map(|&n| {
                    man.cut_leaves(man.best_cut(n).unwrap())
                        .iter()
                        .map(|&l| man.node_num(l))
                        .collect()
                })
                .collect();
            (nodes, leaves)
        }

        let (nodes1, leaves1) = build_and_map();
        let (nodes2, leaves2) = build_and_map();
        assert_eq!(nodes1, nodes2);
        assert_eq!(leaves1, leaves2);
    }

    #[test]
    fn switching_recovery_accounts_activity() {
        let mut man = Manager::new(4, 2, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let o0 = man.and(x, i2);
        let o1 = man.and(x, i3);
        man.set_output(0, o0);
        man.set_output(1, o1);
        man.set_lut_library(LutLibrary::new(
            &[1.0, 2.0, 4.0, 8.0],
            &[vec![1.0], vec![1.0], vec![2.0], vec![2.0]],
        ));
        man.set_switching_cost(true);
        for num in 0..7 {
            man.set_switching(num, 0.5);
        }
        man.map().unwrap();

        assert!(!man.mapping_nodes().is_empty());
        assert!(man.total_switching() > 0.0);
        // the cover is still a legal one
        for &id in man.mapping_nodes() {
            assert!(man.arrival(id) <= man.required_time(id) + 1e-3);
        }
    }
}
