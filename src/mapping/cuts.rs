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

//! This module provides the cut record and the enumeration sweep which, for
//! every AND gate of the subject graph, merges the cut lists of its two
//! fanins into the list of K-feasible cuts rooted at the gate. Merged cuts
//! are deduplicated through a per-node canonicalization table, bucketed by
//! leaf count and pruned under a hard budget; the trivial one-leaf cut is
//! then put back at the head of the list, where every later pass expects to
//! find it.

use smallvec::SmallVec;

use crate::common::{get, CutId, MappingError, NodeId};
use crate::graph::Manager;

/// The largest number of cuts considered per node during the merge.
pub(crate) const CUTS_MAX_COMPUTE: usize = 2000;
/// The largest number of cuts retained per node (the trivial one included).
pub(crate) const CUTS_MAX_KEEP: usize = 1000;

/// Primes used to compute the hash key of a leaf array.
const HASH_PRIMES: [u64; 10] = [109, 499, 557, 619, 631, 709, 797, 881, 907, 991];

// ----------------------------------------------------------------------------
// --- CUT --------------------------------------------------------------------
// ----------------------------------------------------------------------------
/// A K-feasible cut: a set of at most `lut_max` leaves such that every path
/// from a primary input to the root passes through one of them. One LUT per
/// selected cut is what the final cover is made of.
#[derive(Debug, Clone, Default)]
pub(crate) struct Cut {
    /// The leaves, in ascending node-number order.
    pub leaves: SmallVec<[NodeId; 8]>,
    /// Bitwise OR of `1 << (leaf.num % 31)`; a cheap over-approximation of
    /// the leaf set used to prefilter infeasible merges.
    pub sign: u32,
    /// The arrival time of the cut (set by the matcher).
    pub arrival: f32,
    /// The area flow of the cut, or its exact area during the last recovery
    /// pass (set by the matcher).
    pub area_flow: f32,
    /// Whether the cut implements the complement of the root's function
    /// (only ever raised on cuts inherited across a choice class).
    pub phase: bool,
    /// The fanin cuts this cut was merged from, with the polarity of the
    /// fanin edge they were reached through. The host uses these to rebuild
    /// truth tables once the cover is final.
    pub parent_a: Option<(CutId, bool)>,
    pub parent_b: Option<(CutId, bool)>,
    /// The next cut in the root's singly-linked list.
    pub next: Option<CutId>,
}

impl Cut {
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.leaves.len()
    }
}

// ----------------------------------------------------------------------------
// --- CANONICALIZATION TABLE -------------------------------------------------
// ----------------------------------------------------------------------------
/// The open-addressed table that collapses identical leaf arrays produced by
/// different merge pairs of one node. It is logically reset between nodes,
/// but only the bins touched for the current node are actually cleared.
struct CutTable {
    bins: Vec<Option<CutId>>,
    touched: Vec<usize>,
}

impl CutTable {
    fn new() -> Self {
        CutTable {
            bins: vec![None; next_prime(10 * CUTS_MAX_COMPUTE)],
            touched: Vec::with_capacity(CUTS_MAX_COMPUTE),
        }
    }

    fn restart(&mut self) {
        for &b in self.touched.iter() {
            self.bins[b] = None;
        }
        self.touched.clear();
    }

    fn hash(&self, man: &Manager, leaves: &[NodeId]) -> usize {
        let mut key = 0u64;
        for (i, &leaf) in leaves.iter().enumerate() {
            key = key.wrapping_add(HASH_PRIMES[i % 10].wrapping_mul(get!(node leaf, man).num as u64));
        }
        (key % self.bins.len() as u64) as usize
    }

    /// Finds the bin where the given leaf array should be stored, or `None`
    /// when an identical cut is already present.
    fn lookup(&self, man: &Manager, leaves: &[NodeId]) -> Option<usize> {
        let mut b = self.hash(man, leaves);
        while let Some(cut) = self.bins[b] {
            if get!(cut cut, man).leaves.as_slice() == leaves {
                return None;
            }
            b = (b + 1) % self.bins.len();
        }
        Some(b)
    }
}

/// The smallest prime greater than or equal to `n`.
fn next_prime(n: usize) -> usize {
    fn is_prime(v: usize) -> bool {
        if v < 2 {
            return false;
        }
        let mut d = 2;
        while d * d <= v {
            if v % d == 0 {
                return false;
            }
            d += 1;
        }
        true
    }
    let mut v = n;
    while !is_prime(v) {
        v += 1;
    }
    v
}

// ----------------------------------------------------------------------------
// --- ENUMERATION ------------------------------------------------------------
// ----------------------------------------------------------------------------
impl Manager {
    /// Fetches a cut slot, preferring the recycling free-list over growing
    /// the arena.
    pub(crate) fn cut_alloc(&mut self) -> CutId {
        match self.free_cuts.pop() {
            Some(id) => {
                *get!(mut cut id, self) = Cut::default();
                id
            }
            None => {
                self.cuts.push(Cut::default());
                CutId(self.cuts.len() - 1)
            }
        }
    }

    /// Returns a cut slot to the free-list.
    pub(crate) fn cut_recycle(&mut self, id: CutId) {
        self.free_cuts.push(id);
    }

    /// The signature contribution of one leaf.
    #[inline]
    pub(crate) fn node_sign(&self, id: NodeId) -> u32 {
        1u32 << (get!(node id, self).num as u32 % 31)
    }

    /// The leaves of a cut, in ascending node-number order.
    pub fn cut_leaves(&self, c: CutId) -> &[NodeId] {
        &get!(cut c, self).leaves
    }
    /// The number of leaves of a cut.
    pub fn cut_len(&self, c: CutId) -> usize {
        get!(cut c, self).n_leaves()
    }
    /// The fanin cuts a cut was merged from, with the polarity of the edge
    /// each was reached through.
    pub fn cut_parents(&self, c: CutId) -> (Option<(CutId, bool)>, Option<(CutId, bool)>) {
        let cut = get!(cut c, self);
        (cut.parent_a, cut.parent_b)
    }
    /// Whether the cut implements the complement of its root's function.
    pub fn cut_phase(&self, c: CutId) -> bool {
        get!(cut c, self).phase
    }
    /// The area of the LUT the cut would occupy, leaves excluded.
    pub fn cut_root_area(&self, c: CutId) -> f32 {
        self.lut_lib.area_of(get!(cut c, self).n_leaves())
    }

    /// Counts the non-trivial cuts currently enumerated over the graph.
    pub fn cut_count_all(&self) -> usize {
        let mut count = 0;
        for n in self.nodes.iter() {
            let mut walk = n.cuts;
            while let Some(c) = walk {
                if get!(cut c, self).n_leaves() > 1 {
                    count += 1;
                }
                walk = get!(cut c, self).next;
            }
        }
        count
    }

    /// Assigns the elementary single-leaf cut to every primary input.
    pub(crate) fn create_pi_cuts(&mut self) {
        for i in 0..self.inputs.len() {
            let id = self.inputs[i];
            if get!(node id, self).cuts.is_some() {
                continue;
            }
            let c = self.cut_alloc();
            let sign = self.node_sign(id);
            {
                let cut = get!(mut cut c, self);
                cut.leaves.push(id);
                cut.sign = sign;
            }
            get!(mut node id, self).cuts = Some(c);
            get!(mut node id, self).best_cut = Some(c);
        }
    }

    /// Enumerates the K-feasible cuts of every AND gate, sweeping the graph
    /// once in DFS order so that both fanin lists exist whenever a gate is
    /// processed.
    pub(crate) fn enumerate_cuts(&mut self) -> Result<(), MappingError> {
        self.create_pi_cuts();
        let mut table = CutTable::new();
        let order = self.dfs.clone();
        for id in order {
            if !get!(node id, self).is_and() {
                continue;
            }
            self.compute_node_cuts(&mut table, id);
        }
        self.validate_cut_lists()
    }

    fn compute_node_cuts(&mut self, table: &mut CutTable, id: NodeId) {
        if get!(node id, self).cuts.is_some() {
            return;
        }
        let e0 = get!(node id, self).fanin0.unwrap();
        let e1 = get!(node id, self).fanin1.unwrap();
        let list1 = self.cut_list(e0.node);
        let list2 = self.cut_list(e1.node);
        let k = self.lut_lib.lut_max();

        table.restart();
        let mut buckets: Vec<Vec<CutId>> = vec![vec![]; k + 1];
        let mut counter = 0usize;
        'merge: for &c1 in list1.iter() {
            for &c2 in list2.iter() {
                let sign = get!(cut c1, self).sign | get!(cut c2, self).sign;
                if sign.count_ones() as usize > k {
                    continue;
                }
                let Some(leaves) = self.merge_leaves(c1, c2, k) else {
                    continue;
                };
                let Some(place) = table.lookup(self, &leaves) else {
                    continue;
                };
                let cut_id = self.cut_alloc();
                {
                    let cut = get!(mut cut cut_id, self);
                    cut.leaves = leaves;
                    cut.sign = sign;
                    cut.parent_a = Some((c1, e0.compl));
                    cut.parent_b = Some((c2, e1.compl));
                }
                table.bins[place] = Some(cut_id);
                table.touched.push(place);
                buckets[get!(cut cut_id, self).n_leaves()].push(cut_id);
                counter += 1;
                if counter == CUTS_MAX_COMPUTE {
                    break 'merge;
                }
            }
        }

        let mut list: Vec<CutId> = Vec::with_capacity(counter);
        for bucket in buckets.iter() {
            list.extend_from_slice(bucket);
        }
        self.sort_and_prune(&mut list);

        // the representative of a choice class also carries the cuts of all
        // the other class members
        if get!(node id, self).repr.is_none() && get!(node id, self).next_equiv.is_some() {
            let mut walk = get!(node id, self).next_equiv;
            while let Some(m) = walk {
                if let Some(head) = get!(node m, self).cuts {
                    let mut c = get!(cut head, self).next;
                    get!(mut cut head, self).next = None;
                    while let Some(cid) = c {
                        let next = get!(cut cid, self).next;
                        get!(mut cut cid, self).next = None;
                        list.push(cid);
                        c = next;
                    }
                }
                walk = get!(node m, self).next_equiv;
            }
            self.sort_and_prune(&mut list);
        }

        // it is important that the elementary cut comes first
        let trivial = self.cut_alloc();
        let sign = self.node_sign(id);
        {
            let cut = get!(mut cut trivial, self);
            cut.leaves.push(id);
            cut.sign = sign;
        }
        let mut head = trivial;
        for &c in list.iter() {
            get!(mut cut head, self).next = Some(c);
            head = c;
        }
        get!(mut cut head, self).next = None;
        get!(mut node id, self).cuts = Some(trivial);

        // a member whose phase differs from its representative keeps the
        // polarity difference on every one of its cuts
        if let Some(r) = get!(node id, self).repr {
            let differs = get!(node id, self).flags.is_inverted() != get!(node r, self).flags.is_inverted();
            if differs {
                let mut walk = get!(node id, self).cuts;
                while let Some(c) = walk {
                    get!(mut cut c, self).phase = true;
                    walk = get!(cut c, self).next;
                }
            }
        }
    }

    /// Collects the cut list of a node into an indexable vector.
    fn cut_list(&self, id: NodeId) -> Vec<CutId> {
        let mut out = vec![];
        let mut walk = get!(node id, self).cuts;
        while let Some(c) = walk {
            out.push(c);
            walk = get!(cut c, self).next;
        }
        out
    }

    /// The ordered union of the leaves of two cuts, or `None` when the union
    /// does not fit into a K-input LUT. Leaf arrays are kept sorted by node
    /// number, so this is a plain sorted merge.
    fn merge_leaves(&self, c1: CutId, c2: CutId, k: usize) -> Option<SmallVec<[NodeId; 8]>> {
        let a = &get!(cut c1, self).leaves;
        let b = &get!(cut c2, self).leaves;
        let mut out: SmallVec<[NodeId; 8]> = SmallVec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if out.len() == k {
                return None;
            }
            let (na, nb) = (get!(node a[i], self).num, get!(node b[j], self).num);
            if na < nb {
                out.push(a[i]);
                i += 1;
            } else if na > nb {
                out.push(b[j]);
                j += 1;
            } else {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
        for &leaf in a[i..].iter().chain(b[j..].iter()) {
            if out.len() == k {
                return None;
            }
            out.push(leaf);
        }
        Some(out)
    }

    /// Stable-sorts a freshly merged list by leaf count and recycles
    /// everything beyond the retention budget (one slot of which is reserved
    /// for the trivial cut).
    fn sort_and_prune(&mut self, list: &mut Vec<CutId>) {
        list.sort_by_key(|&c| get!(cut c, self).n_leaves());
        if list.len() > CUTS_MAX_KEEP - 1 {
            for i in CUTS_MAX_KEEP - 1..list.len() {
                self.cut_recycle(list[i]);
            }
            list.truncate(CUTS_MAX_KEEP - 1);
        }
    }

    /// Post-condition check of the per-node cut list invariants. A failure
    /// here is a bug of the engine, not of the caller's input.
    fn validate_cut_lists(&self) -> Result<(), MappingError> {
        let lut_max = self.lut_lib.lut_max();
        for &id in self.dfs.iter() {
            let node = get!(node id, self);
            if !node.is_and() && !node.is_input() {
                continue;
            }
            let Some(head) = node.cuts else {
                return Err(MappingError::StructuralInvariant {
                    reason: format!("node {} has no cut list", node.num),
                });
            };
            let first = get!(cut head, self);
            if first.n_leaves() != 1 || first.leaves[0] != id {
                return Err(MappingError::StructuralInvariant {
                    reason: format!("the first cut of node {} is not the trivial cut", node.num),
                });
            }
            let mut walk = Some(head);
            while let Some(c) = walk {
                let cut = get!(cut c, self);
                if cut.n_leaves() > lut_max {
                    return Err(MappingError::LibraryInconsistent {
                        reason: format!(
                            "a cut of node {} has {} leaves but the library tops out at {}",
                            node.num,
                            cut.n_leaves(),
                            lut_max
                        ),
                    });
                }
                let mut sign = 0u32;
                for w in cut.leaves.windows(2) {
                    if get!(node w[0], self).num >= get!(node w[1], self).num {
                        return Err(MappingError::StructuralInvariant {
                            reason: format!("a cut of node {} has unsorted leaves", node.num),
                        });
                    }
                }
                for &leaf in cut.leaves.iter() {
                    sign |= self.node_sign(leaf);
                }
                if sign != cut.sign {
                    return Err(MappingError::StructuralInvariant {
                        reason: format!("a cut of node {} carries a stale signature", node.num),
                    });
                }
                walk = cut.next;
            }
        }
        Ok(())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################


#[cfg(test)]
mod test_enumeration {
    use crate::graph::Manager;
    use crate::lut::LutLibrary;

    /// Builds `out = (i0 & i1) & (i2 & i3)` and enumerates with the given
    /// library.
    fn diamond(lut_max: usize) -> Manager {
        let mut man = Manager::new(4, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let i3 = man.input_edge(3);
        let x = man.and(i0, i1);
        let y = man.and(i2, i3);
        let top = man.and(x, y);
        man.set_output(0, top);
        man.set_lut_library(LutLibrary::uniform(lut_max));
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();
        man
    }

    #[test]
    fn every_list_starts_with_the_trivial_cut() {
        let man = diamond(4);
        for &id in man.dfs.iter() {
            let head = man.nodes[id.0].cuts.unwrap();
            assert_eq!(&[id], man.cut_leaves(head));
        }
    }

    #[test]
    fn the_root_sees_the_full_input_cut() {
        let man = diamond(4);
        let top = man.dfs.last().copied().unwrap();
        let mut found = false;
        let mut walk = man.nodes[top.0].cuts;
        while let Some(c) = walk {
            if man.cut_leaves(c) == man.inputs.as_slice() {
                found = true;
            }
            walk = man.cuts[c.0].next;
        }
        assert!(found, "the 4-input cut must be enumerated under a 4-LUT library");
    }

    #[test]
    fn no_cut_exceeds_the_library_size() {
        let man = diamond(2);
        for &id in man.dfs.iter() {
            let mut walk = man.nodes[id.0].cuts;
            while let Some(c) = walk {
                assert!(man.cut_len(c) <= 2);
                walk = man.cuts[c.0].next;
            }
        }
    }

    #[test]
    fn with_unit_luts_only_trivial_cuts_survive() {
        let man = diamond(1);
        for &id in man.dfs.iter() {
            if !man.nodes[id.0].is_and() {
                continue;
            }
            let head = man.nodes[id.0].cuts.unwrap();
            assert_eq!(1, man.cut_len(head));
            assert!(man.cuts[head.0].next.is_none());
        }
    }

    #[test]
    fn duplicate_leaf_sets_are_collapsed() {
        // out = (i0 & i1) & (i0 & !i1): both fanins expand to {i0, i1}
        let mut man = Manager::new(2, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let x = man.and(i0, i1);
        let y = man.and(i0, i1.not());
        let top = man.and(x, y);
        man.set_output(0, top);
        man.set_lut_library(LutLibrary::uniform(4));
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();

        let mut two_leaf_input_cuts = 0;
        let mut walk = man.nodes[top.node().0].cuts;
        while let Some(c) = walk {
            if man.cut_leaves(c) == [i0.node(), i1.node()] {
                two_leaf_input_cuts += 1;
            }
            walk = man.cuts[c.0].next;
        }
        assert_eq!(1, two_leaf_input_cuts);
    }

    #[test]
    fn signatures_match_the_leaves() {
        let man = diamond(4);
        for &id in man.dfs.iter() {
            let mut walk = man.nodes[id.0].cuts;
            while let Some(c) = walk {
                let cut = &man.cuts[c.0];
                let expect = cut.leaves.iter().fold(0u32, |s, &l| s | man.node_sign(l));
                assert_eq!(expect, cut.sign);
                walk = cut.next;
            }
        }
    }

    #[test]
    fn choice_members_donate_their_cuts_to_the_representative() {
        let mut man = Manager::new(3, 1, false);
        let i0 = man.input_edge(0);
        let i1 = man.input_edge(1);
        let i2 = man.input_edge(2);
        let r = man.and(i0, i1);
        let m = man.and(i1, i2);
        let top = man.and(r, i0.not());
        man.set_output(0, top);
        man.add_choice(r.node(), m.node());
        man.set_lut_library(LutLibrary::uniform(4));
        man.dfs = man.dfs_collect(true);
        man.enumerate_cuts().unwrap();

        // the representative's list now holds the member's {i1, i2} cut
        let mut found = false;
        let mut walk = man.nodes[r.node().0].cuts;
        while let Some(c) = walk {
            if man.cut_leaves(c) == [i1.node(), i2.node()] {
                found = true;
            }
            walk = man.cuts[c.0].next;
        }
        assert!(found);
        // while the member is left with its trivial cut only
        let mhead = man.nodes[m.node().0].cuts.unwrap();
        assert!(man.cuts[mhead.0].next.is_none());
    }
}
