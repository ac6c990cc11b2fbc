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

//! # LUTMAP
//! LUTMAP is a technology mapping engine for variable-size-LUT FPGAs. You
//! hand it a combinational and-inverter graph (an AIG: two-input AND gates
//! with negation carried on the edges) together with a LUT library — the
//! per-size area and delay figures of the programmable LUTs of your target
//! device — and it covers the graph with K-input LUTs, minimizing the depth
//! of the cover first and recovering area within that depth afterwards.
//!
//! The engine enumerates, for every gate, a bounded list of K-feasible cuts
//! (sets of at most K nodes through which every input-to-gate path passes),
//! then repeatedly selects one cut per gate under progressively stricter
//! cost functions: arrival time first, then area flow, then exact area
//! obtained by reference-counting the cover (or switched capacitance, when
//! so configured). Functionally equivalent implementations of the same
//! signal may be declared as *choices*; the engine then picks freely across
//! the whole equivalence class.
//!
//! The library is purely in-memory: no file format, no threads, and two runs
//! over byte-identical inputs select byte-identical covers.
//!
//! ## Quick Example
//! The following maps a tiny two-output circuit onto 4-input LUTs and walks
//! the selected cover.
//!
//! ```
//! use lutmap::{LutLibrary, Manager};
//!
//! // 1. Create a manager for two inputs and one output, then describe the
//! //    logic. Negation is free: it lives on the edges.
//! let mut man = Manager::new(2, 1, false);
//! let a = man.input_edge(0);
//! let b = man.input_edge(1);
//! let f = man.xor(a, b);
//! man.set_output(0, f);
//!
//! // 2. Describe the target device: LUTs of 1 to 4 inputs, area growing
//! //    with the input count, unit delay regardless of size.
//! man.set_lut_library(LutLibrary::new(
//!     &[1.0, 2.0, 4.0, 8.0],
//!     &[vec![1.0], vec![1.0], vec![1.0], vec![1.0]],
//! ));
//!
//! // 3. Map, and read the cover back.
//! man.map().unwrap();
//! let cover = man.mapping_nodes();
//!
//! // the xor of two variables fits in a single 2-input LUT
//! assert_eq!(1, cover.len());
//! let top = man.best_cut(cover[0]).unwrap();
//! assert_eq!(&[a.node(), b.node()], man.cut_leaves(top));
//! assert_eq!(2.0, man.total_area());
//! assert_eq!(1.0, man.global_arrival());
//! ```
//!
//! ## Going further
//! `Manager` is the whole API surface: graph construction (`and`, `or`,
//! `xor`, `mux`, `add_choice`), configuration (`set_lut_library`,
//! `set_pi_arrivals`, `set_delay_target`, `set_area_recovery`,
//! `set_switching_cost`, `set_latch_paths`), one `map()` call, and the
//! readback accessors (`mapping_nodes`, `best_cut`, `cut_leaves`,
//! `arrival`, `required_time`, `global_arrival`, `total_area`).

mod common;
mod graph;
mod lut;
mod mapping;

pub use common::*;
pub use graph::*;
pub use lut::*;
