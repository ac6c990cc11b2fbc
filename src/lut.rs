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

//! This module provides the LUT library: the immutable table of per-size area
//! and delay figures against which every cut of the subject graph is costed.
//! The library is plain data; parsing one from a file is the business of the
//! host application, not of this crate.

use log::warn;

use crate::common::MappingError;

/// The largest LUT size a library may describe.
pub const MAX_LUT_SIZE: usize = 32;

// ----------------------------------------------------------------------------
// --- LUT LIBRARY ------------------------------------------------------------
// ----------------------------------------------------------------------------
/// The description of the programmable LUTs available on the target device:
/// for every input count `k` in `1..=lut_max()`, the area of a k-input LUT
/// and its pin-to-output delays.
///
/// The mapping engine costs every k-input cut with the worst-case (first)
/// pin delay `pin_delay(k, 0)`; per-pin delays may be declared and are kept,
/// but the core never discriminates between pins.
///
/// # Example
/// ```
/// # use lutmap::LutLibrary;
/// // 4-input LUTs, area doubling with each extra input, delay k for size k.
/// let lib = LutLibrary::new(
///     &[1.0, 2.0, 4.0, 8.0],
///     &[vec![1.0], vec![2.0], vec![3.0], vec![4.0]],
/// );
/// assert_eq!(4, lib.lut_max());
/// assert_eq!(8.0, lib.area_of(4));
/// assert_eq!(3.0, lib.pin_delay(3, 0));
/// assert!(!lib.var_pin_delays());
/// ```
#[derive(Debug, Clone)]
pub struct LutLibrary {
    /// The largest LUT size of the library.
    lut_max: usize,
    /// Whether the delays were declared per pin.
    var_pin_delays: bool,
    /// `areas[k]` is the area of a k-input LUT (slot 0 is unused).
    areas: Vec<f32>,
    /// `delays[k][pin]` is the delay from the given pin of a k-input LUT
    /// (slot 0 is unused).
    delays: Vec<Vec<f32>>,
}

impl LutLibrary {
    /// Builds a library from the given area and delay tables. `areas[i]` and
    /// `delays[i]` describe the LUT of size `i + 1`; a delay row may hold a
    /// single worst-case figure or one figure per pin. Declaring more than
    /// one figure anywhere turns the variable-pin-delay flag on.
    pub fn new(areas: &[f32], delays: &[Vec<f32>]) -> Self {
        assert_eq!(areas.len(), delays.len());
        let lut_max = areas.len();
        let var_pin_delays = delays.iter().any(|row| row.len() > 1);
        let mut a = vec![0.0];
        a.extend_from_slice(areas);
        let mut d = vec![vec![]];
        d.extend(delays.iter().cloned());
        LutLibrary { lut_max, var_pin_delays, areas: a, delays: d }
    }

    /// The library used when the host does not provide one: every LUT size
    /// up to `lut_max` with unit area and unit delay.
    pub fn uniform(lut_max: usize) -> Self {
        LutLibrary {
            lut_max,
            var_pin_delays: false,
            areas: (0..=lut_max).map(|k| if k == 0 { 0.0 } else { 1.0 }).collect(),
            delays: (0..=lut_max)
                .map(|k| if k == 0 { vec![] } else { vec![1.0] })
                .collect(),
        }
    }

    /// The largest LUT size of this library.
    #[inline]
    pub fn lut_max(&self) -> usize {
        self.lut_max
    }

    /// True iff the delays were declared pin by pin.
    #[inline]
    pub fn var_pin_delays(&self) -> bool {
        self.var_pin_delays
    }

    /// The area of a k-input LUT.
    #[inline]
    pub fn area_of(&self, k: usize) -> f32 {
        self.areas[k]
    }

    /// The delay from the given pin of a k-input LUT. When the library only
    /// declares worst-case delays, every pin reads the first entry.
    #[inline]
    pub fn pin_delay(&self, k: usize, pin: usize) -> f32 {
        let row = &self.delays[k];
        if self.var_pin_delays && pin < row.len() {
            row[pin]
        } else {
            row[0]
        }
    }

    /// True iff all the worst-case delays are whole numbers. Discrete delays
    /// let the host report depths as integers.
    pub fn delays_are_discrete(&self) -> bool {
        (1..=self.lut_max).all(|k| {
            let d = self.delays[k][0];
            d == d.floor()
        })
    }

    /// Sanity-checks the library before a mapping run. An unusable library
    /// is an error; pin delays declared out of order are only reported.
    pub(crate) fn check(&self) -> Result<(), MappingError> {
        if self.lut_max == 0 || self.lut_max > MAX_LUT_SIZE {
            return Err(MappingError::LibraryInconsistent {
                reason: format!("lut_max is {} (supported range is 1..={})", self.lut_max, MAX_LUT_SIZE),
            });
        }
        for k in 1..=self.lut_max {
            if self.delays[k].is_empty() || self.delays[k][0] <= 0.0 {
                return Err(MappingError::LibraryInconsistent {
                    reason: format!("LUT of size {} has a non-positive delay", k),
                });
            }
            if self.delays[k].len() > k {
                return Err(MappingError::LibraryInconsistent {
                    reason: format!("LUT of size {} declares {} pin delays", k, self.delays[k].len()),
                });
            }
        }
        if self.var_pin_delays {
            for k in 1..=self.lut_max {
                for p in 1..self.delays[k].len() {
                    if self.delays[k][p - 1] > self.delays[k][p] {
                        warn!(
                            "pin {} of LUT {} is slower than pin {}; pin delays should be non-decreasing",
                            p - 1, k, p
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_lut_library {
    use crate::common::MappingError;
    use crate::lut::LutLibrary;

    #[test]
    fn uniform_library_has_unit_costs() {
        let lib = LutLibrary::uniform(6);
        assert_eq!(6, lib.lut_max());
        assert!(!lib.var_pin_delays());
        for k in 1..=6 {
            assert_eq!(1.0, lib.area_of(k));
            assert_eq!(1.0, lib.pin_delay(k, 0));
        }
        assert!(lib.check().is_ok());
    }

    #[test]
    fn var_pin_delays_is_inferred() {
        let flat = LutLibrary::new(&[1.0, 2.0], &[vec![1.0], vec![1.0]]);
        assert!(!flat.var_pin_delays());

        let pinned = LutLibrary::new(&[1.0, 2.0], &[vec![1.0], vec![1.0, 2.0]]);
        assert!(pinned.var_pin_delays());
        assert_eq!(2.0, pinned.pin_delay(2, 1));
        // flat libraries serve the worst case pin for every pin
        assert_eq!(1.0, flat.pin_delay(2, 1));
    }

    #[test]
    fn empty_and_non_positive_libraries_are_rejected() {
        let empty = LutLibrary::new(&[], &[]);
        assert!(matches!(empty.check(), Err(MappingError::LibraryInconsistent { .. })));

        let zero_delay = LutLibrary::new(&[1.0, 2.0], &[vec![1.0], vec![0.0]]);
        assert!(matches!(zero_delay.check(), Err(MappingError::LibraryInconsistent { .. })));
    }

    #[test]
    fn discrete_delay_detection() {
        assert!(LutLibrary::uniform(4).delays_are_discrete());
        let lib = LutLibrary::new(&[1.0, 2.0], &[vec![1.0], vec![1.5]]);
        assert!(!lib.delays_are_discrete());
    }
}
