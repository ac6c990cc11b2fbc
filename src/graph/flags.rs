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

//! This module provides a compact set of boolean flags attached to every node
//! of the mapping graph.

/// This structure stores a compact set of flags relating to a given node.
/// It maintains the following:
/// - Inverted   which is true iff the node, as created by structural hashing,
///              represents the complement of its natural function
/// - Marked     which is true iff the node was visited by the traversal that
///              is currently in flight
///
/// # Important Note
/// The marked flag is scratch state: every traversal that raises it must
/// lower it again before returning, so that the next traversal starts from a
/// clean graph.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct NodeFlags(u8);
impl NodeFlags {
    /// The position of the inverted-phase flag.
    pub const F_INV: u8 = 1;
    /// The position of the traversal mark.
    pub const F_MARK: u8 = 2;

    /// Creates a clean set of flags.
    #[inline]
    pub fn new() -> Self {
        NodeFlags(0)
    }
    /// Returns true iff the inverted-phase flag is turned on.
    #[inline]
    pub fn is_inverted(self) -> bool {
        self.test(NodeFlags::F_INV)
    }
    /// Returns true iff the traversal mark is turned on.
    #[inline]
    pub fn is_marked(self) -> bool {
        self.test(NodeFlags::F_MARK)
    }
    /// Sets the inverted-phase flag to the given value.
    #[inline]
    pub fn set_inverted(&mut self, inv: bool) {
        self.set(NodeFlags::F_INV, inv)
    }
    /// Sets the traversal mark to the given value.
    #[inline]
    pub fn set_marked(&mut self, marked: bool) {
        self.set(NodeFlags::F_MARK, marked)
    }
    /// Checks whether all the flags encoded in the given mask are turned on.
    #[inline]
    pub fn test(self, mask: u8) -> bool {
        self.0 & mask == mask
    }
    /// Sets the value of a given flag to the selected polarity.
    #[inline]
    pub fn set(&mut self, flag: u8, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################
