// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WRAMCNT: the shared-WRAM split register (§3, §5; supplemented from
//! `original_source/` — spec.md only says "shared WRAM split by WRAMCNT"
//! without naming the split modes).
//!
//! The 32 KiB shared WRAM block sits at `0x03000000` on the ARM9 side and
//! `0x03000000`/mirrors on the ARM7 side. WRAMCNT (byte register at
//! `0x04000247`, ARM7-visible, ARM9-writable through the same IO page)
//! selects how the block is split between the two CPUs; whichever half a
//! CPU does *not* own reads as zero and ignores writes, matching §5's
//! "shared WRAM is owned by whichever CPU WRAMCNT currently maps it to."

/// One CPU's view of the 32 KiB shared WRAM block: which byte sub-range (if
/// any) it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WramView {
    /// This CPU does not see shared WRAM at all (ARM7 in mode 3's
    /// "ARM9 gets it all" case, or ARM9 in the symmetric case).
    None,
    /// The full 32 KiB block.
    Full,
    /// The first 16 KiB half.
    FirstHalf,
    /// The second 16 KiB half.
    SecondHalf,
}

/// WRAMCNT, decoded into each CPU's view.
#[derive(Debug, Clone, Copy, Default)]
pub struct WramCnt(pub u8);

impl WramCnt {
    /// The view the ARM9 gets for the current register value.
    pub fn arm9_view(&self) -> WramView {
        match self.0 & 0b11 {
            0b00 => WramView::Full,
            0b01 => WramView::SecondHalf,
            0b10 => WramView::FirstHalf,
            0b11 => WramView::None,
            _ => unreachable!(),
        }
    }

    /// The view the ARM7 gets for the current register value. ARM7's
    /// dedicated 64 KiB WRAM is separate and always available regardless of
    /// this register; this is only its view of the *shared* 32 KiB block.
    pub fn arm7_view(&self) -> WramView {
        match self.0 & 0b11 {
            0b00 => WramView::None,
            0b01 => WramView::FirstHalf,
            0b10 => WramView::SecondHalf,
            0b11 => WramView::Full,
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_0_gives_arm9_everything() {
        let w = WramCnt(0);
        assert_eq!(w.arm9_view(), WramView::Full);
        assert_eq!(w.arm7_view(), WramView::None);
    }

    #[test]
    fn mode_3_gives_arm7_everything() {
        let w = WramCnt(0b11);
        assert_eq!(w.arm9_view(), WramView::None);
        assert_eq!(w.arm7_view(), WramView::Full);
    }

    #[test]
    fn modes_1_and_2_are_complementary_halves() {
        let w1 = WramCnt(0b01);
        assert_eq!(w1.arm9_view(), WramView::SecondHalf);
        assert_eq!(w1.arm7_view(), WramView::FirstHalf);

        let w2 = WramCnt(0b10);
        assert_eq!(w2.arm9_view(), WramView::FirstHalf);
        assert_eq!(w2.arm7_view(), WramView::SecondHalf);
    }
}
