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

//! ARM9 CP15 system control coprocessor (§2, §4.3; register layout
//! supplemented from `original_source/src/lunar/src/nds/arm9/cp15.hpp`,
//! which names the `reg_control`/`reg_dtcm`/`reg_itcm` registers spec.md
//! only calls "TCM base/size, cache stubs").
//!
//! Reached from an MRC/MCR handler via `(cn, cm, opcode2)`, matching the
//! coprocessor's real addressing; only the registers this core acts on are
//! implemented; everything else reads back zero and ignores writes.

use crate::core::memory::tcm::{TcmConfig, TcmWindow};

/// Register 1: cache/MPU/vector-select control bits. ICache/DCache enable
/// are stored and read back but never change timing (§2's "cache stubs").
const CONTROL_ICACHE_ENABLE: u32 = 1 << 12;
const CONTROL_DCACHE_ENABLE: u32 = 1 << 2;
const CONTROL_HIGH_VECTORS: u32 = 1 << 13;

#[derive(Debug, Clone, Default)]
pub struct Cop15 {
    control: u32,
    reg_dtcm: u32,
    reg_itcm: u32,
    wait_for_irq: bool,
}

impl Cop15 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `MRC p15, 0, Rd, c<cn>, c<cm>, <opcode2>`.
    pub fn read(&self, cn: u8, cm: u8, opcode2: u8) -> u32 {
        match (cn, cm, opcode2) {
            (0, 0, 0) => 0x4105_9461, // Main ID register: ARM946E-S, matching NDS ARM9.
            (1, 0, 0) => self.control,
            (9, 1, 0) => self.reg_dtcm,
            (9, 1, 1) => self.reg_itcm,
            _ => 0,
        }
    }

    /// `MCR p15, 0, Rd, c<cn>, c<cm>, <opcode2>`.
    pub fn write(&mut self, cn: u8, cm: u8, opcode2: u8, value: u32) {
        match (cn, cm, opcode2) {
            (1, 0, 0) => self.control = value,
            (7, _, _) => {
                // Cache-maintenance operations (clean/invalidate by set/way
                // or MVA): accepted as no-ops, timing-irrelevant per §2.
            }
            (9, 1, 0) => self.reg_dtcm = value,
            (9, 1, 1) => self.reg_itcm = value,
            _ => {}
        }
    }

    /// `MCR p15, 0, Rd, c7, c0, 4` (wait-for-interrupt) routes here instead
    /// of through `write`, since real hardware dedicates a distinct
    /// coprocessor operation to it rather than a plain register.
    pub fn request_wait_for_irq(&mut self) {
        self.wait_for_irq = true;
    }

    pub fn take_wait_for_irq(&mut self) -> bool {
        std::mem::take(&mut self.wait_for_irq)
    }

    pub fn icache_enabled(&self) -> bool {
        self.control & CONTROL_ICACHE_ENABLE != 0
    }

    pub fn dcache_enabled(&self) -> bool {
        self.control & CONTROL_DCACHE_ENABLE != 0
    }

    /// ARM9 exception base: `0xFFFF0000` when the control register's
    /// high-vectors bit is set, `0x00000000` otherwise (§4.3).
    pub fn exception_base(&self) -> u32 {
        if self.control & CONTROL_HIGH_VECTORS != 0 {
            0xFFFF_0000
        } else {
            0
        }
    }

    /// Decode `reg_dtcm`/`reg_itcm` into the [`TcmConfig`] the memory bus
    /// consults on every access (§4.2). Field layout: bits 31..12 base
    /// address, bits 5..1 size index N (region size = `512 << N`), bit 0
    /// enable.
    pub fn tcm_config(&self) -> TcmConfig {
        TcmConfig {
            dtcm: decode_window(self.reg_dtcm),
            itcm: decode_window(self.reg_itcm),
        }
    }
}

fn decode_window(reg: u32) -> TcmWindow {
    let enabled = reg & 1 != 0;
    let size_index = (reg >> 1) & 0x1F;
    TcmWindow {
        base: reg & 0xFFFF_F000,
        size_shift: (9 + size_index) as u8,
        enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtcm_config_decodes_base_and_size() {
        let mut cop15 = Cop15::new();
        // base = 0x0080_0000, size index 5 -> 512<<5 = 16 KiB, enabled.
        cop15.write(9, 1, 0, 0x0080_0000 | (5 << 1) | 1);
        let cfg = cop15.tcm_config();
        assert_eq!(cfg.dtcm.base, 0x0080_0000);
        assert_eq!(cfg.dtcm.size_shift, 14);
        assert!(cfg.dtcm.enabled);
    }

    #[test]
    fn high_vectors_bit_selects_exception_base() {
        let mut cop15 = Cop15::new();
        assert_eq!(cop15.exception_base(), 0);
        cop15.write(1, 0, 0, CONTROL_HIGH_VECTORS);
        assert_eq!(cop15.exception_base(), 0xFFFF_0000);
    }
}
