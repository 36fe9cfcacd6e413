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

//! ARM9 tightly-coupled memory windows (§4.2), configured through CP15
//! register 9 (supplemented from `original_source/cp15.cpp`: spec.md only
//! names "TCM base/size" as a CP15 responsibility without the register
//! layout).
//!
//! ITCM shadows any Code/Data access inside its window when enabled; DTCM
//! shadows Data-bus accesses only. Both windows are power-of-two sized and
//! base-aligned to their size, matching the real CP15 field encoding.

use crate::core::memory::BusKind;

/// One TCM's base/size/enable state.
#[derive(Debug, Clone, Copy)]
pub struct TcmWindow {
    pub base: u32,
    /// log2(size in bytes); 0 means "disabled regardless of `enabled`".
    pub size_shift: u8,
    pub enabled: bool,
}

impl Default for TcmWindow {
    fn default() -> Self {
        Self {
            base: 0,
            size_shift: 0,
            enabled: false,
        }
    }
}

impl TcmWindow {
    pub fn contains(&self, address: u32) -> bool {
        if !self.enabled || self.size_shift == 0 {
            return false;
        }
        let size = 1u64 << self.size_shift;
        let base = self.base as u64;
        let addr = address as u64;
        addr >= base && addr < base + size
    }

    pub fn offset_of(&self, address: u32) -> u32 {
        address.wrapping_sub(self.base)
    }

    pub fn end(&self) -> u32 {
        if self.size_shift == 0 {
            self.base
        } else {
            self.base.wrapping_add(1u32 << self.size_shift)
        }
    }
}

/// ITCM + DTCM configuration for one ARM9 core.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcmConfig {
    pub itcm: TcmWindow,
    pub dtcm: TcmWindow,
}

impl TcmConfig {
    /// Does this access land inside a currently-enabled TCM window? ITCM
    /// covers Code and Data; DTCM covers Data only (§4.2).
    pub fn shadows(&self, address: u32, bus_kind: BusKind) -> Option<Tcm> {
        match bus_kind {
            BusKind::Code | BusKind::Data | BusKind::System => {
                if self.dtcm.contains(address) && bus_kind != BusKind::Code {
                    return Some(Tcm::Data);
                }
                if self.itcm.contains(address) {
                    return Some(Tcm::Instruction);
                }
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tcm {
    Instruction,
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itcm_shadows_code_and_data() {
        let cfg = TcmConfig {
            itcm: TcmWindow {
                base: 0,
                size_shift: 15, // 32 KiB
                enabled: true,
            },
            dtcm: TcmWindow::default(),
        };
        assert_eq!(cfg.shadows(0x100, BusKind::Code), Some(Tcm::Instruction));
        assert_eq!(cfg.shadows(0x100, BusKind::Data), Some(Tcm::Instruction));
        assert_eq!(cfg.shadows(0x9000, BusKind::Code), None);
    }

    #[test]
    fn dtcm_shadows_data_only() {
        let cfg = TcmConfig {
            itcm: TcmWindow::default(),
            dtcm: TcmWindow {
                base: 0x0080_0000,
                size_shift: 14, // 16 KiB
                enabled: true,
            },
        };
        assert_eq!(cfg.shadows(0x0080_0010, BusKind::Data), Some(Tcm::Data));
        assert_eq!(cfg.shadows(0x0080_0010, BusKind::Code), None);
    }
}
