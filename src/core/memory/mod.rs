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

//! Memory buses (§4.2).
//!
//! Each CPU gets its own [`Bus`] instance: address decode by the top byte
//! of the address, a "fast memory" page table checked first for RAM/TCM/
//! VRAM hits, and a byte-granular IO dispatch (in [`io_ports`]) for
//! everything else. 16/32-bit IO accesses default to composing two/four
//! byte accesses unless a register documents a side-effect-bearing
//! multi-byte write.

pub mod io_ports;
pub mod page_table;
pub mod tcm;
pub mod wramcnt;

use crate::core::dma::DmaController;
use crate::core::error::{EmulatorError, Result};
use crate::core::gpu::Gpu;
use crate::core::ipc::Ipc;
use crate::core::irq::InterruptController;
use crate::core::timer::TimerUnit;
use crate::core::video_unit::VideoUnit;
use crate::core::vram::VramController;
use page_table::{PageEntry, PageTable};
use std::cell::RefCell;
use std::rc::Rc;
use tcm::TcmConfig;
use wramcnt::{WramCnt, WramView};

/// Which bus a CPU access came in on. IO handlers that have a
/// side-effect-bearing multi-byte form (IPC FIFO, GXFIFO, clip-matrix
/// readback) key off this to decide whether byte-composition is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Code,
    Data,
    System,
}

/// Which CPU a [`Bus`] instance serves. Each side sees a different address
/// map for the same physical regions (BIOS, WRAM split, TCMs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuSide {
    Arm9,
    Arm7,
}

pub const MAIN_RAM_SIZE: usize = 4 * 1024 * 1024;
pub const SHARED_WRAM_SIZE: usize = 32 * 1024;
pub const ARM7_WRAM_SIZE: usize = 64 * 1024;

/// Peripherals reachable from IO space, shared between the ARM9 and ARM7
/// [`Bus`] instances via `Rc<RefCell<_>>`, the same sharing idiom the
/// teacher crate uses to let System and Bus both reach the GPU/DMA/etc.
///
/// `irq9`/`irq7` duplicate the `Rc` each [`Bus`] already holds as its own
/// `irq` field: a bus only ever requests IRQs on its own side, but IPCSYNC's
/// remote-IRQ-request bit (§6) needs a handle to the *other* side's
/// controller, which [`io_ports`] reaches through here.
#[derive(Clone)]
pub struct SharedPeripherals {
    pub main_ram: Rc<RefCell<Vec<u8>>>,
    pub shared_wram: Rc<RefCell<[u8; SHARED_WRAM_SIZE]>>,
    pub wramcnt: Rc<RefCell<WramCnt>>,
    pub vram: Rc<RefCell<VramController>>,
    pub video_unit: Rc<RefCell<VideoUnit>>,
    pub ipc: Rc<RefCell<Ipc>>,
    pub gpu: Rc<RefCell<Gpu>>,
    pub powcnt1: Rc<RefCell<u16>>,
    pub irq9: Rc<RefCell<InterruptController>>,
    pub irq7: Rc<RefCell<InterruptController>>,
}

impl SharedPeripherals {
    pub fn new() -> Self {
        Self {
            main_ram: Rc::new(RefCell::new(vec![0u8; MAIN_RAM_SIZE])),
            shared_wram: Rc::new(RefCell::new([0u8; SHARED_WRAM_SIZE])),
            wramcnt: Rc::new(RefCell::new(WramCnt::default())),
            vram: Rc::new(RefCell::new(VramController::new())),
            video_unit: Rc::new(RefCell::new(VideoUnit::new())),
            ipc: Rc::new(RefCell::new(Ipc::new())),
            gpu: Rc::new(RefCell::new(Gpu::new())),
            powcnt1: Rc::new(RefCell::new(0)),
            irq9: Rc::new(RefCell::new(InterruptController::new())),
            irq7: Rc::new(RefCell::new(InterruptController::new())),
        }
    }
}

impl Default for SharedPeripherals {
    fn default() -> Self {
        Self::new()
    }
}

/// ARM9-only backing memory and coprocessor state reachable from its bus.
pub struct Arm9Extras {
    pub bios: Vec<u8>,
    pub itcm: Vec<u8>,
    pub dtcm: Vec<u8>,
    pub tcm_config: Rc<RefCell<TcmConfig>>,
}

/// One CPU's memory bus.
pub struct Bus {
    side: CpuSide,
    shared: SharedPeripherals,
    arm7_wram: Rc<RefCell<[u8; ARM7_WRAM_SIZE]>>,
    arm9: Option<Arm9Extras>,
    bios7: Vec<u8>,
    irq: Rc<RefCell<InterruptController>>,
    dma: Rc<RefCell<DmaController>>,
    timer: Rc<RefCell<TimerUnit>>,
    page_table: PageTable,
}

impl Bus {
    pub fn new_arm9(
        shared: SharedPeripherals,
        arm7_wram: Rc<RefCell<[u8; ARM7_WRAM_SIZE]>>,
        irq: Rc<RefCell<InterruptController>>,
        dma: Rc<RefCell<DmaController>>,
        timer: Rc<RefCell<TimerUnit>>,
        tcm_config: Rc<RefCell<TcmConfig>>,
    ) -> Self {
        let mut bus = Self {
            side: CpuSide::Arm9,
            shared,
            arm7_wram,
            arm9: Some(Arm9Extras {
                bios: Vec::new(),
                itcm: vec![0u8; 32 * 1024],
                dtcm: vec![0u8; 16 * 1024],
                tcm_config,
            }),
            bios7: Vec::new(),
            irq,
            dma,
            timer,
            page_table: PageTable::new(),
        };
        bus.rebuild_ram_pages();
        bus
    }

    pub fn new_arm7(
        shared: SharedPeripherals,
        arm7_wram: Rc<RefCell<[u8; ARM7_WRAM_SIZE]>>,
        irq: Rc<RefCell<InterruptController>>,
        dma: Rc<RefCell<DmaController>>,
        timer: Rc<RefCell<TimerUnit>>,
    ) -> Self {
        let mut bus = Self {
            side: CpuSide::Arm7,
            shared,
            arm7_wram,
            arm9: None,
            bios7: Vec::new(),
            irq,
            dma,
            timer,
            page_table: PageTable::new(),
        };
        bus.rebuild_ram_pages();
        bus
    }

    pub fn side(&self) -> CpuSide {
        self.side
    }

    pub fn load_bios9(&mut self, data: &[u8]) {
        if let Some(extras) = &mut self.arm9 {
            extras.bios = data.to_vec();
        }
    }

    pub fn load_bios7(&mut self, data: &[u8]) {
        self.bios7 = data.to_vec();
    }

    /// Main RAM (both CPUs) and the ARM7 dedicated WRAM window (ARM7 only)
    /// are mapped flatly in the fast page table; neither ever moves, so
    /// this only needs to run once at construction. Shared WRAM and VRAM
    /// are not fast-pathed here: both remap at runtime (WRAMCNT, VRAMCNT)
    /// and are invalidated back to `Unmapped` on every such write via
    /// [`Self::invalidate_shared_wram_pages`]/[`Self::invalidate_vram_pages`],
    /// falling through to the slow decode until this table grows a rebuild
    /// path for them.
    fn rebuild_ram_pages(&mut self) {
        let base = 0x0200_0000u32;
        let end = base + MAIN_RAM_SIZE as u32;
        self.page_table.map_range(base, end, |ord| {
            PageEntry::MainRam(ord * page_table::PAGE_SIZE)
        });
        if self.side == CpuSide::Arm7 {
            self.page_table.map_range(0x0380_0000, 0x0400_0000, |ord| {
                PageEntry::Arm7Wram((ord * page_table::PAGE_SIZE) & (ARM7_WRAM_SIZE as u32 - 1))
            });
        }
    }

    /// Called whenever WRAMCNT is written; invalidates the affected pages
    /// of the fast page table on both buses the caller owns (the caller is
    /// responsible for calling this once per `Bus` instance — see
    /// [`crate::core::system::System::write_wramcnt`]).
    pub fn invalidate_shared_wram_pages(&mut self) {
        self.page_table
            .invalidate_range(0x0300_0000, 0x0380_0000);
    }

    /// Called by the VRAM controller after every VRAMCNT write so stale
    /// fast-path entries never survive a remap (§4.4, §5).
    pub fn invalidate_vram_pages(&mut self, start: u32, end: u32) {
        self.page_table.invalidate_range(start, end);
    }

    fn tcm_shadow(&self, address: u32, bus_kind: BusKind) -> Option<tcm::Tcm> {
        self.arm9
            .as_ref()
            .and_then(|e| e.tcm_config.borrow().shadows(address, bus_kind))
    }

    fn wram_view(&self) -> WramView {
        let cnt = *self.shared.wramcnt.borrow();
        match self.side {
            CpuSide::Arm9 => cnt.arm9_view(),
            CpuSide::Arm7 => cnt.arm7_view(),
        }
    }

    // ---- byte-level primitives -------------------------------------------------

    pub fn read_byte(&mut self, address: u32, bus_kind: BusKind) -> u8 {
        if let Some(tcm) = self.tcm_shadow(address, bus_kind) {
            let extras = self.arm9.as_ref().unwrap();
            return match tcm {
                tcm::Tcm::Instruction => {
                    let off = (extras.tcm_config.borrow().itcm.offset_of(address) as usize)
                        % extras.itcm.len().max(1);
                    extras.itcm[off]
                }
                tcm::Tcm::Data => {
                    let off = (extras.tcm_config.borrow().dtcm.offset_of(address) as usize)
                        % extras.dtcm.len().max(1);
                    extras.dtcm[off]
                }
            };
        }

        // Fast page table, checked before the full decode switch (§4.2):
        // only the ranges [`Self::rebuild_ram_pages`] actually populates
        // (main RAM, ARM7 WRAM) hit here; everything else resolves to
        // `Unmapped` and falls through unchanged.
        match self.page_table.lookup(address) {
            PageEntry::MainRam(off) => {
                return self.shared.main_ram.borrow()[off as usize & (MAIN_RAM_SIZE - 1)];
            }
            PageEntry::Arm7Wram(off) => {
                return self.arm7_wram.borrow()[off as usize & (ARM7_WRAM_SIZE - 1)];
            }
            _ => {}
        }

        match address >> 24 {
            0x02 => {
                let off = (address as usize) % MAIN_RAM_SIZE;
                self.shared.main_ram.borrow()[off & (MAIN_RAM_SIZE - 1)]
            }
            0x03 => self.read_wram_byte(address),
            0x04 => io_ports::read_byte(self, address),
            0x05 => self.shared.vram.borrow().read_palette_byte(address),
            0x06 => self.shared.vram.borrow().read_lcdc_byte(address),
            0x07 => 0, // OAM, out of scope (2D PPU)
            0x08 | 0x09 => 0xFF, // GBA slot, unmapped in this core
            _ => match self.side {
                CpuSide::Arm9 if (0xFF00..=0xFFFF).contains(&(address >> 16)) => {
                    let extras = self.arm9.as_ref().unwrap();
                    let off = (address & 0x7FFF) as usize;
                    *extras.bios.get(off).unwrap_or(&0)
                }
                CpuSide::Arm7 if address >> 24 == 0x00 => {
                    let off = (address & 0x3FFF) as usize;
                    *self.bios7.get(off).unwrap_or(&0)
                }
                _ => 0,
            },
        }
    }

    pub fn write_byte(&mut self, address: u32, value: u8, bus_kind: BusKind) {
        if let Some(tcm) = self.tcm_shadow(address, bus_kind) {
            let extras = self.arm9.as_mut().unwrap();
            match tcm {
                tcm::Tcm::Instruction => {
                    let off = (extras.tcm_config.borrow().itcm.offset_of(address) as usize)
                        % extras.itcm.len().max(1);
                    extras.itcm[off] = value;
                }
                tcm::Tcm::Data => {
                    let off = (extras.tcm_config.borrow().dtcm.offset_of(address) as usize)
                        % extras.dtcm.len().max(1);
                    extras.dtcm[off] = value;
                }
            }
            return;
        }

        match self.page_table.lookup(address) {
            PageEntry::MainRam(off) => {
                self.shared.main_ram.borrow_mut()[off as usize & (MAIN_RAM_SIZE - 1)] = value;
                return;
            }
            PageEntry::Arm7Wram(off) => {
                self.arm7_wram.borrow_mut()[off as usize & (ARM7_WRAM_SIZE - 1)] = value;
                return;
            }
            _ => {}
        }

        match address >> 24 {
            0x02 => {
                let off = (address as usize) & (MAIN_RAM_SIZE - 1);
                self.shared.main_ram.borrow_mut()[off] = value;
            }
            0x03 => self.write_wram_byte(address, value),
            0x04 => io_ports::write_byte(self, address, value),
            0x05 => self.shared.vram.borrow_mut().write_palette_byte(address, value),
            0x06 => self.shared.vram.borrow_mut().write_lcdc_byte(address, value),
            _ => {}
        }
    }

    fn read_wram_byte(&self, address: u32) -> u8 {
        // ARM7 dedicated WRAM window (0x03800000-0x03FFFFFF on ARM7 only).
        if self.side == CpuSide::Arm7 && (0x0380_0000..0x0400_0000).contains(&address) {
            let off = (address as usize) & (ARM7_WRAM_SIZE - 1);
            return self.arm7_wram.borrow()[off];
        }
        match self.wram_view() {
            WramView::None => 0,
            WramView::Full => {
                let off = (address as usize) & (SHARED_WRAM_SIZE - 1);
                self.shared.shared_wram.borrow()[off]
            }
            WramView::FirstHalf => {
                let off = (address as usize) & (SHARED_WRAM_SIZE / 2 - 1);
                self.shared.shared_wram.borrow()[off]
            }
            WramView::SecondHalf => {
                let off = ((address as usize) & (SHARED_WRAM_SIZE / 2 - 1)) + SHARED_WRAM_SIZE / 2;
                self.shared.shared_wram.borrow()[off]
            }
        }
    }

    fn write_wram_byte(&mut self, address: u32, value: u8) {
        if self.side == CpuSide::Arm7 && (0x0380_0000..0x0400_0000).contains(&address) {
            let off = (address as usize) & (ARM7_WRAM_SIZE - 1);
            self.arm7_wram.borrow_mut()[off] = value;
            return;
        }
        match self.wram_view() {
            WramView::None => {}
            WramView::Full => {
                let off = (address as usize) & (SHARED_WRAM_SIZE - 1);
                self.shared.shared_wram.borrow_mut()[off] = value;
            }
            WramView::FirstHalf => {
                let off = (address as usize) & (SHARED_WRAM_SIZE / 2 - 1);
                self.shared.shared_wram.borrow_mut()[off] = value;
            }
            WramView::SecondHalf => {
                let off = ((address as usize) & (SHARED_WRAM_SIZE / 2 - 1)) + SHARED_WRAM_SIZE / 2;
                self.shared.shared_wram.borrow_mut()[off] = value;
            }
        }
    }

    // ---- half/word composition ---------------------------------------------

    pub fn read_half(&mut self, address: u32, bus_kind: BusKind) -> u16 {
        let address = address & !1;
        if address >> 24 == 0x04 {
            if let Some(v) = io_ports::read_half_special(self, address) {
                return v;
            }
        }
        let lo = self.read_byte(address, bus_kind) as u16;
        let hi = self.read_byte(address.wrapping_add(1), bus_kind) as u16;
        lo | (hi << 8)
    }

    pub fn write_half(&mut self, address: u32, value: u16, bus_kind: BusKind) {
        let address = address & !1;
        if address >> 24 == 0x04 && io_ports::write_half_special(self, address, value) {
            return;
        }
        self.write_byte(address, (value & 0xFF) as u8, bus_kind);
        self.write_byte(address.wrapping_add(1), (value >> 8) as u8, bus_kind);
    }

    pub fn read_word(&mut self, address: u32, bus_kind: BusKind) -> u32 {
        let address = address & !3;
        if address >> 24 == 0x04 {
            if let Some(v) = io_ports::read_word_special(self, address) {
                return v;
            }
        }
        let b0 = self.read_byte(address, bus_kind) as u32;
        let b1 = self.read_byte(address.wrapping_add(1), bus_kind) as u32;
        let b2 = self.read_byte(address.wrapping_add(2), bus_kind) as u32;
        let b3 = self.read_byte(address.wrapping_add(3), bus_kind) as u32;
        b0 | (b1 << 8) | (b2 << 16) | (b3 << 24)
    }

    pub fn write_word(&mut self, address: u32, value: u32, bus_kind: BusKind) {
        let address = address & !3;
        if address >> 24 == 0x04 && io_ports::write_word_special(self, address, value) {
            return;
        }
        self.write_byte(address, (value & 0xFF) as u8, bus_kind);
        self.write_byte(address.wrapping_add(1), ((value >> 8) & 0xFF) as u8, bus_kind);
        self.write_byte(address.wrapping_add(2), ((value >> 16) & 0xFF) as u8, bus_kind);
        self.write_byte(address.wrapping_add(3), ((value >> 24) & 0xFF) as u8, bus_kind);
    }

    pub fn irq(&self) -> &Rc<RefCell<InterruptController>> {
        &self.irq
    }
    pub fn dma(&self) -> &Rc<RefCell<DmaController>> {
        &self.dma
    }
    pub fn timer(&self) -> &Rc<RefCell<TimerUnit>> {
        &self.timer
    }
    pub fn shared(&self) -> &SharedPeripherals {
        &self.shared
    }
    pub fn shared_mut(&mut self) -> &mut SharedPeripherals {
        &mut self.shared
    }
    pub fn arm9_tcm_config(&self) -> Option<&Rc<RefCell<TcmConfig>>> {
        self.arm9.as_ref().map(|e| &e.tcm_config)
    }

    /// Raise [`EmulatorError::UnalignedAccess`] and truncate to the
    /// containing aligned unit per §7; never fatal. Call sites `log::warn!`
    /// the returned error and proceed with the truncated address.
    pub fn check_alignment(address: u32, size: u8, bus_kind: BusKind) -> Result<u32> {
        let mask = size as u32 - 1;
        if address & mask != 0 {
            Err(EmulatorError::UnalignedAccess {
                address,
                size,
                bus_kind: match bus_kind {
                    BusKind::Code => "code",
                    BusKind::Data => "data",
                    BusKind::System => "system",
                },
            })
        } else {
            Ok(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_arm9_bus() -> Bus {
        let shared = SharedPeripherals::new();
        let irq = shared.irq9.clone();
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
        Bus::new_arm9(
            shared,
            arm7_wram,
            irq,
            Rc::new(RefCell::new(DmaController::new(CpuSide::Arm9))),
            Rc::new(RefCell::new(TimerUnit::new())),
            Rc::new(RefCell::new(TcmConfig::default())),
        )
    }

    #[test]
    fn main_ram_round_trips_across_mirrors() {
        let mut bus = make_arm9_bus();
        bus.write_word(0x0200_0000, 0x1234_5678, BusKind::Data);
        assert_eq!(bus.read_word(0x0200_0000, BusKind::Data), 0x1234_5678);
    }

    #[test]
    fn alignment_check_flags_misaligned_word() {
        assert!(Bus::check_alignment(0x0200_0001, 4, BusKind::Data).is_err());
        assert!(Bus::check_alignment(0x0200_0004, 4, BusKind::Data).is_ok());
    }
}
