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

//! DMA engine (§4.8). Four channels per CPU.
//!
//! The controller only holds channel register state and latches; it never
//! owns the bus. [`DmaController::execute_pending`] is called by
//! [`crate::core::system::System`] with a borrowed `&mut Bus` for the
//! duration of the transfer, avoiding the circular CPU/memory/peripheral
//! ownership the original implementation has (§9).

use crate::core::irq::{sources, InterruptController};
use crate::core::memory::{Bus, BusKind, CpuSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Increment,
    Decrement,
    Fixed,
    /// Destination only: reload to the original value after each repeat.
    IncrementReload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    Half,
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTiming {
    Immediate,
    VBlank,
    /// ARM9 only.
    HBlank,
    /// Cartridge data-ready (Slot1).
    Slot1,
    /// ARM9 only: GXFIFO observed half-empty.
    GxFifoHalfEmpty,
}

struct Latch {
    src: u32,
    dst: u32,
    remaining: u32,
}

pub struct DmaChannel {
    pub src: u32,
    pub dst: u32,
    pub length: u32,
    pub src_mode: AddressMode,
    pub dst_mode: AddressMode,
    pub size: TransferSize,
    pub timing: StartTiming,
    pub repeat: bool,
    pub irq_on_complete: bool,
    pub enabled: bool,
    latch: Option<Latch>,
    pending: bool,
}

impl Default for DmaChannel {
    fn default() -> Self {
        Self {
            src: 0,
            dst: 0,
            length: 0,
            src_mode: AddressMode::Increment,
            dst_mode: AddressMode::Increment,
            size: TransferSize::Half,
            timing: StartTiming::Immediate,
            repeat: false,
            irq_on_complete: false,
            enabled: false,
            latch: None,
            pending: false,
        }
    }
}

/// Four-channel DMA controller for one CPU.
pub struct DmaController {
    side: CpuSide,
    pub channels: [DmaChannel; 4],
}

impl DmaController {
    pub fn new(side: CpuSide) -> Self {
        Self {
            side,
            channels: [
                DmaChannel::default(),
                DmaChannel::default(),
                DmaChannel::default(),
                DmaChannel::default(),
            ],
        }
    }

    /// Write CHCR's enable bit. On the 0->1 edge, latches src/dst/length
    /// (size-aligned) and, if the timing is Immediate, marks the channel
    /// pending for the next `execute_pending` call.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        let ch = &mut self.channels[index];
        let was_enabled = ch.enabled;
        ch.enabled = enabled;
        if enabled && !was_enabled {
            let unit = match ch.size {
                TransferSize::Half => 1u32,
                TransferSize::Word => 3u32,
            };
            ch.latch = Some(Latch {
                src: ch.src & !unit,
                dst: ch.dst & !unit,
                remaining: ch.length,
            });
            if ch.timing == StartTiming::Immediate {
                ch.pending = true;
            }
        }
        if !enabled {
            ch.latch = None;
            ch.pending = false;
        }
    }

    /// Mark every enabled channel whose timing matches `timing` as pending.
    /// Called by [`crate::core::system::System`] on the corresponding
    /// scheduler event (VBlank/HBlank/Slot1) or GXFIFO transition.
    pub fn trigger(&mut self, timing: StartTiming) {
        for ch in &mut self.channels {
            if ch.enabled && ch.timing == timing && ch.latch.is_some() {
                ch.pending = true;
            }
        }
    }

    /// Run every pending channel to completion, one transfer unit at a
    /// time, against `bus`. Repeat-timed channels re-latch for the next
    /// trigger instead of disabling.
    pub fn execute_pending(&mut self, bus: &mut Bus, irq: &mut InterruptController) {
        for index in 0..self.channels.len() {
            if !self.channels[index].pending {
                continue;
            }
            self.run_channel(index, bus, irq);
        }
    }

    fn run_channel(&mut self, index: usize, bus: &mut Bus, irq: &mut InterruptController) {
        let ch = &mut self.channels[index];
        ch.pending = false;
        let Some(latch) = ch.latch.as_mut() else {
            return;
        };

        let step = match ch.size {
            TransferSize::Half => 2i64,
            TransferSize::Word => 4i64,
        };

        while latch.remaining > 0 {
            match ch.size {
                TransferSize::Half => {
                    let v = bus.read_half(latch.src, BusKind::Data);
                    bus.write_half(latch.dst, v, BusKind::Data);
                }
                TransferSize::Word => {
                    let v = bus.read_word(latch.src, BusKind::Data);
                    bus.write_word(latch.dst, v, BusKind::Data);
                }
            }
            latch.src = step_address(latch.src, ch.src_mode, step);
            latch.dst = step_address(latch.dst, ch.dst_mode, step);
            latch.remaining -= 1;
        }

        if ch.irq_on_complete {
            let bit = match (self.side, index) {
                (_, 0) => sources::DMA0,
                (_, 1) => sources::DMA1,
                (_, 2) => sources::DMA2,
                _ => sources::DMA3,
            };
            irq.request(bit);
        }

        if ch.repeat && ch.timing != StartTiming::Immediate {
            let unit = match ch.size {
                TransferSize::Half => 1u32,
                TransferSize::Word => 3u32,
            };
            let dst = if ch.dst_mode == AddressMode::IncrementReload {
                ch.dst & !unit
            } else {
                latch.dst
            };
            ch.latch = Some(Latch {
                src: latch.src,
                dst,
                remaining: ch.length,
            });
        } else {
            ch.enabled = false;
            ch.latch = None;
        }
    }
}

fn step_address(addr: u32, mode: AddressMode, step: i64) -> u32 {
    match mode {
        AddressMode::Increment | AddressMode::IncrementReload => addr.wrapping_add(step as u32),
        AddressMode::Decrement => addr.wrapping_sub(step as u32),
        AddressMode::Fixed => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::{SharedPeripherals, ARM7_WRAM_SIZE};
    use crate::core::timer::TimerUnit;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_bus() -> Bus {
        let shared = SharedPeripherals::new();
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
        Bus::new_arm7(
            shared,
            arm7_wram,
            Rc::new(RefCell::new(InterruptController::new())),
            Rc::new(RefCell::new(DmaController::new(CpuSide::Arm7))),
            Rc::new(RefCell::new(TimerUnit::new())),
        )
    }

    #[test]
    fn immediate_transfer_copies_words() {
        let mut bus = make_bus();
        bus.write_word(0x0200_0000, 0xCAFEBABE, BusKind::Data);

        let mut dma = DmaController::new(CpuSide::Arm7);
        dma.channels[0].src = 0x0200_0000;
        dma.channels[0].dst = 0x0200_0100;
        dma.channels[0].length = 1;
        dma.channels[0].size = TransferSize::Word;
        dma.channels[0].timing = StartTiming::Immediate;
        dma.set_enabled(0, true);

        let mut irq = InterruptController::new();
        dma.execute_pending(&mut bus, &mut irq);

        assert_eq!(bus.read_word(0x0200_0100, BusKind::Data), 0xCAFEBABE);
        assert!(!dma.channels[0].enabled);
    }

    #[test]
    fn vblank_timing_waits_for_trigger() {
        let mut bus = make_bus();
        let mut dma = DmaController::new(CpuSide::Arm7);
        dma.channels[1].timing = StartTiming::VBlank;
        dma.channels[1].length = 1;
        dma.channels[1].size = TransferSize::Half;
        dma.set_enabled(1, true);
        let mut irq = InterruptController::new();

        dma.execute_pending(&mut bus, &mut irq);
        assert!(dma.channels[1].enabled, "should not fire before trigger");

        dma.trigger(StartTiming::VBlank);
        dma.execute_pending(&mut bus, &mut irq);
        assert!(!dma.channels[1].enabled);
    }

    #[test]
    fn address_mode_fixed_does_not_move() {
        assert_eq!(step_address(0x100, AddressMode::Fixed, 4), 0x100);
        assert_eq!(step_address(0x100, AddressMode::Increment, 4), 0x104);
        assert_eq!(step_address(0x100, AddressMode::Decrement, 4), 0xFC);
    }
}
