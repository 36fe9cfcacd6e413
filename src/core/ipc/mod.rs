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

//! Inter-processor communication (§4.8): IPCSYNC's 4-bit handshake value
//! plus a pair of 16-word hardware FIFOs, one per direction.
//!
//! Both halves live in one [`Ipc`] instance shared (via `Rc<RefCell<_>>`,
//! the teacher's peripheral-sharing idiom) between the ARM9 and ARM7 buses,
//! since the two sides' registers alias the same underlying state from
//! opposite ends.

use std::collections::VecDeque;

const FIFO_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Arm9,
    Arm7,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Arm9 => Side::Arm7,
            Side::Arm7 => Side::Arm9,
        }
    }
}

#[derive(Debug, Default)]
struct SyncHalf {
    /// 4-bit value this side last wrote for the other side to read.
    output: u8,
    /// 4-bit value the other side last wrote (visible to this side as input).
    input: u8,
    irq_enable: bool,
}

#[derive(Debug, Default)]
struct FifoHalf {
    queue: VecDeque<u32>,
    /// Sticky "send/receive while full/empty" error flag, cleared only by
    /// explicit acknowledgement through IPCFIFOCNT.
    error: bool,
    irq_send_empty_enable: bool,
    irq_recv_not_empty_enable: bool,
}

/// IPCSYNC + both FIFO directions.
#[derive(Debug, Default)]
pub struct Ipc {
    arm9_sync: SyncHalf,
    arm7_sync: SyncHalf,
    /// Keyed by the *sender's* side: `fifo[Arm9]` holds words ARM9 sent,
    /// which ARM7 drains.
    fifo9_to_7: FifoHalf,
    fifo7_to_9: FifoHalf,
}

/// Whether a register access raised the remote IRQ request this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIrqRequest {
    pub target: Side,
    pub fire: bool,
}

impl Ipc {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync_mut(&mut self, side: Side) -> &mut SyncHalf {
        match side {
            Side::Arm9 => &mut self.arm9_sync,
            Side::Arm7 => &mut self.arm7_sync,
        }
    }

    /// Read IPCSYNC from `side`'s point of view: input nibble in bits 0-3,
    /// output nibble in bits 8-11, irq-enable in bit 14.
    pub fn read_sync(&self, side: Side) -> u16 {
        let half = match side {
            Side::Arm9 => &self.arm9_sync,
            Side::Arm7 => &self.arm7_sync,
        };
        (half.input as u16) | ((half.output as u16) << 8) | ((half.irq_enable as u16) << 14)
    }

    /// Write IPCSYNC from `side`. The output nibble becomes the other
    /// side's input nibble immediately. Bit 13, if set, requests a remote
    /// IRQ on the other side (only delivered if that side's irq_enable is
    /// set) — the caller raises it through [`crate::core::irq::InterruptController`].
    pub fn write_sync(&mut self, side: Side, value: u16) -> RemoteIrqRequest {
        let output = (value >> 8 & 0xF) as u8;
        let irq_enable = value & (1 << 14) != 0;
        let raise_remote = value & (1 << 13) != 0;

        self.sync_mut(side).output = output;
        self.sync_mut(side).irq_enable = irq_enable;

        let other = side.other();
        self.sync_mut(other).input = output;

        RemoteIrqRequest {
            target: other,
            fire: raise_remote && self.sync_mut(other).irq_enable,
        }
    }

    fn outgoing(&mut self, side: Side) -> &mut FifoHalf {
        match side {
            Side::Arm9 => &mut self.fifo9_to_7,
            Side::Arm7 => &mut self.fifo7_to_9,
        }
    }

    fn incoming(&mut self, side: Side) -> &mut FifoHalf {
        match side {
            Side::Arm9 => &mut self.fifo7_to_9,
            Side::Arm7 => &mut self.fifo9_to_7,
        }
    }

    /// Push a word onto `side`'s send FIFO. Sets the sticky error bit and
    /// drops the word if the FIFO is already full.
    pub fn send(&mut self, side: Side, value: u32) {
        let fifo = self.outgoing(side);
        if fifo.queue.len() >= FIFO_CAPACITY {
            fifo.error = true;
            return;
        }
        fifo.queue.push_back(value);
    }

    /// Pop the oldest word from `side`'s receive FIFO. Sets the sticky
    /// error bit and returns the last value again if already empty,
    /// matching the real FIFO's "return last value, flag error" behavior.
    pub fn receive(&mut self, side: Side) -> u32 {
        let last = self.incoming(side).queue.front().copied().unwrap_or(0);
        let fifo = self.incoming(side);
        match fifo.queue.pop_front() {
            Some(v) => v,
            None => {
                fifo.error = true;
                last
            }
        }
    }

    pub fn send_fifo_empty(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo9_to_7.queue.is_empty(),
            Side::Arm7 => self.fifo7_to_9.queue.is_empty(),
        }
    }

    pub fn send_fifo_full(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo9_to_7.queue.len() >= FIFO_CAPACITY,
            Side::Arm7 => self.fifo7_to_9.queue.len() >= FIFO_CAPACITY,
        }
    }

    pub fn recv_fifo_empty(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo7_to_9.queue.is_empty(),
            Side::Arm7 => self.fifo9_to_7.queue.is_empty(),
        }
    }

    pub fn clear_send_fifo(&mut self, side: Side) {
        self.outgoing(side).queue.clear();
    }

    pub fn error_flag(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo9_to_7.error,
            Side::Arm7 => self.fifo7_to_9.error,
        }
    }

    pub fn acknowledge_error(&mut self, side: Side) {
        self.outgoing(side).error = false;
    }

    pub fn set_send_empty_irq_enable(&mut self, side: Side, enable: bool) {
        self.outgoing(side).irq_send_empty_enable = enable;
    }

    pub fn set_recv_not_empty_irq_enable(&mut self, side: Side, enable: bool) {
        self.incoming(side).irq_recv_not_empty_enable = enable;
    }

    pub fn send_empty_irq_enabled(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo9_to_7.irq_send_empty_enable,
            Side::Arm7 => self.fifo7_to_9.irq_send_empty_enable,
        }
    }

    pub fn recv_not_empty_irq_enabled(&self, side: Side) -> bool {
        match side {
            Side::Arm9 => self.fifo7_to_9.irq_recv_not_empty_enable,
            Side::Arm7 => self.fifo9_to_7.irq_recv_not_empty_enable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_output_becomes_remote_input() {
        let mut ipc = Ipc::new();
        ipc.write_sync(Side::Arm9, 0x05 << 8);
        assert_eq!(ipc.read_sync(Side::Arm7) & 0xF, 0x05);
    }

    #[test]
    fn remote_irq_requires_target_enable() {
        let mut ipc = Ipc::new();
        let req = ipc.write_sync(Side::Arm9, (1 << 13) | (0x3 << 8));
        assert!(!req.fire, "ARM7 has not enabled its sync IRQ yet");

        ipc.write_sync(Side::Arm7, 1 << 14);
        let req = ipc.write_sync(Side::Arm9, (1 << 13) | (0x3 << 8));
        assert!(req.fire);
        assert_eq!(req.target, Side::Arm7);
    }

    #[test]
    fn fifo_round_trips_arm9_to_arm7() {
        let mut ipc = Ipc::new();
        ipc.send(Side::Arm9, 0xDEAD_BEEF);
        assert!(!ipc.recv_fifo_empty(Side::Arm7));
        assert_eq!(ipc.receive(Side::Arm7), 0xDEAD_BEEF);
        assert!(ipc.recv_fifo_empty(Side::Arm7));
    }

    #[test]
    fn overflow_sets_sticky_error() {
        let mut ipc = Ipc::new();
        for i in 0..FIFO_CAPACITY as u32 {
            ipc.send(Side::Arm9, i);
        }
        assert!(!ipc.error_flag(Side::Arm9));
        ipc.send(Side::Arm9, 999);
        assert!(ipc.error_flag(Side::Arm9));
        ipc.acknowledge_error(Side::Arm9);
        assert!(!ipc.error_flag(Side::Arm9));
    }

    #[test]
    fn receive_from_empty_sets_error_and_repeats_last() {
        let mut ipc = Ipc::new();
        ipc.send(Side::Arm7, 42);
        assert_eq!(ipc.receive(Side::Arm9), 42);
        assert_eq!(ipc.receive(Side::Arm9), 42);
        assert!(ipc.error_flag(Side::Arm7));
    }
}
