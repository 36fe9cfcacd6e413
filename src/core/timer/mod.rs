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

//! Timers (§4.8). Four 16-bit up-counters per CPU, each either free-running
//! at a fixed prescaler or cascaded off the previous channel's overflow.
//!
//! Reloading happens on overflow, not on enable: writing TMCNT_L sets the
//! *reload* value, and the visible counter only picks it up the next time it
//! wraps (or immediately, on the enable edge).

use crate::core::irq::{sources, InterruptController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prescaler {
    Div1,
    Div64,
    Div256,
    Div1024,
}

impl Prescaler {
    fn cycles(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Prescaler::Div1,
            0b01 => Prescaler::Div64,
            0b10 => Prescaler::Div256,
            _ => Prescaler::Div1024,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimerChannel {
    pub reload: u16,
    pub counter: u16,
    pub prescaler: Prescaler,
    pub cascade: bool,
    pub irq_on_overflow: bool,
    pub enabled: bool,
    sub_cycles: u32,
}

impl Default for TimerChannel {
    fn default() -> Self {
        Self {
            reload: 0,
            counter: 0,
            prescaler: Prescaler::Div1,
            cascade: false,
            irq_on_overflow: false,
            enabled: false,
            sub_cycles: 0,
        }
    }
}

/// Four-channel timer unit for one CPU.
#[derive(Default)]
pub struct TimerUnit {
    pub channels: [TimerChannel; 4],
}

impl TimerUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the enable bit (TMCNT_H bit 7). On the 0->1 edge the counter
    /// is loaded from `reload` immediately, matching hardware.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        let ch = &mut self.channels[index];
        if enabled && !ch.enabled {
            ch.counter = ch.reload;
            ch.sub_cycles = 0;
        }
        ch.enabled = enabled;
    }

    /// Advance every non-cascaded, enabled channel by `cycles` CPU cycles,
    /// then ripple cascaded overflows channel-to-channel in order. Requests
    /// the matching TIMERn IRQ on any channel configured to do so.
    pub fn step(&mut self, cycles: u32, irq: &mut InterruptController) {
        let mut overflowed = [false; 4];

        for i in 0..4 {
            if !self.channels[i].enabled || self.channels[i].cascade {
                continue;
            }
            overflowed[i] = self.advance_free_running(i, cycles);
        }

        // Cascaded channels tick once per overflow of the channel below
        // them, strictly in index order so a chain of cascades ripples in
        // one `step` call.
        for i in 1..4 {
            if !self.channels[i].enabled || !self.channels[i].cascade {
                continue;
            }
            if overflowed[i - 1] {
                overflowed[i] = self.tick_one(i);
            }
        }

        for i in 0..4 {
            if overflowed[i] && self.channels[i].irq_on_overflow {
                let bit = match i {
                    0 => sources::TIMER0,
                    1 => sources::TIMER1,
                    2 => sources::TIMER2,
                    _ => sources::TIMER3,
                };
                irq.request(bit);
            }
        }
    }

    fn advance_free_running(&mut self, index: usize, cycles: u32) -> bool {
        let divisor = self.channels[index].prescaler.cycles();
        self.channels[index].sub_cycles += cycles;
        let mut overflowed = false;
        while self.channels[index].sub_cycles >= divisor {
            self.channels[index].sub_cycles -= divisor;
            overflowed |= self.tick_one(index);
        }
        overflowed
    }

    /// Increment the counter by one tick, reloading and reporting overflow
    /// on wraparound.
    fn tick_one(&mut self, index: usize) -> bool {
        let ch = &mut self.channels[index];
        let (next, overflowed) = ch.counter.overflowing_add(1);
        if overflowed {
            ch.counter = ch.reload;
        } else {
            ch.counter = next;
        }
        overflowed
    }

    pub fn read_counter(&self, index: usize) -> u16 {
        self.channels[index].counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_running_overflows_and_reloads() {
        let mut timer = TimerUnit::new();
        timer.channels[0].reload = 0xFFFE;
        timer.channels[0].prescaler = Prescaler::Div1;
        timer.set_enabled(0, true);
        let mut irq = InterruptController::new();

        timer.step(1, &mut irq); // 0xFFFE -> 0xFFFF
        assert_eq!(timer.read_counter(0), 0xFFFF);
        timer.step(1, &mut irq); // overflow -> reload
        assert_eq!(timer.read_counter(0), 0xFFFE);
    }

    #[test]
    fn overflow_requests_irq_when_enabled() {
        let mut timer = TimerUnit::new();
        timer.channels[0].reload = 0xFFFF;
        timer.channels[0].irq_on_overflow = true;
        timer.set_enabled(0, true);
        let mut irq = InterruptController::new();

        timer.step(1, &mut irq);
        assert_eq!(irq.read_flags() & sources::TIMER0, sources::TIMER0);
    }

    #[test]
    fn cascade_ticks_on_lower_channel_overflow() {
        let mut timer = TimerUnit::new();
        timer.channels[0].reload = 0xFFFF;
        timer.set_enabled(0, true);
        timer.channels[1].reload = 0;
        timer.channels[1].cascade = true;
        timer.set_enabled(1, true);
        let mut irq = InterruptController::new();

        timer.step(1, &mut irq); // channel 0 overflows
        assert_eq!(timer.read_counter(1), 1);
    }

    #[test]
    fn prescaler_gates_tick_rate() {
        let mut timer = TimerUnit::new();
        timer.channels[0].prescaler = Prescaler::Div64;
        timer.set_enabled(0, true);
        let mut irq = InterruptController::new();

        timer.step(63, &mut irq);
        assert_eq!(timer.read_counter(0), 0);
        timer.step(1, &mut irq);
        assert_eq!(timer.read_counter(0), 1);
    }
}
