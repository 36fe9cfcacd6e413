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

//! Ties both CPUs, both buses, the scheduler, and every peripheral
//! together into a runnable machine (§5).
//!
//! The main loop is cooperative and single-threaded with respect to
//! CPU/peripheral state: both CPUs and the scheduler advance in lockstep
//! on one thread, in "loose sync" quanta bounded by
//! [`config::EmulatorConfig::loose_sync_quantum`] and never crossing a
//! pending scheduler event. The only genuine concurrency is the 3D
//! rasterizer's [`render_pool::RenderPool`], spun up once at construction
//! and joined on drop.

pub mod render_pool;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use crate::core::cart::Cart;
use crate::core::config::EmulatorConfig;
use crate::core::cpu::Cpu;
use crate::core::dma::StartTiming;
use crate::core::error::{ErrorCounters, Result};
use crate::core::memory::{Bus, CpuSide, SharedPeripherals, ARM7_WRAM_SIZE};
use crate::core::scheduler::Scheduler;
use crate::core::video_unit::{HBLANK_START_CYCLES, LINE_CYCLES};

/// A fully-wired NDS machine: both CPUs, both buses, and every peripheral
/// they share, advanced one "cycle" (one ARM7 cycle, matched by two ARM9
/// cycles per §2's 2x clock ratio) at a time.
pub struct System {
    config: EmulatorConfig,
    shared: SharedPeripherals,
    bus9: Bus,
    bus7: Bus,
    cpu9: Cpu,
    cpu7: Cpu,
    scheduler: Scheduler,
    cart: Option<Cart>,
    render_pool: render_pool::RenderPool,
    error_counters: ErrorCounters,
    last_hblank: bool,
    last_vblank: bool,
    last_gxfifo_half_empty: bool,
}

impl System {
    pub fn new(config: EmulatorConfig) -> Self {
        let shared = SharedPeripherals::new();
        shared.wramcnt.borrow_mut().0 = config.wramcnt;
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));

        let irq9 = shared.irq9.clone();
        let irq7 = shared.irq7.clone();
        let dma9 = Rc::new(RefCell::new(crate::core::dma::DmaController::new(CpuSide::Arm9)));
        let dma7 = Rc::new(RefCell::new(crate::core::dma::DmaController::new(CpuSide::Arm7)));
        let timer9 = Rc::new(RefCell::new(crate::core::timer::TimerUnit::new()));
        let timer7 = Rc::new(RefCell::new(crate::core::timer::TimerUnit::new()));
        let tcm_config = Rc::new(RefCell::new(crate::core::memory::tcm::TcmConfig::default()));

        let bus9 = Bus::new_arm9(shared.clone(), arm7_wram.clone(), irq9, dma9, timer9, tcm_config);
        let bus7 = Bus::new_arm7(shared.clone(), arm7_wram, irq7, dma7, timer7);

        let mut cpu9 = Cpu::new(true);
        let mut cpu7 = Cpu::new(false);
        cpu9.direct_boot_enter(0, 0x0300_2F7C, 0x0300_3F80, 0x0300_3FC0);
        cpu7.direct_boot_enter(0, 0x0380_FD80, 0x0380_FF80, 0x0380_FFC0);

        let render_pool = render_pool::RenderPool::new(config.render_worker_threads);

        let mut system = Self {
            config,
            shared,
            bus9,
            bus7,
            cpu9,
            cpu7,
            scheduler: Scheduler::new(),
            cart: None,
            render_pool,
            error_counters: ErrorCounters::default(),
            last_hblank: false,
            last_vblank: false,
            last_gxfifo_half_empty: false,
        };
        system.shared.gpu.borrow_mut().set_render_far_plane_polys(system.config.render_far_plane_polys);
        schedule_hblank(&mut system.scheduler, system.shared.clone());
        system
    }

    /// Load a ROM and direct-boot both CPUs into it (§6, §8).
    pub fn load_rom(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let cart = Cart::load(path)?;
        let boot = cart.direct_boot(&mut self.bus9, &mut self.bus7);
        self.cpu9
            .direct_boot_enter(boot.arm9_entry, boot.arm9_sp_sys, boot.arm9_sp_irq, boot.arm9_sp_svc);
        self.cpu7
            .direct_boot_enter(boot.arm7_entry, boot.arm7_sp_sys, boot.arm7_sp_irq, boot.arm7_sp_svc);
        self.cart = Some(cart);
        Ok(())
    }

    pub fn bus9(&self) -> &Bus {
        &self.bus9
    }

    pub fn bus9_mut(&mut self) -> &mut Bus {
        &mut self.bus9
    }

    pub fn bus7_mut(&mut self) -> &mut Bus {
        &mut self.bus7
    }

    pub fn cpu9(&self) -> &Cpu {
        &self.cpu9
    }

    pub fn cpu7(&self) -> &Cpu {
        &self.cpu7
    }

    pub fn frame_count(&self) -> u64 {
        self.shared.video_unit.borrow().frame_count()
    }

    /// Combined recoverable-error tally: both CPUs' instruction-decode
    /// counters plus this frame's sweep of peripheral sticky error flags
    /// (§7's "counted and summarized in the log").
    pub fn error_counts(&self) -> ErrorCounters {
        let mut total = self.error_counters.clone();
        merge_counters(&mut total, self.cpu9.error_counters());
        merge_counters(&mut total, self.cpu7.error_counters());
        total
    }

    /// Must be called by whatever writes WRAMCNT, after updating
    /// `shared.wramcnt`, so the fast page table on both buses drops any
    /// stale entries over the shared-WRAM window (§4.2).
    pub fn write_wramcnt(&mut self, value: u8) {
        self.shared.wramcnt.borrow_mut().0 = value;
        self.bus9.invalidate_shared_wram_pages();
        self.bus7.invalidate_shared_wram_pages();
    }

    /// Run until one more frame (one full V-blank-to-V-blank cycle) has
    /// completed.
    pub fn run_frame(&mut self) {
        let target = self.frame_count().wrapping_add(1);
        while self.frame_count() != target {
            self.run_quantum();
        }
    }

    /// Run one loose-sync quantum: each CPU executes up to
    /// `loose_sync_quantum` steps, never advancing past the next pending
    /// scheduler event (§5).
    fn run_quantum(&mut self) {
        let quantum = self.config.loose_sync_quantum as u64;
        let bound = self
            .scheduler
            .next_event_at()
            .map(|at| at.saturating_sub(self.scheduler.now()))
            .filter(|&n| n > 0)
            .unwrap_or(quantum)
            .min(quantum)
            .max(1);

        for _ in 0..bound {
            self.tick_cycle();
        }
    }

    /// One ARM7 cycle's worth of work: two ARM9 instruction steps (§2's 2x
    /// clock ratio, modeled at instruction granularity rather than exact
    /// sub-instruction timing per the Non-goal on cycle-accurate timing),
    /// one ARM7 step, then every peripheral that needs per-cycle service.
    fn tick_cycle(&mut self) {
        self.cpu9.step(&mut self.bus9);
        self.cpu9.step(&mut self.bus9);
        self.cpu7.step(&mut self.bus7);

        self.scheduler.add_cycles(1);
        self.scheduler.step();

        {
            let timer9 = self.bus9.timer().clone();
            let irq9 = self.bus9.irq().clone();
            timer9.borrow_mut().step(1, &mut irq9.borrow_mut());
            let timer7 = self.bus7.timer().clone();
            let irq7 = self.bus7.irq().clone();
            timer7.borrow_mut().step(1, &mut irq7.borrow_mut());
        }

        self.run_gpu_and_check_errors();
        self.sync_vram_pages();
        self.sync_video_dma_timing();
        self.run_pending_dma();

        self.cpu9.set_irq_line(self.shared.irq9.borrow().line_asserted());
        self.cpu7.set_irq_line(self.shared.irq7.borrow().line_asserted());
    }

    fn run_gpu_and_check_errors(&mut self) {
        self.shared.gpu.borrow_mut().run_cycles(1);
        let gxfifo_half_empty = self.shared.gpu.borrow().gxfifo_half_empty();
        if gxfifo_half_empty && !self.last_gxfifo_half_empty {
            self.bus9.dma().borrow_mut().trigger(StartTiming::GxFifoHalfEmpty);
        }
        self.last_gxfifo_half_empty = gxfifo_half_empty;

        if self.shared.gpu.borrow().math_engine().div_error {
            self.error_counters.divide_by_zero += 1;
        }
        for side in [crate::core::ipc::Side::Arm9, crate::core::ipc::Side::Arm7] {
            if self.shared.ipc.borrow().error_flag(side) {
                self.error_counters.ipc_fifo_underflow += 1;
                self.shared.ipc.borrow_mut().acknowledge_error(side);
            }
        }
    }

    fn sync_vram_pages(&mut self) {
        let dirty = self.shared.vram.borrow_mut().take_dirty();
        for (start, end) in dirty {
            self.bus9.invalidate_vram_pages(start, end);
            self.bus7.invalidate_vram_pages(start, end);
        }
    }

    /// Drives the GPU's deferred `SwapBuffers`/render-pool handoff and the
    /// HBlank/VBlank-timed DMA start conditions off `VideoUnit`'s flags,
    /// which the scheduler's line-timed events (see [`schedule_hblank`])
    /// update independently of this per-cycle poll.
    fn sync_video_dma_timing(&mut self) {
        let flags = self.shared.video_unit.borrow().flags();
        if flags.in_hblank && !self.last_hblank {
            self.bus9.dma().borrow_mut().trigger(StartTiming::HBlank);
            self.bus7.dma().borrow_mut().trigger(StartTiming::HBlank);
        }
        if flags.in_vblank && !self.last_vblank {
            self.bus9.dma().borrow_mut().trigger(StartTiming::VBlank);
            self.bus7.dma().borrow_mut().trigger(StartTiming::VBlank);
            self.render_pending_frame();
        }
        self.last_hblank = flags.in_hblank;
        self.last_vblank = flags.in_vblank;
    }

    /// If the GPU has a `SwapBuffers` pending, hand the frozen polygon
    /// list off to the render pool and swap its result into the front
    /// buffer, mirroring [`crate::core::gpu::Gpu::on_vblank`] but routed
    /// through [`render_pool::RenderPool`] instead of the single-threaded
    /// rasterizer (§5).
    fn render_pending_frame(&mut self) {
        let (viewport, clear_color, polygons, depth_mode) = {
            let gpu = self.shared.gpu.borrow();
            if !gpu.swap_pending() {
                return;
            }
            let (viewport, clear_color) = gpu.render_job();
            (viewport, clear_color, gpu.polygons().to_vec(), gpu.front_buffer.depth_mode)
        };
        let (texture_data, palette_data) = {
            let vram = self.shared.vram.borrow();
            (
                vram.snapshot_region(crate::core::vram::Region::GpuTexture),
                vram.snapshot_region(crate::core::vram::Region::GpuTexturePalette),
            )
        };
        let framebuffer = self.render_pool.render(
            &polygons,
            viewport,
            clear_color,
            depth_mode,
            &texture_data,
            &palette_data,
        );
        self.shared.gpu.borrow_mut().complete_vblank_swap(framebuffer);
    }

    fn run_pending_dma(&mut self) {
        {
            let dma9 = self.bus9.dma().clone();
            let irq9 = self.bus9.irq().clone();
            let mut dma9 = dma9.borrow_mut();
            let mut irq9 = irq9.borrow_mut();
            dma9.execute_pending(&mut self.bus9, &mut irq9);
        }
        {
            let dma7 = self.bus7.dma().clone();
            let irq7 = self.bus7.irq().clone();
            let mut dma7 = dma7.borrow_mut();
            let mut irq7 = irq7.borrow_mut();
            dma7.execute_pending(&mut self.bus7, &mut irq7);
        }
    }
}

fn merge_counters(total: &mut ErrorCounters, cpu_counters: &ErrorCounters) {
    total.unaligned_access += cpu_counters.unaligned_access;
    total.unmapped_io += cpu_counters.unmapped_io;
    total.unimplemented_instruction += cpu_counters.unimplemented_instruction;
    total.matrix_stack_overflow += cpu_counters.matrix_stack_overflow;
    total.matrix_stack_underflow += cpu_counters.matrix_stack_underflow;
    total.divide_by_zero += cpu_counters.divide_by_zero;
    total.ipc_fifo_overflow += cpu_counters.ipc_fifo_overflow;
    total.ipc_fifo_underflow += cpu_counters.ipc_fifo_underflow;
}

/// Schedules the next H-Blank-start event, `HBLANK_START_CYCLES` cycles
/// from now. Mutually recursive with [`schedule_line_end`], forming the
/// per-scanline timing chain the scheduler drives independently of the
/// main loop's per-cycle polling (§4.1, §4.5).
fn schedule_hblank(scheduler: &mut Scheduler, shared: SharedPeripherals) {
    scheduler.add(HBLANK_START_CYCLES as u64, move |scheduler, _late| {
        {
            let mut video_unit = shared.video_unit.borrow_mut();
            let mut irq9 = shared.irq9.borrow_mut();
            let mut irq7 = shared.irq7.borrow_mut();
            video_unit.on_hblank_start(&mut irq9, &mut irq7);
        }
        schedule_line_end(scheduler, shared);
    });
}

fn schedule_line_end(scheduler: &mut Scheduler, shared: SharedPeripherals) {
    let remaining = (LINE_CYCLES - HBLANK_START_CYCLES) as u64;
    scheduler.add(remaining, move |scheduler, _late| {
        {
            let mut video_unit = shared.video_unit.borrow_mut();
            let mut irq9 = shared.irq9.borrow_mut();
            let mut irq7 = shared.irq7.borrow_mut();
            video_unit.on_line_end(&mut irq9, &mut irq7);
        }
        schedule_hblank(scheduler, shared);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_system_boots_to_supervisor_then_system_mode_at_pc_zero() {
        let system = System::new(EmulatorConfig::default());
        assert_eq!(system.cpu9().pc_value(), 0);
        assert_eq!(system.cpu7().pc_value(), 0);
    }

    #[test]
    fn run_frame_advances_frame_counter_exactly_once() {
        let mut system = System::new(EmulatorConfig::default());
        let start = system.frame_count();
        system.run_frame();
        assert_eq!(system.frame_count(), start.wrapping_add(1));
    }

    #[test]
    fn write_wramcnt_updates_shared_register() {
        let mut system = System::new(EmulatorConfig::default());
        system.write_wramcnt(0b10);
        assert_eq!(system.shared.wramcnt.borrow().0, 0b10);
    }
}
