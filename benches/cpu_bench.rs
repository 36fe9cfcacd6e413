// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nitro_core::core::cpu::Cpu;
use nitro_core::core::dma::DmaController;
use nitro_core::core::memory::tcm::TcmConfig;
use nitro_core::core::memory::{Bus, CpuSide, SharedPeripherals, ARM7_WRAM_SIZE};
use nitro_core::core::timer::TimerUnit;
use std::cell::RefCell;
use std::rc::Rc;

fn arm9_bus() -> Bus {
    let shared = SharedPeripherals::new();
    let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
    let irq = shared.irq9.clone();
    let dma = Rc::new(RefCell::new(DmaController::new(CpuSide::Arm9)));
    let timer = Rc::new(RefCell::new(TimerUnit::new()));
    let tcm_config = Rc::new(RefCell::new(TcmConfig::default()));
    Bus::new_arm9(shared, arm7_wram, irq, dma, timer, tcm_config)
}

/// A tight loop of mostly-NOP-shaped ARM data-processing instructions
/// (`MOV r0, r0`), the cheapest possible decode path, to isolate dispatch
/// overhead from execution cost.
fn arm9_decode_loop(c: &mut Criterion) {
    c.bench_function("arm9 decode/dispatch MOV loop", |b| {
        b.iter(|| {
            let mut bus = arm9_bus();
            let mut cpu = Cpu::new(true);
            bus.write_word(0, 0xE1A0_0000, nitro_core::core::memory::BusKind::Code);
            for _ in 0..1000 {
                black_box(cpu.step(&mut bus));
            }
        });
    });
}

criterion_group!(benches, arm9_decode_loop);
criterion_main!(benches);
