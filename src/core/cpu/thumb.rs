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

//! 16-bit Thumb instruction decode and execution (§4.3).
//!
//! Dispatches on the top bits of the halfword, matching the standard
//! sixteen-ish Thumb instruction formats. Every format lowers to the same
//! underlying operations [`super::arm`] already implements (shift, add/sub,
//! data processing, loads/stores, branches), so most handlers here just
//! compute an address or operand and call into a shared ARM-side helper
//! where that avoids duplicating flag logic.

use crate::core::cpu::{Cpu, Mode, C_FLAG, N_FLAG, V_FLAG, Z_FLAG};
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{Bus, BusKind};

fn set_nz(cpu: &mut Cpu, result: u32) {
    cpu.set_flag(N_FLAG, result & 0x8000_0000 != 0);
    cpu.set_flag(Z_FLAG, result == 0);
}

fn add_with_flags(cpu: &mut Cpu, a: u32, b: u32, carry_in: u32, set_flags: bool) -> u32 {
    let (r1, c1) = a.overflowing_add(b);
    let (result, c2) = r1.overflowing_add(carry_in);
    if set_flags {
        set_nz(cpu, result);
        cpu.set_flag(C_FLAG, c1 || c2);
        cpu.set_flag(V_FLAG, ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0);
    }
    result
}

fn sub_with_flags(cpu: &mut Cpu, a: u32, b: u32, borrow_in: u32, set_flags: bool) -> u32 {
    add_with_flags(cpu, a, !b, borrow_in, set_flags)
}

pub fn execute(cpu: &mut Cpu, bus: &mut Bus, opcode: u16) -> Result<()> {
    let op = opcode as u32;
    match (op >> 13) & 0x7 {
        0b000 => {
            if (op >> 11) & 0x3 == 0b11 {
                add_sub(cpu, op);
            } else {
                move_shifted_register(cpu, op);
            }
            Ok(())
        }
        0b001 => {
            move_compare_add_sub_immediate(cpu, op);
            Ok(())
        }
        0b010 => {
            if (op >> 10) & 0x7 == 0b000 {
                alu_operations(cpu, op);
                Ok(())
            } else if (op >> 10) & 0x7 == 0b001 {
                hi_register_ops_and_bx(cpu, op)
            } else if (op >> 11) & 0x3 == 0b01 {
                pc_relative_load(cpu, bus, op);
                Ok(())
            } else {
                load_store_register_offset(cpu, bus, op);
                Ok(())
            }
        }
        0b011 => {
            load_store_immediate_offset(cpu, bus, op);
            Ok(())
        }
        0b100 => {
            if (op >> 12) & 1 == 0 {
                load_store_halfword(cpu, bus, op);
            } else {
                sp_relative_load_store(cpu, bus, op);
            }
            Ok(())
        }
        0b101 => {
            if (op >> 12) & 1 == 0 {
                load_address(cpu, op);
                Ok(())
            } else if (op >> 8) & 0xF == 0b0000 {
                add_offset_to_sp(cpu, op);
                Ok(())
            } else if (op >> 9) & 0x3 == 0b10 {
                push_pop(cpu, bus, op);
                Ok(())
            } else {
                undefined(cpu, op)
            }
        }
        0b110 => {
            if (op >> 12) & 1 == 0 {
                multiple_load_store(cpu, bus, op);
                Ok(())
            } else if (op >> 8) & 0xF == 0b1111 {
                software_interrupt(cpu);
                Ok(())
            } else {
                conditional_branch(cpu, op);
                Ok(())
            }
        }
        0b111 => {
            if (op >> 11) & 0x3 == 0b00 {
                unconditional_branch(cpu, op);
                Ok(())
            } else {
                long_branch_with_link(cpu, op);
                Ok(())
            }
        }
        _ => unreachable!(),
    }
}

fn move_shifted_register(cpu: &mut Cpu, op: u32) {
    let shift_type = (op >> 11) & 0x3;
    let amount = (op >> 6) & 0x1F;
    let rs = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let value = cpu.reg(rs);
    let carry_in = cpu.flag(C_FLAG);

    let (result, carry) = match shift_type {
        0 => {
            if amount == 0 {
                (value, carry_in)
            } else {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            }
        }
        1 => {
            let amount = if amount == 0 { 32 } else { amount };
            if amount >= 32 {
                (0, value & 0x8000_0000 != 0)
            } else {
                (value >> amount, (value >> (amount - 1)) & 1 != 0)
            }
        }
        2 => {
            let amount = if amount == 0 { 32 } else { amount };
            if amount >= 32 {
                let c = value & 0x8000_0000 != 0;
                (if c { 0xFFFF_FFFF } else { 0 }, c)
            } else {
                (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
            }
        }
        _ => unreachable!(),
    };
    set_nz(cpu, result);
    cpu.set_flag(C_FLAG, carry);
    cpu.set_reg(rd, result);
}

fn add_sub(cpu: &mut Cpu, op: u32) {
    let immediate = (op >> 10) & 1 != 0;
    let subtract = (op >> 9) & 1 != 0;
    let rn_or_imm = (op >> 6) & 0x7;
    let rs = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let operand = if immediate { rn_or_imm } else { cpu.reg(rn_or_imm as u8) };
    let rs_val = cpu.reg(rs);
    let result = if subtract {
        sub_with_flags(cpu, rs_val, operand, 1, true)
    } else {
        add_with_flags(cpu, rs_val, operand, 0, true)
    };
    cpu.set_reg(rd, result);
}

fn move_compare_add_sub_immediate(cpu: &mut Cpu, op: u32) {
    let kind = (op >> 11) & 0x3;
    let rd = ((op >> 8) & 0x7) as u8;
    let imm = op & 0xFF;
    match kind {
        0 => {
            // MOV
            set_nz(cpu, imm);
            cpu.set_reg(rd, imm);
        }
        1 => {
            // CMP
            sub_with_flags(cpu, cpu.reg(rd), imm, 1, true);
        }
        2 => {
            // ADD
            let result = add_with_flags(cpu, cpu.reg(rd), imm, 0, true);
            cpu.set_reg(rd, result);
        }
        3 => {
            // SUB
            let result = sub_with_flags(cpu, cpu.reg(rd), imm, 1, true);
            cpu.set_reg(rd, result);
        }
        _ => unreachable!(),
    }
}

fn alu_operations(cpu: &mut Cpu, op: u32) {
    let alu_op = (op >> 6) & 0xF;
    let rs = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let rd_val = cpu.reg(rd);
    let rs_val = cpu.reg(rs);

    let result = match alu_op {
        0x0 => rd_val & rs_val,  // AND
        0x1 => rd_val ^ rs_val,  // EOR
        0x2 => {
            let amount = rs_val & 0xFF;
            let shifted = lsl(rd_val, amount, cpu.flag(C_FLAG));
            cpu.set_flag(C_FLAG, shifted.1);
            shifted.0
        }
        0x3 => {
            let amount = rs_val & 0xFF;
            let shifted = lsr(rd_val, amount, cpu.flag(C_FLAG));
            cpu.set_flag(C_FLAG, shifted.1);
            shifted.0
        }
        0x4 => {
            let amount = rs_val & 0xFF;
            let shifted = asr(rd_val, amount, cpu.flag(C_FLAG));
            cpu.set_flag(C_FLAG, shifted.1);
            shifted.0
        }
        0x5 => add_with_flags(cpu, rd_val, rs_val, cpu.flag(C_FLAG) as u32, true), // ADC
        0x6 => sub_with_flags(cpu, rd_val, rs_val, cpu.flag(C_FLAG) as u32, true), // SBC
        0x7 => {
            let amount = rs_val & 0xFF;
            let result = if amount & 0x1F == 0 && amount != 0 {
                rd_val
            } else {
                rd_val.rotate_right(amount & 0x1F)
            };
            cpu.set_flag(C_FLAG, (result & 0x8000_0000) != 0);
            result // ROR
        }
        0x8 => {
            let r = rd_val & rs_val; // TST
            set_nz(cpu, r);
            return;
        }
        0x9 => sub_with_flags(cpu, 0, rd_val, 1, true), // NEG
        0xA => {
            sub_with_flags(cpu, rd_val, rs_val, 1, true); // CMP
            return;
        }
        0xB => {
            add_with_flags(cpu, rd_val, rs_val, 0, true); // CMN
            return;
        }
        0xC => rd_val | rs_val,   // ORR
        0xD => rd_val.wrapping_mul(rs_val), // MUL
        0xE => rd_val & !rs_val, // BIC
        0xF => !rs_val,          // MVN
        _ => unreachable!(),
    };
    set_nz(cpu, result);
    cpu.set_reg(rd, result);
}

fn lsl(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        (value, carry_in)
    } else if amount < 32 {
        (value << amount, (value >> (32 - amount)) & 1 != 0)
    } else if amount == 32 {
        (0, value & 1 != 0)
    } else {
        (0, false)
    }
}

fn lsr(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        (value, carry_in)
    } else if amount < 32 {
        (value >> amount, (value >> (amount - 1)) & 1 != 0)
    } else if amount == 32 {
        (0, value & 0x8000_0000 != 0)
    } else {
        (0, false)
    }
}

fn asr(value: u32, amount: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        (value, carry_in)
    } else if amount < 32 {
        (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
    } else {
        let carry = value & 0x8000_0000 != 0;
        (if carry { 0xFFFF_FFFF } else { 0 }, carry)
    }
}

fn hi_register_ops_and_bx(cpu: &mut Cpu, op: u32) -> Result<()> {
    let op_kind = (op >> 8) & 0x3;
    let h1 = (op >> 7) & 1;
    let h2 = (op >> 6) & 1;
    let rs = (((op >> 3) & 0x7) | (h2 << 3)) as u8;
    let rd = ((op & 0x7) | (h1 << 3)) as u8;

    match op_kind {
        0x0 => {
            let result = cpu.reg(rd).wrapping_add(cpu.reg(rs));
            cpu.set_reg(rd, result);
        }
        0x1 => {
            sub_with_flags(cpu, cpu.reg(rd), cpu.reg(rs), 1, true);
        }
        0x2 => {
            let value = cpu.reg(rs);
            cpu.set_reg(rd, value);
        }
        0x3 => {
            let target = cpu.reg(rs);
            if h1 != 0 {
                let next = cpu.pc_value() | 1;
                cpu.set_reg(14, next);
            }
            cpu.branch_exchange(target);
        }
        _ => {
            return Err(EmulatorError::UnimplementedInstruction {
                opcode: op,
                pc: cpu.pc_value(),
            })
        }
    }
    Ok(())
}

/// §7: unaligned loads/stores are truncated and logged, never fatal —
/// `Bus::read_half`/`read_word`/etc. already mask the address down to the
/// containing aligned unit, so this only needs to surface the diagnostic.
fn check_alignment(cpu: &mut Cpu, address: u32, size: u8, bus_kind: BusKind) {
    if let Err(err) = Bus::check_alignment(address, size, bus_kind) {
        cpu.record_error(err);
    }
}

fn pc_relative_load(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let rd = ((op >> 8) & 0x7) as u8;
    let imm = (op & 0xFF) * 4;
    let base = cpu.reg(15) & !3;
    let address = base.wrapping_add(imm);
    check_alignment(cpu, address, 4, BusKind::Data);
    let value = bus.read_word(address, BusKind::Data);
    cpu.set_reg(rd, value);
}

fn load_store_register_offset(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let load = (op >> 11) & 1 != 0;
    let byte = (op >> 10) & 1 != 0;
    let ro = ((op >> 6) & 0x7) as u8;
    let rb = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let address = cpu.reg(rb).wrapping_add(cpu.reg(ro));
    if load {
        let value = if byte {
            bus.read_byte(address, BusKind::Data) as u32
        } else {
            check_alignment(cpu, address, 4, BusKind::Data);
            bus.read_word(address, BusKind::Data).rotate_right((address & 3) * 8)
        };
        cpu.set_reg(rd, value);
    } else if byte {
        bus.write_byte(address, cpu.reg(rd) as u8, BusKind::Data);
    } else {
        check_alignment(cpu, address, 4, BusKind::Data);
        bus.write_word(address, cpu.reg(rd), BusKind::Data);
    }
}

fn load_store_halfword(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    // Covers both "load/store sign-extended byte/halfword" (bit 9 set) and
    // "load/store halfword" (bit 11 group) Thumb formats, which share the
    // same 3-register layout.
    let opc = (op >> 10) & 0x3;
    let ro = ((op >> 6) & 0x7) as u8;
    let rb = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let address = cpu.reg(rb).wrapping_add(cpu.reg(ro));
    match opc {
        0x0 => {
            check_alignment(cpu, address, 2, BusKind::Data);
            bus.write_half(address, cpu.reg(rd) as u16, BusKind::Data) // STRH
        }
        0x1 => {
            let v = bus.read_byte(address, BusKind::Data) as i8 as i32 as u32; // LDSB
            cpu.set_reg(rd, v);
        }
        0x2 => {
            check_alignment(cpu, address, 2, BusKind::Data);
            let v = bus.read_half(address, BusKind::Data) as u32; // LDRH
            cpu.set_reg(rd, v);
        }
        0x3 => {
            check_alignment(cpu, address, 2, BusKind::Data);
            let v = bus.read_half(address, BusKind::Data) as i16 as i32 as u32; // LDSH
            cpu.set_reg(rd, v);
        }
        _ => unreachable!(),
    }
}

fn load_store_immediate_offset(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let byte = (op >> 12) & 1 != 0;
    let load = (op >> 11) & 1 != 0;
    let imm = (op >> 6) & 0x1F;
    let rb = ((op >> 3) & 0x7) as u8;
    let rd = (op & 0x7) as u8;
    let offset = if byte { imm } else { imm * 4 };
    let address = cpu.reg(rb).wrapping_add(offset);
    if load {
        let value = if byte {
            bus.read_byte(address, BusKind::Data) as u32
        } else {
            check_alignment(cpu, address, 4, BusKind::Data);
            bus.read_word(address, BusKind::Data).rotate_right((address & 3) * 8)
        };
        cpu.set_reg(rd, value);
    } else if byte {
        bus.write_byte(address, cpu.reg(rd) as u8, BusKind::Data);
    } else {
        check_alignment(cpu, address, 4, BusKind::Data);
        bus.write_word(address, cpu.reg(rd), BusKind::Data);
    }
}

fn sp_relative_load_store(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let load = (op >> 11) & 1 != 0;
    let rd = ((op >> 8) & 0x7) as u8;
    let imm = (op & 0xFF) * 4;
    let address = cpu.reg(13).wrapping_add(imm);
    check_alignment(cpu, address, 4, BusKind::Data);
    if load {
        let value = bus.read_word(address, BusKind::Data).rotate_right((address & 3) * 8);
        cpu.set_reg(rd, value);
    } else {
        bus.write_word(address, cpu.reg(rd), BusKind::Data);
    }
}

fn load_address(cpu: &mut Cpu, op: u32) {
    let use_sp = (op >> 11) & 1 != 0;
    let rd = ((op >> 8) & 0x7) as u8;
    let imm = (op & 0xFF) * 4;
    let base = if use_sp { cpu.reg(13) } else { cpu.reg(15) & !3 };
    cpu.set_reg(rd, base.wrapping_add(imm));
}

fn add_offset_to_sp(cpu: &mut Cpu, op: u32) {
    let negative = (op >> 7) & 1 != 0;
    let imm = (op & 0x7F) * 4;
    let sp = cpu.reg(13);
    cpu.set_reg(13, if negative { sp.wrapping_sub(imm) } else { sp.wrapping_add(imm) });
}

fn push_pop(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let load = (op >> 11) & 1 != 0;
    let store_lr_or_load_pc = (op >> 8) & 1 != 0;
    let register_list = op & 0xFF;

    if load {
        let mut address = cpu.reg(13);
        check_alignment(cpu, address, 4, BusKind::Data);
        for reg in 0..8u8 {
            if register_list & (1 << reg) != 0 {
                let value = bus.read_word(address, BusKind::Data);
                cpu.set_reg(reg, value);
                address = address.wrapping_add(4);
            }
        }
        if store_lr_or_load_pc {
            let value = bus.read_word(address, BusKind::Data);
            cpu.branch_exchange(value | 1);
            address = address.wrapping_add(4);
        }
        cpu.set_reg(13, address);
    } else {
        let count = register_list.count_ones() + store_lr_or_load_pc as u32;
        let mut address = cpu.reg(13).wrapping_sub(count * 4);
        cpu.set_reg(13, address);
        check_alignment(cpu, address, 4, BusKind::Data);
        for reg in 0..8u8 {
            if register_list & (1 << reg) != 0 {
                let value = cpu.reg(reg);
                bus.write_word(address, value, BusKind::Data);
                address = address.wrapping_add(4);
            }
        }
        if store_lr_or_load_pc {
            let value = cpu.reg(14);
            bus.write_word(address, value, BusKind::Data);
        }
    }
}

fn multiple_load_store(cpu: &mut Cpu, bus: &mut Bus, op: u32) {
    let load = (op >> 11) & 1 != 0;
    let rb = ((op >> 8) & 0x7) as u8;
    let register_list = op & 0xFF;
    let mut address = cpu.reg(rb);
    check_alignment(cpu, address, 4, BusKind::Data);
    for reg in 0..8u8 {
        if register_list & (1 << reg) == 0 {
            continue;
        }
        if load {
            let value = bus.read_word(address, BusKind::Data);
            cpu.set_reg(reg, value);
        } else {
            let value = cpu.reg(reg);
            bus.write_word(address, value, BusKind::Data);
        }
        address = address.wrapping_add(4);
    }
    cpu.set_reg(rb, address);
}

fn conditional_branch(cpu: &mut Cpu, op: u32) {
    let cond = (op >> 8) & 0xF;
    let n = cpu.flag(N_FLAG);
    let z = cpu.flag(Z_FLAG);
    let c = cpu.flag(C_FLAG);
    let v = cpu.flag(V_FLAG);
    let taken = match cond {
        0x0 => z,
        0x1 => !z,
        0x2 => c,
        0x3 => !c,
        0x4 => n,
        0x5 => !n,
        0x6 => v,
        0x7 => !v,
        0x8 => c && !z,
        0x9 => !c || z,
        0xA => n == v,
        0xB => n != v,
        0xC => !z && (n == v),
        0xD => z || (n != v),
        _ => false,
    };
    if !taken {
        return;
    }
    let offset = (((op & 0xFF) as i8 as i32) << 1) as u32;
    let pc = cpu.reg(15);
    cpu.branch_to(pc.wrapping_add(offset));
}

fn software_interrupt(cpu: &mut Cpu) {
    let lr = cpu.pc_value();
    cpu.enter_exception(Mode::Supervisor, 0x08, lr, false);
}

fn unconditional_branch(cpu: &mut Cpu, op: u32) {
    let offset = (((op & 0x7FF) << 21) as i32 >> 20) as u32;
    let pc = cpu.reg(15);
    cpu.branch_to(pc.wrapping_add(offset));
}

fn long_branch_with_link(cpu: &mut Cpu, op: u32) {
    let low = (op >> 11) & 1 != 0;
    let offset11 = op & 0x7FF;
    if !low {
        let pc = cpu.reg(15);
        let offset = (((offset11 << 21) as i32) >> 9) as u32;
        cpu.set_reg(14, pc.wrapping_add(offset));
    } else {
        let next_pc = cpu.pc_value() | 1;
        let target = cpu.reg(14).wrapping_add(offset11 << 1);
        cpu.set_reg(14, next_pc);
        cpu.branch_to(target);
    }
}

fn undefined(cpu: &mut Cpu, op: u32) -> Result<()> {
    Err(EmulatorError::UnimplementedInstruction {
        opcode: op,
        pc: cpu.pc_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dma::DmaController;
    use crate::core::memory::tcm::TcmConfig;
    use crate::core::memory::{Bus, CpuSide, SharedPeripherals, ARM7_WRAM_SIZE};
    use crate::core::timer::TimerUnit;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn arm7_bus() -> Bus {
        let shared = SharedPeripherals::new();
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
        let irq = shared.irq7.clone();
        Bus::new_arm7(
            shared,
            arm7_wram,
            irq,
            Rc::new(RefCell::new(DmaController::new(CpuSide::Arm7))),
            Rc::new(RefCell::new(TimerUnit::new())),
        )
    }

    #[test]
    fn move_immediate_sets_zero_flag() {
        let mut cpu = Cpu::new(false);
        let mut bus = arm7_bus();
        // MOV r0, #0
        execute(&mut cpu, &mut bus, 0x2000).unwrap();
        assert_eq!(cpu.reg(0), 0);
        assert!(cpu.flag(Z_FLAG));
    }

    #[test]
    fn add_immediate_updates_register() {
        let mut cpu = Cpu::new(false);
        let mut bus = arm7_bus();
        cpu.set_reg(0, 5);
        // ADD r0, #10 -> 0x3000 | (0<<8) | 10
        execute(&mut cpu, &mut bus, 0x300A).unwrap();
        assert_eq!(cpu.reg(0), 15);
    }

    #[test]
    fn conditional_branch_not_taken_leaves_pc() {
        let mut cpu = Cpu::new(false);
        let mut bus = arm7_bus();
        cpu.branch_to(0x1000);
        let before = cpu.pc_value();
        // BEQ with Z clear: cond=0x0, offset=4
        cpu.set_flag(Z_FLAG, false);
        execute(&mut cpu, &mut bus, 0xD002).unwrap();
        assert_eq!(cpu.pc_value(), before);
    }
}
