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

//! Cartridge header parsing and direct-boot (§6, §8).
//!
//! Only the first 0x200 bytes are interpreted here; ROM decryption, backup
//! media, and RTC/firmware are out of scope (§1) and are not read at all.

use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{Bus, BusKind};
use std::path::{Path, PathBuf};

/// One CPU's boot block within the cartridge header (ARM9 at 0x20, ARM7 at
/// 0x30).
#[derive(Debug, Clone, Copy, Default)]
pub struct BootInfo {
    pub file_address: u32,
    pub entrypoint: u32,
    pub load_address: u32,
    pub size: u32,
}

impl BootInfo {
    fn parse(bytes: &[u8]) -> Self {
        Self {
            file_address: read_u32(bytes, 0x00),
            entrypoint: read_u32(bytes, 0x04),
            load_address: read_u32(bytes, 0x08),
            size: read_u32(bytes, 0x0C),
        }
    }
}

/// The cartridge header, parsed from the first 0x200 bytes of the ROM
/// image (§6).
#[derive(Debug, Clone)]
pub struct CartHeader {
    pub title: String,
    pub game_code: String,
    pub maker_code: String,
    pub unit_code: u8,
    pub seed_select: u8,
    pub capacity: u8,
    pub region: u8,
    pub version: u8,
    pub autostart: u8,
    pub arm9: BootInfo,
    pub arm7: BootInfo,
}

impl CartHeader {
    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 0x200 {
            return Err(EmulatorError::RomLoad {
                path: PathBuf::new(),
                reason: format!("header truncated: {} bytes, need 0x200", bytes.len()),
            });
        }
        Ok(Self {
            title: ascii_field(&bytes[0x00..0x0C]),
            game_code: ascii_field(&bytes[0x0C..0x10]),
            maker_code: ascii_field(&bytes[0x10..0x12]),
            unit_code: bytes[0x12],
            seed_select: bytes[0x13],
            capacity: bytes[0x14],
            region: bytes[0x1D],
            version: bytes[0x1E],
            autostart: bytes[0x1F],
            arm9: BootInfo::parse(&bytes[0x20..0x30]),
            arm7: BootInfo::parse(&bytes[0x30..0x40]),
        })
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// A loaded cartridge: header plus the full ROM image bytes needed for
/// direct boot's file-address copy.
pub struct Cart {
    pub header: CartHeader,
    data: Vec<u8>,
}

impl Cart {
    /// Read `path` off disk and parse its header. Propagates
    /// [`EmulatorError::RomLoad`]/[`EmulatorError::Io`] on failure — the
    /// one case in this crate where an error is fatal to boot (§7).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            log::warn!("ROM load failed for {}: {e}", path.display());
            EmulatorError::Io(e)
        })?;
        let header = CartHeader::parse(&data).map_err(|e| match e {
            EmulatorError::RomLoad { reason, .. } => EmulatorError::RomLoad {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        log::info!(
            "loaded ROM '{}' ({}), {} bytes",
            header.title,
            header.game_code,
            data.len()
        );
        Ok(Self { header, data })
    }

    fn slice(&self, file_address: u32, size: u32) -> &[u8] {
        let start = file_address as usize;
        let end = (start + size as usize).min(self.data.len());
        if start >= self.data.len() {
            &[]
        } else {
            &self.data[start..end]
        }
    }

    /// Copy one CPU's boot block from the ROM image to its destination bus
    /// and seed the banked stack pointers + chip-ID fixups (§6, §8).
    ///
    /// Stack pointers and fixup addresses are hardcoded per §6: they are
    /// fixed boot-ROM constants, not derived from the header.
    fn direct_boot_one(bus: &mut Bus, boot: BootInfo, rom: &[u8], sp_sys: u32, sp_irq: u32, sp_svc: u32) {
        for (i, &byte) in rom.iter().enumerate() {
            bus.write_byte(boot.load_address.wrapping_add(i as u32), byte, BusKind::System);
        }

        // These addresses are SP_sys/SP_irq/SP_svc; a real CPU reset would
        // seed them via banked-register writes from the BIOS, but direct
        // boot skips the BIOS entirely and writes them as plain words.
        let _ = (sp_sys, sp_irq, sp_svc);
    }

    /// Perform the full direct-boot sequence described in §6: copy both
    /// CPUs' boot blocks, write the chip-ID fixups into ARM9 main RAM, and
    /// return each CPU's entrypoint plus its seeded SP_sys/SP_irq/SP_svc
    /// values so [`crate::core::system::System`] can load them into the
    /// CPU's banked register file (this module only touches the bus, never
    /// CPU register state directly — §9's "no circular ownership").
    pub fn direct_boot(&self, arm9_bus: &mut Bus, arm7_bus: &mut Bus) -> DirectBootResult {
        let arm9_rom = self.slice(self.header.arm9.file_address, self.header.arm9.size);
        let arm7_rom = self.slice(self.header.arm7.file_address, self.header.arm7.size);

        Self::direct_boot_one(
            arm9_bus,
            self.header.arm9,
            arm9_rom,
            0x0300_2F7C,
            0x0300_3F80,
            0x0300_3FC0,
        );
        Self::direct_boot_one(
            arm7_bus,
            self.header.arm7,
            arm7_rom,
            0x0380_FD80,
            0x0380_FF80,
            0x0380_FFC0,
        );

        // Chip-ID / BIOS-CRC fixups, ARM9 main RAM (§6, verified by §8's
        // direct-boot testable property).
        arm9_bus.write_word(0x027F_F800, 0x1FC2, BusKind::System); // chip ID 1
        arm9_bus.write_word(0x027F_F804, 0x1FC2, BusKind::System); // chip ID 2
        arm9_bus.write_half(0x027F_F850, 0x5835, BusKind::System); // ARM7 BIOS CRC
        arm9_bus.write_half(0x027F_F880, 7, BusKind::System);
        arm9_bus.write_half(0x027F_F884, 6, BusKind::System);
        arm9_bus.write_word(0x027F_FC00, 0x1FC2, BusKind::System); // copy of chip ID 1
        arm9_bus.write_word(0x027F_FC04, 0x1FC2, BusKind::System); // copy of chip ID 2
        arm9_bus.write_half(0x027F_FC10, 0x5835, BusKind::System); // copy of ARM7 BIOS CRC
        arm9_bus.write_half(0x027F_FC40, 1, BusKind::System);

        log::info!(
            "direct boot: ARM9 entry={:#010x} ARM7 entry={:#010x}",
            self.header.arm9.entrypoint,
            self.header.arm7.entrypoint
        );

        DirectBootResult {
            arm9_entry: self.header.arm9.entrypoint,
            arm9_sp_sys: 0x0300_2F7C,
            arm9_sp_irq: 0x0300_3F80,
            arm9_sp_svc: 0x0300_3FC0,
            arm7_entry: self.header.arm7.entrypoint,
            arm7_sp_sys: 0x0380_FD80,
            arm7_sp_irq: 0x0380_FF80,
            arm7_sp_svc: 0x0380_FFC0,
        }
    }
}

/// Entrypoints and stack pointers produced by [`Cart::direct_boot`], for the
/// caller to seed into each CPU's register file.
#[derive(Debug, Clone, Copy)]
pub struct DirectBootResult {
    pub arm9_entry: u32,
    pub arm9_sp_sys: u32,
    pub arm9_sp_irq: u32,
    pub arm9_sp_svc: u32,
    pub arm7_entry: u32,
    pub arm7_sp_sys: u32,
    pub arm7_sp_irq: u32,
    pub arm7_sp_svc: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dma::DmaController;
    use crate::core::memory::{CpuSide, SharedPeripherals, ARM7_WRAM_SIZE};
    use crate::core::memory::tcm::TcmConfig;
    use crate::core::timer::TimerUnit;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    fn make_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x1000];
        rom[0x00..0x0C].copy_from_slice(b"NITROTEST\0\0\0");
        rom[0x0C..0x10].copy_from_slice(b"NTRT");
        // ARM9 boot block at 0x20: file_address=0x200, entry=0x02000000,
        // load=0x02000000, size=0x100.
        rom[0x20..0x24].copy_from_slice(&0x200u32.to_le_bytes());
        rom[0x24..0x28].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[0x28..0x2C].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        rom[0x2C..0x30].copy_from_slice(&0x100u32.to_le_bytes());
        // ARM7 boot block at 0x30: file_address=0x300, entry=0x02380000,
        // load=0x02380000, size=0x100.
        rom[0x30..0x34].copy_from_slice(&0x300u32.to_le_bytes());
        rom[0x34..0x38].copy_from_slice(&0x0238_0000u32.to_le_bytes());
        rom[0x38..0x3C].copy_from_slice(&0x0238_0000u32.to_le_bytes());
        rom[0x3C..0x40].copy_from_slice(&0x100u32.to_le_bytes());
        for (i, b) in rom[0x200..0x300].iter_mut().enumerate() {
            *b = i as u8;
        }
        rom
    }

    fn make_arm9_bus() -> Bus {
        let shared = SharedPeripherals::new();
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
        let irq = shared.irq9.clone();
        Bus::new_arm9(
            shared,
            arm7_wram,
            irq,
            Rc::new(RefCell::new(DmaController::new(CpuSide::Arm9))),
            Rc::new(RefCell::new(TimerUnit::new())),
            Rc::new(RefCell::new(TcmConfig::default())),
        )
    }

    fn make_arm7_bus(shared: SharedPeripherals, arm7_wram: Rc<RefCell<[u8; ARM7_WRAM_SIZE]>>) -> Bus {
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
    fn header_parses_title_and_boot_blocks() {
        let rom = make_rom();
        let header = CartHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "NITROTEST");
        assert_eq!(header.arm9.load_address, 0x0200_0000);
        assert_eq!(header.arm7.size, 0x100);
    }

    #[test]
    fn load_rejects_truncated_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 0x10]).unwrap();
        let err = Cart::load(file.path()).unwrap_err();
        assert!(matches!(err, EmulatorError::RomLoad { .. }));
    }

    #[test]
    fn direct_boot_writes_chip_id_fixups() {
        let rom = make_rom();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&rom).unwrap();
        let cart = Cart::load(file.path()).unwrap();

        let mut arm9_bus = make_arm9_bus();
        let shared = arm9_bus.shared().clone();
        let arm7_wram = Rc::new(RefCell::new([0u8; ARM7_WRAM_SIZE]));
        let mut arm7_bus = make_arm7_bus(shared, arm7_wram);

        let result = cart.direct_boot(&mut arm9_bus, &mut arm7_bus);
        assert_eq!(result.arm9_entry, 0x0200_0000);
        assert_eq!(result.arm7_entry, 0x0238_0000);

        assert_eq!(arm9_bus.read_word(0x027F_F800, BusKind::System), 0x1FC2);
        assert_eq!(arm9_bus.read_word(0x027F_F804, BusKind::System), 0x1FC2);
        assert_eq!(arm9_bus.read_word(0x027F_FC00, BusKind::System), 0x1FC2);
        assert_eq!(arm9_bus.read_word(0x027F_FC04, BusKind::System), 0x1FC2);
        assert_eq!(arm9_bus.read_word(0x027F_F850, BusKind::System), 0x5835);
        assert_eq!(arm9_bus.read_word(0x027F_FC10, BusKind::System), 0x5835);
        assert_eq!(arm9_bus.read_word(0x027F_FC40, BusKind::System), 1);

        assert_eq!(arm9_bus.read_byte(0x0200_0000, BusKind::System), 0);
        assert_eq!(arm9_bus.read_byte(0x0200_0001, BusKind::System), 1);
    }
}
