// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors

//! §8: loading a ROM through `System` reaches the cartridge header's
//! entrypoints and leaves the documented chip-ID/BIOS-CRC fixup words in
//! ARM9 main RAM.

use nitro_core::core::config::EmulatorConfig;
use nitro_core::core::memory::BusKind;
use nitro_core::core::system::System;
use std::io::Write;

fn make_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x1000];
    rom[0x00..0x0C].copy_from_slice(b"NITROTEST\0\0\0");
    rom[0x0C..0x10].copy_from_slice(b"NTRT");
    rom[0x20..0x24].copy_from_slice(&0x200u32.to_le_bytes());
    rom[0x24..0x28].copy_from_slice(&0x0200_0000u32.to_le_bytes());
    rom[0x28..0x2C].copy_from_slice(&0x0200_0000u32.to_le_bytes());
    rom[0x2C..0x30].copy_from_slice(&0x100u32.to_le_bytes());
    rom[0x30..0x34].copy_from_slice(&0x300u32.to_le_bytes());
    rom[0x34..0x38].copy_from_slice(&0x0238_0000u32.to_le_bytes());
    rom[0x38..0x3C].copy_from_slice(&0x0238_0000u32.to_le_bytes());
    rom[0x3C..0x40].copy_from_slice(&0x100u32.to_le_bytes());
    for (i, b) in rom[0x200..0x300].iter_mut().enumerate() {
        *b = i as u8;
    }
    rom
}

#[test]
fn load_rom_seeds_entrypoints_and_fixups() {
    let mut rom_file = tempfile::NamedTempFile::new().unwrap();
    rom_file.write_all(&make_rom()).unwrap();

    let mut system = System::new(EmulatorConfig::default());
    system.load_rom(rom_file.path()).unwrap();

    assert_eq!(system.cpu9().pc_value(), 0x0200_0000);
    assert_eq!(system.cpu7().pc_value(), 0x0238_0000);

    let bus9 = system.bus9_mut();
    assert_eq!(bus9.read_word(0x027F_F800, BusKind::System), 0x1FC2);
    assert_eq!(bus9.read_word(0x027F_F804, BusKind::System), 0x1FC2);
    assert_eq!(bus9.read_word(0x027F_FC00, BusKind::System), 0x1FC2);
    assert_eq!(bus9.read_word(0x027F_FC04, BusKind::System), 0x1FC2);
    assert_eq!(bus9.read_word(0x027F_F850, BusKind::System), 0x5835);
    assert_eq!(bus9.read_word(0x027F_FC10, BusKind::System), 0x5835);
    assert_eq!(bus9.read_word(0x027F_F880, BusKind::System), 7);
    assert_eq!(bus9.read_word(0x027F_F884, BusKind::System), 6);
    assert_eq!(bus9.read_word(0x027F_FC40, BusKind::System), 1);
}

#[test]
fn load_rom_rejects_missing_file() {
    let mut system = System::new(EmulatorConfig::default());
    let err = system.load_rom("/nonexistent/path/to/rom.nds");
    assert!(err.is_err());
}
