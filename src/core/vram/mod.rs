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

//! VRAM controller (§4.4, §6): nine physical banks, each independently
//! remappable into one of several target regions through its VRAMCNT_*
//! register. Every target region is a page table of 16 KiB pages; a page
//! is empty, holds one physical bank page, or (when two enabled banks
//! target the same page) holds a small list of them, OR-blended on read
//! and broadcast on write (§4.4's "rare but required" bus-mirroring case).
//!
//! Remap notification (fast page table + PPU cache invalidation) is done
//! through the `on_remap` callback parameter rather than an owned `Bus`
//! reference, avoiding a dependency cycle between `vram` and `memory`.

use log::trace;

const PAGE_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

impl Bank {
    pub const ALL: [Bank; 9] = [
        Bank::A,
        Bank::B,
        Bank::C,
        Bank::D,
        Bank::E,
        Bank::F,
        Bank::G,
        Bank::H,
        Bank::I,
    ];

    /// Physical size in 16 KiB pages.
    fn page_count(self) -> usize {
        match self {
            Bank::A | Bank::B => 8,
            Bank::C | Bank::D => 8,
            Bank::E => 4,
            Bank::F | Bank::G => 1,
            Bank::H => 2,
            Bank::I => 1,
        }
    }

    fn byte_size(self) -> usize {
        self.page_count() * PAGE_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Lcdc,
    BgA,
    BgB,
    ObjA,
    ObjB,
    Arm7Wram,
    GpuTexture,
    GpuTexturePalette,
    GpuPalette,
    BgExtPal,
    ObjExtPal,
}

impl Region {
    const ALL: [Region; 11] = [
        Region::Lcdc,
        Region::BgA,
        Region::BgB,
        Region::ObjA,
        Region::ObjB,
        Region::Arm7Wram,
        Region::GpuTexture,
        Region::GpuTexturePalette,
        Region::GpuPalette,
        Region::BgExtPal,
        Region::ObjExtPal,
    ];

    /// Size of the region's page table, in 16 KiB pages.
    fn page_count(self) -> usize {
        match self {
            Region::Lcdc => 41,
            Region::BgA => 32,
            Region::BgB => 8,
            Region::ObjA => 16,
            Region::ObjB => 8,
            Region::Arm7Wram => 16,
            Region::GpuTexture => 32,
            Region::GpuTexturePalette => 4,
            Region::GpuPalette => 8,
            Region::BgExtPal => 5,
            Region::ObjExtPal => 2,
        }
    }
}

/// One bank's VRAMCNT fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankCnt {
    pub mst: u8,
    pub offset: u8,
    pub enable: bool,
}

impl BankCnt {
    pub fn from_byte(b: u8) -> Self {
        Self {
            mst: b & 0b111,
            offset: (b >> 3) & 0b11,
            enable: b & 0b1000_0000 != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.mst & 0b111) | ((self.offset & 0b11) << 3) | ((self.enable as u8) << 7)
    }
}

/// Where a bank's pages land when the bank is enabled with a given
/// (mst, offset). `None` means the mst value is reserved/invalid for that
/// bank, which real hardware treats as leaving the bank unmapped.
fn compute_target(bank: Bank, cnt: BankCnt) -> Option<(Region, usize)> {
    let off = cnt.offset as usize;
    match bank {
        Bank::A => match cnt.mst {
            0 => Some((Region::Lcdc, 0)),
            1 => Some((Region::BgA, off * 8)),
            2 => Some((Region::ObjA, (off & 1) * 8)),
            3 => Some((Region::GpuTexture, off * 8)),
            _ => None,
        },
        Bank::B => match cnt.mst {
            0 => Some((Region::Lcdc, 8)),
            1 => Some((Region::BgA, off * 8)),
            2 => Some((Region::ObjA, (off & 1) * 8)),
            3 => Some((Region::GpuTexture, off * 8)),
            _ => None,
        },
        Bank::C => match cnt.mst {
            0 => Some((Region::Lcdc, 16)),
            1 => Some((Region::BgA, off * 8)),
            2 => Some((Region::Arm7Wram, (off & 1) * 8)),
            3 => Some((Region::GpuTexture, off * 8)),
            4 => Some((Region::BgB, 0)),
            _ => None,
        },
        Bank::D => match cnt.mst {
            0 => Some((Region::Lcdc, 24)),
            1 => Some((Region::BgA, off * 8)),
            2 => Some((Region::Arm7Wram, (off & 1) * 8)),
            3 => Some((Region::GpuTexture, off * 8)),
            4 => Some((Region::ObjB, 0)),
            _ => None,
        },
        Bank::E => match cnt.mst {
            0 => Some((Region::Lcdc, 32)),
            1 => Some((Region::BgA, 0)),
            2 => Some((Region::ObjA, 0)),
            3 => Some((Region::GpuTexturePalette, 0)),
            4 => Some((Region::BgExtPal, 0)),
            _ => None,
        },
        Bank::F => match cnt.mst {
            0 => Some((Region::Lcdc, 36)),
            1 => Some((Region::BgA, off as usize)),
            2 => Some((Region::ObjA, off as usize)),
            3 => Some((Region::GpuPalette, off as usize)),
            4 => Some((Region::BgExtPal, off as usize)),
            5 => Some((Region::ObjExtPal, 0)),
            _ => None,
        },
        Bank::G => match cnt.mst {
            0 => Some((Region::Lcdc, 37)),
            1 => Some((Region::BgA, off as usize)),
            2 => Some((Region::ObjA, off as usize)),
            3 => Some((Region::GpuPalette, off as usize)),
            4 => Some((Region::BgExtPal, off as usize)),
            5 => Some((Region::ObjExtPal, 0)),
            _ => None,
        },
        Bank::H => match cnt.mst {
            0 => Some((Region::Lcdc, 38)),
            1 => Some((Region::BgB, 1)),
            2 => Some((Region::BgExtPal, 4)),
            _ => None,
        },
        Bank::I => match cnt.mst {
            0 => Some((Region::Lcdc, 40)),
            1 => Some((Region::BgB, 2)),
            2 => Some((Region::ObjB, 1)),
            3 => Some((Region::ObjExtPal, 1)),
            _ => None,
        },
    }
}

/// One page of a region's page table: empty, one physical page, or a list
/// of them (OR-on-read / broadcast-on-write).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RegionPage(Vec<(Bank, usize)>);

pub struct VramController {
    banks: [Vec<u8>; 9],
    cnt: [BankCnt; 9],
    regions: std::collections::HashMap<Region, Vec<RegionPage>>,
    /// Pending fast-page-table invalidation range, drained by the bus after
    /// each VRAMCNT write (§4.4, §5: "no caching of stale pointers").
    dirty: Vec<(u32, u32)>,
}

impl VramController {
    pub fn new() -> Self {
        let mut regions = std::collections::HashMap::new();
        for r in Region::ALL {
            regions.insert(r, vec![RegionPage::default(); r.page_count()]);
        }
        Self {
            banks: [
                vec![0u8; Bank::A.byte_size()],
                vec![0u8; Bank::B.byte_size()],
                vec![0u8; Bank::C.byte_size()],
                vec![0u8; Bank::D.byte_size()],
                vec![0u8; Bank::E.byte_size()],
                vec![0u8; Bank::F.byte_size()],
                vec![0u8; Bank::G.byte_size()],
                vec![0u8; Bank::H.byte_size()],
                vec![0u8; Bank::I.byte_size()],
            ],
            cnt: [BankCnt::default(); 9],
            regions,
            dirty: Vec::new(),
        }
    }

    fn bank_index(bank: Bank) -> usize {
        Bank::ALL.iter().position(|b| *b == bank).unwrap()
    }

    fn bank_storage(&self, bank: Bank) -> &[u8] {
        &self.banks[Self::bank_index(bank)]
    }

    fn bank_storage_mut(&mut self, bank: Bank) -> &mut [u8] {
        &mut self.banks[Self::bank_index(bank)]
    }

    /// Unmap `bank` from wherever its previous VRAMCNT mapped it, removing
    /// it from every region page it occupied and collapsing list->single->
    /// empty as matches fall away.
    fn unmap(&mut self, bank: Bank) {
        let prev = self.cnt[Self::bank_index(bank)];
        if !prev.enable {
            return;
        }
        if let Some((region, first_page)) = compute_target(bank, prev) {
            let count = bank.page_count();
            if let Some(pages) = self.regions.get_mut(&region) {
                for p in first_page..(first_page + count).min(pages.len()) {
                    pages[p].0.retain(|(b, _)| *b != bank);
                }
            }
        }
    }

    /// Map `bank` per `cnt`, pushing it into every region page it now
    /// covers (promoting empty->single->list as needed).
    fn map(&mut self, bank: Bank, cnt: BankCnt) {
        if !cnt.enable {
            return;
        }
        let Some((region, first_page)) = compute_target(bank, cnt) else {
            return;
        };
        let count = bank.page_count();
        let page_byte_len = PAGE_SIZE.min(bank.byte_size() / count.max(1));
        if let Some(pages) = self.regions.get_mut(&region) {
            for (i, p) in (first_page..(first_page + count).min(pages.len())).enumerate() {
                pages[p].0.push((bank, i * page_byte_len));
            }
        }
    }

    /// Write a VRAMCNT register: unmap the bank's prior placement, update
    /// its control byte, then remap if still enabled (§4.4).
    pub fn write_cnt(&mut self, bank: Bank, value: u8) {
        self.unmap(bank);
        let cnt = BankCnt::from_byte(value);
        self.cnt[Self::bank_index(bank)] = cnt;
        self.map(bank, cnt);
        trace!("VRAMCNT[{bank:?}] = {cnt:?}");
        self.dirty.push((0, 0));
    }

    pub fn read_cnt(&self, bank: Bank) -> u8 {
        self.cnt[Self::bank_index(bank)].to_byte()
    }

    /// Drain the list of fast-page-table ranges invalidated since the last
    /// call. The bus owner calls this after every VRAMCNT write.
    pub fn take_dirty(&mut self) -> Vec<(u32, u32)> {
        std::mem::take(&mut self.dirty)
    }

    fn region_page_byte(&self, region: Region, address_in_region: usize) -> u8 {
        let page_index = address_in_region / PAGE_SIZE;
        let offset = address_in_region % PAGE_SIZE;
        let Some(pages) = self.regions.get(&region) else {
            return 0;
        };
        let Some(page) = pages.get(page_index) else {
            return 0;
        };
        let mut value = 0u8;
        for (bank, base) in &page.0 {
            let storage = self.bank_storage(*bank);
            if let Some(b) = storage.get(base + (offset % PAGE_SIZE.min(storage.len().max(1)))) {
                value |= *b;
            }
        }
        value
    }

    fn region_page_write(&mut self, region: Region, address_in_region: usize, value: u8) {
        let page_index = address_in_region / PAGE_SIZE;
        let offset = address_in_region % PAGE_SIZE;
        let entries = self
            .regions
            .get(&region)
            .and_then(|pages| pages.get(page_index))
            .map(|p| p.0.clone())
            .unwrap_or_default();
        for (bank, base) in entries {
            let storage = self.bank_storage_mut(bank);
            let len = storage.len();
            if len == 0 {
                continue;
            }
            let idx = (base + offset) % len;
            storage[idx] = value;
        }
    }

    /// LCDC-mapped byte read (CPU address space `0x06000000`..).
    pub fn read_lcdc_byte(&self, address: u32) -> u8 {
        let offset = (address as usize) % (Region::Lcdc.page_count() * PAGE_SIZE);
        self.region_page_byte(Region::Lcdc, offset)
    }

    pub fn write_lcdc_byte(&mut self, address: u32, value: u8) {
        let offset = (address as usize) % (Region::Lcdc.page_count() * PAGE_SIZE);
        self.region_page_write(Region::Lcdc, offset, value);
    }

    /// Standard and extended palette byte read (CPU address space
    /// `0x05000000`..). Extended palettes (banks E/F/G/H) are reached
    /// through their own VRAMCNT mst values, not modeled as part of this
    /// flat palette window; `GpuPalette` covers the F/G "GPU-palette
    /// sub-slot" mode only.
    pub fn read_palette_byte(&self, address: u32) -> u8 {
        let offset = (address as usize) % (Region::GpuPalette.page_count() * PAGE_SIZE);
        self.region_page_byte(Region::GpuPalette, offset)
    }

    pub fn write_palette_byte(&mut self, address: u32, value: u8) {
        let offset = (address as usize) % (Region::GpuPalette.page_count() * PAGE_SIZE);
        self.region_page_write(Region::GpuPalette, offset, value);
    }

    pub fn read_region_byte(&self, region: Region, address_in_region: u32) -> u8 {
        self.region_page_byte(region, address_in_region as usize)
    }

    pub fn write_region_byte(&mut self, region: Region, address_in_region: u32, value: u8) {
        self.region_page_write(region, address_in_region as usize, value);
    }

    /// Copies the whole of `region` out as a flat byte buffer. Used to take
    /// the once-per-frame GPU texture/texture-palette snapshot the parallel
    /// rasterizer renders against (§5).
    pub fn snapshot_region(&self, region: Region) -> Vec<u8> {
        (0..region.page_count() * PAGE_SIZE)
            .map(|off| self.region_page_byte(region, off))
            .collect()
    }
}

impl Default for VramController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(vram: &VramController, region: Region) -> Vec<RegionPage> {
        vram.regions.get(&region).cloned().unwrap_or_default()
    }

    #[test]
    fn enabling_bank_a_maps_lcdc() {
        let mut vram = VramController::new();
        vram.write_cnt(Bank::A, BankCnt { mst: 0, offset: 0, enable: true }.to_byte());
        assert!(!vram.regions[&Region::Lcdc][0].0.is_empty());
    }

    #[test]
    fn idempotent_enable_then_disable_restores_prior_state() {
        let mut vram = VramController::new();
        let before = snapshot(&vram, Region::BgA);

        vram.write_cnt(Bank::A, BankCnt { mst: 1, offset: 0, enable: true }.to_byte());
        vram.write_cnt(Bank::A, BankCnt { mst: 1, offset: 0, enable: false }.to_byte());

        let after = snapshot(&vram, Region::BgA);
        assert_eq!(before, after);
    }

    #[test]
    fn overlapping_enable_then_disable_leaves_only_first_bank() {
        let mut vram = VramController::new();
        vram.write_cnt(Bank::A, BankCnt { mst: 1, offset: 0, enable: true }.to_byte());
        let only_a = snapshot(&vram, Region::BgA);

        vram.write_cnt(Bank::B, BankCnt { mst: 1, offset: 0, enable: true }.to_byte());
        vram.write_cnt(Bank::B, BankCnt { mst: 1, offset: 0, enable: false }.to_byte());

        let after = snapshot(&vram, Region::BgA);
        assert_eq!(only_a, after);
    }

    #[test]
    fn list_mapped_page_ors_on_read_and_broadcasts_on_write() {
        let mut vram = VramController::new();
        vram.write_cnt(Bank::A, BankCnt { mst: 1, offset: 0, enable: true }.to_byte());
        vram.write_cnt(Bank::B, BankCnt { mst: 1, offset: 0, enable: true }.to_byte());

        vram.write_region_byte(Region::BgA, 0, 0b0000_1111);
        assert_eq!(vram.read_region_byte(Region::BgA, 0), 0b0000_1111);

        let a_storage = vram.bank_storage(Bank::A)[0];
        let b_storage = vram.bank_storage(Bank::B)[0];
        assert_eq!(a_storage, 0b0000_1111);
        assert_eq!(b_storage, 0b0000_1111);
    }
}
