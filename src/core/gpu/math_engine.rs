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

//! Divider/square-root coprocessor exposed at `DIVCNT`/`SQRTCNT` and
//! friends (§6). Division recomputes on any write to numerator,
//! denominator, or mode; square root recomputes on any write to its
//! 64-bit parameter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivMode {
    /// 32-bit numerator / 32-bit denominator.
    S32S32,
    /// 64-bit numerator / 32-bit denominator.
    S64S32,
    /// 64-bit numerator / 64-bit denominator.
    S64S64,
}

impl DivMode {
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => DivMode::S32S32,
            1 => DivMode::S64S32,
            _ => DivMode::S64S64,
        }
    }
}

#[derive(Debug, Default)]
pub struct MathEngine {
    pub div_mode: Option<DivMode>,
    pub div_numer: i64,
    pub div_denom: i64,
    pub div_result: i64,
    pub div_remain: i64,
    pub div_error: bool,

    pub sqrt_64bit: bool,
    pub sqrt_param: u64,
    pub sqrt_result: u32,
}

impl MathEngine {
    pub fn new() -> Self {
        Self {
            div_mode: Some(DivMode::S32S32),
            ..Default::default()
        }
    }

    pub fn set_div_mode(&mut self, bits: u16) {
        self.div_mode = Some(DivMode::from_bits(bits));
        self.recompute_div();
    }

    /// DIVCNT readback: mode in bits 0-1, the sticky division-by-zero flag
    /// in bit 14 (§6).
    pub fn div_mode_bits(&self) -> u32 {
        let mode_bits = match self.div_mode.unwrap_or(DivMode::S32S32) {
            DivMode::S32S32 => 0u32,
            DivMode::S64S32 => 1,
            DivMode::S64S64 => 2,
        };
        mode_bits | ((self.div_error as u32) << 14)
    }

    pub fn set_div_numer(&mut self, value: i64) {
        self.div_numer = value;
        self.recompute_div();
    }

    pub fn set_div_denom(&mut self, value: i64) {
        self.div_denom = value;
        self.recompute_div();
    }

    /// §6 and §8: division-by-zero and `INT_MIN / -1` both have documented
    /// sentinel outputs rather than panicking.
    fn recompute_div(&mut self) {
        let mode = self.div_mode.unwrap_or(DivMode::S32S32);
        let (numer, denom) = match mode {
            DivMode::S32S32 => (self.div_numer as i32 as i64, self.div_denom as i32 as i64),
            DivMode::S64S32 => (self.div_numer, self.div_denom as i32 as i64),
            DivMode::S64S64 => (self.div_numer, self.div_denom),
        };

        if denom == 0 {
            self.div_error = true;
            self.div_result = match mode {
                // 32-bit mode never sign-extends into the upper word: the
                // "all ones" sentinel reads back as 0x00000000FFFFFFFF, not
                // -1 (§8's `7 / 0` test vector).
                DivMode::S32S32 => {
                    if numer < 0 {
                        1
                    } else {
                        0x0000_0000_FFFF_FFFFu64 as i64
                    }
                }
                _ => {
                    if numer < 0 {
                        1
                    } else {
                        -1
                    }
                }
            };
            self.div_remain = self.div_numer;
            return;
        }
        self.div_error = false;

        let int_min_over_minus_one = match mode {
            // S32S32 truncates both operands to i32 range above, so its
            // overflow boundary is i32::MIN, not i64::MIN.
            DivMode::S32S32 => numer == i32::MIN as i64 && denom == -1,
            DivMode::S64S32 | DivMode::S64S64 => numer == i64::MIN && denom == -1,
        };
        if int_min_over_minus_one {
            self.div_result = match mode {
                DivMode::S32S32 => i32::MIN as i64,
                _ => i64::MIN,
            };
            self.div_remain = 0;
            return;
        }

        self.div_result = numer.wrapping_div(denom);
        self.div_remain = numer.wrapping_rem(denom);
    }

    pub fn set_sqrt_mode(&mut self, is_64bit: bool) {
        self.sqrt_64bit = is_64bit;
        self.recompute_sqrt();
    }

    pub fn set_sqrt_param(&mut self, value: u64) {
        self.sqrt_param = value;
        self.recompute_sqrt();
    }

    /// Integer square root, rounded toward zero (§6).
    fn recompute_sqrt(&mut self) {
        let value = if self.sqrt_64bit {
            self.sqrt_param
        } else {
            self.sqrt_param & 0xFFFF_FFFF
        };
        self.sqrt_result = isqrt(value);
    }
}

fn isqrt(value: u64) -> u32 {
    if value == 0 {
        return 0;
    }
    let mut x = (value as f64).sqrt() as u64 + 1;
    while x * x > value {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= value {
        x += 1;
    }
    x as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_by_minus_one_signed_wrap() {
        let mut m = MathEngine::new();
        m.set_div_mode(0);
        m.set_div_numer(0x8000_0000u32 as i32 as i64);
        m.set_div_denom(0xFFFF_FFFFu32 as i32 as i64);
        assert_eq!(m.div_result as u64, 0xFFFF_FFFF_8000_0000);
        assert_eq!(m.div_remain, 0);
    }

    #[test]
    fn div_by_zero_mode0_positive_numerator() {
        let mut m = MathEngine::new();
        m.set_div_mode(0);
        m.set_div_numer(7);
        m.set_div_denom(0);
        assert_eq!(m.div_result as u64, 0x0000_0000_FFFF_FFFF);
        assert_eq!(m.div_remain, 7);
        assert!(m.div_error);
    }

    #[test]
    fn sqrt_rounds_toward_zero() {
        let mut m = MathEngine::new();
        m.set_sqrt_mode(false);
        m.set_sqrt_param(10);
        assert_eq!(m.sqrt_result, 3);
    }
}
