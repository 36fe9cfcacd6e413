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

//! Emulator configuration.
//!
//! Loaded from a TOML file and overridable by environment variables loaded
//! through `dotenvy`, the same combination the teacher crate uses for its
//! frontend settings. `EmulatorConfig::default()` reproduces the hardware
//! power-on defaults named in the design spec, so a caller can run with no
//! config file at all.

use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime-tunable knobs for the emulator core.
///
/// # Example
///
/// ```
/// use nitro_core::core::config::EmulatorConfig;
///
/// let cfg = EmulatorConfig::default();
/// assert_eq!(cfg.loose_sync_quantum, 32);
/// assert_eq!(cfg.render_worker_threads, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Steps each CPU may run before the scheduler resynchronizes, per §5
    /// ("loose sync"). Never crosses an event boundary regardless of this
    /// value.
    pub loose_sync_quantum: u32,

    /// Number of GPU rasterizer worker threads, per §5. `0` forces
    /// single-threaded rendering on the main thread.
    pub render_worker_threads: usize,

    /// When false, polygons crossing the far clip plane are dropped instead
    /// of being clipped against it (§4.6).
    pub render_far_plane_polys: bool,

    /// Initial WRAMCNT value (shared-WRAM split mode) at power-on.
    pub wramcnt: u8,

    /// Path to the ARM9 BIOS image, if direct-boot bypass is not used.
    pub arm9_bios_path: Option<String>,

    /// Path to the ARM7 BIOS image, if direct-boot bypass is not used.
    pub arm7_bios_path: Option<String>,

    /// Path to the firmware image (consumed by the out-of-scope SPI/TSC
    /// collaborator, stored here only because it is a boot-time config
    /// knob the host must supply).
    pub firmware_path: Option<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            loose_sync_quantum: 32,
            render_worker_threads: 4,
            render_far_plane_polys: true,
            wramcnt: 0,
            arm9_bios_path: None,
            arm7_bios_path: None,
            firmware_path: None,
        }
    }
}

impl EmulatorConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits (`#[serde(default)]` on the struct).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        Ok(cfg)
    }

    /// Apply `NITRO_*` environment variable overrides on top of `self`,
    /// loading a `.env` file first via `dotenvy` if one is present. Missing
    /// or unparsable variables are silently ignored, since `.env` files are
    /// optional developer convenience, not a required config surface.
    pub fn apply_env_overrides(mut self) -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(v) = std::env::var("NITRO_LOOSE_SYNC_QUANTUM") {
            if let Ok(v) = v.parse() {
                self.loose_sync_quantum = v;
            }
        }
        if let Ok(v) = std::env::var("NITRO_RENDER_WORKER_THREADS") {
            if let Ok(v) = v.parse() {
                self.render_worker_threads = v;
            }
        }
        if let Ok(v) = std::env::var("NITRO_RENDER_FAR_PLANE_POLYS") {
            self.render_far_plane_polys = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("NITRO_ARM9_BIOS_PATH") {
            self.arm9_bios_path = Some(v);
        }
        if let Ok(v) = std::env::var("NITRO_ARM7_BIOS_PATH") {
            self.arm7_bios_path = Some(v);
        }
        if let Ok(v) = std::env::var("NITRO_FIRMWARE_PATH") {
            self.firmware_path = Some(v);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hardware_power_on_values() {
        let cfg = EmulatorConfig::default();
        assert_eq!(cfg.wramcnt, 0);
        assert!(cfg.render_far_plane_polys);
    }

    #[test]
    fn toml_round_trip_overrides_only_present_fields() {
        let toml_src = "render_worker_threads = 1\n";
        let cfg: EmulatorConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.render_worker_threads, 1);
        assert_eq!(cfg.loose_sync_quantum, 32);
    }
}
