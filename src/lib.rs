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

//! nitro-core: the core of a Nintendo DS system emulator
//!
//! This crate emulates the synchronized execution of the ARM9 and ARM7
//! processors against a shared, dynamically-remappable memory fabric, and
//! the fixed-point 3D geometry/rasterization pipeline that feeds the top
//! screen. Everything outside that core (2D backgrounds/sprites, audio
//! sample generation, SPI firmware/touchscreen, save media, host device
//! shims, the GUI frontend) is an external collaborator whose contract is
//! fixed by [`core::host`].
//!
//! # Architecture
//!
//! - [`core::scheduler`]: the event scheduler that drives every timed thing.
//! - [`core::memory`]: the ARM9/ARM7 memory buses and fast page tables.
//! - [`core::cpu`]: the ARMv4T (ARM7) and ARMv5TE (ARM9) interpreters.
//! - [`core::vram`]: the 9-bank VRAM controller and its region tables.
//! - [`core::gpu`]: command FIFO, matrix stacks, geometry, rasterizer.
//! - [`core::system`]: ties every component together and runs the main loop.
//!
//! # Example
//!
//! ```no_run
//! use nitro_core::core::system::System;
//! use nitro_core::core::config::EmulatorConfig;
//!
//! let mut system = System::new(EmulatorConfig::default());
//! // system.load_rom("game.nds")?;
//! // system.run_frame();
//! # Ok::<(), nitro_core::EmulatorError>(())
//! ```
//!
//! # Error handling
//!
//! Fallible operations return [`core::error::Result<T>`], an alias for
//! `Result<T, EmulatorError>`.

pub mod core;

pub use core::error::{EmulatorError, Result};
