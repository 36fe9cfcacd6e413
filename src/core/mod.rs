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

//! Core emulation components, one module per hardware component.

pub mod cart;
pub mod config;
pub mod cpu;
pub mod dma;
pub mod error;
pub mod gpu;
pub mod host;
pub mod ipc;
pub mod irq;
pub mod memory;
pub mod scheduler;
pub mod system;
pub mod timer;
pub mod video_unit;
pub mod vram;

pub use error::{EmulatorError, Result};
