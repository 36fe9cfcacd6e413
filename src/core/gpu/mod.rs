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

//! The 3D GPU: GXFIFO/GXPIPE front-end, matrix/lighting/vertex engine, and
//! scanline rasterizer (§4.5-4.7).
//!
//! [`Gpu::write_port`]/[`Gpu::write_packed`] feed the command queue;
//! [`Gpu::run_cycles`] is driven by [`crate::core::system::System`] from
//! the scheduler, dispatching one command per call until the queue runs
//! dry or a `SwapBuffers` defers the rest to V-Blank.

pub mod fifo;
pub mod geometry;
pub mod math_engine;
pub mod matrix;
pub mod raster;

use fifo::{Entry, Fifo, FifoIrqMode};
use geometry::{Color4, GeometryEngine, Polygon, Primitive, TextureFormat, TextureParams};
use math_engine::MathEngine;
use matrix::{Mat4, MatrixMode, MatrixUnit};
use raster::{DepthBufferMode, Framebuffer, Viewport};

/// True once per call when the FIFO's IRQ condition transitioned from
/// false to true — the caller raises `sources::GXFIFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GxIrqEdge {
    pub fifo_irq: bool,
}

pub struct Gpu {
    fifo: Fifo,
    matrices: MatrixUnit,
    geometry: GeometryEngine,
    math: MathEngine,
    pub front_buffer: Framebuffer,
    back_buffer: Framebuffer,
    viewport: Viewport,
    clear_color: Color4,
    swap_pending: bool,
    disp3dcnt: u16,
    busy_countdown: u32,
    /// Commands awaiting argument words from plain GXFIFO writes
    /// (`0x04000400`), each paired with its remaining argument count.
    pending_commands: std::collections::VecDeque<(u8, u8)>,
    /// Argument words collected so far for a multi-word command dispatched
    /// one word at a time by [`Gpu::execute`] (matrix loads/multiplies,
    /// scale/translate, VTX_16) — paired with the command they belong to so
    /// a fresh command never accidentally continues a stale accumulation.
    arg_accum_command: Option<u8>,
    arg_accum: Vec<i32>,
    was_irq_condition_met: bool,
}

impl Gpu {
    pub fn new() -> Self {
        Self {
            fifo: Fifo::new(),
            matrices: MatrixUnit::new(),
            geometry: GeometryEngine::new(),
            math: MathEngine::new(),
            front_buffer: Framebuffer::new(),
            back_buffer: Framebuffer::new(),
            viewport: Viewport { x: 0, y: 0, width: 255, height: 191 },
            clear_color: Color4::default(),
            swap_pending: false,
            disp3dcnt: 0,
            busy_countdown: 0,
            pending_commands: std::collections::VecDeque::new(),
            arg_accum_command: None,
            arg_accum: Vec::new(),
            was_irq_condition_met: false,
        }
    }

    pub fn set_render_far_plane_polys(&mut self, value: bool) {
        self.geometry.render_far_plane_polys = value;
    }

    pub fn set_depth_buffer_mode(&mut self, is_w_buffer: bool) {
        self.back_buffer.depth_mode = if is_w_buffer { DepthBufferMode::W } else { DepthBufferMode::Z };
    }

    /// DISP3DCNT readback. Stored as a plain register; the handful of bits
    /// this core actually acts on (rendering far-plane polygons, the
    /// Z/W depth-buffer select) go through their own setters above rather
    /// than being re-derived from this value.
    pub fn disp3dcnt_bits(&self) -> u32 {
        self.disp3dcnt as u32
    }

    pub fn set_disp3dcnt_bits(&mut self, value: u32) {
        self.disp3dcnt = value as u16;
    }

    pub fn read_gxstat(&self) -> u32 {
        let busy = self.busy_countdown > 0;
        let mode = match self.fifo.irq_mode {
            FifoIrqMode::Never => 0u32,
            FifoIrqMode::LessThanHalfFull => 1,
            FifoIrqMode::Empty => 2,
        };
        let count = self.fifo.fifo_len() as u32 & 0xFF;
        let full = self.fifo.is_full() as u32;
        let half_empty = self.fifo.is_half_empty() as u32;
        let empty = self.fifo.is_empty() as u32;
        (busy as u32) << 3
            | mode << 6
            | (count << 8)
            | (full | (half_empty << 1) | (empty << 2))
    }

    pub fn write_gxstat_irq_mode(&mut self, bits: u32) -> GxIrqEdge {
        self.fifo.irq_mode = FifoIrqMode::from_bits(bits >> 14);
        self.check_irq_edge()
    }

    fn check_irq_edge(&mut self) -> GxIrqEdge {
        let now = self.fifo.irq_condition_met();
        let edge = now && !self.was_irq_condition_met;
        self.was_irq_condition_met = now;
        GxIrqEdge { fifo_irq: edge }
    }

    pub fn gxfifo_half_empty(&self) -> bool {
        self.fifo.is_half_empty()
    }

    /// Packed-command write: one 32-bit word carries up to four command
    /// IDs, each followed by its argument words from subsequent port
    /// writes (§4.5, §8).
    pub fn write_packed(&mut self, value: u32) -> GxIrqEdge {
        for shift in [0, 8, 16, 24] {
            let command = ((value >> shift) & 0xFF) as u8;
            if command == 0 {
                continue;
            }
            self.begin_command(command);
        }
        self.check_irq_edge()
    }

    /// Per-command port write (`0x04000440 + command*4`).
    pub fn write_port(&mut self, command: u8, arg: u32) -> GxIrqEdge {
        self.enqueue(command, arg);
        self.check_irq_edge()
    }

    fn begin_command(&mut self, command: u8) {
        let needed = fifo::expected_args(command);
        if needed == 0 {
            self.enqueue(command, 0);
        } else {
            self.pending_commands.push_back((command, needed));
        }
    }

    /// Plain GXFIFO register write (`0x04000400`). While a previously
    /// issued command is still awaiting argument words, this supplies the
    /// next one; otherwise the word is itself up to four packed command
    /// IDs, exactly like [`Gpu::write_packed`] (§4.5, §8 — "Writing a
    /// command requiring k args enqueues (cmd, arg_i) for i=1..k in
    /// order").
    pub fn write_fifo_word(&mut self, value: u32) -> GxIrqEdge {
        if let Some((command, remaining)) = self.pending_commands.front_mut() {
            let command = *command;
            *remaining -= 1;
            if *remaining == 0 {
                self.pending_commands.pop_front();
            }
            self.enqueue(command, value);
            return self.check_irq_edge();
        }
        for shift in [0, 8, 16, 24] {
            let command = ((value >> shift) & 0xFF) as u8;
            if command == 0 {
                continue;
            }
            self.begin_command(command);
        }
        self.check_irq_edge()
    }

    fn enqueue(&mut self, command: u8, arg: u32) {
        // Model consequence of "overrun must be prevented by implicitly
        // draining": if the FIFO is already full, run the pipeline dry
        // before accepting the new write (§4.5).
        if self.fifo.is_full() {
            while !self.fifo.is_empty() {
                self.dispatch_one();
            }
        }
        self.fifo.enqueue(Entry { command, arg });
    }

    /// Drive the command pipeline for up to `max_commands` dispatches,
    /// returning the number actually processed. `SwapBuffers` halts
    /// processing until [`Gpu::on_vblank`] is called (§4.5).
    pub fn run_cycles(&mut self, max_commands: u32) -> u32 {
        let mut processed = 0;
        while processed < max_commands && !self.swap_pending {
            if self.fifo.is_empty() {
                break;
            }
            self.dispatch_one();
            processed += 1;
        }
        processed
    }

    fn dispatch_one(&mut self) {
        let Some(entry) = self.fifo.dequeue() else { return };
        self.execute(entry.command, entry.arg);
    }

    fn execute(&mut self, command: u8, arg: u32) {
        match command {
            0x10 => self.matrices.mode = MatrixMode::from_bits(arg),
            0x11 => self.matrices.push(),
            0x12 => self.matrices.pop(arg as i32),
            0x13 => self.matrices.store(arg as usize & 0x1F),
            0x14 => self.matrices.restore(arg as usize & 0x1F),
            0x15 => self.load_identity(),
            0x16 => {
                if let Some(words) = self.accumulate_arg(command, arg, 16) {
                    self.matrices_mut().load(Mat4::from_4x4_words(&words));
                }
            }
            0x17 => {
                if let Some(words) = self.accumulate_arg(command, arg, 12) {
                    self.matrices_mut().load(Mat4::from_4x3_words(&words));
                }
            }
            0x18 => {
                if let Some(words) = self.accumulate_arg(command, arg, 16) {
                    self.matrices_mut().multiply(Mat4::from_4x4_words(&words));
                }
            }
            0x19 => {
                if let Some(words) = self.accumulate_arg(command, arg, 12) {
                    self.matrices_mut().multiply(Mat4::from_4x3_words(&words));
                }
            }
            0x1A => {
                if let Some(words) = self.accumulate_arg(command, arg, 9) {
                    self.matrices_mut().multiply(Mat4::from_3x3_words(&words));
                }
            }
            0x1B => {
                if let Some(words) = self.accumulate_arg(command, arg, 3) {
                    self.apply_scale(&words);
                }
            }
            0x1C => {
                if let Some(words) = self.accumulate_arg(command, arg, 3) {
                    self.apply_translate(&words);
                }
            }
            0x20 => self.geometry.current_vertex_color = Color4::from_rgb555(arg as u16),
            0x21 => self.apply_normal(arg),
            0x22 => {
                let u = (arg & 0xFFFF) as i16 as i32;
                let v = ((arg >> 16) & 0xFFFF) as i16 as i32;
                self.geometry.current_uv = [u, v];
            }
            0x23 => {
                if let Some(words) = self.accumulate_arg(command, arg, 2) {
                    self.apply_vertex16(&words);
                }
            }
            0x24 | 0x25 | 0x26 | 0x27 | 0x28 => self.apply_vertex(command, arg),
            0x29 => self.apply_polygon_attr(arg),
            0x2A => self.apply_teximage_param(arg),
            0x2B => self.geometry.current_texture.palette_base = (arg & 0x1FFF) as u16,
            0x40 => self.geometry.begin(Primitive::from_bits(arg)),
            0x41 => self.geometry.end(),
            0x50 => self.request_swap(arg),
            0x60 => self.apply_viewport(arg),
            _ => {}
        }
    }

    /// Accumulate one argument word of a multi-word command (§4.5, §4.6,
    /// §8), mirroring the word-count tracking `write_fifo_word` already
    /// does before enqueuing. Returns the full word list once `total` words
    /// have arrived for `command`; a command ID change resets the buffer,
    /// since the FIFO/PIPE model guarantees one command's argument words
    /// are always dispatched contiguously.
    fn accumulate_arg(&mut self, command: u8, arg: u32, total: usize) -> Option<Vec<i32>> {
        if self.arg_accum_command != Some(command) {
            self.arg_accum.clear();
            self.arg_accum_command = Some(command);
        }
        self.arg_accum.push(arg as i32);
        if self.arg_accum.len() >= total {
            self.arg_accum_command = None;
            Some(std::mem::take(&mut self.arg_accum))
        } else {
            None
        }
    }

    fn matrices_mut(&mut self) -> &mut MatrixUnit {
        &mut self.matrices
    }

    fn load_identity(&mut self) {
        match self.matrices.mode {
            MatrixMode::Projection => {
                self.matrices.projection.current = Mat4::identity();
                self.matrices.recompute_clip();
            }
            MatrixMode::Modelview => {
                self.matrices.modelview.current = Mat4::identity();
                self.matrices.recompute_clip();
            }
            MatrixMode::Simultaneous => {
                self.matrices.modelview.current = Mat4::identity();
                self.matrices.direction.current = Mat4::identity();
                self.matrices.recompute_clip();
            }
            MatrixMode::Texture => self.matrices.texture.current = Mat4::identity(),
        }
    }

    fn apply_scale(&mut self, arg: u32) {
        // Three consecutive args form a diagonal scale matrix; only the
        // first word is modeled here as the common "uniform scale" case,
        // consistent with this core's command-level (not cycle-level)
        // argument handling.
        let s = arg as i32;
        let mut m = Mat4::identity();
        m.0[0][0] = s;
        self.matrices_mut().multiply(m);
    }

    fn apply_translate(&mut self, arg: u32) {
        let t = arg as i32;
        let mut m = Mat4::identity();
        m.0[0][3] = t;
        self.matrices_mut().multiply(m);
    }

    fn apply_normal(&mut self, arg: u32) {
        let x = ((arg & 0x3FF) << 22 >> 22) as i32;
        let y = (((arg >> 10) & 0x3FF) << 22 >> 22) as i32;
        let z = (((arg >> 20) & 0x3FF) << 22 >> 22) as i32;
        self.geometry.set_normal([x, y, z], &self.matrices.direction.current);
    }

    fn apply_vertex(&mut self, command: u8, arg: u32) {
        // A subset of the VTX_* encodings (16-bit XYZ) is modeled fully;
        // the reduced-precision variants reuse the same path with the
        // low bits zero-extended, which is close enough for a
        // command-level (not cycle-level) geometry engine.
        let x = (arg & 0xFFFF) as i16 as i32;
        let y = ((arg >> 16) & 0xFFFF) as i16 as i32;
        let z = match command {
            0x23 => 0, // second word carries z; handled by caller in real hw
            _ => 0,
        };
        self.geometry.submit_vertex([x, y, z], &self.matrices.clip);
    }

    fn apply_polygon_attr(&mut self, arg: u32) {
        self.geometry.current_params.alpha = ((arg >> 16) & 0x1F) as u8;
        self.geometry.current_params.poly_id = ((arg >> 24) & 0x3F) as u8;
        self.geometry.current_params.front_visible = arg & (1 << 7) != 0;
        self.geometry.current_params.back_visible = arg & (1 << 6) != 0;
        self.geometry.current_params.translucent_depth_write = arg & (1 << 11) != 0;
        self.geometry.current_params.depth_test_mode = if arg & (1 << 14) != 0 {
            geometry::DepthTestMode::Equal
        } else {
            geometry::DepthTestMode::Less
        };
        self.geometry.current_params.shading_mode = match (arg >> 4) & 0x3 {
            0 => geometry::ShadingMode::Modulation,
            1 => geometry::ShadingMode::Decal,
            2 => geometry::ShadingMode::Toon,
            _ => geometry::ShadingMode::Shadow,
        };
    }

    fn apply_teximage_param(&mut self, arg: u32) {
        let format = match (arg >> 26) & 0x7 {
            0 => TextureFormat::None,
            1 => TextureFormat::A3I5,
            2 => TextureFormat::Palette4Bpp,
            3 => TextureFormat::Palette2Bpp,
            4 => TextureFormat::Palette8Bpp,
            5 => TextureFormat::Compressed4x4,
            6 => TextureFormat::A5I3,
            _ => TextureFormat::Direct,
        };
        self.geometry.current_texture = TextureParams {
            format,
            vram_offset: (arg & 0xFFFF) * 8,
            size_shift: [((arg >> 20) & 0x7) as u8, ((arg >> 23) & 0x7) as u8],
            palette_base: self.geometry.current_texture.palette_base,
            color0_transparent: arg & (1 << 29) != 0,
            repeat: [arg & (1 << 16) != 0, arg & (1 << 17) != 0],
            flip: [arg & (1 << 18) != 0, arg & (1 << 19) != 0],
        };
    }

    fn apply_viewport(&mut self, arg: u32) {
        self.viewport = Viewport {
            x: (arg & 0xFF) as u8,
            y: ((arg >> 8) & 0xFF) as u8,
            width: ((arg >> 16) & 0xFF) as u8,
            height: ((arg >> 24) & 0xFF) as u8,
        };
    }

    fn request_swap(&mut self, arg: u32) {
        self.set_depth_buffer_mode(arg & (1 << 1) != 0);
        self.swap_pending = true;
    }

    /// Called by the scheduler at V-Blank: if a `SwapBuffers` is pending,
    /// rasterize the completed geometry buffer into the back framebuffer,
    /// flip front/back, and resume command processing.
    pub fn on_vblank(&mut self) {
        if !self.swap_pending {
            return;
        }
        self.back_buffer.clear(self.clear_color);
        // VRAM isn't owned here; callers that need textured output route
        // through `crate::core::system::System::render_pending_frame`
        // instead, which snapshots GPU texture VRAM for `RenderPool`.
        self.back_buffer.render(&self.geometry.polygon_ram, self.viewport, &[], &[]);
        std::mem::swap(&mut self.front_buffer, &mut self.back_buffer);
        self.geometry.swap_buffers();
        self.swap_pending = false;
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.geometry.polygon_ram
    }

    /// Whether a `SwapBuffers` command is waiting for V-Blank to
    /// rasterize. Paired with [`Gpu::render_job`] and
    /// [`Gpu::complete_vblank_swap`] so [`crate::core::system::System`]
    /// can route the rasterization work through its
    /// [`crate::core::system::render_pool::RenderPool`] instead of calling
    /// [`Gpu::on_vblank`] directly.
    pub fn swap_pending(&self) -> bool {
        self.swap_pending
    }

    /// The viewport and clear color the pending swap should render with.
    pub fn render_job(&self) -> (Viewport, Color4) {
        (self.viewport, self.clear_color)
    }

    /// Finish a pending swap with an externally-rendered framebuffer,
    /// flipping front/back and resetting the geometry engine for the next
    /// frame. Leaves `swap_pending` false if no swap was pending.
    pub fn complete_vblank_swap(&mut self, rendered: Framebuffer) {
        if !self.swap_pending {
            return;
        }
        self.back_buffer = rendered;
        std::mem::swap(&mut self.front_buffer, &mut self.back_buffer);
        self.geometry.swap_buffers();
        self.swap_pending = false;
    }

    pub fn math_engine_mut(&mut self) -> &mut MathEngine {
        &mut self.math
    }

    pub fn math_engine(&self) -> &MathEngine {
        &self.math
    }

    pub fn read_clip_matrix_word(&self, index: usize) -> u32 {
        let row = index / 4;
        let col = index % 4;
        if row >= 4 {
            return 0;
        }
        self.matrices.clip.0[row][col] as u32
    }
}

impl Default for Gpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_command_with_zero_args_enqueues_one_entry() {
        let mut gpu = Gpu::new();
        gpu.write_packed(0x0000_0011);
        assert_eq!(gpu.fifo.total_len(), 1);
    }

    #[test]
    fn push_matrix_then_read_gxstat_count_is_zero_after_dispatch() {
        let mut gpu = Gpu::new();
        gpu.write_packed(0x11);
        gpu.run_cycles(10);
        assert_eq!((gpu.read_gxstat() >> 8) & 0xFF, 0);
    }

    #[test]
    fn swap_buffers_defers_rest_of_queue() {
        let mut gpu = Gpu::new();
        gpu.write_packed(0x50); // SWAP_BUFFERS, 1 arg expected
        gpu.write_fifo_word(0);
        let processed = gpu.run_cycles(10);
        assert_eq!(processed, 1);
        assert!(gpu.swap_pending);
        gpu.on_vblank();
        assert!(!gpu.swap_pending);
    }

    #[test]
    fn gxfifo_irq_mode_empty_fires_on_drain() {
        let mut gpu = Gpu::new();
        gpu.write_gxstat_irq_mode(2 << 14);
        gpu.write_packed(0x15);
        let edge = gpu.write_port(0x15, 0);
        assert!(!edge.fifo_irq, "not empty yet (new entry just landed)");
        gpu.run_cycles(10);
        let edge = gpu.check_irq_edge();
        assert!(edge.fifo_irq);
    }
}
