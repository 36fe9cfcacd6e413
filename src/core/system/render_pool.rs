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

//! Parallel 3D rasterizer worker pool (§5).
//!
//! Each worker owns a disjoint horizontal strip of the output framebuffer.
//! `render` snapshots the polygon list once per call into a thread-private
//! `Arc`, so every worker renders from a frozen scene; a worker never
//! writes outside the rows it owns, since each renders into its own
//! private [`Framebuffer`] and only that framebuffer's strip is copied
//! into the shared output once it reports done. Workers are long-lived:
//! they block on a condvar between frames rather than being spawned per
//! frame, matching "workers synchronize via one mutex+condvar per worker
//! and an atomic rendering flag."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::super::gpu::geometry::{Color4, Polygon};
use super::super::gpu::raster::{DepthBufferMode, Framebuffer, Viewport, HEIGHT, WIDTH};

struct Job {
    polygons: Arc<Vec<Polygon>>,
    viewport: Viewport,
    clear_color: Color4,
    depth_mode: DepthBufferMode,
    texture_data: Arc<Vec<u8>>,
    palette_data: Arc<Vec<u8>>,
    row_start: usize,
    row_end: usize,
}

struct WorkerState {
    job: Mutex<Option<Job>>,
    job_ready: Condvar,
    result: Mutex<Option<Vec<Color4>>>,
    result_ready: Condvar,
    /// Set while this worker has an outstanding job; the main thread
    /// doesn't strictly need to poll it (it waits on `result` instead),
    /// but §5 names it as part of the handshake and it's useful for a
    /// future "is the pool busy" status readback.
    rendering: AtomicBool,
    running: AtomicBool,
}

/// A pool of persistent rasterizer threads, one per configured strip.
/// `worker_count == 0` degrades to rendering on the caller's thread.
pub struct RenderPool {
    workers: Vec<JoinHandle<()>>,
    states: Vec<Arc<WorkerState>>,
    strips: Vec<(usize, usize)>,
}

fn split_strips(worker_count: usize) -> Vec<(usize, usize)> {
    if worker_count == 0 {
        return Vec::new();
    }
    let base = HEIGHT / worker_count;
    let extra = HEIGHT % worker_count;
    let mut strips = Vec::with_capacity(worker_count);
    let mut y = 0;
    for i in 0..worker_count {
        let rows = base + if i < extra { 1 } else { 0 };
        strips.push((y, y + rows));
        y += rows;
    }
    strips
}

fn worker_loop(state: Arc<WorkerState>) {
    loop {
        let mut job_slot = state.job.lock().unwrap();
        while job_slot.is_none() && state.running.load(Ordering::Acquire) {
            job_slot = state.job_ready.wait(job_slot).unwrap();
        }
        if !state.running.load(Ordering::Acquire) {
            return;
        }
        let job = job_slot.take().unwrap();
        drop(job_slot);

        let mut fb = Framebuffer::new();
        fb.depth_mode = job.depth_mode;
        fb.clear(job.clear_color);
        fb.render(&job.polygons, job.viewport, &job.texture_data, &job.palette_data);
        let start = job.row_start * WIDTH;
        let end = job.row_end * WIDTH;
        let strip = fb.color[start..end].to_vec();

        *state.result.lock().unwrap() = Some(strip);
        state.rendering.store(false, Ordering::Release);
        state.result_ready.notify_one();
    }
}

impl RenderPool {
    pub fn new(worker_count: usize) -> Self {
        let strips = split_strips(worker_count);
        let mut workers = Vec::with_capacity(strips.len());
        let mut states = Vec::with_capacity(strips.len());
        for _ in &strips {
            let state = Arc::new(WorkerState {
                job: Mutex::new(None),
                job_ready: Condvar::new(),
                result: Mutex::new(None),
                result_ready: Condvar::new(),
                rendering: AtomicBool::new(false),
                running: AtomicBool::new(true),
            });
            let worker_state = state.clone();
            workers.push(std::thread::spawn(move || worker_loop(worker_state)));
            states.push(state);
        }
        Self { workers, states, strips }
    }

    /// Render `polygons` with the given viewport/clear color, blocking
    /// until every worker strip is done, and return the assembled frame.
    /// `texture_data`/`palette_data` are the GPU-texture/GPU-texture-palette
    /// VRAM regions, snapshotted once by the caller before this call so
    /// every worker strip renders against the same frozen state (§5).
    /// With no workers configured, renders on the calling thread instead.
    pub fn render(
        &self,
        polygons: &[Polygon],
        viewport: Viewport,
        clear_color: Color4,
        depth_mode: DepthBufferMode,
        texture_data: &[u8],
        palette_data: &[u8],
    ) -> Framebuffer {
        if self.states.is_empty() {
            let mut fb = Framebuffer::new();
            fb.depth_mode = depth_mode;
            fb.clear(clear_color);
            fb.render(polygons, viewport, texture_data, palette_data);
            return fb;
        }

        let shared_polygons = Arc::new(polygons.to_vec());
        let shared_texture = Arc::new(texture_data.to_vec());
        let shared_palette = Arc::new(palette_data.to_vec());
        for (state, &(row_start, row_end)) in self.states.iter().zip(&self.strips) {
            *state.job.lock().unwrap() = Some(Job {
                polygons: shared_polygons.clone(),
                viewport,
                clear_color,
                depth_mode,
                texture_data: shared_texture.clone(),
                palette_data: shared_palette.clone(),
                row_start,
                row_end,
            });
            state.rendering.store(true, Ordering::Release);
            state.job_ready.notify_one();
        }

        let mut out = Framebuffer::new();
        out.depth_mode = depth_mode;
        for (state, &(row_start, row_end)) in self.states.iter().zip(&self.strips) {
            let mut result = state.result.lock().unwrap();
            while result.is_none() {
                result = state.result_ready.wait(result).unwrap();
            }
            let strip = result.take().unwrap();
            out.blit_strip(row_start, row_end, &strip);
        }
        out
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        for state in &self.states {
            state.running.store(false, Ordering::Release);
            state.job_ready.notify_one();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_threaded_and_pooled_renders_agree_on_an_empty_scene() {
        let viewport = Viewport { x: 0, y: 0, width: 255, height: 191 };
        let solo = RenderPool::new(0);
        let pooled = RenderPool::new(4);
        let a = solo.render(&[], viewport, Color4::default(), DepthBufferMode::Z, &[], &[]);
        let b = pooled.render(&[], viewport, Color4::default(), DepthBufferMode::Z, &[], &[]);
        assert_eq!(a.color, b.color);
    }

    #[test]
    fn strip_split_covers_every_row_exactly_once() {
        let strips = split_strips(4);
        assert_eq!(strips.first().unwrap().0, 0);
        assert_eq!(strips.last().unwrap().1, HEIGHT);
        for pair in strips.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }
}
