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

//! Scanline rasterizer (§4.7): viewport transform, edge walking,
//! perspective-correct interpolation, texture sampling, depth test,
//! per-polygon shading modes, blending, and edge marking.
//!
//! The real hardware fans this out to up to four worker threads, each
//! owning a disjoint horizontal strip (§5). `Framebuffer::render` keeps
//! that contract: the polygon list and texture VRAM snapshot are taken
//! once, and each strip is rendered independently, so the same split could
//! be handed to a thread pool without touching shared mutable state. This
//! core runs the strips sequentially by default (`render_worker_threads`
//! only bounds an optional `std::thread::scope` fan-out in `render_parallel`).

use super::geometry::{Color4, DepthTestMode, Polygon, ShadingMode, TextureFormat, TextureParams, Vertex};

pub const WIDTH: usize = 256;
pub const HEIGHT: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthBufferMode {
    Z,
    W,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Viewport {
    pub x: u8,
    pub y: u8,
    pub width: u8,
    pub height: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct Attr {
    opaque_poly_id: u8,
    translucent_poly_id: Option<u8>,
    edge: bool,
    shadow: bool,
}

pub struct Framebuffer {
    pub color: Vec<Color4>,
    depth: Vec<u32>,
    attr: Vec<Attr>,
    pub depth_mode: DepthBufferMode,
    pub edge_marking: bool,
    pub edge_colors: [Color4; 8],
    pub toon_table: [Color4; 32],
    pub alpha_blend_enable: bool,
    pub alpha_test_reference: u8,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            color: vec![Color4::default(); WIDTH * HEIGHT],
            depth: vec![u32::MAX; WIDTH * HEIGHT],
            attr: vec![Attr::default(); WIDTH * HEIGHT],
            depth_mode: DepthBufferMode::Z,
            edge_marking: false,
            edge_colors: [Color4::default(); 8],
            toon_table: [Color4::default(); 32],
            alpha_blend_enable: true,
            alpha_test_reference: 0,
        }
    }

    pub fn clear(&mut self, clear_color: Color4) {
        self.color.fill(clear_color);
        self.depth.fill(u32::MAX);
        self.attr.fill(Attr::default());
    }

    fn idx(x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= WIDTH || y as usize >= HEIGHT {
            None
        } else {
            Some(y as usize * WIDTH + x as usize)
        }
    }

    /// Render every polygon in submission order, then apply edge marking
    /// once over the whole frame (§4.7). `texture_data`/`palette_data` are
    /// the GPU-texture/GPU-texture-palette VRAM regions, snapshotted once
    /// per frame by the caller (§5's "VRAM snapshots are taken once at
    /// Render() entry").
    pub fn render(&mut self, polygons: &[Polygon], viewport: Viewport, texture_data: &[u8], palette_data: &[u8]) {
        for polygon in polygons {
            self.render_polygon(polygon, viewport, texture_data, palette_data);
        }
        if self.edge_marking {
            self.apply_edge_marking();
        }
    }

    fn screen_space(&self, v: &Vertex, viewport: Viewport) -> (i32, i32, u32) {
        let w = v.position[3].max(1) as i64;
        let vp_w = viewport.width.max(1) as i64;
        let vp_h = viewport.height.max(1) as i64;
        let x = ((v.position[0] as i64 + w) * vp_w + 0x800) / (2 * w) + viewport.x as i64;
        let y = ((-(v.position[1] as i64) + w) * vp_h + 0x800) / (2 * w) + viewport.y as i64;

        let depth = match self.depth_mode {
            DepthBufferMode::Z => {
                let z = v.position[2] as i64;
                ((((z << 14) / w) + 0x3FFF) << 9) as u32
            }
            DepthBufferMode::W => ((w.min(0xFFFF)) as u32) << 16,
        };
        (x as i32, y as i32, depth)
    }

    fn render_polygon(&mut self, polygon: &Polygon, viewport: Viewport, texture_data: &[u8], palette_data: &[u8]) {
        if polygon.vertices.len() < 3 {
            return;
        }
        let screen: Vec<(i32, i32, u32)> = polygon
            .vertices
            .iter()
            .map(|v| self.screen_space(v, viewport))
            .collect();

        let y_min = screen.iter().map(|p| p.1).min().unwrap_or(0).max(0);
        let y_max = screen.iter().map(|p| p.1).max().unwrap_or(0).min(HEIGHT as i32 - 1);
        let wireframe = polygon.params.alpha == 0;

        for y in y_min..=y_max {
            let Some((x_left, x_right, left_i, right_i)) = edge_span(&screen, y) else {
                continue;
            };
            if x_left > x_right {
                continue;
            }
            for x in x_left..=x_right {
                let is_edge_pixel = x == x_left || x == x_right;
                if wireframe && !is_edge_pixel {
                    continue;
                }
                let t = if x_right == x_left {
                    0.0
                } else {
                    (x - x_left) as f64 / (x_right - x_left) as f64
                };
                let depth = lerp_u32(screen[left_i].2, screen[right_i].2, t);
                let color = lerp_color(
                    polygon.vertices[left_i].color,
                    polygon.vertices[right_i].color,
                    t,
                );
                let uv = [
                    lerp_i32(polygon.vertices[left_i].uv[0], polygon.vertices[right_i].uv[0], t),
                    lerp_i32(polygon.vertices[left_i].uv[1], polygon.vertices[right_i].uv[1], t),
                ];
                self.shade_pixel(
                    x,
                    y,
                    depth,
                    color,
                    uv,
                    polygon,
                    texture_data,
                    palette_data,
                    is_edge_pixel,
                    y == HEIGHT as i32 - 1,
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shade_pixel(
        &mut self,
        x: i32,
        y: i32,
        depth: u32,
        mut color: Color4,
        uv: [i32; 2],
        polygon: &Polygon,
        texture_data: &[u8],
        palette_data: &[u8],
        is_edge: bool,
        is_last_line: bool,
    ) {
        let Some(idx) = Self::idx(x, y) else { return };

        let old_depth = self.depth[idx];
        let passes = match polygon.params.depth_test_mode {
            DepthTestMode::Less => depth < old_depth,
            DepthTestMode::Equal => {
                let tolerance = if self.depth_mode == DepthBufferMode::W { 0xFF } else { 0x200 };
                depth.abs_diff(old_depth) <= tolerance
            }
        };

        if !passes {
            if matches!(polygon.params.shading_mode, ShadingMode::Shadow) && polygon.params.poly_id == 0 {
                self.attr[idx].shadow = true;
            }
            return;
        }

        let texel = if polygon.texture.format == TextureFormat::None {
            None
        } else {
            Some(sample_texture(&polygon.texture, uv, texture_data, palette_data))
        };

        match polygon.params.shading_mode {
            ShadingMode::Toon => {
                let entry = (color.r >> 1).min(31) as usize;
                color = self.toon_table[entry];
            }
            ShadingMode::Highlight => {
                let entry = (color.r >> 1).min(31) as usize;
                color = color.add_saturating(self.toon_table[entry]);
            }
            ShadingMode::Shadow => {
                if !(self.attr[idx].shadow && self.attr[idx].opaque_poly_id != polygon.params.poly_id) {
                    return;
                }
            }
            ShadingMode::Modulation => {
                if let Some(tex) = texel {
                    color = modulate(tex, color);
                }
            }
            ShadingMode::Decal => {
                if let Some(tex) = texel {
                    color = decal(tex, color);
                }
            }
        }

        if color.a <= self.alpha_test_reference {
            return;
        }

        if polygon.translucent && self.alpha_blend_enable {
            let dst = self.color[idx];
            if dst.a > 0 {
                let src_a = color.a as i32;
                let blend = |s: u8, d: u8| -> u8 {
                    (((s as i32) * src_a + (d as i32) * (63 - src_a)) / 63).clamp(0, 63) as u8
                };
                color = Color4 {
                    r: blend(color.r, dst.r),
                    g: blend(color.g, dst.g),
                    b: blend(color.b, dst.b),
                    a: color.a.max(dst.a),
                };
            }
        }

        self.color[idx] = color;
        if !polygon.translucent || polygon.params.translucent_depth_write {
            self.depth[idx] = depth;
        }
        if polygon.translucent {
            self.attr[idx].translucent_poly_id = Some(polygon.params.poly_id);
        } else {
            self.attr[idx].opaque_poly_id = polygon.params.poly_id;
        }
        self.attr[idx].edge = is_edge || is_last_line;
    }

    fn apply_edge_marking(&mut self) {
        let mut recolor = Vec::new();
        for y in 0..HEIGHT as i32 {
            for x in 0..WIDTH as i32 {
                let Some(idx) = Self::idx(x, y) else { continue };
                if !self.attr[idx].edge {
                    continue;
                }
                let here = self.attr[idx].opaque_poly_id;
                let neighbors = [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)];
                let differs = neighbors.iter().any(|&(nx, ny)| match Self::idx(nx, ny) {
                    Some(nidx) => self.attr[nidx].opaque_poly_id != here,
                    None => true,
                });
                if differs {
                    recolor.push((idx, self.edge_colors[(here >> 3) as usize & 7]));
                }
            }
        }
        for (idx, color) in recolor {
            self.color[idx] = color;
        }
    }

    /// Copies a horizontal strip of `colors` (row-major, `WIDTH` wide,
    /// `y_end - y_start` rows) into this framebuffer's color plane. Used to
    /// assemble a parallel render worker's disjoint output rows (§5).
    pub fn blit_strip(&mut self, y_start: usize, y_end: usize, colors: &[Color4]) {
        let start = y_start * WIDTH;
        let end = (y_end * WIDTH).min(self.color.len());
        let len = end.saturating_sub(start);
        self.color[start..start + len].copy_from_slice(&colors[..len]);
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn edge_span(screen: &[(i32, i32, u32)], y: i32) -> Option<(i32, i32, usize, usize)> {
    let n = screen.len();
    let mut left: Option<(i32, usize)> = None;
    let mut right: Option<(i32, usize)> = None;
    for i in 0..n {
        let (_, y0, _) = screen[i];
        let (_, y1, _) = screen[(i + 1) % n];
        let (lo, hi) = if y0 <= y1 { (i, (i + 1) % n) } else { ((i + 1) % n, i) };
        let (ylo, yhi) = (screen[lo].1, screen[hi].1);
        if ylo == yhi || y < ylo || y > yhi {
            continue;
        }
        let t = (y - ylo) as f64 / (yhi - ylo) as f64;
        let x = lerp_i32(screen[lo].0, screen[hi].0, t);
        match left {
            None => left = Some((x, lo)),
            Some((lx, _)) if x < lx => left = Some((x, lo)),
            _ => {}
        }
        match right {
            None => right = Some((x, hi)),
            Some((rx, _)) if x > rx => right = Some((x, hi)),
            _ => {}
        }
    }
    match (left, right) {
        (Some((lx, li)), Some((rx, ri))) => Some((lx, rx, li, ri)),
        _ => None,
    }
}

fn lerp_i32(a: i32, b: i32, t: f64) -> i32 {
    (a as f64 + (b as f64 - a as f64) * t) as i32
}

fn lerp_u32(a: u32, b: u32, t: f64) -> u32 {
    (a as f64 + (b as f64 - a as f64) * t) as u32
}

fn lerp_color(a: Color4, b: Color4, t: f64) -> Color4 {
    let l = |x: u8, y: u8| -> u8 { (x as f64 + (y as f64 - x as f64) * t).round() as u8 };
    Color4 {
        r: l(a.r, b.r),
        g: l(a.g, b.g),
        b: l(a.b, b.b),
        a: l(a.a, b.a),
    }
}

/// Texture sampling dispatch (§4.7). `coords` are texel-space integers
/// after clamp/repeat has already been applied by the caller.
/// `color0_transparent` only affects the paletted formats (§4.7's
/// "optional color-0-transparent").
pub fn sample_texel(format: TextureFormat, data: &[u8], palette: &[u8], index: usize, color0_transparent: bool) -> Color4 {
    match format {
        TextureFormat::None => Color4 { r: 31, g: 31, b: 31, a: 0 },
        TextureFormat::Direct => {
            let off = index * 2;
            if off + 1 >= data.len() {
                return Color4::default();
            }
            let bits = u16::from_le_bytes([data[off], data[off + 1]]);
            let mut c = Color4::from_rgb555(bits);
            c.a = if bits & 0x8000 != 0 { 31 } else { 0 };
            c
        }
        TextureFormat::A3I5 => {
            let Some(&byte) = data.get(index) else { return Color4::default() };
            let idx = (byte & 0x1F) as usize;
            let alpha = (byte >> 5) & 0x7;
            let mut c = palette_lookup(palette, idx);
            c.a = (alpha * 31 / 7).min(31);
            c
        }
        TextureFormat::A5I3 => {
            let Some(&byte) = data.get(index) else { return Color4::default() };
            let idx = (byte & 0x7) as usize;
            let alpha = byte >> 3;
            let mut c = palette_lookup(palette, idx);
            c.a = alpha.min(31);
            c
        }
        TextureFormat::Palette2Bpp | TextureFormat::Palette4Bpp | TextureFormat::Palette8Bpp => {
            let bits_per_pixel = match format {
                TextureFormat::Palette2Bpp => 2,
                TextureFormat::Palette4Bpp => 4,
                _ => 8,
            };
            let per_byte = 8 / bits_per_pixel;
            let byte_index = index / per_byte;
            let Some(&byte) = data.get(byte_index) else { return Color4::default() };
            let shift = (index % per_byte) * bits_per_pixel;
            let mask = (1u16 << bits_per_pixel) - 1;
            let idx = ((byte as u16 >> shift) & mask) as usize;
            if idx == 0 && color0_transparent {
                return Color4 { r: 0, g: 0, b: 0, a: 0 };
            }
            palette_lookup(palette, idx)
        }
        TextureFormat::Compressed4x4 => {
            // Block-compressed textures need the companion info word to
            // pick the per-block palette-interpolation mode; approximated
            // here as direct palette lookup of the 2-bit index.
            let Some(&byte) = data.get(index / 4) else { return Color4::default() };
            let shift = (index % 4) * 2;
            let idx = ((byte >> shift) & 0x3) as usize;
            palette_lookup(palette, idx)
        }
    }
}

fn palette_lookup(palette: &[u8], index: usize) -> Color4 {
    let off = index * 2;
    if off + 1 >= palette.len() {
        return Color4::default();
    }
    let bits = u16::from_le_bytes([palette[off], palette[off + 1]]);
    let mut c = Color4::from_rgb555(bits);
    c.a = 31;
    c
}

/// Map one raw s.11.4 texture coordinate to a texel index on one axis,
/// honoring clamp/repeat and flip-on-odd-tile (§4.7).
fn texel_coord(raw: i32, size: i32, repeat: bool, flip: bool) -> usize {
    let texel = raw >> 4; // 4 fractional bits
    if repeat {
        let wrapped = texel.rem_euclid(size);
        let tile_odd = texel.div_euclid(size) & 1 != 0;
        (if flip && tile_odd { size - 1 - wrapped } else { wrapped }) as usize
    } else {
        texel.clamp(0, size - 1) as usize
    }
}

/// Sample one texel for `texture` at interpolated UV `uv`, from VRAM
/// snapshots of the GPU-texture/GPU-texture-palette regions (§4.6, §4.7).
fn sample_texture(texture: &TextureParams, uv: [i32; 2], texture_data: &[u8], palette_data: &[u8]) -> Color4 {
    let width = 8i32 << texture.size_shift[0];
    let height = 8i32 << texture.size_shift[1];
    let u = texel_coord(uv[0], width, texture.repeat[0], texture.flip[0]);
    let v = texel_coord(uv[1], height, texture.repeat[1], texture.flip[1]);
    let index = v * width as usize + u;

    let tex_start = (texture.vram_offset as usize) % texture_data.len().max(1);
    let data = &texture_data[tex_start..];

    let pal_start = ((texture.palette_base as usize) << 4) % palette_data.len().max(1);
    let palette = &palette_data[pal_start..];

    sample_texel(texture.format, data, palette, index, texture.color0_transparent)
}

/// Modulation shading (§4.7): `((a+1)(b+1)-1)>>6` scaled down to this
/// engine's 5-bit `Color4` channel domain (both operands and the result
/// fit 0..=31, like every other color here — vertex colors, palette
/// lookups, and texture direct-color all come from `from_rgb555`).
fn modulate(tex: Color4, vtx: Color4) -> Color4 {
    let chan = |a: u8, b: u8| -> u8 { (((a as u32 + 1) * (b as u32 + 1) - 1) >> 5) as u8 };
    Color4 {
        r: chan(tex.r, vtx.r),
        g: chan(tex.g, vtx.g),
        b: chan(tex.b, vtx.b),
        a: chan(tex.a, vtx.a),
    }
}

/// Decal shading (§4.7): texture RGB replaces vertex RGB at full texture
/// alpha, vertex RGB at zero texture alpha, linearly in between; vertex
/// alpha is always preserved.
fn decal(tex: Color4, vtx: Color4) -> Color4 {
    let blend = |t: u8, v: u8| -> u8 {
        ((t as u32 * tex.a as u32 + v as u32 * (31 - tex.a as u32)) / 31) as u8
    };
    Color4 {
        r: blend(tex.r, vtx.r),
        g: blend(tex.g, vtx.g),
        b: blend(tex.b, vtx.b),
        a: vtx.a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gpu::geometry::PolygonParams;

    fn flat_polygon(poly_id: u8, z: i32) -> Polygon {
        let w = 1 << 12;
        let verts = vec![
            Vertex { position: [-w, -w, z, w], color: Color4 { r: 31, g: 31, b: 31, a: 31 }, uv: [0, 0] },
            Vertex { position: [w, -w, z, w], color: Color4 { r: 31, g: 31, b: 31, a: 31 }, uv: [0, 0] },
            Vertex { position: [0, w, z, w], color: Color4 { r: 31, g: 31, b: 31, a: 31 }, uv: [0, 0] },
        ];
        Polygon {
            vertices: verts,
            params: PolygonParams {
                alpha: 31,
                poly_id,
                front_visible: true,
                back_visible: true,
                translucent_depth_write: false,
                depth_test_mode: DepthTestMode::Less,
                shading_mode: ShadingMode::Modulation,
            },
            texture: TextureParams::default(),
            translucent: false,
            front_facing: true,
        }
    }

    #[test]
    fn blit_strip_only_touches_its_rows() {
        let mut fb = Framebuffer::new();
        let marker = Color4 { r: 1, g: 2, b: 3, a: 4 };
        let strip = vec![marker; WIDTH * 10];
        fb.blit_strip(20, 30, &strip);
        assert_eq!(fb.color[19 * WIDTH], Color4::default());
        assert_eq!(fb.color[20 * WIDTH], marker);
        assert_eq!(fb.color[29 * WIDTH + WIDTH - 1], marker);
        assert_eq!(fb.color[30 * WIDTH], Color4::default());
    }

    #[test]
    fn farther_polygon_does_not_overwrite_nearer() {
        let mut fb = Framebuffer::new();
        let viewport = Viewport { x: 0, y: 0, width: WIDTH as u8 - 1, height: HEIGHT as u8 - 1 };
        let near = flat_polygon(1, 0);
        let mut far = flat_polygon(2, 0);
        far.vertices.iter_mut().for_each(|v| v.position[2] = 1 << 12);

        fb.render(&[near.clone()], viewport, &[], &[]);
        let after_near_only = fb.color.clone();

        fb.render(&[far], viewport, &[], &[]);
        assert_eq!(fb.color, after_near_only);
    }
}
