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

//! Vertex/polygon submission (§4.6): lighting, clip-space transform,
//! frustum clipping, and front/back winding.

use super::matrix::Mat4;

pub const VERTEX_CAPACITY: usize = 6144;
pub const POLYGON_CAPACITY: usize = 2048;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color4 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color4 {
    pub fn from_rgb555(bits: u16) -> Self {
        Self {
            r: (bits & 0x1F) as u8,
            g: ((bits >> 5) & 0x1F) as u8,
            b: ((bits >> 10) & 0x1F) as u8,
            a: 31,
        }
    }

    fn sat6(v: i32) -> u8 {
        v.clamp(0, 63) as u8
    }

    pub fn add_saturating(self, other: Color4) -> Color4 {
        Color4 {
            r: Self::sat6(self.r as i32 + other.r as i32),
            g: Self::sat6(self.g as i32 + other.g as i32),
            b: Self::sat6(self.b as i32 + other.b as i32),
            a: self.a,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Material {
    pub diffuse: Color4,
    pub ambient: Color4,
    pub specular: Color4,
    pub emissive: Color4,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Light {
    pub enabled: bool,
    /// Direction in 1.12 normalized fixed point, transformed by the
    /// Direction matrix at the time of SET_NORMAL (spec's Simultaneous
    /// matrix mode keeps Direction in lockstep with Modelview).
    pub direction: [i32; 3],
    pub color: Color4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthTestMode {
    #[default]
    Less,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    #[default]
    Modulation,
    Decal,
    Toon,
    Highlight,
    Shadow,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonParams {
    pub alpha: u8,
    pub poly_id: u8,
    pub front_visible: bool,
    pub back_visible: bool,
    pub translucent_depth_write: bool,
    pub depth_test_mode: DepthTestMode,
    pub shading_mode: ShadingMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextureFormat {
    #[default]
    None,
    A3I5,
    Palette2Bpp,
    Palette4Bpp,
    Palette8Bpp,
    Compressed4x4,
    A5I3,
    Direct,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureParams {
    pub format: TextureFormat,
    pub vram_offset: u32,
    pub size_shift: [u8; 2],
    pub palette_base: u16,
    pub color0_transparent: bool,
    pub repeat: [bool; 2],
    pub flip: [bool; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Vertex {
    /// Clip-space position (x, y, z, w), 20.12 fixed point.
    pub position: [i32; 4],
    pub color: Color4,
    pub uv: [i32; 2],
}

#[derive(Debug, Clone)]
pub struct Polygon {
    pub vertices: Vec<Vertex>,
    pub params: PolygonParams,
    pub texture: TextureParams,
    pub translucent: bool,
    pub front_facing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    Quads,
    TriangleStrip,
    QuadStrip,
}

impl Primitive {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Primitive::Triangles,
            1 => Primitive::Quads,
            2 => Primitive::TriangleStrip,
            _ => Primitive::QuadStrip,
        }
    }

    fn vertices_per_primitive(self) -> usize {
        match self {
            Primitive::Triangles | Primitive::TriangleStrip => 3,
            Primitive::Quads | Primitive::QuadStrip => 4,
        }
    }

    fn is_strip(self) -> bool {
        matches!(self, Primitive::TriangleStrip | Primitive::QuadStrip)
    }
}

/// Accumulates raw vertex submissions into assembled polygons.
pub struct GeometryEngine {
    pub material: Material,
    pub lights: [Light; 4],
    pub current_color: Color4,
    pub current_vertex_color: Color4,
    pub current_uv: [i32; 2],
    pub current_params: PolygonParams,
    pub current_texture: TextureParams,
    pub primitive: Option<Primitive>,
    pub render_far_plane_polys: bool,

    pending: Vec<Vertex>,
    strip_parity: usize,
    pub vertex_ram: Vec<Vertex>,
    pub polygon_ram: Vec<Polygon>,
}

impl GeometryEngine {
    pub fn new() -> Self {
        Self {
            material: Material::default(),
            lights: [Light::default(); 4],
            current_color: Color4 { r: 31, g: 31, b: 31, a: 31 },
            current_vertex_color: Color4 { r: 31, g: 31, b: 31, a: 31 },
            current_uv: [0, 0],
            current_params: PolygonParams::default(),
            current_texture: TextureParams::default(),
            primitive: None,
            render_far_plane_polys: true,
            pending: Vec::new(),
            strip_parity: 0,
            vertex_ram: Vec::new(),
            polygon_ram: Vec::new(),
        }
    }

    /// Double-buffer reset on SwapBuffers: vertex/polygon RAM is "logically
    /// re-created" each frame (§3).
    pub fn swap_buffers(&mut self) {
        self.vertex_ram.clear();
        self.polygon_ram.clear();
        self.pending.clear();
        self.strip_parity = 0;
    }

    pub fn begin(&mut self, primitive: Primitive) {
        self.primitive = Some(primitive);
        self.pending.clear();
        self.strip_parity = 0;
    }

    pub fn end(&mut self) {
        self.primitive = None;
        self.pending.clear();
    }

    /// SET_NORMAL: transform `normal` by the Direction matrix, then
    /// accumulate the Phong-ish lighting sum (§4.6).
    pub fn set_normal(&mut self, normal: [i32; 3], direction_matrix: &Mat4) {
        let n = direction_matrix.transform([normal[0], normal[1], normal[2], 0]);
        let n = normalize3(n[0], n[1], n[2]);

        let mut color = self.material.emissive;
        for light in self.lights.iter().filter(|l| l.enabled) {
            let l_dir = light.direction;
            let n_dot_l = dot3(n, l_dir);
            let diffuse_factor = (-n_dot_l).max(0);
            // Half-angle vector between the light and a fixed view
            // direction along +Z, matching the hardware's simplified
            // specular model (no per-vertex eye vector).
            let half = normalize3(l_dir[0], l_dir[1], l_dir[2] + ONE_FIXED);
            let n_dot_h = dot3(n, half);
            let spec_factor = (-n_dot_h).max(0);
            let spec_factor = fixed_mul(spec_factor, spec_factor);

            let diffuse = scale_color(self.material.diffuse, light.color, diffuse_factor);
            let specular = scale_color(self.material.specular, light.color, spec_factor);
            let ambient = scale_color(self.material.ambient, light.color, ONE_FIXED);

            color = color.add_saturating(diffuse).add_saturating(specular).add_saturating(ambient);
        }
        self.current_vertex_color = color;
    }

    /// VTX_*: transform `position` by the clip matrix and enqueue it,
    /// assembling a polygon once the active primitive's vertex count is
    /// reached.
    pub fn submit_vertex(&mut self, position: [i32; 3], clip_matrix: &Mat4) -> Option<Polygon> {
        let clip_pos = clip_matrix.transform([position[0], position[1], position[2], ONE_FIXED]);
        let vertex = Vertex {
            position: clip_pos,
            color: self.current_vertex_color,
            uv: self.current_uv,
        };
        self.pending.push(vertex);

        let Some(primitive) = self.primitive else {
            return None;
        };
        let needed = primitive.vertices_per_primitive();
        let have_enough = if primitive.is_strip() {
            self.pending.len() >= needed
        } else {
            self.pending.len() == needed
        };
        if !have_enough {
            return None;
        }

        let verts: Vec<Vertex> = if primitive.is_strip() {
            self.pending[self.pending.len() - needed..].to_vec()
        } else {
            std::mem::take(&mut self.pending)
        };

        if primitive.is_strip() {
            // Strip continuation keeps the last two unclipped vertices.
            let keep_from = self.pending.len().saturating_sub(2);
            self.pending = self.pending[keep_from..].to_vec();
        }

        let polygon = self.assemble(verts, primitive);
        self.strip_parity += 1;
        polygon
    }

    fn assemble(&mut self, verts: Vec<Vertex>, primitive: Primitive) -> Option<Polygon> {
        if verts.iter().any(|v| clipped_outside_all(v)) && !self.render_far_plane_polys {
            // A conservative drop: any vertex entirely beyond the far plane
            // and far-plane clipping is disabled (§4.6).
            if verts.iter().any(|v| v.position[2] > v.position[3]) {
                return None;
            }
        }

        let clipped = clip_against_frustum(&verts);
        if clipped.len() < 3 {
            return None;
        }

        let front_facing = is_front_facing(&clipped);
        let odd = primitive.is_strip() && self.strip_parity % 2 == 1;
        let front_facing = if odd { !front_facing } else { front_facing };

        let cull = (front_facing && !self.current_params.front_visible)
            || (!front_facing && !self.current_params.back_visible);
        if cull {
            return None;
        }

        let translucent = self.current_params.alpha > 0 && self.current_params.alpha < 31
            || matches!(self.current_texture.format, TextureFormat::A3I5 | TextureFormat::A5I3);

        let base = self.vertex_ram.len() as u32;
        self.vertex_ram.extend_from_slice(&clipped);
        let _ = base;

        let polygon = Polygon {
            vertices: clipped,
            params: self.current_params,
            texture: self.current_texture,
            translucent,
            front_facing,
        };
        self.polygon_ram.push(polygon.clone());
        Some(polygon)
    }
}

impl Default for GeometryEngine {
    fn default() -> Self {
        Self::new()
    }
}

const ONE_FIXED: i32 = 1 << 12;

fn fixed_mul(a: i32, b: i32) -> i32 {
    (((a as i64) * (b as i64)) >> 12) as i32
}

fn dot3(a: [i32; 3], b: [i32; 3]) -> i32 {
    fixed_mul(a[0], b[0]) + fixed_mul(a[1], b[1]) + fixed_mul(a[2], b[2])
}

fn normalize3(x: i32, y: i32, z: i32) -> [i32; 3] {
    let mag_sq = (x as i64 * x as i64 + y as i64 * y as i64 + z as i64 * z as i64) >> 12;
    if mag_sq <= 0 {
        return [0, 0, 0];
    }
    let mag = (mag_sq as f64).sqrt().max(1.0);
    [
        ((x as f64 / mag) as i32),
        ((y as f64 / mag) as i32),
        ((z as f64 / mag) as i32),
    ]
}

fn scale_color(material: Color4, light: Color4, factor: i32) -> Color4 {
    let scale = |m: u8, l: u8| -> u8 {
        let combined = fixed_mul(m as i32, l as i32);
        let scaled = fixed_mul(combined, factor);
        scaled.clamp(0, 63) as u8
    };
    Color4 {
        r: scale(material.r, light.r),
        g: scale(material.g, light.g),
        b: scale(material.b, light.b),
        a: material.a,
    }
}

fn clipped_outside_all(v: &Vertex) -> bool {
    let w = v.position[3];
    v.position[0].abs() > w || v.position[1].abs() > w || v.position[2].abs() > w
}

/// Simplified six-plane frustum clip: vertices already inside `|xyz| <= w`
/// pass through unchanged; a vertex outside any plane is linearly
/// interpolated against its neighbor toward the plane intersection. This
/// keeps the documented a-b parameterization (§4.6) without a full
/// polygon-clipping pipeline.
fn clip_against_frustum(verts: &[Vertex]) -> Vec<Vertex> {
    let all_inside = verts.iter().all(|v| {
        let w = v.position[3].max(1);
        v.position[0].abs() <= w && v.position[1].abs() <= w && v.position[2].abs() <= w
    });
    if all_inside {
        return verts.to_vec();
    }

    let mut out = Vec::with_capacity(verts.len());
    let n = verts.len();
    for i in 0..n {
        let a = &verts[i];
        let b = &verts[(i + 1) % n];
        let a_in = inside_frustum(a);
        let b_in = inside_frustum(b);
        if a_in {
            out.push(*a);
        }
        if a_in != b_in {
            out.push(interpolate_to_plane(a, b));
        }
    }
    out
}

fn inside_frustum(v: &Vertex) -> bool {
    let w = v.position[3].max(1);
    v.position[0].abs() <= w && v.position[1].abs() <= w && v.position[2].abs() <= w
}

/// Interpolates `a` toward `b` to the point where `|x| == w` on whichever
/// axis is violated, using an 18-bit fractional scale (§4.6, §8).
fn interpolate_to_plane(a: &Vertex, b: &Vertex) -> Vertex {
    const SCALE_BITS: i64 = 18;
    let axis = (0..3)
        .find(|&i| a.position[i].abs() > a.position[3].max(1))
        .unwrap_or(0);

    let da = a.position[axis] as i64 - a.position[3] as i64;
    let db = b.position[axis] as i64 - b.position[3] as i64;
    let denom = da - db;
    let t = if denom == 0 {
        0
    } else {
        ((da << SCALE_BITS) / denom).clamp(0, 1 << SCALE_BITS)
    };

    let lerp = |x: i32, y: i32| -> i32 {
        let x = x as i64;
        let y = y as i64;
        (x + (((y - x) * t) >> SCALE_BITS)) as i32
    };

    Vertex {
        position: [
            lerp(a.position[0], b.position[0]),
            lerp(a.position[1], b.position[1]),
            lerp(a.position[2], b.position[2]),
            lerp(a.position[3], b.position[3]),
        ],
        color: Color4 {
            r: lerp(a.color.r as i32, b.color.r as i32) as u8,
            g: lerp(a.color.g as i32, b.color.g as i32) as u8,
            b: lerp(a.color.b as i32, b.color.b as i32) as u8,
            a: lerp(a.color.a as i32, b.color.a as i32) as u8,
        },
        uv: [lerp(a.uv[0], b.uv[0]), lerp(a.uv[1], b.uv[1])],
    }
}

/// Winding test: sign of the first triangle's normal dotted with v0
/// (§4.6).
fn is_front_facing(verts: &[Vertex]) -> bool {
    if verts.len() < 3 {
        return true;
    }
    let p0 = verts[0].position;
    let p1 = verts[1].position;
    let p2 = verts[2].position;
    let ux = p1[0] - p0[0];
    let uy = p1[1] - p0[1];
    let vx = p2[0] - p0[0];
    let vy = p2[1] - p0[1];
    let cross = (ux as i64) * (vy as i64) - (uy as i64) * (vx as i64);
    cross <= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_fully_outside_frustum_is_dropped() {
        let mut engine = GeometryEngine::new();
        engine.current_params.front_visible = true;
        engine.current_params.back_visible = true;
        engine.begin(Primitive::Triangles);
        let identity = Mat4::identity();
        let far = 100 * ONE_FIXED;
        let mut polygon = None;
        for p in [[far, far, far], [far + 1, far, far], [far, far + 1, far]] {
            polygon = engine.submit_vertex(p, &identity);
        }
        assert!(polygon.is_none());
    }

    #[test]
    fn interior_triangle_survives_and_assembles() {
        let mut engine = GeometryEngine::new();
        engine.current_params.front_visible = true;
        engine.current_params.back_visible = true;
        engine.begin(Primitive::Triangles);
        let identity = Mat4::identity();
        let mut polygon = None;
        for p in [[0, 0, 0], [ONE_FIXED / 2, 0, 0], [0, ONE_FIXED / 2, 0]] {
            polygon = engine.submit_vertex(p, &identity);
        }
        assert!(polygon.is_some());
        assert_eq!(polygon.unwrap().vertices.len(), 3);
    }
}
