// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 nitro-core contributors

//! §4.7/§5: scanline rasterizer depth testing, viewport clipping and the
//! render pool's strip assembly.

use nitro_core::core::gpu::geometry::{
    Color4, DepthTestMode, Polygon, PolygonParams, ShadingMode, Vertex,
};
use nitro_core::core::gpu::raster::{DepthBufferMode, Framebuffer, Viewport, HEIGHT, WIDTH};
use nitro_core::core::system::render_pool::RenderPool;

fn full_screen_viewport() -> Viewport {
    Viewport { x: 0, y: 0, width: WIDTH as u8, height: HEIGHT as u8 }
}

fn triangle(color: Color4, z: i32, poly_id: u8) -> Polygon {
    let w = 0x1000;
    let vertex = |x: i32, y: i32| Vertex { position: [x, y, z, w], color, uv: [0, 0] };
    Polygon {
        vertices: vec![vertex(-w, -w), vertex(w, -w), vertex(0, w)],
        params: PolygonParams {
            alpha: 31,
            poly_id,
            front_visible: true,
            back_visible: true,
            translucent_depth_write: false,
            depth_test_mode: DepthTestMode::Less,
            shading_mode: ShadingMode::Modulation,
        },
        texture: Default::default(),
        translucent: false,
        front_facing: true,
    }
}

#[test]
fn nearer_polygon_wins_the_depth_test() {
    let mut fb = Framebuffer::new();
    fb.depth_mode = DepthBufferMode::Z;
    let viewport = full_screen_viewport();

    let far = triangle(Color4 { r: 31, g: 0, b: 0, a: 31 }, 0x400, 1);
    let near = triangle(Color4 { r: 0, g: 31, b: 0, a: 31 }, 0x100, 2);
    fb.render(&[far, near], viewport, &[], &[]);

    let center = HEIGHT / 2 * WIDTH + WIDTH / 2;
    assert_eq!(fb.color[center].g, 31, "nearer green triangle should be visible");
}

#[test]
fn farther_polygon_submitted_after_does_not_overwrite_nearer_one() {
    let mut fb = Framebuffer::new();
    fb.depth_mode = DepthBufferMode::Z;
    let viewport = full_screen_viewport();

    let near = triangle(Color4 { r: 0, g: 31, b: 0, a: 31 }, 0x100, 1);
    let far = triangle(Color4 { r: 31, g: 0, b: 0, a: 31 }, 0x400, 2);
    fb.render(&[near, far], viewport, &[], &[]);

    let center = HEIGHT / 2 * WIDTH + WIDTH / 2;
    assert_eq!(fb.color[center].g, 31, "nearer triangle submitted first must survive");
}

#[test]
fn clear_resets_color_and_depth_planes() {
    let mut fb = Framebuffer::new();
    let viewport = full_screen_viewport();
    fb.render(&[triangle(Color4 { r: 31, g: 31, b: 31, a: 31 }, 0x100, 1)], viewport, &[], &[]);

    let clear_color = Color4 { r: 5, g: 5, b: 5, a: 31 };
    fb.clear(clear_color);

    assert!(fb.color.iter().all(|&c| c == clear_color));

    let nearer = triangle(Color4 { r: 1, g: 1, b: 1, a: 31 }, 0x7FFF, 1);
    fb.render(&[nearer], viewport, &[], &[]);
    let center = HEIGHT / 2 * WIDTH + WIDTH / 2;
    assert_eq!(fb.color[center].r, 1, "depth plane must have been reset by clear too");
}

#[test]
fn render_pool_produces_a_full_frame_the_size_of_the_viewport() {
    let pool = RenderPool::new(2);
    let viewport = full_screen_viewport();
    let clear_color = Color4 { r: 2, g: 3, b: 4, a: 31 };
    let polygons = vec![triangle(Color4 { r: 31, g: 31, b: 0, a: 31 }, 0x100, 1)];

    let framebuffer = pool.render(&polygons, viewport, clear_color, DepthBufferMode::Z, &[], &[]);

    assert_eq!(framebuffer.color.len(), WIDTH * HEIGHT);
    let center = HEIGHT / 2 * WIDTH + WIDTH / 2;
    assert_eq!(framebuffer.color[center].r, 31);
    assert_eq!(framebuffer.color[0], clear_color, "corner pixel outside the triangle keeps the clear color");
}
