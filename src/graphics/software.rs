//! Software reference backend.
//!
//! A complete CPU implementation of the [`Renderer`] contract: textures
//! are plain bitmaps and triangle batches are rasterized with barycentric
//! coverage, nearest-neighbor sampling, scissor, and all three blend
//! modes. The test-suite renders against this backend; it also documents
//! the exact pixel semantics a GPU backend is expected to approximate.

use std::collections::HashMap;

use crate::graphics::bitmap::Bitmap;
use crate::graphics::clip_stack::ClipRect;
use crate::graphics::color::Color;
use crate::graphics::draw_op::BlendMode;
use crate::graphics::renderer::{GpuVertex, Renderer, TextureId};
use crate::graphics::transform::Transform;
use crate::graphics::GraphicsError;

/// CPU rasterizer implementing the backend contract.
#[derive(Debug)]
pub struct SoftwareRenderer {
    textures: HashMap<u32, Bitmap>,
    next_texture: u32,
    targets: Vec<Bitmap>,
    bound: Option<TextureId>,
    blend: BlendMode,
    clip: Option<ClipRect>,
    transform: Transform,
}

impl SoftwareRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            textures: HashMap::new(),
            next_texture: 1,
            targets: vec![Bitmap::new(width, height)],
            bound: None,
            blend: BlendMode::Alpha,
            clip: None,
            transform: Transform::IDENTITY,
        }
    }

    /// The screen target (depth 0 of the target stack).
    pub fn screen(&self) -> &Bitmap {
        &self.targets[0]
    }
}

fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

// Tie-break for samples exactly on an edge, so triangles sharing that edge
// (the two halves of a quad) cover each boundary pixel exactly once.
fn edge_accepts_boundary(ax: f32, ay: f32, bx: f32, by: f32) -> bool {
    let dx = bx - ax;
    let dy = by - ay;
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

fn blend_pixel(dst: Color, src: [f32; 4], blend: BlendMode) -> Color {
    let [sr, sg, sb, sa] = src;
    let (dr, dg, db, da) = (
        f32::from(dst.red()),
        f32::from(dst.green()),
        f32::from(dst.blue()),
        f32::from(dst.alpha()),
    );
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    match blend {
        BlendMode::Alpha => {
            let a = sa / 255.0;
            Color::argb(
                clamp(sa + da * (1.0 - a)),
                clamp(sr * a + dr * (1.0 - a)),
                clamp(sg * a + dg * (1.0 - a)),
                clamp(sb * a + db * (1.0 - a)),
            )
        }
        BlendMode::Additive => {
            let a = sa / 255.0;
            Color::argb(
                clamp(da + sa * a),
                clamp(dr + sr * a),
                clamp(dg + sg * a),
                clamp(db + sb * a),
            )
        }
        BlendMode::Multiply => Color::argb(
            clamp(da * sa / 255.0),
            clamp(dr * sr / 255.0),
            clamp(dg * sg / 255.0),
            clamp(db * sb / 255.0),
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn raster_triangle(
    target: &mut Bitmap,
    texture: Option<&Bitmap>,
    clip: Option<ClipRect>,
    blend: BlendMode,
    v0: GpuVertex,
    v1: GpuVertex,
    v2: GpuVertex,
) {
    let mut area = edge(v0.x, v0.y, v1.x, v1.y, v2.x, v2.y);
    if area == 0.0 {
        return;
    }
    // Normalize winding so the interior always has positive weights.
    let (v1, v2) = if area < 0.0 {
        area = -area;
        (v2, v1)
    } else {
        (v1, v2)
    };

    let min_x = v0.x.min(v1.x).min(v2.x).floor() as i32;
    let max_x = v0.x.max(v1.x).max(v2.x).ceil() as i32;
    let min_y = v0.y.min(v1.y).min(v2.y).floor() as i32;
    let max_y = v0.y.max(v1.y).max(v2.y).ceil() as i32;

    let (mut x0, mut y0) = (min_x.max(0), min_y.max(0));
    let (mut x1, mut y1) = (
        max_x.min(target.width() as i32),
        max_y.min(target.height() as i32),
    );
    if let Some(c) = clip {
        x0 = x0.max(c.x);
        y0 = y0.max(c.y);
        x1 = x1.min(c.right());
        y1 = y1.min(c.bottom());
    }

    for py in y0..y1 {
        for px in x0..x1 {
            let sx = px as f32 + 0.5;
            let sy = py as f32 + 0.5;
            let w0 = edge(v1.x, v1.y, v2.x, v2.y, sx, sy) / area;
            let w1 = edge(v2.x, v2.y, v0.x, v0.y, sx, sy) / area;
            let w2 = edge(v0.x, v0.y, v1.x, v1.y, sx, sy) / area;
            let covered = (w0 > 0.0 || (w0 == 0.0 && edge_accepts_boundary(v1.x, v1.y, v2.x, v2.y)))
                && (w1 > 0.0 || (w1 == 0.0 && edge_accepts_boundary(v2.x, v2.y, v0.x, v0.y)))
                && (w2 > 0.0 || (w2 == 0.0 && edge_accepts_boundary(v0.x, v0.y, v1.x, v1.y)));
            if !covered {
                continue;
            }

            let mut src = [0.0f32; 4];
            for channel in 0..4 {
                src[channel] = w0 * f32::from(v0.color[channel])
                    + w1 * f32::from(v1.color[channel])
                    + w2 * f32::from(v2.color[channel]);
            }

            if let Some(tex) = texture {
                let u = w0 * v0.u + w1 * v1.u + w2 * v2.u;
                let v = w0 * v0.v + w1 * v1.v + w2 * v2.v;
                let tx = ((u * tex.width() as f32) as i32).clamp(0, tex.width() as i32 - 1);
                let ty = ((v * tex.height() as f32) as i32).clamp(0, tex.height() as i32 - 1);
                let texel = tex.pixel(tx as u32, ty as u32).to_rgba_bytes();
                for channel in 0..4 {
                    src[channel] = src[channel] * f32::from(texel[channel]) / 255.0;
                }
            }

            let dst = target.pixel(px as u32, py as u32);
            target.set_pixel(px as u32, py as u32, blend_pixel(dst, src, blend));
        }
    }
}

impl Renderer for SoftwareRenderer {
    // The rasterizer always samples nearest, so `retro` needs no state.
    fn create_texture(&mut self, size: u32, _retro: bool) -> Result<TextureId, GraphicsError> {
        if size == 0 {
            return Err(GraphicsError::TextureCreation {
                size,
                reason: "zero-sized texture page".into(),
            });
        }
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(id, Bitmap::new(size, size));
        Ok(TextureId(id))
    }

    fn delete_texture(&mut self, id: TextureId) {
        self.textures.remove(&id.0);
    }

    fn upload(&mut self, id: TextureId, x: u32, y: u32, pixels: &Bitmap) {
        let texture = self.textures.get_mut(&id.0).expect("unknown texture page");
        texture.insert(pixels, x as i32, y as i32);
    }

    fn read_texture(&mut self, id: TextureId) -> Bitmap {
        self.textures.get(&id.0).expect("unknown texture page").clone()
    }

    fn begin_frame(&mut self, width: u32, height: u32) {
        self.targets[0] = Bitmap::new(width, height);
    }

    fn end_frame(&mut self) {}

    fn bind_texture(&mut self, id: Option<TextureId>) {
        self.bound = id;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_clip_rect(&mut self, clip: Option<ClipRect>) {
        self.clip = clip;
    }

    fn set_transform(&mut self, transform: &Transform) {
        self.transform = *transform;
    }

    fn draw_triangles(&mut self, vertices: &[GpuVertex]) {
        let transform = self.transform;
        let clip = self.clip;
        let blend = self.blend;
        let texture = match self.bound {
            Some(id) => self.textures.get(&id.0),
            None => None,
        };
        let target = self.targets.last_mut().expect("target stack is never empty");

        for triangle in vertices.chunks_exact(3) {
            let mut transformed = [triangle[0], triangle[1], triangle[2]];
            for vertex in &mut transformed {
                let (x, y) = transform.apply(vertex.x, vertex.y);
                vertex.x = x;
                vertex.y = y;
            }
            raster_triangle(
                target,
                texture,
                clip,
                blend,
                transformed[0],
                transformed[1],
                transformed[2],
            );
        }
    }

    fn begin_offscreen(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        self.targets.push(Bitmap::new(width, height));
        Ok(())
    }

    fn end_offscreen(&mut self) -> Bitmap {
        assert!(self.targets.len() > 1, "no offscreen target to finish");
        self.targets.pop().expect("target stack is never empty")
    }
}
