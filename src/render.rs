pub mod ao;
pub mod buffer;
pub mod context;
pub mod rasterizer;
pub mod shader;
pub mod util;

use image::RgbImage;
use na::Vector4;
use nalgebra as na;

use crate::model::Model;
use buffer::DepthBuffer;
use context::RenderContext;
use rasterizer::rasterize_triangle;
use shader::Shader;

/// One full pass over the model: the vertex stage for all 3 vertices of every face,
/// then rasterization of the resulting clip-space triangle. The same loop serves all
/// pipelines - shaders and contexts carry the per-pass configuration.
pub fn render_pass<S: Shader>(
    model: &Model,
    shader: &mut S,
    ctx: &RenderContext,
    frame: &mut RgbImage,
    depth_buffer: &mut DepthBuffer,
) {
    for face in 0..model.face_count() {
        let mut clip_vertices = [Vector4::zeros(); 3];
        for nth in 0..3 {
            clip_vertices[nth] = shader.vertex(model, face, nth);
        }
        rasterize_triangle(
            &clip_vertices,
            shader,
            model,
            ctx,
            frame,
            depth_buffer,
        );
    }
}
