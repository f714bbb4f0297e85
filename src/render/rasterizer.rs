use image::RgbImage;
use na::{vector, Vector2, Vector3, Vector4};
use nalgebra as na;

use super::buffer::DepthBuffer;
use super::context::RenderContext;
use super::shader::Shader;
use super::util::from_hom_point;
use crate::model::Model;

/// Screen-space barycentric coordinates of `p` relative to the triangle a, b, c via
/// the signed-area cross product. Degenerate triangles produce a negative coordinate,
/// which rejects every pixel instead of dividing by the vanishing area.
pub fn barycentric(
    p: Vector2<f32>,
    a: Vector2<f32>,
    b: Vector2<f32>,
    c: Vector2<f32>,
) -> Vector3<f32> {
    let raw_cross = vector![b.x - a.x, c.x - a.x, a.x - p.x]
        .cross(&vector![b.y - a.y, c.y - a.y, a.y - p.y]);
    if raw_cross.z.abs() < 1.0 {
        return vector![-1.0, 1.0, 1.0];
    }
    return vector![
        1.0 - (raw_cross.x + raw_cross.y) / raw_cross.z,
        raw_cross.x / raw_cross.z,
        raw_cross.y / raw_cross.z
    ];
}

/// Rasterizes one triangle given in clip space: perspective divide, viewport mapping,
/// bounding box walk with inside test, depth test against `depth_buffer`, then the
/// fragment stage of `shader` for surviving pixels. Ties at equal depth fail the test,
/// so the first triangle drawn at a tied depth keeps its pixel.
pub fn rasterize_triangle<S: Shader>(
    clip_vertices: &[Vector4<f32>; 3],
    shader: &mut S,
    model: &Model,
    ctx: &RenderContext,
    frame: &mut RgbImage,
    depth_buffer: &mut DepthBuffer,
) {
    let mut screen_vertices = [Vector3::zeros(); 3];
    for i in 0..3 {
        let ndc = clip_vertices[i] / clip_vertices[i].w;
        screen_vertices[i] = from_hom_point(ctx.viewport * ndc);
    }
    // There are no clipping planes; a vertex behind the camera can divide to a
    // non-finite coordinate. Dropping the triangle keeps every buffer write in range.
    if screen_vertices
        .iter()
        .any(|p| !p.x.is_finite() || !p.y.is_finite() || !p.z.is_finite())
    {
        return;
    }

    let coord_a = vector![screen_vertices[0].x, screen_vertices[0].y];
    let coord_b = vector![screen_vertices[1].x, screen_vertices[1].y];
    let coord_c = vector![screen_vertices[2].x, screen_vertices[2].y];
    let z_values = vector![
        screen_vertices[0].z,
        screen_vertices[1].z,
        screen_vertices[2].z
    ];

    // Bounding box of the projected triangle, clamped to the frame.
    let x_min = coord_a.x.min(coord_b.x).min(coord_c.x).max(0.0) as i32;
    let y_min = coord_a.y.min(coord_b.y).min(coord_c.y).max(0.0) as i32;
    let x_max = coord_a.x.max(coord_b.x).max(coord_c.x).min((frame.width() - 1) as f32) as i32;
    let y_max = coord_a.y.max(coord_b.y).max(coord_c.y).min((frame.height() - 1) as f32) as i32;
    if x_min > x_max || y_min > y_max {
        return;
    }

    for x in x_min..=x_max {
        for y in y_min..=y_max {
            let bar_screen = barycentric(vector![x as f32, y as f32], coord_a, coord_b, coord_c);
            if bar_screen.x < 0.0 || bar_screen.y < 0.0 || bar_screen.z < 0.0 {
                continue;
            }

            // Depth interpolates linearly in screen space over the already divided
            // vertex depths; attribute weights handed to the fragment stage are the
            // perspective-corrected barycentrics.
            let z_value = bar_screen.dot(&z_values);
            if !z_value.is_finite() || z_value <= depth_buffer.get(x, y) {
                continue;
            }
            let mut bar_clip = vector![
                bar_screen.x / clip_vertices[0].w,
                bar_screen.y / clip_vertices[1].w,
                bar_screen.z / clip_vertices[2].w
            ];
            bar_clip /= bar_clip.x + bar_clip.y + bar_clip.z;

            let frag_coord = vector![x as f32, y as f32, z_value];
            if let Some(color) = shader.fragment(model, frag_coord, bar_clip) {
                depth_buffer.set(x, y, z_value);
                frame.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use image::Rgb;

    use super::*;

    /// Shader painting every surviving fragment a fixed color; vertices are fed to the
    /// rasterizer directly in these tests, so the vertex stage is never called.
    struct FillShader {
        color: Rgb<u8>,
    }

    impl Shader for FillShader {
        fn vertex(&mut self, _model: &Model, _face: usize, _nth: usize) -> Vector4<f32> {
            return Vector4::zeros();
        }

        fn fragment(
            &mut self,
            _model: &Model,
            _frag_coord: Vector3<f32>,
            _bar_coord: Vector3<f32>,
        ) -> Option<Rgb<u8>> {
            return Some(self.color);
        }
    }

    fn test_context() -> RenderContext {
        let mut ctx = RenderContext::new();
        ctx.set_viewport(0, 0, 100, 100);
        return ctx;
    }

    fn ndc_triangle() -> [Vector4<f32>; 3] {
        return [
            Vector4::new(-0.5, -0.5, 0.0, 1.0),
            Vector4::new(0.5, -0.5, 0.0, 1.0),
            Vector4::new(0.0, 0.5, 0.0, 1.0),
        ];
    }

    #[test]
    fn barycentric_is_canonical_at_vertices() {
        let a = vector![10.0, 10.0];
        let b = vector![50.0, 12.0];
        let c = vector![20.0, 60.0];
        let at_a = barycentric(a, a, b, c);
        let at_b = barycentric(b, a, b, c);
        let at_c = barycentric(c, a, b, c);
        for (got, want) in [
            (at_a, vector![1.0, 0.0, 0.0]),
            (at_b, vector![0.0, 1.0, 0.0]),
            (at_c, vector![0.0, 0.0, 1.0]),
        ] {
            assert_relative_eq!(got.x, want.x, epsilon = 1e-4);
            assert_relative_eq!(got.y, want.y, epsilon = 1e-4);
            assert_relative_eq!(got.z, want.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn barycentric_separates_inside_from_outside() {
        let a = vector![10.0, 10.0];
        let b = vector![50.0, 12.0];
        let c = vector![20.0, 60.0];
        let inside = barycentric(vector![25.0, 25.0], a, b, c);
        assert!(inside.x > 0.0 && inside.y > 0.0 && inside.z > 0.0);
        assert_relative_eq!(inside.x + inside.y + inside.z, 1.0, epsilon = 1e-5);
        let outside = barycentric(vector![0.0, 0.0], a, b, c);
        assert!(outside.x < 0.0 || outside.y < 0.0 || outside.z < 0.0);
    }

    #[test]
    fn barycentric_rejects_degenerate_triangle() {
        let a = vector![10.0, 10.0];
        let b = vector![20.0, 10.0];
        let c = vector![30.0, 10.0];
        let result = barycentric(vector![15.0, 10.0], a, b, c);
        assert!(result.x < 0.0 || result.y < 0.0 || result.z < 0.0);
    }

    #[test]
    fn second_identical_render_leaves_frame_unchanged() {
        let ctx = test_context();
        let model = Model::from_parts(Vec::new());
        let mut frame = RgbImage::new(100, 100);
        let mut depth_buffer = DepthBuffer::new(100, 100);
        let mut shader = FillShader { color: Rgb([200, 10, 10]) };
        let clip_vertices = ndc_triangle();

        rasterize_triangle(&clip_vertices, &mut shader, &model, &ctx, &mut frame, &mut depth_buffer);
        let first_render = frame.clone();
        rasterize_triangle(&clip_vertices, &mut shader, &model, &ctx, &mut frame, &mut depth_buffer);
        assert_eq!(first_render.as_raw(), frame.as_raw());
    }

    #[test]
    fn first_triangle_wins_depth_ties() {
        let ctx = test_context();
        let model = Model::from_parts(Vec::new());
        let mut frame = RgbImage::new(100, 100);
        let mut depth_buffer = DepthBuffer::new(100, 100);
        let clip_vertices = ndc_triangle();

        let mut red = FillShader { color: Rgb([255, 0, 0]) };
        let mut blue = FillShader { color: Rgb([0, 0, 255]) };
        rasterize_triangle(&clip_vertices, &mut red, &model, &ctx, &mut frame, &mut depth_buffer);
        rasterize_triangle(&clip_vertices, &mut blue, &model, &ctx, &mut frame, &mut depth_buffer);
        // Pixel in the middle of both triangles keeps the first color.
        assert_eq!(*frame.get_pixel(50, 40), Rgb([255, 0, 0]));
    }

    #[test]
    fn behind_camera_vertices_are_dropped() {
        let ctx = test_context();
        let model = Model::from_parts(Vec::new());
        let mut frame = RgbImage::new(100, 100);
        let mut depth_buffer = DepthBuffer::new(100, 100);
        let mut shader = FillShader { color: Rgb([255, 255, 255]) };
        // w = 0 divides to a non-finite coordinate.
        let clip_vertices = [
            Vector4::new(-0.5, -0.5, 0.0, 0.0),
            Vector4::new(0.5, -0.5, 0.0, 1.0),
            Vector4::new(0.0, 0.5, 0.0, 1.0),
        ];
        rasterize_triangle(&clip_vertices, &mut shader, &model, &ctx, &mut frame, &mut depth_buffer);
        assert!(frame.as_raw().iter().all(|&channel| channel == 0));
    }

    #[test]
    fn out_of_frame_triangle_is_clipped_to_bounds() {
        let ctx = test_context();
        let model = Model::from_parts(Vec::new());
        let mut frame = RgbImage::new(100, 100);
        let mut depth_buffer = DepthBuffer::new(100, 100);
        let mut shader = FillShader { color: Rgb([255, 255, 255]) };
        // Extends far past the right edge of the viewport.
        let clip_vertices = [
            Vector4::new(0.0, -0.5, 0.0, 1.0),
            Vector4::new(40.0, -0.5, 0.0, 1.0),
            Vector4::new(0.0, 0.5, 0.0, 1.0),
        ];
        rasterize_triangle(&clip_vertices, &mut shader, &model, &ctx, &mut frame, &mut depth_buffer);
        assert_eq!(*frame.get_pixel(60, 50), Rgb([255, 255, 255]));
    }
}
