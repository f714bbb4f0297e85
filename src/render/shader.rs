use image::{GrayImage, Luma, Rgb};
use na::{vector, Matrix2x3, Matrix3, Matrix4, Vector3, Vector4};
use nalgebra as na;

use super::buffer::DepthBuffer;
use super::context::{RenderContext, DEPTH_RANGE};
use super::util::{color_blend, from_hom_point, from_hom_vector, to_hom_point, to_hom_vector};
use crate::error::RenderError;
use crate::model::Model;

/// Stored light-space depth must beat the fragment depth by this much before the
/// fragment counts as shadowed; absorbs viewport depth quantization (1e-2 of the
/// unit range scaled to the [0, 255] viewport depth).
const SHADOW_MARGIN: f32 = 2.55;

/// Tolerance for matching a fragment against the visibility prepass of the
/// occlusion-accumulation pipeline; prepass and marking pass share one transform,
/// so only interpolation noise has to be absorbed.
const OCCLUSION_MATCH: f32 = 1.0;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// One lighting technique of the pipeline. The vertex stage is called exactly once
/// per vertex of a triangle, in order 0, 1, 2, and fills shader-owned varying state;
/// the fragment stage combines the varyings with the barycentric weights the
/// rasterizer hands it. Returning `None` discards the fragment.
pub trait Shader {
    fn vertex(&mut self, model: &Model, face: usize, nth: usize) -> Vector4<f32>;

    fn fragment(
        &mut self,
        model: &Model,
        frag_coord: Vector3<f32>,
        bar_coord: Vector3<f32>,
    ) -> Option<Rgb<u8>>;
}

/// Pure-depth shader for shadow-map generation, depth prepasses and the depth
/// visualization artifact: the fragment color is just the interpolated depth.
pub struct DepthShader {
    transform: Matrix4<f32>,
}

impl DepthShader {
    pub fn new(ctx: &RenderContext) -> Self {
        return Self {
            transform: ctx.projection * ctx.modelview,
        };
    }
}

impl Shader for DepthShader {
    fn vertex(&mut self, model: &Model, face: usize, nth: usize) -> Vector4<f32> {
        return self.transform * to_hom_point(model.position(face, nth));
    }

    fn fragment(
        &mut self,
        _model: &Model,
        frag_coord: Vector3<f32>,
        _bar_coord: Vector3<f32>,
    ) -> Option<Rgb<u8>> {
        let depth = frag_coord.z.clamp(0.0, DEPTH_RANGE) as u8;
        return Some(Rgb([depth, depth, depth]));
    }
}

/// Diffuse shader with per-pixel normal reconstruction in a local Darboux frame: the
/// tangent and bitangent are recovered from the NDC edge vectors and the uv edge
/// vectors of the triangle, then the tangent-space normal map sample is transformed
/// by the resulting basis.
pub struct DarbouxShader {
    transform: Matrix4<f32>,    // projection * modelview
    it_transform: Matrix4<f32>, // Inverse transpose, applied to normals.
    t_light_direction: Vector3<f32>,
    vertex_uvs: Matrix2x3<f32>,
    vertex_t_normals: Matrix3<f32>,
    vertex_ndc: Matrix3<f32>,
}

impl DarbouxShader {
    pub fn new(ctx: &RenderContext, light_direction: Vector3<f32>) -> Result<Self, RenderError> {
        let transform = ctx.projection * ctx.modelview;
        let it_transform = transform
            .try_inverse()
            .ok_or(RenderError::SingularTransform)?
            .transpose();
        let t_light_direction = from_hom_vector(transform * to_hom_vector(light_direction)).normalize();
        return Ok(Self {
            transform,
            it_transform,
            t_light_direction,
            vertex_uvs: Matrix2x3::zeros(),
            vertex_t_normals: Matrix3::zeros(),
            vertex_ndc: Matrix3::zeros(),
        });
    }
}

impl Shader for DarbouxShader {
    fn vertex(&mut self, model: &Model, face: usize, nth: usize) -> Vector4<f32> {
        self.vertex_uvs.set_column(nth, &model.uv(face, nth));
        let t_normal = from_hom_vector(self.it_transform * to_hom_vector(model.normal(face, nth)));
        self.vertex_t_normals.set_column(nth, &t_normal);
        let clip = self.transform * to_hom_point(model.position(face, nth));
        self.vertex_ndc.set_column(nth, &from_hom_point(clip));
        return clip;
    }

    fn fragment(
        &mut self,
        model: &Model,
        _frag_coord: Vector3<f32>,
        bar_coord: Vector3<f32>,
    ) -> Option<Rgb<u8>> {
        let base_normal = (self.vertex_t_normals * bar_coord).normalize();
        let uv = self.vertex_uvs * bar_coord;

        // Frame equations: the two NDC edge vectors and the interpolated normal as
        // rows. A singular matrix means degenerate screen-space geometry.
        let mut frame_matrix: Matrix3<f32> = Matrix3::zeros();
        frame_matrix.set_row(
            0,
            &(self.vertex_ndc.column(1) - self.vertex_ndc.column(0)).transpose(),
        );
        frame_matrix.set_row(
            1,
            &(self.vertex_ndc.column(2) - self.vertex_ndc.column(0)).transpose(),
        );
        frame_matrix.set_row(2, &base_normal.transpose());
        let i_frame_matrix = frame_matrix.try_inverse()?;

        let tangent = i_frame_matrix
            * vector![
                self.vertex_uvs.m12 - self.vertex_uvs.m11,
                self.vertex_uvs.m13 - self.vertex_uvs.m11,
                0.0
            ];
        let bitangent = i_frame_matrix
            * vector![
                self.vertex_uvs.m22 - self.vertex_uvs.m21,
                self.vertex_uvs.m23 - self.vertex_uvs.m21,
                0.0
            ];
        // Degenerate uv mapping gives no usable frame.
        if tangent.norm() < 1e-8 || bitangent.norm() < 1e-8 {
            return None;
        }

        let mut darboux_matrix: Matrix3<f32> = Matrix3::zeros();
        darboux_matrix.set_column(0, &tangent.normalize());
        darboux_matrix.set_column(1, &bitangent.normalize());
        darboux_matrix.set_column(2, &base_normal);
        let t_fragment_normal = (darboux_matrix * model.tangent_normal_at(uv)).normalize();

        let diff_coef = self.t_light_direction.dot(&t_fragment_normal).max(0.0);
        return Some(color_blend(model.diffuse_at(uv), BLACK, diff_coef));
    }
}

/// Diffuse plus specular shader that also tests each fragment against a light-space
/// shadow map produced by an earlier [`DepthShader`] pass, dimming shadowed fragments.
pub struct ShadowShader<'a> {
    transform: Matrix4<f32>,
    it_transform: Matrix4<f32>,
    t_light_direction: Vector3<f32>,
    // Frame-buffer screen coordinates to shadow-buffer screen coordinates.
    screen_to_shadow: Matrix4<f32>,
    shadow_map: &'a DepthBuffer,
    vertex_uvs: Matrix2x3<f32>,
    vertex_t_normals: Matrix3<f32>,
}

impl<'a> ShadowShader<'a> {
    pub fn new(
        ctx: &RenderContext,
        light_ctx: &RenderContext,
        light_direction: Vector3<f32>,
        shadow_map: &'a DepthBuffer,
    ) -> Result<Self, RenderError> {
        let transform = ctx.projection * ctx.modelview;
        let it_transform = transform
            .try_inverse()
            .ok_or(RenderError::SingularTransform)?
            .transpose();
        let screen_to_shadow = light_ctx.matrix()
            * ctx
                .matrix()
                .try_inverse()
                .ok_or(RenderError::SingularTransform)?;
        let t_light_direction = from_hom_vector(transform * to_hom_vector(light_direction)).normalize();
        return Ok(Self {
            transform,
            it_transform,
            t_light_direction,
            screen_to_shadow,
            shadow_map,
            vertex_uvs: Matrix2x3::zeros(),
            vertex_t_normals: Matrix3::zeros(),
        });
    }
}

impl Shader for ShadowShader<'_> {
    fn vertex(&mut self, model: &Model, face: usize, nth: usize) -> Vector4<f32> {
        self.vertex_uvs.set_column(nth, &model.uv(face, nth));
        let t_normal = from_hom_vector(self.it_transform * to_hom_vector(model.normal(face, nth)));
        self.vertex_t_normals.set_column(nth, &t_normal);
        return self.transform * to_hom_point(model.position(face, nth));
    }

    fn fragment(
        &mut self,
        model: &Model,
        frag_coord: Vector3<f32>,
        bar_coord: Vector3<f32>,
    ) -> Option<Rgb<u8>> {
        let uv = self.vertex_uvs * bar_coord;

        // A stored light-space depth above ours means another surface sits between
        // this fragment and the light.
        let shadow_coord = from_hom_point(self.screen_to_shadow * to_hom_point(frag_coord));
        let shadow_coef = if self.shadow_map.sample(shadow_coord.x, shadow_coord.y)
            > shadow_coord.z + SHADOW_MARGIN
        {
            0.3
        } else {
            1.0
        };

        // Object-space normal map where available, interpolated vertex normals otherwise.
        let t_normal = match model.normal_at(uv) {
            Some(normal) => from_hom_vector(self.it_transform * to_hom_vector(normal)).normalize(),
            None => (self.vertex_t_normals * bar_coord).normalize(),
        };
        let diff_coef = self.t_light_direction.dot(&t_normal).max(0.0);
        // Reflection is already in the camera frame, where the view direction is the
        // z axis, so only its z component matters for the highlight.
        let reflected = (2.0 * t_normal * self.t_light_direction.dot(&t_normal)
            - self.t_light_direction)
            .normalize();
        let spec_coef = match model.specular_at(uv) {
            Some(exponent) => 0.6 * reflected.z.max(0.0).powf(exponent),
            None => 0.0,
        };

        let color = model.diffuse_at(uv);
        let intensity = shadow_coef * (diff_coef + spec_coef);
        return Some(Rgb([
            (intensity * color[0] as f32).min(255.0) as u8,
            (intensity * color[1] as f32).min(255.0) as u8,
            (intensity * color[2] as f32).min(255.0) as u8,
        ]));
    }
}

/// Second-stage shader of the occlusion-accumulation pipeline: every fragment whose
/// depth matches the visibility prepass marks its uv texel of the shared occlusion
/// image as lit from the current viewpoint.
pub struct OcclusionShader<'a> {
    transform: Matrix4<f32>,
    prepass: &'a DepthBuffer,
    occlusion: &'a mut GrayImage,
    vertex_uvs: Matrix2x3<f32>,
}

impl<'a> OcclusionShader<'a> {
    pub fn new(
        ctx: &RenderContext,
        prepass: &'a DepthBuffer,
        occlusion: &'a mut GrayImage,
    ) -> Self {
        return Self {
            transform: ctx.projection * ctx.modelview,
            prepass,
            occlusion,
            vertex_uvs: Matrix2x3::zeros(),
        };
    }
}

impl Shader for OcclusionShader<'_> {
    fn vertex(&mut self, model: &Model, face: usize, nth: usize) -> Vector4<f32> {
        self.vertex_uvs.set_column(nth, &model.uv(face, nth));
        return self.transform * to_hom_point(model.position(face, nth));
    }

    fn fragment(
        &mut self,
        _model: &Model,
        frag_coord: Vector3<f32>,
        bar_coord: Vector3<f32>,
    ) -> Option<Rgb<u8>> {
        if (self.prepass.sample(frag_coord.x, frag_coord.y) - frag_coord.z).abs() < OCCLUSION_MATCH {
            let uv = self.vertex_uvs * bar_coord;
            let x = (uv.x.clamp(0.0, 1.0) * (self.occlusion.width() - 1) as f32) as u32;
            let y = (uv.y.clamp(0.0, 1.0) * (self.occlusion.height() - 1) as f32) as u32;
            self.occlusion.put_pixel(x, y, Luma([255]));
        }
        // The frame image of this pass is a throwaway; any color works.
        return Some(Rgb([255, 0, 0]));
    }
}
