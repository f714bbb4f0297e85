use na::{matrix, Matrix4, Vector3};
use nalgebra as na;

use crate::error::RenderError;

/// Viewport depth resolution: NDC z in [-1, 1] maps to [0, DEPTH_RANGE].
pub const DEPTH_RANGE: f32 = 255.0;

const BASIS_EPSILON: f32 = 1e-6;

/// Current transform state of a pass: model-view, projection and viewport matrices,
/// each recomputed from semantic parameters by its setter. Every pass configures its
/// own context; nothing here is process-global.
#[derive(Clone)]
pub struct RenderContext {
    pub modelview: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub viewport: Matrix4<f32>,
}

impl RenderContext {
    pub fn new() -> Self {
        return Self {
            modelview: Matrix4::identity(),
            projection: Matrix4::identity(),
            viewport: Matrix4::identity(),
        };
    }

    /// Builds the model-view matrix from camera placement: new basis z = eye - center,
    /// x = up x z, y completing the right-handed frame, with translation mapping `eye`
    /// to the camera-space origin. Fails when `up` is parallel to the view direction.
    pub fn look_at(
        &mut self,
        eye: Vector3<f32>,
        center: Vector3<f32>,
        up: Vector3<f32>,
    ) -> Result<(), RenderError> {
        let forward = eye - center;
        if forward.norm() < BASIS_EPSILON {
            return Err(RenderError::DegenerateBasis);
        }
        let new_z = forward.normalize();
        let new_x = up.cross(&new_z);
        if new_x.norm() < BASIS_EPSILON {
            return Err(RenderError::DegenerateBasis);
        }
        let new_x = new_x.normalize();
        let new_y = new_z.cross(&new_x);
        self.modelview = matrix![new_x.x, new_x.y, new_x.z, -new_x.dot(&eye);
                                 new_y.x, new_y.y, new_y.z, -new_y.dot(&eye);
                                 new_z.x, new_z.y, new_z.z, -new_z.dot(&eye);
                                 0.0,     0.0,     0.0,     1.0];
        return Ok(());
    }

    /// Single-coefficient projection: identity except for the perspective divisor entry.
    /// A coefficient of 0 gives an orthographic projection; the eye pass uses
    /// -1 / distance(eye, center). There are no near/far clipping planes.
    pub fn set_projection(&mut self, coefficient: f32) {
        self.projection = matrix![1.0, 0.0, 0.0,         0.0;
                                  0.0, 1.0, 0.0,         0.0;
                                  0.0, 0.0, 1.0,         0.0;
                                  0.0, 0.0, coefficient, 1.0];
    }

    /// Maps NDC [-1, 1]^3 to the pixel rectangle [x, x+w] x [y, y+h] with depth
    /// remapped to [0, DEPTH_RANGE].
    pub fn set_viewport(&mut self, x: u32, y: u32, w: u32, h: u32) {
        let x = x as f32;
        let y = y as f32;
        let w = w as f32;
        let h = h as f32;
        let d = DEPTH_RANGE;
        self.viewport = matrix![w / 2.0, 0.0,     0.0,     x + w / 2.0;
                                0.0,     h / 2.0, 0.0,     y + h / 2.0;
                                0.0,     0.0,     d / 2.0, d / 2.0;
                                0.0,     0.0,     0.0,     1.0];
    }

    /// The full vertex-to-screen transform of this pass.
    pub fn matrix(&self) -> Matrix4<f32> {
        return self.viewport * self.projection * self.modelview;
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        return Self::new();
    }
}
