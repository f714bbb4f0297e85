use image::Rgb;
use na::{vector, Vector3, Vector4};
use nalgebra as na;

/// Transformation of a point to homogenous coordinates.
pub fn to_hom_point(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 1.0];
}

/// Transformation of a vector to homogenous coordinates.
pub fn to_hom_vector(v: Vector3<f32>) -> Vector4<f32> {
    return vector![v.x, v.y, v.z, 0.0];
}

/// Transformation of a point from homogenous coordinates.
pub fn from_hom_point(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x / v.w, v.y / v.w, v.z / v.w];
}

/// Transformation of a vector from homogenous coordinates.
/// No division - directions keep their w = 0 semantics.
pub fn from_hom_vector(v: Vector4<f32>) -> Vector3<f32> {
    return vector![v.x, v.y, v.z];
}

/// Utility for getting convex combination of 2 colors: t * c_1 + (1 - t) * c_2.
/// t is unrestricted.
pub fn color_blend(color_1: Rgb<u8>, color_2: Rgb<u8>, t: f32) -> Rgb<u8> {
    return Rgb([
        (t * color_1[0] as f32 + (1.0 - t) * color_2[0] as f32) as u8,
        (t * color_1[1] as f32 + (1.0 - t) * color_2[1] as f32) as u8,
        (t * color_1[2] as f32 + (1.0 - t) * color_2[2] as f32) as u8,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hom_point_round_trip_divides_by_w() {
        let p = from_hom_point(vector![2.0, 4.0, 6.0, 2.0]);
        assert_eq!(p, vector![1.0, 2.0, 3.0]);
    }

    #[test]
    fn hom_vector_keeps_components() {
        let v = from_hom_vector(to_hom_vector(vector![1.0, -2.0, 3.0]));
        assert_eq!(v, vector![1.0, -2.0, 3.0]);
    }

    #[test]
    fn color_blend_endpoints() {
        let white = Rgb([255, 255, 255]);
        let black = Rgb([0, 0, 0]);
        assert_eq!(color_blend(white, black, 1.0), white);
        assert_eq!(color_blend(white, black, 0.0), black);
        assert_eq!(color_blend(white, black, 0.5), Rgb([127, 127, 127]));
    }
}
