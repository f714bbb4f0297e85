use std::fs::File;
use std::io::{BufRead, BufReader};

use image::{Rgb, RgbImage};
use log::{debug, info, warn};
use na::{vector, Vector2, Vector3};
use nalgebra as na;
use obj::raw::object::Polygon;
use obj::raw::{parse_obj, RawObj};

use crate::error::RenderResult;

/// One vertex of a triangulated face: model-space position, uv and normal.
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: Vector3<f32>,
    pub uv: Vector2<f32>,
    pub normal: Vector3<f32>,
}

/// Read-only mesh and material accessor: triangulated faces from an OBJ file plus
/// optional texture maps resolved by suffix next to it. Every texture is optional;
/// sampling falls back to neutral values so untextured meshes still render.
pub struct Model {
    faces: Vec<[Vertex; 3]>,
    diffuse_map: Option<RgbImage>,
    normal_map: Option<RgbImage>,
    tangent_normal_map: Option<RgbImage>,
    specular_map: Option<RgbImage>,
}

impl Model {
    /// Loads the OBJ at `path` together with its `<stem>_diffuse.tga`, `<stem>_nm.tga`,
    /// `<stem>_nm_tangent.tga` and `<stem>_spec.tga` companions where present.
    pub fn load(path: &str) -> RenderResult<Model> {
        let mut model = Model::from_reader(BufReader::new(File::open(path)?))?;
        info!("loaded {}: {} faces", path, model.face_count());
        model.diffuse_map = load_texture(path, "_diffuse.tga");
        model.normal_map = load_texture(path, "_nm.tga");
        model.tangent_normal_map = load_texture(path, "_nm_tangent.tga");
        model.specular_map = load_texture(path, "_spec.tga");
        return Ok(model);
    }

    /// Parses OBJ geometry only, without any textures.
    pub fn from_reader(reader: impl BufRead) -> RenderResult<Model> {
        let raw = parse_obj(reader)?;
        return Ok(Model::from_parts(collect_faces(&raw)));
    }

    /// Builds a model from raw triangles; used for procedural meshes and tests.
    pub fn from_parts(faces: Vec<[Vertex; 3]>) -> Model {
        return Model {
            faces,
            diffuse_map: None,
            normal_map: None,
            tangent_normal_map: None,
            specular_map: None,
        };
    }

    pub fn face_count(&self) -> usize {
        return self.faces.len();
    }

    pub fn position(&self, face: usize, nth: usize) -> Vector3<f32> {
        return self.faces[face][nth].position;
    }

    pub fn uv(&self, face: usize, nth: usize) -> Vector2<f32> {
        return self.faces[face][nth].uv;
    }

    pub fn normal(&self, face: usize, nth: usize) -> Vector3<f32> {
        return self.faces[face][nth].normal;
    }

    /// Diffuse texture sample; white without a diffuse map.
    pub fn diffuse_at(&self, uv: Vector2<f32>) -> Rgb<u8> {
        return match &self.diffuse_map {
            Some(map) => *sample_pixel(map, uv),
            None => Rgb([255, 255, 255]),
        };
    }

    /// Specular exponent sample, if a specular map is present.
    pub fn specular_at(&self, uv: Vector2<f32>) -> Option<f32> {
        return self
            .specular_map
            .as_ref()
            .map(|map| sample_pixel(map, uv)[0] as f32);
    }

    /// Object-space normal map sample, if such a map is present.
    pub fn normal_at(&self, uv: Vector2<f32>) -> Option<Vector3<f32>> {
        return self
            .normal_map
            .as_ref()
            .map(|map| decode_normal(sample_pixel(map, uv)));
    }

    /// Tangent-space normal map sample; the unperturbed (0, 0, 1) without a map.
    pub fn tangent_normal_at(&self, uv: Vector2<f32>) -> Vector3<f32> {
        return match &self.tangent_normal_map {
            Some(map) => decode_normal(sample_pixel(map, uv)),
            None => vector![0.0, 0.0, 1.0],
        };
    }
}

/// Clamped uv lookup. OBJ uv origin is bottom left while decoded images are top
/// left, so v flips here, once, at the sampling boundary.
fn sample_pixel(map: &RgbImage, uv: Vector2<f32>) -> &Rgb<u8> {
    let x = (uv.x.clamp(0.0, 1.0) * (map.width() - 1) as f32) as u32;
    let y = ((1.0 - uv.y.clamp(0.0, 1.0)) * (map.height() - 1) as f32) as u32;
    return map.get_pixel(x, y);
}

/// Normal maps store components in [0, 255]; decode back to [-1, 1].
fn decode_normal(color: &Rgb<u8>) -> Vector3<f32> {
    return vector![
        color[0] as f32 / 255.0 * 2.0 - 1.0,
        color[1] as f32 / 255.0 * 2.0 - 1.0,
        color[2] as f32 / 255.0 * 2.0 - 1.0
    ];
}

fn load_texture(obj_path: &str, suffix: &str) -> Option<RgbImage> {
    let base = obj_path.strip_suffix(".obj").unwrap_or(obj_path);
    let path = format!("{}{}", base, suffix);
    return match image::open(&path) {
        Ok(texture) => {
            debug!("loaded texture {}", path);
            Some(texture.to_rgb8())
        }
        Err(error) => {
            warn!("no texture at {}: {}", path, error);
            None
        }
    };
}

/// Triangulates raw OBJ polygons: quads and larger polygons fan out from their first
/// vertex, faces with out-of-range indices are skipped.
fn collect_faces(raw: &RawObj) -> Vec<[Vertex; 3]> {
    let mut faces = Vec::new();
    for polygon in &raw.polygons {
        let refs: Vec<(usize, Option<usize>, Option<usize>)> = match polygon {
            Polygon::P(v) => v.iter().map(|&p| (p, None, None)).collect(),
            Polygon::PT(v) => v.iter().map(|&(p, t)| (p, Some(t), None)).collect(),
            Polygon::PN(v) => v.iter().map(|&(p, n)| (p, None, Some(n))).collect(),
            Polygon::PTN(v) => v.iter().map(|&(p, t, n)| (p, Some(t), Some(n))).collect(),
        };
        if refs.len() < 3 {
            warn!("skipping polygon with {} vertices", refs.len());
            continue;
        }
        for i in 1..refs.len() - 1 {
            match build_face(raw, [refs[0], refs[i], refs[i + 1]]) {
                Some(face) => faces.push(face),
                None => warn!("skipping face with out of range indices"),
            }
        }
    }
    return faces;
}

fn build_face(raw: &RawObj, refs: [(usize, Option<usize>, Option<usize>); 3]) -> Option<[Vertex; 3]> {
    let mut positions = [Vector3::zeros(); 3];
    for i in 0..3 {
        let &(x, y, z, _) = raw.positions.get(refs[i].0)?;
        positions[i] = vector![x, y, z];
    }
    // Missing per-vertex normals fall back to the face plane normal.
    let plane_normal = (positions[1] - positions[0]).cross(&(positions[2] - positions[0]));
    let plane_normal = if plane_normal.norm() > 0.0 {
        plane_normal.normalize()
    } else {
        vector![0.0, 0.0, 1.0]
    };

    let mut face = [Vertex {
        position: Vector3::zeros(),
        uv: vector![0.0, 0.0],
        normal: plane_normal,
    }; 3];
    for i in 0..3 {
        let (_, uv_index, normal_index) = refs[i];
        face[i].position = positions[i];
        if let Some(uv_index) = uv_index {
            let &(u, v, _) = raw.tex_coords.get(uv_index)?;
            face[i].uv = vector![u, v];
        }
        if let Some(normal_index) = normal_index {
            let &(x, y, z) = raw.normals.get(normal_index)?;
            face[i].normal = vector![x, y, z];
        }
    }
    return Some(face);
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn quad_face_fan_triangulates_into_two_faces() {
        let source = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let model = Model::from_reader(Cursor::new(&source[..])).unwrap();
        assert_eq!(model.face_count(), 2);
        assert_eq!(model.position(0, 0), vector![0.0, 0.0, 0.0]);
        assert_eq!(model.position(1, 2), vector![0.0, 1.0, 0.0]);
    }

    #[test]
    fn out_of_range_face_is_skipped() {
        let source = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nf 1 2 3\nf 1 2 9\n";
        let model = Model::from_reader(Cursor::new(&source[..])).unwrap();
        assert_eq!(model.face_count(), 1);
    }

    #[test]
    fn missing_normals_fall_back_to_plane_normal() {
        let source = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let model = Model::from_reader(Cursor::new(&source[..])).unwrap();
        for nth in 0..3 {
            assert_eq!(model.normal(0, nth), vector![0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn stated_normals_and_uvs_are_kept() {
        let source =
            b"v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\nvn 0 1 0\nf 1/1/1 2/2/1 3/3/1\n";
        let model = Model::from_reader(Cursor::new(&source[..])).unwrap();
        assert_eq!(model.normal(0, 0), vector![0.0, 1.0, 0.0]);
        assert_eq!(model.uv(0, 1), vector![1.0, 0.0]);
    }

    #[test]
    fn untextured_sampling_falls_back() {
        let model = Model::from_parts(Vec::new());
        let uv = vector![0.3, 0.7];
        assert_eq!(model.diffuse_at(uv), Rgb([255, 255, 255]));
        assert_eq!(model.tangent_normal_at(uv), vector![0.0, 0.0, 1.0]);
        assert_eq!(model.specular_at(uv), None);
        assert_eq!(model.normal_at(uv), None);
    }

    #[test]
    fn texture_sampling_clamps_and_flips_v() {
        let mut map = RgbImage::new(2, 2);
        map.put_pixel(0, 1, Rgb([10, 0, 0])); // uv (0, 0)
        map.put_pixel(1, 0, Rgb([0, 20, 0])); // uv (1, 1)
        let mut model = Model::from_parts(Vec::new());
        model.diffuse_map = Some(map);
        assert_eq!(model.diffuse_at(vector![0.0, 0.0]), Rgb([10, 0, 0]));
        assert_eq!(model.diffuse_at(vector![1.0, 1.0]), Rgb([0, 20, 0]));
        assert_eq!(
            model.diffuse_at(vector![-3.0, 5.0]),
            model.diffuse_at(vector![0.0, 1.0])
        );
    }
}
