//! Scene description and static demo geometry.
//!
//! `SceneConfig` is an explicit value handed to the renderer at setup instead
//! of module-level demo state, so one renderer serves every demo object.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::path::PathBuf;

/// Which demo object the renderer draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GeometryKind {
    Tetrahedron,
    Cube,
    Sphere { rings: u32, segments: u32 },
}

/// Fixed-function lighting parameters for the lit variants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingParams {
    pub position: [f32; 3],
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
    pub shininess: f32,
}

impl Default for LightingParams {
    fn default() -> Self {
        Self {
            position: [1.2, 1.0, -2.0],
            ambient: [0.2, 0.2, 0.2],
            diffuse: [0.5, 0.5, 0.5],
            specular: [1.0, 1.0, 1.0],
            shininess: 64.0,
        }
    }
}

/// Everything the renderer needs to know about the scene: geometry source,
/// texture assets, lighting, clear state, and the demo animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub geometry: GeometryKind,
    pub textures: Vec<PathBuf>,
    pub lighting: Option<LightingParams>,
    pub clear_color: [f32; 4],
    /// Distance at which the object is held in front of the viewer.
    pub object_depth: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            geometry: GeometryKind::Tetrahedron,
            textures: Vec::new(),
            lighting: None,
            clear_color: [0.15, 0.15, 0.18, 1.0],
            object_depth: 10.0,
        }
    }
}

impl SceneConfig {
    /// Model transform for the given frame counter value: the object sits
    /// `object_depth` units in front of the origin and spins once per full
    /// sweep of the counter.
    pub fn model_transform(&self, frame_count: u32) -> Mat4 {
        let angle = frame_count as f32 / 101.0 * TAU;
        Mat4::from_translation(Vec3::new(0.0, 0.0, -self.object_depth))
            * Mat4::from_rotation_y(angle)
    }
}

/// Static vertex data for the active demo object. Created once at renderer
/// setup, immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

impl SceneGeometry {
    pub fn build(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Tetrahedron => tetrahedron(),
            GeometryKind::Cube => cube(),
            GeometryKind::Sphere { rings, segments } => uv_sphere(rings, segments),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

/// One flat-shaded normal per triangle, repeated for each of its vertices.
pub fn flat_normals(positions: &[[f32; 3]]) -> Vec<[f32; 3]> {
    let mut normals = Vec::with_capacity(positions.len());
    for tri in positions.chunks_exact(3) {
        let a = Vec3::from(tri[0]);
        let b = Vec3::from(tri[1]);
        let c = Vec3::from(tri[2]);
        let n = (b - a).cross(c - a).normalize_or_zero();
        normals.extend([n.to_array(); 3]);
    }
    normals
}

/// Hand-authored tetrahedron, four triangles wound outward.
fn tetrahedron() -> SceneGeometry {
    let apex = [0.0, 0.5, 0.0];
    let base_a = [-0.5, -0.5, 0.5];
    let base_b = [0.5, -0.5, 0.5];
    let base_c = [0.0, -0.5, -0.5];

    let positions = vec![
        base_a, base_b, apex, // front
        base_b, base_c, apex, // right
        base_c, base_a, apex, // left
        base_a, base_c, base_b, // bottom
    ];
    let normals = flat_normals(&positions);
    let uvs = positions
        .iter()
        .map(|p| [p[0] + 0.5, 0.5 - p[1]])
        .collect();

    SceneGeometry {
        positions,
        normals,
        uvs,
    }
}

fn cube() -> SceneGeometry {
    // Six faces, two triangles each, unit cube centered at the origin.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // (normal, tangent u, tangent v)
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];
    const CORNERS: [([f32; 2], [f32; 2]); 6] = [
        ([-0.5, -0.5], [0.0, 1.0]),
        ([0.5, -0.5], [1.0, 1.0]),
        ([0.5, 0.5], [1.0, 0.0]),
        ([0.5, 0.5], [1.0, 0.0]),
        ([-0.5, 0.5], [0.0, 0.0]),
        ([-0.5, -0.5], [0.0, 1.0]),
    ];

    let mut positions = Vec::with_capacity(36);
    let mut normals = Vec::with_capacity(36);
    let mut uvs = Vec::with_capacity(36);
    for (normal, u_axis, v_axis) in FACES {
        let n = Vec3::from(normal);
        let u = Vec3::from(u_axis);
        let v = Vec3::from(v_axis);
        for (corner, uv) in CORNERS {
            let p = n * 0.5 + u * corner[0] + v * corner[1];
            positions.push(p.to_array());
            normals.push(normal);
            uvs.push(uv);
        }
    }

    SceneGeometry {
        positions,
        normals,
        uvs,
    }
}

fn uv_sphere(rings: u32, segments: u32) -> SceneGeometry {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let point = |ring: u32, segment: u32| -> ([f32; 3], [f32; 2]) {
        let v = ring as f32 / rings as f32;
        let u = segment as f32 / segments as f32;
        let theta = v * TAU / 2.0;
        let phi = u * TAU;
        let p = [
            theta.sin() * phi.cos() * 0.5,
            theta.cos() * 0.5,
            theta.sin() * phi.sin() * 0.5,
        ];
        (p, [u, v])
    };

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut push = |(p, uv): ([f32; 3], [f32; 2])| {
        positions.push(p);
        // Unit sphere around the origin: the normal is the position direction.
        normals.push((Vec3::from(p) * 2.0).to_array());
        uvs.push(uv);
    };

    for ring in 0..rings {
        for segment in 0..segments {
            let a = point(ring, segment);
            let b = point(ring + 1, segment);
            let c = point(ring + 1, segment + 1);
            let d = point(ring, segment + 1);
            push(a);
            push(b);
            push(c);
            push(c);
            push(d);
            push(a);
        }
    }

    SceneGeometry {
        positions,
        normals,
        uvs,
    }
}
