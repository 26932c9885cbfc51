// SPDX-License-Identifier: CEPL-1.0
//! Built-in demo scene: a unit cube, a checkerboard and a ring of instances.
use cubic_math::glam::Vec3;
use cubic_math::ring_positions;
use cubic_render::{InstanceData, MeshData, SceneDesc, TextureData, Vertex};

// (normal, u, v) with u x v = normal, so every face winds counter-clockwise
// seen from outside.
const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
];

pub fn cube_mesh(half: f32) -> MeshData {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in FACES {
        let (n, u, v) = (Vec3::from(n), Vec3::from(u), Vec3::from(v));
        let base = vertices.len() as u32;
        let color = (n.abs() * 0.5 + Vec3::splat(0.5)).to_array();
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (n + u * su + v * sv) * half;
            vertices.push(Vertex {
                pos: p.to_array(),
                color,
                uv: [(su + 1.0) * 0.5, (sv + 1.0) * 0.5],
                normal: n.to_array(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData { vertices, indices }
}

pub fn checkerboard(size: u32, cells: u32) -> TextureData {
    let cell = (size / cells.max(1)).max(1);
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let c = if light { 235 } else { 40 };
            rgba.extend_from_slice(&[c, c, c, 255]);
        }
    }
    TextureData {
        width: size,
        height: size,
        rgba,
    }
}

pub fn ring_instances(count: usize, radius: f32) -> Vec<InstanceData> {
    ring_positions(count, radius)
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let t = i as f32 / count.max(1) as f32;
            InstanceData {
                position: p.to_array(),
                rotation: [0.0, t * std::f32::consts::TAU, 0.0],
                scale: 1.0 + 0.5 * (t * std::f32::consts::TAU).sin().abs(),
            }
        })
        .collect()
}

pub fn demo_scene(instances: usize) -> SceneDesc {
    SceneDesc {
        mesh: cube_mesh(1.0),
        instances: ring_instances(instances.max(1), 10.0),
        texture: checkerboard(256, 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_is_closed_and_outward_facing() {
        let mesh = cube_mesh(0.5);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vec3::from(mesh.vertices[tri[k] as usize].pos));
            let n = Vec3::from(mesh.vertices[tri[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(n) > 0.0, "triangle {tri:?} winds inward");
        }
        for v in &mesh.vertices {
            assert!(v.pos.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn checkerboard_is_well_formed() {
        let tex = checkerboard(64, 8);
        assert!(tex.is_well_formed());
        assert_eq!(&tex.rgba[..4], &[235, 235, 235, 255]);
        // first pixel of the second cell
        assert_eq!(&tex.rgba[8 * 4..8 * 4 + 4], &[40, 40, 40, 255]);
    }

    #[test]
    fn demo_scene_has_requested_instances() {
        let scene = demo_scene(7);
        assert_eq!(scene.instances.len(), 7);
        assert!(scene.instances.iter().all(|i| i.scale >= 1.0));
    }
}
