// SPDX-License-Identifier: CEPL-1.0
pub use glam;

use glam::{Mat4, Vec3};

/// Right-handed perspective with Vulkan clip conventions: depth in [0, 1] and
/// Y pointing down in clip space.
pub fn vulkan_perspective(fovy_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fovy_radians, aspect, near, far);
    proj.y_axis.y *= -1.0;
    proj
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Transforms {
    /// Slowly spinning model seen from a fixed eye.
    pub fn animated(time_secs: f32, aspect: f32) -> Self {
        let axis = Vec3::new(1.0, 1.0, 0.0).normalize();
        let model = Mat4::from_axis_angle(axis, time_secs * 0.5 * 90f32.to_radians());
        let view = Mat4::look_at_rh(Vec3::new(2.0, 10.0, 42.0), Vec3::ZERO, Vec3::Y);
        let proj = vulkan_perspective(45f32.to_radians(), aspect, 0.1, 100.0);
        Self { model, view, proj }
    }

    pub fn to_arrays(&self) -> [[[f32; 4]; 4]; 3] {
        [
            self.model.to_cols_array_2d(),
            self.view.to_cols_array_2d(),
            self.proj.to_cols_array_2d(),
        ]
    }
}

/// `count` points evenly spaced on a circle of `radius` in the XZ plane.
pub fn ring_positions(count: usize, radius: f32) -> Vec<Vec3> {
    (0..count)
        .map(|i| {
            let a = i as f32 / count as f32 * std::f32::consts::TAU;
            Vec3::new(a.cos() * radius, 0.0, a.sin() * radius)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn perspective_flips_y_and_maps_depth_to_unit_range() {
        let p = vulkan_perspective(90f32.to_radians(), 1.0, 0.1, 100.0);
        let up = p * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(up.y / up.w < 0.0);

        let near = p * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = p * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn model_is_identity_at_time_zero() {
        let t = Transforms::animated(0.0, 16.0 / 9.0);
        assert!(t.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn ring_points_sit_on_radius() {
        let pts = ring_positions(12, 7.5);
        assert_eq!(pts.len(), 12);
        for p in pts {
            assert!((p.length() - 7.5).abs() < 1e-4);
            assert_eq!(p.y, 0.0);
        }
    }
}
