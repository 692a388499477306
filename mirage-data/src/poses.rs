//! Synthesized camera paths for preview rendering.
//!
//! Preview videos orbit the scene on a sphere: fixed elevation and radius,
//! azimuth swept over a full turn.

use glam::{Mat4, Vec4};

/// Orbit radius matching the synthetic scene scale.
pub const DEFAULT_RADIUS: f32 = 4.0;
/// Orbit elevation in degrees (looking slightly down).
pub const DEFAULT_PHI_DEG: f32 = -30.0;

/// Camera-to-world pose on a sphere around the origin.
///
/// `theta` is azimuth and `phi` elevation, both in degrees. The convention
/// matches the synthetic datasets: a camera at distance `radius` rotated
/// about x by `phi`, about the vertical by `theta`, then mapped into the
/// world frame (x mirrored, y and z swapped).
pub fn pose_spherical(theta_deg: f32, phi_deg: f32, radius: f32) -> Mat4 {
    let trans = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, radius));
    let rot_phi = Mat4::from_rotation_x(phi_deg.to_radians());
    let rot_theta = Mat4::from_rotation_y(-theta_deg.to_radians());
    let flip = Mat4::from_cols(
        Vec4::new(-1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::W,
    );
    flip * rot_theta * rot_phi * trans
}

/// Evenly spaced orbit poses covering a full turn.
pub fn spherical_path(n_poses: usize, radius: f32, phi_deg: f32) -> Vec<Mat4> {
    (0..n_poses)
        .map(|i| {
            let theta = -180.0 + 360.0 * i as f32 / n_poses.max(1) as f32;
            pose_spherical(theta, phi_deg, radius)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_orbit_keeps_radius() {
        for pose in spherical_path(8, DEFAULT_RADIUS, DEFAULT_PHI_DEG) {
            let origin = pose.w_axis.truncate();
            assert!((origin.length() - DEFAULT_RADIUS).abs() < 1e-4);
        }
    }

    #[test]
    fn test_path_length() {
        assert_eq!(spherical_path(60, 4.0, -30.0).len(), 60);
        assert!(spherical_path(0, 4.0, -30.0).is_empty());
    }

    #[test]
    fn test_camera_faces_origin() {
        for pose in spherical_path(5, 4.0, -30.0) {
            let origin = pose.w_axis.truncate();
            // The camera looks down its local -z; that axis should point
            // back towards the orbit center.
            let forward = pose.transform_vector3(Vec3::new(0.0, 0.0, -1.0));
            let to_center = (-origin).normalize();
            assert!(forward.normalize().dot(to_center) > 0.99);
        }
    }
}
