//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so hosts don't need to
//! depend on it directly. World positions are `f64` ([`DVec3`]) so large
//! worlds keep precision far from the origin; rotations stay `f32`.
//!
//! ## Composition
//!
//! A [`Transform`] is a rigid rotation/translation plus one scalar scale,
//! not a full per-axis affine basis. Composing `parent * child`:
//!
//! ```text
//! pos   = parent.pos + parent.rot.rotate(child.pos) * parent.scale
//! rot   = parent.rot * child.rot
//! scale = parent.scale * child.scale
//! ```

use std::ops::Mul;

pub use glam::{DQuat, DVec3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position, rotation and uniform scale of an entity.
///
/// Stored in world space in the transform store, and parent-relative in a
/// hierarchy node's cached local transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Transform {
    /// Identity transform (origin, no rotation, scale of 1).
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: 1.0,
    };

    pub fn new(position: DVec3, rotation: Quat, scale: f32) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Create a transform at the given position.
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self::from_position(DVec3::new(x, y, z))
    }

    /// Return a copy with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Return a copy with the given uniform scale.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Rotate a vector by this transform's rotation (no scale, no translation).
    pub fn rotate(&self, v: DVec3) -> DVec3 {
        self.rotation.as_dquat() * v
    }

    /// The transform that undoes this one: `t.inverted() * t == IDENTITY`.
    ///
    /// Assumes a unit rotation and a non-zero scale.
    pub fn inverted(&self) -> Self {
        let rotation = self.rotation.conjugate();
        let position = rotation.as_dquat() * (-self.position / self.scale as f64);
        Self {
            position,
            rotation,
            scale: 1.0 / self.scale,
        }
    }

    /// Drop the scale.
    pub fn rigid_part(&self) -> RigidTransform {
        RigidTransform {
            position: self.position,
            rotation: self.rotation,
        }
    }

    /// Model matrix with translation expressed relative to `base_pos`.
    ///
    /// Rendering works in `f32` around a camera origin; subtracting the base
    /// in `f64` first keeps distant entities from jittering.
    pub fn relative_matrix(&self, base_pos: DVec3) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            (self.position - base_pos).as_vec3(),
        )
    }

    /// Component-wise comparison within `eps`. Rotations `q` and `-q` are
    /// treated as equal.
    pub fn abs_diff_eq(&self, other: &Self, eps: f64) -> bool {
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, eps as f32)
            || self.rotation.abs_diff_eq(-other.rotation, eps as f32);
        self.position.abs_diff_eq(other.position, eps)
            && same_rotation
            && (self.scale - other.scale).abs() <= eps as f32
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform {
            position: self.position + self.rotate(rhs.position) * self.scale as f64,
            rotation: self.rotation * rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}

/// Rotation and translation without scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub position: DVec3,
    pub rotation: Quat,
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Attach a uniform scale.
    pub fn with_scale(self, scale: f32) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale,
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn compose_translates_through_parent_rotation_and_scale() {
        let parent = Transform::new(
            DVec3::new(10.0, 0.0, 0.0),
            Quat::from_rotation_z(FRAC_PI_2),
            2.0,
        );
        let child = Transform::from_xyz(1.0, 0.0, 0.0);

        let world = parent * child;
        // +X rotated 90° about Z is +Y, doubled by the parent's scale.
        assert!(world.position.abs_diff_eq(DVec3::new(10.0, 2.0, 0.0), 1e-5));
        assert_eq!(world.scale, 2.0);
    }

    #[test]
    fn inverse_cancels() {
        let t = Transform::new(
            DVec3::new(3.0, -4.0, 5.0),
            Quat::from_rotation_y(0.7),
            0.5,
        );
        assert!((t.inverted() * t).abs_diff_eq(&Transform::IDENTITY, 1e-5));
        assert!((t * t.inverted()).abs_diff_eq(&Transform::IDENTITY, 1e-5));
    }

    #[test]
    fn local_from_parent_inverse_round_trips() {
        let parent = Transform::new(DVec3::new(1.0, 2.0, 3.0), Quat::from_rotation_x(0.3), 1.5);
        let world = Transform::new(DVec3::new(-7.0, 0.5, 2.0), Quat::from_rotation_z(1.1), 3.0);

        let local = parent.inverted() * world;
        assert!((parent * local).abs_diff_eq(&world, 1e-4));
    }

    #[test]
    fn relative_matrix_subtracts_base() {
        let t = Transform::from_xyz(1000.0, 0.0, 0.0);
        let m = t.relative_matrix(DVec3::new(999.0, 0.0, 0.0));
        let (_, _, translation) = m.to_scale_rotation_translation();
        assert!((translation - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }
}
