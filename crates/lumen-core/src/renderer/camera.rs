// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The camera state a lane renders from.

use crate::math::{Mat4, Vec3};

/// A rectangle of the render target, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
}

impl Viewport {
    /// A viewport starting at the origin.
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    /// Width divided by height, `1.0` for a degenerate viewport.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }
}

/// A resolved camera: matrices plus the values clustering needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform (right handed, `[0, 1]` depth).
    pub projection: Mat4,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
    /// World position of the eye.
    pub position: Vec3,
    /// The target rectangle.
    pub viewport: Viewport,
}

impl CameraView {
    /// Builds a perspective camera looking from `eye` at `target`.
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y_radians: f32,
        viewport: Viewport,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, up),
            projection: Mat4::perspective_rh(fov_y_radians, viewport.aspect_ratio(), near, far),
            near,
            far,
            position: eye,
            viewport,
        }
    }

    /// Projection times view.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Distance from the eye to `point`, used to sort draw items.
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    /// The GPU-ready uniform block for this camera.
    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            view_projection: self.view_projection().to_cols_array_2d(),
            position_near: [self.position.x, self.position.y, self.position.z, self.near],
            viewport_far: [self.viewport.width, self.viewport.height, self.far, 0.0],
        }
    }
}

/// The camera uniform block bound at the global bind group.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CameraUniform {
    /// World to view.
    pub view: [[f32; 4]; 4],
    /// View to clip.
    pub projection: [[f32; 4]; 4],
    /// World to clip.
    pub view_projection: [[f32; 4]; 4],
    /// Eye position in `xyz`, near plane in `w`.
    pub position_near: [f32; 4],
    /// Viewport size in `xy`, far plane in `z`.
    pub viewport_far: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perspective_camera_looks_down_negative_z() {
        let camera = CameraView::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
            60f32.to_radians(),
            Viewport::new(1280.0, 720.0),
            0.1,
            100.0,
        );
        let origin_in_view = camera.view.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin_in_view.z, -5.0, epsilon = 1e-5);
        assert_relative_eq!(camera.distance_to(Vec3::ZERO), 5.0);

        let uniform = camera.to_uniform();
        assert_eq!(uniform.position_near, [0.0, 0.0, 5.0, 0.1]);
        assert_eq!(uniform.viewport_far[2], 100.0);
    }
}
