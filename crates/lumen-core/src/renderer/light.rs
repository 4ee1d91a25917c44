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

//! Defines light types for the rendering system.
//!
//! A [`Light`] is the scene-side description of a light source. Every frame
//! the render queue takes a copy of its packed [`LightRecord`], which is the
//! exact layout uploaded into the clustered light buffer.
//!
//! # Examples
//!
//! ```
//! use lumen_core::math::{LinearRgba, Mat4, Vec3};
//! use lumen_core::renderer::light::{Light, LightId};
//!
//! let mut lamp = Light::point(LightId(7), 10.0);
//! lamp.set_transform(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
//! lamp.set_color(LinearRgba::rgb(1.0, 0.9, 0.7));
//!
//! let record = lamp.record();
//! assert_eq!(record.position_range, [1.0, 2.0, 3.0, 10.0]);
//! ```

use crate::math::{LinearRgba, Mat4, Vec3};

/// Maximum number of lights the clustered light buffer can address.
///
/// Slot 0 of the buffer is reserved as the "no light" sentinel, so the buffer
/// holds `MAX_CLUSTERED_LIGHTS + 1` records.
pub const MAX_CLUSTERED_LIGHTS: usize = 255;

/// Number of `f32` values in a packed [`LightRecord`].
pub const LIGHT_RECORD_FLOATS: usize = 12;

/// A stable identifier for a light, used to de-duplicate submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

/// The packed, GPU-ready representation of a light.
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct LightRecord {
    /// World position in `xyz`, range in `w`. A range of `0` means unbounded.
    pub position_range: [f32; 4],
    /// World direction in `xyz`, cosine of the outer cone angle in `w`.
    pub direction_cutoff: [f32; 4],
    /// Linear colour in `rgb`, intensity in `w`.
    pub color_intensity: [f32; 4],
}

impl LightRecord {
    /// World-space position of the light.
    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.position_range[0],
            self.position_range[1],
            self.position_range[2],
        )
    }

    /// Influence radius; `<= 0` is treated as infinite.
    pub fn range(&self) -> f32 {
        self.position_range[3]
    }
}

/// The shape of a light's influence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Omnidirectional light with a finite range.
    Point {
        /// Influence radius in world units.
        range: f32,
    },
    /// Cone light.
    Spot {
        /// Influence radius in world units.
        range: f32,
        /// Inner cone half-angle in radians.
        inner_angle: f32,
        /// Outer cone half-angle in radians.
        outer_angle: f32,
    },
    /// Infinitely distant light, such as the sun.
    Directional,
}

/// A light source placed in the scene.
#[derive(Debug, Clone)]
pub struct Light {
    id: LightId,
    kind: LightKind,
    transform: Mat4,
    color: LinearRgba,
    intensity: f32,
    cast_shadows: bool,
    record: LightRecord,
    dirty: bool,
}

impl Light {
    fn with_kind(id: LightId, kind: LightKind) -> Self {
        Self {
            id,
            kind,
            transform: Mat4::IDENTITY,
            color: LinearRgba::WHITE,
            intensity: 1.0,
            cast_shadows: false,
            record: LightRecord::default(),
            dirty: true,
        }
    }

    /// Creates a white point light at the origin.
    pub fn point(id: LightId, range: f32) -> Self {
        Self::with_kind(id, LightKind::Point { range })
    }

    /// Creates a white spot light at the origin pointing down `-Z`.
    pub fn spot(id: LightId, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self::with_kind(
            id,
            LightKind::Spot {
                range,
                inner_angle,
                outer_angle,
            },
        )
    }

    /// Creates a white directional light pointing down `-Z`.
    pub fn directional(id: LightId) -> Self {
        Self::with_kind(id, LightKind::Directional)
    }

    /// Builder-style toggle for shadow casting.
    pub fn with_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// The light's identifier.
    pub fn id(&self) -> LightId {
        self.id
    }

    /// The light's kind.
    pub fn kind(&self) -> LightKind {
        self.kind
    }

    /// Whether this light renders a shadow map.
    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    /// Whether this is a directional light.
    pub fn is_directional(&self) -> bool {
        matches!(self.kind, LightKind::Directional)
    }

    /// The world transform of the light.
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Sets the world transform.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.dirty = true;
    }

    /// Sets the intensity multiplier.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.dirty = true;
    }

    /// Sets the linear colour.
    pub fn set_color(&mut self, color: LinearRgba) {
        self.color = color;
        self.dirty = true;
    }

    /// Sets the range. Ignored for directional lights.
    pub fn set_range(&mut self, new_range: f32) {
        match &mut self.kind {
            LightKind::Point { range } | LightKind::Spot { range, .. } => *range = new_range,
            LightKind::Directional => return,
        }
        self.dirty = true;
    }

    /// Returns the packed record, recomputing it if any property changed.
    pub fn record(&mut self) -> LightRecord {
        if self.dirty {
            self.record = self.pack();
            self.dirty = false;
        }
        self.record
    }

    fn pack(&self) -> LightRecord {
        let position = self.transform.w_axis.truncate();
        let direction = (-self.transform.z_axis.truncate()).normalize_or_zero();
        let (range, cutoff) = match self.kind {
            LightKind::Point { range } => (range, -1.0),
            LightKind::Spot {
                range, outer_angle, ..
            } => (range, outer_angle.cos()),
            // Unbounded: the cluster test treats a zero range as "everywhere".
            LightKind::Directional => (0.0, -1.0),
        };
        LightRecord {
            position_range: [position.x, position.y, position.z, range],
            direction_cutoff: [direction.x, direction.y, direction.z, cutoff],
            color_intensity: [self.color.r, self.color.g, self.color.b, self.intensity],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn record_layout_is_twelve_floats() {
        assert_eq!(
            std::mem::size_of::<LightRecord>(),
            LIGHT_RECORD_FLOATS * std::mem::size_of::<f32>()
        );
    }

    #[test]
    fn record_is_recomputed_only_after_a_change() {
        let mut light = Light::point(LightId(1), 5.0);
        let first = light.record();
        assert_eq!(first.position_range, [0.0, 0.0, 0.0, 5.0]);
        assert_eq!(first.color_intensity, [1.0, 1.0, 1.0, 1.0]);

        light.set_intensity(3.0);
        light.set_transform(Mat4::from_translation(Vec3::new(0.0, 4.0, 0.0)));
        let second = light.record();
        assert_eq!(second.color_intensity[3], 3.0);
        assert_eq!(second.position(), Vec3::new(0.0, 4.0, 0.0));

        light.set_range(8.0);
        assert_eq!(light.record().range(), 8.0);
    }

    #[test]
    fn spot_cutoff_is_cosine_of_outer_angle() {
        let mut spot = Light::spot(LightId(2), 10.0, 0.2, 0.5);
        let record = spot.record();
        assert_relative_eq!(record.direction_cutoff[3], 0.5f32.cos());
        assert_relative_eq!(record.direction_cutoff[2], -1.0);
    }

    #[test]
    fn directional_light_has_unbounded_range() {
        let mut sun = Light::directional(LightId(3)).with_shadows(true);
        sun.set_range(50.0);
        assert!(sun.is_directional());
        assert!(sun.cast_shadows());
        assert_eq!(sun.record().range(), 0.0);
    }
}
