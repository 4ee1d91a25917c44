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

//! Bounding volumes used by light clustering.

use glam::Vec3;

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// The corner with the smallest coordinates.
    pub min: Vec3,
    /// The corner with the largest coordinates.
    pub max: Vec3,
}

impl Aabb {
    /// Creates an AABB from two corners, ordering the components.
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// The tightest AABB enclosing all `points`, or `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (min, max) = rest
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    /// Returns `true` if `point` lies inside or on the box.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Squared distance from `point` to the closest point of the box.
    /// Zero when the point is inside.
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        let below = (self.min - point).max(Vec3::ZERO);
        let above = (point - self.max).max(Vec3::ZERO);
        (below + above).length_squared()
    }

    /// Sphere-vs-box overlap test.
    ///
    /// A non-positive radius always intersects; the clustering code relies on
    /// this for unbounded (directional/ambient) lights.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        radius <= 0.0 || self.distance_squared_to(center) <= radius * radius
    }
}
