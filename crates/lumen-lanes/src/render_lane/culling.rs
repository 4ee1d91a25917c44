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

//! The seam between scene traversal and the render queue.

use lumen_core::renderer::{CameraView, Drawable, Light};

use super::render_queue::RenderQueue;
use super::uniform_pool::PoolContext;
use crate::LaneError;

/// Walks a scene and pushes what `camera` can see into a [`CullVisitor`].
///
/// Implemented outside the lanes, by whatever owns the scene graph.
pub trait SceneCuller {
    /// Pushes every visible drawable and light.
    fn cull(&mut self, camera: &CameraView, visitor: &mut CullVisitor<'_, '_>) -> anyhow::Result<()>;
}

/// Receives the results of a [`SceneCuller`] and feeds the render queue.
pub struct CullVisitor<'q, 'p> {
    queue: &'q mut RenderQueue,
    pool: PoolContext<'p>,
    camera: CameraView,
}

impl<'q, 'p> CullVisitor<'q, 'p> {
    /// A visitor filling `queue` for `camera`.
    pub fn new(queue: &'q mut RenderQueue, pool: PoolContext<'p>, camera: CameraView) -> Self {
        Self {
            queue,
            pool,
            camera,
        }
    }

    /// Queues a visible drawable at draw `order`.
    pub fn push_drawable(&mut self, drawable: &Drawable, order: i32) -> Result<(), LaneError> {
        self.queue.push(&mut self.pool, &self.camera, drawable, order)
    }

    /// Queues a light. Returns `false` if it was already queued this frame.
    pub fn push_light(&mut self, light: &mut Light) -> bool {
        self.queue.push_light(light)
    }

    /// The camera being culled for.
    pub fn camera(&self) -> &CameraView {
        &self.camera
    }
}
