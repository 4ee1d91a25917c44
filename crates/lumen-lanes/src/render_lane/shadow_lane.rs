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

//! Depth-only pass rendering a shadow map from a light's camera.

use std::borrow::Cow;

use lumen_core::renderer::api::{
    BufferDescriptor, BufferId, BufferUsage, TextureViewId, GLOBAL_BIND_GROUP,
};
use lumen_core::renderer::{CameraUniform, CameraView, GraphicsDevice};

use super::{
    ClearTargets, DrawContext, FrameContext, GlobalBindGroupKey, GlobalResources, PassCore,
    PassTargets, RenderLane, RenderQueue,
};
use crate::LaneError;

/// Renders opaque items into a depth target.
#[derive(Debug)]
pub struct ShadowLane {
    core: PassCore,
    depth_view: TextureViewId,
    camera_buffer: Option<BufferId>,
}

impl ShadowLane {
    /// A lane clearing `depth_view` to 1.0 and drawing into it.
    pub fn new(device: &dyn GraphicsDevice, depth_view: TextureViewId) -> Self {
        let clear = ClearTargets {
            color: None,
            depth: Some(1.0),
            stencil: None,
        };
        log::info!("ShadowLane: Initialized");
        Self {
            core: PassCore::new(clear, device.capabilities().render_target_flipped_y),
            depth_view,
            camera_buffer: None,
        }
    }

    /// The depth target.
    pub fn depth_view(&self) -> TextureViewId {
        self.depth_view
    }

    fn camera_buffer(&mut self, device: &dyn GraphicsDevice) -> Result<BufferId, LaneError> {
        if let Some(buffer) = self.camera_buffer {
            return Ok(buffer);
        }
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("Shadow Camera")),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        self.camera_buffer = Some(buffer);
        Ok(buffer)
    }
}

impl RenderLane for ShadowLane {
    fn strategy_name(&self) -> &'static str {
        "ShadowLane"
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn targets(&self) -> PassTargets {
        PassTargets {
            color: None,
            depth: Some(self.depth_view),
            stencil: false,
        }
    }

    fn prepare(
        &mut self,
        frame: &mut FrameContext<'_>,
        camera: Option<&CameraView>,
        _queue: &RenderQueue,
    ) -> Result<(), LaneError> {
        let camera_buffer = self.camera_buffer(frame.device)?;
        if let Some(camera) = camera {
            frame
                .device
                .write_buffer(camera_buffer, 0, bytemuck::bytes_of(&camera.to_uniform()))?;
        }
        Ok(())
    }

    fn render_items(
        &mut self,
        ctx: &mut DrawContext<'_>,
        _camera: Option<&CameraView>,
        queue: &RenderQueue,
    ) -> Result<(), LaneError> {
        let camera_buffer = self.camera_buffer(ctx.device)?;
        let key = GlobalBindGroupKey::camera_only(self.strategy_name());
        let globals = GlobalResources {
            camera_buffer,
            clusters: None,
            fog_buffer: None,
        };
        let bind_group = self
            .core
            .bind_groups_mut()
            .get_or_create(ctx.device, &key, &globals)?;
        ctx.pass().set_bind_group(GLOBAL_BIND_GROUP, bind_group, &[]);

        for item in queue.iter_opaque() {
            ctx.draw_item(item)?;
        }
        Ok(())
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(buffer) = self.camera_buffer.take() {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("ShadowLane: Failed to destroy camera buffer: {e:?}");
            }
        }
    }
}
