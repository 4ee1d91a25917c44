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

//! The main lit pass.
//!
//! Before the pass begins, the lane uploads the camera and records the
//! [`ClusterGrid`] culling of the queue's unshadowed lights. The pass binds
//! the global bind group matching the active features and draws the queue:
//! per order, opaque front to back then transparent back to front.

use std::borrow::Cow;

use lumen_core::math::LinearRgba;
use lumen_core::renderer::api::{
    BufferDescriptor, BufferId, BufferUsage, RendererConfig, GLOBAL_BIND_GROUP,
};
use lumen_core::renderer::{CameraUniform, CameraView, GraphicsDevice};

use super::{
    ClusterBindings, ClusterGrid, ClusterGridConfig, ClusterMetrics, DrawContext,
    EnvironmentMapBinding, FogMode, FrameContext, GlobalBindGroupKey, GlobalResources, PassCore,
    PassTargets, RenderLane, RenderQueue, ShadowMapBinding,
};
use crate::LaneError;

/// Fog parameters of the forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogSettings {
    /// Fog equation, [`FogMode::Off`] to disable.
    pub mode: FogMode,
    /// Fog colour.
    pub color: LinearRgba,
    /// Density of the exponential modes.
    pub density: f32,
    /// Start distance of the linear mode.
    pub start: f32,
    /// End distance of the linear mode.
    pub end: f32,
}

impl Default for FogSettings {
    fn default() -> Self {
        Self {
            mode: FogMode::Off,
            color: LinearRgba::rgb(0.5, 0.5, 0.5),
            density: 0.02,
            start: 10.0,
            end: 100.0,
        }
    }
}

/// The fog uniform block.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct FogUniform {
    /// Colour in `rgb`, density in `a`.
    pub color_density: [f32; 4],
    /// Start, end, mode code, unused.
    pub params: [f32; 4],
}

impl From<&FogSettings> for FogUniform {
    fn from(fog: &FogSettings) -> Self {
        Self {
            color_density: [fog.color.r, fog.color.g, fog.color.b, fog.density],
            params: [fog.start, fog.end, fog.mode.shader_code() as f32, 0.0],
        }
    }
}

#[derive(Debug)]
struct ForwardResources {
    grid: ClusterGrid,
    camera_buffer: BufferId,
    fog_buffer: BufferId,
}

impl ForwardResources {
    fn create(device: &dyn GraphicsDevice, grid: &ClusterGridConfig) -> Result<Self, LaneError> {
        let grid = ClusterGrid::new(device, grid)?;
        let uniform = |label: &'static str, size: usize| {
            device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed(label)),
                size: size as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
        };
        let camera_buffer = uniform("Forward Camera", std::mem::size_of::<CameraUniform>())?;
        let fog_buffer = uniform("Forward Fog", std::mem::size_of::<FogUniform>())?;
        Ok(Self {
            grid,
            camera_buffer,
            fog_buffer,
        })
    }

    fn destroy(mut self, device: &dyn GraphicsDevice) {
        self.grid.destroy(device);
        for buffer in [self.camera_buffer, self.fog_buffer] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("ForwardLane: Failed to destroy buffer {buffer:?}: {e:?}");
            }
        }
    }
}

/// Clustered forward shading of the whole queue.
#[derive(Debug)]
pub struct ForwardLane {
    core: PassCore,
    grid_config: ClusterGridConfig,
    resources: Option<ForwardResources>,
    targets: PassTargets,
    fog: FogSettings,
    environment_map: Option<EnvironmentMapBinding>,
    shadow_map: Option<ShadowMapBinding>,
}

impl ForwardLane {
    /// Creates the lane and its cluster grid.
    ///
    /// # Errors
    ///
    /// [`LaneError::ClusterConfig`] if the configured grid cannot be built
    /// on `device`.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
        targets: PassTargets,
    ) -> Result<Self, LaneError> {
        let capabilities = device.capabilities();
        let grid_config = ClusterGridConfig::from(config);
        let resources = ForwardResources::create(device, &grid_config)?;
        log::info!(
            "ForwardLane: Initialized on {:?} ({:?} cluster index, flip_output={})",
            capabilities.backend,
            resources.grid.format(),
            capabilities.render_target_flipped_y
        );
        Ok(Self {
            core: PassCore::from_config(config, &capabilities),
            grid_config,
            resources: Some(resources),
            targets,
            fog: FogSettings::default(),
            environment_map: None,
            shadow_map: None,
        })
    }

    /// Replaces the attachments.
    pub fn set_targets(&mut self, targets: PassTargets) {
        self.targets = targets;
    }

    /// Replaces the fog parameters.
    pub fn set_fog(&mut self, fog: FogSettings) {
        self.fog = fog;
    }

    /// Binds an environment map, or unbinds it with `None`.
    pub fn set_environment_map(&mut self, environment_map: Option<EnvironmentMapBinding>) {
        self.environment_map = environment_map;
    }

    /// Binds the shadow map of the sun, or unbinds it with `None`.
    pub fn set_shadow_map(&mut self, shadow_map: Option<ShadowMapBinding>) {
        self.shadow_map = shadow_map;
    }

    /// The cluster grid, `None` after [`dispose`](RenderLane::dispose) until
    /// the next render.
    pub fn cluster_grid(&self) -> Option<&ClusterGrid> {
        self.resources.as_ref().map(|r| &r.grid)
    }

    /// Cluster metrics of the last render.
    pub fn cluster_metrics(&self) -> Option<&ClusterMetrics> {
        self.cluster_grid().map(ClusterGrid::metrics)
    }

    /// The global bind group key of the current feature set.
    pub fn global_key(&self) -> GlobalBindGroupKey {
        GlobalBindGroupKey {
            lane: self.strategy_name(),
            clusters: self.resources.as_ref().map(|r| r.grid.format()),
            fog: self.fog.mode,
            environment_map: self.environment_map,
            shadow_map: self.shadow_map,
        }
    }
}

impl RenderLane for ForwardLane {
    fn strategy_name(&self) -> &'static str {
        "ForwardLane"
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn targets(&self) -> PassTargets {
        self.targets
    }

    fn prepare(
        &mut self,
        frame: &mut FrameContext<'_>,
        camera: Option<&CameraView>,
        queue: &RenderQueue,
    ) -> Result<(), LaneError> {
        if self.resources.is_none() {
            log::debug!("ForwardLane: Recreating resources after dispose");
            self.resources = Some(ForwardResources::create(frame.device, &self.grid_config)?);
        }
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };

        if self.fog.mode.is_enabled() {
            frame.device.write_buffer(
                resources.fog_buffer,
                0,
                bytemuck::bytes_of(&FogUniform::from(&self.fog)),
            )?;
        }
        let Some(camera) = camera else {
            log::debug!("ForwardLane: No camera, drawing with the last uploaded camera and clusters");
            return Ok(());
        };
        frame.device.write_buffer(
            resources.camera_buffer,
            0,
            bytemuck::bytes_of(&camera.to_uniform()),
        )?;

        let metrics = resources.grid.calculate_light_index(
            frame.device,
            &mut *frame.encoder,
            camera,
            queue.clustered_lights(),
        )?;
        frame.stats.clustered_lights += metrics.clustered_lights as u32;
        Ok(())
    }

    fn render_items(
        &mut self,
        ctx: &mut DrawContext<'_>,
        _camera: Option<&CameraView>,
        queue: &RenderQueue,
    ) -> Result<(), LaneError> {
        let key = self.global_key();
        let Some(resources) = self.resources.as_ref() else {
            return Ok(());
        };

        let globals = GlobalResources {
            camera_buffer: resources.camera_buffer,
            clusters: Some(ClusterBindings {
                light_buffer: resources.grid.light_buffer(),
                uniform_buffer: resources.grid.uniform_buffer(),
                index_view: resources.grid.view(),
            }),
            fog_buffer: Some(resources.fog_buffer),
        };
        let bind_group = self
            .core
            .bind_groups_mut()
            .get_or_create(ctx.device, &key, &globals)?;
        ctx.pass().set_bind_group(GLOBAL_BIND_GROUP, bind_group, &[]);

        for item in queue.iter() {
            ctx.draw_item(item)?;
        }
        Ok(())
    }

    fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(resources) = self.resources.take() {
            resources.destroy(device);
        }
    }
}
