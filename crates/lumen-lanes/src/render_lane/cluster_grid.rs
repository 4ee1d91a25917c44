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

//! Clustered light culling.
//!
//! The view frustum is split into `tiles_x × tiles_y` screen tiles and
//! `tiles_z` logarithmic depth slices. Every cell lists the lights whose
//! bounding sphere touches it, as 1-based slots into the light buffer (slot 0
//! is the "no light" sentinel). The lists are packed into a 2D index texture,
//! one texel per cell:
//!
//! ```text
//! cell  c = x + y * tiles_x + z * tiles_x * tiles_y
//! texel   = (c % width, c / width)
//! ```
//!
//! Full backends use an `Rgba32Uint` texture with four 8-bit slots per
//! channel. Limited backends without integer textures use `Rgba32Float`,
//! storing two slots per channel as `a + b * 256`, which stays exact in an
//! `f32` mantissa.
//!
//! The binning runs on the GPU, one invocation per cell. Full backends
//! dispatch `tiles_x × tiles_y × tiles_z` workgroups of a compute shader
//! writing a storage texture. Limited backends have no compute stage, so
//! they draw one point per cell into the index texture and bin in the
//! fragment shader.

use std::borrow::Cow;

use lumen_core::math::LinearRgba;
use lumen_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutEntry, BindGroupLayoutId,
    BindingResource, BufferBinding, BufferDescriptor, BufferId, BufferUsage,
    ComputePassDescriptor, ComputePipelineDescriptor, ComputePipelineId, DeviceCapabilities,
    Extent3d, LoadOp, Operations, PrimitiveTopology, ProgramDescriptor, ProgramId,
    RenderPassColorAttachment, RenderPassDescriptor, RendererConfig, ShaderStageFlags, StoreOp,
    TextureDescriptor, TextureFormat, TextureId, TextureSampleType, TextureUsage, TextureViewId,
};
use lumen_core::renderer::{
    CameraView, CommandEncoder, GraphicsDevice, LightRecord, MAX_CLUSTERED_LIGHTS,
};

use super::render_queue::QueuedLight;
use super::shaders;
use crate::LaneError;

/// Resolution of the cluster grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterGridConfig {
    /// Screen tiles along X.
    pub tiles_x: u32,
    /// Screen tiles along Y.
    pub tiles_y: u32,
    /// Depth slices.
    pub tiles_z: u32,
}

impl Default for ClusterGridConfig {
    fn default() -> Self {
        Self {
            tiles_x: 16,
            tiles_y: 16,
            tiles_z: 32,
        }
    }
}

impl From<&RendererConfig> for ClusterGridConfig {
    fn from(config: &RendererConfig) -> Self {
        let [tiles_x, tiles_y, tiles_z] = config.cluster_tiles;
        Self {
            tiles_x,
            tiles_y,
            tiles_z,
        }
    }
}

impl ClusterGridConfig {
    /// Total number of cells.
    pub fn cell_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64 * self.tiles_z as u64
    }

    /// Linear index of cell `(x, y, z)`.
    pub fn cell_index(&self, x: u32, y: u32, z: u32) -> usize {
        (x + y * self.tiles_x + z * self.tiles_x * self.tiles_y) as usize
    }

    /// View-space depth range `[near, far]` of slice `slice`.
    ///
    /// Slices are distributed logarithmically:
    /// `near * (far / near) ^ (slice / tiles_z)`.
    pub fn slice_bounds(&self, near: f32, far: f32, slice: u32) -> (f32, f32) {
        let ratio = far / near;
        let z = self.tiles_z as f32;
        (
            near * ratio.powf(slice as f32 / z),
            near * ratio.powf((slice + 1) as f32 / z),
        )
    }
}

/// How light slots are packed into an index texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterIndexFormat {
    /// `Rgba32Float`, two slots per channel (8 per cell).
    PackedFloat,
    /// `Rgba32Uint`, four byte-sized slots per channel (16 per cell).
    PackedUint,
}

impl ClusterIndexFormat {
    /// The packing a device supports.
    pub fn for_capabilities(capabilities: &DeviceCapabilities) -> Self {
        if capabilities.is_limited() {
            Self::PackedFloat
        } else {
            Self::PackedUint
        }
    }

    /// How many light slots fit in one cell.
    pub const fn lights_per_cell(self) -> usize {
        match self {
            Self::PackedFloat => 8,
            Self::PackedUint => 16,
        }
    }

    /// The index texture format.
    pub const fn texture_format(self) -> TextureFormat {
        match self {
            Self::PackedFloat => TextureFormat::Rgba32Float,
            Self::PackedUint => TextureFormat::Rgba32Uint,
        }
    }

    /// Entry point run once per cell: a `@compute` function for
    /// [`PackedUint`](Self::PackedUint), a `@fragment` function for
    /// [`PackedFloat`](Self::PackedFloat).
    pub const fn cull_entry_point(self) -> &'static str {
        match self {
            Self::PackedFloat => "cull_fs",
            Self::PackedUint => "cull_clusters",
        }
    }

    /// How shaders sample the index texture.
    pub const fn sample_type(self) -> TextureSampleType {
        match self {
            Self::PackedFloat => TextureSampleType::Float { filterable: false },
            Self::PackedUint => TextureSampleType::Uint,
        }
    }

    /// Packs up to [`lights_per_cell`](Self::lights_per_cell) slots into the
    /// raw bits of one texel. Missing slots are zero.
    pub fn encode_texel(self, slots: &[u8]) -> [u32; 4] {
        let slot = |i: usize| slots.get(i).copied().unwrap_or(0) as u32;
        let mut texel = [0u32; 4];
        for (channel, value) in texel.iter_mut().enumerate() {
            *value = match self {
                Self::PackedFloat => {
                    let packed = slot(channel * 2) + slot(channel * 2 + 1) * 256;
                    (packed as f32).to_bits()
                }
                Self::PackedUint => (0..4).fold(0, |acc, lane| {
                    acc | slot(channel * 4 + lane) << (lane * 8)
                }),
            };
        }
        texel
    }

    /// Unpacks the non-zero slots of a texel, in slot order.
    pub fn decode_texel(self, texel: [u32; 4]) -> Vec<u8> {
        let mut slots = Vec::with_capacity(self.lights_per_cell());
        for value in texel {
            match self {
                Self::PackedFloat => {
                    let packed = f32::from_bits(value) as u32;
                    slots.push((packed % 256) as u8);
                    slots.push((packed / 256) as u8);
                }
                Self::PackedUint => slots.extend(value.to_le_bytes()),
            }
        }
        slots.retain(|slot| *slot != 0);
        slots
    }
}

/// Grid and camera state uploaded next to the index texture.
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ClusterUniform {
    /// World to view transform.
    pub view: [[f32; 4]; 4],
    /// Clip to view transform.
    pub inverse_projection: [[f32; 4]; 4],
    /// Tiles along x, y, z, and the index texture width.
    pub grid: [u32; 4],
    /// Near, far, and the scale and bias mapping `ln(depth)` to a slice.
    pub depth: [f32; 4],
    /// Viewport width and height, tile width and height in pixels.
    pub screen: [f32; 4],
    /// Clustered lights, slots per cell, index texture height, unused.
    pub counts: [u32; 4],
}

/// What the last [`ClusterGrid::calculate_light_index`] call recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterMetrics {
    /// Lights handed to the grid.
    pub total_lights: usize,
    /// Lights uploaded to the light buffer.
    pub clustered_lights: usize,
    /// Lights dropped because the buffer was full.
    pub truncated_lights: usize,
    /// Cells binned by the culling dispatch, 0 when the index was cleared.
    pub dispatched_cells: u64,
}

/// The GPU program filling the index texture.
#[derive(Debug, Clone, Copy)]
enum CullPipeline {
    /// One workgroup per cell.
    Compute(ComputePipelineId),
    /// One point per cell.
    Points,
}

/// A view-space froxel grid binning lights into a per-cell index texture.
#[derive(Debug)]
pub struct ClusterGrid {
    config: ClusterGridConfig,
    format: ClusterIndexFormat,
    width: u32,
    height: u32,
    light_buffer: BufferId,
    uniform_buffer: BufferId,
    texture: TextureId,
    view: TextureViewId,
    program: ProgramId,
    pipeline: CullPipeline,
    layout: BindGroupLayoutId,
    bind_group: BindGroupId,
    records: Vec<LightRecord>,
    metrics: ClusterMetrics,
    truncation_warned: bool,
}

impl ClusterGrid {
    /// Creates the light buffer, cluster uniform, index texture and the
    /// culling program.
    ///
    /// # Errors
    ///
    /// [`LaneError::ClusterConfig`] if a tile count is zero, if the cell
    /// count is not a power of two, or if the index texture exceeds the
    /// device's 2D size limit.
    pub fn new(device: &dyn GraphicsDevice, config: &ClusterGridConfig) -> Result<Self, LaneError> {
        let ClusterGridConfig {
            tiles_x,
            tiles_y,
            tiles_z,
        } = *config;
        if tiles_x == 0 || tiles_y == 0 || tiles_z == 0 {
            return Err(LaneError::ClusterConfig(format!(
                "every axis needs at least one tile, got {tiles_x}x{tiles_y}x{tiles_z}"
            )));
        }
        let cells = config.cell_count();
        if !cells.is_power_of_two() {
            return Err(LaneError::ClusterConfig(format!(
                "{cells} cells cannot be laid out in a power-of-two texture"
            )));
        }

        let log2 = cells.trailing_zeros();
        let width_log2 = (log2 + 1) / 2;
        let width = 1u64 << width_log2;
        let height = cells >> width_log2;
        let capabilities = device.capabilities();
        let max = capabilities.max_texture_dimension_2d as u64;
        if width > max || height > max {
            return Err(LaneError::ClusterConfig(format!(
                "index texture of {width}x{height} exceeds the device limit of {max}"
            )));
        }
        let (width, height) = (width as u32, height as u32);
        let format = ClusterIndexFormat::for_capabilities(&capabilities);

        let light_buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("Cluster Lights")),
            size: ((MAX_CLUSTERED_LIGHTS + 1) * std::mem::size_of::<LightRecord>()) as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::COPY_DST,
        })?;
        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("Cluster Uniform")),
            size: std::mem::size_of::<ClusterUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let target_usage = match format {
            ClusterIndexFormat::PackedUint => TextureUsage::STORAGE_BINDING,
            ClusterIndexFormat::PackedFloat => TextureUsage::RENDER_ATTACHMENT,
        };
        let texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("Cluster Light Index")),
            size: Extent3d::new_2d(width, height),
            format: format.texture_format(),
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | target_usage,
        })?;
        let view = device.create_texture_view(texture)?;

        let (program, pipeline) = create_cull_program(device, format)?;
        let layout = device.program_bind_group_layout(program, 0)?;
        let bind_group = create_cull_bind_group(device, format, layout, light_buffer, uniform_buffer, view)?;

        log::info!(
            "ClusterGrid: {tiles_x}x{tiles_y}x{tiles_z} cells in a {width}x{height} {format:?} index texture"
        );

        Ok(Self {
            config: *config,
            format,
            width,
            height,
            light_buffer,
            uniform_buffer,
            texture,
            view,
            program,
            pipeline,
            layout,
            bind_group,
            records: vec![LightRecord::default(); MAX_CLUSTERED_LIGHTS + 1],
            metrics: ClusterMetrics::default(),
            truncation_warned: false,
        })
    }

    /// Uploads `lights` and the grid as seen from `camera`, then records the
    /// culling pass into `encoder`: one invocation per cell, each writing
    /// the slot list of its texel.
    ///
    /// With no lights the index texture is cleared and nothing is uploaded.
    /// Must be recorded before any pass sampling the index.
    pub fn calculate_light_index(
        &mut self,
        device: &dyn GraphicsDevice,
        encoder: &mut dyn CommandEncoder,
        camera: &CameraView,
        lights: &[QueuedLight],
    ) -> Result<&ClusterMetrics, LaneError> {
        self.metrics = ClusterMetrics {
            total_lights: lights.len(),
            ..ClusterMetrics::default()
        };

        if lights.is_empty() {
            encoder.clear_texture(self.texture);
            return Ok(&self.metrics);
        }

        let count = lights.len().min(MAX_CLUSTERED_LIGHTS);
        if lights.len() > count {
            self.metrics.truncated_lights = lights.len() - count;
            if !self.truncation_warned {
                log::warn!(
                    "ClusterGrid: {} lights submitted, only the first {MAX_CLUSTERED_LIGHTS} are clustered",
                    lights.len()
                );
                self.truncation_warned = true;
            }
        }
        self.metrics.clustered_lights = count;

        self.records.fill(LightRecord::default());
        for (record, light) in self.records[1..].iter_mut().zip(&lights[..count]) {
            *record = light.record;
        }
        device.write_buffer(self.light_buffer, 0, bytemuck::cast_slice(&self.records))?;

        let ClusterGridConfig {
            tiles_x,
            tiles_y,
            tiles_z,
        } = self.config;
        let log_ratio = (camera.far / camera.near).ln();
        let z_scale = tiles_z as f32 / log_ratio;
        let uniform = ClusterUniform {
            view: camera.view.to_cols_array_2d(),
            inverse_projection: camera.projection.inverse().to_cols_array_2d(),
            grid: [tiles_x, tiles_y, tiles_z, self.width],
            depth: [camera.near, camera.far, z_scale, -z_scale * camera.near.ln()],
            screen: [
                camera.viewport.width,
                camera.viewport.height,
                camera.viewport.width / tiles_x as f32,
                camera.viewport.height / tiles_y as f32,
            ],
            counts: [
                count as u32,
                self.format.lights_per_cell() as u32,
                self.height,
                0,
            ],
        };
        device.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&uniform))?;

        let bind_group = self.cull_bind_group(device)?;
        match self.pipeline {
            CullPipeline::Compute(pipeline) => {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("Cluster Culling"),
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.dispatch_workgroups(tiles_x, tiles_y, tiles_z);
            }
            CullPipeline::Points => {
                let color = [RenderPassColorAttachment {
                    view: self.view,
                    ops: Operations {
                        load: LoadOp::Clear(LinearRgba::TRANSPARENT),
                        store: StoreOp::Store,
                    },
                }];
                let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some("Cluster Culling"),
                    color_attachments: &color,
                    depth_stencil_attachment: None,
                });
                pass.set_pipeline(self.program);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..self.width * self.height, 0..1);
            }
        }
        self.metrics.dispatched_cells = self.config.cell_count();

        Ok(&self.metrics)
    }

    /// The culling bind group, rebuilt if the device invalidated it.
    fn cull_bind_group(&mut self, device: &dyn GraphicsDevice) -> Result<BindGroupId, LaneError> {
        if !device.is_bind_group_valid(self.bind_group) {
            log::debug!("ClusterGrid: Rebuilding invalidated culling bind group");
            let _ = device.destroy_bind_group(self.bind_group);
            self.bind_group = create_cull_bind_group(
                device,
                self.format,
                self.layout,
                self.light_buffer,
                self.uniform_buffer,
                self.view,
            )?;
        }
        Ok(self.bind_group)
    }

    /// The grid resolution.
    pub fn config(&self) -> &ClusterGridConfig {
        &self.config
    }

    /// The slot packing of the index texture.
    pub fn format(&self) -> ClusterIndexFormat {
        self.format
    }

    /// Index texture size in texels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Metrics of the last invocation.
    pub fn metrics(&self) -> &ClusterMetrics {
        &self.metrics
    }

    /// Buffer of `MAX_CLUSTERED_LIGHTS + 1` light records.
    pub fn light_buffer(&self) -> BufferId {
        self.light_buffer
    }

    /// Buffer holding the [`ClusterUniform`].
    pub fn uniform_buffer(&self) -> BufferId {
        self.uniform_buffer
    }

    /// The index texture.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    /// View of the index texture.
    pub fn view(&self) -> TextureViewId {
        self.view
    }

    /// Destroys every GPU resource owned by the grid.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_bind_group(self.bind_group) {
            log::warn!("ClusterGrid: Failed to destroy culling bind group: {e:?}");
        }
        if let Err(e) = device.destroy_bind_group_layout(self.layout) {
            log::warn!("ClusterGrid: Failed to destroy culling layout: {e:?}");
        }
        if let CullPipeline::Compute(pipeline) = self.pipeline {
            if let Err(e) = device.destroy_compute_pipeline(pipeline) {
                log::warn!("ClusterGrid: Failed to destroy culling pipeline: {e:?}");
            }
        }
        if let Err(e) = device.destroy_program(self.program) {
            log::warn!("ClusterGrid: Failed to destroy culling program: {e:?}");
        }
        if let Err(e) = device.destroy_texture_view(self.view) {
            log::warn!("ClusterGrid: Failed to destroy index view: {e:?}");
        }
        if let Err(e) = device.destroy_texture(self.texture) {
            log::warn!("ClusterGrid: Failed to destroy index texture: {e:?}");
        }
        for buffer in [self.light_buffer, self.uniform_buffer] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("ClusterGrid: Failed to destroy buffer {buffer:?}: {e:?}");
            }
        }
    }
}

fn create_cull_program(
    device: &dyn GraphicsDevice,
    format: ClusterIndexFormat,
) -> Result<(ProgramId, CullPipeline), LaneError> {
    let (stage_source, entries, topology) = match format {
        ClusterIndexFormat::PackedUint => (
            shaders::CULL_CLUSTERS_COMPUTE_WGSL,
            vec![
                BindGroupLayoutEntry::storage_buffer(0, ShaderStageFlags::COMPUTE),
                BindGroupLayoutEntry::uniform(1, ShaderStageFlags::COMPUTE),
                BindGroupLayoutEntry::storage_texture(
                    2,
                    ShaderStageFlags::COMPUTE,
                    TextureFormat::Rgba32Uint,
                ),
            ],
            PrimitiveTopology::TriangleList,
        ),
        ClusterIndexFormat::PackedFloat => (
            shaders::CULL_CLUSTERS_POINTS_WGSL,
            vec![
                BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT),
                BindGroupLayoutEntry::uniform(
                    1,
                    ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
                ),
            ],
            PrimitiveTopology::PointList,
        ),
    };
    let program = device.create_program(&ProgramDescriptor {
        label: Some(Cow::Borrowed("Cluster Culling")),
        source: Cow::Owned(format!("{}\n{stage_source}", shaders::CLUSTER_CULL_WGSL)),
        bind_group_layouts: vec![entries],
        topology,
    })?;

    let pipeline = match format {
        ClusterIndexFormat::PackedUint => {
            let created = device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(Cow::Borrowed("Cluster Culling")),
                program,
                entry_point: Cow::Borrowed(format.cull_entry_point()),
            });
            match created {
                Ok(pipeline) => CullPipeline::Compute(pipeline),
                Err(e) => {
                    let _ = device.destroy_program(program);
                    return Err(e.into());
                }
            }
        }
        ClusterIndexFormat::PackedFloat => CullPipeline::Points,
    };
    Ok((program, pipeline))
}

fn create_cull_bind_group(
    device: &dyn GraphicsDevice,
    format: ClusterIndexFormat,
    layout: BindGroupLayoutId,
    light_buffer: BufferId,
    uniform_buffer: BufferId,
    view: TextureViewId,
) -> Result<BindGroupId, LaneError> {
    let mut entries = vec![
        BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding::whole(light_buffer)),
        },
        BindGroupEntry {
            binding: 1,
            resource: BindingResource::Buffer(BufferBinding::whole(uniform_buffer)),
        },
    ];
    if format == ClusterIndexFormat::PackedUint {
        entries.push(BindGroupEntry {
            binding: 2,
            resource: BindingResource::TextureView(view),
        });
    }
    Ok(device.create_bind_group(&BindGroupDescriptor {
        label: Some("Cluster Culling"),
        layout,
        entries: &entries,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lumen_core::math::Vec3;
    use lumen_core::renderer::Viewport;
    use lumen_infra::{HeadlessDevice, RecordedCommand};

    fn camera() -> CameraView {
        CameraView::perspective(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::Y,
            60f32.to_radians(),
            Viewport::new(1280.0, 720.0),
            0.1,
            100.0,
        )
    }

    #[test]
    fn texture_is_split_into_nearly_square_powers_of_two() {
        let device = HeadlessDevice::new();
        let grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
        assert_eq!(grid.dimensions(), (128, 64));

        let tiny = ClusterGridConfig {
            tiles_x: 1,
            tiles_y: 1,
            tiles_z: 1,
        };
        assert_eq!(ClusterGrid::new(&device, &tiny).unwrap().dimensions(), (1, 1));
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let device = HeadlessDevice::new();
        for (tiles_x, tiles_y, tiles_z) in [(0, 16, 32), (12, 16, 32)] {
            let config = ClusterGridConfig {
                tiles_x,
                tiles_y,
                tiles_z,
            };
            assert!(matches!(
                ClusterGrid::new(&device, &config),
                Err(LaneError::ClusterConfig(_))
            ));
        }

        let limited = HeadlessDevice::with_capabilities(DeviceCapabilities::limited());
        let huge = ClusterGridConfig {
            tiles_x: 256,
            tiles_y: 256,
            tiles_z: 256,
        };
        assert!(matches!(
            ClusterGrid::new(&limited, &huge),
            Err(LaneError::ClusterConfig(_))
        ));
    }

    #[test]
    fn format_follows_device_capabilities() {
        let full = HeadlessDevice::new();
        let limited = HeadlessDevice::with_capabilities(DeviceCapabilities::limited());
        let config = ClusterGridConfig::default();
        assert_eq!(
            ClusterGrid::new(&full, &config).unwrap().format(),
            ClusterIndexFormat::PackedUint
        );
        assert_eq!(full.live_compute_pipeline_count(), 1);
        assert_eq!(
            ClusterGrid::new(&limited, &config).unwrap().format(),
            ClusterIndexFormat::PackedFloat
        );
        assert_eq!(limited.live_compute_pipeline_count(), 0);
    }

    #[test]
    fn texels_pack_and_unpack_slots() {
        let slots: Vec<u8> = (1..=16).map(|i| i * 15).collect();
        let uint = ClusterIndexFormat::PackedUint;
        assert_eq!(uint.decode_texel(uint.encode_texel(&slots)), slots);
        assert_eq!(uint.encode_texel(&[1, 2])[0], 1 | 2 << 8);

        let float = ClusterIndexFormat::PackedFloat;
        assert_eq!(float.decode_texel(float.encode_texel(&slots[..8])), &slots[..8]);
        assert_eq!(f32::from_bits(float.encode_texel(&[255, 255])[0]), 65_535.0);
        assert!(float.decode_texel([0; 4]).is_empty());
    }

    #[test]
    fn slices_are_logarithmic() {
        let config = ClusterGridConfig::default();
        let (first_near, _) = config.slice_bounds(0.1, 100.0, 0);
        let (_, last_far) = config.slice_bounds(0.1, 100.0, 31);
        assert_relative_eq!(first_near, 0.1, epsilon = 1e-6);
        assert_relative_eq!(last_far, 100.0, epsilon = 1e-3);

        let (a_near, a_far) = config.slice_bounds(0.1, 100.0, 4);
        let (b_near, b_far) = config.slice_bounds(0.1, 100.0, 20);
        assert_relative_eq!(a_far / a_near, b_far / b_near, epsilon = 1e-4);
    }

    #[test]
    fn zero_lights_record_a_clear_and_upload_nothing() {
        let device = HeadlessDevice::new();
        let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
        let mut encoder = device.create_command_encoder(None);
        let metrics = *grid
            .calculate_light_index(&device, encoder.as_mut(), &camera(), &[])
            .unwrap();
        device.submit_command_buffer(encoder.finish());

        assert_eq!(metrics, ClusterMetrics::default());
        assert_eq!(device.buffer_write_count(grid.light_buffer()), 0);
        assert_eq!(device.buffer_write_count(grid.uniform_buffer()), 0);
        assert_eq!(device.texture_write_count(grid.texture()), 0);
        assert_eq!(
            device.submitted_commands(),
            vec![vec![RecordedCommand::ClearTexture(grid.texture())]]
        );
    }

    #[test]
    fn lights_record_one_workgroup_per_cell() {
        let device = HeadlessDevice::new();
        let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
        let mut light = lumen_core::renderer::Light::point(lumen_core::renderer::LightId(1), 2.0);
        let lights = [QueuedLight::from_light(&mut light)];
        let mut encoder = device.create_command_encoder(None);
        let metrics = *grid
            .calculate_light_index(&device, encoder.as_mut(), &camera(), &lights)
            .unwrap();
        device.submit_command_buffer(encoder.finish());

        assert_eq!(metrics.dispatched_cells, 16 * 16 * 32);
        let commands = device.take_submitted_commands().remove(0);
        assert!(commands.contains(&RecordedCommand::DispatchWorkgroups {
            x: 16,
            y: 16,
            z: 32
        }));
        assert_eq!(commands.last(), Some(&RecordedCommand::EndComputePass));

        let uniform: ClusterUniform =
            bytemuck::pod_read_unaligned(&device.buffer_data(grid.uniform_buffer()).unwrap());
        assert_eq!(uniform.counts, [1, 16, 64, 0]);
        assert_eq!(uniform.grid, [16, 16, 32, 128]);
    }

    #[test]
    fn invalidated_bind_group_is_rebuilt_before_culling() {
        let device = HeadlessDevice::new();
        let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
        let mut light = lumen_core::renderer::Light::point(lumen_core::renderer::LightId(1), 2.0);
        let lights = [QueuedLight::from_light(&mut light)];
        let stale = grid.bind_group;
        device.invalidate_bind_groups();

        let mut encoder = device.create_command_encoder(None);
        grid.calculate_light_index(&device, encoder.as_mut(), &camera(), &lights)
            .unwrap();
        assert_ne!(grid.bind_group, stale);
        assert!(device.is_bind_group_valid(grid.bind_group));
        assert_eq!(device.live_bind_group_count(), 1);
    }

    #[test]
    fn destroy_releases_every_resource() {
        let device = HeadlessDevice::new();
        let mut grid = ClusterGrid::new(&device, &ClusterGridConfig::default()).unwrap();
        grid.destroy(&device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_bind_group_count(), 0);
        assert_eq!(device.live_bind_group_layout_count(), 0);
        assert_eq!(device.live_compute_pipeline_count(), 0);
        assert_eq!(device.live_program_count(), 0);
    }
}
