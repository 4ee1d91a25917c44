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

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumen_core::math::LinearRgba;
use lumen_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BindingResource, BindingType, BufferDescriptor,
    BufferId, BufferUsage, CommandBufferId, ComputePipelineDescriptor, ComputePipelineId,
    DeviceCapabilities, Extent3d, LoadOp, PrimitiveTopology, ProgramDescriptor, ProgramId,
    SamplerBindingType, SamplerDescriptor, SamplerId, TextureDescriptor, TextureFormat,
    TextureId, TextureUsage, TextureViewId,
};
use lumen_core::renderer::traits::CommandEncoder;
use lumen_core::renderer::{GraphicsDevice, ResourceError};

use super::command::{HeadlessCommandEncoder, RecordedCommand};
use super::kernel::{HostKernel, KernelInvocation, KernelOutput, KernelRegistry, KernelResources};

#[derive(Debug)]
struct HeadlessBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
    writes: usize,
}

#[derive(Debug)]
struct HeadlessTexture {
    data: Vec<u8>,
    size: Extent3d,
    format: TextureFormat,
    usage: TextureUsage,
    writes: usize,
}

#[derive(Debug)]
struct HeadlessProgram {
    layouts: Vec<Vec<BindGroupLayoutEntry>>,
    topology: PrimitiveTopology,
    compute_entries: Vec<String>,
    fragment_entries: Vec<String>,
}

#[derive(Debug)]
struct HeadlessComputePipeline {
    entry_point: String,
}

#[derive(Debug)]
struct HeadlessBindGroup {
    layout: BindGroupLayoutId,
    entries: Vec<BindGroupEntry>,
    valid: bool,
}

/// The internal, non-clonable state of the [`HeadlessDevice`].
#[derive(Debug)]
struct HeadlessDeviceInternal {
    capabilities: DeviceCapabilities,
    buffers: Mutex<HashMap<BufferId, HeadlessBuffer>>,
    textures: Mutex<HashMap<TextureId, HeadlessTexture>>,
    texture_views: Mutex<HashMap<TextureViewId, TextureId>>,
    samplers: Mutex<HashMap<SamplerId, SamplerBindingType>>,
    programs: Mutex<HashMap<ProgramId, HeadlessProgram>>,
    compute_pipelines: Mutex<HashMap<ComputePipelineId, HeadlessComputePipeline>>,
    kernels: Mutex<KernelRegistry>,
    layouts: Mutex<HashMap<BindGroupLayoutId, Vec<BindGroupLayoutEntry>>>,
    bind_groups: Mutex<HashMap<BindGroupId, HeadlessBindGroup>>,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, Vec<RecordedCommand>>>,
    submitted_command_buffers: Mutex<Vec<Vec<RecordedCommand>>>,

    next_buffer_id: AtomicUsize,
    next_texture_id: AtomicUsize,
    next_texture_view_id: AtomicUsize,
    next_sampler_id: AtomicUsize,
    next_program_id: AtomicUsize,
    next_compute_pipeline_id: AtomicUsize,
    next_layout_id: AtomicUsize,
    next_bind_group_id: AtomicUsize,
    next_command_buffer_id: AtomicUsize,
}

/// A clonable, thread-safe handle to an in-memory graphics device.
///
/// Clones share the same state, so a test can keep a handle for inspection
/// while the code under test owns another.
#[derive(Clone, Debug)]
pub struct HeadlessDevice {
    internal: Arc<HeadlessDeviceInternal>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_id(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::Relaxed)
}

/// Extracts every `(group, binding)` pair declared in WGSL source.
fn reflect_bindings(source: &str) -> Vec<(u32, u32)> {
    fn number_after<'a>(text: &'a str, marker: &str) -> Option<(u32, &'a str)> {
        let start = text.find(marker)? + marker.len();
        let rest = &text[start..];
        let end = rest.find(')')?;
        let value = rest[..end].trim().parse().ok()?;
        Some((value, &rest[end..]))
    }

    let mut found = Vec::new();
    let mut rest = source;
    while let Some((group, after_group)) = number_after(rest, "@group(") {
        match number_after(after_group, "@binding(") {
            Some((binding, after_binding)) => {
                found.push((group, binding));
                rest = after_binding;
            }
            None => break,
        }
    }
    found
}

/// Names of the functions following every `stage` attribute in WGSL source.
fn reflect_entry_points(source: &str, stage: &str) -> Vec<String> {
    source
        .match_indices(stage)
        .filter_map(|(at, _)| {
            let rest = &source[at..];
            let name = &rest[rest.find("fn ")? + 3..];
            let end = name.find('(')?;
            Some(name[..end].trim().to_owned())
        })
        .collect()
}

/// Raw bytes of one texel cleared to `color`, `None` for depth formats.
fn clear_texel(format: TextureFormat, color: LinearRgba) -> Option<Vec<u8>> {
    let channels = [color.r, color.g, color.b, color.a];
    match format {
        TextureFormat::Rgba32Float => Some(channels.iter().flat_map(|c| c.to_ne_bytes()).collect()),
        TextureFormat::Rgba32Uint => Some(
            channels
                .iter()
                .flat_map(|c| (*c as u32).to_ne_bytes())
                .collect(),
        ),
        TextureFormat::Rgba8Unorm => Some(
            channels
                .iter()
                .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
        ),
        TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8 => None,
    }
}

impl HeadlessDevice {
    /// Creates a device with desktop-class capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::full())
    }

    /// Creates a device reporting `capabilities`.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        log::info!("HeadlessDevice: created with {capabilities:?}");
        Self {
            internal: Arc::new(HeadlessDeviceInternal {
                capabilities,
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                programs: Mutex::new(HashMap::new()),
                compute_pipelines: Mutex::new(HashMap::new()),
                kernels: Mutex::new(KernelRegistry::default()),
                layouts: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                pending_command_buffers: Mutex::new(HashMap::new()),
                submitted_command_buffers: Mutex::new(Vec::new()),
                next_buffer_id: AtomicUsize::new(0),
                next_texture_id: AtomicUsize::new(0),
                next_texture_view_id: AtomicUsize::new(0),
                next_sampler_id: AtomicUsize::new(0),
                next_program_id: AtomicUsize::new(0),
                next_compute_pipeline_id: AtomicUsize::new(0),
                next_layout_id: AtomicUsize::new(0),
                next_bind_group_id: AtomicUsize::new(0),
                next_command_buffer_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Runs `kernel` whenever a submitted command buffer dispatches the
    /// `@compute` function, or draws points with the `@fragment` function,
    /// named `entry_point`.
    pub fn register_kernel(
        &self,
        entry_point: impl Into<String>,
        kernel: impl Fn(&mut KernelInvocation<'_>) + Send + Sync + 'static,
    ) {
        let entry_point = entry_point.into();
        log::debug!("HeadlessDevice: Registered host kernel for '{entry_point}'");
        lock(&self.internal.kernels).insert(entry_point, Arc::new(kernel));
    }

    /// Simulates a device loss: every live bind group becomes invalid.
    pub fn invalidate_bind_groups(&self) {
        let mut bind_groups = lock(&self.internal.bind_groups);
        for bind_group in bind_groups.values_mut() {
            bind_group.valid = false;
        }
        log::warn!(
            "HeadlessDevice: invalidated {} bind groups",
            bind_groups.len()
        );
    }

    /// A copy of the contents of a buffer.
    pub fn buffer_data(&self, id: BufferId) -> Option<Vec<u8>> {
        lock(&self.internal.buffers).get(&id).map(|b| b.data.clone())
    }

    /// Number of `write_buffer` calls that targeted `id`.
    pub fn buffer_write_count(&self, id: BufferId) -> usize {
        lock(&self.internal.buffers)
            .get(&id)
            .map_or(0, |b| b.writes)
    }

    /// A copy of the contents of a texture.
    pub fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        lock(&self.internal.textures).get(&id).map(|t| t.data.clone())
    }

    /// Number of `write_texture` calls that targeted `id`.
    pub fn texture_write_count(&self, id: TextureId) -> usize {
        lock(&self.internal.textures)
            .get(&id)
            .map_or(0, |t| t.writes)
    }

    /// The texture a view was created from.
    pub fn view_texture(&self, view: TextureViewId) -> Option<TextureId> {
        lock(&self.internal.texture_views).get(&view).copied()
    }

    /// Total number of buffers ever created.
    pub fn buffers_created(&self) -> usize {
        self.internal.next_buffer_id.load(Ordering::Relaxed)
    }

    /// Number of buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        lock(&self.internal.buffers).len()
    }

    /// Number of bind groups currently alive.
    pub fn live_bind_group_count(&self) -> usize {
        lock(&self.internal.bind_groups).len()
    }

    /// Number of bind group layouts currently alive.
    pub fn live_bind_group_layout_count(&self) -> usize {
        lock(&self.internal.layouts).len()
    }

    /// Number of compute pipelines currently alive.
    pub fn live_compute_pipeline_count(&self) -> usize {
        lock(&self.internal.compute_pipelines).len()
    }

    /// Number of programs currently alive.
    pub fn live_program_count(&self) -> usize {
        lock(&self.internal.programs).len()
    }

    /// Total number of programs ever created.
    pub fn programs_created(&self) -> usize {
        self.internal.next_program_id.load(Ordering::Relaxed)
    }

    /// The layout entries of a bind group layout.
    pub fn layout_entries(&self, id: BindGroupLayoutId) -> Option<Vec<BindGroupLayoutEntry>> {
        lock(&self.internal.layouts).get(&id).cloned()
    }

    /// The resources of a bind group.
    pub fn bind_group_entries(&self, id: BindGroupId) -> Option<Vec<BindGroupEntry>> {
        lock(&self.internal.bind_groups)
            .get(&id)
            .map(|g| g.entries.clone())
    }

    /// Commands of every submitted command buffer, in submission order.
    pub fn submitted_commands(&self) -> Vec<Vec<RecordedCommand>> {
        lock(&self.internal.submitted_command_buffers).clone()
    }

    /// Drains the submitted command buffers.
    pub fn take_submitted_commands(&self) -> Vec<Vec<RecordedCommand>> {
        std::mem::take(&mut *lock(&self.internal.submitted_command_buffers))
    }

    pub(crate) fn register_command_buffer(
        &self,
        commands: Vec<RecordedCommand>,
    ) -> CommandBufferId {
        let id = CommandBufferId(next_id(&self.internal.next_command_buffer_id));
        lock(&self.internal.pending_command_buffers).insert(id, commands);
        id
    }

    fn kernel(&self, entry_point: &str) -> Option<HostKernel> {
        let kernel = lock(&self.internal.kernels).get(entry_point);
        if kernel.is_none() {
            log::debug!("HeadlessDevice: No host kernel for '{entry_point}', skipped");
        }
        kernel
    }

    /// Runs the host kernels and clears of a submitted command list.
    fn execute(&self, commands: &[RecordedCommand]) {
        let mut bound = BTreeMap::new();
        let mut compute_pipeline = None;
        let mut program = None;
        let mut color_target = None;
        for command in commands {
            match command {
                RecordedCommand::BeginRenderPass {
                    color_targets,
                    color_loads,
                    ..
                } => {
                    bound.clear();
                    program = None;
                    color_target = color_targets.first().copied();
                    for (view, load) in color_targets.iter().zip(color_loads) {
                        if let LoadOp::Clear(color) = load {
                            self.fill_view(*view, *color);
                        }
                    }
                }
                RecordedCommand::BeginComputePass { .. } => {
                    bound.clear();
                    compute_pipeline = None;
                }
                RecordedCommand::SetPipeline(id) => program = Some(*id),
                RecordedCommand::SetComputePipeline(id) => compute_pipeline = Some(*id),
                RecordedCommand::SetBindGroup { index, bind_group } => {
                    bound.insert(*index, *bind_group);
                }
                RecordedCommand::ClearTexture(texture) => {
                    if let Some(texture) = lock(&self.internal.textures).get_mut(texture) {
                        texture.data.fill(0);
                    }
                }
                RecordedCommand::DispatchWorkgroups { x, y, z } => {
                    if let Some(pipeline) = compute_pipeline {
                        self.run_dispatch(pipeline, &bound, [*x, *y, *z]);
                    }
                }
                RecordedCommand::Draw { vertices, .. } => {
                    if let (Some(program), Some(target)) = (program, color_target) {
                        self.run_point_draw(program, &bound, target, vertices.clone());
                    }
                }
                _ => {}
            }
        }
    }

    fn fill_view(&self, view: TextureViewId, color: LinearRgba) {
        let Some(texture) = self.view_texture(view) else {
            return;
        };
        let mut textures = lock(&self.internal.textures);
        let Some(texture) = textures.get_mut(&texture) else {
            return;
        };
        if let Some(texel) = clear_texel(texture.format, color) {
            for chunk in texture.data.chunks_exact_mut(texel.len()) {
                chunk.copy_from_slice(&texel);
            }
        }
    }

    fn run_dispatch(
        &self,
        pipeline: ComputePipelineId,
        bound: &BTreeMap<u32, BindGroupId>,
        count: [u32; 3],
    ) {
        let entry_point = lock(&self.internal.compute_pipelines)
            .get(&pipeline)
            .map(|p| p.entry_point.clone());
        let Some(entry_point) = entry_point else {
            log::warn!("HeadlessDevice: Dispatch with unknown compute pipeline {pipeline:?}");
            return;
        };
        let Some(kernel) = self.kernel(&entry_point) else {
            return;
        };
        let mut resources = self.kernel_resources(bound);
        resources.run(&kernel, count);
        self.write_back(resources);
    }

    fn run_point_draw(
        &self,
        program: ProgramId,
        bound: &BTreeMap<u32, BindGroupId>,
        target: TextureViewId,
        vertices: Range<u32>,
    ) {
        let entry_point = lock(&self.internal.programs)
            .get(&program)
            .filter(|p| p.topology == PrimitiveTopology::PointList)
            .and_then(|p| p.fragment_entries.first().cloned());
        let Some(kernel) = entry_point.and_then(|entry| self.kernel(&entry)) else {
            return;
        };
        let mut resources = self.kernel_resources(bound);
        resources.output = self.kernel_output(target);
        resources.run(&kernel, [vertices.len() as u32, 1, 1]);
        self.write_back(resources);
    }

    /// Snapshots the buffers of every bound group. The first storage
    /// texture becomes the output.
    fn kernel_resources(&self, bound: &BTreeMap<u32, BindGroupId>) -> KernelResources {
        let mut resources = KernelResources::default();
        for (&group, bind_group) in bound {
            let Some((layout, entries)) = lock(&self.internal.bind_groups)
                .get(bind_group)
                .map(|g| (g.layout, g.entries.clone()))
            else {
                continue;
            };
            let layout_entries = lock(&self.internal.layouts)
                .get(&layout)
                .cloned()
                .unwrap_or_default();
            for entry in entries {
                match entry.resource {
                    BindingResource::Buffer(binding) => {
                        let buffers = lock(&self.internal.buffers);
                        if let Some(buffer) = buffers.get(&binding.buffer) {
                            let start = (binding.offset as usize).min(buffer.data.len());
                            let end = binding
                                .size
                                .map_or(buffer.data.len(), |size| start + size as usize)
                                .min(buffer.data.len());
                            resources.bind_buffer(group, entry.binding, &buffer.data[start..end]);
                        }
                    }
                    BindingResource::TextureView(view) => {
                        let is_storage = layout_entries.iter().any(|e| {
                            e.binding == entry.binding
                                && matches!(e.ty, BindingType::StorageTexture(_))
                        });
                        if is_storage && resources.output.is_none() {
                            resources.output = self.kernel_output(view);
                        }
                    }
                    BindingResource::Sampler(_) => {}
                }
            }
        }
        resources
    }

    fn kernel_output(&self, view: TextureViewId) -> Option<KernelOutput> {
        let texture = self.view_texture(view)?;
        let textures = lock(&self.internal.textures);
        let data = textures.get(&texture)?;
        Some(KernelOutput {
            texture,
            width: data.size.width,
            height: data.size.height * data.size.depth_or_array_layers,
            words_per_texel: (data.format.bytes_per_texel() as usize / 4).max(1),
            words: bytemuck::pod_collect_to_vec(&data.data),
        })
    }

    fn write_back(&self, resources: KernelResources) {
        let Some(output) = resources.output else {
            return;
        };
        if let Some(texture) = lock(&self.internal.textures).get_mut(&output.texture) {
            let bytes: &[u8] = bytemuck::cast_slice(&output.words);
            if bytes.len() == texture.data.len() {
                texture.data.copy_from_slice(bytes);
            }
        }
    }

    fn validate_binding(
        &self,
        layout_entry: &BindGroupLayoutEntry,
        resource: &BindingResource,
    ) -> Result<(), ResourceError> {
        match (layout_entry.ty, resource) {
            (BindingType::UniformBuffer, BindingResource::Buffer(binding))
            | (BindingType::StorageBuffer, BindingResource::Buffer(binding)) => {
                let buffers = lock(&self.internal.buffers);
                let buffer = buffers.get(&binding.buffer).ok_or(ResourceError::NotFound)?;
                let required = if layout_entry.ty == BindingType::UniformBuffer {
                    BufferUsage::UNIFORM
                } else {
                    BufferUsage::STORAGE
                };
                if !buffer.usage.contains(required) {
                    return Err(ResourceError::BackendError(format!(
                        "buffer {:?} bound at {} lacks {required:?}",
                        binding.buffer, layout_entry.binding
                    )));
                }
                let end = binding.offset + binding.size.unwrap_or(0);
                if end > buffer.data.len() as u64 {
                    return Err(ResourceError::OutOfBounds);
                }
                Ok(())
            }
            (BindingType::StorageTexture(format), BindingResource::TextureView(view)) => {
                let texture = self.view_texture(*view).ok_or(ResourceError::NotFound)?;
                let textures = lock(&self.internal.textures);
                let texture = textures.get(&texture).ok_or(ResourceError::NotFound)?;
                if texture.format != format || !texture.usage.contains(TextureUsage::STORAGE_BINDING)
                {
                    return Err(ResourceError::BackendError(format!(
                        "view {view:?} bound at {} is not a {format:?} storage texture",
                        layout_entry.binding
                    )));
                }
                Ok(())
            }
            (BindingType::Texture(_), BindingResource::TextureView(view)) => {
                if lock(&self.internal.texture_views).contains_key(view) {
                    Ok(())
                } else {
                    Err(ResourceError::NotFound)
                }
            }
            (BindingType::Sampler(expected), BindingResource::Sampler(sampler)) => {
                match lock(&self.internal.samplers).get(sampler) {
                    Some(kind) if *kind == expected => Ok(()),
                    Some(kind) => Err(ResourceError::BackendError(format!(
                        "sampler {sampler:?} is {kind:?}, layout expects {expected:?}"
                    ))),
                    None => Err(ResourceError::NotFound),
                }
            }
            (ty, resource) => Err(ResourceError::BackendError(format!(
                "binding {} expects {ty:?}, got {resource:?}",
                layout_entry.binding
            ))),
        }
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.internal.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(next_id(&self.internal.next_buffer_id));
        lock(&self.internal.buffers).insert(
            id,
            HeadlessBuffer {
                data: vec![0; descriptor.size as usize],
                usage: descriptor.usage,
                writes: 0,
            },
        );
        log::debug!(
            "HeadlessDevice: Created buffer '{}' with ID: {id:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            descriptor.size
        );
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut buffers = lock(&self.internal.buffers);
        let buffer = buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer.data[start..end].copy_from_slice(data);
        buffer.writes += 1;
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        match lock(&self.internal.buffers).remove(&id) {
            Some(_) => {
                log::debug!("HeadlessDevice: Destroyed buffer with ID: {id:?}");
                Ok(())
            }
            None => Err(ResourceError::NotFound),
        }
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let max = self.internal.capabilities.max_texture_dimension_2d;
        if descriptor.size.width > max || descriptor.size.height > max {
            return Err(ResourceError::BackendError(format!(
                "texture '{}' of {}x{} exceeds the {max} texel limit",
                descriptor.label.as_deref().unwrap_or("Unnamed"),
                descriptor.size.width,
                descriptor.size.height
            )));
        }
        let id = TextureId(next_id(&self.internal.next_texture_id));
        lock(&self.internal.textures).insert(
            id,
            HeadlessTexture {
                data: vec![0; descriptor.byte_size() as usize],
                size: descriptor.size,
                format: descriptor.format,
                usage: descriptor.usage,
                writes: 0,
            },
        );
        Ok(id)
    }

    fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError> {
        let mut textures = lock(&self.internal.textures);
        let texture = textures.get_mut(&id).ok_or(ResourceError::NotFound)?;
        if texture.data.len() != data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        texture.data.copy_from_slice(data);
        texture.writes += 1;
        Ok(())
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        lock(&self.internal.textures)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError> {
        if !lock(&self.internal.textures).contains_key(&texture) {
            return Err(ResourceError::NotFound);
        }
        let id = TextureViewId(next_id(&self.internal.next_texture_view_id));
        lock(&self.internal.texture_views).insert(id, texture);
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.internal.texture_views)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let kind = if descriptor.compare.is_some() {
            SamplerBindingType::Comparison
        } else {
            SamplerBindingType::Filtering
        };
        let id = SamplerId(next_id(&self.internal.next_sampler_id));
        lock(&self.internal.samplers).insert(id, kind);
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        lock(&self.internal.samplers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_program(&self, descriptor: &ProgramDescriptor) -> Result<ProgramId, ResourceError> {
        let label = descriptor.label.as_deref().unwrap_or("Unnamed");
        if descriptor.source.trim().is_empty() {
            return Err(ResourceError::BackendError(format!(
                "program '{label}' has no source"
            )));
        }
        for (group, binding) in reflect_bindings(&descriptor.source) {
            let declared = descriptor
                .bind_group_layouts
                .get(group as usize)
                .is_some_and(|entries| entries.iter().any(|e| e.binding == binding));
            if !declared {
                return Err(ResourceError::BackendError(format!(
                    "program '{label}' uses @group({group}) @binding({binding}) without a layout entry"
                )));
            }
        }
        let id = ProgramId(next_id(&self.internal.next_program_id));
        lock(&self.internal.programs).insert(
            id,
            HeadlessProgram {
                layouts: descriptor.bind_group_layouts.clone(),
                topology: descriptor.topology,
                compute_entries: reflect_entry_points(&descriptor.source, "@compute"),
                fragment_entries: reflect_entry_points(&descriptor.source, "@fragment"),
            },
        );
        log::debug!("HeadlessDevice: Created program '{label}' with ID: {id:?}");
        Ok(id)
    }

    fn program_bind_group_layout(
        &self,
        program: ProgramId,
        index: u32,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let entries = {
            let programs = lock(&self.internal.programs);
            let program = programs.get(&program).ok_or(ResourceError::NotFound)?;
            program
                .layouts
                .get(index as usize)
                .cloned()
                .ok_or(ResourceError::OutOfBounds)?
        };
        self.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: None,
            entries: &entries,
        })
    }

    fn destroy_program(&self, id: ProgramId) -> Result<(), ResourceError> {
        lock(&self.internal.programs)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let label = descriptor.label.as_deref().unwrap_or("Unnamed");
        let declared = lock(&self.internal.programs)
            .get(&descriptor.program)
            .ok_or(ResourceError::NotFound)?
            .compute_entries
            .iter()
            .any(|entry| *entry == descriptor.entry_point);
        if !declared {
            return Err(ResourceError::BackendError(format!(
                "compute pipeline '{label}' names '{}', which is not a @compute function",
                descriptor.entry_point
            )));
        }
        let id = ComputePipelineId(next_id(&self.internal.next_compute_pipeline_id));
        lock(&self.internal.compute_pipelines).insert(
            id,
            HeadlessComputePipeline {
                entry_point: descriptor.entry_point.to_string(),
            },
        );
        log::debug!("HeadlessDevice: Created compute pipeline '{label}' with ID: {id:?}");
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        lock(&self.internal.compute_pipelines)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let id = BindGroupLayoutId(next_id(&self.internal.next_layout_id));
        lock(&self.internal.layouts).insert(id, descriptor.entries.to_vec());
        Ok(id)
    }

    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError> {
        lock(&self.internal.layouts)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let layout_entries = lock(&self.internal.layouts)
            .get(&descriptor.layout)
            .cloned()
            .ok_or(ResourceError::InvalidHandle)?;
        if layout_entries.len() != descriptor.entries.len() {
            return Err(ResourceError::BackendError(format!(
                "bind group '{}' has {} entries, layout expects {}",
                descriptor.label.unwrap_or("Unnamed"),
                descriptor.entries.len(),
                layout_entries.len()
            )));
        }
        for layout_entry in &layout_entries {
            let entry = descriptor
                .entries
                .iter()
                .find(|e| e.binding == layout_entry.binding)
                .ok_or_else(|| {
                    ResourceError::BackendError(format!(
                        "bind group '{}' is missing binding {}",
                        descriptor.label.unwrap_or("Unnamed"),
                        layout_entry.binding
                    ))
                })?;
            self.validate_binding(layout_entry, &entry.resource)?;
        }

        let id = BindGroupId(next_id(&self.internal.next_bind_group_id));
        lock(&self.internal.bind_groups).insert(
            id,
            HeadlessBindGroup {
                layout: descriptor.layout,
                entries: descriptor.entries.to_vec(),
                valid: true,
            },
        );
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        lock(&self.internal.bind_groups)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn is_bind_group_valid(&self, id: BindGroupId) -> bool {
        lock(&self.internal.bind_groups)
            .get(&id)
            .is_some_and(|g| g.valid && lock(&self.internal.layouts).contains_key(&g.layout))
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder::new(self.clone(), label))
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) {
        let pending = lock(&self.internal.pending_command_buffers).remove(&command_buffer);
        match pending {
            Some(commands) => {
                self.execute(&commands);
                lock(&self.internal.submitted_command_buffers).push(commands);
            }
            None => log::warn!(
                "HeadlessDevice: Attempted to submit unknown command buffer {command_buffer:?}"
            ),
        }
    }
}
