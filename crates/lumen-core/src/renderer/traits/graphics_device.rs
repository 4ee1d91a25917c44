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

use crate::renderer::api::*;
use crate::renderer::error::ResourceError;
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The main interface for creating and managing GPU resources.
///
/// Implementations are expected to be cheap to share (`Send + Sync`) and to
/// validate handles: every method taking an id fails with
/// [`ResourceError::NotFound`] when the id does not name a live resource.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// What the device supports.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - The buffer configuration.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Writes data to a GPU buffer.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If `offset + data.len()` exceeds the buffer size.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Creates a new texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Replaces the whole contents of mip level 0 of a texture.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If `data` does not match the texture size.
    fn write_texture(&self, id: TextureId, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a default view covering the whole texture.
    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError>;

    /// Compiles a shader program.
    fn create_program(&self, descriptor: &ProgramDescriptor) -> Result<ProgramId, ResourceError>;

    /// Returns the layout of `@group(index)` of a compiled program.
    ///
    /// The layout is owned by the caller and stays valid after the program
    /// is destroyed.
    fn program_bind_group_layout(
        &self,
        program: ProgramId,
        index: u32,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Destroys a shader program.
    fn destroy_program(&self, id: ProgramId) -> Result<(), ResourceError>;

    /// Creates a compute pipeline from a `@compute` entry point of `program`.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a bind group layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Destroys a bind group layout.
    fn destroy_bind_group_layout(&self, id: BindGroupLayoutId) -> Result<(), ResourceError>;

    /// Creates a bind group conforming to `descriptor.layout`.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Returns `false` once a bind group was destroyed or invalidated by a
    /// device loss.
    fn is_bind_group_valid(&self, id: BindGroupId) -> bool;

    /// Creates a new command encoder to record GPU commands.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a command buffer to the GPU queue for execution.
    fn submit_command_buffer(&self, command_buffer: CommandBufferId);
}
