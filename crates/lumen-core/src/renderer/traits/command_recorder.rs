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

use crate::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId, FrontFace,
    IndexFormat, ProgramId, RenderPassDescriptor, TextureId,
};
use std::any::Any;
use std::ops::Range;

/// A trait representing an active render pass, used for recording drawing commands.
///
/// A `RenderPass` object is obtained from a [`CommandEncoder`]. Dropping it
/// ends the pass.
pub trait RenderPass {
    /// Sets the active program for subsequent draw calls.
    fn set_pipeline(&mut self, program: ProgramId);

    /// Binds a bind group at `index`.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Changes the winding that counts as front-facing.
    fn set_front_face(&mut self, front_face: FrontFace);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
}

/// A trait representing an active compute pass, used for recording dispatch commands.
///
/// Dropping it ends the pass.
pub trait ComputePass {
    /// Sets the active compute pipeline for subsequent dispatches.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds a bind group at `index`.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]);

    /// Runs `x * y * z` workgroups of the active pipeline.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);
}

/// A trait for an object that records a sequence of GPU commands.
///
/// Render and compute passes run in the order they were recorded once the
/// finished command buffer is submitted.
pub trait CommandEncoder {
    /// Begins a new render pass.
    ///
    /// The returned pass borrows the encoder mutably, so only one pass can
    /// be active at a time.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder>;

    /// Begins a new compute pass.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder>;

    /// Records a command zeroing every texel of a texture.
    fn clear_texture(&mut self, texture: TextureId);

    /// Finalizes the command recording and returns a handle to the resulting command buffer.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
