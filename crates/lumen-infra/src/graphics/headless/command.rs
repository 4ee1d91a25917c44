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

use lumen_core::math::LinearRgba;
use lumen_core::renderer::api::{
    BindGroupId, BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId, FrontFace,
    IndexFormat, LoadOp, ProgramId, RenderPassDescriptor, TextureId, TextureViewId,
};
use lumen_core::renderer::traits::{CommandEncoder, ComputePass, RenderPass};
use std::any::Any;
use std::ops::Range;

use super::device::HeadlessDevice;

/// A single command captured by the headless backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A render pass started.
    BeginRenderPass {
        /// Label of the pass.
        label: Option<String>,
        /// View of each colour attachment.
        color_targets: Vec<TextureViewId>,
        /// Load operation of each colour attachment.
        color_loads: Vec<LoadOp<LinearRgba>>,
        /// Load operation of the depth aspect, if attached.
        depth_load: Option<LoadOp<f32>>,
        /// Load operation of the stencil aspect, if attached.
        stencil_load: Option<LoadOp<u32>>,
    },
    /// `set_pipeline`.
    SetPipeline(ProgramId),
    /// `set_bind_group`.
    SetBindGroup {
        /// Group index.
        index: u32,
        /// Bound group.
        bind_group: BindGroupId,
    },
    /// `set_vertex_buffer`.
    SetVertexBuffer {
        /// Vertex slot.
        slot: u32,
        /// Bound buffer.
        buffer: BufferId,
    },
    /// `set_index_buffer`.
    SetIndexBuffer {
        /// Bound buffer.
        buffer: BufferId,
        /// Index width.
        format: IndexFormat,
    },
    /// `set_front_face`.
    SetFrontFace(FrontFace),
    /// A non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// The render pass ended.
    EndRenderPass,
    /// A compute pass started.
    BeginComputePass {
        /// Label of the pass.
        label: Option<String>,
    },
    /// `set_pipeline` inside a compute pass.
    SetComputePipeline(ComputePipelineId),
    /// `dispatch_workgroups`.
    DispatchWorkgroups {
        /// Workgroups along X.
        x: u32,
        /// Workgroups along Y.
        y: u32,
        /// Workgroups along Z.
        z: u32,
    },
    /// The compute pass ended.
    EndComputePass,
    /// Every texel of a texture was zeroed.
    ClearTexture(TextureId),
}

impl RecordedCommand {
    /// Number of workgroups of a dispatch, `None` for other commands.
    pub fn workgroup_count(&self) -> Option<u64> {
        match self {
            RecordedCommand::DispatchWorkgroups { x, y, z } => {
                Some(u64::from(*x) * u64::from(*y) * u64::from(*z))
            }
            _ => None,
        }
    }

    /// Instance count of a draw command, `None` for other commands.
    pub fn instance_count(&self) -> Option<u32> {
        match self {
            RecordedCommand::Draw { instances, .. }
            | RecordedCommand::DrawIndexed { instances, .. } => Some(instances.len() as u32),
            _ => None,
        }
    }
}

/// A render pass recording into its encoder's command list.
pub struct HeadlessRenderPass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl RenderPass for HeadlessRenderPass<'_> {
    fn set_pipeline(&mut self, program: ProgramId) {
        self.commands.push(RecordedCommand::SetPipeline(program));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, _offsets: &[u32]) {
        self.commands
            .push(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.commands
            .push(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, index_format: IndexFormat) {
        self.commands.push(RecordedCommand::SetIndexBuffer {
            buffer,
            format: index_format,
        });
    }

    fn set_front_face(&mut self, front_face: FrontFace) {
        self.commands.push(RecordedCommand::SetFrontFace(front_face));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::DrawIndexed { indices, instances });
    }
}

impl Drop for HeadlessRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }
}

/// A compute pass recording into its encoder's command list.
pub struct HeadlessComputePass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl ComputePass for HeadlessComputePass<'_> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.commands
            .push(RecordedCommand::SetComputePipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, _offsets: &[u32]) {
        self.commands
            .push(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.commands
            .push(RecordedCommand::DispatchWorkgroups { x, y, z });
    }
}

impl Drop for HeadlessComputePass<'_> {
    fn drop(&mut self) {
        self.commands.push(RecordedCommand::EndComputePass);
    }
}

/// A command encoder for the [`HeadlessDevice`].
pub struct HeadlessCommandEncoder {
    device: HeadlessDevice,
    label: Option<String>,
    commands: Vec<RecordedCommand>,
}

impl HeadlessCommandEncoder {
    pub(crate) fn new(device: HeadlessDevice, label: Option<&str>) -> Self {
        Self {
            device,
            label: label.map(str::to_owned),
            commands: Vec::new(),
        }
    }

    /// Label the encoder was created with.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        let depth_stencil = descriptor.depth_stencil_attachment.as_ref();
        self.commands.push(RecordedCommand::BeginRenderPass {
            label: descriptor.label.map(str::to_owned),
            color_targets: descriptor
                .color_attachments
                .iter()
                .map(|attachment| attachment.view)
                .collect(),
            color_loads: descriptor
                .color_attachments
                .iter()
                .map(|attachment| attachment.ops.load)
                .collect(),
            depth_load: depth_stencil.and_then(|ds| ds.depth_ops.map(|ops| ops.load)),
            stencil_load: depth_stencil.and_then(|ds| ds.stencil_ops.map(|ops| ops.load)),
        });
        Box::new(HeadlessRenderPass {
            commands: &mut self.commands,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder> {
        self.commands.push(RecordedCommand::BeginComputePass {
            label: descriptor.label.map(str::to_owned),
        });
        Box::new(HeadlessComputePass {
            commands: &mut self.commands,
        })
    }

    fn clear_texture(&mut self, texture: TextureId) {
        self.commands.push(RecordedCommand::ClearTexture(texture));
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let encoder = *self;
        encoder.device.register_command_buffer(encoder.commands)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
