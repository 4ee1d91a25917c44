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

//! Bind groups, bind group layouts, compute pipelines and pass descriptors.
//!
//! Bind groups are the mechanism for binding resources (buffers, textures,
//! samplers) to shaders. Render pass descriptors describe the attachments a
//! [`RenderPass`](crate::renderer::traits::RenderPass) writes to and how they
//! are cleared.

use crate::lumen_bitflags;
use crate::math::LinearRgba;
use crate::renderer::api::pipeline::ProgramId;
use crate::renderer::api::resource::{BufferId, SamplerId, TextureFormat, TextureViewId};
use std::borrow::Cow;

lumen_bitflags! {
    /// Which shader stages can access a resource binding.
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Vertex and fragment stages.
        const VERTEX_FRAGMENT = (1 << 0) | (1 << 1);
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

/// An opaque handle to a bind group layout resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupLayoutId(pub usize);

/// An opaque handle to a bind group resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindGroupId(pub usize);

/// An opaque handle to a finished, submittable command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub usize);

/// The sample type of a texture binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleType {
    /// A floating-point texture.
    Float {
        /// Whether the texture can be filtered.
        filterable: bool,
    },
    /// An unsigned integer texture.
    Uint,
    /// A depth texture.
    Depth,
}

/// The type of sampler binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBindingType {
    /// A filtering sampler.
    Filtering,
    /// A depth comparison sampler.
    Comparison,
}

/// The type of resource bound at a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// A uniform buffer.
    UniformBuffer,
    /// A read-only storage buffer.
    StorageBuffer,
    /// A write-only 2D storage texture of the given format.
    StorageTexture(TextureFormat),
    /// A sampled 2D texture.
    Texture(TextureSampleType),
    /// A sampler.
    Sampler(SamplerBindingType),
}

/// Describes a single binding entry in a bind group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// The binding index (`@binding(n)` in WGSL).
    pub binding: u32,
    /// Which shader stages can access this binding.
    pub visibility: ShaderStageFlags,
    /// The type of resource being bound.
    pub ty: BindingType,
}

impl BindGroupLayoutEntry {
    /// A uniform buffer entry.
    pub const fn uniform(binding: u32, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::UniformBuffer,
        }
    }

    /// A read-only storage buffer entry.
    pub const fn storage_buffer(binding: u32, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::StorageBuffer,
        }
    }

    /// A write-only storage texture entry.
    pub const fn storage_texture(
        binding: u32,
        visibility: ShaderStageFlags,
        format: TextureFormat,
    ) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::StorageTexture(format),
        }
    }

    /// A texture entry.
    pub const fn texture(
        binding: u32,
        visibility: ShaderStageFlags,
        sample_type: TextureSampleType,
    ) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Texture(sample_type),
        }
    }

    /// A sampler entry.
    pub const fn sampler(
        binding: u32,
        visibility: ShaderStageFlags,
        ty: SamplerBindingType,
    ) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Sampler(ty),
        }
    }
}

/// Describes a bind group layout to be created.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<&'a str>,
    /// The entries in this bind group layout.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// A range of a buffer bound to a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    /// The bound buffer.
    pub buffer: BufferId,
    /// Offset in bytes from the start of the buffer.
    pub offset: u64,
    /// Size in bytes, or `None` for the rest of the buffer.
    pub size: Option<u64>,
}

impl BufferBinding {
    /// Binds the whole buffer.
    pub const fn whole(buffer: BufferId) -> Self {
        Self {
            buffer,
            offset: 0,
            size: None,
        }
    }
}

/// The concrete resource bound at a binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    /// A buffer range.
    Buffer(BufferBinding),
    /// A texture view.
    TextureView(TextureViewId),
    /// A sampler.
    Sampler(SamplerId),
}

/// A single entry of a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupEntry {
    /// The binding index this resource is attached to.
    pub binding: u32,
    /// The bound resource.
    pub resource: BindingResource,
}

/// Describes a bind group to be created.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// Optional debug label.
    pub label: Option<&'a str>,
    /// The layout this bind group conforms to.
    pub layout: BindGroupLayoutId,
    /// The bound resources.
    pub entries: &'a [BindGroupEntry],
}

/// An opaque handle to a compiled compute pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputePipelineId(pub usize);

/// A descriptor used to create a [`ComputePipelineId`].
///
/// The bind group layouts of the pipeline are the ones of `program`.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label for the compute pipeline.
    pub label: Option<Cow<'a, str>>,
    /// The compiled program holding the compute entry point.
    pub program: ProgramId,
    /// The name of the `@compute` function.
    pub entry_point: Cow<'a, str>,
}

/// A descriptor for a compute pass.
#[derive(Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    /// An optional debug label for the compute pass.
    pub label: Option<&'a str>,
}

/// Describes the operation to perform on an attachment at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment are kept.
    Load,
    /// The attachment is cleared to the specified value.
    Clear(V),
}

impl<V> LoadOp<V> {
    /// `Clear(v)` for `Some(v)`, `Load` for `None`.
    pub fn from_clear(value: Option<V>) -> Self {
        match value {
            Some(v) => LoadOp::Clear(v),
            None => LoadOp::Load,
        }
    }
}

/// Describes the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results are stored.
    Store,
    /// The results are discarded.
    Discard,
}

/// Load and store operations for a single attachment aspect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

/// A colour attachment for a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassColorAttachment {
    /// The view rendered to.
    pub view: TextureViewId,
    /// Load and store operations.
    pub ops: Operations<LinearRgba>,
}

/// A depth/stencil attachment for a render pass.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDepthStencilAttachment {
    /// The depth/stencil view.
    pub view: TextureViewId,
    /// Operations for the depth aspect.
    pub depth_ops: Option<Operations<f32>>,
    /// Operations for the stencil aspect.
    pub stencil_ops: Option<Operations<u32>>,
}

/// A descriptor for a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// Colour attachments written by the pass.
    pub color_attachments: &'a [RenderPassColorAttachment],
    /// An optional depth/stencil attachment.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment>,
}
