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

//! GPU resource handles and their descriptors.

use crate::lumen_bitflags;
use std::borrow::Cow;

lumen_bitflags! {
    /// A set of flags describing the allowed usages of a [`BufferId`].
    pub struct BufferUsage: u32 {
        /// The buffer can be the destination of a CPU write or copy.
        const COPY_DST = 1 << 0;
        /// The buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 1;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 2;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 3;
        /// The buffer can be bound as a storage buffer.
        const STORAGE = 1 << 4;
    }
}

lumen_bitflags! {
    /// A set of flags describing the allowed usages of a [`TextureId`].
    pub struct TextureUsage: u32 {
        /// The texture can be the destination of a CPU write or copy.
        const COPY_DST = 1 << 0;
        /// The texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 1;
        /// The texture can be a render pass attachment.
        const RENDER_ATTACHMENT = 1 << 2;
        /// The texture can be written as a storage texture.
        const STORAGE_BINDING = 1 << 3;
    }
}

/// An opaque handle to a GPU buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// An opaque handle to a GPU texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// An opaque handle to a view onto a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureViewId(pub usize);

/// An opaque handle to a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub usize);

/// A descriptor used to create a [`BufferId`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// How the buffer will be used.
    pub usage: BufferUsage,
}

/// The size of a texture in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth or array layer count.
    pub depth_or_array_layers: u32,
}

impl Extent3d {
    /// A single-layer 2D extent.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }
}

/// Texel formats understood by the rendering core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Four 32-bit float channels.
    Rgba32Float,
    /// Four 32-bit unsigned integer channels.
    Rgba32Uint,
    /// Four 8-bit normalized channels.
    Rgba8Unorm,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Size of one texel in bytes.
    pub const fn bytes_per_texel(&self) -> u32 {
        match self {
            TextureFormat::Rgba32Float | TextureFormat::Rgba32Uint => 16,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
        }
    }

    /// Returns `true` for depth(-stencil) formats.
    pub const fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }
}

/// A descriptor used to create a [`TextureId`].
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label for the texture.
    pub label: Option<Cow<'a, str>>,
    /// Dimensions of the texture.
    pub size: Extent3d,
    /// Texel format.
    pub format: TextureFormat,
    /// How the texture will be used.
    pub usage: TextureUsage,
}

impl TextureDescriptor<'_> {
    /// Number of bytes needed to hold the whole texture.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.size.width)
            * u64::from(self.size.height)
            * u64::from(self.size.depth_or_array_layers)
            * u64::from(self.format.bytes_per_texel())
    }
}

/// The width of the elements in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

/// Comparison function of a depth comparison sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    /// Passes if the reference is less than or equal to the stored value.
    LessEqual,
    /// Passes if the reference is greater than the stored value.
    Greater,
}

/// A descriptor used to create a [`SamplerId`].
#[derive(Debug, Clone, Default)]
pub struct SamplerDescriptor<'a> {
    /// An optional debug label for the sampler.
    pub label: Option<Cow<'a, str>>,
    /// Linear filtering instead of nearest.
    pub linear: bool,
    /// Makes this a depth comparison sampler.
    pub compare: Option<CompareFunction>,
}
