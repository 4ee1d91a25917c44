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

//! Device capabilities queried by the hot path.

/// A backend-agnostic representation of a graphics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GraphicsBackendType {
    /// Vulkan API.
    #[default]
    Vulkan,
    /// Apple's Metal API.
    Metal,
    /// Microsoft's DirectX 12 API.
    Dx12,
    /// WebGPU API (for web builds).
    WebGpu,
    /// OpenGL / OpenGL ES.
    OpenGL,
    /// WebGL 2.
    WebGl2,
}

impl GraphicsBackendType {
    /// Returns `true` for the GL family, whose texture formats and binding
    /// limits are the most restrictive.
    pub const fn is_gl_family(&self) -> bool {
        matches!(self, GraphicsBackendType::OpenGL | GraphicsBackendType::WebGl2)
    }
}

/// What the device can do, as far as the rendering core cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// The active backend.
    pub backend: GraphicsBackendType,
    /// Maximum size in bytes of a uniform buffer binding.
    pub max_uniform_buffer_binding_size: u32,
    /// Maximum width or height of a 2D texture.
    pub max_texture_dimension_2d: u32,
    /// Whether `Rgba32Uint` textures can be sampled.
    pub supports_integer_textures: bool,
    /// Whether render targets are stored upside down, so lanes must flip
    /// their output and the front-face winding with it.
    pub render_target_flipped_y: bool,
}

impl DeviceCapabilities {
    /// Capabilities of a desktop-class backend.
    pub const fn full() -> Self {
        Self {
            backend: GraphicsBackendType::Vulkan,
            max_uniform_buffer_binding_size: 65_536,
            max_texture_dimension_2d: 8192,
            supports_integer_textures: true,
            render_target_flipped_y: false,
        }
    }

    /// Capabilities of a WebGL2-class backend.
    pub const fn limited() -> Self {
        Self {
            backend: GraphicsBackendType::WebGl2,
            max_uniform_buffer_binding_size: 16_384,
            max_texture_dimension_2d: 2048,
            supports_integer_textures: false,
            render_target_flipped_y: true,
        }
    }

    /// Returns `true` if the clustered light index must use the float
    /// packing instead of integer textures.
    pub const fn is_limited(&self) -> bool {
        self.backend.is_gl_family() || !self.supports_integer_textures
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::full()
    }
}
