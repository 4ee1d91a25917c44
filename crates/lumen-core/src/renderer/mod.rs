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

//! Provides the public, backend-agnostic rendering contracts.
//!
//! This module defines the "common language" shared by the hot path and the
//! backends: the abstract `traits` (like [`GraphicsDevice`]), the resource
//! descriptors, the scene-facing data (lights, cameras, drawables) and the
//! error types. Concrete backends live in `lumen-infra`; `lumen-lanes` drives
//! them through these traits only.

pub mod api;
pub mod camera;
pub mod drawable;
pub mod error;
pub mod light;
pub mod traits;

// Re-export the most important traits and types for easier use.
pub use self::api::*;
pub use self::camera::{CameraUniform, CameraView, Viewport};
pub use self::drawable::{
    Drawable, DrawableId, DrawableKind, GpuGeometry, InstanceSignature, MaterialBinding,
    MeshDrawable, SkeletonId, SkinnedMeshDrawable,
};
pub use self::error::{ConfigError, RenderError, ResourceError};
pub use self::light::{Light, LightId, LightKind, LightRecord, MAX_CLUSTERED_LIGHTS};
pub use self::traits::{CommandEncoder, ComputePass, GraphicsDevice, RenderPass};
