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

//! WGSL declarations of the global bind group.
//!
//! Every snippet declares its `@group(0)` bindings plus a `*_touch` function
//! touching them, so a program assembled from snippets keeps every binding
//! alive through reflection.
//!
//! | Binding | Snippet                                        |
//! |---------|------------------------------------------------|
//! | 0       | [`CAMERA_WGSL`]                                |
//! | 1..=3   | [`CLUSTERS_UINT_WGSL`] / [`CLUSTERS_FLOAT_WGSL`] |
//! | 4       | [`FOG_WGSL`]                                   |
//! | 5, 6    | [`ENVIRONMENT_WGSL`]                           |
//! | 7, 8    | [`SHADOW_WGSL`]                                |
//!
//! The cluster culling programs are standalone: [`CLUSTER_CULL_WGSL`] followed
//! by [`CULL_CLUSTERS_COMPUTE_WGSL`] or [`CULL_CLUSTERS_POINTS_WGSL`].

/// Camera uniform block.
pub const CAMERA_WGSL: &str = include_str!("camera.wgsl");

/// Clustered lights with an `Rgba32Uint` index texture and a storage light
/// buffer.
pub const CLUSTERS_UINT_WGSL: &str = include_str!("clusters_uint.wgsl");

/// Clustered lights for limited backends: `Rgba32Float` index texture and a
/// uniform light buffer.
pub const CLUSTERS_FLOAT_WGSL: &str = include_str!("clusters_float.wgsl");

/// Distance fog.
pub const FOG_WGSL: &str = include_str!("fog.wgsl");

/// Equirectangular environment map.
pub const ENVIRONMENT_WGSL: &str = include_str!("environment.wgsl");

/// Shadow map with a comparison sampler.
pub const SHADOW_WGSL: &str = include_str!("shadow.wgsl");

/// Cell bounds and the light/cell overlap test shared by both culling
/// programs.
pub const CLUSTER_CULL_WGSL: &str = include_str!("cluster_cull.wgsl");

/// `@compute` culling into an `Rgba32Uint` storage texture.
pub const CULL_CLUSTERS_COMPUTE_WGSL: &str = include_str!("cull_clusters_compute.wgsl");

/// Point-list culling into an `Rgba32Float` colour target.
pub const CULL_CLUSTERS_POINTS_WGSL: &str = include_str!("cull_clusters_points.wgsl");
