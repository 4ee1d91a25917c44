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

//! # Lumen Lanes
//!
//! The hot path of the per-frame rendering core.
//!
//! - [`render_lane::ClusterGrid`] bins punctual lights into a view-space
//!   froxel grid and uploads a per-cell light index texture.
//! - [`render_lane::RenderQueue`] collects the drawables and lights of one
//!   camera, batching identical drawables into instanced draws backed by the
//!   [`render_lane::UniformBufferPool`].
//! - [`render_lane::RenderLane`] drives a render pass over a queue, with
//!   lane-wide resources bound through the content-addressed
//!   [`render_lane::GlobalBindGroupCache`].

#![warn(missing_docs)]

pub mod error;
pub mod render_lane;

pub use error::LaneError;
