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

//! Error type of the lanes.

use lumen_core::renderer::{RenderError, ResourceError};
use thiserror::Error;

/// Errors raised while preparing or recording a lane.
#[derive(Debug, Error)]
pub enum LaneError {
    /// A GPU resource could not be created, written or found.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Frame pacing or device failure.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// The cluster grid configuration cannot be realised on this device.
    #[error("invalid cluster grid configuration: {0}")]
    ClusterConfig(String),

    /// A drawable's instance record does not fit in one pooled buffer.
    #[error("instance stride of {stride} floats exceeds the pooled buffer capacity of {capacity} floats")]
    InstanceStrideTooLarge {
        /// Floats per instance record.
        stride: usize,
        /// Floats per pooled buffer.
        capacity: usize,
    },

    /// A lane was asked to cull without a camera.
    #[error("lane '{lane}' has no camera to cull with; the pass only cleared its targets")]
    MissingCamera {
        /// Strategy name of the lane.
        lane: &'static str,
    },

    /// The external scene culler failed.
    #[error("scene culling failed: {0}")]
    Culling(#[from] anyhow::Error),
}

impl LaneError {
    /// Recovers a [`LaneError`] raised inside a scene culler, wrapping
    /// anything else as [`LaneError::Culling`].
    pub fn from_culler(error: anyhow::Error) -> Self {
        match error.downcast::<LaneError>() {
            Ok(lane) => lane,
            Err(other) => LaneError::Culling(other),
        }
    }
}
