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

//! Defines the hierarchy of error types for the rendering subsystem.

use std::fmt;

/// An error related to the creation or use of a GPU resource (buffers, textures, etc.).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A generic resource could not be found.
    NotFound,
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// An attempt was made to access a resource out of its bounds (e.g., in a buffer).
    OutOfBounds,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound => write!(f, "Resource not found with ID."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::OutOfBounds => write!(f, "Resource access out of bounds."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// A high-level error that can occur within the rendering system.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A resource-related error occurred.
    Resource(ResourceError),
    /// A new frame was started while too many frames were still in flight.
    TooManyFramesInFlight {
        /// Number of frames submitted but not yet signalled.
        in_flight: u64,
        /// Configured maximum.
        max: u64,
    },
    /// The graphics device was lost (e.g., GPU driver crashed or was updated).
    DeviceLost,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Resource(err) => write!(f, "A graphics resource error occurred: {err}"),
            RenderError::TooManyFramesInFlight { in_flight, max } => write!(
                f,
                "Cannot begin a new frame: {in_flight} frames in flight (max {max})"
            ),
            RenderError::DeviceLost => write!(f, "The graphics device was lost."),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Resource(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::Resource(err)
    }
}

/// An error raised while loading renderer configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The configuration text could not be parsed.
    Parse(String),
    /// A value was parsed but is outside its allowed range.
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse renderer config: {msg}"),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid renderer config value for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
