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

//! Global settings for the rendering core.
//!
//! Settings are plain data with defaults for every field and can be loaded
//! from a RON document:
//!
//! ```
//! use lumen_core::renderer::api::core::RendererConfig;
//!
//! let config = RendererConfig::from_ron_str("(cluster_tiles: (8, 8, 16))").unwrap();
//! assert_eq!(config.cluster_tiles, [8, 8, 16]);
//! assert_eq!(config.max_frames_in_flight, 2);
//! ```

use super::frame::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Settings consumed by the clustering, pooling and pass code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Cluster grid resolution as `[x, y, z]` tiles.
    pub cluster_tiles: [u32; 3],
    /// Upper bound in bytes for one pooled per-instance uniform buffer. The
    /// effective size is further capped by the device binding limit.
    pub max_uniform_pool_bytes: u32,
    /// Number of frames the CPU may record ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Colour the main pass clears to, `None` to load.
    pub clear_color: Option<[f32; 4]>,
    /// Depth the main pass clears to, `None` to load.
    pub clear_depth: Option<f32>,
    /// Stencil the main pass clears to, `None` to load.
    pub clear_stencil: Option<u32>,
    /// A runtime toggle for per-frame render statistics.
    pub enable_gpu_telemetry: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            cluster_tiles: [16, 16, 32],
            max_uniform_pool_bytes: 65_536,
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
            clear_depth: Some(1.0),
            clear_stencil: Some(0),
            enable_gpu_telemetry: true,
        }
    }
}

impl RendererConfig {
    /// Parses a RON document. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::InvalidValue`] for values the renderer cannot use.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            ron::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        log::debug!("Loaded renderer config: {config:?}");
        Ok(config)
    }

    /// Serializes the configuration to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_tiles.contains(&0) {
            return Err(ConfigError::InvalidValue {
                field: "cluster_tiles",
                reason: "tile counts must be non-zero".to_string(),
            });
        }
        if self.max_uniform_pool_bytes < 64 {
            return Err(ConfigError::InvalidValue {
                field: "max_uniform_pool_bytes",
                reason: "must hold at least one 4x4 matrix".to_string(),
            });
        }
        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_frames_in_flight",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RendererConfig::default();
        assert_eq!(config.cluster_tiles, [16, 16, 32]);
        assert_eq!(config.max_uniform_pool_bytes, 65_536);
        assert_eq!(config.max_frames_in_flight, MAX_FRAMES_IN_FLIGHT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config =
            RendererConfig::from_ron_str("(max_uniform_pool_bytes: 256, clear_color: None)")
                .unwrap();
        assert_eq!(config.max_uniform_pool_bytes, 256);
        assert_eq!(config.clear_color, None);
        assert_eq!(config.clear_depth, Some(1.0));
    }

    #[test]
    fn round_trips_through_pretty_ron() {
        let mut config = RendererConfig::default();
        config.cluster_tiles = [4, 4, 8];
        let text = config.to_ron_string().unwrap();
        assert_eq!(RendererConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_malformed_and_invalid_input() {
        assert!(matches!(
            RendererConfig::from_ron_str("(cluster_tiles: "),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RendererConfig::from_ron_str("(cluster_tiles: (0, 16, 32))"),
            Err(ConfigError::InvalidValue {
                field: "cluster_tiles",
                ..
            })
        ));
    }
}
