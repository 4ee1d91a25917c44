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

//! Content-addressed cache of the global (`@group(0)`) bind group.
//!
//! What a lane binds at group 0 depends on which features are active: the
//! cluster index format, fog, an environment map, a shadow map. A
//! [`GlobalBindGroupKey`] captures that combination. On a miss the cache
//! assembles a throwaway program declaring exactly those bindings, extracts
//! its group 0 layout, destroys the program and creates the bind group.

use std::borrow::Cow;

use ahash::AHashMap;
use lumen_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutEntry, BindGroupLayoutId,
    BindingResource, BindingType, BufferBinding, BufferId, PrimitiveTopology, ProgramDescriptor,
    RenderStats,
    SamplerBindingType, SamplerId, ShaderStageFlags, TextureSampleType, TextureViewId,
    GLOBAL_BIND_GROUP,
};
use lumen_core::renderer::{GraphicsDevice, ResourceError};

use super::cluster_grid::ClusterIndexFormat;
use super::shaders;
use crate::LaneError;

/// Distance fog applied by the lit lanes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FogMode {
    /// No fog, nothing bound.
    #[default]
    Off,
    /// Linear ramp between a start and an end distance.
    Linear,
    /// `exp(-density * d)`.
    Exponential,
    /// `exp(-(density * d)^2)`.
    ExponentialSquared,
}

impl FogMode {
    /// Whether a fog uniform is bound.
    pub const fn is_enabled(self) -> bool {
        !matches!(self, FogMode::Off)
    }

    /// The mode value read by the fog shader.
    pub const fn shader_code(self) -> u8 {
        match self {
            FogMode::Off => 0,
            FogMode::Linear => 1,
            FogMode::Exponential => 2,
            FogMode::ExponentialSquared => 3,
        }
    }
}

/// An environment map and its filtering sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvironmentMapBinding {
    /// The equirectangular texture view.
    pub view: TextureViewId,
    /// A filtering sampler.
    pub sampler: SamplerId,
}

/// A shadow map and its comparison sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowMapBinding {
    /// The depth texture view.
    pub view: TextureViewId,
    /// A comparison sampler.
    pub sampler: SamplerId,
}

/// Which resources a lane binds at group 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalBindGroupKey {
    /// Strategy name of the lane.
    pub lane: &'static str,
    /// Clustered lighting, with the index packing in use.
    pub clusters: Option<ClusterIndexFormat>,
    /// Fog mode.
    pub fog: FogMode,
    /// Active environment map.
    pub environment_map: Option<EnvironmentMapBinding>,
    /// Active shadow map.
    pub shadow_map: Option<ShadowMapBinding>,
}

impl GlobalBindGroupKey {
    /// A key binding only the camera.
    pub fn camera_only(lane: &'static str) -> Self {
        Self {
            lane,
            clusters: None,
            fog: FogMode::Off,
            environment_map: None,
            shadow_map: None,
        }
    }

    /// A 64-bit digest of the key, stable across runs.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.lane.as_bytes());
        hasher.update(&[0xff]);
        hasher.update(&[match self.clusters {
            None => 0,
            Some(ClusterIndexFormat::PackedFloat) => 1,
            Some(ClusterIndexFormat::PackedUint) => 2,
        }]);
        hasher.update(&[self.fog.shader_code()]);
        for binding in [
            self.environment_map.map(|e| (e.view, e.sampler)),
            self.shadow_map.map(|s| (s.view, s.sampler)),
        ] {
            match binding {
                Some((view, sampler)) => {
                    hasher.update(&[1]);
                    hasher.update(&(view.0 as u64).to_le_bytes());
                    hasher.update(&(sampler.0 as u64).to_le_bytes());
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        let mut digest = [0u8; 8];
        digest.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        u64::from_le_bytes(digest)
    }

    /// Debug label of the bind group.
    pub fn label(&self) -> String {
        format!("Global Bindings [{}] {:016x}", self.lane, self.stable_hash())
    }

    /// The group 0 layout this key requires, ordered by binding.
    pub fn layout_entries(&self) -> Vec<BindGroupLayoutEntry> {
        let fragment = ShaderStageFlags::FRAGMENT;
        let mut entries = vec![BindGroupLayoutEntry::uniform(
            0,
            ShaderStageFlags::VERTEX_FRAGMENT,
        )];
        if let Some(format) = self.clusters {
            let light_buffer = match format {
                ClusterIndexFormat::PackedFloat => BindingType::UniformBuffer,
                ClusterIndexFormat::PackedUint => BindingType::StorageBuffer,
            };
            entries.push(BindGroupLayoutEntry {
                binding: 1,
                visibility: fragment,
                ty: light_buffer,
            });
            entries.push(BindGroupLayoutEntry::uniform(2, fragment));
            entries.push(BindGroupLayoutEntry::texture(
                3,
                fragment,
                format.sample_type(),
            ));
        }
        if self.fog.is_enabled() {
            entries.push(BindGroupLayoutEntry::uniform(4, fragment));
        }
        if self.environment_map.is_some() {
            entries.push(BindGroupLayoutEntry::texture(
                5,
                fragment,
                TextureSampleType::Float { filterable: true },
            ));
            entries.push(BindGroupLayoutEntry::sampler(
                6,
                fragment,
                SamplerBindingType::Filtering,
            ));
        }
        if self.shadow_map.is_some() {
            entries.push(BindGroupLayoutEntry::texture(
                7,
                fragment,
                TextureSampleType::Depth,
            ));
            entries.push(BindGroupLayoutEntry::sampler(
                8,
                fragment,
                SamplerBindingType::Comparison,
            ));
        }
        entries
    }

    /// WGSL of the layout program: the snippets this key needs and an entry
    /// point touching each of them.
    pub fn shader_source(&self) -> String {
        let mut source = String::from(shaders::CAMERA_WGSL);
        let mut touches = vec!["camera_touch()"];
        match self.clusters {
            Some(ClusterIndexFormat::PackedUint) => source.push_str(shaders::CLUSTERS_UINT_WGSL),
            Some(ClusterIndexFormat::PackedFloat) => {
                source.push_str(shaders::CLUSTERS_FLOAT_WGSL)
            }
            None => {}
        }
        if self.clusters.is_some() {
            touches.push("clusters_touch()");
        }
        if self.fog.is_enabled() {
            source.push_str(shaders::FOG_WGSL);
            touches.push("fog_touch()");
        }
        if self.environment_map.is_some() {
            source.push_str(shaders::ENVIRONMENT_WGSL);
            touches.push("environment_touch()");
        }
        if self.shadow_map.is_some() {
            source.push_str(shaders::SHADOW_WGSL);
            touches.push("shadow_touch()");
        }
        source.push_str(&format!(
            "\n@vertex\nfn vs_main() -> @builtin(position) vec4<f32> {{\n    return vec4<f32>({}, 0.0, 0.0, 1.0);\n}}\n",
            touches.join(" + ")
        ));
        source
    }
}

/// Cluster grid resources bound at bindings 1 to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterBindings {
    /// Light record buffer.
    pub light_buffer: BufferId,
    /// Cluster uniform buffer.
    pub uniform_buffer: BufferId,
    /// Index texture view.
    pub index_view: TextureViewId,
}

/// The buffers a lane owns for group 0. Texture bindings come from the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalResources {
    /// Camera uniform buffer.
    pub camera_buffer: BufferId,
    /// Cluster grid resources.
    pub clusters: Option<ClusterBindings>,
    /// Fog uniform buffer.
    pub fog_buffer: Option<BufferId>,
}

impl GlobalResources {
    fn bind_group_entries(
        &self,
        key: &GlobalBindGroupKey,
    ) -> Result<Vec<BindGroupEntry>, ResourceError> {
        let buffer = |binding, buffer| BindGroupEntry {
            binding,
            resource: BindingResource::Buffer(BufferBinding::whole(buffer)),
        };
        let mut entries = vec![buffer(0, self.camera_buffer)];
        if key.clusters.is_some() {
            let clusters = self.clusters.ok_or(ResourceError::InvalidHandle)?;
            entries.push(buffer(1, clusters.light_buffer));
            entries.push(buffer(2, clusters.uniform_buffer));
            entries.push(BindGroupEntry {
                binding: 3,
                resource: BindingResource::TextureView(clusters.index_view),
            });
        }
        if key.fog.is_enabled() {
            entries.push(buffer(4, self.fog_buffer.ok_or(ResourceError::InvalidHandle)?));
        }
        for (first, binding) in [
            (5, key.environment_map.map(|e| (e.view, e.sampler))),
            (7, key.shadow_map.map(|s| (s.view, s.sampler))),
        ] {
            if let Some((view, sampler)) = binding {
                entries.push(BindGroupEntry {
                    binding: first,
                    resource: BindingResource::TextureView(view),
                });
                entries.push(BindGroupEntry {
                    binding: first + 1,
                    resource: BindingResource::Sampler(sampler),
                });
            }
        }
        Ok(entries)
    }
}

/// Hit, miss and reload counts of a [`GlobalBindGroupCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    /// Lookups served from the cache.
    pub hits: u32,
    /// Lookups that built a new bind group.
    pub misses: u32,
    /// Cached bind groups rebuilt because the device invalidated them.
    pub reloads: u32,
}

#[derive(Debug, Clone, Copy)]
struct CachedBindGroup {
    bind_group: BindGroupId,
    layout: BindGroupLayoutId,
}

/// Global bind groups of one lane, keyed by the features they bind.
#[derive(Debug, Default)]
pub struct GlobalBindGroupCache {
    entries: AHashMap<GlobalBindGroupKey, CachedBindGroup>,
    totals: CacheCounters,
    pending: CacheCounters,
}

impl GlobalBindGroupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bind group for `key`, building it on a miss and
    /// rebuilding it if the device no longer considers it valid.
    ///
    /// # Errors
    ///
    /// [`LaneError::Resource`] if `resources` lacks a buffer the key needs
    /// or if the device rejects the program, layout or bind group.
    pub fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        key: &GlobalBindGroupKey,
        resources: &GlobalResources,
    ) -> Result<BindGroupId, LaneError> {
        let reload = match self.entries.get(key).copied() {
            Some(cached) if device.is_bind_group_valid(cached.bind_group) => {
                self.count(|c| c.hits += 1);
                return Ok(cached.bind_group);
            }
            stale => stale,
        };

        if let Some(stale) = reload {
            log::debug!("GlobalBindGroupCache: Reloading invalidated '{}'", key.label());
            self.entries.remove(key);
            release(device, stale, log::Level::Debug);
        }

        let cached = build(device, key, resources)?;
        self.entries.insert(*key, cached);
        if reload.is_some() {
            self.count(|c| c.reloads += 1);
        } else {
            log::debug!("GlobalBindGroupCache: Created '{}'", key.label());
            self.count(|c| c.misses += 1);
        }
        Ok(cached.bind_group)
    }

    fn count(&mut self, bump: impl Fn(&mut CacheCounters)) {
        bump(&mut self.totals);
        bump(&mut self.pending);
    }

    /// Counters since the cache was created.
    pub fn counters(&self) -> CacheCounters {
        self.totals
    }

    /// Adds the counters accumulated since the last report into `stats`.
    pub fn report(&mut self, stats: &mut RenderStats) {
        let pending = std::mem::take(&mut self.pending);
        stats.bind_group_cache_hits += pending.hits;
        stats.bind_group_cache_misses += pending.misses;
        stats.bind_group_cache_reloads += pending.reloads;
    }

    /// Number of cached bind groups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroys every cached bind group and layout.
    pub fn dispose(&mut self, device: &dyn GraphicsDevice) {
        for (_, cached) in self.entries.drain() {
            release(device, cached, log::Level::Warn);
        }
    }
}

fn build(
    device: &dyn GraphicsDevice,
    key: &GlobalBindGroupKey,
    resources: &GlobalResources,
) -> Result<CachedBindGroup, LaneError> {
    let entries = resources.bind_group_entries(key)?;
    let label = key.label();

    let program = device.create_program(&ProgramDescriptor {
        label: Some(Cow::Owned(format!("{label} Layout Program"))),
        source: Cow::Owned(key.shader_source()),
        bind_group_layouts: vec![key.layout_entries()],
        topology: PrimitiveTopology::TriangleList,
    })?;
    let layout = device.program_bind_group_layout(program, GLOBAL_BIND_GROUP);
    if let Err(e) = device.destroy_program(program) {
        log::warn!("GlobalBindGroupCache: Failed to destroy layout program: {e:?}");
    }
    let layout = layout?;

    let bind_group = match device.create_bind_group(&BindGroupDescriptor {
        label: Some(label.as_str()),
        layout,
        entries: &entries,
    }) {
        Ok(bind_group) => bind_group,
        Err(e) => {
            let _ = device.destroy_bind_group_layout(layout);
            return Err(e.into());
        }
    };
    Ok(CachedBindGroup { bind_group, layout })
}

fn release(device: &dyn GraphicsDevice, cached: CachedBindGroup, level: log::Level) {
    if let Err(e) = device.destroy_bind_group(cached.bind_group) {
        log::log!(level, "GlobalBindGroupCache: Failed to destroy bind group: {e:?}");
    }
    if let Err(e) = device.destroy_bind_group_layout(cached.layout) {
        log::log!(level, "GlobalBindGroupCache: Failed to destroy layout: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::{BufferDescriptor, BufferUsage};
    use lumen_infra::HeadlessDevice;

    fn uniform(device: &HeadlessDevice) -> BufferId {
        device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 256,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
            .unwrap()
    }

    #[test]
    fn stable_hash_distinguishes_features() {
        let camera = GlobalBindGroupKey::camera_only("Forward");
        let foggy = GlobalBindGroupKey {
            fog: FogMode::Linear,
            ..camera
        };
        let denser = GlobalBindGroupKey {
            fog: FogMode::Exponential,
            ..camera
        };
        let other_lane = GlobalBindGroupKey::camera_only("Shadow");

        assert_eq!(camera.stable_hash(), camera.stable_hash());
        assert_ne!(camera.stable_hash(), foggy.stable_hash());
        assert_ne!(foggy.stable_hash(), denser.stable_hash());
        assert_ne!(camera.stable_hash(), other_lane.stable_hash());
        assert!(camera.label().starts_with("Global Bindings [Forward]"));
    }

    #[test]
    fn layout_and_source_follow_the_key() {
        let key = GlobalBindGroupKey {
            clusters: Some(ClusterIndexFormat::PackedUint),
            fog: FogMode::Exponential,
            ..GlobalBindGroupKey::camera_only("Forward")
        };
        let bindings: Vec<u32> = key.layout_entries().iter().map(|e| e.binding).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3, 4]);
        assert_eq!(key.layout_entries()[1].ty, BindingType::StorageBuffer);

        let source = key.shader_source();
        assert!(source.contains("camera_touch() + clusters_touch() + fog_touch()"));
        assert!(!source.contains("shadow_map"));
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let device = HeadlessDevice::new();
        let resources = GlobalResources {
            camera_buffer: uniform(&device),
            clusters: None,
            fog_buffer: None,
        };
        let key = GlobalBindGroupKey::camera_only("Test");
        let mut cache = GlobalBindGroupCache::new();

        let first = cache.get_or_create(&device, &key, &resources).unwrap();
        let second = cache.get_or_create(&device, &key, &resources).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            cache.counters(),
            CacheCounters {
                hits: 1,
                misses: 1,
                reloads: 0
            }
        );
        assert_eq!(device.live_program_count(), 0);

        let mut stats = RenderStats::default();
        cache.report(&mut stats);
        cache.report(&mut stats);
        assert_eq!(stats.bind_group_cache_hits, 1);
        assert_eq!(stats.bind_group_cache_misses, 1);
    }

    #[test]
    fn missing_fog_buffer_is_an_error() {
        let device = HeadlessDevice::new();
        let resources = GlobalResources {
            camera_buffer: uniform(&device),
            clusters: None,
            fog_buffer: None,
        };
        let key = GlobalBindGroupKey {
            fog: FogMode::Linear,
            ..GlobalBindGroupKey::camera_only("Test")
        };
        let mut cache = GlobalBindGroupCache::new();
        assert!(matches!(
            cache.get_or_create(&device, &key, &resources),
            Err(LaneError::Resource(ResourceError::InvalidHandle))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn dispose_releases_bind_groups_and_layouts() {
        let device = HeadlessDevice::new();
        let camera_buffer = uniform(&device);
        let fog_buffer = uniform(&device);
        let resources = GlobalResources {
            camera_buffer,
            clusters: None,
            fog_buffer: Some(fog_buffer),
        };
        let mut cache = GlobalBindGroupCache::new();
        let plain = GlobalBindGroupKey::camera_only("Test");
        let foggy = GlobalBindGroupKey {
            fog: FogMode::ExponentialSquared,
            ..plain
        };
        cache.get_or_create(&device, &plain, &resources).unwrap();
        cache.get_or_create(&device, &foggy, &resources).unwrap();
        assert_eq!(cache.len(), 2);

        cache.dispose(&device);
        assert!(cache.is_empty());
        assert_eq!(device.live_bind_group_count(), 0);
        assert_eq!(device.live_bind_group_layout_count(), 0);
    }
}
