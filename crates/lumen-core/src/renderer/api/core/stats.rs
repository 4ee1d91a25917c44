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

//! Per-frame statistics gathered by the lanes.

/// A collection of statistics for a single rendered frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// A sequential counter for rendered frames.
    pub frame_number: u64,
    /// Draw calls recorded, instanced or not.
    pub draw_calls: u32,
    /// Draw calls that covered a pooled instance batch.
    pub instanced_draw_calls: u32,
    /// Instances emitted by all draw calls.
    pub instances_drawn: u32,
    /// Items drawn without per-instance uniforms.
    pub singleton_items: u32,
    /// Pooled uniform buffers created this frame.
    pub pooled_buffers_created: u32,
    /// Lights uploaded to the cluster light buffer.
    pub clustered_lights: u32,
    /// Global bind group cache hits.
    pub bind_group_cache_hits: u32,
    /// Global bind group cache misses.
    pub bind_group_cache_misses: u32,
    /// Cached bind groups rebuilt after they became invalid.
    pub bind_group_cache_reloads: u32,
}

impl RenderStats {
    /// Clears the per-frame counters and advances the frame number.
    pub fn begin_frame(&mut self) {
        *self = Self {
            frame_number: self.frame_number + 1,
            ..Self::default()
        };
    }

    /// Adds the counters of `other` into `self`, keeping the frame number.
    pub fn accumulate(&mut self, other: &RenderStats) {
        self.draw_calls += other.draw_calls;
        self.instanced_draw_calls += other.instanced_draw_calls;
        self.instances_drawn += other.instances_drawn;
        self.singleton_items += other.singleton_items;
        self.pooled_buffers_created += other.pooled_buffers_created;
        self.clustered_lights += other.clustered_lights;
        self.bind_group_cache_hits += other.bind_group_cache_hits;
        self.bind_group_cache_misses += other.bind_group_cache_misses;
        self.bind_group_cache_reloads += other.bind_group_cache_reloads;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_frame_resets_counters() {
        let mut stats = RenderStats {
            frame_number: 4,
            draw_calls: 10,
            ..Default::default()
        };
        stats.begin_frame();
        assert_eq!(stats.frame_number, 5);
        assert_eq!(stats.draw_calls, 0);
    }
}
