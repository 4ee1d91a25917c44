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

//! The per-camera render queue.
//!
//! Scene traversal pushes drawables and lights into a [`RenderQueue`]. Items
//! are grouped by an explicit draw order, then split into opaque and
//! transparent lists. Instancable drawables sharing an [`InstanceSignature`]
//! within the same order and transparency are merged: the first one owns an
//! [`InstanceData`] backed by a pooled uniform buffer, later ones only append
//! their instance record to it until the buffer is full.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use lumen_core::renderer::{
    CameraView, Drawable, InstanceSignature, Light, LightId, LightRecord, MAX_CLUSTERED_LIGHTS,
};

use super::uniform_pool::{PoolContext, PooledBufferHandle};
use crate::LaneError;

/// Per-instance storage of a batched item.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceData {
    /// Pooled buffer holding the instance records.
    pub handle: PooledBufferHandle,
    /// Floats per instance record.
    pub stride: usize,
    /// Number of records written.
    pub current_size: usize,
    /// Number of records the buffer can hold.
    pub max_size: usize,
    /// The signature shared by every instance.
    pub signature: InstanceSignature,
}

impl InstanceData {
    /// Whether another record would overflow the pooled buffer.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.max_size
    }
}

/// A drawable queued for drawing, possibly standing for a whole batch.
#[derive(Debug, Clone)]
pub struct RenderItem {
    /// The drawable, or the first drawable of the batch.
    pub drawable: Drawable,
    /// Camera distance used for sorting.
    pub distance: f32,
    /// Explicit draw order.
    pub order: i32,
    /// Whether the item is drawn in the transparent phase.
    pub transparent: bool,
    /// Batch storage, `None` for singleton items.
    pub instance: Option<InstanceData>,
}

impl RenderItem {
    /// Number of instances the draw call emits.
    pub fn instance_count(&self) -> u32 {
        self.instance
            .as_ref()
            .map_or(1, |instance| instance.current_size as u32)
    }
}

/// A light captured for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedLight {
    /// Identifier of the source light.
    pub id: LightId,
    /// Packed record at submission time.
    pub record: LightRecord,
    /// Whether the light renders a shadow map.
    pub cast_shadows: bool,
    /// Whether the light is directional.
    pub directional: bool,
}

impl QueuedLight {
    /// Snapshots `light`, refreshing its record first.
    pub fn from_light(light: &mut Light) -> Self {
        Self {
            id: light.id(),
            record: light.record(),
            cast_shadows: light.cast_shadows(),
            directional: light.is_directional(),
        }
    }
}

#[derive(Debug, Default)]
struct RenderBucket {
    opaque: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
}

impl RenderBucket {
    fn items_mut(&mut self, transparent: bool) -> &mut Vec<RenderItem> {
        if transparent {
            &mut self.transparent
        } else {
            &mut self.opaque
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BatchKey {
    order: i32,
    transparent: bool,
    signature: InstanceSignature,
}

/// Drawables and lights of one lane invocation.
#[derive(Debug, Default)]
pub struct RenderQueue {
    buckets: BTreeMap<i32, RenderBucket>,
    open_batches: AHashMap<BatchKey, usize>,
    shadowed_lights: Vec<QueuedLight>,
    unshadowed_lights: Vec<QueuedLight>,
    light_ids: AHashSet<LightId>,
    sun: Option<QueuedLight>,
    instance_scratch: Vec<f32>,
}

impl RenderQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `drawable` at draw `order`.
    ///
    /// Instancable drawables are appended to the open batch of their
    /// signature, or start a new batch in a freshly acquired pooled buffer
    /// when none is open or the open one is full.
    ///
    /// # Errors
    ///
    /// [`LaneError::InstanceStrideTooLarge`] if one instance record does not
    /// fit in a pooled buffer, [`LaneError::Resource`] if the pool fails.
    pub fn push(
        &mut self,
        ctx: &mut PoolContext<'_>,
        camera: &CameraView,
        drawable: &Drawable,
        order: i32,
    ) -> Result<(), LaneError> {
        let transparent = drawable.is_transparent();
        let distance = drawable.sort_distance(camera);

        let Some(signature) = drawable.instance_signature() else {
            self.buckets
                .entry(order)
                .or_default()
                .items_mut(transparent)
                .push(RenderItem {
                    drawable: drawable.clone(),
                    distance,
                    order,
                    transparent,
                    instance: None,
                });
            return Ok(());
        };

        let stride = signature.stride as usize;
        let capacity = ctx.pool.capacity_floats();
        if stride > capacity {
            return Err(LaneError::InstanceStrideTooLarge { stride, capacity });
        }

        self.instance_scratch.clear();
        drawable.extend_instance_data(&mut self.instance_scratch);

        let key = BatchKey {
            order,
            transparent,
            signature,
        };
        let items = self.buckets.entry(order).or_default().items_mut(transparent);

        if let Some(&index) = self.open_batches.get(&key) {
            if let Some(instance) = items.get_mut(index).and_then(|item| item.instance.as_mut()) {
                if !instance.is_full() {
                    ctx.pool.write(
                        instance.handle,
                        instance.current_size * stride,
                        &self.instance_scratch,
                    )?;
                    instance.current_size += 1;
                    return Ok(());
                }
            }
        }

        let handle = ctx.pool.acquire(ctx.device, ctx.fence)?;
        ctx.pool.write(handle, 0, &self.instance_scratch)?;
        items.push(RenderItem {
            drawable: drawable.clone(),
            distance,
            order,
            transparent,
            instance: Some(InstanceData {
                handle,
                stride,
                current_size: 1,
                max_size: capacity / stride,
                signature,
            }),
        });
        self.open_batches.insert(key, items.len() - 1);
        Ok(())
    }

    /// Queues a light for this frame.
    ///
    /// Returns `false` and ignores the light if its id was already pushed.
    pub fn push_light(&mut self, light: &mut Light) -> bool {
        if !self.light_ids.insert(light.id()) {
            return false;
        }
        let queued = QueuedLight::from_light(light);
        if queued.directional && self.sun.is_none() {
            self.sun = Some(queued);
        }
        if queued.cast_shadows {
            self.shadowed_lights.push(queued);
        } else {
            self.unshadowed_lights.push(queued);
        }
        true
    }

    /// The unshadowed lights handed to the cluster grid, capped at
    /// [`MAX_CLUSTERED_LIGHTS`].
    pub fn clustered_lights(&self) -> &[QueuedLight] {
        let len = self.unshadowed_lights.len().min(MAX_CLUSTERED_LIGHTS);
        &self.unshadowed_lights[..len]
    }

    /// Lights that render a shadow map.
    pub fn shadowed_lights(&self) -> &[QueuedLight] {
        &self.shadowed_lights
    }

    /// Every unshadowed light, including those beyond the cluster cap.
    pub fn unshadowed_lights(&self) -> &[QueuedLight] {
        &self.unshadowed_lights
    }

    /// The first directional light pushed this frame.
    pub fn sun(&self) -> Option<&QueuedLight> {
        self.sun.as_ref()
    }

    /// Sorts every order bucket: opaque items front to back, transparent
    /// items back to front. Closes all open batches.
    pub fn sort_items(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket
                .opaque
                .sort_by(|a, b| a.distance.total_cmp(&b.distance));
            bucket
                .transparent
                .sort_by(|a, b| b.distance.total_cmp(&a.distance));
        }
        self.open_batches.clear();
    }

    /// Items in draw order: orders ascending, opaque before transparent.
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> + '_ {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.opaque.iter().chain(bucket.transparent.iter()))
    }

    /// Opaque items only, orders ascending.
    pub fn iter_opaque(&self) -> impl Iterator<Item = &RenderItem> + '_ {
        self.buckets.values().flat_map(|bucket| bucket.opaque.iter())
    }

    /// Number of queued items (a batch counts once).
    pub fn item_count(&self) -> usize {
        self.buckets
            .values()
            .map(|bucket| bucket.opaque.len() + bucket.transparent.len())
            .sum()
    }

    /// Number of instances over all items.
    pub fn instance_count(&self) -> usize {
        self.iter().map(|item| item.instance_count() as usize).sum()
    }

    /// Returns `true` if no drawable was queued.
    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Drops every drawable and light.
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.open_batches.clear();
        self.shadowed_lights.clear();
        self.unshadowed_lights.clear();
        self.light_ids.clear();
        self.sun = None;
    }
}
