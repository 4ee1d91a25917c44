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

//! Pooled uniform buffers holding per-instance data.
//!
//! The [`UniformBufferPool`] hands out fixed-size uniform buffers, each with a
//! pre-created bind group, to the render queue. A buffer acquired during frame
//! `N` stays reserved until the [`FrameFence`] reports `N` complete; the next
//! `acquire` after that moves it back to the free list.
//!
//! ```text
//! acquire():  recycle completed frames -> pop free list | create new
//!             -> tag with fence.current()
//! ```
//!
//! The pool only grows to the high-water mark of buffers needed by the
//! frames in flight, and buffers are never freed individually.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::ops::Range;

use lumen_core::renderer::api::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BindingResource, BufferBinding, BufferDescriptor,
    BufferId, BufferUsage, FrameFence, FrameStamp, RendererConfig, ShaderStageFlags,
};
use lumen_core::renderer::{GraphicsDevice, ResourceError};

/// Identifies one buffer of a [`UniformBufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PooledBufferHandle(usize);

/// One pooled buffer with its CPU shadow copy.
#[derive(Debug)]
struct PooledUniformBuffer {
    buffer: BufferId,
    bind_group: BindGroupId,
    data: Vec<f32>,
    dirty: Option<Range<usize>>,
}

/// What the render queue needs to acquire and fill pooled buffers.
pub struct PoolContext<'a> {
    /// The device buffers are created on.
    pub device: &'a dyn GraphicsDevice,
    /// The fence deciding when buffers can be reused.
    pub fence: &'a FrameFence,
    /// The pool itself.
    pub pool: &'a mut UniformBufferPool,
}

/// A pool of per-instance uniform buffers recycled through a [`FrameFence`].
#[derive(Debug)]
pub struct UniformBufferPool {
    layout: BindGroupLayoutId,
    capacity_floats: usize,
    buffers: Vec<PooledUniformBuffer>,
    free: Vec<usize>,
    in_use: VecDeque<(FrameStamp, Vec<usize>)>,
    created_since_take: u32,
}

impl UniformBufferPool {
    /// Creates an empty pool sized from the device limit and `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the instance bind group layout cannot
    /// be created.
    pub fn new(
        device: &dyn GraphicsDevice,
        config: &RendererConfig,
    ) -> Result<Self, ResourceError> {
        let max_bytes = device
            .capabilities()
            .max_uniform_buffer_binding_size
            .min(config.max_uniform_pool_bytes);
        Self::with_capacity_floats(device, max_bytes as usize / std::mem::size_of::<f32>())
    }

    /// Creates an empty pool whose buffers hold `capacity_floats` floats.
    pub fn with_capacity_floats(
        device: &dyn GraphicsDevice,
        capacity_floats: usize,
    ) -> Result<Self, ResourceError> {
        let layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Instance Uniforms Layout"),
            entries: &[BindGroupLayoutEntry::uniform(
                0,
                ShaderStageFlags::VERTEX_FRAGMENT,
            )],
        })?;
        log::debug!("UniformBufferPool: {capacity_floats} floats per buffer");
        Ok(Self {
            layout,
            capacity_floats,
            buffers: Vec::new(),
            free: Vec::new(),
            in_use: VecDeque::new(),
            created_since_take: 0,
        })
    }

    /// Floats per pooled buffer.
    pub fn capacity_floats(&self) -> usize {
        self.capacity_floats
    }

    /// Layout of the instance bind groups.
    pub fn layout(&self) -> BindGroupLayoutId {
        self.layout
    }

    /// Returns a buffer that no in-flight frame reads from.
    ///
    /// The buffer is reserved for `fence.current()`.
    pub fn acquire(
        &mut self,
        device: &dyn GraphicsDevice,
        fence: &FrameFence,
    ) -> Result<PooledBufferHandle, ResourceError> {
        self.recycle(fence);

        let index = match self.free.pop() {
            Some(index) => index,
            None => self.create_buffer(device)?,
        };

        let stamp = fence.current();
        match self.in_use.back_mut() {
            Some((last, indices)) if *last == stamp => indices.push(index),
            _ => self.in_use.push_back((stamp, vec![index])),
        }
        Ok(PooledBufferHandle(index))
    }

    fn recycle(&mut self, fence: &FrameFence) {
        let current = fence.current();
        while let Some((stamp, _)) = self.in_use.front() {
            if *stamp == current || !fence.is_complete(*stamp) {
                break;
            }
            if let Some((_, indices)) = self.in_use.pop_front() {
                // Reverse so the free list hands buffers out in acquisition order.
                self.free.extend(indices.into_iter().rev());
            }
        }
    }

    fn create_buffer(&mut self, device: &dyn GraphicsDevice) -> Result<usize, ResourceError> {
        let index = self.buffers.len();
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!("Pooled Instance Uniforms [{index}]"))),
            size: (self.capacity_floats * std::mem::size_of::<f32>()) as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let bind_group = match device.create_bind_group(&BindGroupDescriptor {
            label: Some("Pooled Instance Uniforms"),
            layout: self.layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(BufferBinding::whole(buffer)),
            }],
        }) {
            Ok(bind_group) => bind_group,
            Err(e) => {
                let _ = device.destroy_buffer(buffer);
                return Err(e);
            }
        };

        self.buffers.push(PooledUniformBuffer {
            buffer,
            bind_group,
            data: vec![0.0; self.capacity_floats],
            dirty: None,
        });
        self.created_since_take += 1;
        log::debug!(
            "UniformBufferPool: grew to {} buffers ({} in flight)",
            self.buffers.len(),
            self.in_flight_count()
        );
        Ok(index)
    }

    /// Copies `values` into the CPU copy of `handle` at `offset` floats.
    ///
    /// The data reaches the GPU on the next [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::OutOfBounds`] if the write does not fit and
    /// [`ResourceError::InvalidHandle`] for a handle of another pool.
    pub fn write(
        &mut self,
        handle: PooledBufferHandle,
        offset: usize,
        values: &[f32],
    ) -> Result<(), ResourceError> {
        let pooled = self
            .buffers
            .get_mut(handle.0)
            .ok_or(ResourceError::InvalidHandle)?;
        let end = offset + values.len();
        if end > pooled.data.len() {
            return Err(ResourceError::OutOfBounds);
        }
        pooled.data[offset..end].copy_from_slice(values);
        pooled.dirty = Some(match pooled.dirty.take() {
            Some(range) => range.start.min(offset)..range.end.max(end),
            None => offset..end,
        });
        Ok(())
    }

    /// Uploads the dirty range of every buffer.
    pub fn flush(&mut self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        for pooled in &mut self.buffers {
            if let Some(range) = pooled.dirty.take() {
                let offset = (range.start * std::mem::size_of::<f32>()) as u64;
                device.write_buffer(
                    pooled.buffer,
                    offset,
                    bytemuck::cast_slice(&pooled.data[range]),
                )?;
            }
        }
        Ok(())
    }

    /// The GPU buffer behind `handle`.
    pub fn buffer(&self, handle: PooledBufferHandle) -> Option<BufferId> {
        self.buffers.get(handle.0).map(|b| b.buffer)
    }

    /// The instance bind group behind `handle`.
    pub fn bind_group(&self, handle: PooledBufferHandle) -> Option<BindGroupId> {
        self.buffers.get(handle.0).map(|b| b.bind_group)
    }

    /// Total number of buffers ever created.
    pub fn high_water_mark(&self) -> usize {
        self.buffers.len()
    }

    /// Buffers ready to be handed out without waiting on the fence.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Buffers reserved by frames the fence has not completed yet.
    pub fn in_flight_count(&self) -> usize {
        self.in_use.iter().map(|(_, indices)| indices.len()).sum()
    }

    /// Returns and resets the number of buffers created since the last call.
    pub fn take_created_count(&mut self) -> u32 {
        std::mem::take(&mut self.created_since_take)
    }

    /// Destroys every GPU resource owned by the pool.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for pooled in self.buffers.drain(..) {
            if let Err(e) = device.destroy_bind_group(pooled.bind_group) {
                log::warn!("UniformBufferPool: Failed to destroy bind group: {e:?}");
            }
            if let Err(e) = device.destroy_buffer(pooled.buffer) {
                log::warn!("UniformBufferPool: Failed to destroy buffer: {e:?}");
            }
        }
        if let Err(e) = device.destroy_bind_group_layout(self.layout) {
            log::warn!("UniformBufferPool: Failed to destroy layout: {e:?}");
        }
        self.free.clear();
        self.in_use.clear();
    }
}
