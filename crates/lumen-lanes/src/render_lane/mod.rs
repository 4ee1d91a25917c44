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

//! Rendering lanes - the per-frame hot path.
//!
//! A lane turns a [`RenderQueue`] into one render pass. The shared flow lives
//! in the provided [`RenderLane::render`] method:
//!
//! ```text
//! Cull without camera --> clear targets, Err(MissingCamera)
//!    |
//! queue (precomputed | culled) -> sort -> flush pool -> prepare
//!    -> begin pass -> push state [-> flip winding] -> render_items
//!    -> pop state
//! ```
//!
//! Concrete lanes provide their targets and `render_items`, usually binding
//! their global resources through the [`GlobalBindGroupCache`] kept in their
//! [`PassCore`]. Uploads and passes that must precede the main pass, such as
//! the cluster culling dispatch, go in [`RenderLane::prepare`].

mod cluster_grid;
mod culling;
mod forward_lane;
mod global_bindings;
mod render_queue;
mod shadow_lane;
pub mod shaders;
mod uniform_pool;

pub use cluster_grid::*;
pub use culling::*;
pub use forward_lane::*;
pub use global_bindings::*;
pub use render_queue::*;
pub use shadow_lane::*;
pub use uniform_pool::*;

use lumen_core::math::LinearRgba;
use lumen_core::renderer::api::{
    DeviceCapabilities, FrameFence, FrontFace, LoadOp, Operations, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderStateStack, RenderStats,
    RendererConfig, StoreOp, TextureViewId,
};
use lumen_core::renderer::{CameraView, CommandEncoder, GraphicsDevice, RenderPass, ResourceError};

use crate::LaneError;

/// Lifecycle of a lane's pass resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    /// Created, nothing rendered yet.
    #[default]
    Idle,
    /// Rendered at least once since creation or the last dispose.
    Active,
    /// Resources released. Rendering again recreates them.
    Disposed,
}

/// Clear values of a pass. `None` loads the previous contents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearTargets {
    /// Colour clear value.
    pub color: Option<LinearRgba>,
    /// Depth clear value.
    pub depth: Option<f32>,
    /// Stencil clear value.
    pub stencil: Option<u32>,
}

impl From<&RendererConfig> for ClearTargets {
    fn from(config: &RendererConfig) -> Self {
        Self {
            color: config.clear_color.map(LinearRgba::from),
            depth: config.clear_depth,
            stencil: config.clear_stencil,
        }
    }
}

/// The attachments a lane renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassTargets {
    /// Colour attachment.
    pub color: Option<TextureViewId>,
    /// Depth attachment.
    pub depth: Option<TextureViewId>,
    /// Whether the depth attachment has a stencil aspect.
    pub stencil: bool,
}

/// State shared by every lane: clear values, output orientation and the
/// global bind group cache.
#[derive(Debug, Default)]
pub struct PassCore {
    /// Clear values used when the pass begins.
    pub clear: ClearTargets,
    /// Whether the backend's render targets are Y-flipped, which reverses
    /// the winding of everything drawn.
    pub flip_output: bool,
    state: PassState,
    bind_groups: GlobalBindGroupCache,
    scratch_queue: RenderQueue,
}

impl PassCore {
    /// Creates a core with explicit clear values and orientation.
    pub fn new(clear: ClearTargets, flip_output: bool) -> Self {
        Self {
            clear,
            flip_output,
            ..Self::default()
        }
    }

    /// Clear values from `config`, orientation from the device.
    pub fn from_config(config: &RendererConfig, capabilities: &DeviceCapabilities) -> Self {
        Self::new(
            ClearTargets::from(config),
            capabilities.render_target_flipped_y,
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// The lane's global bind groups.
    pub fn bind_groups(&self) -> &GlobalBindGroupCache {
        &self.bind_groups
    }

    /// Mutable access to the lane's global bind groups.
    pub fn bind_groups_mut(&mut self) -> &mut GlobalBindGroupCache {
        &mut self.bind_groups
    }

    /// Releases the cached bind groups.
    pub fn dispose(&mut self, device: &dyn GraphicsDevice) {
        self.bind_groups.dispose(device);
        self.scratch_queue.clear();
        self.state = PassState::Disposed;
    }
}

/// Everything a lane needs from the frame being recorded.
pub struct FrameContext<'a> {
    /// The device.
    pub device: &'a dyn GraphicsDevice,
    /// The encoder the pass is recorded into.
    pub encoder: &'a mut dyn CommandEncoder,
    /// Frame pacing, deciding pooled buffer reuse.
    pub fence: &'a FrameFence,
    /// Per-instance uniform buffers.
    pub pool: &'a mut UniformBufferPool,
    /// Counters filled while rendering.
    pub stats: &'a mut RenderStats,
}

/// What `render_items` draws with.
pub struct DrawContext<'a> {
    /// The device.
    pub device: &'a dyn GraphicsDevice,
    /// Pooled instance buffers referenced by batched items.
    pub pool: &'a UniformBufferPool,
    /// Counters filled while drawing.
    pub stats: &'a mut RenderStats,
    pass: &'a mut dyn RenderPass,
    states: RenderStateStack,
    flip_output: bool,
}

impl<'a> DrawContext<'a> {
    /// Wraps an open render pass.
    pub fn new(
        device: &'a dyn GraphicsDevice,
        pool: &'a UniformBufferPool,
        stats: &'a mut RenderStats,
        pass: &'a mut dyn RenderPass,
        flip_output: bool,
    ) -> Self {
        Self {
            device,
            pool,
            stats,
            pass,
            states: RenderStateStack::new(),
            flip_output,
        }
    }

    /// The open render pass.
    pub fn pass(&mut self) -> &mut dyn RenderPass {
        &mut *self.pass
    }

    /// The winding currently set on the pass.
    pub fn front_face(&self) -> FrontFace {
        self.states.current().front_face
    }

    /// Reverses the winding and records the change.
    pub fn toggle_winding(&mut self) {
        let state = self.states.current_mut();
        state.front_face = state.front_face.flipped();
        let front_face = state.front_face;
        self.pass.set_front_face(front_face);
    }

    /// Saves the current pipeline state.
    pub fn push_state(&mut self) {
        self.states.push();
    }

    /// Restores the last saved pipeline state, re-recording the winding if
    /// it changed.
    pub fn pop_state(&mut self) {
        let before = self.front_face();
        let restored = self.states.pop();
        if restored.front_face != before {
            self.pass.set_front_face(restored.front_face);
        }
    }

    /// Records the draw call of `item`.
    ///
    /// An item needs reversed winding when its transform is mirrored XOR the
    /// lane flips its output. The winding is toggled only when that
    /// disagrees with the current state, and toggled back after the draw.
    pub fn draw_item(&mut self, item: &RenderItem) -> Result<(), LaneError> {
        let instance_bind_group = match &item.instance {
            Some(instance) => Some(
                self.pool
                    .bind_group(instance.handle)
                    .ok_or(ResourceError::InvalidHandle)?,
            ),
            None => None,
        };

        let reversed = item.drawable.is_mirrored() != self.flip_output;
        let wanted = if reversed {
            FrontFace::default().flipped()
        } else {
            FrontFace::default()
        };
        let toggle = wanted != self.front_face();
        if toggle {
            self.toggle_winding();
        }
        let instances = item.instance_count();
        item.drawable
            .draw(&mut *self.pass, instances, instance_bind_group);
        if toggle {
            self.toggle_winding();
        }

        self.stats.draw_calls += 1;
        self.stats.instances_drawn += instances;
        if item.instance.is_some() {
            self.stats.instanced_draw_calls += 1;
        } else {
            self.stats.singleton_items += 1;
        }
        Ok(())
    }
}

/// Where a lane gets its items from.
pub enum QueueSource<'a> {
    /// A queue filled by the caller.
    Precomputed(&'a mut RenderQueue),
    /// A culler run against the lane's camera into the lane's scratch queue.
    Cull(&'a mut dyn SceneCuller),
}

/// Summary of one [`RenderLane::render`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Items drawn (a batch counts once).
    pub items: usize,
    /// Draw calls recorded.
    pub draw_calls: u32,
    /// Instances emitted.
    pub instances: u32,
}

/// A trait defining the behavior of a rendering lane.
///
/// Lanes own their GPU resources and record one render pass per call to
/// [`render`](RenderLane::render). Different implementations provide
/// different passes (lit forward, depth-only shadows) over the same queue
/// and pooling machinery.
pub trait RenderLane: Send + Sync {
    /// Returns a human-readable identifier for this rendering strategy.
    fn strategy_name(&self) -> &'static str;

    /// Shared pass state.
    fn core(&self) -> &PassCore;

    /// Mutable shared pass state.
    fn core_mut(&mut self) -> &mut PassCore;

    /// The attachments of the pass.
    fn targets(&self) -> PassTargets;

    /// Uploads per-frame data and records work the pass depends on. Runs
    /// after the queue is sorted and the pool flushed, before the pass
    /// begins.
    fn prepare(
        &mut self,
        _frame: &mut FrameContext<'_>,
        _camera: Option<&CameraView>,
        _queue: &RenderQueue,
    ) -> Result<(), LaneError> {
        Ok(())
    }

    /// Records the draw calls of a sorted queue into the open pass.
    fn render_items(
        &mut self,
        ctx: &mut DrawContext<'_>,
        camera: Option<&CameraView>,
        queue: &RenderQueue,
    ) -> Result<(), LaneError>;

    /// Releases lane-specific GPU resources. Called by
    /// [`dispose`](RenderLane::dispose).
    fn release(&mut self, _device: &dyn GraphicsDevice) {}

    /// Records the lane's pass for `camera`.
    ///
    /// A precomputed queue is drawn even without a camera, using the camera
    /// data uploaded by the last render that had one. Culling needs a
    /// camera: without one the pass still begins and ends, clearing its
    /// targets, and [`LaneError::MissingCamera`] is returned.
    fn render(
        &mut self,
        frame: &mut FrameContext<'_>,
        camera: Option<&CameraView>,
        source: QueueSource<'_>,
    ) -> Result<RenderOutcome, LaneError> {
        let mut scratch = std::mem::take(&mut self.core_mut().scratch_queue);
        let result = render_pass(self, frame, camera, source, &mut scratch);
        scratch.clear();
        self.core_mut().scratch_queue = scratch;
        result
    }

    /// Releases every GPU resource of the lane.
    fn dispose(&mut self, device: &dyn GraphicsDevice) {
        self.release(device);
        self.core_mut().dispose(device);
        log::debug!("{}: Disposed", self.strategy_name());
    }
}

fn render_pass<L: RenderLane + ?Sized>(
    lane: &mut L,
    frame: &mut FrameContext<'_>,
    camera: Option<&CameraView>,
    source: QueueSource<'_>,
    scratch: &mut RenderQueue,
) -> Result<RenderOutcome, LaneError> {
    let name = lane.strategy_name();

    let queue = match (camera, source) {
        (_, QueueSource::Precomputed(queue)) => Some(queue),
        (Some(camera), QueueSource::Cull(culler)) => {
            let pool = PoolContext {
                device: frame.device,
                fence: frame.fence,
                pool: &mut *frame.pool,
            };
            let mut visitor = CullVisitor::new(&mut *scratch, pool, *camera);
            culler
                .cull(camera, &mut visitor)
                .map_err(LaneError::from_culler)?;
            Some(scratch)
        }
        (None, QueueSource::Cull(_)) => None,
    };

    let queue = queue.map(|queue| {
        queue.sort_items();
        &*queue
    });
    frame.pool.flush(frame.device)?;
    frame.stats.pooled_buffers_created += frame.pool.take_created_count();
    if let Some(queue) = queue {
        lane.prepare(frame, camera, queue)?;
    }

    let targets = lane.targets();
    let clear = lane.core().clear;
    let color_attachments: Vec<RenderPassColorAttachment> = targets
        .color
        .map(|view| RenderPassColorAttachment {
            view,
            ops: Operations {
                load: LoadOp::from_clear(clear.color),
                store: StoreOp::Store,
            },
        })
        .into_iter()
        .collect();
    let depth_stencil_attachment = targets.depth.map(|view| RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(Operations {
            load: LoadOp::from_clear(clear.depth),
            store: StoreOp::Store,
        }),
        stencil_ops: targets.stencil.then_some(Operations {
            load: LoadOp::from_clear(clear.stencil),
            store: StoreOp::Store,
        }),
    });

    lane.core_mut().state = PassState::Active;
    let flip_output = lane.core().flip_output;
    let mut pass = frame.encoder.begin_render_pass(&RenderPassDescriptor {
        label: Some(name),
        color_attachments: &color_attachments,
        depth_stencil_attachment,
    });

    let Some(queue) = queue else {
        drop(pass);
        log::warn!("{name}: No camera to cull with, the pass only cleared its targets");
        return Err(LaneError::MissingCamera { lane: name });
    };

    let draw_calls_before = frame.stats.draw_calls;
    let instances_before = frame.stats.instances_drawn;
    let mut ctx = DrawContext::new(
        frame.device,
        &*frame.pool,
        &mut *frame.stats,
        pass.as_mut(),
        flip_output,
    );
    ctx.push_state();
    if flip_output {
        ctx.toggle_winding();
    }
    let result = lane.render_items(&mut ctx, camera, queue);
    ctx.pop_state();
    drop(ctx);
    drop(pass);

    lane.core_mut().bind_groups.report(frame.stats);
    result?;

    Ok(RenderOutcome {
        items: queue.item_count(),
        draw_calls: frame.stats.draw_calls - draw_calls_before,
        instances: frame.stats.instances_drawn - instances_before,
    })
}
