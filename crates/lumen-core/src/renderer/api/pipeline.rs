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

//! Shader programs and mutable pipeline state.

use crate::renderer::api::command::BindGroupLayoutEntry;
use std::borrow::Cow;

/// Bind group index of the lane-wide global resources.
pub const GLOBAL_BIND_GROUP: u32 = 0;
/// Bind group index of the material resources.
pub const MATERIAL_BIND_GROUP: u32 = 1;
/// Bind group index of the pooled per-instance uniforms.
pub const INSTANCE_BIND_GROUP: u32 = 2;
/// Bind group index of the joint palette of skinned meshes.
pub const SKIN_BIND_GROUP: u32 = 3;

/// An opaque handle to a compiled shader program (a render pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub usize);

/// How the vertices of a draw are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Every vertex is a point.
    PointList,
    /// Every three vertices form a triangle.
    #[default]
    TriangleList,
}

/// A descriptor used to compile a [`ProgramId`].
///
/// `bind_group_layouts` carries the reflection of the `source`: entry `i`
/// lists the bindings of `@group(i)`. Backends that reflect WGSL themselves
/// may ignore it, others build their layouts from it.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// WGSL source code.
    pub source: Cow<'a, str>,
    /// Bind group layouts declared by the source, indexed by group.
    pub bind_group_layouts: Vec<Vec<BindGroupLayoutEntry>>,
    /// Primitive assembly of the draws issued with the program.
    pub topology: PrimitiveTopology,
}

/// Which winding order marks a front-facing triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise triangles face the camera.
    #[default]
    Ccw,
    /// Clockwise triangles face the camera.
    Cw,
}

impl FrontFace {
    /// The opposite winding.
    pub const fn flipped(self) -> Self {
        match self {
            FrontFace::Ccw => FrontFace::Cw,
            FrontFace::Cw => FrontFace::Ccw,
        }
    }
}

/// The dynamic pipeline state a lane may change between draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderState {
    /// Current front-face winding.
    pub front_face: FrontFace,
}

/// A stack of [`RenderState`] snapshots.
///
/// The bottom entry is the default state and is never popped.
#[derive(Debug, Clone)]
pub struct RenderStateStack {
    stack: Vec<RenderState>,
}

impl Default for RenderStateStack {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStateStack {
    /// Creates a stack holding only the default state.
    pub fn new() -> Self {
        Self {
            stack: vec![RenderState::default()],
        }
    }

    /// The active state.
    pub fn current(&self) -> RenderState {
        self.stack.last().copied().unwrap_or_default()
    }

    /// Mutable access to the active state.
    pub fn current_mut(&mut self) -> &mut RenderState {
        if self.stack.is_empty() {
            self.stack.push(RenderState::default());
        }
        let top = self.stack.len() - 1;
        &mut self.stack[top]
    }

    /// Saves a copy of the active state.
    pub fn push(&mut self) {
        let snapshot = self.current();
        self.stack.push(snapshot);
    }

    /// Restores the last saved state. Returns the restored state.
    ///
    /// Popping the default state is a no-op.
    pub fn pop(&mut self) -> RenderState {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
        self.current()
    }

    /// Number of saved snapshots above the default state.
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }
}
