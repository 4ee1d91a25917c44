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

//! Host functions standing in for shader entry points.
//!
//! The headless device cannot run WGSL. Instead, a test registers a
//! [`HostKernel`] under the name of an entry point, and every submitted
//! dispatch of a `@compute` function, or point-list draw of a `@fragment`
//! function, with that name runs the kernel once per invocation:
//!
//! - a dispatch of `(x, y, z)` workgroups runs one invocation per workgroup;
//! - a point draw of `n` vertices runs one invocation per vertex.
//!
//! Kernels read the buffers bound to the pass and write texels to a single
//! output: the first storage texture bound to a dispatch, or colour
//! attachment 0 of a draw.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lumen_core::renderer::api::TextureId;

/// A host function run in place of a shader entry point.
pub type HostKernel = Arc<dyn Fn(&mut KernelInvocation<'_>) + Send + Sync>;

/// Kernels by entry point name.
#[derive(Default)]
pub(crate) struct KernelRegistry(HashMap<String, HostKernel>);

impl KernelRegistry {
    pub(crate) fn insert(&mut self, entry_point: String, kernel: HostKernel) {
        self.0.insert(entry_point, kernel);
    }

    pub(crate) fn get(&self, entry_point: &str) -> Option<HostKernel> {
        self.0.get(entry_point).cloned()
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// A bound buffer, copied into word-aligned storage.
#[derive(Debug)]
struct BoundBuffer {
    words: Vec<u32>,
    len: usize,
}

/// The texture a kernel writes to.
#[derive(Debug)]
pub(crate) struct KernelOutput {
    pub(crate) texture: TextureId,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) words_per_texel: usize,
    pub(crate) words: Vec<u32>,
}

/// Snapshot of everything a dispatch or draw can see.
#[derive(Debug, Default)]
pub(crate) struct KernelResources {
    buffers: HashMap<(u32, u32), BoundBuffer>,
    pub(crate) output: Option<KernelOutput>,
}

impl KernelResources {
    pub(crate) fn bind_buffer(&mut self, group: u32, binding: u32, bytes: &[u8]) {
        let mut padded = bytes.to_vec();
        padded.resize(bytes.len().div_ceil(4) * 4, 0);
        self.buffers.insert(
            (group, binding),
            BoundBuffer {
                words: bytemuck::pod_collect_to_vec(&padded),
                len: bytes.len(),
            },
        );
    }

    /// Runs `kernel` once per invocation of a `count` grid.
    pub(crate) fn run(&mut self, kernel: &HostKernel, count: [u32; 3]) {
        for z in 0..count[2] {
            for y in 0..count[1] {
                for x in 0..count[0] {
                    kernel(&mut KernelInvocation {
                        id: [x, y, z],
                        count,
                        resources: &mut *self,
                    });
                }
            }
        }
    }
}

/// One invocation of a [`HostKernel`].
pub struct KernelInvocation<'a> {
    /// The workgroup of a dispatch, or `[vertex, 0, 0]` of a point draw.
    pub id: [u32; 3],
    /// Workgroup counts of the dispatch, or `[vertex_count, 1, 1]`.
    pub count: [u32; 3],
    resources: &'a mut KernelResources,
}

impl KernelInvocation<'_> {
    /// `id` flattened in X-major order.
    pub fn linear_id(&self) -> u32 {
        self.id[0] + self.id[1] * self.count[0] + self.id[2] * self.count[0] * self.count[1]
    }

    /// Contents of the buffer bound at `@group(group) @binding(binding)`,
    /// aligned to 4 bytes.
    pub fn buffer(&self, group: u32, binding: u32) -> Option<&[u8]> {
        self.resources
            .buffers
            .get(&(group, binding))
            .map(|buffer| &bytemuck::cast_slice(&buffer.words)[..buffer.len])
    }

    /// Size of the output texture, `None` if nothing is written.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.resources
            .output
            .as_ref()
            .map(|output| (output.width, output.height))
    }

    /// Writes the raw bits of texel `(x, y)` of the output. Channels beyond
    /// the texel size are ignored.
    ///
    /// Returns `false` if there is no output or the texel is out of bounds.
    pub fn store_texel(&mut self, x: u32, y: u32, texel: [u32; 4]) -> bool {
        let Some(output) = self.resources.output.as_mut() else {
            return false;
        };
        if x >= output.width || y >= output.height {
            return false;
        }
        let words = output.words_per_texel.min(4);
        let start = (y as usize * output.width as usize + x as usize) * output.words_per_texel;
        output.words[start..start + words].copy_from_slice(&texel[..words]);
        true
    }
}
