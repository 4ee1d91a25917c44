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

//! Renderable objects handed to the render queue by scene traversal.
//!
//! A [`Drawable`] is a snapshot of everything the hot path needs to batch and
//! draw one object: its GPU geometry, its material binding, its world
//! transform and any extra per-instance uniforms. Two drawables that produce
//! the same [`InstanceSignature`] can be drawn with a single instanced call.

use crate::math::Mat4;
use crate::renderer::api::{
    BindGroupId, BufferId, IndexFormat, ProgramId, INSTANCE_BIND_GROUP, MATERIAL_BIND_GROUP,
    SKIN_BIND_GROUP,
};
use crate::renderer::camera::CameraView;
use crate::renderer::traits::RenderPass;

/// Number of floats of the world matrix at the start of every instance record.
pub const WORLD_MATRIX_FLOATS: usize = 16;

/// A stable identifier for a drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u64);

/// Identifies a skeleton whose joint palette skinned meshes share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkeletonId(pub u64);

/// The program and bind group a material resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialBinding {
    /// The compiled program.
    pub program: ProgramId,
    /// Material resources bound at `MATERIAL_BIND_GROUP`.
    pub bind_group: BindGroupId,
}

/// Uploaded vertex and index data of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuGeometry {
    /// Interleaved vertex buffer.
    pub vertex_buffer: BufferId,
    /// Optional index buffer and its format.
    pub index_buffer: Option<(BufferId, IndexFormat)>,
    /// Number of indices, or vertices for non-indexed geometry.
    pub element_count: u32,
}

/// A static mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDrawable {
    /// Identifier of the drawable.
    pub id: DrawableId,
    /// GPU geometry.
    pub geometry: GpuGeometry,
    /// Material binding.
    pub material: MaterialBinding,
    /// World transform.
    pub world: Mat4,
    /// Whether the material is alpha blended.
    pub transparent: bool,
    /// Whether this mesh may share a draw call with identical meshes.
    pub instancable: bool,
    /// Extra per-instance uniforms appended after the world matrix.
    pub instance_uniforms: Vec<f32>,
}

impl MeshDrawable {
    /// An opaque, instancable mesh with no extra per-instance uniforms.
    pub fn new(
        id: DrawableId,
        geometry: GpuGeometry,
        material: MaterialBinding,
        world: Mat4,
    ) -> Self {
        Self {
            id,
            geometry,
            material,
            world,
            transparent: false,
            instancable: true,
            instance_uniforms: Vec::new(),
        }
    }
}

/// A mesh deformed by a skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinnedMeshDrawable {
    /// The underlying mesh.
    pub mesh: MeshDrawable,
    /// Skeleton driving the mesh.
    pub skeleton: SkeletonId,
    /// Bumped every time the skeleton's pose changes.
    pub pose_version: u32,
    /// Joint palette bound at `SKIN_BIND_GROUP`.
    pub joint_palette: BindGroupId,
}

/// Discriminant of [`Drawable`], part of the instance signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawableKind {
    /// A static mesh.
    Mesh,
    /// A skinned mesh.
    SkinnedMesh,
}

/// Everything that must match for two drawables to share an instanced draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceSignature {
    /// The kind of drawable.
    pub kind: DrawableKind,
    /// Geometry buffers.
    pub geometry: GpuGeometry,
    /// Material binding.
    pub material: MaterialBinding,
    /// Skeleton and pose version for skinned meshes.
    pub skin: Option<(SkeletonId, u32)>,
    /// Negative-determinant transform, which flips the winding.
    pub mirrored: bool,
    /// Floats per instance record.
    pub stride: u32,
}

/// A renderable object.
#[derive(Debug, Clone, PartialEq)]
pub enum Drawable {
    /// A static mesh.
    Mesh(MeshDrawable),
    /// A skinned mesh.
    SkinnedMesh(SkinnedMeshDrawable),
}

impl From<MeshDrawable> for Drawable {
    fn from(mesh: MeshDrawable) -> Self {
        Drawable::Mesh(mesh)
    }
}

impl From<SkinnedMeshDrawable> for Drawable {
    fn from(skinned: SkinnedMeshDrawable) -> Self {
        Drawable::SkinnedMesh(skinned)
    }
}

impl Drawable {
    /// The mesh part shared by every variant.
    pub fn mesh(&self) -> &MeshDrawable {
        match self {
            Drawable::Mesh(mesh) => mesh,
            Drawable::SkinnedMesh(skinned) => &skinned.mesh,
        }
    }

    /// The variant of this drawable.
    pub fn kind(&self) -> DrawableKind {
        match self {
            Drawable::Mesh(_) => DrawableKind::Mesh,
            Drawable::SkinnedMesh(_) => DrawableKind::SkinnedMesh,
        }
    }

    /// Identifier of the drawable.
    pub fn id(&self) -> DrawableId {
        self.mesh().id
    }

    /// World transform.
    pub fn world_transform(&self) -> Mat4 {
        self.mesh().world
    }

    /// Whether the world transform mirrors geometry (negative determinant).
    pub fn is_mirrored(&self) -> bool {
        self.mesh().world.determinant() < 0.0
    }

    /// Whether the drawable is alpha blended.
    pub fn is_transparent(&self) -> bool {
        self.mesh().transparent
    }

    /// Whether the drawable may be batched.
    pub fn is_instancable(&self) -> bool {
        self.mesh().instancable
    }

    /// Distance from the camera eye to the drawable's origin.
    pub fn sort_distance(&self, camera: &CameraView) -> f32 {
        camera.distance_to(self.mesh().world.w_axis.truncate())
    }

    /// Floats per instance record: the world matrix plus extra uniforms.
    pub fn instance_stride(&self) -> usize {
        WORLD_MATRIX_FLOATS + self.mesh().instance_uniforms.len()
    }

    /// The batching signature, `None` for non-instancable drawables.
    pub fn instance_signature(&self) -> Option<InstanceSignature> {
        let mesh = self.mesh();
        if !mesh.instancable {
            return None;
        }
        let skin = match self {
            Drawable::Mesh(_) => None,
            Drawable::SkinnedMesh(skinned) => Some((skinned.skeleton, skinned.pose_version)),
        };
        Some(InstanceSignature {
            kind: self.kind(),
            geometry: mesh.geometry,
            material: mesh.material,
            skin,
            mirrored: self.is_mirrored(),
            stride: self.instance_stride() as u32,
        })
    }

    /// Appends this drawable's instance record to `out`.
    pub fn extend_instance_data(&self, out: &mut Vec<f32>) {
        let mesh = self.mesh();
        out.extend_from_slice(&mesh.world.to_cols_array());
        out.extend_from_slice(&mesh.instance_uniforms);
    }

    /// Records the draw call for `instances` copies of this drawable.
    ///
    /// `instance_bind_group` is the pooled uniform buffer holding the
    /// instance records, `None` for singleton items.
    pub fn draw(
        &self,
        pass: &mut dyn RenderPass,
        instances: u32,
        instance_bind_group: Option<BindGroupId>,
    ) {
        let mesh = self.mesh();
        pass.set_pipeline(mesh.material.program);
        pass.set_bind_group(MATERIAL_BIND_GROUP, mesh.material.bind_group, &[]);
        if let Some(bind_group) = instance_bind_group {
            pass.set_bind_group(INSTANCE_BIND_GROUP, bind_group, &[]);
        }
        if let Drawable::SkinnedMesh(skinned) = self {
            pass.set_bind_group(SKIN_BIND_GROUP, skinned.joint_palette, &[]);
        }

        let geometry = &mesh.geometry;
        pass.set_vertex_buffer(0, geometry.vertex_buffer, 0);
        let instances = 0..instances;
        match geometry.index_buffer {
            Some((buffer, format)) => {
                pass.set_index_buffer(buffer, 0, format);
                pass.draw_indexed(0..geometry.element_count, 0, instances);
            }
            None => pass.draw(0..geometry.element_count, instances),
        }
    }
}
