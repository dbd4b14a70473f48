//! Bind-pose skinning and orientation encoding
//!
//! Orientations are stored as the x, y, z of a unit quaternion. The missing w is always
//! taken as the non-positive root, and the whole quaternion is negated before it becomes
//! a rotation; [`compress_orientation`] is the inverse of that convention.

use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

use super::error::{reference_index, Md5Error, ReferenceKind};
use super::mesh::{Joint, Mesh, Vert, Weight};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// The w component of a compressed unit quaternion.
///
/// Components whose squares sum past 1 give `0.0` instead of failing.
pub fn reconstruct_w(x: f64, y: f64, z: f64) -> f64 {
    let t = 1.0 - x * x - y * y - z * z;
    if t < 0.0 {
        0.0
    } else {
        -t.sqrt()
    }
}

/// Expand a stored orientation into the rotation it encodes
pub fn orientation_quat(orientation: &[f64; 3]) -> DQuat {
    let [x, y, z] = *orientation;
    -DQuat::from_xyzw(x, y, z, reconstruct_w(x, y, z))
}

/// Translation composed with the decoded rotation, translation on the left
pub fn joint_transform(position: &[f64; 3], orientation: &[f64; 3]) -> DMat4 {
    DMat4::from_translation(DVec3::from_array(*position))
        * DMat4::from_quat(orientation_quat(orientation))
}

/// Encode a rotation the way joints and base frames store it
pub fn compress_orientation(rotation: DQuat) -> [f64; 3] {
    let r = rotation.normalize();
    let r = if r.w < 0.0 { -r } else { r };
    [-r.x, -r.y, -r.z]
}

/// A joint's position and stored orientation at one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub position: [f64; 3],
    pub orientation: [f64; 3],
}

impl JointPose {
    pub fn rotation(&self) -> DQuat {
        orientation_quat(&self.orientation)
    }

    pub fn transform(&self) -> DMat4 {
        joint_transform(&self.position, &self.orientation)
    }
}

fn vertex_weights<'m>(vert: &Vert, mesh: &'m Mesh) -> Result<&'m [Weight], Md5Error> {
    vert.weights(&mesh.weights).ok_or(Md5Error::Reference {
        kind: ReferenceKind::VertWeights,
        owner: vert.index,
        index: vert.weight_end().map_or(i64::MAX, reference_index),
        limit: mesh.weights.len(),
    })
}

fn blend<F>(vert: &Vert, mesh: &Mesh, joints: &[Joint], mut transform: F) -> Result<DVec3, Md5Error>
where
    F: FnMut(usize, &Joint) -> DMat4,
{
    let mut position = DVec3::ZERO;
    for weight in vertex_weights(vert, mesh)? {
        let joint = joints.get(weight.joint_index).ok_or(Md5Error::Reference {
            kind: ReferenceKind::WeightJoint,
            owner: weight.index,
            index: reference_index(weight.joint_index),
            limit: joints.len(),
        })?;
        let matrix = transform(weight.joint_index, joint);
        position += matrix.transform_point3(DVec3::from_array(weight.position)) * weight.bias;
    }
    Ok(position)
}

/// Absolute bind-pose position of `vert`: the bias-weighted sum of its weights, each
/// carried into model space by the referenced joint.
///
/// Biases are used as given and are not normalized.
pub fn bind_shape_vertex_position(
    vert: &Vert,
    mesh: &Mesh,
    joints: &[Joint],
) -> Result<DVec3, Md5Error> {
    blend(vert, mesh, joints, |_, joint| {
        joint_transform(&joint.position, &joint.orientation)
    })
}

/// Whether any weight of `vert` references joint index `joint`
pub fn joint_membership(vert: &Vert, mesh: &Mesh, joint: usize) -> bool {
    vert.weights(&mesh.weights)
        .is_some_and(|weights| weights.iter().any(|w| w.joint_index == joint))
}

#[derive(Debug, Clone)]
struct CachedTransform {
    position: [f64; 3],
    orientation: [f64; 3],
    matrix: DMat4,
    last_used: u64,
}

/// Joint transforms memoized by joint index.
///
/// An entry is reused only while the joint's position and orientation equal the values it
/// was computed from. Once `capacity` entries exist the least recently used one is dropped.
#[derive(Debug, Clone)]
pub struct JointTransformCache {
    capacity: usize,
    entries: HashMap<usize, CachedTransform>,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl Default for JointTransformCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl JointTransformCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn transform(&mut self, index: usize, joint: &Joint) -> DMat4 {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(&index) {
            if entry.position == joint.position && entry.orientation == joint.orientation {
                entry.last_used = self.clock;
                self.hits += 1;
                trace!(joint = index, "joint transform cache hit");
                return entry.matrix;
            }
        }

        self.misses += 1;
        trace!(joint = index, "joint transform cache miss");
        let matrix = joint_transform(&joint.position, &joint.orientation);
        if self.capacity == 0 {
            return matrix;
        }
        if !self.entries.contains_key(&index) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(&key, _)| key);
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(
            index,
            CachedTransform {
                position: joint.position,
                orientation: joint.orientation,
                matrix,
                last_used: self.clock,
            },
        );
        matrix
    }

    /// [`bind_shape_vertex_position`] with joint transforms taken from the cache
    pub fn vertex_position(
        &mut self,
        vert: &Vert,
        mesh: &Mesh,
        joints: &[Joint],
    ) -> Result<DVec3, Md5Error> {
        blend(vert, mesh, joints, |index, joint| self.transform(index, joint))
    }
}

/// Bind-pose positions of every vertex of `mesh`, in vertex order
pub fn mesh_positions(
    mesh: &Mesh,
    joints: &[Joint],
    cache: &mut JointTransformCache,
) -> Result<Vec<DVec3>, Md5Error> {
    mesh.verts
        .iter()
        .map(|vert| cache.vertex_position(vert, mesh, joints))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub vert: usize,
    pub weight: f64,
}

/// The vertices one joint influences within a mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointGroup {
    pub joint_index: usize,
    pub name: String,
    pub members: Vec<GroupMember>,
}

/// One group per joint referenced by the mesh's weights, in joint order.
///
/// Weights pointing past the joint list are skipped, as are vertices whose weight slice
/// runs off the end of the weights.
pub fn joint_groups(mesh: &Mesh, joints: &[Joint]) -> Vec<JointGroup> {
    let mut members: BTreeMap<usize, Vec<GroupMember>> = mesh
        .weights
        .iter()
        .map(|w| (w.joint_index, Vec::new()))
        .collect();

    for vert in &mesh.verts {
        for weight in vert.weights(&mesh.weights).unwrap_or_default() {
            if let Some(group) = members.get_mut(&weight.joint_index) {
                group.push(GroupMember {
                    vert: vert.index,
                    weight: weight.bias,
                });
            }
        }
    }

    members
        .into_iter()
        .filter_map(|(joint_index, members)| {
            joints.get(joint_index).map(|joint| JointGroup {
                joint_index,
                name: joint.name.clone(),
                members,
            })
        })
        .collect()
}
