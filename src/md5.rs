//! Main module for md5model library functionality
//!
//! `.md5mesh` documents carry a skeleton and skinned meshes, `.md5anim` documents a joint
//! hierarchy with per-frame animated components. Both parse into plain structs that
//! serialize back to canonical text:
//!
//! ```rust,ignore
//! use md5model::md5::{Md5Mesh, Md5Record};
//!
//! let mesh = Md5Mesh::parse(&source)?;
//! assert_eq!(Md5Mesh::parse(&mesh.serialize())?, mesh);
//! ```
//!
//! Skinning helpers in [`skinning`] turn weights into bind-pose vertex positions, and
//! [`processor`] wraps everything for the command-line tool.

pub mod anim;
pub mod config;
pub mod error;
pub mod lexical;
pub mod location;
pub mod mesh;
pub mod processor;
pub mod record;
pub mod skinning;
pub mod validation;

pub use anim::{
    BaseFrame, BaseFramePart, Bound, Component, Frame, FramePart, Hierarchy, Md5Anim,
};
pub use error::{CountField, Md5Error, ReferenceKind, SyntaxError, TextField};
pub use lexical::format_number;
pub use location::{Location, Position, SourceLocation};
pub use mesh::{Joint, Md5Mesh, Mesh, Tri, Vert, Weight};
pub use record::Md5Record;
pub use skinning::{
    bind_shape_vertex_position, compress_orientation, joint_groups, joint_membership,
    joint_transform, mesh_positions, reconstruct_w, JointGroup, JointPose, JointTransformCache,
};
pub use validation::ValidationOptions;
