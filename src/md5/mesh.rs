//! Mesh documents: the skeleton joints plus skinned triangle meshes
//!
//! ```text
//! MD5Version 10
//! commandline "..."
//!
//! numJoints 2
//! numMeshes 1
//!
//! joints {
//!     "origin"    -1 ( 0 0 0 ) ( 0 0 -0.7071067812 )        //
//!     "waist"      0 ( 0 0 51.3 ) ( -0.5 -0.5 -0.5 )          // origin
//! }
//!
//! mesh {
//!     // body
//!     shader "models/characters/body"
//!
//!     numverts 3
//!     vert 0 ( 0.5 0.5 ) 0 1
//!     ...
//!     numtris 1
//!     tri 0 0 1 2
//!
//!     numweights 3
//!     weight 0 1 1 ( 0 0 0 )
//!     ...
//! }
//! ```
//!
//! Declared counts are compared with the parsed record counts after the grammar succeeds,
//! so a mismatch reports as [`Md5Error::CountMismatch`] instead of a syntax error.

use chumsky::prelude::*;
use glam::{DQuat, DVec3};
use std::ops::Range;
use tracing::debug;

use super::error::{CountField, Md5Error};
use super::lexical::{
    block, format_number, format_vec2, format_vec3, integer, key_value, number, push_indented,
    quoted_string, quoted_text, required_whitespace, trailing_comment, unsigned, vec2, vec3,
    whitespace, ParserError,
};
use super::record::{parse_complete, Md5Record};
use super::skinning::compress_orientation;
use super::validation::{
    check_counts, check_text, validate_joints, validate_mesh, DeclaredCount, ValidationOptions,
};

/// A skeleton joint in its bind pose, expressed in model space
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Joint {
    pub name: String,
    /// `-1` for a root, otherwise the index of an earlier joint
    pub parent_index: i32,
    pub position: [f64; 3],
    /// Quaternion x, y, z; w is reconstructed on load
    pub orientation: [f64; 3],
    pub comment: String,
}

impl Joint {
    /// Build a joint from a rest transform, encoding the rotation the way the format
    /// stores it
    pub fn from_rest_transform(
        name: impl Into<String>,
        parent_index: i32,
        translation: DVec3,
        rotation: DQuat,
        comment: impl Into<String>,
    ) -> Self {
        Joint {
            name: name.into(),
            parent_index,
            position: translation.to_array(),
            orientation: compress_orientation(rotation),
            comment: comment.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vert {
    pub index: usize,
    pub uv: [f64; 2],
    pub weight_start: usize,
    pub weight_count: usize,
}

impl Vert {
    /// One past the last weight, or `None` when the end does not fit in a `usize`
    pub fn weight_end(&self) -> Option<usize> {
        self.weight_start.checked_add(self.weight_count)
    }

    /// The slice of the owning mesh's weights that skin this vertex
    pub fn weight_range(&self) -> Option<Range<usize>> {
        self.weight_end().map(|end| self.weight_start..end)
    }

    /// This vertex's weights out of `weights`, or `None` when the slice runs off the end
    pub fn weights<'w>(&self, weights: &'w [Weight]) -> Option<&'w [Weight]> {
        self.weight_range().and_then(|range| weights.get(range))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tri {
    pub index: usize,
    pub verts: [usize; 3],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Weight {
    pub index: usize,
    pub joint_index: usize,
    pub bias: f64,
    /// Offset in the referenced joint's local space
    pub position: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Mesh {
    pub comment: String,
    pub shader: String,
    pub verts: Vec<Vert>,
    pub tris: Vec<Tri>,
    pub weights: Vec<Weight>,
}

impl Mesh {
    /// The mesh comment without surrounding whitespace, usable as an object name
    pub fn name(&self) -> &str {
        self.comment.trim()
    }
}

/// Root of a `.md5mesh` document
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Md5Mesh {
    pub version: u32,
    pub commandline: String,
    pub joints: Vec<Joint>,
    pub meshes: Vec<Mesh>,
}

impl Md5Mesh {
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// Parse and run the structural checks selected by `options`
    pub fn parse_with(text: &str, options: &ValidationOptions) -> Result<Self, Md5Error> {
        let (document, counts) = parse_complete(md5mesh_document(), text)?;
        check_counts(&counts)?;
        document.validate(options)?;
        debug!(
            joints = document.joints.len(),
            meshes = document.meshes.len(),
            "parsed md5mesh document"
        );
        Ok(document)
    }

    /// Check a document (parsed or built by hand) before it is used or serialized
    pub fn validate(&self, options: &ValidationOptions) -> Result<(), Md5Error> {
        check_text(
            &self.commandline,
            self.joints.iter().map(|j| (j.name.as_str(), j.comment.as_str())),
            &self.meshes,
        )?;
        validate_joints(&self.joints, options)?;
        for (i, mesh) in self.meshes.iter().enumerate() {
            validate_mesh(i, mesh, self.joints.len(), options)?;
        }
        Ok(())
    }
}

pub(crate) fn joint() -> impl Parser<char, Joint, Error = ParserError> + Clone {
    quoted_string()
        .then_ignore(required_whitespace())
        .then(integer::<i32>())
        .then_ignore(required_whitespace())
        .then(vec3())
        .then_ignore(required_whitespace())
        .then(vec3())
        .then(trailing_comment())
        .map(
            |((((name, parent_index), position), orientation), comment)| Joint {
                name,
                parent_index,
                position,
                orientation,
                comment,
            },
        )
        .labelled("joint")
}

pub(crate) fn vert() -> impl Parser<char, Vert, Error = ParserError> + Clone {
    key_value("vert", unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(vec2())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .map(|(((index, uv), weight_start), weight_count)| Vert {
            index,
            uv,
            weight_start,
            weight_count,
        })
}

pub(crate) fn tri() -> impl Parser<char, Tri, Error = ParserError> + Clone {
    key_value("tri", unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .map(|(((index, a), b), c)| Tri {
            index,
            verts: [a, b, c],
        })
}

pub(crate) fn weight() -> impl Parser<char, Weight, Error = ParserError> + Clone {
    key_value("weight", unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .then_ignore(required_whitespace())
        .then(number())
        .then_ignore(required_whitespace())
        .then(vec3())
        .map(|(((index, joint_index), bias), position)| Weight {
            index,
            joint_index,
            bias,
            position,
        })
}

/// `numkey N` followed by any number of whitespace-led records
fn counted<O, P>(
    key: &'static str,
    record: P,
) -> impl Parser<char, (usize, Vec<O>), Error = ParserError> + Clone
where
    P: Parser<char, O, Error = ParserError> + Clone,
{
    key_value(key, unsigned::<usize>()).then(whitespace().ignore_then(record).repeated())
}

pub(crate) fn mesh_block(
) -> impl Parser<char, (Mesh, Vec<DeclaredCount>), Error = ParserError> + Clone {
    let body = trailing_comment()
        .then_ignore(whitespace())
        .then(key_value("shader", quoted_text()))
        .then_ignore(whitespace())
        .then(counted("numverts", vert()))
        .then_ignore(whitespace())
        .then(counted("numtris", tri()))
        .then_ignore(whitespace())
        .then(counted("numweights", weight()));

    just("mesh")
        .ignore_then(block(body))
        .map(
            |((((comment, shader), (numverts, verts)), (numtris, tris)), (numweights, weights))| {
                let counts = vec![
                    DeclaredCount::new(CountField::Verts, numverts, verts.len()),
                    DeclaredCount::new(CountField::Tris, numtris, tris.len()),
                    DeclaredCount::new(CountField::Weights, numweights, weights.len()),
                ];
                let mesh = Mesh {
                    comment,
                    shader,
                    verts,
                    tris,
                    weights,
                };
                (mesh, counts)
            },
        )
        .labelled("mesh")
        .boxed()
}

pub(crate) fn md5mesh_document(
) -> impl Parser<char, (Md5Mesh, Vec<DeclaredCount>), Error = ParserError> + Clone {
    let joints = just("joints").ignore_then(block(
        whitespace().ignore_then(joint()).repeated(),
    ));

    key_value("MD5Version", unsigned::<u32>())
        .then_ignore(required_whitespace())
        .then(key_value("commandline", quoted_text()))
        .then_ignore(required_whitespace())
        .then(key_value("numJoints", unsigned::<usize>()))
        .then_ignore(required_whitespace())
        .then(key_value("numMeshes", unsigned::<usize>()))
        .then_ignore(required_whitespace())
        .then(joints)
        .then(whitespace().ignore_then(mesh_block()).repeated())
        .map(
            |(((((version, commandline), num_joints), num_meshes), joints), meshes)| {
                let mut counts = vec![
                    DeclaredCount::new(CountField::Joints, num_joints, joints.len()),
                    DeclaredCount::new(CountField::Meshes, num_meshes, meshes.len()),
                ];
                let meshes = meshes
                    .into_iter()
                    .map(|(mesh, mesh_counts)| {
                        counts.extend(mesh_counts);
                        mesh
                    })
                    .collect();
                let document = Md5Mesh {
                    version,
                    commandline,
                    joints,
                    meshes,
                };
                (document, counts)
            },
        )
}

impl Md5Record for Joint {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(joint(), text)
    }

    fn serialize(&self) -> String {
        format!(
            "\"{}\"\t{} {} {}\t\t//{}",
            self.name,
            self.parent_index,
            format_vec3(&self.position),
            format_vec3(&self.orientation),
            self.comment
        )
    }
}

impl Md5Record for Vert {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(vert(), text)
    }

    fn serialize(&self) -> String {
        format!(
            "vert {} {} {} {}",
            self.index,
            format_vec2(&self.uv),
            self.weight_start,
            self.weight_count
        )
    }
}

impl Md5Record for Tri {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(tri(), text)
    }

    fn serialize(&self) -> String {
        let [a, b, c] = self.verts;
        format!("tri {} {} {} {}", self.index, a, b, c)
    }
}

impl Md5Record for Weight {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(weight(), text)
    }

    fn serialize(&self) -> String {
        format!(
            "weight {} {} {} {}",
            self.index,
            self.joint_index,
            format_number(self.bias),
            format_vec3(&self.position)
        )
    }
}

impl Md5Record for Mesh {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        let (mesh, counts) = parse_complete(mesh_block(), text)?;
        check_counts(&counts)?;
        Ok(mesh)
    }

    fn serialize(&self) -> String {
        let mut out = String::from("mesh {\n");
        out.push_str(&format!("\t//{}\n", self.comment));
        out.push_str(&format!("\tshader \"{}\"\n\n", self.shader));

        out.push_str(&format!("\tnumverts {}\n", self.verts.len()));
        push_indented(&mut out, self.verts.iter().map(Md5Record::serialize));
        out.push('\n');

        out.push_str(&format!("\tnumtris {}\n", self.tris.len()));
        push_indented(&mut out, self.tris.iter().map(Md5Record::serialize));
        out.push('\n');

        out.push_str(&format!("\tnumweights {}\n", self.weights.len()));
        push_indented(&mut out, self.weights.iter().map(Md5Record::serialize));
        out.push_str("}\n");
        out
    }
}

impl Md5Record for Md5Mesh {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        Md5Mesh::parse_with(text, &ValidationOptions::default())
    }

    fn serialize(&self) -> String {
        let mut out = format!("MD5Version {}\n", self.version);
        out.push_str(&format!("commandline \"{}\"\n\n", self.commandline));
        out.push_str(&format!("numJoints {}\n", self.joints.len()));
        out.push_str(&format!("numMeshes {}\n\n", self.meshes.len()));

        out.push_str("joints {\n");
        push_indented(&mut out, self.joints.iter().map(Md5Record::serialize));
        out.push_str("}\n\n");

        let meshes: Vec<String> = self.meshes.iter().map(Md5Record::serialize).collect();
        out.push_str(&meshes.join("\n"));

        debug!(bytes = out.len(), "serialized md5mesh document");
        out
    }
}
