//! Animation documents: joint hierarchy, per-frame bounds, base pose and frames
//!
//! A frame stores only the animated components of each joint, one line per joint that has
//! any. [`Md5Anim::frame_pose`] expands those values over the base frame using each
//! hierarchy entry's flags and `startIndex`.

use chumsky::prelude::*;
use glam::DMat4;
use tracing::debug;

use super::error::{reference_index, CountField, Md5Error, ReferenceKind};
use super::lexical::{
    block, format_number, format_vec3, integer, key_value, number, push_indented, quoted_string,
    quoted_text, required_whitespace, trailing_comment, unsigned, vec3, whitespace, ParserError,
};
use super::record::{parse_complete, Md5Record};
use super::skinning::JointPose;
use super::validation::{
    check_counts, check_frame_order, check_text, validate_anim, DeclaredCount,
    ValidationOptions,
};

/// One of the six scalar channels a hierarchy entry can animate, in flag bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Component {
    Tx,
    Ty,
    Tz,
    Qx,
    Qy,
    Qz,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Tx,
        Component::Ty,
        Component::Tz,
        Component::Qx,
        Component::Qy,
        Component::Qz,
    ];

    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Hierarchy {
    pub joint_name: String,
    pub parent_joint_index: i32,
    /// Bit set over [`Component`]; only the low six bits are meaningful
    pub flags: u32,
    /// Offset of this joint's first animated value in a flattened frame
    pub start_index: usize,
    pub comment: String,
}

impl Hierarchy {
    pub fn animated_components(&self) -> Vec<Component> {
        Component::ALL
            .into_iter()
            .filter(|c| self.flags & c.bit() != 0)
            .collect()
    }

    pub fn component_count(&self) -> usize {
        (self.flags & 0x3f).count_ones() as usize
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bound {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BaseFramePart {
    pub position: [f64; 3],
    pub orientation: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct BaseFrame {
    pub parts: Vec<BaseFramePart>,
}

/// The animated values one joint contributes to one frame
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FramePart {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    pub index: usize,
    pub parts: Vec<FramePart>,
}

impl Frame {
    /// All parts concatenated; hierarchy start indices address this list
    pub fn values(&self) -> Vec<f64> {
        self.parts
            .iter()
            .flat_map(|p| p.values.iter().copied())
            .collect()
    }
}

/// Root of a `.md5anim` document
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Md5Anim {
    pub version: u32,
    pub commandline: String,
    pub frame_rate: u32,
    pub num_animated_components: usize,
    pub hierarchy: Vec<Hierarchy>,
    pub bounds: Vec<Bound>,
    pub base_frame: BaseFrame,
    pub frames: Vec<Frame>,
}

impl Md5Anim {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_joints(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn parse_with(text: &str, options: &ValidationOptions) -> Result<Self, Md5Error> {
        let (document, counts) = parse_complete(md5anim_document(), text)?;
        check_counts(&counts)?;
        document.validate(options)?;
        debug!(
            joints = document.hierarchy.len(),
            frames = document.frames.len(),
            frame_rate = document.frame_rate,
            "parsed md5anim document"
        );
        Ok(document)
    }

    /// Frame ordering, list lengths and text fields are always checked; the rest follows
    /// `options`
    pub fn validate(&self, options: &ValidationOptions) -> Result<(), Md5Error> {
        check_frame_order(self)?;
        check_text(
            &self.commandline,
            self.hierarchy
                .iter()
                .map(|h| (h.joint_name.as_str(), h.comment.as_str())),
            &[],
        )?;
        validate_anim(self, options)
    }

    /// Parent-relative joint poses for `frame`: the base frame with the frame's animated
    /// components written over it
    pub fn frame_pose(&self, frame: usize) -> Result<Vec<JointPose>, Md5Error> {
        let frame_data = self.frames.get(frame).ok_or(Md5Error::MissingFrame {
            frame,
            num_frames: self.frames.len(),
        })?;
        if self.base_frame.parts.len() != self.hierarchy.len() {
            return Err(Md5Error::CountMismatch {
                field: CountField::BaseFrame,
                declared: self.hierarchy.len(),
                actual: self.base_frame.parts.len(),
            });
        }
        let values = frame_data.values();

        self.hierarchy
            .iter()
            .zip(&self.base_frame.parts)
            .enumerate()
            .map(|(joint, (entry, base))| -> Result<JointPose, Md5Error> {
                let [px, py, pz] = base.position;
                let [qx, qy, qz] = base.orientation;
                let mut channels = [px, py, pz, qx, qy, qz];
                for (offset, component) in entry.animated_components().into_iter().enumerate() {
                    let at = entry.start_index.saturating_add(offset);
                    channels[component as usize] =
                        *values.get(at).ok_or(Md5Error::Reference {
                            kind: ReferenceKind::FrameComponent,
                            owner: joint,
                            index: reference_index(at),
                            limit: values.len(),
                        })?;
                }
                let [px, py, pz, qx, qy, qz] = channels;
                Ok(JointPose {
                    position: [px, py, pz],
                    orientation: [qx, qy, qz],
                })
            })
            .collect()
    }

    /// Model-space joint matrices for `frame`, each parent applied before its children
    pub fn model_transforms(&self, frame: usize) -> Result<Vec<DMat4>, Md5Error> {
        let poses = self.frame_pose(frame)?;
        let mut model: Vec<DMat4> = Vec::with_capacity(poses.len());
        for (joint, (entry, pose)) in self.hierarchy.iter().zip(&poses).enumerate() {
            let local = pose.transform();
            let transform = match usize::try_from(entry.parent_joint_index) {
                Err(_) => local,
                Ok(parent) => match model.get(parent) {
                    Some(parent_transform) => *parent_transform * local,
                    None => {
                        return Err(Md5Error::Reference {
                            kind: ReferenceKind::HierarchyParent,
                            owner: joint,
                            index: i64::from(entry.parent_joint_index),
                            limit: joint,
                        })
                    }
                },
            };
            model.push(transform);
        }
        Ok(model)
    }
}

pub(crate) fn hierarchy_entry() -> impl Parser<char, Hierarchy, Error = ParserError> + Clone {
    quoted_string()
        .then_ignore(required_whitespace())
        .then(integer::<i32>())
        .then_ignore(required_whitespace())
        .then(unsigned::<u32>())
        .then_ignore(required_whitespace())
        .then(unsigned::<usize>())
        .then(trailing_comment())
        .map(
            |((((joint_name, parent_joint_index), flags), start_index), comment)| Hierarchy {
                joint_name,
                parent_joint_index,
                flags,
                start_index,
                comment,
            },
        )
        .labelled("hierarchy entry")
}

pub(crate) fn bound() -> impl Parser<char, Bound, Error = ParserError> + Clone {
    vec3()
        .then_ignore(whitespace())
        .then(vec3())
        .map(|(min, max)| Bound { min, max })
        .labelled("bound")
}

pub(crate) fn base_frame_part() -> impl Parser<char, BaseFramePart, Error = ParserError> + Clone
{
    vec3()
        .then_ignore(whitespace())
        .then(vec3())
        .map(|(position, orientation)| BaseFramePart {
            position,
            orientation,
        })
}

pub(crate) fn base_frame() -> impl Parser<char, BaseFrame, Error = ParserError> + Clone {
    just("baseframe")
        .ignore_then(block(
            whitespace().ignore_then(base_frame_part()).repeated(),
        ))
        .map(|parts| BaseFrame { parts })
        .labelled("baseframe")
}

/// Numbers separated by spaces or tabs; a line break ends the part
pub(crate) fn frame_part() -> impl Parser<char, FramePart, Error = ParserError> + Clone {
    let separator = one_of(" \t").repeated().at_least(1);
    number()
        .then(separator.ignore_then(number()).repeated())
        .map(|(first, rest)| {
            let mut values = Vec::with_capacity(rest.len() + 1);
            values.push(first);
            values.extend(rest);
            FramePart { values }
        })
}

pub(crate) fn frame() -> impl Parser<char, Frame, Error = ParserError> + Clone {
    key_value("frame", unsigned::<usize>())
        .then(block(whitespace().ignore_then(frame_part()).repeated()))
        .map(|(index, parts)| Frame { index, parts })
}

pub(crate) fn md5anim_document(
) -> impl Parser<char, (Md5Anim, Vec<DeclaredCount>), Error = ParserError> + Clone {
    let header = key_value("MD5Version", unsigned::<u32>())
        .then_ignore(required_whitespace())
        .then(key_value("commandline", quoted_text()))
        .then_ignore(required_whitespace())
        .then(key_value("numFrames", unsigned::<usize>()))
        .then_ignore(required_whitespace())
        .then(key_value("numJoints", unsigned::<usize>()))
        .then_ignore(required_whitespace())
        .then(key_value("frameRate", unsigned::<u32>()))
        .then_ignore(required_whitespace())
        .then(key_value("numAnimatedComponents", unsigned::<usize>()))
        .then_ignore(required_whitespace());

    let hierarchy = just("hierarchy").ignore_then(block(
        whitespace().ignore_then(hierarchy_entry()).repeated(),
    ));
    let bounds = just("bounds").ignore_then(block(whitespace().ignore_then(bound()).repeated()));

    header
        .then(hierarchy)
        .then_ignore(whitespace())
        .then(bounds)
        .then_ignore(whitespace())
        .then(base_frame())
        .then(whitespace().ignore_then(frame()).repeated())
        .map(
            |(
                (
                    (
                        (
                            (
                                ((((version, commandline), num_frames), num_joints), frame_rate),
                                num_animated_components,
                            ),
                            hierarchy,
                        ),
                        bounds,
                    ),
                    base_frame,
                ),
                frames,
            )| {
                let counts = vec![
                    DeclaredCount::new(CountField::Hierarchy, num_joints, hierarchy.len()),
                    DeclaredCount::new(CountField::Bounds, num_frames, bounds.len()),
                    DeclaredCount::new(CountField::BaseFrame, num_joints, base_frame.parts.len()),
                    DeclaredCount::new(CountField::Frames, num_frames, frames.len()),
                ];
                let document = Md5Anim {
                    version,
                    commandline,
                    frame_rate,
                    num_animated_components,
                    hierarchy,
                    bounds,
                    base_frame,
                    frames,
                };
                (document, counts)
            },
        )
        .boxed()
}

impl Md5Record for Hierarchy {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(hierarchy_entry(), text)
    }

    fn serialize(&self) -> String {
        format!(
            "\"{}\"\t{} {} {}\t//{}",
            self.joint_name, self.parent_joint_index, self.flags, self.start_index, self.comment
        )
    }
}

impl Md5Record for Bound {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(bound(), text)
    }

    fn serialize(&self) -> String {
        format!("{} {}", format_vec3(&self.min), format_vec3(&self.max))
    }
}

impl Md5Record for BaseFramePart {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(base_frame_part(), text)
    }

    fn serialize(&self) -> String {
        format!(
            "{} {}",
            format_vec3(&self.position),
            format_vec3(&self.orientation)
        )
    }
}

impl Md5Record for BaseFrame {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(base_frame(), text)
    }

    fn serialize(&self) -> String {
        let mut out = String::from("baseframe {\n");
        push_indented(&mut out, self.parts.iter().map(Md5Record::serialize));
        out.push_str("}\n");
        out
    }
}

impl Md5Record for FramePart {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(frame_part(), text)
    }

    fn serialize(&self) -> String {
        self.values
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Md5Record for Frame {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        parse_complete(frame(), text)
    }

    fn serialize(&self) -> String {
        let mut out = format!("frame {} {{\n", self.index);
        push_indented(&mut out, self.parts.iter().map(Md5Record::serialize));
        out.push_str("}\n");
        out
    }
}

impl Md5Record for Md5Anim {
    fn parse(text: &str) -> Result<Self, Md5Error> {
        Md5Anim::parse_with(text, &ValidationOptions::default())
    }

    fn serialize(&self) -> String {
        let mut out = format!("MD5Version {}\n", self.version);
        out.push_str(&format!("commandline \"{}\"\n\n", self.commandline));
        out.push_str(&format!("numFrames {}\n", self.frames.len()));
        out.push_str(&format!("numJoints {}\n", self.hierarchy.len()));
        out.push_str(&format!("frameRate {}\n", self.frame_rate));
        out.push_str(&format!(
            "numAnimatedComponents {}\n\n",
            self.num_animated_components
        ));

        out.push_str("hierarchy {\n");
        push_indented(&mut out, self.hierarchy.iter().map(Md5Record::serialize));
        out.push_str("}\n\n");

        out.push_str("bounds {\n");
        push_indented(&mut out, self.bounds.iter().map(Md5Record::serialize));
        out.push_str("}\n\n");

        out.push_str(&self.base_frame.serialize());
        out.push('\n');

        let frames: Vec<String> = self.frames.iter().map(Md5Record::serialize).collect();
        out.push_str(&frames.join("\n"));

        debug!(bytes = out.len(), "serialized md5anim document");
        out
    }
}
