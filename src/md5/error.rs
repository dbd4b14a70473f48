//! Error types for parsing and validating MD5 documents
//!
//! Grammar failures surface as [`Md5Error::Syntax`] with the offending offset and what the
//! grammar expected there. Structural failures (declared counts, frame order, dangling
//! indices) are reported after a successful parse and keep the numbers involved so the
//! caller can print a useful diagnostic.

use chumsky::error::{Simple, SimpleReason};
use std::fmt;
use thiserror::Error;

use super::location::{Location, Position, SourceLocation};

/// A grammar failure at a specific point of the input
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    /// Char offset into the source
    pub offset: usize,
    pub position: Position,
    /// Extent of the offending input
    pub span: Location,
    /// Rendered tokens that would have been accepted at `offset`
    pub expected: Vec<String>,
    /// `None` when the input ended
    pub found: Option<char>,
    /// Innermost labelled rule active at the failure
    pub label: Option<&'static str>,
    pub message: Option<String>,
}

impl SyntaxError {
    pub(crate) fn from_simple(source: &SourceLocation, error: &Simple<char>) -> Self {
        let offset = error.span().start;
        let mut expected: Vec<String> = error
            .expected()
            .map(|token| match token {
                Some(c) => format!("{:?}", c),
                None => "end of input".to_string(),
            })
            .collect();
        expected.sort();
        expected.dedup();

        let message = match error.reason() {
            SimpleReason::Custom(msg) => Some(msg.clone()),
            SimpleReason::Unclosed { delimiter, .. } => {
                Some(format!("unclosed delimiter {:?}", delimiter))
            }
            SimpleReason::Unexpected => None,
        };

        SyntaxError {
            offset,
            position: source.offset_to_position(offset),
            span: source.range_to_location(&error.span()),
            expected,
            found: error.found().copied(),
            label: error.label(),
            message,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.position)?;
        match &self.message {
            Some(msg) => write!(f, "{}", msg)?,
            None => {
                let found = match self.found {
                    Some(c) => format!("{:?}", c),
                    None => "end of input".to_string(),
                };
                if self.expected.is_empty() {
                    write!(f, "unexpected {}", found)?;
                } else {
                    write!(f, "expected {}, found {}", self.expected.join(" or "), found)?;
                }
            }
        }
        if let Some(label) = self.label {
            write!(f, " while parsing {}", label)?;
        }
        Ok(())
    }
}

/// The declared-count keys of both document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountField {
    Verts,
    Tris,
    Weights,
    Joints,
    Meshes,
    Hierarchy,
    Bounds,
    BaseFrame,
    Frames,
    AnimatedComponents,
}

impl CountField {
    /// The keyword that declares the count in the text
    pub fn keyword(&self) -> &'static str {
        match self {
            CountField::Verts => "numverts",
            CountField::Tris => "numtris",
            CountField::Weights => "numweights",
            CountField::Joints | CountField::Hierarchy | CountField::BaseFrame => "numJoints",
            CountField::Meshes => "numMeshes",
            CountField::Bounds | CountField::Frames => "numFrames",
            CountField::AnimatedComponents => "numAnimatedComponents",
        }
    }

    fn counted(&self) -> &'static str {
        match self {
            CountField::Verts => "vert records",
            CountField::Tris => "tri records",
            CountField::Weights => "weight records",
            CountField::Joints => "joints",
            CountField::Meshes => "mesh blocks",
            CountField::Hierarchy => "hierarchy entries",
            CountField::Bounds => "bounds",
            CountField::BaseFrame => "baseframe entries",
            CountField::Frames => "frame blocks",
            CountField::AnimatedComponents => "animated components in the hierarchy flags",
        }
    }
}

impl fmt::Display for CountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.keyword(), self.counted())
    }
}

/// Index fields that point into another list of the same document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Must be -1 or an earlier joint
    JointParent,
    HierarchyParent,
    WeightJoint,
    TriVertex,
    /// `weightStart + weightCount` past the end of the weight list
    VertWeights,
    /// A hierarchy `startIndex` plus its animated components past the end of a frame
    FrameComponent,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceKind::JointParent => "joint parent",
            ReferenceKind::HierarchyParent => "hierarchy parent",
            ReferenceKind::WeightJoint => "weight joint",
            ReferenceKind::TriVertex => "tri vertex",
            ReferenceKind::VertWeights => "vert weight range",
            ReferenceKind::FrameComponent => "frame component",
        };
        f.write_str(name)
    }
}

/// A free-text field of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    JointName,
    Commandline,
    Shader,
    Comment,
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextField::JointName => "joint name",
            TextField::Commandline => "commandline",
            TextField::Shader => "shader",
            TextField::Comment => "comment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Md5Error {
    #[error("syntax error at {0}")]
    Syntax(SyntaxError),

    #[error("{field} declared {declared} but {actual} found")]
    CountMismatch {
        field: CountField,
        declared: usize,
        actual: usize,
    },

    #[error("frames out of order: expected frame {expected}, found frame {found}")]
    FrameOrder { expected: usize, found: usize },

    #[error("{kind} of record {owner} is {index}, outside the valid range 0..{limit}")]
    Reference {
        kind: ReferenceKind,
        owner: usize,
        index: i64,
        limit: usize,
    },

    #[error("joint name {name:?} is used by joints {first} and {second}")]
    DuplicateJoint {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("frame {frame}: part lengths {actual:?} do not match the animated components {expected:?}")]
    FrameLayout {
        frame: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("mesh {mesh} vert {vert}: weight biases sum to {sum}")]
    WeightSum { mesh: usize, vert: usize, sum: f64 },

    #[error("frame {frame} requested but the animation has {num_frames} frames")]
    MissingFrame { frame: usize, num_frames: usize },

    #[error("{field} {value:?} cannot be written: {reason}")]
    UnwritableText {
        field: TextField,
        value: String,
        reason: &'static str,
    },
}

/// Fit a `usize` index into the signed field of [`Md5Error::Reference`]
pub(crate) fn reference_index(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

impl Md5Error {
    /// Collapse the parser's error list into the failure that got furthest into the input
    pub(crate) fn from_parse_errors(source: &str, errors: Vec<Simple<char>>) -> Self {
        let location = SourceLocation::new(source);
        let furthest = errors.iter().max_by_key(|e| e.span().start);
        match furthest {
            Some(error) => Md5Error::Syntax(SyntaxError::from_simple(&location, error)),
            None => Md5Error::Syntax(SyntaxError {
                offset: 0,
                position: Position::default(),
                span: Location::default(),
                expected: vec![],
                found: source.chars().next(),
                label: None,
                message: Some("input rejected".to_string()),
            }),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Md5Error::Syntax(_))
    }
}
