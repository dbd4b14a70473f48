//! Structural checks that run after a successful parse
//!
//! Declared counts, frame ordering and writable text fields are part of the format and
//! always enforced.
//! Everything else here is governed by [`ValidationOptions`], which callers (and the
//! configuration file) can relax.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::anim::Md5Anim;
use super::error::{reference_index, CountField, Md5Error, ReferenceKind, TextField};
use super::mesh::{Joint, Mesh};

/// Which optional checks to run on a parsed or hand-built document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Parent, joint, vertex and weight indices must point inside their lists, and joint
    /// names must be unique
    pub check_references: bool,
    /// Frame parts must line up with the animated components declared in the hierarchy
    pub check_frame_layout: bool,
    /// When set, each vertex's bias sum must be within this distance of 1.0
    pub weight_sum_tolerance: Option<f64>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_references: true,
            check_frame_layout: true,
            weight_sum_tolerance: None,
        }
    }
}

impl ValidationOptions {
    /// Only the checks the format itself requires
    pub fn permissive() -> Self {
        Self {
            check_references: false,
            check_frame_layout: false,
            weight_sum_tolerance: None,
        }
    }
}

/// A count declared in the text next to the number of records actually parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeclaredCount {
    pub field: CountField,
    pub declared: usize,
    pub actual: usize,
}

impl DeclaredCount {
    pub fn new(field: CountField, declared: usize, actual: usize) -> Self {
        Self {
            field,
            declared,
            actual,
        }
    }
}

pub(crate) fn check_counts(counts: &[DeclaredCount]) -> Result<(), Md5Error> {
    match counts.iter().find(|c| c.declared != c.actual) {
        Some(c) => Err(Md5Error::CountMismatch {
            field: c.field,
            declared: c.declared,
            actual: c.actual,
        }),
        None => Ok(()),
    }
}

fn check_parent(kind: ReferenceKind, owner: usize, parent: i32) -> Result<(), Md5Error> {
    if parent == -1 || (parent >= 0 && (parent as usize) < owner) {
        Ok(())
    } else {
        Err(Md5Error::Reference {
            kind,
            owner,
            index: i64::from(parent),
            limit: owner,
        })
    }
}

fn check_unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<(), Md5Error> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, name) in names.enumerate() {
        if let Some(&first) = seen.get(name) {
            return Err(Md5Error::DuplicateJoint {
                name: name.to_string(),
                first,
                second: i,
            });
        }
        seen.insert(name, i);
    }
    Ok(())
}

fn unwritable(field: TextField, value: &str, reason: &'static str) -> Md5Error {
    Md5Error::UnwritableText {
        field,
        value: value.to_string(),
        reason,
    }
}

/// Quoted fields end at the first `"` and cannot escape one
fn check_quoted(field: TextField, value: &str, allow_empty: bool) -> Result<(), Md5Error> {
    if !allow_empty && value.is_empty() {
        return Err(unwritable(field, value, "must not be empty"));
    }
    if value.contains(|c: char| c == '"' || c == '\\') {
        return Err(unwritable(field, value, "contains a quote or backslash"));
    }
    Ok(())
}

/// Comments run to the end of their line
fn check_comment(value: &str) -> Result<(), Md5Error> {
    if value.contains(|c: char| c == '\n' || c == '\r') {
        return Err(unwritable(TextField::Comment, value, "contains a line break"));
    }
    Ok(())
}

/// Every string in a document must serialize to text that parses back to the same value.
/// `named` pairs each joint name with its trailing comment.
pub(crate) fn check_text<'a>(
    commandline: &str,
    named: impl Iterator<Item = (&'a str, &'a str)>,
    meshes: &[Mesh],
) -> Result<(), Md5Error> {
    check_quoted(TextField::Commandline, commandline, true)?;
    for (name, comment) in named {
        check_quoted(TextField::JointName, name, false)?;
        check_comment(comment)?;
    }
    for mesh in meshes {
        check_quoted(TextField::Shader, &mesh.shader, true)?;
        check_comment(&mesh.comment)?;
    }
    Ok(())
}

pub(crate) fn validate_joints(
    joints: &[Joint],
    options: &ValidationOptions,
) -> Result<(), Md5Error> {
    if !options.check_references {
        return Ok(());
    }
    for (i, joint) in joints.iter().enumerate() {
        check_parent(ReferenceKind::JointParent, i, joint.parent_index)?;
    }
    check_unique_names(joints.iter().map(|j| j.name.as_str()))
}

pub(crate) fn validate_mesh(
    mesh_index: usize,
    mesh: &Mesh,
    num_joints: usize,
    options: &ValidationOptions,
) -> Result<(), Md5Error> {
    if options.check_references {
        for (i, vert) in mesh.verts.iter().enumerate() {
            if vert.weights(&mesh.weights).is_none() {
                return Err(Md5Error::Reference {
                    kind: ReferenceKind::VertWeights,
                    owner: i,
                    index: vert.weight_end().map_or(i64::MAX, reference_index),
                    limit: mesh.weights.len(),
                });
            }
        }
        for (i, tri) in mesh.tris.iter().enumerate() {
            if let Some(&v) = tri.verts.iter().find(|&&v| v >= mesh.verts.len()) {
                return Err(Md5Error::Reference {
                    kind: ReferenceKind::TriVertex,
                    owner: i,
                    index: reference_index(v),
                    limit: mesh.verts.len(),
                });
            }
        }
        for (i, weight) in mesh.weights.iter().enumerate() {
            if weight.joint_index >= num_joints {
                return Err(Md5Error::Reference {
                    kind: ReferenceKind::WeightJoint,
                    owner: i,
                    index: reference_index(weight.joint_index),
                    limit: num_joints,
                });
            }
        }
    }

    if let Some(tolerance) = options.weight_sum_tolerance {
        for (i, vert) in mesh.verts.iter().enumerate() {
            let sum: f64 = vert
                .weights(&mesh.weights)
                .unwrap_or_default()
                .iter()
                .map(|w| w.bias)
                .sum();
            if (sum - 1.0).abs() > tolerance {
                return Err(Md5Error::WeightSum {
                    mesh: mesh_index,
                    vert: i,
                    sum,
                });
            }
        }
    }
    Ok(())
}

/// Frame indices must run 0, 1, 2, ... in document order
pub(crate) fn check_frame_order(anim: &Md5Anim) -> Result<(), Md5Error> {
    for (expected, frame) in anim.frames.iter().enumerate() {
        if frame.index != expected {
            return Err(Md5Error::FrameOrder {
                expected,
                found: frame.index,
            });
        }
    }
    Ok(())
}

pub(crate) fn validate_anim(anim: &Md5Anim, options: &ValidationOptions) -> Result<(), Md5Error> {
    // The parser compares these with numJoints/numFrames; built documents have no
    // declared counts, so the lists are compared with each other
    check_counts(&[
        DeclaredCount::new(
            CountField::BaseFrame,
            anim.hierarchy.len(),
            anim.base_frame.parts.len(),
        ),
        DeclaredCount::new(CountField::Bounds, anim.frames.len(), anim.bounds.len()),
    ])?;

    if options.check_references {
        for (i, entry) in anim.hierarchy.iter().enumerate() {
            check_parent(ReferenceKind::HierarchyParent, i, entry.parent_joint_index)?;
        }
        check_unique_names(anim.hierarchy.iter().map(|h| h.joint_name.as_str()))?;
    }

    if options.check_frame_layout {
        // Joints without animated components contribute no part to a frame
        let expected: Vec<usize> = anim
            .hierarchy
            .iter()
            .map(|h| h.component_count())
            .filter(|&n| n > 0)
            .collect();
        let total: usize = expected.iter().sum();
        if total != anim.num_animated_components {
            return Err(Md5Error::CountMismatch {
                field: CountField::AnimatedComponents,
                declared: anim.num_animated_components,
                actual: total,
            });
        }
        for frame in &anim.frames {
            let actual: Vec<usize> = frame.parts.iter().map(|p| p.values.len()).collect();
            if actual != expected {
                return Err(Md5Error::FrameLayout {
                    frame: frame.index,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_counts_reports_first_mismatch() {
        let counts = [
            DeclaredCount::new(CountField::Verts, 3, 3),
            DeclaredCount::new(CountField::Tris, 2, 1),
            DeclaredCount::new(CountField::Weights, 9, 0),
        ];
        assert_eq!(
            check_counts(&counts),
            Err(Md5Error::CountMismatch {
                field: CountField::Tris,
                declared: 2,
                actual: 1,
            })
        );
        assert_eq!(check_counts(&counts[..1]), Ok(()));
    }

    #[test]
    fn test_parent_must_precede_child() {
        assert!(check_parent(ReferenceKind::JointParent, 0, -1).is_ok());
        assert!(check_parent(ReferenceKind::JointParent, 3, 2).is_ok());
        assert_eq!(
            check_parent(ReferenceKind::JointParent, 2, 2),
            Err(Md5Error::Reference {
                kind: ReferenceKind::JointParent,
                owner: 2,
                index: 2,
                limit: 2,
            })
        );
        assert!(check_parent(ReferenceKind::JointParent, 4, -2).is_err());
    }

    #[test]
    fn test_unique_names() {
        assert!(check_unique_names(["origin", "waist"].into_iter()).is_ok());
        assert_eq!(
            check_unique_names(["origin", "waist", "origin"].into_iter()),
            Err(Md5Error::DuplicateJoint {
                name: "origin".to_string(),
                first: 0,
                second: 2,
            })
        );
    }

    #[test]
    fn test_quoted_fields() {
        assert!(check_quoted(TextField::Commandline, "", true).is_ok());
        assert!(check_quoted(TextField::JointName, "left hand", false).is_ok());
        assert_eq!(
            check_quoted(TextField::JointName, "", false),
            Err(Md5Error::UnwritableText {
                field: TextField::JointName,
                value: String::new(),
                reason: "must not be empty",
            })
        );
        assert!(check_quoted(TextField::Shader, "models\\skin", true).is_err());
        assert!(check_quoted(TextField::JointName, "a\"b", false).is_err());
    }

    #[test]
    fn test_comments_stay_on_one_line() {
        assert!(check_comment("  ( Tx Ty )").is_ok());
        assert!(check_comment("a\nb").is_err());
        assert!(check_comment("a\r").is_err());
    }

    #[test]
    fn test_check_text_covers_meshes() {
        let mesh = Mesh {
            comment: " body".to_string(),
            shader: "bad\"shader".to_string(),
            verts: vec![],
            tris: vec![],
            weights: vec![],
        };
        assert_eq!(
            check_text("", [("origin", "")].into_iter(), std::slice::from_ref(&mesh)),
            Err(Md5Error::UnwritableText {
                field: TextField::Shader,
                value: "bad\"shader".to_string(),
                reason: "contains a quote or backslash",
            })
        );
        assert!(check_text("", [("origin", "")].into_iter(), &[]).is_ok());
    }

    #[test]
    fn test_permissive_disables_optional_checks() {
        let options = ValidationOptions::permissive();
        assert!(!options.check_references);
        assert!(!options.check_frame_layout);
        assert_eq!(options.weight_sum_tolerance, None);
    }
}
