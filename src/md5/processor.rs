//! File processing API for md5 documents
//!
//! Ties parsing, validation and skinning together behind a small set of output formats so
//! the command-line tool (and tests) can turn a `.md5mesh` or `.md5anim` file into
//! canonical text, serde dumps, or decoded geometry in one call.
//!
//! ```rust,ignore
//! use md5model::md5::config::load_defaults;
//! use md5model::md5::processor::{process_file, OutputFormat};
//!
//! let config = load_defaults()?;
//! let text = process_file("models/imp.md5mesh", OutputFormat::Summary, &config)?;
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::anim::Md5Anim;
use super::config::Md5Config;
use super::error::Md5Error;
use super::lexical::{format_number, format_vec3};
use super::mesh::Md5Mesh;
use super::record::Md5Record;
use super::skinning::{joint_groups, mesh_positions};
use super::validation::ValidationOptions;

/// The two document families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Mesh,
    Anim,
}

impl DocumentKind {
    pub fn from_name(name: &str) -> Result<Self, ProcessingError> {
        match name {
            "mesh" | "md5mesh" => Ok(DocumentKind::Mesh),
            "anim" | "md5anim" => Ok(DocumentKind::Anim),
            other => Err(ProcessingError::UnknownKind(other.to_string())),
        }
    }

    /// Kind implied by a `.md5mesh` / `.md5anim` extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "md5mesh" => Some(DocumentKind::Mesh),
            "md5anim" => Some(DocumentKind::Anim),
            _ => None,
        }
    }

    /// Guess from the header: meshes declare `numJoints` first, animations `numFrames`
    pub fn detect(source: &str) -> Option<Self> {
        source.lines().find_map(|line| {
            let line = line.trim_start();
            if line.starts_with("numFrames") {
                Some(DocumentKind::Anim)
            } else if line.starts_with("numJoints") || line.starts_with("numMeshes") {
                Some(DocumentKind::Mesh)
            } else {
                None
            }
        })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Mesh => "md5mesh",
            DocumentKind::Anim => "md5anim",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Represents the output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Re-serialized document text
    Canonical,
    Json,
    Yaml,
    Summary,
    /// Bind-pose vertex positions (meshes only)
    Positions,
    /// Joint vertex groups (meshes only)
    Groups,
    /// Decoded joint poses per frame (animations only)
    Pose,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Canonical,
        OutputFormat::Json,
        OutputFormat::Yaml,
        OutputFormat::Summary,
        OutputFormat::Positions,
        OutputFormat::Groups,
        OutputFormat::Pose,
    ];

    pub fn from_name(name: &str) -> Result<Self, ProcessingError> {
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.name() == name)
            .ok_or_else(|| ProcessingError::InvalidFormat(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Canonical => "canonical",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
            OutputFormat::Summary => "summary",
            OutputFormat::Positions => "positions",
            OutputFormat::Groups => "groups",
            OutputFormat::Pose => "pose",
        }
    }

    pub fn supports(&self, kind: DocumentKind) -> bool {
        match self {
            OutputFormat::Positions | OutputFormat::Groups => kind == DocumentKind::Mesh,
            OutputFormat::Pose => kind == DocumentKind::Anim,
            _ => true,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every format together with the document kinds it accepts
pub fn available_formats() -> Vec<(OutputFormat, Vec<DocumentKind>)> {
    OutputFormat::ALL
        .into_iter()
        .map(|format| {
            let kinds = [DocumentKind::Mesh, DocumentKind::Anim]
                .into_iter()
                .filter(|kind| format.supports(*kind))
                .collect();
            (format, kinds)
        })
        .collect()
}

/// Errors that can occur during processing
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unknown document kind: {0}")]
    UnknownKind(String),

    #[error("Cannot tell whether {0} is a mesh or an animation; pass the kind explicitly")]
    UndetectedKind(String),

    #[error("Format '{format}' does not apply to {kind} documents")]
    UnsupportedFormat {
        format: OutputFormat,
        kind: DocumentKind,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Document(#[from] Md5Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A parsed document of either kind
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Mesh(Md5Mesh),
    Anim(Md5Anim),
}

impl Document {
    pub fn parse(
        source: &str,
        kind: DocumentKind,
        options: &ValidationOptions,
    ) -> Result<Self, Md5Error> {
        match kind {
            DocumentKind::Mesh => Md5Mesh::parse_with(source, options).map(Document::Mesh),
            DocumentKind::Anim => Md5Anim::parse_with(source, options).map(Document::Anim),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Mesh(_) => DocumentKind::Mesh,
            Document::Anim(_) => DocumentKind::Anim,
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            Document::Mesh(mesh) => mesh.serialize(),
            Document::Anim(anim) => anim.serialize(),
        }
    }
}

/// Read a document from disk
pub fn read_source(path: &Path) -> Result<String, ProcessingError> {
    if !path.exists() {
        return Err(ProcessingError::FileNotFound(path.display().to_string()));
    }
    fs::read_to_string(path).map_err(|source| ProcessingError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Kind from the file extension, falling back to the header
pub fn resolve_kind(path: &Path, source: &str) -> Result<DocumentKind, ProcessingError> {
    DocumentKind::from_path(path)
        .or_else(|| DocumentKind::detect(source))
        .ok_or_else(|| ProcessingError::UndetectedKind(path.display().to_string()))
}

/// Process a document file, detecting its kind
pub fn process_file<P: AsRef<Path>>(
    file_path: P,
    format: OutputFormat,
    config: &Md5Config,
) -> Result<String, ProcessingError> {
    let file_path = file_path.as_ref();
    let source = read_source(file_path)?;
    let kind = resolve_kind(file_path, &source)?;
    debug!(path = %file_path.display(), %kind, %format, "processing file");
    process_source(&source, kind, format, config)
}

/// Parse `source` as `kind` and render it in `format`
pub fn process_source(
    source: &str,
    kind: DocumentKind,
    format: OutputFormat,
    config: &Md5Config,
) -> Result<String, ProcessingError> {
    if !format.supports(kind) {
        return Err(ProcessingError::UnsupportedFormat { format, kind });
    }
    let document = Document::parse(source, kind, &config.validation)?;

    match (&document, format) {
        (_, OutputFormat::Canonical) => Ok(document.serialize()),
        (_, OutputFormat::Json) => to_json(&document, config.output.pretty),
        (_, OutputFormat::Yaml) => to_yaml(&document),
        (Document::Mesh(mesh), OutputFormat::Summary) => Ok(mesh_summary(mesh)),
        (Document::Anim(anim), OutputFormat::Summary) => Ok(anim_summary(anim)),
        (Document::Mesh(mesh), OutputFormat::Positions) => format_positions(mesh, config),
        (Document::Mesh(mesh), OutputFormat::Groups) => Ok(format_groups(mesh)),
        (Document::Anim(anim), OutputFormat::Pose) => format_pose(anim),
        (document, format) => Err(ProcessingError::UnsupportedFormat {
            format,
            kind: document.kind(),
        }),
    }
}

fn to_json(document: &Document, pretty: bool) -> Result<String, ProcessingError> {
    let result = match (document, pretty) {
        (Document::Mesh(mesh), true) => serde_json::to_string_pretty(mesh),
        (Document::Mesh(mesh), false) => serde_json::to_string(mesh),
        (Document::Anim(anim), true) => serde_json::to_string_pretty(anim),
        (Document::Anim(anim), false) => serde_json::to_string(anim),
    };
    result.map_err(|e| ProcessingError::Serialization(e.to_string()))
}

fn to_yaml(document: &Document) -> Result<String, ProcessingError> {
    let result = match document {
        Document::Mesh(mesh) => serde_yaml::to_string(mesh),
        Document::Anim(anim) => serde_yaml::to_string(anim),
    };
    result.map_err(|e| ProcessingError::Serialization(e.to_string()))
}

fn mesh_label(index: usize, name: &str) -> String {
    if name.is_empty() {
        format!("mesh {}", index)
    } else {
        format!("mesh {} ({})", index, name)
    }
}

fn mesh_summary(document: &Md5Mesh) -> String {
    let mut out = format!("md5mesh version {}\n", document.version);
    out.push_str(&format!("commandline: {:?}\n", document.commandline));
    out.push_str(&format!("joints: {}\n", document.num_joints()));
    out.push_str(&format!("meshes: {}\n", document.num_meshes()));
    for (i, mesh) in document.meshes.iter().enumerate() {
        out.push_str(&format!(
            "  {}: shader {:?}, {} verts, {} tris, {} weights\n",
            mesh_label(i, mesh.name()),
            mesh.shader,
            mesh.verts.len(),
            mesh.tris.len(),
            mesh.weights.len()
        ));
    }
    out
}

fn anim_summary(anim: &Md5Anim) -> String {
    let mut out = format!("md5anim version {}\n", anim.version);
    out.push_str(&format!("commandline: {:?}\n", anim.commandline));
    out.push_str(&format!("joints: {}\n", anim.num_joints()));
    out.push_str(&format!("frames: {}\n", anim.num_frames()));
    out.push_str(&format!("frame rate: {}\n", anim.frame_rate));
    out.push_str(&format!(
        "animated components: {}\n",
        anim.num_animated_components
    ));
    out
}

fn format_positions(document: &Md5Mesh, config: &Md5Config) -> Result<String, ProcessingError> {
    let mut cache = config.skinning.cache();
    let mut out = String::new();
    for (i, mesh) in document.meshes.iter().enumerate() {
        let positions = mesh_positions(mesh, &document.joints, &mut cache)?;
        out.push_str(&mesh_label(i, mesh.name()));
        out.push('\n');
        for (vert, position) in mesh.verts.iter().zip(positions) {
            out.push_str(&format!(
                "\t{} {}\n",
                vert.index,
                format_vec3(&position.to_array())
            ));
        }
    }
    debug!(
        hits = cache.hits(),
        misses = cache.misses(),
        "joint transform cache"
    );
    Ok(out)
}

fn format_groups(document: &Md5Mesh) -> String {
    let mut out = String::new();
    for (i, mesh) in document.meshes.iter().enumerate() {
        out.push_str(&mesh_label(i, mesh.name()));
        out.push('\n');
        for group in joint_groups(mesh, &document.joints) {
            let members: Vec<String> = group
                .members
                .iter()
                .map(|m| format!("{}:{}", m.vert, format_number(m.weight)))
                .collect();
            out.push_str(&format!(
                "\t{:?} {}: {}\n",
                group.name,
                group.joint_index,
                members.join(" ")
            ));
        }
    }
    out
}

fn format_pose(anim: &Md5Anim) -> Result<String, ProcessingError> {
    let mut out = String::new();
    for frame in 0..anim.num_frames() {
        out.push_str(&format!("frame {}\n", frame));
        let pose = anim.frame_pose(frame)?;
        for (entry, joint) in anim.hierarchy.iter().zip(pose) {
            out.push_str(&format!(
                "\t{:?} {} {}\n",
                entry.joint_name,
                format_vec3(&joint.position),
                format_vec3(&joint.orientation)
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::md5::config::load_defaults;
    use std::path::PathBuf;

    const MESH: &str = "MD5Version 10
commandline \"\"

numJoints 1
numMeshes 1

joints {
\t\"origin\"\t-1 ( 0 0 1 ) ( 0 0 0 )\t\t//
}

mesh {
\t// body
\tshader \"skin\"

\tnumverts 1
\tvert 0 ( 0 0 ) 0 1

\tnumtris 0

\tnumweights 1
\tweight 0 0 1 ( 1 2 3 )
}
";

    #[test]
    fn test_format_names_round_trip() {
        for format in OutputFormat::ALL {
            assert_eq!(OutputFormat::from_name(format.name()).unwrap(), format);
        }
        assert!(matches!(
            OutputFormat::from_name("xml"),
            Err(ProcessingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_kind_from_path_and_header() {
        assert_eq!(
            DocumentKind::from_path(&PathBuf::from("a/imp.MD5MESH")),
            Some(DocumentKind::Mesh)
        );
        assert_eq!(
            DocumentKind::from_path(&PathBuf::from("walk.md5anim")),
            Some(DocumentKind::Anim)
        );
        assert_eq!(DocumentKind::from_path(&PathBuf::from("walk.txt")), None);
        assert_eq!(DocumentKind::detect(MESH), Some(DocumentKind::Mesh));
        assert_eq!(
            DocumentKind::detect("MD5Version 10\ncommandline \"\"\n\nnumFrames 1\n"),
            Some(DocumentKind::Anim)
        );
        assert_eq!(DocumentKind::detect("hello"), None);
    }

    #[test]
    fn test_available_formats() {
        let formats = available_formats();
        assert_eq!(formats.len(), OutputFormat::ALL.len());
        let pose = formats
            .iter()
            .find(|(format, _)| *format == OutputFormat::Pose)
            .unwrap();
        assert_eq!(pose.1, vec![DocumentKind::Anim]);
    }

    #[test]
    fn test_canonical_output() {
        let config = load_defaults().unwrap();
        let output =
            process_source(MESH, DocumentKind::Mesh, OutputFormat::Canonical, &config).unwrap();
        assert_eq!(output, MESH);
    }

    #[test]
    fn test_positions_output() {
        let config = load_defaults().unwrap();
        let output =
            process_source(MESH, DocumentKind::Mesh, OutputFormat::Positions, &config).unwrap();
        assert_eq!(output, "mesh 0 (body)\n\t0 ( 1 2 4 )\n");
    }

    #[test]
    fn test_groups_output() {
        let config = load_defaults().unwrap();
        let output =
            process_source(MESH, DocumentKind::Mesh, OutputFormat::Groups, &config).unwrap();
        assert_eq!(output, "mesh 0 (body)\n\t\"origin\" 0: 0:1\n");
    }

    #[test]
    fn test_json_output_is_structured() {
        let config = load_defaults().unwrap();
        let output =
            process_source(MESH, DocumentKind::Mesh, OutputFormat::Json, &config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["joints"][0]["name"], "origin");
        assert_eq!(value["meshes"][0]["shader"], "skin");
    }

    #[test]
    fn test_mesh_rejects_pose_format() {
        let config = load_defaults().unwrap();
        let err = process_source(MESH, DocumentKind::Mesh, OutputFormat::Pose, &config)
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::UnsupportedFormat {
                format: OutputFormat::Pose,
                kind: DocumentKind::Mesh,
            }
        ));
    }

    #[test]
    fn test_parse_failure_surfaces_document_error() {
        let config = load_defaults().unwrap();
        let text = MESH.replace("numverts 1", "numverts 2");
        let err = process_source(&text, DocumentKind::Mesh, OutputFormat::Summary, &config)
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Document(Md5Error::CountMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let config = load_defaults().unwrap();
        let err = process_file("/nonexistent/model.md5mesh", OutputFormat::Summary, &config)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::FileNotFound(_)));
    }
}
