//! # md5model
//!
//! Reader and writer for the MD5 skeletal mesh and animation text formats, plus the
//! skinning math needed to pose them.
//!
//! See the [md5 module](md5) for an overview.

pub mod md5;

pub use md5::{Md5Anim, Md5Error, Md5Mesh, Md5Record, ValidationOptions};
