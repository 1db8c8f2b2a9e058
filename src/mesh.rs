//! Triangulated region surfaces and their OBJ serialization.
//!
//! Downstream atlas packaging expects one Wavefront OBJ file per structure
//! id, holding a plain vertex list followed by triangular faces. The files
//! are written once and treated as immutable afterwards; packaging may
//! rescale or reorient copies but never edits them in place.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Minimal on-disk size for a serialized mesh to count as viable.
///
/// Degenerate extractions (a handful of sliver triangles from a few stray
/// voxels) serialize to less than this and are dropped at reconciliation.
pub const MIN_OBJ_BYTES: u64 = 512;

/// A triangulated surface of one anatomical region.
///
/// `vertices` holds x,y,z positions in voxel coordinates, `faces` holds
/// 0-based index triples into the vertex list.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Mesh {
        Mesh {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// A mesh with no vertices or no faces encloses nothing and is treated
    /// as "no mesh" by the surface reconstructor.
    pub fn is_degenerate(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Write the mesh as a Wavefront OBJ file (`v` lines, then `f` lines
    /// with 1-based vertex indices).
    pub fn write_obj<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        for v in &self.vertices {
            writeln!(file, "v {} {} {}", v[0], v[1], v[2])?;
        }
        for f in &self.faces {
            writeln!(file, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
        }
        file.flush()?;
        Ok(())
    }
}

impl Default for Mesh {
    fn default() -> Mesh {
        Mesh::new()
    }
}
