//! Region mesh generation for neuroanatomical atlas packaging.
//!
//! Atlas packaging pipelines supply three things: a 3D annotation volume
//! (voxel value = structure id, 0 = background), a flat list of structure
//! records with root-first id paths, and the id of the hierarchy root. This
//! crate builds the structure tree, derives a voxel mask per region by
//! unioning labels over the region's subtree, reconstructs a closed
//! triangulated surface per mask (morphological closing, surface nets
//! extraction, decimation, optional smoothing), writes one OBJ file per
//! region, and reconciles the structure list against the meshes that turned
//! out viable. Everything around it (downloading source data, parsing
//! vendor ontology formats, final archive assembly) stays in the calling
//! atlas script.
//!
//! ```no_run
//! use atlasmesh::{mesh_all_regions, MeshJobOptions, StructureRecord, StructureTree};
//! use ndarray::Array3;
//! use std::path::Path;
//!
//! let annotation: Array3<i32> = Array3::zeros((100, 100, 100)); // from the atlas source
//! let structures = vec![
//!     StructureRecord::new(997, "root", "root", vec![997], [255, 255, 255]),
//!     StructureRecord::new(8, "grey", "Basic cell groups and regions", vec![997, 8], [191, 218, 227]),
//! ];
//!
//! let tree = StructureTree::build(&structures, 997).unwrap();
//! let (with_mesh, mesh_paths) = mesh_all_regions(
//!     annotation.view(),
//!     &tree,
//!     &structures,
//!     Path::new("working_dir/meshes"),
//!     &MeshJobOptions::default(),
//! )
//! .unwrap();
//! ```

pub mod batch;
pub mod error;
pub mod labels;
pub mod mesh;
pub mod morphology;
pub mod structures;
pub mod surface;

pub use batch::{mesh_all_regions, mesh_region, reconcile_structures, MeshJobOptions, MeshOutcome};
pub use error::{AtlasMeshError, Result};
pub use labels::{annotate_presence, collect_labels, region_mask};
pub use mesh::{Mesh, MIN_OBJ_BYTES};
pub use morphology::binary_closing;
pub use structures::{StructureRecord, StructureTree};
pub use surface::{extract_surface, reconstruct_surface, SurfaceOptions};
