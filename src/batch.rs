//! Batch mesh construction over all regions of a structure tree, plus the
//! final reconciliation of structures against the mesh files that actually
//! made it to disk.
//!
//! The per-region work (subtree mask, surface reconstruction, OBJ write) is
//! embarrassingly parallel: workers share only read-only views of the
//! annotation volume and the tree, and each writes to a distinct output
//! path derived from its structure id. Failure isolation follows the
//! pipeline's policy: a region without a producible surface, a failing
//! task or a panicking worker just means that region is dropped (and
//! logged), while structural and directory-level I/O problems abort the
//! run.

use std::collections::BTreeMap;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::error::{AtlasMeshError, Result};
use crate::labels::{annotate_presence, collect_labels, region_mask};
use crate::mesh::MIN_OBJ_BYTES;
use crate::structures::{StructureRecord, StructureTree};
use crate::surface::{reconstruct_surface, SurfaceOptions};

/// Cores left free when sizing the default worker pool.
const WORKER_RESERVE: usize = 2;

/// Configuration for a batch mesh run, supplied by the calling atlas script.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshJobOptions {
    /// Morphological closing passes per region mask.
    pub closing_iterations: usize,
    /// Fraction in (0, 1] of extracted vertices to retain.
    pub decimate_fraction: f64,
    /// Laplacian smoothing after decimation.
    pub smooth: bool,
    /// Fan out over a worker pool instead of meshing sequentially.
    pub parallel: bool,
    /// Worker pool size; `None` derives it from the available cores minus
    /// a small reserve.
    pub workers: Option<usize>,
}

impl Default for MeshJobOptions {
    fn default() -> MeshJobOptions {
        MeshJobOptions {
            closing_iterations: 2,
            decimate_fraction: 0.2,
            smooth: false,
            parallel: true,
            workers: None,
        }
    }
}

impl MeshJobOptions {
    fn surface_options(&self) -> SurfaceOptions {
        SurfaceOptions {
            closing_iterations: self.closing_iterations,
            decimate_fraction: self.decimate_fraction,
            smooth: self.smooth,
        }
    }

    /// Effective worker pool size, always at least 1.
    pub fn worker_count(&self) -> usize {
        let workers = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .saturating_sub(WORKER_RESERVE)
        });
        workers.max(1)
    }
}

/// What a single region mesh task produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshOutcome {
    /// A new mesh file was written.
    Written,
    /// A mesh file was already on disk and was left untouched, so
    /// interrupted runs can resume.
    Existing,
    /// The region mask was empty or the surface degenerate; no file written.
    Empty,
}

impl MeshOutcome {
    fn describe(&self) -> &'static str {
        match self {
            MeshOutcome::Written => "mesh written",
            MeshOutcome::Existing => "existing mesh kept",
            MeshOutcome::Empty => "no mesh",
        }
    }
}

enum TaskStatus {
    Done(MeshOutcome),
    Failed(AtlasMeshError),
    Panicked,
}

/// Run one mesh task with panic isolation.
///
/// A panicking worker must not tear down the batch: the panic is caught
/// here and reported as [`TaskStatus::Panicked`], which the batch treats
/// like any other dropped region.
fn run_isolated<F>(task: F) -> TaskStatus
where
    F: FnOnce() -> Result<MeshOutcome>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(outcome)) => TaskStatus::Done(outcome),
        Ok(Err(err)) => TaskStatus::Failed(err),
        Err(_) => TaskStatus::Panicked,
    }
}

/// Construct and write the mesh for one region.
///
/// The output file is `{id}.obj` under `meshes_dir`. An already existing
/// file is kept as-is. An empty subtree mask or degenerate surface reports
/// [`MeshOutcome::Empty`] instead of failing.
pub fn mesh_region(
    volume: ArrayView3<i32>,
    tree: &StructureTree,
    id: u32,
    meshes_dir: &Path,
    options: &SurfaceOptions,
) -> Result<MeshOutcome> {
    let path = meshes_dir.join(format!("{}.obj", id));
    if path.exists() {
        return Ok(MeshOutcome::Existing);
    }

    let mask = region_mask(volume, tree, id)?;
    match reconstruct_surface(&mask, options) {
        Some(mesh) => {
            mesh.write_obj(&path)?;
            Ok(MeshOutcome::Written)
        }
        None => Ok(MeshOutcome::Empty),
    }
}

/// Mesh every region of the tree and reconcile the structure list against
/// the produced files.
///
/// Annotates label presence, fans the per-region tasks out over a dedicated
/// worker pool (or runs them in order when `parallel` is off), then returns
/// the filtered structure list and the id-to-path map of all viable meshes.
/// Progress and dropped regions are reported through `log`.
///
/// Worker panics and per-task failures are converted into "no mesh" for the
/// affected region; only structural errors, a failing pool build and I/O
/// errors (mesh directory creation, file writes) are propagated.
pub fn mesh_all_regions(
    volume: ArrayView3<i32>,
    tree: &StructureTree,
    structures: &[StructureRecord],
    meshes_dir: &Path,
    options: &MeshJobOptions,
) -> Result<(Vec<StructureRecord>, BTreeMap<u32, PathBuf>)> {
    fs::create_dir_all(meshes_dir)?;

    let labels = collect_labels(volume);
    let presence = annotate_presence(tree, &labels);
    let present = presence.values().filter(|p| **p).count();
    info!(
        "{} of {} structures occur as voxel labels in the annotation volume",
        present,
        tree.size()
    );

    let surface_options = options.surface_options();
    let total = structures.len();
    let completed = AtomicUsize::new(0);

    let run_one = |record: &StructureRecord| -> (u32, TaskStatus) {
        let status = run_isolated(|| {
            mesh_region(volume, tree, record.id, meshes_dir, &surface_options)
        });
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        match &status {
            TaskStatus::Done(outcome) => {
                info!(
                    "[{}/{}] {} ({}): {}",
                    done,
                    total,
                    record.name,
                    record.acronym,
                    outcome.describe()
                );
            }
            TaskStatus::Failed(err) => {
                warn!(
                    "[{}/{}] {} ({}): task failed: {}",
                    done, total, record.name, record.acronym, err
                );
            }
            TaskStatus::Panicked => {
                warn!(
                    "[{}/{}] {} ({}): mesh worker panicked, treating as no mesh",
                    done, total, record.name, record.acronym
                );
            }
        }
        (record.id, status)
    };

    let statuses: Vec<(u32, TaskStatus)> = if options.parallel {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_count())
            .build()
            .map_err(|e| AtlasMeshError::ThreadPool(e.to_string()))?;
        pool.install(|| structures.par_iter().map(run_one).collect())
    } else {
        structures.iter().map(run_one).collect()
    };

    // Per-task failures were already logged and count as "no mesh", except
    // for I/O errors: a full disk or unwritable directory invalidates the
    // whole run.
    for (_, status) in statuses {
        if let TaskStatus::Failed(err) = status {
            if let AtlasMeshError::Io(_) = err {
                return Err(err);
            }
        }
    }

    let (kept, meshes) = reconcile_structures(structures, meshes_dir);
    info!(
        "{} of {} structures retained a viable mesh",
        kept.len(),
        structures.len()
    );
    Ok((kept, meshes))
}

/// Filter the structure list down to regions with a viable mesh file.
///
/// Viability is re-derived from the filesystem, independent of task
/// completion order: `{id}.obj` must exist under `meshes_dir` and have at
/// least [`MIN_OBJ_BYTES`] bytes. The returned list is a subsequence of the
/// input (same values, same relative order); the map holds exactly the kept
/// ids. Every dropped region is logged by name and acronym.
pub fn reconcile_structures(
    structures: &[StructureRecord],
    meshes_dir: &Path,
) -> (Vec<StructureRecord>, BTreeMap<u32, PathBuf>) {
    let mut kept: Vec<StructureRecord> = Vec::with_capacity(structures.len());
    let mut meshes: BTreeMap<u32, PathBuf> = BTreeMap::new();

    for record in structures {
        let path = meshes_dir.join(format!("{}.obj", record.id));
        match fs::metadata(&path) {
            Err(_) => {
                warn!(
                    "No mesh file exists for {} ({}), dropping it",
                    record.name, record.acronym
                );
            }
            Ok(meta) if meta.len() < MIN_OBJ_BYTES => {
                warn!(
                    "Mesh file for {} ({}) has less than {} bytes, dropping it",
                    record.name, record.acronym, MIN_OBJ_BYTES
                );
            }
            Ok(_) => {
                kept.push(record.clone());
                meshes.insert(record.id, path);
            }
        }
    }

    if kept.is_empty() {
        warn!("Not a single structure retained a viable mesh");
    }

    (kept, meshes)
}
