//! Binary morphology on voxel masks.
//!
//! Annotation volumes are voxelized label rasters, so the boundary of a
//! region mask is full of single-voxel gaps and staircase steps. Closing
//! (dilation followed by erosion) removes those before iso-surface
//! extraction. All operations use the 6-connected neighborhood and treat
//! everything outside the volume as background.

use ndarray::Array3;

const NEIGHBORS_6: [[isize; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// One 6-connected binary dilation pass.
pub fn dilate(mask: &Array3<bool>) -> Array3<bool> {
    sweep(mask, true)
}

/// One 6-connected binary erosion pass.
pub fn erode(mask: &Array3<bool>) -> Array3<bool> {
    sweep(mask, false)
}

/// Morphological closing: `iterations` dilation passes followed by the same
/// number of erosion passes. Zero iterations returns the mask unchanged.
pub fn binary_closing(mask: &Array3<bool>, iterations: usize) -> Array3<bool> {
    let mut current = mask.clone();
    for _ in 0..iterations {
        current = dilate(&current);
    }
    for _ in 0..iterations {
        current = erode(&current);
    }
    current
}

/// Shared double-buffered neighborhood sweep. With `grow` set, a background
/// voxel turns solid if any neighbor is solid (dilation); otherwise a solid
/// voxel turns background if any neighbor (or the volume border) is
/// background (erosion).
fn sweep(mask: &Array3<bool>, grow: bool) -> Array3<bool> {
    let (nx, ny, nz) = mask.dim();
    let mut out = mask.clone();

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if mask[[x, y, z]] == grow {
                    continue;
                }
                let mut flip = false;
                for d in NEIGHBORS_6.iter() {
                    let px = x as isize + d[0];
                    let py = y as isize + d[1];
                    let pz = z as isize + d[2];
                    let inside = px >= 0
                        && py >= 0
                        && pz >= 0
                        && (px as usize) < nx
                        && (py as usize) < ny
                        && (pz as usize) < nz;
                    let neighbor_solid =
                        inside && mask[[px as usize, py as usize, pz as usize]];
                    if neighbor_solid == grow {
                        flip = true;
                        break;
                    }
                }
                if flip {
                    out[[x, y, z]] = grow;
                }
            }
        }
    }
    out
}
