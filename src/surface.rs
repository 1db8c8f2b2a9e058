//! Iso-surface reconstruction from binary region masks.
//!
//! The extraction is a Naive Surface Nets variant: one vertex per grid cell
//! that contains a solid/background crossing, placed at the centroid of the
//! crossing edge midpoints, with one quad (two triangles) emitted per
//! crossing grid edge. On binary data every crossing sits at an edge
//! midpoint, which keeps the whole pass free of data-dependent branching:
//! for a fixed mask and fixed parameters the output vertex order, face
//! order and topology are bit-for-bit reproducible.
//!
//! The mask is sampled through a one-voxel background padding on every
//! side, so regions touching the volume border still produce closed
//! surfaces.
//!
//! The full reconstruction chain used per region is
//! [`reconstruct_surface`]: morphological closing, extraction, grid
//! vertex-clustering decimation, and optional Laplacian smoothing.

use std::collections::{HashMap, HashSet};

use ndarray::Array3;

use crate::mesh::Mesh;
use crate::morphology::binary_closing;

/// Offsets of the 8 cell corners, index bit order x, y, z.
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// The 12 cell edges as corner index pairs.
const EDGE_CORNERS: [[usize; 2]; 12] = [
    [0, 1],
    [0, 2],
    [0, 4],
    [1, 3],
    [1, 5],
    [2, 3],
    [2, 6],
    [3, 7],
    [4, 5],
    [4, 6],
    [5, 7],
    [6, 7],
];

/// Corner reached from corner 0 along the x, y and z axis.
const AXIS_CORNER: [usize; 3] = [1, 2, 4];

/// Default Laplacian pass count applied when smoothing is requested.
pub const SMOOTH_ITERATIONS: usize = 5;
/// Default Laplacian relaxation factor.
pub const SMOOTH_LAMBDA: f32 = 0.5;

/// Parameters for one surface reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOptions {
    /// Morphological closing passes applied to the mask before extraction.
    /// Zero disables closing.
    pub closing_iterations: usize,
    /// Fraction in (0, 1] of the extracted vertex count to retain after
    /// decimation; 1.0 disables decimation.
    pub decimate_fraction: f64,
    /// Apply Laplacian smoothing after decimation.
    pub smooth: bool,
}

impl Default for SurfaceOptions {
    fn default() -> SurfaceOptions {
        SurfaceOptions {
            closing_iterations: 2,
            decimate_fraction: 0.2,
            smooth: false,
        }
    }
}

/// Vertex index lookup for the current and previous cell slice.
///
/// Triangulation only ever references cells at x and x-1, so two slices of
/// the cell grid suffice regardless of volume size.
struct IndexBuffer {
    data: Vec<i32>,
    ny: usize,
    nz: usize,
}

impl IndexBuffer {
    fn new(ny: usize, nz: usize) -> IndexBuffer {
        IndexBuffer {
            data: vec![-1; 2 * ny * nz],
            ny,
            nz,
        }
    }

    /// Invalidate the slice that cell column `x` maps to. Must be called
    /// before processing each new x.
    fn reset_slice(&mut self, x: usize) {
        let len = self.ny * self.nz;
        let start = (x & 1) * len;
        for v in &mut self.data[start..start + len] {
            *v = -1;
        }
    }

    #[inline]
    fn get(&self, x: usize, y: usize, z: usize) -> i32 {
        self.data[(x & 1) * self.ny * self.nz + y * self.nz + z]
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, z: usize, value: i32) {
        self.data[(x & 1) * self.ny * self.nz + y * self.nz + z] = value;
    }
}

/// Extract the boundary surface of a binary mask.
///
/// Returns `None` for an empty mask or a degenerate extraction (no faces);
/// both are expected per-region outcomes, not errors. Vertex coordinates
/// are in voxel units of the input mask.
pub fn extract_surface(mask: &Array3<bool>) -> Option<Mesh> {
    let (nx, ny, nz) = mask.dim();

    // Sample accessor over the padded grid: coordinate p maps to mask
    // voxel p-1, everything outside is background.
    let solid = |x: usize, y: usize, z: usize| -> bool {
        x >= 1 && y >= 1 && z >= 1 && x <= nx && y <= ny && z <= nz && mask[[x - 1, y - 1, z - 1]]
    };

    // One cell per edge of the padded sample grid along each axis.
    let (cx, cy, cz) = (nx + 1, ny + 1, nz + 1);

    let mut mesh = Mesh::new();
    let mut buffer = IndexBuffer::new(cy, cz);

    for x in 0..cx {
        buffer.reset_slice(x);
        for y in 0..cy {
            for z in 0..cz {
                let mut corner_mask = 0u8;
                for (i, off) in CORNER_OFFSETS.iter().enumerate() {
                    if solid(x + off[0], y + off[1], z + off[2]) {
                        corner_mask |= 1 << i;
                    }
                }
                // Homogeneous cells carry no surface.
                if corner_mask == 0 || corner_mask == 0xFF {
                    continue;
                }

                // Vertex at the centroid of the crossing edge midpoints.
                let mut centroid = [0.0f32; 3];
                let mut crossings = 0u32;
                for edge in EDGE_CORNERS.iter() {
                    let a = (corner_mask >> edge[0]) & 1;
                    let b = (corner_mask >> edge[1]) & 1;
                    if a != b {
                        let oa = CORNER_OFFSETS[edge[0]];
                        let ob = CORNER_OFFSETS[edge[1]];
                        for k in 0..3 {
                            centroid[k] += (oa[k] + ob[k]) as f32 * 0.5;
                        }
                        crossings += 1;
                    }
                }
                let inv = 1.0 / crossings as f32;

                // Back from padded sample coordinates to voxel coordinates.
                let position = [
                    x as f32 - 1.0 + centroid[0] * inv,
                    y as f32 - 1.0 + centroid[1] * inv,
                    z as f32 - 1.0 + centroid[2] * inv,
                ];

                let vertex_index = mesh.vertices.len() as i32;
                buffer.set(x, y, z, vertex_index);
                mesh.vertices.push(position);

                emit_triangles([x, y, z], corner_mask, &buffer, &mut mesh);
            }
        }
    }

    if mesh.is_degenerate() {
        None
    } else {
        Some(mesh)
    }
}

/// Emit the quads for the crossing edges of a cell that touch corner 0.
///
/// Each crossing grid edge is shared by four cells; the quad over their
/// vertices is emitted by the cell with the highest coordinates and split
/// along its shorter diagonal. Winding follows the solid side: flipped when
/// corner 0 is background.
fn emit_triangles(pos: [usize; 3], corner_mask: u8, buffer: &IndexBuffer, mesh: &mut Mesh) {
    let [x, y, z] = pos;
    let corner0_solid = (corner_mask & 1) == 1;

    for axis in 0..3 {
        let far_solid = (corner_mask >> AXIS_CORNER[axis]) & 1 == 1;
        if corner0_solid == far_solid {
            continue; // no crossing on this cell edge
        }

        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;

        // Cells below 0 in u or v don't exist; the padding guarantees no
        // crossing edge ever sits there.
        if pos[u] == 0 || pos[v] == 0 {
            continue;
        }

        let mut pos_b = pos;
        pos_b[u] -= 1;
        pos_b[v] -= 1;
        let mut pos_c = pos;
        pos_c[u] -= 1;
        let mut pos_d = pos;
        pos_d[v] -= 1;

        let v_a = buffer.get(x, y, z);
        let v_b = buffer.get(pos_b[0], pos_b[1], pos_b[2]);
        let v_c = buffer.get(pos_c[0], pos_c[1], pos_c[2]);
        let v_d = buffer.get(pos_d[0], pos_d[1], pos_d[2]);
        if v_a < 0 || v_b < 0 || v_c < 0 || v_d < 0 {
            continue;
        }
        let (v_a, v_b, v_c, v_d) = (v_a as u32, v_b as u32, v_c as u32, v_d as u32);

        let p_a = mesh.vertices[v_a as usize];
        let p_b = mesh.vertices[v_b as usize];
        let p_c = mesh.vertices[v_c as usize];
        let p_d = mesh.vertices[v_d as usize];

        // Split the quad along its shorter diagonal for better-shaped
        // triangles.
        let flip = !corner0_solid;
        if dist_sq(p_a, p_b) < dist_sq(p_c, p_d) {
            if flip {
                mesh.faces.push([v_a, v_d, v_b]);
                mesh.faces.push([v_a, v_b, v_c]);
            } else {
                mesh.faces.push([v_a, v_b, v_d]);
                mesh.faces.push([v_a, v_c, v_b]);
            }
        } else if flip {
            mesh.faces.push([v_c, v_d, v_b]);
            mesh.faces.push([v_c, v_a, v_d]);
        } else {
            mesh.faces.push([v_c, v_b, v_d]);
            mesh.faces.push([v_c, v_d, v_a]);
        }
    }
}

#[inline]
fn dist_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Simplify a mesh to roughly `fraction` of its vertex count.
///
/// Grid vertex clustering: vertices are merged per cell of a uniform grid
/// whose edge length is derived from the target fraction (surface nets
/// yield about one vertex per unit of surface area, so the retained count
/// scales with the inverse square of the cell size). Faces collapsing onto
/// fewer than three distinct vertices are dropped, as are duplicates.
///
/// Clustering is deterministic: cluster numbering follows the input vertex
/// order. A `fraction` of 1.0 or more returns the mesh unchanged, and if
/// clustering would collapse the surface entirely the input is returned
/// unchanged rather than degenerate.
pub fn decimate(mesh: &Mesh, fraction: f64) -> Mesh {
    if fraction >= 1.0 || mesh.num_vertices() < 8 {
        return mesh.clone();
    }

    let mut min = [f32::MAX; 3];
    for v in &mesh.vertices {
        for k in 0..3 {
            if v[k] < min[k] {
                min[k] = v[k];
            }
        }
    }
    let cell = (1.0 / fraction).sqrt() as f32;

    // Cluster ids in first-seen vertex order.
    let mut cluster_of: HashMap<[i32; 3], u32> = HashMap::new();
    let mut sums: Vec<[f64; 3]> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();
    let mut vertex_cluster: Vec<u32> = Vec::with_capacity(mesh.num_vertices());

    for v in &mesh.vertices {
        let key = [
            ((v[0] - min[0]) / cell).floor() as i32,
            ((v[1] - min[1]) / cell).floor() as i32,
            ((v[2] - min[2]) / cell).floor() as i32,
        ];
        let next_id = sums.len() as u32;
        let id = *cluster_of.entry(key).or_insert(next_id);
        if id == next_id {
            sums.push([0.0; 3]);
            counts.push(0);
        }
        for k in 0..3 {
            sums[id as usize][k] += v[k] as f64;
        }
        counts[id as usize] += 1;
        vertex_cluster.push(id);
    }

    let vertices: Vec<[f32; 3]> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, c)| {
            let n = *c as f64;
            [
                (s[0] / n) as f32,
                (s[1] / n) as f32,
                (s[2] / n) as f32,
            ]
        })
        .collect();

    let mut faces: Vec<[u32; 3]> = Vec::new();
    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    for f in &mesh.faces {
        let g = [
            vertex_cluster[f[0] as usize],
            vertex_cluster[f[1] as usize],
            vertex_cluster[f[2] as usize],
        ];
        if g[0] == g[1] || g[1] == g[2] || g[0] == g[2] {
            continue;
        }
        let mut key = g;
        key.sort_unstable();
        if seen.insert(key) {
            faces.push(g);
        }
    }

    let decimated = Mesh { vertices, faces };
    if decimated.is_degenerate() {
        // Clustering collapsed the whole surface; keep the original shape.
        mesh.clone()
    } else {
        decimated
    }
}

/// Uniform-weight Laplacian smoothing.
///
/// Each pass moves every vertex towards the mean of its edge neighbors by
/// `lambda`. Topology is untouched. Vertices without neighbors stay put.
pub fn laplacian_smooth(mesh: &mut Mesh, iterations: usize, lambda: f32) {
    let n = mesh.num_vertices();
    let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); n];
    for f in &mesh.faces {
        for &(a, b) in [(0, 1), (1, 2), (2, 0)].iter() {
            neighbors[f[a] as usize].push(f[b]);
            neighbors[f[b] as usize].push(f[a]);
        }
    }
    for list in neighbors.iter_mut() {
        list.sort_unstable();
        list.dedup();
    }

    for _ in 0..iterations {
        let previous = mesh.vertices.clone();
        for (i, list) in neighbors.iter().enumerate() {
            if list.is_empty() {
                continue;
            }
            let mut mean = [0.0f32; 3];
            for nb in list {
                for k in 0..3 {
                    mean[k] += previous[*nb as usize][k];
                }
            }
            let inv = 1.0 / list.len() as f32;
            for k in 0..3 {
                let m = mean[k] * inv;
                mesh.vertices[i][k] = previous[i][k] + lambda * (m - previous[i][k]);
            }
        }
    }
}

/// Reconstruct a region surface from a binary mask.
///
/// Chains morphological closing, surface nets extraction, decimation to
/// `decimate_fraction` and optional Laplacian smoothing. Returns `None`
/// when the mask is empty or the extracted surface is degenerate; per the
/// batch pipeline's failure policy this means "no mesh for this region",
/// never an error.
pub fn reconstruct_surface(mask: &Array3<bool>, options: &SurfaceOptions) -> Option<Mesh> {
    if !mask.iter().any(|m| *m) {
        return None;
    }

    let closed = if options.closing_iterations > 0 {
        binary_closing(mask, options.closing_iterations)
    } else {
        mask.clone()
    };

    let extracted = extract_surface(&closed)?;
    let mut mesh = decimate(&extracted, options.decimate_fraction);
    if options.smooth {
        laplacian_smooth(&mut mesh, SMOOTH_ITERATIONS, SMOOTH_LAMBDA);
    }

    if mesh.is_degenerate() {
        None
    } else {
        Some(mesh)
    }
}
