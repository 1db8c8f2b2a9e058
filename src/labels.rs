//! Label presence scanning and region mask extraction for annotation volumes.
//!
//! An annotation volume is a 3D raster of `i32` where each voxel holds
//! either 0 (background) or the id of the structure it belongs to. The
//! volume is owned by the caller and only ever read here. Per-node presence
//! flags are returned as an id-keyed map instead of being written into the
//! tree, so the tree can be shared read-only across mesh workers.

use std::collections::{HashMap, HashSet};

use log::warn;
use ndarray::{Array3, ArrayView3};

use crate::error::{AtlasMeshError, Result};
use crate::structures::StructureTree;

/// Collect the set of structure ids literally present as voxel values.
///
/// A single pass over the volume. The background value 0 is never a valid
/// structure id and is excluded, as are negative values (which cannot name
/// a structure).
pub fn collect_labels(volume: ArrayView3<i32>) -> HashSet<u32> {
    let mut labels: HashSet<u32> = HashSet::new();
    for v in volume.iter() {
        if *v > 0 {
            labels.insert(*v as u32);
        }
    }
    labels
}

/// Flag each tree node as present (its id occurs as a voxel value) or absent.
///
/// An absent node may still produce a mesh later, because region masks union
/// presence across the whole subtree. A structure with id 0 collides with
/// the background value, a known data-quality footgun in some source
/// atlases; it is reported with a warning and flagged absent.
pub fn annotate_presence(tree: &StructureTree, labels: &HashSet<u32>) -> HashMap<u32, bool> {
    let mut presence: HashMap<u32, bool> = HashMap::with_capacity(tree.size());
    for id in tree.node_ids() {
        if *id == 0 {
            warn!("Structure id 0 collides with the background label and is treated as absent");
            presence.insert(0, false);
        } else {
            presence.insert(*id, labels.contains(id));
        }
    }
    presence
}

/// Binary mask of all voxels belonging to a region or any of its descendants.
///
/// Every voxel whose label is in the subtree of `id` is set, regardless of
/// whether the individual descendant ids occur in the volume at all: an
/// absent id simply contributes zero voxels, and a subtree with no present
/// id yields an all-false mask (not an error).
///
/// For the root this degenerates to "every non-background voxel", which is
/// computed directly instead of walking the full id set.
pub fn region_mask(
    volume: ArrayView3<i32>,
    tree: &StructureTree,
    id: u32,
) -> Result<Array3<bool>> {
    if !tree.contains(id) {
        return Err(AtlasMeshError::UnknownStructure(id));
    }

    if id == tree.root_id() {
        return Ok(volume.mapv(|v| v != 0));
    }

    let subtree: HashSet<u32> = tree.subtree_ids(id)?.into_iter().collect();
    Ok(volume.mapv(|v| v > 0 && subtree.contains(&(v as u32))))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::structures::StructureRecord;

    fn record(id: u32, path: Vec<u32>) -> StructureRecord {
        StructureRecord::new(id, "acr", "a region", path, [128, 64, 32])
    }

    fn toy_tree() -> StructureTree {
        let records = vec![
            record(1, vec![1]),
            record(2, vec![1, 2]),
            record(3, vec![1, 2, 3]),
            record(5, vec![1, 5]),
        ];
        StructureTree::build(&records, 1).unwrap()
    }

    /// 4x4x4 volume: one voxel of 3, one of 5, one stray 9, rest background.
    fn toy_volume() -> Array3<i32> {
        let mut vol = Array3::<i32>::zeros((4, 4, 4));
        vol[[1, 1, 1]] = 3;
        vol[[2, 2, 2]] = 5;
        vol[[3, 3, 3]] = 9;
        vol
    }

    #[test]
    fn labels_are_collected_without_background() {
        let vol = toy_volume();
        let labels = collect_labels(vol.view());

        assert_eq!(3, labels.len());
        assert!(labels.contains(&3) && labels.contains(&5) && labels.contains(&9));
        assert!(!labels.contains(&0));
    }

    #[test]
    fn presence_flags_follow_the_voxel_values() {
        let tree = toy_tree();
        let vol = toy_volume();
        let presence = annotate_presence(&tree, &collect_labels(vol.view()));

        assert_eq!(Some(&false), presence.get(&1));
        assert_eq!(Some(&false), presence.get(&2));
        assert_eq!(Some(&true), presence.get(&3));
        assert_eq!(Some(&true), presence.get(&5));
    }

    #[test]
    fn an_id_colliding_with_the_background_label_is_flagged_absent() {
        let records = vec![
            record(1, vec![1]),
            record(0, vec![1, 0]),
            record(3, vec![1, 3]),
        ];
        let tree = StructureTree::build(&records, 1).unwrap();

        // Voxels of value 0 are background, so id 0 can never be observed
        // in the volume even though it is a valid tree node.
        let mut vol = Array3::<i32>::zeros((3, 3, 3));
        vol[[1, 1, 1]] = 3;

        let presence = annotate_presence(&tree, &collect_labels(vol.view()));
        assert_eq!(Some(&false), presence.get(&0));
        assert_eq!(Some(&true), presence.get(&3));
        assert_eq!(Some(&false), presence.get(&1));
        assert_eq!(3, presence.len());
    }

    #[test]
    fn a_region_mask_unions_the_subtree() {
        let tree = toy_tree();
        let vol = toy_volume();

        // Region 2 is absent itself but its child 3 is labelled.
        let mask = region_mask(vol.view(), &tree, 2).unwrap();
        assert!(mask[[1, 1, 1]]);
        assert!(!mask[[2, 2, 2]]);
        assert_eq!(1, mask.iter().filter(|m| **m).count());
    }

    #[test]
    fn the_root_mask_is_every_nonzero_voxel() {
        let tree = toy_tree();
        let vol = toy_volume();

        // Label 9 belongs to no known structure but is still non-background.
        let mask = region_mask(vol.view(), &tree, 1).unwrap();
        assert_eq!(3, mask.iter().filter(|m| **m).count());
        assert!(mask[[3, 3, 3]]);
    }

    #[test]
    fn the_mask_decomposes_over_children() {
        let tree = toy_tree();
        let mut vol = toy_volume();
        vol[[0, 0, 0]] = 2;

        let combined = region_mask(vol.view(), &tree, 2).unwrap();

        // mask(N) == mask_self(N) | union over children.
        let self_only = vol.mapv(|v| v == 2);
        let child = region_mask(vol.view(), &tree, 3).unwrap();
        let rebuilt = ndarray::Zip::from(&self_only)
            .and(&child)
            .apply_collect(|a, b| *a || *b);

        assert_eq!(combined, rebuilt);
    }

    #[test]
    fn an_empty_subtree_coverage_yields_an_all_false_mask() {
        let tree = toy_tree();
        let vol = Array3::<i32>::zeros((3, 3, 3));

        let mask = region_mask(vol.view(), &tree, 5).unwrap();
        assert!(mask.iter().all(|m| !*m));
    }

    #[test]
    fn a_mask_for_an_unknown_id_fails() {
        let tree = toy_tree();
        let vol = toy_volume();
        match region_mask(vol.view(), &tree, 77) {
            Err(crate::error::AtlasMeshError::UnknownStructure(77)) => (),
            other => panic!("expected UnknownStructure, got {:?}", other),
        }
    }
}
