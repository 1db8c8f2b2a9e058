//! Brain structure records and the region hierarchy built from them.
//!
//! Atlas ontologies arrive as a flat list of records, one per anatomical
//! region, where each record carries its full ancestry as a root-first id
//! path. [`StructureTree::build`] turns such a list into an id-indexed tree
//! supporting subtree and leaf queries. The tree is immutable after
//! construction: any per-node annotation (like the label presence flags
//! computed in [`crate::labels`]) lives in maps owned by the caller, keyed
//! by structure id.

use std::collections::HashMap;

use crate::error::{AtlasMeshError, Result};

/// One anatomical region of an atlas ontology.
///
/// The `structure_id_path` lists the ids from the root of the hierarchy down
/// to this region, root-first and ending with the region's own id. For the
/// root itself the path is `[id]`. Acronyms are display strings and are not
/// required to be unique (some source atlases reuse them).
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRecord {
    pub id: u32,
    pub acronym: String,
    pub name: String,
    pub structure_id_path: Vec<u32>,
    pub rgb_triplet: [u8; 3],
}

impl StructureRecord {
    pub fn new(
        id: u32,
        acronym: &str,
        name: &str,
        structure_id_path: Vec<u32>,
        rgb_triplet: [u8; 3],
    ) -> StructureRecord {
        StructureRecord {
            id,
            acronym: String::from(acronym),
            name: String::from(name),
            structure_id_path,
            rgb_triplet,
        }
    }

    /// The id of this region's parent, i.e. the second-to-last path element.
    /// `None` for a root record (single-element path).
    pub fn parent_id(&self) -> Option<u32> {
        let n = self.structure_id_path.len();
        if n >= 2 {
            Some(self.structure_id_path[n - 2])
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    parent: Option<u32>,
    children: Vec<u32>,
}

/// An id-indexed tree of anatomical regions.
///
/// Built once from a flat record list via [`StructureTree::build`] and
/// read-only afterwards. Node ids are the structure ids of the input
/// records; traversal methods return plain id lists so callers can look up
/// record metadata on their side.
#[derive(Debug, Clone)]
pub struct StructureTree {
    root_id: u32,
    nodes: HashMap<u32, TreeNode>,
    /// Ids in input record order, used for deterministic traversal output.
    order: Vec<u32>,
}

impl StructureTree {
    /// Build a structure tree from a flat record list.
    ///
    /// The build is two-pass: all nodes are created first, then linked to
    /// the parent named by their path, so the input order of the records
    /// does not matter. The record list must contain exactly one record
    /// with `id == root_id` and `structure_id_path == [root_id]`.
    ///
    /// Fails with [`AtlasMeshError::DuplicateStructure`] on a repeated id,
    /// [`AtlasMeshError::MalformedPath`] when a path is empty, does not end
    /// in the record's own id, or does not start at the root id,
    /// [`AtlasMeshError::OrphanStructure`] when a parent id resolves to no
    /// record (or a node is not reachable from the root), and
    /// [`AtlasMeshError::MissingRoot`] when no proper root record exists.
    pub fn build(records: &[StructureRecord], root_id: u32) -> Result<StructureTree> {
        if records.is_empty() {
            return Err(AtlasMeshError::MissingRoot(root_id));
        }

        // Pass 1: create all nodes, validate ids and paths.
        let mut nodes: HashMap<u32, TreeNode> = HashMap::with_capacity(records.len());
        let mut order: Vec<u32> = Vec::with_capacity(records.len());
        let mut root_seen = false;

        for rec in records {
            let path = &rec.structure_id_path;
            if path.is_empty() || *path.last().unwrap() != rec.id {
                return Err(AtlasMeshError::MalformedPath(rec.id));
            }
            if path[0] != root_id {
                return Err(AtlasMeshError::MalformedPath(rec.id));
            }
            if rec.id == root_id {
                if path.len() != 1 {
                    return Err(AtlasMeshError::MalformedPath(rec.id));
                }
                root_seen = true;
            }
            if nodes
                .insert(
                    rec.id,
                    TreeNode {
                        parent: None,
                        children: Vec::new(),
                    },
                )
                .is_some()
            {
                return Err(AtlasMeshError::DuplicateStructure(rec.id));
            }
            order.push(rec.id);
        }

        if !root_seen {
            return Err(AtlasMeshError::MissingRoot(root_id));
        }

        // Pass 2: link children to parents by the second-to-last path element.
        for rec in records {
            let parent = match rec.parent_id() {
                Some(p) => p,
                None => continue, // the root
            };
            if !nodes.contains_key(&parent) {
                return Err(AtlasMeshError::OrphanStructure(rec.id, parent));
            }
            nodes.get_mut(&rec.id).unwrap().parent = Some(parent);
            nodes.get_mut(&parent).unwrap().children.push(rec.id);
        }

        let tree = StructureTree {
            root_id,
            nodes,
            order,
        };

        // Every node must have a parent chain ending at the root. A pair of
        // records naming each other as ancestors would otherwise slip
        // through the per-record path checks.
        let reachable = tree.depth_first_ids();
        if reachable.len() != tree.size() {
            let unreached = tree
                .order
                .iter()
                .copied()
                .find(|id| !reachable.contains(id))
                .unwrap();
            let parent = tree.nodes[&unreached].parent.unwrap_or(root_id);
            return Err(AtlasMeshError::OrphanStructure(unreached, parent));
        }

        Ok(tree)
    }

    pub fn root_id(&self) -> u32 {
        self.root_id
    }

    /// Number of regions in the tree.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The parent id of the given region, `None` for the root or for
    /// unknown ids.
    pub fn parent(&self, id: u32) -> Option<u32> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Direct children of the given region, in input record order.
    pub fn children(&self, id: u32) -> &[u32] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// All region ids, in input record order.
    pub fn node_ids(&self) -> &[u32] {
        &self.order
    }

    /// Ids of the given region and all of its descendants, preorder.
    pub fn subtree_ids(&self, id: u32) -> Result<Vec<u32>> {
        if !self.contains(id) {
            return Err(AtlasMeshError::UnknownStructure(id));
        }
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            ids.push(current);
            // Reversed push so children are visited in their stored order.
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        Ok(ids)
    }

    /// Preorder depth-first traversal of the whole tree, starting at the root.
    pub fn depth_first_ids(&self) -> Vec<u32> {
        // The root is always present after build().
        self.subtree_ids(self.root_id).unwrap()
    }

    /// Ids of all regions without children, in input record order.
    pub fn leaf_ids(&self) -> Vec<u32> {
        self.order
            .iter()
            .filter(|id| self.children(**id).is_empty())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record(id: u32, path: Vec<u32>) -> StructureRecord {
        StructureRecord::new(id, "acr", "a region", path, [255, 255, 255])
    }

    /// root (1) -> grey (2) -> { cortex (3), nuclei (4) }; fiber tracts (5).
    fn toy_records() -> Vec<StructureRecord> {
        vec![
            record(1, vec![1]),
            record(2, vec![1, 2]),
            record(3, vec![1, 2, 3]),
            record(4, vec![1, 2, 4]),
            record(5, vec![1, 5]),
        ]
    }

    #[test]
    fn a_well_formed_record_list_builds_a_tree_of_the_same_size() {
        let records = toy_records();
        let tree = StructureTree::build(&records, 1).unwrap();

        assert_eq!(5, tree.size());
        assert_eq!(1, tree.root_id());
        assert_eq!(None, tree.parent(1));
        assert_eq!(Some(2), tree.parent(3));
        assert_eq!(vec![2, 5], tree.children(1).to_vec());
        assert_eq!(vec![3, 4, 5], tree.leaf_ids());
    }

    #[test]
    fn record_order_does_not_matter() {
        let mut records = toy_records();
        records.reverse(); // children now come before their parents
        let tree = StructureTree::build(&records, 1).unwrap();

        assert_eq!(5, tree.size());
        assert_eq!(Some(2), tree.parent(4));
        assert_eq!(vec![1, 2, 3, 4, 5], {
            let mut ids = tree.depth_first_ids();
            ids.sort_unstable();
            ids
        });
    }

    #[test]
    fn subtree_query_returns_the_node_and_all_descendants() {
        let tree = StructureTree::build(&toy_records(), 1).unwrap();

        assert_eq!(vec![2, 3, 4], tree.subtree_ids(2).unwrap());
        assert_eq!(vec![3], tree.subtree_ids(3).unwrap());
        assert_eq!(vec![1, 2, 3, 4, 5], tree.subtree_ids(1).unwrap());
    }

    #[test]
    fn subtree_of_an_unknown_id_fails() {
        let tree = StructureTree::build(&toy_records(), 1).unwrap();
        match tree.subtree_ids(42) {
            Err(AtlasMeshError::UnknownStructure(42)) => (),
            other => panic!("expected UnknownStructure, got {:?}", other),
        }
    }

    #[test]
    fn a_duplicate_id_fails_and_keeps_failing() {
        let mut records = toy_records();
        records.push(record(3, vec![1, 5, 3]));

        for _ in 0..2 {
            match StructureTree::build(&records, 1) {
                Err(AtlasMeshError::DuplicateStructure(3)) => (),
                other => panic!("expected DuplicateStructure, got {:?}", other),
            }
        }
    }

    #[test]
    fn an_unresolvable_parent_fails() {
        let records = vec![record(1, vec![1]), record(3, vec![1, 2, 3])];
        match StructureTree::build(&records, 1) {
            Err(AtlasMeshError::OrphanStructure(3, 2)) => (),
            other => panic!("expected OrphanStructure, got {:?}", other),
        }
    }

    #[test]
    fn a_missing_root_record_fails() {
        let records = vec![record(2, vec![1, 2])];
        match StructureTree::build(&records, 1) {
            Err(AtlasMeshError::OrphanStructure(..)) | Err(AtlasMeshError::MissingRoot(1)) => (),
            other => panic!("expected a structural error, got {:?}", other),
        }
        match StructureTree::build(&[], 1) {
            Err(AtlasMeshError::MissingRoot(1)) => (),
            other => panic!("expected MissingRoot, got {:?}", other),
        }
    }

    #[test]
    fn a_path_not_ending_in_the_own_id_fails() {
        let records = vec![record(1, vec![1]), record(2, vec![1, 3])];
        match StructureTree::build(&records, 1) {
            Err(AtlasMeshError::MalformedPath(2)) => (),
            other => panic!("expected MalformedPath, got {:?}", other),
        }
    }

    #[test]
    fn a_path_not_starting_at_the_root_fails() {
        let records = vec![record(1, vec![1]), record(2, vec![7, 2])];
        match StructureTree::build(&records, 1) {
            Err(AtlasMeshError::MalformedPath(2)) => (),
            other => panic!("expected MalformedPath, got {:?}", other),
        }
    }

    #[test]
    fn mutually_ancestral_records_are_rejected() {
        // 3 and 4 name each other as parents; both paths look well-formed
        // in isolation but neither is reachable from the root.
        let records = vec![
            record(1, vec![1]),
            record(3, vec![1, 4, 3]),
            record(4, vec![1, 3, 4]),
        ];
        match StructureTree::build(&records, 1) {
            Err(AtlasMeshError::OrphanStructure(..)) => (),
            other => panic!("expected OrphanStructure, got {:?}", other),
        }
    }
}
