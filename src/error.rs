use quick_error::quick_error;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all error variants originated by this crate.
    ///
    /// Structural errors are fatal: a broken hierarchy invalidates every
    /// downstream region mask, so they abort a run before any mesh work.
    /// Per-region mesh failures are NOT errors, they are expected outcomes
    /// (see [`crate::batch::MeshOutcome`]).
    #[derive(Debug)]
    pub enum AtlasMeshError {
        /// Two structure records declare the same id.
        DuplicateStructure(id: u32) {
            display("Duplicate structure id {}", id)
        }

        /// A structure's parent (second-to-last path element) does not
        /// resolve to any known structure id.
        OrphanStructure(id: u32, parent: u32) {
            display("Structure {} references unknown parent {}", id, parent)
        }

        /// A structure id path does not start at the root id or does not
        /// end with the structure's own id.
        MalformedPath(id: u32) {
            display("Structure {} has a malformed structure id path", id)
        }

        /// No record with the declared root id (and path == [root_id]) exists.
        MissingRoot(root_id: u32) {
            display("No root structure with id {} in the records", root_id)
        }

        /// A mask or subtree was requested for an id not present in the tree.
        UnknownStructure(id: u32) {
            display("Structure id {} is not part of the tree", id)
        }

        /// The worker pool for parallel mesh extraction could not be built.
        ThreadPool(msg: String) {
            display("Could not build mesh worker pool: {}", msg)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, AtlasMeshError>;
