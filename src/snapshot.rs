//! Snapshot entries and the in-memory, mutable view of one tree's snapshot
//! list.

use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::name::RESERVED_PREFIX;

/// Flags carried by a [`SnapshotEntry`]. An entry may be flagged `ADD`
/// (the new snapshot this checkpoint is creating), `DELETE` (marked for
/// retirement by a drop directive or same-name retirement), both, or
/// neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "full", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotFlags {
    pub add: bool,
    pub delete: bool,
}

/// One entry in a tree's snapshot list.
///
/// The orchestrator reads and mutates only `name` and `flags`; `opaque` is
/// on-disk reference data (root address, size, write-generation,
/// timestamps) that belongs to the collaborator that serializes the list
/// and is preserved verbatim.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "full", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapshotEntry {
    pub name: String,
    pub flags: SnapshotFlags,
    pub opaque: Vec<u8>,
}

impl SnapshotEntry {
    pub fn new(name: impl Into<String>, opaque: Vec<u8>) -> Self {
        SnapshotEntry {
            name: name.into(),
            flags: SnapshotFlags::default(),
            opaque,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.name.starts_with(RESERVED_PREFIX)
    }
}

/// An ordered, in-memory view of one tree's snapshot entries, oldest first.
///
/// Loaded from metadata at the start of a tree's checkpoint pipeline,
/// mutated in place by [`crate::drop_planner::DropPlanner`] and by
/// [`SnapshotList::add`], then either serialized back out on success or
/// dropped unwritten on failure. A `SnapshotList` is exclusively owned by
/// whichever `TreeCheckpoint` invocation loaded it; there is no sharing.
pub struct SnapshotList {
    tree_name: String,
    entries: Vec<SnapshotEntry>,
}

impl SnapshotList {
    /// Loads the snapshot list for `tree_name` from metadata. Returns `Ok(None)`
    /// if the tree has no metadata entry at all (the tree is dead).
    pub fn load(collaborators: &dyn Collaborators, tree_name: &str) -> Result<Option<Self>> {
        let entries = collaborators.meta_get_ckpts(tree_name)?;
        Ok(entries.map(|entries| SnapshotList {
            tree_name: tree_name.to_string(),
            entries,
        }))
    }

    pub fn tree_name(&self) -> &str {
        &self.tree_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotEntry> {
        self.entries.iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(&SnapshotEntry)) {
        for entry in &self.entries {
            f(entry);
        }
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut SnapshotEntry)) {
        for entry in &mut self.entries {
            f(entry);
        }
    }

    /// The last entry in the list, if any.
    pub fn last(&self) -> Option<&SnapshotEntry> {
        self.entries.last()
    }

    /// Appends a new entry flagged `ADD` with the resolved checkpoint name,
    /// to the list's sentinel (tail) slot. At most one entry may carry `ADD`
    /// per checkpoint; callers are responsible for calling this at most
    /// once per pipeline run.
    pub fn add(&mut self, name: impl Into<String>) -> &mut SnapshotEntry {
        let mut entry = SnapshotEntry::new(name, Vec::new());
        entry.flags.add = true;
        self.entries.push(entry);
        self.entries.last_mut().expect("just pushed")
    }

    /// Counts entries flagged `DELETE`.
    pub fn count_deleted(&self) -> usize {
        self.entries.iter().filter(|e| e.flags.delete).count()
    }

    /// Persists the list via the metadata collaborator. The orchestrator
    /// never parses the opaque fields; serialization is entirely the
    /// collaborator's responsibility.
    pub fn serialize_and_store(&self, collaborators: &dyn Collaborators) -> Result<()> {
        collaborators.meta_set_ckpts(&self.tree_name, &self.entries)
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut Vec<SnapshotEntry> {
        &mut self.entries
    }
}
