//! The external interfaces the orchestrator drives but does not implement
//! itself: the metadata store, the per-tree flusher, the block manager,
//! the schema walker, and session/transaction primitives.
//!
//! These are modeled as a small set of object-safe traits rather than
//! generic parameters: one real seam, kept concrete everywhere else.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::snapshot::SnapshotEntry;

/// A tree's role. Snapshot-view trees are read-only and never participate
/// in a checkpoint's write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRole {
    Regular,
    SnapshotView,
}

/// A handle to one tree (a B-tree table, or the engine's own metadata
/// table). The orchestrator reads `name` and `role`, and reads/clears the
/// modified bit; the collaborator-owned in-memory state for the flusher is
/// opaque to it.
///
/// The modified bit lives behind an `Arc` so a `TreeHandle` can be cloned out
/// of a collaborator's own interior-mutable registry (e.g. behind a
/// `RefCell`) without tying the clone's lifetime to a borrow of the
/// collaborator, while still sharing the same underlying flag with the
/// registry's copy.
#[derive(Clone)]
pub struct TreeHandle {
    name: String,
    role: TreeRole,
    modified: Arc<AtomicBool>,
}

impl TreeHandle {
    pub fn new(name: impl Into<String>, role: TreeRole) -> Self {
        TreeHandle {
            name: name.into(),
            role,
            modified: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> TreeRole {
        self.role
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub fn set_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Clears the modified bit with a full memory barrier: any writer that
    /// modifies the tree concurrently with the checkpoint must observe this
    /// store as happening-before its own write and re-set the bit, so it's
    /// captured by the next checkpoint rather than silently lost by this one.
    pub fn clear_modified_with_barrier(&self) {
        self.modified.store(false, Ordering::SeqCst);
        std::sync::atomic::fence(Ordering::SeqCst);
    }
}

/// Flush mode passed to [`Collaborators::flush_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Write a checkpoint, keep the in-memory cache.
    Sync,
    /// Write a checkpoint, then discard the in-memory cache (handle close).
    SyncDiscard,
    /// Discard the in-memory cache without writing anything (dead or clean
    /// tree, or a read-only snapshot-view handle being closed).
    SyncDiscardNoWrite,
}

/// Outcome of attempting to pin a doomed snapshot against concurrent cursor
/// use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Locked,
    Busy,
}

/// Session-scoped transaction and isolation primitives.
pub trait Session {
    /// `true` if the calling session already has a running application
    /// transaction (checkpoint must refuse to run inside one).
    fn has_running_txn(&self) -> bool;

    /// Begins a snapshot-isolation transaction, fixing the global read
    /// snapshot for the duration of the checkpoint.
    fn begin_snapshot_txn(&self) -> Result<()>;

    /// Releases the checkpoint transaction.
    fn release_txn(&self);

    /// Sets the isolation level, returning the previous one.
    fn set_isolation(&self, level: Isolation) -> Isolation;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    Snapshot,
    ReadCommitted,
    ReadUncommitted,
}

/// An RAII guard that restores the session's isolation level to whatever it
/// was before the guard was created, on every exit path, including early
/// returns and propagated errors.
pub struct IsolationGuard<'s> {
    session: &'s dyn Session,
    previous: Isolation,
}

impl<'s> IsolationGuard<'s> {
    pub fn set(session: &'s dyn Session, level: Isolation) -> Self {
        let previous = session.set_isolation(level);
        IsolationGuard { session, previous }
    }

    /// Captures the session's current isolation level without changing it,
    /// so it can be restored later by this guard's `Drop` once the caller
    /// has made its own direct [`Session::set_isolation`] calls in between.
    /// Saves the level once up front and restores it once on exit, rather
    /// than pairing every intermediate change with its own restore.
    pub fn capture(session: &'s dyn Session) -> Self {
        let previous = session.set_isolation(Isolation::ReadUncommitted);
        session.set_isolation(previous);
        IsolationGuard { session, previous }
    }
}

impl<'s> Drop for IsolationGuard<'s> {
    fn drop(&mut self) {
        self.session.set_isolation(self.previous);
    }
}

/// The collaborator interfaces consumed by the orchestrator, minus the
/// session/transaction primitives in [`Session`].
pub trait Collaborators {
    /// Loads the snapshot list for `tree_name`. Returns `Ok(None)` if the
    /// tree has no metadata entry (dead tree), never an error.
    fn meta_get_ckpts(&self, tree_name: &str) -> Result<Option<Vec<SnapshotEntry>>>;

    /// Persists the snapshot list for `tree_name`.
    fn meta_set_ckpts(&self, tree_name: &str, list: &[SnapshotEntry]) -> Result<()>;

    /// Per-tree reconciliation and write.
    fn flush_tree(&self, tree: &TreeHandle, list: &[SnapshotEntry], mode: FlushMode) -> Result<()>;

    /// Ensures a writable page exists even if the modified bit was stale.
    fn force_root_dirty(&self, tree: &TreeHandle) -> Result<()>;

    /// Pins a doomed snapshot against concurrent cursor use.
    fn lock_snapshot(&self, name: &str) -> Result<LockOutcome>;

    /// Makes the space held by deleted snapshots available for allocation
    /// again.
    fn bm_checkpoint_resolve(&self, tree_name: &str) -> Result<()>;

    /// Global backup-cursor presence bit.
    fn backup_cursor_open(&self) -> bool;

    /// Expands a target URI pattern into per-tree calls.
    fn schema_walk(
        &self,
        uri_pattern: &str,
        action: &mut dyn FnMut(&TreeHandle) -> Result<()>,
    ) -> Result<()>;

    /// Every tree known to metadata, open or closed.
    fn apply_to_all_meta_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()>;

    /// Only currently open trees.
    fn apply_to_open_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()>;

    /// Returns a clone of the metadata tree's own handle, if open. Returned
    /// by value (rather than by reference) so implementations backed by an
    /// interior-mutable registry (e.g. `RefCell<HashMap<..>>`) don't need to
    /// hand out a borrow tied to `&self`.
    fn metadata_tree(&self) -> Option<TreeHandle>;

    /// The oldest-visible-txn floor: the minimum transaction id any live
    /// reader requires. Read-only from the orchestrator's perspective;
    /// maintained by the transaction/visibility layer.
    fn oldest_visible_txn(&self) -> u64;
}

/// A minimal in-memory [`Collaborators`]/[`Session`] implementation used by
/// the orchestrator's own unit tests (e.g. [`crate::drop_planner`],
/// [`crate::snapshot`]) that exercise list manipulation without needing a
/// real storage backend. [`crate::engine::RocksEngine`] is the real,
/// RocksDB-backed implementation.
pub struct FakeCollaborators {
    checkpoints: Cell<HashMap<String, Vec<SnapshotEntry>>>,
    trees: HashMap<String, TreeHandle>,
    backup_open: AtomicBool,
    running_txn: AtomicBool,
    isolation: Cell<Isolation>,
    oldest_visible_txn: AtomicU64,
    pub busy_names: HashMap<String, ()>,
    flush_tree_calls: AtomicU64,
    meta_set_ckpts_calls: AtomicU64,
}

impl FakeCollaborators {
    pub fn new() -> Self {
        FakeCollaborators {
            checkpoints: Cell::new(HashMap::new()),
            trees: HashMap::new(),
            backup_open: AtomicBool::new(false),
            running_txn: AtomicBool::new(false),
            isolation: Cell::new(Isolation::ReadCommitted),
            oldest_visible_txn: AtomicU64::new(0),
            busy_names: HashMap::new(),
            flush_tree_calls: AtomicU64::new(0),
            meta_set_ckpts_calls: AtomicU64::new(0),
        }
    }

    pub fn flush_tree_calls(&self) -> u64 {
        self.flush_tree_calls.load(Ordering::SeqCst)
    }

    pub fn meta_set_ckpts_calls(&self) -> u64 {
        self.meta_set_ckpts_calls.load(Ordering::SeqCst)
    }

    pub fn seed_checkpoints(&self, tree_name: &str, names: Vec<String>) {
        let mut map = self.checkpoints.take();
        map.insert(
            tree_name.to_string(),
            names.into_iter().map(|n| SnapshotEntry::new(n, Vec::new())).collect(),
        );
        self.checkpoints.set(map);
    }

    pub fn set_backup_open(&self, open: bool) {
        self.backup_open.store(open, Ordering::SeqCst);
    }

    pub fn set_running_txn(&self, running: bool) {
        self.running_txn.store(running, Ordering::SeqCst);
    }

    pub fn insert_tree(&mut self, tree: TreeHandle) {
        self.trees.insert(tree.name().to_string(), tree);
    }

    pub fn mark_busy(&mut self, name: impl Into<String>) {
        self.busy_names.insert(name.into(), ());
    }
}

impl Default for FakeCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for FakeCollaborators {
    fn has_running_txn(&self) -> bool {
        self.running_txn.load(Ordering::SeqCst)
    }

    fn begin_snapshot_txn(&self) -> Result<()> {
        Ok(())
    }

    fn release_txn(&self) {}

    fn set_isolation(&self, level: Isolation) -> Isolation {
        self.isolation.replace(level)
    }
}

impl Collaborators for FakeCollaborators {
    fn meta_get_ckpts(&self, tree_name: &str) -> Result<Option<Vec<SnapshotEntry>>> {
        let map = self.checkpoints.take();
        let result = map.get(tree_name).cloned();
        self.checkpoints.set(map);
        Ok(result)
    }

    fn meta_set_ckpts(&self, tree_name: &str, list: &[SnapshotEntry]) -> Result<()> {
        self.meta_set_ckpts_calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.checkpoints.take();
        map.insert(tree_name.to_string(), list.to_vec());
        self.checkpoints.set(map);
        Ok(())
    }

    fn flush_tree(&self, _tree: &TreeHandle, _list: &[SnapshotEntry], _mode: FlushMode) -> Result<()> {
        self.flush_tree_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn force_root_dirty(&self, _tree: &TreeHandle) -> Result<()> {
        Ok(())
    }

    fn lock_snapshot(&self, name: &str) -> Result<LockOutcome> {
        if self.busy_names.contains_key(name) {
            Ok(LockOutcome::Busy)
        } else {
            Ok(LockOutcome::Locked)
        }
    }

    fn bm_checkpoint_resolve(&self, _tree_name: &str) -> Result<()> {
        Ok(())
    }

    fn backup_cursor_open(&self) -> bool {
        self.backup_open.load(Ordering::SeqCst)
    }

    fn schema_walk(
        &self,
        uri_pattern: &str,
        action: &mut dyn FnMut(&TreeHandle) -> Result<()>,
    ) -> Result<()> {
        if let Some(tree) = self.trees.get(uri_pattern) {
            action(tree)?;
        }
        Ok(())
    }

    fn apply_to_all_meta_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()> {
        for tree in self.trees.values() {
            action(tree)?;
        }
        Ok(())
    }

    fn apply_to_open_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()> {
        self.apply_to_all_meta_trees(action)
    }

    fn metadata_tree(&self) -> Option<TreeHandle> {
        self.trees.get("metadata:").cloned()
    }

    fn oldest_visible_txn(&self) -> u64 {
        self.oldest_visible_txn.load(Ordering::SeqCst)
    }
}
