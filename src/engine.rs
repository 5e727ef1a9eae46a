//! `RocksEngine`, a RocksDB-backed implementation of [`Collaborators`] and
//! [`Session`], so the orchestrator can be exercised end-to-end instead of
//! left as a set of free-floating traits.
//!
//! A RocksDB checkpoint is a handle, not a copy, until compaction:
//! `Checkpoint::new(&self.db)?.create_checkpoint(&path)?` followed by
//! reopening that path is cheap, and this module generalizes that trick
//! across many named, retireable snapshots instead of one.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rocksdb::checkpoint::Checkpoint;
use rocksdb::ColumnFamilyDescriptor;

use crate::collaborators::{
    Collaborators, FlushMode, Isolation, LockOutcome, Session, TreeHandle, TreeRole,
};
use crate::error::Result;
use crate::snapshot::SnapshotEntry;

const CHECKPOINTS_CF_NAME: &str = "checkpoints";
pub const METADATA_TREE_NAME: &str = "metadata:";

fn column_families() -> Vec<ColumnFamilyDescriptor> {
    vec![ColumnFamilyDescriptor::new(
        CHECKPOINTS_CF_NAME,
        RocksEngine::default_db_opts(),
    )]
}

/// A handle to the checkpoint orchestrator's backing store: one `rocksdb::DB`
/// holding a `checkpoints` column family (tree name -> serialized
/// `Vec<SnapshotEntry>`) plus a directory of generation-numbered checkpoint
/// snapshots written by [`Collaborators::flush_tree`].
pub struct RocksEngine {
    db: rocksdb::DB,
    path: PathBuf,
    trees: RefCell<HashMap<String, TreeHandle>>,
    busy_snapshots: RefCell<HashSet<String>>,
    generation: AtomicU64,
    backup_open: AtomicBool,
    running_txn: AtomicBool,
    isolation: Cell<Isolation>,
    oldest_visible_txn: AtomicU64,
}

impl RocksEngine {
    /// Opens (or creates) a store at `path`. The metadata tree handle is
    /// registered open immediately, satisfying `DatabaseCheckpoint`'s
    /// precondition that the metadata handle is always open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_opts = Self::default_db_opts();
        Self::open_opt(path, db_opts)
    }

    pub fn open_opt<P: AsRef<Path>>(path: P, db_opts: rocksdb::Options) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let db = rocksdb::DB::open_cf_descriptors(&db_opts, &path_buf, column_families())?;

        let mut trees = HashMap::new();
        trees.insert(
            METADATA_TREE_NAME.to_string(),
            TreeHandle::new(METADATA_TREE_NAME, TreeRole::Regular),
        );

        Ok(RocksEngine {
            db,
            path: path_buf,
            trees: RefCell::new(trees),
            busy_snapshots: RefCell::new(HashSet::new()),
            generation: AtomicU64::new(0),
            backup_open: AtomicBool::new(false),
            running_txn: AtomicBool::new(false),
            isolation: Cell::new(Isolation::ReadCommitted),
            oldest_visible_txn: AtomicU64::new(0),
        })
    }

    pub fn default_db_opts() -> rocksdb::Options {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        #[cfg(feature = "num_cpus")]
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_atomic_flush(true);
        opts
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn checkpoints_cf(&self) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(CHECKPOINTS_CF_NAME)
            .expect("checkpoints column family always present")
    }

    /// Registers a tree handle as open. Call sites that "open" a table by
    /// URI go through here; it is the engine-level equivalent of WiredTiger
    /// handing out a `WT_BTREE` handle.
    pub fn register_tree(&self, name: impl Into<String>, role: TreeRole) {
        let name = name.into();
        self.trees
            .borrow_mut()
            .entry(name.clone())
            .or_insert_with(|| TreeHandle::new(name, role));
    }

    pub fn mark_modified(&self, name: &str) {
        if let Some(tree) = self.trees.borrow().get(name) {
            tree.set_modified();
        }
    }

    pub fn set_backup_open(&self, open: bool) {
        self.backup_open.store(open, Ordering::SeqCst);
    }

    pub fn set_running_txn(&self, running: bool) {
        self.running_txn.store(running, Ordering::SeqCst);
    }

    /// Test/diagnostic hook simulating an outstanding cursor on `name`: the
    /// next `lock_snapshot(name)` call returns `Busy`.
    pub fn mark_snapshot_busy(&self, name: impl Into<String>) {
        self.busy_snapshots.borrow_mut().insert(name.into());
    }

    fn checkpoint_dir(&self, tree_name: &str, generation: u64) -> PathBuf {
        let safe_name = tree_name.replace(':', "_").replace('/', "_");
        self.path
            .join("checkpoints")
            .join(format!("{}-{}", safe_name, generation))
    }

    /// Closes the store and removes all data from disk, mirroring
    /// `Merk::destroy`.
    pub fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        let opts = Self::default_db_opts();
        drop(self);
        rocksdb::DB::destroy(&opts, &path)?;
        Ok(())
    }
}

impl Session for RocksEngine {
    fn has_running_txn(&self) -> bool {
        self.running_txn.load(Ordering::SeqCst)
    }

    fn begin_snapshot_txn(&self) -> Result<()> {
        self.running_txn.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release_txn(&self) {
        self.running_txn.store(false, Ordering::SeqCst);
    }

    fn set_isolation(&self, level: Isolation) -> Isolation {
        self.isolation.replace(level)
    }
}

impl Collaborators for RocksEngine {
    fn meta_get_ckpts(&self, tree_name: &str) -> Result<Option<Vec<SnapshotEntry>>> {
        let raw = self.db.get_cf(self.checkpoints_cf(), tree_name.as_bytes())?;
        match raw {
            None => Ok(None),
            Some(bytes) => {
                let entries: Vec<SnapshotEntry> = bincode::deserialize(&bytes)
                    .map_err(|e| crate::error::Error::Other(e.to_string()))?;
                Ok(Some(entries))
            }
        }
    }

    fn meta_set_ckpts(&self, tree_name: &str, list: &[SnapshotEntry]) -> Result<()> {
        let bytes =
            bincode::serialize(list).map_err(|e| crate::error::Error::Other(e.to_string()))?;
        self.db
            .put_cf(self.checkpoints_cf(), tree_name.as_bytes(), bytes)?;
        Ok(())
    }

    fn flush_tree(&self, tree: &TreeHandle, list: &[SnapshotEntry], mode: FlushMode) -> Result<()> {
        match mode {
            FlushMode::SyncDiscardNoWrite => {
                self.trees.borrow_mut().remove(tree.name());
                Ok(())
            }
            FlushMode::Sync | FlushMode::SyncDiscard => {
                if let Some(add_entry) = list.iter().find(|e| e.flags.add) {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst);
                    let dir = self.checkpoint_dir(tree.name(), generation);
                    Checkpoint::new(&self.db)?.create_checkpoint(&dir)?;
                    log::debug!(
                        "flush_tree: wrote checkpoint for {} ({}) at {:?}",
                        tree.name(),
                        add_entry.name,
                        dir
                    );
                }
                if mode == FlushMode::SyncDiscard {
                    self.trees.borrow_mut().remove(tree.name());
                }
                Ok(())
            }
        }
    }

    fn force_root_dirty(&self, _tree: &TreeHandle) -> Result<()> {
        Ok(())
    }

    fn lock_snapshot(&self, name: &str) -> Result<LockOutcome> {
        if self.busy_snapshots.borrow_mut().remove(name) {
            Ok(LockOutcome::Busy)
        } else {
            Ok(LockOutcome::Locked)
        }
    }

    fn bm_checkpoint_resolve(&self, tree_name: &str) -> Result<()> {
        log::debug!("bm_checkpoint_resolve: {}", tree_name);
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
        // Collect matching handles before invoking `action`: the action
        // typically re-enters the engine (e.g. `flush_tree`, which
        // `borrow_mut`s `self.trees`), so the registry borrow must not be
        // held live across the callback.
        let matching: Vec<TreeHandle> = {
            let trees = self.trees.borrow();
            trees
                .values()
                .filter(|tree| match uri_pattern.strip_suffix(':') {
                    Some(prefix) => tree.name().starts_with(prefix),
                    None => tree.name() == uri_pattern,
                })
                .cloned()
                .collect()
        };
        for tree in &matching {
            action(tree)?;
        }
        Ok(())
    }

    fn apply_to_all_meta_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();
        let open: Vec<TreeHandle> = {
            let trees = self.trees.borrow();
            trees.values().cloned().collect()
        };
        for tree in &open {
            seen.insert(tree.name().to_string());
            action(tree)?;
        }

        let closed_names: Vec<String> = {
            let iter = self.db.iterator_cf(self.checkpoints_cf(), rocksdb::IteratorMode::Start);
            let mut names = Vec::new();
            for item in iter {
                let (key, _) = item?;
                names.push(String::from_utf8_lossy(&key).into_owned());
            }
            names
        };
        for name in closed_names {
            if seen.insert(name.clone()) {
                let closed = TreeHandle::new(name, TreeRole::Regular);
                action(&closed)?;
            }
        }
        Ok(())
    }

    fn apply_to_open_trees(&self, action: &mut dyn FnMut(&TreeHandle) -> Result<()>) -> Result<()> {
        let open: Vec<TreeHandle> = {
            let trees = self.trees.borrow();
            trees.values().cloned().collect()
        };
        for tree in &open {
            action(tree)?;
        }
        Ok(())
    }

    fn metadata_tree(&self) -> Option<TreeHandle> {
        self.trees.borrow().get(METADATA_TREE_NAME).cloned()
    }

    fn oldest_visible_txn(&self) -> u64 {
        self.oldest_visible_txn.load(Ordering::SeqCst)
    }
}
