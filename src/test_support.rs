//! Test-only helpers for exercising a real [`RocksEngine`].
//!
//! Gated behind the `test-support` feature, so test scaffolding isn't
//! shipped in every build.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::engine::RocksEngine;
use crate::error::Result;

/// A [`RocksEngine`] opened in a fresh [`tempfile::TempDir`], destroyed when
/// dropped.
pub struct TempEngine {
    inner: Option<RocksEngine>,
    _dir: tempfile::TempDir,
}

impl TempEngine {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let inner = Some(RocksEngine::open(dir.path())?);
        Ok(TempEngine { inner, _dir: dir })
    }
}

impl Drop for TempEngine {
    fn drop(&mut self) {
        if let Some(engine) = self.inner.take() {
            let _ = engine.destroy();
        }
    }
}

impl Deref for TempEngine {
    type Target = RocksEngine;

    fn deref(&self) -> &RocksEngine {
        self.inner.as_ref().expect("TempEngine not yet dropped")
    }
}

impl DerefMut for TempEngine {
    fn deref_mut(&mut self) -> &mut RocksEngine {
        self.inner.as_mut().expect("TempEngine not yet dropped")
    }
}

/// A [`RocksEngine`] that can be made to "crash": dropped without its
/// `Drop` impl running, simulating an abrupt process death so tests can
/// assert what's durable across the full-barrier modified-bit clear.
pub struct CrashEngine {
    inner: Option<ManuallyDrop<RocksEngine>>,
    path: std::path::PathBuf,
}

impl CrashEngine {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let engine = RocksEngine::open(&path)?;
        Ok(CrashEngine {
            inner: Some(ManuallyDrop::new(engine)),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Drops the live handle without running any flush or close logic, then
    /// reopens at the same path (RocksDB recovers from its own WAL, the same
    /// way a real process restart would).
    pub fn crash(&mut self) -> Result<()> {
        if let Some(mut engine) = self.inner.take() {
            unsafe { ManuallyDrop::drop(&mut engine) };
        }
        let reopened = RocksEngine::open(&self.path)?;
        self.inner = Some(ManuallyDrop::new(reopened));
        Ok(())
    }

    pub fn into_inner(mut self) -> RocksEngine {
        ManuallyDrop::into_inner(self.inner.take().unwrap())
    }
}

impl Deref for CrashEngine {
    type Target = RocksEngine;

    fn deref(&self) -> &RocksEngine {
        self.inner.as_ref().expect("CrashEngine not yet crashed past recovery")
    }
}

impl DerefMut for CrashEngine {
    fn deref_mut(&mut self) -> &mut RocksEngine {
        self.inner.as_mut().expect("CrashEngine not yet crashed past recovery")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Collaborators, TreeRole};
    use crate::snapshot::SnapshotEntry;

    #[test]
    fn temp_engine_round_trips_a_checkpoint_list() {
        let engine = TempEngine::new().expect("open temp engine");
        engine.register_tree("table:t", TreeRole::Regular);

        let list = vec![SnapshotEntry::new("ckpt_A", Vec::new())];
        engine.meta_set_ckpts("table:t", &list).unwrap();

        let loaded = engine.meta_get_ckpts("table:t").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ckpt_A");
    }

    #[test]
    fn dead_tree_has_no_metadata_entry() {
        let engine = TempEngine::new().expect("open temp engine");
        assert!(engine.meta_get_ckpts("table:never_registered").unwrap().is_none());
    }
}
