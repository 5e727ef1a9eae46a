//! `TreeCheckpoint`, the per-tree pipeline.

use crate::collaborators::{
    Collaborators, FlushMode, IsolationGuard, Isolation, LockOutcome, Session, TreeHandle, TreeRole,
};
use crate::config::CheckpointConfig;
use crate::drop_planner::DropPlanner;
use crate::error::{Error, Result};
use crate::name::NameValidator;
use crate::snapshot::SnapshotList;
use crate::tracker::MetaTracker;

/// Which variant of the pipeline is running: an explicit `session.checkpoint`
/// call, or a handle being discarded with no named snapshot requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    Checkpoint,
    Close,
}

/// Runs the per-tree checkpoint pipeline: name resolution, drop planning,
/// same-name retirement, flush, and list persistence.
///
/// `tracker` is `None` exactly when `mode == Close`. Checkpoints are only
/// locked when tracking is enabled, which covers explicit checkpoint/drop
/// operations but not handle close.
pub fn checkpoint_tree(
    collaborators: &dyn Collaborators,
    session: &dyn Session,
    mut tracker: Option<&mut MetaTracker>,
    tree: &TreeHandle,
    config: &CheckpointConfig,
    mode: CheckpointMode,
) -> Result<()> {
    log::debug!("checkpoint_tree: {} ({:?})", tree.name(), mode);

    // Step 1: early outs.
    if tree.role() == TreeRole::SnapshotView {
        return match mode {
            CheckpointMode::Checkpoint => Ok(()),
            CheckpointMode::Close => {
                collaborators.flush_tree(tree, &[], FlushMode::SyncDiscardNoWrite)
            }
        };
    }

    if !tree.is_modified() && mode == CheckpointMode::Close {
        return collaborators.flush_tree(tree, &[], FlushMode::SyncDiscardNoWrite);
    }

    let mut list = match SnapshotList::load(collaborators, tree.name())? {
        Some(list) => list,
        None => {
            // Dead tree: no metadata entry. Discard the cache, don't write.
            return collaborators.flush_tree(tree, &[], FlushMode::SyncDiscardNoWrite);
        }
    };

    let result = run_pipeline(collaborators, session, tracker.as_deref_mut(), tree, config, mode, &mut list);

    match &result {
        Ok(()) => {}
        Err(_) => {
            // On any failure from step 2 onward: the list is freed without
            // being serialized (dropping `list` here does that; it was
            // never passed to `serialize_and_store`).
            log::debug!(
                "checkpoint_tree: {} failed, discarding unwritten snapshot list",
                tree.name()
            );
        }
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    collaborators: &dyn Collaborators,
    session: &dyn Session,
    mut tracker: Option<&mut MetaTracker>,
    tree: &TreeHandle,
    config: &CheckpointConfig,
    mode: CheckpointMode,
    list: &mut SnapshotList,
) -> Result<()> {
    // Isolation is saved once, on entry, and restored once, whenever this
    // function returns (success or error), rather than restoring after each
    // individual step below.
    let _isolation_guard = IsolationGuard::capture(session);

    // Step 2: name resolution.
    let name = match &config.name {
        Some(name) if !name.is_empty() => {
            NameValidator::validate(name)?;
            name.clone()
        }
        _ => crate::name::RESERVED_PREFIX.to_string(),
    };

    // Step 3: drop planning.
    let directives = config.drop_directives()?;
    for directive in &directives {
        let operand = match directive {
            crate::drop_planner::DropDirective::Named(n) => n,
            crate::drop_planner::DropDirective::From(n) => n,
            crate::drop_planner::DropDirective::To(n) => n,
        };
        if operand != "all" {
            NameValidator::validate(operand)?;
        }
        DropPlanner::dispatch(list, directive);
    }

    // Step 4: same-name retirement, unconditional.
    DropPlanner::drop_named(list, &name);

    // Step 5: clean-tree short-circuit.
    if !tree.is_modified() {
        debug_assert!(mode != CheckpointMode::Close, "Close already returned above");
        let deleted = list.count_deleted();
        let tail_matches = list
            .last()
            .map_or(false, |last| last.flags.delete && last.name == name);
        if deleted == 1 && tail_matches {
            log::debug!(
                "checkpoint_tree: {} is clean and tail snapshot suffices, skipping",
                tree.name()
            );
            return Ok(());
        }
    }

    // Step 6: add new entry.
    list.add(name.clone());

    // Step 7: lock doomed snapshots (only when tracking is enabled).
    if let Some(tracker) = tracker.as_deref_mut() {
        if tracker.is_enabled() {
            lock_doomed_snapshots(collaborators, list)?;
        }
    }

    // Step 8: dirty-root barrier.
    collaborators.force_root_dirty(tree)?;

    // Step 9: clear modified-bit with a full memory barrier before flushing.
    tree.clear_modified_with_barrier();

    // Step 10: flush. Close mode drops to read-uncommitted for the
    // duration of the flush so the discard path can't block behind its own
    // snapshot; checkpoint mode leaves isolation untouched here.
    let is_checkpoint = mode == CheckpointMode::Checkpoint;
    if !is_checkpoint {
        session.set_isolation(Isolation::ReadUncommitted);
    }
    let flush_mode = if is_checkpoint {
        FlushMode::Sync
    } else {
        FlushMode::SyncDiscard
    };
    collaborators.flush_tree(tree, list.entries(), flush_mode)?;

    // Step 11: persist list, with isolation pinned at read-uncommitted.
    // Left in place (not restored here) through step 12 below; the single
    // guard at the top of this function restores the caller's original
    // level once, on return.
    session.set_isolation(Isolation::ReadUncommitted);
    list.serialize_and_store(collaborators)?;

    // Step 12: resolve free list.
    match tracker {
        Some(tracker) if tracker.is_enabled() && is_checkpoint => {
            tracker.defer_checkpoint_resolve(tree.name().to_string());
        }
        _ => collaborators.bm_checkpoint_resolve(tree.name())?,
    }

    Ok(())
}

fn lock_doomed_snapshots(collaborators: &dyn Collaborators, list: &mut SnapshotList) -> Result<()> {
    let backup_open = collaborators.backup_cursor_open();
    let mut to_clear = Vec::new();
    let mut busy_error = None;

    for (index, entry) in list.iter().enumerate() {
        if !entry.flags.delete {
            continue;
        }

        if backup_open {
            if entry.is_internal() {
                to_clear.push(index);
                log::warn!(
                    "clearing DELETE on internal snapshot {} while a backup cursor is open",
                    entry.name
                );
            } else {
                busy_error = Some(Error::busy(
                    "checkpoints cannot be dropped when backup cursors are open",
                ));
                break;
            }
            continue;
        }

        match collaborators.lock_snapshot(&entry.name)? {
            LockOutcome::Locked => {}
            LockOutcome::Busy if entry.is_internal() => {
                to_clear.push(index);
                log::warn!(
                    "clearing DELETE on internal snapshot {} after a BUSY lock attempt",
                    entry.name
                );
            }
            LockOutcome::Busy => {
                busy_error = Some(Error::busy(format!(
                    "checkpoint \"{}\" cannot be dropped when in-use",
                    entry.name
                )));
                break;
            }
        }
    }

    if let Some(err) = busy_error {
        return Err(err);
    }

    let mut index = 0;
    list.for_each_mut(|entry| {
        if to_clear.contains(&index) {
            entry.flags.delete = false;
        }
        index += 1;
    });

    Ok(())
}
