//! `DatabaseCheckpoint`, the global driver.

use crate::collaborators::{Collaborators, Isolation, IsolationGuard, Session, TreeHandle};
use crate::config::CheckpointConfig;
use crate::error::{Error, Result};
use crate::tracker::MetaTracker;
use crate::tree_checkpoint::{checkpoint_tree, CheckpointMode};

/// Runs one whole-database checkpoint. Preconditions: the caller holds the
/// schema lock (not modeled here; it's a caller responsibility) and the
/// session has no running application transaction.
pub fn database_checkpoint(
    collaborators: &dyn Collaborators,
    session: &dyn Session,
    config: &CheckpointConfig,
) -> Result<()> {
    if session.has_running_txn() {
        return Err(Error::invalid_argument(
            "checkpoint cannot run inside an application transaction",
        ));
    }

    log::debug!("database_checkpoint: starting");

    // Step 1: snapshot-isolation transaction, fixing the read snapshot.
    session.begin_snapshot_txn()?;

    // Step 2: install the tracker.
    let mut tracker = MetaTracker::new();
    tracker.install();

    let outcome = run_trees(collaborators, session, &mut tracker, config);

    // Step 8: cleanup always runs, regardless of `outcome`.
    let _isolation_guard = IsolationGuard::set(session, Isolation::ReadUncommitted);
    let finish_result = tracker.finish(collaborators, &outcome);
    session.release_txn();

    log::debug!("database_checkpoint: finished, ok = {}", outcome.is_ok());

    outcome.and(finish_result)
}

fn run_trees(
    collaborators: &dyn Collaborators,
    session: &dyn Session,
    tracker: &mut MetaTracker,
    config: &CheckpointConfig,
) -> Result<()> {
    config.validate_targets()?;

    // Step 3: explicit targets, if given.
    if !config.target.is_empty() {
        for uri_pattern in &config.target {
            checkpoint_one_tree_by_uri(collaborators, session, tracker, config, uri_pattern)?;
        }
    } else {
        // Step 4: no targets -- named/drop-bearing checkpoints touch every
        // tree known to metadata; plain periodic checkpoints only touch open
        // trees.
        let mut action = |tree: &TreeHandle| {
            checkpoint_tree(
                collaborators,
                session,
                Some(tracker),
                tree,
                config,
                CheckpointMode::Checkpoint,
            )
        };

        if config.names_or_drops() {
            collaborators.apply_to_all_meta_trees(&mut action)?;
        } else {
            collaborators.apply_to_open_trees(&mut action)?;
        }
    }

    // Step 5: the metadata tree's own handle must be open.
    let metadata_tree = collaborators
        .metadata_tree()
        .ok_or_else(|| Error::invalid_argument("metadata tree is not open"))?;

    // Step 6: checkpoint the metadata tree last, tracker suspended and
    // isolation lowered. Its old checkpoints aren't independently openable,
    // so no free-list resolution is deferred for it and no snapshot locking
    // is attempted.
    let previous_tracking = tracker.suspend();
    let metadata_result = {
        let _guard = IsolationGuard::set(session, Isolation::ReadUncommitted);
        checkpoint_tree(
            collaborators,
            session,
            None,
            &metadata_tree,
            config,
            CheckpointMode::Checkpoint,
        )
    };
    tracker.restore(previous_tracking);

    metadata_result
}

fn checkpoint_one_tree_by_uri(
    collaborators: &dyn Collaborators,
    session: &dyn Session,
    tracker: &mut MetaTracker,
    config: &CheckpointConfig,
    uri_pattern: &str,
) -> Result<()> {
    let mut action = |tree: &TreeHandle| {
        checkpoint_tree(
            collaborators,
            session,
            Some(tracker),
            tree,
            config,
            CheckpointMode::Checkpoint,
        )
    };
    collaborators.schema_walk(uri_pattern, &mut action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FakeCollaborators, TreeHandle, TreeRole};

    fn with_metadata_tree() -> FakeCollaborators {
        let mut fake = FakeCollaborators::new();
        fake.insert_tree(TreeHandle::new("metadata:", TreeRole::Regular));
        fake
    }

    #[test]
    fn running_txn_is_rejected_before_touching_collaborators() {
        let fake = with_metadata_tree();
        fake.set_running_txn(true);
        let config = CheckpointConfig::new();

        let result = database_checkpoint(&fake, &fake, &config);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn missing_metadata_tree_is_invalid_argument() {
        let fake = FakeCollaborators::new();
        let config = CheckpointConfig::new();

        let result = database_checkpoint(&fake, &fake, &config);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn idle_database_checkpoints_cleanly() {
        let fake = with_metadata_tree();
        let config = CheckpointConfig::new();

        let result = database_checkpoint(&fake, &fake, &config);
        assert!(result.is_ok());
    }
}
