//! End-to-end checkpoint scenarios, driven against `FakeCollaborators` so
//! they exercise the real `tree_checkpoint`/`database_checkpoint` pipeline
//! without needing a RocksDB instance.

use wt_checkpoint::collaborators::{Collaborators, FakeCollaborators, TreeHandle, TreeRole};
use wt_checkpoint::config::{CheckpointConfig, RawDropItem};
use wt_checkpoint::database_checkpoint;
use wt_checkpoint::tree_checkpoint::{checkpoint_tree, CheckpointMode};
use wt_checkpoint::tracker::MetaTracker;
use wt_checkpoint::Error;

fn fixture_with_metadata() -> FakeCollaborators {
    let mut fake = FakeCollaborators::new();
    fake.insert_tree(TreeHandle::new("metadata:", TreeRole::Regular));
    fake
}

/// Scenario 1: idle periodic checkpoint of an unmodified tree with a
/// matching tail snapshot is a complete no-op.
#[test]
fn idle_periodic_checkpoint_is_a_no_op() {
    let mut fake = fixture_with_metadata();
    fake.seed_checkpoints("table:t", vec!["ckpt_A".to_string()]);
    fake.insert_tree(TreeHandle::new("table:t", TreeRole::Regular));
    // tree is unmodified by default

    let tree = TreeHandle::new("table:t", TreeRole::Regular);
    let config = CheckpointConfig::new().with_name("ckpt_A");
    let mut tracker = MetaTracker::new();
    tracker.install();

    let before_flush = fake.flush_tree_calls();
    let before_meta = fake.meta_set_ckpts_calls();

    let result = checkpoint_tree(
        &fake,
        &fake,
        Some(&mut tracker),
        &tree,
        &config,
        CheckpointMode::Checkpoint,
    );

    assert!(result.is_ok());
    assert_eq!(fake.flush_tree_calls(), before_flush);
    assert_eq!(fake.meta_set_ckpts_calls(), before_meta);
}

/// Scenario 2: named rotation on a modified tree retires the old entry with
/// the same name and appends a fresh one.
#[test]
fn named_rotation_retires_same_name_entry() {
    let fake = fixture_with_metadata();
    fake.seed_checkpoints("table:t", vec!["ckpt_A".to_string(), "ckpt_B".to_string()]);
    let tree = TreeHandle::new("table:t", TreeRole::Regular);
    tree.set_modified();

    let config = CheckpointConfig::new().with_name("ckpt_B");
    let mut tracker = MetaTracker::new();
    tracker.install();

    let result = checkpoint_tree(
        &fake,
        &fake,
        Some(&mut tracker),
        &tree,
        &config,
        CheckpointMode::Checkpoint,
    );
    assert!(result.is_ok());

    let stored = fake.meta_get_ckpts("table:t").unwrap().unwrap();
    let names: Vec<&str> = stored.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["ckpt_A", "ckpt_B", "ckpt_B"]);
    assert!(!stored[0].flags.delete);
    assert!(stored[1].flags.delete);
    assert!(stored[2].flags.add);
}

/// Scenario 3: `drop=[from=s2]` over `[s1,s2,s3,s2,s4]` marks positions
/// 2-5, leaving position 1 untouched.
#[test]
fn range_drop_marks_from_first_match_to_end() {
    let fake = fixture_with_metadata();
    fake.seed_checkpoints(
        "table:t",
        vec!["s1", "s2", "s3", "s2", "s4"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    let tree = TreeHandle::new("table:t", TreeRole::Regular);
    tree.set_modified();

    let config = CheckpointConfig::new().with_drop(RawDropItem::from("s2"));
    let mut tracker = MetaTracker::new();
    tracker.install();

    let result = checkpoint_tree(
        &fake,
        &fake,
        Some(&mut tracker),
        &tree,
        &config,
        CheckpointMode::Checkpoint,
    );
    assert!(result.is_ok());

    let stored = fake.meta_get_ckpts("table:t").unwrap().unwrap();
    let deleted: Vec<bool> = stored[..5].iter().map(|e| e.flags.delete).collect();
    assert_eq!(deleted, vec![false, true, true, true, true]);
}

/// Scenario 4: with a backup cursor open, an internal-prefix doomed entry
/// has its DELETE flag silently cleared while an application-named doomed
/// entry triggers BUSY.
#[test]
fn reserved_prefix_under_backup_is_squelched_app_name_is_busy() {
    let fake = fixture_with_metadata();
    fake.seed_checkpoints(
        "table:t",
        vec!["WiredTigerCheckpoint.1".to_string(), "app_snap".to_string()],
    );
    fake.set_backup_open(true);
    let tree = TreeHandle::new("table:t", TreeRole::Regular);
    tree.set_modified();

    // No explicit "name": the resolved name is the reserved prefix itself,
    // so step 4's unconditional same-name retirement marks the existing
    // internal entry for deletion (it special-cases the prefix to a
    // starts-with match). `app_snap` is marked separately via an explicit
    // drop directive, which is how an application-named doomed entry
    // actually gets flagged in practice.
    let config = CheckpointConfig::new().with_drop(RawDropItem::named("app_snap"));
    let mut tracker = MetaTracker::new();
    tracker.install();

    let result = checkpoint_tree(
        &fake,
        &fake,
        Some(&mut tracker),
        &tree,
        &config,
        CheckpointMode::Checkpoint,
    );

    assert!(matches!(result, Err(Error::Busy(_))));
}

/// Scenario 5: `database_checkpoint` on a session with a running transaction
/// is rejected before any collaborator is invoked.
#[test]
fn running_txn_guard_rejects_before_touching_collaborators() {
    let fake = fixture_with_metadata();
    fake.set_running_txn(true);
    let config = CheckpointConfig::new();

    let before_flush = fake.flush_tree_calls();
    let result = database_checkpoint(&fake, &fake, &config);

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert_eq!(fake.flush_tree_calls(), before_flush);
}

/// Scenario 6: a dead tree (no metadata entry at all) is discarded without
/// a metadata write, and the orchestrator still reports success.
#[test]
fn dead_tree_is_discarded_without_writing_metadata() {
    let fake = fixture_with_metadata();
    let tree = TreeHandle::new("table:ghost", TreeRole::Regular);

    let config = CheckpointConfig::new();
    let mut tracker = MetaTracker::new();
    tracker.install();

    let before_meta = fake.meta_set_ckpts_calls();
    let before_flush = fake.flush_tree_calls();

    let result = checkpoint_tree(
        &fake,
        &fake,
        Some(&mut tracker),
        &tree,
        &config,
        CheckpointMode::Checkpoint,
    );

    assert!(result.is_ok());
    assert_eq!(fake.meta_set_ckpts_calls(), before_meta);
    assert_eq!(fake.flush_tree_calls(), before_flush + 1);
}
