//! Interprets drop directives over a tree's snapshot list.

use crate::name::RESERVED_PREFIX;
use crate::snapshot::SnapshotList;

/// A single drop directive, already parsed out of the opaque `drop` config
/// list (see [`crate::config`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropDirective {
    /// `drop_named(name)`, marks every entry whose name equals `name`.
    Named(String),
    /// `drop_from(name)`, marks every entry from the first match to the end.
    /// `name == "all"` marks every entry.
    From(String),
    /// `drop_to(name)`, marks every entry from the start through the last
    /// match, inclusive.
    To(String),
}

/// Marks [`crate::snapshot::SnapshotEntry`]s for deletion. Never removes
/// entries; only ever sets the `DELETE` flag.
pub struct DropPlanner;

impl DropPlanner {
    /// Dispatches a single directive to the matching strategy.
    pub fn dispatch(list: &mut SnapshotList, directive: &DropDirective) {
        match directive {
            DropDirective::Named(name) => Self::drop_named(list, name),
            DropDirective::From(name) => Self::drop_from(list, name),
            DropDirective::To(name) => Self::drop_to(list, name),
        }
    }

    pub fn apply_all(list: &mut SnapshotList, directives: &[DropDirective]) {
        for directive in directives {
            Self::dispatch(list, directive);
        }
    }

    /// Marks every entry whose name equals `name`. Special case: if `name`
    /// equals the reserved internal prefix, marks every entry whose name
    /// *begins with* that prefix instead of requiring an exact match (this
    /// only matters for internal callers; the API surface rejects
    /// application directives naming the prefix before they ever reach
    /// here).
    pub fn drop_named(list: &mut SnapshotList, name: &str) {
        if name == RESERVED_PREFIX {
            list.for_each_mut(|entry| {
                if entry.name.starts_with(RESERVED_PREFIX) {
                    entry.flags.delete = true;
                }
            });
        } else {
            list.for_each_mut(|entry| {
                if entry.name == name {
                    entry.flags.delete = true;
                }
            });
        }
    }

    /// Marks every entry from the *earliest* match through the end of the
    /// list. `name == "all"` marks every entry regardless of name.
    pub fn drop_from(list: &mut SnapshotList, name: &str) {
        if name == "all" {
            list.for_each_mut(|entry| entry.flags.delete = true);
            return;
        }

        let mut matched = false;
        list.for_each_mut(|entry| {
            if !matched && entry.name != name {
                return;
            }
            matched = true;
            entry.flags.delete = true;
        });
    }

    /// Marks every entry from the start of the list through the *latest*
    /// match, inclusive. No-op if there is no match.
    pub fn drop_to(list: &mut SnapshotList, name: &str) {
        let mark = list
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.name == name)
            .map(|(i, _)| i)
            .last();

        let mark = match mark {
            Some(i) => i,
            None => return,
        };

        let mut index = 0;
        list.for_each_mut(|entry| {
            if index <= mark {
                entry.flags.delete = true;
            }
            index += 1;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::FakeCollaborators;

    fn list_with(names: &[&str]) -> SnapshotList {
        let fake = FakeCollaborators::new();
        fake.seed_checkpoints(
            "table:t",
            names.iter().map(|n| (*n).to_string()).collect(),
        );
        SnapshotList::load(&fake, "table:t").unwrap().unwrap()
    }

    fn deleted_positions(list: &SnapshotList) -> Vec<bool> {
        list.iter().map(|e| e.flags.delete).collect()
    }

    #[test]
    fn drop_named_marks_every_occurrence() {
        let mut list = list_with(&["s1", "s2", "s1"]);
        DropPlanner::drop_named(&mut list, "s1");
        assert_eq!(deleted_positions(&list), vec![true, false, true]);
    }

    #[test]
    fn drop_from_is_first_match_inclusive_to_end() {
        // [s1, s2, s3, s2, s4], drop=[from=s2] -> positions 2,3,4,5 marked (1-indexed)
        let mut list = list_with(&["s1", "s2", "s3", "s2", "s4"]);
        DropPlanner::drop_from(&mut list, "s2");
        assert_eq!(
            deleted_positions(&list),
            vec![false, true, true, true, true]
        );
    }

    #[test]
    fn drop_to_is_last_match_inclusive_from_start() {
        let mut list = list_with(&["s1", "s2", "s3", "s2", "s4"]);
        DropPlanner::drop_to(&mut list, "s2");
        assert_eq!(
            deleted_positions(&list),
            vec![true, true, true, true, false]
        );
    }

    #[test]
    fn drop_from_all_marks_everything() {
        let mut list = list_with(&["s1", "s2", "s3"]);
        DropPlanner::drop_from(&mut list, "all");
        assert_eq!(deleted_positions(&list), vec![true, true, true]);
    }

    #[test]
    fn drop_to_no_match_is_noop() {
        let mut list = list_with(&["s1", "s2"]);
        DropPlanner::drop_to(&mut list, "nope");
        assert_eq!(deleted_positions(&list), vec![false, false]);
    }

    #[test]
    fn drop_from_no_match_is_noop() {
        let mut list = list_with(&["s1", "s2"]);
        DropPlanner::drop_from(&mut list, "nope");
        assert_eq!(deleted_positions(&list), vec![false, false]);
    }
}
