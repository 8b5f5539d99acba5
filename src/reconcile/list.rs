//! Folding change events into an ordered, most-recent-first list.

use std::fmt::Debug;

use serde::de::DeserializeOwned;

use crate::realtime::ChangeEvent;

/// Anything with a stable row identity.
pub trait Identified {
    type Id: Clone + Eq + Debug + DeserializeOwned + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;
}

/// What applying one event did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Replaced,
    Removed,
    /// A create for an id already present; the list is unchanged.
    Duplicate,
    /// An update or delete for an id that is not in the list.
    Missing,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Inserted | ReconcileOutcome::Replaced | ReconcileOutcome::Removed
        )
    }
}

/// Apply `event` to `list` and return the resulting list.
pub fn apply<T: Identified>(mut list: Vec<T>, event: ChangeEvent<T>) -> Vec<T> {
    apply_in_place(&mut list, event);
    list
}

pub fn apply_in_place<T: Identified>(list: &mut Vec<T>, event: ChangeEvent<T>) -> ReconcileOutcome {
    match event {
        ChangeEvent::Created(row) => {
            if list.iter().any(|existing| existing.id() == row.id()) {
                ReconcileOutcome::Duplicate
            } else {
                list.insert(0, row);
                ReconcileOutcome::Inserted
            }
        }
        ChangeEvent::Modified(row) => {
            match list.iter_mut().find(|existing| existing.id() == row.id()) {
                Some(slot) => {
                    *slot = row;
                    ReconcileOutcome::Replaced
                }
                None => ReconcileOutcome::Missing,
            }
        }
        ChangeEvent::Removed(id) => {
            let before = list.len();
            list.retain(|existing| existing.id() != &id);
            if list.len() == before {
                ReconcileOutcome::Missing
            } else {
                ReconcileOutcome::Removed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        label: &'static str,
    }

    impl Identified for Row {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    fn row(id: u32, label: &'static str) -> Row {
        Row { id, label }
    }

    fn seeded() -> Vec<Row> {
        vec![row(3, "c"), row(2, "b"), row(1, "a")]
    }

    #[test]
    fn created_prepends_new_rows() {
        let list = apply(seeded(), ChangeEvent::Created(row(4, "d")));
        let ids: Vec<u32> = list.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn duplicate_created_is_idempotent() {
        let once = apply(seeded(), ChangeEvent::Created(row(4, "d")));
        let twice = apply(once.clone(), ChangeEvent::Created(row(4, "d")));
        assert_eq!(once, twice);

        let mut list = seeded();
        assert_eq!(
            apply_in_place(&mut list, ChangeEvent::Created(row(2, "other"))),
            ReconcileOutcome::Duplicate
        );
        assert_eq!(list, seeded());
    }

    #[test]
    fn modified_keeps_position() {
        let list = apply(seeded(), ChangeEvent::Modified(row(2, "b2")));
        assert_eq!(list[1], row(2, "b2"));
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], row(3, "c"));
        assert_eq!(list[2], row(1, "a"));
    }

    #[test]
    fn modified_for_unknown_row_is_dropped() {
        // An update racing ahead of the snapshot finds an empty list.
        let mut empty: Vec<Row> = Vec::new();
        let outcome = apply_in_place(&mut empty, ChangeEvent::Modified(row(9, "late")));
        assert_eq!(outcome, ReconcileOutcome::Missing);
        assert!(empty.is_empty());

        let list = apply(seeded(), ChangeEvent::Modified(row(9, "z")));
        assert_eq!(list, seeded());
    }

    #[test]
    fn removed_is_total_and_replayable() {
        let once = apply(seeded(), ChangeEvent::Removed(2));
        assert!(once.iter().all(|r| r.id != 2));
        let twice = apply(once.clone(), ChangeEvent::Removed(2));
        assert_eq!(once, twice);

        let mut list = once;
        assert_eq!(
            apply_in_place(&mut list, ChangeEvent::Removed(2)),
            ReconcileOutcome::Missing
        );
    }

    #[test]
    fn last_write_wins_per_identity() {
        let events = vec![
            ChangeEvent::Created(row(5, "e")),
            ChangeEvent::Modified(row(5, "e2")),
            ChangeEvent::Created(row(5, "stale")),
            ChangeEvent::Removed(1),
            ChangeEvent::Modified(row(1, "ghost")),
            ChangeEvent::Modified(row(5, "e3")),
        ];
        let list = events.into_iter().fold(seeded(), apply);

        let ids: Vec<u32> = list.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 3, 2]);
        assert_eq!(list[0].label, "e3");
    }
}
