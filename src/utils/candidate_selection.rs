use std::collections::HashSet;

use crate::models::{Extension, ExtensionStatus, UserId};

#[derive(Debug, PartialEq, Eq)]
pub enum Selection<'a> {
    Selected(&'a Extension),
    /// No queued extension belongs to anyone but the reviewer.
    NothingQueued,
    /// Everything queued belongs to owners the reviewer has already reviewed.
    AllOwnersReviewed,
}

/// Picks the extension that has waited in the queue the longest among those
/// `reviewer` may review: not their own and not from an owner they reviewed before.
///
/// Extensions without a queue timestamp go after all timestamped ones; ties are broken by id.
pub fn select_next_extension<'a>(
    candidates: &'a [Extension],
    reviewer: UserId,
    reviewed_owners: &HashSet<UserId>,
) -> Selection<'a> {
    let mut queued = candidates
        .iter()
        .filter(|extension| extension.status == ExtensionStatus::Queued)
        .filter(|extension| extension.owner_id != reviewer)
        .peekable();

    if queued.peek().is_none() {
        return Selection::NothingQueued;
    }

    let oldest = queued
        .filter(|extension| !reviewed_owners.contains(&extension.owner_id))
        .min_by_key(|extension| {
            (
                extension.submitted_to_queue_at.is_none(),
                extension.submitted_to_queue_at,
                extension.id,
            )
        });

    match oldest {
        Some(extension) => Selection::Selected(extension),
        None => Selection::AllOwnersReviewed,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use map_macro::hash_set;
    use test_log::test;
    use time::macros::datetime;
    use uuid::Uuid;

    use super::{select_next_extension, Selection};
    use crate::models::{types::UtcDateTime, Extension, ExtensionId, ExtensionStatus, UserId};

    fn user(n: u128) -> UserId {
        UserId(Uuid::from_u128(n))
    }

    fn extension(n: u128, owner: UserId, submitted: Option<UtcDateTime>) -> Extension {
        Extension {
            id: ExtensionId(Uuid::from_u128(n)),
            owner_id: owner,
            name: format!("Extension {n}"),
            status: ExtensionStatus::Queued,
            submitted_to_queue_at: submitted,
        }
    }

    fn at(day: u8) -> Option<UtcDateTime> {
        let date_time = datetime!(2024-01-01 00:00:00)
            .replace_day(day)
            .expect("Test days are valid");
        Some(UtcDateTime::assume_utc(date_time))
    }

    #[test]
    fn empty_queue() {
        let selection = select_next_extension(&[], user(1), &HashSet::new());
        assert_eq!(selection, Selection::NothingQueued);
    }

    #[test]
    fn oldest_regardless_of_order() {
        let candidates = vec![
            extension(1, user(2), at(3)),
            extension(2, user(3), at(1)),
            extension(3, user(4), at(2)),
        ];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }

    #[test]
    fn own_extension_is_never_selected() {
        let candidates = vec![extension(1, user(1), at(1)), extension(2, user(2), at(2))];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }

    #[test]
    fn only_own_extensions() {
        let candidates = vec![extension(1, user(1), at(1))];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::NothingQueued);
    }

    #[test]
    fn reviewed_owner_is_skipped() {
        let candidates = vec![
            extension(1, user(2), at(1)),
            extension(2, user(3), at(2)),
            extension(3, user(2), at(3)),
        ];

        let selection = select_next_extension(&candidates, user(1), &hash_set! { user(2) });
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }

    #[test]
    fn all_owners_reviewed() {
        let candidates = vec![extension(1, user(2), at(1)), extension(2, user(3), at(2))];

        let selection =
            select_next_extension(&candidates, user(1), &hash_set! { user(2), user(3) });
        assert_eq!(selection, Selection::AllOwnersReviewed);
    }

    #[test]
    fn not_queued_is_skipped() {
        let mut assigned = extension(1, user(2), at(1));
        assigned.status = ExtensionStatus::Assigned;
        let candidates = vec![assigned, extension(2, user(3), at(2))];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }

    #[test]
    fn unscheduled_goes_last() {
        let candidates = vec![extension(1, user(2), None), extension(2, user(3), at(20))];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }

    #[test]
    fn ties_broken_by_id() {
        let candidates = vec![extension(9, user(2), at(1)), extension(4, user(3), at(1))];

        let selection = select_next_extension(&candidates, user(1), &HashSet::new());
        assert_eq!(selection, Selection::Selected(&candidates[1]));
    }
}
