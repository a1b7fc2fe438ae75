//! Item scheduling and the terminal outcome fold.
//!
//! Request and response processing both decide what to dispatch next through
//! [`schedule`], so the two paths can never disagree about eligibility.

use crate::aggregate::{Item, ItemStatus};

/// Folded result of an aggregate whose items are all terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every item completed
    Succeeded,
    /// At least one item errored
    Failed,
}

/// Pick the items to dispatch next and mark them `processing`.
///
/// Only `pending` items are eligible. In sequential mode nothing is picked
/// while any item is in flight; otherwise the first eligible item is. In
/// parallel mode every eligible item is picked.
///
/// Returns the indices of the picked items, in item order.
pub fn schedule(items: &mut [Item], sequential: bool) -> Vec<usize> {
    let picked: Vec<usize> = if sequential {
        if items.iter().any(Item::is_processing) {
            Vec::new()
        } else {
            items.iter().position(Item::is_pending).into_iter().collect()
        }
    } else {
        items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_pending())
            .map(|(index, _)| index)
            .collect()
    };

    for index in &picked {
        if let Some(item) = items.get_mut(*index) {
            item.start();
        }
    }

    picked
}

/// Fold item statuses into an outcome.
///
/// `None` while any item is not terminal. An empty list succeeds.
#[must_use]
pub fn outcome(items: &[Item]) -> Option<Outcome> {
    if !items.iter().all(Item::is_terminal) {
        return None;
    }
    if items.iter().any(|item| item.status == ItemStatus::Errored) {
        Some(Outcome::Failed)
    } else {
        Some(Outcome::Succeeded)
    }
}
