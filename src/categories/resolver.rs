//! Map a reorder at one tree level back onto the flat list.
//!
//! Every function here is pure: it takes the current flat list and the
//! requested order for one sub-collection, and returns the flat list that
//! rebuilds into the requested arrangement. The reordered sub-collection is
//! spliced back where it began, so unrelated records keep their positions.
//!
//! Lookups that miss (a name absent from the requested order) sort after
//! every hit, and misses keep their previous relative order.

use std::collections::HashSet;

use super::path::{child_segment, is_within, normalize_category, top_segment};
use crate::feed::FeedRecord;

/// The tree level a drag gesture reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderTarget {
    /// Top-level groups.
    TopLevel,
    /// Child groups of the given parent path.
    Children(String),
    /// Feeds filed directly under the given path.
    Feeds(String),
}

impl ReorderTarget {
    /// Apply a gesture that delivered item identifiers in their new order.
    ///
    /// Group gestures carry group names, feed gestures carry record ids.
    pub fn apply(&self, flat: &[FeedRecord], ids: &[String]) -> Vec<FeedRecord> {
        match self {
            ReorderTarget::TopLevel => reorder_top_level(flat, ids),
            ReorderTarget::Children(parent) => reorder_children(flat, parent, ids),
            ReorderTarget::Feeds(parent) => {
                let feeds = feeds_from_ids(flat, parent, ids);
                reorder_feeds(flat, parent, &feeds)
            }
        }
    }

    /// Normalized parent whose sibling order the gesture sets, if it
    /// reorders groups under a real parent.
    pub fn order_parent(&self) -> Option<String> {
        match self {
            ReorderTarget::TopLevel => Some(String::new()),
            ReorderTarget::Children(parent) => normalize_category(parent),
            ReorderTarget::Feeds(_) => None,
        }
    }

    /// Whether the target names a place in the tree. Child and feed targets
    /// need a non-empty parent path.
    pub fn is_addressable(&self) -> bool {
        match self {
            ReorderTarget::TopLevel => true,
            ReorderTarget::Children(parent) | ReorderTarget::Feeds(parent) => {
                normalize_category(parent).is_some()
            }
        }
    }
}

fn rank(order: &[String], name: Option<&str>) -> usize {
    name.and_then(|name| order.iter().position(|o| o.trim() == name))
        .unwrap_or(usize::MAX)
}

/// Reorder top-level groups.
///
/// Grouped records are stably sorted by the position of their top-level
/// segment in `new_group_order`; ungrouped records then follow all grouped
/// ones, wherever they stood before.
pub fn reorder_top_level(flat: &[FeedRecord], new_group_order: &[String]) -> Vec<FeedRecord> {
    let (mut grouped, ungrouped): (Vec<FeedRecord>, Vec<FeedRecord>) = flat
        .iter()
        .cloned()
        .partition(|record| record.category_path().is_some());

    grouped.sort_by_key(|record| {
        rank(
            new_group_order,
            record.category.as_deref().and_then(top_segment),
        )
    });

    tracing::debug!(
        grouped = grouped.len(),
        ungrouped = ungrouped.len(),
        "Reordered top-level groups"
    );
    grouped.extend(ungrouped);
    grouped
}

/// Reorder the child groups of `parent_path`.
///
/// Every record strictly below `parent_path` is stably sorted by the position
/// of its immediate child segment in `new_child_order`, and the sorted block
/// is placed where the first such record stood. Records filed directly under
/// `parent_path` are not part of the block.
pub fn reorder_children(
    flat: &[FeedRecord],
    parent_path: &str,
    new_child_order: &[String],
) -> Vec<FeedRecord> {
    let Some(parent) = normalize_category(parent_path) else {
        tracing::warn!("Child reorder requested without a parent path, ignoring");
        return flat.to_vec();
    };

    let in_block = |record: &FeedRecord| {
        record
            .category
            .as_deref()
            .is_some_and(|category| is_within(category, &parent))
    };

    let Some(start) = flat.iter().position(|record| in_block(record)) else {
        return flat.to_vec();
    };

    let (mut block, mut rest): (Vec<FeedRecord>, Vec<FeedRecord>) =
        flat.iter().cloned().partition(|record| in_block(record));

    block.sort_by_key(|record| {
        rank(
            new_child_order,
            record
                .category
                .as_deref()
                .and_then(|category| child_segment(category, &parent)),
        )
    });

    tracing::debug!(parent = %parent, moved = block.len(), "Reordered child groups");
    rest.splice(start..start, block);
    rest
}

/// Replace the feeds filed directly under `parent_path` with
/// `new_feed_order`, verbatim, at the position where the first of them stood.
pub fn reorder_feeds(
    flat: &[FeedRecord],
    parent_path: &str,
    new_feed_order: &[FeedRecord],
) -> Vec<FeedRecord> {
    let Some(parent) = normalize_category(parent_path) else {
        tracing::warn!("Feed reorder requested without a parent path, ignoring");
        return flat.to_vec();
    };

    let in_group = |record: &FeedRecord| record.category_path().as_deref() == Some(parent.as_str());

    let Some(start) = flat.iter().position(|record| in_group(record)) else {
        return flat.to_vec();
    };

    let mut rest: Vec<FeedRecord> = flat.iter().filter(|r| !in_group(r)).cloned().collect();
    rest.splice(start..start, new_feed_order.iter().cloned());
    tracing::debug!(parent = %parent, feeds = new_feed_order.len(), "Reordered feeds");
    rest
}

/// Resolve a feed gesture's ids to the records filed under `parent_path`.
///
/// Unknown and repeated ids are skipped; group members the gesture left out
/// are appended in their previous order, so no record is ever dropped.
pub fn feeds_from_ids(flat: &[FeedRecord], parent_path: &str, ids: &[String]) -> Vec<FeedRecord> {
    let Some(parent) = normalize_category(parent_path) else {
        return Vec::new();
    };
    let group: Vec<&FeedRecord> = flat
        .iter()
        .filter(|record| record.category_path().as_deref() == Some(parent.as_str()))
        .collect();

    let mut placed = HashSet::new();
    let mut ordered = Vec::with_capacity(group.len());
    for id in ids {
        if let Some(record) = group.iter().find(|r| &r.id == id) {
            if placed.insert(record.id.as_str()) {
                ordered.push((*record).clone());
            }
        } else {
            tracing::debug!(id = %id, "Ignoring unknown id in feed reorder");
        }
    }
    ordered.extend(
        group
            .iter()
            .filter(|record| !placed.contains(record.id.as_str()))
            .map(|record| (*record).clone()),
    );
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(id: &str, category: Option<&str>) -> FeedRecord {
        let record = FeedRecord::new(id, format!("https://{id}.example.com/rss"));
        match category {
            Some(c) => record.with_category(c),
            None => record,
        }
    }

    fn ids(records: &[FeedRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Vec<FeedRecord> {
        vec![feed("a", Some("X")), feed("b", Some("X")), feed("c", None)]
    }

    #[test]
    fn test_top_level_single_group_is_stable() {
        let flat = sample();
        let result = reorder_top_level(&flat, &order(&["Y", "X"]));
        assert_eq!(result, flat);
    }

    #[test]
    fn test_top_level_swaps_groups() {
        let flat = vec![
            feed("a", Some("X")),
            feed("b", Some("Y/Sub")),
            feed("c", Some("X/Deep")),
            feed("d", Some("Y")),
        ];
        let result = reorder_top_level(&flat, &order(&["Y", "X"]));
        assert_eq!(ids(&result), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_top_level_moves_ungrouped_last() {
        let flat = vec![feed("u", None), feed("a", Some("X")), feed("v", Some(""))];
        let result = reorder_top_level(&flat, &order(&["X"]));
        assert_eq!(ids(&result), vec!["a", "u", "v"]);
    }

    #[test]
    fn test_top_level_unknown_groups_sort_last_stably() {
        let flat = vec![
            feed("a", Some("Q")),
            feed("b", Some("X")),
            feed("c", Some("P")),
            feed("d", Some("Q")),
        ];
        let result = reorder_top_level(&flat, &order(&["X"]));
        assert_eq!(ids(&result), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_top_level_is_idempotent() {
        let flat = vec![
            feed("a", Some("X")),
            feed("u", None),
            feed("b", Some("Y")),
            feed("c", Some("X/Sub")),
        ];
        let requested = order(&["Y", "X"]);
        let once = reorder_top_level(&flat, &requested);
        let twice = reorder_top_level(&once, &requested);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_children_sorted_and_spliced_in_place() {
        let flat = vec![
            feed("u", None),
            feed("a", Some("P/One")),
            feed("o", Some("Other")),
            feed("b", Some("P/Two/Deep")),
            feed("c", Some("P/One")),
            feed("d", Some("P/Two")),
        ];
        let result = reorder_children(&flat, "P", &order(&["Two", "One"]));
        assert_eq!(ids(&result), vec!["u", "b", "d", "a", "c", "o"]);
    }

    #[test]
    fn test_children_leave_parent_feeds_outside_block() {
        let flat = vec![
            feed("a", Some("P/One")),
            feed("p", Some("P")),
            feed("b", Some("P/Two")),
        ];
        let result = reorder_children(&flat, "P", &order(&["Two", "One"]));
        assert_eq!(ids(&result), vec!["b", "a", "p"]);
    }

    #[test]
    fn test_children_respect_segment_boundary() {
        let flat = vec![feed("a", Some("Tech/B")), feed("b", Some("Technology/A")), feed("c", Some("Tech/A"))];
        let result = reorder_children(&flat, "Tech", &order(&["A", "B"]));
        assert_eq!(ids(&result), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_children_missing_from_order_sort_last_stably() {
        let flat = vec![
            feed("a", Some("P/One")),
            feed("b", Some("P/Three")),
            feed("c", Some("P/Two")),
            feed("d", Some("P/One/Deep")),
            feed("e", Some("P/Three")),
            feed("f", Some("P/Two")),
        ];
        let result = reorder_children(&flat, "P", &order(&["Two"]));
        assert_eq!(ids(&result), vec!["c", "f", "a", "b", "d", "e"]);
    }

    #[test]
    fn test_children_without_matches_is_noop() {
        let flat = sample();
        assert_eq!(reorder_children(&flat, "Nope", &order(&["A"])), flat);
        assert_eq!(reorder_children(&flat, "", &order(&["X"])), flat);
    }

    #[test]
    fn test_feeds_replaced_verbatim() {
        let flat = sample();
        let new_order = vec![flat[1].clone(), flat[0].clone()];
        let result = reorder_feeds(&flat, "X", &new_order);
        assert_eq!(ids(&result), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_feeds_only_touch_exact_category() {
        let flat = vec![
            feed("a", Some("X")),
            feed("s", Some("X/Sub")),
            feed("b", Some("X")),
        ];
        let new_order = vec![flat[2].clone(), flat[0].clone()];
        let result = reorder_feeds(&flat, "X", &new_order);
        assert_eq!(ids(&result), vec!["b", "a", "s"]);
    }

    #[test]
    fn test_feeds_missing_group_is_noop() {
        let flat = sample();
        assert_eq!(reorder_feeds(&flat, "Nope", &[]), flat);
    }

    #[test]
    fn test_feeds_from_ids_keeps_every_member() {
        let flat = vec![
            feed("a", Some("X")),
            feed("b", Some("X")),
            feed("c", Some("X")),
            feed("z", Some("Y")),
        ];
        let resolved = feeds_from_ids(&flat, "X", &order(&["c", "ghost", "z", "c"]));
        assert_eq!(ids(&resolved), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_target_apply_dispatches() {
        let flat = sample();
        let result = ReorderTarget::Feeds("X".into()).apply(&flat, &order(&["b", "a"]));
        assert_eq!(ids(&result), vec!["b", "a", "c"]);

        assert_eq!(ReorderTarget::TopLevel.order_parent().as_deref(), Some(""));
        assert_eq!(
            ReorderTarget::Children("/A//B/".into()).order_parent().as_deref(),
            Some("A/B")
        );
        assert_eq!(ReorderTarget::Feeds("A".into()).order_parent(), None);
    }

    #[test]
    fn test_target_without_parent_is_not_addressable() {
        assert_eq!(ReorderTarget::Children("".into()).order_parent(), None);
        assert_eq!(ReorderTarget::Children(" / ".into()).order_parent(), None);
        assert!(!ReorderTarget::Children("//".into()).is_addressable());
        assert!(!ReorderTarget::Feeds("".into()).is_addressable());
        assert!(ReorderTarget::TopLevel.is_addressable());
        assert!(ReorderTarget::Children("P".into()).is_addressable());
    }
}
