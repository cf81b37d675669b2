use std::collections::HashMap;

use super::order_map::OrderMap;
use super::path::{self, segments};
use crate::feed::FeedRecord;

/// Children of one tree level, keyed by segment name.
///
/// Iteration follows discovery order (the order in which a building pass
/// first met each name), which mirrors the flat list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildMap {
    nodes: HashMap<String, CategoryNode>,
    discovered: Vec<String>,
}

impl ChildMap {
    pub fn get(&self, name: &str) -> Option<&CategoryNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    /// Names in discovery order.
    pub fn names(&self) -> &[String] {
        &self.discovered
    }

    /// Nodes in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryNode> {
        self.discovered.iter().filter_map(|name| self.nodes.get(name))
    }

    /// Nodes in display order for the level at `parent_path`.
    pub fn ordered<'a>(&'a self, parent_path: &str, order_map: &OrderMap) -> Vec<&'a CategoryNode> {
        order_map
            .order_children(parent_path, &self.discovered)
            .into_iter()
            .filter_map(|name| self.nodes.get(name))
            .collect()
    }

    fn get_or_insert(&mut self, name: &str, full_path: &str) -> &mut CategoryNode {
        if !self.nodes.contains_key(name) {
            self.discovered.push(name.to_owned());
        }
        self.nodes
            .entry(name.to_owned())
            .or_insert_with(|| CategoryNode::new(name, full_path))
    }
}

/// A group in the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub name: String,
    /// Ancestor names and this node's name joined by `/`.
    pub full_path: String,
    /// Records whose category is exactly this node, in flat-list order.
    pub feeds: Vec<FeedRecord>,
    pub children: ChildMap,
}

impl CategoryNode {
    fn new(name: &str, full_path: &str) -> Self {
        Self {
            name: name.to_owned(),
            full_path: full_path.to_owned(),
            feeds: Vec::new(),
            children: ChildMap::default(),
        }
    }

    /// A node with neither feeds nor children. Not rendered.
    pub fn is_empty_leaf(&self) -> bool {
        self.feeds.is_empty() && self.children.is_empty()
    }

    /// Number of records in this node and all of its descendants.
    pub fn feed_count(&self) -> usize {
        self.feeds.len() + self.children.iter().map(CategoryNode::feed_count).sum::<usize>()
    }

    fn flatten_into(&self, order_map: &OrderMap, out: &mut Vec<FeedRecord>) {
        out.extend(self.feeds.iter().cloned());
        for child in self.children.ordered(&self.full_path, order_map) {
            child.flatten_into(order_map, out);
        }
    }
}

/// The derived display structure for a flat feed list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTree {
    pub root: ChildMap,
    /// Records without a category, in flat-list order.
    pub ungrouped: Vec<FeedRecord>,
}

/// One line of the rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeRow<'a> {
    Group {
        depth: usize,
        node: &'a CategoryNode,
    },
    Feed {
        depth: usize,
        record: &'a FeedRecord,
    },
}

/// Build the category tree from the flat list in a single ordered pass.
///
/// Records with no category (or one made only of separators) land in
/// `ungrouped`. Every other record is appended to the node at its path,
/// creating ancestors on the way.
pub fn build_tree(flat: &[FeedRecord]) -> CategoryTree {
    let mut tree = CategoryTree::default();

    for record in flat {
        let Some(category) = record.category.as_deref() else {
            tree.ungrouped.push(record.clone());
            continue;
        };

        let parts: Vec<&str> = segments(category).collect();
        let Some((leaf, ancestors)) = parts.split_last() else {
            tree.ungrouped.push(record.clone());
            continue;
        };

        let mut level = &mut tree.root;
        let mut full_path = String::new();
        for name in ancestors {
            full_path = path::join(&full_path, name);
            level = &mut level.get_or_insert(name, &full_path).children;
        }
        full_path = path::join(&full_path, leaf);
        level.get_or_insert(leaf, &full_path).feeds.push(record.clone());
    }

    tracing::trace!(
        groups = tree.root.len(),
        ungrouped = tree.ungrouped.len(),
        "Built category tree"
    );
    tree
}

impl CategoryTree {
    /// Look up a node by (unnormalized) path.
    pub fn node(&self, path: &str) -> Option<&CategoryNode> {
        let mut parts = segments(path);
        let mut node = self.root.get(parts.next()?)?;
        for name in parts {
            node = node.children.get(name)?;
        }
        Some(node)
    }

    /// Number of records placed inside groups.
    pub fn leaf_count(&self) -> usize {
        self.root.iter().map(CategoryNode::feed_count).sum()
    }

    /// Number of records in the tree, grouped or not.
    pub fn total_count(&self) -> usize {
        self.leaf_count() + self.ungrouped.len()
    }

    /// Top-level group names in display order.
    pub fn group_names(&self, order_map: &OrderMap) -> Vec<String> {
        self.root
            .ordered("", order_map)
            .into_iter()
            .map(|node| node.name.clone())
            .collect()
    }

    /// Names of the immediate children of `parent_path`, in display order.
    pub fn child_names(&self, parent_path: &str, order_map: &OrderMap) -> Vec<String> {
        let (level, parent) = match path::normalize_category(parent_path) {
            None => (&self.root, String::new()),
            Some(parent) => match self.node(&parent) {
                Some(node) => (&node.children, parent),
                None => return Vec::new(),
            },
        };
        level
            .ordered(&parent, order_map)
            .into_iter()
            .map(|node| node.name.clone())
            .collect()
    }

    /// Depth-first linearization: per node its own feeds, then its children in
    /// `order_map` order. Ungrouped records come last.
    ///
    /// Rebuilding the tree from the result reproduces this tree.
    pub fn flatten(&self, order_map: &OrderMap) -> Vec<FeedRecord> {
        let mut out = Vec::with_capacity(self.total_count());
        for node in self.root.ordered("", order_map) {
            node.flatten_into(order_map, &mut out);
        }
        out.extend(self.ungrouped.iter().cloned());
        out
    }

    /// Rows to display, groups before their feeds, empty leaves skipped.
    /// Ungrouped records follow at depth 0.
    pub fn visible_rows(&self, order_map: &OrderMap) -> Vec<TreeRow<'_>> {
        fn push_node<'a>(
            node: &'a CategoryNode,
            depth: usize,
            order_map: &OrderMap,
            rows: &mut Vec<TreeRow<'a>>,
        ) {
            if node.is_empty_leaf() {
                return;
            }
            rows.push(TreeRow::Group { depth, node });
            for record in &node.feeds {
                rows.push(TreeRow::Feed {
                    depth: depth + 1,
                    record,
                });
            }
            for child in node.children.ordered(&node.full_path, order_map) {
                push_node(child, depth + 1, order_map, rows);
            }
        }

        let mut rows = Vec::new();
        for node in self.root.ordered("", order_map) {
            push_node(node, 0, order_map, &mut rows);
        }
        rows.extend(
            self.ungrouped
                .iter()
                .map(|record| TreeRow::Feed { depth: 0, record }),
        );
        rows
    }
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

    #[test]
    fn test_single_group_and_ungrouped() {
        let flat = vec![feed("a", Some("X")), feed("b", Some("X")), feed("c", None)];
        let tree = build_tree(&flat);

        assert_eq!(tree.root.names(), &["X".to_string()]);
        let x = tree.node("X").unwrap();
        assert_eq!(ids(&x.feeds), vec!["a", "b"]);
        assert_eq!(ids(&tree.ungrouped), vec!["c"]);
    }

    #[test]
    fn test_nested_paths_create_ancestors() {
        let flat = vec![feed("a", Some("A/B/C")), feed("b", Some("A"))];
        let tree = build_tree(&flat);

        let a = tree.node("A").unwrap();
        assert_eq!(a.full_path, "A");
        assert_eq!(ids(&a.feeds), vec!["b"]);

        let b = tree.node("A/B").unwrap();
        assert_eq!(b.full_path, "A/B");
        assert!(b.feeds.is_empty());

        let c = tree.node("A/B/C").unwrap();
        assert_eq!(c.full_path, "A/B/C");
        assert_eq!(ids(&c.feeds), vec!["a"]);
    }

    #[test]
    fn test_empty_category_is_ungrouped() {
        let flat = vec![feed("a", Some("")), feed("b", Some("//")), feed("c", None)];
        let tree = build_tree(&flat);

        assert!(tree.root.is_empty());
        assert_eq!(ids(&tree.ungrouped), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_repeated_separators_collapse() {
        let flat = vec![feed("a", Some("A//B")), feed("b", Some("A/B/"))];
        let tree = build_tree(&flat);

        assert_eq!(tree.root.len(), 1);
        assert_eq!(ids(&tree.node("A/B").unwrap().feeds), vec!["a", "b"]);
    }

    #[test]
    fn test_discovery_order_follows_flat_list() {
        let flat = vec![
            feed("a", Some("Zeta")),
            feed("b", Some("Alpha/Two")),
            feed("c", Some("Alpha/One")),
            feed("d", Some("Mid")),
        ];
        let tree = build_tree(&flat);

        assert_eq!(tree.group_names(&OrderMap::default()), vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(tree.child_names("Alpha", &OrderMap::default()), vec!["Two", "One"]);
    }

    #[test]
    fn test_counts_cover_every_record() {
        let flat = vec![
            feed("a", Some("A/B")),
            feed("b", Some("A")),
            feed("c", None),
            feed("d", Some("C")),
        ];
        let tree = build_tree(&flat);

        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.total_count(), flat.len());
        assert_eq!(tree.node("A").unwrap().feed_count(), 2);
    }

    #[test]
    fn test_flatten_groups_interleaved_records() {
        let flat = vec![
            feed("a", Some("X")),
            feed("b", Some("Y")),
            feed("c", None),
            feed("d", Some("X/Sub")),
            feed("e", Some("X")),
        ];
        let tree = build_tree(&flat);
        let flattened = tree.flatten(&OrderMap::default());

        assert_eq!(ids(&flattened), vec!["a", "e", "d", "b", "c"]);
        assert_eq!(build_tree(&flattened), tree);
    }

    #[test]
    fn test_flatten_respects_order_map() {
        let flat = vec![feed("a", Some("X")), feed("b", Some("Y"))];
        let tree = build_tree(&flat);

        let mut order_map = OrderMap::default();
        order_map.set("", vec!["Y".to_string(), "X".to_string()]);

        assert_eq!(ids(&tree.flatten(&order_map)), vec!["b", "a"]);
    }

    #[test]
    fn test_visible_rows_depths() {
        let flat = vec![feed("a", Some("A/B")), feed("b", Some("A")), feed("c", None)];
        let tree = build_tree(&flat);
        let rows = tree.visible_rows(&OrderMap::default());

        let rendered: Vec<String> = rows
            .iter()
            .map(|row| match row {
                TreeRow::Group { depth, node } => format!("{depth}:{}", node.name),
                TreeRow::Feed { depth, record } => format!("{depth}:{}", record.id),
            })
            .collect();
        assert_eq!(rendered, vec!["0:A", "1:b", "1:B", "2:a", "0:c"]);
    }

    #[test]
    fn test_node_lookup_misses() {
        let tree = build_tree(&[feed("a", Some("A/B"))]);
        assert!(tree.node("A/C").is_none());
        assert!(tree.node("").is_none());
        assert!(tree.child_names("Nope", &OrderMap::default()).is_empty());
    }

    #[test]
    fn test_empty_input() {
        let tree = build_tree(&[]);
        assert!(tree.root.is_empty());
        assert!(tree.ungrouped.is_empty());
        assert!(tree.flatten(&OrderMap::default()).is_empty());
    }
}
