use std::collections::HashMap;

use super::path::normalize_category;
use super::tree::{CategoryNode, CategoryTree};

/// Per-parent sibling order for groups.
///
/// Keys are normalized parent paths, with `""` for the top level. Entries are
/// advisory: children named in an entry come first in that order, children
/// the entry does not know follow in alphabetical order. A parent without an
/// entry keeps the discovery order of the flat list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderMap {
    entries: HashMap<String, Vec<String>>,
}

fn parent_key(parent_path: &str) -> String {
    normalize_category(parent_path).unwrap_or_default()
}

impl OrderMap {
    /// Record the explicit child order for one parent.
    pub fn set(&mut self, parent_path: &str, children: Vec<String>) {
        let mut seen = std::collections::HashSet::new();
        let children: Vec<String> = children
            .into_iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();
        self.entries.insert(parent_key(parent_path), children);
    }

    pub fn get(&self, parent_path: &str) -> Option<&[String]> {
        self.entries.get(&parent_key(parent_path)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order the `discovered` children of `parent_path` for display.
    pub fn order_children<'a>(&self, parent_path: &str, discovered: &'a [String]) -> Vec<&'a str> {
        let Some(known) = self.get(parent_path) else {
            return discovered.iter().map(String::as_str).collect();
        };

        let mut ordered: Vec<&'a str> = known
            .iter()
            .filter_map(|name| discovered.iter().find(|d| *d == name))
            .map(String::as_str)
            .collect();

        let mut unseen: Vec<&'a str> = discovered
            .iter()
            .filter(|d| !known.contains(*d))
            .map(String::as_str)
            .collect();
        unseen.sort_unstable();

        ordered.extend(unseen);
        ordered
    }

    /// Snapshot the current sibling order of every parent in `tree`.
    pub fn from_tree(tree: &CategoryTree) -> Self {
        fn visit(node: &CategoryNode, entries: &mut HashMap<String, Vec<String>>) {
            if node.children.is_empty() {
                return;
            }
            entries.insert(node.full_path.clone(), node.children.names().to_vec());
            for child in node.children.iter() {
                visit(child, entries);
            }
        }

        let mut entries = HashMap::new();
        if !tree.root.is_empty() {
            entries.insert(String::new(), tree.root.names().to_vec());
        }
        for node in tree.root.iter() {
            visit(node, &mut entries);
        }
        Self { entries }
    }

    /// Drop entries for parents that no longer exist in `tree`.
    pub fn retain_existing(&mut self, tree: &CategoryTree) {
        let before = self.entries.len();
        self.entries
            .retain(|parent, _| parent.is_empty() || tree.node(parent).is_some());
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "Pruned order entries for removed groups");
        }
    }
}
