//! Category hierarchy engine.
//!
//! The flat feed list is authoritative; everything here is derived from it:
//!
//! - [`path`] - Slash-delimited category path parsing and normalization
//! - [`tree`] - Builds the nested [`CategoryTree`] from the flat list
//! - [`order_map`] - Advisory sibling order for groups
//! - [`resolver`] - Turns a reorder at any tree level back into a flat order
//!
//! # Example
//!
//! ```
//! use feedshelf::categories::{build_tree, reorder_feeds};
//! use feedshelf::feed::FeedRecord;
//!
//! let flat = vec![
//!     FeedRecord::new("a", "https://a.example.com/rss").with_category("X"),
//!     FeedRecord::new("b", "https://b.example.com/rss").with_category("X"),
//!     FeedRecord::new("c", "https://c.example.com/rss"),
//! ];
//! let tree = build_tree(&flat);
//! assert_eq!(tree.node("X").unwrap().feeds.len(), 2);
//!
//! let swapped = reorder_feeds(&flat, "X", &[flat[1].clone(), flat[0].clone()]);
//! let order: Vec<_> = swapped.iter().map(|f| f.id.as_str()).collect();
//! assert_eq!(order, ["b", "a", "c"]);
//! ```

pub mod order_map;
pub mod path;
pub mod resolver;
pub mod tree;

pub use order_map::OrderMap;
pub use resolver::{
    feeds_from_ids, reorder_children, reorder_feeds, reorder_top_level, ReorderTarget,
};
pub use tree::{build_tree, CategoryNode, CategoryTree, ChildMap, TreeRow};
