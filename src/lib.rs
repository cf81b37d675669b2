//! feedshelf: administration engine for a categorized RSS feed list.
//!
//! The flat, ordered list of [`feed::FeedRecord`]s is the only source of
//! truth. [`categories`] derives the nested category tree from it and maps
//! drag reorders at any tree level back onto a new flat order;
//! [`coordinator`] applies those reorders optimistically and persists them,
//! debounced, through a [`gate::SessionGate`].

pub mod categories;
pub mod config;
pub mod coordinator;
pub mod feed;
pub mod gate;
pub mod storage;
