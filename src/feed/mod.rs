//! Feed records and OPML interchange.
//!
//! - [`FeedRecord`] - One entry of the administered list
//! - [`opml`] - OPML import (folders become category paths) and export

pub mod opml;
mod record;

pub use record::FeedRecord;
