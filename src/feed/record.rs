use serde::{Deserialize, Serialize};

use crate::categories::path::normalize_category;

/// One entry in the administered feed list.
///
/// The record's position in the flat list carries the display order at every
/// tree level, so there is no ordering field here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    pub id: String,
    pub url: String,
    /// Slash-delimited category path (`"Tech/Rust"`), `None` when ungrouped.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub custom_title: Option<String>,
    #[serde(default)]
    pub is_sub: bool,
}

impl FeedRecord {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            category: None,
            custom_title: None,
            is_sub: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.custom_title = Some(title.into());
        self
    }

    /// Normalized category path, or `None` for ungrouped records.
    ///
    /// Empty strings and separator-only paths count as ungrouped.
    pub fn category_path(&self) -> Option<String> {
        self.category.as_deref().and_then(normalize_category)
    }

    /// Title shown in listings: the custom title, falling back to the URL.
    pub fn display_title(&self) -> &str {
        self.custom_title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.url)
    }
}
