//! Per-page text renderings.

use serde::{Deserialize, Serialize};

/// The two text renderings produced for every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// Text in content-stream order
    pub raw: String,

    /// Text sorted top-to-bottom, left-to-right
    pub sorted: String,
}

impl PageText {
    pub fn new(raw: impl Into<String>, sorted: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            sorted: sorted.into(),
        }
    }

    /// True when the page carries no visible text.
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty() && self.sorted.trim().is_empty()
    }
}
