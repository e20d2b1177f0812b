//! Category model

use serde::{Deserialize, Serialize};

/// Post category, identified in URLs by its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    /// Unique title (1..=20 chars)
    pub title: String,
}

/// Number of posts filed under a category, for the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub title: String,
    pub count: i64,
}
