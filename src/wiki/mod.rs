//! Wiki page abstraction
//!
//! The wiki only matters for one thing: the release-captain rota page,
//! read and rewritten once per closed release.

pub mod confluence;

pub use confluence::ConfluenceWiki;

use crate::error::Result;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// A wiki page in storage representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiPage {
    pub title: String,
    /// Stored HTML-like body
    pub body: String,
    /// Revision number, required for optimistic-locking updates
    pub revision: u64,
}

/// Read-modify-write access to wiki pages.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait WikiStore: Send + Sync {
    /// Fetch a page with its stored body and current revision.
    fn get_page(&self, page_id: &str) -> Result<WikiPage>;

    /// Replace a page's body, bumping to `next_revision`.
    fn update_page(&self, page_id: &str, title: &str, body: &str, next_revision: u64)
        -> Result<()>;
}
