//! Chat notification abstraction
//!
//! Chat serves two purposes in a release run: requesting merge-request
//! approval from the development channel, and announcing release notes.
//! Both degrade to console instructions when chat is unconfigured.

pub mod slack;

pub use slack::SlackNotifier;

use crate::error::Result;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Post a message to a channel, optionally into a thread.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ChatNotifier: Send + Sync {
    /// # Arguments
    /// * `channel` - Channel name or id
    /// * `thread` - Thread timestamp/id, empty for a top-level message
    /// * `text` - Message body in the chat's own markup
    fn post(&self, channel: &str, thread: &str, text: &str) -> Result<()>;
}
