//! Cursor state for walking paged API results.
//!
//! Each traversal level (organization repositories, a single repository's
//! alerts, organization teams, a single team's repositories) owns one
//! [`CursorWalk`] and drives it with an explicit loop:
//!
//! ```
//! # use vulnbot::pagination::{CursorWalk, PageInfo};
//! let pages = [
//!     PageInfo { end_cursor: Some("a".into()), has_next_page: true },
//!     PageInfo { end_cursor: Some("b".into()), has_next_page: false },
//! ];
//! let mut walk = CursorWalk::new();
//! let mut fetched = 0;
//! while let Some(_cursor) = walk.cursor() {
//!     walk.advance(&pages[fetched]);
//!     fetched += 1;
//! }
//! assert_eq!(fetched, 2);
//! ```

use serde::Deserialize;
use tracing::warn;

/// The `pageInfo` block of a GraphQL connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl PageInfo {
    /// Page info for token-paged APIs, where the presence of a next token is
    /// the only continuation signal.
    pub fn from_next_token(next_token: Option<String>) -> Self {
        Self {
            has_next_page: next_token.is_some(),
            end_cursor: next_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WalkState {
    Fetching(Option<String>),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorWalk {
    state: WalkState,
}

impl CursorWalk {
    /// Starts at the first page (a null cursor).
    pub fn new() -> Self {
        Self {
            state: WalkState::Fetching(None),
        }
    }

    /// Continues after a page that was fetched elsewhere, e.g. the first page
    /// of alerts embedded in a repository listing.
    pub fn resume(page: &PageInfo) -> Self {
        let mut walk = Self::new();
        walk.advance(page);
        walk
    }

    /// The cursor for the next fetch, or `None` once the walk is finished.
    /// The inner `None` requests the first page.
    pub fn cursor(&self) -> Option<Option<String>> {
        match &self.state {
            WalkState::Fetching(cursor) => Some(cursor.clone()),
            WalkState::Done => None,
        }
    }

    pub fn advance(&mut self, page: &PageInfo) {
        self.state = match (page.has_next_page, &page.end_cursor) {
            (false, _) => WalkState::Done,
            (true, Some(cursor)) => WalkState::Fetching(Some(cursor.clone())),
            (true, None) => {
                warn!("page reported more results without an end cursor; stopping");
                WalkState::Done
            }
        };
    }
}

impl Default for CursorWalk {
    fn default() -> Self {
        Self::new()
    }
}
