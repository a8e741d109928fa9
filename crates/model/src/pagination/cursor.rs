use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position of a paging fetch within the source listing.
///
/// Lives only for the duration of one fetch run and always starts from
/// [`FetchCursor::first_page`] or [`FetchCursor::keyset_start`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchCursor {
    /// 1-based page number for offset paging.
    Page(u32),

    /// Last identifier already seen for keyset paging; `None` before the first page.
    Key(Option<Uuid>),
}

impl FetchCursor {
    pub fn first_page() -> Self {
        FetchCursor::Page(1)
    }

    pub fn keyset_start() -> Self {
        FetchCursor::Key(None)
    }

    pub fn page(&self) -> Option<u32> {
        match self {
            FetchCursor::Page(page) => Some(*page),
            FetchCursor::Key(_) => None,
        }
    }

    pub fn last_id(&self) -> Option<Uuid> {
        match self {
            FetchCursor::Key(last) => *last,
            FetchCursor::Page(_) => None,
        }
    }

    /// Moves an offset cursor to the next page. Keyset cursors are left untouched.
    pub fn next_page(&mut self) {
        if let FetchCursor::Page(page) = self {
            *page = page.saturating_add(1);
        }
    }

    /// Moves a keyset cursor to `last`.
    ///
    /// Returns `false` when `last` does not advance past the current key, which
    /// means the source returned a page that cannot make progress.
    pub fn advance_to(&mut self, last: Uuid) -> bool {
        match self {
            FetchCursor::Key(current) => {
                if current.is_some_and(|prev| last <= prev) {
                    return false;
                }
                *current = Some(last);
                true
            }
            FetchCursor::Page(_) => false,
        }
    }
}

impl fmt::Display for FetchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchCursor::Page(page) => write!(f, "page={page}"),
            FetchCursor::Key(Some(id)) => write!(f, "lastId={id}"),
            FetchCursor::Key(None) => write!(f, "lastId=<none>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_cursor_increments() {
        let mut cursor = FetchCursor::first_page();
        cursor.next_page();
        cursor.next_page();
        assert_eq!(cursor.page(), Some(3));
        assert_eq!(cursor.last_id(), None);
    }

    #[test]
    fn test_keyset_cursor_advances_forward_only() {
        let mut cursor = FetchCursor::keyset_start();
        assert!(cursor.advance_to(Uuid::from_u128(10)));
        assert!(cursor.advance_to(Uuid::from_u128(20)));
        assert_eq!(cursor.last_id(), Some(Uuid::from_u128(20)));

        // same key: stall
        assert!(!cursor.advance_to(Uuid::from_u128(20)));
        // going backwards: stall
        assert!(!cursor.advance_to(Uuid::from_u128(5)));
        assert_eq!(cursor.last_id(), Some(Uuid::from_u128(20)));
    }

    #[test]
    fn test_display() {
        assert_eq!(FetchCursor::Page(4).to_string(), "page=4");
        assert_eq!(FetchCursor::keyset_start().to_string(), "lastId=<none>");
    }
}
