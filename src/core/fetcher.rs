//! Paged child listing
//!
//! [`PagedChildFetcher`] opens a [`PageCursor`] over the children of one
//! object. The cursor hands out pages of at most `page_size` ids and owns the
//! provider-side listing: it is released exactly once, either by
//! [`PageCursor::close`] or when the cursor is dropped on an error path.
//!
//! Cursor life cycle:
//!
//! ```text
//! Opened --next--> Fetching --next--> ... --> Exhausted | Failed --> Closed
//! ```
//!
//! `Exhausted` and `Failed` are terminal. `next` in a terminal state returns
//! [`EnumError::CursorFinished`] and never reaches the provider.

use crate::core::error::{EnumError, Result};
use crate::device::traits::{ChildCursor, ContentSession, ObjectId, Page};
use log::{trace, warn};

/// Default number of ids requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// State of a [`PageCursor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Opened,
    Fetching,
    Exhausted,
    Failed,
    Closed,
}

impl CursorState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CursorState::Opened | CursorState::Fetching)
    }
}

/// Opens child listings with a fixed page size
#[derive(Debug, Clone, Copy)]
pub struct PagedChildFetcher {
    page_size: u32,
}

impl PagedChildFetcher {
    /// Create a fetcher; a page size of 0 is raised to 1
    pub fn new(page_size: u32) -> Self {
        if page_size == 0 {
            warn!("Page size 0 is not usable, fetching 1 id per page");
        }
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Start listing the children of `parent`
    pub fn open<S: ContentSession>(
        &self,
        session: &S,
        parent: &ObjectId,
    ) -> Result<PageCursor<S::Cursor>> {
        let inner = session.list_children(parent)?;
        trace!("Opened child listing of '{}'", parent);
        Ok(PageCursor {
            parent: parent.clone(),
            inner,
            page_size: self.page_size,
            state: CursorState::Opened,
        })
    }
}

impl Default for PagedChildFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

/// Cursor over the children of one object
pub struct PageCursor<C: ChildCursor> {
    parent: ObjectId,
    inner: C,
    page_size: u32,
    state: CursorState,
}

impl<C: ChildCursor> PageCursor<C> {
    pub fn parent(&self) -> &ObjectId {
        &self.parent
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Fetch the next page
    ///
    /// An empty page is treated as the last one even if the provider did not
    /// flag it, so a listing can never stall the walk.
    pub fn next(&mut self) -> Result<Page> {
        if self.state.is_terminal() {
            return Err(EnumError::CursorFinished(self.parent.to_string()));
        }

        self.state = CursorState::Fetching;
        match self.inner.next_page(self.page_size) {
            Ok(mut page) => {
                if page.ids.is_empty() && !page.is_exhausted {
                    trace!("Empty page from '{}', treating as exhausted", self.parent);
                    page.is_exhausted = true;
                }
                if page.is_exhausted {
                    self.state = CursorState::Exhausted;
                }
                trace!(
                    "Fetched {} id(s) under '{}' (exhausted: {})",
                    page.ids.len(),
                    self.parent,
                    page.is_exhausted
                );
                Ok(page)
            }
            Err(e) => {
                self.state = CursorState::Failed;
                Err(e)
            }
        }
    }

    /// Release the provider listing now
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.state != CursorState::Closed {
            self.inner.close();
            self.state = CursorState::Closed;
            trace!("Released child listing of '{}'", self.parent);
        }
    }
}

impl<C: ChildCursor> Drop for PageCursor<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::mock_device::{MockDeviceManager, MockFileSystem, MockObject};
    use crate::device::traits::{AccessConfig, DeviceInfo, DeviceProvider};

    fn manager_with_children(count: usize) -> MockDeviceManager {
        let mut fs = MockFileSystem::new();
        fs.add_object(MockObject::folder("dcim", "DEVICE", "DCIM"));
        for i in 0..count {
            let id = format!("img{:03}", i);
            fs.add_object(MockObject::file(&id, "dcim", &format!("IMG_{:04}.JPG", i), 10));
        }
        let mut manager = MockDeviceManager::new();
        manager.add_device(DeviceInfo::new("dev-1", "Phone", "Maker", "Model"), fs);
        manager
    }

    #[test]
    fn test_pages_are_bounded_and_end_exhausted() {
        let manager = manager_with_children(25);
        let session = manager.open("dev-1", &AccessConfig::default()).unwrap();
        let fetcher = PagedChildFetcher::new(10);

        let mut cursor = fetcher.open(&session, &ObjectId::from("dcim")).unwrap();
        assert_eq!(cursor.state(), CursorState::Opened);

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            if cursor.is_exhausted() {
                None
            } else {
                Some(cursor.next().unwrap().ids.len())
            }
        })
        .collect();

        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(cursor.is_exhausted());
        cursor.close();

        let stats = manager.stats();
        assert_eq!(stats.cursors_opened, 1);
        assert_eq!(stats.cursors_closed, 1);
        assert_eq!(stats.fetch_after_exhaustion, 0);
    }

    #[test]
    fn test_zero_children_is_exhausted_immediately() {
        let manager = manager_with_children(0);
        let session = manager.open("dev-1", &AccessConfig::default()).unwrap();
        let fetcher = PagedChildFetcher::default();

        let mut cursor = fetcher.open(&session, &ObjectId::from("dcim")).unwrap();
        let page = cursor.next().unwrap();
        assert!(page.ids.is_empty());
        assert!(page.is_exhausted);
    }

    #[test]
    fn test_next_after_exhaustion_never_reaches_provider() {
        let manager = manager_with_children(3);
        let session = manager.open("dev-1", &AccessConfig::default()).unwrap();
        let fetcher = PagedChildFetcher::new(10);

        let mut cursor = fetcher.open(&session, &ObjectId::from("dcim")).unwrap();
        assert!(cursor.next().unwrap().is_exhausted);
        assert!(matches!(cursor.next(), Err(EnumError::CursorFinished(_))));
        drop(cursor);

        let stats = manager.stats();
        assert_eq!(stats.pages_fetched, 1);
        assert_eq!(stats.fetch_after_exhaustion, 0);
        assert_eq!(stats.cursors_closed, 1);
    }

    #[test]
    fn test_drop_releases_unfinished_cursor_once() {
        let manager = manager_with_children(30);
        let session = manager.open("dev-1", &AccessConfig::default()).unwrap();
        let fetcher = PagedChildFetcher::new(5);

        {
            let mut cursor = fetcher.open(&session, &ObjectId::from("dcim")).unwrap();
            cursor.next().unwrap();
        }

        let stats = manager.stats();
        assert_eq!(stats.cursors_opened, 1);
        assert_eq!(stats.cursors_closed, 1);
        assert_eq!(stats.double_closes, 0);
    }

    #[test]
    fn test_zero_page_size_is_raised() {
        assert_eq!(PagedChildFetcher::new(0).page_size(), 1);
        assert_eq!(PagedChildFetcher::default().page_size(), DEFAULT_PAGE_SIZE);
    }
}
