/// Page-number cursor for one list (conversations, one conversation's
/// messages, or search results).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Next page to request, 1-based.
    page: u32,
    page_size: u32,
    total: usize,
    loaded: usize,
    has_more: bool,
    loading: bool,
}

impl Cursor {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            total: 0,
            loaded: 0,
            has_more: true,
            loading: false,
        }
    }

    /// Back to `{page: 1, has_more: true}`, used whenever the list's scope changes.
    pub fn reset(&mut self) {
        *self = Self::new(self.page_size);
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Claims the next page for a request. `None` while a load is in flight
    /// or when the list is exhausted.
    pub fn begin(&mut self) -> Option<u32> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(self.page)
    }

    /// Records a loaded page. Only the page the cursor is waiting for moves
    /// it, so a retried or duplicated response cannot advance twice.
    pub fn advance(&mut self, requested_page: u32, loaded_count: usize, total: usize) -> bool {
        if requested_page != self.page {
            log::debug!(
                "ignoring page {requested_page}, cursor expects page {}",
                self.page
            );
            return false;
        }
        self.page += 1;
        self.loaded += loaded_count;
        self.total = total;
        // An empty page ends the list even if the server's total disagrees.
        self.has_more = loaded_count > 0 && self.loaded < total;
        self.loading = false;
        true
    }

    /// A failed load stops pagination instead of retrying on its own.
    pub fn fail(&mut self) {
        self.loading = false;
        self.has_more = false;
    }
}
