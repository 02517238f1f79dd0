/// Pager arithmetic for the threaded view.
#[derive(Debug, Clone, Copy)]
pub struct CommentPager {
    items_per_page: u32,
    current_page: u32,
    total_items: i64,
}

impl CommentPager {
    pub fn new(items_per_page: u32, current_page: u32, total_items: i64) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
            current_page: current_page.max(1),
            total_items: total_items.max(0),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.items_per_page) * i64::from(self.current_page - 1)
    }

    pub fn total_pages(&self) -> u32 {
        let per_page = i64::from(self.items_per_page);
        let pages = (self.total_items + per_page - 1) / per_page;
        u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
    }
}
