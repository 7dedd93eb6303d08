//! Page arithmetic for item lists. Paging saturates at both ends.

/// Items per select menu page.
pub const PAGE_SIZE: usize = 15;

pub fn page_count(total: usize) -> u32 {
    let pages = total.div_ceil(PAGE_SIZE).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Pull a stale page index back into range.
pub fn clamp(page: u32, total: usize) -> u32 {
    page.min(page_count(total) - 1)
}

pub fn forward(page: u32, total: usize) -> u32 {
    clamp(page.saturating_add(1), total)
}

pub fn back(page: u32, total: usize) -> u32 {
    clamp(page, total).saturating_sub(1)
}

pub fn slice<T>(items: &[T], page: u32) -> &[T] {
    let start = (page as usize).saturating_mul(PAGE_SIZE).min(items.len());
    let end = start.saturating_add(PAGE_SIZE).min(items.len());
    &items[start..end]
}
