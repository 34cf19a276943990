const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

/// Convert 1-based page/limit query params into a (limit, offset) window,
/// clamping the limit so a caller cannot request unbounded pages.
pub fn page_window(page: Option<u32>, limit: Option<u32>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let page = page.unwrap_or(1).max(1);
    (i64::from(limit), i64::from(limit) * i64::from(page - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page() {
        assert_eq!(page_window(None, None), (20, 0));
    }

    #[test]
    fn clamps_limit_and_page() {
        assert_eq!(page_window(Some(0), Some(0)), (1, 0));
        assert_eq!(page_window(Some(3), Some(500)), (100, 200));
    }

    #[test]
    fn offsets_by_whole_pages() {
        assert_eq!(page_window(Some(2), Some(10)), (10, 10));
        assert_eq!(page_window(Some(5), Some(25)), (25, 100));
    }
}
