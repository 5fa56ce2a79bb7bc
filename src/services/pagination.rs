//! Page slicing over a materialized list

/// One page of a list plus its neighbours' page numbers
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub next_page: Option<usize>,
    pub previous_page: Option<usize>,
}

/// Slice `list` into 1-indexed pages of `page_size`.
///
/// An empty list still has one (empty) page. A page past the end yields no
/// items and no neighbours, but keeps the total.
pub fn paginate<T>(list: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_count = list.len();
    let num_pages = total_count.div_ceil(page_size).max(1);

    if page == 0 || page > num_pages {
        return Page {
            items: Vec::new(),
            total_count,
            next_page: None,
            previous_page: None,
        };
    }

    let items = list
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Page {
        items,
        total_count,
        next_page: (page < num_pages).then_some(page + 1),
        previous_page: (page > 1).then_some(page - 1),
    }
}
