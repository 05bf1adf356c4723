use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page must be 1 or greater")]
    InvalidPage,

    #[error("page {0} is out of range")]
    OutOfRange(i64),
}

/// One page of results, 1-indexed.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: i64, page: i64, page_size: i64, results: Vec<T>) -> Self {
        let last_page = (count + page_size - 1) / page_size;
        Page {
            count,
            page,
            next: (page < last_page).then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
            results,
        }
    }
}

/// A full result set, or a single page of it when the caller asked for one.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Listing<T> {
    All(Vec<T>),
    Paged(Page<T>),
}

impl<T> Listing<T> {
    pub fn results(&self) -> &[T] {
        match self {
            Listing::All(items) => items,
            Listing::Paged(page) => &page.results,
        }
    }
}

pub fn check_page(page: i64) -> Result<(), PageError> {
    if page < 1 { Err(PageError::InvalidPage) } else { Ok(()) }
}

/// Row offset of the first item on `page`. A page too large to address is
/// out of range.
pub fn page_offset(page: i64, page_size: i64) -> Result<i64, PageError> {
    check_page(page)?;
    (page - 1).checked_mul(page_size).ok_or(PageError::OutOfRange(page))
}

/// Slices an in-memory result set. Page 1 of an empty set is an empty page;
/// any other page past the end is out of range.
pub fn paginate<T>(items: Vec<T>, page: i64, page_size: i64) -> Result<Page<T>, PageError> {
    let start = page_offset(page, page_size)?;
    let count = items.len() as i64;
    if start >= count && page > 1 {
        return Err(PageError::OutOfRange(page));
    }
    let results = items.into_iter().skip(start as usize).take(page_size as usize).collect();
    Ok(Page::new(count, page, page_size, results))
}
