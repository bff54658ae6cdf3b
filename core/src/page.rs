//! Offset pagination shared by device and signature listings.

use serde::Serialize;

use crate::errors::SigningError;

/// A validated, 1-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page_nr: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Both values must be at least 1.
    pub fn new(page_nr: i64, page_size: i64) -> Result<Self, SigningError> {
        if page_nr < 1 {
            return Err(SigningError::InvalidArgument(format!("pageNr must be >= 1, got {page_nr}")));
        }
        if page_size < 1 {
            return Err(SigningError::InvalidArgument(format!("pageSize must be >= 1, got {page_size}")));
        }
        let page_nr = usize::try_from(page_nr)
            .map_err(|_| SigningError::InvalidArgument("pageNr out of range".into()))?;
        let page_size = usize::try_from(page_size)
            .map_err(|_| SigningError::InvalidArgument("pageSize out of range".into()))?;
        Ok(Self { page_nr, page_size })
    }

    pub fn offset(&self) -> usize { (self.page_nr - 1).saturating_mul(self.page_size) }

    /// Cut this page out of an already ordered sequence.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Page<T> {
        let start = self.offset().min(items.len());
        let end = start.saturating_add(self.page_size).min(items.len());
        Page {
            items: items[start..end].to_vec(),
            total: items.len(),
            page_nr: self.page_nr,
            page_size: self.page_size,
        }
    }
}

/// One page of results plus the size of the whole collection.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page_nr: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page_nr: self.page_nr,
            page_size: self.page_size,
        }
    }
}
