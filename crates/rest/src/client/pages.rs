//! Lazy search page iteration.
//!
//! [`SearchPages`] yields the seed page first, then follows `next` cursors
//! by re-issuing the search through a [`PageSource`]. Once a page without a
//! cursor has been returned the iterator is exhausted for good.

use async_trait::async_trait;

use crate::error::FhirResult;
use crate::search::{SearchOptions, SearchResult};

/// Something that can run one page of a type-level search.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Runs the search described by `options` (including its cursor).
    async fn fetch_page(
        &self,
        resource_type: &str,
        options: &SearchOptions,
    ) -> FhirResult<SearchResult>;
}

#[derive(Debug)]
enum PageState {
    /// The seed page has not been handed out yet.
    Seed(SearchResult),
    /// The previous page carried this cursor.
    Next(String),
    /// No further pages.
    Done,
}

/// Iterator over the pages of one search.
///
/// Single owner: `next` takes `&mut self`. A failed fetch is returned as an
/// error and leaves the iterator where it was, so calling `next` again
/// retries the same page.
#[derive(Debug)]
pub struct SearchPages<'a, S: PageSource + ?Sized> {
    source: &'a S,
    resource_type: String,
    options: SearchOptions,
    state: PageState,
}

impl<'a, S: PageSource + ?Sized> SearchPages<'a, S> {
    /// Creates an iterator whose first page is `seed`.
    pub fn new(
        source: &'a S,
        resource_type: impl Into<String>,
        options: SearchOptions,
        seed: SearchResult,
    ) -> Self {
        Self {
            source,
            resource_type: resource_type.into(),
            options,
            state: PageState::Seed(seed),
        }
    }

    /// Returns the next page, or `None` once the search is exhausted.
    pub async fn next(&mut self) -> FhirResult<Option<SearchResult>> {
        let cursor = match std::mem::replace(&mut self.state, PageState::Done) {
            PageState::Seed(page) => {
                self.advance(&page);
                return Ok(Some(page));
            }
            PageState::Next(cursor) => cursor,
            PageState::Done => return Ok(None),
        };

        let options = self.options.with_cursor(Some(cursor.clone()));
        match self.source.fetch_page(&self.resource_type, &options).await {
            Ok(page) => {
                self.advance(&page);
                Ok(Some(page))
            }
            Err(err) => {
                self.state = PageState::Next(cursor);
                Err(err)
            }
        }
    }

    /// Returns true once no further page will be produced.
    pub fn is_done(&self) -> bool {
        matches!(self.state, PageState::Done)
    }

    /// Drains the remaining pages and collects their matches.
    pub async fn collect_resources(mut self) -> FhirResult<Vec<crate::resource::Resource>> {
        let mut resources = Vec::new();
        while let Some(page) = self.next().await? {
            resources.extend(page.resources);
        }
        Ok(resources)
    }

    fn advance(&mut self, page: &SearchResult) {
        self.state = match page.next.as_deref() {
            Some(cursor) if !cursor.is_empty() => PageState::Next(cursor.to_string()),
            _ => PageState::Done,
        };
    }
}
