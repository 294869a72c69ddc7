//! Pull-style iteration over cursor-paginated remote listings.
//!
//! A [`PageSource`] knows how to fetch one page given the continuation token
//! of the previous one. [`PagedListing`] drives it: the first page is fetched
//! eagerly when the listing starts, every later page lazily, and iteration
//! ends with the first page the store reports as not truncated.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// One page of a remote listing
pub trait ListingPage {
    /// Continuation state needed to request the following page
    type Token: Clone + Send + Sync;

    /// Whether the store holds more results after this page
    fn is_truncated(&self) -> bool;

    /// Token for the next request. Only meaningful when truncated.
    fn next_token(&self) -> Option<Self::Token>;

    /// Number of entries in the page
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A remote API returning results a page at a time
#[async_trait]
pub trait PageSource: Send + Sync {
    type Page: ListingPage + Send;

    /// Fetch the page after `token`, or the first page when `token` is `None`
    async fn fetch_page(
        &self,
        token: Option<&<Self::Page as ListingPage>::Token>,
    ) -> Result<Self::Page>;

    /// Short description for log messages
    fn describe(&self) -> String;
}

/// Iterator over the pages of a [`PageSource`]
pub struct PagedListing<S: PageSource> {
    source: S,
    first: Option<S::Page>,
    token: Option<<S::Page as ListingPage>::Token>,
    truncated: bool,
    fetches: usize,
    pages: usize,
}

impl<S: PageSource> PagedListing<S> {
    /// Start a listing, fetching the first page immediately
    pub async fn start(source: S) -> Result<Self> {
        let mut fetches = 0;
        let first = fetch_with_retry(&source, None, &mut fetches).await?;
        let token = first.next_token();
        let truncated = continues(&source, first.is_truncated(), token.is_some());
        debug!(
            listing = %source.describe(),
            entries = first.len(),
            truncated,
            "fetched first page"
        );

        Ok(Self {
            source,
            first: Some(first),
            token,
            truncated,
            fetches,
            pages: 0,
        })
    }

    /// True if another page can be returned
    pub fn has_next(&self) -> bool {
        self.first.is_some() || self.truncated
    }

    /// Return the next page.
    ///
    /// The first call hands back the page fetched by [`start`](Self::start)
    /// with no remote call. Each later call makes one request.
    pub async fn next_page(&mut self) -> Result<S::Page> {
        if let Some(first) = self.first.take() {
            self.pages += 1;
            return Ok(first);
        }

        if !self.truncated {
            return Err(Error::NoMoreElements);
        }

        let page = fetch_with_retry(&self.source, self.token.as_ref(), &mut self.fetches).await?;
        self.pages += 1;
        self.token = page.next_token();
        self.truncated = continues(&self.source, page.is_truncated(), self.token.is_some());

        debug!(
            listing = %self.source.describe(),
            page = self.pages,
            entries = page.len(),
            truncated = self.truncated,
            "fetched page"
        );
        Ok(page)
    }

    /// Remote requests issued so far, including the initial one
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Pages handed to the caller so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Whether another page follows. A truncated page with nothing to continue
/// from ends the listing instead of refetching the first page.
fn continues<S: PageSource>(source: &S, truncated: bool, has_token: bool) -> bool {
    if truncated && !has_token {
        warn!(listing = %source.describe(), "truncated page without continuation token");
        return false;
    }
    truncated
}

/// Fetch a page, retrying once if the failure looks transient.
/// Every request issued is added to `fetches`.
async fn fetch_with_retry<S: PageSource>(
    source: &S,
    token: Option<&<S::Page as ListingPage>::Token>,
    fetches: &mut usize,
) -> Result<S::Page> {
    *fetches += 1;
    match source.fetch_page(token).await {
        Ok(page) => Ok(page),
        Err(e) if e.is_retryable() => {
            warn!(listing = %source.describe(), error = %e, "listing request failed, retrying once");
            *fetches += 1;
            source.fetch_page(token).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct FakePage {
        index: usize,
        entries: usize,
        truncated: bool,
        has_token: bool,
    }

    impl ListingPage for FakePage {
        type Token = usize;

        fn is_truncated(&self) -> bool {
            self.truncated
        }

        fn next_token(&self) -> Option<usize> {
            (self.truncated && self.has_token).then_some(self.index + 1)
        }

        fn len(&self) -> usize {
            self.entries
        }
    }

    /// Serves a fixed page sequence, optionally failing some calls first
    struct FakeSource {
        pages: Vec<(usize, bool)>,
        calls: AtomicUsize,
        failures: Mutex<Vec<Error>>,
        tokens: Mutex<Vec<Option<usize>>>,
        without_tokens: bool,
    }

    impl FakeSource {
        fn new(pages: &[(usize, bool)]) -> Self {
            Self {
                pages: pages.to_vec(),
                calls: AtomicUsize::new(0),
                failures: Mutex::new(Vec::new()),
                tokens: Mutex::new(Vec::new()),
                without_tokens: false,
            }
        }

        fn without_tokens(mut self) -> Self {
            self.without_tokens = true;
            self
        }

        fn failing_with(self, errors: Vec<Error>) -> Self {
            *self.failures.lock().unwrap() = errors;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        type Page = FakePage;

        async fn fetch_page(&self, token: Option<&usize>) -> Result<FakePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(token.copied());
            if let Some(err) = self.failures.lock().unwrap().pop() {
                return Err(err);
            }
            let index = token.copied().unwrap_or(0);
            let (entries, truncated) = self.pages[index];
            Ok(FakePage {
                index,
                entries,
                truncated,
                has_token: !self.without_tokens,
            })
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    #[tokio::test]
    async fn test_three_pages_two_requests_after_start() {
        let source = FakeSource::new(&[(5000, true), (5000, true), (1200, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        assert_eq!(listing.source().calls(), 1);

        let mut seen = Vec::new();
        let mut has_next_count = 0;
        while listing.has_next() {
            has_next_count += 1;
            seen.push(listing.next_page().await.unwrap());
        }

        assert_eq!(has_next_count, 3);
        assert_eq!(seen.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(seen.iter().map(|p| p.entries).sum::<usize>(), 11200);
        // first page pre-fetched, two more requests on demand
        assert_eq!(listing.source().calls() - 1, 2);
        assert_eq!(listing.fetches(), 3);
        assert_eq!(listing.pages(), 3);
    }

    #[tokio::test]
    async fn test_first_page_returned_without_request() {
        let source = FakeSource::new(&[(3, true), (1, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        let first = listing.next_page().await.unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(listing.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_continuation_tokens_follow_previous_page() {
        let source = FakeSource::new(&[(1, true), (1, true), (1, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        while listing.has_next() {
            listing.next_page().await.unwrap();
        }
        let tokens = listing.source().tokens.lock().unwrap().clone();
        assert_eq!(tokens, vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_next_after_exhaustion() {
        let source = FakeSource::new(&[(10, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        assert!(listing.has_next());
        listing.next_page().await.unwrap();
        assert!(!listing.has_next());

        for _ in 0..2 {
            let err = listing.next_page().await.unwrap_err();
            assert!(matches!(err, Error::NoMoreElements));
        }
        assert_eq!(listing.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_single_page() {
        let source = FakeSource::new(&[(0, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        let page = listing.next_page().await.unwrap();
        assert!(page.is_empty());
        assert!(!listing.has_next());
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let source = FakeSource::new(&[(1, true), (1, false)])
            .failing_with(vec![Error::ServiceUnavailable("slow down".into())]);
        let mut listing = PagedListing::start(source).await.unwrap();
        assert_eq!(listing.source().calls(), 2);
        assert_eq!(listing.fetches(), 2);
        listing.next_page().await.unwrap();
        listing.next_page().await.unwrap();
        assert!(!listing.has_next());
        assert_eq!(listing.fetches(), listing.source().calls());
    }

    #[tokio::test]
    async fn test_truncated_first_page_without_token_ends_listing() {
        let source = FakeSource::new(&[(4, true), (4, false)]).without_tokens();
        let mut listing = PagedListing::start(source).await.unwrap();
        assert!(listing.has_next());
        let page = listing.next_page().await.unwrap();
        assert_eq!(page.entries, 4);
        assert!(!listing.has_next());
        assert!(matches!(listing.next_page().await.unwrap_err(), Error::NoMoreElements));
        assert_eq!(listing.source().calls(), 1);
        assert_eq!(listing.pages(), 1);
    }

    #[tokio::test]
    async fn test_second_transient_failure_surfaces() {
        let source = FakeSource::new(&[(1, false)]).failing_with(vec![
            Error::ServiceUnavailable("again".into()),
            Error::ServiceUnavailable("first".into()),
        ]);
        let err = PagedListing::start(source).await.err().unwrap();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let source = FakeSource::new(&[(1, true), (1, false)]);
        let mut listing = PagedListing::start(source).await.unwrap();
        listing.next_page().await.unwrap();
        listing
            .source()
            .failures
            .lock()
            .unwrap()
            .push(Error::NotFound("bucket".into()));
        let err = listing.next_page().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(listing.source().calls(), 2);
    }
}
