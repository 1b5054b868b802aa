//! Source fetcher abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::FetchLimits;
use crate::core::FetchError;
use crate::util::serde::Record;

/// Produces the records for a named source.
///
/// The fetcher owns the remote protocol (authentication, paging, parsing); the
/// monitor only sees a list of records or a [`FetchError`]. Implementations
/// should observe `cancel` at their await points and return
/// [`FetchError::Cancelled`] when it fires.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_source_poller::core::{FetchError, SourceFetcher};
/// use prometheus_source_poller::config::FetchLimits;
/// use prometheus_source_poller::util::Record;
/// use tokio_util::sync::CancellationToken;
///
/// struct FixedFetcher;
///
/// #[async_trait]
/// impl SourceFetcher for FixedFetcher {
///     async fn fetch(
///         &self,
///         source: &str,
///         _limits: FetchLimits,
///         _cancel: CancellationToken,
///     ) -> Result<Vec<Record>, FetchError> {
///         Ok(vec![Record::new(format!("hello from {source}"), None, 1)])
///     }
/// }
/// ```
#[async_trait]
pub trait SourceFetcher: Send + Sync + 'static {
    /// Fetch up to `limits.max_items` records for `source`.
    async fn fetch(
        &self,
        source: &str,
        limits: FetchLimits,
        cancel: CancellationToken,
    ) -> Result<Vec<Record>, FetchError>;
}

#[async_trait]
impl<F> SourceFetcher for Arc<F>
where
    F: SourceFetcher + ?Sized,
{
    async fn fetch(
        &self,
        source: &str,
        limits: FetchLimits,
        cancel: CancellationToken,
    ) -> Result<Vec<Record>, FetchError> {
        (**self).fetch(source, limits, cancel).await
    }
}
