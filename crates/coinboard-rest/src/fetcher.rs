//! Network seam for the request cache.

use crate::error::RestResult;
use std::pin::Pin;

/// Boxed future type for trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Issues one GET and returns the decoded JSON body.
///
/// Implementations map non-2xx responses to [`crate::RestError::Status`].
pub trait Fetcher: Send + Sync + 'static {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, RestResult<serde_json::Value>>;
}
