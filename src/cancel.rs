use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Race a future against an optional cancellation token.
///
/// Returns `Err(Error::Cancelled)` if the token fires first; the losing
/// future is dropped, which aborts any in-flight HTTP request it owns.
pub(crate) async fn or_cancelled<F>(fut: F, cancel: Option<&CancellationToken>) -> Result<F::Output>
where
    F: Future,
{
    match cancel {
        None => Ok(fut.await),
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        },
    }
}
