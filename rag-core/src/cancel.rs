//! Cancellation of in-flight provider calls.
//!
//! Long-running operations take a [`CancellationToken`]. When the token fires,
//! the pending provider future is dropped and the operation returns
//! [`RagError::Cancelled`] without publishing any partial state.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};

/// Drive `future` to completion unless `token` is cancelled first.
pub(crate) async fn run_cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(RagError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RagError::Cancelled),
        result = future => result,
    }
}
