//! Racing outbound calls against a cancellation token

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Await `fut`, failing with [`Error::Cancelled`] if `cancel` fires first.
///
/// The losing future is dropped, which aborts in-flight HTTP requests and
/// kills children spawned with `kill_on_drop`.
pub async fn cancellable<F, T>(cancel: &CancellationToken, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(what.to_string())),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let res: Result<()> = cancellable(&cancel, "waiting", std::future::pending()).await;
        assert!(res.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_completed_future_passes_through() {
        let cancel = CancellationToken::new();
        let res = cancellable(&cancel, "adding", async { Ok(2 + 2) }).await;
        assert_eq!(res.unwrap(), 4);
    }
}
