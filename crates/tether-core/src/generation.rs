//! Recovery generations: an epoch counter plus a cancellable wait.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// At most one generation is live. Advancing cancels the previous one, which
/// turns any window still waiting on it into a no-op.
#[derive(Debug)]
pub(crate) struct RecoveryGeneration {
    epoch: u64,
    token: CancellationToken,
}

impl RecoveryGeneration {
    pub(crate) fn new() -> Self {
        Self {
            epoch: 0,
            token: CancellationToken::new(),
        }
    }

    /// Cancel the live generation and replace it. Returns the new epoch.
    pub(crate) fn advance(&mut self) -> u64 {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.epoch += 1;
        self.epoch
    }

    #[cfg(test)]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && !self.token.is_cancelled()
    }

    /// Wait `duration` on this generation. Resolves to the epoch if the window
    /// elapsed, or `None` if the generation was cancelled first.
    pub(crate) fn window(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Option<u64>> + Send + 'static {
        let token = self.token.clone();
        let epoch = self.epoch;
        async move {
            tokio::select! {
                _ = token.cancelled() => None,
                _ = tokio::time::sleep(duration) => Some(epoch),
            }
        }
    }
}
