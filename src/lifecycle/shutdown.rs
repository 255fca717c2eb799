//! Process-wide shutdown token.
//!
//! One [`Shutdown`] is created at startup. Clones share the same token, so the
//! signal listener, the server and tests can all hold one.

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Future that resolves once [`Shutdown::trigger`] has been called on any clone.
    ///
    /// Owned, so it can be handed to `with_graceful_shutdown` or a spawned task.
    pub fn subscribe(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Starts the drain. Calling it again is a no-op.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}
