use tokio_util::sync::CancellationToken;

/// Single-fire broadcast flag telling every producer to stop.
///
/// Raised by the collector once it has seen `N` distinct values, or by the
/// consumer side to abort early. Raising it more than once is a no-op.
///
/// Producers observe the signal cooperatively: at the top of their loop, and
/// while waiting for room in the shared queue. It never interrupts a producer
/// mid-sample.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal that is also raised whenever `parent` is cancelled.
    ///
    /// Used to tie every generation to a service-wide shutdown token.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    /// Raises the signal. Idempotent.
    pub fn raise(&self) {
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the signal has been raised.
    pub async fn raised(&self) {
        self.token.cancelled().await;
    }
}
