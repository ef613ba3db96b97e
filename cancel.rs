use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{EngineError, EngineResult};

/// Cooperative cancellation flag for one batch job.
///
/// Cancellation only takes effect at defined checkpoints (index boundary,
/// chunk boundary, pre-write boundary); an in-flight device call is never
/// aborted mid-flight. Tokens cannot be un-cancelled, so `reset` swaps in a
/// fresh one at job start.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    token: Arc<RwLock<CancellationToken>>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token
            .read()
            .expect("cancel flag lock poisoned")
            .cancel();
    }

    /// Clear the flag. Called by the orchestrator at job start.
    pub fn reset(&self) {
        *self.token.write().expect("cancel flag lock poisoned") = CancellationToken::new();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token
            .read()
            .expect("cancel flag lock poisoned")
            .is_cancelled()
    }

    /// Raise `Cancelled` if the flag is set and the call site is consequential
    /// (persisting to the database or visible to an observer). A read-only
    /// preview probe is allowed to keep running after a cancel request.
    pub fn check_or_fail(&self, consequential: bool) -> EngineResult<()> {
        if consequential && self.is_cancelled() {
            debug!("🛑 cancellation checkpoint hit, unwinding job");
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}
