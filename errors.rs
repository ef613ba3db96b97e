use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::WalletKind;

/// Hardware session failures that end the physical device session. Every
/// later device call would fail the same way, so these always abort the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSessionKind {
    DeviceNotFound,
    PinCancelled,
    ActionCancelled,
    InterruptedFromOutside,
    InterruptedFromApp,
}

/// Auxiliary credential prompts the user explicitly dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    PasswordPrompt,
    SecureQrDialog,
    QrScan,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("setup error: {0}")]
    Setup(String),

    #[error("device session lost: {0:?}")]
    DeviceSession(DeviceSessionKind),

    #[error("credential prompt dismissed: {0:?}")]
    CredentialCancelled(CredentialKind),

    #[error("batch create flow cancelled")]
    Cancelled,

    #[error("derivation failed for {network_id}/{derive_scheme}: {message}")]
    Transient {
        network_id: String,
        derive_scheme: String,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Serializable plain form of an error, carried in job results and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobErrorInfo {
    pub class_name: String,
    pub message: String,
}

impl JobErrorInfo {
    pub fn from_error(error: &EngineError) -> Self {
        let class_name = match error {
            EngineError::Setup(_) => "SetupError",
            EngineError::DeviceSession(_) => "DeviceSessionError",
            EngineError::CredentialCancelled(_) => "CredentialCancelledError",
            EngineError::Cancelled => "CancelledError",
            EngineError::Transient { .. } => "TransientDerivationError",
            EngineError::Other(_) => "UnknownError",
        };
        Self {
            class_name: class_name.to_string(),
            message: error.to_string(),
        }
    }
}

/// What to do with a failure caught at a per-target boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Unwind the whole job.
    Abort,
    /// Record `{target, error}` and move on to the next target.
    RecordAndContinue,
}

/// Job state the classifier needs, captured at the moment of failure.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext {
    pub wallet_kind: WalletKind,
    pub auto_recover: bool,
    pub save_to_db: bool,
    pub flow_cancelled: bool,
    pub has_progress: bool,
}

/// Two-tier error policy: a multi-network job is expected to partially fail
/// without losing progress on the other targets, while session-ending errors
/// must stop everything.
pub fn classify(error: &EngineError, ctx: &ClassifyContext) -> ErrorDisposition {
    // Cancellation checkpoints always unwind, never get recorded per target.
    if matches!(error, EngineError::Cancelled) {
        return ErrorDisposition::Abort;
    }

    // Caller wants strict fail-fast.
    if !ctx.auto_recover {
        return ErrorDisposition::Abort;
    }

    // The job is already winding down; do not mask the original error.
    if ctx.flow_cancelled || !ctx.has_progress {
        return ErrorDisposition::Abort;
    }

    // A pure preview has no partial state worth reconciling.
    if !ctx.save_to_db {
        return ErrorDisposition::Abort;
    }

    if ctx.wallet_kind == WalletKind::Hw && matches!(error, EngineError::DeviceSession(_)) {
        return ErrorDisposition::Abort;
    }

    if matches!(error, EngineError::CredentialCancelled(_)) {
        return ErrorDisposition::Abort;
    }

    ErrorDisposition::RecordAndContinue
}
