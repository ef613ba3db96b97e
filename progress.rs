use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::errors::JobErrorInfo;

/// Counters for one batch job.
///
/// `progress_current` is monotonically non-decreasing and never exceeds
/// `progress_total`; `created_count <= progress_current` at every emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub total_count: u64,
    pub progress_total: u64,
    pub progress_current: u64,
    pub created_count: u64,
}

impl ProgressInfo {
    /// Totals are computed up front: `(indexes - excluded) * targets`, unless
    /// the caller supplies an override.
    pub fn build(
        index_count: usize,
        excluded_count: usize,
        target_count: usize,
        progress_total_override: Option<u64>,
    ) -> Self {
        let per_target = index_count.saturating_sub(excluded_count) as u64;
        let targets = target_count as u64;
        Self {
            total_count: index_count as u64 * targets,
            progress_total: progress_total_override.unwrap_or(per_target * targets),
            progress_current: 0,
            created_count: 0,
        }
    }
}

/// Progress payload emitted toward the observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub total_count: u64,
    pub progress_total: u64,
    pub progress_current: u64,
    pub created_count: u64,
    pub network_id: Option<String>,
    pub derive_scheme: Option<String>,
    pub error: Option<JobErrorInfo>,
}

impl ProgressEvent {
    pub fn from_info(info: ProgressInfo) -> Self {
        Self {
            total_count: info.total_count,
            progress_total: info.progress_total,
            progress_current: info.progress_current,
            created_count: info.created_count,
            network_id: None,
            derive_scheme: None,
            error: None,
        }
    }

    pub fn for_target(info: ProgressInfo, network_id: &str, derive_scheme: &str) -> Self {
        let mut event = Self::from_info(info);
        event.network_id = Some(network_id.to_string());
        event.derive_scheme = Some(derive_scheme.to_string());
        event
    }
}

/// Shared, job-scoped progress state. `None` outside an active job.
#[derive(Clone, Debug, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<Option<ProgressInfo>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, info: ProgressInfo) {
        *self.inner.write().expect("progress lock poisoned") = Some(info);
    }

    pub fn reset(&self) {
        *self.inner.write().expect("progress lock poisoned") = None;
    }

    pub fn snapshot(&self) -> Option<ProgressInfo> {
        *self.inner.read().expect("progress lock poisoned")
    }

    pub fn is_active(&self) -> bool {
        self.snapshot().is_some()
    }

    pub fn on_created(&self) {
        if let Some(info) = self.inner.write().expect("progress lock poisoned").as_mut() {
            info.created_count += 1;
        }
    }

    pub fn on_processed(&self) {
        if let Some(info) = self.inner.write().expect("progress lock poisoned").as_mut() {
            info.progress_current = (info.progress_current + 1).min(info.progress_total);
        }
    }
}
