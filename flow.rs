use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::bundle::DeviceBatchCoordinator;
use crate::cache::NetworkAccountCache;
use crate::cancel::CancelFlag;
use crate::deriver::{ChunkedDeriver, TargetRun};
use crate::errors::{
    classify, ClassifyContext, EngineError, EngineResult, ErrorDisposition, JobErrorInfo,
};
use crate::progress::{ProgressEvent, ProgressInfo, ProgressTracker};
use crate::providers::{Collaborators, EngineEvent};
use crate::resolver::TargetResolver;
use crate::types::{BatchJobRequest, DerivationTarget, FailedTarget, JobResult, WalletKind};
use crate::utils::wallet_kind_of;

/// Settle pause after the final progress event so the observer can render the
/// completed bar before the dialog goes away.
const DONE_EVENT_SETTLE: Duration = Duration::from_millis(600);

/// Top-level coordinator for batch account jobs.
///
/// Owns the cancellation flag and progress state for the duration of one job
/// and drives resolve -> bundle -> per-target derivation. The cache is an
/// injected, session-scoped collaborator: the session boundary calls
/// `clear_cache`, never the engine itself. Only one job runs at a time; a
/// second `start_job` queues behind the first.
pub struct BatchAccountEngine {
    collab: Collaborators,
    cache: NetworkAccountCache,
    flag: CancelFlag,
    progress: ProgressTracker,
    job_lock: Mutex<()>,
}

impl BatchAccountEngine {
    pub fn new(collab: Collaborators, cache: NetworkAccountCache) -> Self {
        Self {
            collab,
            cache,
            flag: CancelFlag::new(),
            progress: ProgressTracker::new(),
            job_lock: Mutex::new(()),
        }
    }

    /// Shared handle to this engine's cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.flag.clone()
    }

    pub fn progress(&self) -> Option<ProgressInfo> {
        self.progress.snapshot()
    }

    pub fn cache(&self) -> &NetworkAccountCache {
        &self.cache
    }

    /// Request cooperative cancellation of the running job. Takes effect at
    /// the next checkpoint; an in-flight device call completes on its own.
    pub fn cancel_job(&self) {
        info!("🛑 batch create flow cancellation requested");
        self.flag.cancel();
        self.progress.reset();
    }

    /// Session boundary: drop every cached derivation. Call before starting
    /// an unrelated batch-creation session.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Run the whole pipeline without persisting, honoring the shared cache
    /// so a following confirm pass does not re-prompt the device.
    pub async fn preview_job(&self, mut request: BatchJobRequest) -> EngineResult<JobResult> {
        request.save_to_db = false;
        self.start_job(request).await
    }

    #[instrument(level = "info", skip_all, fields(wallet_id = %request.wallet_id))]
    pub async fn start_job(&self, request: BatchJobRequest) -> EngineResult<JobResult> {
        let _job = self.job_lock.lock().await;
        self.flag.reset();
        self.progress.reset();

        let wallet_kind = wallet_kind_of(&request.wallet_id)?;
        if !wallet_kind.supports_batch_derivation() {
            return Err(EngineError::Setup(format!(
                "wallet kind {wallet_kind:?} cannot derive accounts"
            )));
        }
        let indexes = request.indexes.indexes()?;
        let excluded = request.indexes.excluded();

        let targets = TargetResolver::new(self.collab.networks.as_ref())
            .resolve(&request.wallet_id, wallet_kind, &request.targets)
            .await?;
        info!(
            "🚀 starting batch job: {} targets x {} indexes",
            targets.len(),
            indexes.len()
        );

        self.progress.start(ProgressInfo::build(
            indexes.len(),
            excluded.len(),
            targets.len(),
            request.progress_total_override,
        ));

        let outcome = self
            .run_targets(&request, wallet_kind, &targets, &indexes, &excluded)
            .await;
        match outcome {
            Ok(result) => {
                self.emit_done(&request, &result).await;
                self.progress.reset();
                Ok(result)
            }
            Err(error) => {
                self.progress.reset();
                Err(error)
            }
        }
    }

    async fn run_targets(
        &self,
        request: &BatchJobRequest,
        wallet_kind: WalletKind,
        targets: &[DerivationTarget],
        indexes: &[u32],
        excluded: &BTreeSet<u32>,
    ) -> EngineResult<JobResult> {
        let mut result = JobResult::default();
        let consequential = request.save_to_db || request.show_ui_progress;

        // One bundled device call for the whole job; that is the entire point
        // of bundling. A failed bundle is surfaced but does not stop per-chunk
        // derivation: the bundle is an optimization, not a requirement.
        let coordinator = DeviceBatchCoordinator::new(&self.collab, &self.cache);
        let bundle = match coordinator
            .prepare_bundle(request, wallet_kind, targets, indexes, excluded)
            .await
        {
            Ok(bundle) => bundle,
            Err(bundle_error) => {
                self.emit_error_progress(request, &bundle_error);
                match classify(&bundle_error, &self.classify_ctx(request, wallet_kind)) {
                    ErrorDisposition::Abort => return Err(bundle_error),
                    ErrorDisposition::RecordAndContinue => {
                        warn!(
                            "⚠️ bundled device call failed, falling back to per-chunk derivation: {bundle_error}"
                        );
                        result.bundle_error = Some(JobErrorInfo::from_error(&bundle_error));
                        None
                    }
                }
            }
        };

        let deriver = ChunkedDeriver::new(&self.collab, &self.cache, &self.flag, &self.progress);
        for target in targets {
            let run = TargetRun {
                request,
                wallet_kind,
                target,
                indexes,
                excluded,
                bundle: bundle.as_ref(),
            };
            let unit = match self.flag.check_or_fail(consequential) {
                Ok(()) => deriver.derive_target(&run).await,
                Err(cancelled) => Err(cancelled),
            };
            match unit {
                Ok(accounts) => {
                    result.accounts_for_create.extend(accounts);
                    result.added_targets.push(target.clone());
                }
                Err(target_error) => {
                    self.emit_error_progress(request, &target_error);
                    match classify(&target_error, &self.classify_ctx(request, wallet_kind)) {
                        ErrorDisposition::Abort => {
                            error!(
                                "❌ batch job aborted on {}/{}: {target_error}",
                                target.network_id, target.derive_scheme
                            );
                            return Err(target_error);
                        }
                        ErrorDisposition::RecordAndContinue => {
                            warn!(
                                "⚠️ target {}/{} failed, continuing: {target_error}",
                                target.network_id, target.derive_scheme
                            );
                            result.failed_targets.push(FailedTarget {
                                target: target.clone(),
                                error: JobErrorInfo::from_error(&target_error),
                            });
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    fn classify_ctx(&self, request: &BatchJobRequest, wallet_kind: WalletKind) -> ClassifyContext {
        ClassifyContext {
            wallet_kind,
            auto_recover: request.auto_recover,
            save_to_db: request.save_to_db,
            flow_cancelled: self.flag.is_cancelled(),
            has_progress: self.progress.is_active(),
        }
    }

    fn emit_error_progress(&self, request: &BatchJobRequest, error: &EngineError) {
        if !request.show_ui_progress {
            return;
        }
        if let Some(info) = self.progress.snapshot() {
            let mut event = ProgressEvent::from_info(info);
            event.error = Some(JobErrorInfo::from_error(error));
            self.collab.events.emit(EngineEvent::Progress(event));
        }
    }

    async fn emit_done(&self, request: &BatchJobRequest, result: &JobResult) {
        let created = self
            .progress
            .snapshot()
            .map(|info| info.created_count)
            .unwrap_or(0);
        if request.save_to_db && created > 0 {
            self.collab.events.emit(EngineEvent::AccountsChanged);
            if let Err(backup_error) = self.collab.store.request_auto_backup().await {
                warn!("auto backup request failed: {backup_error}");
            }
        }
        if request.show_ui_progress {
            if let Some(mut info) = self.progress.snapshot() {
                info.progress_current = info.progress_total;
                self.collab
                    .events
                    .emit(EngineEvent::JobDone(ProgressEvent::from_info(info)));
                sleep(DONE_EVENT_SETTLE).await;
            }
        }
        info!(
            "✅ batch job done: {} accounts, {} targets added, {} failed",
            result.accounts_for_create.len(),
            result.added_targets.len(),
            result.failed_targets.len()
        );
    }
}
