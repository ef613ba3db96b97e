use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::bundle::BundleLookup;
use crate::cache::{account_cache_key, CacheKey, NetworkAccountCache};
use crate::cancel::CancelFlag;
use crate::errors::{EngineError, EngineResult};
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::providers::{Collaborators, EngineEvent};
use crate::types::{
    BatchJobRequest, DerivationTarget, DerivedAccount, PrepareAccountsRequest, WalletKind,
};

/// Hardware firmware accepts at most this many addresses per prepare call.
pub const DERIVE_CHUNK_SIZE: usize = 10;

/// Pause between chunks so back-to-back calls do not saturate the device.
const INTER_CHUNK_PAUSE: Duration = Duration::from_millis(300);

/// Backpressure valve after each processed account so an observer can render.
const UI_REFRESH_PAUSE: Duration = Duration::from_millis(100);

/// One target's slice of the job, as handed down by the orchestrator.
pub struct TargetRun<'a> {
    pub request: &'a BatchJobRequest,
    pub wallet_kind: WalletKind,
    pub target: &'a DerivationTarget,
    pub indexes: &'a [u32],
    pub excluded: &'a BTreeSet<u32>,
    pub bundle: Option<&'a BundleLookup>,
}

impl TargetRun<'_> {
    fn consequential(&self) -> bool {
        self.request.save_to_db || self.request.show_ui_progress
    }
}

/// Derives one target's accounts in capacity-bounded chunks.
///
/// Cached indexes replay through the same per-account pipeline; only the
/// derivation itself is short-circuited. Within one target, indexes are
/// processed in ascending order; nothing here runs concurrently, the device
/// is an exclusive resource and the HD path is serialized to match, so the
/// cancellation checkpoints and progress accounting stay predictable.
pub struct ChunkedDeriver<'a> {
    collab: &'a Collaborators,
    cache: &'a NetworkAccountCache,
    flag: &'a CancelFlag,
    progress: &'a ProgressTracker,
}

impl<'a> ChunkedDeriver<'a> {
    pub fn new(
        collab: &'a Collaborators,
        cache: &'a NetworkAccountCache,
        flag: &'a CancelFlag,
        progress: &'a ProgressTracker,
    ) -> Self {
        Self {
            collab,
            cache,
            flag,
            progress,
        }
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(network_id = %run.target.network_id, scheme = %run.target.derive_scheme)
    )]
    pub async fn derive_target(&self, run: &TargetRun<'_>) -> EngineResult<Vec<DerivedAccount>> {
        let request = run.request;
        if self.collab.networks.is_all_network(&run.target.network_id) {
            return Err(EngineError::Setup(
                "the all-network meta id is not a derivation target".into(),
            ));
        }
        if request.save_to_db && !self.progress.is_active() {
            return Err(EngineError::Setup(
                "progress state is required when persisting".into(),
            ));
        }
        let consequential = run.consequential();

        let mut out: Vec<DerivedAccount> = Vec::new();
        let mut rebuild: Vec<u32> = Vec::new();

        for &index in run.indexes {
            self.flag.check_or_fail(consequential)?;
            if run.excluded.contains(&index) {
                continue;
            }
            let key = self.key_for(run, index);
            match self.cache.get(&key).filter(|_| request.save_to_cache) {
                Some(cached) => self.process_account(run, key, cached, &mut out).await?,
                None => rebuild.push(index),
            }
        }

        if rebuild.is_empty() {
            return Ok(out);
        }

        let vault = self
            .collab
            .vaults
            .get_vault(&run.target.network_id, &request.wallet_id)
            .await?;
        let network_info = vault.network_info().await?;

        let chunk_count = rebuild.len().div_ceil(DERIVE_CHUNK_SIZE);
        debug!(
            uncached = rebuild.len(),
            chunks = chunk_count,
            "deriving uncached indexes"
        );

        for (i, chunk) in rebuild.chunks(DERIVE_CHUNK_SIZE).enumerate() {
            self.flag.check_or_fail(consequential)?;
            let prepare = PrepareAccountsRequest {
                wallet_id: request.wallet_id.clone(),
                wallet_kind: run.wallet_kind,
                network_id: run.target.network_id.clone(),
                derive_scheme: run.target.derive_scheme.clone(),
                indexes: chunk.to_vec(),
                show_on_device: request.show_on_device,
            };
            let accounts = vault.prepare_accounts(&prepare, run.bundle).await?;
            if i + 1 != chunk_count {
                sleep(INTER_CHUNK_PAUSE).await;
            }

            for account in accounts {
                self.flag.check_or_fail(consequential)?;
                let Some(path_index) = account.path_index else {
                    return Err(EngineError::Setup(
                        "prepared account is missing its path index".into(),
                    ));
                };
                if run.excluded.contains(&path_index) {
                    continue;
                }
                let key = self.key_for(run, path_index);

                self.flag.check_or_fail(consequential)?;
                let detail = vault
                    .build_account_address_detail(&account, &network_info)
                    .await?;
                let display_address = detail
                    .display_address
                    .clone()
                    .filter(|addr| !addr.is_empty())
                    .or_else(|| Some(detail.address.clone()).filter(|addr| !addr.is_empty()))
                    .unwrap_or_else(|| account.address.clone());
                let derived = DerivedAccount {
                    account,
                    network_id: run.target.network_id.clone(),
                    derive_scheme: run.target.derive_scheme.clone(),
                    address_detail: detail,
                    display_address,
                    exists_in_db: false,
                };
                self.process_account(run, key, derived, &mut out).await?;
            }
        }

        Ok(out)
    }

    fn key_for(&self, run: &TargetRun<'_>, index: u32) -> CacheKey {
        account_cache_key(
            self.collab.networks.as_ref(),
            &run.request.wallet_id,
            &run.target.network_id,
            &run.target.derive_scheme,
            index,
        )
    }

    /// Reconciliation tail shared by cached replays and fresh derivations:
    /// point-in-time existence lookup, cache write, optional persist,
    /// progress accounting.
    async fn process_account(
        &self,
        run: &TargetRun<'_>,
        key: CacheKey,
        mut account: DerivedAccount,
        out: &mut Vec<DerivedAccount>,
    ) -> EngineResult<()> {
        let request = run.request;
        let consequential = run.consequential();

        self.flag.check_or_fail(consequential)?;
        account.exists_in_db = self
            .collab
            .store
            .account_exists(&account.account.account_id)
            .await?;
        if request.save_to_cache {
            self.cache.put(key, account.clone());
        }
        out.push(account.clone());

        if request.save_to_db && !account.exists_in_db {
            self.flag.check_or_fail(consequential)?;
            let name_override = account
                .account
                .path_index
                .and_then(|index| request.account_names.get(&index))
                .map(String::as_str);
            self.collab
                .store
                .persist_account(&request.wallet_id, &account.network_id, &account, name_override)
                .await?;
            self.progress.on_created();
        }

        self.progress.on_processed();
        if request.show_ui_progress {
            if let Some(info) = self.progress.snapshot() {
                self.collab.events.emit(EngineEvent::Progress(ProgressEvent::for_target(
                    info,
                    &run.target.network_id,
                    &run.target.derive_scheme,
                )));
                sleep(UI_REFRESH_PAUSE).await;
            }
        }
        Ok(())
    }
}
