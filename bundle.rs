use std::collections::{BTreeSet, HashMap};

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::cache::{account_cache_key, CacheKey, NetworkAccountCache};
use crate::errors::{EngineError, EngineResult};
use crate::providers::{Collaborators, EngineEvent};
use crate::types::{
    BatchJobRequest, BundleAddress, DerivationTarget, PathDescriptorRequest, WalletKind,
};
use crate::utils::build_path_from_template;

/// Device answers keyed the same way as the account cache, so the chunked
/// deriver can look up resolved indexes without another device round-trip.
pub type BundleLookup = HashMap<CacheKey, BundleAddress>;

/// Collapses N device calls into one for hardware wallets.
///
/// Every device call has high fixed latency and may require user
/// confirmation, so all `(target, index)` cache misses of the whole job go
/// out as a single bundled address request. The coordinator never writes the
/// shared cache itself: validation and cache writes stay with the chunked
/// deriver, so a failed later step cannot leave half-validated entries.
pub struct DeviceBatchCoordinator<'a> {
    collab: &'a Collaborators,
    cache: &'a NetworkAccountCache,
}

impl<'a> DeviceBatchCoordinator<'a> {
    pub fn new(collab: &'a Collaborators, cache: &'a NetworkAccountCache) -> Self {
        Self { collab, cache }
    }

    /// Issue the consolidated device call for the whole job. `Ok(None)` means
    /// there is nothing to bundle: software wallet, no device session, or
    /// every key already cached.
    #[instrument(level = "debug", skip_all, fields(wallet_id = %request.wallet_id))]
    pub async fn prepare_bundle(
        &self,
        request: &BatchJobRequest,
        wallet_kind: WalletKind,
        targets: &[DerivationTarget],
        indexes: &[u32],
        excluded: &BTreeSet<u32>,
    ) -> EngineResult<Option<BundleLookup>> {
        if wallet_kind != WalletKind::Hw {
            return Ok(None);
        }
        let Some(device) = self
            .collab
            .wallets
            .get_wallet_device_params(&request.wallet_id)
            .await?
        else {
            debug!("no device session available, skipping bundle call");
            return Ok(None);
        };

        let mut descriptors = Vec::new();
        let mut keys = Vec::new();
        for target in targets {
            let scheme_info = self
                .collab
                .networks
                .get_derive_scheme_info(&target.network_id, &target.derive_scheme)
                .await?;
            let vault = self
                .collab
                .vaults
                .get_vault(&target.network_id, &request.wallet_id)
                .await?;
            for &index in indexes {
                if excluded.contains(&index) {
                    continue;
                }
                let key = account_cache_key(
                    self.collab.networks.as_ref(),
                    &request.wallet_id,
                    &target.network_id,
                    &target.derive_scheme,
                    index,
                );
                if request.save_to_cache && self.cache.contains(&key) {
                    continue;
                }
                let descriptor_request = PathDescriptorRequest {
                    path: build_path_from_template(&scheme_info.template, index),
                    template: scheme_info.template.clone(),
                    index,
                    address_encoding: scheme_info.address_encoding.clone(),
                    show_on_device: request.show_on_device,
                };
                if let Some(descriptor) = vault.build_hw_prepare_params(&descriptor_request).await?
                {
                    descriptors.push(descriptor);
                    keys.push(key);
                }
            }
        }

        if descriptors.is_empty() {
            debug!("every key cached or unbundleable, no device call needed");
            return Ok(None);
        }

        let connect_id = self
            .collab
            .wallets
            .get_compatible_connect_id(&device.connect_id, &device.device_id)
            .await?;

        info!(
            "📦 issuing bundled device call with {} descriptors",
            descriptors.len()
        );
        self.collab.events.emit(EngineEvent::BundleCallStart);
        let response = self
            .collab
            .hardware
            .all_network_get_address(&connect_id, &device.device_id, &device.common, &descriptors)
            .await;
        self.collab.events.emit(EngineEvent::BundleCallEnd);

        let addresses = response?;
        if addresses.len() != keys.len() {
            return Err(EngineError::Other(anyhow!(
                "bundle response has {} entries for {} descriptors",
                addresses.len(),
                keys.len()
            )));
        }

        let lookup: BundleLookup = keys.into_iter().zip(addresses).collect();
        Ok(Some(lookup))
    }
}
