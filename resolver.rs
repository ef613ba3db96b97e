use std::collections::HashSet;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::errors::EngineResult;
use crate::providers::NetworkProvider;
use crate::types::{DerivationTarget, NetworkListFilter, TargetDirective, WalletKind};

/// Networks excluded from "all networks" expansion for software wallets.
static BATCH_EXCLUDED_NETWORKS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "cardano",    // too slow for batch derivation
        "lightning",  // network connection required
        "tlightning", // network connection required
        "dynex",      // no hd support
    ]
});

/// Hardware wallets get a narrower list (no `dynex` ban; derivation happens
/// on-device).
static BATCH_EXCLUDED_NETWORKS_HW: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "cardano",    // too slow, tears down the device passphrase session
        "lightning",  // signing required
        "tlightning", // signing required
    ]
});

/// Turns a job's target directive into the deduplicated, policy-filtered,
/// order-preserving target list to actually process.
pub struct TargetResolver<'a> {
    networks: &'a dyn NetworkProvider,
}

impl<'a> TargetResolver<'a> {
    pub fn new(networks: &'a dyn NetworkProvider) -> Self {
        Self { networks }
    }

    pub async fn resolve(
        &self,
        wallet_id: &str,
        wallet_kind: WalletKind,
        directive: &TargetDirective,
    ) -> EngineResult<Vec<DerivationTarget>> {
        let mut requested: Vec<DerivationTarget> = Vec::new();

        if directive.include_default_networks {
            requested.extend(self.networks.default_targets().await?);
        }

        if directive.include_all_networks {
            let excluded = if wallet_kind == WalletKind::Hw {
                &*BATCH_EXCLUDED_NETWORKS_HW
            } else {
                &*BATCH_EXCLUDED_NETWORKS
            };
            let filter = NetworkListFilter {
                exclude_test_networks: true,
                exclude_network_ids: excluded.iter().map(|id| id.to_string()).collect(),
                unique_by_impl: true,
            };
            for network in self.networks.get_all_networks(&filter).await? {
                for scheme in self.networks.get_derive_schemes(&network.network_id).await? {
                    requested.push(DerivationTarget::new(&network.network_id, scheme.scheme));
                }
            }
        }

        for target in &directive.targets {
            let settings = self.networks.get_vault_settings(&target.network_id).await?;
            if directive.expand_derive_schemes && settings.merge_derive_assets_enabled {
                for scheme in self.networks.get_derive_schemes(&target.network_id).await? {
                    requested.push(DerivationTarget::new(&target.network_id, scheme.scheme));
                }
            } else {
                requested.push(target.clone());
            }
        }

        self.filter(wallet_id, wallet_kind, requested).await
    }

    async fn filter(
        &self,
        wallet_id: &str,
        wallet_kind: WalletKind,
        requested: Vec<DerivationTarget>,
    ) -> EngineResult<Vec<DerivationTarget>> {
        let mut resolved: Vec<DerivationTarget> = Vec::new();
        let mut seen_families: HashSet<String> = HashSet::new();
        let mut seen_targets: HashSet<(String, String)> = HashSet::new();

        for target in requested {
            // The synthetic all-network meta id is never a derivation target.
            if self.networks.is_all_network(&target.network_id) {
                continue;
            }

            // All EVM networks of one family share an address space; one
            // representative target per (family, scheme, wallet) is enough.
            if self.networks.is_evm(&target.network_id) {
                let family = self.networks.network_impl(&target.network_id);
                let family_key = format!("{}_{}_{}", family, target.derive_scheme, wallet_id);
                if !seen_families.insert(family_key) {
                    continue;
                }
            }

            if wallet_kind == WalletKind::Qr {
                let settings = self.networks.get_vault_settings(&target.network_id).await?;
                if !settings.qr_account_enabled {
                    continue;
                }
            }

            let key = (target.network_id.clone(), target.derive_scheme.clone());
            if !seen_targets.insert(key) {
                continue;
            }
            resolved.push(target);
        }

        debug!(count = resolved.len(), "resolved batch derivation targets");
        Ok(resolved)
    }
}
