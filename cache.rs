use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::DerivedAccount;

/// Unique key for a derived account.
///
/// All EVM-compatible networks share one address space, so the key collapses
/// them to the implementation family instead of the raw network id; a single
/// derivation then serves every network of the family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    wallet_id: String,
    family: String,
    derive_scheme: String,
    index: u32,
}

impl CacheKey {
    pub fn new(
        wallet_id: impl Into<String>,
        family_or_network_id: impl Into<String>,
        derive_scheme: impl Into<String>,
        index: u32,
    ) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            family: family_or_network_id.into(),
            derive_scheme: derive_scheme.into(),
            index,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.wallet_id, self.family, self.derive_scheme, self.index
        )
    }
}

/// Key for one `(wallet, network, scheme, index)` account, with the EVM
/// family collapse applied via the network provider's classification.
pub fn account_cache_key(
    networks: &dyn crate::providers::NetworkProvider,
    wallet_id: &str,
    network_id: &str,
    derive_scheme: &str,
    index: u32,
) -> CacheKey {
    let family = if networks.is_evm(network_id) {
        networks.network_impl(network_id)
    } else {
        network_id.to_string()
    };
    CacheKey::new(wallet_id, family, derive_scheme, index)
}

/// Process-scoped cache of derived accounts.
///
/// No TTL and no automatic invalidation: for a given wallet the address at a
/// derivation path is deterministic, so an entry can never go stale. The
/// session boundary calls `clear()` explicitly; a preview pass and the
/// following confirm pass intentionally share entries so the device is not
/// prompted twice.
#[derive(Clone, Debug, Default)]
pub struct NetworkAccountCache {
    inner: Arc<RwLock<HashMap<CacheKey, DerivedAccount>>>,
}

impl NetworkAccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<DerivedAccount> {
        let hit = self
            .inner
            .read()
            .expect("account cache lock poisoned")
            .get(key)
            .cloned();
        if hit.is_some() {
            debug!("💰 cache hit for {}", key.storage_key());
        }
        hit
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner
            .read()
            .expect("account cache lock poisoned")
            .contains_key(key)
    }

    pub fn put(&self, key: CacheKey, account: DerivedAccount) {
        self.inner
            .write()
            .expect("account cache lock poisoned")
            .insert(key, account);
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .expect("account cache lock poisoned")
            .clear();
        debug!("🧹 network account cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("account cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
