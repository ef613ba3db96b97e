use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult, JobErrorInfo};

/// Wallet backing for a batch job. Only `Hd`, `Hw` and `Qr` wallets can
/// derive new accounts; imported and watching wallets have no derivation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    Hd,
    Hw,
    Qr,
    Imported,
    Watching,
}

impl WalletKind {
    pub fn uses_device(&self) -> bool {
        matches!(self, WalletKind::Hw)
    }

    pub fn supports_batch_derivation(&self) -> bool {
        matches!(self, WalletKind::Hd | WalletKind::Hw | WalletKind::Qr)
    }
}

/// Which address indexes a job covers.
///
/// `Explicit` is the "normal" selected-indexes mode; `Range` is the advanced
/// from/to mode with an exclusion set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexSelection {
    Explicit(Vec<u32>),
    Range {
        from: u32,
        to: u32,
        excluded: BTreeSet<u32>,
    },
}

impl IndexSelection {
    /// Expand to the concrete ascending index list. An empty selection is a
    /// setup error and must be caught before any device interaction.
    pub fn indexes(&self) -> EngineResult<Vec<u32>> {
        let indexes: Vec<u32> = match self {
            IndexSelection::Explicit(indexes) => indexes.clone(),
            IndexSelection::Range { from, to, .. } => {
                if from > to {
                    return Err(EngineError::Setup(format!(
                        "invalid index range: fromIndex {from} > toIndex {to}"
                    )));
                }
                (*from..=*to).collect()
            }
        };
        if indexes.is_empty() {
            return Err(EngineError::Setup("indexes is required".into()));
        }
        Ok(indexes)
    }

    pub fn excluded(&self) -> BTreeSet<u32> {
        match self {
            IndexSelection::Explicit(_) => BTreeSet::new(),
            IndexSelection::Range { excluded, .. } => excluded.clone(),
        }
    }
}

/// One `(network, derivation scheme)` pair to process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationTarget {
    pub network_id: String,
    pub derive_scheme: String,
}

impl DerivationTarget {
    pub fn new(network_id: impl Into<String>, derive_scheme: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            derive_scheme: derive_scheme.into(),
        }
    }
}

/// How the job's target list is assembled before resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDirective {
    /// Explicitly requested targets, kept in request order.
    pub targets: Vec<DerivationTarget>,
    /// Prepend the default add-account network set.
    pub include_default_networks: bool,
    /// Expand to every network the provider knows (minus the static batch
    /// exclusions), one target per derivation scheme.
    pub include_all_networks: bool,
    /// For explicit targets whose network merges derive assets, expand to one
    /// target per derivation scheme of that network.
    pub expand_derive_schemes: bool,
}

/// Immutable per-job input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobRequest {
    pub wallet_id: String,
    pub indexes: IndexSelection,
    pub targets: TargetDirective,
    pub save_to_db: bool,
    pub save_to_cache: bool,
    pub show_ui_progress: bool,
    /// Record per-target failures and keep going instead of failing fast.
    pub auto_recover: bool,
    pub show_on_device: bool,
    pub progress_total_override: Option<u64>,
    /// Optional display-name overrides keyed by address index.
    pub account_names: HashMap<u32, String>,
}

/// Account data as returned by a vault/keyring prepare call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedAccount {
    pub account_id: String,
    pub path: String,
    pub path_index: Option<u32>,
    pub address: String,
    pub pubkey: Option<String>,
}

/// Chain-specific display detail resolved by the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetail {
    pub address: String,
    pub display_address: Option<String>,
}

/// Fully assembled account record, ready for persistence.
///
/// `exists_in_db` is resolved by a point-in-time lookup right before use; the
/// database stays the source of truth for existence even when the record came
/// out of the derivation cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAccount {
    pub account: PreparedAccount,
    pub network_id: String,
    pub derive_scheme: String,
    pub address_detail: AddressDetail,
    pub display_address: String,
    pub exists_in_db: bool,
}

/// A target that failed with a recoverable error during an auto-recover job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    pub target: DerivationTarget,
    pub error: JobErrorInfo,
}

/// Accumulated output of one batch job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub accounts_for_create: Vec<DerivedAccount>,
    pub added_targets: Vec<DerivationTarget>,
    pub failed_targets: Vec<FailedTarget>,
    /// Failure of the consolidated device bundle call, if any. The bundle is
    /// an optimization, so the job keeps going with per-chunk derivation.
    pub bundle_error: Option<JobErrorInfo>,
}

/// Connection parameters for the wallet's hardware device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParams {
    pub connect_id: String,
    pub device_id: String,
    pub common: DeviceCommonParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommonParams {
    pub passphrase_state: Option<String>,
    pub use_empty_passphrase: bool,
}

/// Per-network settings consulted during target resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    pub merge_derive_assets_enabled: bool,
    pub qr_account_enabled: bool,
}

/// Description of one derivation scheme of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveSchemeInfo {
    pub scheme: String,
    /// Path template containing the index placeholder, e.g. `m/44'/60'/$$INDEX$$'/0/0`.
    pub template: String,
    pub address_encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network_id: String,
    pub network_impl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub network_id: String,
    pub is_testnet: bool,
}

/// Filters for the provider's full network listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkListFilter {
    pub exclude_test_networks: bool,
    pub exclude_network_ids: Vec<String>,
    pub unique_by_impl: bool,
}

/// Inputs for building a single hardware path descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDescriptorRequest {
    pub path: String,
    pub template: String,
    pub index: u32,
    pub address_encoding: Option<String>,
    pub show_on_device: bool,
}

/// One entry of the consolidated device bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDescriptor {
    pub network_id: String,
    pub derive_scheme: String,
    pub index: u32,
    pub path: String,
    pub address_encoding: Option<String>,
    pub show_on_device: bool,
}

/// One device answer for one bundle descriptor, in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleAddress {
    pub path: String,
    pub address: String,
    pub pubkey: Option<String>,
}

/// Inputs for one chunked derivation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareAccountsRequest {
    pub wallet_id: String,
    pub wallet_kind: WalletKind,
    pub network_id: String,
    pub derive_scheme: String,
    /// Ascending, already reduced to uncached/unexcluded indexes. Never more
    /// than the hardware per-call capacity.
    pub indexes: Vec<u32>,
    pub show_on_device: bool,
}
