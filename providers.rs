//! Collaborator contracts the engine is written against. Implementations live
//! outside this crate (device SDK bridge, chain vaults, account database,
//! observer plumbing); the engine only ever holds them as trait objects.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bundle::BundleLookup;
use crate::errors::EngineResult;
use crate::progress::ProgressEvent;
use crate::types::{
    AddressDetail, BundleAddress, DerivationTarget, DeriveSchemeInfo, DeviceCommonParams,
    DeviceParams, DerivedAccount, NetworkInfo, NetworkListFilter, NetworkSummary, PathDescriptor,
    PathDescriptorRequest, PrepareAccountsRequest, PreparedAccount, VaultSettings,
};

/// Wallet/device session lookup.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Device session parameters for a wallet, `None` when no device session
    /// is available (software wallets, unplugged device).
    async fn get_wallet_device_params(&self, wallet_id: &str)
        -> EngineResult<Option<DeviceParams>>;

    async fn get_compatible_connect_id(
        &self,
        connect_id: &str,
        device_id: &str,
    ) -> EngineResult<String>;
}

/// Per-chain derivation and address-detail operations.
#[async_trait]
pub trait Vault: Send + Sync {
    async fn network_info(&self) -> EngineResult<NetworkInfo>;

    /// Build one bundle descriptor for a hardware all-network address request.
    /// `None` when the chain cannot participate in bundled calls.
    async fn build_hw_prepare_params(
        &self,
        request: &PathDescriptorRequest,
    ) -> EngineResult<Option<PathDescriptor>>;

    /// Derive one chunk of accounts. HD vaults compute locally; hardware
    /// vaults consult the bundle lookup first to avoid a second device
    /// round-trip for indexes already resolved there.
    async fn prepare_accounts(
        &self,
        request: &PrepareAccountsRequest,
        bundle: Option<&BundleLookup>,
    ) -> EngineResult<Vec<PreparedAccount>>;

    async fn build_account_address_detail(
        &self,
        account: &PreparedAccount,
        network_info: &NetworkInfo,
    ) -> EngineResult<AddressDetail>;
}

#[async_trait]
pub trait VaultFactory: Send + Sync {
    async fn get_vault(&self, network_id: &str, wallet_id: &str) -> EngineResult<Arc<dyn Vault>>;
}

/// Hardware SDK bridge. One call carries the whole bundle; the response is
/// order-preserving, one address per descriptor.
#[async_trait]
pub trait HardwareSdk: Send + Sync {
    async fn all_network_get_address(
        &self,
        connect_id: &str,
        device_id: &str,
        common: &DeviceCommonParams,
        bundle: &[PathDescriptor],
    ) -> EngineResult<Vec<BundleAddress>>;
}

/// Network registry and per-network settings.
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn get_vault_settings(&self, network_id: &str) -> EngineResult<VaultSettings>;

    async fn get_derive_schemes(&self, network_id: &str) -> EngineResult<Vec<DeriveSchemeInfo>>;

    async fn get_derive_scheme_info(
        &self,
        network_id: &str,
        scheme: &str,
    ) -> EngineResult<DeriveSchemeInfo>;

    async fn get_all_networks(
        &self,
        filter: &NetworkListFilter,
    ) -> EngineResult<Vec<NetworkSummary>>;

    /// The default add-account network set, already paired with each
    /// network's global derivation scheme.
    async fn default_targets(&self) -> EngineResult<Vec<DerivationTarget>>;

    /// Implementation family of a network id (pure classification).
    fn network_impl(&self, network_id: &str) -> String;

    fn is_evm(&self, network_id: &str) -> bool;

    /// Whether this id is the synthetic "all networks" meta-network.
    fn is_all_network(&self, network_id: &str) -> bool;
}

/// Persistent account storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account_exists(&self, account_id: &str) -> EngineResult<bool>;

    async fn persist_account(
        &self,
        wallet_id: &str,
        network_id: &str,
        account: &DerivedAccount,
        name_override: Option<&str>,
    ) -> EngineResult<()>;

    /// Fire-and-forget backup request after a job persisted accounts.
    async fn request_auto_backup(&self) -> EngineResult<()>;
}

/// Events emitted toward the external observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    Progress(ProgressEvent),
    JobDone(ProgressEvent),
    AccountsChanged,
    BundleCallStart,
    BundleCallEnd,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// The full collaborator set, cloned into every component of one job.
#[derive(Clone)]
pub struct Collaborators {
    pub wallets: Arc<dyn WalletProvider>,
    pub vaults: Arc<dyn VaultFactory>,
    pub hardware: Arc<dyn HardwareSdk>,
    pub networks: Arc<dyn NetworkProvider>,
    pub store: Arc<dyn AccountStore>,
    pub events: Arc<dyn EventSink>,
}
