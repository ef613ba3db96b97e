#![allow(dead_code)]

//! Mock collaborators for driving the engine end-to-end, with call counters
//! so tests can assert how often the "device" and the store were actually
//! touched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use batch_accounts::bundle::BundleLookup;
use batch_accounts::cache::{account_cache_key, NetworkAccountCache};
use batch_accounts::cancel::CancelFlag;
use batch_accounts::errors::{DeviceSessionKind, EngineError, EngineResult};
use batch_accounts::flow::BatchAccountEngine;
use batch_accounts::providers::{
    AccountStore, Collaborators, EngineEvent, EventSink, HardwareSdk, NetworkProvider, Vault,
    VaultFactory, WalletProvider,
};
use batch_accounts::types::{
    AddressDetail, BatchJobRequest, BundleAddress, DerivationTarget, DeriveSchemeInfo,
    DerivedAccount, DeviceCommonParams, DeviceParams, IndexSelection, NetworkInfo,
    NetworkListFilter, NetworkSummary, PathDescriptor, PathDescriptorRequest,
    PrepareAccountsRequest, PreparedAccount, TargetDirective, VaultSettings, WalletKind,
};
use batch_accounts::utils::build_path_from_template;

pub const TEMPLATE: &str = "m/44'/60'/$$INDEX$$'/0/0";

pub fn account_id(wallet_id: &str, network_id: &str, scheme: &str, index: u32) -> String {
    format!("{wallet_id}--{network_id}--{scheme}--{index}")
}

/// Deterministic software-derived address for an index.
pub fn hd_address(index: u32) -> String {
    format!("0xA{index}")
}

/// Deterministic hardware-derived address for a bundle descriptor.
pub fn hw_address(network_id: &str, index: u32) -> String {
    format!("hw-{network_id}-{index}")
}

// ---------------------------------------------------------------------------
// Network provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TestNetworks;

#[async_trait]
impl NetworkProvider for TestNetworks {
    async fn get_vault_settings(&self, _network_id: &str) -> EngineResult<VaultSettings> {
        Ok(VaultSettings::default())
    }

    async fn get_derive_schemes(&self, network_id: &str) -> EngineResult<Vec<DeriveSchemeInfo>> {
        self.get_derive_scheme_info(network_id, "default")
            .await
            .map(|info| vec![info])
    }

    async fn get_derive_scheme_info(
        &self,
        _network_id: &str,
        scheme: &str,
    ) -> EngineResult<DeriveSchemeInfo> {
        Ok(DeriveSchemeInfo {
            scheme: scheme.to_string(),
            template: TEMPLATE.to_string(),
            address_encoding: None,
        })
    }

    async fn get_all_networks(
        &self,
        _filter: &NetworkListFilter,
    ) -> EngineResult<Vec<NetworkSummary>> {
        Ok(vec![])
    }

    async fn default_targets(&self) -> EngineResult<Vec<DerivationTarget>> {
        Ok(vec![])
    }

    fn network_impl(&self, network_id: &str) -> String {
        network_id
            .split_once("--")
            .map(|(family, _)| family.to_string())
            .unwrap_or_else(|| network_id.to_string())
    }

    fn is_evm(&self, network_id: &str) -> bool {
        network_id.starts_with("evm--")
    }

    fn is_all_network(&self, network_id: &str) -> bool {
        network_id == "allnetworks"
    }
}

// ---------------------------------------------------------------------------
// Wallet/device session provider
// ---------------------------------------------------------------------------

pub struct TestWallets {
    /// When false, hardware wallets report no device session.
    pub device_available: bool,
}

#[async_trait]
impl WalletProvider for TestWallets {
    async fn get_wallet_device_params(
        &self,
        wallet_id: &str,
    ) -> EngineResult<Option<DeviceParams>> {
        if self.device_available && wallet_id.starts_with("hw-") {
            Ok(Some(DeviceParams {
                connect_id: "conn-1".into(),
                device_id: "dev-1".into(),
                common: DeviceCommonParams::default(),
            }))
        } else {
            Ok(None)
        }
    }

    async fn get_compatible_connect_id(
        &self,
        connect_id: &str,
        _device_id: &str,
    ) -> EngineResult<String> {
        Ok(connect_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Hardware SDK bridge
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TestHardware {
    pub bundle_calls: AtomicUsize,
    pub bundle_sizes: Mutex<Vec<usize>>,
    /// When set, the bundled call fails with this error.
    pub fail_bundle: Mutex<Option<FailKind>>,
}

#[async_trait]
impl HardwareSdk for TestHardware {
    async fn all_network_get_address(
        &self,
        _connect_id: &str,
        _device_id: &str,
        _common: &DeviceCommonParams,
        bundle: &[PathDescriptor],
    ) -> EngineResult<Vec<BundleAddress>> {
        self.bundle_calls.fetch_add(1, Ordering::SeqCst);
        self.bundle_sizes.lock().unwrap().push(bundle.len());
        if let Some(kind) = self.fail_bundle.lock().unwrap().as_ref() {
            return Err(kind.to_error("bundle"));
        }
        Ok(bundle
            .iter()
            .map(|descriptor| BundleAddress {
                path: descriptor.path.clone(),
                address: hw_address(&descriptor.network_id, descriptor.index),
                pubkey: None,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Vaults
// ---------------------------------------------------------------------------

pub enum FailKind {
    Transient,
    DeviceSession,
}

impl FailKind {
    pub fn to_error(&self, context: &str) -> EngineError {
        match self {
            FailKind::Transient => EngineError::Transient {
                network_id: context.to_string(),
                derive_scheme: "default".to_string(),
                message: "rpc down".to_string(),
            },
            FailKind::DeviceSession => {
                EngineError::DeviceSession(DeviceSessionKind::DeviceNotFound)
            }
        }
    }
}

#[derive(Default)]
pub struct VaultState {
    pub prepare_calls: AtomicUsize,
    pub chunk_sizes: Mutex<Vec<usize>>,
    /// Indexes a hardware vault had to derive on-device (bundle misses).
    pub device_derives: AtomicUsize,
    /// Indexes derived by software computation.
    pub hd_derives: AtomicUsize,
    /// Networks whose prepare call fails.
    pub fail_prepare: Mutex<HashMap<String, FailKind>>,
    pub networks: Arc<TestNetworks>,
}

pub struct TestVault {
    network_id: String,
    state: Arc<VaultState>,
}

#[async_trait]
impl Vault for TestVault {
    async fn network_info(&self) -> EngineResult<NetworkInfo> {
        Ok(NetworkInfo {
            network_id: self.network_id.clone(),
            network_impl: self.state.networks.network_impl(&self.network_id),
        })
    }

    async fn build_hw_prepare_params(
        &self,
        request: &PathDescriptorRequest,
    ) -> EngineResult<Option<PathDescriptor>> {
        Ok(Some(PathDescriptor {
            network_id: self.network_id.clone(),
            derive_scheme: "default".into(),
            index: request.index,
            path: request.path.clone(),
            address_encoding: request.address_encoding.clone(),
            show_on_device: request.show_on_device,
        }))
    }

    async fn prepare_accounts(
        &self,
        request: &PrepareAccountsRequest,
        bundle: Option<&BundleLookup>,
    ) -> EngineResult<Vec<PreparedAccount>> {
        self.state.prepare_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .chunk_sizes
            .lock()
            .unwrap()
            .push(request.indexes.len());
        if let Some(kind) = self.state.fail_prepare.lock().unwrap().get(&request.network_id) {
            return Err(kind.to_error(&request.network_id));
        }

        let mut out = Vec::new();
        for &index in &request.indexes {
            let address = if request.wallet_kind == WalletKind::Hw {
                let key = account_cache_key(
                    self.state.networks.as_ref(),
                    &request.wallet_id,
                    &request.network_id,
                    &request.derive_scheme,
                    index,
                );
                match bundle.and_then(|lookup| lookup.get(&key)) {
                    Some(resolved) => resolved.address.clone(),
                    None => {
                        self.state.device_derives.fetch_add(1, Ordering::SeqCst);
                        hw_address(&request.network_id, index)
                    }
                }
            } else {
                self.state.hd_derives.fetch_add(1, Ordering::SeqCst);
                hd_address(index)
            };
            out.push(PreparedAccount {
                account_id: account_id(
                    &request.wallet_id,
                    &request.network_id,
                    &request.derive_scheme,
                    index,
                ),
                path: build_path_from_template(TEMPLATE, index),
                path_index: Some(index),
                address,
                pubkey: None,
            });
        }
        Ok(out)
    }

    async fn build_account_address_detail(
        &self,
        account: &PreparedAccount,
        _network_info: &NetworkInfo,
    ) -> EngineResult<AddressDetail> {
        Ok(AddressDetail {
            address: account.address.clone(),
            display_address: None,
        })
    }
}

pub struct TestVaultFactory {
    pub state: Arc<VaultState>,
}

#[async_trait]
impl VaultFactory for TestVaultFactory {
    async fn get_vault(&self, network_id: &str, _wallet_id: &str) -> EngineResult<Arc<dyn Vault>> {
        Ok(Arc::new(TestVault {
            network_id: network_id.to_string(),
            state: self.state.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Account store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TestStore {
    pub existing: Mutex<HashSet<String>>,
    pub persisted: Mutex<Vec<String>>,
    pub backup_requests: AtomicUsize,
    /// Cancel this flag once the given number of accounts has been persisted.
    pub cancel_after_persists: Mutex<Option<(usize, CancelFlag)>>,
}

#[async_trait]
impl AccountStore for TestStore {
    async fn account_exists(&self, account_id: &str) -> EngineResult<bool> {
        Ok(self.existing.lock().unwrap().contains(account_id)
            || self
                .persisted
                .lock()
                .unwrap()
                .iter()
                .any(|id| id == account_id))
    }

    async fn persist_account(
        &self,
        _wallet_id: &str,
        _network_id: &str,
        account: &DerivedAccount,
        _name_override: Option<&str>,
    ) -> EngineResult<()> {
        let mut persisted = self.persisted.lock().unwrap();
        persisted.push(account.account.account_id.clone());
        if let Some((after, flag)) = self.cancel_after_persists.lock().unwrap().as_ref() {
            if persisted.len() == *after {
                flag.cancel();
            }
        }
        Ok(())
    }

    async fn request_auto_backup(&self) -> EngineResult<()> {
        self.backup_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TestEvents {
    events: Mutex<Vec<EngineEvent>>,
}

impl TestEvents {
    pub fn collected(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for TestEvents {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: BatchAccountEngine,
    pub cache: NetworkAccountCache,
    pub networks: Arc<TestNetworks>,
    pub hardware: Arc<TestHardware>,
    pub vault_state: Arc<VaultState>,
    pub store: Arc<TestStore>,
    pub events: Arc<TestEvents>,
}

/// Route engine logs through the test harness; repeated calls are no-ops.
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Harness {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// A harness whose hardware wallets have no live device session.
    pub fn without_device() -> Self {
        Self::build(false)
    }

    fn build(device_available: bool) -> Self {
        init_test_logging();
        let networks = Arc::new(TestNetworks);
        let hardware = Arc::new(TestHardware::default());
        let vault_state = Arc::new(VaultState {
            networks: networks.clone(),
            ..VaultState::default()
        });
        let store = Arc::new(TestStore::default());
        let events = Arc::new(TestEvents::default());
        let cache = NetworkAccountCache::new();

        let collab = Collaborators {
            wallets: Arc::new(TestWallets { device_available }),
            vaults: Arc::new(TestVaultFactory {
                state: vault_state.clone(),
            }),
            hardware: hardware.clone(),
            networks: networks.clone(),
            store: store.clone(),
            events: events.clone(),
        };
        let engine = BatchAccountEngine::new(collab, cache.clone());

        Self {
            engine,
            cache,
            networks,
            hardware,
            vault_state,
            store,
            events,
        }
    }

    pub fn persist_count(&self) -> usize {
        self.store.persisted.lock().unwrap().len()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.vault_state.chunk_sizes.lock().unwrap().clone()
    }
}

/// A plain single-target job request with everything off by default.
pub fn request(wallet_id: &str, indexes: Vec<u32>, targets: Vec<DerivationTarget>) -> BatchJobRequest {
    BatchJobRequest {
        wallet_id: wallet_id.to_string(),
        indexes: IndexSelection::Explicit(indexes),
        targets: TargetDirective {
            targets,
            ..TargetDirective::default()
        },
        save_to_db: false,
        save_to_cache: false,
        show_ui_progress: false,
        auto_recover: false,
        show_on_device: false,
        progress_total_override: None,
        account_names: HashMap::new(),
    }
}
