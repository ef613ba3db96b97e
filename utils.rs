use crate::errors::{EngineError, EngineResult};
use crate::types::WalletKind;

/// Placeholder replaced by the address index when expanding a path template.
pub const INDEX_PLACEHOLDER: &str = "$$INDEX$$";

/// Expand a derivation path template like `m/44'/60'/$$INDEX$$'/0/0`.
pub fn build_path_from_template(template: &str, index: u32) -> String {
    template.replace(INDEX_PLACEHOLDER, &index.to_string())
}

/// Wallet ids carry their kind as a prefix (`hd-1`, `hw-abcdef`, ...).
pub fn wallet_kind_of(wallet_id: &str) -> EngineResult<WalletKind> {
    let kind = match wallet_id.split_once('-').map(|(prefix, _)| prefix) {
        Some("hd") => WalletKind::Hd,
        Some("hw") => WalletKind::Hw,
        Some("qr") => WalletKind::Qr,
        Some("imported") => WalletKind::Imported,
        Some("watching") => WalletKind::Watching,
        _ => {
            return Err(EngineError::Setup(format!(
                "unrecognized wallet id: '{wallet_id}'"
            )))
        }
    };
    Ok(kind)
}
