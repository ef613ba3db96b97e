//! Core, headless batch account-derivation engine – no UI/transport code.

pub mod types;
pub mod errors;
pub mod cancel;
pub mod progress;
pub mod cache;
pub mod providers;
pub mod resolver;
pub mod bundle;
pub mod deriver;
pub mod flow;
pub mod utils;
