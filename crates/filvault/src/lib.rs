//! Filvault - password-protected HD key vault
//!
//! This crate provides the stateful half of the vault:
//! - A durable key-value store
//! - Password-based encryption of the mnemonic and imported keys
//! - The address registry and shared derivation counter
//! - Signing for derived and imported addresses
//! - Unlocked sessions over the vault
//! - Configuration and key import formats

pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod registry;
pub mod session;
pub mod signer;
pub mod store;

pub use codec::{EncryptedBlob, KdfParams, SecretCodec};
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use import::KeyFormat;
pub use registry::{
    group_by_owner, AddressRecord, AddressRole, DerivationIndex, Registry, IMPORTED_INDEX,
};
pub use session::{Session, Vault};
pub use signer::Signer;
pub use store::{FileStore, KeyTag, KeyValueStore, MemoryStore};
